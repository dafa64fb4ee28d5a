//! Middleware modules.

pub mod admission;
pub mod error;
