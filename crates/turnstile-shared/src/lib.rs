//! # Turnstile Shared
//!
//! Wire types shared by the gate server and its clients. Kept free of
//! domain dependencies so clients can compile it on its own.

pub mod dto;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
