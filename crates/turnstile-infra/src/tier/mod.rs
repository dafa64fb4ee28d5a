//! Tier resolvers - a static assignment table and a TTL cache in front of
//! any other resolver.

mod cached;
mod static_map;

pub use cached::CachedTierResolver;
pub use static_map::StaticTierResolver;
