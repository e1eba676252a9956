pub mod cache;
pub mod expiring_cache;

pub use cache::*;
pub use expiring_cache::*;
