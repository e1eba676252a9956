pub mod asset;
pub mod config_manager;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod traits;
pub mod types;
pub mod validation;
pub mod versioning;

pub use asset::*;
pub use config_manager::*;
pub use error::*;
pub use hashing::*;
pub use logging::*;
pub use traits::*;
pub use types::*;
pub use validation::*;
pub use versioning::*;
