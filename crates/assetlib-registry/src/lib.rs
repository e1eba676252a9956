pub mod manager;
pub mod registry;
pub mod storage;
pub mod versions;

pub use manager::*;
pub use registry::*;
pub use storage::*;
pub use versions::*;
