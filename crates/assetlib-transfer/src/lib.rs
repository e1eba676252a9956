pub mod checksum;
pub mod export;
pub mod package;

pub use checksum::*;
pub use export::*;
pub use package::*;
