pub mod dependency;
pub mod graph;
pub mod traversal;

pub use dependency::*;
pub use graph::*;
pub use traversal::*;
