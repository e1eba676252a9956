pub mod engine;
pub mod index;
pub mod tokenizer;

pub use engine::*;
pub use index::*;
pub use tokenizer::*;
