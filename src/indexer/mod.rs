pub mod chunker;
pub mod core;
pub mod scanner;

pub use self::core::{Indexer, chunk_id};
