// crates/core/src/lib.rs
pub mod classifier;
pub mod commands;
pub mod errcat;
pub mod error;
pub mod paths;
pub mod reader;
pub mod types;

pub use classifier::*;
pub use commands::*;
pub use errcat::*;
pub use error::*;
pub use reader::*;
pub use types::*;
