// crates/timeline/src/lib.rs
pub mod chunks;
pub mod conversation;
pub mod process;
pub mod session;
pub mod steps;
pub mod waterfall;

pub use chunks::*;
pub use conversation::*;
pub use process::*;
pub use session::*;
pub use steps::*;
pub use waterfall::*;
