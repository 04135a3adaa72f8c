//! Data models for the coordinator
//!
//! Generations, events, assets and explain rows live in the store; jobs live
//! only inside the queue.

pub mod asset;
pub mod event;
pub mod explain;
pub mod generation;
pub mod inference;
pub mod job;
pub mod request;

pub use asset::*;
pub use event::*;
pub use explain::*;
pub use generation::*;
pub use inference::*;
pub use job::*;
pub use request::*;
