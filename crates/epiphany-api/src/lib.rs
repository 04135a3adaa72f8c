//! Epiphany API
//!
//! The job lifecycle coordinator for image, video, edit and explain
//! generations, the worker-side result ingestion, and the `/v1` HTTP router.

pub mod constants;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod inference;
pub mod middleware;
pub mod setup;
pub mod state;
pub mod task_handlers;
pub mod utils;

pub use coordinator::{Coordinator, StreamEvent};
pub use error::{ErrorResponse, HttpAppError};
pub use inference::{HttpInferenceClient, InferenceClient};
pub use state::AppState;
pub use task_handlers::TaskHandler;
