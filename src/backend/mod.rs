pub mod client;
pub mod error;
pub mod retry;
pub mod selector;
pub mod types;

pub use client::{GenerationClient, TextGenerator, health_check};
pub use error::BackendError;
pub use retry::{RetryPolicy, query};
pub use selector::BackendSelector;
