//! Clients for the external collaborators of the pipeline.
//!
//! This crate provides:
//! - [`CompletionBackend`] and the OpenAI-compatible [`HttpBackend`]
//! - [`ResilientClient`]: per-attempt timeout and bounded linear retry
//! - [`TextFetcher`] and [`HttpTextFetcher`] for transcript retrieval

pub mod completion;
pub mod fetch;
pub mod resilient;

pub use completion::{CompletionBackend, CompletionError, CompletionRequest, HttpBackend};
pub use fetch::{HttpTextFetcher, TextFetcher};
pub use resilient::{ResilientClient, RetryPolicy};
