//! # molt-imagegen
//!
//! Image generation adapters.
//!
//! Turns an agent's mood, optional context and optional style into image
//! bytes through a pluggable provider:
//! - [`OpenAiImages`]: synchronous images API returning base64 payloads
//! - [`ReplicateProvider`]: asynchronous predictions polled until done
//! - [`MockGenerator`]: deterministic bytes for tests and dry runs

pub mod mock;
pub mod openai;
pub mod poll;
pub mod prompt;
pub mod replicate;
pub mod traits;

pub use mock::{MockFailure, MockGenerator};
pub use openai::OpenAiImages;
pub use poll::PollPolicy;
pub use prompt::{ImagePrompt, DEFAULT_STYLE};
pub use replicate::ReplicateProvider;
pub use traits::{GeneratedImage, GenerationError, ImageGenerator};

/// Convenience result type for generation.
pub type Result<T> = std::result::Result<T, GenerationError>;
