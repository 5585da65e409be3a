//! Generative language API client.
//!
//! [`GeminiClient`] speaks HTTP, [`discovery`] turns the model listing into a
//! ranked candidate list and [`FallbackGenerator`] walks that list until one
//! candidate answers.

mod client;
pub mod discovery;
mod fallback;
pub mod stream;
mod types;

pub use client::{GeminiClient, GenerationTransport};
pub use discovery::{fallback_candidates, list_available_candidates, rank_candidates};
pub use fallback::{
    render_diagnostic, FailedAttempt, FallbackGenerator, Fragment, FragmentOrigin,
    GenerationOutcome,
};
pub use stream::FragmentStream;
pub use types::*;
