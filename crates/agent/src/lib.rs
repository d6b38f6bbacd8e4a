//! Instruction-to-protocol translation pipeline.
//!
//! This crate is the brain of souk: it turns a free-text message into a
//! well-formed commerce network request and turns the network's answer back
//! into a reply.
//!
//! # Pipeline
//!
//! ```text
//! utterance → classifier → ordering guard → schema resolver
//!           → context builder → payload composer → network call
//!           → compressor (search) → narrator → reply
//! ```
//!
//! # Key types
//!
//! - `TurnOrchestrator` — sequences one turn end to end (see `runtime`)
//! - `LlmClient` / `NetworkClient` — seams to the model and HTTP edges
//! - `PayloadComposer` — merges schema, envelope, profile, and policy
//!
//! # Safety principle
//!
//! The model is strictly a translator. Ordering validity, the request URL,
//! the context block, and the lifecycle call-to-actions are all decided
//! deterministically in this crate, never by model output.

pub mod classifier;
pub mod composer;
pub mod compressor;
pub mod context;
pub mod extractor;
pub mod llm;
pub mod narrator;
pub mod network;
pub mod runtime;

pub use classifier::{ActionClassifier, ClassifyOutcome};
pub use composer::{strip_empty, ComposeError, PayloadComposer, ProtocolRequest};
pub use compressor::{compress_catalog, CompressedCatalog, CompressedItem, CompressedProvider};
pub use context::{ContextBuilder, ContextError};
pub use extractor::{ExtractOutcome, ProfileExtractor};
pub use llm::{ChatMessage, ChatRole, CompletionOptions, LlmClient, LlmError};
pub use narrator::{Narration, Narrator};
pub use network::{NetworkClient, NetworkError};
pub use runtime::{TurnOrchestrator, TurnOutcome};
