//! # Companion Core Library
//!
//! Domain-aware conversational safety and memory pipeline for a knowledge
//! companion that answers questions across many domains (medicine, law,
//! certification exams, nutrition, natural science, ...).
//!
//! Every domain runs the same four stages, parameterised by a
//! [`DomainConfig`](lexicon::DomainConfig) record instead of per-domain code:
//!
//! - **Classify**: hybrid rule + model topic tagging with personalization
//!   ([`classifier`])
//! - **Retrieve**: TTL-cached domain information with a safe fallback
//!   ([`cache`])
//! - **Police**: risk scoring, tone softening and mandatory disclaimers
//!   ([`safety`])
//! - **Remember**: append-only conversation log ([`log`]) coupled to an
//!   evolving emotion/growth state ([`emotion`])
//!
//! [`pipeline::Pipeline::handle`] wires the stages into the single entry
//! point consumed by any presentation layer.
//!
//! ```text
//! Lexicon Store → Topic Classifier → Safety Policy → Information Cache
//!              → Conversation Log → Emotion/Growth Engine → Pipeline
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod classifier;
pub mod config;
pub mod emotion;
pub mod error;
pub mod lexicon;
pub mod log;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod safety;
pub mod source;
pub mod types;

pub use config::CompanionConfig;
pub use error::{CompanionError, SourceError};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use types::*;
