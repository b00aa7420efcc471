//! # companion-feed: HTTP information feeds
//!
//! Implements the core's outbound [`InformationSource`] over plain JSON
//! endpoints, one per domain:
//!   - `{topic}` URL templating or a `topic` query parameter
//!   - per-request timeout and bounded retries
//!   - optional bearer token
//!
//! Every failure surfaces as a [`SourceError`]; the information cache turns
//! it into the unverified fallback item, so a dead feed never breaks a reply.
//!
//! [`InformationSource`]: companion_core::source::InformationSource
//! [`SourceError`]: companion_core::SourceError

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod types;

pub use client::HttpFeedSource;
pub use error::FeedError;
pub use types::{FeedDocument, WireItem, parse_items};
