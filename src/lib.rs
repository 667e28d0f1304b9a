//! Converts a Zenhub workspace into a line-delimited corpus of
//! retrieval-ready documents, one per issue.
//!
//! The pipeline is fetch ([`providers`]) → filter ([`filter`]) →
//! assemble ([`assemble`]) → write ([`corpus`]), driven by
//! [`converter::Converter`]. [`stats`] and [`corpus::validate_corpus`]
//! work on already-written corpora.

pub mod assemble;
pub mod config;
pub mod converter;
pub mod corpus;
pub mod error;
pub mod filter;
pub mod model;
pub mod providers;
pub mod stats;

pub use assemble::AssembleOptions;
pub use converter::{cancellation, CancelHandle, CancelSignal, Converter};
pub use error::{Error, Result};
pub use filter::FilterSpec;
pub use model::{RagDocument, WorkspaceSnapshot};
