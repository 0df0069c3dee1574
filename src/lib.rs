//! Patch Bridge - forwards patch blocks from chat transcripts to a local backend
//!
//! An AI chat transcript is polled on a timer. Every well-formed patch block
//! found in it (a file path plus a search/replace pair between four literal
//! markers) is sent once to a local HTTP endpoint:
//!
//! - **Extractor**: marker tokenizer that finds blocks in noisy text
//! - **Filter**: drops blocks whose line breaks were lost in rendering
//! - **Fingerprint / Dedup**: session-scoped record of what was delivered
//! - **Dispatcher**: fire-and-forget POST with success/failure reporting
//!
//! # Architecture
//!
//! The [`Scanner`] owns all state and runs ticks, dispatch completions and
//! user commands on a single task. A block is recorded as sent only after
//! the backend confirms it, so failed sends are retried on the next tick.

pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod extractor;
pub mod filter;
pub mod fingerprint;
pub mod scanner;
pub mod source;
pub mod status;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use dedup::{DedupStore, StoreError};
pub use dispatcher::{
    DispatchCompletion, DispatchFailure, DispatchOutcome, HttpTransport, PatchPayload,
    SyncDispatcher, Transport, TransportError,
};
pub use extractor::{extract_blocks, BlockRecord, Blocks};
pub use filter::{is_suspicious, ValidityFilter};
pub use fingerprint::{fingerprint, Fingerprint};
pub use scanner::{ScanReport, Scanner, ScannerCommand, ScannerOptions, ScannerState};
pub use source::{FileSource, MemorySource, SourceError, TextSource};
pub use status::{Corner, LogStatusSink, RecordingSink, Status, StatusHint, StatusSink};
