//! Consent-gated script execution.
//!
//! This crate promotes inert third-party `<script>` tags to live ones once
//! their consent category is granted:
//! - A document model with mutation observation and a script runtime hook
//! - The script gate, which scans, watches and unblocks tagged scripts

pub mod document;
pub mod error;
pub mod gate;

// Re-export main types
pub use document::{
    Document, ElementRef, MutationRecord, NodeId, ObserverId, ScriptInvocation, ScriptRuntime,
    ScriptSource,
};
pub use error::{DomError, Result};
pub use gate::{GateOptions, ScriptGate};
