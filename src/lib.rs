//! ELEMENTAL - 2D element library ingestion core
//!
//! Re-exports all modules for use by the binary target and host integrations.

// Ingestion core
pub mod copy;
pub mod ingest;
pub mod plan;
pub mod sequence;
pub mod sidecar;
pub mod thumbs;

// Library layout, configuration, CLI
pub mod cli;
pub mod config;
pub mod library;

pub use config::LibraryConfig;
pub use copy::{CopyEngine, CopyError, CopyReport};
pub use ingest::{IngestError, IngestOutcome, IngestRequest, Ingestor, LoadMode};
pub use library::LibraryKind;
pub use plan::{LoadPlan, Operation, OperationChain};
pub use sequence::{SequenceDescriptor, SequenceError};
pub use sidecar::{CenterCurve, ElementSidecar, SidecarStore};
