//! Core stack logic.
//!
//! This module contains:
//! - Pipeline: stage/action model and wiring validation
//! - Topology: the fixed four-stage delivery pipeline
//! - Assembly: writing synthesized templates to disk
//! - History: append-only synthesis log
//! - Synthesizer: render, write and record a stack

pub mod assembly;
pub mod history;
pub mod pipeline;
pub mod synthesizer;
pub mod topology;

// Re-export commonly used types
pub use assembly::{Assembly, AssemblyError, Manifest, Written};
pub use history::History;
pub use pipeline::{ExecutionPlan, Pipeline, Stage, WiringError};
pub use synthesizer::{SynthReport, Synthesizer};
pub use topology::{SourceParams, StageKind, TopologyBuilder};
