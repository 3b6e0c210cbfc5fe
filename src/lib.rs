//! sitestack - static-site delivery pipeline stack
//!
//! Declares a four-stage continuous-delivery pipeline for a static site
//! (source checkout, site build, publish to a website bucket, cache
//! invalidation) together with the bucket and the content-delivery
//! distribution in front of it, and synthesizes the whole stack into a
//! deterministic deployment template.
//!
//! # Architecture
//!
//! - Every resource is a construct that renders into a template
//! - The pipeline topology is fixed and statically wired
//! - Cross-resource invariants are verified before anything is written
//! - Identical configuration always yields a byte-identical template
//!
//! # Modules
//!
//! - `domain`: Data structures (Action, Artifact, BuildSpec, Policy)
//! - `core`: Pipeline model, topology, synthesis and its output directory
//! - `stack`: Constructs (bucket, distribution, build projects, pipeline)
//! - `template`: Template model and intrinsic functions
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Render cdk.out/SiteStack.template.json
//! sitestack synth
//!
//! # Check wiring without writing anything
//! sitestack validate
//!
//! # Show the stage plan
//! sitestack plan
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod stack;
pub mod template;

// Re-export main types at crate root for convenience
pub use core::{Pipeline, Stage, StageKind, Synthesizer};
pub use domain::{Action, ActionDecl, ArtifactHandle};
pub use stack::{SiteStack, SiteStackProps, Stack};
pub use template::{LogicalId, Template};
