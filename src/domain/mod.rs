//! Domain types for the site delivery stack.
//!
//! - Artifact: handles passed between actions
//! - Action: the closed set of pipeline actions
//! - BuildSpec: build service scripts
//! - Policy: permission grants
//! - Events: synthesis history records

pub mod action;
pub mod artifact;
pub mod buildspec;
pub mod events;
pub mod policy;

// Re-export commonly used types
pub use action::{
    Action, ActionDecl, ActionKind, BuildAction, CheckoutAction, DeployAction, InvalidateAction,
    SecretRef,
};
pub use artifact::ArtifactHandle;
pub use buildspec::{BuildSpec, BuildSpecError, SiteBuild};
pub use events::{EventType, SynthEvent};
pub use policy::{Effect, PolicyDocument, PolicyStatement};
