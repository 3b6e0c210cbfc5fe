//! Synthesis driver.
//!
//! Renders a stack, writes it into the output directory and records the
//! outcome in the synthesis history.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::{EventType, SynthEvent};
use crate::stack::SiteStack;

use super::assembly::{Assembly, StackArtifact, Written};
use super::history::History;

/// Result of one synthesis
#[derive(Debug, Clone)]
pub struct SynthReport {
    pub synth_id: Uuid,
    pub stack_name: String,
    pub template_path: PathBuf,
    pub artifact: StackArtifact,
    /// False when the manifest already held this exact template
    pub changed: bool,
}

pub struct Synthesizer {
    assembly: Assembly,
    history: History,
}

impl Synthesizer {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            assembly: Assembly::new(out_dir),
            history: History::open(out_dir),
        }
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    #[instrument(skip(self, stack), fields(stack = %stack.name()))]
    pub async fn synthesize(&self, stack: &SiteStack) -> Result<SynthReport> {
        let synth_id = Uuid::new_v4();
        let stack_name = stack.name().to_string();
        info!(%synth_id, "Starting synthesis");

        self.history
            .append(&SynthEvent::new(synth_id, &stack_name, EventType::SynthStarted))
            .await?;

        match self.render_and_write(stack).await {
            Ok(written) => {
                let changed = written.changed();
                let artifact = written.artifact;

                self.history
                    .append(
                        &SynthEvent::new(synth_id, &stack_name, EventType::SynthCompleted)
                            .with_template(artifact.template_hash.clone(), artifact.resource_count),
                    )
                    .await?;

                info!(
                    resources = artifact.resource_count,
                    hash = %artifact.template_hash,
                    changed,
                    "Synthesis completed"
                );

                Ok(SynthReport {
                    synth_id,
                    template_path: self.assembly.template_path(&stack_name),
                    stack_name,
                    artifact,
                    changed,
                })
            }
            Err(e) => {
                let error_msg = format!("{:#}", e);
                error!(%error_msg, "Synthesis failed");
                self.history
                    .append(
                        &SynthEvent::new(synth_id, &stack_name, EventType::SynthFailed)
                            .with_error(error_msg),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    async fn render_and_write(&self, stack: &SiteStack) -> Result<Written> {
        let template = stack.synth()?;
        let assembly = self.assembly.clone();
        let stack_name = stack.name().to_string();

        tokio::task::spawn_blocking(move || assembly.write(&stack_name, &template))
            .await
            .context("Template writer task panicked")?
    }
}
