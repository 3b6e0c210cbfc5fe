//! Command-line interface for sitestack.
//!
//! Provides commands for synthesizing the stack template, validating the
//! stack, showing the pipeline plan and outputs, and inspecting the
//! synthesis history.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::core::{History, Synthesizer};
use crate::domain::EventType;
use crate::stack::SiteStack;

/// sitestack - static-site delivery pipeline stack
#[derive(Parser, Debug)]
#[command(name = "sitestack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to sitestack.yaml in the current directory or a parent)
    #[arg(short, long, global = true, env = "SITESTACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the stack template into the output directory
    Synth {
        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the template to stdout instead of writing files
        #[arg(long)]
        stdout: bool,
    },

    /// Check pipeline wiring and cross-resource invariants
    Validate,

    /// Show the pipeline stages, run groups and artifact flow
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the stack outputs
    Outputs,

    /// Show recent synthesis history
    History {
        /// Maximum number of events to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config_path = self.config.as_deref();
        match self.command {
            Commands::Synth { out, stdout } => {
                let cfg = config::load_config(config_path)?;
                synth(&cfg, out, stdout).await
            }
            Commands::Validate => {
                let cfg = config::load_config(config_path)?;
                validate(&cfg)
            }
            Commands::Plan { json } => {
                let cfg = config::load_config(config_path)?;
                show_plan(&cfg, json)
            }
            Commands::Outputs => {
                let cfg = config::load_config(config_path)?;
                show_outputs(&cfg)
            }
            Commands::History { limit } => {
                let cfg = config::load_config(config_path)?;
                show_history(&cfg, limit).await
            }
            Commands::Config => {
                let cfg = config::load_config(config_path)?;
                show_config(&cfg)
            }
        }
    }
}

fn build_stack(cfg: &ResolvedConfig) -> Result<SiteStack> {
    SiteStack::new(&cfg.props)
        .with_context(|| format!("Failed to build stack '{}'", cfg.props.stack_name))
}

/// Render the template
async fn synth(cfg: &ResolvedConfig, out: Option<PathBuf>, stdout: bool) -> Result<()> {
    let stack = build_stack(cfg)?;

    if stdout {
        let template = stack.synth()?;
        print!("{}", template.to_json()?);
        return Ok(());
    }

    let out_dir = out.unwrap_or_else(|| cfg.out_dir.clone());
    let synthesizer = Synthesizer::new(&out_dir);
    let report = synthesizer.synthesize(&stack).await?;

    println!("Stack:     {}", report.stack_name);
    println!("Template:  {}", report.template_path.display());
    println!("Resources: {}", report.artifact.resource_count);
    println!("Hash:      {}", report.artifact.template_hash);
    if report.changed {
        println!("Template changed since the last synthesis");
    } else {
        println!("Template unchanged");
    }

    Ok(())
}

/// Verify the stack without writing anything
fn validate(cfg: &ResolvedConfig) -> Result<()> {
    let stack = build_stack(cfg)?;
    stack
        .verify()
        .with_context(|| format!("Stack '{}' failed verification", stack.name()))?;
    // Synthesis also checks that every reference resolves
    let template = stack.synth()?;

    println!(
        "Stack '{}' is valid: {} stages, {} resources",
        stack.name(),
        stack.pipeline().stages.len(),
        template.resources.len()
    );
    Ok(())
}

/// Print the execution plan
fn show_plan(cfg: &ResolvedConfig, as_json: bool) -> Result<()> {
    let stack = build_stack(cfg)?;
    let plan = stack.pipeline().execution_plan();

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
        );
        return Ok(());
    }

    println!("Pipeline: {}", plan.pipeline);
    for stage in &plan.stages {
        println!("\n{}. {}", stage.position, stage.name);
        for group in &stage.groups {
            for action in &group.actions {
                let inputs = if action.inputs.is_empty() {
                    "-".to_string()
                } else {
                    action.inputs.join(", ")
                };
                let outputs = if action.outputs.is_empty() {
                    "-".to_string()
                } else {
                    action.outputs.join(", ")
                };
                println!(
                    "   [order {}] {:<16} {:<16} in: {:<14} out: {}",
                    group.run_order,
                    action.name,
                    action.kind.to_string(),
                    inputs,
                    outputs
                );
            }
        }
    }

    Ok(())
}

/// Print the named outputs
fn show_outputs(cfg: &ResolvedConfig) -> Result<()> {
    let stack = build_stack(cfg)?;

    println!("{:<24} {}", "OUTPUT", "VALUE");
    println!("{}", "-".repeat(75));
    for (name, output) in stack.outputs() {
        println!("{:<24} {}", name, output.value);
    }

    Ok(())
}

/// Print recent synthesis events
async fn show_history(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let history = History::open(&cfg.out_dir);
    let events = history.recent(limit).await?;

    if events.is_empty() {
        println!("No synthesis history in {}", cfg.out_dir.display());
        return Ok(());
    }

    println!("{:<26} {:<20} {:<10} {}", "TIME", "STACK", "EVENT", "DETAIL");
    println!("{}", "-".repeat(90));

    for event in events {
        let (label, detail) = match event.event_type {
            EventType::SynthStarted => ("started", String::new()),
            EventType::SynthCompleted => (
                "completed",
                format!(
                    "{} resources, {}",
                    event.resource_count.unwrap_or_default(),
                    event
                        .template_hash
                        .as_deref()
                        .map_or_else(|| "-".to_string(), short_hash)
                ),
            ),
            EventType::SynthFailed => ("failed", event.error.unwrap_or_default()),
        };
        println!(
            "{:<26} {:<20} {:<10} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            event.stack_name,
            label,
            detail
        );
    }

    Ok(())
}

/// First 16 characters of a template hash
fn short_hash(hash: &str) -> String {
    hash.chars().take(16).collect()
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let props = &cfg.props;

    println!("Config file: {}", cfg.config_file.display());
    println!("Output dir:  {}", cfg.out_dir.display());
    println!();
    println!("Stack: {}", props.stack_name);
    println!();
    println!("Source:");
    println!("  Repository: {}/{}", props.source.owner, props.source.repo);
    println!("  Branch:     {}", props.source.branch);
    println!("  Credential: {}", props.source.credential.dynamic_reference());
    println!();
    println!("Build:");
    for (runtime, version) in &props.build.runtime_versions {
        println!("  Runtime:    {} {}", runtime, version);
    }
    for command in &props.build.install_commands {
        println!("  Install:    {}", command);
    }
    for command in &props.build.build_commands {
        println!("  Build:      {}", command);
    }
    println!("  Output:     {} ({})", props.build.base_directory, props.build.files.join(", "));
    if let Some(image) = &props.build_image {
        println!("  Image:      {}", image);
    }
    println!();
    println!("Website:");
    println!("  Index:      {}", props.website.index_document);
    println!("  Error:      {}", props.website.error_document);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef0123"), "0123456789abcdef");
        assert_eq!(short_hash("abc"), "abc");
        // Hand-edited history may hold anything
        assert_eq!(short_hash("ééééééééééééééééé"), "éééééééééééééééé");
    }

    #[test]
    fn test_parse_history_limit() {
        let cli = Cli::parse_from(["sitestack", "history", "--limit", "3"]);
        assert!(matches!(cli.command, Commands::History { limit: 3 }));
        assert!(cli.config.is_none());
    }
}
