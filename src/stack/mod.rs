//! Stack constructs.
//!
//! A construct renders one or more resources into a template. A stack is a
//! named list of constructs plus its outputs; synthesizing it yields a
//! [`Template`].

pub mod bucket;
pub mod distribution;
pub mod pipeline;
pub mod project;
pub mod site;

use anyhow::{Context, Result};
use tracing::debug;

use crate::template::{Output, Template, TemplateError};

pub use bucket::{SiteBucket, WebsiteSettings};
pub use distribution::SiteDistribution;
pub use pipeline::SitePipeline;
pub use project::BuildProject;
pub use site::{ConsistencyError, SiteStack, SiteStackProps, DISTRIBUTION_ID_ENV};

/// Something that contributes resources to a template
pub trait Construct: Send + Sync {
    /// Construct name (used in logs and plans)
    fn name(&self) -> &str;

    /// Add this construct's resources to the template
    fn render(&self, template: &mut Template) -> Result<(), TemplateError>;
}

/// A named collection of constructs and outputs
pub struct Stack {
    name: String,
    constructs: Vec<Box<dyn Construct>>,
    outputs: Vec<(String, Output)>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, construct: impl Construct + 'static) -> &mut Self {
        self.constructs.push(Box::new(construct));
        self
    }

    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> &mut Self {
        self.outputs.push((name.into(), output));
        self
    }

    /// Render every construct and output into a fresh template
    pub fn synth(&self) -> Result<Template> {
        let mut template = Template::new();

        for construct in &self.constructs {
            construct
                .render(&mut template)
                .with_context(|| format!("Failed to render construct '{}'", construct.name()))?;
            debug!(construct = construct.name(), "Rendered construct");
        }

        for (name, output) in &self.outputs {
            template.add_output(name.clone(), output.clone())?;
        }

        template
            .check_references()
            .with_context(|| format!("Stack '{}' has unresolved references", self.name))?;

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stack_has_no_resources() {
        let stack = Stack::new("SiteStack");
        let template = stack.synth().unwrap();

        assert!(template.resources.is_empty());
        assert!(template.outputs.is_empty());
        assert_eq!(template.to_json().unwrap(), "{}\n");
    }
}
