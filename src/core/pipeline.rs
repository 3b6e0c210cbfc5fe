//! Pipeline and stage definitions.
//!
//! A pipeline is an ordered list of stages; each stage holds one or more
//! actions grouped by run order. Stages run strictly in declaration order
//! and a failed stage halts everything after it. Both guarantees belong to
//! the orchestration service; this module only checks that the declared
//! wiring can satisfy them.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::{ActionDecl, ActionKind, ArtifactHandle};

/// A complete pipeline definition
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Ordered list of stages
    pub stages: Vec<Stage>,
}

/// A named group of actions
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<ActionDecl>,
}

/// Wiring violations found by [`Pipeline::validate`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WiringError {
    #[error("Pipeline name cannot be empty")]
    EmptyName,

    #[error("Pipeline must have at least one stage")]
    NoStages,

    #[error("Stage '{0}' has no actions")]
    EmptyStage(String),

    #[error("Duplicate stage name '{0}'")]
    DuplicateStage(String),

    #[error("Duplicate action name '{action}' in stage '{stage}'")]
    DuplicateAction { stage: String, action: String },

    #[error("Action '{action}' in stage '{stage}' has run order 0 (must be >= 1)")]
    InvalidRunOrder { stage: String, action: String },

    #[error("Action '{action}' in stage '{stage}' reads artifact '{artifact}' which is not produced by an earlier stage")]
    UnproducedInput {
        stage: String,
        action: String,
        artifact: String,
    },

    #[error("Artifact '{artifact}' is produced more than once (again by '{action}' in stage '{stage}')")]
    DuplicateOutput {
        stage: String,
        action: String,
        artifact: String,
    },
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate the pipeline definition.
    ///
    /// Every input must have been produced by a strictly earlier stage:
    /// outputs of the current stage only become visible once the whole
    /// stage is done, which rules out both forward and self references.
    pub fn validate(&self) -> Result<(), WiringError> {
        if self.name.is_empty() {
            return Err(WiringError::EmptyName);
        }

        if self.stages.is_empty() {
            return Err(WiringError::NoStages);
        }

        let mut stage_names = HashSet::new();
        let mut produced: HashSet<&ArtifactHandle> = HashSet::new();

        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(WiringError::DuplicateStage(stage.name.clone()));
            }
            if stage.actions.is_empty() {
                return Err(WiringError::EmptyStage(stage.name.clone()));
            }

            let mut action_names = HashSet::new();
            let mut stage_outputs = Vec::new();

            for decl in &stage.actions {
                if !action_names.insert(decl.name.as_str()) {
                    return Err(WiringError::DuplicateAction {
                        stage: stage.name.clone(),
                        action: decl.name.clone(),
                    });
                }
                if decl.run_order == 0 {
                    return Err(WiringError::InvalidRunOrder {
                        stage: stage.name.clone(),
                        action: decl.name.clone(),
                    });
                }

                for input in decl.action.inputs() {
                    if !produced.contains(input) {
                        return Err(WiringError::UnproducedInput {
                            stage: stage.name.clone(),
                            action: decl.name.clone(),
                            artifact: input.to_string(),
                        });
                    }
                }

                for output in decl.action.outputs() {
                    if produced.contains(output) || stage_outputs.contains(&output) {
                        return Err(WiringError::DuplicateOutput {
                            stage: stage.name.clone(),
                            action: decl.name.clone(),
                            artifact: output.to_string(),
                        });
                    }
                    stage_outputs.push(output);
                }
            }

            produced.extend(stage_outputs);
        }

        Ok(())
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Get the index of a stage by name
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Every action across all stages, in declaration order
    pub fn actions(&self) -> impl Iterator<Item = (&Stage, &ActionDecl)> {
        self.stages
            .iter()
            .flat_map(|stage| stage.actions.iter().map(move |a| (stage, a)))
    }

    /// Index of the stage producing each artifact
    pub fn producers(&self) -> HashMap<&ArtifactHandle, usize> {
        let mut producers = HashMap::new();
        for (idx, stage) in self.stages.iter().enumerate() {
            for decl in &stage.actions {
                for output in decl.action.outputs() {
                    producers.entry(output).or_insert(idx);
                }
            }
        }
        producers
    }

    /// Ordered view of stages, run groups and artifact flow
    pub fn execution_plan(&self) -> ExecutionPlan {
        let stages = self
            .stages
            .iter()
            .enumerate()
            .map(|(idx, stage)| PlannedStage {
                position: idx + 1,
                name: stage.name.clone(),
                groups: stage
                    .run_groups()
                    .into_iter()
                    .map(|(run_order, actions)| RunGroup {
                        run_order,
                        actions: actions
                            .into_iter()
                            .map(|decl| PlannedAction {
                                name: decl.name.clone(),
                                kind: decl.action.kind(),
                                inputs: decl.action.inputs().iter().map(|a| a.to_string()).collect(),
                                outputs: decl.action.outputs().iter().map(|a| a.to_string()).collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        ExecutionPlan {
            pipeline: self.name.clone(),
            stages,
        }
    }

    /// `Stages` property of the pipeline resource
    pub fn render_stages(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::render).collect())
    }
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ActionDecl) -> Self {
        self.actions.push(action);
        self
    }

    /// Actions grouped by ascending run order.
    ///
    /// Actions in the same group may run concurrently; a group starts only
    /// after every lower group finished.
    pub fn run_groups(&self) -> Vec<(u32, Vec<&ActionDecl>)> {
        let mut groups: BTreeMap<u32, Vec<&ActionDecl>> = BTreeMap::new();
        for decl in &self.actions {
            groups.entry(decl.run_order).or_default().push(decl);
        }
        groups.into_iter().collect()
    }

    pub fn render(&self) -> Value {
        json!({
            "Name": self.name,
            "Actions": self.actions.iter().map(ActionDecl::render).collect::<Vec<_>>(),
        })
    }
}

/// Ordered execution view of a pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub pipeline: String,
    pub stages: Vec<PlannedStage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStage {
    /// 1-based position in the pipeline
    pub position: usize,
    pub name: String,
    pub groups: Vec<RunGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunGroup {
    pub run_order: u32,
    pub actions: Vec<PlannedAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    pub name: String,
    pub kind: ActionKind,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}
