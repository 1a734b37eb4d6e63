//! The boundary with the external execution engine.
//!
//! An analysis instantiation plus a set of requested derivatives is
//! flattened into a `DerivationPlan`, a self-contained JSON document the
//! engine consumes. This crate never schedules or runs a node; the
//! `ExecutionBackend` trait is the hand-off point.

use crate::analysis::{Analysis, ParamValue};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::input::AnalysisInputSet;
use crate::pipeline::PipelineSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where pipeline jobs run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Processor {
    /// Everything in one process, nodes run sequentially.
    Single,
    /// A local worker pool.
    Multi { num_procs: usize },
    /// Jobs submitted to a SLURM scheduler.
    Slurm {
        #[serde(skip_serializing_if = "Option::is_none")]
        account: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        partition: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
}

/// How toolkit installations are located on the execution host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Toolkits are on the PATH as installed.
    Static,
    /// Toolkits are loaded through environment modules, honouring the
    /// nodes' version requirements.
    Modules,
}

/// The complete, serializable description of one derivation request.
#[derive(Debug, Clone, Serialize)]
pub struct DerivationPlan {
    pub created: DateTime<Utc>,
    pub analysis: String,
    pub class: String,
    pub dataset: Dataset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dataset: Option<Dataset>,
    pub processor: Processor,
    pub environment: Environment,
    pub reprocess: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_ids: Option<Vec<String>>,
    pub inputs: AnalysisInputSet,
    pub parameters: BTreeMap<String, ParamValue>,
    pub requested: Vec<String>,
    pub pipelines: Vec<PipelineSpec>,
}

impl DerivationPlan {
    /// Assemble the plan for the requested derivatives, building (and
    /// validating) every pipeline they need.
    pub fn assemble(analysis: &Analysis, derivatives: &[String]) -> Result<Self> {
        let pipelines = analysis.derivation_pipelines(derivatives)?;
        Ok(Self {
            created: Utc::now(),
            analysis: analysis.name().to_string(),
            class: analysis.class().name().to_string(),
            dataset: (**analysis.dataset()).clone(),
            output_dataset: None,
            processor: analysis.processor().clone(),
            environment: analysis.environment(),
            reprocess: false,
            task: analysis.task().map(str::to_owned),
            subject_ids: analysis.subject_ids().map(<[String]>::to_vec),
            visit_ids: analysis.visit_ids().map(<[String]>::to_vec),
            inputs: analysis.inputs().clone(),
            parameters: analysis.parameters().clone(),
            requested: derivatives.to_vec(),
            pipelines,
        })
    }

    /// Send derivatives to a different dataset than the one read from.
    pub fn with_output_dataset(mut self, dataset: Dataset) -> Self {
        self.output_dataset = Some(dataset);
        self
    }

    /// Regenerate derivatives whose recorded provenance no longer matches.
    pub fn with_reprocess(mut self, reprocess: bool) -> Self {
        self.reprocess = reprocess;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// On-disk representation of a written plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanFormat {
    #[default]
    Json,
    Yaml,
}

impl PlanFormat {
    fn extension(self) -> &'static str {
        match self {
            PlanFormat::Json => "json",
            PlanFormat::Yaml => "yaml",
        }
    }
}

/// The hand-off point to the external engine.
pub trait ExecutionBackend {
    /// Submit a plan, returning an engine-specific reference to it.
    fn submit(&self, plan: &DerivationPlan) -> Result<PathBuf>;
}

/// Writes plans into a scratch directory for the engine to pick up.
pub struct PlanWriter {
    dir: PathBuf,
    format: PlanFormat,
}

impl PlanWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: PlanFormat::default(),
        }
    }

    pub fn format(mut self, format: PlanFormat) -> Self {
        self.format = format;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExecutionBackend for PlanWriter {
    fn submit(&self, plan: &DerivationPlan) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{}-plan.{}", plan.analysis, self.format.extension()));
        let contents = match self.format {
            PlanFormat::Json => plan.to_json()?,
            PlanFormat::Yaml => plan.to_yaml()?,
        };
        fs::write(&path, contents)?;
        info!(
            plan = %path.display(),
            pipelines = plan.pipelines.len(),
            "derivation plan written"
        );
        Ok(path)
    }
}
