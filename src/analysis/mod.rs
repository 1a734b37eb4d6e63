//! The analysis-class model.
//!
//! An `AnalysisClass` is the declarative description of a processing
//! recipe: the data it expects or produces, the parameters that steer it,
//! its default BIDS inputs and the pipelines that generate each derivative.
//! Classes are built once at startup (see `registry`) and are immutable
//! from then on; an `Analysis` is one instantiation of a class against a
//! concrete dataset.

pub mod bold;
pub mod dwi;
pub mod mri;
pub mod registry;
pub mod t1;
pub mod t2star;
pub mod veins;

use crate::bids::BidsDefault;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::execute::{Environment, Processor};
use crate::format::FileFormat;
use crate::input::{AnalysisInputSet, InputSource};
use crate::pipeline::PipelineSpec;
use crate::resolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How often a piece of data occurs in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    PerSession,
    PerSubject,
    PerDataset,
}

/// Where a data spec's content comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    /// Supplied by the dataset (optionally with a packaged atlas default).
    Acquired {
        optional: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        default_atlas: Option<String>,
    },
    /// Produced by the named pipeline of the declaring class.
    Derived { pipeline: String },
}

/// One named data slot of an analysis class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSpec {
    name: String,
    format: FileFormat,
    origin: DataOrigin,
    frequency: Frequency,
    desc: String,
}

impl DataSpec {
    pub fn acquired(name: impl Into<String>, format: FileFormat) -> Self {
        Self {
            name: name.into(),
            format,
            origin: DataOrigin::Acquired {
                optional: false,
                default_atlas: None,
            },
            frequency: Frequency::PerSession,
            desc: String::new(),
        }
    }

    pub fn derived(
        name: impl Into<String>,
        format: FileFormat,
        pipeline: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            origin: DataOrigin::Derived {
                pipeline: pipeline.into(),
            },
            frequency: Frequency::PerSession,
            desc: String::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        if let DataOrigin::Acquired { optional, .. } = &mut self.origin {
            *optional = true;
        }
        self
    }

    /// Acquired specs only: fall back to a packaged atlas when the dataset
    /// provides nothing.
    pub fn default_atlas(mut self, atlas: impl Into<String>) -> Self {
        if let DataOrigin::Acquired { default_atlas, .. } = &mut self.origin {
            *default_atlas = Some(atlas.into());
        }
        self
    }

    pub fn per_dataset(mut self) -> Self {
        self.frequency = Frequency::PerDataset;
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn origin(&self) -> &DataOrigin {
        &self.origin
    }

    pub fn is_acquired(&self) -> bool {
        matches!(self.origin, DataOrigin::Acquired { .. })
    }

    pub fn pipeline(&self) -> Option<&str> {
        match &self.origin {
            DataOrigin::Derived { pipeline } => Some(pipeline),
            DataOrigin::Acquired { .. } => None,
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn description(&self) -> &str {
        &self.desc
    }
}

/// A typed parameter value. The declared default fixes the type; overrides
/// must match it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
            ParamValue::IntList(_) => "comma-separated ints",
            ParamValue::FloatList(_) => "comma-separated floats",
        }
    }

    fn same_kind(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
            ParamValue::IntList(v) => {
                let parts: Vec<String> = v.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            ParamValue::FloatList(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// One named parameter slot with its default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    name: String,
    default: ParamValue,
    desc: String,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, default: ParamValue) -> Self {
        Self {
            name: name.into(),
            default,
            desc: String::new(),
        }
    }

    /// A boolean parameter that selects between pipeline variants.
    pub fn switch(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ParamValue::Bool(default))
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> &ParamValue {
        &self.default
    }

    pub fn description(&self) -> &str {
        &self.desc
    }

    /// Parse a raw CLI value against this parameter's declared type.
    pub fn parse(&self, raw: &str) -> Result<ParamValue> {
        let invalid = || Error::InvalidParameter {
            name: self.name.clone(),
            value: raw.to_string(),
            expected: self.default.type_name(),
        };
        let parsed = match &self.default {
            ParamValue::Bool(_) => ParamValue::Bool(raw.parse().map_err(|_| invalid())?),
            ParamValue::Int(_) => ParamValue::Int(raw.parse().map_err(|_| invalid())?),
            ParamValue::Float(_) => ParamValue::Float(raw.parse().map_err(|_| invalid())?),
            ParamValue::Str(_) => ParamValue::Str(raw.to_string()),
            ParamValue::IntList(_) => ParamValue::IntList(
                raw.split(',')
                    .map(|part| part.trim().parse())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| invalid())?,
            ),
            ParamValue::FloatList(_) => ParamValue::FloatList(
                raw.split(',')
                    .map(|part| part.trim().parse())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| invalid())?,
            ),
        };
        Ok(parsed)
    }
}

/// Builds one pipeline of a class from an instantiated analysis (which
/// supplies parameter values).
pub type PipelineBuilderFn = fn(&Analysis) -> Result<PipelineSpec>;

pub struct PipelineDef {
    name: String,
    builder: PipelineBuilderFn,
}

impl fmt::Debug for PipelineDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDef")
            .field("name", &self.name)
            .finish()
    }
}

/// A named sub-analysis of a composite class.
///
/// The prefixing function is the single authority on how the sub-analysis's
/// bare spec names appear in the composite namespace: name-map entries win,
/// everything else gets `<name>_` prepended.
pub struct SubAnalysisSpec {
    name: String,
    analysis: &'static AnalysisClass,
    name_map: Vec<(String, String)>,
}

impl SubAnalysisSpec {
    pub fn new(name: impl Into<String>, analysis: &'static AnalysisClass) -> Self {
        Self {
            name: name.into(),
            analysis,
            name_map: Vec::new(),
        }
    }

    /// Alias a sub-analysis spec onto an existing composite spec name
    /// instead of prefixing it.
    pub fn map_name(
        mut self,
        sub_name: impl Into<String>,
        parent_name: impl Into<String>,
    ) -> Self {
        self.name_map.push((sub_name.into(), parent_name.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn analysis(&self) -> &'static AnalysisClass {
        self.analysis
    }

    /// Map a bare sub-analysis spec name into the composite namespace.
    pub fn apply_prefix(&self, bare: &str) -> String {
        for (sub_name, parent_name) in &self.name_map {
            if sub_name == bare {
                return parent_name.clone();
            }
        }
        format!("{}_{}", self.name, bare)
    }
}

impl fmt::Debug for SubAnalysisSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubAnalysisSpec")
            .field("name", &self.name)
            .field("analysis", &self.analysis.name())
            .finish()
    }
}

#[derive(Debug)]
enum ClassKind {
    Simple { defaults: Vec<BidsDefault> },
    Composite { subs: Vec<SubAnalysisSpec> },
}

/// The immutable declaration of an analysis recipe.
#[derive(Debug)]
pub struct AnalysisClass {
    name: String,
    desc: String,
    kind: ClassKind,
    data_specs: Vec<DataSpec>,
    param_specs: Vec<ParamSpec>,
    pipelines: Vec<PipelineDef>,
}

impl AnalysisClass {
    pub fn simple(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            kind: ClassKind::Simple {
                defaults: Vec::new(),
            },
            data_specs: Vec::new(),
            param_specs: Vec::new(),
            pipelines: Vec::new(),
        }
    }

    pub fn composite(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            kind: ClassKind::Composite { subs: Vec::new() },
            data_specs: Vec::new(),
            param_specs: Vec::new(),
            pipelines: Vec::new(),
        }
    }

    /// Declare a default BIDS input (simple classes only; composite classes
    /// inherit theirs from their sub-analyses).
    pub fn bids_default(mut self, default: impl Into<BidsDefault>) -> Self {
        if let ClassKind::Simple { defaults } = &mut self.kind {
            defaults.push(default.into());
        }
        self
    }

    /// Attach a sub-analysis, flattening its data and parameter specs into
    /// this class's namespace under the sub-analysis prefix.
    pub fn subanalysis(mut self, sub: SubAnalysisSpec) -> Self {
        for spec in sub.analysis().data_specs() {
            let name = sub.apply_prefix(spec.name());
            if self.data_specs.iter().any(|s| s.name() == name) {
                // Name-map alias onto an existing composite spec
                continue;
            }
            let mut flattened = spec.clone();
            flattened.name = name;
            if let DataOrigin::Derived { pipeline } = &mut flattened.origin {
                *pipeline = format!("{}_{}", sub.name(), pipeline);
            }
            self.data_specs.push(flattened);
        }
        for spec in sub.analysis().param_specs() {
            let mut flattened = spec.clone();
            flattened.name = format!("{}_{}", sub.name(), spec.name());
            self.param_specs.push(flattened);
        }
        if let ClassKind::Composite { subs } = &mut self.kind {
            subs.push(sub);
        }
        self
    }

    pub fn data_spec_decl(mut self, spec: DataSpec) -> Self {
        self.data_specs.push(spec);
        self
    }

    pub fn param_spec_decl(mut self, spec: ParamSpec) -> Self {
        self.param_specs.push(spec);
        self
    }

    pub fn pipeline_decl(mut self, name: impl Into<String>, builder: PipelineBuilderFn) -> Self {
        self.pipelines.push(PipelineDef {
            name: name.into(),
            builder,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ClassKind::Composite { .. })
    }

    /// Declared default BIDS inputs; empty for composite classes and for
    /// classes that declare none.
    pub fn default_bids_inputs(&self) -> &[BidsDefault] {
        match &self.kind {
            ClassKind::Simple { defaults } => defaults,
            ClassKind::Composite { .. } => &[],
        }
    }

    /// Sub-analysis specifications; empty for simple classes.
    pub fn subanalyses(&self) -> &[SubAnalysisSpec] {
        match &self.kind {
            ClassKind::Composite { subs } => subs,
            ClassKind::Simple { .. } => &[],
        }
    }

    pub fn data_specs(&self) -> &[DataSpec] {
        &self.data_specs
    }

    pub fn param_specs(&self) -> &[ParamSpec] {
        &self.param_specs
    }

    pub fn data_spec(&self, name: &str) -> Result<&DataSpec> {
        self.data_specs
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::UnknownSpec {
                class: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn param_spec(&self, name: &str) -> Result<&ParamSpec> {
        self.param_specs
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::UnknownParameter {
                class: self.name.clone(),
                name: name.to_string(),
            })
    }

    fn pipeline_def(&self, name: &str) -> Option<&PipelineDef> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    /// Render the class's data and parameter specifications for the `menu`
    /// subcommand.
    pub fn menu(&self) -> String {
        const INDENT: usize = 4;
        const SPACER: usize = 4;

        fn section(out: &mut String, heading: &str, rows: &[(String, String)]) {
            if rows.is_empty() {
                return;
            }
            out.push_str(heading);
            out.push('\n');
            let width = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0) + SPACER;
            for (left, right) in rows {
                out.push_str(&" ".repeat(INDENT));
                out.push_str(left);
                if right.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(&" ".repeat(width - left.len()));
                    out.push_str(right);
                    out.push('\n');
                }
            }
            out.push('\n');
        }

        let mut out = format!("{} - {}\n\n", self.name, self.desc);

        let acquired: Vec<(String, String)> = self
            .data_specs
            .iter()
            .filter(|s| s.is_acquired())
            .map(|s| (format!("{} ({})", s.name(), s.format()), s.desc.clone()))
            .collect();
        section(&mut out, "Acquired data specs:", &acquired);

        let derived: Vec<(String, String)> = self
            .data_specs
            .iter()
            .filter(|s| !s.is_acquired())
            .map(|s| {
                let produced_by = s.pipeline().unwrap_or_default();
                let right = if s.desc.is_empty() {
                    format!("[{produced_by}]")
                } else {
                    format!("[{produced_by}] {}", s.desc)
                };
                (format!("{} ({})", s.name(), s.format()), right)
            })
            .collect();
        section(&mut out, "Derived data specs:", &derived);

        let params: Vec<(String, String)> = self
            .param_specs
            .iter()
            .map(|p| {
                (
                    format!("{} (default: {})", p.name(), p.default()),
                    p.desc.clone(),
                )
            })
            .collect();
        section(&mut out, "Parameters:", &params);

        let subs: Vec<(String, String)> = self
            .subanalyses()
            .iter()
            .map(|s| (s.name().to_string(), s.analysis().name().to_string()))
            .collect();
        section(&mut out, "Sub-analyses:", &subs);

        out
    }
}

/// Additional construction options for an `Analysis`.
#[derive(Default)]
pub struct AnalysisOptions {
    pub inputs: Vec<InputSource>,
    pub parameters: BTreeMap<String, ParamValue>,
    pub task: Option<String>,
    pub subject_ids: Option<Vec<String>>,
    pub visit_ids: Option<Vec<String>>,
}

/// One instantiation of an analysis class against a concrete dataset.
#[derive(Debug)]
pub struct Analysis {
    name: String,
    class: &'static AnalysisClass,
    dataset: Arc<Dataset>,
    processor: Processor,
    environment: Environment,
    inputs: AnalysisInputSet,
    parameters: BTreeMap<String, ParamValue>,
    task: Option<String>,
    subject_ids: Option<Vec<String>>,
    visit_ids: Option<Vec<String>>,
}

impl Analysis {
    /// Instantiate a class. For BIDS datasets the class's default inputs
    /// are resolved and merged under the caller's explicit inputs before
    /// the instance is configured; for any other dataset type the explicit
    /// inputs are used unmodified.
    pub fn new(
        class: &'static AnalysisClass,
        name: impl Into<String>,
        dataset: Dataset,
        processor: Processor,
        environment: Environment,
        options: AnalysisOptions,
    ) -> Result<Self> {
        let dataset = Arc::new(dataset);
        let explicit: Vec<InputSource> = options
            .inputs
            .into_iter()
            .map(|input| input.bound(&dataset))
            .collect();
        let inputs = if dataset.is_bids() {
            let defaults =
                resolver::resolve_defaults(class, options.task.as_deref(), Some(&dataset))?;
            debug!(
                class = class.name(),
                defaults = defaults.len(),
                explicit = explicit.len(),
                "resolved default BIDS inputs"
            );
            resolver::merge_with_explicit(defaults, explicit)
        } else {
            explicit
                .into_iter()
                .map(|input| (input.spec_name().to_string(), input))
                .collect()
        };

        let mut parameters: BTreeMap<String, ParamValue> = class
            .param_specs()
            .iter()
            .map(|spec| (spec.name().to_string(), spec.default().clone()))
            .collect();
        for (name, value) in options.parameters {
            let spec = class.param_spec(&name)?;
            if !spec.default().same_kind(&value) {
                return Err(Error::InvalidParameter {
                    name,
                    value: value.to_string(),
                    expected: spec.default().type_name(),
                });
            }
            parameters.insert(name, value);
        }

        Ok(Self {
            name: name.into(),
            class,
            dataset,
            processor,
            environment,
            inputs,
            parameters,
            task: options.task,
            subject_ids: options.subject_ids,
            visit_ids: options.visit_ids,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &'static AnalysisClass {
        self.class
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn inputs(&self) -> &AnalysisInputSet {
        &self.inputs
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn subject_ids(&self) -> Option<&[String]> {
        self.subject_ids.as_deref()
    }

    pub fn visit_ids(&self) -> Option<&[String]> {
        self.visit_ids.as_deref()
    }

    pub fn parameter(&self, name: &str) -> Result<&ParamValue> {
        self.parameters
            .get(name)
            .ok_or_else(|| Error::UnknownParameter {
                class: self.class.name().to_string(),
                name: name.to_string(),
            })
    }

    /// A parameter value as JSON, for node parameter maps.
    pub fn param_json(&self, name: &str) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.parameter(name)?)?)
    }

    /// Read a boolean branch-selection parameter.
    pub fn switch(&self, name: &str) -> Result<bool> {
        match self.parameter(name)? {
            ParamValue::Bool(value) => Ok(*value),
            other => Err(Error::Usage(format!(
                "parameter '{name}' is not a switch (found {})",
                other.type_name()
            ))),
        }
    }

    /// Build one pipeline by name. For a composite class a prefixed name
    /// resolves to the owning sub-analysis's pipeline, lifted into the
    /// composite namespace.
    pub fn pipeline(&self, name: &str) -> Result<PipelineSpec> {
        if let Some(def) = self.class.pipeline_def(name) {
            let built = (def.builder)(self)?;
            built.validate()?;
            return Ok(built);
        }
        for sub in self.class.subanalyses() {
            let Some(bare) = name.strip_prefix(&format!("{}_", sub.name())) else {
                continue;
            };
            if sub.analysis().pipeline_def(bare).is_none() {
                continue;
            }
            let scoped = self.sub_analysis(sub);
            let built = scoped.pipeline(bare)?;
            let lifted = PipelineSpec {
                name: name.to_string(),
                ..built
            }
            .map_spec_names(|spec| sub.apply_prefix(spec));
            return Ok(lifted);
        }
        Err(Error::UnknownPipeline {
            class: self.class.name().to_string(),
            pipeline: name.to_string(),
        })
    }

    /// The pipelines needed to generate the requested derivatives, each
    /// included once. Requesting an acquired spec is an error.
    pub fn derivation_pipelines(&self, derivatives: &[String]) -> Result<Vec<PipelineSpec>> {
        let mut pipelines: Vec<PipelineSpec> = Vec::new();
        for name in derivatives {
            let spec = self.class.data_spec(name)?;
            let pipeline = spec
                .pipeline()
                .ok_or_else(|| Error::AcquiredSpec(name.clone()))?;
            if pipelines.iter().any(|p| p.name == pipeline) {
                continue;
            }
            debug!(pipeline, derivative = %name, "building pipeline");
            pipelines.push(self.pipeline(pipeline)?);
        }
        Ok(pipelines)
    }

    /// A scoped view of one sub-analysis: its own class, with parameter
    /// overrides pulled down from the composite's prefixed names.
    fn sub_analysis(&self, sub: &SubAnalysisSpec) -> Analysis {
        let parameters = sub
            .analysis()
            .param_specs()
            .iter()
            .map(|spec| {
                let prefixed = format!("{}_{}", sub.name(), spec.name());
                let value = self
                    .parameters
                    .get(&prefixed)
                    .cloned()
                    .unwrap_or_else(|| spec.default().clone());
                (spec.name().to_string(), value)
            })
            .collect();
        Analysis {
            name: format!("{}_{}", self.name, sub.name()),
            class: sub.analysis(),
            dataset: self.dataset.clone(),
            processor: self.processor.clone(),
            environment: self.environment,
            inputs: AnalysisInputSet::new(),
            parameters,
            task: self.task.clone(),
            subject_ids: self.subject_ids.clone(),
            visit_ids: self.visit_ids.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FileFormat;

    fn test_class() -> AnalysisClass {
        AnalysisClass::simple("test", "a class for unit tests")
            .data_spec_decl(DataSpec::acquired("magnitude", FileFormat::NiftiGz))
            .data_spec_decl(DataSpec::derived(
                "brain_mask",
                FileFormat::NiftiGz,
                "brain_extraction",
            ))
            .param_spec_decl(ParamSpec::switch("robust", true))
            .param_spec_decl(
                ParamSpec::new("padding", ParamValue::IntList(vec![12, 12, 12]))
                    .desc("padding in voxels"),
            )
    }

    #[test]
    fn parameter_parsing_follows_declared_type() {
        let class = test_class();
        let spec = class.param_spec("padding").unwrap();
        assert_eq!(
            spec.parse("8, 8, 2").unwrap(),
            ParamValue::IntList(vec![8, 8, 2])
        );
        assert!(spec.parse("eight").is_err());

        let switch = class.param_spec("robust").unwrap();
        assert_eq!(switch.parse("false").unwrap(), ParamValue::Bool(false));
        assert!(switch.parse("0").is_err());
    }

    #[test]
    fn unknown_parameter_is_rejected_at_construction() {
        let class = Box::leak(Box::new(test_class()));
        let err = Analysis::new(
            class,
            "inst",
            Dataset::basic("/data", 0),
            Processor::Single,
            Environment::Static,
            AnalysisOptions {
                parameters: BTreeMap::from([("missing".to_string(), ParamValue::Int(1))]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownParameter { .. }));
    }

    #[test]
    fn parameter_override_must_match_declared_type() {
        let class = Box::leak(Box::new(test_class()));
        let err = Analysis::new(
            class,
            "inst",
            Dataset::basic("/data", 0),
            Processor::Single,
            Environment::Static,
            AnalysisOptions {
                parameters: BTreeMap::from([("robust".to_string(), ParamValue::Int(1))]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn acquired_specs_cannot_be_derived() {
        let class = Box::leak(Box::new(test_class()));
        let analysis = Analysis::new(
            class,
            "inst",
            Dataset::basic("/data", 0),
            Processor::Single,
            Environment::Static,
            AnalysisOptions::default(),
        )
        .unwrap();
        let err = analysis
            .derivation_pipelines(&["magnitude".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::AcquiredSpec(name) if name == "magnitude"));
    }

    #[test]
    fn menu_lists_specs_and_parameters() {
        let menu = test_class().menu();
        assert!(menu.contains("Acquired data specs:"));
        assert!(menu.contains("magnitude (nifti_gz)"));
        assert!(menu.contains("[brain_extraction]"));
        assert!(menu.contains("padding (default: 12,12,12)"));
    }
}
