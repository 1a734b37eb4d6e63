//! Explicit input filters and the per-instance input set.

use crate::bids::BidsDefault;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::format::FileFormat;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A caller-supplied pattern selecting a file-set acquisition by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilesetFilter {
    spec_name: String,
    pattern: String,
    is_regex: bool,
    format: FileFormat,
    #[serde(skip)]
    dataset: Option<Arc<Dataset>>,
}

impl FilesetFilter {
    pub fn new(
        spec_name: impl Into<String>,
        pattern: impl Into<String>,
        format: FileFormat,
    ) -> Self {
        Self {
            spec_name: spec_name.into(),
            pattern: pattern.into(),
            is_regex: false,
            format,
            dataset: None,
        }
    }

    /// Match the pattern as a regular expression instead of a glob. The
    /// pattern is compiled here so a bad expression fails before it
    /// reaches a plan.
    pub fn regex(mut self) -> Result<Self> {
        compile_pattern(&self.pattern)?;
        self.is_regex = true;
        Ok(self)
    }

    pub fn with_dataset(mut self, dataset: Arc<Dataset>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn dataset(&self) -> Option<&Arc<Dataset>> {
        self.dataset.as_ref()
    }

    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_regex(&self) -> bool {
        self.is_regex
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }
}

/// A caller-supplied pattern selecting a scalar field by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFilter {
    spec_name: String,
    pattern: String,
    is_regex: bool,
}

impl FieldFilter {
    pub fn new(spec_name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            spec_name: spec_name.into(),
            pattern: pattern.into(),
            is_regex: false,
        }
    }

    pub fn regex(mut self) -> Result<Self> {
        compile_pattern(&self.pattern)?;
        self.is_regex = true;
        Ok(self)
    }

    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// One entry of an analysis instance's input set: either a bound default
/// BIDS input or an explicit filter supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputSource {
    Default(BidsDefault),
    Fileset(FilesetFilter),
    Field(FieldFilter),
}

fn compile_pattern(pattern: &str) -> Result<()> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(())
}

impl InputSource {
    pub fn spec_name(&self) -> &str {
        match self {
            InputSource::Default(d) => d.spec_name(),
            InputSource::Fileset(f) => f.spec_name(),
            InputSource::Field(f) => f.spec_name(),
        }
    }

    /// Attach the dataset an explicit filter is evaluated against. Bound
    /// defaults already carry their repository.
    pub(crate) fn bound(self, dataset: &Arc<Dataset>) -> Self {
        match self {
            InputSource::Fileset(f) => InputSource::Fileset(f.with_dataset(dataset.clone())),
            other => other,
        }
    }
}

impl From<BidsDefault> for InputSource {
    fn from(default: BidsDefault) -> Self {
        InputSource::Default(default)
    }
}

impl From<FilesetFilter> for InputSource {
    fn from(filter: FilesetFilter) -> Self {
        InputSource::Fileset(filter)
    }
}

impl From<FieldFilter> for InputSource {
    fn from(filter: FieldFilter) -> Self {
        InputSource::Field(filter)
    }
}

/// Spec name -> input descriptor, owned by one analysis instance.
pub type AnalysisInputSet = BTreeMap<String, InputSource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_patterns_are_compiled_up_front() {
        let valid = FilesetFilter::new("series", r".*_bold\.nii\.gz", FileFormat::NiftiGz).regex();
        assert!(valid.unwrap().is_regex());

        let err = FilesetFilter::new("series", "*bold", FileFormat::NiftiGz)
            .regex()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { pattern, .. } if pattern == "*bold"));

        assert!(FieldFilter::new("echo_times", "(unclosed").regex().is_err());
    }

    #[test]
    fn binding_attaches_the_dataset_to_fileset_filters() {
        let dataset = Arc::new(Dataset::basic("/data/plain", 1));
        let fileset: InputSource =
            FilesetFilter::new("magnitude", "t1_mprage", FileFormat::NiftiGz).into();
        match fileset.bound(&dataset) {
            InputSource::Fileset(f) => assert_eq!(f.dataset(), Some(&dataset)),
            other => unreachable!("unexpected input source: {other:?}"),
        }

        let field: InputSource = FieldFilter::new("echo_times", "EchoTime").into();
        assert!(matches!(field.bound(&dataset), InputSource::Field(_)));
    }
}
