//! Default BIDS input declarations.
//!
//! Analysis classes declare the standard acquisitions they expect as
//! `BidsInput` records. The records are immutable templates: every
//! per-instantiation specialisation (task filter, repository binding,
//! sub-analysis prefixing) goes through a builder method that returns a new
//! value, so the class-level declarations are never touched.

use crate::dataset::Dataset;
use crate::format::FileFormat;
use serde::Serialize;
use std::sync::Arc;

/// A class-declared expectation of a standard BIDS acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidsInput {
    spec_name: String,
    /// BIDS datatype directory (`anat`, `func`, `dwi`, `fmap`).
    modality: String,
    /// BIDS suffix (`T1w`, `bold`, `dwi`, ...).
    suffix: String,
    format: FileFormat,
    /// Optional scan-task filter (functional run label).
    task: Option<String>,
    #[serde(skip)]
    repository: Option<Arc<Dataset>>,
}

impl BidsInput {
    pub fn new(
        spec_name: impl Into<String>,
        modality: impl Into<String>,
        suffix: impl Into<String>,
        format: FileFormat,
    ) -> Self {
        Self {
            spec_name: spec_name.into(),
            modality: modality.into(),
            suffix: suffix.into(),
            format,
            task: None,
            repository: None,
        }
    }

    /// Preset the task filter at declaration time. A preset filter is never
    /// overridden by the task passed at instantiation.
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    pub fn modality(&self) -> &str {
        &self.modality
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn repository(&self) -> Option<&Arc<Dataset>> {
        self.repository.as_ref()
    }

    /// Return a copy bound to an instantiation context: the task filter is
    /// filled only if unset, the repository reference is always replaced.
    pub(crate) fn bound(&self, task: Option<&str>, repository: Option<&Arc<Dataset>>) -> Self {
        let mut bound = self.clone();
        if bound.task.is_none() {
            bound.task = task.map(str::to_owned);
        }
        bound.repository = repository.cloned();
        bound
    }
}

/// An input acquired alongside a primary acquisition (sidecar JSON,
/// gradient tables, phase images).
///
/// In a composite analysis the primary lives under the owning
/// sub-analysis's prefix, so the back-reference is kept as a
/// `prefixed_primary_name` that the resolver recomputes when flattening.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidsAssocInput {
    spec_name: String,
    /// Association kind (`json`, `bvec`, `bval`, `phase`).
    kind: String,
    format: FileFormat,
    primary: BidsInput,
    prefixed_primary_name: Option<String>,
    task: Option<String>,
    #[serde(skip)]
    repository: Option<Arc<Dataset>>,
}

impl BidsAssocInput {
    pub fn new(
        spec_name: impl Into<String>,
        kind: impl Into<String>,
        format: FileFormat,
        primary: BidsInput,
    ) -> Self {
        Self {
            spec_name: spec_name.into(),
            kind: kind.into(),
            format,
            primary,
            prefixed_primary_name: None,
            task: None,
            repository: None,
        }
    }

    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn primary(&self) -> &BidsInput {
        &self.primary
    }

    /// The primary's name as it appears after sub-analysis prefixing, or
    /// the bare name when the input is used outside a composite.
    pub fn prefixed_primary_name(&self) -> &str {
        self.prefixed_primary_name
            .as_deref()
            .unwrap_or_else(|| self.primary.spec_name())
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn repository(&self) -> Option<&Arc<Dataset>> {
        self.repository.as_ref()
    }

    /// Return a copy whose primary back-reference points at the prefixed
    /// name of the owning sub-analysis's primary input.
    pub(crate) fn with_prefixed_primary(&self, prefixed: String) -> Self {
        let mut copy = self.clone();
        copy.prefixed_primary_name = Some(prefixed);
        copy
    }

    pub(crate) fn bound(&self, task: Option<&str>, repository: Option<&Arc<Dataset>>) -> Self {
        let mut bound = self.clone();
        if bound.task.is_none() {
            bound.task = task.map(str::to_owned);
        }
        bound.repository = repository.cloned();
        bound
    }
}

/// Either kind of class-declared default input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BidsDefault {
    Primary(BidsInput),
    Assoc(BidsAssocInput),
}

impl BidsDefault {
    pub fn spec_name(&self) -> &str {
        match self {
            BidsDefault::Primary(i) => i.spec_name(),
            BidsDefault::Assoc(i) => i.spec_name(),
        }
    }

    pub fn task(&self) -> Option<&str> {
        match self {
            BidsDefault::Primary(i) => i.task(),
            BidsDefault::Assoc(i) => i.task(),
        }
    }

    pub fn repository(&self) -> Option<&Arc<Dataset>> {
        match self {
            BidsDefault::Primary(i) => i.repository(),
            BidsDefault::Assoc(i) => i.repository(),
        }
    }

    pub(crate) fn bound(&self, task: Option<&str>, repository: Option<&Arc<Dataset>>) -> Self {
        match self {
            BidsDefault::Primary(i) => BidsDefault::Primary(i.bound(task, repository)),
            BidsDefault::Assoc(i) => BidsDefault::Assoc(i.bound(task, repository)),
        }
    }
}

impl From<BidsInput> for BidsDefault {
    fn from(input: BidsInput) -> Self {
        BidsDefault::Primary(input)
    }
}

impl From<BidsAssocInput> for BidsDefault {
    fn from(input: BidsAssocInput) -> Self {
        BidsDefault::Assoc(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_fills_unset_task_only() {
        let declared = BidsInput::new("series", "func", "bold", FileFormat::NiftiGz);
        let bound = declared.bound(Some("rest"), None);
        assert_eq!(bound.task(), Some("rest"));
        // Declaration untouched
        assert_eq!(declared.task(), None);

        let preset = declared.with_task("motor");
        let bound = preset.bound(Some("rest"), None);
        assert_eq!(bound.task(), Some("motor"));
    }

    #[test]
    fn bound_replaces_repository() {
        let repo = Arc::new(Dataset::bids("/data/bids"));
        let declared = BidsInput::new("magnitude", "anat", "T1w", FileFormat::NiftiGz);
        let bound = declared.bound(None, Some(&repo));
        assert_eq!(bound.repository(), Some(&repo));
        assert_eq!(declared.repository(), None);
    }

    #[test]
    fn assoc_primary_name_defaults_to_bare() {
        let primary = BidsInput::new("series", "dwi", "dwi", FileFormat::NiftiGz);
        let assoc = BidsAssocInput::new("grad_dirs", "bvec", FileFormat::FslGrad, primary);
        assert_eq!(assoc.prefixed_primary_name(), "series");
        let prefixed = assoc.with_prefixed_primary("dwi_series".to_string());
        assert_eq!(prefixed.prefixed_primary_name(), "dwi_series");
        assert_eq!(assoc.prefixed_primary_name(), "series");
    }
}
