//! Resolution of default BIDS inputs at analysis construction.
//!
//! When an analysis is instantiated against a BIDS dataset its class's
//! declared default inputs are copied, task- and repository-bound, prefixed
//! where a sub-analysis owns them, and merged with the caller's explicit
//! inputs. The class declarations themselves are never mutated, so the
//! functions here can be called any number of times with different
//! arguments against the same class.

use crate::analysis::AnalysisClass;
use crate::bids::BidsDefault;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::input::{AnalysisInputSet, InputSource};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Produce the mapping of spec name to bound default input for a class.
///
/// For a composite class every sub-analysis default is inserted under the
/// sub-analysis's prefixing of its bare name, and an associated input's
/// primary back-reference is re-pointed at the prefixed primary name
/// beforehand. A prefixed-name collision is a configuration error and is
/// rejected rather than silently dropping an entry.
pub fn resolve_defaults(
    class: &AnalysisClass,
    task: Option<&str>,
    repository: Option<&Arc<Dataset>>,
) -> Result<BTreeMap<String, BidsDefault>> {
    let mut defaults: BTreeMap<String, BidsDefault> = BTreeMap::new();
    if class.is_composite() {
        for sub in class.subanalyses() {
            for default in sub.analysis().default_bids_inputs() {
                let default = match default {
                    BidsDefault::Assoc(assoc) => BidsDefault::Assoc(
                        assoc.with_prefixed_primary(sub.apply_prefix(assoc.primary().spec_name())),
                    ),
                    primary => primary.clone(),
                };
                let key = sub.apply_prefix(default.spec_name());
                if defaults.insert(key.clone(), default).is_some() {
                    return Err(Error::DuplicateInput(key));
                }
            }
        }
    } else {
        for default in class.default_bids_inputs() {
            let key = default.spec_name().to_string();
            if defaults.insert(key.clone(), default.clone()).is_some() {
                return Err(Error::DuplicateInput(key));
            }
        }
    }
    // Uniform task/repository binding over the flattened mapping. Each
    // entry is a fresh copy; the class declarations stay as they were.
    Ok(defaults
        .into_iter()
        .map(|(name, default)| {
            let bound = default.bound(task, repository);
            (name, bound)
        })
        .collect())
}

/// Shallow-merge explicit inputs over resolved defaults.
///
/// An explicit entry wins outright on any name collision; no field-level
/// merging is attempted. Only performed for BIDS datasets; for other
/// dataset types the caller skips the defaults step entirely.
pub fn merge_with_explicit(
    defaults: BTreeMap<String, BidsDefault>,
    explicit: impl IntoIterator<Item = InputSource>,
) -> AnalysisInputSet {
    let mut merged: AnalysisInputSet = defaults
        .into_iter()
        .map(|(name, default)| (name, InputSource::Default(default)))
        .collect();
    for input in explicit {
        merged.insert(input.spec_name().to_string(), input);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SubAnalysisSpec;
    use crate::bids::{BidsAssocInput, BidsInput};
    use crate::format::FileFormat;
    use crate::input::FilesetFilter;
    use once_cell::sync::Lazy;

    fn simple_class() -> AnalysisClass {
        AnalysisClass::simple("func", "functional test class")
            .bids_default(BidsInput::new("series", "func", "bold", FileFormat::NiftiGz))
            .bids_default(
                BidsInput::new("fieldmap", "fmap", "phasediff", FileFormat::NiftiGz)
                    .with_task("rest"),
            )
    }

    static SUB1: Lazy<AnalysisClass> = Lazy::new(|| {
        AnalysisClass::simple("sub1", "first sub-analysis")
            .bids_default(BidsInput::new("mag", "anat", "T1w", FileFormat::NiftiGz))
            .bids_default(BidsInput::new("mask", "anat", "mask", FileFormat::NiftiGz))
    });

    static SUB2: Lazy<AnalysisClass> = Lazy::new(|| {
        let mag = BidsInput::new("mag", "anat", "T2starw", FileFormat::NiftiGz);
        AnalysisClass::simple("sub2", "second sub-analysis")
            .bids_default(mag.clone())
            .bids_default(BidsAssocInput::new("header", "json", FileFormat::Json, mag))
            .bids_default(BidsInput::new("mask", "anat", "mask", FileFormat::NiftiGz))
    });

    fn composite_class() -> AnalysisClass {
        AnalysisClass::composite("bar", "composite test class")
            .subanalysis(SubAnalysisSpec::new("a", &SUB1))
            .subanalysis(SubAnalysisSpec::new("b", &SUB2))
    }

    #[test]
    fn no_defaults_yields_empty_mapping() {
        let class = AnalysisClass::simple("foo", "no defaults declared");
        let resolved = resolve_defaults(&class, None, None).unwrap();
        assert!(resolved.is_empty());

        let explicit = FilesetFilter::new("x", "x_scan", FileFormat::NiftiGz);
        let merged = merge_with_explicit(resolved, [explicit.clone().into()]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get("x"), Some(&InputSource::Fileset(explicit)));
    }

    #[test]
    fn declared_defaults_are_never_mutated() {
        let class = simple_class();
        let before = class.default_bids_inputs().to_vec();
        let first = resolve_defaults(&class, Some("rest"), None).unwrap();
        let second = resolve_defaults(&class, Some("motor"), None).unwrap();
        assert_eq!(class.default_bids_inputs(), &before[..]);
        assert_eq!(first["series"].task(), Some("rest"));
        assert_eq!(second["series"].task(), Some("motor"));
    }

    #[test]
    fn supplied_task_never_overrides_preset_filter() {
        let class = simple_class();
        let resolved = resolve_defaults(&class, Some("motor"), None).unwrap();
        assert_eq!(resolved["series"].task(), Some("motor"));
        assert_eq!(resolved["fieldmap"].task(), Some("rest"));

        let unfiltered = resolve_defaults(&class, None, None).unwrap();
        assert_eq!(unfiltered["series"].task(), None);
        assert_eq!(unfiltered["fieldmap"].task(), Some("rest"));
    }

    #[test]
    fn repository_binding_is_per_call() {
        let class = simple_class();
        let repo = Arc::new(Dataset::bids("/data/study"));
        let bound = resolve_defaults(&class, None, Some(&repo)).unwrap();
        assert_eq!(bound["series"].repository(), Some(&repo));
        let unbound = resolve_defaults(&class, None, None).unwrap();
        assert_eq!(unbound["series"].repository(), None);
    }

    #[test]
    fn explicit_inputs_take_precedence() {
        let class = simple_class();
        let defaults = resolve_defaults(&class, None, None).unwrap();
        let overriding = FilesetFilter::new("series", "ep2d_bold.*", FileFormat::NiftiGz)
            .regex()
            .unwrap();
        let merged = merge_with_explicit(defaults, [overriding.clone().into()]);
        assert_eq!(
            merged.get("series"),
            Some(&InputSource::Fileset(overriding))
        );
        // Non-colliding defaults are kept as-is
        assert!(matches!(merged.get("fieldmap"), Some(InputSource::Default(_))));
    }

    #[test]
    fn sub_analysis_prefixes_disambiguate() {
        let class = composite_class();
        let resolved = resolve_defaults(&class, None, None).unwrap();
        let names: Vec<&str> = resolved.keys().map(String::as_str).collect();
        assert_eq!(names, ["a_mag", "a_mask", "b_header", "b_mag", "b_mask"]);
    }

    #[test]
    fn assoc_primary_reference_is_reprefixed() {
        let class = composite_class();
        let resolved = resolve_defaults(&class, None, None).unwrap();
        match &resolved["b_header"] {
            BidsDefault::Assoc(assoc) => {
                assert_eq!(assoc.prefixed_primary_name(), "b_mag");
                // The sub-class's own declaration keeps the bare name
                match &SUB2.default_bids_inputs()[1] {
                    BidsDefault::Assoc(declared) => {
                        assert_eq!(declared.prefixed_primary_name(), "mag")
                    }
                    other => unreachable!("unexpected default: {other:?}"),
                }
            }
            other => unreachable!("unexpected default: {other:?}"),
        }
    }

    #[test]
    fn composite_entries_are_independent_copies() {
        let class = composite_class();
        let resolved = resolve_defaults(&class, Some("rest"), None).unwrap();
        assert_eq!(resolved["a_mag"].task(), Some("rest"));
        assert_eq!(SUB1.default_bids_inputs()[0].task(), None);
    }

    #[test]
    fn colliding_prefixed_names_are_rejected() {
        // A name map that funnels sub2's 'mask' onto sub1's prefixed name
        let class = AnalysisClass::composite("clash", "misconfigured composite")
            .subanalysis(SubAnalysisSpec::new("a", &SUB1))
            .subanalysis(SubAnalysisSpec::new("b", &SUB2).map_name("mask", "a_mask"));
        let err = resolve_defaults(&class, None, None).unwrap_err();
        assert!(matches!(err, Error::DuplicateInput(name) if name == "a_mask"));
    }

    #[test]
    fn duplicate_names_within_simple_class_are_rejected() {
        let class = AnalysisClass::simple("dup", "duplicate declaration")
            .bids_default(BidsInput::new("mag", "anat", "T1w", FileFormat::NiftiGz))
            .bids_default(BidsInput::new("mag", "anat", "T2w", FileFormat::NiftiGz));
        let err = resolve_defaults(&class, None, None).unwrap_err();
        assert!(matches!(err, Error::DuplicateInput(name) if name == "mag"));
    }
}
