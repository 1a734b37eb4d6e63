//! Static registry of the analysis classes this build knows about.

use crate::analysis::{bold, dwi, mri, t1, t2star, veins, AnalysisClass};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

static REGISTRY: Lazy<BTreeMap<&'static str, &'static AnalysisClass>> = Lazy::new(|| {
    let classes = [
        mri::class(),
        t1::class(),
        t2star::class(),
        bold::class(),
        dwi::class(),
        veins::class(),
    ];
    classes.into_iter().map(|c| (c.name(), c)).collect()
});

/// Look up an analysis class by its registered name.
pub fn resolve(name: &str) -> Result<&'static AnalysisClass> {
    REGISTRY
        .get(name)
        .copied()
        .ok_or_else(|| Error::UnknownAnalysis(name.to_string()))
}

/// All registered classes, in name order.
pub fn all() -> impl Iterator<Item = &'static AnalysisClass> {
    REGISTRY.values().copied()
}
