use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A handle describing where an analysis reads its acquisitions from (and
/// writes its derivatives to).
///
/// The descriptor is passed across the execution boundary untouched; no
/// filesystem walking or server access happens in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Dataset {
    /// A BIDS-layout directory. Default inputs are only resolved against
    /// this dataset type.
    Bids { path: PathBuf },
    /// A plain directory tree, `depth` levels of subject/visit nesting.
    Basic { path: PathBuf, depth: u32 },
    /// An XNAT project. Credentials are sourced by the engine, never
    /// recorded in a plan.
    Xnat {
        project: String,
        server: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
}

impl Dataset {
    pub fn bids(path: impl Into<PathBuf>) -> Self {
        Dataset::Bids { path: path.into() }
    }

    pub fn basic(path: impl Into<PathBuf>, depth: u32) -> Self {
        Dataset::Basic {
            path: path.into(),
            depth,
        }
    }

    pub fn xnat(project: impl Into<String>, server: impl Into<String>, user: Option<String>) -> Self {
        Dataset::Xnat {
            project: project.into(),
            server: server.into(),
            user,
        }
    }

    pub fn is_bids(&self) -> bool {
        matches!(self, Dataset::Bids { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Dataset::Bids { .. } => "bids",
            Dataset::Basic { .. } => "basic",
            Dataset::Xnat { .. } => "xnat",
        }
    }
}
