//! Declarative neuroimaging analysis recipes.
//!
//! Each analysis class describes a processing recipe over an imaging
//! dataset: the data it consumes, the derivatives it can produce, the
//! parameters that steer it and the pipelines connecting them. Classes
//! over BIDS datasets carry default inputs that are resolved at
//! instantiation, so a standard-layout dataset needs no input wiring at
//! all. The crate's output is a derivation plan, a serialized document an
//! external execution engine runs; nothing here touches image data.

pub mod analysis;
pub mod bids;
pub mod dataset;
pub mod error;
pub mod execute;
pub mod format;
pub mod input;
pub mod pipeline;
pub mod resolver;

pub use analysis::{Analysis, AnalysisClass, AnalysisOptions, ParamValue};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use execute::{DerivationPlan, ExecutionBackend, PlanWriter};
