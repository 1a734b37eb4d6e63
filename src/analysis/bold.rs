//! BOLD functional recipe.
//!
//! Functional series are the one place the task filter matters: the
//! default input only matches runs of the bound task, and an analysis may
//! pin a task explicitly when the dataset holds several.

use crate::analysis::{mri, Analysis, AnalysisClass, DataSpec};
use crate::bids::BidsInput;
use crate::error::Result;
use crate::format::FileFormat;
use crate::pipeline::{citations, fsl5, NodeSpec, PipelineBuilder, PipelineSpec, Toolkit};
use once_cell::sync::Lazy;
use serde_json::json;

static BOLD: Lazy<AnalysisClass> = Lazy::new(|| {
    AnalysisClass::simple("bold", "BOLD functional analysis")
        .bids_default(BidsInput::new("series", "func", "bold", FileFormat::NiftiGz))
        .data_spec_decl(
            DataSpec::acquired("series", FileFormat::NiftiGz).desc("4D BOLD time series"),
        )
        .data_spec_decl(
            DataSpec::derived("preprocessed", FileFormat::NiftiGz, "moco_pipeline")
                .desc("Motion-corrected time series"),
        )
        .data_spec_decl(
            DataSpec::derived("moco_mats", FileFormat::TextMatrix, "moco_pipeline")
                .desc("Per-volume motion-correction transforms"),
        )
        .data_spec_decl(
            DataSpec::derived("magnitude", FileFormat::NiftiGz, "mean_pipeline")
                .desc("Temporal mean of the corrected series"),
        )
        .data_spec_decl(mri::brain_spec())
        .data_spec_decl(mri::brain_mask_spec())
        .param_spec_decl(mri::robust_param())
        .param_spec_decl(mri::f_threshold_param())
        .pipeline_decl("moco_pipeline", moco_pipeline)
        .pipeline_decl("mean_pipeline", mean_pipeline)
        .pipeline_decl("brain_extraction_pipeline", mri::brain_extraction_pipeline)
});

pub fn class() -> &'static AnalysisClass {
    &BOLD
}

/// Volume-to-volume motion correction with MCFLIRT.
fn moco_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder =
        PipelineBuilder::new("moco_pipeline", "Motion-correct the BOLD series").cite(citations::FSL);

    builder.add(
        NodeSpec::new("mcflirt", Toolkit::Fsl, "MCFLIRT")
            .param("save_mats", json!(true))
            .param("cost", json!("mutualinfo"))
            .input("series", "in_file", FileFormat::NiftiGz)
            .output("out_file", "preprocessed", FileFormat::NiftiGz)
            .output("mat_file", "moco_mats", FileFormat::TextMatrix)
            .require(fsl5())
            .wall_time(30)
            .memory(8000),
    );

    Ok(builder.build())
}

/// Temporal mean, which stands in for the magnitude image the shared
/// brain extraction expects.
fn mean_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder =
        PipelineBuilder::new("mean_pipeline", "Average the corrected series over time")
            .cite(citations::FSL);

    builder.add(
        NodeSpec::new("tmean", Toolkit::Fsl, "MeanImage")
            .param("dimension", json!("T"))
            .input("preprocessed", "in_file", FileFormat::NiftiGz)
            .output("out_file", "magnitude", FileFormat::NiftiGz)
            .require(fsl5())
            .wall_time(5)
            .memory(4000),
    );

    Ok(builder.build())
}
