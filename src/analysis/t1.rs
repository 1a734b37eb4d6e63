//! T1-weighted structural recipe.
//!
//! Beyond the shared brain extraction this contributes the nonlinear
//! registration to the MNI atlas whose transforms the vein analysis pulls
//! through the composite namespace.

use crate::analysis::{mri, Analysis, AnalysisClass, DataSpec};
use crate::bids::BidsInput;
use crate::error::Result;
use crate::format::FileFormat;
use crate::pipeline::{ants19, citations, NodeSpec, PipelineBuilder, PipelineSpec, Toolkit};
use once_cell::sync::Lazy;
use serde_json::json;

static T1: Lazy<AnalysisClass> = Lazy::new(|| {
    AnalysisClass::simple("t1", "T1-weighted structural analysis")
        .bids_default(BidsInput::new("magnitude", "anat", "T1w", FileFormat::NiftiGz))
        .data_spec_decl(mri::base_magnitude_spec())
        .data_spec_decl(mri::brain_spec())
        .data_spec_decl(mri::brain_mask_spec())
        .data_spec_decl(
            DataSpec::acquired("atlas_template", FileFormat::NiftiGz)
                .per_dataset()
                .default_atlas("MNI152_T1_2mm")
                .desc("Registration target in MNI space"),
        )
        .data_spec_decl(
            DataSpec::derived(
                "coreg_to_atlas_mat",
                FileFormat::TextMatrix,
                "atlas_registration_pipeline",
            )
            .desc("Affine component of the atlas registration"),
        )
        .data_spec_decl(
            DataSpec::derived(
                "coreg_to_atlas_warp",
                FileFormat::NiftiGz,
                "atlas_registration_pipeline",
            )
            .desc("Nonlinear warp to atlas space"),
        )
        .param_spec_decl(mri::robust_param())
        .param_spec_decl(mri::f_threshold_param())
        .pipeline_decl("brain_extraction_pipeline", mri::brain_extraction_pipeline)
        .pipeline_decl("atlas_registration_pipeline", atlas_registration_pipeline)
});

pub fn class() -> &'static AnalysisClass {
    &T1
}

/// Affine + SyN registration of the extracted brain to the atlas template.
fn atlas_registration_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "atlas_registration_pipeline",
        "Register the T1 brain to the MNI atlas",
    )
    .cite(citations::ANTS);

    builder.add(
        NodeSpec::new("atlas_reg", Toolkit::Ants, "Registration")
            .param("transforms", json!(["Affine", "SyN"]))
            .param("metric", json!("MI"))
            .param("shrink_factors", json!([[8, 4, 2], [4, 2, 1]]))
            .input("brain", "moving_image", FileFormat::NiftiGz)
            .input("atlas_template", "fixed_image", FileFormat::NiftiGz)
            .output("out_matrix", "coreg_to_atlas_mat", FileFormat::TextMatrix)
            .output("forward_warp_field", "coreg_to_atlas_warp", FileFormat::NiftiGz)
            .require(ants19())
            .wall_time(90)
            .memory(16000),
    );

    Ok(builder.build())
}
