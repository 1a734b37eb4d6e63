//! Composite vein recipe over a T1 and a T2* acquisition.
//!
//! The T2* side is coregistered to the T1 brain (via the name map), the
//! T1 side carries the atlas registration, and the vein pipelines chain
//! both transforms to bring the atlas priors into T2* space.

use crate::analysis::{t1, t2star, Analysis, AnalysisClass, DataSpec, SubAnalysisSpec};
use crate::error::Result;
use crate::format::FileFormat;
use crate::pipeline::{ants19, citations, matlab2015, NodeSpec, PipelineBuilder, PipelineSpec, Toolkit};
use once_cell::sync::Lazy;
use serde_json::json;

/// Atlas priors warped into subject space by `cv_pipeline`. Each pair is
/// the acquired prior spec and the tool port the composite-vein node reads
/// it on.
const PRIORS: [(&str, &str); 4] = [
    ("qsm_prior", "qsm_prior"),
    ("swi_prior", "swi_prior"),
    ("vein_frequency_prior", "vein_atlas"),
    ("vein_frequency_map", "vein_frequencies"),
];

static T2STAR_T1: Lazy<AnalysisClass> = Lazy::new(|| {
    let mut class = AnalysisClass::composite(
        "t2star_t1",
        "Composite vein analysis over T1 and T2* acquisitions",
    )
    .subanalysis(SubAnalysisSpec::new("t1", t1::class()))
    .subanalysis(
        SubAnalysisSpec::new("t2star", t2star::class()).map_name("coreg_ref_brain", "t1_brain"),
    )
    .data_spec_decl(
        DataSpec::derived("composite_vein_image", FileFormat::NiftiGz, "cv_pipeline")
            .desc("Unthresholded vein likelihood image"),
    )
    .data_spec_decl(
        DataSpec::derived("vein_mask", FileFormat::NiftiGz, "shmrf_pipeline")
            .desc("Binary vein mask"),
    );

    for (name, _) in PRIORS {
        class = class.data_spec_decl(
            DataSpec::acquired(name, FileFormat::NiftiGz)
                .per_dataset()
                .default_atlas(name),
        );
    }

    class
        .pipeline_decl("cv_pipeline", cv_pipeline)
        .pipeline_decl("shmrf_pipeline", shmrf_pipeline)
});

pub fn class() -> &'static AnalysisClass {
    &T2STAR_T1
}

/// Composite vein image from QSM, SWI and the warped atlas priors.
fn cv_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "cv_pipeline",
        "Compute the composite vein image in T2* space",
    )
    .cite(citations::ANTS)
    .cite(citations::MATLAB);

    // SWI comes out of the scanner reconstruction flipped relative to QSM
    let flip_swi = builder.add(
        NodeSpec::new("flip_swi", Toolkit::Matlab, "FlipSWI")
            .input("t2star_swi", "in_file", FileFormat::NiftiGz)
            .input("t2star_qsm", "hdr_file", FileFormat::NiftiGz)
            .require(matlab2015()),
    );

    // Atlas -> T1 -> T2*, applied as one resampling
    let merge_trans = builder.add(
        NodeSpec::new("merge_transforms", Toolkit::Internal, "Merge")
            .param("numinputs", json!(3))
            .input("t2star_coreg_matrix", "in1", FileFormat::TextMatrix)
            .input("t1_coreg_to_atlas_mat", "in2", FileFormat::TextMatrix)
            .input("t1_coreg_to_atlas_warp", "in3", FileFormat::NiftiGz),
    );

    let mut warped = Vec::new();
    for (name, _) in PRIORS {
        warped.push(builder.add(
            NodeSpec::new(format!("apply_trans_{name}"), Toolkit::Ants, "ApplyTransforms")
                .param("interpolation", json!("Linear"))
                .param("invert_transform_flags", json!([true, true, false]))
                .input(name, "input_image", FileFormat::NiftiGz)
                .input("t2star_qsm", "reference_image", FileFormat::NiftiGz)
                .internal(&merge_trans, "out", "transforms")
                .require(ants19())
                .wall_time(30)
                .memory(16000),
        ));
    }

    let mut cv_image = NodeSpec::new("cv_image", Toolkit::Matlab, "CompositeVeinImage")
        .input("t2star_qsm", "qsm", FileFormat::NiftiGz)
        .input("t2star_brain_mask", "mask", FileFormat::NiftiGz)
        .internal(&flip_swi, "out_file", "swi")
        .output("out_file", "composite_vein_image", FileFormat::NiftiGz)
        .require(matlab2015())
        .wall_time(60)
        .memory(16000);
    for (node, (_, port)) in warped.iter().zip(PRIORS) {
        cv_image = cv_image.internal(node, "output_image", port);
    }
    builder.add(cv_image);

    Ok(builder.build())
}

/// Threshold the composite vein image with a spherical-harmonic MRF.
fn shmrf_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder =
        PipelineBuilder::new("shmrf_pipeline", "Segment veins from the composite image")
            .cite(citations::MATLAB);

    builder.add(
        NodeSpec::new("shmrf", Toolkit::Matlab, "ShMRF")
            .input("composite_vein_image", "in_file", FileFormat::NiftiGz)
            .input("t2star_brain_mask", "mask_file", FileFormat::NiftiGz)
            .output("out_file", "vein_mask", FileFormat::NiftiGz)
            .require(matlab2015())
            .wall_time(30)
            .memory(16000),
    );

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisOptions;
    use crate::dataset::Dataset;
    use crate::execute::{Environment, Processor};

    fn instance() -> Analysis {
        Analysis::new(
            class(),
            "veins_test",
            Dataset::basic("/data", 0),
            Processor::Single,
            Environment::Static,
            AnalysisOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn sub_analysis_specs_are_prefixed() {
        let class = class();
        assert!(class.data_spec("t1_brain").is_ok());
        assert!(class.data_spec("t2star_qsm").is_ok());
        assert!(class.data_spec("t2star_brain_mask").is_ok());
        // bare sub names are not visible at the composite level
        assert!(class.data_spec("qsm").is_err());
    }

    #[test]
    fn name_map_aliases_the_coreg_reference() {
        let class = class();
        // the alias resolves to the T1 brain rather than a duplicate spec
        assert!(class.data_spec("t2star_coreg_ref_brain").is_err());
        assert_eq!(
            class.data_spec("t1_brain").unwrap().pipeline(),
            Some("t1_brain_extraction_pipeline"),
        );
    }

    #[test]
    fn sub_parameters_carry_their_prefix() {
        let class = class();
        assert!(class.param_spec("t2star_qsm_dual_echo").is_ok());
        assert!(class.param_spec("t1_bet_robust").is_ok());
        assert!(class.param_spec("qsm_dual_echo").is_err());
    }

    #[test]
    fn sub_pipelines_are_lifted_into_the_composite_namespace() {
        let analysis = instance();
        let pipeline = analysis.pipeline("t2star_qsm_pipeline").unwrap();
        let inputs: Vec<_> = pipeline.input_specs().collect();
        assert!(inputs.contains(&"t2star_brain_mask"));
        assert!(inputs.contains(&"t2star_channel_phases"));
        let outputs: Vec<_> = pipeline.output_specs().collect();
        assert_eq!(outputs, ["t2star_qsm"]);
    }

    #[test]
    fn name_map_redirects_lifted_pipeline_inputs() {
        let analysis = instance();
        let pipeline = analysis.pipeline("t2star_coregistration_pipeline").unwrap();
        let inputs: Vec<_> = pipeline.input_specs().collect();
        assert!(inputs.contains(&"t1_brain"));
        assert!(!inputs.contains(&"t2star_coreg_ref_brain"));
    }

    #[test]
    fn vein_mask_needs_both_vein_pipelines() {
        let analysis = instance();
        let pipelines = analysis
            .derivation_pipelines(&["composite_vein_image".to_string(), "vein_mask".to_string()])
            .unwrap();
        let names: Vec<_> = pipelines.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["cv_pipeline", "shmrf_pipeline"]);
    }

    #[test]
    fn composite_defaults_keep_assoc_primary_references() {
        use crate::bids::BidsDefault;
        use crate::input::InputSource;
        let analysis = instance_bids();
        let header = &analysis.inputs()["t2star_header_image"];
        match header {
            InputSource::Default(BidsDefault::Assoc(assoc)) => {
                assert_eq!(assoc.prefixed_primary_name(), "t2star_channel_mags");
            }
            other => unreachable!("unexpected input source: {other:?}"),
        }
    }

    fn instance_bids() -> Analysis {
        Analysis::new(
            class(),
            "veins_bids_test",
            Dataset::bids("/data/bids"),
            Processor::Single,
            Environment::Static,
            AnalysisOptions::default(),
        )
        .unwrap()
    }
}
