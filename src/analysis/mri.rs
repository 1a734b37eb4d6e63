//! Base MRI recipe: brain extraction shared by the modality classes.

use crate::analysis::{Analysis, AnalysisClass, DataSpec, ParamSpec, ParamValue};
use crate::error::Result;
use crate::format::FileFormat;
use crate::pipeline::{citations, fsl5, NodeSpec, PipelineBuilder, PipelineSpec, Toolkit};
use once_cell::sync::Lazy;
use serde_json::json;

static MRI: Lazy<AnalysisClass> = Lazy::new(|| {
    AnalysisClass::simple("mri", "Generic MRI analysis with whole-brain masking")
        .data_spec_decl(base_magnitude_spec())
        .data_spec_decl(brain_spec())
        .data_spec_decl(brain_mask_spec())
        .data_spec_decl(eroded_mask_spec())
        .param_spec_decl(robust_param())
        .param_spec_decl(f_threshold_param())
        .pipeline_decl("brain_extraction_pipeline", brain_extraction_pipeline)
        .pipeline_decl("mask_erosion_pipeline", mask_erosion_pipeline)
});

pub fn class() -> &'static AnalysisClass {
    &MRI
}

pub(crate) fn base_magnitude_spec() -> DataSpec {
    DataSpec::acquired("magnitude", FileFormat::NiftiGz).desc("Primary magnitude image")
}

pub(crate) fn brain_spec() -> DataSpec {
    DataSpec::derived("brain", FileFormat::NiftiGz, "brain_extraction_pipeline")
        .desc("Magnitude image masked to the brain")
}

pub(crate) fn brain_mask_spec() -> DataSpec {
    DataSpec::derived("brain_mask", FileFormat::NiftiGz, "brain_extraction_pipeline")
        .desc("Whole-brain mask")
}

pub(crate) fn eroded_mask_spec() -> DataSpec {
    DataSpec::derived("eroded_mask", FileFormat::NiftiGz, "mask_erosion_pipeline")
}

pub(crate) fn robust_param() -> ParamSpec {
    ParamSpec::switch("bet_robust", true).desc("Run BET with robust brain-centre estimation")
}

pub(crate) fn f_threshold_param() -> ParamSpec {
    ParamSpec::new("bet_f_threshold", ParamValue::Float(0.5))
        .desc("BET fractional intensity threshold")
}

/// Whole-brain mask from the magnitude image with FSL BET.
pub(crate) fn brain_extraction_pipeline(analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "brain_extraction_pipeline",
        "Generate whole-brain mask from the magnitude image",
    )
    .cite(citations::FSL)
    .cite(citations::BET);

    builder.add(
        NodeSpec::new("bet", Toolkit::Fsl, "bet")
            .param("mask", json!(true))
            .param("robust", analysis.param_json("bet_robust")?)
            .param("frac", analysis.param_json("bet_f_threshold")?)
            .input("magnitude", "in_file", FileFormat::NiftiGz)
            .output("out_file", "brain", FileFormat::NiftiGz)
            .output("mask_file", "brain_mask", FileFormat::NiftiGz)
            .require(fsl5())
            .wall_time(5)
            .memory(4000),
    );

    Ok(builder.build())
}

/// Spherical erosion of the brain mask, used to steady phase processing at
/// the brain edge.
pub(crate) fn mask_erosion_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new("mask_erosion_pipeline", "Erode the whole-brain mask")
        .cite(citations::FSL);

    builder.add(
        NodeSpec::new("mask_erosion", Toolkit::Fsl, "ErodeImage")
            .param("kernel_shape", json!("sphere"))
            .param("kernel_size", json!(2))
            .input("brain_mask", "in_file", FileFormat::NiftiGz)
            .output("out_file", "eroded_mask", FileFormat::NiftiGz)
            .require(fsl5())
            .wall_time(15)
            .memory(12000),
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
            "mri_test",
            Dataset::basic("/data", 0),
            Processor::Single,
            Environment::Static,
            AnalysisOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn brain_extraction_uses_declared_parameters() {
        let pipeline = instance().pipeline("brain_extraction_pipeline").unwrap();
        let bet = &pipeline.nodes[0];
        assert_eq!(bet.tool, "bet");
        assert_eq!(bet.params["robust"], json!(true));
        assert_eq!(bet.params["frac"], json!(0.5));
        assert_eq!(
            pipeline.output_specs().collect::<Vec<_>>(),
            ["brain", "brain_mask"]
        );
    }

    #[test]
    fn both_mask_specs_point_at_one_pipeline() {
        let analysis = instance();
        let pipelines = analysis
            .derivation_pipelines(&["brain".to_string(), "brain_mask".to_string()])
            .unwrap();
        assert_eq!(pipelines.len(), 1);
    }
}
