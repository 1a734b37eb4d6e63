//! Diffusion-weighted recipe: MRtrix preprocessing and tensor metrics.

use crate::analysis::{Analysis, AnalysisClass, DataSpec, ParamSpec, ParamValue};
use crate::bids::{BidsAssocInput, BidsInput};
use crate::error::Result;
use crate::format::FileFormat;
use crate::pipeline::{citations, mrtrix3, NodeSpec, PipelineBuilder, PipelineSpec, Toolkit};
use once_cell::sync::Lazy;
use serde_json::json;

static DWI: Lazy<AnalysisClass> = Lazy::new(|| {
    let series = BidsInput::new("series", "dwi", "dwi", FileFormat::NiftiGz);
    AnalysisClass::simple("dwi", "Diffusion-weighted analysis")
        .bids_default(series.clone())
        .bids_default(BidsAssocInput::new(
            "grad_dirs",
            "bvec",
            FileFormat::FslGrad,
            series.clone(),
        ))
        .bids_default(BidsAssocInput::new(
            "bvalues",
            "bval",
            FileFormat::Text,
            series,
        ))
        .data_spec_decl(
            DataSpec::acquired("series", FileFormat::NiftiGz).desc("Diffusion-weighted series"),
        )
        .data_spec_decl(
            DataSpec::acquired("grad_dirs", FileFormat::FslGrad)
                .desc("Gradient directions, FSL bvec convention"),
        )
        .data_spec_decl(DataSpec::acquired("bvalues", FileFormat::Text).desc("b-values per volume"))
        .data_spec_decl(
            DataSpec::derived("brain_mask", FileFormat::NiftiGz, "brain_mask_pipeline")
                .desc("Whole-brain mask estimated from the diffusion signal"),
        )
        .data_spec_decl(
            DataSpec::derived("preprocessed", FileFormat::MrtrixImage, "preprocess_pipeline")
                .desc("Denoised, distortion-corrected series"),
        )
        .data_spec_decl(DataSpec::derived(
            "tensor",
            FileFormat::MrtrixImage,
            "tensor_pipeline",
        ))
        .data_spec_decl(
            DataSpec::derived("fa", FileFormat::NiftiGz, "tensor_metrics_pipeline")
                .desc("Fractional anisotropy"),
        )
        .data_spec_decl(
            DataSpec::derived("adc", FileFormat::NiftiGz, "tensor_metrics_pipeline")
                .desc("Apparent diffusion coefficient"),
        )
        .param_spec_decl(
            ParamSpec::new("pe_dir", ParamValue::Str("AP".to_string()))
                .desc("Phase-encoding direction of the acquisition"),
        )
        .pipeline_decl("brain_mask_pipeline", brain_mask_pipeline)
        .pipeline_decl("preprocess_pipeline", preprocess_pipeline)
        .pipeline_decl("tensor_pipeline", tensor_pipeline)
        .pipeline_decl("tensor_metrics_pipeline", tensor_metrics_pipeline)
});

pub fn class() -> &'static AnalysisClass {
    &DWI
}

fn brain_mask_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder =
        PipelineBuilder::new("brain_mask_pipeline", "Estimate a brain mask from the DW signal")
            .cite(citations::MRTRIX);

    builder.add(
        NodeSpec::new("dwi2mask", Toolkit::Mrtrix, "dwi2mask")
            .input("series", "in_file", FileFormat::NiftiGz)
            .input("grad_dirs", "fslgrad_bvecs", FileFormat::FslGrad)
            .input("bvalues", "fslgrad_bvals", FileFormat::Text)
            .output("out_file", "brain_mask", FileFormat::NiftiGz)
            .require(mrtrix3())
            .wall_time(10)
            .memory(8000),
    );

    Ok(builder.build())
}

/// PCA denoising followed by eddy/topup correction via dwifslpreproc.
fn preprocess_pipeline(analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "preprocess_pipeline",
        "Denoise and distortion-correct the DW series",
    )
    .cite(citations::MRTRIX)
    .cite(citations::FSL);

    let denoise = builder.add(
        NodeSpec::new("denoise", Toolkit::Mrtrix, "dwidenoise")
            .input("series", "in_file", FileFormat::NiftiGz)
            .require(mrtrix3())
            .wall_time(30)
            .memory(16000),
    );

    builder.add(
        NodeSpec::new("preproc", Toolkit::Mrtrix, "dwifslpreproc")
            .param("pe_dir", analysis.param_json("pe_dir")?)
            .param("rpe", json!("none"))
            .input("grad_dirs", "fslgrad_bvecs", FileFormat::FslGrad)
            .input("bvalues", "fslgrad_bvals", FileFormat::Text)
            .internal(&denoise, "out_file", "in_file")
            .output("out_file", "preprocessed", FileFormat::MrtrixImage)
            .require(mrtrix3())
            .wall_time(120)
            .memory(16000),
    );

    Ok(builder.build())
}

fn tensor_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new("tensor_pipeline", "Fit the diffusion tensor")
        .cite(citations::MRTRIX);

    builder.add(
        NodeSpec::new("dwi2tensor", Toolkit::Mrtrix, "dwi2tensor")
            .input("preprocessed", "in_file", FileFormat::MrtrixImage)
            .input("brain_mask", "in_mask", FileFormat::NiftiGz)
            .output("out_file", "tensor", FileFormat::MrtrixImage)
            .require(mrtrix3())
            .wall_time(15)
            .memory(8000),
    );

    Ok(builder.build())
}

fn tensor_metrics_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder =
        PipelineBuilder::new("tensor_metrics_pipeline", "Scalar metrics from the tensor fit")
            .cite(citations::MRTRIX);

    builder.add(
        NodeSpec::new("tensor2metric", Toolkit::Mrtrix, "tensor2metric")
            .input("tensor", "in_file", FileFormat::MrtrixImage)
            .input("brain_mask", "in_mask", FileFormat::NiftiGz)
            .output("fa", "fa", FileFormat::NiftiGz)
            .output("adc", "adc", FileFormat::NiftiGz)
            .require(mrtrix3())
            .wall_time(10)
            .memory(8000),
    );

    Ok(builder.build())
}
