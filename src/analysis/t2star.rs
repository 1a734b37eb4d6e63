//! T2*-weighted recipe: coil-channel preparation and QSM reconstruction.
//!
//! The QSM pipeline follows the STI-Suite processing chain. Dual-echo
//! acquisitions combine the coil channels up front; single-echo
//! acquisitions reconstruct each coil separately and take the median
//! inside the combined mask.

use crate::analysis::{mri, Analysis, AnalysisClass, DataSpec, ParamSpec, ParamValue};
use crate::bids::{BidsAssocInput, BidsInput};
use crate::error::Result;
use crate::format::FileFormat;
use crate::pipeline::{
    citations, fsl5, matlab2015, sti_suite3, NodeSpec, PipelineBuilder, PipelineSpec, Toolkit,
};
use once_cell::sync::Lazy;
use serde_json::json;

static T2STAR: Lazy<AnalysisClass> = Lazy::new(|| {
    let channel_mags = BidsInput::new("channel_mags", "anat", "MEGRE", FileFormat::MultiNiftiGz);
    AnalysisClass::simple("t2star", "T2*-weighted analysis with QSM reconstruction")
        .bids_default(channel_mags.clone())
        .bids_default(BidsInput::new(
            "channel_phases",
            "anat",
            "MEGRE",
            FileFormat::MultiNiftiGz,
        ))
        .bids_default(BidsAssocInput::new(
            "header_image",
            "header",
            FileFormat::Dicom,
            channel_mags,
        ))
        .data_spec_decl(
            DataSpec::acquired("channel_mags", FileFormat::MultiNiftiGz)
                .desc("Magnitude image of each coil channel"),
        )
        .data_spec_decl(
            DataSpec::acquired("channel_phases", FileFormat::MultiNiftiGz)
                .desc("Phase image of each coil channel"),
        )
        .data_spec_decl(
            DataSpec::acquired("header_image", FileFormat::Dicom).desc(
                "Image carrying the header fields the analysis needs (TE, B0, H). \
                 Extracted field values can alternatively be passed as explicit inputs",
            ),
        )
        .data_spec_decl(
            DataSpec::derived("magnitude", FileFormat::NiftiGz, "channel_preparation_pipeline")
                .desc("Combined first-echo magnitude, generated from the separate channels"),
        )
        .data_spec_decl(mri::brain_spec())
        .data_spec_decl(mri::brain_mask_spec())
        .data_spec_decl(
            DataSpec::derived("qsm", FileFormat::NiftiGz, "qsm_pipeline")
                .desc("Quantitative susceptibility image resolved from the T2* coil images"),
        )
        .data_spec_decl(
            DataSpec::derived("swi", FileFormat::NiftiGz, "swi_pipeline")
                .desc("Susceptibility-weighted image"),
        )
        .data_spec_decl(DataSpec::acquired("coreg_ref_brain", FileFormat::NiftiGz).optional())
        .data_spec_decl(DataSpec::derived(
            "coreg_brain",
            FileFormat::NiftiGz,
            "coregistration_pipeline",
        ))
        .data_spec_decl(
            DataSpec::derived("coreg_matrix", FileFormat::TextMatrix, "coregistration_pipeline")
                .desc("Transform from T2* space to the coregistration reference"),
        )
        .data_spec_decl(DataSpec::derived(
            "echo_times",
            FileFormat::Json,
            "header_extraction_pipeline",
        ))
        .data_spec_decl(DataSpec::derived(
            "voxel_sizes",
            FileFormat::Json,
            "header_extraction_pipeline",
        ))
        .data_spec_decl(DataSpec::derived(
            "main_field_strength",
            FileFormat::Json,
            "header_extraction_pipeline",
        ))
        .data_spec_decl(DataSpec::derived(
            "main_field_orient",
            FileFormat::Json,
            "header_extraction_pipeline",
        ))
        .param_spec_decl(mri::robust_param())
        .param_spec_decl(mri::f_threshold_param())
        .param_spec_decl(
            ParamSpec::switch("qsm_dual_echo", false)
                .desc("Combine coil channels before unwrapping (dual-echo acquisitions)"),
        )
        .param_spec_decl(
            ParamSpec::new("qsm_echo", ParamValue::Int(1))
                .desc("Which echo (by index starting at 1) to use when using single echo"),
        )
        .param_spec_decl(ParamSpec::new(
            "qsm_padding",
            ParamValue::IntList(vec![12, 12, 12]),
        ))
        .param_spec_decl(ParamSpec::new(
            "qsm_mask_dilation",
            ParamValue::IntList(vec![11, 11, 11]),
        ))
        .pipeline_decl("brain_extraction_pipeline", mri::brain_extraction_pipeline)
        .pipeline_decl("header_extraction_pipeline", header_extraction_pipeline)
        .pipeline_decl("channel_preparation_pipeline", channel_preparation_pipeline)
        .pipeline_decl("coregistration_pipeline", coregistration_pipeline)
        .pipeline_decl("qsm_pipeline", qsm_pipeline)
        .pipeline_decl("swi_pipeline", swi_pipeline)
});

pub fn class() -> &'static AnalysisClass {
    &T2STAR
}

/// Per-coil files follow the `coil_<coil>_<echo>.nii.gz` convention laid
/// down by the channel-preparation step. The engine's directory listing
/// sorts on the captured coil and echo indices and keeps the selected
/// echo.
const COIL_FNAME_PATTERN: &str = r"^coil_(\d+)_(\d+)\.nii\.gz$";

/// Pull the acquisition fields the QSM maths needs out of the scanner
/// header.
fn header_extraction_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "header_extraction_pipeline",
        "Extract TE, voxel geometry and field information from the header image",
    );

    builder.add(
        NodeSpec::new("header_info_extraction", Toolkit::Internal, "ExtractHeader")
            .input("header_image", "in_file", FileFormat::Dicom)
            .output("echo_times", "echo_times", FileFormat::Json)
            .output("voxel_sizes", "voxel_sizes", FileFormat::Json)
            .output("B0", "main_field_strength", FileFormat::Json)
            .output("H", "main_field_orient", FileFormat::Json),
    );

    Ok(builder.build())
}

/// Combine the separate channel signals into a single magnitude image.
fn channel_preparation_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "channel_preparation_pipeline",
        "Combine separate channel signals into polar form",
    )
    .cite(citations::MATLAB);

    builder.add(
        NodeSpec::new("to_polar", Toolkit::Matlab, "ToPolar")
            .input("channel_mags", "magnitudes_dir", FileFormat::MultiNiftiGz)
            .input("channel_phases", "phases_dir", FileFormat::MultiNiftiGz)
            .output("first_echo", "magnitude", FileFormat::NiftiGz)
            .require(matlab2015())
            .wall_time(30)
            .memory(16000),
    );

    Ok(builder.build())
}

/// Rigid registration of the extracted T2* brain to the coregistration
/// reference (the T1 brain when run inside the vein analysis).
fn coregistration_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "coregistration_pipeline",
        "Register the T2* brain to the coregistration reference",
    )
    .cite(citations::FSL);

    builder.add(
        NodeSpec::new("flirt", Toolkit::Fsl, "FLIRT")
            .param("dof", json!(6))
            .input("brain", "in_file", FileFormat::NiftiGz)
            .input("coreg_ref_brain", "reference", FileFormat::NiftiGz)
            .output("out_file", "coreg_brain", FileFormat::NiftiGz)
            .output("out_matrix_file", "coreg_matrix", FileFormat::TextMatrix)
            .require(fsl5())
            .wall_time(10)
            .memory(8000),
    );

    Ok(builder.build())
}

/// Resolve QSM from the T2* coil images.
///
/// Default STI-Suite values for padding and mask dilation; the dual-echo
/// switch picks between combined-channel and per-coil reconstruction.
fn qsm_pipeline(analysis: &Analysis) -> Result<PipelineSpec> {
    let padding = analysis.param_json("qsm_padding")?;
    let dilation = analysis.param_json("qsm_mask_dilation")?;

    let mut builder = PipelineBuilder::new("qsm_pipeline", "Resolve QSM from T2* coil images")
        .cite(citations::STI_SUITE)
        .cite(citations::FSL)
        .cite(citations::MATLAB);

    let erosion = builder.add(
        NodeSpec::new("mask_erosion", Toolkit::Fsl, "ErodeImage")
            .param("kernel_shape", json!("sphere"))
            .param("kernel_size", json!(2))
            .input("brain_mask", "in_file", FileFormat::NiftiGz)
            .require(fsl5())
            .wall_time(15)
            .memory(12000),
    );

    // With multiple echoes the channel phases can be combined into a single
    // image up front; single-echo sequences run QSM per coil and combine
    // afterwards.
    let qsm = if analysis.switch("qsm_dual_echo")? {
        let channel_combine = builder.add(
            NodeSpec::new("channel_combine", Toolkit::Matlab, "HIPCombineChannels")
                .input("channel_mags", "magnitudes_dir", FileFormat::MultiNiftiGz)
                .input("channel_phases", "phases_dir", FileFormat::MultiNiftiGz)
                .require(matlab2015()),
        );

        let unwrap = builder.add(
            NodeSpec::new("unwrap", Toolkit::StiSuite, "UnwrapPhase")
                .param("padsize", padding.clone())
                .input("voxel_sizes", "voxelsize", FileFormat::Json)
                .internal(&channel_combine, "phase", "in_file")
                .require(sti_suite3()),
        );

        let vsharp = builder.add(
            NodeSpec::new("vsharp", Toolkit::StiSuite, "VSharp")
                .param("mask_manip", json!("imerode({}>0, ball(5))"))
                .input("voxel_sizes", "voxelsize", FileFormat::Json)
                .internal(&unwrap, "out_file", "in_file")
                .internal(&erosion, "out_file", "mask")
                .require(sti_suite3()),
        );

        builder.add(
            NodeSpec::new("qsmrecon", Toolkit::StiSuite, "QSMiLSQR")
                .param("mask_manip", json!("{}>0"))
                .param("padsize", padding)
                .input("voxel_sizes", "voxelsize", FileFormat::Json)
                .input("echo_times", "te", FileFormat::Json)
                .input("main_field_strength", "B0", FileFormat::Json)
                .input("main_field_orient", "H", FileFormat::Json)
                .internal(&vsharp, "out_file", "in_file")
                .internal(&vsharp, "new_mask", "mask")
                .require(sti_suite3()),
        )
    } else {
        let dilate = builder.add(
            NodeSpec::new("mask_dilation", Toolkit::Matlab, "DilateMask")
                .param("dilation", dilation.clone())
                .internal(&erosion, "out_file", "in_file")
                .require(matlab2015()),
        );

        let list_phases = builder.add(
            NodeSpec::new("list_phases", Toolkit::Internal, "ListDir")
                .param("pattern", json!(COIL_FNAME_PATTERN))
                .param("select_echo", analysis.param_json("qsm_echo")?)
                .input("channel_phases", "directory", FileFormat::MultiNiftiGz),
        );

        let list_mags = builder.add(
            NodeSpec::new("list_mags", Toolkit::Internal, "ListDir")
                .param("pattern", json!(COIL_FNAME_PATTERN))
                .param("select_echo", analysis.param_json("qsm_echo")?)
                .input("channel_mags", "directory", FileFormat::MultiNiftiGz),
        );

        let coil_masks = builder.add(
            NodeSpec::new("coil_masks", Toolkit::Matlab, "CoilMask")
                .param("dilation", dilation)
                .internal(&list_mags, "files", "in_file")
                .internal(&dilate, "out_file", "whole_brain_mask")
                .iterfield("in_file")
                .require(matlab2015()),
        );

        let unwrap = builder.add(
            NodeSpec::new("unwrap", Toolkit::StiSuite, "UnwrapPhase")
                .param("padsize", padding.clone())
                .input("voxel_sizes", "voxelsize", FileFormat::Json)
                .internal(&list_phases, "files", "in_file")
                .iterfield("in_file")
                .require(sti_suite3()),
        );

        let vsharp = builder.add(
            NodeSpec::new("vsharp", Toolkit::StiSuite, "VSharp")
                .param("mask_manip", json!("{}>0"))
                .input("voxel_sizes", "voxelsize", FileFormat::Json)
                .internal(&unwrap, "out_file", "in_file")
                .internal(&coil_masks, "out_file", "mask")
                .iterfield("in_file")
                .iterfield("mask")
                .require(sti_suite3()),
        );

        let first_echo = builder.add(
            NodeSpec::new("first_echo", Toolkit::Internal, "Select")
                .param("index", json!(0))
                .input("echo_times", "inlist", FileFormat::Json),
        );

        let coil_qsm = builder.add(
            NodeSpec::new("coil_qsmrecon", Toolkit::StiSuite, "QSMiLSQR")
                .param("mask_manip", json!("{}>0"))
                .param("padsize", padding)
                .input("voxel_sizes", "voxelsize", FileFormat::Json)
                .input("main_field_strength", "B0", FileFormat::Json)
                .input("main_field_orient", "H", FileFormat::Json)
                .internal(&vsharp, "out_file", "in_file")
                .internal(&vsharp, "new_mask", "mask")
                .internal(&first_echo, "out", "te")
                .iterfield("in_file")
                .iterfield("mask")
                .require(sti_suite3()),
        );

        // Combine the per-coil reconstructions by taking the median
        builder.add(
            NodeSpec::new("combine_qsm", Toolkit::Matlab, "MedianInMasks")
                .internal(&coil_qsm, "out_file", "channels")
                .internal(&vsharp, "new_mask", "channel_masks")
                .internal(&dilate, "out_file", "whole_brain_mask")
                .require(matlab2015()),
        )
    };

    builder.add(
        NodeSpec::new("qsm_copy_geometry", Toolkit::Fsl, "CopyGeom")
            .input("header_image", "in_file", FileFormat::Dicom)
            .internal(&qsm, "out_file", "dest_file")
            .output("out_file", "qsm", FileFormat::NiftiGz)
            .require(fsl5())
            .wall_time(5)
            .memory(4000),
    );

    Ok(builder.build())
}

/// Susceptibility-weighted image from the combined magnitude and the
/// channel phases.
fn swi_pipeline(_analysis: &Analysis) -> Result<PipelineSpec> {
    let mut builder = PipelineBuilder::new(
        "swi_pipeline",
        "Calculate susceptibility-weighted image from magnitude and phase",
    )
    .cite(citations::MATLAB);

    builder.add(
        NodeSpec::new("swi", Toolkit::Matlab, "SwiCombine")
            .input("magnitude", "magnitude", FileFormat::NiftiGz)
            .input("channel_phases", "phases_dir", FileFormat::MultiNiftiGz)
            .output("out_file", "swi", FileFormat::NiftiGz)
            .require(matlab2015())
            .wall_time(30)
            .memory(16000),
    );

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analysis, AnalysisOptions};
    use crate::bids::BidsDefault;
    use crate::dataset::Dataset;
    use crate::execute::{Environment, Processor};
    use std::collections::BTreeMap;

    fn instance(parameters: BTreeMap<String, ParamValue>) -> Analysis {
        Analysis::new(
            class(),
            "t2star_test",
            Dataset::basic("/data", 0),
            Processor::Single,
            Environment::Static,
            AnalysisOptions {
                parameters,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn node_names(pipeline: &PipelineSpec) -> Vec<&str> {
        pipeline.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn header_assoc_input_references_channel_mags() {
        let header = class()
            .default_bids_inputs()
            .iter()
            .find(|d| d.spec_name() == "header_image")
            .unwrap();
        match header {
            BidsDefault::Assoc(assoc) => {
                assert_eq!(assoc.primary().spec_name(), "channel_mags");
                assert_eq!(assoc.prefixed_primary_name(), "channel_mags");
            }
            other => unreachable!("unexpected default: {other:?}"),
        }
    }

    #[test]
    fn single_echo_reconstructs_per_coil() {
        let analysis = instance(BTreeMap::new());
        let pipeline = analysis.pipeline("qsm_pipeline").unwrap();
        let names = node_names(&pipeline);
        assert!(names.contains(&"mask_dilation"));
        assert!(names.contains(&"coil_qsmrecon"));
        assert!(names.contains(&"combine_qsm"));
        assert!(!names.contains(&"channel_combine"));
        assert_eq!(*names.last().unwrap(), "qsm_copy_geometry");

        // the listing nodes carry the coil filename convention and echo
        for name in ["list_phases", "list_mags"] {
            let node = pipeline.nodes.iter().find(|n| n.name == name).unwrap();
            assert_eq!(node.params["pattern"], json!(COIL_FNAME_PATTERN));
            assert_eq!(node.params["select_echo"], json!(1));
        }
    }

    #[test]
    fn dual_echo_combines_channels_up_front() {
        let analysis = instance(BTreeMap::from([(
            "qsm_dual_echo".to_string(),
            ParamValue::Bool(true),
        )]));
        let pipeline = analysis.pipeline("qsm_pipeline").unwrap();
        let names = node_names(&pipeline);
        assert!(names.contains(&"channel_combine"));
        assert!(names.contains(&"qsmrecon"));
        assert!(!names.contains(&"combine_qsm"));
        assert!(!names.contains(&"mask_dilation"));
    }

    #[test]
    fn qsm_padding_parameter_reaches_the_nodes() {
        let analysis = instance(BTreeMap::from([(
            "qsm_padding".to_string(),
            ParamValue::IntList(vec![8, 8, 8]),
        )]));
        let pipeline = analysis.pipeline("qsm_pipeline").unwrap();
        let unwrap_node = pipeline.nodes.iter().find(|n| n.name == "unwrap").unwrap();
        assert_eq!(unwrap_node.params["padsize"], json!([8, 8, 8]));
    }

}
