use serde::{Deserialize, Serialize};
use std::fmt;

/// File formats recognised by the data specifications.
///
/// These name the on-disk representation an acquisition or derivative is
/// expected in; conversion between them is the execution engine's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Gzipped NIfTI image (`.nii.gz`)
    NiftiGz,
    /// DICOM series directory
    Dicom,
    /// MRtrix image (`.mif`)
    MrtrixImage,
    /// Directory of per-channel gzipped NIfTI images
    MultiNiftiGz,
    /// FSL-style text transformation matrix
    TextMatrix,
    /// Gradient encoding table (FSL bvec/bval pair)
    FslGrad,
    /// Scalar or array field stored as JSON
    Json,
    /// Plain text
    Text,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::NiftiGz => "nifti_gz",
            FileFormat::Dicom => "dicom",
            FileFormat::MrtrixImage => "mrtrix_image",
            FileFormat::MultiNiftiGz => "multi_nifti_gz",
            FileFormat::TextMatrix => "text_matrix",
            FileFormat::FslGrad => "fsl_grad",
            FileFormat::Json => "json",
            FileFormat::Text => "text",
        };
        write!(f, "{name}")
    }
}
