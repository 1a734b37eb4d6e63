use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Unknown analysis class '{0}'")]
    UnknownAnalysis(String),

    #[error("Analysis class '{class}' has no data spec named '{name}'")]
    UnknownSpec { class: String, name: String },

    #[error("Analysis class '{class}' has no parameter named '{name}'")]
    UnknownParameter { class: String, name: String },

    #[error("Invalid value '{value}' for parameter '{name}': expected {expected}")]
    InvalidParameter {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Duplicate input spec name '{0}' after sub-analysis prefixing")]
    DuplicateInput(String),

    #[error("Data spec '{0}' is acquired, not derived; it cannot be generated")]
    AcquiredSpec(String),

    #[error("Analysis class '{class}' has no pipeline named '{pipeline}'")]
    UnknownPipeline { class: String, pipeline: String },

    #[error("Pipeline '{pipeline}' is not fully connected: {reason}")]
    Disconnected { pipeline: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
