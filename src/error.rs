//! Error types for petra.
//!
//! Every failure inside the pipeline is returned as an [`Error`]. Callers that
//! only care about success or absence can call `.ok()` on the result; callers
//! that want to distinguish failures use [`Error::kind`].

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Main error type for the petra library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to decode an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The bitmap has no pixel backing, or its buffer disagrees with its geometry.
    #[error("image has no decodable pixel data: {reason}")]
    UndecodableImage { reason: String },

    /// Image dimensions are not supported.
    #[error("unsupported image dimensions {width}x{height}: {reason}")]
    UnsupportedDimensions {
        width: u32,
        height: u32,
        reason: String,
    },

    /// The model artifact could not be compiled.
    #[error("failed to compile model {path}: {reason}")]
    ModelCompile { path: PathBuf, reason: String },

    /// The compiled artifact could not be turned into a session.
    #[error("failed to instantiate compiled model {path}: {reason}")]
    ModelInstantiate { path: PathBuf, reason: String },

    /// Failed to create the directory compiled artifacts are written to.
    #[error("failed to create compile directory {path}: {source}")]
    CompileDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model has no usable image constraint for the requested input slot.
    #[error("model input {slot:?} has no image constraint: {reason}")]
    MissingInputConstraint { slot: String, reason: String },

    /// The same input slot was assigned twice.
    #[error("input slot {slot:?} is already assigned")]
    DuplicateSlot { slot: String },

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Model inference failed inside ONNX Runtime.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// The model rejected its input or failed without a runtime error value.
    #[error("model inference failed: {reason}")]
    InferenceRejected { reason: String },

    /// The requested output slot is absent or not an image buffer.
    #[error("model output {slot:?} is malformed: {reason}")]
    MalformedOutput { slot: String, reason: String },

    /// No style with the requested name is known.
    #[error("unknown style {name:?} (available: {})", .available.join(", "))]
    UnknownStyle {
        name: String,
        available: Vec<String>,
    },

    /// Failed to read a directory of style models.
    #[error("failed to read style directory {path}: {source}")]
    StyleDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Failed to read a configuration file.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The background worker ended without delivering a result.
    #[error("stylization worker lost: {reason}")]
    WorkerLost { reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Malformed or missing model artifact.
    ModelCompile,
    /// Compiled artifact unusable.
    ModelInstantiate,
    /// Missing or incompatible input constraint metadata.
    MissingInputConstraint,
    /// Source image without pixel backing.
    UndecodableImage,
    /// Input tensor does not satisfy the constraint.
    InputTensorConstruction,
    /// Internal model error or resource exhaustion.
    InferenceRuntime,
    /// Output slot missing or malformed.
    MalformedOutput,
    /// No style model with the requested name.
    UnknownStyle,
    /// Configuration file unreadable or values out of range.
    InvalidConfig,
    /// Image file could not be read or written.
    ImageIo,
    /// Filesystem failure outside image and config files, such as listing styles.
    Io,
    /// The worker ended without delivering a result.
    WorkerLost,
}

impl FailureKind {
    /// The pipeline stage this kind of failure occurs in, if it belongs to one.
    #[must_use]
    pub const fn stage(self) -> Option<Stage> {
        match self {
            Self::ModelCompile | Self::ModelInstantiate => Some(Stage::Loading),
            Self::MissingInputConstraint | Self::UndecodableImage => Some(Stage::Adapting),
            Self::InputTensorConstruction => Some(Stage::AssemblingInput),
            Self::InferenceRuntime => Some(Stage::RunningInference),
            Self::MalformedOutput => Some(Stage::DecodingOutput),
            Self::UnknownStyle
            | Self::InvalidConfig
            | Self::ImageIo
            | Self::Io
            | Self::WorkerLost => None,
        }
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::ModelCompile { .. } | Self::CompileDir { .. } => FailureKind::ModelCompile,
            Self::ModelInstantiate { .. } => FailureKind::ModelInstantiate,
            Self::MissingInputConstraint { .. } => FailureKind::MissingInputConstraint,
            Self::UndecodableImage { .. } | Self::UnsupportedDimensions { .. } => {
                FailureKind::UndecodableImage
            }
            Self::DuplicateSlot { .. } | Self::ShapeMismatch { .. } => {
                FailureKind::InputTensorConstruction
            }
            Self::Inference { .. } | Self::InferenceRejected { .. } => {
                FailureKind::InferenceRuntime
            }
            Self::MalformedOutput { .. } => FailureKind::MalformedOutput,
            Self::UnknownStyle { .. } => FailureKind::UnknownStyle,
            Self::InvalidParameter { .. } | Self::ConfigRead { .. } | Self::ConfigParse { .. } => {
                FailureKind::InvalidConfig
            }
            Self::ImageLoad { .. } | Self::ImageSave { .. } => FailureKind::ImageIo,
            Self::StyleDir { .. } | Self::Io(_) => FailureKind::Io,
            Self::WorkerLost { .. } => FailureKind::WorkerLost,
        }
    }
}

/// Result type alias for petra operations.
pub type Result<T> = std::result::Result<T, Error>;
