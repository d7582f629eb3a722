use thiserror::Error;

/// Fatal input and configuration errors raised while initializing sources.
///
/// Degenerate data (non-positive SEDs, empty morphologies, no flux above the
/// detection threshold) is never reported through this type; it is logged and
/// initialization continues with a fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    /// Inverse-variance weights are absent or contain no positive value in a channel.
    #[error("observation {observation} is missing inverse variance weights; set Observation::weights")]
    MissingWeights {
        /// Index of the offending observation.
        observation: usize,
    },

    /// A background RMS entry handed to the coadd builder is zero or negative.
    #[error("bg_rms must be greater than zero in all channels (observation {observation}, channel {channel}: {value})")]
    NonPositiveRms {
        /// Index of the offending observation.
        observation: usize,
        /// Channel within that observation.
        channel: usize,
        /// The rejected value.
        value: f64,
    },

    /// A precomputed coadd was supplied without its noise cutoff.
    #[error("background cutoff missing; supply bg_cutoff together with the coadd")]
    MissingBackgroundCutoff,

    /// None of the observations lives in the model frame.
    #[error("no observation shares the model frame")]
    NoReferenceObservation,

    /// The model frame has no PSF but the source needs one.
    #[error("model frame has no PSF")]
    MissingPsf,

    /// The requested position maps outside the frame.
    #[error("position (y={y:.2}, x={x:.2}) lies outside the frame")]
    OutOfFrame {
        /// Row coordinate of the request.
        y: f64,
        /// Column coordinate of the request.
        x: f64,
    },

    /// Array dimensions do not agree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An empty observation list was supplied.
    #[error("at least one observation is required")]
    EmptyObservations,

    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, InitError>;
