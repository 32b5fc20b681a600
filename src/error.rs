/// Crate-level error type for the vocomp engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration or parameter value.
    #[error("invalid parameter `{name}`: got {value}, {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Audio data is empty when a non-empty signal was required.
    #[error("audio data is empty")]
    EmptyAudio,

    /// A required dimension is zero or invalid.
    #[error("invalid size for `{name}`: {value} ({reason})")]
    InvalidSize {
        name: &'static str,
        value: usize,
        reason: &'static str,
    },

    /// A take's sample rate differs from the processing rate. Fatal: the
    /// stitcher assumes all takes share one absolute timeline.
    #[error("sample rate mismatch for take `{take}`: {got} Hz, expected {expected} Hz")]
    SampleRateMismatch { take: String, got: u32, expected: u32 },

    /// A required input is absent (missing phrase directory, no audio files,
    /// empty feature table, empty comp map, empty training pair set).
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Malformed score table or comp map content.
    #[error("malformed {kind} at line {line}: {reason}")]
    MalformedTable {
        kind: &'static str,
        line: usize,
        reason: String,
    },

    /// Audio I/O errors.
    #[error(transparent)]
    Audio(#[from] crate::io::AudioError),

    /// File I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization errors (comp map, ranker model artifacts).
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
