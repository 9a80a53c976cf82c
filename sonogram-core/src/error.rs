use thiserror::Error;

/// Failure reported by an external audio decoder. Propagated unchanged.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed audio container: {0}")]
    Format(String),
    #[error("unsupported audio encoding: {0}")]
    Unsupported(String),
    #[error("I/O error while decoding: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type for the sonogram-core public API.
#[derive(Error, Debug)]
pub enum SpectrogramError {
    /// Transform size is not a power of two, or the real/imaginary buffers disagree.
    #[error("transform size {size} is not a power of two")]
    InvalidSize { size: usize },

    /// Recording is shorter than one analysis window.
    #[error("recording has {samples} samples, fewer than one {fft_size}-sample analysis window")]
    InsufficientSamples { samples: usize, fft_size: usize },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A newer request was issued while this one was suspended at a yield point.
    #[error("request {token} was superseded by a newer request")]
    Superseded { token: u64 },
}

/// Convenience alias so callers can write `Result<T>` instead of `Result<T, SpectrogramError>`.
pub type Result<T> = std::result::Result<T, SpectrogramError>;
