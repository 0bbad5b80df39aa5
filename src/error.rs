use thiserror::Error;

/// Failures surfaced by [`crate::platform::display::DisplayController`].
#[derive(Debug, Error)]
pub enum DisplayError {
    /// `set_image`/`show` was called before a panel was detected.
    #[error("display has not been initialized")]
    NotInitialized,

    /// Panel detection failed on every attempt.
    #[error("failed to initialize display after {attempts} attempts")]
    InitExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The physical refresh failed on every attempt.
    #[error("display refresh failed after {attempts} attempts")]
    RefreshExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The image handed to the panel does not match its resolution.
    #[error("image is {actual:?} but the panel expects {expected:?}")]
    ResolutionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The panel driver rejected the frame buffer.
    #[error("panel rejected image: {0}")]
    Device(anyhow::Error),
}

/// Failures while turning a file into a decoded RGB image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read image data")]
    Io(#[from] std::io::Error),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// HEIC/HEIF input without the optional decoder compiled in.
    #[error("no decoder available for {0} images")]
    MissingDecoder(&'static str),

    #[error("unsupported image: {0}")]
    Unsupported(String),
}
