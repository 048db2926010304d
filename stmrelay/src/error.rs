//! Error types for the frame relay

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying frames
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Opening a port while one is already open
    #[error("Frame port already connected")]
    PortAlreadyConnected,

    /// Closing a port while none is open
    #[error("Frame port already disconnected")]
    PortNotConnected,

    /// The frame source refused or dropped the connection
    #[error("Frame source error: {0}")]
    FrameSource(String),

    /// A message from the frame source is not a decodable image
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The fallback still could not be fetched
    #[error("Fallback image error: {0}")]
    FallbackImage(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// True for channel discipline violations (reported, never fatal)
    pub fn is_misuse(&self) -> bool {
        matches!(self, Error::PortAlreadyConnected | Error::PortNotConnected)
    }
}
