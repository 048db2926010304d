//! Still frames exchanged over a frame port
//!
//! The frame source posts one encoded image per message, as a `data:` URL
//! (`data:image/jpeg;base64,...`).

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// A decoded video frame
#[derive(Debug, Clone)]
pub struct Frame {
    image: DynamicImage,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Decodes a `data:<mime>;base64,<payload>` message
    pub fn from_data_url(message: &str) -> Result<Self> {
        let rest = message
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| Error::InvalidFrame("not a data URL".into()))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::InvalidFrame("missing data URL payload".into()))?;

        if !header.ends_with(";base64") {
            return Err(Error::InvalidFrame(format!(
                "unsupported data URL encoding '{}'",
                header
            )));
        }

        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| Error::InvalidFrame(format!("bad base64 payload: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Decodes an encoded image (format guessed from its content)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(image::load_from_memory(bytes)?))
    }

    /// Encodes an image as a PNG `data:` URL, the way a frame source posts it
    pub fn encode_data_url(image: &DynamicImage) -> Result<String> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(&buffer)))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
