//! Encoded image decoding.
//!
//! Decoding is an external capability from the loop's point of view: the
//! loop only needs "bytes in, image or nothing out". Unparseable bytes are a
//! normal per-frame condition and map to `None`, never to an error.

use image::RgbImage;

/// Decoded RGB frame handed to detector backends.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    rgb: RgbImage,
}

impl DecodedImage {
    pub fn new(rgb: RgbImage) -> Self {
        Self { rgb }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Packed RGB8 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.rgb.as_raw()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.rgb
    }
}

/// Turns compressed image bytes into a `DecodedImage`.
pub trait FrameDecoder {
    /// Returns `None` when the bytes are not a decodable image.
    fn decode(&self, bytes: &[u8]) -> Option<DecodedImage>;
}

/// Decoder backed by the `image` crate (JPEG and PNG, format sniffed from
/// the magic bytes).
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageDecoder;

impl FrameDecoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Option<DecodedImage> {
        if bytes.is_empty() {
            return None;
        }
        match image::load_from_memory(bytes) {
            Ok(decoded) => Some(DecodedImage::new(decoded.into_rgb8())),
            Err(e) => {
                log::debug!("image decode failed: {}", e);
                None
            }
        }
    }
}
