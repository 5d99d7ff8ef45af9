use image::codecs::jpeg::JpegEncoder;
use image::ImageResult;

use crate::camera::Frame;

/// Encode the terminal frame to the JPEG artifact bytes.
pub(crate) fn encode_jpeg(frame: &Frame, quality: u8) -> ImageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    frame
        .image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;
    Ok(bytes)
}
