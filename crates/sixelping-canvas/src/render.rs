use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    ColorType, DynamicImage, ImageEncoder, RgbaImage,
};
use sixelping_types::{Result, SixelError};

/// Point-in-time composited snapshot of the canvas. Always fully opaque.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    image: RgbaImage,
}

impl RenderedFrame {
    pub(crate) fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let px = self.image.get_pixel(x, y).0;
        [px[0], px[1], px[2]]
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(
                self.image.as_raw(),
                self.image.width(),
                self.image.height(),
                ColorType::Rgba8,
            )
            .map_err(|err| SixelError::Encode(format!("png encoding failed: {err}")))?;
        Ok(buffer)
    }
}

/// JPEG-encode an RGBA image, discarding alpha.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|err| SixelError::Encode(format!("jpeg encoding failed: {err}")))?;
    Ok(buffer)
}

/// Decode any supported image (typically a polled PNG) and re-encode it as JPEG.
pub fn transcode_to_jpeg(encoded: &[u8], quality: u8) -> Result<Vec<u8>> {
    let image = image::load_from_memory(encoded)
        .map_err(|err| SixelError::Decode(format!("frame decoding failed: {err}")))?
        .to_rgba8();
    encode_jpeg(&image, quality)
}
