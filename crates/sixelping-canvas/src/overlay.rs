use std::path::Path;

use image::RgbaImage;
use sixelping_types::{Result, SixelError};

/// Load an overlay image from disk as straight RGBA.
pub fn load_overlay<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    let path_ref = path.as_ref();
    let image = image::open(path_ref).map_err(|err| {
        SixelError::Decode(format!(
            "failed to load overlay {}: {err}",
            path_ref.display()
        ))
    })?;
    Ok(image.to_rgba8())
}

/// Source-over blend of a straight-alpha RGBA `overlay` onto an opaque `base`.
///
/// Both buffers are RGBA8 of the same size. Alpha 255 replaces, alpha 0 keeps
/// the base; everything else rounds to nearest.
pub(crate) fn composite_over(base: &mut [u8], overlay: &[u8]) {
    for (dst, src) in base.chunks_exact_mut(4).zip(overlay.chunks_exact(4)) {
        let alpha = src[3] as u32;
        match alpha {
            0 => {}
            255 => dst[..3].copy_from_slice(&src[..3]),
            _ => {
                for channel in 0..3 {
                    let blended =
                        src[channel] as u32 * alpha + dst[channel] as u32 * (255 - alpha);
                    dst[channel] = ((blended + 127) / 255) as u8;
                }
            }
        }
        dst[3] = u8::MAX;
    }
}
