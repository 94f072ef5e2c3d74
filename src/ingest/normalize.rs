use anyhow::{anyhow, Result};

use crate::frame::rgb_len;

/// Pixel layouts a camera may negotiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
    /// Planar Y followed by interleaved UV at quarter resolution.
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

/// Convert a captured buffer to packed RGB24.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let luma = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

    match format {
        PixelFormat::Rgb24 => {
            let expected = rgb_len(width, height)?;
            check_len("RGB", pixels, expected)?;
            Ok(pixels.to_vec())
        }
        PixelFormat::Yuyv => {
            if w % 2 != 0 {
                return Err(anyhow!("YUYV frame width must be even, got {}", w));
            }
            check_len("YUYV", pixels, luma * 2)?;
            let mut rgb = Vec::with_capacity(luma * 3);
            for quad in pixels.chunks_exact(4) {
                let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
                rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
                rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
            }
            Ok(rgb)
        }
        PixelFormat::Nv12 => {
            if w % 2 != 0 || h % 2 != 0 {
                return Err(anyhow!(
                    "NV12 frame dimensions must be even, got {}x{}",
                    w,
                    h
                ));
            }
            check_len("NV12", pixels, luma + luma / 2)?;
            let mut rgb = vec![0u8; luma * 3];
            for j in 0..h {
                for i in 0..w {
                    let uv = luma + (j / 2) * w + (i / 2) * 2;
                    let px = yuv_to_rgb(pixels[j * w + i], pixels[uv], pixels[uv + 1]);
                    let offset = (j * w + i) * 3;
                    rgb[offset..offset + 3].copy_from_slice(&px);
                }
            }
            Ok(rgb)
        }
    }
}

fn check_len(kind: &str, pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            kind,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

// BT.601 full range.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402 * v),
        clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v),
        clamp_to_u8(y + 1.772 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_neutral_chroma_is_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn nv12_rejects_odd_dimensions() {
        // 2x3 luma plus the length an odd height would imply.
        let nv12 = vec![128u8; 6 + 3];
        assert!(normalize_to_rgb(&nv12, 2, 3, PixelFormat::Nv12).is_err());
        assert!(normalize_to_rgb(&vec![128u8; 9], 3, 2, PixelFormat::Nv12).is_err());
    }

    #[test]
    fn yuyv_expands_pixel_pairs() -> Result<()> {
        let yuyv = [16u8, 128, 235, 128];
        let rgb = normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![16, 16, 16, 235, 235, 235]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() {
        assert!(normalize_to_rgb(&[1u8; 9], 1, 3, PixelFormat::Rgb24).is_ok());
        assert!(normalize_to_rgb(&[1u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert!(normalize_to_rgb(&[1u8; 6], 3, 1, PixelFormat::Yuyv).is_err());
    }

    #[test]
    fn fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
