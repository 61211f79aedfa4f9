//! The host-facing frame model: pixel formats, colorimetry, and the
//! normalized frame handed to the host for rendering/encoding.

use bytes::Bytes;

/// Maximum number of pixel planes a supported format can carry.
pub const MAX_PLANES: usize = 3;

// ── VideoFormat ───────────────────────────────────────────────────────────────

/// Pixel formats in the host's normalized enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    /// Planar YUV 4:2:0, three planes.
    I420,
    /// Semi-planar YUV 4:2:0, two planes.
    Nv12,
    /// 4 bytes per pixel, X byte unused.
    Bgrx,
    Bgra,
    Rgba,
    /// Packed YUV 4:2:2.
    Uyvy,
    Yuy2,
    Yvyu,
}

impl VideoFormat {
    pub fn plane_count(self) -> usize {
        match self {
            Self::I420 => 3,
            Self::Nv12 => 2,
            _ => 1,
        }
    }

    pub fn is_yuv(self) -> bool {
        !matches!(self, Self::Bgrx | Self::Bgra | Self::Rgba)
    }
}

// ── Colorimetry ───────────────────────────────────────────────────────────────

/// Quantization range signalled by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    #[default]
    Unspecified,
    /// Full swing, 0–255.
    Full,
    /// Studio swing, 16–235.
    Studio,
}

/// Color matrix signalled by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMatrix {
    #[default]
    Unspecified,
    Bt709,
    Bt601,
}

/// Colorimetry parameters in the host's normalized form: a row-major 4×4
/// YUV→RGB matrix applied to `[Y, U, V, 1]` plus per-channel clamp bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorParams {
    pub full_range: bool,
    pub matrix: [f32; 16],
    pub range_min: [f32; 3],
    pub range_max: [f32; 3],
}

fn coefficients(matrix: ColorMatrix) -> (f32, f32) {
    match matrix {
        ColorMatrix::Bt709 => (0.2126, 0.0722),
        // Untagged content decodes as BT.601.
        ColorMatrix::Bt601 | ColorMatrix::Unspecified => (0.299, 0.114),
    }
}

/// Derive the host's colorimetry parameters for a (matrix, range) pair.
///
/// An unspecified range is treated as studio swing, so `full_range` is only
/// set when the producer explicitly tagged the stream full-range.
pub fn color_params(matrix: ColorMatrix, range: ColorRange) -> ColorParams {
    let (kr, kb) = coefficients(matrix);
    let kg = 1.0 - kr - kb;
    let full = matches!(range, ColorRange::Full);

    let (y_off, y_scale, c_scale) = if full {
        (0.0f32, 1.0f32, 1.0f32)
    } else {
        (16.0 / 255.0, 255.0 / 219.0, 255.0 / 224.0)
    };

    let rv = c_scale * 2.0 * (1.0 - kr);
    let bu = c_scale * 2.0 * (1.0 - kb);
    let gu = -c_scale * 2.0 * (1.0 - kb) * kb / kg;
    let gv = -c_scale * 2.0 * (1.0 - kr) * kr / kg;

    #[rustfmt::skip]
    let matrix = [
        y_scale, 0.0, rv,  -y_off * y_scale - 0.5 * rv,
        y_scale, gu,  gv,  -y_off * y_scale - 0.5 * (gu + gv),
        y_scale, bu,  0.0, -y_off * y_scale - 0.5 * bu,
        0.0,     0.0, 0.0, 1.0,
    ];

    let (range_min, range_max) = if full {
        ([0.0; 3], [1.0; 3])
    } else {
        (
            [16.0 / 255.0; 3],
            [235.0 / 255.0, 240.0 / 255.0, 240.0 / 255.0],
        )
    };

    ColorParams { full_range: full, matrix, range_min, range_max }
}

// ── NormalizedFrame ───────────────────────────────────────────────────────────

/// A decoded frame in the host's normalized representation.
///
/// Plane data is packed into one owned buffer; `plane_offset[i]` and
/// `linesize[i]` describe plane `i` for `format.plane_count()` planes.
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub data: Bytes,
    pub plane_offset: [usize; MAX_PLANES],
    pub linesize: [u32; MAX_PLANES],
    /// Nanoseconds in `Clock` mode, frame index in `Counter` mode.
    pub timestamp: u64,
    pub color: ColorParams,
}

impl NormalizedFrame {
    /// Borrow plane `i`'s data, running to the start of the next plane (or
    /// the end of the buffer for the last plane).
    pub fn plane(&self, i: usize) -> &[u8] {
        let planes = self.format.plane_count();
        assert!(i < planes, "plane {i} out of range for {:?}", self.format);
        let start = self.plane_offset[i];
        let end = if i + 1 < planes {
            self.plane_offset[i + 1]
        } else {
            self.data.len()
        };
        &self.data[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn bt709_full_range_derivation() {
        let p = color_params(ColorMatrix::Bt709, ColorRange::Full);
        assert!(p.full_range);
        // Standard BT.709 expansion coefficients.
        assert!(close(p.matrix[0], 1.0));
        assert!(close(p.matrix[2], 1.5748));
        assert!(close(p.matrix[5], -0.18732));
        assert!(close(p.matrix[6], -0.46812));
        assert!(close(p.matrix[9], 1.8556));
        // Offsets re-center chroma around 0.5.
        assert!(close(p.matrix[3], -0.5 * 1.5748));
        assert_eq!(p.range_min, [0.0; 3]);
        assert_eq!(p.range_max, [1.0; 3]);
    }

    #[test]
    fn bt601_studio_range_derivation() {
        let p = color_params(ColorMatrix::Bt601, ColorRange::Studio);
        assert!(!p.full_range);
        assert!(close(p.matrix[0], 255.0 / 219.0));
        assert!(close(p.matrix[2], 1.402 * 255.0 / 224.0));
        assert!(close(p.matrix[9], 1.772 * 255.0 / 224.0));
        assert!(close(p.range_min[0], 16.0 / 255.0));
        assert!(close(p.range_max[0], 235.0 / 255.0));
        assert!(close(p.range_max[1], 240.0 / 255.0));
    }

    #[test]
    fn unspecified_colorimetry_is_studio_bt601() {
        let p = color_params(ColorMatrix::Unspecified, ColorRange::Unspecified);
        assert!(!p.full_range);
        let q = color_params(ColorMatrix::Bt601, ColorRange::Studio);
        assert_eq!(p, q);
    }

    #[test]
    fn plane_counts() {
        assert_eq!(VideoFormat::I420.plane_count(), 3);
        assert_eq!(VideoFormat::Nv12.plane_count(), 2);
        assert_eq!(VideoFormat::Bgra.plane_count(), 1);
        assert!(VideoFormat::Yuy2.is_yuv());
        assert!(!VideoFormat::Bgrx.is_yuv());
    }

    #[test]
    fn plane_slicing() {
        let frame = NormalizedFrame {
            width: 4,
            height: 2,
            format: VideoFormat::Nv12,
            data: Bytes::from(vec![0u8; 12]),
            plane_offset: [0, 8, 0],
            linesize: [4, 4, 0],
            timestamp: 0,
            color: color_params(ColorMatrix::Unspecified, ColorRange::Unspecified),
        };
        assert_eq!(frame.plane(0).len(), 8);
        assert_eq!(frame.plane(1).len(), 4);
    }
}
