//! Frame conversion: source pixel-format tags to the host's normalized
//! frame, plus the per-session timestamp policy.

use bytes::Bytes;
use gstreamer_video as gst_video;
use muttercast_core::{
    color_params, ColorMatrix, ColorRange, DecodeError, NormalizedFrame, TimestampMode,
    VideoFormat, MAX_PLANES,
};

// ── Format table ──────────────────────────────────────────────────────────────

/// Source format tag → host format. Anything absent is unsupported.
static FORMAT_TABLE: &[(gst_video::VideoFormat, VideoFormat)] = &[
    (gst_video::VideoFormat::I420, VideoFormat::I420),
    (gst_video::VideoFormat::Nv12, VideoFormat::Nv12),
    (gst_video::VideoFormat::Bgrx, VideoFormat::Bgrx),
    (gst_video::VideoFormat::Bgra, VideoFormat::Bgra),
    (gst_video::VideoFormat::Rgbx, VideoFormat::Rgba),
    (gst_video::VideoFormat::Rgba, VideoFormat::Rgba),
    (gst_video::VideoFormat::Uyvy, VideoFormat::Uyvy),
    (gst_video::VideoFormat::Yuy2, VideoFormat::Yuy2),
    (gst_video::VideoFormat::Yvyu, VideoFormat::Yvyu),
];

/// Map a source format tag to the host enumeration.
pub fn map_format(format: gst_video::VideoFormat) -> Option<VideoFormat> {
    FORMAT_TABLE
        .iter()
        .find(|(source, _)| *source == format)
        .map(|(_, host)| *host)
}

// ── FrameDescriptor ───────────────────────────────────────────────────────────

/// Borrowed description of one buffer as delivered by the pipeline.
///
/// `data` is only valid for the duration of the delivering callback; `decode`
/// copies it out before returning.
#[derive(Debug)]
pub struct FrameDescriptor<'a> {
    pub width: u32,
    pub height: u32,
    pub format: gst_video::VideoFormat,
    pub n_planes: usize,
    pub stride: [u32; MAX_PLANES],
    pub offset: [usize; MAX_PLANES],
    pub range: ColorRange,
    pub matrix: ColorMatrix,
    pub data: &'a [u8],
}

impl<'a> FrameDescriptor<'a> {
    /// Build a descriptor from negotiated caps and a mapped buffer.
    pub fn from_video_info(info: &gst_video::VideoInfo, data: &'a [u8]) -> Self {
        let mut stride = [0u32; MAX_PLANES];
        let mut offset = [0usize; MAX_PLANES];
        let n_planes = (info.n_planes() as usize).min(MAX_PLANES);
        for plane in 0..n_planes {
            stride[plane] = info.stride()[plane].unsigned_abs();
            offset[plane] = info.offset()[plane];
        }
        Self {
            width: info.width(),
            height: info.height(),
            format: info.format(),
            n_planes,
            stride,
            offset,
            range: map_range(info.colorimetry().range()),
            matrix: map_matrix(info.colorimetry().matrix()),
            data,
        }
    }
}

fn map_range(range: gst_video::VideoColorRange) -> ColorRange {
    match range {
        gst_video::VideoColorRange::Range0_255 => ColorRange::Full,
        gst_video::VideoColorRange::Range16_235 => ColorRange::Studio,
        _ => ColorRange::Unspecified,
    }
}

fn map_matrix(matrix: gst_video::VideoColorMatrix) -> ColorMatrix {
    match matrix {
        gst_video::VideoColorMatrix::Bt709 => ColorMatrix::Bt709,
        gst_video::VideoColorMatrix::Bt601 => ColorMatrix::Bt601,
        _ => ColorMatrix::Unspecified,
    }
}

// ── decode ────────────────────────────────────────────────────────────────────

/// Convert one delivered buffer into the host's normalized frame.
///
/// Pure apart from the single copy of the pixel data; safe to call from the
/// pipeline's streaming thread.
pub fn decode(descriptor: &FrameDescriptor<'_>, timestamp: u64) -> Result<NormalizedFrame, DecodeError> {
    let format = map_format(descriptor.format).ok_or_else(|| DecodeError::UnsupportedFormat {
        format: format!("{:?}", descriptor.format),
    })?;

    if descriptor.data.is_empty() {
        return Err(DecodeError::Malformed { reason: "empty payload".into() });
    }
    for plane in 0..format.plane_count().min(descriptor.n_planes) {
        if descriptor.offset[plane] >= descriptor.data.len() {
            return Err(DecodeError::Malformed {
                reason: format!(
                    "plane {} offset {} beyond payload of {} bytes",
                    plane,
                    descriptor.offset[plane],
                    descriptor.data.len()
                ),
            });
        }
    }

    Ok(NormalizedFrame {
        width: descriptor.width,
        height: descriptor.height,
        format,
        data: Bytes::copy_from_slice(descriptor.data),
        plane_offset: descriptor.offset,
        linesize: descriptor.stride,
        timestamp,
        color: color_params(descriptor.matrix, descriptor.range),
    })
}

// ── Timestamps ────────────────────────────────────────────────────────────────

/// Per-session timestamp source, chosen once at session start.
#[derive(Debug)]
pub struct Timestamps {
    mode: TimestampMode,
    counter: u64,
}

impl Timestamps {
    pub fn new(mode: TimestampMode) -> Self {
        Self { mode, counter: 0 }
    }

    /// Timestamp for the next frame. `pts` is the buffer PTS in nanoseconds.
    pub fn next(&mut self, pts: Option<u64>) -> u64 {
        match self.mode {
            TimestampMode::Clock => pts.unwrap_or(0),
            TimestampMode::Counter => {
                let t = self.counter;
                self.counter += 1;
                t
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgra_descriptor(data: &[u8]) -> FrameDescriptor<'_> {
        FrameDescriptor {
            width: 2,
            height: 1,
            format: gst_video::VideoFormat::Bgra,
            n_planes: 1,
            stride: [8, 0, 0],
            offset: [0, 0, 0],
            range: ColorRange::Full,
            matrix: ColorMatrix::Bt709,
            data,
        }
    }

    #[test]
    fn bgra_full_range_bt709_decodes_with_host_params() {
        let data = [1u8; 8];
        let frame = decode(&bgra_descriptor(&data), 7).expect("supported format");
        assert_eq!(frame.format, VideoFormat::Bgra);
        assert_eq!(frame.timestamp, 7);
        assert!(frame.color.full_range);
        let expected = color_params(ColorMatrix::Bt709, ColorRange::Full);
        assert_eq!(frame.color, expected);
        assert_eq!(frame.linesize[0], 8);
        assert_eq!(&frame.data[..], &data[..]);
    }

    #[test]
    fn unknown_format_is_unsupported_not_fatal() {
        let data = [0u8; 4];
        let mut descriptor = bgra_descriptor(&data);
        descriptor.format = gst_video::VideoFormat::Gray8;
        match decode(&descriptor, 0) {
            Err(DecodeError::UnsupportedFormat { format }) => {
                assert!(format.contains("Gray8"), "got {format}");
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn rgbx_maps_to_rgba() {
        assert_eq!(map_format(gst_video::VideoFormat::Rgbx), Some(VideoFormat::Rgba));
        assert_eq!(map_format(gst_video::VideoFormat::Yuy2), Some(VideoFormat::Yuy2));
        assert_eq!(map_format(gst_video::VideoFormat::Gray16Le), None);
    }

    #[test]
    fn unspecified_colorimetry_is_not_full_range() {
        let data = [0u8; 8];
        let mut descriptor = bgra_descriptor(&data);
        descriptor.format = gst_video::VideoFormat::Bgrx;
        descriptor.range = ColorRange::Unspecified;
        descriptor.matrix = ColorMatrix::Unspecified;
        let frame = decode(&descriptor, 0).expect("supported format");
        assert!(!frame.color.full_range);
    }

    #[test]
    fn plane_offset_beyond_payload_is_malformed() {
        let data = [0u8; 4];
        let mut descriptor = bgra_descriptor(&data);
        descriptor.offset[0] = 64;
        assert!(matches!(
            decode(&descriptor, 0),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn counter_timestamps_start_at_zero_per_session() {
        let mut ts = Timestamps::new(TimestampMode::Counter);
        assert_eq!(ts.next(Some(999)), 0);
        assert_eq!(ts.next(None), 1);
        assert_eq!(ts.next(Some(5)), 2);

        // A fresh session restarts the counter.
        let mut ts = Timestamps::new(TimestampMode::Counter);
        assert_eq!(ts.next(None), 0);
    }

    #[test]
    fn clock_timestamps_pass_through_pts() {
        let mut ts = Timestamps::new(TimestampMode::Clock);
        assert_eq!(ts.next(Some(1_000_000)), 1_000_000);
        assert_eq!(ts.next(None), 0);
    }
}
