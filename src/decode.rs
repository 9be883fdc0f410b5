//! Frame decoding, fit-to-view scaling and optional debug dumps.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::{debug, warn};

use crate::error::{Result, TermiumError};
use crate::types::Frame;

/// Decode a JPEG or PNG payload into RGBA.
pub fn decode_frame(frame: &Frame) -> Result<RgbaImage> {
    image::load_from_memory(&frame.data)
        .map(|decoded| decoded.into_rgba8())
        .map_err(|e| TermiumError::decode_failed(frame.sequence, e))
}

/// Largest size with the same aspect ratio that fits `max`, never enlarged.
pub fn fit_within(size: (u32, u32), max: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    let (max_w, max_h) = max;
    if w == 0 || h == 0 {
        return (0, 0);
    }
    if w <= max_w && h <= max_h {
        return (w, h);
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let fit_w = ((w as f64 * scale) as u32).max(1).min(max_w);
    let fit_h = ((h as f64 * scale) as u32).max(1).min(max_h);
    (fit_w, fit_h)
}

/// Shrink `image` (bilinear) to fit `max`, or return `None` if it already fits.
pub fn scale_to_fit(image: &RgbaImage, max: (u32, u32)) -> Option<RgbaImage> {
    let target = fit_within(image.dimensions(), max);
    if target == image.dimensions() || target.0 == 0 || target.1 == 0 {
        return None;
    }
    Some(imageops::resize(image, target.0, target.1, FilterType::Triangle))
}

/// Writes raw and decoded frames as sequentially numbered files.
#[derive(Debug)]
pub struct FrameDumper {
    dir: PathBuf,
    count: u32,
}

impl FrameDumper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), count: 0 }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Dump one frame as `RawImageNNN.<ext>` and `ImageNNN.png`.
    ///
    /// Numbering starts at 001 and advances even if a write fails.
    pub fn dump(&mut self, frame: &Frame, decoded: &RgbaImage) -> Result<(PathBuf, PathBuf)> {
        self.count += 1;
        let raw_name = format!("RawImage{:03}.{}", self.count, frame.format_extension());
        let raw_path = self.dir.join(raw_name);
        let png_path = self.dir.join(format!("Image{:03}.png", self.count));

        fs::create_dir_all(&self.dir)
            .map_err(|source| TermiumError::Dump { path: self.dir.clone(), source })?;
        fs::write(&raw_path, &frame.data)
            .map_err(|source| TermiumError::Dump { path: raw_path.clone(), source })?;
        decoded.save_with_format(&png_path, image::ImageFormat::Png).map_err(|e| {
            TermiumError::Dump { path: png_path.clone(), source: std::io::Error::other(e) }
        })?;

        debug!(raw = %raw_path.display(), decoded = %png_path.display(), "Frame dumped");
        Ok((raw_path, png_path))
    }

    /// Dump and log failures instead of returning them.
    pub fn dump_logged(&mut self, frame: &Frame, decoded: &RgbaImage) {
        if let Err(e) = self.dump(frame, decoded) {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{encode_png, gradient_frame};

    #[test]
    fn png_payload_decodes_to_rgba() {
        let source = gradient_frame(16, 12, 0);
        let frame = Frame::new(encode_png(&source), 1);
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.dimensions(), (16, 12));
        assert_eq!(decoded, source);
    }

    #[test]
    fn corrupt_payload_is_a_recoverable_decode_error() {
        let frame = Frame::new(vec![0x89, b'P', b'N', b'G', 0, 1, 2], 7);
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(err, TermiumError::Decode { sequence: 7, .. }));
        assert!(err.is_recoverable());
        // The render loop logs this alongside the message
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn fitting_preserves_aspect_and_never_enlarges() {
        assert_eq!(fit_within((100, 50), (624, 288)), (100, 50));
        assert_eq!(fit_within((1280, 960), (624, 288)), (384, 288));
        assert_eq!(fit_within((1920, 1080), (624, 288)), (512, 288));
        assert_eq!(fit_within((0, 10), (624, 288)), (0, 0));
    }

    #[test]
    fn scaling_only_when_needed() {
        let image = gradient_frame(40, 20, 0);
        assert!(scale_to_fit(&image, (80, 80)).is_none());
        let scaled = scale_to_fit(&image, (20, 20)).unwrap();
        assert_eq!(scaled.dimensions(), (20, 10));
    }

    #[test]
    fn dumps_are_numbered_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut dumper = FrameDumper::new(dir.path().join("frames"));
        let image = gradient_frame(4, 4, 0);
        let frame = Frame::new(encode_png(&image), 1);

        let (raw, png) = dumper.dump(&frame, &image).unwrap();
        assert!(raw.ends_with("RawImage001.png"));
        assert!(png.ends_with("Image001.png"));
        let (raw, _) = dumper.dump(&frame, &image).unwrap();
        assert!(raw.ends_with("RawImage002.png"));
        assert_eq!(fs::read(raw).unwrap(), frame.data);
    }
}
