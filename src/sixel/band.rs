use image::RgbaImage;
use tracing::trace;

use super::compose::compose;
use super::encoder::SixelEncoder;
use super::palette::{ColorMatcher, PaletteKind};
use crate::bands::BandManager;
use crate::error::{Result, TermiumError};

/// Outcome of one incremental encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BandReport {
    /// Bands re-encoded for this frame
    pub dirty: usize,
    pub total: usize,
    /// The adaptive palette changed and forced a full re-encode
    pub palette_changed: bool,
}

/// Bands found dirty for one frame, not yet encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedBands {
    /// Indices into the band list
    pub dirty: Vec<usize>,
    pub palette_changed: bool,
}

/// Incremental sixel encoder: re-encodes only dirty bands and composes the
/// cached fragments into a full stream.
#[derive(Debug)]
pub struct BandEncoder {
    encoder: SixelEncoder,
    bands: BandManager,
    output: Vec<u8>,
}

impl BandEncoder {
    pub fn new(kind: PaletteKind) -> Self {
        Self {
            encoder: SixelEncoder::new(kind),
            bands: BandManager::new(0, 0),
            output: Vec::new(),
        }
    }

    /// Encode `image`, reusing cached fragments for unchanged bands.
    ///
    /// On error nothing is composed and the previous output is discarded, so a
    /// caller never sees a partial stream.
    pub fn encode_frame(&mut self, image: &RgbaImage) -> Result<(&[u8], BandReport)> {
        let detected = self.detect(image)?;
        self.encode_detected(image, detected)
    }

    /// First half of [`encode_frame`](Self::encode_frame): settle geometry and
    /// palette, then find the bands that need encoding.
    pub fn detect(&mut self, image: &RgbaImage) -> Result<DetectedBands> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            self.output.clear();
            return Err(TermiumError::encode_failed(format!(
                "cannot encode an empty {width}x{height} frame"
            )));
        }

        if self.bands.ensure_geometry(width, height) {
            trace!(width, height, bands = self.bands.band_count(), "Band geometry changed");
        }
        let palette_changed = self.encoder.update_palette(image);
        if palette_changed {
            self.bands.mark_all_dirty();
        }

        let dirty = self.bands.detect_dirty_bands(image);
        Ok(DetectedBands { dirty, palette_changed })
    }

    /// Second half of [`encode_frame`](Self::encode_frame): encode the
    /// detected bands and compose the full stream.
    pub fn encode_detected(
        &mut self,
        image: &RgbaImage,
        detected: DetectedBands,
    ) -> Result<(&[u8], BandReport)> {
        let (width, height) = image.dimensions();
        for &index in &detected.dirty {
            let (y, band_height) = {
                let band = &self.bands.bands()[index];
                (band.y, band.height)
            };
            let fragment = match self.encoder.encode_band(image, y, band_height) {
                Ok(fragment) => fragment,
                Err(err) => {
                    self.output.clear();
                    return Err(err);
                }
            };
            self.bands.bands_mut()[index].store(&fragment);
        }

        let Some(fragments) = self.bands.cached_fragments() else {
            self.output.clear();
            return Err(TermiumError::encode_failed("band cache incomplete after encode"));
        };
        self.output = compose(&fragments, width, height, Some(self.encoder.palette()));

        let report = BandReport {
            dirty: detected.dirty.len(),
            total: self.bands.band_count(),
            palette_changed: detected.palette_changed,
        };
        Ok((&self.output, report))
    }

    /// Force a full re-encode on the next frame, e.g. after the terminal
    /// cleared the image area.
    pub fn invalidate(&mut self) {
        self.bands.mark_all_dirty();
    }

    /// The last successfully composed stream, empty if there is none.
    pub fn last_output(&self) -> &[u8] {
        &self.output
    }

    pub fn matcher(&self) -> &ColorMatcher {
        self.encoder.matcher()
    }

    pub fn bands(&self) -> &BandManager {
        &self.bands
    }
}
