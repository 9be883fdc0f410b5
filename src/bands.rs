//! Dirty-band tracking for incremental sixel output.
//!
//! A frame is cut into horizontal bands of [`BAND_HEIGHT`] rows, the vertical
//! unit of one sixel line. Each band keeps a CRC-32 of its pixel rows and the
//! encoded sixel fragment produced the last time it was dirty. Only bands whose
//! checksum changed are re-encoded.
//!
//! One band per detection pass is forced dirty regardless of its checksum,
//! chosen round-robin from the frame counter. Any band is therefore
//! re-encoded at least once every `band_count` frames, which covers checksum
//! collisions and terminal-side corruption of the image area.

use flate2::Crc;
use image::RgbaImage;
use tracing::trace;

/// Rows per band; matches the six pixel rows a sixel character covers
pub const BAND_HEIGHT: u32 = 6;

/// One horizontal strip of the current frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    /// First pixel row covered by this band
    pub y: u32,
    /// Rows covered; shorter than [`BAND_HEIGHT`] only for the final band
    pub height: u32,
    /// CRC-32 of the band's pixel rows at the last detection pass
    pub hash: u32,
    /// The band must be re-encoded before the next composition
    pub dirty: bool,
    /// Encoded sixel payload, valid only while `dirty` is false
    pub cached: Vec<u8>,
}

impl Band {
    fn new(y: u32, height: u32) -> Self {
        Self { y, height, hash: 0, dirty: true, cached: Vec::new() }
    }

    /// Flag for re-encoding and drop the now stale fragment
    pub fn invalidate(&mut self) {
        self.dirty = true;
        self.cached.clear();
    }

    /// Store a freshly encoded fragment and mark the band clean
    pub fn store(&mut self, fragment: &[u8]) {
        self.cached.clear();
        self.cached.extend_from_slice(fragment);
        self.dirty = false;
    }
}

/// Owns the ordered bands for one frame geometry
#[derive(Debug, Clone)]
pub struct BandManager {
    width: u32,
    height: u32,
    bands: Vec<Band>,
    frame_number: u64,
}

impl BandManager {
    pub fn new(width: u32, height: u32) -> Self {
        let count = height.div_ceil(BAND_HEIGHT);
        let bands = (0..count)
            .map(|i| {
                let y = i * BAND_HEIGHT;
                Band::new(y, BAND_HEIGHT.min(height - y))
            })
            .collect();
        Self { width, height, bands, frame_number: 0 }
    }

    /// Rebuild the bands when the frame geometry changes.
    ///
    /// Returns true if the geometry was different and everything is dirty now.
    pub fn ensure_geometry(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn bands_mut(&mut self) -> &mut [Band] {
        &mut self.bands
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Compare `frame` against the stored checksums and return the dirty bands.
    ///
    /// The frame must have the manager's geometry; call
    /// [`ensure_geometry`](Self::ensure_geometry) first.
    pub fn detect_dirty_bands(&mut self, frame: &RgbaImage) -> Vec<usize> {
        debug_assert_eq!(frame.dimensions(), (self.width, self.height));

        let pixels = frame.as_raw();
        let stride = self.width as usize * 4;
        let forced = match self.bands.len() {
            0 => None,
            n => Some((self.frame_number % n as u64) as usize),
        };

        let mut dirty = Vec::new();
        for (i, band) in self.bands.iter_mut().enumerate() {
            let start = band.y as usize * stride;
            let end = (start + band.height as usize * stride).min(pixels.len());
            let hash = band_checksum(&pixels[start.min(end)..end]);

            if hash != band.hash {
                band.hash = hash;
                band.invalidate();
            } else if Some(i) == forced {
                trace!(band = i, "Rolling refresh");
                band.invalidate();
            }

            if band.dirty {
                dirty.push(i);
            }
        }

        self.frame_number += 1;
        dirty
    }

    pub fn dirty_count(&self) -> usize {
        self.bands.iter().filter(|band| band.dirty).count()
    }

    /// Force every band to be re-encoded, e.g. after a palette change.
    pub fn mark_all_dirty(&mut self) {
        for band in &mut self.bands {
            band.invalidate();
        }
    }

    /// Cached fragments in band order, or `None` if any band is still dirty.
    pub fn cached_fragments(&self) -> Option<Vec<&[u8]>> {
        self.bands
            .iter()
            .map(|band| (!band.dirty).then_some(band.cached.as_slice()))
            .collect()
    }
}

/// CRC-32 (IEEE) over a band's contiguous pixel rows.
pub fn band_checksum(rows: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(rows);
    crc.sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    proptest! {
        #[test]
        fn bands_tile_the_frame_exactly(height in 1u32..500, width in 1u32..8) {
            let manager = BandManager::new(width, height);
            let bands = manager.bands();

            prop_assert_eq!(bands.len() as u32, height.div_ceil(BAND_HEIGHT));
            let mut next_y = 0;
            for band in bands {
                prop_assert_eq!(band.y, next_y);
                prop_assert!(band.height >= 1 && band.height <= BAND_HEIGHT);
                next_y += band.height;
            }
            prop_assert_eq!(next_y, height);

            let last = bands.last().unwrap();
            if height % BAND_HEIGHT == 0 {
                prop_assert_eq!(last.height, BAND_HEIGHT);
            } else {
                prop_assert_eq!(last.height, height % BAND_HEIGHT);
            }
        }
    }

    #[test]
    fn evenly_divisible_height_yields_full_bands() {
        let manager = BandManager::new(10, 60);
        assert_eq!(manager.band_count(), 10);
        assert!(manager.bands().iter().all(|b| b.height == BAND_HEIGHT));
    }

    #[test]
    fn first_pass_marks_everything_dirty() {
        let mut manager = BandManager::new(4, 20);
        let dirty = manager.detect_dirty_bands(&solid(4, 20, 90));
        assert_eq!(dirty, vec![0, 1, 2, 3]);
    }

    #[test]
    fn identical_frames_only_dirty_the_rolling_band() {
        let mut manager = BandManager::new(8, 48);
        let frame = solid(8, 48, 120);
        manager.detect_dirty_bands(&frame);
        for band in manager.bands_mut() {
            band.store(b"x");
        }

        for pass in 1..20u64 {
            let dirty = manager.detect_dirty_bands(&frame.clone());
            assert_eq!(dirty, vec![(pass % 8) as usize]);
            for &i in &dirty {
                manager.bands_mut()[i].store(b"x");
            }
        }
    }

    #[test]
    fn changed_pixel_dirties_only_its_band() {
        let mut manager = BandManager::new(8, 36);
        let mut frame = solid(8, 36, 0);
        manager.detect_dirty_bands(&frame);
        for band in manager.bands_mut() {
            band.store(b"x");
        }

        // Row 14 lives in band 2; the rolling band for pass 1 is band 1
        frame.put_pixel(3, 14, Rgba([255, 0, 0, 255]));
        let dirty = manager.detect_dirty_bands(&frame);
        assert_eq!(dirty, vec![1, 2]);
        assert!(manager.bands()[2].cached.is_empty());
        assert_eq!(manager.bands()[0].cached, b"x");
    }

    #[test]
    fn geometry_change_rebuilds_bands() {
        let mut manager = BandManager::new(8, 12);
        assert!(!manager.ensure_geometry(8, 12));
        assert!(manager.ensure_geometry(8, 13));
        assert_eq!(manager.band_count(), 3);
        assert_eq!(manager.bands()[2].height, 1);
        assert_eq!(manager.frame_number(), 0);
    }

    #[test]
    fn cached_fragments_require_clean_bands() {
        let mut manager = BandManager::new(2, 12);
        assert!(manager.cached_fragments().is_none());
        for band in manager.bands_mut() {
            band.store(b"??");
        }
        assert_eq!(manager.cached_fragments().unwrap(), vec![&b"??"[..], &b"??"[..]]);
        manager.mark_all_dirty();
        assert_eq!(manager.dirty_count(), 2);
    }

    #[test]
    fn checksum_is_deterministic_and_content_sensitive() {
        assert_eq!(band_checksum(b"abc"), band_checksum(b"abc"));
        assert_ne!(band_checksum(b"abc"), band_checksum(b"abd"));
        // Known CRC-32/IEEE check value
        assert_eq!(band_checksum(b"123456789"), 0xCBF4_3926);
    }
}
