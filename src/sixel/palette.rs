//! Colour palettes and nearest-colour matching for the sixel encoder.

use std::collections::HashMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Largest number of colour registers the encoder will define
pub const MAX_COLORS: usize = 256;

/// Exact-colour cache entries kept before the cache is flushed
const MATCH_CACHE_CAPACITY: usize = 1 << 16;

/// Palette strategy selected in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteKind {
    /// 216-colour web-safe cube
    #[default]
    Websafe,
    /// 256-colour Plan 9 colour map
    Plan9,
    /// Median cut over the current frame
    Adaptive,
}

impl PaletteKind {
    /// Whether the palette depends on frame content.
    pub fn is_adaptive(self) -> bool {
        matches!(self, PaletteKind::Adaptive)
    }
}

/// An ordered table of at most [`MAX_COLORS`] opaque colours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Build a palette from explicit colours, truncated to [`MAX_COLORS`].
    pub fn from_colors(mut colors: Vec<[u8; 3]>) -> Self {
        colors.truncate(MAX_COLORS);
        Self { colors }
    }

    /// The fixed palette for `kind`, or `None` for [`PaletteKind::Adaptive`].
    pub fn fixed(kind: PaletteKind) -> Option<Self> {
        match kind {
            PaletteKind::Websafe => Some(Self::websafe()),
            PaletteKind::Plan9 => Some(Self::plan9()),
            PaletteKind::Adaptive => None,
        }
    }

    /// Web-safe palette: every combination of 0x00, 0x33 .. 0xff, red outermost.
    pub fn websafe() -> Self {
        let mut colors = Vec::with_capacity(216);
        for r in 0..6u8 {
            for g in 0..6u8 {
                for b in 0..6u8 {
                    colors.push([r * 0x33, g * 0x33, b * 0x33]);
                }
            }
        }
        Self { colors }
    }

    /// Plan 9 colour map.
    ///
    /// A 4x4x4 colour cube subdivided into 4 shades each, with the zero-chroma
    /// entries replaced by a ramp of greys.
    pub fn plan9() -> Self {
        let mut colors = vec![[0u8; 3]; 256];
        let mut i: i32 = 0;
        for r in 0..4i32 {
            for v in 0..4i32 {
                let mut j = v - r;
                for g in 0..4i32 {
                    for b in 0..4i32 {
                        let den = r.max(g).max(b);
                        let color = if den == 0 {
                            let grey = (17 * v) as u8;
                            [grey, grey, grey]
                        } else {
                            let num = 17 * (4 * den + v);
                            [(r * num / den) as u8, (g * num / den) as u8, (b * num / den) as u8]
                        };
                        colors[(i + (j & 0x0f)) as usize] = color;
                        j += 1;
                    }
                }
                i += 16;
            }
        }
        Self { colors }
    }

    /// Median-cut palette of at most `max_colors` entries for `image`.
    ///
    /// Colours are bucketed at 5 bits per channel before splitting. Fully
    /// transparent pixels are ignored. An image with no opaque pixels yields a
    /// single black entry so the palette is never empty.
    pub fn adaptive(image: &RgbaImage, max_colors: usize) -> Self {
        let max_colors = max_colors.clamp(1, MAX_COLORS);

        let mut histogram: HashMap<u16, u32> = HashMap::new();
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            if a == 0 {
                continue;
            }
            let key = ((r as u16 >> 3) << 10) | ((g as u16 >> 3) << 5) | (b as u16 >> 3);
            *histogram.entry(key).or_insert(0) += 1;
        }

        if histogram.is_empty() {
            return Self { colors: vec![[0, 0, 0]] };
        }

        let mut entries: Vec<Bucket> = histogram
            .into_iter()
            .map(|(key, count)| Bucket {
                rgb: [(key >> 10) as u8 & 0x1f, (key >> 5) as u8 & 0x1f, key as u8 & 0x1f],
                count,
            })
            .collect();
        entries.sort_unstable_by_key(|bucket| bucket.rgb);

        let mut boxes = vec![ColorBox::new(entries)];
        while boxes.len() < max_colors {
            let Some((index, _)) = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| b.entries.len() > 1)
                .max_by_key(|(i, b)| (b.widest_range(), usize::MAX - i))
            else {
                break;
            };
            let (low, high) = boxes.swap_remove(index).split();
            boxes.push(low);
            boxes.push(high);
        }

        let mut colors: Vec<[u8; 3]> = boxes.iter().map(ColorBox::average).collect();
        colors.sort_unstable();
        colors.dedup();
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Index of the closest entry by squared Euclidean RGB distance.
    ///
    /// Ties resolve to the lowest index.
    pub fn nearest(&self, rgb: [u8; 3]) -> u8 {
        let mut best = 0usize;
        let mut best_distance = u32::MAX;
        for (index, color) in self.colors.iter().enumerate() {
            let distance = squared_distance(*color, rgb);
            if distance < best_distance {
                best = index;
                best_distance = distance;
                if distance == 0 {
                    break;
                }
            }
        }
        best as u8
    }
}

fn squared_distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    rgb: [u8; 3],
    count: u32,
}

#[derive(Debug)]
struct ColorBox {
    entries: Vec<Bucket>,
}

impl ColorBox {
    fn new(entries: Vec<Bucket>) -> Self {
        Self { entries }
    }

    fn channel_range(&self, channel: usize) -> u8 {
        let (min, max) = self.entries.iter().fold((u8::MAX, 0u8), |(lo, hi), bucket| {
            (lo.min(bucket.rgb[channel]), hi.max(bucket.rgb[channel]))
        });
        max.saturating_sub(min)
    }

    fn widest_channel(&self) -> usize {
        (0..3).max_by_key(|&c| (self.channel_range(c), 3 - c)).unwrap_or(0)
    }

    fn widest_range(&self) -> u8 {
        self.channel_range(self.widest_channel())
    }

    /// Split at the population median along the widest channel.
    fn split(mut self) -> (Self, Self) {
        let channel = self.widest_channel();
        self.entries.sort_by_key(|bucket| (bucket.rgb[channel], bucket.rgb));

        let total: u64 = self.entries.iter().map(|b| b.count as u64).sum();
        let mut running = 0u64;
        let mut cut = 1;
        for (i, bucket) in self.entries.iter().enumerate() {
            running += bucket.count as u64;
            if running * 2 >= total {
                cut = i + 1;
                break;
            }
        }
        let cut = cut.clamp(1, self.entries.len() - 1);

        let high = self.entries.split_off(cut);
        (self, Self::new(high))
    }

    /// Population-weighted mean, expanded from 5 to 8 bits per channel.
    fn average(&self) -> [u8; 3] {
        let total: u64 = self.entries.iter().map(|b| b.count as u64).sum::<u64>().max(1);
        let mut rgb = [0u8; 3];
        for (channel, out) in rgb.iter_mut().enumerate() {
            let sum: u64 = self
                .entries
                .iter()
                .map(|b| expand5(b.rgb[channel]) as u64 * b.count as u64)
                .sum();
            *out = (sum / total) as u8;
        }
        rgb
    }
}

fn expand5(value: u8) -> u8 {
    (value << 3) | (value >> 2)
}

/// Nearest-colour lookup with an exact-match cache.
///
/// The cache survives across frames and is only cleared when the palette
/// changes or it grows past its capacity.
#[derive(Debug, Default)]
pub struct ColorMatcher {
    cache: HashMap<[u8; 3], u8>,
    hits: u64,
    misses: u64,
}

impl ColorMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, palette: &Palette, rgb: [u8; 3]) -> u8 {
        if let Some(&index) = self.cache.get(&rgb) {
            self.hits += 1;
            return index;
        }
        self.misses += 1;
        if self.cache.len() >= MATCH_CACHE_CAPACITY {
            self.cache.clear();
        }
        let index = palette.nearest(rgb);
        self.cache.insert(rgb, index);
        index
    }

    /// Forget cached matches; required whenever the palette changes.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Fraction of lookups served from the cache, 0.0 when unused.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}
