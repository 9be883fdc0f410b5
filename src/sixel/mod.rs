//! Sixel output: palettes, the run-length band encoder and stream framing.
//!
//! The pipeline keeps one [`BandEncoder`] alive for the whole session. Each
//! frame it re-encodes only the dirty bands, then wraps every cached band
//! payload into a single framed stream:
//!
//! ```text
//! ESC P 0;0;8 q "1;1;W;H  #0;2;r;g;b ...  band0 - band1 - ... ESC \
//! ```

mod band;
mod compose;
mod encoder;
mod palette;

pub use band::{BandEncoder, BandReport, DetectedBands};
pub use compose::{compose, strip_framing, write_header, write_palette};
pub use encoder::SixelEncoder;
pub use palette::{ColorMatcher, MAX_COLORS, Palette, PaletteKind};
