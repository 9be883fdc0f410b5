//! Sixel stream framing: introducer, raster attributes, colour table and
//! terminator, plus the inverse operation that strips them from a stream.

use super::palette::Palette;

/// DCS introducer: pixel aspect 0 (2:1 default), background left as is, 8-bit colour
pub const INTRODUCER: &[u8] = b"\x1bP0;0;8q";
/// String terminator closing the DCS
pub const TERMINATOR: &[u8] = b"\x1b\\";
/// Moves the sixel cursor down one band and back to column zero
pub const GRAPHICS_NEW_LINE: u8 = b'-';
/// Returns the sixel cursor to column zero of the current band
pub const GRAPHICS_CARRIAGE_RETURN: u8 = b'$';
/// Prefix of a run-length repeat
pub const REPEAT_INTRODUCER: u8 = b'!';
/// Prefix of a colour definition or selection
pub const COLOR_INTRODUCER: u8 = b'#';

/// Append `value` in decimal without allocating.
pub(crate) fn push_decimal(out: &mut Vec<u8>, mut value: u32) {
    let mut digits = [0u8; 10];
    let mut len = 0;
    loop {
        digits[len] = b'0' + (value % 10) as u8;
        len += 1;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    out.extend(digits[..len].iter().rev());
}

/// Introducer followed by the raster attributes `"1;1;W;H`.
pub fn write_header(out: &mut Vec<u8>, width: u32, height: u32) {
    out.extend_from_slice(INTRODUCER);
    out.extend_from_slice(b"\"1;1;");
    push_decimal(out, width);
    out.push(b';');
    push_decimal(out, height);
}

/// One `#n;2;r;g;b` definition per entry, components in percent.
pub fn write_palette(out: &mut Vec<u8>, palette: &Palette) {
    for (index, rgb) in palette.colors().iter().enumerate() {
        out.push(COLOR_INTRODUCER);
        push_decimal(out, index as u32);
        out.extend_from_slice(b";2");
        for &component in rgb {
            out.push(b';');
            push_decimal(out, component as u32 * 100 / 255);
        }
    }
}

/// Wrap band payloads into one complete sixel stream.
///
/// Fragments are joined with a graphics new line, so an empty fragment still
/// advances the output by one band. The colour table is omitted when
/// `palette` is `None`, leaving the terminal's current registers in effect.
pub fn compose<F: AsRef<[u8]>>(
    fragments: &[F],
    width: u32,
    height: u32,
    palette: Option<&Palette>,
) -> Vec<u8> {
    let payload: usize = fragments.iter().map(|f| f.as_ref().len() + 1).sum();
    let table = palette.map_or(0, |p| p.len() * 18);
    let mut out = Vec::with_capacity(32 + table + payload);

    write_header(&mut out, width, height);
    if let Some(palette) = palette {
        write_palette(&mut out, palette);
    }
    for (i, fragment) in fragments.iter().enumerate() {
        if i > 0 {
            out.push(GRAPHICS_NEW_LINE);
        }
        out.extend_from_slice(fragment.as_ref());
    }
    out.extend_from_slice(TERMINATOR);
    out
}

/// Return only the pixel payload of a complete sixel stream.
///
/// Skips the introducer, raster attributes and every colour definition, and
/// drops the terminator. Returns `None` if `stream` is not a framed sixel image.
pub fn strip_framing(stream: &[u8]) -> Option<&[u8]> {
    let body = stream.strip_prefix(b"\x1bP")?.strip_suffix(TERMINATOR)?;

    let mut pos = body.iter().position(|&b| b == b'q')?;
    if !body[..pos].iter().all(|b| b.is_ascii_digit() || *b == b';') {
        return None;
    }
    pos += 1;

    if body.get(pos) == Some(&b'"') {
        pos += 1;
        while body.get(pos).is_some_and(|b| b.is_ascii_digit() || *b == b';') {
            pos += 1;
        }
    }

    // Definitions are `#n;...`; a bare `#n` selects a colour and starts the payload
    while body.get(pos) == Some(&COLOR_INTRODUCER) {
        let mut cursor = pos + 1;
        while body.get(cursor).is_some_and(u8::is_ascii_digit) {
            cursor += 1;
        }
        if body.get(cursor) != Some(&b';') {
            break;
        }
        while body.get(cursor).is_some_and(|b| b.is_ascii_digit() || *b == b';') {
            cursor += 1;
        }
        pos = cursor;
    }

    Some(&body[pos..])
}
