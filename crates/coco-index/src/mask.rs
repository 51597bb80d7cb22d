//! Run-length mask codec.
//!
//! The store never inspects mask pixels itself; it goes through [`MaskCodec`]
//! whenever a derived field (area, bounding box) has to be computed from a
//! run-length mask. [`RleCodec`] is the stock implementation and follows the
//! `maskApi.c` conventions: masks are column-major, runs alternate starting
//! with background, and compressed strings use the 6-bit LEB128-like scheme
//! with second-order deltas.

use crate::error::{CocoError, Result};
use crate::types::Rle;

/// The operations the result loader needs from a mask codec.
pub trait MaskCodec {
    /// Decompress a COCO counts string into an [`Rle`] of size `h` x `w`.
    fn decompress(&self, counts: &str, h: u32, w: u32) -> Result<Rle>;

    /// Number of foreground pixels.
    fn area(&self, rle: &Rle) -> u64;

    /// Tight bounding box `[x, y, w, h]` of the foreground.
    fn to_bbox(&self, rle: &Rle) -> [f64; 4];
}

/// The default codec, backed by the functions in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct RleCodec;

impl MaskCodec for RleCodec {
    fn decompress(&self, counts: &str, h: u32, w: u32) -> Result<Rle> {
        rle_from_string(counts, h, w)
    }

    fn area(&self, rle: &Rle) -> u64 {
        area(rle)
    }

    fn to_bbox(&self, rle: &Rle) -> [f64; 4] {
        to_bbox(rle)
    }
}

/// Encode a column-major binary mask into RLE.
///
/// `mask` is stored in column-major order (Fortran order): pixel (x, y) is at index `y + h * x`.
/// Length must be `h * w`.
pub fn encode(mask: &[u8], h: u32, w: u32) -> Result<Rle> {
    let n = (h as usize) * (w as usize);
    if mask.len() != n {
        return Err(CocoError::Shape {
            record: "mask",
            field: "data",
            detail: format!("expected {} pixels for {}x{}, got {}", n, h, w, mask.len()),
        });
    }

    let mut counts = Vec::new();
    let mut p: u8 = 0;
    let mut c: u32 = 0;

    for &v in mask {
        let v = u8::from(v != 0);
        if v != p {
            counts.push(c);
            c = 0;
            p = v;
        }
        c += 1;
    }
    counts.push(c);

    Ok(Rle { h, w, counts })
}

/// Decode an RLE to a column-major binary mask of size `h * w`.
///
/// Runs past the end of the mask are clipped.
pub fn decode(rle: &Rle) -> Vec<u8> {
    let n = (rle.h as usize) * (rle.w as usize);
    let mut mask = vec![0u8; n];
    let mut idx = 0usize;
    let mut v = 0u8;
    for &c in &rle.counts {
        let end = (idx + c as usize).min(n);
        if idx < end {
            mask[idx..end].fill(v);
        }
        idx = end;
        v = 1 - v;
    }
    mask
}

/// Compute the area (number of foreground pixels) of an RLE mask.
///
/// Only sums the odd-indexed runs (which represent 1s).
pub fn area(rle: &Rle) -> u64 {
    rle.counts
        .iter()
        .skip(1)
        .step_by(2)
        .map(|&c| u64::from(c))
        .sum()
}

/// Compute the bounding box `[x, y, w, h]` of an RLE mask.
pub fn to_bbox(rle: &Rle) -> [f64; 4] {
    let h = rle.h as usize;
    if h == 0 || rle.w == 0 {
        return [0.0; 4];
    }

    let mut xs = usize::MAX;
    let mut xe = 0usize;
    let mut ys = usize::MAX;
    let mut ye = 0usize;

    let mut cc = 0usize;
    for (i, &c) in rle.counts.iter().enumerate() {
        let c = c as usize;
        if i % 2 == 1 && c > 0 {
            let (x1, y1) = (cc / h, cc % h);
            let end = cc + c - 1;
            let (x2, y2) = (end / h, end % h);

            xs = xs.min(x1);
            xe = xe.max(x2 + 1);
            ys = ys.min(y1);
            ye = ye.max(y2 + 1);
            // a run that wraps into the next column covers every row
            if x1 != x2 {
                ys = 0;
                ye = h;
            }
        }
        cc += c;
    }

    if xs == usize::MAX {
        return [0.0; 4];
    }

    [xs as f64, ys as f64, (xe - xs) as f64, (ye - ys) as f64]
}

/// Compress an RLE into the LEB128-like string format used by COCO.
///
/// Counts after the third are stored as deltas against the count two
/// positions back.
pub fn rle_to_string(rle: &Rle) -> String {
    let mut s = String::new();
    for (i, &cnt) in rle.counts.iter().enumerate() {
        let mut x = i64::from(cnt);
        if i > 2 {
            x -= i64::from(rle.counts[i - 2]);
        }
        rle_encode_count(&mut s, x);
    }
    s
}

/// Encode a single (possibly negative) value in 5-bit groups.
///
/// Bit 5 of each character flags continuation, bit 4 of the last group
/// carries the sign, and every group is offset by 48 into printable ASCII.
fn rle_encode_count(s: &mut String, mut x: i64) {
    loop {
        let mut c = (x & 0x1f) as u8;
        x >>= 5;
        let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
        if more {
            c |= 0x20;
        }
        s.push(char::from(c + 48));
        if !more {
            break;
        }
    }
}

/// Decompress a COCO LEB128-like string back to an RLE.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Result<Rle> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let mut x: i64 = 0;
        let mut shift = 0;
        let mut more = true;
        while more {
            let byte = *bytes
                .get(i)
                .ok_or(CocoError::InvalidRleString { offset: i, byte: 0 })?;
            let c = match byte {
                48..=111 => i64::from(byte - 48),
                _ => return Err(CocoError::InvalidRleString { offset: i, byte }),
            };
            if shift > 58 {
                return Err(CocoError::InvalidRleString { offset: i, byte });
            }
            i += 1;
            x |= (c & 0x1f) << shift;
            more = (c & 0x20) != 0;
            shift += 5;
            if !more && (c & 0x10) != 0 {
                x |= !0i64 << shift;
            }
        }
        let m = counts.len();
        if m > 2 {
            x += i64::from(counts[m - 2]);
        }
        let count = u32::try_from(x).map_err(|_| CocoError::InvalidRleString {
            offset: start,
            byte: bytes[start],
        })?;
        counts.push(count);
    }

    Ok(Rle { h, w, counts })
}
