#[cfg(test)]
mod tests;

use crate::context::{BLOCK_IDX_X, BLOCK_IDX_Y, DEC_PITCH, DecPixels, ENC_PITCH, MbNeighbours};

/// Whole-macroblock luma prediction modes. The `Dc*` variants are the
/// availability-restricted stand-ins that signal as plain DC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predict16 {
    V,
    H,
    Dc,
    Plane,
    DcLeft,
    DcTop,
    Dc128,
}

impl Predict16 {
    /// The mode index actually signalled in the bitstream.
    #[must_use]
    pub const fn fix(self) -> u8 {
        match self {
            Predict16::V => 0,
            Predict16::H => 1,
            Predict16::Dc | Predict16::DcLeft | Predict16::DcTop | Predict16::Dc128 => 2,
            Predict16::Plane => 3,
        }
    }
}

/// Directional prediction modes shared by 4x4 and 8x8 luma blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictNxN {
    V,
    H,
    Dc,
    Ddl,
    Ddr,
    Vr,
    Hd,
    Vl,
    Hu,
    DcLeft,
    DcTop,
    Dc128,
}

impl PredictNxN {
    /// The canonical signalled mode; the restricted DC variants collapse
    /// to DC.
    #[must_use]
    pub const fn fix(self) -> i8 {
        match self {
            PredictNxN::V => 0,
            PredictNxN::H => 1,
            PredictNxN::Dc | PredictNxN::DcLeft | PredictNxN::DcTop | PredictNxN::Dc128 => 2,
            PredictNxN::Ddl => 3,
            PredictNxN::Ddr => 4,
            PredictNxN::Vr => 5,
            PredictNxN::Hd => 6,
            PredictNxN::Vl => 7,
            PredictNxN::Hu => 8,
        }
    }
}

/// Chroma prediction modes, applied to both chroma planes at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictChroma {
    Dc,
    H,
    V,
    Plane,
    DcLeft,
    DcTop,
    Dc128,
}

impl PredictChroma {
    #[must_use]
    pub const fn fix(self) -> u8 {
        match self {
            PredictChroma::Dc | PredictChroma::DcLeft | PredictChroma::DcTop | PredictChroma::Dc128 => 0,
            PredictChroma::H => 1,
            PredictChroma::V => 2,
            PredictChroma::Plane => 3,
        }
    }
}

/// Legal 16x16 modes for a given neighbour availability set. With no
/// neighbours at all only the flat 128 prediction remains.
#[must_use]
pub fn modes_16x16(n: MbNeighbours) -> &'static [Predict16] {
    let left = n.contains(MbNeighbours::LEFT);
    let top = n.contains(MbNeighbours::TOP);
    if left && top {
        &[Predict16::V, Predict16::H, Predict16::Dc, Predict16::Plane]
    } else if left {
        &[Predict16::DcLeft, Predict16::H]
    } else if top {
        &[Predict16::DcTop, Predict16::V]
    } else {
        &[Predict16::Dc128]
    }
}

#[must_use]
pub fn modes_chroma(n: MbNeighbours) -> &'static [PredictChroma] {
    let left = n.contains(MbNeighbours::LEFT);
    let top = n.contains(MbNeighbours::TOP);
    if left && top {
        &[
            PredictChroma::V,
            PredictChroma::H,
            PredictChroma::Dc,
            PredictChroma::Plane,
        ]
    } else if left {
        &[PredictChroma::DcLeft, PredictChroma::H]
    } else if top {
        &[PredictChroma::DcTop, PredictChroma::V]
    } else {
        &[PredictChroma::Dc128]
    }
}

/// Legal directional modes for a 4x4 or 8x8 block, keyed on that block's
/// own availability set. The diagonal-down-left family additionally
/// requires the top-right neighbour.
#[must_use]
pub fn modes_nxn(n: MbNeighbours) -> &'static [PredictNxN] {
    static FULL: [PredictNxN; 9] = [
        PredictNxN::Dc,
        PredictNxN::H,
        PredictNxN::V,
        PredictNxN::Ddr,
        PredictNxN::Vr,
        PredictNxN::Hd,
        PredictNxN::Hu,
        PredictNxN::Ddl,
        PredictNxN::Vl,
    ];
    let left = n.contains(MbNeighbours::LEFT);
    let top = n.contains(MbNeighbours::TOP);
    if left && top {
        if n.contains(MbNeighbours::TOPRIGHT) {
            &FULL
        } else {
            &FULL[..7]
        }
    } else if left {
        &[PredictNxN::DcLeft, PredictNxN::H]
    } else if top {
        &[PredictNxN::DcTop, PredictNxN::V]
    } else {
        &[PredictNxN::Dc128]
    }
}

/// Reference samples of an NxN block: the top-left corner, up to 8 left
/// samples and up to 2N top samples (the right half over the top-right
/// neighbour).
struct Edge {
    lt: i32,
    left: [i32; 8],
    top: [i32; 16],
}

/// Writes the 16x16 luma prediction into the decode cache.
pub fn predict_16x16(dec: &mut DecPixels, mode: Predict16) {
    let top: [i32; 16] = std::array::from_fn(|i| i32::from(dec.luma(i as isize, -1)));
    let left: [i32; 16] = std::array::from_fn(|i| i32::from(dec.luma(-1, i as isize)));
    let lt = i32::from(dec.luma(-1, -1));

    let buf = dec.luma_buf();
    let base = DecPixels::luma_offset(0, 0);
    let set = |buf: &mut [u8], x: usize, y: usize, v: u8| buf[base + y * DEC_PITCH + x] = v;

    match mode {
        Predict16::V => {
            for y in 0..16 {
                for x in 0..16 {
                    set(buf, x, y, top[x] as u8);
                }
            }
        }
        Predict16::H => {
            for y in 0..16 {
                for x in 0..16 {
                    set(buf, x, y, left[y] as u8);
                }
            }
        }
        Predict16::Dc | Predict16::DcLeft | Predict16::DcTop | Predict16::Dc128 => {
            let dc = match mode {
                Predict16::Dc => {
                    (top.iter().sum::<i32>() + left.iter().sum::<i32>() + 16) >> 5
                }
                Predict16::DcLeft => (left.iter().sum::<i32>() + 8) >> 4,
                Predict16::DcTop => (top.iter().sum::<i32>() + 8) >> 4,
                _ => 128,
            } as u8;
            for y in 0..16 {
                for x in 0..16 {
                    set(buf, x, y, dc);
                }
            }
        }
        Predict16::Plane => {
            let mut h = 0;
            let mut v = 0;
            for i in 0..8 {
                h += (i as i32 + 1) * (top[8 + i] - if i == 7 { lt } else { top[6 - i] });
                v += (i as i32 + 1) * (left[8 + i] - if i == 7 { lt } else { left[6 - i] });
            }
            let a = 16 * (left[15] + top[15]);
            let b = (5 * h + 32) >> 6;
            let c = (5 * v + 32) >> 6;
            let mut row_acc = a - 7 * b - 7 * c + 16;
            for y in 0..16 {
                let mut pix = row_acc;
                for x in 0..16 {
                    set(buf, x, y, (pix >> 5).clamp(0, 255) as u8);
                    pix += b;
                }
                row_acc += c;
            }
        }
    }
}

/// Writes an 8x8 chroma prediction into the decode cache; `plane` 0 is
/// Cb, 1 is Cr.
pub fn predict_chroma(dec: &mut DecPixels, plane: usize, mode: PredictChroma) {
    let top: [i32; 8] = std::array::from_fn(|i| i32::from(dec.chroma(plane, i as isize, -1)));
    let left: [i32; 8] = std::array::from_fn(|i| i32::from(dec.chroma(plane, -1, i as isize)));
    let lt = i32::from(dec.chroma(plane, -1, -1));

    let buf = dec.chroma_buf(plane);
    let base = DecPixels::chroma_offset(0, 0);
    let set = |buf: &mut [u8], x: usize, y: usize, v: u8| buf[base + y * ENC_PITCH + x] = v;

    match mode {
        PredictChroma::V => {
            for y in 0..8 {
                for x in 0..8 {
                    set(buf, x, y, top[x] as u8);
                }
            }
        }
        PredictChroma::H => {
            for y in 0..8 {
                for x in 0..8 {
                    set(buf, x, y, left[y] as u8);
                }
            }
        }
        PredictChroma::Dc => {
            // Four DC quadrants, matching the transform block layout
            let s_top: [i32; 2] = [top[..4].iter().sum(), top[4..].iter().sum()];
            let s_left: [i32; 2] = [left[..4].iter().sum(), left[4..].iter().sum()];
            let dc = [
                (s_top[0] + s_left[0] + 4) >> 3,
                (s_top[1] + 2) >> 2,
                (s_left[1] + 2) >> 2,
                (s_top[1] + s_left[1] + 4) >> 3,
            ];
            for y in 0..8 {
                for x in 0..8 {
                    let q = (y / 4) * 2 + x / 4;
                    set(buf, x, y, dc[q] as u8);
                }
            }
        }
        PredictChroma::DcLeft => {
            for y in 0..8 {
                let dc = ((left[(y / 4) * 4..][..4].iter().sum::<i32>() + 2) >> 2) as u8;
                for x in 0..8 {
                    set(buf, x, y, dc);
                }
            }
        }
        PredictChroma::DcTop => {
            for y in 0..8 {
                for x in 0..8 {
                    let dc = ((top[(x / 4) * 4..][..4].iter().sum::<i32>() + 2) >> 2) as u8;
                    set(buf, x, y, dc);
                }
            }
        }
        PredictChroma::Dc128 => {
            for y in 0..8 {
                for x in 0..8 {
                    set(buf, x, y, 128);
                }
            }
        }
        PredictChroma::Plane => {
            let mut h = 0;
            let mut v = 0;
            for i in 0..4 {
                h += (i as i32 + 1) * (top[4 + i] - if i == 3 { lt } else { top[2 - i] });
                v += (i as i32 + 1) * (left[4 + i] - if i == 3 { lt } else { left[2 - i] });
            }
            let a = 16 * (left[7] + top[7]);
            let b = (17 * h + 16) >> 5;
            let c = (17 * v + 16) >> 5;
            let mut row_acc = a - 3 * b - 3 * c + 16;
            for y in 0..8 {
                let mut pix = row_acc;
                for x in 0..8 {
                    set(buf, x, y, (pix >> 5).clamp(0, 255) as u8);
                    pix += b;
                }
                row_acc += c;
            }
        }
    }
}

/// Writes a 4x4 luma prediction for block `idx` into the decode cache,
/// reading unfiltered neighbour samples (which may be predictions of
/// earlier blocks in this macroblock).
pub fn predict_4x4(dec: &mut DecPixels, idx: usize, mode: PredictNxN) {
    let bx = 4 * BLOCK_IDX_X[idx] as isize;
    let by = 4 * BLOCK_IDX_Y[idx] as isize;

    let edge = Edge {
        lt: i32::from(dec.luma(bx - 1, by - 1)),
        left: std::array::from_fn(|i| {
            i32::from(dec.luma(bx - 1, by + (i as isize).min(3)))
        }),
        top: std::array::from_fn(|i| i32::from(dec.luma(bx + (i as isize).min(7), by - 1))),
    };

    let base = DecPixels::luma_offset(bx, by);
    predict_directional(dec.luma_buf(), base, DEC_PITCH, 4, &edge, mode);
}

/// Writes an 8x8 luma prediction for 8x8 block `i8` into the decode
/// cache. Reference samples are low-pass filtered first, with the
/// availability set deciding which filtered samples can be built.
pub fn predict_8x8(dec: &mut DecPixels, i8: usize, mode: PredictNxN, n8: MbNeighbours) {
    let bx = 8 * (i8 % 2) as isize;
    let by = 8 * (i8 / 2) as isize;
    let edge = build_8x8_edge(dec, bx, by, n8);
    let base = DecPixels::luma_offset(bx, by);
    predict_directional(dec.luma_buf(), base, DEC_PITCH, 8, &edge, mode);
}

/// Low-pass filters the reference samples of an 8x8 block.
fn build_8x8_edge(dec: &DecPixels, bx: isize, by: isize, n8: MbNeighbours) -> Edge {
    let s = |x: isize, y: isize| i32::from(dec.luma(bx + x, by + y));
    let have_lt = n8.contains(MbNeighbours::TOPLEFT);
    let have_tr = n8.contains(MbNeighbours::TOPRIGHT);

    let mut edge = Edge {
        lt: 0,
        left: [0; 8],
        top: [0; 16],
    };

    if n8.contains(MbNeighbours::LEFT) {
        edge.lt = (s(-1, 0) + 2 * s(-1, -1) + s(0, -1) + 2) >> 2;
        edge.left[0] =
            ((if have_lt { s(-1, -1) } else { s(-1, 0) }) + 2 * s(-1, 0) + s(-1, 1) + 2) >> 2;
        for y in 1..7 {
            edge.left[y as usize] = (s(-1, y - 1) + 2 * s(-1, y) + s(-1, y + 1) + 2) >> 2;
        }
        edge.left[7] = (s(-1, 6) + 3 * s(-1, 7) + 2) >> 2;
    }

    if n8.contains(MbNeighbours::TOP) {
        edge.top[0] =
            ((if have_lt { s(-1, -1) } else { s(0, -1) }) + 2 * s(0, -1) + s(1, -1) + 2) >> 2;
        for x in 1..7 {
            edge.top[x as usize] = (s(x - 1, -1) + 2 * s(x, -1) + s(x + 1, -1) + 2) >> 2;
        }
        edge.top[7] =
            ((if have_tr { s(8, -1) } else { s(7, -1) }) + 2 * s(7, -1) + s(6, -1) + 2) >> 2;

        if have_tr {
            for x in 8..15 {
                edge.top[x as usize] = (s(x - 1, -1) + 2 * s(x, -1) + s(x + 1, -1) + 2) >> 2;
            }
            edge.top[15] = (s(14, -1) + 3 * s(15, -1) + 2) >> 2;
        } else {
            for x in 8..16 {
                edge.top[x] = s(7, -1);
            }
        }
    }

    edge
}

/// The shared directional prediction core for 4x4 and 8x8 blocks: the
/// nine H.264 directional interpolations expressed over the edge arrays.
fn predict_directional(
    buf: &mut [u8],
    base: usize,
    pitch: usize,
    n: usize,
    e: &Edge,
    mode: PredictNxN,
) {
    let ni = n as isize;
    // Top samples clamp at 2N-1 (the final tap replicates the last
    // sample); index -1 is the corner.
    let t = |i: isize| -> i32 {
        if i < 0 {
            e.lt
        } else {
            e.top[(i as usize).min(2 * n - 1)]
        }
    };
    let l = |i: isize| -> i32 {
        if i < 0 {
            e.lt
        } else {
            e.left[(i as usize).min(n - 1)]
        }
    };
    // Unified diagonal edge centred on the corner: ed(0) = corner,
    // positive indices walk the top row, negative walk down the left.
    let ed = |k: isize| -> i32 {
        if k > 0 {
            t(k - 1)
        } else if k < 0 {
            l(-k - 1)
        } else {
            e.lt
        }
    };

    let mut set = |x: usize, y: usize, v: i32| {
        debug_assert!((0..=255).contains(&v));
        buf[base + y * pitch + x] = v as u8;
    };

    match mode {
        PredictNxN::V => {
            for y in 0..n {
                for x in 0..n {
                    set(x, y, t(x as isize));
                }
            }
        }
        PredictNxN::H => {
            for y in 0..n {
                for x in 0..n {
                    set(x, y, l(y as isize));
                }
            }
        }
        PredictNxN::Dc | PredictNxN::DcLeft | PredictNxN::DcTop | PredictNxN::Dc128 => {
            let sum_top: i32 = (0..ni).map(|i| t(i)).sum();
            let sum_left: i32 = (0..ni).map(|i| l(i)).sum();
            let shift = n.trailing_zeros();
            let dc = match mode {
                PredictNxN::Dc => (sum_top + sum_left + ni as i32) >> (shift + 1),
                PredictNxN::DcLeft => (sum_left + ni as i32 / 2) >> shift,
                PredictNxN::DcTop => (sum_top + ni as i32 / 2) >> shift,
                _ => 128,
            };
            for y in 0..n {
                for x in 0..n {
                    set(x, y, dc);
                }
            }
        }
        PredictNxN::Ddl => {
            for y in 0..n {
                for x in 0..n {
                    let i = (x + y) as isize;
                    set(x, y, (t(i) + 2 * t(i + 1) + t(i + 2) + 2) >> 2);
                }
            }
        }
        PredictNxN::Ddr => {
            for y in 0..n {
                for x in 0..n {
                    let d = x as isize - y as isize;
                    set(x, y, (ed(d - 1) + 2 * ed(d) + ed(d + 1) + 2) >> 2);
                }
            }
        }
        PredictNxN::Vr => {
            for y in 0..n {
                for x in 0..n {
                    let z = 2 * x as isize - y as isize;
                    let i = x as isize - (y as isize >> 1);
                    let v = if z >= 0 && z % 2 == 0 {
                        (t(i - 1) + t(i) + 1) >> 1
                    } else if z >= 1 {
                        (t(i - 2) + 2 * t(i - 1) + t(i) + 2) >> 2
                    } else if z == -1 {
                        (l(0) + 2 * e.lt + t(0) + 2) >> 2
                    } else {
                        let k = y as isize - 2 * x as isize;
                        (l(k - 3) + 2 * l(k - 2) + l(k - 1) + 2) >> 2
                    };
                    set(x, y, v);
                }
            }
        }
        PredictNxN::Hd => {
            for y in 0..n {
                for x in 0..n {
                    let z = 2 * y as isize - x as isize;
                    let i = y as isize - (x as isize >> 1);
                    let v = if z >= 0 && z % 2 == 0 {
                        (l(i - 1) + l(i) + 1) >> 1
                    } else if z >= 1 {
                        (l(i - 2) + 2 * l(i - 1) + l(i) + 2) >> 2
                    } else if z == -1 {
                        (t(0) + 2 * e.lt + l(0) + 2) >> 2
                    } else {
                        let k = x as isize - 2 * y as isize;
                        (t(k - 3) + 2 * t(k - 2) + t(k - 1) + 2) >> 2
                    };
                    set(x, y, v);
                }
            }
        }
        PredictNxN::Vl => {
            for y in 0..n {
                for x in 0..n {
                    let i = x as isize + (y as isize >> 1);
                    let v = if y % 2 == 0 {
                        (t(i) + t(i + 1) + 1) >> 1
                    } else {
                        (t(i) + 2 * t(i + 1) + t(i + 2) + 2) >> 2
                    };
                    set(x, y, v);
                }
            }
        }
        PredictNxN::Hu => {
            for y in 0..n {
                for x in 0..n {
                    let z = x as isize + 2 * y as isize;
                    let i = y as isize + (x as isize >> 1);
                    let v = if z == 2 * ni - 3 {
                        (l(ni - 2) + 3 * l(ni - 1) + 2) >> 2
                    } else if z > 2 * ni - 3 {
                        l(ni - 1)
                    } else if x % 2 == 0 {
                        (l(i) + l(i + 1) + 1) >> 1
                    } else {
                        (l(i) + 2 * l(i + 1) + l(i + 2) + 2) >> 2
                    };
                    set(x, y, v);
                }
            }
        }
    }
}
