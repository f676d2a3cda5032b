
use std::num::NonZeroUsize;

use anyhow::Result;

use crate::{plane::Plane, util::average_block};

/// The four half-pel interpolated windows of a luma reference plane:
/// full-pel, horizontal half-pel, vertical half-pel and diagonal.
/// Quarter-pel positions are synthesized on demand by averaging the two
/// nearest windows.
#[derive(Debug, Clone)]
pub struct SubpelPlanes {
    windows: [Plane; 4],
}

impl SubpelPlanes {
    /// Interpolates the half-pel windows from a padded full-pel plane.
    /// The filter runs over the padded extent so motion compensation can
    /// read beyond the frame edges.
    pub fn build(full: Plane) -> Result<Self> {
        let mut half_h = full.clone();
        let mut half_v = full.clone();
        filter_halfpel_horizontal(full.data(), half_h.data_mut(), full.pitch());
        filter_halfpel_vertical(full.data(), half_v.data_mut(), full.pitch());
        let mut half_hv = half_v.clone();
        filter_halfpel_horizontal(half_v.data(), half_hv.data_mut(), full.pitch());

        Ok(Self {
            windows: [full, half_h, half_v, half_hv],
        })
    }

    #[must_use]
    pub fn full(&self) -> &Plane {
        &self.windows[0]
    }

    /// Motion-compensates a `width` x `height` luma block whose top-left
    /// corner is at quarter-pel frame position `(x, y)`. Half-pel
    /// positions read a window directly; quarter-pel positions average the
    /// two nearest windows.
    pub fn mc_luma(
        &self,
        dst: &mut [u8],
        dst_pitch: NonZeroUsize,
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    ) {
        // The diagonal quarter-pel positions between the h and v windows
        // need the source row shifted by one for two of the four corners.
        let correction = i32::from((x & 1) != 0 && (y & 1) != 0 && ((x & 2) != (y & 2)));
        let hpel1x = x >> 1;
        let hpel1y = (y + 1 - correction) >> 1;
        let filter1 = ((hpel1x & 1) + ((hpel1y & 1) << 1)) as usize;

        let win1 = &self.windows[filter1];
        let src1 = win1.slice_at((hpel1x >> 1) as isize, (hpel1y >> 1) as isize);

        if (x | y) & 1 != 0 {
            let hpel2x = (x + 1) >> 1;
            let hpel2y = (y + correction) >> 1;
            let filter2 = ((hpel2x & 1) + ((hpel2y & 1) << 1)) as usize;
            let win2 = &self.windows[filter2];
            let src2 = win2.slice_at((hpel2x >> 1) as isize, (hpel2y >> 1) as isize);

            average_block(
                dst,
                dst_pitch,
                src1,
                win1.pitch(),
                src2,
                win2.pitch(),
                width,
                height,
            );
        } else {
            for row in 0..height {
                dst[row * dst_pitch.get()..][..width]
                    .copy_from_slice(&src1[row * win1.pitch().get()..][..width]);
            }
        }
    }
}

/// Motion-compensates a chroma block bilinearly. `(x, y)` is the eighth-pel
/// position of the block's top-left corner in the chroma plane (a luma
/// quarter-pel vector applies to chroma unscaled, since the plane is half
/// resolution).
pub fn mc_chroma(
    dst: &mut [u8],
    dst_pitch: NonZeroUsize,
    src: &Plane,
    x: i32,
    y: i32,
    width: usize,
    height: usize,
) {
    let d8x = (x & 0x07) as i32;
    let d8y = (y & 0x07) as i32;

    let ca = (8 - d8x) * (8 - d8y);
    let cb = d8x * (8 - d8y);
    let cc = (8 - d8x) * d8y;
    let cd = d8x * d8y;

    let pitch = src.pitch().get();
    let base = src.slice_at((x >> 3) as isize, (y >> 3) as isize);

    for row in 0..height {
        let src_row = &base[row * pitch..];
        let src_next = &base[(row + 1) * pitch..];
        let dst_row = &mut dst[row * dst_pitch.get()..][..width];
        for i in 0..width {
            dst_row[i] = ((ca * i32::from(src_row[i])
                + cb * i32::from(src_row[i + 1])
                + cc * i32::from(src_next[i])
                + cd * i32::from(src_next[i + 1])
                + 32)
                >> 6) as u8;
        }
    }
}

/// 6-tap half-pel filter between horizontal neighbours, over the whole
/// buffer. The first and last sample pairs of each row fall back to
/// bilinear averaging where the kernel lacks support.
fn filter_halfpel_horizontal(src: &[u8], dest: &mut [u8], pitch: NonZeroUsize) {
    let pitch = pitch.get();
    let rows = src.len() / pitch;

    for j in 0..rows {
        let src_row = &src[j * pitch..][..pitch];
        let dest_row = &mut dest[j * pitch..][..pitch];

        for i in 0..2.min(pitch - 1) {
            dest_row[i] = avg_pel(src_row[i], src_row[i + 1]);
        }

        let taps_end = pitch.saturating_sub(4).max(2);
        for i in 2..taps_end {
            dest_row[i] = six_tap(
                src_row[i - 2],
                src_row[i - 1],
                src_row[i],
                src_row[i + 1],
                src_row[i + 2],
                src_row[i + 3],
            );
        }

        for i in taps_end..pitch - 1 {
            dest_row[i] = avg_pel(src_row[i], src_row[i + 1]);
        }
        dest_row[pitch - 1] = src_row[pitch - 1];
    }
}

/// 6-tap half-pel filter between vertical neighbours, over the whole
/// buffer. Edge rows fall back to bilinear averaging.
fn filter_halfpel_vertical(src: &[u8], dest: &mut [u8], pitch: NonZeroUsize) {
    let pitch = pitch.get();
    let rows = src.len() / pitch;
    let at = |x: usize, y: usize| src[y * pitch + x];

    for j in 0..rows {
        let dest_row = &mut dest[j * pitch..][..pitch];
        if j + 1 >= rows {
            dest_row.copy_from_slice(&src[j * pitch..][..pitch]);
        } else if (2..rows.saturating_sub(4).max(2)).contains(&j) {
            for i in 0..pitch {
                dest_row[i] = six_tap(
                    at(i, j - 2),
                    at(i, j - 1),
                    at(i, j),
                    at(i, j + 1),
                    at(i, j + 2),
                    at(i, j + 3),
                );
            }
        } else {
            for i in 0..pitch {
                dest_row[i] = avg_pel(at(i, j), at(i, j + 1));
            }
        }
    }
}

#[inline]
fn avg_pel(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b) + 1) >> 1) as u8
}

/// The (1, -5, 20, 20, -5, 1) interpolation kernel.
#[inline]
fn six_tap(m0: u8, m1: u8, m2: u8, m3: u8, m4: u8, m5: u8) -> u8 {
    let mut acc = (i32::from(m2) + i32::from(m3)) * 4;
    acc -= i32::from(m1) + i32::from(m4);
    acc *= 5;
    acc += i32::from(m0) + i32::from(m5) + 16;
    acc >>= 5;
    acc.clamp(0, 255) as u8
}
