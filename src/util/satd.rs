#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;

use crate::util::BlockSize;

/// Sum of absolute transformed differences between a source block and a
/// prediction. A 4x4 Hadamard transform is applied to the difference and
/// the absolute coefficients summed; this tracks coded cost much more
/// closely than plain SAD and is used for sub-pel refinement and final
/// mode costs.
#[must_use]
pub fn get_satd(
    size: BlockSize,
    src: &[u8],
    src_pitch: NonZeroUsize,
    ref_: &[u8],
    ref_pitch: NonZeroUsize,
) -> u32 {
    match size {
        BlockSize::B4x4 => satd_4x4(src, src_pitch, ref_, ref_pitch),
        BlockSize::B4x8 => {
            satd_4x4(src, src_pitch, ref_, ref_pitch)
                + satd_4x4(
                    &src[4 * src_pitch.get()..],
                    src_pitch,
                    &ref_[4 * ref_pitch.get()..],
                    ref_pitch,
                )
        }
        _ => {
            let mut sum = 0;
            for y in (0..size.height()).step_by(4) {
                for x in (0..size.width()).step_by(8) {
                    sum += satd_8x4(
                        &src[y * src_pitch.get() + x..],
                        src_pitch,
                        &ref_[y * ref_pitch.get() + x..],
                        ref_pitch,
                    );
                }
            }
            sum
        }
    }
}

/// 8x4 SATD kernel. Two 4x4 transforms are carried in parallel through a
/// single u32 lane pair (low and high 16 bits), a scalar
/// SIMD-in-register packing.
#[must_use]
fn satd_8x4(src: &[u8], src_pitch: NonZeroUsize, ref_: &[u8], ref_pitch: NonZeroUsize) -> u32 {
    const BITS_PER_SUM: usize = 16;
    let mut tmp = [[0u32; 4]; 4];
    let mut a = (0u32, 0u32, 0u32, 0u32);
    let mut sum = 0u32;

    for i in 0..4 {
        let src_row = &src[i * src_pitch.get()..][..8];
        let ref_row = &ref_[i * ref_pitch.get()..][..8];

        let diff = |idx: usize| -> i32 { i32::from(src_row[idx]) - i32::from(ref_row[idx]) };

        a.0 = (diff(0) as u32).wrapping_add((diff(4) as u32) << BITS_PER_SUM);
        a.1 = (diff(1) as u32).wrapping_add((diff(5) as u32) << BITS_PER_SUM);
        a.2 = (diff(2) as u32).wrapping_add((diff(6) as u32) << BITS_PER_SUM);
        a.3 = (diff(3) as u32).wrapping_add((diff(7) as u32) << BITS_PER_SUM);
        let [ref mut d0, ref mut d1, ref mut d2, ref mut d3] = tmp[i];
        hadamard4_packed(d0, d1, d2, d3, a.0, a.1, a.2, a.3);
    }

    for i in 0..4 {
        hadamard4_packed(
            &mut a.0, &mut a.1, &mut a.2, &mut a.3, tmp[0][i], tmp[1][i], tmp[2][i], tmp[3][i],
        );
        sum = sum
            .wrapping_add(abs2(a.0))
            .wrapping_add(abs2(a.1))
            .wrapping_add(abs2(a.2))
            .wrapping_add(abs2(a.3));
    }

    ((sum as u16 as u32) + (sum >> BITS_PER_SUM)) >> 1
}

/// 4x4 SATD kernel, plain integer version.
#[must_use]
fn satd_4x4(src: &[u8], src_pitch: NonZeroUsize, ref_: &[u8], ref_pitch: NonZeroUsize) -> u32 {
    let mut tmp = [[0i32; 4]; 4];
    let mut sum = 0u32;

    for i in 0..4 {
        let src_row = &src[i * src_pitch.get()..][..4];
        let ref_row = &ref_[i * ref_pitch.get()..][..4];

        let d0 = i32::from(src_row[0]) - i32::from(ref_row[0]);
        let d1 = i32::from(src_row[1]) - i32::from(ref_row[1]);
        let d2 = i32::from(src_row[2]) - i32::from(ref_row[2]);
        let d3 = i32::from(src_row[3]) - i32::from(ref_row[3]);
        let [ref mut t0, ref mut t1, ref mut t2, ref mut t3] = tmp[i];
        hadamard4_i32(t0, t1, t2, t3, d0, d1, d2, d3);
    }

    for i in 0..4 {
        let mut a = (0i32, 0i32, 0i32, 0i32);
        hadamard4_i32(
            &mut a.0, &mut a.1, &mut a.2, &mut a.3, tmp[0][i], tmp[1][i], tmp[2][i], tmp[3][i],
        );
        sum += a.0.unsigned_abs() + a.1.unsigned_abs() + a.2.unsigned_abs() + a.3.unsigned_abs();
    }

    sum >> 1
}

/// in: a pseudo-simd number of the form x+(y<<16)
/// return: abs(x)+(abs(y)<<16)
#[must_use]
#[inline(always)]
fn abs2(a: u32) -> u32 {
    const BITS_PER_SUM: usize = 16;

    let s: u32 = ((a >> (BITS_PER_SUM - 1)) & ((1u32 << BITS_PER_SUM) + 1)) * (-1i16 as u16 as u32);
    a.wrapping_add(s) ^ s
}

#[inline(always)]
fn hadamard4_i32(
    dest0: &mut i32,
    dest1: &mut i32,
    dest2: &mut i32,
    dest3: &mut i32,
    src0: i32,
    src1: i32,
    src2: i32,
    src3: i32,
) {
    let temp0 = src0 + src1;
    let temp1 = src0 - src1;
    let temp2 = src2 + src3;
    let temp3 = src2 - src3;
    *dest0 = temp0 + temp2;
    *dest2 = temp0 - temp2;
    *dest1 = temp1 + temp3;
    *dest3 = temp1 - temp3;
}

/// Lane-wise Hadamard butterfly on pseudo-simd packed values. Wrapping
/// arithmetic keeps the two 16-bit lanes independent modulo carries,
/// which `abs2` and the final fold account for.
#[inline(always)]
fn hadamard4_packed(
    dest0: &mut u32,
    dest1: &mut u32,
    dest2: &mut u32,
    dest3: &mut u32,
    src0: u32,
    src1: u32,
    src2: u32,
    src3: u32,
) {
    let temp0 = src0.wrapping_add(src1);
    let temp1 = src0.wrapping_sub(src1);
    let temp2 = src2.wrapping_add(src3);
    let temp3 = src2.wrapping_sub(src3);
    *dest0 = temp0.wrapping_add(temp2);
    *dest2 = temp0.wrapping_sub(temp2);
    *dest1 = temp1.wrapping_add(temp3);
    *dest3 = temp1.wrapping_sub(temp3);
}
