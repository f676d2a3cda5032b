#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;

use crate::util::BlockSize;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", not(feature = "no_simd")))] {
        mod avx2;
        cpufeatures::new!(cpuid_avx2, "avx2");
    }
}

/// Sum of absolute differences between a source block and a reference
/// block. This is the distortion proxy used during full-pel motion search.
///
/// Both slices must cover at least `height` rows at their given pitch.
#[must_use]
pub fn get_sad(
    size: BlockSize,
    src: &[u8],
    src_pitch: NonZeroUsize,
    ref_: &[u8],
    ref_pitch: NonZeroUsize,
) -> u32 {
    #[cfg(all(target_arch = "x86_64", not(feature = "no_simd")))]
    if cpuid_avx2::get() && size.width() >= 8 {
        // SAFETY: AVX2 support was verified at runtime
        return unsafe { avx2::get_sad(size, src, src_pitch, ref_, ref_pitch) };
    }

    get_sad_rust(size, src, src_pitch, ref_, ref_pitch)
}

#[must_use]
pub(super) fn get_sad_rust(
    size: BlockSize,
    src: &[u8],
    src_pitch: NonZeroUsize,
    ref_: &[u8],
    ref_pitch: NonZeroUsize,
) -> u32 {
    match size {
        BlockSize::B16x16 => get_sad_impl::<16, 16>(src, src_pitch, ref_, ref_pitch),
        BlockSize::B16x8 => get_sad_impl::<16, 8>(src, src_pitch, ref_, ref_pitch),
        BlockSize::B8x16 => get_sad_impl::<8, 16>(src, src_pitch, ref_, ref_pitch),
        BlockSize::B8x8 => get_sad_impl::<8, 8>(src, src_pitch, ref_, ref_pitch),
        BlockSize::B8x4 => get_sad_impl::<8, 4>(src, src_pitch, ref_, ref_pitch),
        BlockSize::B4x8 => get_sad_impl::<4, 8>(src, src_pitch, ref_, ref_pitch),
        BlockSize::B4x4 => get_sad_impl::<4, 4>(src, src_pitch, ref_, ref_pitch),
    }
}

#[must_use]
fn get_sad_impl<const WIDTH: usize, const HEIGHT: usize>(
    src: &[u8],
    src_pitch: NonZeroUsize,
    ref_: &[u8],
    ref_pitch: NonZeroUsize,
) -> u32 {
    let mut sum = 0u32;
    for y in 0..HEIGHT {
        let src_row = &src[y * src_pitch.get()..][..WIDTH];
        let ref_row = &ref_[y * ref_pitch.get()..][..WIDTH];
        sum += src_row.iter().zip(ref_row.iter()).fold(0, |acc, (&s, &r)| {
            acc + u32::from((i16::from(s) - i16::from(r)).unsigned_abs())
        });
    }
    sum
}
