#![allow(clippy::undocumented_unsafe_blocks)]
#![allow(unsafe_op_in_unsafe_fn)]

use std::{arch::x86_64::*, num::NonZeroUsize};

use crate::util::BlockSize;

#[must_use]
#[target_feature(enable = "avx2")]
pub unsafe fn get_sad(
    size: BlockSize,
    src: &[u8],
    src_pitch: NonZeroUsize,
    ref_: &[u8],
    ref_pitch: NonZeroUsize,
) -> u32 {
    debug_assert!(src.len() >= (size.height() - 1) * src_pitch.get() + size.width());
    debug_assert!(ref_.len() >= (size.height() - 1) * ref_pitch.get() + size.width());

    match size {
        BlockSize::B16x16 => sad_w16::<16>(src.as_ptr(), src_pitch, ref_.as_ptr(), ref_pitch),
        BlockSize::B16x8 => sad_w16::<8>(src.as_ptr(), src_pitch, ref_.as_ptr(), ref_pitch),
        BlockSize::B8x16 => sad_w8::<16>(src.as_ptr(), src_pitch, ref_.as_ptr(), ref_pitch),
        BlockSize::B8x8 => sad_w8::<8>(src.as_ptr(), src_pitch, ref_.as_ptr(), ref_pitch),
        BlockSize::B8x4 => sad_w8::<4>(src.as_ptr(), src_pitch, ref_.as_ptr(), ref_pitch),
        BlockSize::B4x8 | BlockSize::B4x4 => {
            super::get_sad_rust(size, src, src_pitch, ref_, ref_pitch)
        }
    }
}

#[must_use]
#[target_feature(enable = "avx2")]
unsafe fn sad_w16<const HEIGHT: usize>(
    src: *const u8,
    src_pitch: NonZeroUsize,
    ref_: *const u8,
    ref_pitch: NonZeroUsize,
) -> u32 {
    let mut acc = _mm256_setzero_si256();
    let mut y = 0;
    while y + 2 <= HEIGHT {
        let s = _mm256_set_m128i(
            _mm_loadu_si128(src.add((y + 1) * src_pitch.get()).cast()),
            _mm_loadu_si128(src.add(y * src_pitch.get()).cast()),
        );
        let r = _mm256_set_m128i(
            _mm_loadu_si128(ref_.add((y + 1) * ref_pitch.get()).cast()),
            _mm_loadu_si128(ref_.add(y * ref_pitch.get()).cast()),
        );
        acc = _mm256_add_epi64(acc, _mm256_sad_epu8(s, r));
        y += 2;
    }

    let mut lanes = [0u64; 4];
    _mm256_storeu_si256(lanes.as_mut_ptr().cast(), acc);
    (lanes[0] + lanes[1] + lanes[2] + lanes[3]) as u32
}

#[must_use]
#[target_feature(enable = "avx2")]
unsafe fn sad_w8<const HEIGHT: usize>(
    src: *const u8,
    src_pitch: NonZeroUsize,
    ref_: *const u8,
    ref_pitch: NonZeroUsize,
) -> u32 {
    let mut acc = _mm_setzero_si128();
    for y in 0..HEIGHT {
        let s = _mm_loadl_epi64(src.add(y * src_pitch.get()).cast());
        let r = _mm_loadl_epi64(ref_.add(y * ref_pitch.get()).cast());
        acc = _mm_add_epi64(acc, _mm_sad_epu8(s, r));
    }

    let mut lanes = [0u64; 2];
    _mm_storeu_si128(lanes.as_mut_ptr().cast(), acc);
    (lanes[0] + lanes[1]) as u32
}
