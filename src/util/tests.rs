#![allow(clippy::unwrap_used, reason = "allow in test files")]

use std::num::NonZeroUsize;

use super::*;

#[test]
fn block_size_dimensions() {
    assert_eq!(BlockSize::B16x16.width(), 16);
    assert_eq!(BlockSize::B16x16.height(), 16);
    assert_eq!(BlockSize::B16x8.height(), 8);
    assert_eq!(BlockSize::B8x16.width(), 8);
    assert_eq!(BlockSize::B8x4.height(), 4);
    assert_eq!(BlockSize::B4x8.width(), 4);
    assert_eq!(BlockSize::B4x4.width(), 4);
}

#[test]
fn copy_block_matching_strides() {
    let src: Vec<u8> = (0..64).collect();
    let mut dest = vec![0u8; 64];
    let pitch = NonZeroUsize::new(8).unwrap();
    copy_block(&mut dest, pitch, &src, pitch, pitch, pitch);
    assert_eq!(src, dest);
}

#[test]
fn copy_block_differing_strides() {
    let mut src = vec![0u8; 16 * 4];
    for y in 0..4 {
        for x in 0..8 {
            src[y * 16 + x] = (y * 8 + x) as u8;
        }
    }
    let mut dest = vec![0u8; 8 * 4];
    copy_block(
        &mut dest,
        NonZeroUsize::new(8).unwrap(),
        &src,
        NonZeroUsize::new(16).unwrap(),
        NonZeroUsize::new(8).unwrap(),
        NonZeroUsize::new(4).unwrap(),
    );
    let expected: Vec<u8> = (0..32).collect();
    assert_eq!(dest, expected);
}

#[test]
fn average_rounds_to_nearest() {
    let a = [10u8, 11, 0, 255];
    let b = [11u8, 11, 1, 255];
    let mut out = [0u8; 4];
    let pitch = NonZeroUsize::new(4).unwrap();
    average_block(&mut out, pitch, &a, pitch, &b, pitch, 4, 1);
    assert_eq!(out, [11, 11, 1, 255]);
}

#[test]
fn weighted_average_midpoint_matches_plain() {
    let a = [100u8, 0, 255, 42];
    let b = [50u8, 255, 255, 42];
    let pitch = NonZeroUsize::new(4).unwrap();

    let mut plain = [0u8; 4];
    average_block(&mut plain, pitch, &a, pitch, &b, pitch, 4, 1);
    let mut weighted = [0u8; 4];
    average_block_weighted(&mut weighted, pitch, &a, pitch, &b, pitch, 4, 1, 32);
    assert_eq!(plain, weighted);
}

#[test]
fn weighted_average_extremes() {
    let a = [100u8; 4];
    let b = [200u8; 4];
    let pitch = NonZeroUsize::new(4).unwrap();

    let mut out = [0u8; 4];
    average_block_weighted(&mut out, pitch, &a, pitch, &b, pitch, 4, 1, 0);
    // weight 0 keeps src1 (up to rounding)
    assert!(out.iter().all(|&v| (99..=101).contains(&v)));

    average_block_weighted(&mut out, pitch, &a, pitch, &b, pitch, 4, 1, 64);
    assert!(out.iter().all(|&v| (199..=201).contains(&v)));
}
