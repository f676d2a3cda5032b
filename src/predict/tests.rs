#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;
use crate::context::{DecPixels, MbNeighbours};

/// A decode cache with the borders set by generators and the interior
/// cleared.
fn dec_with_borders(top: impl Fn(isize) -> u8, left: impl Fn(isize) -> u8) -> DecPixels {
    let mut dec = DecPixels::default();
    let buf = dec.luma_buf();
    for x in -1..=24isize {
        buf[DecPixels::luma_offset(x, -1)] = top(x);
    }
    for y in 0..16isize {
        buf[DecPixels::luma_offset(-1, y)] = left(y);
    }
    for plane in 0..2 {
        let buf = dec.chroma_buf(plane);
        for x in -1..=12isize {
            buf[DecPixels::chroma_offset(x, -1)] = top(x);
        }
        for y in 0..8isize {
            buf[DecPixels::chroma_offset(-1, y)] = left(y);
        }
    }
    dec
}

#[test]
fn availability_restricts_16x16_modes() {
    assert_eq!(modes_16x16(MbNeighbours::empty()), &[Predict16::Dc128]);
    assert_eq!(
        modes_16x16(MbNeighbours::LEFT),
        &[Predict16::DcLeft, Predict16::H]
    );
    assert_eq!(
        modes_16x16(MbNeighbours::TOP),
        &[Predict16::DcTop, Predict16::V]
    );
    assert_eq!(
        modes_16x16(MbNeighbours::LEFT | MbNeighbours::TOP),
        &[Predict16::V, Predict16::H, Predict16::Dc, Predict16::Plane]
    );
}

#[test]
fn availability_restricts_nxn_modes() {
    assert_eq!(modes_nxn(MbNeighbours::empty()), &[PredictNxN::Dc128]);
    assert_eq!(
        modes_nxn(MbNeighbours::LEFT),
        &[PredictNxN::DcLeft, PredictNxN::H]
    );
    let both = modes_nxn(MbNeighbours::LEFT | MbNeighbours::TOP);
    assert_eq!(both.len(), 7);
    assert!(!both.contains(&PredictNxN::Ddl));
    let with_tr = modes_nxn(MbNeighbours::LEFT | MbNeighbours::TOP | MbNeighbours::TOPRIGHT);
    assert_eq!(with_tr.len(), 9);
    assert!(with_tr.contains(&PredictNxN::Ddl));
    assert!(with_tr.contains(&PredictNxN::Vl));
}

#[test]
fn restricted_dc_variants_signal_as_dc() {
    assert_eq!(Predict16::DcLeft.fix(), Predict16::Dc.fix());
    assert_eq!(PredictNxN::Dc128.fix(), PredictNxN::Dc.fix());
    assert_eq!(PredictChroma::DcTop.fix(), PredictChroma::Dc.fix());
    assert_ne!(PredictNxN::Ddl.fix(), PredictNxN::Vl.fix());
}

#[test]
fn dc128_fills_flat() {
    let mut dec = DecPixels::default();
    predict_16x16(&mut dec, Predict16::Dc128);
    for y in 0..16 {
        for x in 0..16 {
            assert_eq!(dec.luma(x, y), 128);
        }
    }
}

#[test]
fn vertical_replicates_the_top_row() {
    let mut dec = dec_with_borders(|x| (10 + x) as u8, |_| 0);
    predict_16x16(&mut dec, Predict16::V);
    for y in 0..16isize {
        for x in 0..16isize {
            assert_eq!(dec.luma(x, y), (10 + x) as u8);
        }
    }
}

#[test]
fn horizontal_replicates_the_left_column() {
    let mut dec = dec_with_borders(|_| 0, |y| (3 * y) as u8);
    predict_16x16(&mut dec, Predict16::H);
    for y in 0..16isize {
        for x in 0..16isize {
            assert_eq!(dec.luma(x, y), (3 * y) as u8);
        }
    }
}

#[test]
fn dc_averages_both_borders() {
    let mut dec = dec_with_borders(|_| 100, |_| 50);
    predict_16x16(&mut dec, Predict16::Dc);
    assert_eq!(dec.luma(0, 0), 75);

    predict_16x16(&mut dec, Predict16::DcLeft);
    assert_eq!(dec.luma(5, 5), 50);

    predict_16x16(&mut dec, Predict16::DcTop);
    assert_eq!(dec.luma(5, 5), 100);
}

#[test]
fn plane_of_flat_borders_is_flat() {
    let mut dec = dec_with_borders(|_| 90, |_| 90);
    predict_16x16(&mut dec, Predict16::Plane);
    for y in 0..16 {
        for x in 0..16 {
            assert_eq!(dec.luma(x, y), 90);
        }
    }
}

#[test]
fn chroma_plane_and_dc() {
    let mut dec = dec_with_borders(|_| 60, |_| 60);
    predict_chroma(&mut dec, 0, PredictChroma::Plane);
    for y in 0..8 {
        for x in 0..8 {
            assert_eq!(dec.chroma(0, x, y), 60);
        }
    }
    predict_chroma(&mut dec, 1, PredictChroma::Dc);
    for y in 0..8 {
        for x in 0..8 {
            assert_eq!(dec.chroma(1, x, y), 60);
        }
    }
}

#[test]
fn predict_4x4_dc_and_directions() {
    let mut dec = dec_with_borders(|_| 40, |_| 80);

    // Block 0 reads the macroblock borders
    predict_4x4(&mut dec, 0, PredictNxN::Dc);
    assert_eq!(dec.luma(0, 0), 60);
    predict_4x4(&mut dec, 0, PredictNxN::V);
    for y in 0..4 {
        assert_eq!(dec.luma(2, y), 40);
    }
    predict_4x4(&mut dec, 0, PredictNxN::H);
    for x in 0..4 {
        assert_eq!(dec.luma(x, 3), 80);
    }
}

#[test]
fn ddl_of_constant_top_is_constant() {
    let mut dec = dec_with_borders(|_| 77, |_| 0);
    for mode in [PredictNxN::Ddl, PredictNxN::Vl] {
        predict_4x4(&mut dec, 0, mode);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(dec.luma(x, y), 77, "{mode:?}");
            }
        }
    }
}

#[test]
fn diagonal_down_right_blends_both_sides() {
    // lt = 10, top = 20..., left = 30...
    let mut dec = dec_with_borders(
        |x| if x < 0 { 10 } else { 20 },
        |_| 30,
    );
    predict_4x4(&mut dec, 0, PredictNxN::Ddr);
    // Main diagonal: (l0 + 2*lt + t0 + 2) >> 2
    let expected = (30 + 2 * 10 + 20 + 2) >> 2;
    for i in 0..4 {
        assert_eq!(dec.luma(i, i), expected as u8);
    }
    // Above the diagonal only top values contribute
    assert_eq!(dec.luma(3, 0), 20);
    // Below the diagonal only left values contribute
    assert_eq!(dec.luma(0, 3), 30);
}

#[test]
fn later_blocks_predict_from_earlier_predictions() {
    let mut dec = dec_with_borders(|_| 200, |_| 200);
    predict_4x4(&mut dec, 0, PredictNxN::Dc);
    assert_eq!(dec.luma(0, 0), 200);
    // Block 1's left neighbours are block 0's pixels
    predict_4x4(&mut dec, 1, PredictNxN::H);
    for y in 0..4 {
        assert_eq!(dec.luma(4, y), 200);
    }
}

#[test]
fn predict_8x8_filters_flat_edges_to_flat() {
    let mut dec = dec_with_borders(|_| 123, |_| 123);
    let n8 = MbNeighbours::LEFT | MbNeighbours::TOP | MbNeighbours::TOPLEFT | MbNeighbours::TOPRIGHT;
    for mode in [
        PredictNxN::Dc,
        PredictNxN::V,
        PredictNxN::H,
        PredictNxN::Ddl,
        PredictNxN::Ddr,
        PredictNxN::Vr,
        PredictNxN::Hd,
        PredictNxN::Vl,
        PredictNxN::Hu,
    ] {
        predict_8x8(&mut dec, 0, mode, n8);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(dec.luma(x, y), 123, "{mode:?} at ({x},{y})");
            }
        }
    }
}

#[test]
fn predict_8x8_without_topright_replicates_the_last_top_sample() {
    let mut dec = dec_with_borders(|x| if x < 8 { 50 } else { 90 }, |_| 50);
    let n8 = MbNeighbours::LEFT | MbNeighbours::TOP | MbNeighbours::TOPLEFT;
    // Without a top-right neighbour the extension must ignore the 90s
    predict_8x8(&mut dec, 0, PredictNxN::V, n8);
    for x in 0..8 {
        assert_eq!(dec.luma(x, 0), 50);
    }
}
