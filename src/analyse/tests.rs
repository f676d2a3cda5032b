#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;
use crate::{
    context::MbNeighbours,
    frame::{FrameGeometry, SliceParams},
    tests::{ZeroResidualOracle, reference_from_fn, source_from_fn},
};

fn textured(x: usize, y: usize) -> u8 {
    ((11 * x + 5 * y + (x * y) / 7) % 250) as u8
}

fn slice(slice_type: SliceType, refs: [u8; 2]) -> SliceParams {
    SliceParams {
        slice_type,
        slice_id: 0,
        first_mb: 0,
        num_ref_idx_active: refs,
        weighted_bipred: false,
        qp: 26,
    }
}

fn analyser() -> Analyser {
    Analyser::new(AnalyseParams::default()).unwrap()
}

/// Runs a whole frame in raster order, committing each decision with a
/// zero residual (as the external stage would for perfectly predicted
/// content).
fn run_frame(
    analyser: &Analyser,
    slice_params: SliceParams,
    src: &SourceFrame,
    recon: &SourceFrame,
    refs: &RefPicLists<'_>,
) -> Vec<AnalysisResult> {
    let geo = FrameGeometry::new(src.luma.width(), src.luma.height()).unwrap();
    let mut fctx = FrameContext::new(geo).unwrap();
    let mut ctx = MbContext::new(slice_params);
    let mut oracle = ZeroResidualOracle;
    let mut results = Vec::new();

    for y in 0..geo.mb_height.get() {
        for x in 0..geo.mb_width.get() {
            let addr = MacroblockAddress::new(x, y);
            let res = analyser.analyse_macroblock(
                &mut ctx, &fctx, addr, 26, src, recon, refs, &mut oracle,
            );
            ctx.save(&mut fctx, &res);
            results.push(res);
        }
    }
    results
}

#[test]
fn i_slice_corner_macroblock_uses_the_flat_mode() {
    let src = source_from_fn(32, 32, 0, textured);
    let analyser = analyser();
    let geo = FrameGeometry::new(32, 32).unwrap();
    let fctx = FrameContext::new(geo).unwrap();
    let mut ctx = MbContext::new(slice(SliceType::I, [0, 0]));
    let mut oracle = ZeroResidualOracle;
    let refs = RefPicLists {
        list0: &[],
        list1: &[],
    };

    let res = analyser.analyse_macroblock(
        &mut ctx,
        &fctx,
        MacroblockAddress::new(0, 0),
        26,
        &src,
        &src,
        &refs,
        &mut oracle,
    );

    assert!(res.mb_type.is_intra());
    assert!(ctx.neighbours.is_empty());
    // With no neighbours the whole-block evaluation is restricted to the
    // single flat mode, and so is the corner 4x4 block.
    assert_eq!(res.intra16_mode, Predict16::Dc128);
    if res.mb_type == MbType::I4x4 {
        assert_eq!(res.intra4_modes[0], PredictNxN::Dc128);
    }
    assert_eq!(res.chroma_mode, PredictChroma::Dc128);
    // Intra never publishes inter state
    assert_eq!(res.refs[0][0], RefState::Intra);
    assert_eq!(res.mv[0][0], ZERO_MV);
}

#[test]
fn static_scene_resolves_to_skip_everywhere() {
    let src = source_from_fn(64, 32, 1, textured);
    let reference = reference_from_fn(64, 32, 0, textured);
    let refs = RefPicLists {
        list0: std::slice::from_ref(&reference),
        list1: &[],
    };

    let results = run_frame(
        &analyser(),
        slice(SliceType::P, [1, 0]),
        &src,
        &src,
        &refs,
    );

    for (i, res) in results.iter().enumerate() {
        assert_eq!(res.mb_type, MbType::PSkip, "macroblock {i}");
        for b4 in 0..16 {
            assert_eq!(res.mv[0][b4], ZERO_MV, "macroblock {i}");
        }
        assert_eq!(res.refs[0][0], RefState::Ref(0));
    }
}

#[test]
fn skip_scores_below_any_searched_inter_mode() {
    // The monotonicity guarantee: a legal skip with zero residual and
    // the predicted vector is never costed above the searched 16x16.
    let src = source_from_fn(64, 32, 1, textured);
    let reference = reference_from_fn(64, 32, 0, textured);
    let refs = RefPicLists {
        list0: std::slice::from_ref(&reference),
        list1: &[],
    };

    let results = run_frame(
        &analyser(),
        slice(SliceType::P, [1, 0]),
        &src,
        &src,
        &refs,
    );
    let lambda = crate::cost::lambda_for_qp(26);
    for res in &results {
        // A 16x16 inter carries at least two signalling bits
        assert!(res.cost <= lambda * 2);
    }
}

/// A paraboloid: convex distortion landscape, so every macroblock's
/// search converges regardless of its predictor seed.
fn bowl(x: usize, y: usize) -> u8 {
    ((x * x + y * y) / 32) as u8
}

#[test]
fn moving_scene_finds_the_global_shift() {
    // Content moved right by 2 and down by 1 between frames
    let reference = reference_from_fn(64, 48, 0, bowl);
    let src = source_from_fn(64, 48, 1, |x, y| {
        bowl(x.saturating_sub(2), y.saturating_sub(1))
    });
    let refs = RefPicLists {
        list0: std::slice::from_ref(&reference),
        list1: &[],
    };

    let results = run_frame(
        &analyser(),
        slice(SliceType::P, [1, 0]),
        &src,
        &src,
        &refs,
    );

    // Interior macroblocks (away from the saturated frame border) must
    // track the shift exactly.
    let geo = FrameGeometry::new(64, 48).unwrap();
    let mid = geo.mb_index(MacroblockAddress::new(1, 1));
    let res = &results[mid];
    assert!(!res.mb_type.is_intra());
    if res.mb_type != MbType::PSkip {
        assert_eq!(res.mv[0][5], MotionVector::new(-8, -4));
    }
}

#[test]
fn reference_selection_prefers_the_matching_frame() {
    // Reference 0 matches the source at quarter-pel vector (4, -2);
    // reference 1 matches nowhere.
    let base = reference_from_fn(64, 48, 0, textured);
    let mut src = source_from_fn(64, 48, 1, textured);
    {
        // Rebuild the source luma as the motion-compensated view of
        // reference 0 at (4, -2).
        let mut pixels = vec![0u8; 64 * 48];
        let pitch = std::num::NonZeroUsize::new(64).unwrap();
        base.luma
            .mc_luma(&mut pixels, pitch, 4, -2, 64, 48);
        src.luma.fill(&pixels, pitch);
        src.luma.pad();
    }
    let noise = reference_from_fn(64, 48, 0, |x, y| (255 - textured(x, y)).wrapping_mul(3));
    let list0 = [base, noise];
    let refs = RefPicLists {
        list0: &list0,
        list1: &[],
    };

    let results = run_frame(
        &analyser(),
        slice(SliceType::P, [2, 0]),
        &src,
        &src,
        &refs,
    );

    let geo = FrameGeometry::new(64, 48).unwrap();
    let mid = geo.mb_index(MacroblockAddress::new(1, 1));
    let res = &results[mid];
    assert_eq!(res.refs[0][0], RefState::Ref(0));
    let mv = res.mv[0][0];
    assert!(
        (i32::from(mv.x) - 4).abs() <= 1 && (i32::from(mv.y) + 2).abs() <= 1,
        "found {mv:?}"
    );
}

#[test]
fn b_slice_picks_the_better_list_not_bidir() {
    let good = reference_from_fn(64, 32, 0, textured);
    let bad = reference_from_fn(64, 32, 2, |x, y| 255 - textured(x, y));
    let src = source_from_fn(64, 32, 1, textured);
    let list0 = [good];
    let list1 = [bad];
    let refs = RefPicLists {
        list0: &list0,
        list1: &list1,
    };

    let results = run_frame(
        &analyser(),
        slice(SliceType::B, [1, 1]),
        &src,
        &src,
        &refs,
    );

    for res in &results {
        if !res.mb_type.is_intra() {
            assert_eq!(res.mb_type, MbType::BL0);
            assert_eq!(res.refs[0][0], RefState::Ref(0));
            assert_eq!(res.refs[1][0], RefState::Intra);
        }
    }
}

#[test]
fn frame_edge_vectors_stay_inside_the_padded_reference() {
    let reference = reference_from_fn(48, 32, 0, textured);
    // Uncorrelated content pushes the search around; the bounds must
    // still confine every vector.
    let src = source_from_fn(48, 32, 1, |x, y| textured(47 - x.min(47), 31 - y.min(31)));
    let refs = RefPicLists {
        list0: std::slice::from_ref(&reference),
        list1: &[],
    };

    let results = run_frame(
        &analyser(),
        slice(SliceType::P, [1, 0]),
        &src,
        &src,
        &refs,
    );

    let geo = FrameGeometry::new(48, 32).unwrap();
    for y in 0..geo.mb_height.get() {
        for x in 0..geo.mb_width.get() {
            let res = &results[geo.mb_index(MacroblockAddress::new(x, y))];
            if res.mb_type.is_intra() {
                continue;
            }
            for b4 in 0..16 {
                let mv = res.mv[0][b4];
                let px = 16 * x as i32 + 4 * (b4 as i32 % 4) + i32::from(mv.x) / 4;
                let py = 16 * y as i32 + 4 * (b4 as i32 / 4) + i32::from(mv.y) / 4;
                assert!(px >= -28 && px + 4 <= 48 + 28, "mb ({x},{y}) mv {mv:?}");
                assert!(py >= -28 && py + 4 <= 32 + 28, "mb ({x},{y}) mv {mv:?}");
            }
        }
    }
}

#[test]
fn identical_inputs_yield_identical_decisions() {
    let src = source_from_fn(64, 32, 1, textured);
    let reference = reference_from_fn(64, 32, 0, |x, y| textured(x + 1, y));
    let refs = RefPicLists {
        list0: std::slice::from_ref(&reference),
        list1: &[],
    };

    let a = run_frame(&analyser(), slice(SliceType::P, [1, 0]), &src, &src, &refs);
    let b = run_frame(&analyser(), slice(SliceType::P, [1, 0]), &src, &src, &refs);
    assert_eq!(a, b);
}

#[test]
fn partition_signalling_prefers_larger_shapes() {
    assert!(partition_bits(MbPartition::D16x16) < partition_bits(MbPartition::D16x8));
    assert!(partition_bits(MbPartition::D16x8) <= partition_bits(MbPartition::D8x16));
    assert!(partition_bits(MbPartition::D8x16) < partition_bits(MbPartition::D8x8));
    assert!(
        sub_partition_bits(SubPartition::L08x8) < sub_partition_bits(SubPartition::L04x4)
    );
}

#[test]
fn availability_drives_the_first_intra_block() {
    // Once a left neighbour exists, the corner block gains the
    // left-only modes but still no vertical prediction.
    let src = source_from_fn(64, 32, 0, textured);
    let analyser = analyser();
    let geo = FrameGeometry::new(64, 32).unwrap();
    let mut fctx = FrameContext::new(geo).unwrap();
    let mut ctx = MbContext::new(slice(SliceType::I, [0, 0]));
    let mut oracle = ZeroResidualOracle;
    let refs = RefPicLists {
        list0: &[],
        list1: &[],
    };

    let res = analyser.analyse_macroblock(
        &mut ctx,
        &fctx,
        MacroblockAddress::new(0, 0),
        26,
        &src,
        &src,
        &refs,
        &mut oracle,
    );
    ctx.save(&mut fctx, &res);

    let _ = analyser.analyse_macroblock(
        &mut ctx,
        &fctx,
        MacroblockAddress::new(1, 0),
        26,
        &src,
        &src,
        &refs,
        &mut oracle,
    );
    assert_eq!(ctx.neighbours, MbNeighbours::LEFT);
    let modes = crate::predict::modes_16x16(ctx.neighbours);
    assert!(modes.contains(&Predict16::H));
    assert!(!modes.contains(&Predict16::V));
}
