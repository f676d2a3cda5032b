#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;
use crate::analyse::AnalysisResult;
use crate::predict::{Predict16, PredictChroma, PredictNxN};

fn geometry() -> FrameGeometry {
    FrameGeometry::new(64, 32).unwrap()
}

fn slice_p(slice_id: u32) -> SliceParams {
    SliceParams {
        slice_type: SliceType::P,
        slice_id,
        first_mb: 0,
        num_ref_idx_active: [1, 0],
        weighted_bipred: false,
        qp: 26,
    }
}

fn inter_result(mb_type: MbType, mv: MotionVector, cbp: u16) -> AnalysisResult {
    AnalysisResult {
        mb_type,
        partition: MbPartition::D16x16,
        sub_partition: [SubPartition::L08x8; 4],
        refs: [[RefState::Ref(0); 4], [RefState::Intra; 4]],
        mv: [[mv; 16], [MotionVector::default(); 16]],
        intra16_mode: Predict16::Dc128,
        intra4_modes: [PredictNxN::Dc128; 16],
        intra8_modes: [PredictNxN::Dc128; 4],
        chroma_mode: PredictChroma::Dc128,
        transform_8x8: false,
        cost: 0,
        qp: 30,
        nnz: [0; 24],
        cbp,
    }
}

#[test]
fn ref_state_packing_round_trips() {
    for state in [
        RefState::Unavailable,
        RefState::Intra,
        RefState::Ref(0),
        RefState::Ref(15),
    ] {
        assert_eq!(RefState::from_packed(state.to_packed()), state);
    }
}

#[test]
fn first_macroblock_sees_nothing() {
    let fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));
    ctx.load(&fctx, MacroblockAddress::new(0, 0));

    assert!(ctx.neighbours.is_empty());
    assert_eq!(ctx.type_left, None);
    assert_eq!(
        ctx.cache_ref_at(0, SCAN8_0 - 1),
        RefState::Unavailable
    );
    assert_eq!(
        ctx.cache_ref_at(0, SCAN8_0 - 8),
        RefState::Unavailable
    );
}

#[test]
fn save_then_load_reproduces_neighbour_state() {
    let mut fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));
    let mv = MotionVector::new(4, -8);

    ctx.load(&fctx, MacroblockAddress::new(0, 0));
    ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(0));
    ctx.cache_mv(0, 0, 4, 4, 0, mv);
    ctx.cache_mvd(0, 0, 4, 4, 0, MotionVector::new(4, -8));
    let mut res = inter_result(MbType::PL0, mv, 0x7);
    res.nnz = [3; 24];
    ctx.save(&mut fctx, &res);

    // The right-hand neighbour reads back exactly what was committed
    ctx.load(&fctx, MacroblockAddress::new(1, 0));
    assert_eq!(ctx.neighbours, MbNeighbours::LEFT);
    assert_eq!(ctx.type_left, Some(MbType::PL0));
    for row in 0..4 {
        assert_eq!(ctx.cache_ref_at(0, SCAN8_0 - 1 + 8 * row), RefState::Ref(0));
        assert_eq!(ctx.cache.mv[0][SCAN8_0 - 1 + 8 * row], [4, -8]);
    }
    // Left-column coefficient flags land in the border slots
    assert_eq!(ctx.cache.non_zero_count[SCAN8[0] - 1], 3);
    assert_eq!(ctx.cache.non_zero_count[SCAN8[10] - 1], 3);

    // A single matching candidate propagates through the predictor
    assert_eq!(ctx.predict_mv_16x16(0, 0), mv);
}

#[test]
fn second_row_sees_top_and_corners() {
    let mut fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));
    let mv = MotionVector::new(-12, 4);

    for x in 0..4 {
        ctx.load(&fctx, MacroblockAddress::new(x, 0));
        ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(0));
        ctx.cache_mv(0, 0, 4, 4, 0, mv);
        ctx.save(&mut fctx, &inter_result(MbType::PL0, mv, 1));
    }

    ctx.load(&fctx, MacroblockAddress::new(1, 1));
    assert_eq!(
        ctx.neighbours,
        MbNeighbours::TOP | MbNeighbours::TOPLEFT | MbNeighbours::TOPRIGHT
    );
    assert_eq!(ctx.cache_ref_at(0, SCAN8_0 - 8), RefState::Ref(0));
    assert_eq!(ctx.cache_ref_at(0, SCAN8_0 - 8 + 4), RefState::Ref(0));
    assert_eq!(ctx.cache_ref_at(0, SCAN8_0 - 8 - 1), RefState::Ref(0));
    assert_eq!(ctx.cache.mv[0][SCAN8_0 - 8], [-12, 4]);

    // Median of three matching candidates
    assert_eq!(ctx.predict_mv_16x16(0, 0), mv);
}

#[test]
fn slice_boundary_makes_neighbours_unavailable() {
    let mut fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));

    ctx.load(&fctx, MacroblockAddress::new(0, 0));
    ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(0));
    ctx.cache_mv(0, 0, 4, 4, 0, MotionVector::new(8, 0));
    ctx.save(&mut fctx, &inter_result(MbType::PL0, MotionVector::new(8, 0), 1));

    // Geometrically adjacent, but a new slice starts here
    let mut ctx2 = MbContext::new(slice_p(1));
    ctx2.load(&fctx, MacroblockAddress::new(1, 0));
    assert!(ctx2.neighbours.is_empty());
    assert_eq!(ctx2.cache_ref_at(0, SCAN8_0 - 1), RefState::Unavailable);
    // Unavailable is never confused with intra
    assert_ne!(ctx2.cache_ref_at(0, SCAN8_0 - 1), RefState::Intra);
}

#[test]
fn intra_commit_writes_safe_placeholders() {
    let mut fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));

    ctx.load(&fctx, MacroblockAddress::new(0, 0));
    for idx in 0..16 {
        ctx.cache.intra4x4_mode[SCAN8[idx]] = 7;
    }
    let mut res = inter_result(MbType::I4x4, MotionVector::default(), 0x3f);
    res.refs = [[RefState::Intra; 4]; 2];
    ctx.save(&mut fctx, &res);

    ctx.load(&fctx, MacroblockAddress::new(1, 0));
    // Inter state reads as intra (not unavailable), with zero vectors
    assert_eq!(ctx.cache_ref_at(0, SCAN8_0 - 1), RefState::Intra);
    assert_eq!(ctx.cache.mv[0][SCAN8_0 - 1], [0, 0]);
    // The committed border modes are visible
    assert_eq!(ctx.cache.intra4x4_mode[SCAN8[0] - 1], 7);
    // With the top side missing the mode predictor falls back to DC
    assert_eq!(ctx.predict_intra4x4_mode(0), 2);
}

#[test]
fn skip_commit_keeps_running_qp() {
    let mut fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));

    ctx.load(&fctx, MacroblockAddress::new(0, 0));
    let res = inter_result(MbType::PL0, MotionVector::default(), 0x1);
    ctx.save(&mut fctx, &res);
    assert_eq!(fctx.qp(MacroblockAddress::new(0, 0)), 30);
    assert_eq!(fctx.last_qp(), 30);

    // An empty macroblock cannot signal a QP change
    ctx.load(&fctx, MacroblockAddress::new(1, 0));
    let mut res = inter_result(MbType::PSkip, MotionVector::default(), 0);
    res.qp = 40;
    ctx.save(&mut fctx, &res);
    assert_eq!(fctx.qp(MacroblockAddress::new(1, 0)), 30);
}

#[test]
fn predictor_uses_median_of_disagreeing_neighbours() {
    let fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));
    ctx.load(&fctx, MacroblockAddress::new(0, 0));

    // Fake three causal neighbours with one reference each
    let a = SCAN8_0 - 1;
    let b = SCAN8_0 - 8;
    let c = SCAN8_0 - 8 + 4;
    ctx.cache.refs[0][a] = 0;
    ctx.cache.refs[0][b] = 0;
    ctx.cache.refs[0][c] = 0;
    ctx.cache.mv[0][a] = [10, 0];
    ctx.cache.mv[0][b] = [2, 6];
    ctx.cache.mv[0][c] = [4, 20];
    assert_eq!(ctx.predict_mv_16x16(0, 0), MotionVector::new(4, 6));

    // Only one neighbour carries the searched reference
    ctx.cache.refs[0][a] = 1;
    ctx.cache.refs[0][c] = REF_UNAVAILABLE;
    assert_eq!(ctx.predict_mv_16x16(0, 0), MotionVector::new(2, 6));
}

#[test]
fn pskip_predictor_zeroes_on_edges_and_still_neighbours() {
    let fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));
    ctx.load(&fctx, MacroblockAddress::new(0, 0));

    // Unavailable left/top force the zero vector
    assert_eq!(ctx.predict_mv_pskip(), ZERO_MV);

    let a = SCAN8_0 - 1;
    let b = SCAN8_0 - 8;
    ctx.cache.refs[0][a] = 0;
    ctx.cache.refs[0][b] = 0;
    ctx.cache.mv[0][a] = [6, 2];
    ctx.cache.mv[0][b] = [6, 2];

    // A zero-vector neighbour against reference 0 also forces zero
    ctx.cache.mv[0][a] = [0, 0];
    assert_eq!(ctx.predict_mv_pskip(), ZERO_MV);

    ctx.cache.mv[0][a] = [6, 2];
    let c = SCAN8_0 - 8 + 4;
    ctx.cache.refs[0][c] = 0;
    ctx.cache.mv[0][c] = [6, 2];
    assert_eq!(ctx.predict_mv_pskip(), MotionVector::new(6, 2));
}

#[test]
fn sub_block_availability_follows_position() {
    let fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));
    ctx.load(&fctx, MacroblockAddress::new(0, 0));

    // No outer neighbours: the corner block has none either
    assert!(ctx.neighbour4[0].is_empty());
    // Block 5 sits on the top edge but has a left neighbour inside
    assert_eq!(ctx.neighbour4[5], MbNeighbours::LEFT);
    // Inner blocks always see their intra-macroblock neighbours
    assert_eq!(
        ctx.neighbour4[12],
        MbNeighbours::LEFT | MbNeighbours::TOP | MbNeighbours::TOPLEFT | MbNeighbours::TOPRIGHT
    );
    // Right-column blocks never have a top-right
    for idx in [3, 7, 11, 13, 15] {
        assert!(!ctx.neighbour4[idx].contains(MbNeighbours::TOPRIGHT));
    }
}

#[test]
fn mvd_survives_only_for_real_inter() {
    let mut fctx = FrameContext::new(geometry()).unwrap();
    let mut ctx = MbContext::new(slice_p(0));

    ctx.load(&fctx, MacroblockAddress::new(0, 0));
    ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(0));
    ctx.cache_mv(0, 0, 4, 4, 0, MotionVector::new(8, 4));
    ctx.cache_mvd(0, 0, 4, 4, 0, MotionVector::new(8, 4));
    ctx.save(&mut fctx, &inter_result(MbType::PL0, MotionVector::new(8, 4), 1));

    ctx.load(&fctx, MacroblockAddress::new(1, 0));
    assert_eq!(ctx.cache.mvd[0][SCAN8_0 - 1], [8, 4]);

    // A skip commits zero deltas even if the cache held something
    ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(0));
    ctx.cache_mv(0, 0, 4, 4, 0, MotionVector::new(8, 4));
    ctx.cache_mvd(0, 0, 4, 4, 0, MotionVector::new(8, 4));
    ctx.save(&mut fctx, &inter_result(MbType::PSkip, MotionVector::new(8, 4), 0));
    ctx.load(&fctx, MacroblockAddress::new(2, 0));
    assert_eq!(ctx.cache.mvd[0][SCAN8_0 - 1], [0, 0]);
}
