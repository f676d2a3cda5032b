
use crate::{
    mv::MotionVector,
    util::math::{bits_se, bits_te, bits_ue},
};

/// A rate-distortion score: distortion plus lambda-weighted bit estimate.
pub type Cost = u32;

pub const COST_MAX: Cost = u32::MAX;

/// Lagrange multiplier per QP. Converts an estimated bit count into
/// distortion units so the two can be summed and compared.
const QP_COST_TABLE: [u16; 52] = [
    1, 1, 1, 1, 1, 1, 1, 1, //  0-7
    1, 1, 1, 1, //  8-11
    1, 1, 1, 1, 2, 2, 2, 2, // 12-19
    3, 3, 3, 4, 4, 4, 5, 6, // 20-27
    6, 7, 8, 9, 10, 11, 13, 14, // 28-35
    16, 18, 20, 23, 25, 29, 32, 36, // 36-43
    40, 45, 51, 57, 64, 72, 81, 91, // 44-51
];

#[must_use]
pub fn lambda_for_qp(qp: u8) -> u32 {
    u32::from(QP_COST_TABLE[usize::from(qp.min(51))])
}

/// Estimated cost of coding `mv` against its predictor: monotonically
/// increasing in the magnitude of the signed residual components.
#[must_use]
pub fn mv_cost(lambda: u32, mv: MotionVector, mvp: MotionVector) -> Cost {
    lambda
        * (bits_se(i32::from(mv.x) - i32::from(mvp.x))
            + bits_se(i32::from(mv.y) - i32::from(mvp.y)))
}

/// Estimated cost of coding a reference index, given how many references
/// are active in the list. A single active reference costs nothing.
#[must_use]
pub fn ref_cost(lambda: u32, active_refs: u8, ref_idx: u8) -> Cost {
    debug_assert!(ref_idx < active_refs);
    lambda * bits_te(u32::from(active_refs) - 1, u32::from(ref_idx))
}

/// Estimated cost of signalling an intra prediction mode index.
#[must_use]
pub fn intra_mode_cost(lambda: u32, mode: u32) -> Cost {
    lambda * bits_ue(mode)
}

/// The single comparison value used throughout search and mode decision.
/// Scores are comparable across candidates sharing the same lambda.
#[must_use]
pub fn score(distortion: u32, bits: u32, lambda: u32) -> Cost {
    distortion + lambda * bits
}
