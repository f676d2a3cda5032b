use crate::context::{EncPixels, MbType};

/// Exact distortion and bit cost of a candidate, measured by the
/// transform/quantize/entropy backend.
#[derive(Debug, Clone, Copy)]
pub struct RdCost {
    pub distortion: u64,
    pub bits: u32,
}

/// A finalized-enough candidate handed to the oracle: the mode class and
/// its full prediction, against the macroblock source pixels.
#[derive(Debug)]
pub struct ModeCandidate<'a> {
    pub mb_type: MbType,
    pub fenc: &'a EncPixels,
    /// Predicted pixels in the same dense layout as `fenc`.
    pub pred: &'a EncPixels,
    pub qp: u8,
}

/// The transform/quantization and entropy-size backend, consumed as a
/// cost-evaluation collaborator.
///
/// `probe_skip` answers whether the residual of a skip-candidate
/// prediction quantizes to (near) nothing at the current QP, using the
/// backend's own decimation rule. `exact_cost` replaces the fast
/// distortion proxy during the optional refinement pass.
pub trait RdOracle {
    fn probe_skip(&mut self, cand: &ModeCandidate<'_>) -> bool;

    fn exact_cost(&mut self, cand: &ModeCandidate<'_>) -> RdCost;
}
