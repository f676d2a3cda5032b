
use std::num::NonZeroUsize;
use std::sync::{Condvar, Mutex};

use anyhow::{Result, bail};

use crate::{plane::Plane, subpel::SubpelPlanes};

/// Horizontal padding of reference planes, in luma pixels. Wide enough
/// for the largest legal motion extent plus the interpolation margin.
pub const LUMA_HPAD: usize = 32;
/// Vertical padding of reference planes, in luma pixels.
pub const LUMA_VPAD: usize = 32;

/// Monotonic count of reconstructed rows of a frame, shared between the
/// producing encoder thread and consumers motion-searching against it.
///
/// This is the only blocking point in the engine: a consumer that needs
/// reference rows beyond what has been reconstructed waits here until the
/// producer signals completion.
#[derive(Debug, Default)]
pub struct RowProgress {
    rows: Mutex<usize>,
    cond: Condvar,
}

impl RowProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks rows `0..rows` as reconstructed. The counter only moves
    /// forward; calls with a smaller value are no-ops.
    pub fn complete(&self, rows: usize) {
        let mut done = self.rows.lock().expect("progress lock poisoned");
        if rows > *done {
            *done = rows;
            self.cond.notify_all();
        }
    }

    #[must_use]
    pub fn rows_done(&self) -> usize {
        *self.rows.lock().expect("progress lock poisoned")
    }

    /// Blocks until at least `rows` rows are reconstructed.
    pub fn wait_for(&self, rows: usize) {
        let mut done = self.rows.lock().expect("progress lock poisoned");
        while *done < rows {
            done = self.cond.wait(done).expect("progress lock poisoned");
        }
    }
}

/// Explicit per-reference weighted prediction parameters (gain/offset
/// with a 6-bit denominator).
#[derive(Debug, Clone, Copy)]
pub struct WeightParams {
    pub scale: i32,
    pub offset: i32,
}

impl WeightParams {
    /// Applies the weight to a motion-compensated block in place.
    pub fn apply(&self, block: &mut [u8], pitch: NonZeroUsize, width: usize, height: usize) {
        for y in 0..height {
            let row = &mut block[y * pitch.get()..][..width];
            for p in row.iter_mut() {
                let v = ((self.scale * i32::from(*p) + 32) >> 6) + self.offset;
                *p = v.clamp(0, 255) as u8;
            }
        }
    }
}

/// A reconstructed frame usable as a motion compensation reference:
/// padded luma with precomputed half-pel windows, padded chroma planes,
/// picture order count, reconstruction progress and optional weighting.
#[derive(Debug)]
pub struct ReferenceFrame {
    pub luma: SubpelPlanes,
    pub cb: Plane,
    pub cr: Plane,
    pub poc: i32,
    pub progress: RowProgress,
    pub weight: Option<WeightParams>,
}

impl ReferenceFrame {
    /// Builds a fully reconstructed reference: pads the planes,
    /// interpolates the sub-pel windows and marks every row complete.
    pub fn new(luma: Plane, cb: Plane, cr: Plane, poc: i32) -> Result<Self> {
        if luma.hpad() < LUMA_HPAD || luma.vpad() < LUMA_VPAD {
            bail!(
                "ReferenceFrame: luma must carry at least {LUMA_HPAD}x{LUMA_VPAD} padding, got {}x{}.",
                luma.hpad(),
                luma.vpad()
            );
        }
        let height = luma.height();
        let luma = SubpelPlanes::build(luma)?;
        let progress = RowProgress::new();
        progress.complete(height);
        Ok(Self {
            luma,
            cb,
            cr,
            poc,
            progress,
            weight: None,
        })
    }

    /// Rows of this reference guaranteed readable, taking field parity
    /// into account when the reference stores interleaved fields: the
    /// caller asks in field rows and the stored counter is frame rows.
    #[must_use]
    pub fn rows_available(&self, field: Option<FieldParity>) -> usize {
        let done = self.progress.rows_done();
        match field {
            None => done,
            Some(parity) => done.saturating_sub(parity.offset()) / 2,
        }
    }
}

/// Which field of an interlaced frame a field picture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldParity {
    Top,
    Bottom,
}

impl FieldParity {
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            FieldParity::Top => 0,
            FieldParity::Bottom => 1,
        }
    }
}

/// Distance-derived weight for bidirectional averaging, from the picture
/// order counts of the current frame and the two references. Returns the
/// 6-bit weight applied to the list-1 prediction; 32 is a plain average.
#[must_use]
pub fn bipred_weight(poc_cur: i32, poc_l0: i32, poc_l1: i32, weighted: bool) -> i32 {
    let td = (poc_l1 - poc_l0).clamp(-128, 127);
    if td == 0 {
        return 32;
    }
    let tb = (poc_cur - poc_l0).clamp(-128, 127);
    let tx = (16384 + (td.abs() >> 1)) / td;
    let dist_scale_factor = ((tb * tx + 32) >> 6).clamp(-1024, 1023) >> 2;

    if weighted && (-64..=128).contains(&dist_scale_factor) {
        dist_scale_factor
    } else {
        32
    }
}
