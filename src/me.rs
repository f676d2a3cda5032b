
use std::num::NonZeroUsize;

use smallvec::SmallVec;

use crate::{
    context::ENC_PITCH,
    cost::{COST_MAX, Cost, mv_cost},
    mv::{MotionVector, MvBounds},
    params::{AnalyseParams, SearchType},
    plane::Plane,
    subpel::{SubpelPlanes, mc_chroma},
    util::{BlockSize, sad::get_sad, satd::get_satd},
};

/// Chroma source and reference planes, when chroma distortion is folded
/// into the motion cost.
#[derive(Debug, Clone, Copy)]
pub struct ChromaMe<'a> {
    pub fenc_cb: &'a [u8],
    pub fenc_cr: &'a [u8],
    pub cb: &'a Plane,
    pub cr: &'a Plane,
}

/// One motion search: the block being matched, its reference, predictor
/// and candidate seeds in, the best vector and its score out.
///
/// The search never fails and never returns a vector scoring worse than
/// its seed; correctness relies on `bounds` having been clipped to the
/// frame and to the reconstructed portion of the reference.
#[derive(Debug)]
pub struct MotionEstimate<'a> {
    pub size: BlockSize,
    /// Source block at [`ENC_PITCH`].
    pub fenc: &'a [u8],
    pub ref_planes: &'a SubpelPlanes,
    /// Block origin in the frame, full-pel units.
    pub pos_x: i32,
    pub pos_y: i32,
    pub mvp: MotionVector,
    /// Alternate seeds (neighbouring partitions' chosen vectors, the zero
    /// vector), each probed once before iterating.
    pub candidates: SmallVec<[MotionVector; 8]>,
    pub bounds: MvBounds,
    pub lambda: u32,
    pub chroma: Option<ChromaMe<'a>>,
    pub mv: MotionVector,
    pub cost: Cost,
}

const DIA_OFFSETS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
const HEX_OFFSETS: [(i32, i32); 6] = [(-2, 0), (-1, -2), (1, -2), (2, 0), (1, 2), (-1, 2)];
const SQUARE_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl<'a> MotionEstimate<'a> {
    pub fn new(
        size: BlockSize,
        fenc: &'a [u8],
        ref_planes: &'a SubpelPlanes,
        pos_x: i32,
        pos_y: i32,
        mvp: MotionVector,
        bounds: MvBounds,
        lambda: u32,
    ) -> Self {
        Self {
            size,
            fenc,
            ref_planes,
            pos_x,
            pos_y,
            mvp,
            candidates: SmallVec::new(),
            bounds,
            lambda,
            chroma: None,
            mv: MotionVector::default(),
            cost: COST_MAX,
        }
    }

    /// SAD + motion cost of a full-pel position.
    fn fullpel_cost(&self, mx: i32, my: i32) -> Cost {
        let full = self.ref_planes.full();
        let sad = get_sad(
            self.size,
            self.fenc,
            NonZeroUsize::new(ENC_PITCH).expect("nonzero"),
            full.slice_at((self.pos_x + mx) as isize, (self.pos_y + my) as isize),
            full.pitch(),
        );
        sad + mv_cost(
            self.lambda,
            MotionVector::new((mx << 2) as i16, (my << 2) as i16),
            self.mvp,
        )
    }

    /// SATD + motion cost (+ folded chroma cost) of a quarter-pel vector.
    fn qpel_cost(&self, mv: MotionVector) -> Cost {
        let mut pred = [0u8; 16 * 16];
        let pitch = NonZeroUsize::new(16).expect("nonzero");
        self.ref_planes.mc_luma(
            &mut pred,
            pitch,
            4 * self.pos_x + i32::from(mv.x),
            4 * self.pos_y + i32::from(mv.y),
            self.size.width(),
            self.size.height(),
        );
        let mut cost = get_satd(
            self.size,
            self.fenc,
            NonZeroUsize::new(ENC_PITCH).expect("nonzero"),
            &pred,
            pitch,
        ) + mv_cost(self.lambda, mv, self.mvp);

        if let Some(chroma) = self.chroma {
            cost += self.chroma_cost(&chroma, mv);
        }
        cost
    }

    fn chroma_cost(&self, chroma: &ChromaMe<'_>, mv: MotionVector) -> Cost {
        let cw = self.size.width() / 2;
        let ch = self.size.height() / 2;
        let cx = 8 * (self.pos_x / 2) + i32::from(mv.x);
        let cy = 8 * (self.pos_y / 2) + i32::from(mv.y);
        let pitch = NonZeroUsize::new(8).expect("nonzero");

        let mut total = 0;
        let mut pred = [0u8; 8 * 8];
        for (fenc, plane) in [(chroma.fenc_cb, chroma.cb), (chroma.fenc_cr, chroma.cr)] {
            mc_chroma(&mut pred, pitch, plane, cx, cy, cw, ch);
            total += sad_rect(fenc, ENC_PITCH, &pred, 8, cw, ch);
        }
        total
    }

    /// Runs the full search: seed probe, coarse full-pel stage, exact
    /// cost, then sub-pel refinement under the preset's search budget.
    /// When `threshold` carries a better cost already found with another
    /// reference, a candidate that cannot beat it skips refinement.
    pub fn search(&mut self, params: &AnalyseParams, threshold: Cost) {
        let (fmx, fmy) = self.mvp.to_fullpel();
        let (smx, smy) = self.bounds.clip_fullpel(fmx, fmy);
        let (mut bmx, mut bmy) = (smx, smy);

        // The seed scores without its motion penalty; alternates must
        // beat it including theirs.
        let full = self.ref_planes.full();
        let mut bcost = get_sad(
            self.size,
            self.fenc,
            NonZeroUsize::new(ENC_PITCH).expect("nonzero"),
            full.slice_at((self.pos_x + bmx) as isize, (self.pos_y + bmy) as isize),
            full.pitch(),
        );

        let candidates = std::mem::take(&mut self.candidates);
        for cand in &candidates {
            let (cx, cy) = cand.to_fullpel();
            let (cx, cy) = self.bounds.clip_fullpel(cx, cy);
            if cx != bmx || cy != bmy {
                let cost = self.fullpel_cost(cx, cy);
                if cost < bcost {
                    bmx = cx;
                    bmy = cy;
                    bcost = cost;
                }
            }
        }
        self.candidates = candidates;

        match params.search {
            SearchType::Diamond => {
                self.pattern_search(&DIA_OFFSETS, params.me_iterations, &mut bmx, &mut bmy, &mut bcost);
            }
            SearchType::Hexagon => {
                self.pattern_search(&HEX_OFFSETS, params.me_iterations, &mut bmx, &mut bmy, &mut bcost);
                self.pattern_search(&SQUARE_OFFSETS, 1, &mut bmx, &mut bmy, &mut bcost);
            }
        }

        // Publish in the exact metric. Scoring the seed too guards
        // against proxy/exact disagreement: the result never scores
        // worse than the seed it started from.
        self.mv = MotionVector::new((smx << 2) as i16, (smy << 2) as i16);
        self.cost = self.qpel_cost(self.mv);
        let coarse = MotionVector::new((bmx << 2) as i16, (bmy << 2) as i16);
        if coarse != self.mv {
            let cost = self.qpel_cost(coarse);
            if cost < self.cost {
                self.mv = coarse;
                self.cost = cost;
            }
        }

        // A reference already beaten by this margin skips sub-pel work.
        if self.cost > threshold {
            return;
        }

        let (hpel, qpel) = params.subpel.search_iters();
        if hpel > 0 || qpel > 0 {
            self.refine_subpel(hpel, qpel);
        }
    }

    /// Re-refines the winner with the heavier per-winner budget.
    pub fn refine_qpel(&mut self, params: &AnalyseParams) {
        let (hpel, qpel) = params.subpel.refine_iters();
        if hpel > 0 || qpel > 0 {
            self.refine_subpel(hpel, qpel);
        }
    }

    /// One stencil stage: evaluate the offsets around the best point,
    /// re-centre on strict improvement, stop when the centre wins or the
    /// iteration cap is reached.
    fn pattern_search(
        &self,
        offsets: &[(i32, i32)],
        iterations: u16,
        bmx: &mut i32,
        bmy: &mut i32,
        bcost: &mut Cost,
    ) {
        for _ in 0..iterations {
            let mut best_idx = None;
            for (i, &(dx, dy)) in offsets.iter().enumerate() {
                let (mx, my) = (*bmx + dx, *bmy + dy);
                let (cx, cy) = self.bounds.clip_fullpel(mx, my);
                if cx != mx || cy != my {
                    continue;
                }
                let cost = self.fullpel_cost(mx, my);
                if cost < *bcost {
                    *bcost = cost;
                    best_idx = Some(i);
                }
            }
            match best_idx {
                Some(i) => {
                    *bmx += offsets[i].0;
                    *bmy += offsets[i].1;
                }
                None => break,
            }
        }
    }

    /// The 4-direction stencil at half-pel then quarter-pel step sizes.
    /// Each step size terminates as soon as no direction improves.
    fn refine_subpel(&mut self, hpel_iters: u8, qpel_iters: u8) {
        let mut bmx = self.mv.x;
        let mut bmy = self.mv.y;

        for step in [2i16, 1] {
            let iters = if step > 1 { hpel_iters } else { qpel_iters };
            for _ in 0..iters {
                let mut best: Option<(i16, i16, Cost)> = None;
                for (dx, dy) in [(0, -step), (0, step), (-step, 0), (step, 0)] {
                    let cand = MotionVector::new(bmx + dx, bmy + dy);
                    if !self.bounds.contains(cand) {
                        continue;
                    }
                    let cost = self.qpel_cost(cand);
                    if cost < best.map_or(self.cost, |b| b.2) {
                        best = Some((cand.x, cand.y, cost));
                    }
                }
                match best {
                    Some((x, y, cost)) => {
                        bmx = x;
                        bmy = y;
                        self.cost = cost;
                    }
                    None => break,
                }
            }
        }

        self.mv = MotionVector::new(bmx, bmy);
    }
}

/// Plain SAD over an arbitrary small rectangle, for chroma cost folding.
fn sad_rect(a: &[u8], a_pitch: usize, b: &[u8], b_pitch: usize, width: usize, height: usize) -> u32 {
    let mut sum = 0u32;
    for y in 0..height {
        let ra = &a[y * a_pitch..][..width];
        let rb = &b[y * b_pitch..][..width];
        for x in 0..width {
            sum += u32::from((i16::from(ra[x]) - i16::from(rb[x])).unsigned_abs());
        }
    }
    sum
}
