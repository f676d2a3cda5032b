#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;

use anyhow::Result;
use smallvec::SmallVec;

use crate::{
    context::{
        BLOCK_IDX_X, BLOCK_IDX_Y, DEC_PITCH, DecPixels, ENC_PITCH, EncPixels, FrameContext,
        MbContext, MbPartition, MbType, RefState, SCAN8, SubPartition,
    },
    cost::{COST_MAX, Cost, lambda_for_qp, mv_cost, ref_cost},
    frame::{MacroblockAddress, SliceType, SourceFrame},
    me::{ChromaMe, MotionEstimate},
    mv::{MotionVector, MvBounds, ZERO_MV},
    oracle::{ModeCandidate, RdOracle},
    params::{AnalyseFlags, AnalyseParams},
    predict::{
        Predict16, PredictChroma, PredictNxN, modes_16x16, modes_chroma, modes_nxn, predict_16x16,
        predict_4x4, predict_8x8, predict_chroma,
    },
    reference::{ReferenceFrame, bipred_weight},
    subpel::mc_chroma,
    util::{BlockSize, average_block_weighted, copy_block, math::bits_ue, satd::get_satd},
};

/// The reference lists for the current slice.
#[derive(Debug, Clone, Copy)]
pub struct RefPicLists<'a> {
    pub list0: &'a [ReferenceFrame],
    pub list1: &'a [ReferenceFrame],
}

/// The finalized decision for one macroblock: everything the residual
/// stage, entropy coder and deblocking filter need.
///
/// `nnz` and `cbp` are placeholders when the result leaves the analysis;
/// the residual stage fills them in before the result is committed with
/// [`MbContext::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub mb_type: MbType,
    pub partition: MbPartition,
    pub sub_partition: [SubPartition; 4],
    /// Reference per 8x8 block and list.
    pub refs: [[RefState; 4]; 2],
    /// Motion vector per 4x4 block and list (raster order).
    pub mv: [[MotionVector; 16]; 2],
    pub intra16_mode: Predict16,
    pub intra4_modes: [PredictNxN; 16],
    pub intra8_modes: [PredictNxN; 4],
    pub chroma_mode: PredictChroma,
    pub transform_8x8: bool,
    pub cost: Cost,
    pub qp: u8,
    pub nnz: [u8; 24],
    pub cbp: u16,
}

impl AnalysisResult {
    fn new(qp: u8) -> Self {
        Self {
            mb_type: MbType::I4x4,
            partition: MbPartition::D16x16,
            sub_partition: [SubPartition::L08x8; 4],
            refs: [[RefState::Intra; 4]; 2],
            mv: [[ZERO_MV; 16]; 2],
            intra16_mode: Predict16::Dc128,
            intra4_modes: [PredictNxN::Dc128; 16],
            intra8_modes: [PredictNxN::Dc128; 4],
            chroma_mode: PredictChroma::Dc128,
            transform_8x8: false,
            cost: COST_MAX,
            qp,
            nnz: [0; 24],
            cbp: 0,
        }
    }
}

/// One partition instance's search outcome.
#[derive(Debug, Clone, Copy, Default)]
struct PartMe {
    mv: MotionVector,
    mvp: MotionVector,
    cost: Cost,
}

/// Per-list inter analysis state.
#[derive(Debug, Clone)]
struct ListAnalysis {
    ref_idx: u8,
    me16x16: PartMe,
    cost8x8: Cost,
    me8x8: [PartMe; 4],
    cost16x8: Cost,
    me16x8: [PartMe; 2],
    cost8x16: Cost,
    me8x16: [PartMe; 2],
    cost_sub: [Cost; 4],
    sub_partition: [SubPartition; 4],
    me4x4: [[PartMe; 4]; 4],
    me8x4: [[PartMe; 2]; 4],
    me4x8: [[PartMe; 2]; 4],
}

impl Default for ListAnalysis {
    fn default() -> Self {
        Self {
            ref_idx: 0,
            me16x16: PartMe::default(),
            cost8x8: COST_MAX,
            me8x8: [PartMe::default(); 4],
            cost16x8: COST_MAX,
            me16x8: [PartMe::default(); 2],
            cost8x16: COST_MAX,
            me8x16: [PartMe::default(); 2],
            cost_sub: [COST_MAX; 4],
            sub_partition: [SubPartition::L08x8; 4],
            me4x4: [[PartMe::default(); 4]; 4],
            me8x4: [[PartMe::default(); 2]; 4],
            me4x8: [[PartMe::default(); 2]; 4],
        }
    }
}

/// Intra evaluation outcome.
#[derive(Debug, Clone)]
struct IntraAnalysis {
    cost16: Cost,
    mode16: Predict16,
    cost4: Option<Cost>,
    modes4: [PredictNxN; 16],
    cost8: Option<Cost>,
    modes8: [PredictNxN; 4],
}

/// Signalling bits of the P macroblock partition shapes, from their
/// variable-length codes: larger, simpler partitions are cheaper, which
/// biases selection toward them unless finer partitioning pays for
/// itself.
fn partition_bits(partition: MbPartition) -> u32 {
    match partition {
        MbPartition::D16x16 => bits_ue(0),
        MbPartition::D16x8 => bits_ue(1),
        MbPartition::D8x16 => bits_ue(2),
        MbPartition::D8x8 => bits_ue(3),
    }
}

fn sub_partition_bits(sub: SubPartition) -> u32 {
    match sub {
        SubPartition::L08x8 => bits_ue(0),
        SubPartition::L08x4 => bits_ue(1),
        SubPartition::L04x8 => bits_ue(2),
        SubPartition::L04x4 => bits_ue(3),
    }
}

/// The macroblock decision engine. Owns nothing but the configuration;
/// all per-macroblock state lives in the caller's [`MbContext`].
#[derive(Debug, Clone)]
pub struct Analyser {
    params: AnalyseParams,
}

impl Analyser {
    pub fn new(params: AnalyseParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    #[must_use]
    pub fn params(&self) -> &AnalyseParams {
        &self.params
    }

    /// Analyses one macroblock: loads the neighbour context and pixel
    /// caches, evaluates the candidate modes for the slice type, and
    /// returns the winning decision with the motion caches stamped.
    ///
    /// Call [`MbContext::save`] with the returned result (after the
    /// residual stage has set `nnz`/`cbp`) to commit it to the store.
    pub fn analyse_macroblock(
        &self,
        ctx: &mut MbContext,
        fctx: &FrameContext,
        addr: MacroblockAddress,
        qp: u8,
        src: &SourceFrame,
        recon: &SourceFrame,
        refs: &RefPicLists<'_>,
        oracle: &mut dyn RdOracle,
    ) -> AnalysisResult {
        ctx.load(fctx, addr);
        ctx.load_pixels(src, recon);

        // Large QP swings between neighbouring macroblocks are illegal to
        // signal; clamp against the running QP.
        let last_qp = i32::from(fctx.last_qp());
        let qp = i32::from(qp).clamp(last_qp - 12, last_qp + 12).clamp(0, 51) as u8;
        let lambda = lambda_for_qp(qp);

        let mut res = AnalysisResult::new(qp);

        match ctx.slice.slice_type {
            SliceType::I => self.analyse_i(ctx, lambda, &mut res),
            SliceType::P => self.analyse_p(ctx, src, refs, lambda, oracle, &mut res),
            SliceType::B => self.analyse_b(ctx, src, refs, lambda, &mut res),
        }

        res
    }

    fn analyse_i(&self, ctx: &mut MbContext, lambda: u32, res: &mut AnalysisResult) {
        let ia = self.analyse_intra(ctx, lambda, COST_MAX);
        self.finalize_intra(ctx, &ia, lambda, res);
    }

    fn analyse_p(
        &self,
        ctx: &mut MbContext,
        src: &SourceFrame,
        refs: &RefPicLists<'_>,
        lambda: u32,
        oracle: &mut dyn RdOracle,
        res: &mut AnalysisResult,
    ) {
        debug_assert!(!refs.list0.is_empty());
        let bounds = self.mv_bounds(ctx, src, refs.list0);

        // Fast skip path: probe when a causal neighbour skipped too, or
        // when there is no neighbour to hint either way (the predicted
        // vector is zero there and the probe is cheap).
        let skip_plausible = ctx.neighbours.is_empty()
            || [ctx.type_left, ctx.type_top, ctx.type_topleft, ctx.type_topright]
                .iter()
                .any(|t| *t == Some(MbType::PSkip));
        if skip_plausible && self.probe_skip(ctx, refs, bounds, oracle, res) {
            return;
        }

        let mut l0 = ListAnalysis::default();
        self.inter_p16x16(ctx, refs.list0, bounds, lambda, &mut l0);

        let mut best_cost =
            l0.me16x16.cost + lambda * partition_bits(MbPartition::D16x16);
        let mut best_partition = MbPartition::D16x16;

        if self.params.flags.contains(AnalyseFlags::PSUB16X16) {
            self.inter_p8x8(ctx, refs.list0, bounds, lambda, &mut l0);

            let cost8x8 = l0.cost8x8 + lambda * partition_bits(MbPartition::D8x8);
            if cost8x8 < best_cost {
                best_partition = MbPartition::D8x8;
                best_cost = cost8x8;

                if self.params.flags.contains(AnalyseFlags::PSUB8X8) {
                    for i in 0..4 {
                        best_cost += self.inter_sub8x8(ctx, refs.list0, bounds, lambda, &mut l0, i);
                    }
                }

                self.inter_p16x8(ctx, refs.list0, bounds, lambda, &mut l0);
                let cost16x8 = l0.cost16x8 + lambda * partition_bits(MbPartition::D16x8);
                if cost16x8 < best_cost {
                    best_partition = MbPartition::D16x8;
                    best_cost = cost16x8;
                }

                self.inter_p8x16(ctx, refs.list0, bounds, lambda, &mut l0);
                let cost8x16 = l0.cost8x16 + lambda * partition_bits(MbPartition::D8x16);
                if cost8x16 < best_cost {
                    best_partition = MbPartition::D8x16;
                    best_cost = cost8x16;
                }
            }
        }

        // Sub-pel re-refinement of the winning partition's vectors
        best_cost = self.refine_partition(ctx, refs.list0, bounds, lambda, &mut l0, best_partition);

        let ia = self.analyse_intra(ctx, lambda, best_cost);
        let intra_cost = ia.best_cost();

        if intra_cost < best_cost {
            self.finalize_intra(ctx, &ia, lambda, res);
        } else {
            self.finalize_inter_p(ctx, &l0, best_partition, best_cost, res);
        }

        if self.params.rdo {
            self.rdo_arbitrate(ctx, refs, &ia, &l0, best_partition, best_cost, intra_cost, res, oracle);
        }
    }

    fn analyse_b(
        &self,
        ctx: &mut MbContext,
        src: &SourceFrame,
        refs: &RefPicLists<'_>,
        lambda: u32,
        res: &mut AnalysisResult,
    ) {
        debug_assert!(!refs.list0.is_empty() && !refs.list1.is_empty());
        let bounds_l0 = self.mv_bounds(ctx, src, refs.list0);
        let bounds_l1 = self.mv_bounds(ctx, src, refs.list1);

        let mut l0 = ListAnalysis::default();
        let mut l1 = ListAnalysis::default();
        self.inter_b16x16_list(ctx, refs.list0, 0, bounds_l0, lambda, &mut l0);
        self.inter_b16x16_list(ctx, refs.list1, 1, bounds_l1, lambda, &mut l1);

        ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(l0.ref_idx));
        ctx.cache_ref(0, 0, 4, 4, 1, RefState::Ref(l1.ref_idx));

        let cost_bi = self.cost_b_bidir(ctx, refs, src.poc, lambda, &l0, &l1);

        let mut best_type = MbType::BL0;
        let mut best_cost = l0.me16x16.cost;
        if l1.me16x16.cost < best_cost {
            best_type = MbType::BL1;
            best_cost = l1.me16x16.cost;
        }
        if cost_bi < best_cost {
            best_type = MbType::BBi;
            best_cost = cost_bi;
        }

        let ia = self.analyse_intra(ctx, lambda, best_cost);
        if ia.best_cost() < best_cost {
            self.finalize_intra(ctx, &ia, lambda, res);
        } else {
            self.finalize_inter_b(ctx, &l0, &l1, best_type, best_cost, res);
        }
    }

    /// Search range for this macroblock: clipped to the padded frame
    /// extent and, when a reference is still being reconstructed, to the
    /// rows its producer has guaranteed. Waiting here is the engine's
    /// only blocking point.
    fn mv_bounds(
        &self,
        ctx: &MbContext,
        src: &SourceFrame,
        list: &[ReferenceFrame],
    ) -> MvBounds {
        let width = src.luma.width() as i32;
        let height = src.luma.height() as i32;
        let hpad = crate::reference::LUMA_HPAD as i32;
        let vpad = crate::reference::LUMA_VPAD as i32;
        let mb_x = ctx.addr.x as i32;
        let mb_y = ctx.addr.y as i32;
        let field = ctx.field;

        // Interpolation margin inside the padding
        let margin = 4;
        let min_x = -(16 * mb_x) - (hpad - margin);
        let max_x = (width - 16 * (mb_x + 1)) + (hpad - margin);
        let min_y = -(16 * mb_y) - (vpad - margin);
        let mut max_y = (height - 16 * (mb_y + 1)) + (vpad - margin);

        let needed = ((16 * (mb_y + 1) + 8).min(height)) as usize;
        for r in list {
            match field {
                None => r.progress.wait_for(needed),
                Some(parity) => r.progress.wait_for(2 * needed + parity.offset()),
            }
            let avail = r.rows_available(field) as i32;
            if avail < height {
                max_y = max_y.min(avail - 16 * (mb_y + 1) - margin);
            }
        }

        MvBounds {
            min_x: (4 * min_x).clamp(i32::from(i16::MIN), 0) as i16,
            max_x: (4 * max_x).max(0) as i16,
            min_y: (4 * min_y).clamp(i32::from(i16::MIN), 0) as i16,
            max_y: (4 * max_y).max(0) as i16,
        }
    }

    fn run_me(
        &self,
        ctx: &MbContext,
        reference: &ReferenceFrame,
        size: BlockSize,
        x4: usize,
        y4: usize,
        mvp: MotionVector,
        candidates: &[MotionVector],
        bounds: MvBounds,
        lambda: u32,
        threshold: Cost,
    ) -> PartMe {
        let fenc = &ctx.enc.luma[4 * y4 * ENC_PITCH + 4 * x4..];
        let mut me = MotionEstimate::new(
            size,
            fenc,
            &reference.luma,
            (16 * ctx.addr.x + 4 * x4) as i32,
            (16 * ctx.addr.y + 4 * y4) as i32,
            mvp,
            bounds,
            lambda,
        );
        me.candidates = SmallVec::from_slice(candidates);
        me.candidates.push(ZERO_MV);
        if self.params.flags.contains(AnalyseFlags::CHROMA_ME) && size.width() >= 8 {
            me.chroma = Some(ChromaMe {
                fenc_cb: &ctx.enc.cb[2 * y4 * ENC_PITCH + 2 * x4..],
                fenc_cr: &ctx.enc.cr[2 * y4 * ENC_PITCH + 2 * x4..],
                cb: &reference.cb,
                cr: &reference.cr,
            });
        }
        me.search(&self.params, threshold);
        PartMe {
            mv: me.mv,
            mvp,
            cost: me.cost,
        }
    }

    /// 16x16 list-0 search over every active reference, with the running
    /// best letting worse references skip sub-pel refinement.
    fn inter_p16x16(
        &self,
        ctx: &mut MbContext,
        list0: &[ReferenceFrame],
        bounds: MvBounds,
        lambda: u32,
        l0: &mut ListAnalysis,
    ) {
        let active = ctx.slice.num_ref_idx_active[0].min(list0.len() as u8);
        let mut best = PartMe {
            cost: COST_MAX,
            ..PartMe::default()
        };
        let mut best_ref = 0u8;

        for (ref_idx, reference) in list0.iter().take(usize::from(active)).enumerate() {
            let mvp = ctx.predict_mv_16x16(0, ref_idx as u8);
            let threshold = best.cost;
            let mut me = self.run_me(
                ctx,
                reference,
                BlockSize::B16x16,
                0,
                0,
                mvp,
                &[],
                bounds,
                lambda,
                threshold,
            );
            if ref_idx > 0 {
                me.cost += ref_cost(lambda, active, ref_idx as u8);
            }
            if me.cost < best.cost {
                best = me;
                best_ref = ref_idx as u8;
            }
        }

        l0.ref_idx = best_ref;
        l0.me16x16 = best;

        // The chosen reference seeds the predictors of every other
        // partition shape.
        ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(best_ref));
        ctx.cache_mv(0, 0, 4, 4, 0, best.mv);
    }

    fn inter_p8x8(
        &self,
        ctx: &mut MbContext,
        list0: &[ReferenceFrame],
        bounds: MvBounds,
        lambda: u32,
        l0: &mut ListAnalysis,
    ) {
        let reference = &list0[usize::from(l0.ref_idx)];
        let mut total = 0;

        for i in 0..4 {
            let x4 = 2 * (i % 2);
            let y4 = 2 * (i / 2);
            let mvp = ctx.predict_mv(0, 4 * i, 2, l0.ref_idx, MbPartition::D8x8);
            let me = self.run_me(
                ctx,
                reference,
                BlockSize::B8x8,
                x4,
                y4,
                mvp,
                &[l0.me16x16.mv],
                bounds,
                lambda,
                COST_MAX,
            );
            ctx.cache_mv(x4, y4, 2, 2, 0, me.mv);
            l0.me8x8[i] = me;
            // Each 8x8 block signals its own sub-shape
            total += me.cost + lambda * sub_partition_bits(SubPartition::L08x8);
        }

        l0.cost8x8 = total;
    }

    fn inter_p16x8(
        &self,
        ctx: &mut MbContext,
        list0: &[ReferenceFrame],
        bounds: MvBounds,
        lambda: u32,
        l0: &mut ListAnalysis,
    ) {
        let reference = &list0[usize::from(l0.ref_idx)];
        let mut total = 0;

        for i in 0..2 {
            let mvp = ctx.predict_mv(0, 8 * i, 4, l0.ref_idx, MbPartition::D16x8);
            let me = self.run_me(
                ctx,
                reference,
                BlockSize::B16x8,
                0,
                2 * i,
                mvp,
                &[l0.me8x8[2 * i].mv],
                bounds,
                lambda,
                COST_MAX,
            );
            ctx.cache_mv(0, 2 * i, 4, 2, 0, me.mv);
            l0.me16x8[i] = me;
            total += me.cost;
        }

        l0.cost16x8 = total;
    }

    fn inter_p8x16(
        &self,
        ctx: &mut MbContext,
        list0: &[ReferenceFrame],
        bounds: MvBounds,
        lambda: u32,
        l0: &mut ListAnalysis,
    ) {
        let reference = &list0[usize::from(l0.ref_idx)];
        let mut total = 0;

        for i in 0..2 {
            let mvp = ctx.predict_mv(0, 4 * i, 2, l0.ref_idx, MbPartition::D8x16);
            let me = self.run_me(
                ctx,
                reference,
                BlockSize::B8x16,
                2 * i,
                0,
                mvp,
                &[l0.me8x8[i].mv],
                bounds,
                lambda,
                COST_MAX,
            );
            ctx.cache_mv(2 * i, 0, 2, 4, 0, me.mv);
            l0.me8x16[i] = me;
            total += me.cost;
        }

        l0.cost8x16 = total;
    }

    /// Evaluates the 8x4/4x8/4x4 sub-shapes of one 8x8 block and returns
    /// the cost delta against keeping it whole.
    fn inter_sub8x8(
        &self,
        ctx: &mut MbContext,
        list0: &[ReferenceFrame],
        bounds: MvBounds,
        lambda: u32,
        l0: &mut ListAnalysis,
        i8: usize,
    ) -> Cost {
        let reference = &list0[usize::from(l0.ref_idx)];
        let whole = l0.me8x8[i8].cost + lambda * sub_partition_bits(SubPartition::L08x8);
        l0.cost_sub[i8] = whole;
        l0.sub_partition[i8] = SubPartition::L08x8;

        // 4x4 split first; its vectors seed the rectangular shapes.
        let mut cost4x4 = lambda * sub_partition_bits(SubPartition::L04x4);
        for i4 in 0..4 {
            let idx = 4 * i8 + i4;
            let x4 = BLOCK_IDX_X[idx];
            let y4 = BLOCK_IDX_Y[idx];
            let mvp = ctx.predict_mv(0, idx, 1, l0.ref_idx, MbPartition::D8x8);
            let me = self.run_me(
                ctx,
                reference,
                BlockSize::B4x4,
                x4,
                y4,
                mvp,
                &[l0.me8x8[i8].mv],
                bounds,
                lambda,
                COST_MAX,
            );
            ctx.cache_mv(x4, y4, 1, 1, 0, me.mv);
            l0.me4x4[i8][i4] = me;
            cost4x4 += me.cost;
        }

        if cost4x4 < l0.cost_sub[i8] {
            l0.cost_sub[i8] = cost4x4;
            l0.sub_partition[i8] = SubPartition::L04x4;

            let mut cost8x4 = lambda * sub_partition_bits(SubPartition::L08x4);
            for i in 0..2 {
                let idx = 4 * i8 + 2 * i;
                let x4 = BLOCK_IDX_X[idx];
                let y4 = BLOCK_IDX_Y[idx];
                let mvp = ctx.predict_mv(0, idx, 2, l0.ref_idx, MbPartition::D8x8);
                let me = self.run_me(
                    ctx,
                    reference,
                    BlockSize::B8x4,
                    x4,
                    y4,
                    mvp,
                    &[l0.me4x4[i8][0].mv],
                    bounds,
                    lambda,
                    COST_MAX,
                );
                ctx.cache_mv(x4, y4, 2, 1, 0, me.mv);
                l0.me8x4[i8][i] = me;
                cost8x4 += me.cost;
            }
            if cost8x4 < l0.cost_sub[i8] {
                l0.cost_sub[i8] = cost8x4;
                l0.sub_partition[i8] = SubPartition::L08x4;
            }

            let mut cost4x8 = lambda * sub_partition_bits(SubPartition::L04x8);
            for i in 0..2 {
                let idx = 4 * i8 + i;
                let x4 = BLOCK_IDX_X[idx];
                let y4 = BLOCK_IDX_Y[idx];
                let mvp = ctx.predict_mv(0, idx, 1, l0.ref_idx, MbPartition::D8x8);
                let me = self.run_me(
                    ctx,
                    reference,
                    BlockSize::B4x8,
                    x4,
                    y4,
                    mvp,
                    &[l0.me4x4[i8][0].mv],
                    bounds,
                    lambda,
                    COST_MAX,
                );
                ctx.cache_mv(x4, y4, 1, 2, 0, me.mv);
                l0.me4x8[i8][i] = me;
                cost4x8 += me.cost;
            }
            if cost4x8 < l0.cost_sub[i8] {
                l0.cost_sub[i8] = cost4x8;
                l0.sub_partition[i8] = SubPartition::L04x8;
            }

            // Restore the winning sub-shape's vectors in the cache so the
            // next 8x8 block predicts from what will be committed.
            self.stamp_sub8x8(ctx, l0, i8);
        }

        l0.cost_sub[i8] - whole
    }

    fn stamp_sub8x8(&self, ctx: &mut MbContext, l0: &ListAnalysis, i8: usize) {
        let x = 2 * (i8 % 2);
        let y = 2 * (i8 / 2);
        match l0.sub_partition[i8] {
            SubPartition::L08x8 => {
                ctx.cache_mv(x, y, 2, 2, 0, l0.me8x8[i8].mv);
            }
            SubPartition::L08x4 => {
                ctx.cache_mv(x, y, 2, 1, 0, l0.me8x4[i8][0].mv);
                ctx.cache_mv(x, y + 1, 2, 1, 0, l0.me8x4[i8][1].mv);
            }
            SubPartition::L04x8 => {
                ctx.cache_mv(x, y, 1, 2, 0, l0.me4x8[i8][0].mv);
                ctx.cache_mv(x + 1, y, 1, 2, 0, l0.me4x8[i8][1].mv);
            }
            SubPartition::L04x4 => {
                for i4 in 0..4 {
                    let idx = 4 * i8 + i4;
                    ctx.cache_mv(BLOCK_IDX_X[idx], BLOCK_IDX_Y[idx], 1, 1, 0, l0.me4x4[i8][i4].mv);
                }
            }
        }
    }

    /// Re-runs sub-pel refinement on the winning partition's vectors with
    /// the heavier winner-only budget, returning the updated cost.
    fn refine_partition(
        &self,
        ctx: &mut MbContext,
        list0: &[ReferenceFrame],
        bounds: MvBounds,
        lambda: u32,
        l0: &mut ListAnalysis,
        partition: MbPartition,
    ) -> Cost {
        let reference = &list0[usize::from(l0.ref_idx)];
        let refine = |me: &mut PartMe, size: BlockSize, x4: usize, y4: usize, ctx: &MbContext| {
            let fenc = &ctx.enc.luma[4 * y4 * ENC_PITCH + 4 * x4..];
            let mut est = MotionEstimate::new(
                size,
                fenc,
                &reference.luma,
                (16 * ctx.addr.x + 4 * x4) as i32,
                (16 * ctx.addr.y + 4 * y4) as i32,
                me.mvp,
                bounds,
                lambda,
            );
            est.mv = me.mv;
            est.cost = me.cost;
            est.refine_qpel(&self.params);
            me.mv = est.mv;
            me.cost = est.cost;
        };

        match partition {
            MbPartition::D16x16 => {
                let mut me = l0.me16x16;
                refine(&mut me, BlockSize::B16x16, 0, 0, ctx);
                l0.me16x16 = me;
                ctx.cache_mv(0, 0, 4, 4, 0, me.mv);
                me.cost + lambda * partition_bits(MbPartition::D16x16)
            }
            MbPartition::D16x8 => {
                let mut total = lambda * partition_bits(MbPartition::D16x8);
                for i in 0..2 {
                    let mut me = l0.me16x8[i];
                    refine(&mut me, BlockSize::B16x8, 0, 2 * i, ctx);
                    l0.me16x8[i] = me;
                    ctx.cache_mv(0, 2 * i, 4, 2, 0, me.mv);
                    total += me.cost;
                }
                total
            }
            MbPartition::D8x16 => {
                let mut total = lambda * partition_bits(MbPartition::D8x16);
                for i in 0..2 {
                    let mut me = l0.me8x16[i];
                    refine(&mut me, BlockSize::B8x16, 2 * i, 0, ctx);
                    l0.me8x16[i] = me;
                    ctx.cache_mv(2 * i, 0, 2, 4, 0, me.mv);
                    total += me.cost;
                }
                total
            }
            MbPartition::D8x8 => {
                let mut total = lambda * partition_bits(MbPartition::D8x8);
                for i8 in 0..4 {
                    let x = 2 * (i8 % 2);
                    let y = 2 * (i8 / 2);
                    match l0.sub_partition[i8] {
                        SubPartition::L08x8 => {
                            let mut me = l0.me8x8[i8];
                            refine(&mut me, BlockSize::B8x8, x, y, ctx);
                            l0.me8x8[i8] = me;
                            total += me.cost + lambda * sub_partition_bits(SubPartition::L08x8);
                        }
                        SubPartition::L08x4 => {
                            total += lambda * sub_partition_bits(SubPartition::L08x4);
                            for i in 0..2 {
                                let mut me = l0.me8x4[i8][i];
                                refine(&mut me, BlockSize::B8x4, x, y + i, ctx);
                                l0.me8x4[i8][i] = me;
                                total += me.cost;
                            }
                        }
                        SubPartition::L04x8 => {
                            total += lambda * sub_partition_bits(SubPartition::L04x8);
                            for i in 0..2 {
                                let mut me = l0.me4x8[i8][i];
                                refine(&mut me, BlockSize::B4x8, x + i, y, ctx);
                                l0.me4x8[i8][i] = me;
                                total += me.cost;
                            }
                        }
                        SubPartition::L04x4 => {
                            total += lambda * sub_partition_bits(SubPartition::L04x4);
                            for i4 in 0..4 {
                                let idx = 4 * i8 + i4;
                                let mut me = l0.me4x4[i8][i4];
                                refine(
                                    &mut me,
                                    BlockSize::B4x4,
                                    BLOCK_IDX_X[idx],
                                    BLOCK_IDX_Y[idx],
                                    ctx,
                                );
                                l0.me4x4[i8][i4] = me;
                                total += me.cost;
                            }
                        }
                    }
                    self.stamp_sub8x8(ctx, l0, i8);
                }
                total
            }
        }
    }

    fn inter_b16x16_list(
        &self,
        ctx: &mut MbContext,
        list: &[ReferenceFrame],
        list_idx: usize,
        bounds: MvBounds,
        lambda: u32,
        la: &mut ListAnalysis,
    ) {
        let active = ctx.slice.num_ref_idx_active[list_idx].min(list.len() as u8);
        let mut best = PartMe {
            cost: COST_MAX,
            ..PartMe::default()
        };
        let mut best_ref = 0u8;

        for (ref_idx, reference) in list.iter().take(usize::from(active)).enumerate() {
            let mvp = ctx.predict_mv_16x16(list_idx, ref_idx as u8);
            let mut me = self.run_me(
                ctx,
                reference,
                BlockSize::B16x16,
                0,
                0,
                mvp,
                &[],
                bounds,
                lambda,
                best.cost,
            );
            if ref_idx > 0 {
                me.cost += ref_cost(lambda, active, ref_idx as u8);
            }
            if me.cost < best.cost {
                best = me;
                best_ref = ref_idx as u8;
            }
        }

        la.ref_idx = best_ref;
        la.me16x16 = best;
    }

    /// Cost of averaging the two lists' compensated blocks with the
    /// distance-derived weight.
    fn cost_b_bidir(
        &self,
        ctx: &MbContext,
        refs: &RefPicLists<'_>,
        poc_cur: i32,
        lambda: u32,
        l0: &ListAnalysis,
        l1: &ListAnalysis,
    ) -> Cost {
        let r0 = &refs.list0[usize::from(l0.ref_idx)];
        let r1 = &refs.list1[usize::from(l1.ref_idx)];
        let pitch = NonZeroUsize::new(16).expect("nonzero");

        let mut pix0 = [0u8; 16 * 16];
        let mut pix1 = [0u8; 16 * 16];
        let x = 16 * ctx.addr.x as i32;
        let y = 16 * ctx.addr.y as i32;
        r0.luma.mc_luma(
            &mut pix0,
            pitch,
            4 * x + i32::from(l0.me16x16.mv.x),
            4 * y + i32::from(l0.me16x16.mv.y),
            16,
            16,
        );
        r1.luma.mc_luma(
            &mut pix1,
            pitch,
            4 * x + i32::from(l1.me16x16.mv.x),
            4 * y + i32::from(l1.me16x16.mv.y),
            16,
            16,
        );

        let weight = bipred_weight(poc_cur, r0.poc, r1.poc, ctx.slice.weighted_bipred);
        let mut avg = [0u8; 16 * 16];
        average_block_weighted(&mut avg, pitch, &pix0, pitch, &pix1, pitch, 16, 16, weight);

        let active0 = ctx.slice.num_ref_idx_active[0];
        let active1 = ctx.slice.num_ref_idx_active[1];
        get_satd(
            BlockSize::B16x16,
            &ctx.enc.luma,
            NonZeroUsize::new(ENC_PITCH).expect("nonzero"),
            &avg,
            pitch,
        ) + ref_cost(lambda, active0, l0.ref_idx)
            + ref_cost(lambda, active1, l1.ref_idx)
            + mv_cost(lambda, l0.me16x16.mv, l0.me16x16.mvp)
            + mv_cost(lambda, l1.me16x16.mv, l1.me16x16.mvp)
    }

    /// Intra evaluation: 16x16 always, the finer sizes only while they
    /// can still plausibly beat the best inter cost.
    fn analyse_intra(&self, ctx: &mut MbContext, lambda: u32, best_inter: Cost) -> IntraAnalysis {
        let enc_pitch = NonZeroUsize::new(ENC_PITCH).expect("nonzero");
        let dec_pitch = NonZeroUsize::new(DEC_PITCH).expect("nonzero");

        let mut ia = IntraAnalysis {
            cost16: COST_MAX,
            mode16: Predict16::Dc128,
            cost4: None,
            modes4: [PredictNxN::Dc128; 16],
            cost8: None,
            modes8: [PredictNxN::Dc128; 4],
        };

        for &mode in modes_16x16(ctx.neighbours) {
            predict_16x16(&mut ctx.dec, mode);
            let dec_block = dec_luma_block(&ctx.dec, 0, 0);
            let cost = get_satd(BlockSize::B16x16, &ctx.enc.luma, enc_pitch, dec_block, dec_pitch)
                + lambda * bits_ue(u32::from(mode.fix()));
            if cost < ia.cost16 {
                ia.cost16 = cost;
                ia.mode16 = mode;
            }
        }

        // Fast exit: when whole-block intra is already far worse than
        // inter, the finer sizes will not rescue it.
        let margin = best_inter.saturating_mul(self.params.intra_exit_mul);
        if ia.cost16 > margin {
            return ia;
        }

        // The sizing passes stamp their winning modes into the cache for
        // their own later blocks' predictors; restore between passes so
        // neither sees the other's decisions.
        let entry_modes = ctx.cache.intra4x4_mode;

        if self.params.flags.contains(AnalyseFlags::I8X8) {
            let mut total = 0;
            for i8 in 0..4 {
                let idx = [0, 4, 8, 12][i8];
                let pred_mode = ctx.predict_intra4x4_mode(idx);
                let mut best = COST_MAX;
                for &mode in modes_nxn(ctx.neighbour8[i8]) {
                    predict_8x8(&mut ctx.dec, i8, mode, ctx.neighbour8[i8]);
                    let enc = &ctx.enc.luma[8 * (i8 / 2) * ENC_PITCH + 8 * (i8 % 2)..];
                    let dec_block = dec_luma_block(&ctx.dec, 8 * (i8 % 2), 8 * (i8 / 2));
                    let cost = get_satd(BlockSize::B8x8, enc, enc_pitch, dec_block, dec_pitch)
                        + lambda * if mode.fix() == pred_mode { 1 } else { 4 };
                    if cost < best {
                        best = cost;
                        ia.modes8[i8] = mode;
                    }
                }
                // Leave the winner's prediction in place for the blocks
                // to its right and below.
                predict_8x8(&mut ctx.dec, i8, ia.modes8[i8], ctx.neighbour8[i8]);
                let fixed = ia.modes8[i8].fix();
                for i4 in 0..4 {
                    ctx.cache.intra4x4_mode[SCAN8[idx + i4]] = fixed;
                }
                total += best;
            }
            ia.cost8 = Some(total + lambda * 24);
        }

        if self.params.flags.contains(AnalyseFlags::I4X4) {
            ctx.cache.intra4x4_mode = entry_modes;
            let mut total = 0;
            for idx in 0..16 {
                let x4 = BLOCK_IDX_X[idx];
                let y4 = BLOCK_IDX_Y[idx];
                let pred_mode = ctx.predict_intra4x4_mode(idx);
                let enc = &ctx.enc.luma[4 * y4 * ENC_PITCH + 4 * x4..];
                let mut best = COST_MAX;
                for &mode in modes_nxn(ctx.neighbour4[idx]) {
                    predict_4x4(&mut ctx.dec, idx, mode);
                    let dec_block = dec_luma_block(&ctx.dec, 4 * x4, 4 * y4);
                    let cost = get_satd(BlockSize::B4x4, enc, enc_pitch, dec_block, dec_pitch)
                        + lambda * if mode.fix() == pred_mode { 1 } else { 4 };
                    if cost < best {
                        best = cost;
                        ia.modes4[idx] = mode;
                    }
                }
                // Re-apply the winner so the next blocks predict from it,
                // and record it for the following blocks' mode predictors.
                predict_4x4(&mut ctx.dec, idx, ia.modes4[idx]);
                ctx.cache.intra4x4_mode[SCAN8[idx]] = ia.modes4[idx].fix();
                total += best;
            }
            ia.cost4 = Some(total + lambda * 24);
        }

        ia
    }

    fn analyse_intra_chroma(&self, ctx: &mut MbContext, lambda: u32) -> (PredictChroma, Cost) {
        let enc_pitch = NonZeroUsize::new(ENC_PITCH).expect("nonzero");
        let mut best = COST_MAX;
        let mut best_mode = PredictChroma::Dc128;

        for &mode in modes_chroma(ctx.neighbours) {
            predict_chroma(&mut ctx.dec, 0, mode);
            predict_chroma(&mut ctx.dec, 1, mode);
            let cost = get_satd(
                BlockSize::B8x8,
                &ctx.enc.cb,
                enc_pitch,
                dec_chroma_block(&ctx.dec, 0),
                enc_pitch,
            ) + get_satd(
                BlockSize::B8x8,
                &ctx.enc.cr,
                enc_pitch,
                dec_chroma_block(&ctx.dec, 1),
                enc_pitch,
            ) + lambda * bits_ue(u32::from(mode.fix()));
            if cost < best {
                best = cost;
                best_mode = mode;
            }
        }

        (best_mode, best)
    }

    /// Builds the 16x16 skip candidate and asks the residual oracle
    /// whether it quantizes away. On success the whole evaluation ladder
    /// is bypassed.
    fn probe_skip(
        &self,
        ctx: &mut MbContext,
        refs: &RefPicLists<'_>,
        bounds: MvBounds,
        oracle: &mut dyn RdOracle,
        res: &mut AnalysisResult,
    ) -> bool {
        let mvp = bounds.clip(ctx.predict_mv_pskip());
        let reference = &refs.list0[0];
        let pred = build_pred_16x16(ctx, reference, mvp);

        let cand = ModeCandidate {
            mb_type: MbType::PSkip,
            fenc: &ctx.enc,
            pred: &pred,
            qp: res.qp,
        };
        if !oracle.probe_skip(&cand) {
            return false;
        }

        res.mb_type = MbType::PSkip;
        res.partition = MbPartition::D16x16;
        res.cost = lambda_for_qp(res.qp);
        ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(0));
        ctx.cache_mv(0, 0, 4, 4, 0, mvp);
        ctx.cache_mvd(0, 0, 4, 4, 0, ZERO_MV);
        for b4 in 0..16 {
            res.mv[0][b4] = mvp;
        }
        res.refs[0] = [RefState::Ref(0); 4];
        true
    }

    fn finalize_intra(
        &self,
        ctx: &mut MbContext,
        ia: &IntraAnalysis,
        lambda: u32,
        res: &mut AnalysisResult,
    ) {
        let (mb_type, cost) = ia.best();
        res.mb_type = mb_type;
        res.cost = cost;
        res.partition = MbPartition::D16x16;
        res.intra16_mode = ia.mode16;
        res.intra4_modes = ia.modes4;
        res.intra8_modes = ia.modes8;
        res.transform_8x8 = mb_type == MbType::I8x8;
        res.refs = [[RefState::Intra; 4]; 2];
        res.mv = [[ZERO_MV; 16]; 2];

        match mb_type {
            MbType::I4x4 => {
                for idx in 0..16 {
                    ctx.cache.intra4x4_mode[SCAN8[idx]] = ia.modes4[idx].fix();
                }
            }
            MbType::I8x8 => {
                for i8 in 0..4 {
                    let fixed = ia.modes8[i8].fix();
                    for i4 in 0..4 {
                        ctx.cache.intra4x4_mode[SCAN8[4 * i8 + i4]] = fixed;
                    }
                }
            }
            _ => {
                // 16x16: re-apply the winning whole-block prediction
                // (the 4x4 pass may have overwritten the decode cache).
                predict_16x16(&mut ctx.dec, ia.mode16);
            }
        }

        let (chroma_mode, _chroma_cost) = self.analyse_intra_chroma(ctx, lambda);
        res.chroma_mode = chroma_mode;

        // Placeholder inter state for later neighbours' predictors
        for list in 0..2 {
            ctx.cache_ref(0, 0, 4, 4, list, RefState::Intra);
            ctx.cache_mv(0, 0, 4, 4, list, ZERO_MV);
            ctx.cache_mvd(0, 0, 4, 4, list, ZERO_MV);
        }
    }

    fn finalize_inter_p(
        &self,
        ctx: &mut MbContext,
        l0: &ListAnalysis,
        partition: MbPartition,
        cost: Cost,
        res: &mut AnalysisResult,
    ) {
        res.mb_type = if partition == MbPartition::D8x8 {
            MbType::P8x8
        } else {
            MbType::PL0
        };
        res.partition = partition;
        res.sub_partition = l0.sub_partition;
        res.cost = cost;

        ctx.cache_ref(0, 0, 4, 4, 0, RefState::Ref(l0.ref_idx));
        match partition {
            MbPartition::D16x16 => {
                ctx.cache_mv(0, 0, 4, 4, 0, l0.me16x16.mv);
                ctx.cache_mvd(0, 0, 4, 4, 0, l0.me16x16.mv - l0.me16x16.mvp);
            }
            MbPartition::D16x8 => {
                for i in 0..2 {
                    ctx.cache_mv(0, 2 * i, 4, 2, 0, l0.me16x8[i].mv);
                    ctx.cache_mvd(0, 2 * i, 4, 2, 0, l0.me16x8[i].mv - l0.me16x8[i].mvp);
                }
            }
            MbPartition::D8x16 => {
                for i in 0..2 {
                    ctx.cache_mv(2 * i, 0, 2, 4, 0, l0.me8x16[i].mv);
                    ctx.cache_mvd(2 * i, 0, 2, 4, 0, l0.me8x16[i].mv - l0.me8x16[i].mvp);
                }
            }
            MbPartition::D8x8 => {
                for i8 in 0..4 {
                    let x = 2 * (i8 % 2);
                    let y = 2 * (i8 / 2);
                    match l0.sub_partition[i8] {
                        SubPartition::L08x8 => {
                            ctx.cache_mv(x, y, 2, 2, 0, l0.me8x8[i8].mv);
                            ctx.cache_mvd(x, y, 2, 2, 0, l0.me8x8[i8].mv - l0.me8x8[i8].mvp);
                        }
                        SubPartition::L08x4 => {
                            for i in 0..2 {
                                ctx.cache_mv(x, y + i, 2, 1, 0, l0.me8x4[i8][i].mv);
                                ctx.cache_mvd(
                                    x,
                                    y + i,
                                    2,
                                    1,
                                    0,
                                    l0.me8x4[i8][i].mv - l0.me8x4[i8][i].mvp,
                                );
                            }
                        }
                        SubPartition::L04x8 => {
                            for i in 0..2 {
                                ctx.cache_mv(x + i, y, 1, 2, 0, l0.me4x8[i8][i].mv);
                                ctx.cache_mvd(
                                    x + i,
                                    y,
                                    1,
                                    2,
                                    0,
                                    l0.me4x8[i8][i].mv - l0.me4x8[i8][i].mvp,
                                );
                            }
                        }
                        SubPartition::L04x4 => {
                            for i4 in 0..4 {
                                let idx = 4 * i8 + i4;
                                ctx.cache_mv(
                                    BLOCK_IDX_X[idx],
                                    BLOCK_IDX_Y[idx],
                                    1,
                                    1,
                                    0,
                                    l0.me4x4[i8][i4].mv,
                                );
                                ctx.cache_mvd(
                                    BLOCK_IDX_X[idx],
                                    BLOCK_IDX_Y[idx],
                                    1,
                                    1,
                                    0,
                                    l0.me4x4[i8][i4].mv - l0.me4x4[i8][i4].mvp,
                                );
                            }
                        }
                    }
                }
            }
        }

        copy_cache_to_result(ctx, res);
    }

    fn finalize_inter_b(
        &self,
        ctx: &mut MbContext,
        l0: &ListAnalysis,
        l1: &ListAnalysis,
        mb_type: MbType,
        cost: Cost,
        res: &mut AnalysisResult,
    ) {
        res.mb_type = mb_type;
        res.partition = MbPartition::D16x16;
        res.cost = cost;

        let stamp = |ctx: &mut MbContext, list: usize, la: &ListAnalysis| {
            ctx.cache_ref(0, 0, 4, 4, list, RefState::Ref(la.ref_idx));
            ctx.cache_mv(0, 0, 4, 4, list, la.me16x16.mv);
            ctx.cache_mvd(0, 0, 4, 4, list, la.me16x16.mv - la.me16x16.mvp);
        };
        let clear = |ctx: &mut MbContext, list: usize| {
            ctx.cache_ref(0, 0, 4, 4, list, RefState::Intra);
            ctx.cache_mv(0, 0, 4, 4, list, ZERO_MV);
            ctx.cache_mvd(0, 0, 4, 4, list, ZERO_MV);
        };

        match mb_type {
            MbType::BL0 => {
                stamp(ctx, 0, l0);
                clear(ctx, 1);
            }
            MbType::BL1 => {
                clear(ctx, 0);
                stamp(ctx, 1, l1);
            }
            _ => {
                stamp(ctx, 0, l0);
                stamp(ctx, 1, l1);
            }
        }

        copy_cache_to_result(ctx, res);
    }

    /// Exact-cost arbitration between the fast winner and the runner-up
    /// class, which may overturn the proxy-based decision.
    fn rdo_arbitrate(
        &self,
        ctx: &mut MbContext,
        refs: &RefPicLists<'_>,
        ia: &IntraAnalysis,
        l0: &ListAnalysis,
        partition: MbPartition,
        inter_cost: Cost,
        intra_cost: Cost,
        res: &mut AnalysisResult,
        oracle: &mut dyn RdOracle,
    ) {
        // Only worth measuring when the two classes landed close.
        let (lo, hi) = if inter_cost < intra_cost {
            (inter_cost, intra_cost)
        } else {
            (intra_cost, inter_cost)
        };
        if intra_cost == COST_MAX || hi > lo.saturating_add(lo / 4) {
            return;
        }

        let lambda = u64::from(lambda_for_qp(res.qp));
        let inter_pred = build_pred_inter_p(ctx, refs, l0, partition);
        let intra_pred = build_pred_intra(ctx, ia);

        let exact = |oracle: &mut dyn RdOracle, mb_type, pred: &EncPixels| {
            let rd = oracle.exact_cost(&ModeCandidate {
                mb_type,
                fenc: &ctx.enc,
                pred,
                qp: res.qp,
            });
            rd.distortion + lambda * u64::from(rd.bits)
        };

        let inter_type = if partition == MbPartition::D8x8 {
            MbType::P8x8
        } else {
            MbType::PL0
        };
        let exact_inter = exact(oracle, inter_type, &inter_pred);
        let (intra_type, _) = ia.best();
        let exact_intra = exact(oracle, intra_type, &intra_pred);

        let intra_won = res.mb_type.is_intra();
        if intra_won && exact_inter < exact_intra {
            self.finalize_inter_p(ctx, l0, partition, inter_cost, res);
        } else if !intra_won && exact_intra < exact_inter {
            let lambda32 = lambda_for_qp(res.qp);
            self.finalize_intra(ctx, ia, lambda32, res);
        }
    }
}

impl IntraAnalysis {
    fn best(&self) -> (MbType, Cost) {
        let mut best = (MbType::I16x16, self.cost16);
        if let Some(c8) = self.cost8
            && c8 < best.1
        {
            best = (MbType::I8x8, c8);
        }
        if let Some(c4) = self.cost4
            && c4 < best.1
        {
            best = (MbType::I4x4, c4);
        }
        best
    }

    fn best_cost(&self) -> Cost {
        self.best().1
    }
}

/// The decode-cache luma block starting at `(x, y)` inside the
/// macroblock, as a slice usable with [`DEC_PITCH`].
fn dec_luma_block(dec: &DecPixels, x: usize, y: usize) -> &[u8] {
    let off = DecPixels::luma_offset(x as isize, y as isize);
    &dec.luma_raw()[off..]
}

fn dec_chroma_block(dec: &DecPixels, plane: usize) -> &[u8] {
    let off = DecPixels::chroma_offset(0, 0);
    &dec.chroma_raw(plane)[off..]
}

fn copy_cache_to_result(ctx: &MbContext, res: &mut AnalysisResult) {
    for list in 0..2 {
        for b8 in 0..4 {
            res.refs[list][b8] = ctx.cache_ref_at(list, SCAN8[[0, 4, 8, 12][b8]]);
        }
        for y in 0..4 {
            for x in 0..4 {
                let [mx, my] = ctx.cache.mv[list][crate::context::SCAN8_0 + x + 8 * y];
                res.mv[list][y * 4 + x] = MotionVector { x: mx, y: my };
            }
        }
    }
}

/// 16x16 single-list prediction (luma + chroma) for the skip probe.
fn build_pred_16x16(ctx: &MbContext, reference: &ReferenceFrame, mv: MotionVector) -> EncPixels {
    let mut pred = EncPixels::default();
    let pitch = NonZeroUsize::new(ENC_PITCH).expect("nonzero");
    let x = 16 * ctx.addr.x as i32;
    let y = 16 * ctx.addr.y as i32;

    reference.luma.mc_luma(
        &mut pred.luma,
        pitch,
        4 * x + i32::from(mv.x),
        4 * y + i32::from(mv.y),
        16,
        16,
    );
    let cx = 8 * (8 * ctx.addr.x) as i32;
    let cy = 8 * (8 * ctx.addr.y) as i32;
    mc_chroma(
        &mut pred.cb,
        pitch,
        &reference.cb,
        cx + i32::from(mv.x),
        cy + i32::from(mv.y),
        8,
        8,
    );
    mc_chroma(
        &mut pred.cr,
        pitch,
        &reference.cr,
        cx + i32::from(mv.x),
        cy + i32::from(mv.y),
        8,
        8,
    );

    if let Some(w) = reference.weight {
        w.apply(&mut pred.luma, pitch, 16, 16);
    }

    pred
}

/// Full inter prediction of the current P decision, for exact-cost
/// measurement.
fn build_pred_inter_p(
    ctx: &MbContext,
    refs: &RefPicLists<'_>,
    l0: &ListAnalysis,
    partition: MbPartition,
) -> EncPixels {
    let reference = &refs.list0[usize::from(l0.ref_idx)];
    let mut pred = EncPixels::default();
    let pitch = NonZeroUsize::new(ENC_PITCH).expect("nonzero");

    // Every leaf of the partition tree compensates its own rectangle.
    let mut leaves: SmallVec<[(usize, usize, usize, usize, MotionVector); 16]> = SmallVec::new();
    match partition {
        MbPartition::D16x16 => leaves.push((0, 0, 4, 4, l0.me16x16.mv)),
        MbPartition::D16x8 => {
            for i in 0..2 {
                leaves.push((0, 2 * i, 4, 2, l0.me16x8[i].mv));
            }
        }
        MbPartition::D8x16 => {
            for i in 0..2 {
                leaves.push((2 * i, 0, 2, 4, l0.me8x16[i].mv));
            }
        }
        MbPartition::D8x8 => {
            for i8 in 0..4 {
                let x = 2 * (i8 % 2);
                let y = 2 * (i8 / 2);
                match l0.sub_partition[i8] {
                    SubPartition::L08x8 => leaves.push((x, y, 2, 2, l0.me8x8[i8].mv)),
                    SubPartition::L08x4 => {
                        for i in 0..2 {
                            leaves.push((x, y + i, 2, 1, l0.me8x4[i8][i].mv));
                        }
                    }
                    SubPartition::L04x8 => {
                        for i in 0..2 {
                            leaves.push((x + i, y, 1, 2, l0.me4x8[i8][i].mv));
                        }
                    }
                    SubPartition::L04x4 => {
                        for i4 in 0..4 {
                            let idx = 4 * i8 + i4;
                            leaves.push((
                                BLOCK_IDX_X[idx],
                                BLOCK_IDX_Y[idx],
                                1,
                                1,
                                l0.me4x4[i8][i4].mv,
                            ));
                        }
                    }
                }
            }
        }
    }

    for (x4, y4, w4, h4, mv) in leaves {
        let lx = 4 * (16 * ctx.addr.x + 4 * x4) as i32 + i32::from(mv.x);
        let ly = 4 * (16 * ctx.addr.y + 4 * y4) as i32 + i32::from(mv.y);
        reference.luma.mc_luma(
            &mut pred.luma[4 * y4 * ENC_PITCH + 4 * x4..],
            pitch,
            lx,
            ly,
            4 * w4,
            4 * h4,
        );

        let cx = 8 * (8 * ctx.addr.x + 2 * x4) as i32 + i32::from(mv.x);
        let cy = 8 * (8 * ctx.addr.y + 2 * y4) as i32 + i32::from(mv.y);
        mc_chroma(
            &mut pred.cb[2 * y4 * ENC_PITCH + 2 * x4..],
            pitch,
            &reference.cb,
            cx,
            cy,
            2 * w4,
            2 * h4,
        );
        mc_chroma(
            &mut pred.cr[2 * y4 * ENC_PITCH + 2 * x4..],
            pitch,
            &reference.cr,
            cx,
            cy,
            2 * w4,
            2 * h4,
        );
    }

    if let Some(w) = reference.weight {
        w.apply(&mut pred.luma, pitch, 16, 16);
    }

    pred
}

/// Re-runs the winning intra predictions into a dense block, for
/// exact-cost measurement.
fn build_pred_intra(ctx: &mut MbContext, ia: &IntraAnalysis) -> EncPixels {
    let (mb_type, _) = ia.best();
    match mb_type {
        MbType::I16x16 => predict_16x16(&mut ctx.dec, ia.mode16),
        MbType::I8x8 => {
            for i8 in 0..4 {
                predict_8x8(&mut ctx.dec, i8, ia.modes8[i8], ctx.neighbour8[i8]);
            }
        }
        _ => {
            for idx in 0..16 {
                predict_4x4(&mut ctx.dec, idx, ia.modes4[idx]);
            }
        }
    }

    let mut pred = EncPixels::default();
    let enc_pitch = NonZeroUsize::new(ENC_PITCH).expect("nonzero");
    let dec_pitch = NonZeroUsize::new(DEC_PITCH).expect("nonzero");
    copy_block(
        &mut pred.luma,
        enc_pitch,
        dec_luma_block(&ctx.dec, 0, 0),
        dec_pitch,
        NonZeroUsize::new(16).expect("nonzero"),
        NonZeroUsize::new(16).expect("nonzero"),
    );
    copy_block(
        &mut pred.cb,
        enc_pitch,
        dec_chroma_block(&ctx.dec, 0),
        enc_pitch,
        NonZeroUsize::new(8).expect("nonzero"),
        NonZeroUsize::new(8).expect("nonzero"),
    );
    copy_block(
        &mut pred.cr,
        enc_pitch,
        dec_chroma_block(&ctx.dec, 1),
        enc_pitch,
        NonZeroUsize::new(8).expect("nonzero"),
        NonZeroUsize::new(8).expect("nonzero"),
    );
    pred
}
