#[cfg(test)]
mod tests;

use anyhow::{Context as _, Result};
use bitflags::bitflags;

use crate::{
    analyse::AnalysisResult,
    frame::{FrameGeometry, MacroblockAddress, SliceParams, SliceType, SourceFrame},
    mv::{MotionVector, ZERO_MV, median_mv},
    plane::Plane,
    reference::FieldParity,
    util::copy_block,
};

use std::num::NonZeroUsize;

/// Packed reference sentinel: geometric neighbour exists but is not
/// available to prediction (out of frame, or before the current slice).
const REF_UNAVAILABLE: i8 = -2;
/// Packed reference sentinel: neighbour is intra coded (no inter data).
const REF_INTRA: i8 = -1;

/// Reference state of a neighbouring block, as seen by predictors.
///
/// The persistent arrays and the cache keep the packed `i8` encoding for
/// density; this tagged form is the API boundary so "unavailable" can
/// never be confused with "intra".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// Out of frame, not yet encoded, or in a different slice.
    Unavailable,
    /// Intra coded: present, but carries no reference.
    Intra,
    /// Inter coded with this reference index.
    Ref(u8),
}

impl RefState {
    #[must_use]
    pub fn from_packed(raw: i8) -> Self {
        match raw {
            REF_UNAVAILABLE => RefState::Unavailable,
            REF_INTRA => RefState::Intra,
            idx => RefState::Ref(idx as u8),
        }
    }

    #[must_use]
    pub fn to_packed(self) -> i8 {
        match self {
            RefState::Unavailable => REF_UNAVAILABLE,
            RefState::Intra => REF_INTRA,
            RefState::Ref(idx) => idx as i8,
        }
    }
}

/// Final macroblock coding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbType {
    I4x4,
    I8x8,
    I16x16,
    /// Raw pixel macroblock. Never chosen by the analysis; accepted by
    /// `save` so the store stays total over the type space.
    IPcm,
    PL0,
    P8x8,
    PSkip,
    BL0,
    BL1,
    BBi,
}

impl MbType {
    #[must_use]
    pub const fn is_intra(self) -> bool {
        matches!(self, MbType::I4x4 | MbType::I8x8 | MbType::I16x16 | MbType::IPcm)
    }

    #[must_use]
    pub const fn is_skip(self) -> bool {
        matches!(self, MbType::PSkip)
    }
}

/// Macroblock-level inter partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbPartition {
    D16x16,
    D16x8,
    D8x16,
    D8x8,
}

/// Sub-partition of one 8x8 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPartition {
    L08x8,
    L08x4,
    L04x8,
    L04x4,
}

bitflags! {
    /// Which causal neighbours of a macroblock (or sub-block) exist and
    /// belong to the current slice.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MbNeighbours: u8 {
        const LEFT = 0x01;
        const TOP = 0x02;
        const TOPRIGHT = 0x04;
        const TOPLEFT = 0x08;
    }
}

pub(crate) const SCAN8_SIZE: usize = 6 * 8;
pub(crate) const SCAN8_0: usize = 4 + 8;

/// Maps block index (16 luma in zigzag-of-2x2 order, then 4 Cb, 4 Cr) to
/// its slot in the 8x6 cache window. One border row/column on the causal
/// sides gives branch-free access to neighbour entries at offsets -1
/// (left), -8 (top), -9 (top-left) and -8+width (top-right).
#[rustfmt::skip]
pub(crate) const SCAN8: [usize; 24] = [
    // Luma
    4 + 8,  5 + 8,  4 + 16, 5 + 16,
    6 + 8,  7 + 8,  6 + 16, 7 + 16,
    4 + 24, 5 + 24, 4 + 32, 5 + 32,
    6 + 24, 7 + 24, 6 + 32, 7 + 32,
    // Cb
    1 + 8,  2 + 8,
    1 + 16, 2 + 16,
    // Cr
    1 + 32, 2 + 32,
    1 + 40, 2 + 40,
];

/// Raster x of each 4x4 luma block index, in 4x4 units.
pub(crate) const BLOCK_IDX_X: [usize; 16] = [0, 1, 0, 1, 2, 3, 2, 3, 0, 1, 0, 1, 2, 3, 2, 3];
/// Raster y of each 4x4 luma block index, in 4x4 units.
pub(crate) const BLOCK_IDX_Y: [usize; 16] = [0, 0, 1, 1, 0, 0, 1, 1, 2, 2, 3, 3, 2, 2, 3, 3];

/// Persistent per-frame neighbour context. One instance per frame being
/// encoded, exclusively owned by that frame's encoding thread; written
/// once per macroblock by [`MbContext::save`] and read many times by
/// later macroblocks, the entropy coder and the deblocking filter.
#[derive(Debug)]
pub struct FrameContext {
    pub geo: FrameGeometry,
    mb_type: Vec<Option<MbType>>,
    qp: Vec<u8>,
    last_qp: u8,
    slice_id: Vec<u32>,
    /// Seven border modes per macroblock: the bottom row of 4x4 modes and
    /// the right column, which is all later neighbours ever read.
    intra4x4: Vec<[i8; 7]>,
    non_zero_count: Vec<[u8; 24]>,
    cbp: Vec<u16>,
    transform_size: Vec<bool>,
    skipbp: Vec<u8>,
    mv: [Vec<[i16; 2]>; 2],
    mvd: [Vec<[i16; 2]>; 2],
    refs: [Vec<i8>; 2],
}

const NO_SLICE: u32 = u32::MAX;
const I_PRED_4X4_DC: i8 = 2;

fn alloc_vec<T: Clone>(value: T, len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).context("allocating context array")?;
    v.resize(len, value);
    Ok(v)
}

impl FrameContext {
    pub fn new(geo: FrameGeometry) -> Result<Self> {
        let mbs = geo.mb_count();
        let b8 = 4 * mbs;
        let b4 = 16 * mbs;
        Ok(Self {
            geo,
            mb_type: alloc_vec(None, mbs)?,
            qp: alloc_vec(0, mbs)?,
            last_qp: 26,
            slice_id: alloc_vec(NO_SLICE, mbs)?,
            intra4x4: alloc_vec([I_PRED_4X4_DC; 7], mbs)?,
            non_zero_count: alloc_vec([0; 24], mbs)?,
            cbp: alloc_vec(0, mbs)?,
            transform_size: alloc_vec(false, mbs)?,
            skipbp: alloc_vec(0, mbs)?,
            mv: [alloc_vec([0, 0], b4)?, alloc_vec([0, 0], b4)?],
            mvd: [alloc_vec([0, 0], b4)?, alloc_vec([0, 0], b4)?],
            refs: [alloc_vec(REF_INTRA, b8)?, alloc_vec(REF_INTRA, b8)?],
        })
    }

    #[must_use]
    pub fn mb_type(&self, addr: MacroblockAddress) -> Option<MbType> {
        self.mb_type[self.geo.mb_index(addr)]
    }

    #[must_use]
    pub fn qp(&self, addr: MacroblockAddress) -> u8 {
        self.qp[self.geo.mb_index(addr)]
    }

    #[must_use]
    pub fn cbp(&self, addr: MacroblockAddress) -> u16 {
        self.cbp[self.geo.mb_index(addr)]
    }

    #[must_use]
    pub fn transform_size(&self, addr: MacroblockAddress) -> bool {
        self.transform_size[self.geo.mb_index(addr)]
    }

    /// Motion vector of a 4x4 block, for downstream consumers.
    #[must_use]
    pub fn mv_at(&self, list: usize, addr: MacroblockAddress, b4_x: usize, b4_y: usize) -> MotionVector {
        let idx = self.geo.b4_index(addr) + b4_y * self.geo.b4_stride() + b4_x;
        let [x, y] = self.mv[list][idx];
        MotionVector { x, y }
    }

    /// Reference state of an 8x8 block, for downstream consumers.
    #[must_use]
    pub fn ref_at(&self, list: usize, addr: MacroblockAddress, b8_x: usize, b8_y: usize) -> RefState {
        let idx = self.geo.b8_index(addr) + b8_y * self.geo.b8_stride() + b8_x;
        RefState::from_packed(self.refs[list][idx])
    }

    #[must_use]
    pub fn non_zero_count(&self, addr: MacroblockAddress) -> &[u8; 24] {
        &self.non_zero_count[self.geo.mb_index(addr)]
    }

    /// The running QP after the most recent commit.
    #[must_use]
    pub fn last_qp(&self) -> u8 {
        self.last_qp
    }

    #[must_use]
    fn committed_in_slice(&self, mb_xy: usize, slice_id: u32) -> bool {
        self.slice_id[mb_xy] == slice_id
    }
}

pub(crate) const ENC_PITCH: usize = 16;
pub(crate) const DEC_PITCH: usize = 32;

/// Source pixels of the current macroblock, copied to small fixed-pitch
/// buffers so every distortion call reads a dense block.
#[derive(Debug, Clone)]
pub struct EncPixels {
    pub luma: [u8; 16 * ENC_PITCH],
    pub cb: [u8; 8 * ENC_PITCH],
    pub cr: [u8; 8 * ENC_PITCH],
}

impl Default for EncPixels {
    fn default() -> Self {
        Self {
            luma: [0; 16 * ENC_PITCH],
            cb: [0; 8 * ENC_PITCH],
            cr: [0; 8 * ENC_PITCH],
        }
    }
}

/// Reconstructed pixels around and inside the current macroblock: one
/// border row above (extending past the top-right), one border column to
/// the left, and the block interior that intra analysis fills as it
/// decides each prediction.
#[derive(Debug, Clone)]
pub struct DecPixels {
    luma: [u8; 18 * DEC_PITCH],
    cb: [u8; 10 * ENC_PITCH],
    cr: [u8; 10 * ENC_PITCH],
}

impl Default for DecPixels {
    fn default() -> Self {
        Self {
            luma: [0; 18 * DEC_PITCH],
            cb: [0; 10 * ENC_PITCH],
            cr: [0; 10 * ENC_PITCH],
        }
    }
}

impl DecPixels {
    /// Buffer offset of luma pixel `(x, y)`; `(-1, -1)` is the top-left
    /// border corner, x runs to 23 over the top-right border.
    #[must_use]
    pub(crate) fn luma_offset(x: isize, y: isize) -> usize {
        debug_assert!((-1..=24).contains(&x) && (-1..16).contains(&y));
        ((y + 1) * DEC_PITCH as isize + x + 1) as usize
    }

    #[must_use]
    pub(crate) fn chroma_offset(x: isize, y: isize) -> usize {
        debug_assert!((-1..=12).contains(&x) && (-1..8).contains(&y));
        ((y + 1) * ENC_PITCH as isize + x + 1) as usize
    }

    #[must_use]
    pub fn luma(&self, x: isize, y: isize) -> u8 {
        self.luma[Self::luma_offset(x, y)]
    }

    pub(crate) fn luma_buf(&mut self) -> &mut [u8; 18 * DEC_PITCH] {
        &mut self.luma
    }

    #[must_use]
    pub(crate) fn luma_raw(&self) -> &[u8] {
        &self.luma
    }

    #[must_use]
    pub(crate) fn chroma_raw(&self, plane: usize) -> &[u8] {
        if plane == 0 { &self.cb } else { &self.cr }
    }

    #[must_use]
    pub fn chroma(&self, plane: usize, x: isize, y: isize) -> u8 {
        let buf = if plane == 0 { &self.cb } else { &self.cr };
        buf[Self::chroma_offset(x, y)]
    }

    pub(crate) fn chroma_buf(&mut self, plane: usize) -> &mut [u8; 10 * ENC_PITCH] {
        if plane == 0 { &mut self.cb } else { &mut self.cr }
    }
}

/// The transient per-macroblock cache window: one slot per 4x4 block of
/// the macroblock plus a border of causal-neighbour slots, scan-ordered
/// for branch-free predictor access.
#[derive(Debug, Clone)]
pub struct NeighbourCache {
    pub intra4x4_mode: [i8; SCAN8_SIZE],
    pub non_zero_count: [u8; SCAN8_SIZE],
    pub mv: [[[i16; 2]; SCAN8_SIZE]; 2],
    pub mvd: [[[i16; 2]; SCAN8_SIZE]; 2],
    pub refs: [[i8; SCAN8_SIZE]; 2],
    pub skip: [u8; SCAN8_SIZE],
}

impl Default for NeighbourCache {
    fn default() -> Self {
        Self {
            intra4x4_mode: [-1; SCAN8_SIZE],
            non_zero_count: [0x80; SCAN8_SIZE],
            mv: [[[0, 0]; SCAN8_SIZE]; 2],
            mvd: [[[0, 0]; SCAN8_SIZE]; 2],
            refs: [[REF_UNAVAILABLE; SCAN8_SIZE]; 2],
            skip: [0; SCAN8_SIZE],
        }
    }
}

/// Per-macroblock analysis context: address, neighbour availability, the
/// cache window and the pixel caches. Lives for exactly one macroblock
/// and is passed by reference through the analysis calls.
#[derive(Debug, Clone)]
pub struct MbContext {
    pub addr: MacroblockAddress,
    pub mb_xy: usize,
    pub b8_xy: usize,
    pub b4_xy: usize,
    pub slice: SliceParams,
    /// Field parity of the current picture, when field coding.
    pub field: Option<FieldParity>,
    pub neighbours: MbNeighbours,
    /// Availability of each 4x4 block's own left/top/topleft/topright
    /// neighbours, derived once per macroblock from the outer flags.
    pub neighbour4: [MbNeighbours; 16],
    pub neighbour8: [MbNeighbours; 4],
    pub type_left: Option<MbType>,
    pub type_top: Option<MbType>,
    pub type_topleft: Option<MbType>,
    pub type_topright: Option<MbType>,
    /// How many available neighbours use the 8x8 transform.
    pub neighbour_transform_size: u8,
    pub cache: NeighbourCache,
    pub enc: EncPixels,
    pub dec: DecPixels,
}

impl MbContext {
    #[must_use]
    pub fn new(slice: SliceParams) -> Self {
        Self {
            addr: MacroblockAddress::new(0, 0),
            mb_xy: 0,
            b8_xy: 0,
            b4_xy: 0,
            slice,
            field: None,
            neighbours: MbNeighbours::empty(),
            neighbour4: [MbNeighbours::empty(); 16],
            neighbour8: [MbNeighbours::empty(); 4],
            type_left: None,
            type_top: None,
            type_topleft: None,
            type_topright: None,
            neighbour_transform_size: 0,
            cache: NeighbourCache::default(),
            enc: EncPixels::default(),
            dec: DecPixels::default(),
        }
    }

    /// Populates the cache from the four causal neighbours' committed
    /// state. Frame edges and slice boundaries load the unavailable
    /// sentinels; everything else reads exactly what the neighbour's
    /// `save` committed.
    pub fn load(&mut self, fctx: &FrameContext, addr: MacroblockAddress) {
        let geo = &fctx.geo;
        let mb_stride = geo.mb_width.get();
        let mb_xy = geo.mb_index(addr);
        let slice_id = self.slice.slice_id;

        self.addr = addr;
        self.mb_xy = mb_xy;
        self.b8_xy = geo.b8_index(addr);
        self.b4_xy = geo.b4_index(addr);
        self.field = geo.field;
        self.neighbours = MbNeighbours::empty();
        self.cache = NeighbourCache::default();

        let top_xy = mb_xy.wrapping_sub(mb_stride);
        let has_top = addr.y > 0 && fctx.committed_in_slice(top_xy, slice_id);
        let has_left = addr.x > 0 && fctx.committed_in_slice(mb_xy - 1, slice_id);
        let has_topleft =
            addr.x > 0 && addr.y > 0 && fctx.committed_in_slice(top_xy - 1, slice_id);
        let has_topright = addr.x + 1 < mb_stride
            && addr.y > 0
            && fctx.committed_in_slice(top_xy + 1, slice_id);

        self.type_top = if has_top { fctx.mb_type[top_xy] } else { None };
        self.type_left = if has_left { fctx.mb_type[mb_xy - 1] } else { None };
        self.type_topleft = if has_topleft { fctx.mb_type[top_xy - 1] } else { None };
        self.type_topright = if has_topright { fctx.mb_type[top_xy + 1] } else { None };

        if has_top {
            self.neighbours |= MbNeighbours::TOP;
            let src = &fctx.intra4x4[top_xy];
            self.cache.intra4x4_mode[SCAN8[0] - 8] = src[0];
            self.cache.intra4x4_mode[SCAN8[1] - 8] = src[1];
            self.cache.intra4x4_mode[SCAN8[4] - 8] = src[2];
            self.cache.intra4x4_mode[SCAN8[5] - 8] = src[3];

            let nnz = &fctx.non_zero_count[top_xy];
            self.cache.non_zero_count[SCAN8[0] - 8] = nnz[10];
            self.cache.non_zero_count[SCAN8[1] - 8] = nnz[11];
            self.cache.non_zero_count[SCAN8[4] - 8] = nnz[14];
            self.cache.non_zero_count[SCAN8[5] - 8] = nnz[15];
            self.cache.non_zero_count[SCAN8[16] - 8] = nnz[16 + 2];
            self.cache.non_zero_count[SCAN8[17] - 8] = nnz[16 + 3];
            self.cache.non_zero_count[SCAN8[20] - 8] = nnz[16 + 4 + 2];
            self.cache.non_zero_count[SCAN8[21] - 8] = nnz[16 + 4 + 3];
        }

        if has_left {
            self.neighbours |= MbNeighbours::LEFT;
            let left_xy = mb_xy - 1;
            let src = &fctx.intra4x4[left_xy];
            self.cache.intra4x4_mode[SCAN8[0] - 1] = src[4];
            self.cache.intra4x4_mode[SCAN8[2] - 1] = src[5];
            self.cache.intra4x4_mode[SCAN8[8] - 1] = src[6];
            self.cache.intra4x4_mode[SCAN8[10] - 1] = src[3];

            let nnz = &fctx.non_zero_count[left_xy];
            self.cache.non_zero_count[SCAN8[0] - 1] = nnz[5];
            self.cache.non_zero_count[SCAN8[2] - 1] = nnz[7];
            self.cache.non_zero_count[SCAN8[8] - 1] = nnz[13];
            self.cache.non_zero_count[SCAN8[10] - 1] = nnz[15];
            self.cache.non_zero_count[SCAN8[16] - 1] = nnz[16 + 1];
            self.cache.non_zero_count[SCAN8[18] - 1] = nnz[16 + 3];
            self.cache.non_zero_count[SCAN8[20] - 1] = nnz[16 + 4 + 1];
            self.cache.non_zero_count[SCAN8[22] - 1] = nnz[16 + 4 + 3];
        }

        if has_topright {
            self.neighbours |= MbNeighbours::TOPRIGHT;
        }
        if has_topleft {
            self.neighbours |= MbNeighbours::TOPLEFT;
        }

        self.neighbour_transform_size = u8::from(has_left && fctx.transform_size[mb_xy - 1])
            + u8::from(has_top && fctx.transform_size[top_xy]);

        if self.slice.slice_type != SliceType::I {
            self.load_neighbour_motion(fctx);
        }

        self.derive_sub_block_neighbours();
    }

    fn load_neighbour_motion(&mut self, fctx: &FrameContext) {
        let geo = &fctx.geo;
        let s8x8 = geo.b8_stride();
        let s4x4 = geo.b4_stride();
        let lists = if self.slice.slice_type == SliceType::B { 2 } else { 1 };

        for list in 0..lists {
            if self.neighbours.contains(MbNeighbours::TOPLEFT) {
                let i8 = SCAN8_0 - 1 - 8;
                let ir = self.b8_xy - s8x8 - 1;
                let iv = self.b4_xy - s4x4 - 1;
                self.cache.refs[list][i8] = fctx.refs[list][ir];
                self.cache.mv[list][i8] = fctx.mv[list][iv];
            }

            if self.neighbours.contains(MbNeighbours::TOP) {
                let i8 = SCAN8_0 - 8;
                let ir = self.b8_xy - s8x8;
                let iv = self.b4_xy - s4x4;
                self.cache.refs[list][i8] = fctx.refs[list][ir];
                self.cache.refs[list][i8 + 1] = fctx.refs[list][ir];
                self.cache.refs[list][i8 + 2] = fctx.refs[list][ir + 1];
                self.cache.refs[list][i8 + 3] = fctx.refs[list][ir + 1];
                for i in 0..4 {
                    self.cache.mv[list][i8 + i] = fctx.mv[list][iv + i];
                    self.cache.mvd[list][i8 + i] = fctx.mvd[list][iv + i];
                }
            }

            if self.neighbours.contains(MbNeighbours::TOPRIGHT) {
                let i8 = SCAN8_0 + 4 - 8;
                let ir = self.b8_xy - s8x8 + 2;
                let iv = self.b4_xy - s4x4 + 4;
                self.cache.refs[list][i8] = fctx.refs[list][ir];
                self.cache.mv[list][i8] = fctx.mv[list][iv];
            }

            if self.neighbours.contains(MbNeighbours::LEFT) {
                let i8 = SCAN8_0 - 1;
                let ir = self.b8_xy - 1;
                let iv = self.b4_xy - 1;
                self.cache.refs[list][i8] = fctx.refs[list][ir];
                self.cache.refs[list][i8 + 8] = fctx.refs[list][ir];
                self.cache.refs[list][i8 + 16] = fctx.refs[list][ir + s8x8];
                self.cache.refs[list][i8 + 24] = fctx.refs[list][ir + s8x8];
                for i in 0..4 {
                    self.cache.mv[list][i8 + 8 * i] = fctx.mv[list][iv + s4x4 * i];
                    self.cache.mvd[list][i8 + 8 * i] = fctx.mvd[list][iv + s4x4 * i];
                }
            }
        }

        // B-skip context for the entropy coder
        if self.slice.slice_type == SliceType::B {
            if let Some(left_xy) = self.mb_xy.checked_sub(1)
                && self.neighbours.contains(MbNeighbours::LEFT)
            {
                self.cache.skip[SCAN8[0] - 1] = fctx.skipbp[left_xy] & 0x2;
                self.cache.skip[SCAN8[8] - 1] = fctx.skipbp[left_xy] & 0x8;
            }
            if self.neighbours.contains(MbNeighbours::TOP) {
                let top_xy = self.mb_xy - fctx.geo.mb_width.get();
                self.cache.skip[SCAN8[0] - 8] = fctx.skipbp[top_xy] & 0x4;
                self.cache.skip[SCAN8[4] - 8] = fctx.skipbp[top_xy] & 0x8;
            }
        }
    }

    /// Derives the per-4x4 and per-8x8 availability sets from the outer
    /// neighbour flags. Blocks inside the macroblock see their in-block
    /// neighbours unconditionally; edge blocks inherit the macroblock's.
    fn derive_sub_block_neighbours(&mut self) {
        let n = self.neighbours;
        let top_all = MbNeighbours::TOP | MbNeighbours::TOPLEFT | MbNeighbours::TOPRIGHT;

        let corner = (n & (MbNeighbours::TOP | MbNeighbours::LEFT | MbNeighbours::TOPLEFT))
            | (if n.contains(MbNeighbours::TOP) {
                MbNeighbours::TOPRIGHT
            } else {
                MbNeighbours::empty()
            });
        let top_edge = MbNeighbours::LEFT
            | (if n.contains(MbNeighbours::TOP) {
                top_all
            } else {
                MbNeighbours::empty()
            });
        let left_edge = MbNeighbours::TOP
            | MbNeighbours::TOPRIGHT
            | (if n.contains(MbNeighbours::LEFT) {
                MbNeighbours::LEFT | MbNeighbours::TOPLEFT
            } else {
                MbNeighbours::empty()
            });
        let inner = MbNeighbours::LEFT | MbNeighbours::TOP | MbNeighbours::TOPLEFT | MbNeighbours::TOPRIGHT;
        let no_topright = MbNeighbours::LEFT | MbNeighbours::TOP | MbNeighbours::TOPLEFT;
        let block5 = MbNeighbours::LEFT
            | (n & MbNeighbours::TOPRIGHT)
            | (if n.contains(MbNeighbours::TOP) {
                MbNeighbours::TOP | MbNeighbours::TOPLEFT
            } else {
                MbNeighbours::empty()
            });

        self.neighbour4 = [
            corner, top_edge, left_edge, no_topright, // 0, 1, 2, 3
            top_edge, block5, inner, no_topright, // 4, 5, 6, 7
            left_edge, inner, left_edge, no_topright, // 8, 9, 10, 11
            inner, no_topright, inner, no_topright, // 12, 13, 14, 15
        ];
        self.neighbour8 = [corner, block5, left_edge, no_topright];
    }

    /// Copies the macroblock's source and reconstructed-border pixels
    /// into the dense per-macroblock buffers.
    pub fn load_pixels(&mut self, src: &SourceFrame, recon: &SourceFrame) {
        let (mb_x, mb_y) = (self.addr.x, self.addr.y);
        let px = (16 * mb_x) as isize;
        let py = (16 * mb_y) as isize;
        let cx = (8 * mb_x) as isize;
        let cy = (8 * mb_y) as isize;
        let enc_pitch = NonZeroUsize::new(ENC_PITCH).expect("nonzero");

        copy_block(
            &mut self.enc.luma,
            enc_pitch,
            src.luma.slice_at(px, py),
            src.luma.pitch(),
            NonZeroUsize::new(16).expect("nonzero"),
            NonZeroUsize::new(16).expect("nonzero"),
        );
        copy_block(
            &mut self.enc.cb,
            enc_pitch,
            src.cb.slice_at(cx, cy),
            src.cb.pitch(),
            NonZeroUsize::new(8).expect("nonzero"),
            NonZeroUsize::new(8).expect("nonzero"),
        );
        copy_block(
            &mut self.enc.cr,
            enc_pitch,
            src.cr.slice_at(cx, cy),
            src.cr.pitch(),
            NonZeroUsize::new(8).expect("nonzero"),
            NonZeroUsize::new(8).expect("nonzero"),
        );

        // Reconstructed borders: the row above (through the top-right
        // extension) and the column to the left. The padded planes make
        // the reads safe even at frame edges; availability flags decide
        // whether prediction may use them.
        load_borders(&mut self.dec, &recon.luma, px, py, &recon.cb, &recon.cr, cx, cy);
    }

    /// Fills a `width` x `height` rectangle (in 4x4 units) of the motion
    /// vector cache; `(x, y)` is the top-left 4x4 block of the rectangle
    /// within the macroblock.
    pub fn cache_mv(&mut self, x: usize, y: usize, width: usize, height: usize, list: usize, mv: MotionVector) {
        for dy in 0..height {
            for dx in 0..width {
                self.cache.mv[list][SCAN8_0 + x + dx + 8 * (y + dy)] = [mv.x, mv.y];
            }
        }
    }

    pub fn cache_mvd(&mut self, x: usize, y: usize, width: usize, height: usize, list: usize, mvd: MotionVector) {
        for dy in 0..height {
            for dx in 0..width {
                self.cache.mvd[list][SCAN8_0 + x + dx + 8 * (y + dy)] = [mvd.x, mvd.y];
            }
        }
    }

    pub fn cache_ref(&mut self, x: usize, y: usize, width: usize, height: usize, list: usize, ref_state: RefState) {
        let packed = ref_state.to_packed();
        for dy in 0..height {
            for dx in 0..width {
                self.cache.refs[list][SCAN8_0 + x + dx + 8 * (y + dy)] = packed;
            }
        }
    }

    #[must_use]
    fn cache_mv_at(&self, list: usize, slot: usize) -> MotionVector {
        let [x, y] = self.cache.mv[list][slot];
        MotionVector { x, y }
    }

    /// Reference state of a cache slot, at the tagged API boundary.
    #[must_use]
    pub fn cache_ref_at(&self, list: usize, slot_idx: usize) -> RefState {
        RefState::from_packed(self.cache.refs[list][slot_idx])
    }

    /// Median motion vector predictor for a partition starting at block
    /// `idx` with `width` 4x4 columns, searching reference `ref_idx` in
    /// `list`. `partition` selects the directional shortcuts that 16x8
    /// and 8x16 partitions use.
    #[must_use]
    pub fn predict_mv(
        &self,
        list: usize,
        idx: usize,
        width: usize,
        ref_idx: u8,
        partition: MbPartition,
    ) -> MotionVector {
        let i8 = SCAN8[idx];
        let i_ref = ref_idx as i8;

        let ref_a = self.cache.refs[list][i8 - 1];
        let mv_a = self.cache_mv_at(list, i8 - 1);
        let ref_b = self.cache.refs[list][i8 - 8];
        let mv_b = self.cache_mv_at(list, i8 - 8);
        let mut ref_c = self.cache.refs[list][i8 - 8 + width];
        let mut mv_c = self.cache_mv_at(list, i8 - 8 + width);

        // The top-right candidate is replaced by the top-left when it is
        // not causally available for this sub-block position.
        if (idx & 0x03) == 3 || (width == 2 && (idx & 0x03) == 2) || ref_c == REF_UNAVAILABLE {
            ref_c = self.cache.refs[list][i8 - 8 - 1];
            mv_c = self.cache_mv_at(list, i8 - 8 - 1);
        }

        if partition == MbPartition::D16x8 {
            if idx == 0 && ref_b == i_ref {
                return mv_b;
            }
            if idx != 0 && ref_a == i_ref {
                return mv_a;
            }
        } else if partition == MbPartition::D8x16 {
            if idx == 0 && ref_a == i_ref {
                return mv_a;
            }
            if idx != 0 && ref_c == i_ref {
                return mv_c;
            }
        }

        let mut count = 0;
        if ref_a == i_ref {
            count += 1;
        }
        if ref_b == i_ref {
            count += 1;
        }
        if ref_c == i_ref {
            count += 1;
        }

        if count > 1 {
            median_mv(mv_a, mv_b, mv_c)
        } else if count == 1 {
            if ref_a == i_ref {
                mv_a
            } else if ref_b == i_ref {
                mv_b
            } else {
                mv_c
            }
        } else if ref_b == REF_UNAVAILABLE && ref_c == REF_UNAVAILABLE && ref_a != REF_UNAVAILABLE {
            mv_a
        } else {
            median_mv(mv_a, mv_b, mv_c)
        }
    }

    /// Motion vector predictor for a whole-macroblock partition.
    #[must_use]
    pub fn predict_mv_16x16(&self, list: usize, ref_idx: u8) -> MotionVector {
        self.predict_mv(list, 0, 4, ref_idx, MbPartition::D16x16)
    }

    /// The P-skip motion vector: zero when either direct neighbour is
    /// unavailable or carries a zero vector against reference 0,
    /// otherwise the 16x16 predictor.
    #[must_use]
    pub fn predict_mv_pskip(&self) -> MotionVector {
        let ref_a = self.cache.refs[0][SCAN8_0 - 1];
        let ref_b = self.cache.refs[0][SCAN8_0 - 8];
        let mv_a = self.cache_mv_at(0, SCAN8_0 - 1);
        let mv_b = self.cache_mv_at(0, SCAN8_0 - 8);

        if ref_a == REF_UNAVAILABLE
            || ref_b == REF_UNAVAILABLE
            || (ref_a == 0 && mv_a.is_zero())
            || (ref_b == 0 && mv_b.is_zero())
        {
            ZERO_MV
        } else {
            self.predict_mv_16x16(0, 0)
        }
    }

    /// Most probable intra 4x4 mode for a block, from its left and top
    /// neighbours' committed modes. Unavailable neighbours predict DC.
    #[must_use]
    pub fn predict_intra4x4_mode(&self, idx: usize) -> i8 {
        let ma = self.cache.intra4x4_mode[SCAN8[idx] - 1];
        let mb = self.cache.intra4x4_mode[SCAN8[idx] - 8];
        let m = ma.min(mb);
        if m < 0 { I_PRED_4X4_DC } else { m }
    }

    /// Predicted non-zero-coefficient count for a block, for signalling
    /// cost estimation.
    #[must_use]
    pub fn predict_non_zero_code(&self, idx: usize) -> u8 {
        let za = u32::from(self.cache.non_zero_count[SCAN8[idx] - 1]);
        let zb = u32::from(self.cache.non_zero_count[SCAN8[idx] - 8]);
        let mut ret = za + zb;
        if ret < 0x80 {
            ret = (ret + 1) >> 1;
        }
        (ret & 0x7f) as u8
    }

    /// Commits the finalized decision into the persistent arrays. Writes
    /// every field later macroblocks may read, including the safe
    /// placeholders (zero vectors, no-reference, DC modes) for intra and
    /// skip macroblocks.
    pub fn save(&self, fctx: &mut FrameContext, res: &AnalysisResult) {
        let mb_xy = self.mb_xy;
        let geo = fctx.geo;
        let s8x8 = geo.b8_stride();
        let s4x4 = geo.b4_stride();
        let mb_type = res.mb_type;

        fctx.mb_type[mb_xy] = Some(mb_type);
        fctx.slice_id[mb_xy] = self.slice.slice_id;

        // An empty inter macroblock carries no QP delta; it keeps the
        // running QP so later predictions stay consistent.
        let qp = if mb_type != MbType::I16x16 && res.cbp == 0 {
            fctx.last_qp
        } else {
            res.qp
        };
        fctx.qp[mb_xy] = qp;
        fctx.last_qp = qp;
        fctx.cbp[mb_xy] = res.cbp;

        if mb_type == MbType::I4x4 || mb_type == MbType::I8x8 {
            fctx.intra4x4[mb_xy] = [
                self.cache.intra4x4_mode[SCAN8[10]],
                self.cache.intra4x4_mode[SCAN8[11]],
                self.cache.intra4x4_mode[SCAN8[14]],
                self.cache.intra4x4_mode[SCAN8[15]],
                self.cache.intra4x4_mode[SCAN8[5]],
                self.cache.intra4x4_mode[SCAN8[7]],
                self.cache.intra4x4_mode[SCAN8[13]],
            ];
        } else {
            fctx.intra4x4[mb_xy] = [I_PRED_4X4_DC; 7];
        }

        if mb_type == MbType::IPcm {
            fctx.cbp[mb_xy] = 0x72f;
            fctx.non_zero_count[mb_xy] = [16; 24];
        } else {
            fctx.non_zero_count[mb_xy] = res.nnz;
        }

        fctx.transform_size[mb_xy] = res.transform_8x8;

        let lists = if self.slice.slice_type == SliceType::B { 2 } else { 1 };
        for list in 0..lists {
            let b8 = self.b8_xy;
            let b4 = self.b4_xy;
            if mb_type.is_intra() {
                fctx.refs[list][b8] = REF_INTRA;
                fctx.refs[list][b8 + 1] = REF_INTRA;
                fctx.refs[list][b8 + s8x8] = REF_INTRA;
                fctx.refs[list][b8 + s8x8 + 1] = REF_INTRA;
                for y in 0..4 {
                    for x in 0..4 {
                        fctx.mv[list][b4 + x + y * s4x4] = [0, 0];
                    }
                }
            } else {
                fctx.refs[list][b8] = self.cache.refs[list][SCAN8[0]];
                fctx.refs[list][b8 + 1] = self.cache.refs[list][SCAN8[4]];
                fctx.refs[list][b8 + s8x8] = self.cache.refs[list][SCAN8[8]];
                fctx.refs[list][b8 + s8x8 + 1] = self.cache.refs[list][SCAN8[12]];
                for y in 0..4 {
                    for x in 0..4 {
                        fctx.mv[list][b4 + x + y * s4x4] =
                            self.cache.mv[list][SCAN8_0 + x + 8 * y];
                    }
                }
            }

            let store_mvd = !mb_type.is_intra() && !mb_type.is_skip();
            for y in 0..4 {
                for x in 0..4 {
                    fctx.mvd[list][self.b4_xy + x + y * s4x4] = if store_mvd {
                        self.cache.mvd[list][SCAN8_0 + x + 8 * y]
                    } else {
                        [0, 0]
                    };
                }
            }
        }

        if self.slice.slice_type == SliceType::B {
            fctx.skipbp[mb_xy] = 0;
        }
    }
}

fn load_borders(
    dec: &mut DecPixels,
    luma: &Plane,
    px: isize,
    py: isize,
    cb: &Plane,
    cr: &Plane,
    cx: isize,
    cy: isize,
) {
    {
        let buf = dec.luma_buf();
        // Top border incl. top-left corner and 8 top-right pixels
        for i in -1..=24isize {
            buf[DecPixels::luma_offset(i, -1)] = luma.pixel(px + i, py - 1);
        }
        // Left border
        for j in 0..16isize {
            buf[DecPixels::luma_offset(-1, j)] = luma.pixel(px - 1, py + j);
        }
    }

    for (plane_idx, plane) in [cb, cr].into_iter().enumerate() {
        let buf = dec.chroma_buf(plane_idx);
        for i in -1..=12isize {
            buf[DecPixels::chroma_offset(i, -1)] = plane.pixel(cx + i, cy - 1);
        }
        for j in 0..8isize {
            buf[DecPixels::chroma_offset(-1, j)] = plane.pixel(cx - 1, cy + j);
        }
    }
}
