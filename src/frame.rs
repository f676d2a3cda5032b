
use std::num::NonZeroUsize;

use anyhow::{Result, bail};

use crate::{plane::Plane, reference::FieldParity};

/// Grid position of a macroblock, in macroblock units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroblockAddress {
    pub x: usize,
    pub y: usize,
}

impl MacroblockAddress {
    #[must_use]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Frame dimensions in macroblocks plus the derived strides of the 8x8
/// and 4x4 sub-block grids the persistent context arrays use.
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry {
    pub mb_width: NonZeroUsize,
    pub mb_height: NonZeroUsize,
    /// Set when this picture is one field of an interlaced frame whose
    /// references store interleaved field rows.
    pub field: Option<FieldParity>,
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || width % 16 != 0 || height == 0 || height % 16 != 0 {
            bail!(
                "FrameGeometry: dimensions must be nonzero multiples of 16, got {width}x{height}."
            );
        }
        Ok(Self {
            mb_width: NonZeroUsize::new(width / 16).expect("nonzero"),
            mb_height: NonZeroUsize::new(height / 16).expect("nonzero"),
            field: None,
        })
    }

    #[must_use]
    pub fn mb_count(&self) -> usize {
        self.mb_width.get() * self.mb_height.get()
    }

    /// Raster-scan index of a macroblock.
    #[must_use]
    pub fn mb_index(&self, addr: MacroblockAddress) -> usize {
        debug_assert!(addr.x < self.mb_width.get() && addr.y < self.mb_height.get());
        addr.y * self.mb_width.get() + addr.x
    }

    /// Stride of the per-8x8 grid.
    #[must_use]
    pub fn b8_stride(&self) -> usize {
        2 * self.mb_width.get()
    }

    /// Stride of the per-4x4 grid.
    #[must_use]
    pub fn b4_stride(&self) -> usize {
        4 * self.mb_width.get()
    }

    /// Index of a macroblock's first 8x8 block in the per-8x8 grid.
    #[must_use]
    pub fn b8_index(&self, addr: MacroblockAddress) -> usize {
        2 * (addr.y * self.b8_stride() + addr.x)
    }

    /// Index of a macroblock's first 4x4 block in the per-4x4 grid.
    #[must_use]
    pub fn b4_index(&self, addr: MacroblockAddress) -> usize {
        4 * (addr.y * self.b4_stride() + addr.x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
    B,
}

/// The slice-level inputs the analysis needs: slice membership for
/// availability decisions, active reference counts for index costs, and
/// the prediction tools the slice permits.
#[derive(Debug, Clone, Copy)]
pub struct SliceParams {
    pub slice_type: SliceType,
    pub slice_id: u32,
    /// Raster index of the first macroblock of this slice. Geometric
    /// neighbours before it belong to an earlier slice and are treated as
    /// unavailable.
    pub first_mb: usize,
    pub num_ref_idx_active: [u8; 2],
    pub weighted_bipred: bool,
    pub qp: u8,
}

impl SliceParams {
    pub fn validate(&self) -> Result<()> {
        if self.qp > 51 {
            bail!("SliceParams: qp must be 0-51, got {}.", self.qp);
        }
        match self.slice_type {
            SliceType::I => {}
            SliceType::P => {
                if self.num_ref_idx_active[0] == 0 {
                    bail!("SliceParams: P slice requires at least one list-0 reference.");
                }
            }
            SliceType::B => {
                if self.num_ref_idx_active[0] == 0 || self.num_ref_idx_active[1] == 0 {
                    bail!("SliceParams: B slice requires a reference in each list.");
                }
            }
        }
        Ok(())
    }
}

/// Source pixels of the frame being encoded.
#[derive(Debug)]
pub struct SourceFrame {
    pub luma: Plane,
    pub cb: Plane,
    pub cr: Plane,
    pub poc: i32,
}

impl SourceFrame {
    pub fn new(luma: Plane, cb: Plane, cr: Plane, poc: i32) -> Result<Self> {
        if cb.width() * 2 != luma.width() || cb.height() * 2 != luma.height() {
            bail!("SourceFrame: chroma planes must be half the luma resolution.");
        }
        if cr.width() != cb.width() || cr.height() != cb.height() {
            bail!("SourceFrame: chroma planes must agree in size.");
        }
        Ok(Self { luma, cb, cr, poc })
    }
}
