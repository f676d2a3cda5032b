
use std::num::NonZeroUsize;

use anyhow::{Context, Result};

use crate::util::copy_block;

/// An owned pixel plane with replicated borders.
///
/// The buffer holds `hpad` extra columns on each side and `vpad` extra
/// rows above and below the image; `(0, 0)` addresses the top-left image
/// pixel. All addressing goes through [`Plane::offset`], which
/// bounds-checks against the padded extent in debug builds and compiles
/// to plain index arithmetic in release.
#[derive(Debug, Clone)]
pub struct Plane {
    data: Vec<u8>,
    width: NonZeroUsize,
    height: NonZeroUsize,
    pitch: NonZeroUsize,
    hpad: usize,
    vpad: usize,
    origin: usize,
}

impl Plane {
    pub fn new(
        width: NonZeroUsize,
        height: NonZeroUsize,
        hpad: usize,
        vpad: usize,
    ) -> Result<Self> {
        let pitch = NonZeroUsize::new(width.get() + 2 * hpad).expect("padded width is nonzero");
        let len = pitch.get() * (height.get() + 2 * vpad);

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .context("allocating pixel plane")?;
        data.resize(len, 0);

        Ok(Self {
            data,
            width,
            height,
            pitch,
            hpad,
            vpad,
            origin: vpad * pitch.get() + hpad,
        })
    }

    /// Builds a padded plane from unpadded source pixels.
    pub fn from_pixels(
        src: &[u8],
        src_pitch: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
        hpad: usize,
        vpad: usize,
    ) -> Result<Self> {
        let mut plane = Self::new(width, height, hpad, vpad)?;
        plane.fill(src, src_pitch);
        plane.pad();
        Ok(plane)
    }

    /// Copies image pixels into the plane interior. Borders are left
    /// untouched; call [`Plane::pad`] afterwards.
    pub fn fill(&mut self, src: &[u8], src_pitch: NonZeroUsize) {
        let origin = self.origin;
        let pitch = self.pitch;
        let (width, height) = (self.width, self.height);
        copy_block(
            &mut self.data[origin..],
            pitch,
            src,
            src_pitch,
            width,
            height,
        );
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width.get()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height.get()
    }

    #[must_use]
    pub fn pitch(&self) -> NonZeroUsize {
        self.pitch
    }

    #[must_use]
    pub fn hpad(&self) -> usize {
        self.hpad
    }

    #[must_use]
    pub fn vpad(&self) -> usize {
        self.vpad
    }

    /// Buffer offset of pixel `(x, y)`; negative coordinates address the
    /// padded borders.
    #[must_use]
    pub fn offset(&self, x: isize, y: isize) -> usize {
        debug_assert!(x >= -(self.hpad as isize));
        debug_assert!(x < (self.width.get() + self.hpad) as isize);
        debug_assert!(y >= -(self.vpad as isize));
        debug_assert!(y < (self.height.get() + self.vpad) as isize);
        (self.origin as isize + y * self.pitch.get() as isize + x) as usize
    }

    /// Slice starting at pixel `(x, y)` and running to the end of the
    /// buffer; read rows from it at [`Plane::pitch`] intervals.
    #[must_use]
    pub fn slice_at(&self, x: isize, y: isize) -> &[u8] {
        &self.data[self.offset(x, y)..]
    }

    #[must_use]
    pub fn pixel(&self, x: isize, y: isize) -> u8 {
        self.data[self.offset(x, y)]
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Extends the image edges into the padding borders by replication.
    pub fn pad(&mut self) {
        let pitch = self.pitch.get();
        let (hpad, vpad) = (self.hpad, self.vpad);
        let (width, height) = (self.width.get(), self.height.get());
        if hpad == 0 && vpad == 0 {
            return;
        }
        let data = &mut self.data;
        let origin = vpad * pitch + hpad;

        // Corners
        let corners = [
            (0, data[origin]),
            (hpad + width, data[origin + width - 1]),
            (
                (vpad + height) * pitch,
                data[origin + (height - 1) * pitch],
            ),
            (
                (vpad + height) * pitch + hpad + width,
                data[origin + (height - 1) * pitch + width - 1],
            ),
        ];
        for (mut off, val) in corners {
            for _ in 0..vpad {
                data[off..off + hpad].fill(val);
                off += pitch;
            }
        }

        // Top and bottom rows
        for i in 0..width {
            let top = data[origin + i];
            let mut off = hpad + i;
            for _ in 0..vpad {
                data[off] = top;
                off += pitch;
            }
            let bottom = data[origin + (height - 1) * pitch + i];
            let mut off = (vpad + height) * pitch + hpad + i;
            for _ in 0..vpad {
                data[off] = bottom;
                off += pitch;
            }
        }

        // Left and right columns
        for i in 0..height {
            let left = data[origin + i * pitch];
            let off = (vpad + i) * pitch;
            data[off..off + hpad].fill(left);

            let right = data[origin + i * pitch + width - 1];
            let off = (vpad + i) * pitch + hpad + width;
            data[off..off + hpad].fill(right);
        }
    }
}
