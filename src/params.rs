
use anyhow::{Result, bail};
use bitflags::bitflags;

/// Full-pel search pattern used by the coarse stage of motion estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    /// Four axis-aligned neighbours, re-centred until no improvement.
    Diamond = 0,
    /// Six-point hexagon followed by a square refinement pass.
    Hexagon = 1,
}

impl TryFrom<i64> for SearchType {
    type Error = anyhow::Error;

    fn try_from(val: i64) -> Result<Self> {
        Ok(match val {
            0 => Self::Diamond,
            1 => Self::Hexagon,
            _ => bail!("Invalid value for 'search', must be 0-1, got {val}."),
        })
    }
}

/// Sub-pel refinement effort. Presets select how many half-pel and
/// quarter-pel iterations run during the search of every candidate block
/// and during the final refinement of the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubpelRefine {
    Fullpel = 0,
    Fast = 1,
    Default = 2,
    Better = 3,
    Slow = 4,
    Slowest = 5,
}

/// Iteration budgets per preset: `[refine_hpel, refine_qpel, search_hpel,
/// search_qpel]`, where the `search_*` budgets run on every candidate
/// block type and the `refine_*` budgets only on the winner.
const SUBPEL_ITERATIONS: [[u8; 4]; 6] = [
    [1, 0, 0, 0],
    [1, 1, 0, 0],
    [1, 2, 0, 0],
    [0, 2, 1, 0],
    [0, 2, 1, 1],
    [0, 2, 1, 2],
];

impl SubpelRefine {
    #[must_use]
    pub const fn refine_iters(self) -> (u8, u8) {
        let row = SUBPEL_ITERATIONS[self as usize];
        (row[0], row[1])
    }

    #[must_use]
    pub const fn search_iters(self) -> (u8, u8) {
        let row = SUBPEL_ITERATIONS[self as usize];
        (row[2], row[3])
    }
}

impl TryFrom<i64> for SubpelRefine {
    type Error = anyhow::Error;

    fn try_from(val: i64) -> Result<Self> {
        Ok(match val {
            0 => Self::Fullpel,
            1 => Self::Fast,
            2 => Self::Default,
            3 => Self::Better,
            4 => Self::Slow,
            5 => Self::Slowest,
            _ => bail!("Invalid value for 'subpel', must be 0-5, got {val}."),
        })
    }
}

bitflags! {
    /// Which candidate classes the mode decision evaluates. Disabled
    /// classes are skipped entirely, trading quality for speed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnalyseFlags: u8 {
        const I4X4 = 0x01;
        const I8X8 = 0x02;
        const PSUB16X16 = 0x04;
        const PSUB8X8 = 0x08;
        const CHROMA_ME = 0x10;
        const WEIGHTED_BIPRED = 0x20;
    }
}

/// Analysis configuration. The bias constants preserve the shape of the
/// original heuristics; their exact values are tunable, not normative.
#[derive(Debug, Clone, Copy)]
pub struct AnalyseParams {
    pub search: SearchType,
    pub subpel: SubpelRefine,
    pub flags: AnalyseFlags,
    /// Full-pel coarse search iteration cap.
    pub me_iterations: u16,
    /// Skip-probe decimation limit for the luma residual.
    pub skip_luma_limit: u32,
    /// Skip-probe decimation limit for each chroma residual.
    pub skip_chroma_limit: u32,
    /// Skip 4x4/8x8 intra sizes when the 16x16 intra cost exceeds the best
    /// inter cost times this factor.
    pub intra_exit_mul: u32,
    /// Re-score leading candidates through the exact rate-distortion
    /// oracle before finalizing.
    pub rdo: bool,
}

impl Default for AnalyseParams {
    fn default() -> Self {
        Self {
            search: SearchType::Hexagon,
            subpel: SubpelRefine::Default,
            flags: AnalyseFlags::I4X4 | AnalyseFlags::PSUB16X16,
            me_iterations: 16,
            skip_luma_limit: 6,
            skip_chroma_limit: 7,
            intra_exit_mul: 2,
            rdo: false,
        }
    }
}

impl AnalyseParams {
    pub fn validate(&self) -> Result<()> {
        if self.me_iterations == 0 || self.me_iterations > 64 {
            bail!(
                "AnalyseParams: me_iterations must be between 1 and 64 (inclusive), got {}.",
                self.me_iterations
            );
        }
        if self.intra_exit_mul == 0 {
            bail!("AnalyseParams: intra_exit_mul must be nonzero.");
        }
        if self.flags.contains(AnalyseFlags::PSUB8X8)
            && !self.flags.contains(AnalyseFlags::PSUB16X16)
        {
            bail!("AnalyseParams: PSUB8X8 requires PSUB16X16.");
        }
        Ok(())
    }
}
