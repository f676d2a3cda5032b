//! Macroblock analysis engine for an H.264 encoder.
//!
//! For every 16x16 macroblock this crate decides *how* to predict it:
//! from reconstructed neighbour pixels (intra, at 16x16/8x8/4x4) or from
//! reference frames via quarter-pel motion compensation (inter, over the
//! partition tree), selecting the references, vectors and partition shape
//! that minimize a Lagrangian rate-distortion cost. The winning decision
//! and its neighbour context (vectors, reference indices, coefficient
//! flags) are committed to a per-frame store that seeds the predictors of
//! later macroblocks and feeds the entropy coder and deblocking filter.
//!
//! The intended per-macroblock flow:
//!
//! ```text
//! ctx = MbContext::new(slice)          // once per thread
//! res = analyser.analyse_macroblock(&mut ctx, &fctx, addr, ...)
//! <residual stage encodes res, filling res.nnz / res.cbp>
//! ctx.save(&mut fctx, &res)            // commit for later neighbours
//! ```
//!
//! Transform/quantization and entropy sizing are external collaborators,
//! consumed through [`oracle::RdOracle`]. Frame-level scheduling is also
//! external; the only blocking point here is the wait on a reference's
//! reconstruction progress ([`reference::RowProgress`]).

// Performance
#![warn(clippy::inefficient_to_string)]
#![warn(clippy::inline_always)]
#![warn(clippy::large_types_passed_by_value)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::or_fun_call)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::trivially_copy_pass_by_ref)]
// Readability/Code Intention
#![warn(clippy::checked_conversions)]
#![warn(clippy::cloned_instead_of_copied)]
#![warn(clippy::enum_glob_use)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::manual_assert)]
#![warn(clippy::manual_let_else)]
#![warn(clippy::map_unwrap_or)]
#![warn(clippy::match_bool)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::needless_continue)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::tests_outside_test_module)]
// Correctness/Safety
#![warn(clippy::dbg_macro)]
#![deny(clippy::debug_assert_with_mut_call)]
#![warn(clippy::infinite_loop)]
#![warn(clippy::large_stack_arrays)]
#![warn(clippy::mem_forget)]
#![warn(clippy::mut_mut)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::unwrap_used)]
// Annoyances
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(unsafe_op_in_unsafe_fn)]


pub mod analyse;
pub mod context;
pub mod cost;
pub mod frame;
pub mod me;
pub mod mv;
pub mod oracle;
pub mod params;
pub mod plane;
pub mod predict;
pub mod reference;
pub mod subpel;
pub mod util;

pub use analyse::{AnalysisResult, Analyser, RefPicLists};
pub use context::{FrameContext, MbContext, MbPartition, MbType, RefState, SubPartition};
pub use frame::{FrameGeometry, MacroblockAddress, SliceParams, SliceType, SourceFrame};
pub use mv::{MotionVector, MvBounds};
pub use oracle::{ModeCandidate, RdCost, RdOracle};
pub use params::{AnalyseFlags, AnalyseParams, SearchType, SubpelRefine};
pub use reference::{ReferenceFrame, RowProgress};
