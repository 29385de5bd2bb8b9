//! Per-thread kernel bodies
//!
//! Each function here computes what one grid thread computes for one cell or
//! one case. They read inputs through [`StridedView`]s and never allocate or
//! write shared state; launching them over a grid is the dispatch layer's job.

pub mod composite;
pub mod cost;
pub mod gradient;
pub mod margin;

use crate::matrix::StridedView;

/// Class id of `case`, stored as a float and truncated
///
/// Panics when the label does not name one of the `num_out` classes.
#[inline]
pub fn label_at(labels: &StridedView, case: usize, num_out: usize) -> usize {
    let raw = labels.get(0, case);
    let label = raw as usize;
    assert!(raw >= 0.0 && label < num_out,
            "label {} of case {} outside 0..{}", raw, case, num_out);
    label
}

/// `1.0` when `cond` holds, `0.0` otherwise
#[inline]
pub fn indicator(cond: bool) -> f32 {
    if cond { 1.0 } else { 0.0 }
}

/// Rectifier used by the composite activation
#[inline]
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}
