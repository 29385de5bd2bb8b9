//! Per-cell gradient bodies
//!
//! `coeff` is the gradient coefficient folded in by the caller (learning rate
//! over batch size, already negated for descent). Every function returns the
//! value for cell `(class, case)`; the caller decides whether it overwrites or
//! accumulates.

use super::{indicator, label_at, StridedView};

/// Log-loss gradient w.r.t. the probabilities: `coeff * [class == label] / y`
///
/// Only the label row is non-zero. The division is done for every row, so a
/// zero probability off the label row still yields NaN, as it would on device.
#[inline]
pub fn logreg(probs: &StridedView, labels: &StridedView, class: usize, case: usize, coeff: f32) -> f32 {
    let label = label_at(labels, case, probs.rows());
    let v = coeff * indicator(class == label);
    v / probs.get(class, case)
}

/// Softmax Jacobian applied to `dE/dy`, giving `dE/dx` for one cell
///
/// `y[t] * sum_j dE/dy[j] * ([j == t] - y[j])`, summed explicitly over every
/// class of the column.
#[inline]
pub fn softmax(acts: &StridedView, acts_grad: &StridedView, class: usize, case: usize) -> f32 {
    let mut v = 0.0;
    for j in 0..acts.rows() {
        v += acts_grad.get(j, case) * (indicator(j == class) - acts.get(j, case));
    }
    v * acts.get(class, case)
}

/// Fused log-loss + softmax gradient w.r.t. the pre-softmax inputs:
/// `coeff * ([class == label] - y)`
#[inline]
pub fn logreg_softmax(probs: &StridedView, labels: &StridedView, class: usize, case: usize, coeff: f32) -> f32 {
    let label = label_at(labels, case, probs.rows());
    coeff * (indicator(class == label) - probs.get(class, case))
}

/// Squared-hinge gradient with the constant offset inside the margin
///
/// `t = ±1` marks the label row, `a = 1 - t*y`, and the result is
/// `coeff * t * (max(a, 0) + 0.3 * [a > 0])`.
#[inline]
pub fn l2svm(acts: &StridedView, labels: &StridedView, class: usize, case: usize, coeff: f32) -> f32 {
    let label = label_at(labels, case, acts.rows());
    let t = if class == label { 1.0 } else { -1.0 };
    let a = 1.0 - t * acts.get(class, case);
    coeff * t * (a.max(0.0) + HINGE_OFFSET * indicator(a > 0.0))
}

/// Constant added to the hinge gradient while the margin is violated
pub const HINGE_OFFSET: f32 = 0.3;
