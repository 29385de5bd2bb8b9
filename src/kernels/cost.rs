//! Per-case cost and correctness

use super::{label_at, StridedView};

/// Offset keeping the robust weight finite for perfectly predicted cases
pub const ROBUST_EPSILON: f32 = 1e-6;

/// Per-case forward result
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaseCost {
    /// `ln p(label)` for the log-loss kernels, the squared hinge for L2-SVM
    pub cost: f32,
    /// Share of the credit for predicting the label (0 or 1/ties)
    pub correct: f32,
}

/// Correctness credit for one case
///
/// No credit unless the label's value is the column maximum; otherwise the
/// credit is split evenly across every class tied at that maximum. Ties are
/// detected with exact equality.
#[inline]
pub fn correct_credit(column: impl Iterator<Item = f32>, label_value: f32, max: f32) -> f32 {
    if label_value != max {
        return 0.0;
    }
    let ties = column.filter(|&v| v == max).count();
    1.0 / ties as f32
}

/// Multinomial log-loss for one case
pub fn logreg(probs: &StridedView, labels: &StridedView, max_probs: &StridedView, case: usize) -> CaseCost {
    let label = label_at(labels, case, probs.rows());
    let label_prob = probs.get(label, case);
    CaseCost {
        cost: label_prob.ln(),
        correct: correct_credit(probs.col(case), label_prob, max_probs.get(0, case)),
    }
}

/// Weight of a case under the robust log-loss, `(-ln p + eps)^p_pow`
#[inline]
pub fn robust_weight(label_log_prob: f32, p_pow: f32) -> f32 {
    (-label_log_prob + ROBUST_EPSILON).powf(p_pow)
}

/// Squared hinge on the label's activation for one case
pub fn l2svm(acts: &StridedView, labels: &StridedView, max_acts: &StridedView, case: usize) -> CaseCost {
    let label = label_at(labels, case, acts.rows());
    let label_act = acts.get(label, case);
    let margin = (1.0 - label_act).max(0.0);
    CaseCost {
        cost: margin * margin,
        correct: correct_credit(acts.col(case), label_act, max_acts.get(0, case)),
    }
}
