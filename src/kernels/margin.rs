//! Adaptive-margin SVM penalty
//!
//! Each case carries a regularization load `ZL = eps_w * l2 + eps_b` derived
//! from its L2-norm accumulator. The margin violation `a = 1 - t*y` is
//! penalised quadratically up to `C2 * ZL` and linearly beyond it, with the
//! two pieces meeting in value and slope:
//!
//! ```text
//! P(a) = 0                          a <= 0
//!        C1 * a^2 / (2 * C2 * ZL)   0 < a <= C2 * ZL
//!        C1 * (a - C2 * ZL / 2)     a >  C2 * ZL
//! ```

use super::{label_at, StridedView};

/// Hyperparameters of the adaptive-margin penalty
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarginParams {
    /// Slope of the linear regime
    pub c1: f32,
    /// Regime boundary in units of the load
    pub c2: f32,
    /// Weight of the L2 accumulator in the load
    pub eps_w: f32,
    /// Constant floor of the load
    pub eps_b: f32,
}

impl MarginParams {
    pub fn new(c1: f32, c2: f32, eps_w: f32, eps_b: f32) -> Self {
        MarginParams { c1, c2, eps_w, eps_b }
    }

    /// Regularization load of a case
    #[inline]
    pub fn load(&self, l2: f32) -> f32 {
        self.eps_w * l2 + self.eps_b
    }

    /// Penalty `P(a)` for load `zl`
    #[inline]
    pub fn penalty(&self, a: f32, zl: f32) -> f32 {
        if a <= 0.0 {
            0.0
        } else if a > self.c2 * zl {
            self.c1 * (a - 0.5 * self.c2 * zl)
        } else {
            self.c1 * a * a / (2.0 * self.c2 * zl)
        }
    }

    /// `dP/da`
    #[inline]
    pub fn slope(&self, a: f32, zl: f32) -> f32 {
        if a <= 0.0 {
            0.0
        } else if a > self.c2 * zl {
            self.c1
        } else {
            self.c1 * a / (self.c2 * zl)
        }
    }

    /// `dP/dZL`
    #[inline]
    pub fn load_slope(&self, a: f32, zl: f32) -> f32 {
        if a <= 0.0 {
            0.0
        } else if a > self.c2 * zl {
            -0.5 * self.c1 * self.c2
        } else {
            -self.c1 * a * a / (2.0 * self.c2 * zl * zl)
        }
    }
}

/// Sign and margin violation of one cell
#[inline]
fn violation(acts: &StridedView, label: usize, class: usize, case: usize) -> (f32, f32) {
    let t = if class == label { 1.0 } else { -1.0 };
    (t, 1.0 - t * acts.get(class, case))
}

/// Penalty summed over all classes of one case
pub fn psvm(acts: &StridedView, labels: &StridedView, l2: &StridedView, params: &MarginParams, case: usize) -> f32 {
    let label = label_at(labels, case, acts.rows());
    let zl = params.load(l2.get(0, case));
    (0..acts.rows())
        .map(|class| {
            let (_, a) = violation(acts, label, class, case);
            params.penalty(a, zl)
        })
        .sum()
}

/// Gradient of the penalty w.r.t. the activation of one cell
///
/// `coeff * t * P'(a)`; the sign convention matches the hinge gradient.
#[inline]
pub fn gradsvm(acts: &StridedView, labels: &StridedView, l2: &StridedView, params: &MarginParams,
               class: usize, case: usize, coeff: f32) -> f32 {
    let label = label_at(labels, case, acts.rows());
    let zl = params.load(l2.get(0, case));
    let (t, a) = violation(acts, label, class, case);
    coeff * t * params.slope(a, zl)
}

/// Gradient of a case's penalty w.r.t. its L2 accumulator
///
/// `-coeff * eps_w * sum_class dP/dZL`, negated like every other gradient
/// kernel so that a positive `coeff` descends.
pub fn grad_psvm(acts: &StridedView, labels: &StridedView, l2: &StridedView, params: &MarginParams,
                 case: usize, coeff: f32) -> f32 {
    let label = label_at(labels, case, acts.rows());
    let zl = params.load(l2.get(0, case));
    let total: f32 = (0..acts.rows())
        .map(|class| {
            let (_, a) = violation(acts, label, class, case);
            params.load_slope(a, zl)
        })
        .sum();
    -coeff * params.eps_w * total
}
