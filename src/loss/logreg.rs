use crate::grid::launch_cells;
use crate::kernels::{cost, gradient};
use crate::matrix::Matrix;
use super::{check_inputs, check_layout, prepare_target, run_cost, CaseStats, Loss};

/// Multinomial logistic loss on softmax probabilities
///
/// The forward pass reports `ln p(label)` per case. The backward pass either
/// stops at the probabilities or, with `through_softmax`, continues through
/// the softmax with the fused (and numerically preferred) formula.
#[derive(Clone, Copy, Debug)]
pub struct LogregLoss {
    pub through_softmax: bool,
}

impl LogregLoss {
    /// Gradient w.r.t. the probabilities
    pub fn probs() -> Self {
        LogregLoss { through_softmax: false }
    }

    /// Gradient w.r.t. the pre-softmax inputs
    pub fn softmax() -> Self {
        LogregLoss { through_softmax: true }
    }
}

impl Loss for LogregLoss {
    fn forward(&self, labels: &Matrix, probs: &Matrix, stats: &mut CaseStats) {
        compute_logreg_cost(labels, probs, stats);
    }

    fn backward(&self, labels: &Matrix, probs: &Matrix, _stats: &CaseStats,
                target: &mut Matrix, coeff: f32, add: bool) {
        if self.through_softmax {
            compute_logreg_softmax_grad(labels, probs, target, add, coeff);
        } else {
            compute_logreg_grad(labels, probs, target, add, coeff);
        }
    }
}

/// Per-case label log-probability and correctness credit
///
/// Fills `stats.cost` with `ln p(label)` and `stats.correct` with the tie-split
/// credit; `stats.max` receives the per-case maximum probability.
pub fn compute_logreg_cost(labels: &Matrix, probs: &Matrix, stats: &mut CaseStats) {
    let (_, num_cases) = check_inputs("logreg_cost", labels, probs);
    probs.max(0, &mut stats.max);

    let costs = {
        let (p, l, m) = (probs.view(), labels.view(), stats.max.view());
        run_cost("logreg_cost", num_cases, |case| cost::logreg(&p, &l, &m, case))
    };
    stats.store(&costs);
}

/// `dE/dy = coeff * [class == label] / y`
pub fn compute_logreg_grad(labels: &Matrix, probs: &Matrix, target: &mut Matrix, add: bool, coeff: f32) {
    check_inputs("logreg_grad", labels, probs);
    prepare_target("logreg_grad", target, probs, add);

    let (p, l) = (probs.view(), labels.view());
    launch_cells("logreg_grad", target, add, |class, case| gradient::logreg(&p, &l, class, case, coeff));
}

/// Apply the softmax Jacobian to `acts_grad` (`dE/dy`), giving `dE/dx`
///
/// `acts` holds the softmax outputs `y`.
pub fn compute_softmax_grad(acts: &Matrix, acts_grad: &Matrix, target: &mut Matrix, add: bool) {
    check_layout("softmax_grad", acts);
    check_layout("softmax_grad", acts_grad);
    assert!(acts_grad.is_same_dims(acts),
            "softmax_grad: gradient is {}x{}, outputs are {}x{}",
            acts_grad.rows(), acts_grad.cols(), acts.rows(), acts.cols());
    prepare_target("softmax_grad", target, acts, add);

    let (y, g) = (acts.view(), acts_grad.view());
    launch_cells("softmax_grad", target, add, |class, case| gradient::softmax(&y, &g, class, case));
}

/// Fused log-loss + softmax gradient, `coeff * ([class == label] - y)`
pub fn compute_logreg_softmax_grad(labels: &Matrix, probs: &Matrix, target: &mut Matrix, add: bool, coeff: f32) {
    check_inputs("logreg_softmax_grad", labels, probs);
    prepare_target("logreg_softmax_grad", target, probs, add);

    let (p, l) = (probs.view(), labels.view());
    launch_cells("logreg_softmax_grad", target, add,
                 |class, case| gradient::logreg_softmax(&p, &l, class, case, coeff));
}
