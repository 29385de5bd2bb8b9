use crate::grid::{launch, launch_cells, map_cases, Grid};
use crate::error::check_launch;
use crate::kernels::{cost, gradient};
use crate::matrix::Matrix;
use super::{check_case_vector, check_inputs, prepare_target, CaseStats, Loss};

/// Log-loss re-weighted towards badly predicted cases
///
/// Each case's gradient is scaled by `(-ln p(label) + 1e-6)^p_pow`, computed
/// by the forward pass into `CaseStats::weights`.
#[derive(Clone, Copy, Debug)]
pub struct RobustLogregLoss {
    pub p_pow: f32,
    pub through_softmax: bool,
}

impl RobustLogregLoss {
    pub fn new(p_pow: f32, through_softmax: bool) -> Self {
        RobustLogregLoss { p_pow, through_softmax }
    }
}

impl Loss for RobustLogregLoss {
    fn forward(&self, labels: &Matrix, probs: &Matrix, stats: &mut CaseStats) {
        compute_robust_logreg_cost(labels, probs, stats, self.p_pow);
    }

    fn backward(&self, labels: &Matrix, probs: &Matrix, stats: &CaseStats,
                target: &mut Matrix, coeff: f32, add: bool) {
        if self.through_softmax {
            compute_robust_logreg_softmax_grad(labels, probs, &stats.weights, target, add, coeff);
        } else {
            compute_robust_logreg_grad(labels, probs, &stats.weights, target, add, coeff);
        }
    }
}

/// Log-loss cost plus per-case weights into `stats.weights`
pub fn compute_robust_logreg_cost(labels: &Matrix, probs: &Matrix, stats: &mut CaseStats, p_pow: f32) {
    const OP: &str = "robust_logreg_cost";
    let (_, num_cases) = check_inputs(OP, labels, probs);
    probs.max(0, &mut stats.max);

    let results = {
        let (p, l, m) = (probs.view(), labels.view(), stats.max.view());
        let grid = Grid::for_cases(num_cases);
        check_launch(OP, launch(OP, &grid, || {
            map_cases(num_cases, &grid, |case| {
                let c = cost::logreg(&p, &l, &m, case);
                (c, cost::robust_weight(c.cost, p_pow))
            })
        }))
    };

    let (costs, weights): (Vec<_>, Vec<_>) = results.into_iter().unzip();
    stats.store(&costs);
    stats.weights = Matrix::from_vec(1, num_cases, weights);
}

/// Log-loss gradient w.r.t. the probabilities, scaled per case by `weights`
pub fn compute_robust_logreg_grad(labels: &Matrix, probs: &Matrix, weights: &Matrix,
                                  target: &mut Matrix, add: bool, coeff: f32) {
    const OP: &str = "robust_logreg_grad";
    let (_, num_cases) = check_inputs(OP, labels, probs);
    check_case_vector(OP, "weights", weights, num_cases);
    prepare_target(OP, target, probs, add);

    let (p, l, w) = (probs.view(), labels.view(), weights.view());
    launch_cells(OP, target, add,
                 |class, case| gradient::logreg(&p, &l, class, case, coeff) * w.get(0, case));
}

/// Fused log-loss + softmax gradient, scaled per case by `weights`
pub fn compute_robust_logreg_softmax_grad(labels: &Matrix, probs: &Matrix, weights: &Matrix,
                                          target: &mut Matrix, add: bool, coeff: f32) {
    const OP: &str = "robust_logreg_softmax_grad";
    let (_, num_cases) = check_inputs(OP, labels, probs);
    check_case_vector(OP, "weights", weights, num_cases);
    prepare_target(OP, target, probs, add);

    let (p, l, w) = (probs.view(), labels.view(), weights.view());
    launch_cells(OP, target, add,
                 |class, case| gradient::logreg_softmax(&p, &l, class, case, coeff) * w.get(0, case));
}
