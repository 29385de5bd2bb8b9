use crate::grid::launch_cells;
use crate::kernels::{cost, gradient};
use crate::matrix::Matrix;
use super::{check_inputs, prepare_target, run_cost, CaseStats, Loss};

/// Squared hinge (L2-SVM) loss on raw activations
#[derive(Clone, Copy, Debug, Default)]
pub struct L2SvmLoss;

impl Loss for L2SvmLoss {
    fn forward(&self, labels: &Matrix, acts: &Matrix, stats: &mut CaseStats) {
        compute_l2svm_cost(labels, acts, stats);
    }

    fn backward(&self, labels: &Matrix, acts: &Matrix, _stats: &CaseStats,
                target: &mut Matrix, coeff: f32, add: bool) {
        compute_l2svm_grad(labels, acts, target, add, coeff);
    }
}

/// `max(1 - act[label], 0)^2` per case, with correctness judged on the raw
/// activations
pub fn compute_l2svm_cost(labels: &Matrix, acts: &Matrix, stats: &mut CaseStats) {
    let (_, num_cases) = check_inputs("l2svm_cost", labels, acts);
    acts.max(0, &mut stats.max);

    let costs = {
        let (a, l, m) = (acts.view(), labels.view(), stats.max.view());
        run_cost("l2svm_cost", num_cases, |case| cost::l2svm(&a, &l, &m, case))
    };
    stats.store(&costs);
}

/// Hinge gradient over every class of every case
pub fn compute_l2svm_grad(labels: &Matrix, acts: &Matrix, target: &mut Matrix, add: bool, coeff: f32) {
    check_inputs("l2svm_grad", labels, acts);
    prepare_target("l2svm_grad", target, acts, add);

    let (a, l) = (acts.view(), labels.view());
    launch_cells("l2svm_grad", target, add, |class, case| gradient::l2svm(&a, &l, class, case, coeff));
}
