use crate::error::check_launch;
use crate::grid::{launch, launch_cells, map_cases, Grid};
use crate::kernels::cost::{correct_credit, CaseCost};
use crate::kernels::label_at;
use crate::kernels::margin::{self, MarginParams};
use crate::matrix::Matrix;
use super::{check_case_vector, check_inputs, prepare_target, CaseStats, Loss};

/// Adaptive-margin SVM: a soft quadratic-then-linear hinge whose regime
/// boundary scales with each case's L2 regularization load
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveSvmLoss<'a> {
    pub params: MarginParams,
    /// `1 x num_cases` L2-norm accumulator
    pub l2: &'a Matrix,
}

impl Loss for AdaptiveSvmLoss<'_> {
    fn forward(&self, labels: &Matrix, acts: &Matrix, stats: &mut CaseStats) {
        compute_psvm_cost(labels, acts, self.l2, &self.params, stats);
    }

    fn backward(&self, labels: &Matrix, acts: &Matrix, _stats: &CaseStats,
                target: &mut Matrix, coeff: f32, add: bool) {
        compute_psvm_grad(labels, acts, self.l2, &self.params, target, add, coeff);
    }
}

fn check_params(op: &str, params: &MarginParams) {
    assert!(params.c2 > 0.0, "{}: C2 must be positive", op);
    assert!(params.eps_w >= 0.0 && params.eps_b > 0.0,
            "{}: load needs eps_w >= 0 and eps_b > 0", op);
}

/// Penalty summed over classes per case, with correctness on the raw
/// activations
pub fn compute_psvm_cost(labels: &Matrix, acts: &Matrix, l2: &Matrix, params: &MarginParams,
                         stats: &mut CaseStats) {
    const OP: &str = "psvm_cost";
    let (num_out, num_cases) = check_inputs(OP, labels, acts);
    check_case_vector(OP, "l2", l2, num_cases);
    check_params(OP, params);
    acts.max(0, &mut stats.max);

    let costs = {
        let (a, l, z, m) = (acts.view(), labels.view(), l2.view(), stats.max.view());
        let grid = Grid::for_cases(num_cases);
        check_launch(OP, launch(OP, &grid, || {
            map_cases(num_cases, &grid, |case| {
                let label = label_at(&l, case, num_out);
                CaseCost {
                    cost: margin::psvm(&a, &l, &z, params, case),
                    correct: correct_credit(a.col(case), a.get(label, case), m.get(0, case)),
                }
            })
        }))
    };
    stats.store(&costs);
}

/// Gradient of the penalty w.r.t. the activations
pub fn compute_psvm_grad(labels: &Matrix, acts: &Matrix, l2: &Matrix, params: &MarginParams,
                         target: &mut Matrix, add: bool, coeff: f32) {
    const OP: &str = "psvm_grad";
    let (_, num_cases) = check_inputs(OP, labels, acts);
    check_case_vector(OP, "l2", l2, num_cases);
    check_params(OP, params);
    prepare_target(OP, target, acts, add);

    let (a, l, z) = (acts.view(), labels.view(), l2.view());
    launch_cells(OP, target, add,
                 |class, case| margin::gradsvm(&a, &l, &z, params, class, case, coeff));
}

/// Gradient of each case's penalty w.r.t. its L2 accumulator, `1 x num_cases`
pub fn compute_psvm_load_grad(labels: &Matrix, acts: &Matrix, l2: &Matrix, params: &MarginParams,
                              target: &mut Matrix, add: bool, coeff: f32) {
    const OP: &str = "psvm_load_grad";
    let (_, num_cases) = check_inputs(OP, labels, acts);
    check_case_vector(OP, "l2", l2, num_cases);
    check_params(OP, params);
    prepare_target(OP, target, l2, add);

    let (a, l, z) = (acts.view(), labels.view(), l2.view());
    launch_cells(OP, target, add, |_, case| margin::grad_psvm(&a, &l, &z, params, case, coeff));
}
