//! Loss layers: host dispatch for the cost and gradient kernels
//!
//! Every entry point checks the layout of its inputs, sizes its outputs, runs
//! the kernel over a grid derived from the output shape and checks the launch
//! status. Layout violations and launch failures are caller bugs or corrupted
//! state and panic; numerical corner cases (ties, zero probabilities) are
//! handled by the formulas themselves.
//!
//! Forward matrices are `num_out x num_cases`: one row per class, one column
//! per case, row-major. Labels are `1 x num_cases` class ids stored as floats.

mod l2svm;
mod logreg;
mod margin;
mod robust;

pub use l2svm::{compute_l2svm_cost, compute_l2svm_grad, L2SvmLoss};
pub use logreg::{
    compute_logreg_cost, compute_logreg_grad, compute_logreg_softmax_grad, compute_softmax_grad,
    LogregLoss,
};
pub use margin::{compute_psvm_cost, compute_psvm_grad, compute_psvm_load_grad, AdaptiveSvmLoss};
pub use robust::{
    compute_robust_logreg_cost, compute_robust_logreg_grad, compute_robust_logreg_softmax_grad,
    RobustLogregLoss,
};

use crate::error::check_launch;
use crate::grid::{launch, map_cases, Grid};
use crate::kernels::cost::CaseCost;
use crate::matrix::Matrix;

/// Per-case buffers produced by a forward pass
///
/// All four matrices are `1 x num_cases` once filled. `max` is scratch space
/// for the per-case maximum and is reused across calls; `weights` is only
/// filled by the robust log-loss.
#[derive(Clone, Debug)]
pub struct CaseStats {
    pub cost: Matrix,
    pub correct: Matrix,
    pub weights: Matrix,
    pub max: Matrix,
}

impl Default for CaseStats {
    fn default() -> Self {
        CaseStats::new()
    }
}

impl CaseStats {
    pub fn new() -> Self {
        CaseStats {
            cost: Matrix::empty(),
            correct: Matrix::empty(),
            weights: Matrix::empty(),
            max: Matrix::empty(),
        }
    }

    /// Number of cases in the last forward pass
    pub fn num_cases(&self) -> usize {
        self.cost.cols()
    }

    /// Sum of the per-case cost terms
    pub fn total_cost(&self) -> f32 {
        self.cost.sum()
    }

    /// Fraction of cases predicted correctly, with tie credit
    pub fn accuracy(&self) -> f32 {
        if self.correct.is_empty() {
            return 0.0;
        }
        self.correct.sum() / self.correct.cols() as f32
    }

    fn store(&mut self, costs: &[CaseCost]) {
        self.cost.resize(1, costs.len());
        self.correct.resize(1, costs.len());
        for (case, c) in costs.iter().enumerate() {
            self.cost.set(0, case, c.cost);
            self.correct.set(0, case, c.correct);
        }
    }
}

/// Common trait for loss layers
pub trait Loss {
    /// Fill per-case cost and correctness for `acts`
    fn forward(&self, labels: &Matrix, acts: &Matrix, stats: &mut CaseStats);

    /// Write (or with `add`, accumulate) the scaled gradient into `target`
    fn backward(&self, labels: &Matrix, acts: &Matrix, stats: &CaseStats,
                target: &mut Matrix, coeff: f32, add: bool);
}

/// Validate a forward matrix and its labels; returns `(num_out, num_cases)`
pub(crate) fn check_inputs(op: &str, labels: &Matrix, acts: &Matrix) -> (usize, usize) {
    check_layout(op, acts);
    let num_cases = acts.leading_dim();
    let num_out = acts.following_dim();
    check_layout(op, labels);
    assert_eq!(labels.rows(), 1, "{}: labels must be a single row", op);
    assert_eq!(labels.cols(), num_cases, "{}: one label per case expected", op);
    (num_out, num_cases)
}

/// Kernels index row-major packed storage
pub(crate) fn check_layout(op: &str, m: &Matrix) {
    assert!(!m.is_trans(), "{}: transposed input not supported", op);
    assert!(m.is_contiguous(), "{}: input must be contiguous", op);
}

/// Validate a caller-supplied per-case vector
pub(crate) fn check_case_vector(op: &str, name: &str, v: &Matrix, num_cases: usize) {
    check_layout(op, v);
    assert!(v.rows() == 1 && v.cols() == num_cases,
            "{}: {} must be 1x{}, got {}x{}", op, name, num_cases, v.rows(), v.cols());
}

/// Size a gradient target like `like`; accumulation needs it sized already
///
/// An overwritten target with the right shape but a transposed or padded
/// layout is reallocated as packed row-major storage. An accumulated one must
/// already be packed row-major since its contents are kept.
pub(crate) fn prepare_target(op: &str, target: &mut Matrix, like: &Matrix, add: bool) {
    if add {
        assert!(target.is_same_dims(like),
                "{}: accumulating into a {}x{} target, expected {}x{}",
                op, target.rows(), target.cols(), like.rows(), like.cols());
        check_layout(op, target);
        return;
    }
    if target.is_trans() || !target.is_contiguous() {
        log::trace!("{}: relaying out {}x{} target", op, target.rows(), target.cols());
        *target = Matrix::zeros(like.rows(), like.cols());
    }
    target.resize_like(like);
}

/// Run a per-case cost kernel, results in case order
pub(crate) fn run_cost<F>(op: &str, num_cases: usize, kernel: F) -> Vec<CaseCost>
where
    F: Fn(usize) -> CaseCost + Sync + Send,
{
    let grid = Grid::for_cases(num_cases);
    check_launch(op, launch(op, &grid, || map_cases(num_cases, &grid, &kernel)))
}

/// Most probable class of each case into a `1 x num_cases` target
///
/// Ties go to the lowest class index.
pub fn predict_labels(probs: &Matrix, target: &mut Matrix) {
    check_layout("predict_labels", probs);
    probs.argmax_cols(target);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_labels() {
        let probs = Matrix::from_rows(&[vec![0.7, 0.2], vec![0.2, 0.3], vec![0.1, 0.5]]);
        let mut predicted = Matrix::empty();
        predict_labels(&probs, &mut predicted);
        assert_eq!(predicted.to_vec(), vec![0.0, 2.0]);
    }

    #[test]
    #[should_panic(expected = "transposed input not supported")]
    fn test_transposed_input_rejected() {
        let probs = Matrix::zeros(2, 3).transposed();
        let labels = Matrix::zeros(1, 3);
        check_inputs("logreg_cost", &labels, &probs);
    }

    #[test]
    #[should_panic(expected = "one label per case expected")]
    fn test_label_count_mismatch() {
        let probs = Matrix::zeros(3, 4);
        let labels = Matrix::zeros(1, 3);
        check_inputs("logreg_cost", &labels, &probs);
    }

    #[test]
    #[should_panic(expected = "must be contiguous")]
    fn test_padded_input_rejected() {
        let probs = Matrix::with_stride(2, 2, 4, vec![0.0; 8]);
        let labels = Matrix::zeros(1, 2);
        check_inputs("l2svm_cost", &labels, &probs);
    }

    #[test]
    #[should_panic(expected = "accumulating into a 2x2 target")]
    fn test_accumulate_needs_sized_target() {
        let mut target = Matrix::zeros(2, 2);
        prepare_target("logreg_grad", &mut target, &Matrix::zeros(3, 2), true);
    }

    #[test]
    fn test_overwrite_relays_out_target() {
        let probs = Matrix::from_rows(&[vec![0.6, 0.3], vec![0.4, 0.7]]);
        let labels = Matrix::from_vec(1, 2, vec![0.0, 1.0]);

        let mut transposed = Matrix::zeros(2, 2).transposed();
        compute_logreg_softmax_grad(&labels, &probs, &mut transposed, false, 1.0);
        assert!(!transposed.is_trans());

        let mut padded = Matrix::with_stride(2, 2, 5, vec![9.0; 7]);
        compute_logreg_softmax_grad(&labels, &probs, &mut padded, false, 1.0);
        assert!(padded.is_contiguous());

        let expected = [0.4, -0.3, -0.4, 0.3];
        for (got, want) in transposed.to_vec().iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
        assert_eq!(transposed, padded);
    }

    #[test]
    #[should_panic(expected = "logreg_grad: transposed input not supported")]
    fn test_accumulate_rejects_transposed_target() {
        let probs = Matrix::from_rows(&[vec![0.6, 0.3], vec![0.4, 0.7]]);
        let labels = Matrix::from_vec(1, 2, vec![0.0, 1.0]);
        let mut target = Matrix::zeros(2, 2).transposed();
        compute_logreg_grad(&labels, &probs, &mut target, true, 1.0);
    }

    #[test]
    fn test_accuracy_of_empty_stats() {
        assert_eq!(CaseStats::new().accuracy(), 0.0);
    }
}
