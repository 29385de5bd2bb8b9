//! Elementwise layers: the three-input composite activation and the
//! gradient of an elementwise max

use crate::config::PARAM_GRAD_TILE;
use crate::error::check_launch;
use crate::grid::{launch, launch_cells, map_threads, Grid};
use crate::kernels::composite::{self, CompositeParams, NUM_PARAMS};
use crate::loss::{check_layout, prepare_target};
use crate::matrix::Matrix;

/// Composite activation mixing three input channels
///
/// `out = p0*in1 + p1*in2 + p2*relu(in2) + p3*relu(in0) + p4*relu(in1) + in0`
#[derive(Clone, Copy, Debug)]
pub struct CompositeActivation {
    pub params: CompositeParams,
}

/// Per-thread partial sums of the parameter gradients
///
/// One matrix per weight, shaped by the launch grid (`threads_y x threads_x`)
/// rather than by the inputs. Threads that own no cells contribute zeros. The
/// gradient of weight `k` is the sum of all entries of `partials[k]`; see
/// [`CompositeParamGrads::reduce`].
#[derive(Clone, Debug)]
pub struct CompositeParamGrads {
    pub partials: [Matrix; NUM_PARAMS],
}

impl CompositeParamGrads {
    /// Second reduction pass: full sum of each partial matrix
    pub fn reduce(&self) -> [f32; NUM_PARAMS] {
        let mut totals = [0.0; NUM_PARAMS];
        for (total, partial) in totals.iter_mut().zip(&self.partials) {
            *total = partial.sum();
        }
        totals
    }
}

fn check_channels(op: &str, first: &Matrix, others: &[&Matrix]) {
    check_layout(op, first);
    for m in others {
        check_layout(op, m);
        assert!(m.is_same_dims(first),
                "{}: channel is {}x{}, expected {}x{}", op, m.rows(), m.cols(), first.rows(), first.cols());
    }
}

impl CompositeActivation {
    pub fn new(params: [f32; NUM_PARAMS]) -> Self {
        CompositeActivation { params: CompositeParams(params) }
    }

    /// Forward pass into `out`, resized like the inputs
    pub fn forward(&self, in0: &Matrix, in1: &Matrix, in2: &Matrix, out: &mut Matrix) {
        check_channels("composite_forward", in0, &[in1, in2]);
        prepare_target("composite_forward", out, in0, false);

        let (x0, x1, x2) = (in0.view(), in1.view(), in2.view());
        let params = self.params;
        launch_cells("composite_forward", out, false,
                     |r, c| params.forward(x0.get(r, c), x1.get(r, c), x2.get(r, c)));
    }

    /// Distribute `grad` onto the three inputs
    ///
    /// `targets[i]` receives `grad * d(out)/d(in_i)`, overwritten or, with
    /// `add`, accumulated.
    pub fn backward(&self, grad: &Matrix, in0: &Matrix, in1: &Matrix, in2: &Matrix,
                    targets: [&mut Matrix; 3], add: bool) {
        const OPS: [&str; 3] = ["composite_grad_in0", "composite_grad_in1", "composite_grad_in2"];
        check_channels("composite_backward", grad, &[in0, in1, in2]);

        let (g, x0, x1, x2) = (grad.view(), in0.view(), in1.view(), in2.view());
        let params = self.params;
        for (channel, target) in targets.into_iter().enumerate() {
            prepare_target(OPS[channel], target, grad, add);
            launch_cells(OPS[channel], target, add, |r, c| {
                let partials = params.partials(x0.get(r, c), x1.get(r, c), x2.get(r, c));
                g.get(r, c) * partials[channel]
            });
        }
    }

    /// Tiled partial sums of `grad * term_k` for each weight `k`
    ///
    /// The grid holds roughly one thread per `PARAM_GRAD_TILE x PARAM_GRAD_TILE`
    /// cells. Each thread strides over the cells it owns and produces one
    /// partial per weight; the caller finishes the reduction.
    pub fn param_grads(&self, grad: &Matrix, in0: &Matrix, in1: &Matrix, in2: &Matrix) -> CompositeParamGrads {
        const OP: &str = "composite_param_grads";
        check_channels(OP, grad, &[in0, in1, in2]);

        let (rows, cols) = (grad.rows(), grad.cols());
        let grid = Grid::for_tiles(rows, cols, PARAM_GRAD_TILE);
        let (g, x0, x1, x2) = (grad.view(), in0.view(), in1.view(), in2.view());
        let (step_y, step_x) = (grid.threads_y(), grid.threads_x());

        let sums = check_launch(OP, launch(OP, &grid, || {
            map_threads(&grid, |ty, tx| {
                let mut acc = [0.0f32; NUM_PARAMS];
                for r in (ty..rows).step_by(step_y) {
                    for c in (tx..cols).step_by(step_x) {
                        let v = g.get(r, c);
                        let terms = composite::param_terms(x0.get(r, c), x1.get(r, c), x2.get(r, c));
                        for (a, t) in acc.iter_mut().zip(terms) {
                            *a += v * t;
                        }
                    }
                }
                acc
            })
        }));

        let partials = std::array::from_fn(|k| {
            Matrix::from_vec(step_y, step_x, sums.iter().map(|s| s[k]).collect())
        });
        CompositeParamGrads { partials }
    }
}

/// Route `act_grad` to the positions where `input` produced `output`
///
/// Positions where several inputs tie with the output each receive the full
/// gradient; nothing de-duplicates them.
pub fn compute_eltwise_max_grad(act_grad: &Matrix, input: &Matrix, output: &Matrix,
                                target: &mut Matrix, add: bool) {
    const OP: &str = "eltwise_max_grad";
    check_channels(OP, act_grad, &[input, output]);
    prepare_target(OP, target, act_grad, add);

    let (g, x, y) = (act_grad.view(), input.view(), output.view());
    launch_cells(OP, target, add, |r, c| composite::max_select(g.get(r, c), x.get(r, c), y.get(r, c)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix {
        Matrix::from_vec(rows, cols, (0..rows * cols).map(|_| rng.random_range(-2.0f32..2.0)).collect())
    }

    fn layer() -> CompositeActivation {
        CompositeActivation::new([0.5, -0.75, 1.25, 0.3, -0.4])
    }

    #[test]
    fn test_forward_formula() {
        let in0 = Matrix::from_vec(1, 2, vec![1.0, -1.0]);
        let in1 = Matrix::from_vec(1, 2, vec![2.0, -2.0]);
        let in2 = Matrix::from_vec(1, 2, vec![-3.0, 3.0]);
        let mut out = Matrix::empty();

        layer().forward(&in0, &in1, &in2, &mut out);

        let first: f32 = 0.5 * 2.0 + -0.75 * -3.0 + 0.3 * 1.0 + -0.4 * 2.0 + 1.0;
        let second: f32 = 0.5 * -2.0 + -0.75 * 3.0 + 1.25 * 3.0 - 1.0;
        assert_relative_eq!(out.get(0, 0), first, max_relative = 1e-6);
        assert_relative_eq!(out.get(0, 1), second, max_relative = 1e-6);
    }

    #[test]
    fn test_backward_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(5);
        let inputs = [random(&mut rng, 6, 9), random(&mut rng, 6, 9), random(&mut rng, 6, 9)];
        let grad = random(&mut rng, 6, 9);
        let layer = layer();

        let mut t0 = Matrix::empty();
        let mut t1 = Matrix::empty();
        let mut t2 = Matrix::empty();
        layer.backward(&grad, &inputs[0], &inputs[1], &inputs[2], [&mut t0, &mut t1, &mut t2], false);
        let analytic = [t0, t1, t2];

        let h = 1e-2;
        for channel in 0..3 {
            let mut up = inputs.clone();
            let mut down = inputs.clone();
            for r in 0..6 {
                for c in 0..9 {
                    let v = inputs[channel].get(r, c);
                    // Stay clear of the rectifier's kink
                    if v.abs() < 2.0 * h {
                        continue;
                    }
                    up[channel].set(r, c, v + h);
                    down[channel].set(r, c, v - h);
                }
            }
            let mut out_up = Matrix::empty();
            let mut out_down = Matrix::empty();
            layer.forward(&up[0], &up[1], &up[2], &mut out_up);
            layer.forward(&down[0], &down[1], &down[2], &mut out_down);

            for r in 0..6 {
                for c in 0..9 {
                    if inputs[channel].get(r, c).abs() < 2.0 * h {
                        continue;
                    }
                    let numeric = grad.get(r, c) * (out_up.get(r, c) - out_down.get(r, c)) / (2.0 * h);
                    let expected = analytic[channel].get(r, c);
                    assert!((numeric - expected).abs() <= 1e-3 * expected.abs().max(1.0),
                            "channel {} cell ({}, {}): {} vs {}", channel, r, c, numeric, expected);
                }
            }
        }
    }

    #[test]
    fn test_backward_accumulates() {
        let mut rng = StdRng::seed_from_u64(9);
        let (in0, in1, in2, grad) = (random(&mut rng, 3, 4), random(&mut rng, 3, 4),
                                     random(&mut rng, 3, 4), random(&mut rng, 3, 4));
        let layer = layer();
        let mut fresh = [Matrix::empty(), Matrix::empty(), Matrix::empty()];
        {
            let [a, b, c] = &mut fresh;
            layer.backward(&grad, &in0, &in1, &in2, [a, b, c], false);
        }
        let mut summed = fresh.clone();
        {
            let [a, b, c] = &mut summed;
            layer.backward(&grad, &in0, &in1, &in2, [a, b, c], true);
        }
        for (f, s) in fresh.iter().zip(&summed) {
            for (x, y) in f.to_vec().iter().zip(s.to_vec()) {
                assert_eq!(x + x, y);
            }
        }
    }

    #[test]
    fn test_param_grads_reduce_to_full_sums() {
        let mut rng = StdRng::seed_from_u64(11);
        let (rows, cols) = (100, 700);
        let (in0, in1, in2, grad) = (random(&mut rng, rows, cols), random(&mut rng, rows, cols),
                                     random(&mut rng, rows, cols), random(&mut rng, rows, cols));
        let grads = layer().param_grads(&grad, &in0, &in1, &in2);

        let grid = Grid::for_tiles(rows, cols, PARAM_GRAD_TILE);
        for partial in &grads.partials {
            assert_eq!((partial.rows(), partial.cols()), (grid.threads_y(), grid.threads_x()));
            // Each thread folds many cells
            assert!(partial.len() * 4 < rows * cols, "{} partials for {} cells", partial.len(), rows * cols);
        }

        let mut expected = [0.0f64; NUM_PARAMS];
        for r in 0..rows {
            for c in 0..cols {
                let terms = composite::param_terms(in0.get(r, c), in1.get(r, c), in2.get(r, c));
                for k in 0..NUM_PARAMS {
                    expected[k] += (grad.get(r, c) * terms[k]) as f64;
                }
            }
        }
        for (got, want) in grads.reduce().iter().zip(expected) {
            let got = *got as f64;
            assert!((got - want).abs() <= 1e-3 * want.abs().max(100.0), "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_max_grad_routes_to_winner() {
        let act_grad = Matrix::from_vec(1, 4, vec![1.0, 2.0, 3.0, 4.0]);
        let input = Matrix::from_vec(1, 4, vec![0.5, 0.1, 0.9, 0.2]);
        let output = Matrix::from_vec(1, 4, vec![0.5, 0.3, 0.9, 0.7]);
        let mut target = Matrix::from_vec(1, 4, vec![10.0; 4]);

        compute_eltwise_max_grad(&act_grad, &input, &output, &mut target, false);
        assert_eq!(target.to_vec(), vec![1.0, 0.0, 3.0, 0.0]);

        compute_eltwise_max_grad(&act_grad, &input, &output, &mut target, true);
        assert_eq!(target.to_vec(), vec![2.0, 0.0, 6.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "channel is 2x2, expected 2x3")]
    fn test_mismatched_channels() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 2);
        layer().forward(&a, &b, &a, &mut Matrix::empty());
    }
}
