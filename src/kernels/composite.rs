//! Three-input composite activation
//!
//! ```text
//! out = p0*in1 + p1*in2 + p2*relu(in2) + p3*relu(in0) + p4*relu(in1) + in0
//! ```

use super::{indicator, relu};

/// Number of tunable weights
pub const NUM_PARAMS: usize = 5;

/// Weights of the fixed linear combination
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositeParams(pub [f32; NUM_PARAMS]);

impl CompositeParams {
    #[inline]
    pub fn forward(&self, in0: f32, in1: f32, in2: f32) -> f32 {
        let p = &self.0;
        p[0] * in1 + p[1] * in2 + p[2] * relu(in2) + p[3] * relu(in0) + p[4] * relu(in1) + in0
    }

    /// Local partial derivatives of `out` w.r.t. `(in0, in1, in2)`
    #[inline]
    pub fn partials(&self, in0: f32, in1: f32, in2: f32) -> [f32; 3] {
        let p = &self.0;
        [
            1.0 + p[3] * indicator(in0 > 0.0),
            p[0] + p[4] * indicator(in1 > 0.0),
            p[1] + p[2] * indicator(in2 > 0.0),
        ]
    }
}

/// The term each weight multiplies, in weight order
#[inline]
pub fn param_terms(in0: f32, in1: f32, in2: f32) -> [f32; NUM_PARAMS] {
    [in1, in2, relu(in2), relu(in0), relu(in1)]
}

/// Gradient routed through an elementwise max: all of it where this input
/// produced the output, none elsewhere
#[inline]
pub fn max_select(grad: f32, input: f32, output: f32) -> f32 {
    if output == input { grad } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_when_weights_are_zero() {
        let params = CompositeParams([0.0; NUM_PARAMS]);
        assert_eq!(params.forward(-1.5, 3.0, 4.0), -1.5);
        assert_eq!(params.partials(-1.5, 3.0, 4.0), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_forward_matches_param_terms() {
        let params = CompositeParams([0.5, -0.25, 1.0, 2.0, 0.75]);
        let (in0, in1, in2) = (0.5, -2.0, 3.0);
        let terms = param_terms(in0, in1, in2);
        let expected = in0 + params.0.iter().zip(terms).map(|(p, t)| p * t).sum::<f32>();
        assert!((params.forward(in0, in1, in2) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_max_select() {
        assert_eq!(max_select(2.5, 1.0, 1.0), 2.5);
        assert_eq!(max_select(2.5, 0.5, 1.0), 0.0);
    }
}
