//! # Convnet Loss
//!
//! Loss, accuracy and gradient kernels for the output layers of a
//! convolutional network, run data-parallel on a worker pool.
//!
//! Activations and probabilities are `num_out x num_cases` matrices, labels a
//! `1 x num_cases` row of class ids. Each cost kernel reports a per-case cost
//! and a correctness credit; each gradient kernel writes (or accumulates) the
//! negated gradient scaled by a caller coefficient.

pub mod config;
pub mod error;
pub mod matrix;
pub mod grid;
pub mod kernels;
pub mod loss;
pub mod eltwise;

// Re-export main types
pub use eltwise::{compute_eltwise_max_grad, CompositeActivation, CompositeParamGrads};
pub use error::{KernelError, Result};
pub use loss::{AdaptiveSvmLoss, CaseStats, L2SvmLoss, LogregLoss, Loss, RobustLogregLoss};
pub use kernels::margin::MarginParams;
pub use matrix::Matrix;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
