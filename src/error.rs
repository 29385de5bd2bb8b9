//! Launch failures and the fatal status check

/// Failure reported by the execution backend for a kernel launch
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Geometry or configuration rejected before the grid ran
    #[error("invalid launch configuration: {0}")]
    Launch(String),

    /// A grid thread aborted while running the kernel body
    #[error("kernel execution failed: {0}")]
    Execution(String),

    /// The worker pool could not be created
    #[error("worker pool unavailable: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for kernel launches
pub type Result<T> = std::result::Result<T, KernelError>;

/// Check the status of a finished launch
///
/// Kernel failures leave the output buffers in an unknown state, so there is
/// nothing to recover: the error is logged and the calling thread panics with
/// a message naming the failing operation.
pub fn check_launch<T>(op: &str, status: Result<T>) -> T {
    match status {
        Ok(value) => value,
        Err(err) => {
            log::error!("{} failed: {}", op, err);
            panic!("{} failed: {}", op, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_launch_passes_value() {
        assert_eq!(check_launch("noop", Ok(7)), 7);
    }

    #[test]
    #[should_panic(expected = "logreg_cost failed: kernel execution failed: boom")]
    fn test_check_launch_names_operation() {
        let status: Result<()> = Err(KernelError::Execution("boom".to_string()));
        check_launch("logreg_cost", status);
    }
}
