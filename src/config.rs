//! Process-wide launch settings
//!
//! Kernel geometry is never passed per call. The active settings are fixed the
//! first time a kernel launches (or when [`LaunchSettings::install`] is called)
//! and stay immutable for the rest of the process.

use std::sync::OnceLock;

/// Threads per block along the case (column) axis
pub const THREADS_X: usize = 32;

/// Threads per block along the class (row) axis
pub const THREADS_Y: usize = 8;

/// Threads per block for kernels that run one thread per case
pub const CASE_THREADS: usize = 128;

/// Maximum number of blocks along either grid axis
pub const MAX_GRID: usize = 2048;

/// Cells each thread folds along either axis in the parameter-gradient
/// reduction
pub const PARAM_GRAD_TILE: usize = 8;

/// Environment variable overriding the worker thread count
pub const THREADS_ENV: &str = "CONVNET_LOSS_THREADS";

/// Environment variable overriding the maximum grid size
pub const MAX_GRID_ENV: &str = "CONVNET_LOSS_MAX_GRID";

static ACTIVE: OnceLock<LaunchSettings> = OnceLock::new();

/// Launch configuration shared by every kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Threads per block along x (cases)
    pub threads_x: usize,
    /// Threads per block along y (classes)
    pub threads_y: usize,
    /// Threads per block for 1D per-case launches
    pub case_threads: usize,
    /// Block count limit along x
    pub max_grid_x: usize,
    /// Block count limit along y
    pub max_grid_y: usize,
    /// Worker threads of the execution pool (`None` lets rayon decide)
    pub workers: Option<usize>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        LaunchSettings {
            threads_x: THREADS_X,
            threads_y: THREADS_Y,
            case_threads: CASE_THREADS,
            max_grid_x: MAX_GRID,
            max_grid_y: MAX_GRID,
            workers: None,
        }
    }
}

impl LaunchSettings {
    /// Defaults, with overrides read from the environment
    ///
    /// Unparseable or zero values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut settings = LaunchSettings::default();
        if let Some(workers) = read_env(THREADS_ENV) {
            settings.workers = Some(workers);
        }
        if let Some(max_grid) = read_env(MAX_GRID_ENV) {
            settings.max_grid_x = max_grid;
            settings.max_grid_y = max_grid;
        }
        settings
    }

    /// Fix these settings for the whole process
    ///
    /// Returns the settings already in effect if another set won the race or a
    /// kernel has launched before.
    pub fn install(self) -> Result<(), LaunchSettings> {
        assert!(self.threads_x > 0 && self.threads_y > 0 && self.case_threads > 0,
                "Block dimensions must be non-zero");
        assert!(self.max_grid_x > 0 && self.max_grid_y > 0,
                "Grid limits must be non-zero");
        ACTIVE.set(self).map_err(|_| *settings())
    }
}

/// Settings in effect, initialised from the environment on first use
pub fn settings() -> &'static LaunchSettings {
    ACTIVE.get_or_init(LaunchSettings::from_env)
}

fn read_env(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            log::warn!("ignoring {}={:?}: expected a positive integer", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = LaunchSettings::default();
        assert_eq!(settings.threads_x, THREADS_X);
        assert_eq!(settings.threads_y, THREADS_Y);
        assert_eq!(settings.max_grid_x, MAX_GRID);
        assert_eq!(settings.workers, None);
    }

    #[test]
    fn test_active_settings_are_fixed() {
        let first = *settings();

        // Once a value is active, installing another one is refused
        let other = LaunchSettings { max_grid_x: 3, ..first };
        assert_eq!(other.install(), Err(first));
        assert_eq!(*settings(), first);
    }
}
