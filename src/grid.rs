//! Launch geometry and the data-parallel executor
//!
//! A launch runs a kernel body on the worker pool and returns only once every
//! task has finished. Cell kernels split their (contiguous) target into one
//! disjoint chunk per block, so each task owns exactly the cells it writes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use rayon::prelude::*;

use crate::config::{self, LaunchSettings};
use crate::error::{check_launch, KernelError, Result};
use crate::matrix::Matrix;

static POOL: OnceLock<rayon::ThreadPool> = OnceLock::new();

/// 2D launch geometry: threads per block and block counts, `(x, y)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
    pub block: (usize, usize),
    pub blocks: (usize, usize),
}

impl Grid {
    /// Geometry covering a `rows x cols` output with the active settings
    pub fn for_shape(rows: usize, cols: usize) -> Self {
        Grid::for_shape_with(rows, cols, config::settings())
    }

    /// Geometry covering a `rows x cols` output; columns map to x
    pub fn for_shape_with(rows: usize, cols: usize, settings: &LaunchSettings) -> Self {
        Grid {
            block: (settings.threads_x, settings.threads_y),
            blocks: (
                cols.div_ceil(settings.threads_x).clamp(1, settings.max_grid_x),
                rows.div_ceil(settings.threads_y).clamp(1, settings.max_grid_y),
            ),
        }
    }

    /// Reduction geometry where each thread folds up to `tile x tile` cells
    /// of a `rows x cols` input, so the grid holds fewer threads than cells
    pub fn for_tiles(rows: usize, cols: usize, tile: usize) -> Self {
        Grid::for_tiles_with(rows, cols, tile, config::settings())
    }

    pub fn for_tiles_with(rows: usize, cols: usize, tile: usize, settings: &LaunchSettings) -> Self {
        assert!(tile > 0, "Reduction tile must be non-zero");
        Grid {
            block: (settings.threads_x, settings.threads_y),
            blocks: (
                cols.div_ceil(settings.threads_x * tile).clamp(1, settings.max_grid_x),
                rows.div_ceil(settings.threads_y * tile).clamp(1, settings.max_grid_y),
            ),
        }
    }

    /// 1D geometry with one thread per case
    pub fn for_cases(num_cases: usize) -> Self {
        Grid::for_cases_with(num_cases, config::settings())
    }

    pub fn for_cases_with(num_cases: usize, settings: &LaunchSettings) -> Self {
        Grid {
            block: (settings.case_threads, 1),
            blocks: (num_cases.div_ceil(settings.case_threads).clamp(1, settings.max_grid_x), 1),
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.0 * self.blocks.1
    }

    /// Threads along x over the whole grid
    pub fn threads_x(&self) -> usize {
        self.block.0 * self.blocks.0
    }

    /// Threads along y over the whole grid
    pub fn threads_y(&self) -> usize {
        self.block.1 * self.blocks.1
    }

    /// Cells handled by each block when `cells` are spread over the grid
    pub fn cells_per_block(&self, cells: usize) -> usize {
        cells.div_ceil(self.num_blocks()).max(1)
    }
}

fn pool() -> Result<&'static rayon::ThreadPool> {
    if let Some(pool) = POOL.get() {
        return Ok(pool);
    }
    let mut builder = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("convnet-loss-{}", i));
    if let Some(workers) = config::settings().workers {
        builder = builder.num_threads(workers);
    }
    let pool = builder.build()?;
    Ok(POOL.get_or_init(|| pool))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic in kernel body".to_string()
    }
}

/// Run `body` on the worker pool and wait for it to finish
///
/// A panic in any task is reported as [`KernelError::Execution`].
pub fn launch<T, F>(op: &str, grid: &Grid, body: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    if grid.block.0 == 0 || grid.block.1 == 0 {
        return Err(KernelError::Launch(format!("{}: empty block {:?}", op, grid.block)));
    }
    log::debug!("launch {} grid={:?} block={:?}", op, grid.blocks, grid.block);
    let pool = pool()?;
    pool.install(|| panic::catch_unwind(AssertUnwindSafe(body)))
        .map_err(|payload| KernelError::Execution(panic_message(payload)))
}

/// Evaluate `kernel(row, col)` for every cell of a packed `? x cols` buffer,
/// overwriting or accumulating according to `ADD`
pub fn write_cells<const ADD: bool, F>(cells: &mut [f32], cols: usize, grid: &Grid, kernel: F)
where
    F: Fn(usize, usize) -> f32 + Sync,
{
    if cells.is_empty() {
        return;
    }
    let chunk = grid.cells_per_block(cells.len());
    cells.par_chunks_mut(chunk).enumerate().for_each(|(block, part)| {
        let start = block * chunk;
        for (i, cell) in part.iter_mut().enumerate() {
            let idx = start + i;
            let v = kernel(idx / cols, idx % cols);
            if ADD {
                *cell += v;
            } else {
                *cell = v;
            }
        }
    });
}

/// Launch a cell kernel over every element of `target` and check its status
///
/// The accumulate/overwrite choice is made once here; each branch runs its own
/// monomorphised inner loop.
pub fn launch_cells<F>(op: &str, target: &mut Matrix, add: bool, kernel: F)
where
    F: Fn(usize, usize) -> f32 + Sync + Send,
{
    let (rows, cols) = (target.rows(), target.cols());
    let grid = Grid::for_shape(rows, cols);
    let cells = target.as_mut_slice();
    let status = if add {
        launch(op, &grid, || write_cells::<true, _>(cells, cols, &grid, &kernel))
    } else {
        launch(op, &grid, || write_cells::<false, _>(cells, cols, &grid, &kernel))
    };
    check_launch(op, status);
}

/// Evaluate `kernel(case)` once per case, in case order
pub fn map_cases<T, F>(num_cases: usize, grid: &Grid, kernel: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    (0..num_cases)
        .into_par_iter()
        .with_min_len(grid.cells_per_block(num_cases))
        .map(kernel)
        .collect()
}

/// Evaluate `kernel(ty, tx)` once per grid thread, row-major over
/// `threads_y() x threads_x()`
pub fn map_threads<T, F>(grid: &Grid, kernel: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize, usize) -> T + Sync + Send,
{
    let width = grid.threads_x();
    (0..grid.threads_y() * width)
        .into_par_iter()
        .with_min_len(grid.block.0 * grid.block.1)
        .map(|tid| kernel(tid / width, tid % width))
        .collect()
}
