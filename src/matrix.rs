//! Dense single-precision matrices and strided views
//!
//! A [`Matrix`] owns its storage and records the layout explicitly: row-major
//! unless `trans` is set, with a row stride that may exceed the leading
//! dimension for padded buffers. Kernels never index a `Matrix` directly; they
//! read through a [`StridedView`], which keeps the index arithmetic in one
//! place.

use rayon::prelude::*;

/// Owned 2D float buffer with explicit layout
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
    /// Distance in elements between consecutive storage lines
    stride: usize,
    /// Column-major storage when set
    trans: bool,
}

impl Matrix {
    /// Create a zero-filled row-major matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
            stride: cols,
            trans: false,
        }
    }

    /// Create an empty (0 x 0) matrix, to be sized by a dispatch call
    pub fn empty() -> Self {
        Matrix::zeros(0, 0)
    }

    /// Wrap row-major data
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * cols,
                   "Data length must equal rows * cols");
        Matrix {
            data,
            rows,
            cols,
            stride: cols,
            trans: false,
        }
    }

    /// Build a row-major matrix from nested rows
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let cols = rows.first().map_or(0, |row| row.len());
        assert!(rows.iter().all(|row| row.len() == cols),
                "All rows must have the same length");
        Matrix::from_vec(rows.len(), cols, rows.concat())
    }

    /// Wrap row-major data whose rows are `stride` elements apart
    pub fn with_stride(rows: usize, cols: usize, stride: usize, data: Vec<f32>) -> Self {
        assert!(stride >= cols, "Stride must cover a full row");
        assert!(rows == 0 || data.len() >= (rows - 1) * stride + cols,
                "Data too short for the requested layout");
        Matrix {
            data,
            rows,
            cols,
            stride,
            trans: false,
        }
    }

    /// Reinterpret the same storage as the transposed matrix
    pub fn transposed(self) -> Self {
        Matrix {
            rows: self.cols,
            cols: self.rows,
            trans: !self.trans,
            ..self
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of logical elements
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_trans(&self) -> bool {
        self.trans
    }

    /// Extent of the fastest-varying storage axis
    pub fn leading_dim(&self) -> usize {
        if self.trans { self.rows } else { self.cols }
    }

    /// Extent of the slowest-varying storage axis
    pub fn following_dim(&self) -> usize {
        if self.trans { self.cols } else { self.rows }
    }

    /// True when storage lines are packed without padding
    pub fn is_contiguous(&self) -> bool {
        self.stride == self.leading_dim() || self.following_dim() <= 1
    }

    pub fn is_same_dims(&self, other: &Matrix) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    fn offset(&self, row: usize, col: usize) -> usize {
        assert!(row < self.rows && col < self.cols,
                "Index ({}, {}) out of bounds for {}x{} matrix", row, col, self.rows, self.cols);
        if self.trans {
            col * self.stride + row
        } else {
            row * self.stride + col
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[self.offset(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        let idx = self.offset(row, col);
        self.data[idx] = value;
    }

    /// Reallocate as a zeroed row-major `rows x cols` matrix unless the shape
    /// already matches; returns whether storage changed
    pub fn resize(&mut self, rows: usize, cols: usize) -> bool {
        if self.rows == rows && self.cols == cols {
            return false;
        }
        log::trace!("resizing {}x{} -> {}x{}", self.rows, self.cols, rows, cols);
        *self = Matrix::zeros(rows, cols);
        true
    }

    /// Resize to the shape of `other`
    pub fn resize_like(&mut self, other: &Matrix) -> bool {
        self.resize(other.rows, other.cols)
    }

    /// Set every element to `value`
    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Read-only view for kernels (row-major matrices only)
    pub fn view(&self) -> StridedView<'_> {
        assert!(!self.trans, "Kernels index row-major storage; matrix is transposed");
        StridedView::new(&self.data, self.rows, self.cols, self.stride)
    }

    /// Packed row-major storage, for contiguous matrices only
    pub fn as_slice(&self) -> &[f32] {
        assert!(self.is_contiguous() && !self.trans,
                "Flat access requires a contiguous row-major matrix");
        &self.data[..self.len()]
    }

    /// Mutable packed row-major storage, for contiguous matrices only
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        assert!(self.is_contiguous() && !self.trans,
                "Flat access requires a contiguous row-major matrix");
        let len = self.len();
        &mut self.data[..len]
    }

    /// Copy out the logical elements in row-major order
    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.rows)
            .flat_map(|r| (0..self.cols).map(move |c| (r, c)))
            .map(|(r, c)| self.get(r, c))
            .collect()
    }

    /// Maximum along `axis` into `target`
    ///
    /// Axis 0 reduces over rows (one value per column, `1 x cols`); axis 1
    /// reduces over columns (`rows x 1`).
    pub fn max(&self, axis: usize, target: &mut Matrix) {
        match axis {
            0 => {
                target.resize(1, self.cols);
                target.as_mut_slice()
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(c, out)| {
                        *out = (0..self.rows)
                            .map(|r| self.get(r, c))
                            .fold(f32::NEG_INFINITY, f32::max);
                    });
            }
            1 => {
                target.resize(self.rows, 1);
                target.as_mut_slice()
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(r, out)| {
                        *out = (0..self.cols)
                            .map(|c| self.get(r, c))
                            .fold(f32::NEG_INFINITY, f32::max);
                    });
            }
            _ => panic!("Invalid reduction axis {}", axis),
        }
    }

    /// Row index of the maximum in each column into a `1 x cols` target
    ///
    /// Ties resolve to the lowest row.
    pub fn argmax_cols(&self, target: &mut Matrix) {
        target.resize(1, self.cols);
        target.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(c, out)| {
                let mut best = 0;
                for r in 1..self.rows {
                    if self.get(r, c) > self.get(best, c) {
                        best = r;
                    }
                }
                *out = best as f32;
            });
    }

    /// Sum of all logical elements
    pub fn sum(&self) -> f32 {
        (0..self.rows)
            .map(|r| (0..self.cols).map(|c| self.get(r, c)).sum::<f32>())
            .sum()
    }
}

/// Borrowed row-major view: base slice, shape and row stride
#[derive(Clone, Copy, Debug)]
pub struct StridedView<'a> {
    data: &'a [f32],
    rows: usize,
    cols: usize,
    stride: usize,
}

impl<'a> StridedView<'a> {
    pub fn new(data: &'a [f32], rows: usize, cols: usize, stride: usize) -> Self {
        assert!(stride >= cols, "Stride must cover a full row");
        assert!(rows == 0 || data.len() >= (rows - 1) * stride + cols,
                "View exceeds its backing slice");
        StridedView { data, rows, cols, stride }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.stride + col]
    }

    /// The `cols` elements of one row
    #[inline]
    pub fn row(&self, row: usize) -> &'a [f32] {
        assert!(row < self.rows, "Row {} out of bounds", row);
        let start = row * self.stride;
        &self.data[start..start + self.cols]
    }

    /// Iterate one column top to bottom
    pub fn col(&self, col: usize) -> impl Iterator<Item = f32> + 'a {
        assert!(col < self.cols, "Column {} out of bounds", col);
        let data = self.data;
        let stride = self.stride;
        (0..self.rows).map(move |r| data[r * stride + col])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_dims() {
        let m = Matrix::zeros(3, 5);
        assert_eq!(m.leading_dim(), 5);
        assert_eq!(m.following_dim(), 3);
        assert!(m.is_contiguous());

        let t = m.transposed();
        assert!(t.is_trans());
        assert_eq!((t.rows(), t.cols()), (5, 3));
        assert_eq!(t.leading_dim(), 5);
        assert_eq!(t.following_dim(), 3);
    }

    #[test]
    fn test_transposed_shares_storage() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let t = m.clone().transposed();
        for r in 0..2 {
            for c in 0..3 {
                assert_eq!(m.get(r, c), t.get(c, r));
            }
        }
    }

    #[test]
    fn test_padded_matrix_is_not_contiguous() {
        let data = vec![1.0, 2.0, -1.0, 3.0, 4.0, -1.0];
        let m = Matrix::with_stride(2, 2, 3, data);
        assert!(!m.is_contiguous());
        assert_eq!(m.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.view().row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_resize_only_on_shape_change() {
        let mut m = Matrix::from_vec(1, 2, vec![1.0, 2.0]);
        assert!(!m.resize(1, 2));
        assert_eq!(m.to_vec(), vec![1.0, 2.0]);
        assert!(m.resize(2, 2));
        assert_eq!(m.to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_max_both_axes() {
        let m = Matrix::from_rows(&[vec![0.7, 0.2], vec![0.2, 0.3], vec![0.1, 0.5]]);
        let mut target = Matrix::empty();
        m.max(0, &mut target);
        assert_eq!((target.rows(), target.cols()), (1, 2));
        assert_eq!(target.to_vec(), vec![0.7, 0.5]);

        m.max(1, &mut target);
        assert_eq!((target.rows(), target.cols()), (3, 1));
        assert_eq!(target.to_vec(), vec![0.7, 0.3, 0.5]);
    }

    #[test]
    fn test_argmax_prefers_first_tie() {
        let m = Matrix::from_rows(&[vec![0.5, 0.1], vec![0.5, 0.2], vec![0.0, 0.7]]);
        let mut target = Matrix::empty();
        m.argmax_cols(&mut target);
        assert_eq!(target.to_vec(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_view_column() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let col: Vec<f32> = m.view().col(1).collect();
        assert_eq!(col, vec![2.0, 4.0]);
    }
}
