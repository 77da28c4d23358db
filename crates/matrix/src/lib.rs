//! Labeled dense matrices.
//!
//! A [`Matrix`] is a row-major `f64` array of two or three dimensions with
//! optional per-axis [`Headers`]. Two-dimensional matrices hold PAMs,
//! encoded phylogenies and predictor tables; three-dimensional matrices are
//! stacks of equally shaped layers along a trailing "depth" axis (observed
//! values, F-values, permutation replicates, ...).

mod error;
mod headers;
mod io;

pub use error::MatrixError;
pub use headers::Headers;
pub use io::{Compression, FORMAT_VERSION};

use nalgebra::DMatrix;
use std::ops::Index;

/// Axis index of rows.
pub const ROW_AXIS: usize = 0;
/// Axis index of columns.
pub const COLUMN_AXIS: usize = 1;
/// Axis index of the layer dimension of a stack.
pub const DEPTH_AXIS: usize = 2;

/// Dense, labeled, row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    shape: Vec<usize>,
    headers: Headers,
}

impl Matrix {
    /// Create a matrix from raw row-major data.
    ///
    /// Fails if `data.len()` does not match the shape, if the shape is not
    /// two or three dimensional, or if any header list disagrees with its
    /// axis length.
    pub fn new(data: Vec<f64>, shape: Vec<usize>, headers: Headers) -> Result<Self, MatrixError> {
        if !(2..=3).contains(&shape.len()) {
            return Err(MatrixError::Shape(format!(
                "expected 2 or 3 dimensions, got {}",
                shape.len()
            )));
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(MatrixError::Shape(format!(
                "{} values do not fill shape {shape:?} ({expected} expected)",
                data.len()
            )));
        }
        headers.validate(&shape)?;
        Ok(Self {
            data,
            shape,
            headers,
        })
    }

    /// All-zero two-dimensional matrix without headers.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![0.0; nrows * ncols],
            shape: vec![nrows, ncols],
            headers: Headers::new(),
        }
    }

    /// Build a two-dimensional matrix from row vectors.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, MatrixError> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
            return Err(MatrixError::Shape(format!(
                "row {i} has {} values, expected {ncols}",
                row.len()
            )));
        }
        let data = rows.iter().flatten().copied().collect();
        Self::new(data, vec![nrows, ncols], Headers::new())
    }

    /// Copy a nalgebra matrix into a header-less matrix.
    pub fn from_dmatrix(m: &DMatrix<f64>) -> Self {
        let mut data = Vec::with_capacity(m.len());
        for r in 0..m.nrows() {
            data.extend(m.row(r).iter().copied());
        }
        Self {
            data,
            shape: vec![m.nrows(), m.ncols()],
            headers: Headers::new(),
        }
    }

    /// Copy a two-dimensional matrix into a nalgebra matrix.
    pub fn to_dmatrix(&self) -> Result<DMatrix<f64>, MatrixError> {
        self.require_2d("to_dmatrix")?;
        Ok(DMatrix::from_row_slice(self.nrows(), self.ncols(), &self.data))
    }

    /// Attach headers, validating them against the shape.
    pub fn with_headers(mut self, headers: Headers) -> Result<Self, MatrixError> {
        headers.validate(&self.shape)?;
        self.headers = headers;
        Ok(self)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn nrows(&self) -> usize {
        self.shape[ROW_AXIS]
    }

    pub fn ncols(&self) -> usize {
        self.shape[COLUMN_AXIS]
    }

    /// Number of layers (1 for a two-dimensional matrix).
    pub fn depth(&self) -> usize {
        self.shape.get(DEPTH_AXIS).copied().unwrap_or(1)
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major values (depth varies fastest for stacks).
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Value at `(row, col)` of a two-dimensional matrix.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if self.ndim() != 2 || row >= self.nrows() || col >= self.ncols() {
            return None;
        }
        Some(self.data[row * self.ncols() + col])
    }

    /// Set the value at `(row, col)` of a two-dimensional matrix.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), MatrixError> {
        self.require_2d("set")?;
        if row >= self.nrows() || col >= self.ncols() {
            return Err(MatrixError::OutOfBounds(format!(
                "({row}, {col}) in {}x{} matrix",
                self.nrows(),
                self.ncols()
            )));
        }
        let ncols = self.ncols();
        self.data[row * ncols + col] = value;
        Ok(())
    }

    /// Row slice of a two-dimensional matrix.
    pub fn row(&self, row: usize) -> &[f64] {
        let ncols = self.ncols() * self.depth();
        &self.data[row * ncols..(row + 1) * ncols]
    }

    /// Column values of a two-dimensional matrix.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.nrows()).map(|r| self[(r, col)]).collect()
    }

    /// Sum of every row of a two-dimensional matrix.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.nrows()).map(|r| self.row(r).iter().sum()).collect()
    }

    /// Sum of every column of a two-dimensional matrix.
    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.ncols()];
        for r in 0..self.nrows() {
            for (sum, v) in sums.iter_mut().zip(self.row(r)) {
                *sum += v;
            }
        }
        sums
    }

    /// True if every value is exactly 0 or 1.
    pub fn is_binary(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0 || v == 1.0)
    }

    /// All values in storage order.
    pub fn flatten(&self) -> Vec<f64> {
        self.data.clone()
    }

    /// Same shape and headers, new values in storage order.
    pub fn with_values(&self, data: Vec<f64>) -> Result<Self, MatrixError> {
        if data.len() != self.data.len() {
            return Err(MatrixError::Shape(format!(
                "{} values do not fill shape {:?}",
                data.len(),
                self.shape
            )));
        }
        Ok(Self {
            data,
            shape: self.shape.clone(),
            headers: self.headers.clone(),
        })
    }

    /// Apply `f` to every value, keeping shape and headers.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
            headers: self.headers.clone(),
        }
    }

    /// New two-dimensional matrix holding `columns` in the given order.
    pub fn select_columns(&self, columns: &[usize]) -> Result<Self, MatrixError> {
        self.require_2d("select_columns")?;
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.ncols()) {
            return Err(MatrixError::OutOfBounds(format!(
                "column {bad} of {}",
                self.ncols()
            )));
        }
        let mut data = Vec::with_capacity(self.nrows() * columns.len());
        for r in 0..self.nrows() {
            let row = self.row(r);
            data.extend(columns.iter().map(|&c| row[c]));
        }
        Ok(Self {
            data,
            shape: vec![self.nrows(), columns.len()],
            headers: self.headers.subset(COLUMN_AXIS, columns),
        })
    }

    /// New two-dimensional matrix holding `rows` in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self, MatrixError> {
        self.require_2d("select_rows")?;
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.nrows()) {
            return Err(MatrixError::OutOfBounds(format!(
                "row {bad} of {}",
                self.nrows()
            )));
        }
        let mut data = Vec::with_capacity(rows.len() * self.ncols());
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        Ok(Self {
            data,
            shape: vec![rows.len(), self.ncols()],
            headers: self.headers.subset(ROW_AXIS, rows),
        })
    }

    /// Join two-dimensional matrices along `axis` (0 = rows, 1 = columns).
    ///
    /// Labels along the joined axis are concatenated when every part has
    /// them; labels on the other axis are taken from the first part.
    pub fn concatenate(parts: &[&Matrix], axis: usize) -> Result<Self, MatrixError> {
        let Some(first) = parts.first() else {
            return Err(MatrixError::Shape("nothing to concatenate".into()));
        };
        let other = match axis {
            ROW_AXIS => COLUMN_AXIS,
            COLUMN_AXIS => ROW_AXIS,
            _ => {
                return Err(MatrixError::Shape(format!(
                    "cannot concatenate along axis {axis}"
                )))
            }
        };
        for part in parts {
            part.require_2d("concatenate")?;
            if part.shape[other] != first.shape[other] {
                return Err(MatrixError::Shape(format!(
                    "cannot concatenate {:?} with {:?} along axis {axis}",
                    first.shape, part.shape
                )));
            }
        }

        let total: usize = parts.iter().map(|p| p.shape[axis]).sum();
        let (nrows, ncols) = if axis == ROW_AXIS {
            (total, first.ncols())
        } else {
            (first.nrows(), total)
        };
        let mut data = Vec::with_capacity(nrows * ncols);
        if axis == ROW_AXIS {
            for part in parts {
                data.extend_from_slice(&part.data);
            }
        } else {
            for r in 0..nrows {
                for part in parts {
                    data.extend_from_slice(part.row(r));
                }
            }
        }

        let mut headers = Headers::new();
        if let Some(labels) = first.headers.get(other) {
            headers.set(other, labels.iter().cloned());
        }
        if parts.iter().all(|p| p.headers.get(axis).is_some()) {
            let joined: Vec<String> = parts
                .iter()
                .flat_map(|p| p.headers.get(axis).unwrap_or_default().iter().cloned())
                .collect();
            headers.set(axis, joined);
        }
        Self::new(data, vec![nrows, ncols], headers)
    }

    /// Stack matrices along the depth axis.
    ///
    /// Two-dimensional parts contribute one layer each; three-dimensional
    /// parts contribute all their layers. Row and column labels come from the
    /// first part. `layer_labels`, when given, must name every layer.
    pub fn stack(parts: &[&Matrix], layer_labels: Option<Vec<String>>) -> Result<Self, MatrixError> {
        let Some(first) = parts.first() else {
            return Err(MatrixError::Shape("nothing to stack".into()));
        };
        let (nrows, ncols) = (first.nrows(), first.ncols());
        for part in parts {
            if part.nrows() != nrows || part.ncols() != ncols {
                return Err(MatrixError::Shape(format!(
                    "cannot stack {:?} with {:?}",
                    first.shape, part.shape
                )));
            }
        }
        let depth: usize = parts.iter().map(|p| p.depth()).sum();
        let mut data = Vec::with_capacity(nrows * ncols * depth);
        for cell in 0..nrows * ncols {
            for part in parts {
                let d = part.depth();
                data.extend_from_slice(&part.data[cell * d..(cell + 1) * d]);
            }
        }

        let mut headers = Headers::new();
        for axis in [ROW_AXIS, COLUMN_AXIS] {
            if let Some(labels) = first.headers.get(axis) {
                headers.set(axis, labels.iter().cloned());
            }
        }
        let labels = layer_labels.or_else(|| {
            parts
                .iter()
                .map(|p| p.headers.get(DEPTH_AXIS).map(<[String]>::to_vec))
                .collect::<Option<Vec<_>>>()
                .map(|v| v.concat())
        });
        if let Some(labels) = labels {
            headers.set(DEPTH_AXIS, labels);
        }
        Self::new(data, vec![nrows, ncols, depth], headers)
    }

    /// Extract one layer of a stack as a two-dimensional matrix.
    ///
    /// Layer 0 of a two-dimensional matrix is the matrix itself.
    pub fn layer(&self, index: usize) -> Result<Self, MatrixError> {
        let depth = self.depth();
        if index >= depth {
            return Err(MatrixError::OutOfBounds(format!(
                "layer {index} of {depth}"
            )));
        }
        let mut headers = self.headers.clone();
        headers.remove(DEPTH_AXIS);
        if self.ndim() == 2 {
            return Ok(self.clone());
        }
        let data = self.data.iter().skip(index).step_by(depth).copied().collect();
        Self::new(data, vec![self.nrows(), self.ncols()], headers)
    }

    /// All layers of a stack, in order.
    pub fn layers(&self) -> Result<Vec<Self>, MatrixError> {
        (0..self.depth()).map(|i| self.layer(i)).collect()
    }

    /// Index of the layer whose depth label equals `label`.
    pub fn layer_index(&self, label: &str) -> Option<usize> {
        self.headers
            .get(DEPTH_AXIS)?
            .iter()
            .position(|l| l == label)
    }

    fn require_2d(&self, op: &str) -> Result<(), MatrixError> {
        if self.ndim() != 2 {
            return Err(MatrixError::Shape(format!(
                "{op} requires a 2-dimensional matrix, got shape {:?}",
                self.shape
            )));
        }
        Ok(())
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    /// Value at `(row, col)`; for stacks this is layer 0.
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        let depth = self.depth();
        &self.data[(row * self.ncols() + col) * depth]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(&[vec![1.0, 0.0, 1.0], vec![0.0, 1.0, 1.0]])
            .unwrap()
            .with_headers(
                Headers::new()
                    .with_axis(0, ["s1", "s2"])
                    .with_axis(1, ["a", "b", "c"]),
            )
            .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_length() {
        assert!(Matrix::new(vec![0.0; 5], vec![2, 3], Headers::new()).is_err());
        assert!(Matrix::new(vec![0.0; 6], vec![6], Headers::new()).is_err());
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        assert!(Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_sums() {
        let m = sample();
        assert_eq!(m.row_sums(), vec![2.0, 2.0]);
        assert_eq!(m.column_sums(), vec![1.0, 1.0, 2.0]);
        assert!(m.is_binary());
    }

    #[test]
    fn test_select_columns_subsets_headers() {
        let m = sample().select_columns(&[2, 0]).unwrap();
        assert_eq!(m.shape(), &[2, 2]);
        assert_eq!(m.row(0), &[1.0, 1.0]);
        assert_eq!(m.row(1), &[1.0, 0.0]);
        assert_eq!(m.headers().get(1).unwrap(), &["c".to_string(), "a".to_string()]);
        assert_eq!(m.headers().get(0).unwrap().len(), 2);
    }

    #[test]
    fn test_select_rows_out_of_bounds() {
        assert!(sample().select_rows(&[5]).is_err());
    }

    #[test]
    fn test_concatenate_columns() {
        let a = sample();
        let b = Matrix::from_rows(&[vec![9.0], vec![8.0]])
            .unwrap()
            .with_headers(Headers::new().with_axis(1, ["z"]))
            .unwrap();
        let joined = Matrix::concatenate(&[&a, &b], COLUMN_AXIS).unwrap();
        assert_eq!(joined.shape(), &[2, 4]);
        assert_eq!(joined.row(1), &[0.0, 1.0, 1.0, 8.0]);
        assert_eq!(joined.headers().get(1).unwrap().len(), 4);
        assert_eq!(joined.headers().get(0).unwrap()[0], "s1");
    }

    #[test]
    fn test_concatenate_rejects_mismatch() {
        let a = sample();
        let b = Matrix::zeros(3, 1);
        assert!(Matrix::concatenate(&[&a, &b], COLUMN_AXIS).is_err());
    }

    #[test]
    fn test_stack_and_layer() {
        let a = sample();
        let b = a.map(|v| v * 10.0);
        let stack = Matrix::stack(&[&a, &b], Some(vec!["one".into(), "two".into()])).unwrap();
        assert_eq!(stack.shape(), &[2, 3, 2]);
        assert_eq!(stack.layer_index("two"), Some(1));

        let second = stack.layer(1).unwrap();
        assert_eq!(second.row(0), &[10.0, 0.0, 10.0]);
        assert!(second.headers().get(DEPTH_AXIS).is_none());
        assert_eq!(second.headers().get(1).unwrap()[2], "c");
        assert!(stack.layer(2).is_err());
    }

    #[test]
    fn test_stack_of_stacks_concatenates_layers() {
        let a = sample();
        let s1 = Matrix::stack(&[&a, &a], None).unwrap();
        let s2 = Matrix::stack(&[&s1, &a], None).unwrap();
        assert_eq!(s2.depth(), 3);
        assert_eq!(s2.layers().unwrap().len(), 3);
    }

    #[test]
    fn test_dmatrix_conversion() {
        let m = sample();
        let d = m.to_dmatrix().unwrap();
        assert_eq!(d[(1, 2)], 1.0);
        assert_eq!(d[(0, 1)], 0.0);
        let back = Matrix::from_dmatrix(&d);
        assert_eq!(back.as_slice(), m.as_slice());
    }

    #[test]
    fn test_with_values_keeps_headers() {
        let m = sample();
        let doubled = m.with_values(m.flatten().iter().map(|v| v * 2.0).collect()).unwrap();
        assert_eq!(doubled.headers(), m.headers());
        assert_eq!(doubled.row(1), &[0.0, 2.0, 2.0]);
        assert!(m.with_values(vec![1.0]).is_err());
    }

    #[test]
    fn test_set_and_get() {
        let mut m = Matrix::zeros(2, 2);
        m.set(1, 0, 3.5).unwrap();
        assert_eq!(m.get(1, 0), Some(3.5));
        assert_eq!(m.get(2, 0), None);
        assert!(m.set(0, 5, 1.0).is_err());
    }
}
