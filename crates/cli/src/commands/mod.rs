pub mod correct;
pub mod mcpa;
pub mod randomize;

use anyhow::{Context, Result};
use metacomm_matrix::Matrix;
use std::path::Path;

pub(crate) fn load_matrix(what: &str, path: &Path) -> Result<Matrix> {
    Matrix::load(path).with_context(|| format!("Failed to load {what} from {}", path.display()))
}

pub(crate) fn save_matrix(matrix: &Matrix, path: &Path) -> Result<()> {
    matrix
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
