//! Typed axis headers.
//!
//! Every axis of a [`Matrix`](crate::Matrix) may carry an ordered list of
//! labels (site ids, species names, node ids, layer names). Headers are keyed
//! by axis index and are checked against the matrix shape whenever they are
//! attached, so a label list can never silently disagree with the data.

use crate::error::MatrixError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered label lists keyed by axis index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<String>>", into = "BTreeMap<String, Vec<String>>")]
pub struct Headers {
    axes: BTreeMap<usize, Vec<String>>,
}

impl Headers {
    /// Create an empty header set (no axis labeled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Headers::set`].
    pub fn with_axis<S: Into<String>>(mut self, axis: usize, labels: impl IntoIterator<Item = S>) -> Self {
        self.set(axis, labels);
        self
    }

    /// Set the labels of one axis, replacing any previous labels.
    pub fn set<S: Into<String>>(&mut self, axis: usize, labels: impl IntoIterator<Item = S>) {
        self.axes
            .insert(axis, labels.into_iter().map(Into::into).collect());
    }

    /// Remove the labels of one axis.
    pub fn remove(&mut self, axis: usize) -> Option<Vec<String>> {
        self.axes.remove(&axis)
    }

    /// Labels for `axis`, if any.
    pub fn get(&self, axis: usize) -> Option<&[String]> {
        self.axes.get(&axis).map(Vec::as_slice)
    }

    /// Iterate over `(axis, labels)` pairs in axis order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.axes.iter().map(|(axis, labels)| (*axis, labels.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Check every labeled axis against `shape`.
    pub fn validate(&self, shape: &[usize]) -> Result<(), MatrixError> {
        for (&axis, labels) in &self.axes {
            let Some(&len) = shape.get(axis) else {
                return Err(MatrixError::Header {
                    axis,
                    detail: format!("matrix only has {} axes", shape.len()),
                });
            };
            if labels.len() != len {
                return Err(MatrixError::Header {
                    axis,
                    detail: format!("{} labels for an axis of length {len}", labels.len()),
                });
            }
        }
        Ok(())
    }

    /// Keep only the labels at `indices` on `axis`.
    pub(crate) fn subset(&self, axis: usize, indices: &[usize]) -> Self {
        let mut out = self.clone();
        if let Some(labels) = self.axes.get(&axis) {
            out.axes
                .insert(axis, indices.iter().map(|&i| labels[i].clone()).collect());
        }
        out
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for Headers {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut axes = BTreeMap::new();
        for (key, labels) in raw {
            let axis: usize = key
                .parse()
                .map_err(|_| format!("header key '{key}' is not an axis index"))?;
            axes.insert(axis, labels);
        }
        Ok(Self { axes })
    }
}

impl From<Headers> for BTreeMap<String, Vec<String>> {
    fn from(headers: Headers) -> Self {
        headers
            .axes
            .into_iter()
            .map(|(axis, labels)| (axis.to_string(), labels))
            .collect()
    }
}
