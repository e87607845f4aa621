//! Per-node attribute matrices (paint, metric, shape, lat-lon, geodesic).
//!
//! All node attribute kinds share one column-oriented container,
//! [`NodeAttributeMatrix`], parameterized by element type. A value-typed
//! [`AttributeSemantics`] tag selects the small behaviors that differ between
//! kinds, such as the paint label table.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SurfaceError};

/// What the values in a [`NodeAttributeMatrix`] mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantics {
    /// Integer labels resolved through a [`LabelTable`].
    Paint,
    /// Continuous values (metric and surface shape).
    Scalar,
    /// Latitude and longitude in degrees.
    LatLon,
    /// Geodesic distance from a source node.
    GeodesicDistance,
}

impl AttributeSemantics {
    /// Canonical name used in attribute files.
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeSemantics::Paint => "paint",
            AttributeSemantics::Scalar => "scalar",
            AttributeSemantics::LatLon => "latlon",
            AttributeSemantics::GeodesicDistance => "geodesic",
        }
    }
}

impl fmt::Display for AttributeSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeSemantics {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "paint" => Ok(AttributeSemantics::Paint),
            "scalar" | "metric" | "shape" => Ok(AttributeSemantics::Scalar),
            "latlon" | "lat-lon" => Ok(AttributeSemantics::LatLon),
            "geodesic" => Ok(AttributeSemantics::GeodesicDistance),
            other => Err(SurfaceError::InvalidArgument(format!(
                "unknown attribute semantics '{other}'"
            ))),
        }
    }
}

/// Names for integer paint labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
    lookup: HashMap<String, i32>,
}

impl LabelTable {
    /// Build a table where label `i` is `names[i]`.
    pub fn new(names: Vec<String>) -> Self {
        let lookup = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as i32))
            .collect();
        Self { names, lookup }
    }

    /// Return the label for `name`, adding it if absent.
    pub fn add(&mut self, name: &str) -> i32 {
        if let Some(&label) = self.lookup.get(name) {
            return label;
        }
        let label = self.names.len() as i32;
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), label);
        label
    }

    /// Label of a name.
    pub fn label(&self, name: &str) -> Option<i32> {
        self.lookup.get(name).copied()
    }

    /// Name of a label.
    pub fn name(&self, label: i32) -> Option<&str> {
        usize::try_from(label)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// All names in label order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if no labels are defined.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One named column of a [`NodeAttributeMatrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeColumn<T> {
    /// Column name.
    pub name: String,
    /// Display range `(min, max)` for scalar colour mapping.
    pub color_range: Option<(f32, f32)>,
    /// One value per node.
    pub values: Vec<T>,
}

/// Rows are nodes, columns are named arrays of `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAttributeMatrix<T> {
    num_nodes: usize,
    semantics: AttributeSemantics,
    columns: Vec<AttributeColumn<T>>,
    labels: LabelTable,
}

/// Integer paint labels.
pub type PaintMatrix = NodeAttributeMatrix<i32>;
/// Metric or surface-shape values.
pub type ScalarMatrix = NodeAttributeMatrix<f32>;
/// Latitude and longitude pairs.
pub type LatLonMatrix = NodeAttributeMatrix<[f32; 2]>;

impl<T: Clone> NodeAttributeMatrix<T> {
    /// Create a matrix with no columns.
    pub fn new(num_nodes: usize, semantics: AttributeSemantics) -> Self {
        Self {
            num_nodes,
            semantics,
            columns: Vec::new(),
            labels: LabelTable::default(),
        }
    }

    /// Number of rows.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Semantics tag.
    #[inline]
    pub fn semantics(&self) -> AttributeSemantics {
        self.semantics
    }

    /// Append a column; `values` must have one entry per node.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<T>) -> Result<usize> {
        if values.len() != self.num_nodes {
            return Err(SurfaceError::NodeCountMismatch {
                coords: values.len(),
                topology: self.num_nodes,
            });
        }
        self.columns.push(AttributeColumn {
            name: name.into(),
            color_range: None,
            values,
        });
        Ok(self.columns.len() - 1)
    }

    /// Borrow a column.
    pub fn column(&self, column: usize) -> Result<&AttributeColumn<T>> {
        self.columns.get(column).ok_or_else(|| {
            SurfaceError::InvalidArgument(format!(
                "column {column} out of range ({} columns)",
                self.columns.len()
            ))
        })
    }

    /// Mutably borrow a column.
    pub fn column_mut(&mut self, column: usize) -> Result<&mut AttributeColumn<T>> {
        let count = self.columns.len();
        self.columns.get_mut(column).ok_or_else(|| {
            SurfaceError::InvalidArgument(format!("column {column} out of range ({count} columns)"))
        })
    }

    /// Index of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of one column.
    pub fn values(&self, column: usize) -> Result<&[T]> {
        Ok(&self.column(column)?.values)
    }

    /// All columns.
    pub fn columns(&self) -> &[AttributeColumn<T>] {
        &self.columns
    }

    /// Paint label table.
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Mutable paint label table.
    pub fn labels_mut(&mut self) -> &mut LabelTable {
        &mut self.labels
    }

    /// Replace the label table.
    pub fn set_labels(&mut self, labels: LabelTable) {
        self.labels = labels;
    }
}

impl NodeAttributeMatrix<f32> {
    /// Minimum and maximum of a column, ignoring NaN.
    pub fn column_range(&self, column: usize) -> Result<Option<(f32, f32)>> {
        let values = self.values(column)?;
        Ok(values
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_table() {
        let mut labels = LabelTable::new(vec!["???".into(), "V1".into()]);
        assert_eq!(labels.label("V1"), Some(1));
        assert_eq!(labels.add("MT"), 2);
        assert_eq!(labels.add("V1"), 1);
        assert_eq!(labels.name(2), Some("MT"));
        assert_eq!(labels.name(-1), None);
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_columns() {
        let mut metric = ScalarMatrix::new(3, AttributeSemantics::Scalar);
        let col = metric.add_column("depth", vec![1.0, -2.0, 5.5]).unwrap();
        assert_eq!(metric.column_index("depth"), Some(col));
        assert_eq!(metric.column_range(col).unwrap(), Some((-2.0, 5.5)));
        assert!(metric.add_column("short", vec![1.0]).is_err());
        assert!(metric.values(4).is_err());
    }

    #[test]
    fn test_semantics_names() {
        assert_eq!(
            "shape".parse::<AttributeSemantics>().unwrap(),
            AttributeSemantics::Scalar
        );
        assert_eq!(AttributeSemantics::LatLon.to_string(), "latlon");
    }
}
