//! Node attribute files: paint, metric, surface shape and lat-lon.
//!
//! ```text
//! NumberOfNodes N
//! NumberOfColumns C
//! Semantics paint
//! Column 0 <name>
//! ColorRange 0 <min> <max>     (optional)
//! Labels K                     (optional, then K names one per line)
//! Data
//! <node> <values of column 0> <values of column 1> ...
//! ```

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::mesh::{AttributeColumn, AttributeSemantics, LabelTable, NodeAttributeMatrix};

use super::{capacity_hint, write_atomic, FileHeader, LineReader};

/// An element type that can be stored in an attribute file.
pub trait AttributeValue: Clone + Sized {
    /// Tokens per value.
    const WIDTH: usize;

    /// True if files tagged `semantics` hold this type.
    fn accepts(semantics: AttributeSemantics) -> bool;

    /// Parse exactly [`WIDTH`](Self::WIDTH) tokens.
    fn parse(tokens: &[&str]) -> Option<Self>;

    /// Append the value's tokens to a row.
    fn format(&self, row: &mut String);
}

impl AttributeValue for i32 {
    const WIDTH: usize = 1;

    fn accepts(semantics: AttributeSemantics) -> bool {
        semantics == AttributeSemantics::Paint
    }

    fn parse(tokens: &[&str]) -> Option<Self> {
        tokens[0].parse().ok()
    }

    fn format(&self, row: &mut String) {
        row.push_str(&format!(" {self}"));
    }
}

impl AttributeValue for f32 {
    const WIDTH: usize = 1;

    fn accepts(semantics: AttributeSemantics) -> bool {
        matches!(
            semantics,
            AttributeSemantics::Scalar | AttributeSemantics::GeodesicDistance
        )
    }

    fn parse(tokens: &[&str]) -> Option<Self> {
        tokens[0].parse().ok()
    }

    fn format(&self, row: &mut String) {
        row.push_str(&format!(" {self}"));
    }
}

impl AttributeValue for [f32; 2] {
    const WIDTH: usize = 2;

    fn accepts(semantics: AttributeSemantics) -> bool {
        semantics == AttributeSemantics::LatLon
    }

    fn parse(tokens: &[&str]) -> Option<Self> {
        Some([tokens[0].parse().ok()?, tokens[1].parse().ok()?])
    }

    fn format(&self, row: &mut String) {
        row.push_str(&format!(" {} {}", self[0], self[1]));
    }
}

/// Read an attribute matrix.
pub fn load<T: AttributeValue, P: AsRef<Path>>(path: P) -> Result<NodeAttributeMatrix<T>> {
    let mut reader = LineReader::open(path.as_ref())?;
    FileHeader::read(&mut reader)?;
    let num_nodes: usize = reader.keyed("NumberOfNodes")?;
    let num_columns: usize = reader.keyed("NumberOfColumns")?;
    let semantics: AttributeSemantics = reader.keyed("Semantics")?;
    if !T::accepts(semantics) {
        return Err(reader.error(format!("file holds {semantics} values")));
    }

    let mut names: Vec<String> = Vec::with_capacity(num_columns);
    let mut ranges: Vec<Option<(f32, f32)>> = Vec::with_capacity(num_columns);
    let mut labels = LabelTable::default();
    loop {
        let line = reader.expect_line("Data")?;
        let (key, rest) = line.split_once(char::is_whitespace).unwrap_or((line.as_str(), ""));
        match key {
            "Data" => break,
            "Column" => {
                let (index, name) = rest.trim().split_once(char::is_whitespace).unwrap_or((rest.trim(), ""));
                let index: usize = reader.parse(index, "column index")?;
                if index != names.len() {
                    return Err(reader.error(format!("expected column {}, found {index}", names.len())));
                }
                names.push(name.trim().to_string());
                ranges.push(None);
            }
            "ColorRange" => {
                let t = reader.tokens(rest, 3, "color range")?;
                let index: usize = reader.parse(t[0], "column index")?;
                let range = (reader.parse(t[1], "minimum")?, reader.parse(t[2], "maximum")?);
                match ranges.get_mut(index) {
                    Some(slot) => *slot = Some(range),
                    None => return Err(reader.error(format!("color range for unknown column {index}"))),
                }
            }
            "Labels" => {
                let count: usize = reader.parse(rest.trim(), "label count")?;
                let mut label_names = Vec::with_capacity(capacity_hint(count));
                for _ in 0..count {
                    label_names.push(reader.expect_line("label name")?);
                }
                labels = LabelTable::new(label_names);
            }
            other => return Err(reader.error(format!("unexpected '{other}'"))),
        }
    }
    if names.len() != num_columns {
        return Err(reader.error(format!(
            "expected {num_columns} columns, found {}",
            names.len()
        )));
    }

    let mut values: Vec<Vec<T>> = (0..num_columns)
        .map(|_| Vec::with_capacity(capacity_hint(num_nodes)))
        .collect();
    for node in 0..num_nodes {
        let line = reader.expect_line("data row")?;
        let t = reader.tokens(&line, 1 + num_columns * T::WIDTH, "data row")?;
        let index: usize = reader.parse(t[0], "node index")?;
        if index != node {
            return Err(reader.error(format!("expected node {node}, found {index}")));
        }
        for (c, column) in values.iter_mut().enumerate() {
            let start = 1 + c * T::WIDTH;
            let value = T::parse(&t[start..start + T::WIDTH])
                .ok_or_else(|| reader.error(format!("invalid value in column {c}")))?;
            column.push(value);
        }
    }

    let mut matrix = NodeAttributeMatrix::new(num_nodes, semantics);
    for ((name, range), column) in names.into_iter().zip(ranges).zip(values) {
        let index = matrix.add_column(name, column)?;
        matrix.column_mut(index)?.color_range = range;
    }
    matrix.set_labels(labels);
    Ok(matrix)
}

/// Write an attribute matrix.
pub fn save<T: AttributeValue, P: AsRef<Path>>(path: P, matrix: &NodeAttributeMatrix<T>) -> Result<()> {
    let mut header = FileHeader::new(matrix.semantics().as_str());
    header.set("encoding", "ASCII");
    write_atomic(path, |out| {
        header.write(out)?;
        writeln!(out, "NumberOfNodes {}", matrix.num_nodes())?;
        writeln!(out, "NumberOfColumns {}", matrix.num_columns())?;
        writeln!(out, "Semantics {}", matrix.semantics())?;
        for (c, AttributeColumn { name, color_range, .. }) in matrix.columns().iter().enumerate() {
            writeln!(out, "Column {c} {name}")?;
            if let Some((lo, hi)) = color_range {
                writeln!(out, "ColorRange {c} {lo} {hi}")?;
            }
        }
        if !matrix.labels().is_empty() {
            writeln!(out, "Labels {}", matrix.labels().len())?;
            for name in matrix.labels().names() {
                writeln!(out, "{name}")?;
            }
        }
        writeln!(out, "Data")?;
        let mut row = String::new();
        for node in 0..matrix.num_nodes() {
            row.clear();
            row.push_str(&node.to_string());
            for column in matrix.columns() {
                column.values[node].format(&mut row);
            }
            writeln!(out, "{row}")?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;
    use crate::mesh::{LatLonMatrix, PaintMatrix, ScalarMatrix};

    #[test]
    fn test_paint_with_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("areas.paint");
        let mut paint = PaintMatrix::new(4, AttributeSemantics::Paint);
        paint.set_labels(LabelTable::new(vec!["???".into(), "V1".into(), "MT".into()]));
        paint.add_column("visual areas", vec![0, 1, 1, 2]).unwrap();
        save(&path, &paint).unwrap();

        let back: PaintMatrix = load(&path).unwrap();
        assert_eq!(back, paint);
        assert_eq!(back.labels().label("MT"), Some(2));
    }

    #[test]
    fn test_metric_with_color_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth.metric");
        let mut metric = ScalarMatrix::new(3, AttributeSemantics::Scalar);
        metric.add_column("depth", vec![-1.5, 0.0, 2.25]).unwrap();
        let c = metric.add_column("curvature", vec![0.1, 0.2, 0.3]).unwrap();
        metric.column_mut(c).unwrap().color_range = Some((-1.0, 1.0));
        save(&path, &metric).unwrap();

        let back: ScalarMatrix = load(&path).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn test_latlon_and_wrong_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sphere.latlon");
        let mut latlon = LatLonMatrix::new(2, AttributeSemantics::LatLon);
        latlon.add_column("lat lon", vec![[10.0, 20.0], [-45.5, 180.0]]).unwrap();
        save(&path, &latlon).unwrap();

        let back: LatLonMatrix = load(&path).unwrap();
        assert_eq!(back, latlon);
        assert!(matches!(load::<f32, _>(&path), Err(SurfaceError::Parse { .. })));
    }
}
