//! Geodesic distance files.
//!
//! After the header (which records the source node) comes `NumberOfNodes N`
//! and `N` binary records of a big-endian `f32` distance and a big-endian
//! `i32` parent, `-1` meaning none.

use std::io::Write;
use std::path::Path;

use crate::algo::geodesic::GeodesicField;
use crate::error::Result;

use super::{write_atomic, FileHeader, LineReader};

/// Write a geodesic field.
pub fn save<P: AsRef<Path>>(path: P, field: &GeodesicField) -> Result<()> {
    let mut header = FileHeader::new("geodesic");
    header.set("encoding", "BINARY");
    header.set("source", field.source());
    let parents = field.parents_as_i32();
    write_atomic(path, |out| {
        header.write(out)?;
        writeln!(out, "NumberOfNodes {}", field.len())?;
        for (&distance, parent) in field.distances().iter().zip(parents) {
            out.write_all(&(distance as f32).to_be_bytes())?;
            out.write_all(&parent.to_be_bytes())?;
        }
        Ok(())
    })
}

/// Read a geodesic field.
pub fn load<P: AsRef<Path>>(path: P) -> Result<GeodesicField> {
    let mut reader = LineReader::open(path.as_ref())?;
    let header = FileHeader::read(&mut reader)?;
    let source: usize = match header.get("source") {
        Some(s) => reader.parse(s, "source node")?,
        None => return Err(reader.error("header has no source node")),
    };
    let num_nodes: usize = reader.keyed("NumberOfNodes")?;

    let records = reader.read_records::<8>(num_nodes)?;
    let mut distances = Vec::with_capacity(records.len());
    let mut parents = Vec::with_capacity(records.len());
    for c in records {
        distances.push(f64::from(f32::from_be_bytes([c[0], c[1], c[2], c[3]])));
        let parent = i32::from_be_bytes([c[4], c[5], c[6], c[7]]);
        parents.push(usize::try_from(parent).ok().filter(|&p| p < num_nodes));
    }
    GeodesicField::new(source, distances, parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::geodesic::{dijkstra, GeodesicOptions};
    use crate::error::SurfaceError;
    use crate::mesh::fixtures::grid_surface;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("from_node_0.geo");
        let field = GeodesicField::new(
            1,
            vec![1.0, 0.0, 2.5, f64::INFINITY],
            vec![Some(1), None, Some(0), None],
        )
        .unwrap();
        save(&path, &field).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back, field);
        assert_eq!(back.parents_as_i32(), vec![1, -1, 0, -1]);
    }

    #[test]
    fn test_dijkstra_field_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.geo");
        let surface = grid_surface(5);
        let field = dijkstra(&surface, 12, None, &GeodesicOptions::default()).unwrap();
        save(&path, &field).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back.source(), 12);
        assert_eq!(back.parents(), field.parents());
        for (a, b) in back.distances().iter().zip(field.distances()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.geo");
        std::fs::write(&path, "NumberOfNodes 0\n").unwrap();
        assert!(matches!(load(&path), Err(SurfaceError::Parse { .. })));
    }

    #[test]
    fn test_huge_node_count_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.geo");
        for count in [usize::MAX / 8 + 1, 1 << 40] {
            let mut bytes =
                format!("BeginHeader\nsource 0\nEndHeader\nNumberOfNodes {count}\n").into_bytes();
            bytes.extend_from_slice(&[0u8; 16]);
            std::fs::write(&path, bytes).unwrap();
            assert!(matches!(load(&path), Err(SurfaceError::Parse { .. })));
        }
    }
}
