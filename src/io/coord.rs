//! Coordinate files.
//!
//! After the header comes `NumberOfCoordinates N` and then either `N × 3`
//! big-endian `f32` values or `N` lines of `index x y z`.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use nalgebra::Point3;

use crate::error::Result;
use crate::mesh::{Surface, SurfaceKind, Topology};

use super::{capacity_hint, write_atomic, Encoding, FileHeader, LineReader};

const COUNT_KEY: &str = "NumberOfCoordinates";

/// Contents of a coordinate file.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateFile {
    /// Header entries.
    pub header: FileHeader,
    /// One position per node.
    pub coords: Vec<Point3<f32>>,
}

/// Read a coordinate file.
pub fn read<P: AsRef<Path>>(path: P) -> Result<CoordinateFile> {
    let mut reader = LineReader::open(path.as_ref())?;
    read_from(&mut reader)
}

fn read_from<R: BufRead>(reader: &mut LineReader<R>) -> Result<CoordinateFile> {
    let header = FileHeader::read(reader)?;
    let encoding = header.encoding_or(Encoding::Ascii)?;
    let count: usize = reader.keyed(COUNT_KEY)?;

    let coords = match encoding {
        Encoding::Binary => {
            reader
                .read_records::<12>(count)?
                .into_iter()
                .map(|c| {
                    let f = |i: usize| f32::from_be_bytes([c[i], c[i + 1], c[i + 2], c[i + 3]]);
                    Point3::new(f(0), f(4), f(8))
                })
                .collect()
        }
        Encoding::Ascii => {
            let mut coords = Vec::with_capacity(capacity_hint(count));
            for i in 0..count {
                let line = reader.expect_line("coordinate")?;
                let tokens = reader.tokens(&line, 4, "coordinate line")?;
                let index: usize = reader.parse(tokens[0], "node index")?;
                if index != i {
                    return Err(reader.error(format!("expected node {i}, found {index}")));
                }
                coords.push(Point3::new(
                    reader.parse(tokens[1], "x")?,
                    reader.parse(tokens[2], "y")?,
                    reader.parse(tokens[3], "z")?,
                ));
            }
            coords
        }
    };
    Ok(CoordinateFile { header, coords })
}

/// Read coordinates and attach them to `topology`.
///
/// The structure recorded in the header is carried onto the surface.
pub fn load_surface<P: AsRef<Path>>(
    path: P,
    topology: Arc<Topology>,
    kind: SurfaceKind,
) -> Result<Surface> {
    let file = read(path)?;
    let structure = file.header.structure();
    Ok(Surface::new(kind, file.coords, topology)?.with_structure(structure))
}

/// Write `coords` with `header`; the encoding entry picks the layout.
pub fn write<P: AsRef<Path>>(path: P, header: &FileHeader, coords: &[Point3<f32>]) -> Result<()> {
    let encoding = header.encoding_or(Encoding::Binary)?;
    let mut header = header.clone();
    header.set("encoding", encoding);
    write_atomic(path, |out| {
        header.write(out)?;
        writeln!(out, "{COUNT_KEY} {}", coords.len())?;
        match encoding {
            Encoding::Binary => {
                for p in coords {
                    out.write_all(&p.x.to_be_bytes())?;
                    out.write_all(&p.y.to_be_bytes())?;
                    out.write_all(&p.z.to_be_bytes())?;
                }
            }
            Encoding::Ascii => {
                for (i, p) in coords.iter().enumerate() {
                    writeln!(out, "{i} {} {} {}", p.x, p.y, p.z)?;
                }
            }
        }
        Ok(())
    })
}

/// Write a surface's coordinates, recording its kind and structure.
pub fn save<P: AsRef<Path>>(path: P, surface: &Surface, encoding: Encoding) -> Result<()> {
    let mut header = FileHeader::new("coord");
    header.set("encoding", encoding);
    header.set("structure", surface.structure());
    header.set("configuration_id", surface.kind());
    write(path, &header, surface.coords())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;
    use crate::mesh::fixtures::icosphere;
    use crate::mesh::Structure;

    #[test]
    fn test_binary_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sphere.coord");
        let mut surface = icosphere(2).with_structure(Structure::Right);
        surface.scale(std::f32::consts::PI);
        save(&path, &surface, Encoding::Binary).unwrap();

        let back = load_surface(&path, Arc::clone(surface.topology()), SurfaceKind::Spherical).unwrap();
        assert_eq!(back.coords(), surface.coords());
        assert_eq!(back.structure(), Structure::Right);
        let file = read(&path).unwrap();
        assert_eq!(file.header.filetype(), Some("coord"));
        assert_eq!(file.header.get("configuration_id"), Some(surface.kind().to_string().as_str()));
    }

    #[test]
    fn test_ascii_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sphere.coord");
        let surface = icosphere(1);
        save(&path, &surface, Encoding::Ascii).unwrap();
        let back = read(&path).unwrap();
        for (p, q) in back.coords.iter().zip(surface.coords()) {
            assert!((p - q).norm() < 1e-6);
        }
    }

    #[test]
    fn test_truncated_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.coord");
        let mut bytes = b"BeginHeader\nencoding BINARY\nEndHeader\nNumberOfCoordinates 2\n".to_vec();
        bytes.extend_from_slice(&[0u8; 12]);
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(read(&path), Err(SurfaceError::Parse { .. })));
    }

    #[test]
    fn test_huge_count_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.coord");
        for count in [usize::MAX / 12 + 1, 1 << 40] {
            let mut bytes =
                format!("BeginHeader\nencoding BINARY\nEndHeader\nNumberOfCoordinates {count}\n").into_bytes();
            bytes.extend_from_slice(&[0u8; 24]);
            std::fs::write(&path, bytes).unwrap();
            assert!(matches!(read(&path), Err(SurfaceError::Parse { .. })));
        }

        std::fs::write(&path, "NumberOfCoordinates 1099511627776\n0 0.0 0.0 0.0\n").unwrap();
        assert!(matches!(read(&path), Err(SurfaceError::Parse { .. })));
    }

    #[test]
    fn test_count_mismatch_with_topology() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.coord");
        save(&path, &icosphere(0), Encoding::Ascii).unwrap();
        let topology = Arc::clone(icosphere(1).topology());
        assert!(matches!(
            load_surface(&path, topology, SurfaceKind::Spherical),
            Err(SurfaceError::NodeCountMismatch { .. })
        ));
    }
}
