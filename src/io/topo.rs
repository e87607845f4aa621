//! Topology files.
//!
//! After the header come `topo_type`, `NumberOfNodes` and `NumberOfTiles`,
//! then the triangles as big-endian `i32` triples or one `a b c` line each.

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::mesh::{Topology, TopologyType};

use super::{capacity_hint, write_atomic, Encoding, FileHeader, LineReader};

/// Read a topology file.
///
/// Triangle indices are validated against the node count.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Topology> {
    let path = path.as_ref();
    let mut reader = LineReader::open(path)?;
    let header = FileHeader::read(&mut reader)?;
    let encoding = header.encoding_or(Encoding::Ascii)?;
    let topology_type: TopologyType = reader.keyed("topo_type")?;
    let num_nodes: usize = reader.keyed("NumberOfNodes")?;
    let num_tiles: usize = reader.keyed("NumberOfTiles")?;

    let index = |reader: &LineReader<_>, v: i32| {
        usize::try_from(v).map_err(|_| reader.error(format!("negative node index {v}")))
    };
    let mut triangles = Vec::with_capacity(capacity_hint(num_tiles));
    match encoding {
        Encoding::Binary => {
            for c in reader.read_records::<12>(num_tiles)? {
                let v = |i: usize| i32::from_be_bytes([c[i], c[i + 1], c[i + 2], c[i + 3]]);
                triangles.push([index(&reader, v(0))?, index(&reader, v(4))?, index(&reader, v(8))?]);
            }
        }
        Encoding::Ascii => {
            for _ in 0..num_tiles {
                let line = reader.expect_line("tile")?;
                let tokens = reader.tokens(&line, 3, "tile line")?;
                let mut tri = [0usize; 3];
                for (slot, token) in tri.iter_mut().zip(&tokens) {
                    *slot = index(&reader, reader.parse(token, "node index")?)?;
                }
                triangles.push(tri);
            }
        }
    }
    Ok(Topology::new(num_nodes, triangles)?.with_type(topology_type))
}

/// Write a topology.
pub fn save<P: AsRef<Path>>(path: P, topology: &Topology, encoding: Encoding) -> Result<()> {
    let mut header = FileHeader::new("topo");
    header.set("encoding", encoding);
    write_atomic(path, |out| {
        header.write(out)?;
        writeln!(out, "topo_type {}", topology.topology_type())?;
        writeln!(out, "NumberOfNodes {}", topology.num_nodes())?;
        writeln!(out, "NumberOfTiles {}", topology.num_triangles())?;
        for &[a, b, c] in topology.triangles() {
            match encoding {
                Encoding::Binary => {
                    for n in [a, b, c] {
                        out.write_all(&(n as i32).to_be_bytes())?;
                    }
                }
                Encoding::Ascii => writeln!(out, "{a} {b} {c}")?,
            }
        }
        Ok(())
    })
}
