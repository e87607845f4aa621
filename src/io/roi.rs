//! ROI files: `NumberOfNodes N` and one selected node index per line.

use std::io::Write;
use std::path::Path;

use crate::algo::roi::RoiSelection;
use crate::error::{Result, SurfaceError};

use super::{write_atomic, FileHeader, LineReader};

/// Read an ROI. The file's node count must equal `num_nodes`.
pub fn load<P: AsRef<Path>>(path: P, num_nodes: usize) -> Result<RoiSelection> {
    let path = path.as_ref();
    let mut reader = LineReader::open(path)?;
    FileHeader::read(&mut reader)?;
    let count: usize = reader.keyed("NumberOfNodes")?;
    if count != num_nodes {
        return Err(SurfaceError::NodeCountMismatch {
            coords: count,
            topology: num_nodes,
        });
    }

    let mut flags = vec![false; num_nodes];
    while let Some(line) = reader.next_content_line()? {
        let node: usize = reader.parse(&line, "node index")?;
        if node >= num_nodes {
            return Err(reader.error(format!("node {node} is out of range for {num_nodes} nodes")));
        }
        flags[node] = true;
    }
    Ok(RoiSelection::from_flags(flags))
}

/// Write the selected nodes of `roi`.
pub fn save<P: AsRef<Path>>(path: P, roi: &RoiSelection) -> Result<()> {
    let mut header = FileHeader::new("roi");
    header.set("encoding", "ASCII");
    let description = roi.description();
    if !description.is_empty() {
        header.set("comment", description);
    }
    write_atomic(path, |out| {
        header.write(out)?;
        writeln!(out, "NumberOfNodes {}", roi.num_nodes())?;
        for node in roi.selected_nodes() {
            writeln!(out, "{node}")?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.roi");
        let roi = RoiSelection::from_nodes(10, [1, 4, 9]).unwrap();
        save(&path, &roi).unwrap();
        let back = load(&path, 10).unwrap();
        assert_eq!(back.selected_nodes(), vec![1, 4, 9]);
        assert!(load(&path, 11).is_err());
    }

    #[test]
    fn test_comments_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hand.roi");
        std::fs::write(&path, "NumberOfNodes 4\n# picked by hand\n\n2\n0\n").unwrap();
        assert_eq!(load(&path, 4).unwrap().selected_nodes(), vec![0, 2]);

        std::fs::write(&path, "NumberOfNodes 4\n7\n").unwrap();
        assert!(matches!(load(&path, 4), Err(SurfaceError::Parse { line: 2, .. })));
    }
}
