//! Border files and border projection files.
//!
//! Both start with `NumberOfBorders B`. Each border then has a line
//! `index numLinks name sampling variance topography uncertainty`, and its
//! links follow one per line.
//!
//! - Borders carry a `x y z` centre line and links `j section x y z radius`.
//! - Projections carry links
//!   `j section tile n1 n2 n3 w1 w2 w3 x y z radius`, with tile `-1` for a
//!   link kept as a raw position.

use std::io::{BufRead, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::error::Result;
use crate::mesh::{Border, BorderLink, BorderProjection, ProjectedLink};

use super::{capacity_hint, write_atomic, FileHeader, LineReader};

const COUNT_KEY: &str = "NumberOfBorders";

/// Shared per-border attributes.
struct BorderRecord {
    num_links: usize,
    name: String,
    sampling_density: f32,
    variance: f32,
    topography: f32,
    uncertainty: f32,
}

/// Names are single tokens on disk.
fn token_name(name: &str) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

fn read_record<R: BufRead>(reader: &mut LineReader<R>, expected: usize) -> Result<BorderRecord> {
    let line = reader.expect_line("border record")?;
    let t = reader.tokens(&line, 7, "border record")?;
    let index: usize = reader.parse(t[0], "border index")?;
    if index != expected {
        return Err(reader.error(format!("expected border {expected}, found {index}")));
    }
    Ok(BorderRecord {
        num_links: reader.parse(t[1], "link count")?,
        name: t[2].to_string(),
        sampling_density: reader.parse(t[3], "sampling density")?,
        variance: reader.parse(t[4], "variance")?,
        topography: reader.parse(t[5], "topography")?,
        uncertainty: reader.parse(t[6], "uncertainty")?,
    })
}

fn point<R: BufRead>(reader: &LineReader<R>, t: &[&str]) -> Result<Point3<f32>> {
    Ok(Point3::new(
        reader.parse(t[0], "x")?,
        reader.parse(t[1], "y")?,
        reader.parse(t[2], "z")?,
    ))
}

/// Read every border in a file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<Border>> {
    let mut reader = LineReader::open(path.as_ref())?;
    FileHeader::read(&mut reader)?;
    let count: usize = reader.keyed(COUNT_KEY)?;

    let mut borders = Vec::with_capacity(capacity_hint(count));
    for b in 0..count {
        let record = read_record(&mut reader, b)?;
        // Centre line; recomputed from the links on demand.
        reader.expect_line("border centre")?;

        let mut border = Border::new(record.name);
        border.sampling_density = record.sampling_density;
        border.variance = record.variance;
        border.topography = record.topography;
        border.uncertainty = record.uncertainty;
        for _ in 0..record.num_links {
            let line = reader.expect_line("border link")?;
            let t = reader.tokens(&line, 6, "border link")?;
            border.push(BorderLink {
                position: point(&reader, &t[2..5])?,
                section: reader.parse(t[1], "section")?,
                radius: reader.parse(t[5], "radius")?,
            });
        }
        borders.push(border);
    }
    Ok(borders)
}

/// Write borders.
pub fn save<P: AsRef<Path>>(path: P, borders: &[Border]) -> Result<()> {
    let mut header = FileHeader::new("border");
    header.set("encoding", "ASCII");
    write_atomic(path, |out| {
        header.write(out)?;
        writeln!(out, "{COUNT_KEY} {}", borders.len())?;
        for (b, border) in borders.iter().enumerate() {
            writeln!(
                out,
                "{b} {} {} {} {} {} {}",
                border.num_links(),
                token_name(&border.name),
                border.sampling_density,
                border.variance,
                border.topography,
                border.uncertainty
            )?;
            let c = border.center();
            writeln!(out, "{} {} {}", c.x, c.y, c.z)?;
            for (j, link) in border.links().iter().enumerate() {
                let p = link.position;
                writeln!(out, "{j} {} {} {} {} {}", link.section, p.x, p.y, p.z, link.radius)?;
            }
        }
        Ok(())
    })
}

/// Read border projections.
pub fn load_projections<P: AsRef<Path>>(path: P) -> Result<Vec<BorderProjection>> {
    let mut reader = LineReader::open(path.as_ref())?;
    FileHeader::read(&mut reader)?;
    let count: usize = reader.keyed(COUNT_KEY)?;

    let mut projections = Vec::with_capacity(capacity_hint(count));
    for b in 0..count {
        let record = read_record(&mut reader, b)?;
        let mut links = Vec::with_capacity(capacity_hint(record.num_links));
        for _ in 0..record.num_links {
            let line = reader.expect_line("projected link")?;
            let t = reader.tokens(&line, 13, "projected link")?;
            let tile: i64 = reader.parse(t[2], "tile")?;
            let tile = if tile < 0 { None } else { Some(tile as usize) };
            let mut nodes = [0usize; 3];
            let mut weights = [0f32; 3];
            for k in 0..3 {
                nodes[k] = reader.parse(t[3 + k], "node")?;
                weights[k] = reader.parse(t[6 + k], "weight")?;
            }
            links.push(ProjectedLink {
                tile,
                nodes,
                weights,
                position: point(&reader, &t[9..12])?,
                section: reader.parse(t[1], "section")?,
                radius: reader.parse(t[12], "radius")?,
            });
        }
        projections.push(BorderProjection {
            name: record.name,
            sampling_density: record.sampling_density,
            variance: record.variance,
            topography: record.topography,
            uncertainty: record.uncertainty,
            links,
        });
    }
    Ok(projections)
}

/// Write border projections.
pub fn save_projections<P: AsRef<Path>>(path: P, projections: &[BorderProjection]) -> Result<()> {
    let mut header = FileHeader::new("borderproj");
    header.set("encoding", "ASCII");
    write_atomic(path, |out| {
        header.write(out)?;
        writeln!(out, "{COUNT_KEY} {}", projections.len())?;
        for (b, projection) in projections.iter().enumerate() {
            writeln!(
                out,
                "{b} {} {} {} {} {} {}",
                projection.links.len(),
                token_name(&projection.name),
                projection.sampling_density,
                projection.variance,
                projection.topography,
                projection.uncertainty
            )?;
            for (j, link) in projection.links.iter().enumerate() {
                let tile = link.tile.map_or(-1, |t| t as i64);
                let [n1, n2, n3] = link.nodes;
                let [w1, w2, w3] = link.weights;
                let p = link.position;
                writeln!(
                    out,
                    "{j} {} {tile} {n1} {n2} {n3} {w1} {w2} {w3} {} {} {} {}",
                    link.section, p.x, p.y, p.z, link.radius
                )?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;

    fn sample_border() -> Border {
        let mut border = Border::from_positions(
            "central sulcus",
            [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.5, -2.25, 0.0),
                Point3::new(3.0, 1.0, 0.125),
            ],
        );
        border.variance = 2.5;
        border.links_mut()[1].section = 3;
        border.links_mut()[2].radius = 0.75;
        border
    }

    #[test]
    fn test_border_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landmarks.border");
        let borders = vec![sample_border(), Border::from_positions("empty", [])];
        save(&path, &borders).unwrap();

        let back = load(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].name, "central_sulcus");
        assert_eq!(back[0].variance, 2.5);
        assert_eq!(back[0].links(), borders[0].links());
        assert!(back[1].is_empty());
    }

    #[test]
    fn test_projection_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landmarks.borderproj");
        let projection = BorderProjection {
            name: "V1".into(),
            sampling_density: 25.0,
            variance: 1.0,
            topography: 0.0,
            uncertainty: 1.0,
            links: vec![
                ProjectedLink {
                    tile: Some(7),
                    nodes: [3, 4, 9],
                    weights: [0.25, 0.5, 0.25],
                    position: Point3::origin(),
                    section: 1,
                    radius: 0.0,
                },
                ProjectedLink {
                    tile: None,
                    nodes: [0; 3],
                    weights: [0.0; 3],
                    position: Point3::new(4.0, 5.0, 6.0),
                    section: 0,
                    radius: 1.0,
                },
            ],
        };
        save_projections(&path, std::slice::from_ref(&projection)).unwrap();
        let back = load_projections(&path).unwrap();
        assert_eq!(back, vec![projection]);
        assert_eq!(back[0].num_raw_links(), 1);
    }

    #[test]
    fn test_truncated_border() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.border");
        std::fs::write(&path, "NumberOfBorders 1\n0 2 a 25 1 0 1\n0 0 0\n0 0 1 2 3 0\n").unwrap();
        assert!(matches!(load(&path), Err(SurfaceError::Parse { .. })));
    }
}
