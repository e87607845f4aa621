//! Surface file I/O.
//!
//! Every format starts with the shared [`FileHeader`] block and is written
//! through [`write_atomic`], so a failed write never leaves a partial file.
//!
//! | Module | Contents | Encodings |
//! |--------|----------|-----------|
//! | [`coord`] | node coordinates | binary, ASCII |
//! | [`topo`] | triangles and topology type | binary, ASCII |
//! | [`roi`] | selected node indices | ASCII |
//! | [`border`] | borders and border projections | ASCII |
//! | [`attributes`] | paint, metric, shape and lat-lon matrices | ASCII |
//! | [`geodesic`] | distance and parent per node | binary |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sulcus::io::{coord, topo, Encoding};
//! use sulcus::mesh::SurfaceKind;
//!
//! let topology = Arc::new(topo::load("subject.topo").unwrap());
//! let flat = coord::load_surface("subject.flat.coord", topology, SurfaceKind::Flat).unwrap();
//! coord::save("copy.coord", &flat, Encoding::Ascii).unwrap();
//! ```

pub mod attributes;
pub mod border;
pub mod coord;
pub mod geodesic;
pub mod header;
pub mod roi;
pub mod topo;

pub use header::{Encoding, FileHeader};

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, SurfaceError};

/// Most records a reader reserves space for before seeing them.
const MAX_PREALLOCATED: usize = 1 << 16;

/// Capacity to reserve for `count` records announced by a file header.
#[inline]
pub(crate) fn capacity_hint(count: usize) -> usize {
    count.min(MAX_PREALLOCATED)
}

/// Write `path` through a sibling temporary file that is renamed into place
/// once `write` succeeds.
pub fn write_atomic<P, F>(path: P, write: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SurfaceError::InvalidArgument(format!("{} is not a file path", path.display())))?;
    let tmp = path.with_file_name(format!(".{name}.tmp"));

    let result = File::create(&tmp)
        .map_err(SurfaceError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&tmp, path).map_err(SurfaceError::from));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Line-oriented reader that remembers its position for error messages.
pub(crate) struct LineReader<R> {
    inner: R,
    path: PathBuf,
    line: usize,
    pending: Option<String>,
}

impl LineReader<BufReader<File>> {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?), path))
    }
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(inner: R, path: &Path) -> Self {
        Self {
            inner,
            path: path.to_path_buf(),
            line: 0,
            pending: None,
        }
    }

    /// Next line without its terminator, or `None` at end of file.
    pub(crate) fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = String::new();
        if self.inner.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(buf.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Next line that is neither blank nor a `#` comment.
    pub(crate) fn next_content_line(&mut self) -> Result<Option<String>> {
        while let Some(line) = self.next_line()? {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Ok(Some(trimmed.to_string()));
            }
        }
        Ok(None)
    }

    /// Like [`next_content_line`](Self::next_content_line) but end of file
    /// is an error.
    pub(crate) fn expect_line(&mut self, what: &str) -> Result<String> {
        self.next_content_line()?
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {what}")))
    }

    /// Return a line so the next read yields it again.
    pub(crate) fn push_back(&mut self, line: String) {
        self.pending = Some(line);
    }

    /// Read a `key value` line and parse the value.
    pub(crate) fn keyed<T: FromStr>(&mut self, key: &str) -> Result<T> {
        let line = self.expect_line(key)?;
        let mut parts = line.splitn(2, char::is_whitespace);
        if parts.next() != Some(key) {
            return Err(self.error(format!("expected '{key}', found '{line}'")));
        }
        let value = parts.next().unwrap_or("").trim();
        self.parse(value, key)
    }

    pub(crate) fn parse<T: FromStr>(&self, token: &str, what: &str) -> Result<T> {
        token
            .parse()
            .map_err(|_| self.error(format!("invalid {what} '{token}'")))
    }

    /// Split a line into exactly `count` whitespace-separated tokens.
    pub(crate) fn tokens<'a>(&self, line: &'a str, count: usize, what: &str) -> Result<Vec<&'a str>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < count {
            return Err(self.error(format!(
                "{what} needs {count} fields, found {}",
                tokens.len()
            )));
        }
        Ok(tokens)
    }

    /// Binary payload after the text lines.
    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SurfaceError::Parse {
                    path: self.path.clone(),
                    line: 0,
                    message: "binary data is truncated".into(),
                }
            } else {
                e.into()
            }
        })
    }

    /// Read `count` binary records of `N` bytes each.
    ///
    /// Storage grows with the data actually read, so a corrupt count fails
    /// on the truncated payload.
    pub(crate) fn read_records<const N: usize>(&mut self, count: usize) -> Result<Vec<[u8; N]>> {
        if count.checked_mul(N).is_none() {
            return Err(self.error(format!("record count {count} is too large")));
        }
        let mut records = Vec::with_capacity(capacity_hint(count));
        for _ in 0..count {
            let mut record = [0u8; N];
            self.read_exact(&mut record)?;
            records.push(record);
        }
        Ok(records)
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> SurfaceError {
        SurfaceError::Parse {
            path: self.path.clone(),
            line: self.line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, |w| Ok(writeln!(w, "first")?)).unwrap();
        write_atomic(&path, |w| Ok(writeln!(w, "second")?)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let result = write_atomic(&path, |w| {
            writeln!(w, "partial")?;
            Err(SurfaceError::InvalidArgument("stop".into()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_line_reader_positions() {
        let text = "# comment\n\nNumberOfNodes 3\nfoo\n";
        let mut reader = LineReader::new(text.as_bytes(), Path::new("mem"));
        assert_eq!(reader.keyed::<usize>("NumberOfNodes").unwrap(), 3);
        let err = reader.keyed::<usize>("NumberOfTiles").unwrap_err();
        match err {
            SurfaceError::Parse { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
