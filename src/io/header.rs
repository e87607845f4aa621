//! The `BeginHeader` / `EndHeader` block shared by every file format.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use crate::error::{Result, SurfaceError};
use crate::mesh::Structure;

use super::LineReader;

const BEGIN: &str = "BeginHeader";
const END: &str = "EndHeader";

/// How the data section is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Big-endian binary.
    #[default]
    Binary,
    /// Whitespace-separated text.
    Ascii,
}

impl Encoding {
    /// Name written in headers.
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Binary => "BINARY",
            Encoding::Ascii => "ASCII",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BINARY" => Ok(Encoding::Binary),
            "ASCII" => Ok(Encoding::Ascii),
            other => Err(SurfaceError::InvalidArgument(format!("unknown encoding '{other}'"))),
        }
    }
}

/// Free-form `key value` pairs kept in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    entries: BTreeMap<String, String>,
}

impl FileHeader {
    /// A header tagged with `filetype`.
    pub fn new(filetype: &str) -> Self {
        let mut header = Self::default();
        header.set("filetype", filetype);
        header
    }

    /// Value of a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Set a key. Line breaks in the value become spaces.
    pub fn set(&mut self, key: &str, value: impl fmt::Display) {
        let value = value.to_string().replace(['\n', '\r'], " ");
        self.entries.insert(key.to_string(), value);
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `filetype` entry.
    pub fn filetype(&self) -> Option<&str> {
        self.get("filetype")
    }

    /// The `comment` entry.
    pub fn comment(&self) -> Option<&str> {
        self.get("comment")
    }

    /// The `encoding` entry, or `default` when absent.
    pub fn encoding_or(&self, default: Encoding) -> Result<Encoding> {
        self.get("encoding").map_or(Ok(default), str::parse)
    }

    /// The `structure` entry; unknown when absent or unrecognized.
    pub fn structure(&self) -> Structure {
        self.get("structure")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Read the header block if the next line opens one. Without one, the
    /// header is empty and nothing is consumed.
    pub(crate) fn read<R: BufRead>(reader: &mut LineReader<R>) -> Result<Self> {
        let mut header = Self::default();
        let Some(first) = reader.next_content_line()? else {
            return Ok(header);
        };
        if first != BEGIN {
            reader.push_back(first);
            return Ok(header);
        }
        loop {
            let line = reader.expect_line(END)?;
            if line == END {
                return Ok(header);
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or("").trim();
            header.entries.insert(key.to_string(), value.to_string());
        }
    }

    pub(crate) fn write<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "{BEGIN}")?;
        for (key, value) in &self.entries {
            if value.is_empty() {
                writeln!(out, "{key}")?;
            } else {
                writeln!(out, "{key} {value}")?;
            }
        }
        writeln!(out, "{END}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_round_trip() {
        let mut header = FileHeader::new("coord");
        header.set("comment", "made by\na test");
        header.set("structure", Structure::Left);
        header.set("encoding", Encoding::Ascii);

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let mut reader = LineReader::new(buf.as_slice(), Path::new("mem"));
        let back = FileHeader::read(&mut reader).unwrap();

        assert_eq!(back, header);
        assert_eq!(back.comment(), Some("made by a test"));
        assert_eq!(back.structure(), Structure::Left);
        assert_eq!(back.encoding_or(Encoding::Binary).unwrap(), Encoding::Ascii);
    }

    #[test]
    fn test_missing_header() {
        let text = "NumberOfNodes 2\n";
        let mut reader = LineReader::new(text.as_bytes(), Path::new("mem"));
        let header = FileHeader::read(&mut reader).unwrap();
        assert_eq!(header.filetype(), None);
        assert_eq!(header.encoding_or(Encoding::Ascii).unwrap(), Encoding::Ascii);
        assert_eq!(reader.keyed::<usize>("NumberOfNodes").unwrap(), 2);
    }

    #[test]
    fn test_unterminated_header() {
        let text = "BeginHeader\nfiletype topo\n";
        let mut reader = LineReader::new(text.as_bytes(), Path::new("mem"));
        assert!(matches!(
            FileHeader::read(&mut reader),
            Err(SurfaceError::Parse { .. })
        ));
    }
}
