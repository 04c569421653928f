// Copyright 2025 Spillway Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Spill files - disk-resident runs of serialized tuples
//!
//! Every operator that needs more than its page budget writes tuples to
//! spill files: sort runs, merge outputs and the materialized inner side of
//! a block nested-loop join. Files live in the configured spill directory,
//! carry the operator kind, a per-instance id and a caller label (such as
//! `p2-r5` for pass 2 run 5) in their name, and are removed explicitly by
//! the operator's `close()`. Dropping a [`SpillFile`] also removes it.
//!
//! ## Tuple format
//!
//! ```text
//! u16 LE  column count
//! per column:
//!   u8    tag (1 = Integer, 2 = Real, 3 = Text)
//!   i64 LE | f64 LE | u32 LE length + UTF-8 bytes
//! ```
//!
//! End of file on a tuple boundary ends the run. End of file inside a tuple
//! is reported as a truncated run.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::core::{Error, Result, Tuple, Value};

const TAG_INTEGER: u8 = 1;
const TAG_REAL: u8 = 2;
const TAG_TEXT: u8 = 3;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Naming scope for the spill files of one operator instance
#[derive(Debug, Clone)]
pub struct SpillSpace {
    dir: PathBuf,
    kind: &'static str,
    instance: u64,
}

impl SpillSpace {
    /// Create a fresh naming scope for an operator of `kind` under `dir`
    pub fn new(dir: impl Into<PathBuf>, kind: &'static str) -> Self {
        Self {
            dir: dir.into(),
            kind,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Instance id embedded in every file name of this scope
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Create an empty spill file and a writer positioned at its start
    pub fn create(&self, label: &str) -> Result<RunWriter> {
        let prefix = format!("{}-{}-{}-", self.kind, self.instance, label);
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".run")
            .tempfile_in(&self.dir)
            .map_err(|e| Error::io("create", self.dir.join(&prefix), e))?;
        let handle = temp
            .as_file()
            .try_clone()
            .map_err(|e| Error::io("create", temp.path(), e))?;
        Ok(RunWriter {
            writer: BufWriter::new(handle),
            temp,
            tuples: 0,
        })
    }
}

/// Sequential writer for one spill file
pub struct RunWriter {
    writer: BufWriter<File>,
    temp: NamedTempFile,
    tuples: usize,
}

impl RunWriter {
    /// Append one tuple
    pub fn write(&mut self, tuple: &Tuple) -> Result<()> {
        encode_tuple(&mut self.writer, tuple).map_err(|e| Error::io("write", self.temp.path(), e))?;
        self.tuples += 1;
        Ok(())
    }

    /// Append every tuple of a slice
    pub fn write_all(&mut self, tuples: &[Tuple]) -> Result<()> {
        for tuple in tuples {
            self.write(tuple)?;
        }
        Ok(())
    }

    /// Number of tuples written so far
    pub fn len(&self) -> usize {
        self.tuples
    }

    pub fn is_empty(&self) -> bool {
        self.tuples == 0
    }

    /// Flush buffered bytes and seal the file for reading
    pub fn finish(mut self) -> Result<SpillFile> {
        self.writer
            .flush()
            .map_err(|e| Error::io("write", self.temp.path(), e))?;
        Ok(SpillFile {
            temp: Some(self.temp),
            tuples: self.tuples,
        })
    }
}

/// A sealed spill file
pub struct SpillFile {
    temp: Option<NamedTempFile>,
    tuples: usize,
}

impl SpillFile {
    /// Path of the file, or an empty path once removed
    pub fn path(&self) -> &Path {
        self.temp.as_ref().map(|t| t.path()).unwrap_or(Path::new(""))
    }

    /// Number of tuples in the file
    pub fn len(&self) -> usize {
        self.tuples
    }

    pub fn is_empty(&self) -> bool {
        self.tuples == 0
    }

    /// Open an independent reader at the start of the file
    pub fn reader(&self) -> Result<RunReader> {
        let temp = self
            .temp
            .as_ref()
            .ok_or_else(|| Error::internal("spill file read after removal"))?;
        let file = temp.reopen().map_err(|e| Error::io("open", temp.path(), e))?;
        Ok(RunReader {
            reader: BufReader::new(file),
            path: temp.path().to_path_buf(),
            remaining: self.tuples,
        })
    }

    /// Delete the file from disk
    pub fn remove(mut self) -> Result<()> {
        self.remove_inner()
    }

    fn remove_inner(&mut self) -> Result<()> {
        match self.temp.take() {
            Some(temp) => {
                let path = temp.path().to_path_buf();
                temp.close().map_err(|e| Error::io("delete", path, e))
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SpillFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillFile")
            .field("path", &self.path())
            .field("tuples", &self.tuples)
            .finish()
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove_inner() {
            tracing::warn!(error = %e, "failed to remove spill file on drop");
        }
    }
}

/// Remove every file in `files`, reporting the first failure after trying all
pub fn remove_all(files: impl IntoIterator<Item = SpillFile>) -> Result<()> {
    let mut first_err = None;
    for file in files {
        if let Err(e) = file.remove() {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Sequential page reader over one spill file
pub struct RunReader {
    reader: BufReader<File>,
    path: PathBuf,
    remaining: usize,
}

impl RunReader {
    /// Read the next tuple, or `None` at the end of the run
    pub fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match decode_tuple(&mut self.reader).map_err(|e| Error::io("read", &self.path, e))? {
            Some(tuple) => {
                self.remaining -= 1;
                Ok(Some(tuple))
            }
            None => Err(Error::io(
                "read",
                &self.path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("run ended with {} tuples missing", self.remaining),
                ),
            )),
        }
    }

    /// Read up to `capacity` tuples, one page worth; empty at the end of the run
    pub fn read_page(&mut self, capacity: usize) -> Result<Vec<Tuple>> {
        let mut page = Vec::with_capacity(capacity.min(self.remaining));
        while page.len() < capacity {
            match self.next_tuple()? {
                Some(tuple) => page.push(tuple),
                None => break,
            }
        }
        Ok(page)
    }

    /// Tuples not yet read
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

// =========================================================================
// Tuple codec
// =========================================================================

/// Serialize a tuple onto a byte sink
pub fn encode_tuple<W: Write>(w: &mut W, tuple: &Tuple) -> io::Result<()> {
    let columns = u16::try_from(tuple.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "tuple has too many columns"))?;
    w.write_all(&columns.to_le_bytes())?;
    for value in tuple.iter() {
        match value {
            Value::Integer(i) => {
                w.write_all(&[TAG_INTEGER])?;
                w.write_all(&i.to_le_bytes())?;
            }
            Value::Real(f) => {
                w.write_all(&[TAG_REAL])?;
                w.write_all(&f.to_le_bytes())?;
            }
            Value::Text(s) => {
                let len = u32::try_from(s.len())
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "text too long"))?;
                w.write_all(&[TAG_TEXT])?;
                w.write_all(&len.to_le_bytes())?;
                w.write_all(s.as_bytes())?;
            }
        }
    }
    Ok(())
}

/// Deserialize a tuple; `Ok(None)` on a clean end of input
pub fn decode_tuple<R: Read>(r: &mut R) -> io::Result<Option<Tuple>> {
    let mut head = [0u8; 2];
    if !read_first(r, &mut head)? {
        return Ok(None);
    }
    let columns = u16::from_le_bytes(head) as usize;
    let mut values = Vec::with_capacity(columns);
    for _ in 0..columns {
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag).map_err(truncated)?;
        let value = match tag[0] {
            TAG_INTEGER => {
                let mut buf = [0u8; 8];
                r.read_exact(&mut buf).map_err(truncated)?;
                Value::Integer(i64::from_le_bytes(buf))
            }
            TAG_REAL => {
                let mut buf = [0u8; 8];
                r.read_exact(&mut buf).map_err(truncated)?;
                Value::Real(f64::from_le_bytes(buf))
            }
            TAG_TEXT => {
                let mut len = [0u8; 4];
                r.read_exact(&mut len).map_err(truncated)?;
                let mut bytes = vec![0u8; u32::from_le_bytes(len) as usize];
                r.read_exact(&mut bytes).map_err(truncated)?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Value::Text(Arc::from(text))
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown value tag {}", other),
                ))
            }
        };
        values.push(value);
    }
    Ok(Some(Tuple::from_values(values)))
}

/// Fill `buf`, returning false if the input ended before its first byte
fn read_first<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(truncated(io::ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn truncated(e: io::Error) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        io::Error::new(io::ErrorKind::UnexpectedEof, "truncated run")
    } else {
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Tuple> {
        vec![
            Tuple::from_values(vec![Value::integer(-7), Value::text("héllo"), Value::real(2.5)]),
            Tuple::from_values(vec![Value::integer(i64::MAX), Value::text(""), Value::real(-0.0)]),
            Tuple::from_values(vec![]),
        ]
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_codec_preserves_tuples() {
        let mut buf = Vec::new();
        for t in sample() {
            encode_tuple(&mut buf, &t).unwrap();
        }
        let mut cursor = io::Cursor::new(buf);
        let mut decoded = Vec::new();
        while let Some(t) = decode_tuple(&mut cursor).unwrap() {
            decoded.push(t);
        }
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_truncated_tuple_is_an_error() {
        let mut buf = Vec::new();
        encode_tuple(&mut buf, &sample()[0]).unwrap();
        buf.truncate(buf.len() - 3);
        let err = decode_tuple(&mut io::Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(err.to_string(), "truncated run");
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let buf = vec![1u8, 0, 9];
        let err = decode_tuple(&mut io::Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_pages_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let space = SpillSpace::new(dir.path(), "sort");
        let mut writer = space.create("p0-r0").unwrap();
        for i in 0..10 {
            writer.write(&Tuple::from_values(vec![Value::integer(i)])).unwrap();
        }
        let file = writer.finish().unwrap();
        assert_eq!(file.len(), 10);
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("sort-{}-p0-r0-", space.instance())));

        let mut reader = file.reader().unwrap();
        assert_eq!(reader.read_page(4).unwrap().len(), 4);
        assert_eq!(reader.read_page(4).unwrap().len(), 4);
        let last = reader.read_page(4).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[1][0], Value::integer(9));
        assert!(reader.read_page(4).unwrap().is_empty());

        assert_eq!(files_in(dir.path()), 1);
        file.remove().unwrap();
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn test_instances_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = SpillSpace::new(dir.path(), "bnlj");
        let b = SpillSpace::new(dir.path(), "bnlj");
        assert_ne!(a.instance(), b.instance());
        let fa = a.create("right").unwrap().finish().unwrap();
        let fb = b.create("right").unwrap().finish().unwrap();
        assert_ne!(fa.path(), fb.path());
        drop(fa);
        assert_eq!(files_in(dir.path()), 1);
        remove_all(vec![fb]).unwrap();
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn test_missing_dir_reports_create() {
        let space = SpillSpace::new("/nonexistent/spill/dir", "sort");
        match space.create("p0-r0") {
            Err(Error::Io { operation, .. }) => assert_eq!(operation, "create"),
            other => panic!("expected create failure, got {:?}", other.map(|_| ())),
        }
    }
}
