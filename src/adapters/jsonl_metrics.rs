//! JSON Lines scalar writer.
//!
//! Each scalar becomes one line `{"tag": .., "value": .., "step": ..}` in
//! `scalars.jsonl` inside the run directory. Lines are flushed as they are
//! written so a crashed run still leaves a readable prefix.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{
    Result,
    error::Error,
    ports::{MetricsSink, ScalarRecord},
};

pub const SCALARS_FILE: &str = "scalars.jsonl";

pub struct JsonlScalarWriter {
    dir: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlScalarWriter {
    /// Create `dir` if needed and open a fresh `scalars.jsonl` in it.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| Error::Io {
            operation: format!("create metrics directory {dir:?}"),
            source,
        })?;
        let path = dir.join(SCALARS_FILE);
        let file = File::create(&path).map_err(|source| Error::Io {
            operation: format!("create file {path:?}"),
            source,
        })?;
        Ok(Self {
            dir,
            writer: BufWriter::new(file),
        })
    }

    /// Run directory this writer logs into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scalars_path(&self) -> PathBuf {
        self.dir.join(SCALARS_FILE)
    }
}

impl MetricsSink for JsonlScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: i64) -> Result<()> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        writeln!(&mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| Error::Io {
            operation: format!("flush metrics in {:?}", self.dir),
            source,
        })
    }
}

/// Read every record back from a `scalars.jsonl` file.
pub fn read_scalars<P: AsRef<Path>>(path: P) -> Result<Vec<ScalarRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
        operation: format!("read metrics file {path:?}"),
        source,
    })?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}
