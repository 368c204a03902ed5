//! Storage writers: batches → Parquet files per kind

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::batch::Batch;
use crate::columnar;

/// Default zstd compression level
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Destination for flushed batches.
///
/// Implementations write under `<dir>/<kind>/` and return every path
/// written. Files embed the row count in their name and must never
/// overwrite an existing file.
pub trait BatchWriter {
    fn write(
        &mut self,
        dir: &Path,
        batch: &Batch,
        name_scheme: &str,
        batch_num: usize,
        chunk_size: Option<usize>,
    ) -> io::Result<Vec<PathBuf>>;
}

/// File stem for one written part
pub fn file_stem(name_scheme: &str, batch_num: usize, part: Option<usize>, rows: usize) -> String {
    match part {
        Some(i) => format!("{name_scheme}-{batch_num}-{i}-{rows}"),
        None => format!("{name_scheme}-{batch_num}-{rows}"),
    }
}

/// First `<stem>.parquet`, `<stem>-1.parquet`, ... that does not exist yet
pub fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let path = dir.join(format!("{stem}.parquet"));
    if !path.exists() {
        return path;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}-{n}.parquet")))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

/// Buffered parquet writer with atomic tmp→rename
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a sink writing to `<final_path>.tmp`
    pub fn new(final_path: PathBuf, schema: Arc<Schema>, zstd_level: i32) -> io::Result<Self> {
        let mut tmp_name = final_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();

        let writer = ArrowWriter::try_new(file, schema, Some(props)).map_err(io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    /// Flush the footer and rename tmp → final; returns the final path
    pub fn finalize(self) -> io::Result<PathBuf> {
        self.writer.close().map_err(io::Error::other)?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(self.final_path)
    }
}

/// Writes each batch (or each chunk of it) as one zstd Parquet file
#[derive(Debug, Clone)]
pub struct ParquetWriter {
    zstd_level: i32,
}

impl ParquetWriter {
    pub fn new(zstd_level: i32) -> Self {
        Self { zstd_level }
    }

    fn write_part(&self, kind_dir: &Path, stem: &str, part: &Batch) -> io::Result<PathBuf> {
        let record_batch = columnar::to_arrow(part).map_err(io::Error::other)?;
        let mut sink = ParquetSink::new(
            unique_path(kind_dir, stem),
            record_batch.schema(),
            self.zstd_level,
        )?;
        sink.write_batch(&record_batch)?;
        let path = sink.finalize()?;
        log::info!("Saved {} {} to {}", part.len(), part.kind(), path.display());
        Ok(path)
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new(DEFAULT_ZSTD_LEVEL)
    }
}

impl BatchWriter for ParquetWriter {
    fn write(
        &mut self,
        dir: &Path,
        batch: &Batch,
        name_scheme: &str,
        batch_num: usize,
        chunk_size: Option<usize>,
    ) -> io::Result<Vec<PathBuf>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let kind_dir = dir.join(batch.kind().name());
        fs::create_dir_all(&kind_dir)?;

        match chunk_size {
            Some(size) if size < batch.len() => batch
                .split(size)
                .iter()
                .enumerate()
                .map(|(i, part)| {
                    let stem = file_stem(name_scheme, batch_num, Some(i), part.len());
                    self.write_part(&kind_dir, &stem, part)
                })
                .collect(),
            _ => {
                let stem = file_stem(name_scheme, batch_num, None, batch.len());
                Ok(vec![self.write_part(&kind_dir, &stem, batch)?])
            }
        }
    }
}

/// Check if a completed parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    parquet::file::reader::SerializedFileReader::new(file).is_ok()
}

/// Remove stale .tmp files under `dir`, descending into subdirectories.
///
/// Symlinks are never followed nor removed. Returns the number of files
/// removed.
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_symlink() {
            log::debug!("Not following symlink {}", path.display());
        } else if file_type.is_dir() {
            removed += cleanup_tmp_files(&path)?;
        } else if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
