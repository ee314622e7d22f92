use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::external_sort::chunk::SortedChunk;
use crate::external_sort::codec::SpillCodec;
use crate::external_sort::error::{Result, SortError, SpillOp};

/// Source of temporary storage for spilled chunks.
///
/// Every `open` must return a resource no other call shares. `close` is
/// called exactly once per opened resource.
pub trait SpillProvider {
    type Resource: Read + Write + Seek;

    fn open(&self) -> io::Result<Self::Resource>;

    fn close(&self, resource: Self::Resource) -> io::Result<()> {
        drop(resource);
        Ok(())
    }
}

/// Anonymous temporary files, removed by the OS once closed.
#[derive(Debug, Clone, Default)]
pub struct TempFileProvider {
    directory: Option<PathBuf>,
}

impl TempFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }
}

impl SpillProvider for TempFileProvider {
    type Resource = File;

    fn open(&self) -> io::Result<File> {
        match &self.directory {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                tempfile::tempfile_in(dir)
            }
            None => tempfile::tempfile(),
        }
    }
}

/// One sorted chunk persisted to a spill resource.
///
/// The resource goes back to its provider as soon as the last record has
/// been read, or when this value is dropped, whichever comes first.
pub struct SpillFile<'p, P: SpillProvider> {
    provider: &'p P,
    reader: Option<BufReader<P::Resource>>,
    records: usize,
    bytes: u64,
}

impl<'p, P: SpillProvider> SpillFile<'p, P> {
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next record in sorted order. Reaching the end releases the resource.
    pub fn read_next<T, C: SpillCodec<T>>(&mut self, codec: &C) -> Result<Option<T>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        match codec
            .read_record(reader)
            .map_err(SortError::spill(SpillOp::Read))?
        {
            Some(record) => Ok(Some(record)),
            None => {
                self.release()?;
                Ok(None)
            }
        }
    }

    pub fn release(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            self.provider
                .close(reader.into_inner())
                .map_err(SortError::spill(SpillOp::Close))?;
        }
        Ok(())
    }
}

impl<P: SpillProvider> Drop for SpillFile<'_, P> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            if let Err(e) = self.provider.close(reader.into_inner()) {
                warn!("Failed to close spilled chunk: {}", e);
            }
        }
    }
}

/// Writes a sorted chunk to a freshly opened resource and rewinds it for
/// reading. The resource is closed again if anything fails.
pub fn spill_chunk<'p, K, T, P, C>(
    provider: &'p P,
    codec: &C,
    chunk: SortedChunk<K, T>,
    io_buffer_size: usize,
) -> Result<SpillFile<'p, P>>
where
    P: SpillProvider,
    C: SpillCodec<T>,
{
    let mut resource = provider.open().map_err(SortError::spill(SpillOp::Open))?;
    let records = chunk.len();

    match write_sorted(&mut resource, codec, &chunk, io_buffer_size) {
        Ok(bytes) => Ok(SpillFile {
            provider,
            reader: Some(BufReader::with_capacity(io_buffer_size, resource)),
            records,
            bytes,
        }),
        Err(e) => {
            if let Err(close_err) = provider.close(resource) {
                warn!("Failed to close spill resource after write error: {}", close_err);
            }
            Err(e)
        }
    }
}

fn write_sorted<R, K, T, C>(
    resource: &mut R,
    codec: &C,
    chunk: &SortedChunk<K, T>,
    io_buffer_size: usize,
) -> Result<u64>
where
    R: Write + Seek,
    C: SpillCodec<T>,
{
    {
        let mut writer = BufWriter::with_capacity(io_buffer_size, &mut *resource);
        for (_, record) in chunk {
            codec
                .write_record(&mut writer, record)
                .map_err(SortError::spill(SpillOp::Write))?;
        }
        writer.flush().map_err(SortError::spill(SpillOp::Write))?;
    }

    let bytes = resource
        .stream_position()
        .map_err(SortError::spill(SpillOp::Write))?;
    resource
        .seek(SeekFrom::Start(0))
        .map_err(SortError::spill(SpillOp::Rewind))?;
    Ok(bytes)
}
