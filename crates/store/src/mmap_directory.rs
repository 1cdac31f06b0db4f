use std::{
    fs::File,
    path::Path,
    sync::Arc,
};

use memmap2::{
    Mmap,
    MmapOptions,
};

use crate::{
    directory::{
        Directory,
        IoContext,
    },
    error::{
        Error,
        Result,
    },
    fs_directory::FsDirectory,
    input::IndexInput,
    lock::DirectoryLock,
    output::IndexOutput,
};

/// Default chunk size power: 16 GiB chunks on 64-bit, 256 MiB on 32-bit.
pub const DEFAULT_CHUNK_POWER_64: u32 = 34;
pub const DEFAULT_CHUNK_POWER_32: u32 = 28;

const MIN_CHUNK_POWER: u32 = 20;
const MAX_CHUNK_POWER: u32 = 40;

/// Directory that serves reads through chunked memory-mapped files.
///
/// Writes, locking and metadata go through the buffered FS backend; only
/// `open_input` differs. Each mapped file is split into power-of-two chunks
/// so 32-bit address spaces and very large files both work; a read at
/// position `p` resolves to chunk `p >> chunk_power`, offset
/// `p & (chunk_size - 1)`.
pub struct MmapDirectory {
    inner: FsDirectory,
    chunk_power: u32,
    preload: bool,
    use_fallback: bool,
}

impl MmapDirectory {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_chunk_power(path, default_chunk_power())
    }

    pub fn open_with_chunk_power(path: impl AsRef<Path>, chunk_power: u32) -> Result<Self> {
        if !(MIN_CHUNK_POWER..=MAX_CHUNK_POWER).contains(&chunk_power) {
            return Err(Error::InvalidArgument(format!(
                "chunk power {chunk_power} outside [{MIN_CHUNK_POWER}, {MAX_CHUNK_POWER}]"
            )));
        }
        Ok(Self {
            inner: FsDirectory::open(path)?,
            chunk_power,
            preload: false,
            use_fallback: false,
        })
    }

    pub fn chunk_power(&self) -> u32 {
        self.chunk_power
    }

    /// Ask the OS to populate pages eagerly on open (MADV_WILLNEED).
    pub fn set_preload(&mut self, preload: bool) {
        self.preload = preload;
    }

    /// Fall back to buffered I/O when a mapping fails, instead of
    /// surfacing the error. File-not-found never falls back.
    pub fn set_use_fallback(&mut self, use_fallback: bool) {
        self.use_fallback = use_fallback;
    }

    fn map_chunks(&self, name: &str, context: IoContext) -> Result<MmapIndexInput> {
        let length = self.inner.file_length(name)?;
        let file = File::open(self.inner.path().join(name)).map_err(|e| Error::from_io(name, e))?;
        let chunk_size = 1u64 << self.chunk_power;
        let num_chunks = length.div_ceil(chunk_size) as usize;
        let mut chunks = Vec::with_capacity(num_chunks);
        for i in 0..num_chunks {
            let offset = (i as u64) << self.chunk_power;
            let len = chunk_size.min(length - offset) as usize;
            // Safety: the mapping is read-only and the index never mutates
            // a file after it is fully written.
            let mmap = unsafe { MmapOptions::new().offset(offset).len(len).map(&file) }
                .map_err(|e| Error::io(name, e))?;
            advise(&mmap, context, self.preload);
            chunks.push(mmap);
        }
        Ok(MmapIndexInput {
            description: name.to_string(),
            chunks: Arc::new(ChunkSet {
                chunks,
                chunk_power: self.chunk_power,
            }),
            offset: 0,
            length,
            pos: 0,
        })
    }
}

#[cfg(unix)]
fn advise(mmap: &Mmap, context: IoContext, preload: bool) {
    use memmap2::Advice;
    let advice = match context {
        IoContext::Read => Advice::Random,
        IoContext::ReadOnce | IoContext::Merge => Advice::Sequential,
        IoContext::Default => Advice::Normal,
    };
    if let Err(e) = mmap.advise(advice) {
        tracing::debug!("madvise failed: {e}");
    }
    if preload {
        if let Err(e) = mmap.advise(Advice::WillNeed) {
            tracing::debug!("madvise(WILLNEED) failed: {e}");
        }
    }
}

#[cfg(not(unix))]
fn advise(_mmap: &Mmap, _context: IoContext, _preload: bool) {}

fn default_chunk_power() -> u32 {
    if cfg!(target_pointer_width = "64") {
        DEFAULT_CHUNK_POWER_64
    } else {
        DEFAULT_CHUNK_POWER_32
    }
}

impl Directory for MmapDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.inner.list_all()
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.inner.file_length(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        self.inner.create_output(name)
    }

    fn create_temp_output(&self, prefix: &str, suffix: &str) -> Result<Box<dyn IndexOutput>> {
        self.inner.create_temp_output(prefix, suffix)
    }

    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>> {
        match self.map_chunks(name, context) {
            Ok(input) => Ok(Box::new(input)),
            Err(e @ Error::FileNotFound(_)) => Err(e),
            Err(e) if self.use_fallback => {
                tracing::warn!("mmap of {name} failed, falling back to buffered reads: {e}");
                self.inner.open_input(name, context)
            },
            Err(e) => Err(e),
        }
    }

    fn rename(&self, source: &str, dest: &str) -> Result<()> {
        self.inner.rename(source, dest)
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        self.inner.sync(names)
    }

    fn sync_metadata(&self) -> Result<()> {
        self.inner.sync_metadata()
    }

    fn obtain_lock(&self, name: &str) -> Result<DirectoryLock> {
        self.inner.obtain_lock(name)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// The chunk mappings for one file. Shared (and kept alive) by every clone
/// and slice handed out for that file; the regions unmap when the last
/// reference drops.
struct ChunkSet {
    chunks: Vec<Mmap>,
    chunk_power: u32,
}

impl ChunkSet {
    /// Copies `buf.len()` bytes starting at absolute position `pos`,
    /// splitting across chunk boundaries as needed.
    fn read_at(&self, mut pos: u64, buf: &mut [u8]) {
        let chunk_mask = (1u64 << self.chunk_power) - 1;
        let mut filled = 0;
        while filled < buf.len() {
            let chunk = &self.chunks[(pos >> self.chunk_power) as usize];
            let off = (pos & chunk_mask) as usize;
            let n = (chunk.len() - off).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&chunk[off..off + n]);
            filled += n;
            pos += n as u64;
        }
    }
}

/// Zero-copy view over a chunk-mapped file.
struct MmapIndexInput {
    description: String,
    chunks: Arc<ChunkSet>,
    /// Absolute start of this view within the file.
    offset: u64,
    length: u64,
    /// Position relative to `offset`.
    pos: u64,
}

impl IndexInput for MmapIndexInput {
    fn read_byte(&mut self) -> Result<u8> {
        if self.pos >= self.length {
            return Err(Error::Eof(self.description.clone()));
        }
        let mut b = [0u8];
        self.chunks.read_at(self.offset + self.pos, &mut b);
        self.pos += 1;
        Ok(b[0])
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.pos + buf.len() as u64 > self.length {
            return Err(Error::Eof(self.description.clone()));
        }
        self.chunks.read_at(self.offset + self.pos, buf);
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length {
            return Err(Error::io(
                format!("seek past EOF in {}", self.description),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek past EOF"),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        Box::new(MmapIndexInput {
            description: self.description.clone(),
            chunks: self.chunks.clone(),
            offset: self.offset,
            length: self.length,
            pos: self.pos,
        })
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Box<dyn IndexInput> {
        assert!(
            offset + length <= self.length,
            "slice [{offset}, {offset}+{length}) out of bounds of {} (len {})",
            self.description,
            self.length
        );
        Box::new(MmapIndexInput {
            description: description.to_string(),
            chunks: self.chunks.clone(),
            offset: self.offset + offset,
            length,
            pos: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_power_validation() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            MmapDirectory::open_with_chunk_power(tmp.path(), 19),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            MmapDirectory::open_with_chunk_power(tmp.path(), 41),
            Err(Error::InvalidArgument(_))
        ));
        MmapDirectory::open_with_chunk_power(tmp.path(), 20).unwrap();
    }

    #[test]
    fn test_reads_across_chunk_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        // 1 MiB chunks; write a little over two chunks' worth.
        let dir = MmapDirectory::open_with_chunk_power(tmp.path(), 20).unwrap();
        let chunk = 1usize << 20;
        let payload: Vec<u8> = (0..(2 * chunk + 100)).map(|i| (i % 251) as u8).collect();
        let mut out = dir.create_output("big.bin").unwrap();
        out.write_bytes(&payload).unwrap();
        out.close().unwrap();

        let mut input = dir.open_input("big.bin", IoContext::Default).unwrap();
        assert_eq!(input.len(), payload.len() as u64);

        // Straddle the first chunk boundary.
        let straddle_start = chunk - 3;
        input.seek(straddle_start as u64).unwrap();
        let mut buf = [0u8; 7];
        input.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..], &payload[straddle_start..straddle_start + 7]);

        // Slice fully inside the second chunk.
        let slice_start = chunk + 17;
        let mut slice = input.slice("sub", slice_start as u64, 64);
        let mut buf = [0u8; 64];
        slice.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..], &payload[slice_start..slice_start + 64]);

        // Tail read up to EOF.
        input.seek(input.len() - 10).unwrap();
        let mut buf = [0u8; 10];
        input.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..], &payload[payload.len() - 10..]);
        assert!(matches!(input.read_byte(), Err(Error::Eof(_))));
    }

    #[test]
    fn test_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = MmapDirectory::open(tmp.path()).unwrap();
        let mut out = dir.create_output("empty.bin").unwrap();
        out.close().unwrap();
        let mut input = dir.open_input("empty.bin", IoContext::Default).unwrap();
        assert_eq!(input.len(), 0);
        assert!(matches!(input.read_byte(), Err(Error::Eof(_))));
    }
}
