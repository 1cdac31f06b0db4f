use std::{
    fs::{
        self,
        File,
        OpenOptions,
    },
    io,
    os::unix::fs::FileExt,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            Ordering,
        },
        Arc,
    },
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
    input::IndexInput,
    lock::DirectoryLock,
    output::{
        FsIndexOutput,
        IndexOutput,
    },
};

const BUFFER_SIZE: usize = 8 * 1024;

/// Directory backed by buffered OS file I/O.
pub struct FsDirectory {
    root: PathBuf,
    closed: AtomicBool,
    temp_counter: AtomicU64,
}

impl FsDirectory {
    /// Opens (creating if needed) the directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::io(root.display().to_string(), e))?;
        if !root.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root,
            closed: AtomicBool::new(false),
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::AlreadyClosed(self.root.display().to_string()));
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// fsync on the directory itself, required on some filesystems for
    /// renames and file creations to become durable.
    fn sync_dir(&self) -> Result<()> {
        let dir = File::open(&self.root).map_err(|e| Error::io(self.root.display().to_string(), e))?;
        dir.sync_all()
            .map_err(|e| Error::io(self.root.display().to_string(), e))
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut names = Vec::new();
        let entries =
            fs::read_dir(&self.root).map_err(|e| Error::io(self.root.display().to_string(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(self.root.display().to_string(), e))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.resolve(name).is_file()
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        let meta = fs::metadata(self.resolve(name)).map_err(|e| Error::from_io(name, e))?;
        Ok(meta.len())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        fs::remove_file(self.resolve(name)).map_err(|e| Error::from_io(name, e))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.resolve(name))
            .map_err(|e| Error::io(name, e))?;
        Ok(Box::new(FsIndexOutput::new(name.to_string(), file)))
    }

    fn create_temp_output(&self, prefix: &str, suffix: &str) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        loop {
            let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
            let name = format!("{prefix}_{n}.{suffix}.tmp");
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.resolve(&name))
            {
                Ok(file) => return Ok(Box::new(FsIndexOutput::new(name, file))),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Error::io(name, e)),
            }
        }
    }

    fn open_input(&self, name: &str, _context: IoContext) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let file = File::open(self.resolve(name)).map_err(|e| Error::from_io(name, e))?;
        let length = file
            .metadata()
            .map_err(|e| Error::io(name, e))?
            .len();
        Ok(Box::new(FsIndexInput {
            description: name.to_string(),
            file: Arc::new(file),
            offset: 0,
            length,
            pos: 0,
            buffer: Vec::new(),
            buffer_start: 0,
        }))
    }

    fn rename(&self, source: &str, dest: &str) -> Result<()> {
        self.ensure_open()?;
        fs::rename(self.resolve(source), self.resolve(dest))
            .map_err(|e| Error::from_io(source, e))?;
        self.sync_dir()
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        self.ensure_open()?;
        for name in names {
            let file = File::open(self.resolve(name)).map_err(|e| Error::from_io(name, e))?;
            file.sync_all().map_err(|e| Error::io(name.as_str(), e))?;
        }
        Ok(())
    }

    fn sync_metadata(&self) -> Result<()> {
        self.ensure_open()?;
        self.sync_dir()
    }

    fn obtain_lock(&self, name: &str) -> Result<DirectoryLock> {
        self.ensure_open()?;
        DirectoryLock::obtain(&self.resolve(name))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Buffered random-access input over a file. Clones share the open file
/// through positional reads; cursor and buffer state are per-clone.
struct FsIndexInput {
    description: String,
    file: Arc<File>,
    /// Absolute start of this view within the file.
    offset: u64,
    length: u64,
    /// Position relative to `offset`.
    pos: u64,
    buffer: Vec<u8>,
    /// Position (relative to `offset`) of `buffer[0]`.
    buffer_start: u64,
}

impl FsIndexInput {
    fn buffered(&self) -> Option<&[u8]> {
        let end = self.buffer_start + self.buffer.len() as u64;
        if self.pos >= self.buffer_start && self.pos < end {
            Some(&self.buffer[(self.pos - self.buffer_start) as usize..])
        } else {
            None
        }
    }

    fn refill(&mut self) -> Result<()> {
        let want = BUFFER_SIZE.min((self.length - self.pos) as usize);
        if want == 0 {
            return Err(Error::Eof(self.description.clone()));
        }
        self.buffer.resize(want, 0);
        self.file
            .read_exact_at(&mut self.buffer, self.offset + self.pos)
            .map_err(|e| Error::io(self.description.as_str(), e))?;
        self.buffer_start = self.pos;
        Ok(())
    }
}

impl IndexInput for FsIndexInput {
    fn read_byte(&mut self) -> Result<u8> {
        if self.pos >= self.length {
            return Err(Error::Eof(self.description.clone()));
        }
        if self.buffered().is_none() {
            self.refill()?;
        }
        let b = self.buffered().expect("buffer was just refilled")[0];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.pos + buf.len() as u64 > self.length {
            return Err(Error::Eof(self.description.clone()));
        }
        if let Some(buffered) = self.buffered() {
            if buffered.len() >= buf.len() {
                buf.copy_from_slice(&buffered[..buf.len()]);
                self.pos += buf.len() as u64;
                return Ok(());
            }
        }
        if buf.len() >= BUFFER_SIZE {
            // Large reads bypass the buffer.
            self.file
                .read_exact_at(buf, self.offset + self.pos)
                .map_err(|e| Error::io(self.description.as_str(), e))?;
            self.pos += buf.len() as u64;
            return Ok(());
        }
        let mut filled = 0;
        while filled < buf.len() {
            if self.buffered().is_none() {
                self.refill()?;
            }
            let buffered = self.buffered().expect("buffer was just refilled");
            let n = buffered.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&buffered[..n]);
            filled += n;
            self.pos += n as u64;
        }
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.length {
            return Err(Error::io(
                format!("seek past EOF in {}", self.description),
                io::Error::new(io::ErrorKind::InvalidInput, "seek past EOF"),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        Box::new(FsIndexInput {
            description: self.description.clone(),
            file: self.file.clone(),
            offset: self.offset,
            length: self.length,
            pos: self.pos,
            buffer: Vec::new(),
            buffer_start: 0,
        })
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Box<dyn IndexInput> {
        assert!(
            offset + length <= self.length,
            "slice [{offset}, {offset}+{length}) out of bounds of {} (len {})",
            self.description,
            self.length
        );
        Box::new(FsIndexInput {
            description: description.to_string(),
            file: self.file.clone(),
            offset: self.offset + offset,
            length,
            pos: 0,
            buffer: Vec::new(),
            buffer_start: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_dir() -> (tempfile::TempDir, FsDirectory) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        (tmp, dir)
    }

    #[test]
    fn test_create_write_read_roundtrip() {
        let (_tmp, dir) = new_dir();
        let mut out = dir.create_output("data.bin").unwrap();
        out.write_u32(0xdead_beef).unwrap();
        out.write_vint(16384).unwrap();
        out.write_string("quick brown fox").unwrap();
        out.close().unwrap();

        let mut input = dir.open_input("data.bin", IoContext::Default).unwrap();
        assert_eq!(input.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(input.read_vint().unwrap(), 16384);
        assert_eq!(input.read_string().unwrap(), "quick brown fox");
        assert_eq!(input.file_pointer(), input.len());
        assert!(matches!(input.read_byte(), Err(Error::Eof(_))));
    }

    #[test]
    fn test_open_input_missing_file() {
        let (_tmp, dir) = new_dir();
        match dir.open_input("nope.bin", IoContext::Default) {
            Err(Error::FileNotFound(name)) => assert_eq!(name, "nope.bin"),
            Err(other) => panic!("expected FileNotFound, got {other:?}"),
            Ok(_) => panic!("open_input on a missing file succeeded"),
        }
    }

    #[test]
    fn test_clone_has_independent_position() {
        let (_tmp, dir) = new_dir();
        let mut out = dir.create_output("clone.bin").unwrap();
        for i in 0..1000u32 {
            out.write_u32(i).unwrap();
        }
        out.close().unwrap();

        let mut a = dir.open_input("clone.bin", IoContext::Default).unwrap();
        assert_eq!(a.read_u32().unwrap(), 0);
        let mut b = a.clone_input();
        assert_eq!(b.read_u32().unwrap(), 1);
        assert_eq!(b.read_u32().unwrap(), 2);
        assert_eq!(a.read_u32().unwrap(), 1);
        b.seek(4 * 999).unwrap();
        assert_eq!(b.read_u32().unwrap(), 999);
    }

    #[test]
    fn test_slice_reads_subrange() {
        let (_tmp, dir) = new_dir();
        let mut out = dir.create_output("slice.bin").unwrap();
        let payload: Vec<u8> = (0..=255).collect();
        out.write_bytes(&payload).unwrap();
        out.close().unwrap();

        let input = dir.open_input("slice.bin", IoContext::Default).unwrap();
        let mut slice = input.slice("mid", 100, 50);
        assert_eq!(slice.len(), 50);
        assert_eq!(slice.read_byte().unwrap(), 100);
        slice.seek(49).unwrap();
        assert_eq!(slice.read_byte().unwrap(), 149);
        assert!(matches!(slice.read_byte(), Err(Error::Eof(_))));
    }

    #[test]
    fn test_rename_replaces_destination() {
        let (_tmp, dir) = new_dir();
        let mut out = dir.create_output("a").unwrap();
        out.write_string("new contents").unwrap();
        out.close().unwrap();
        let mut old = dir.create_output("b").unwrap();
        old.write_string("old contents").unwrap();
        old.close().unwrap();

        dir.rename("a", "b").unwrap();
        assert!(!dir.file_exists("a"));
        let mut input = dir.open_input("b", IoContext::Default).unwrap();
        assert_eq!(input.read_string().unwrap(), "new contents");
    }

    #[test]
    fn test_lock_is_exclusive() {
        let (_tmp, dir) = new_dir();
        let lock = dir.obtain_lock("write.lock").unwrap();
        match dir.obtain_lock("write.lock") {
            Err(Error::LockObtainFailed(_)) => {},
            Err(other) => panic!("expected LockObtainFailed, got {other:?}"),
            Ok(_) => panic!("lock was acquired twice"),
        }
        drop(lock);
        dir.obtain_lock("write.lock").unwrap();
    }

    #[test]
    fn test_closed_directory_rejects_operations() {
        let (_tmp, dir) = new_dir();
        dir.close().unwrap();
        assert!(matches!(dir.list_all(), Err(Error::AlreadyClosed(_))));
        assert!(matches!(
            dir.create_output("x"),
            Err(Error::AlreadyClosed(_))
        ));
    }
}
