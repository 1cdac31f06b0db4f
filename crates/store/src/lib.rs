//! Name-keyed stores of append-only binary files, with random-access read
//! views. Two backends: buffered file I/O and chunked memory mapping.
//!
//! All on-disk primitives are little-endian; variable-length integers use
//! 7-bit groups with MSB continuation, low group first.

mod directory;
mod error;
mod fs_directory;
mod input;
mod lock;
mod mmap_directory;
mod output;

pub use directory::{
    Directory,
    IoContext,
};
pub use error::{
    Error,
    Result,
};
pub use fs_directory::FsDirectory;
pub use input::{
    BytesInput,
    IndexInput,
};
pub use lock::DirectoryLock;
pub use mmap_directory::{
    MmapDirectory,
    DEFAULT_CHUNK_POWER_32,
    DEFAULT_CHUNK_POWER_64,
};
pub use output::{
    write_vint_to,
    write_vlong_to,
    FsIndexOutput,
    IndexOutput,
};
