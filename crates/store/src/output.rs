use std::{
    fs::File,
    io::{
        BufWriter,
        Write,
    },
};

use crate::error::{
    Error,
    Result,
};

/// Write-only, forward-only stream into a directory file.
///
/// All multi-byte primitives are little-endian. The stream keeps a running
/// CRC-32 of every byte written so codec files can close with a checksum
/// footer. Durability is the directory's job: `close` flushes buffers but
/// does not fsync.
pub trait IndexOutput: Send {
    fn write_byte(&mut self, b: u8) -> Result<()>;

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Number of bytes written so far.
    fn file_pointer(&self) -> u64;

    /// CRC-32 of all bytes written so far.
    fn checksum(&self) -> u32;

    fn name(&self) -> &str;

    /// Flushes and releases the underlying file handle. Writing after
    /// `close` is an `AlreadyClosed` error. Dropping without closing
    /// flushes on a best-effort basis.
    fn close(&mut self) -> Result<()>;

    fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_u32(v.to_bits())
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_u64(v as u64)
    }

    /// Variable-length u32: 7 data bits per byte, low group first, high bit
    /// set on all but the final byte. At most 5 bytes.
    fn write_vint(&mut self, mut v: u32) -> Result<()> {
        while v >= 0x80 {
            self.write_byte((v as u8 & 0x7f) | 0x80)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    /// Variable-length u64, same scheme. At most 10 bytes.
    fn write_vlong(&mut self, mut v: u64) -> Result<()> {
        while v >= 0x80 {
            self.write_byte((v as u8 & 0x7f) | 0x80)?;
            v >>= 7;
        }
        self.write_byte(v as u8)
    }

    /// A vint length followed by the UTF-8 bytes.
    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_vint(s.len() as u32)?;
        self.write_bytes(s.as_bytes())
    }
}

/// Appends a vint to a plain byte buffer. Used where postings are staged in
/// memory before they reach an output.
pub fn write_vint_to(buf: &mut Vec<u8>, mut v: u32) {
    while v >= 0x80 {
        buf.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

pub fn write_vlong_to(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Buffered file-backed `IndexOutput`.
pub struct FsIndexOutput {
    name: String,
    writer: Option<BufWriter<File>>,
    pos: u64,
    crc: crc32fast::Hasher,
}

impl FsIndexOutput {
    pub(crate) fn new(name: String, file: File) -> Self {
        Self {
            name,
            writer: Some(BufWriter::with_capacity(8 * 1024, file)),
            pos: 0,
            crc: crc32fast::Hasher::new(),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::AlreadyClosed(self.name.clone()))
    }
}

impl IndexOutput for FsIndexOutput {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let name = self.name.clone();
        self.writer()?
            .write_all(buf)
            .map_err(|e| Error::io(&name, e))?;
        self.crc.update(buf);
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.pos
    }

    fn checksum(&self) -> u32 {
        self.crc.clone().finalize()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| Error::io(&self.name, e))?;
        }
        Ok(())
    }
}

impl Drop for FsIndexOutput {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::input::{
        BytesInput,
        IndexInput,
    };

    proptest! {
        #[test]
        fn test_vint_roundtrip(v in 0u32..=u32::MAX) {
            let mut buf = Vec::new();
            write_vint_to(&mut buf, v);
            prop_assert!(buf.len() <= 5);
            let mut input = BytesInput::new(buf, "vint");
            prop_assert_eq!(input.read_vint().unwrap(), v);
        }

        #[test]
        fn test_vlong_roundtrip(v in 0u64..(1u64 << 63)) {
            let mut buf = Vec::new();
            write_vlong_to(&mut buf, v);
            prop_assert!(buf.len() <= 9);
            let mut input = BytesInput::new(buf, "vlong");
            prop_assert_eq!(input.read_vlong().unwrap(), v);
        }
    }
}
