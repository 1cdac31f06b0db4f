use std::io::Read;

use byteorder::{
    LittleEndian,
    ReadBytesExt,
};
use store::{
    Directory,
    IndexInput,
    IndexOutput,
    IoContext,
};

use crate::error::{
    Error,
    Result,
};

/// Magic opening every codec file and the commit manifest.
pub const MAGIC: u32 = 0x3fd7_6c17;
/// Complement of `MAGIC`; opens the checksum footer.
pub const FOOTER_MAGIC: u32 = !MAGIC;

pub const CODEC_NAME: &str = "Lucene104";
pub const FORMAT_VERSION_MIN: u32 = 1;
pub const FORMAT_VERSION_CURRENT: u32 = 1;

/// `magic`, codec-name string, format version.
pub fn write_header(out: &mut dyn IndexOutput, codec: &str, version: u32) -> Result<()> {
    out.write_u32(MAGIC)?;
    out.write_string(codec)?;
    out.write_u32(version)?;
    Ok(())
}

/// Footer magic then the CRC-32 of every preceding byte, footer magic
/// included.
pub fn write_footer(out: &mut dyn IndexOutput) -> Result<()> {
    out.write_u32(FOOTER_MAGIC)?;
    let crc = out.checksum();
    out.write_u32(crc)?;
    Ok(())
}

pub const FOOTER_LEN: u64 = 8;

/// Reads a whole file, verifies the checksum footer, and returns the bytes
/// between header start and footer. Used for the small whole-file formats
/// (manifest, `.si`, `.fnm`, `.liv`, metadata files).
pub fn read_checksummed_file(directory: &dyn Directory, name: &str) -> Result<Vec<u8>> {
    let mut input = directory.open_input(name, IoContext::ReadOnce)?;
    verify_footer(input.as_mut(), name)
}

/// Verifies the footer of `input` from the start and returns the payload
/// bytes preceding it.
pub fn verify_footer(input: &mut dyn IndexInput, name: &str) -> Result<Vec<u8>> {
    let len = input.len();
    if len < FOOTER_LEN {
        return Err(Error::corrupt(format!(
            "{name}: file too short for footer ({len} bytes)"
        )));
    }
    input.seek(0)?;
    let mut bytes = vec![0u8; len as usize];
    input.read_bytes(&mut bytes)?;

    let crc_start = (len - 4) as usize;
    let stored_crc = u32::from_le_bytes(bytes[crc_start..].try_into().expect("4 bytes"));
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[..crc_start]);
    let actual = hasher.finalize();
    if actual != stored_crc {
        return Err(Error::corrupt(format!(
            "{name}: checksum mismatch (stored {stored_crc:#010x}, actual {actual:#010x})"
        )));
    }

    let magic_start = (len - FOOTER_LEN) as usize;
    let footer_magic =
        u32::from_le_bytes(bytes[magic_start..crc_start].try_into().expect("4 bytes"));
    if footer_magic != FOOTER_MAGIC {
        return Err(Error::corrupt(format!(
            "{name}: bad footer magic {footer_magic:#010x}"
        )));
    }

    bytes.truncate(magic_start);
    Ok(bytes)
}

/// Little-endian reader over an in-memory payload, mirroring the
/// `IndexInput` primitives for whole-file parsing.
pub struct BytesReader<'a> {
    cursor: std::io::Cursor<&'a [u8]>,
    name: &'a str,
}

impl<'a> BytesReader<'a> {
    pub fn new(bytes: &'a [u8], name: &'a str) -> Self {
        Self {
            cursor: std::io::Cursor::new(bytes),
            name,
        }
    }

    fn eof(&self) -> Error {
        Error::corrupt(format!("{}: truncated", self.name))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.eof())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.eof())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.eof())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.cursor
            .read_i64::<LittleEndian>()
            .map_err(|_| self.eof())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.cursor
            .read_f32::<LittleEndian>()
            .map_err(|_| self.eof())
    }

    pub fn read_vint(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let b = self.read_u8()?;
            value |= u32::from(b & 0x7f) << shift.min(31);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::corrupt(format!("{}: vint too long", self.name)))
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let b = self.read_u8()?;
            value |= u64::from(b & 0x7f) << shift.min(63);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::corrupt(format!("{}: vlong too long", self.name)))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()? as usize;
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| self.eof())?;
        String::from_utf8(buf)
            .map_err(|e| Error::corrupt(format!("{}: invalid UTF-8: {e}", self.name)))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| self.eof())?;
        Ok(buf)
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len() - self.cursor.position() as usize
    }

    /// Checks the standard header and returns the format version.
    pub fn check_header(&mut self, expected_codec: &str) -> Result<u32> {
        let magic = self.read_u32()?;
        if magic != MAGIC {
            return Err(Error::corrupt(format!(
                "{}: bad magic {magic:#010x}",
                self.name
            )));
        }
        let codec = self.read_string()?;
        if codec != expected_codec {
            return Err(Error::corrupt(format!(
                "{}: codec mismatch, expected {expected_codec}, found {codec}",
                self.name
            )));
        }
        let version = self.read_u32()?;
        if !(FORMAT_VERSION_MIN..=FORMAT_VERSION_CURRENT).contains(&version) {
            return Err(Error::corrupt(format!(
                "{}: unsupported format version {version}",
                self.name
            )));
        }
        Ok(version)
    }
}

/// Checks the standard header on a streaming input (`.tim`, `.doc`, …) and
/// returns the format version.
pub fn check_input_header(input: &mut dyn IndexInput, name: &str, expected_codec: &str) -> Result<u32> {
    let magic = input.read_u32()?;
    if magic != MAGIC {
        return Err(Error::corrupt(format!("{name}: bad magic {magic:#010x}")));
    }
    let codec = input.read_string()?;
    if codec != expected_codec {
        return Err(Error::corrupt(format!(
            "{name}: codec mismatch, expected {expected_codec}, found {codec}"
        )));
    }
    let version = input.read_u32()?;
    if !(FORMAT_VERSION_MIN..=FORMAT_VERSION_CURRENT).contains(&version) {
        return Err(Error::corrupt(format!(
            "{name}: unsupported format version {version}"
        )));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use store::FsDirectory;

    use super::*;

    #[test]
    fn test_footer_roundtrip_and_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut out = dir.create_output("f.bin").unwrap();
        write_header(out.as_mut(), CODEC_NAME, FORMAT_VERSION_CURRENT).unwrap();
        out.write_string("payload").unwrap();
        write_footer(out.as_mut()).unwrap();
        out.close().unwrap();

        let payload = read_checksummed_file(&dir, "f.bin").unwrap();
        let mut reader = BytesReader::new(&payload, "f.bin");
        reader.check_header(CODEC_NAME).unwrap();
        assert_eq!(reader.read_string().unwrap(), "payload");
        assert_eq!(reader.remaining(), 0);

        // Flip a payload byte; the checksum must catch it.
        let mut bytes = std::fs::read(tmp.path().join("f.bin")).unwrap();
        bytes[10] ^= 0xff;
        std::fs::write(tmp.path().join("g.bin"), &bytes).unwrap();
        match read_checksummed_file(&dir, "g.bin") {
            Err(Error::CorruptIndex(msg)) => assert!(msg.contains("checksum")),
            other => panic!("expected CorruptIndex, got {other:?}"),
        }
    }

    #[test]
    fn test_header_rejects_unknown_codec() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::open(tmp.path()).unwrap();
        let mut out = dir.create_output("h.bin").unwrap();
        write_header(out.as_mut(), "SomeOtherCodec", FORMAT_VERSION_CURRENT).unwrap();
        write_footer(out.as_mut()).unwrap();
        out.close().unwrap();

        let payload = read_checksummed_file(&dir, "h.bin").unwrap();
        let mut reader = BytesReader::new(&payload, "h.bin");
        assert!(matches!(
            reader.check_header(CODEC_NAME),
            Err(Error::CorruptIndex(_))
        ));
    }
}
