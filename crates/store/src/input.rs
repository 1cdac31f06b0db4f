use crate::error::{
    Error,
    Result,
};

/// Read-only random-access view over a directory file.
///
/// All multi-byte primitives are little-endian. Positional state is
/// per-instance: `clone_input` produces an independent cursor over the same
/// underlying bytes, and clones may be handed to other threads.
pub trait IndexInput: Send {
    fn read_byte(&mut self) -> Result<u8>;

    /// Fills `buf` completely or fails with `Eof`.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Current position, in `[0, len()]`.
    fn file_pointer(&self) -> u64;

    /// Repositions the cursor. Seeking past `len()` is an `Io` error;
    /// seeking exactly to `len()` is allowed.
    fn seek(&mut self, pos: u64) -> Result<()>;

    fn len(&self) -> u64;

    /// An independent cursor over the same bytes, positioned where this
    /// one currently is.
    fn clone_input(&self) -> Box<dyn IndexInput>;

    /// A sub-view covering `[offset, offset + length)` of this input, with
    /// its own pointer starting at 0. `description` is used in errors.
    fn slice(&self, description: &str, offset: u64, length: u64) -> Box<dyn IndexInput>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn skip_bytes(&mut self, count: u64) -> Result<()> {
        let pos = self.file_pointer();
        self.seek(pos + count)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Variable-length u32: 7 data bits per byte, low group first, high bit
    /// set on all but the final byte.
    fn read_vint(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let b = self.read_byte()?;
            value |= u32::from(b & 0x7f)
                .checked_shl(shift)
                .ok_or_else(|| Error::InvalidArgument("vint too long".to_string()))?;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::InvalidArgument("vint too long".to_string()))
    }

    /// Variable-length u64, same scheme as `read_vint`.
    fn read_vlong(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let b = self.read_byte()?;
            value |= u64::from(b & 0x7f)
                .checked_shl(shift)
                .ok_or_else(|| Error::InvalidArgument("vlong too long".to_string()))?;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::InvalidArgument("vlong too long".to_string()))
    }

    /// A vint length followed by that many UTF-8 bytes.
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()? as usize;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::InvalidArgument(format!("invalid UTF-8: {e}")))
    }
}

/// An `IndexInput` over a byte buffer. The primary read path goes through
/// the directory backends; this is used for sliced in-memory payloads and
/// in tests.
pub struct BytesInput {
    bytes: std::sync::Arc<Vec<u8>>,
    offset: u64,
    length: u64,
    pos: u64,
    description: String,
}

impl BytesInput {
    pub fn new(bytes: Vec<u8>, description: impl Into<String>) -> Self {
        let length = bytes.len() as u64;
        Self {
            bytes: std::sync::Arc::new(bytes),
            offset: 0,
            length,
            pos: 0,
            description: description.into(),
        }
    }
}

impl IndexInput for BytesInput {
    fn read_byte(&mut self) -> Result<u8> {
        if self.pos >= self.length {
            return Err(Error::Eof(self.description.clone()));
        }
        let b = self.bytes[(self.offset + self.pos) as usize];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = buf.len() as u64;
        if self.pos + n > self.length {
            return Err(Error::Eof(self.description.clone()));
        }
        let start = (self.offset + self.pos) as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        self.pos += n;
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
        Box::new(BytesInput {
            bytes: self.bytes.clone(),
            offset: self.offset,
            length: self.length,
            pos: self.pos,
            description: self.description.clone(),
        })
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Box<dyn IndexInput> {
        Box::new(BytesInput {
            bytes: self.bytes.clone(),
            offset: self.offset + offset,
            length,
            pos: 0,
            description: description.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::write_vint_to;

    #[test]
    fn test_bytes_input_slice_is_independent() {
        let bytes: Vec<u8> = (0..32).collect();
        let mut input = BytesInput::new(bytes, "test");
        let mut slice = input.slice("sub", 8, 8);
        assert_eq!(slice.len(), 8);
        assert_eq!(slice.read_byte().unwrap(), 8);
        assert_eq!(input.read_byte().unwrap(), 0);
        slice.seek(7).unwrap();
        assert_eq!(slice.read_byte().unwrap(), 15);
        assert!(matches!(slice.read_byte(), Err(Error::Eof(_))));
    }

    #[test]
    fn test_vint_known_lengths() {
        // Byte lengths from the on-disk format table.
        for (value, expected_len) in [
            (0u32, 1usize),
            (1, 1),
            (127, 1),
            (128, 2),
            (16383, 2),
            (16384, 3),
            (i32::MAX as u32, 5),
        ] {
            let mut buf = Vec::new();
            write_vint_to(&mut buf, value);
            assert_eq!(buf.len(), expected_len, "vint({value})");
            let mut input = BytesInput::new(buf, "vint");
            assert_eq!(input.read_vint().unwrap(), value);
        }
    }
}
