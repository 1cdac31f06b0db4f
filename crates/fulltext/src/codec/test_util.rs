use std::sync::Arc;

use parking_lot::Mutex;
use store::IndexOutput;

/// In-memory `IndexOutput` capturing everything written, for codec tests.
pub struct CapturingOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
    crc: crc32fast::Hasher,
}

impl CapturingOutput {
    pub fn new() -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Vec::new())),
            crc: crc32fast::Hasher::new(),
        }
    }

    pub fn shared() -> Self {
        Self::new()
    }

    /// Shared view of the written bytes, usable after the output is closed.
    pub fn handle(&self) -> Arc<Mutex<Vec<u8>>> {
        self.bytes.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl IndexOutput for CapturingOutput {
    fn write_byte(&mut self, b: u8) -> store::Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> store::Result<()> {
        self.bytes.lock().extend_from_slice(buf);
        self.crc.update(buf);
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.bytes.lock().len() as u64
    }

    fn checksum(&self) -> u32 {
        self.crc.clone().finalize()
    }

    fn name(&self) -> &str {
        "capture"
    }

    fn close(&mut self) -> store::Result<()> {
        Ok(())
    }
}
