use bitpacking::{
    BitPacker,
    BitPacker4x,
};
use store::{
    IndexInput,
    IndexOutput,
};

use crate::error::Result;

/// Entries per packed block; also the skip-entry granularity of the
/// postings stream.
pub const BLOCK_SIZE: usize = BitPacker4x::BLOCK_LEN;

/// Packs a full block: one byte of bit width, then `BLOCK_SIZE` values at
/// that width.
pub fn write_block(out: &mut dyn IndexOutput, values: &[u32; BLOCK_SIZE]) -> Result<()> {
    let packer = BitPacker4x::new();
    let num_bits = packer.num_bits(values);
    out.write_byte(num_bits)?;
    if num_bits > 0 {
        let mut buf = vec![0u8; BLOCK_SIZE * 4];
        let written = packer.compress(values, &mut buf, num_bits);
        out.write_bytes(&buf[..written])?;
    }
    Ok(())
}

pub fn read_block(input: &mut dyn IndexInput, values: &mut [u32; BLOCK_SIZE]) -> Result<()> {
    let num_bits = input.read_byte()?;
    if num_bits == 0 {
        values.fill(0);
        return Ok(());
    }
    let packed_len = packed_len(num_bits);
    let mut buf = vec![0u8; packed_len];
    input.read_bytes(&mut buf)?;
    let packer = BitPacker4x::new();
    packer.decompress(&buf, values, num_bits);
    Ok(())
}

/// Skips a packed block without decoding it.
pub fn skip_block(input: &mut dyn IndexInput) -> Result<()> {
    let num_bits = input.read_byte()?;
    if num_bits > 0 {
        input.skip_bytes(packed_len(num_bits) as u64)?;
    }
    Ok(())
}

fn packed_len(num_bits: u8) -> usize {
    BLOCK_SIZE * num_bits as usize / 8
}
