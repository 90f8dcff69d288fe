//! Block payload codecs.
//!
//! A block names its compressor by the numeric id recorded in its header
//! (see [`crate::format::compress`]).  This build decodes `none`, `lzma`
//! (xz container), `lz4` (raw block) and `zstd`.  Any other id, and every
//! encrypted block, is reported as [`CodecError::Unsupported`]; the caller
//! decides whether that ends the extraction or just this file.

use std::io::Cursor;

use thiserror::Error;

use crate::format::{compress, encrypt};
use crate::reader::{BlockDescriptor, ChecksumStatus};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("{what} algorithm {id} is not supported by this build")]
    Unsupported { what: &'static str, id: u16 },
    #[error("block was skipped, no payload to decode")]
    NoPayload,
    #[error("decoded {found} bytes, block header announced {expected}")]
    SizeMismatch { expected: usize, found: usize },
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn id(&self) -> u16;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    /// `expected_size` is the uncompressed size from the block header.
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn id(&self) -> u16 { compress::NONE }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], _: usize) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn id(&self) -> u16 { compress::ZSTD }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], _: usize) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

/// Raw LZ4 block, no frame and no size prefix.
pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn id(&self) -> u16 { compress::LZ4 }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::block::compress(data))
    }
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        lz4_flex::block::decompress(data, expected_size)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

/// LZMA2 in an xz container.
pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn id(&self) -> u16 { compress::LZMA }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::xz_compress(&mut Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(expected_size);
        lzma_rs::xz_decompress(&mut Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a compression id to a built-in codec.
pub fn get_codec(id: u16) -> Result<Box<dyn Codec>, CodecError> {
    match id {
        compress::NONE => Ok(Box::new(NoneCodec)),
        compress::ZSTD => Ok(Box::new(ZstdCodec)),
        compress::LZ4  => Ok(Box::new(Lz4Codec)),
        compress::LZMA => Ok(Box::new(LzmaCodec)),
        _ => Err(CodecError::Unsupported { what: "compression", id }),
    }
}

// ── Block decoding ───────────────────────────────────────────────────────────

/// Turn a block's stored bytes back into its original content.
///
/// A block whose checksum failed already carries a zero-filled placeholder of
/// the right size, which is returned as is.
pub fn decode_block(block: &BlockDescriptor) -> Result<Vec<u8>, CodecError> {
    let payload = block.payload.as_deref().ok_or(CodecError::NoPayload)?;
    if block.checksum_verified == ChecksumStatus::Failed {
        return Ok(payload.to_vec());
    }
    if block.encryption_algorithm != encrypt::NONE {
        return Err(CodecError::Unsupported {
            what: "encryption",
            id:   block.encryption_algorithm,
        });
    }

    let expected = block.uncompressed_size as usize;
    let out = get_codec(block.compression_algorithm)?.decompress(payload, expected)?;
    if out.len() != expected {
        return Err(CodecError::SizeMismatch { expected, found: out.len() });
    }
    Ok(out)
}

/// Decode many blocks, one result per block in input order.
///
/// Uses rayon with the `parallel` feature, a plain loop otherwise.
pub fn decode_blocks_parallel(blocks: &[BlockDescriptor]) -> Vec<Result<Vec<u8>, CodecError>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        blocks.par_iter().map(decode_block).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        blocks.iter().map(decode_block).collect()
    }
}
