use std::io::{Read, Seek};

use log::warn;
use serde::Serialize;

use super::{alloc_buffer, ArchiveReader};
use crate::checksum::fletcher32;
use crate::dico::{DicoError, Dictionary};
use crate::error::{ArchiveError, RecordKind, Result};
use crate::format::{blockhead_key, FSA_MAX_BLKSIZE};

/// Outcome of the payload checksum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChecksumStatus {
    /// Not compared (block skipped or verification disabled).
    Unknown,
    Ok,
    /// Mismatch; the payload is a zero-filled placeholder.
    Failed,
}

/// One decoded data block, ready for a decompressor.
///
/// Fully owned: it holds no reference into the reader and may be moved to
/// another thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Offset of the block's content within its source file.
    pub stream_offset:         u64,
    pub uncompressed_size:     u32,
    /// Bytes the block occupies in the archive.
    pub stored_size:           u32,
    /// Size after compression, before encryption.
    pub compressed_size:       u32,
    pub compression_algorithm: u16,
    pub encryption_algorithm:  u16,
    pub stored_checksum:       u32,
    pub checksum_verified:     ChecksumStatus,
    /// Stored bytes, a zero-filled placeholder of `uncompressed_size`
    /// bytes, or `None` for a skipped block.
    pub payload:               Option<Vec<u8>>,
}

fn field<T>(res: std::result::Result<T, DicoError>, field: &'static str) -> Result<T> {
    res.map_err(|source| ArchiveError::MissingField {
        record: RecordKind::BlockHeader,
        field,
        source,
    })
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Decode the payload that follows a block header.
    ///
    /// With `skip` the payload is stepped over without being read.  A
    /// payload whose checksum does not match is replaced by zeros and the
    /// cursor is put back at its first byte, so the next tolerant header read
    /// searches the damaged region for the following record.
    pub fn read_block(&mut self, dico: &Dictionary, skip: bool) -> Result<BlockDescriptor> {
        let stream_offset = field(dico.get_u64(0, blockhead_key::BLOCKOFFSET), "BLOCKOFFSET")?;
        let uncompressed_size = field(dico.get_u32(0, blockhead_key::REALSIZE), "REALSIZE")?;
        if uncompressed_size > FSA_MAX_BLKSIZE {
            return Err(ArchiveError::BlockTooLarge {
                size: uncompressed_size,
                max:  FSA_MAX_BLKSIZE,
            });
        }
        let compression_algorithm = field(dico.get_u16(0, blockhead_key::COMPRESSALGO), "COMPRESSALGO")?;
        let encryption_algorithm  = field(dico.get_u16(0, blockhead_key::ENCRYPTALGO), "ENCRYPTALGO")?;
        let stored_size     = field(dico.get_u32(0, blockhead_key::ARSIZE), "ARSIZE")?;
        let compressed_size = field(dico.get_u32(0, blockhead_key::COMPSIZE), "COMPSIZE")?;
        let stored_checksum = field(dico.get_u32(0, blockhead_key::ARCSUM), "ARCSUM")?;

        let mut block = BlockDescriptor {
            stream_offset,
            uncompressed_size,
            stored_size,
            compressed_size,
            compression_algorithm,
            encryption_algorithm,
            stored_checksum,
            checksum_verified: ChecksumStatus::Unknown,
            payload: None,
        };

        if skip {
            self.skip_bytes(stored_size as u64)?;
            self.stats.blocks_skipped += 1;
            return Ok(block);
        }

        let region_start = self.position()?;
        let buf = self.read_up_to(stored_size as u64, "block payload")?;

        if !self.options.verify_checksums {
            self.stats.blocks_unverified += 1;
            block.payload = Some(buf);
            return Ok(block);
        }

        if fletcher32(&buf) == stored_checksum {
            self.stats.blocks_ok += 1;
            block.checksum_verified = ChecksumStatus::Ok;
            block.payload = Some(buf);
            return Ok(block);
        }

        warn!(
            "block is corrupt at offset={}, blksize={}",
            stream_offset, uncompressed_size
        );
        drop(buf);
        block.payload = Some(alloc_buffer(uncompressed_size as usize)?);
        block.checksum_verified = ChecksumStatus::Failed;
        self.stats.blocks_corrupt += 1;

        self.mark_corrupt(region_start, stored_size as u64);
        if let Err(e) = self.resynchronize_from(region_start) {
            warn!("cannot rewind to corrupt region at {region_start}: {e}");
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;
    use crate::format::{compress, encrypt, Magic};
    use crate::reader::{CorruptRegion, ReaderOptions};
    use crate::writer::{BlockRecord, RecordWriter};
    use std::io::{Cursor, SeekFrom};

    const PAYLOAD_AT: u64 = 1000;

    fn block_record(offset: u64, size: u32) -> BlockRecord {
        BlockRecord {
            stream_offset:         offset,
            uncompressed_size:     size,
            compressed_size:       size,
            compression_algorithm: compress::NONE,
            encryption_algorithm:  encrypt::NONE,
        }
    }

    /// `PAYLOAD_AT` bytes of padding, then the payload, then a trailer.
    fn stream_with(payload: &[u8]) -> Cursor<Vec<u8>> {
        let mut bytes = vec![0u8; PAYLOAD_AT as usize];
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(b"trailer");
        let mut c = Cursor::new(bytes);
        c.set_position(PAYLOAD_AT);
        c
    }

    #[test]
    fn verified_block_keeps_payload() {
        let payload: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let dico = block_record(4096, 300).to_dictionary(&payload);
        let mut r = ArchiveReader::from_stream(stream_with(&payload), ReaderOptions::default());

        let b = r.read_block(&dico, false).unwrap();
        assert_eq!(b.checksum_verified, ChecksumStatus::Ok);
        assert_eq!(b.stream_offset, 4096);
        assert_eq!(b.stored_size, 300);
        assert_eq!(b.payload.as_deref(), Some(&payload[..]));
        assert_eq!(r.position().unwrap(), PAYLOAD_AT + 300);
        assert_eq!(r.stats().blocks_ok, 1);
    }

    #[test]
    fn corrupt_block_is_zero_filled_and_rewound() {
        let payload = vec![0x5au8; 200];
        let dico = block_record(0, 512).to_dictionary(&payload);
        let mut damaged = payload.clone();
        damaged[17] = 0;
        let mut r = ArchiveReader::from_stream(stream_with(&damaged), ReaderOptions::default());

        let b = r.read_block(&dico, false).unwrap();
        assert_eq!(b.checksum_verified, ChecksumStatus::Failed);
        let placeholder = b.payload.unwrap();
        assert_eq!(placeholder.len(), 512);
        assert!(placeholder.iter().all(|&x| x == 0));
        assert_eq!(r.position().unwrap(), PAYLOAD_AT);
        assert_eq!(
            r.stats().corrupt_regions,
            vec![CorruptRegion { volume: 0, position: PAYLOAD_AT, length: 200 }]
        );
    }

    #[test]
    fn skip_steps_over_payload_without_reading() {
        let payload = vec![1u8; 64];
        let dico = block_record(0, 64).to_dictionary(&payload);
        let mut r = ArchiveReader::from_stream(stream_with(&payload), ReaderOptions::default());

        let b = r.read_block(&dico, true).unwrap();
        assert_eq!(b.payload, None);
        assert_eq!(b.checksum_verified, ChecksumStatus::Unknown);
        assert_eq!(r.position().unwrap(), PAYLOAD_AT + 64);
        assert_eq!(r.stats().blocks_skipped, 1);
    }

    #[test]
    fn unverified_mode_passes_bytes_through() {
        let payload = vec![9u8; 32];
        let mut dico = block_record(0, 32).to_dictionary(&payload);
        dico.insert_u32(0, blockhead_key::ARCSUM, 0);
        let opts = ReaderOptions { verify_checksums: false, ..Default::default() };
        let mut r = ArchiveReader::from_stream(stream_with(&payload), opts);

        let b = r.read_block(&dico, false).unwrap();
        assert_eq!(b.checksum_verified, ChecksumStatus::Unknown);
        assert_eq!(b.payload, Some(payload));
    }

    #[test]
    fn missing_field_fails_only_this_call() {
        let payload = vec![1u8; 8];
        let full = block_record(0, 8).to_dictionary(&payload);
        let mut partial = Dictionary::new();
        for e in full.iter().filter(|e| e.key != blockhead_key::COMPSIZE) {
            partial.insert(e.section, e.key, e.vtype, &e.data);
        }
        let mut r = ArchiveReader::from_stream(stream_with(&payload), ReaderOptions::default());

        let err = r.read_block(&partial, false).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingField { field: "COMPSIZE", .. }));
        assert_eq!(err.severity(), Severity::Local);
        assert_eq!(r.position().unwrap(), PAYLOAD_AT);
        assert!(r.read_block(&full, false).is_ok());
    }

    #[test]
    fn oversized_block_is_rejected() {
        let payload = vec![1u8; 8];
        let dico = block_record(0, FSA_MAX_BLKSIZE + 1).to_dictionary(&payload);
        let mut r = ArchiveReader::from_stream(stream_with(&payload), ReaderOptions::default());
        let err = r.read_block(&dico, false).unwrap_err();
        assert!(matches!(err, ArchiveError::BlockTooLarge { .. }));
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn truncated_payload_is_fatal() {
        let payload = vec![1u8; 64];
        let dico = block_record(0, 64).to_dictionary(&payload);
        let mut c = Cursor::new(payload[..10].to_vec());
        c.set_position(0);
        let mut r = ArchiveReader::from_stream(c, ReaderOptions::default());
        assert!(matches!(
            r.read_block(&dico, false),
            Err(ArchiveError::Truncated { what: "block payload" })
        ));
    }

    #[test]
    fn huge_stored_size_over_short_stream_is_truncated() {
        let payload = vec![1u8; 16];
        let mut dico = block_record(0, 16).to_dictionary(&payload);
        dico.insert_u32(0, blockhead_key::ARSIZE, 3_000_000_000);
        let mut r = ArchiveReader::from_stream(Cursor::new(vec![0u8; 32]), ReaderOptions::default());
        assert!(matches!(
            r.read_block(&dico, false),
            Err(ArchiveError::Truncated { what: "block payload" })
        ));
    }

    /// Stream that refuses to seek backwards to an absolute position.
    struct ForwardOnly(Cursor<Vec<u8>>);

    impl Read for ForwardOnly {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for ForwardOnly {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            match pos {
                SeekFrom::Start(p) if p < self.0.position() => Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "cannot rewind",
                )),
                other => self.0.seek(other),
            }
        }
    }

    #[test]
    fn failed_rewind_still_returns_placeholder() {
        let payload = vec![0x5au8; 200];
        let dico = block_record(0, 256).to_dictionary(&payload);
        let mut damaged = payload.clone();
        damaged[3] ^= 0xff;
        let stream = ForwardOnly(stream_with(&damaged));
        let mut r = ArchiveReader::from_stream(stream, ReaderOptions::default());

        let b = r.read_block(&dico, false).unwrap();
        assert_eq!(b.checksum_verified, ChecksumStatus::Failed);
        assert_eq!(b.payload, Some(vec![0u8; 256]));
        assert_eq!(r.stats().corrupt_regions.len(), 1);
        assert_eq!(r.position().unwrap(), PAYLOAD_AT + 200);
    }

    #[test]
    fn after_corruption_next_record_is_found_by_resync() {
        let mut w = RecordWriter::new(Vec::new());
        let good = vec![3u8; 150];
        w.write_block(7, 0, &block_record(0, 150), &good).unwrap();
        w.write_block(7, 0, &block_record(150, 150), &good).unwrap();
        let mut bytes = w.into_inner();
        let first_len = bytes.len() / 2;
        // Damage the tail of the first payload.
        bytes[first_len - 5] ^= 0xff;

        let mut r = ArchiveReader::from_stream(Cursor::new(bytes), ReaderOptions::default());
        let h = r.read_header(true).unwrap();
        assert_eq!(h.magic, Magic::BLKHEAD);
        let b = r.read_block(&h.dico, false).unwrap();
        assert_eq!(b.checksum_verified, ChecksumStatus::Failed);

        let h2 = r.read_header(true).unwrap();
        assert_eq!(h2.offset, first_len as u64);
        let b2 = r.read_block(&h2.dico, false).unwrap();
        assert_eq!(b2.checksum_verified, ChecksumStatus::Ok);
        assert_eq!(b2.stream_offset, 150);
        assert_eq!(r.stats().resync_bytes, 150);
    }
}
