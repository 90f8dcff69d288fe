//! Record encoder, the mirror image of the reader.
//!
//! Produces exactly the framing [`ArchiveReader`](crate::reader::ArchiveReader)
//! decodes.  It writes individual records; sequencing them into volumes is
//! up to the caller.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::checksum::fletcher32;
use crate::dico::Dictionary;
use crate::format::{
    blockhead_key, mainhead_key, volfoot_key, volhead_key, Magic, FILESYSID_NULL,
};
use crate::reader::MainHeader;

/// Block settings supplied by the caller; sizes and checksum of the stored
/// payload are derived when the block is written.
#[derive(Debug, Clone, Copy)]
pub struct BlockRecord {
    pub stream_offset:         u64,
    pub uncompressed_size:     u32,
    pub compressed_size:       u32,
    pub compression_algorithm: u16,
    pub encryption_algorithm:  u16,
}

impl BlockRecord {
    /// Block header dictionary describing `payload` as stored bytes.
    pub fn to_dictionary(&self, payload: &[u8]) -> Dictionary {
        let mut d = Dictionary::new();
        d.insert_u64(0, blockhead_key::BLOCKOFFSET, self.stream_offset);
        d.insert_u32(0, blockhead_key::REALSIZE, self.uncompressed_size);
        d.insert_u16(0, blockhead_key::COMPRESSALGO, self.compression_algorithm);
        d.insert_u16(0, blockhead_key::ENCRYPTALGO, self.encryption_algorithm);
        d.insert_u32(0, blockhead_key::ARSIZE, payload.len() as u32);
        d.insert_u32(0, blockhead_key::COMPSIZE, self.compressed_size);
        d.insert_u32(0, blockhead_key::ARCSUM, fletcher32(payload));
        d
    }
}

fn invalid(e: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

pub struct RecordWriter<W: Write> {
    inner:             W,
    pub bytes_written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, bytes_written: 0 }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// `[magic][archive_id][fsid][dictionary blob]`.
    pub fn write_header(
        &mut self,
        magic:      Magic,
        archive_id: u32,
        fsid:       u16,
        dico:       &Dictionary,
    ) -> io::Result<()> {
        let blob = dico.encode_blob().map_err(invalid)?;
        let mut frame = Vec::with_capacity(10 + blob.len());
        frame.extend_from_slice(magic.as_bytes());
        frame.write_u32::<LittleEndian>(archive_id)?;
        frame.write_u16::<LittleEndian>(fsid)?;
        frame.extend_from_slice(&blob);
        self.put(&frame)
    }

    /// Block header record followed by the stored payload.
    pub fn write_block(
        &mut self,
        archive_id: u32,
        fsid:       u16,
        block:      &BlockRecord,
        payload:    &[u8],
    ) -> io::Result<()> {
        self.write_header(Magic::BLKHEAD, archive_id, fsid, &block.to_dictionary(payload))?;
        self.put(payload)
    }

    pub fn write_volume_header(
        &mut self,
        archive_id:      u32,
        volume:          u32,
        file_format:     &str,
        creator_version: &str,
    ) -> io::Result<()> {
        self.write_volume_header_with(archive_id, archive_id, volume, file_format, creator_version)
    }

    /// Volume header whose framing id and dictionary id may differ.
    pub fn write_volume_header_with(
        &mut self,
        frame_id:        u32,
        archive_id:      u32,
        volume:          u32,
        file_format:     &str,
        creator_version: &str,
    ) -> io::Result<()> {
        let mut d = Dictionary::new();
        d.insert_u32(0, volhead_key::VOLNUM, volume);
        d.insert_u32(0, volhead_key::ARCHID, archive_id);
        d.insert_string(0, volhead_key::FILEFORMATVER, file_format);
        d.insert_string(0, volhead_key::PROGVERCREAT, creator_version);
        self.write_header(Magic::VOLHEAD, frame_id, FILESYSID_NULL, &d)
    }

    pub fn write_volume_footer(&mut self, archive_id: u32, volume: u32, last: bool) -> io::Result<()> {
        let mut d = Dictionary::new();
        d.insert_u32(0, volfoot_key::VOLNUM, volume);
        d.insert_u32(0, volfoot_key::ARCHID, archive_id);
        d.insert_u8(0, volfoot_key::LASTVOL, last as u8);
        self.write_header(Magic::VOLFOOT, archive_id, FILESYSID_NULL, &d)
    }

    pub fn write_main_header(&mut self, h: &MainHeader) -> io::Result<()> {
        let mut d = Dictionary::new();
        d.insert_string(0, mainhead_key::FILEFORMATVER, &h.file_format);
        d.insert_string(0, mainhead_key::PROGVERCREAT, &h.creator_version);
        d.insert_u32(0, mainhead_key::ARCHIVEID, h.archive_id);
        if let Some(t) = h.archive_type {
            d.insert_u32(0, mainhead_key::ARCHTYPE, t);
        }
        if let Some(n) = h.filesystem_count {
            d.insert_u64(0, mainhead_key::FSCOUNT, n);
        }
        if let Some(label) = &h.label {
            d.insert_string(0, mainhead_key::ARCHLABEL, label);
        }
        if let Some(t) = h.creation_time {
            d.insert_u64(0, mainhead_key::CREATTIME, t);
        }
        d.insert_u16(0, mainhead_key::COMPRESSALGO, h.compression_algorithm);
        if let Some(level) = h.compression_level {
            d.insert_u16(0, mainhead_key::COMPRESSLEVEL, level);
        }
        d.insert_u16(0, mainhead_key::ENCRYPTALGO, h.encryption_algorithm);
        self.write_header(Magic::MAIN, h.archive_id, FILESYSID_NULL, &d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{compress, encrypt, MAGIC_LEN};

    #[test]
    fn header_framing_layout() {
        let mut d = Dictionary::new();
        d.insert_u16(0, 1, 0xbeef);
        let mut w = RecordWriter::new(Vec::new());
        w.write_header(Magic::FSINFO, 0x0102_0304, 0x0506, &d).unwrap();
        let bytes = w.into_inner();

        assert_eq!(&bytes[..MAGIC_LEN], b"FsIn");
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..10], &[0x06, 0x05]);
        assert_eq!(&bytes[10..], &d.encode_blob().unwrap()[..]);
    }

    #[test]
    fn block_payload_follows_header() {
        let block = BlockRecord {
            stream_offset:         0,
            uncompressed_size:     4,
            compressed_size:       4,
            compression_algorithm: compress::NONE,
            encryption_algorithm:  encrypt::NONE,
        };
        let mut w = RecordWriter::new(Vec::new());
        w.write_block(1, 0, &block, b"data").unwrap();
        assert_eq!(w.bytes_written as usize, w.into_inner().len());

        let d = block.to_dictionary(b"data");
        assert_eq!(d.get_u32(0, blockhead_key::ARSIZE).unwrap(), 4);
        assert_eq!(d.get_u32(0, blockhead_key::ARCSUM).unwrap(), fletcher32(b"data"));
    }
}
