//! Record framing and resynchronization.
//!
//! A record is `[magic][archive_id: u32][fsid: u16][dictionary blob]`.  When
//! the bytes at the read cursor are not a known magic and seeking is allowed,
//! the reader slides forward one byte at a time until a magic appears.  This
//! is how the format steps over damaged regions.

use std::io::{Read, Seek};

use log::{debug, warn};

use super::{alloc_buffer, ArchiveReader};
use crate::checksum::fletcher32;
use crate::dico::Dictionary;
use crate::error::{ArchiveError, Result};
use crate::format::{Magic, MAGIC_LEN};

/// Bytes pulled from the stream per resync read.
const SCAN_CHUNK: usize = 64 * 1024;

/// One decoded record header.
#[derive(Debug, Clone)]
pub struct HeaderRecord {
    /// Position of the magic within the current volume.
    pub offset:        u64,
    pub magic:         Magic,
    pub archive_id:    u32,
    pub filesystem_id: u16,
    pub dico:          Dictionary,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Read the next record header.
    ///
    /// With `allow_seek == false` the magic must sit exactly at the cursor;
    /// otherwise [`ArchiveError::InvalidMagic`] is returned after consuming
    /// only the leading magic.  With `allow_seek == true` garbage before the
    /// next magic is skipped.
    ///
    /// A header carrying another archive's id fails with the recoverable
    /// [`ArchiveError::ArchiveIdMismatch`]; a dictionary with a bad checksum
    /// with the recoverable [`ArchiveError::HeaderChecksum`].  In both cases
    /// the cursor is left past the bytes consumed, so the next tolerant call
    /// continues the scan.
    pub fn read_header(&mut self, allow_seek: bool) -> Result<HeaderRecord> {
        let start = self.position()?;
        let mut lead = [0u8; MAGIC_LEN];
        self.read_exact_into(&mut lead, "header magic")?;

        let (offset, magic) = if Magic(lead).is_valid() {
            (start, Magic(lead))
        } else if !allow_seek {
            return Err(ArchiveError::InvalidMagic { found: Magic(lead) });
        } else {
            self.scan_for_magic(start)?
        };

        let archive_id = self.read_u32("archive id")?;
        if self.archive_id != 0 && archive_id != self.archive_id {
            self.stats.foreign_headers += 1;
            return Err(ArchiveError::ArchiveIdMismatch {
                found:    archive_id,
                expected: self.archive_id,
            });
        }

        let filesystem_id = self.read_u16("filesystem id")?;
        let dico = self.read_dictionary()?;
        self.stats.headers_read += 1;

        Ok(HeaderRecord {
            offset,
            magic,
            archive_id,
            filesystem_id,
            dico,
        })
    }

    /// Decode a `[len: u16][entries][checksum: u32]` blob at the cursor.
    pub fn read_dictionary(&mut self) -> Result<Dictionary> {
        let len = self.read_u16("dictionary length")? as usize;
        let mut buf = alloc_buffer(len)?;
        self.read_exact_into(&mut buf, "dictionary data")?;
        let stored = self.read_u32("dictionary checksum")?;

        let computed = fletcher32(&buf);
        if computed != stored {
            self.stats.header_checksum_failures += 1;
            warn!("bad checksum for header dictionary ({len} bytes)");
            return Err(ArchiveError::HeaderChecksum { stored, computed });
        }
        Ok(Dictionary::decode_entries(&buf)?)
    }

    /// Find the first recognised magic strictly after `start`.  On success
    /// the cursor sits right after that magic.
    fn scan_for_magic(&mut self, start: u64) -> Result<(u64, Magic)> {
        let limit = self.options.max_resync_distance;
        let from = start + 1;
        self.seek_to(from)?;
        self.stats.resyncs += 1;
        debug!("no magic at position {start}, scanning forward");

        let exhausted = |scanned: u64| ArchiveError::ResyncExhausted { start, scanned };

        let mut chunk = alloc_buffer(SCAN_CHUNK)?;
        // `window[0]` lives at absolute position `window_start`.
        let mut window: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + MAGIC_LEN);
        let mut window_start = from;

        loop {
            let n = self.read_some(&mut chunk)?;
            if n == 0 {
                let scanned = window_start + window.len() as u64 - start;
                return Err(exhausted(scanned));
            }
            window.extend_from_slice(&chunk[..n]);

            if let Some(i) = window.windows(MAGIC_LEN).position(Magic::is_valid_prefix) {
                let pos = window_start + i as u64;
                let skipped = pos - start;
                if limit.is_some_and(|max| skipped > max) {
                    return Err(exhausted(skipped));
                }
                let mut magic = [0u8; MAGIC_LEN];
                magic.copy_from_slice(&window[i..i + MAGIC_LEN]);
                self.seek_to(pos + MAGIC_LEN as u64)?;
                self.stats.resync_bytes += skipped;
                debug!("resynchronized on [{}] at position {pos} after {skipped} bytes", Magic(magic));
                return Ok((pos, Magic(magic)));
            }

            // Keep a partial magic that may straddle the next chunk.
            let keep_from = window.len().saturating_sub(MAGIC_LEN - 1);
            window.drain(..keep_from);
            window_start += keep_from as u64;

            if limit.is_some_and(|max| window_start - start > max) {
                return Err(exhausted(window_start - start));
            }
        }
    }
}
