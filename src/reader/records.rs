use std::fs::File;

use log::{debug, warn};

use super::{ArchiveReader, BlockDescriptor, HeaderRecord};
use crate::error::{ArchiveError, RecordKind, Result, Severity};
use crate::format::{volfoot_key, Magic};

/// Item produced by [`ArchiveReader::next_record`].
#[derive(Debug, Clone)]
pub enum Record {
    /// Any record other than a data block or a volume footer.
    Header(HeaderRecord),
    Block {
        filesystem_id: u16,
        /// Position of the block header within its volume.
        offset:        u64,
        block:         BlockDescriptor,
    },
}

impl ArchiveReader<File> {
    /// Next usable record of the archive, rolling over to the following
    /// volume at each non-final volume footer.  Returns `Ok(None)` once the
    /// footer of the last volume has been read.
    ///
    /// Unusable headers (bad checksum, foreign archive id) and blocks with an
    /// incomplete header are logged and scanned past.  Blocks of filesystems
    /// for which `skip_fs` returns true are stepped over without reading.
    pub fn next_record<F>(&mut self, mut skip_fs: F) -> Result<Option<Record>>
    where
        F: FnMut(u16) -> bool,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(ArchiveError::Cancelled);
            }
            if !self.is_open() {
                return Ok(None);
            }

            let rec = match self.read_header(true) {
                Ok(rec) => rec,
                Err(e) if e.is_recoverable() => {
                    warn!("skipping unusable header in volume {}: {e}", self.current_volume);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if rec.magic == Magic::VOLFOOT {
                let last = rec
                    .dico
                    .get_bytes(0, volfoot_key::LASTVOL, 8)
                    .map(|v| v.iter().any(|&b| b != 0))
                    .map_err(|source| ArchiveError::MissingField {
                        record: RecordKind::VolumeFooter,
                        field:  "VOLUMEFOOTKEY_LASTVOL",
                        source,
                    })?;
                if last {
                    debug!("last volume footer reached in volume {}", self.current_volume);
                    self.close();
                    return Ok(None);
                }
                self.next_volume()?;
                continue;
            }

            if rec.magic == Magic::BLKHEAD {
                let skip = skip_fs(rec.filesystem_id);
                match self.read_block(&rec.dico, skip) {
                    Ok(block) => {
                        return Ok(Some(Record::Block {
                            filesystem_id: rec.filesystem_id,
                            offset:        rec.offset,
                            block,
                        }));
                    }
                    Err(e) if e.severity() == Severity::Local => {
                        warn!("skipping block at position {}: {e}", rec.offset);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            return Ok(Some(Record::Header(rec)));
        }
    }
}
