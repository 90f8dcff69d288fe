use std::io::{Read, Seek};

use log::error;
use serde::Serialize;

use super::ArchiveReader;
use crate::dico::{DicoError, Dictionary};
use crate::error::{ArchiveError, RecordKind, Result};
use crate::format::{volhead_key, Magic, FSA_FILEFORMAT, FSA_VERSION, MAX_VERSION_LEN};

/// Identity carried by the header at byte 0 of every volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeHeader {
    pub volume:          u32,
    pub archive_id:      u32,
    pub file_format:     String,
    pub creator_version: String,
}

fn field<T>(res: std::result::Result<T, DicoError>, field: &'static str) -> Result<T> {
    res.map_err(|source| ArchiveError::MissingField {
        record: RecordKind::VolumeHeader,
        field,
        source,
    })
}

fn version(d: &Dictionary, key: u16, name: &'static str) -> Result<String> {
    field(d.get_string(0, key, MAX_VERSION_LEN), name)
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Read and validate the header that opens the current volume.
    ///
    /// The first volume establishes the archive id, file format and creator
    /// version; every later volume must repeat the same id and format and
    /// carry the volume number the session expects.
    pub fn read_volume_header(&mut self) -> Result<VolumeHeader> {
        let rec = match self.read_header(false) {
            Ok(rec) => rec,
            Err(ArchiveError::ArchiveIdMismatch { found, expected }) => {
                return Err(ArchiveError::VolumeArchiveIdMismatch { found, expected });
            }
            Err(e) => return Err(e),
        };

        if rec.magic != Magic::VOLHEAD {
            return Err(ArchiveError::UnexpectedMagic {
                found:    rec.magic,
                expected: Magic::VOLHEAD,
            });
        }

        // Identity first, so a foreign volume is reported as such even when
        // its version strings are missing.
        let archive_id = field(rec.dico.get_u32(0, volhead_key::ARCHID), "VOLUMEHEADKEY_ARCHID")?;
        if self.archive_id == 0 {
            self.archive_id = archive_id;
        } else if archive_id != self.archive_id {
            return Err(ArchiveError::VolumeArchiveIdMismatch {
                found:    archive_id,
                expected: self.archive_id,
            });
        }

        let volume = field(rec.dico.get_u32(0, volhead_key::VOLNUM), "VOLUMEHEADKEY_VOLNUM")?;
        if volume != self.current_volume {
            return Err(ArchiveError::WrongVolumeNumber {
                path:     self.volume_path.clone(),
                found:    volume,
                expected: self.current_volume,
            });
        }

        let header = VolumeHeader {
            volume,
            archive_id,
            file_format:     version(&rec.dico, volhead_key::FILEFORMATVER, "VOLUMEHEADKEY_FILEFORMATVER")?,
            creator_version: version(&rec.dico, volhead_key::PROGVERCREAT, "VOLUMEHEADKEY_PROGVERCREAT")?,
        };

        match &self.file_format {
            None => self.file_format = Some(header.file_format.clone()),
            Some(expected) if *expected != header.file_format => {
                let creator = self.creator_version.clone().unwrap_or_default();
                error!("This archive is based on a different file format: [{}]. Cannot continue.", expected);
                error!("It has been created with version [{}], extract it using that version.", creator);
                error!(
                    "The current version of the program is [{}], and it's based on format [{}]",
                    FSA_VERSION, FSA_FILEFORMAT
                );
                return Err(ArchiveError::FileFormatMismatch {
                    found:           header.file_format,
                    expected:        expected.clone(),
                    creator_version: creator,
                    program_version: FSA_VERSION,
                    program_format:  FSA_FILEFORMAT,
                });
            }
            Some(_) => {}
        }

        if self.creator_version.is_none() {
            self.creator_version = Some(header.creator_version.clone());
        }

        Ok(header)
    }
}
