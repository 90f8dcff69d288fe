use std::io::{Read, Seek};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use super::ArchiveReader;
use crate::dico::{DicoError, Dictionary};
use crate::error::{ArchiveError, RecordKind, Result};
use crate::format::{
    compress, encrypt, mainhead_key, Magic, MAX_LABEL_LEN, MAX_VERSION_LEN,
};

/// Archive-wide settings recorded once, right after the first volume header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MainHeader {
    pub archive_id:            u32,
    pub file_format:           String,
    pub creator_version:       String,
    pub label:                 Option<String>,
    /// Seconds since the Unix epoch.
    pub creation_time:         Option<u64>,
    pub archive_type:          Option<u32>,
    pub filesystem_count:      Option<u64>,
    pub compression_algorithm: u16,
    pub compression_level:     Option<u16>,
    pub encryption_algorithm:  u16,
}

/// Missing keys become `None`; a present key of the wrong type is an error.
fn optional<T>(res: std::result::Result<T, DicoError>, field: &'static str) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(DicoError::MissingKey { .. }) => Ok(None),
        Err(source) => Err(ArchiveError::MissingField { record: RecordKind::MainHeader, field, source }),
    }
}

fn required<T>(res: std::result::Result<T, DicoError>, field: &'static str) -> Result<T> {
    res.map_err(|source| ArchiveError::MissingField { record: RecordKind::MainHeader, field, source })
}

impl MainHeader {
    pub fn from_dictionary(archive_id: u32, d: &Dictionary) -> Result<Self> {
        Ok(Self {
            archive_id,
            file_format: required(
                d.get_string(0, mainhead_key::FILEFORMATVER, MAX_VERSION_LEN),
                "MAINHEADKEY_FILEFORMATVER",
            )?,
            creator_version: required(
                d.get_string(0, mainhead_key::PROGVERCREAT, MAX_VERSION_LEN),
                "MAINHEADKEY_PROGVERCREAT",
            )?,
            label: optional(
                d.get_string(0, mainhead_key::ARCHLABEL, MAX_LABEL_LEN),
                "MAINHEADKEY_ARCHLABEL",
            )?,
            creation_time: optional(d.get_u64(0, mainhead_key::CREATTIME), "MAINHEADKEY_CREATTIME")?,
            archive_type: optional(d.get_u32(0, mainhead_key::ARCHTYPE), "MAINHEADKEY_ARCHTYPE")?,
            filesystem_count: optional(d.get_u64(0, mainhead_key::FSCOUNT), "MAINHEADKEY_FSCOUNT")?,
            compression_algorithm: optional(
                d.get_u16(0, mainhead_key::COMPRESSALGO),
                "MAINHEADKEY_COMPRESSALGO",
            )?
            .unwrap_or(compress::NONE),
            compression_level: optional(
                d.get_u16(0, mainhead_key::COMPRESSLEVEL),
                "MAINHEADKEY_COMPRESSLEVEL",
            )?,
            encryption_algorithm: optional(
                d.get_u16(0, mainhead_key::ENCRYPTALGO),
                "MAINHEADKEY_ENCRYPTALGO",
            )?
            .unwrap_or(encrypt::NONE),
        })
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_time
            .and_then(|t| i64::try_from(t).ok())
            .and_then(|t| DateTime::from_timestamp(t, 0))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Read the main header that follows the first volume header and adopt
    /// its algorithm settings.
    pub fn read_main_header(&mut self) -> Result<MainHeader> {
        let rec = self.read_header(false)?;
        if rec.magic != Magic::MAIN {
            return Err(ArchiveError::UnexpectedMagic {
                found:    rec.magic,
                expected: Magic::MAIN,
            });
        }
        let header = MainHeader::from_dictionary(rec.archive_id, &rec.dico)?;
        self.apply_main_header(&header);
        Ok(header)
    }

    /// Take over the settings negotiated by a main header.
    pub fn apply_main_header(&mut self, header: &MainHeader) {
        if self.archive_id == 0 {
            self.archive_id = header.archive_id;
        }
        if self.file_format.is_none() {
            self.file_format = Some(header.file_format.clone());
        }
        if self.creator_version.is_none() {
            self.creator_version = Some(header.creator_version.clone());
        }
        self.compression_algorithm = header.compression_algorithm;
        self.compression_level     = header.compression_level;
        self.encryption_algorithm  = header.encryption_algorithm;
        debug!(
            "main header: compression={} level={:?} encryption={}",
            compress::name(self.compression_algorithm),
            self.compression_level,
            encrypt::name(self.encryption_algorithm),
        );
    }
}
