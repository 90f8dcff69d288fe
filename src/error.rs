use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::dico::DicoError;
use crate::format::Magic;

/// How far an error reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The read session cannot continue.
    Fatal,
    /// This record is unusable; the session may resynchronize and go on.
    Minor,
    /// Only the current call failed; session state is untouched.
    Local,
}

/// Record whose dictionary a [`ArchiveError::MissingField`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    VolumeHeader,
    VolumeFooter,
    MainHeader,
    BlockHeader,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::VolumeHeader => "volume header",
            RecordKind::VolumeFooter => "volume footer",
            RecordKind::MainHeader   => "main header",
            RecordKind::BlockHeader  => "block header",
        })
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot open archive {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("{0} is not a regular file, cannot continue")]
    NotRegularFile(PathBuf),
    #[error("no archive volume is open")]
    NotOpen,
    #[error("unexpected end of archive while reading {what}")]
    Truncated { what: &'static str },
    #[error("cannot allocate {size} bytes")]
    Allocation { size: usize },

    #[error("invalid header magic [{found}]: this is not a valid archive, or it was created with a different version")]
    InvalidMagic { found: Magic },
    #[error("no record marker found within {scanned} bytes after offset {start}")]
    ResyncExhausted { start: u64, scanned: u64 },
    #[error("bad checksum for header dictionary: stored={stored:08x} computed={computed:08x}")]
    HeaderChecksum { stored: u32, computed: u32 },
    #[error("archive-id in header does not match: found={found:08x} expected={expected:08x}")]
    ArchiveIdMismatch { found: u32, expected: u32 },
    #[error("malformed header dictionary: {0}")]
    Dico(#[from] DicoError),

    #[error("magic is not what we expected: found=[{found}] expected=[{expected}]")]
    UnexpectedMagic { found: Magic, expected: Magic },
    #[error("volume header has wrong archive id: found={found:08x} expected={expected:08x}")]
    VolumeArchiveIdMismatch { found: u32, expected: u32 },
    #[error("wrong volume number in {path}: volume is {found} and we need volume {expected}")]
    WrongVolumeNumber { path: PathBuf, found: u32, expected: u32 },
    #[error(
        "archive uses a different file format [{found}] than its first volume [{expected}]; \
         it was created with version [{creator_version}], this program is [{program_version}] \
         using format [{program_format}]"
    )]
    FileFormatMismatch {
        found:           String,
        expected:        String,
        creator_version: String,
        program_version: &'static str,
        program_format:  &'static str,
    },
    #[error("{record} is missing {field}: {source}")]
    MissingField {
        record: RecordKind,
        field:  &'static str,
        source: DicoError,
    },
    #[error("block declares {size} bytes, maximum is {max}")]
    BlockTooLarge { size: u32, max: u32 },

    #[error("archive has an invalid base path: [{0}]")]
    InvalidBasePath(String),
    #[error("read cancelled")]
    Cancelled,
}

impl ArchiveError {
    pub fn severity(&self) -> Severity {
        match self {
            ArchiveError::HeaderChecksum { .. } | ArchiveError::ArchiveIdMismatch { .. } => {
                Severity::Minor
            }
            ArchiveError::MissingField { record: RecordKind::BlockHeader, .. } => Severity::Local,
            ArchiveError::Dico(e) if e.is_lookup() => Severity::Local,
            _ => Severity::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Minor
    }

    /// Map a short read onto [`ArchiveError::Truncated`], keep anything else.
    pub(crate) fn from_read(e: io::Error, what: &'static str) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ArchiveError::Truncated { what }
        } else {
            ArchiveError::Io(e)
        }
    }
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
