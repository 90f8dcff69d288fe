//! Frozen on-disk constants of the `.fsa` container.
//!
//! # Record framing
//! Every structural record starts with
//! `[magic: 4 B][archive_id: u32 LE][filesystem_id: u16 LE]` followed by a
//! checksummed dictionary blob.  Block records are immediately followed by
//! `ARSIZE` bytes of stored payload.
//!
//! Key ids are per record kind; all keys live in section 0 unless stated.

use std::fmt;

/// Byte length of every record magic.
pub const MAGIC_LEN: usize = 4;

/// Largest uncompressed size a single data block may declare.
pub const FSA_MAX_BLKSIZE: u32 = 900 * 1024;

/// Filesystem id carried by records that belong to no filesystem.
pub const FILESYSID_NULL: u16 = 0xFFFF;

/// File format identifier written by (and expected from) this build.
pub const FSA_FILEFORMAT: &str = "FsArCh_002";

/// Program version reported in format-mismatch diagnostics.
pub const FSA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound for version strings read from volume and main headers.
pub const MAX_VERSION_LEN: usize = 64;
/// Upper bound for the archive label read from the main header.
pub const MAX_LABEL_LEN: usize = 512;

// ── Magics ───────────────────────────────────────────────────────────────────

/// A 4-byte record marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magic(pub [u8; MAGIC_LEN]);

impl Magic {
    pub const MAIN:     Magic = Magic(*b"FsA0");
    pub const VOLHEAD:  Magic = Magic(*b"FsAv");
    pub const VOLFOOT:  Magic = Magic(*b"FsAe");
    pub const FSINFO:   Magic = Magic(*b"FsIn");
    pub const FSBEGIN:  Magic = Magic(*b"FsYs");
    pub const DATAFS:   Magic = Magic(*b"DaFs");
    pub const OBJECT:   Magic = Magic(*b"ObJt");
    pub const BLKHEAD:  Magic = Magic(*b"BlKh");
    pub const FILEFOOT: Magic = Magic(*b"FiLf");
    pub const DIRSINFO: Magic = Magic(*b"DiRs");

    /// Every magic a reader accepts as the start of a record.
    pub const ALL: [Magic; 10] = [
        Magic::MAIN,
        Magic::VOLHEAD,
        Magic::VOLFOOT,
        Magic::FSINFO,
        Magic::FSBEGIN,
        Magic::DATAFS,
        Magic::OBJECT,
        Magic::BLKHEAD,
        Magic::FILEFOOT,
        Magic::DIRSINFO,
    ];

    #[inline]
    pub fn is_valid(&self) -> bool {
        Self::ALL.contains(self)
    }

    /// Returns true when `bytes` starts with a recognised magic.
    #[inline]
    pub fn is_valid_prefix(bytes: &[u8]) -> bool {
        bytes.len() >= MAGIC_LEN
            && Self::ALL.iter().any(|m| m.0[..] == bytes[..MAGIC_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; MAGIC_LEN] {
        &self.0
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Magic({self})")
    }
}

// ── Dictionary value types ───────────────────────────────────────────────────

/// Type tag stored with each dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    Data,
    String,
    /// Tag not known to this build; the raw bytes are still kept.
    Unknown(u8),
}

impl ValueType {
    pub fn tag(self) -> u8 {
        match self {
            ValueType::U8         => 1,
            ValueType::U16        => 2,
            ValueType::U32        => 3,
            ValueType::U64        => 4,
            ValueType::S8         => 5,
            ValueType::S16        => 6,
            ValueType::S32        => 7,
            ValueType::S64        => 8,
            ValueType::Data       => 9,
            ValueType::String     => 10,
            ValueType::Unknown(t) => t,
        }
    }

    /// Fixed width of numeric types; `None` for variable-size values.
    pub fn width(self) -> Option<usize> {
        match self {
            ValueType::U8  | ValueType::S8  => Some(1),
            ValueType::U16 | ValueType::S16 => Some(2),
            ValueType::U32 | ValueType::S32 => Some(4),
            ValueType::U64 | ValueType::S64 => Some(8),
            _ => None,
        }
    }
}

impl From<u8> for ValueType {
    fn from(tag: u8) -> Self {
        match tag {
            1  => ValueType::U8,
            2  => ValueType::U16,
            3  => ValueType::U32,
            4  => ValueType::U64,
            5  => ValueType::S8,
            6  => ValueType::S16,
            7  => ValueType::S32,
            8  => ValueType::S64,
            9  => ValueType::Data,
            10 => ValueType::String,
            t  => ValueType::Unknown(t),
        }
    }
}

// ── Key ids ──────────────────────────────────────────────────────────────────

pub mod volhead_key {
    pub const VOLNUM:        u16 = 1;
    pub const ARCHID:        u16 = 2;
    pub const FILEFORMATVER: u16 = 3;
    pub const PROGVERCREAT:  u16 = 4;
}

pub mod volfoot_key {
    pub const VOLNUM:  u16 = 1;
    pub const ARCHID:  u16 = 2;
    pub const LASTVOL: u16 = 3;
}

pub mod mainhead_key {
    pub const FILEFORMATVER: u16 = 1;
    pub const PROGVERCREAT:  u16 = 2;
    pub const ARCHIVEID:     u16 = 3;
    pub const ARCHTYPE:      u16 = 4;
    pub const FSCOUNT:       u16 = 5;
    pub const ARCHLABEL:     u16 = 6;
    pub const CREATTIME:     u16 = 7;
    pub const COMPRESSALGO:  u16 = 8;
    pub const COMPRESSLEVEL: u16 = 9;
    pub const ENCRYPTALGO:   u16 = 10;
}

pub mod blockhead_key {
    pub const REALSIZE:     u16 = 1;
    pub const BLOCKOFFSET:  u16 = 2;
    pub const COMPRESSALGO: u16 = 3;
    pub const ENCRYPTALGO:  u16 = 4;
    pub const ARSIZE:       u16 = 5;
    pub const COMPSIZE:     u16 = 6;
    pub const ARCSUM:       u16 = 7;
}

// ── Algorithms ───────────────────────────────────────────────────────────────

/// Compression algorithm ids as recorded in main and block headers.
pub mod compress {
    pub const NONE:  u16 = 0;
    pub const LZO:   u16 = 1;
    pub const GZIP:  u16 = 2;
    pub const BZIP2: u16 = 3;
    pub const LZMA:  u16 = 4;
    pub const LZ4:   u16 = 5;
    pub const ZSTD:  u16 = 6;

    pub fn name(id: u16) -> &'static str {
        match id {
            NONE  => "none",
            LZO   => "lzo",
            GZIP  => "gzip",
            BZIP2 => "bzip2",
            LZMA  => "lzma",
            LZ4   => "lz4",
            ZSTD  => "zstd",
            _     => "unknown",
        }
    }
}

/// Encryption algorithm ids.
pub mod encrypt {
    pub const NONE:     u16 = 0;
    pub const BLOWFISH: u16 = 1;

    pub fn name(id: u16) -> &'static str {
        match id {
            NONE     => "none",
            BLOWFISH => "blowfish",
            _        => "unknown",
        }
    }
}
