pub mod format;
pub mod checksum;
pub mod dico;
pub mod error;
pub mod volume;
pub mod reader;
pub mod writer;
pub mod codec;
pub mod recovery;

pub use format::Magic;
pub use dico::{Dictionary, DicoError};
pub use error::{ArchiveError, RecordKind, Severity};
pub use volume::resolve_volume_path;
pub use reader::{
    ArchiveReader, BlockDescriptor, CancelFlag, ChecksumStatus, HeaderRecord, MainHeader,
    ReaderOptions, Record, VolumeHeader,
};
pub use writer::{BlockRecord, RecordWriter};
pub use codec::{decode_block, get_codec, CodecError};
pub use recovery::{scan_archive, RecoveryQuality, ScanReport};
