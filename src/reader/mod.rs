//! Archive read session.
//!
//! [`ArchiveReader`] owns exactly one open volume stream plus everything
//! learned about the archive so far: its identity, the file format and
//! creator version of the first volume, and the algorithms negotiated from
//! the main header.  All decoding goes through it:
//!
//! - [`ArchiveReader::read_header`]: one framed record, with optional
//!   byte-granular resynchronization.
//! - [`ArchiveReader::read_volume_header`]: strict volume-boundary check.
//! - [`ArchiveReader::read_block`]: one data block, with zero-fill
//!   substitution when its payload checksum fails.
//! - [`ArchiveReader::next_record`]: the record loop, including volume
//!   rollover.
//!
//! A session is single-threaded.  [`BlockDescriptor`]s own their payload and
//! can be handed to other threads for decoding.

mod block;
mod header;
mod main_header;
mod records;
mod volhead;

pub use block::{BlockDescriptor, ChecksumStatus};
pub use header::HeaderRecord;
pub use main_header::MainHeader;
pub use records::Record;
pub use volhead::VolumeHeader;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use serde::Serialize;

use crate::error::{ArchiveError, Result};
use crate::format::compress;
use crate::format::encrypt;
use crate::volume::resolve_volume_path;

/// Default cap on the bytes one resynchronization may skip: 256 MiB.
pub const DEFAULT_MAX_RESYNC: u64 = 256 * 1024 * 1024;

/// Largest buffer reserved up front for a length read from the archive.
const READ_RESERVE_LIMIT: u64 = 1024 * 1024;

// ── ReaderOptions ────────────────────────────────────────────────────────────

/// Configuration for an [`ArchiveReader`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Give up a resynchronization after skipping this many bytes.
    /// `None` scans until the end of the volume.
    pub max_resync_distance: Option<u64>,
    /// Compare block payloads against their stored checksum.
    pub verify_checksums:    bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_resync_distance: Some(DEFAULT_MAX_RESYNC),
            verify_checksums:    true,
        }
    }
}

// ── CancelFlag ───────────────────────────────────────────────────────────────

/// Shared abort switch, checked by the record loop between records.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// Region of a volume whose bytes failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorruptRegion {
    pub volume:   u32,
    pub position: u64,
    pub length:   u64,
}

/// Running counters for one session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadStats {
    pub volumes_opened:           u32,
    pub headers_read:             u64,
    pub header_checksum_failures: u64,
    pub foreign_headers:          u64,
    pub blocks_ok:                u64,
    pub blocks_corrupt:           u64,
    pub blocks_unverified:        u64,
    pub blocks_skipped:           u64,
    pub resyncs:                  u64,
    pub resync_bytes:             u64,
    pub corrupt_regions:          Vec<CorruptRegion>,
}

// ── ArchiveReader ────────────────────────────────────────────────────────────

pub struct ArchiveReader<R: Read + Seek = File> {
    stream:          Option<R>,
    base_path:       PathBuf,
    volume_path:     PathBuf,
    current_volume:  u32,
    archive_id:      u32,
    file_format:     Option<String>,
    creator_version: Option<String>,

    pub compression_algorithm: u16,
    pub compression_level:     Option<u16>,
    pub encryption_algorithm:  u16,

    options:         ReaderOptions,
    cancel:          CancelFlag,
    stats:           ReadStats,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Session over an already-open stream, treated as volume 0.
    pub fn from_stream(stream: R, options: ReaderOptions) -> Self {
        let mut reader = Self::closed(PathBuf::new(), options);
        reader.stream = Some(stream);
        reader.stats.volumes_opened = 1;
        reader
    }

    fn closed(base_path: PathBuf, options: ReaderOptions) -> Self {
        Self {
            stream:                None,
            base_path,
            volume_path:           PathBuf::new(),
            current_volume:        0,
            archive_id:            0,
            file_format:           None,
            creator_version:       None,
            compression_algorithm: compress::NONE,
            compression_level:     None,
            encryption_algorithm:  encrypt::NONE,
            options,
            cancel:                CancelFlag::new(),
            stats:                 ReadStats::default(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn base_path(&self) -> &Path { &self.base_path }
    pub fn volume_path(&self) -> &Path { &self.volume_path }
    pub fn current_volume(&self) -> u32 { self.current_volume }
    /// Archive identity; 0 until the first header has been read.
    pub fn archive_id(&self) -> u32 { self.archive_id }
    pub fn file_format(&self) -> Option<&str> { self.file_format.as_deref() }
    pub fn creator_version(&self) -> Option<&str> { self.creator_version.as_deref() }
    pub fn options(&self) -> &ReaderOptions { &self.options }
    pub fn stats(&self) -> &ReadStats { &self.stats }
    pub fn is_open(&self) -> bool { self.stream.is_some() }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Share an existing flag, e.g. one held by a signal handler.
    pub fn set_cancel_flag(&mut self, flag: CancelFlag) {
        self.cancel = flag;
    }

    // ── Corruption recovery ──────────────────────────────────────────────────

    /// Record that `length` bytes at `position` of the current volume failed
    /// verification.
    pub fn mark_corrupt(&mut self, position: u64, length: u64) {
        warn!(
            "corrupt region in volume {} at position={} length={}",
            self.current_volume, position, length
        );
        self.stats.corrupt_regions.push(CorruptRegion {
            volume: self.current_volume,
            position,
            length,
        });
    }

    /// Put the read cursor back at `position` so that the next tolerant
    /// [`read_header`](Self::read_header) scans forward from there.
    pub fn resynchronize_from(&mut self, position: u64) -> Result<()> {
        debug!("resynchronizing from position {position}");
        self.seek_to(position)
    }

    // ── Stream primitives ────────────────────────────────────────────────────

    fn stream_mut(&mut self) -> Result<&mut R> {
        self.stream.as_mut().ok_or(ArchiveError::NotOpen)
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.stream_mut()?.stream_position()?)
    }

    fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.stream_mut()?.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn skip_bytes(&mut self, n: u64) -> Result<()> {
        self.stream_mut()?.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }

    fn read_exact_into(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        self.stream_mut()?
            .read_exact(buf)
            .map_err(|e| ArchiveError::from_read(e, what))
    }

    /// Read exactly `len` bytes into a buffer that only grows as data
    /// arrives, so a bogus length over a short stream fails before it can
    /// claim memory the stream cannot fill.
    fn read_up_to(&mut self, len: u64, what: &'static str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len.min(READ_RESERVE_LIMIT) as usize)
            .map_err(|_| ArchiveError::Allocation { size: len as usize })?;
        self.stream_mut()?
            .take(len)
            .read_to_end(&mut buf)
            .map_err(|e| ArchiveError::from_read(e, what))?;
        if (buf.len() as u64) < len {
            return Err(ArchiveError::Truncated { what });
        }
        Ok(buf)
    }

    /// Read up to `buf.len()` bytes; 0 means end of stream.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream_mut()?;
        loop {
            match stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_u16(&mut self, what: &'static str) -> Result<u16> {
        self.stream_mut()?
            .read_u16::<LittleEndian>()
            .map_err(|e| ArchiveError::from_read(e, what))
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32> {
        self.stream_mut()?
            .read_u32::<LittleEndian>()
            .map_err(|e| ArchiveError::from_read(e, what))
    }
}

impl ArchiveReader<File> {
    /// Session for the archive at `base_path`; nothing is opened yet.
    pub fn new<P: AsRef<Path>>(base_path: P, options: ReaderOptions) -> Self {
        Self::closed(base_path.as_ref().to_owned(), options)
    }

    /// Open volume 0 and validate its volume header.
    pub fn open<P: AsRef<Path>>(base_path: P, options: ReaderOptions) -> Result<Self> {
        let mut reader = Self::new(base_path, options);
        reader.open_volume()?;
        reader.read_volume_header()?;
        Ok(reader)
    }

    /// Resolve and open the file of the current volume.
    pub fn open_volume(&mut self) -> Result<()> {
        let path = resolve_volume_path(&self.base_path, self.current_volume)?;
        let file = File::open(&path).map_err(|source| ArchiveError::Open {
            path: path.clone(),
            source,
        })?;
        if !file.metadata()?.is_file() {
            return Err(ArchiveError::NotRegularFile(path));
        }
        debug!("opened volume {} at {}", self.current_volume, path.display());
        self.stream = Some(file);
        self.volume_path = path;
        self.stats.volumes_opened += 1;
        Ok(())
    }

    /// Close the current volume.  Returns false when nothing was open.
    pub fn close(&mut self) -> bool {
        self.stream.take().is_some()
    }

    /// Roll over: close this volume, open the next one and check its header.
    pub fn next_volume(&mut self) -> Result<()> {
        self.close();
        self.current_volume += 1;
        debug!("rolling over to volume {}", self.current_volume);
        self.open_volume()?;
        self.read_volume_header()?;
        Ok(())
    }
}

/// Zero-filled buffer of `size` bytes; allocation failure is reported, not
/// aborted on.
pub(crate) fn alloc_buffer(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| ArchiveError::Allocation { size })?;
    buf.resize(size, 0);
    Ok(buf)
}
