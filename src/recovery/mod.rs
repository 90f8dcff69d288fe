//! Whole-archive health scan.
//!
//! Walks every record of every volume through the normal record loop, reads
//! and verifies each block, and tries to decode it.  Corruption never aborts
//! the scan: bad blocks are counted, damaged regions are stepped over by
//! resynchronization, and a fatal error part-way through ends the walk but
//! still yields a report describing what was reached.
//!
//! | Quality | Meaning |
//! |---------|---------|
//! | `Full` | at least 95% of blocks healthy |
//! | `Partial` | at least 50% of blocks healthy |
//! | `HeaderOnly` | headers readable, no blocks found |
//! | `Catastrophic` | fewer than 50% of blocks healthy |

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use crate::codec::decode_block;
use crate::error::{ArchiveError, Result};
use crate::format::Magic;
use crate::reader::{
    ArchiveReader, ChecksumStatus, MainHeader, ReadStats, ReaderOptions, Record, VolumeHeader,
};

// ── Types ─────────────────────────────────────────────────────────────────────

/// Overall quality of the archive as seen by the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryQuality {
    Full,
    Partial,
    HeaderOnly,
    Catastrophic,
}

impl RecoveryQuality {
    fn rate(healthy: u64, total: u64) -> Self {
        if total == 0 {
            return RecoveryQuality::HeaderOnly;
        }
        let pct = healthy as f64 / total as f64 * 100.0;
        if pct >= 95.0 {
            RecoveryQuality::Full
        } else if pct >= 50.0 {
            RecoveryQuality::Partial
        } else {
            RecoveryQuality::Catastrophic
        }
    }
}

/// Report produced by [`scan_archive`].
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub volume_header:   VolumeHeader,
    pub main_header:     Option<MainHeader>,
    /// Volumes visited, including the one the scan stopped in.
    pub volumes:         u32,
    /// Non-block records, keyed by magic.
    pub records:         BTreeMap<String, u64>,
    pub total_blocks:    u64,
    /// Checksum passed (or was not checked) and the payload decoded.
    pub healthy_blocks:  u64,
    /// Payload checksum failed; data replaced by zeros.
    pub corrupt_blocks:  u64,
    /// Payload intact but not decodable by this build.
    pub undecodable_blocks: u64,
    pub blocks_per_filesystem: BTreeMap<u16, u64>,
    /// Sum of the original sizes of healthy blocks.
    pub recoverable_bytes: u64,
    /// Whether the footer of the last volume was reached.
    pub complete:        bool,
    /// Fatal error that ended the scan early.
    pub stopped_by:      Option<String>,
    pub stats:           ReadStats,
    pub quality:         RecoveryQuality,
}

impl ScanReport {
    /// Percentage of blocks that are healthy (0.0 to 100.0).
    pub fn health_pct(&self) -> f64 {
        if self.total_blocks == 0 { return 100.0; }
        self.healthy_blocks as f64 / self.total_blocks as f64 * 100.0
    }

    /// Summary line for display.
    pub fn summary(&self) -> String {
        format!(
            "{:?} recovery: {}/{} blocks healthy ({:.1}%) across {} volume(s), \
             {} corrupt region(s), {:.2} MiB recoverable{}",
            self.quality,
            self.healthy_blocks,
            self.total_blocks,
            self.health_pct(),
            self.volumes,
            self.stats.corrupt_regions.len(),
            self.recoverable_bytes as f64 / 1024.0 / 1024.0,
            if self.complete { "" } else { " (incomplete)" },
        )
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Open the archive at `path` and scan all of its volumes.
///
/// Only failing to open or validate volume 0 is returned as an error;
/// everything after that is described by the report.
pub fn scan_archive<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<ScanReport> {
    let mut reader = ArchiveReader::open(path, options)?;
    let volume_header = VolumeHeader {
        volume:          0,
        archive_id:      reader.archive_id(),
        file_format:     reader.file_format().unwrap_or_default().to_owned(),
        creator_version: reader.creator_version().unwrap_or_default().to_owned(),
    };
    scan(&mut reader, volume_header)
}

/// Scan the remaining records of an opened session.
///
/// Cancellation through the session's [`CancelFlag`](crate::reader::CancelFlag)
/// is returned as [`ArchiveError::Cancelled`].
pub fn scan(reader: &mut ArchiveReader<File>, volume_header: VolumeHeader) -> Result<ScanReport> {
    let mut main_header = None;
    let mut records: BTreeMap<String, u64> = BTreeMap::new();
    let mut blocks_per_filesystem: BTreeMap<u16, u64> = BTreeMap::new();

    let mut total_blocks       = 0u64;
    let mut healthy_blocks     = 0u64;
    let mut corrupt_blocks     = 0u64;
    let mut undecodable_blocks = 0u64;
    let mut recoverable_bytes  = 0u64;
    let mut complete           = false;
    let mut stopped_by         = None;

    loop {
        let volume = reader.current_volume();
        match reader.next_record(|_| false) {
            Ok(None) => {
                complete = true;
                break;
            }
            Ok(Some(Record::Header(rec))) => {
                if rec.magic == Magic::MAIN && main_header.is_none() {
                    match MainHeader::from_dictionary(rec.archive_id, &rec.dico) {
                        Ok(h) => {
                            reader.apply_main_header(&h);
                            main_header = Some(h);
                        }
                        Err(e) => warn!("unreadable main header: {e}"),
                    }
                }
                *records.entry(rec.magic.to_string()).or_default() += 1;
            }
            Ok(Some(Record::Block { filesystem_id, block, .. })) => {
                total_blocks += 1;
                *blocks_per_filesystem.entry(filesystem_id).or_default() += 1;
                if block.checksum_verified == ChecksumStatus::Failed {
                    corrupt_blocks += 1;
                    continue;
                }
                match decode_block(&block) {
                    Ok(_) => {
                        healthy_blocks += 1;
                        recoverable_bytes += block.uncompressed_size as u64;
                    }
                    Err(e) => {
                        warn!("block at offset {} cannot be decoded: {e}", block.stream_offset);
                        undecodable_blocks += 1;
                    }
                }
            }
            Err(ArchiveError::Cancelled) => return Err(ArchiveError::Cancelled),
            Err(e) => {
                warn!("scan stopped in volume {volume}: {e}");
                stopped_by = Some(e.to_string());
                break;
            }
        }
    }

    let quality = RecoveryQuality::rate(healthy_blocks, total_blocks);
    let report = ScanReport {
        volume_header,
        main_header,
        volumes: reader.current_volume() + 1,
        records,
        total_blocks,
        healthy_blocks,
        corrupt_blocks,
        undecodable_blocks,
        blocks_per_filesystem,
        recoverable_bytes,
        complete,
        stopped_by,
        stats: reader.stats().clone(),
        quality,
    };
    info!("{}", report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_thresholds() {
        assert_eq!(RecoveryQuality::rate(0, 0), RecoveryQuality::HeaderOnly);
        assert_eq!(RecoveryQuality::rate(95, 100), RecoveryQuality::Full);
        assert_eq!(RecoveryQuality::rate(94, 100), RecoveryQuality::Partial);
        assert_eq!(RecoveryQuality::rate(50, 100), RecoveryQuality::Partial);
        assert_eq!(RecoveryQuality::rate(49, 100), RecoveryQuality::Catastrophic);
    }
}
