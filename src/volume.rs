//! Volume file naming.
//!
//! Volume 0 is the user-supplied path (`backup.fsa`).  Volume N ≥ 1 replaces
//! the extension with the volume number: two zero-padded digits for 1–99
//! (`backup.05`), plain decimal from 100 on (`backup.150`).

use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Shortest accepted base path: the archive extension plus one character.
pub const MIN_BASE_PATH_LEN: usize = 4;

/// Compute the on-disk path of `volume` for the archive at `base_path`.
pub fn resolve_volume_path(base_path: &Path, volume: u32) -> Result<PathBuf> {
    let base = base_path
        .to_str()
        .ok_or_else(|| ArchiveError::InvalidBasePath(base_path.to_string_lossy().into_owned()))?;
    if base.chars().count() < MIN_BASE_PATH_LEN {
        return Err(ArchiveError::InvalidBasePath(base.to_owned()));
    }

    if volume == 0 {
        return Ok(std::fs::canonicalize(base_path).unwrap_or_else(|_| base_path.to_path_buf()));
    }

    let mut path = volume_stem(base).to_owned();
    if volume < 100 {
        path.push_str(&format!("{volume:02}"));
    } else {
        path.push_str(&volume.to_string());
    }
    Ok(PathBuf::from(path))
}

/// Everything up to and including the last `.` of the file name.  A file
/// name without an extension loses its last two characters instead.
fn volume_stem(base: &str) -> &str {
    let name_start = base.rfind(std::path::MAIN_SEPARATOR).map_or(0, |i| i + 1);
    match base[name_start..].rfind('.') {
        Some(dot) => &base[..name_start + dot + 1],
        None => {
            let cut = base
                .char_indices()
                .rev()
                .nth(1)
                .map_or(0, |(i, _)| i);
            &base[..cut]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_volumes() {
        let base = Path::new("/a/b/archive.fsa");
        assert_eq!(resolve_volume_path(base, 1).unwrap(), PathBuf::from("/a/b/archive.01"));
        assert_eq!(resolve_volume_path(base, 5).unwrap(), PathBuf::from("/a/b/archive.05"));
        assert_eq!(resolve_volume_path(base, 99).unwrap(), PathBuf::from("/a/b/archive.99"));
        assert_eq!(resolve_volume_path(base, 100).unwrap(), PathBuf::from("/a/b/archive.100"));
        assert_eq!(resolve_volume_path(base, 150).unwrap(), PathBuf::from("/a/b/archive.150"));
    }

    #[test]
    fn first_volume_falls_back_to_verbatim_path() {
        let base = Path::new("/definitely/not/here/archive.fsa");
        assert_eq!(resolve_volume_path(base, 0).unwrap(), base.to_path_buf());
    }

    #[test]
    fn first_volume_is_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("disk.fsa");
        std::fs::write(&file, b"").unwrap();
        let dotted = dir.path().join(".").join("disk.fsa");
        assert_eq!(
            resolve_volume_path(&dotted, 0).unwrap(),
            std::fs::canonicalize(&file).unwrap()
        );
    }

    #[test]
    fn short_base_path_is_rejected() {
        assert!(matches!(
            resolve_volume_path(Path::new("a.f"), 0),
            Err(ArchiveError::InvalidBasePath(_))
        ));
        assert!(resolve_volume_path(Path::new(".fsa"), 2).is_ok());
    }

    #[test]
    fn dots_in_directories_are_ignored() {
        let base = Path::new("/mnt/v1.2/backup");
        assert_eq!(resolve_volume_path(base, 3).unwrap(), PathBuf::from("/mnt/v1.2/back03"));
    }
}
