//! Single-member extraction from tile archives
//!
//! Tile archives are plain tar files holding a whole product tree (DEM,
//! quality masks, previews). Only the one elevation raster is ever needed, so
//! extraction pulls exactly that member by name and ignores the rest.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use tar::Archive;
use tracing::debug;

use crate::app::client::download::temp_path_for;
use crate::errors::{FetchError, FetchResult};

/// Extract `member` from the tar `archive` into `destination`
///
/// The member is written to a temporary sibling and renamed into place, so a
/// failed extraction never leaves a partial raster at `destination`.
///
/// # Errors
///
/// - [`FetchError::MissingMember`] if the archive has no such entry
/// - [`FetchError::Extraction`] if the archive is not a readable tar file
pub fn extract_member(archive: &Path, member: &str, destination: &Path) -> FetchResult<PathBuf> {
    let file = File::open(archive)?;
    let mut tar = Archive::new(BufReader::new(file));
    let wanted = normalize(Path::new(member));

    let entries = tar.entries().map_err(|e| extraction_error(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| extraction_error(archive, e))?;
        let path = entry.path().map_err(|e| extraction_error(archive, e))?;
        if normalize(&path) != wanted {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            return Err(FetchError::Extraction {
                archive: archive.to_path_buf(),
                reason: format!("{} is not a regular file", member),
            });
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = temp_path_for(destination);
        let written = match copy_entry(&mut entry, &temp_path) {
            Ok(written) => written,
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                return Err(extraction_error(archive, e));
            }
        };
        std::fs::rename(&temp_path, destination).map_err(|_e| {
            FetchError::AtomicOperationFailed {
                temp_path: temp_path.clone(),
                final_path: destination.to_path_buf(),
            }
        })?;

        debug!(
            "Extracted {} ({} bytes) to {}",
            member,
            written,
            destination.display()
        );
        return Ok(destination.to_path_buf());
    }

    Err(FetchError::MissingMember {
        archive: archive.to_path_buf(),
        member: member.to_string(),
    })
}

fn copy_entry(entry: &mut impl io::Read, temp_path: &Path) -> io::Result<u64> {
    let mut out = File::create(temp_path)?;
    let written = io::copy(entry, &mut out)?;
    out.sync_all()?;
    Ok(written)
}

/// Drop `.` components so `./a/b` and `a/b` compare equal
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn extraction_error(archive: &Path, e: io::Error) -> FetchError {
    FetchError::Extraction {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Build a tar archive with the given (path, contents) members
    pub(crate) fn build_archive(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_extracts_only_named_member() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tile.tar");
        build_archive(
            &archive,
            &[
                ("T/INFO/T_SRC.xml", b"<xml/>"),
                ("T/DEM/T_DEM.tif", b"raster-bytes"),
                ("T/PREVIEW/T_QL.kml", b"kml"),
            ],
        );

        let dest = dir.path().join("out").join("00000_T_DEM.tif");
        let extracted = extract_member(&archive, "T/DEM/T_DEM.tif", &dest).unwrap();

        assert_eq!(extracted, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"raster-bytes");
        assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 1);
    }

    #[test]
    fn test_dot_prefixed_members_match() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tile.tar");
        build_archive(&archive, &[("./T/DEM/T_DEM.dt2", b"dted")]);

        let dest = dir.path().join("t.dt2");
        assert!(extract_member(&archive, "T/DEM/T_DEM.dt2", &dest).is_ok());
    }

    #[test]
    fn test_missing_member() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tile.tar");
        build_archive(&archive, &[("T/DEM/OTHER.tif", b"x")]);

        let dest = dir.path().join("t.tif");
        let err = extract_member(&archive, "T/DEM/T_DEM.tif", &dest).unwrap_err();
        assert!(matches!(err, FetchError::MissingMember { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tile.tar");
        std::fs::write(&archive, vec![0x42u8; 700]).unwrap();

        let dest = dir.path().join("t.tif");
        assert!(extract_member(&archive, "T/DEM/T_DEM.tif", &dest).is_err());
        assert!(!dest.exists());
    }
}
