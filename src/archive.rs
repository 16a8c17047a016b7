//! Zip archive extraction for bundle payloads.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::{Error, Result};

/// Extract every entry of a zip archive into `dest_dir`, recreating
/// directories and writing files under each entry's relative path.
///
/// Entry names that resolve outside `dest_dir` (path traversal) are
/// rejected with [`Error::Extraction`]. The destination is expected to be
/// a fresh directory per call; entries are never merged across bundles.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        // enclosed_name sanitizes the entry path; a name that cannot be
        // contained under the destination is a hostile archive.
        let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            Error::extraction(format!(
                "entry {:?} in {} escapes the extraction directory",
                entry.name(),
                archive_path.display()
            ))
        })?;
        let target = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }
    }

    Ok(())
}
