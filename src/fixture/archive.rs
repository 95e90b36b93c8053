//! Corpus archive
//!
//! A corpus is shared as a gzip-compressed tar of its directory tree. Appending
//! unpacks into a scratch directory, adds the entry, packs a new archive next to
//! the target, checks that it reads back, and only then renames it over the old
//! one. A failed export leaves the previous archive untouched.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tar::{Archive, Builder};
use tempfile::{NamedTempFile, TempDir};
use tracing::info;

use super::corpus::Corpus;
use super::{ExportOptions, FixtureEntry, FixtureError, WriteOutcome};

/// Pack the contents of `dir` into a `.tar.gz` stream
pub fn pack_dir<W: Write>(dir: &Path, writer: W) -> Result<W, FixtureError> {
    let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));
    builder
        .append_dir_all("", dir)
        .map_err(|e| FixtureError::io(dir, e))?;
    let encoder = builder.into_inner().map_err(|e| FixtureError::io(dir, e))?;
    encoder.finish().map_err(|e| FixtureError::io(dir, e))
}

/// Unpack an archive into `dest`
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<(), FixtureError> {
    let file = File::open(archive_path).map_err(|e| FixtureError::io(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.unpack(dest).map_err(|source| FixtureError::ArchiveCorrupt {
        path: archive_path.to_path_buf(),
        source,
    })
}

/// Read every member header of an archive; returns the member count
pub fn verify(archive_path: &Path) -> Result<usize, FixtureError> {
    let corrupt = |source| FixtureError::ArchiveCorrupt {
        path: archive_path.to_path_buf(),
        source,
    };
    let file = File::open(archive_path).map_err(|e| FixtureError::io(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut count = 0;
    for member in archive.entries().map_err(corrupt)? {
        member.map_err(corrupt)?;
        count += 1;
    }
    Ok(count)
}

/// Append an entry to the archive at `archive_path`, creating it if missing
pub fn merge_into_archive(
    archive_path: &Path,
    entry: &FixtureEntry,
    options: &ExportOptions,
) -> Result<WriteOutcome, FixtureError> {
    let scratch = TempDir::new().map_err(|e| FixtureError::io(std::env::temp_dir(), e))?;
    if archive_path.exists() {
        unpack(archive_path, scratch.path())?;
    }

    let corpus = Corpus::new(scratch.path());
    let outcome = corpus.write_entry(entry, options)?;
    if let WriteOutcome::Duplicate { .. } = outcome {
        return Ok(outcome);
    }

    let parent = match archive_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| FixtureError::io(parent, e))?;

    let staged = NamedTempFile::new_in(parent).map_err(|e| FixtureError::io(parent, e))?;
    let staged_writer = staged
        .reopen()
        .map_err(|e| FixtureError::io(staged.path(), e))?;
    let staged_file = pack_dir(scratch.path(), staged_writer)?;
    staged_file
        .sync_all()
        .map_err(|e| FixtureError::io(staged.path(), e))?;

    let members = verify(staged.path())?;
    staged
        .persist(archive_path)
        .map_err(|e| FixtureError::io(archive_path, e.error))?;

    info!(
        "Merged entry {} into {} ({} members)",
        outcome.entry_id(),
        archive_path.display(),
        members
    );
    Ok(outcome)
}

/// A corpus archive unpacked into a temporary directory, removed on drop
#[derive(Debug)]
pub struct UnpackedArchive {
    _dir: TempDir,
    corpus: Corpus,
}

impl UnpackedArchive {
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }
}

pub fn open_archive(archive_path: &Path) -> Result<UnpackedArchive, FixtureError> {
    let dir = TempDir::new().map_err(|e| FixtureError::io(std::env::temp_dir(), e))?;
    unpack(archive_path, dir.path())?;
    let corpus = Corpus::new(dir.path());
    Ok(UnpackedArchive { _dir: dir, corpus })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureRow;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::collections::BTreeMap;
    use std::io::Cursor;

    fn entry(seed: u8) -> FixtureEntry {
        let image = RgbaImage::from_pixel(3, 3, Rgba([seed, 0, 0, 255]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        FixtureEntry {
            image: buffer.into_inner(),
            fragments_by_pass: BTreeMap::new(),
            rows: vec![FixtureRow {
                attribute: "servingAmount".to_string(),
                value1: None,
                value2: None,
                double: Some("1".to_string()),
                string: None,
            }],
        }
    }

    #[test]
    fn test_merge_creates_and_appends() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("corpus.tar.gz");

        let options = ExportOptions::default();
        let first = merge_into_archive(&archive_path, &entry(1), &options).unwrap();
        let second = merge_into_archive(&archive_path, &entry(2), &options).unwrap();
        assert!(matches!(first, WriteOutcome::Written { .. }));
        assert!(matches!(second, WriteOutcome::Written { .. }));

        let unpacked = open_archive(&archive_path).unwrap();
        let mut ids = unpacked.corpus().list_entry_ids().unwrap();
        ids.sort();
        let mut expected = vec![first.entry_id(), second.entry_id()];
        expected.sort();
        assert_eq!(ids, expected);

        let stored = unpacked.corpus().read_entry(first.entry_id()).unwrap();
        assert_eq!(stored.entry.image, entry(1).image);
        assert_eq!(stored.entry.rows, entry(1).rows);
    }

    #[test]
    fn test_duplicate_leaves_archive_untouched() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("corpus.tar.gz");
        merge_into_archive(&archive_path, &entry(7), &ExportOptions::default()).unwrap();
        let before = std::fs::read(&archive_path).unwrap();

        let outcome =
            merge_into_archive(&archive_path, &entry(7), &ExportOptions::default()).unwrap();
        assert!(matches!(outcome, WriteOutcome::Duplicate { .. }));
        assert_eq!(std::fs::read(&archive_path).unwrap(), before);
    }

    #[test]
    fn test_corrupt_archive_is_reported_and_kept() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("corpus.tar.gz");
        std::fs::write(&archive_path, b"definitely not gzip").unwrap();

        let err =
            merge_into_archive(&archive_path, &entry(9), &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, FixtureError::ArchiveCorrupt { .. }));
        assert_eq!(std::fs::read(&archive_path).unwrap(), b"definitely not gzip");
    }

    #[test]
    fn test_verify_counts_members() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("x.tar.gz");
        pack_dir(dir.path(), File::create(&archive_path).unwrap()).unwrap();
        assert_eq!(verify(&archive_path).unwrap(), 1);
    }
}
