//! Corpus directory layout
//!
//! ```text
//! Images/{entryId}_{sha256}.{ext}
//! Test Cases/With Correction/{entryId}.csv
//! Test Cases/Without Correction/{entryId}.csv
//! Test Cases/Fast Recognition/{entryId}.csv   (only when the pass saw text)
//! Expectations/{entryId}.csv
//! ```
//!
//! There is no index beyond file names. Entry ids are time-ordered, so listing
//! them sorted gives append order.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::{read_rows, write_rows};
use super::table::{read_fragments, write_fragments};
use super::{ExportOptions, FixtureEntry, FixtureError, StoredEntry, WriteOutcome};
use crate::vision::{compare_image_data, ensure_decodable, CompareError, PassKind, Percentage};

pub const IMAGES_DIR: &str = "Images";
pub const TEST_CASES_DIR: &str = "Test Cases";
pub const EXPECTATIONS_DIR: &str = "Expectations";
const TABLE_EXTENSION: &str = "csv";

/// A corpus rooted at a directory
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
}

impl Corpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn pass_dir(&self, pass: PassKind) -> PathBuf {
        self.root.join(TEST_CASES_DIR).join(pass.folder_name())
    }

    pub fn expectations_dir(&self) -> PathBuf {
        self.root.join(EXPECTATIONS_DIR)
    }

    fn table_path(dir: &Path, id: Uuid) -> PathBuf {
        dir.join(format!("{}.{}", id, TABLE_EXTENSION))
    }

    /// Create the folder skeleton
    pub fn ensure_layout(&self) -> Result<(), FixtureError> {
        let dirs = [
            self.images_dir(),
            self.pass_dir(PassKind::WithCorrection),
            self.pass_dir(PassKind::WithoutCorrection),
            self.expectations_dir(),
        ];
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| FixtureError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Append an entry. The image must decode. A failure part way through may
    /// leave some of the entry's files behind; nothing is rolled back.
    pub fn write_entry(
        &self,
        entry: &FixtureEntry,
        options: &ExportOptions,
    ) -> Result<WriteOutcome, FixtureError> {
        ensure_decodable(&entry.image)?;
        self.ensure_layout()?;

        if options.skip_duplicate_images {
            let tolerance = options.tolerance_percent;
            if let Some(existing_entry_id) = self.find_duplicate(&entry.image, tolerance)? {
                info!("Image already in corpus as {}; skipping", existing_entry_id);
                return Ok(WriteOutcome::Duplicate { existing_entry_id });
            }
        }

        let entry_id = Uuid::now_v7();
        let extension = image::guess_format(&entry.image)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or(options.image_extension_fallback.as_str());
        let image_path = self
            .images_dir()
            .join(format!("{}_{}.{}", entry_id, content_hash(&entry.image), extension));
        fs::write(&image_path, &entry.image).map_err(|e| FixtureError::io(&image_path, e))?;

        for pass in PassKind::ALL {
            let fragments = entry
                .fragments_by_pass
                .get(&pass)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if pass == PassKind::FastRecognition && fragments.is_empty() {
                continue;
            }
            let dir = self.pass_dir(pass);
            fs::create_dir_all(&dir).map_err(|e| FixtureError::io(&dir, e))?;
            let path = Self::table_path(&dir, entry_id);
            let file = File::create(&path).map_err(|e| FixtureError::io(&path, e))?;
            write_fragments(BufWriter::new(file), fragments)?;
        }

        let path = Self::table_path(&self.expectations_dir(), entry_id);
        let file = File::create(&path).map_err(|e| FixtureError::io(&path, e))?;
        write_rows(BufWriter::new(file), &entry.rows)?;

        info!(
            "Wrote corpus entry {} ({} rows) to {}",
            entry_id,
            entry.rows.len(),
            self.root.display()
        );
        Ok(WriteOutcome::Written { entry_id })
    }

    /// Ids of every entry, in append order
    pub fn list_entry_ids(&self) -> Result<Vec<Uuid>, FixtureError> {
        let dir = self.expectations_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for item in fs::read_dir(&dir).map_err(|e| FixtureError::io(&dir, e))? {
            let path = item.map_err(|e| FixtureError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn read_entry(&self, id: Uuid) -> Result<StoredEntry, FixtureError> {
        let image_path = self.image_path(id)?;
        let image = fs::read(&image_path).map_err(|e| FixtureError::io(&image_path, e))?;

        let mut fragments_by_pass = BTreeMap::new();
        for pass in PassKind::ALL {
            let path = Self::table_path(&self.pass_dir(pass), id);
            if !path.exists() {
                continue;
            }
            let file = File::open(&path).map_err(|e| FixtureError::io(&path, e))?;
            fragments_by_pass.insert(pass, read_fragments(file, pass)?);
        }

        let path = Self::table_path(&self.expectations_dir(), id);
        let file = File::open(&path).map_err(|e| FixtureError::io(&path, e))?;
        let rows = read_rows(file)?;

        Ok(StoredEntry {
            id,
            image_path,
            entry: FixtureEntry {
                image,
                fragments_by_pass,
                rows,
            },
        })
    }

    pub fn read_entries(&self) -> Result<Vec<StoredEntry>, FixtureError> {
        self.list_entry_ids()?
            .into_iter()
            .map(|id| self.read_entry(id))
            .collect()
    }

    /// Stored image file for an entry
    pub fn image_path(&self, id: Uuid) -> Result<PathBuf, FixtureError> {
        let prefix = format!("{}_", id);
        self.image_files()?
            .into_iter()
            .find(|(_, name)| name.starts_with(&prefix))
            .map(|(path, _)| path)
            .ok_or_else(|| {
                FixtureError::io(
                    self.images_dir().join(&prefix),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "entry image missing"),
                )
            })
    }

    /// Entry already holding this image: an identical content hash first,
    /// then a pixel comparison within `tolerance`. Stored images that no
    /// longer decode are skipped.
    pub fn find_duplicate(
        &self,
        image: &[u8],
        tolerance: Percentage,
    ) -> Result<Option<Uuid>, FixtureError> {
        ensure_decodable(image)?;
        let files = self.image_files()?;
        let hash = content_hash(image);

        for (_, name) in &files {
            if let Some((id, stored_hash)) = parse_image_name(name) {
                if stored_hash == hash {
                    debug!("Content hash matches entry {}", id);
                    return Ok(Some(id));
                }
            }
        }

        for (path, name) in &files {
            let Some((id, _)) = parse_image_name(name) else {
                continue;
            };
            let stored = fs::read(path).map_err(|e| FixtureError::io(path, e))?;
            match compare_image_data(tolerance, &stored, image) {
                Ok(true) => return Ok(Some(id)),
                Ok(false) | Err(CompareError::DimensionMismatch { .. }) => {}
                Err(CompareError::DecodeFailure {
                    which: "expected", ..
                }) => {
                    warn!("Skipping undecodable corpus image {}", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    fn image_files(&self) -> Result<Vec<(PathBuf, String)>, FixtureError> {
        let dir = self.images_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for item in fs::read_dir(&dir).map_err(|e| FixtureError::io(&dir, e))? {
            let path = item.map_err(|e| FixtureError::io(&dir, e))?.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                let name = name.to_string();
                files.push((path, name));
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Hex SHA-256 of the encoded image
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// `{entryId}_{hash}.{ext}` -> (entryId, hash)
fn parse_image_name(name: &str) -> Option<(Uuid, &str)> {
    let stem = name.split('.').next()?;
    let (id, hash) = stem.split_once('_')?;
    Some((Uuid::parse_str(id).ok()?, hash))
}
