//! Storage backend (Parquet)
//!
//! **Directory contract**:
//! - One directory holds the group store file and the per-trial raw files
//! - Per-trial files are recognized by a reserved marker in their name
//!   (default `"data"`), so the store's own file name must not contain it
//!
//! **Write pattern**: the whole store is rewritten on save. The new contents
//! go to a hidden sibling file that is renamed over the target once fully
//! written, so a crash mid-save leaves the previous store intact.
//!
//! No locking: one writer process per store file.

mod codec;

pub use codec::VARIABLE_COLUMN;

use std::borrow::Cow;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::store::{GroupStore, Store, StoreFormat};
use crate::{Error, Result};

/// Substring that marks per-trial raw files in a store directory.
pub const DEFAULT_RESERVED_MARKER: &str = "data";

/// Rows per Parquet row group when saving.
pub const DEFAULT_MAX_ROW_GROUP_SIZE: usize = 8192;

/// Store file options
#[derive(Debug, Clone)]
pub struct StoreOptions {
    reserved_marker: String,
    max_row_group_size: usize,
    sync_on_save: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            reserved_marker: DEFAULT_RESERVED_MARKER.to_string(),
            max_row_group_size: DEFAULT_MAX_ROW_GROUP_SIZE,
            sync_on_save: true,
        }
    }
}

impl StoreOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the marker identifying per-trial raw files (empty disables the check)
    #[must_use]
    pub fn reserved_marker(mut self, marker: impl Into<String>) -> Self {
        self.reserved_marker = marker.into();
        self
    }

    /// Set rows per Parquet row group
    #[must_use]
    pub const fn max_row_group_size(mut self, rows: usize) -> Self {
        self.max_row_group_size = rows;
        self
    }

    /// Flush the written file to disk before replacing the old store
    #[must_use]
    pub const fn sync_on_save(mut self, sync: bool) -> Self {
        self.sync_on_save = sync;
        self
    }

    /// Get the reserved per-trial marker
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.reserved_marker
    }
}

/// Location of one group store file.
///
/// # Example
///
/// ```rust,no_run
/// use trial_store::storage::StoreFile;
/// use trial_store::store::StoreFormat;
///
/// # fn main() -> trial_store::Result<()> {
/// let file = StoreFile::new("results/field_sweep", "group.parquet")?;
/// let store = file.load_or_create(StoreFormat::Records)?;
/// file.save(&store)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StoreFile {
    directory: PathBuf,
    file_name: String,
    options: StoreOptions,
}

impl StoreFile {
    /// Create a store file handle with default options.
    ///
    /// # Errors
    /// `InvalidInput` if the file name is empty, contains a path separator
    /// or contains the reserved per-trial marker.
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Result<Self> {
        Self::with_options(directory, file_name, StoreOptions::default())
    }

    /// Create a store file handle with custom options.
    ///
    /// # Errors
    /// Same as [`new`](Self::new).
    pub fn with_options(
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        options: StoreOptions,
    ) -> Result<Self> {
        let file_name = file_name.into();
        if file_name.is_empty() {
            return Err(Error::InvalidInput("store file name is empty".to_string()));
        }
        if file_name.contains(['/', '\\']) {
            return Err(Error::InvalidInput(format!(
                "store file name '{file_name}' must not contain path separators"
            )));
        }
        let marker = options.marker();
        if !marker.is_empty() && file_name.contains(marker) {
            return Err(Error::InvalidInput(format!(
                "store file name '{file_name}' contains '{marker}', which marks per-trial data files"
            )));
        }

        Ok(Self {
            directory: directory.into(),
            file_name,
            options,
        })
    }

    /// Get the store directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Get the store file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Full path of the store file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Check whether the store file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Load the store, or return an empty one if nothing exists at its path.
    ///
    /// The directory is created if missing. No conversion between stored and
    /// requested representation is needed: the file always holds the record
    /// form and the table form is projected from it.
    ///
    /// # Errors
    /// Storage faults if the directory cannot be created or the path cannot
    /// be read or decoded as a store (including a directory in its place).
    pub fn load_or_create(&self, format: StoreFormat) -> Result<Store> {
        self.ensure_directory()?;

        let path = self.path();
        if !path.exists() {
            info!(path = %path.display(), "no group data found, starting empty store");
            return Ok(Store::empty(format));
        }

        let file = File::open(&path).map_err(|e| Error::path_io(&path, e))?;
        let records = codec::read_store(file).map_err(|e| match e {
            Error::StorageError(msg) => Error::StorageError(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        info!(
            path = %path.display(),
            variables = records.variable_count(),
            trials = records.trial_count(),
            "group data loaded"
        );

        match format {
            StoreFormat::Records => Ok(Store::Records(records)),
            StoreFormat::Tables => Ok(Store::Tables(records.to_tables()?)),
        }
    }

    /// Save the store, replacing any existing file.
    ///
    /// # Returns
    /// Path of the written file.
    ///
    /// # Errors
    /// Storage faults if the file cannot be written; the previous file is
    /// left in place and the staging file is removed.
    pub fn save(&self, store: &Store) -> Result<PathBuf> {
        let records = match store {
            Store::Records(records) => Cow::Borrowed(records),
            Store::Tables(tables) => Cow::Owned(tables.to_records()?),
        };
        self.save_records(&records)
    }

    /// Save a record-form store, replacing any existing file.
    ///
    /// # Errors
    /// Same as [`save`](Self::save).
    pub fn save_records(&self, store: &GroupStore) -> Result<PathBuf> {
        self.ensure_directory()?;

        let target = self.path();
        let staging = self.directory.join(format!(".{}.tmp", self.file_name));

        if let Err(e) = self.write_and_replace(store, &staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        info!(
            path = %target.display(),
            variables = store.variable_count(),
            trials = store.trial_count(),
            "group data saved"
        );
        Ok(target)
    }

    /// Per-trial raw files in the store directory, sorted by name.
    ///
    /// A missing directory yields an empty list.
    ///
    /// # Errors
    /// `PathIo` if the directory cannot be listed.
    pub fn trial_files(&self) -> Result<Vec<PathBuf>> {
        let marker = self.options.marker();
        if marker.is_empty() || !self.directory.is_dir() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&self.directory).map_err(|e| Error::path_io(&self.directory, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::path_io(&self.directory, e))?;
            let path = entry.path();
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.contains(marker));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn write_and_replace(&self, store: &GroupStore, staging: &Path, target: &Path) -> Result<()> {
        let file = File::create(staging).map_err(|e| Error::path_io(staging, e))?;
        codec::write_store(store, file, self.options.max_row_group_size)?;
        if self.options.sync_on_save {
            File::open(staging)
                .and_then(|f| f.sync_all())
                .map_err(|e| Error::path_io(staging, e))?;
        }
        fs::rename(staging, target).map_err(|e| Error::path_io(target, e))
    }

    fn ensure_directory(&self) -> Result<()> {
        if self.directory.is_dir() {
            return Ok(());
        }
        info!(directory = %self.directory.display(), "making new directory to save data");
        fs::create_dir_all(&self.directory).map_err(|e| Error::path_io(&self.directory, e))?;
        debug!(directory = %self.directory.display(), "directory created");
        Ok(())
    }
}

/// Load the group store in `directory/file_name`, or start an empty one.
///
/// # Errors
/// See [`StoreFile::new`] and [`StoreFile::load_or_create`].
pub fn load_or_create(
    directory: impl AsRef<Path>,
    file_name: &str,
    format: StoreFormat,
) -> Result<Store> {
    StoreFile::new(directory.as_ref(), file_name)?.load_or_create(format)
}

/// Save `store` to `directory/file_name`, replacing any existing file.
///
/// # Errors
/// See [`StoreFile::new`] and [`StoreFile::save`].
pub fn save(store: &Store, directory: impl AsRef<Path>, file_name: &str) -> Result<PathBuf> {
    StoreFile::new(directory.as_ref(), file_name)?.save(store)
}
