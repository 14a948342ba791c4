//! Dated trial store.
//!
//! One CSV file per local calendar day, named `<prefix>_MMDDYY.csv`, inside a
//! data folder. The target file is resolved from the clock on every call, so
//! a session that runs past midnight starts a new file on its first write of
//! the new day. Nothing is cached between calls.
//!
//! Appends are a full read-modify-write of the day's file. The rewrite goes
//! to a sibling temporary file that then replaces the store. There is no
//! locking: a single writer (the reader thread) is assumed.

use crate::config::StorageConfig;
use crate::data::trial::{TrialRecord, TrialRow, COLUMNS};
use crate::error::{LogError, ParseError};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Date part of the store file name.
pub const FILE_DATE_FORMAT: &str = "%m%d%y";

const STORE_EXTENSION: &str = "csv";

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The machine's local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock for simulations and tests.
#[derive(Debug)]
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    /// Clock frozen at `at`.
    pub fn new(at: NaiveDateTime) -> Self {
        Self(Mutex::new(at))
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: NaiveDateTime) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Name and location of the store for the current day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogIdentity {
    /// File name, e.g. `Carousel_110725.csv`
    pub display_name: String,
    /// Absolute path inside the data folder
    pub full_path: PathBuf,
}

/// Date-scoped, append-only trial store.
pub struct TrialLog {
    root: PathBuf,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TrialLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialLog")
            .field("root", &self.root)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl TrialLog {
    /// Open the store rooted at `root`, creating the folder if needed.
    ///
    /// This is the one failure that makes the store unusable for a session.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LogError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|source| LogError::CreateFolder {
            path: root.to_path_buf(),
            source,
        })?;
        let root = fs::canonicalize(root).map_err(|source| LogError::CreateFolder {
            path: root.to_path_buf(),
            source,
        })?;
        info!("Trial data folder: {}", root.display());

        Ok(Self {
            root,
            prefix: "Carousel".to_string(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Open the store described by the `[storage]` configuration section.
    pub fn from_config(config: &StorageConfig) -> Result<Self, LogError> {
        Ok(Self::open(&config.data_dir)?.with_prefix(config.file_prefix.clone()))
    }

    /// Use `prefix` instead of `Carousel` in file names.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Resolve dates and timestamps from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Absolute path of the data folder.
    pub fn data_folder(&self) -> &Path {
        &self.root
    }

    /// File name of the store for `date`.
    pub fn file_name_for(&self, date: NaiveDate) -> String {
        format!(
            "{}_{}.{}",
            self.prefix,
            date.format(FILE_DATE_FORMAT),
            STORE_EXTENSION
        )
    }

    /// Store that a write made right now would go to.
    pub fn current_identity(&self) -> LogIdentity {
        let display_name = self.file_name_for(self.clock.now().date());
        LogIdentity {
            full_path: self.root.join(&display_name),
            display_name,
        }
    }

    /// Whether today's store has been created yet.
    pub fn file_exists(&self) -> bool {
        self.current_identity().full_path.is_file()
    }

    /// Parse a `DATA,...` line, stamping it with the store's clock.
    pub fn parse_line(&self, line: &str) -> Result<TrialRecord, ParseError> {
        TrialRecord::parse(line, self.clock.now())
    }

    /// Persist `record` as the last row of today's store.
    pub fn append(&self, record: &TrialRecord) -> Result<(), LogError> {
        let identity = self.current_identity();
        let path = identity.full_path;

        let mut rows = if path.exists() {
            read_rows(&path)?
        } else {
            info!("Creating trial store {}", identity.display_name);
            Vec::new()
        };
        rows.push(TrialRow::from(record));

        write_rows(&path, &rows)?;
        debug!(
            trial = record.trial,
            rows = rows.len(),
            "Appended trial to {}",
            identity.display_name
        );
        Ok(())
    }

    /// Every record in today's store, in insertion order.
    pub fn records(&self) -> Result<Vec<TrialRecord>, LogError> {
        let path = self.current_identity().full_path;
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_rows(&path)?
            .into_iter()
            .map(|row| {
                TrialRecord::try_from(row).map_err(|reason| LogError::CorruptStore {
                    path: path.clone(),
                    reason,
                })
            })
            .collect()
    }

    /// Number of records in today's store; 0 if it is missing or unreadable.
    pub fn trial_count(&self) -> usize {
        let path = self.current_identity().full_path;
        if !path.exists() {
            return 0;
        }
        read_rows(&path).map(|rows| rows.len()).unwrap_or(0)
    }
}

fn read_rows(path: &Path) -> Result<Vec<TrialRow>, LogError> {
    let corrupt = |e: csv::Error| LogError::CorruptStore {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut reader = csv::Reader::from_path(path).map_err(corrupt)?;
    let headers = reader.headers().map_err(corrupt)?;
    if !headers.is_empty() && headers.iter().ne(COLUMNS) {
        return Err(LogError::CorruptStore {
            path: path.to_path_buf(),
            reason: format!(
                "unexpected header row '{}'",
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        });
    }
    reader
        .deserialize()
        .collect::<Result<Vec<TrialRow>, csv::Error>>()
        .map_err(corrupt)
}

fn write_rows(path: &Path, rows: &[TrialRow]) -> Result<(), LogError> {
    let tmp_path = temp_path_for(path);

    let result = write_temp(&tmp_path, rows)
        .and_then(|()| fs::rename(&tmp_path, path).map_err(LogError::from));
    if result.is_err() && tmp_path.exists() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!("Could not remove {}: {}", tmp_path.display(), e);
        }
    }
    result
}

fn write_temp(tmp_path: &Path, rows: &[TrialRow]) -> Result<(), LogError> {
    let mut writer = csv::Writer::from_path(tmp_path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    PathBuf::from(tmp_name)
}
