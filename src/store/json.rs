//! JSON snapshot store.
//!
//! The whole corpus lives in one pretty-printed JSON document. Every commit
//! rewrites it through a sibling temp file followed by a rename, so the file
//! on disk always holds the last committed state.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{
    Device, FitKey, FitRecord, MainSweep, Measurement, PortType, RawSweep, ReferenceKey,
    ReferenceSweep, SweepKey,
};
use crate::error::StoreError;
use crate::store::{ImportCounts, MemoryStore, StoreSnapshot, SweepStore};

pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    /// Open `path`, or start empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = if path.exists() {
            MemoryStore::from_snapshot(read_snapshot(&path)?)
        } else {
            MemoryStore::new()
        };
        Ok(Self { path, inner })
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Merge an ingested corpus file and persist the result.
    pub fn import_file(&mut self, source: &Path) -> Result<ImportCounts, StoreError> {
        let counts = self.inner.import(read_snapshot(source)?);
        self.persist(&self.inner.committed_view())?;
        Ok(counts)
    }

    /// Write `contents` to the sibling temp file, then rename it over the
    /// store file. A failed write leaves no temp file behind.
    fn persist<T: Serialize>(&self, contents: &T) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        if let Err(err) = write_json(&tmp, contents) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        std::fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp);
            StoreError::Io {
                path: self.path.display().to_string(),
                source,
            }
        })
    }
}

fn write_json<T: Serialize>(path: &Path, contents: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, contents).map_err(|source| StoreError::Snapshot {
        path: path.display().to_string(),
        source,
    })?;
    writer.flush().map_err(io_err)
}

/// Read a snapshot document (a store file or an ingested corpus).
pub fn read_snapshot(path: &Path) -> Result<StoreSnapshot, StoreError> {
    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Snapshot {
        path: path.display().to_string(),
        source,
    })
}

impl SweepStore for JsonStore {
    fn count_raw_sweeps(&self) -> Result<usize, StoreError> {
        self.inner.count_raw_sweeps()
    }

    fn fetch_raw_sweeps(&self, offset: usize, limit: usize) -> Result<Vec<RawSweep>, StoreError> {
        self.inner.fetch_raw_sweeps(offset, limit)
    }

    fn count_main_sweeps(&self, port_type: PortType) -> Result<usize, StoreError> {
        self.inner.count_main_sweeps(port_type)
    }

    fn fetch_main_sweeps(
        &self,
        port_type: PortType,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MainSweep>, StoreError> {
        self.inner.fetch_main_sweeps(port_type, offset, limit)
    }

    fn measurement(&self, measurement_id: i64) -> Result<Option<Measurement>, StoreError> {
        self.inner.measurement(measurement_id)
    }

    fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        self.inner.device(device_id)
    }

    fn reference(&self, key: &ReferenceKey) -> Result<Option<ReferenceSweep>, StoreError> {
        self.inner.reference(key)
    }

    fn count_fit_records(&self) -> Result<usize, StoreError> {
        self.inner.count_fit_records()
    }

    fn fetch_fit_records(&self, offset: usize, limit: usize) -> Result<Vec<FitRecord>, StoreError> {
        self.inner.fetch_fit_records(offset, limit)
    }

    fn fit_record_keys(&self, sweep: SweepKey) -> Result<Vec<FitKey>, StoreError> {
        self.inner.fit_record_keys(sweep)
    }

    fn upsert_main_sweep(&mut self, sweep: MainSweep) -> Result<(), StoreError> {
        self.inner.upsert_main_sweep(sweep)
    }

    fn upsert_fit_record(&mut self, record: FitRecord) -> Result<(), StoreError> {
        self.inner.upsert_fit_record(record)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        // The file goes first; memory only moves once it is on disk.
        if let Err(err) = self.persist(&self.inner.staged_view()) {
            self.inner.rollback();
            return Err(err);
        }
        self.inner.commit()
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }
}
