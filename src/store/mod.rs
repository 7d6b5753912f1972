//! Storage contract between the reduction pipeline and whatever holds the corpus.
//!
//! The pipeline only needs paginated reads of sweeps and fit records, three point lookups and
//! insert-or-replace writes of its own outputs. Writes are staged until
//! `commit`, which is the unit of atomicity; `rollback` drops them. Reads see
//! committed data only.
//!
//! - `MemoryStore`: BTreeMap-backed reference implementation
//! - `JsonStore`: a `MemoryStore` persisted to a JSON snapshot on every commit

pub mod json;
pub mod memory;

pub use json::*;
pub use memory::*;

use crate::domain::{
    Device, FitKey, FitRecord, MainSweep, Measurement, PortType, RawSweep, ReferenceKey,
    ReferenceSweep, SweepKey,
};
use crate::error::StoreError;

/// Blocking, synchronous access to the sweep corpus.
///
/// Paginated queries return rows in ascending `(measurement_id, sweep_id)`
/// order so that offset/limit batching is deterministic.
pub trait SweepStore {
    fn count_raw_sweeps(&self) -> Result<usize, StoreError>;

    fn fetch_raw_sweeps(&self, offset: usize, limit: usize) -> Result<Vec<RawSweep>, StoreError>;

    fn count_main_sweeps(&self, port_type: PortType) -> Result<usize, StoreError>;

    fn fetch_main_sweeps(
        &self,
        port_type: PortType,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MainSweep>, StoreError>;

    fn measurement(&self, measurement_id: i64) -> Result<Option<Measurement>, StoreError>;

    fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError>;

    fn reference(&self, key: &ReferenceKey) -> Result<Option<ReferenceSweep>, StoreError>;

    fn count_fit_records(&self) -> Result<usize, StoreError>;

    /// Fit records in ascending `(measurement_id, sweep_id, resonance_id)` order.
    fn fetch_fit_records(&self, offset: usize, limit: usize) -> Result<Vec<FitRecord>, StoreError>;

    /// Keys of the committed fit records of one sweep, by resonance index.
    fn fit_record_keys(&self, sweep: SweepKey) -> Result<Vec<FitKey>, StoreError>;

    /// Insert or replace by `(measurement_id, sweep_id)`.
    fn upsert_main_sweep(&mut self, sweep: MainSweep) -> Result<(), StoreError>;

    /// Insert or replace by `(measurement_id, sweep_id, resonance_id)`.
    fn upsert_fit_record(&mut self, record: FitRecord) -> Result<(), StoreError>;

    /// Publish all staged writes.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard all staged writes.
    fn rollback(&mut self);
}
