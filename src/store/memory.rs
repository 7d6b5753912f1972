//! In-memory store.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize, Serializer};

use crate::domain::{
    Device, FitKey, FitRecord, MainSweep, Measurement, PortType, RawSweep, ReferenceKey,
    ReferenceSweep, SweepKey,
};
use crate::error::StoreError;
use crate::store::SweepStore;

/// Everything a store holds, in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub references: Vec<ReferenceSweep>,
    #[serde(default)]
    pub raw_sweeps: Vec<RawSweep>,
    #[serde(default)]
    pub main_sweeps: Vec<MainSweep>,
    #[serde(default)]
    pub fit_records: Vec<FitRecord>,
}

/// Counts of rows inserted by [`MemoryStore::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub measurements: usize,
    pub devices: usize,
    pub references: usize,
    pub raw_sweeps: usize,
}

impl ImportCounts {
    pub fn total(&self) -> usize {
        self.measurements + self.devices + self.references + self.raw_sweeps
    }
}

/// BTreeMap-backed store with staged writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    measurements: BTreeMap<i64, Measurement>,
    devices: BTreeMap<String, Device>,
    references: BTreeMap<ReferenceKey, ReferenceSweep>,
    raw_sweeps: BTreeMap<SweepKey, RawSweep>,
    main_sweeps: BTreeMap<SweepKey, MainSweep>,
    fit_records: BTreeMap<FitKey, FitRecord>,

    pending_main: BTreeMap<SweepKey, MainSweep>,
    pending_fits: BTreeMap<FitKey, FitRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let StoreSnapshot {
            measurements,
            devices,
            references,
            raw_sweeps,
            main_sweeps,
            fit_records,
        } = snapshot;

        let mut store = Self::new();
        store.import(StoreSnapshot {
            measurements,
            devices,
            references,
            raw_sweeps,
            ..StoreSnapshot::default()
        });
        for sweep in main_sweeps {
            store.main_sweeps.insert(sweep.key, sweep);
        }
        for record in fit_records {
            store.fit_records.insert(record.key, record);
        }
        store
    }

    /// Merge ingested inputs. Inputs are write-once: existing keys are kept
    /// and the incoming duplicate is ignored. Derived rows in `snapshot` are
    /// not imported.
    pub fn import(&mut self, snapshot: StoreSnapshot) -> ImportCounts {
        let mut counts = ImportCounts::default();
        for m in snapshot.measurements {
            if insert_if_absent(&mut self.measurements, m.measurement_id, m) {
                counts.measurements += 1;
            }
        }
        for d in snapshot.devices {
            if insert_if_absent(&mut self.devices, d.device_id.clone(), d) {
                counts.devices += 1;
            }
        }
        for r in snapshot.references {
            if insert_if_absent(&mut self.references, r.key.clone(), r) {
                counts.references += 1;
            }
        }
        for s in snapshot.raw_sweeps {
            if insert_if_absent(&mut self.raw_sweeps, s.key, s) {
                counts.raw_sweeps += 1;
            }
        }
        counts
    }

    /// Borrowed view of the committed contents.
    pub fn committed_view(&self) -> StoreView<'_> {
        self.view(None)
    }

    /// Borrowed view of what the next `commit` would publish: committed rows
    /// with staged writes applied on top. Nothing is copied.
    pub fn staged_view(&self) -> StoreView<'_> {
        self.view(Some((&self.pending_main, &self.pending_fits)))
    }

    fn view<'a>(
        &'a self,
        pending: Option<(&'a BTreeMap<SweepKey, MainSweep>, &'a BTreeMap<FitKey, FitRecord>)>,
    ) -> StoreView<'a> {
        StoreView {
            measurements: Staged::committed(&self.measurements),
            devices: Staged::committed(&self.devices),
            references: Staged::committed(&self.references),
            raw_sweeps: Staged::committed(&self.raw_sweeps),
            main_sweeps: Staged {
                committed: &self.main_sweeps,
                pending: pending.map(|(main, _)| main),
            },
            fit_records: Staged {
                committed: &self.fit_records,
                pending: pending.map(|(_, fits)| fits),
            },
        }
    }

    /// Committed fit records of one sweep, by resonance index.
    pub fn fit_records_for(&self, key: SweepKey) -> Vec<FitRecord> {
        self.fit_records
            .range(sweep_fit_keys(key))
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !(self.pending_main.is_empty() && self.pending_fits.is_empty())
    }
}

fn sweep_fit_keys(key: SweepKey) -> RangeInclusive<FitKey> {
    let lo = FitKey {
        measurement_id: key.measurement_id,
        sweep_id: key.sweep_id,
        resonance_id: 0,
    };
    let hi = FitKey {
        resonance_id: u32::MAX,
        ..lo
    };
    lo..=hi
}

/// Serializes with the same layout as [`StoreSnapshot`] while borrowing the
/// store's tables.
#[derive(Serialize)]
pub struct StoreView<'a> {
    measurements: Staged<'a, i64, Measurement>,
    devices: Staged<'a, String, Device>,
    references: Staged<'a, ReferenceKey, ReferenceSweep>,
    raw_sweeps: Staged<'a, SweepKey, RawSweep>,
    main_sweeps: Staged<'a, SweepKey, MainSweep>,
    fit_records: Staged<'a, FitKey, FitRecord>,
}

/// A table's values in key order, with an optional overlay of staged rows.
struct Staged<'a, K, V> {
    committed: &'a BTreeMap<K, V>,
    pending: Option<&'a BTreeMap<K, V>>,
}

impl<'a, K, V> Staged<'a, K, V> {
    fn committed(committed: &'a BTreeMap<K, V>) -> Self {
        Self {
            committed,
            pending: None,
        }
    }
}

impl<K: Ord, V: Serialize> Serialize for Staged<'_, K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.pending {
            Some(pending) => serializer.collect_seq(merge_staged(self.committed, pending)),
            None => serializer.collect_seq(self.committed.values()),
        }
    }
}

/// Key-ordered union of two maps; on equal keys the staged row wins.
fn merge_staged<'a, K: Ord, V>(
    committed: &'a BTreeMap<K, V>,
    pending: &'a BTreeMap<K, V>,
) -> impl Iterator<Item = &'a V> {
    let mut a = committed.iter().peekable();
    let mut b = pending.iter().peekable();
    std::iter::from_fn(move || {
        let order = match (a.peek(), b.peek()) {
            (Some((ka, _)), Some((kb, _))) => ka.cmp(kb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => return None,
        };
        let next = match order {
            Ordering::Less => a.next(),
            Ordering::Greater => b.next(),
            Ordering::Equal => {
                a.next();
                b.next()
            }
        };
        next.map(|(_, v)| v)
    })
}

fn insert_if_absent<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: V) -> bool {
    if map.contains_key(&key) {
        return false;
    }
    map.insert(key, value);
    true
}

impl SweepStore for MemoryStore {
    fn count_raw_sweeps(&self) -> Result<usize, StoreError> {
        Ok(self.raw_sweeps.len())
    }

    fn fetch_raw_sweeps(&self, offset: usize, limit: usize) -> Result<Vec<RawSweep>, StoreError> {
        Ok(self
            .raw_sweeps
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_main_sweeps(&self, port_type: PortType) -> Result<usize, StoreError> {
        Ok(self
            .main_sweeps
            .values()
            .filter(|s| s.port_type == port_type)
            .count())
    }

    fn fetch_main_sweeps(
        &self,
        port_type: PortType,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MainSweep>, StoreError> {
        Ok(self
            .main_sweeps
            .values()
            .filter(|s| s.port_type == port_type)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn measurement(&self, measurement_id: i64) -> Result<Option<Measurement>, StoreError> {
        Ok(self.measurements.get(&measurement_id).cloned())
    }

    fn device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.devices.get(device_id).cloned())
    }

    fn reference(&self, key: &ReferenceKey) -> Result<Option<ReferenceSweep>, StoreError> {
        Ok(self.references.get(key).cloned())
    }

    fn count_fit_records(&self) -> Result<usize, StoreError> {
        Ok(self.fit_records.len())
    }

    fn fetch_fit_records(&self, offset: usize, limit: usize) -> Result<Vec<FitRecord>, StoreError> {
        Ok(self
            .fit_records
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn fit_record_keys(&self, sweep: SweepKey) -> Result<Vec<FitKey>, StoreError> {
        Ok(self.fit_records.range(sweep_fit_keys(sweep)).map(|(k, _)| *k).collect())
    }

    fn upsert_main_sweep(&mut self, sweep: MainSweep) -> Result<(), StoreError> {
        self.pending_main.insert(sweep.key, sweep);
        Ok(())
    }

    fn upsert_fit_record(&mut self, record: FitRecord) -> Result<(), StoreError> {
        self.pending_fits.insert(record.key, record);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.main_sweeps.append(&mut self.pending_main);
        self.fit_records.append(&mut self.pending_fits);
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending_main.clear();
        self.pending_fits.clear();
    }
}
