//! Export fit records to CSV.
//!
//! One row per resonance, spreadsheet friendly: fit parameters and their
//! variances get their own columns and undefined FOMs are empty cells.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::domain::FitRecord;
use crate::error::AppError;
use crate::store::SweepStore;

/// Records read from the store per page.
pub const EXPORT_PAGE: usize = 1000;

#[derive(Debug, Serialize)]
struct FitRow {
    measurement_id: i64,
    sweep_id: u32,
    resonance_id: u32,
    peak_wavelength_nm: f64,
    fsr_nm: Option<f64>,
    fwhm_nm: f64,
    bw_1db_nm: Option<f64>,
    crosstalk_db: Option<f64>,
    insertion_loss_db: Option<f64>,
    lambda0_nm: Option<f64>,
    alpha: Option<f64>,
    gamma_nm: Option<f64>,
    var_lambda0: Option<f64>,
    var_alpha: Option<f64>,
    var_gamma: Option<f64>,
    fit_rsquared: f64,
}

impl From<&FitRecord> for FitRow {
    fn from(r: &FitRecord) -> Self {
        let param = |i: usize| r.fit_params.get(i).copied();
        let variance = |i: usize| r.fit_covars.get(i * 3 + i).copied();
        Self {
            measurement_id: r.key.measurement_id,
            sweep_id: r.key.sweep_id,
            resonance_id: r.key.resonance_id,
            peak_wavelength_nm: r.peak_wavelength_nm,
            fsr_nm: r.fsr_nm,
            fwhm_nm: r.fwhm_nm,
            bw_1db_nm: r.bw_1db_nm,
            crosstalk_db: r.crosstalk_db,
            insertion_loss_db: r.insertion_loss_db,
            lambda0_nm: param(0),
            alpha: param(1),
            gamma_nm: param(2),
            var_lambda0: variance(0),
            var_alpha: variance(1),
            var_gamma: variance(2),
            fit_rsquared: r.fit_rsquared,
        }
    }
}

/// Write every committed fit record of `store` to `path`. Returns the row count.
pub fn write_fit_records_csv<S: SweepStore + ?Sized>(path: &Path, store: &S) -> Result<usize, AppError> {
    let file = std::fs::File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_fit_records(file, store)
}

/// Stream fit records page by page into `writer`.
pub fn write_fit_records<S: SweepStore + ?Sized, W: Write>(writer: W, store: &S) -> Result<usize, AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let total = store.count_fit_records()?;

    let mut written = 0;
    let mut offset = 0;
    while offset < total {
        let page = store.fetch_fit_records(offset, EXPORT_PAGE)?;
        if page.is_empty() {
            break;
        }
        for record in &page {
            wtr.serialize(FitRow::from(record))
                .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
            written += 1;
        }
        offset += page.len();
    }

    wtr.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitKey;
    use crate::store::MemoryStore;

    fn record(measurement_id: i64, resonance_id: u32, fsr_nm: Option<f64>) -> FitRecord {
        FitRecord {
            key: FitKey {
                measurement_id,
                sweep_id: 0,
                resonance_id,
            },
            peak_wavelength_nm: 1550.0,
            fsr_nm,
            fwhm_nm: 0.5,
            bw_1db_nm: None,
            crosstalk_db: Some(-20.5),
            insertion_loss_db: Some(1.25),
            fit_params: vec![1550.01, 0.75, 0.25],
            fit_covars: vec![1e-8, 0.0, 0.0, 0.0, 4e-6, 0.0, 0.0, 0.0, 9e-8],
            fit_rsquared: 0.998,
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let mut store = MemoryStore::new();
        store.upsert_fit_record(record(2, 0, Some(12.8))).unwrap();
        store.upsert_fit_record(record(1, 1, None)).unwrap();
        store.upsert_fit_record(record(1, 0, Some(12.7))).unwrap();
        store.commit().unwrap();

        let mut buf = Vec::new();
        assert_eq!(write_fit_records(&mut buf, &store).unwrap(), 3);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("measurement_id,sweep_id,resonance_id,peak_wavelength_nm,fsr_nm"));
        assert!(lines[0].ends_with("var_gamma,fit_rsquared"));
        // Key order; None is an empty cell.
        assert!(lines[1].starts_with("1,0,0,1550.0,12.7,0.5,,-20.5,1.25,1550.01,0.75,0.25,"));
        assert!(lines[2].starts_with("1,0,1,1550.0,,0.5,"));
        assert!(lines[3].starts_with("2,0,0,"));
    }

    #[test]
    fn uncommitted_records_are_not_exported() {
        let mut store = MemoryStore::new();
        store.upsert_fit_record(record(1, 0, None)).unwrap();
        let mut buf = Vec::new();
        assert_eq!(write_fit_records(&mut buf, &store).unwrap(), 0);
    }

    #[test]
    fn writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fits.csv");
        let mut store = MemoryStore::new();
        store.upsert_fit_record(record(1, 0, None)).unwrap();
        store.commit().unwrap();

        assert_eq!(write_fit_records_csv(&path, &store).unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
