//! Batch reduction pipeline shared by every CLI command.
//!
//! Two passes over the store, each a fixed-size batch loop:
//!
//! 1. de-embed: raw sweeps -> measurement -> device -> reference -> main sweep
//! 2. fit: drop-port main sweeps -> peaks -> FSR -> Lorentzian fits -> FOMs
//!
//! Writes are staged and committed once per batch. A failing sweep or
//! resonance is logged and skipped; a failing store call rolls back the
//! in-flight batch and aborts the run. Earlier batches stay committed, and
//! because every output is a pure function of the inputs a rerun from the
//! start converges to the same rows.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::deembed::{deembed, reference_key};
use crate::domain::{FitKey, FitRecord, MainSweep, PortType, RawSweep, ReductionConfig, SweepKey};
use crate::error::{AppError, FitError, StoreError, SweepError};
use crate::fit::{fit_resonance, ResonanceFit};
use crate::fom::{defined, evaluate_at_wavelength, extract, FomsAtWavelength};
use crate::math::LmOptions;
use crate::peaks::{db_to_linear, detect_peaks_linear, free_spectral_range};
use crate::store::SweepStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Deembed,
    Fit,
}

impl Pass {
    pub fn as_str(self) -> &'static str {
        match self {
            Pass::Deembed => "deembed",
            Pass::Fit => "fit",
        }
    }
}

/// A resonance whose fit was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ResonanceFailure {
    pub key: FitKey,
    pub error: FitError,
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    pub pass: Pass,
    /// Rows the pass paged over.
    pub total: usize,
    pub batches: usize,
    /// Sweeps that produced output (a main sweep, or at least one fit).
    pub sweeps_ok: usize,
    /// Drop sweeps in which no resonance cleared the prominence threshold.
    pub sweeps_without_peaks: usize,
    pub skipped_sweeps: Vec<SweepError>,
    pub failed_resonances: Vec<ResonanceFailure>,
    /// Fit records from an earlier run whose resonance index is past the
    /// resonances found now. They stay in the store.
    pub stale_records: Vec<FitKey>,
    /// Rows upserted and committed.
    pub written: usize,
    pub target: TargetSummary,
    pub elapsed: Duration,
}

impl PassSummary {
    fn new(pass: Pass, total: usize, config: &ReductionConfig) -> Self {
        Self {
            pass,
            total,
            batches: 0,
            sweeps_ok: 0,
            sweeps_without_peaks: 0,
            skipped_sweeps: Vec::new(),
            failed_resonances: Vec::new(),
            stale_records: Vec::new(),
            written: 0,
            target: TargetSummary::new(config),
            elapsed: Duration::ZERO,
        }
    }
}

/// Drop sweeps evaluated at the wavelength of interest.
///
/// A sweep meets a target when its interpolated value is at least the target
/// value (a wide enough passband, a wide enough channel spacing).
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSummary {
    pub wavelength_nm: f64,
    pub bandwidth_1db_nm: f64,
    pub fsr_nm: f64,
    /// Sweeps with fitted resonances on both sides of the target.
    pub evaluated: usize,
    pub meeting_bandwidth: usize,
    pub meeting_fsr: usize,
    pub meeting_both: usize,
}

impl TargetSummary {
    fn new(config: &ReductionConfig) -> Self {
        Self {
            wavelength_nm: config.target_wavelength_nm,
            bandwidth_1db_nm: config.target_bandwidth_1db_nm,
            fsr_nm: config.target_fsr_nm,
            evaluated: 0,
            meeting_bandwidth: 0,
            meeting_fsr: 0,
            meeting_both: 0,
        }
    }

    fn record(&mut self, at: &FomsAtWavelength) {
        self.evaluated += 1;
        let bw_ok = at.bw_1db_nm.is_some_and(|bw| bw >= self.bandwidth_1db_nm);
        let fsr_ok = at.fsr_nm.is_some_and(|fsr| fsr >= self.fsr_nm);
        self.meeting_bandwidth += usize::from(bw_ok);
        self.meeting_fsr += usize::from(fsr_ok);
        self.meeting_both += usize::from(bw_ok && fsr_ok);
    }
}

/// Outcome of a command: whichever passes ran.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub deembed: Option<PassSummary>,
    pub fit: Option<PassSummary>,
}

/// Fits and failures produced from one main sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepFits {
    pub peaks: Vec<usize>,
    pub records: Vec<FitRecord>,
    pub failures: Vec<ResonanceFailure>,
}

/// Drives both passes over a caller-owned store.
pub struct BatchProcessor<'a, S: SweepStore + ?Sized> {
    store: &'a mut S,
    config: &'a ReductionConfig,
}

impl<'a, S: SweepStore + ?Sized> BatchProcessor<'a, S> {
    pub fn new(store: &'a mut S, config: &'a ReductionConfig) -> Self {
        Self { store, config }
    }

    /// De-embed pass followed by the fit pass.
    pub fn run(&mut self) -> Result<RunSummary, AppError> {
        let started_at = Utc::now();
        let deembed = self.run_deembed()?;
        let fit = self.run_fits()?;
        Ok(RunSummary {
            started_at,
            deembed: Some(deembed),
            fit: Some(fit),
        })
    }

    /// Build and upsert a main sweep for every raw sweep.
    pub fn run_deembed(&mut self) -> Result<PassSummary, AppError> {
        let total = self.store.count_raw_sweeps()?;
        let mut summary = PassSummary::new(Pass::Deembed, total, self.config);

        run_batches(
            &mut *self.store,
            self.config.batch_size,
            &mut summary,
            |store, offset, limit| store.fetch_raw_sweeps(offset, limit),
            |store, raw, summary| {
                match resolve_and_deembed(store, &raw)? {
                    Ok(main) => {
                        store.upsert_main_sweep(main)?;
                        summary.sweeps_ok += 1;
                        summary.written += 1;
                    }
                    Err(err) => skip_sweep(summary, err),
                }
                Ok(())
            },
        )?;

        Ok(summary)
    }

    /// Fit every resonance of every drop-port main sweep.
    pub fn run_fits(&mut self) -> Result<PassSummary, AppError> {
        let total = self.store.count_main_sweeps(PortType::Drop)?;
        let mut summary = PassSummary::new(Pass::Fit, total, self.config);
        let config = self.config;

        run_batches(
            &mut *self.store,
            config.batch_size,
            &mut summary,
            |store, offset, limit| store.fetch_main_sweeps(PortType::Drop, offset, limit),
            |store, main, summary| {
                let fits = process_sweep(&main, config);
                if fits.peaks.is_empty() {
                    tracing::warn!(
                        measurement_id = main.key.measurement_id,
                        sweep_id = main.key.sweep_id,
                        "no resonances above prominence threshold"
                    );
                    summary.sweeps_without_peaks += 1;
                }
                for failure in &fits.failures {
                    tracing::warn!(
                        measurement_id = failure.key.measurement_id,
                        sweep_id = failure.key.sweep_id,
                        resonance_id = failure.key.resonance_id,
                        error = %failure.error,
                        "skipping resonance"
                    );
                }
                if let Some(at) = evaluate_at_wavelength(&fits.records, config.target_wavelength_nm) {
                    summary.target.record(&at);
                }
                if !fits.records.is_empty() {
                    summary.sweeps_ok += 1;
                }
                let stale = stale_fit_keys(&*store, main.key, fits.peaks.len())?;
                if !stale.is_empty() {
                    tracing::warn!(
                        measurement_id = main.key.measurement_id,
                        sweep_id = main.key.sweep_id,
                        stale = stale.len(),
                        "fit records left over from an earlier run"
                    );
                }
                summary.stale_records.extend(stale);
                summary.written += fits.records.len();
                summary.failed_resonances.extend(fits.failures);
                for record in fits.records {
                    store.upsert_fit_record(record)?;
                }
                Ok(())
            },
        )?;

        Ok(summary)
    }
}

/// Fixed-size batch loop with one commit per batch.
///
/// `process` may only fail with a store error; unit-level failures are its
/// own business. On any store error the staged batch is rolled back.
fn run_batches<S, T, F, P>(
    store: &mut S,
    batch_size: usize,
    summary: &mut PassSummary,
    fetch: F,
    mut process: P,
) -> Result<(), AppError>
where
    S: SweepStore + ?Sized,
    F: Fn(&S, usize, usize) -> Result<Vec<T>, StoreError>,
    P: FnMut(&mut S, T, &mut PassSummary) -> Result<(), StoreError>,
{
    let pass = summary.pass.as_str();
    if batch_size == 0 {
        return Err(AppError::new(2, "Batch size must be > 0."));
    }
    let started = Instant::now();
    let n_batches = summary.total.div_ceil(batch_size);
    tracing::info!(pass, rows = summary.total, batches = n_batches, batch_size, "pass started");

    for k in 0..n_batches {
        let batch_started = Instant::now();
        let offset = k * batch_size;

        match run_batch(store, offset, batch_size, summary, &fetch, &mut process) {
            Ok(rows) => {
                summary.batches += 1;
                tracing::info!(
                    pass,
                    batch = k + 1,
                    batches = n_batches,
                    offset,
                    rows,
                    elapsed_ms = batch_started.elapsed().as_millis() as u64,
                    "batch committed"
                );
            }
            Err(err) => {
                store.rollback();
                tracing::error!(pass, batch = k + 1, offset, error = %err, "batch rolled back");
                return Err(err.into());
            }
        }
    }

    summary.elapsed = started.elapsed();
    tracing::info!(
        pass,
        ok = summary.sweeps_ok,
        skipped = summary.skipped_sweeps.len(),
        written = summary.written,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "pass finished"
    );
    Ok(())
}

fn run_batch<S, T, F, P>(
    store: &mut S,
    offset: usize,
    limit: usize,
    summary: &mut PassSummary,
    fetch: &F,
    process: &mut P,
) -> Result<usize, StoreError>
where
    S: SweepStore + ?Sized,
    F: Fn(&S, usize, usize) -> Result<Vec<T>, StoreError>,
    P: FnMut(&mut S, T, &mut PassSummary) -> Result<(), StoreError>,
{
    let rows = fetch(&*store, offset, limit)?;
    let n = rows.len();
    for row in rows {
        process(&mut *store, row, summary)?;
    }
    store.commit()?;
    Ok(n)
}

fn skip_sweep(summary: &mut PassSummary, err: SweepError) {
    let key = err.key();
    tracing::warn!(
        measurement_id = key.measurement_id,
        sweep_id = key.sweep_id,
        kind = err.kind(),
        error = %err,
        "skipping sweep"
    );
    summary.skipped_sweeps.push(err);
}

/// Committed fit keys of `sweep` at or past `resonances`.
fn stale_fit_keys<S: SweepStore + ?Sized>(
    store: &S,
    sweep: SweepKey,
    resonances: usize,
) -> Result<Vec<FitKey>, StoreError> {
    Ok(store
        .fit_record_keys(sweep)?
        .into_iter()
        .filter(|k| k.resonance_id as usize >= resonances)
        .collect())
}

/// Look up everything a raw sweep needs and de-embed it.
///
/// The outer `Result` is the store call; the inner one is this sweep's own
/// outcome.
pub fn resolve_and_deembed<S: SweepStore + ?Sized>(
    store: &S,
    raw: &RawSweep,
) -> Result<Result<MainSweep, SweepError>, StoreError> {
    let key = raw.key;
    let Some(measurement) = store.measurement(key.measurement_id)? else {
        return Ok(Err(SweepError::MeasurementNotFound { key }));
    };
    let Some(device_id) = measurement.device_id.as_deref() else {
        return Ok(Err(SweepError::DeviceNotFound {
            key,
            device_id: "(none)".to_string(),
        }));
    };
    let Some(device) = store.device(device_id)? else {
        return Ok(Err(SweepError::DeviceNotFound {
            key,
            device_id: device_id.to_string(),
        }));
    };
    let reference_key = reference_key(&measurement, &device, raw);
    let Some(reference) = store.reference(&reference_key)? else {
        return Ok(Err(SweepError::ReferenceNotFound {
            key,
            reference: reference_key,
        }));
    };
    Ok(deembed(raw, &reference, &device))
}

/// Detect, fit and reduce every resonance of one main sweep.
pub fn process_sweep(sweep: &MainSweep, config: &ReductionConfig) -> SweepFits {
    let wavelength = sweep.spectrum.wavelength_nm();
    let linear = db_to_linear(sweep.spectrum.transmission_db());
    let peaks = detect_peaks_linear(&linear, config.prominence_threshold);
    let fsr = free_spectral_range(wavelength, &peaks);
    let opts = LmOptions {
        max_iterations: config.max_iterations,
        ..LmOptions::default()
    };

    let mut fits = SweepFits::default();
    for (i, &peak) in peaks.iter().enumerate() {
        let key = FitKey {
            measurement_id: sweep.key.measurement_id,
            sweep_id: sweep.key.sweep_id,
            resonance_id: i as u32,
        };
        match fit_resonance(wavelength, &linear, &peaks, i, &opts) {
            Ok(fit) => fits
                .records
                .push(fit_record(key, wavelength[peak], fsr[i], &fit, config)),
            Err(error) => fits.failures.push(ResonanceFailure { key, error }),
        }
    }
    fits.peaks = peaks;
    fits
}

fn fit_record(key: FitKey, peak_wavelength_nm: f64, fsr_nm: f64, fit: &ResonanceFit, config: &ReductionConfig) -> FitRecord {
    let foms = extract(fit.alpha(), fit.gamma_nm(), config.crosstalk_offset_nm);
    FitRecord {
        key,
        peak_wavelength_nm,
        fsr_nm: defined(fsr_nm),
        fwhm_nm: foms.fwhm_nm,
        bw_1db_nm: defined(foms.bw_1db_nm),
        crosstalk_db: defined(foms.crosstalk_db),
        insertion_loss_db: defined(foms.insertion_loss_db),
        fit_params: fit.params.to_vec(),
        fit_covars: fit.covariance.to_vec(),
        fit_rsquared: fit.r_squared,
    }
}
