//! Synthetic ring-resonator spectra and corpora.
//!
//! Drop ports are a comb of unnormalized Lorentzians (the same model the
//! fitter uses), thru ports are the matching comb of notches, and grating
//! coupler references are a parabola in dB. Raw sweeps are reference plus
//! device response plus Gaussian noise, so de-embedding recovers the response.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{
    Device, Measurement, Orientation, RawSweep, ReferenceKey, ReferenceSweep, Spectrum, SweepKey,
};
use crate::error::AppError;
use crate::math::lorentzian;
use crate::store::StoreSnapshot;

/// Evenly spaced grid from `start_nm` to `end_nm` inclusive.
pub fn wavelength_grid(start_nm: f64, end_nm: f64, step_nm: f64) -> Vec<f64> {
    if !(step_nm > 0.0) || end_nm < start_nm {
        return vec![start_nm];
    }
    let n = ((end_nm - start_nm) / step_nm).round() as usize + 1;
    (0..n).map(|i| start_nm + i as f64 * step_nm).collect()
}

/// Drop-port transmission (dB) of resonances at `centers_nm`.
pub fn lorentzian_comb_db(wavelength_nm: &[f64], centers_nm: &[f64], alpha: f64, gamma_nm: f64) -> Vec<f64> {
    wavelength_nm
        .iter()
        .map(|&x| {
            let linear: f64 = centers_nm
                .iter()
                .map(|&c| lorentzian(x, c, alpha, gamma_nm))
                .sum();
            10.0 * linear.log10()
        })
        .collect()
}

/// Thru-port transmission (dB): one notch of relative `depth` (< 1) per resonance.
pub fn notch_comb_db(wavelength_nm: &[f64], centers_nm: &[f64], depth: f64, gamma_nm: f64) -> Vec<f64> {
    let g2 = gamma_nm * gamma_nm;
    wavelength_nm
        .iter()
        .map(|&x| {
            let linear: f64 = centers_nm
                .iter()
                .map(|&c| 1.0 - depth * g2 / ((x - c) * (x - c) + g2))
                .product();
            10.0 * linear.max(1e-6).log10()
        })
        .collect()
}

/// Grating-coupler insertion loss (dB): parabolic around `center_nm`.
pub fn grating_coupler_db(wavelength_nm: &[f64], center_nm: f64, peak_loss_db: f64, curvature_db_per_nm2: f64) -> Vec<f64> {
    wavelength_nm
        .iter()
        .map(|&x| -peak_loss_db - curvature_db_per_nm2 * (x - center_nm) * (x - center_nm))
        .collect()
}

/// Add zero-mean Gaussian noise (dB). A non-finite or negative `sigma_db`
/// leaves the input unchanged.
pub fn noisy_db(clean_db: &[f64], sigma_db: f64, seed: u64) -> Vec<f64> {
    let Ok(normal) = Normal::new(0.0, sigma_db) else {
        return clean_db.to_vec();
    };
    let mut rng = StdRng::seed_from_u64(seed);
    clean_db.iter().map(|v| v + normal.sample(&mut rng)).collect()
}

/// Shape of a generated corpus.
#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub seed: u64,
    pub devices: usize,
    pub start_nm: f64,
    pub end_nm: f64,
    pub step_nm: f64,
    pub noise_db: f64,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            devices: 8,
            start_nm: 1540.0,
            end_nm: 1600.0,
            step_nm: 0.005,
            noise_db: 0.01,
        }
    }
}

/// Ground truth of one generated ring.
#[derive(Debug, Clone, PartialEq)]
pub struct RingTruth {
    pub measurement_id: i64,
    pub device_id: String,
    pub alpha: f64,
    pub gamma_nm: f64,
    pub fsr_nm: f64,
    pub centers_nm: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct DemoCorpus {
    pub snapshot: StoreSnapshot,
    pub truth: Vec<RingTruth>,
}

pub const DEMO_WAFER: &str = "R2P0E380PLC5";
pub const DEMO_DIE: &str = "3_4";
pub const DEMO_INPUT_PORT: u8 = 1;

/// Sweep id of the drop-port raw sweep of every demo measurement.
pub const DEMO_DROP_SWEEP: u32 = 0;
/// Sweep id of the thru-port raw sweep of every demo measurement.
pub const DEMO_THRU_SWEEP: u32 = 1;

/// Drop/thru output ports for an orientation.
pub fn demo_ports(orientation: Orientation) -> (u8, u8) {
    match orientation {
        Orientation::Vertical => (3, 2),
        Orientation::Horizontal => (2, 3),
    }
}

/// Generate a full input corpus: one measurement per ring with a drop and a
/// thru raw sweep, the ring's device record, and both grating-coupler
/// references for its DOE column.
///
/// Rings alternate V/H orientation and each sits in its own DOE column, so
/// every raw sweep resolves to a distinct reference.
pub fn demo_corpus(options: &DemoOptions) -> Result<DemoCorpus, AppError> {
    if options.devices == 0 {
        return Err(AppError::new(2, "Demo corpus needs at least one device."));
    }
    let mut rng = StdRng::seed_from_u64(options.seed);
    let wavelength = wavelength_grid(options.start_nm, options.end_nm, options.step_nm);
    let mid_nm = (options.start_nm + options.end_nm) / 2.0;

    let mut snapshot = StoreSnapshot::default();
    let mut truth = Vec::with_capacity(options.devices);

    for i in 0..options.devices {
        let measurement_id = 1000 + i as i64;
        let doe_column = i as u32 + 1;
        let orientation = if i % 2 == 0 {
            Orientation::Vertical
        } else {
            Orientation::Horizontal
        };
        let device_id = format!("WDM_RR_{}_C{doe_column}", orientation.code());

        let alpha = rng.gen_range(0.7..3.0);
        let gamma_nm = rng.gen_range(0.15..0.35);
        let fsr_nm = rng.gen_range(12.4..13.2);
        let first = options.start_nm + rng.gen_range(0.2..0.8) * fsr_nm;
        let centers_nm: Vec<f64> = (0..)
            .map(|k| first + k as f64 * fsr_nm)
            .take_while(|&c| c < options.end_nm - fsr_nm / 4.0)
            .collect();

        let (drop_port, thru_port) = demo_ports(orientation);
        let drop_response = lorentzian_comb_db(&wavelength, &centers_nm, alpha, gamma_nm);
        let thru_response = notch_comb_db(&wavelength, &centers_nm, 0.9, gamma_nm);

        for (sweep_id, output, response) in [
            (DEMO_DROP_SWEEP, drop_port, drop_response),
            (DEMO_THRU_SWEEP, thru_port, thru_response),
        ] {
            let loss_db = rng.gen_range(4.0..7.0);
            let reference_db = grating_coupler_db(&wavelength, mid_nm, loss_db, 0.003);
            let clean: Vec<f64> = reference_db.iter().zip(&response).map(|(r, d)| r + d).collect();
            let raw_db = noisy_db(&clean, options.noise_db, rng.r#gen());

            snapshot.references.push(ReferenceSweep {
                key: ReferenceKey {
                    wafer_id: DEMO_WAFER.to_string(),
                    die_id: DEMO_DIE.to_string(),
                    doe_column,
                    input: DEMO_INPUT_PORT,
                    output,
                },
                temperature_c: Some(25.0),
                fiber_height_um: Some(10.0),
                spectrum: spectrum(&wavelength, reference_db)?,
            });
            snapshot.raw_sweeps.push(RawSweep {
                key: SweepKey::new(measurement_id, sweep_id),
                input: DEMO_INPUT_PORT,
                output,
                voltage_v: None,
                current_ma: None,
                spectrum: spectrum(&wavelength, raw_db)?,
            });
        }

        snapshot.measurements.push(Measurement {
            measurement_id,
            wafer_id: DEMO_WAFER.to_string(),
            die_id: DEMO_DIE.to_string(),
            device_id: Some(device_id.clone()),
        });
        snapshot.devices.push(Device {
            device_id: device_id.clone(),
            orientation,
            bend_type: "circular".to_string(),
            coupler_length_um: 2.0,
            doe_row: 0,
            doe_column,
        });
        truth.push(RingTruth {
            measurement_id,
            device_id,
            alpha,
            gamma_nm,
            fsr_nm,
            centers_nm,
        });
    }

    Ok(DemoCorpus { snapshot, truth })
}

fn spectrum(wavelength: &[f64], transmission_db: Vec<f64>) -> Result<Spectrum, AppError> {
    Spectrum::new(wavelength.to_vec(), transmission_db)
        .map_err(|e| AppError::new(2, format!("Synthetic spectrum rejected: {e}")))
}
