//! Plain-text formatting of run results.
//!
//! Kept apart from the pipeline so output changes stay local.

use crate::app::pipeline::{PassSummary, RunSummary};
use crate::domain::ReductionConfig;
use crate::report::failure_counts;
use crate::store::ImportCounts;

/// Full run summary: settings, one block per pass, target-wavelength counts.
pub fn format_run_summary(run: &RunSummary, config: &ReductionConfig) -> String {
    let mut out = String::new();

    out.push_str("=== wdm - WDM ring resonator FOM extraction ===\n");
    out.push_str(&format!(
        "Started: {}\n",
        run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Settings: batch={} | prominence={} | crosstalk offset={} nm | max iterations={}\n",
        config.batch_size, config.prominence_threshold, config.crosstalk_offset_nm, config.max_iterations,
    ));

    for pass in [&run.deembed, &run.fit].into_iter().flatten() {
        out.push('\n');
        out.push_str(&format_pass(pass));
    }

    if let Some(fit) = &run.fit {
        out.push('\n');
        out.push_str(&format_target(fit));
    }

    out
}

/// One pass: row counts, batches, writes and failures by kind.
pub fn format_pass(summary: &PassSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Pass: {}\n", summary.pass.as_str()));
    out.push_str(&format!(
        "  rows={} batches={} ok={} skipped={} written={} elapsed={:.2}s\n",
        summary.total,
        summary.batches,
        summary.sweeps_ok,
        summary.skipped_sweeps.len(),
        summary.written,
        summary.elapsed.as_secs_f64(),
    ));
    if summary.sweeps_without_peaks > 0 {
        out.push_str(&format!(
            "  sweeps without resonances: {}\n",
            summary.sweeps_without_peaks
        ));
    }
    if !summary.stale_records.is_empty() {
        out.push_str(&format!(
            "  stale fit records from earlier runs: {}\n",
            summary.stale_records.len()
        ));
    }

    let counts = failure_counts(summary);
    if !counts.is_empty() {
        out.push_str("  failures:\n");
        for (kind, n) in counts {
            out.push_str(&format!("    {kind:<24} {n:>6}\n"));
        }
    }
    out
}

fn format_target(fit: &PassSummary) -> String {
    let t = &fit.target;
    let mut out = String::new();
    out.push_str(&format!("At {:.1} nm:\n", t.wavelength_nm));
    out.push_str(&format!("  evaluated sweeps          {:>6}\n", t.evaluated));
    out.push_str(&format!(
        "  1 dB BW >= {:<7.3} nm      {:>6}\n",
        t.bandwidth_1db_nm, t.meeting_bandwidth
    ));
    out.push_str(&format!(
        "  FSR >= {:<7.2} nm          {:>6}\n",
        t.fsr_nm, t.meeting_fsr
    ));
    out.push_str(&format!("  both                      {:>6}\n", t.meeting_both));
    out
}

/// Result line(s) of `wdm import`.
pub fn format_import(source: &str, counts: &ImportCounts) -> String {
    format!(
        "{source}: +{} measurements, +{} devices, +{} references, +{} raw sweeps",
        counts.measurements, counts.devices, counts.references, counts.raw_sweeps
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::app::pipeline::{Pass, ResonanceFailure, TargetSummary};
    use crate::domain::{FitKey, SweepKey};
    use crate::error::{FitError, SweepError};

    fn pass(pass: Pass) -> PassSummary {
        let config = ReductionConfig::default();
        PassSummary {
            pass,
            total: 3,
            batches: 1,
            sweeps_ok: 2,
            sweeps_without_peaks: 0,
            skipped_sweeps: vec![SweepError::MeasurementNotFound {
                key: SweepKey::new(9, 0),
            }],
            failed_resonances: vec![ResonanceFailure {
                key: FitKey {
                    measurement_id: 1,
                    sweep_id: 0,
                    resonance_id: 4,
                },
                error: FitError::NoConvergence { iterations: 200 },
            }],
            stale_records: Vec::new(),
            written: 9,
            target: TargetSummary {
                wavelength_nm: config.target_wavelength_nm,
                bandwidth_1db_nm: config.target_bandwidth_1db_nm,
                fsr_nm: config.target_fsr_nm,
                evaluated: 2,
                meeting_bandwidth: 1,
                meeting_fsr: 2,
                meeting_both: 1,
            },
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn summary_lists_passes_failures_and_targets() {
        let run = RunSummary {
            started_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            deembed: Some(pass(Pass::Deembed)),
            fit: Some(pass(Pass::Fit)),
        };
        let text = format_run_summary(&run, &ReductionConfig::default());

        assert!(text.contains("Started: 2025-03-01 12:00:00 UTC"));
        assert!(text.contains("Pass: deembed"));
        assert!(text.contains("Pass: fit"));
        assert!(text.contains("rows=3 batches=1 ok=2 skipped=1 written=9 elapsed=1.50s"));
        assert!(text.contains("measurement_not_found"));
        assert!(text.contains("no_convergence"));
        assert!(text.contains("At 1580.0 nm:"));
    }

    #[test]
    fn stale_records_get_a_line_only_when_present() {
        assert!(!format_pass(&pass(Pass::Fit)).contains("stale"));

        let mut fit = pass(Pass::Fit);
        fit.stale_records = vec![
            FitKey {
                measurement_id: 1,
                sweep_id: 0,
                resonance_id: 5,
            },
            FitKey {
                measurement_id: 1,
                sweep_id: 0,
                resonance_id: 6,
            },
        ];
        assert!(format_pass(&fit).contains("stale fit records from earlier runs: 2"));
    }

    #[test]
    fn deembed_only_run_has_no_target_block() {
        let run = RunSummary {
            started_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            deembed: Some(pass(Pass::Deembed)),
            fit: None,
        };
        let text = format_run_summary(&run, &ReductionConfig::default());
        assert!(!text.contains("At 1580.0 nm:"));
    }

    #[test]
    fn import_line() {
        let counts = ImportCounts {
            measurements: 1,
            devices: 2,
            references: 3,
            raw_sweeps: 4,
        };
        assert_eq!(
            format_import("wafer.json", &counts),
            "wafer.json: +1 measurements, +2 devices, +3 references, +4 raw sweeps"
        );
    }
}
