//! Top-level application orchestration.
//!
//! `src/main.rs` only installs logging and maps errors to exit codes; this
//! module is the "real main" that:
//! - parses CLI arguments and builds the `ReductionConfig`
//! - opens the store and hands it to the batch pipeline
//! - prints summaries and writes exports

use std::path::Path;

use clap::Parser;

use crate::cli::{Command, DemoArgs, ExportArgs, ImportArgs, RunArgs, TuningArgs};
use crate::data::{demo_corpus, DemoOptions};
use crate::domain::{PortType, ReductionConfig};
use crate::error::AppError;
use crate::store::{JsonStore, MemoryStore, SweepStore};

pub mod pipeline;

use pipeline::{BatchProcessor, RunSummary};

/// Entry point for the `wdm` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    let env_config = ReductionConfig::from_env()?;

    match cli.command {
        Command::Import(args) => handle_import(args, &env_config),
        Command::Deembed(args) => handle_reduce(args, env_config, Passes::Deembed),
        Command::Fit(args) => handle_reduce(args, env_config, Passes::Fit),
        Command::Run(args) => handle_reduce(args, env_config, Passes::Both),
        Command::Export(args) => handle_export(args),
        Command::Demo(args) => handle_demo(args, env_config),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Passes {
    Deembed,
    Fit,
    Both,
}

fn handle_import(args: ImportArgs, config: &ReductionConfig) -> Result<(), AppError> {
    let sources = if args.sources.is_empty() {
        &config.sources
    } else {
        &args.sources
    };
    if sources.is_empty() {
        return Err(AppError::new(
            2,
            "No corpus files given (pass them as arguments or set WDM_SOURCES).",
        ));
    }

    let mut store = JsonStore::open(&args.store)?;
    for source in sources {
        let counts = store.import_file(source)?;
        tracing::info!(source = %source.display(), inserted = counts.total(), "imported corpus");
        println!(
            "{}",
            crate::report::format_import(&source.display().to_string(), &counts)
        );
    }
    Ok(())
}

fn handle_reduce(args: RunArgs, env_config: ReductionConfig, passes: Passes) -> Result<(), AppError> {
    let config = config_from_args(env_config, &args.tuning)?;
    let mut store = JsonStore::open(&args.store)?;
    require_data(&store, passes, &args.store)?;

    let run = reduce(&mut store, &config, passes)?;
    println!("{}", crate::report::format_run_summary(&run, &config));
    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<(), AppError> {
    let store = JsonStore::open(&args.store)?;
    if store.count_fit_records()? == 0 {
        return Err(AppError::new(
            3,
            format!("No fit records in '{}'; run `wdm fit` first.", args.store.display()),
        ));
    }
    let rows = crate::io::write_fit_records_csv(&args.out, &store)?;
    println!("Wrote {rows} fit records to {}", args.out.display());
    Ok(())
}

fn handle_demo(args: DemoArgs, env_config: ReductionConfig) -> Result<(), AppError> {
    let config = config_from_args(env_config, &args.tuning)?;
    let corpus = demo_corpus(&DemoOptions {
        seed: args.seed,
        devices: args.devices,
        ..DemoOptions::default()
    })?;

    if let Some(path) = &args.write_corpus {
        write_corpus(path, &corpus.snapshot)?;
        println!("Wrote synthetic corpus to {}", path.display());
    }

    let mut store = MemoryStore::new();
    store.import(corpus.snapshot);
    let run = reduce(&mut store, &config, Passes::Both)?;
    println!("{}", crate::report::format_run_summary(&run, &config));
    Ok(())
}

fn reduce<S: SweepStore + ?Sized>(store: &mut S, config: &ReductionConfig, passes: Passes) -> Result<RunSummary, AppError> {
    let mut processor = BatchProcessor::new(store, config);
    match passes {
        Passes::Both => processor.run(),
        Passes::Deembed => Ok(RunSummary {
            started_at: chrono::Utc::now(),
            deembed: Some(processor.run_deembed()?),
            fit: None,
        }),
        Passes::Fit => Ok(RunSummary {
            started_at: chrono::Utc::now(),
            deembed: None,
            fit: Some(processor.run_fits()?),
        }),
    }
}

fn require_data<S: SweepStore + ?Sized>(store: &S, passes: Passes, path: &Path) -> Result<(), AppError> {
    let (rows, hint) = match passes {
        Passes::Deembed | Passes::Both => (store.count_raw_sweeps()?, "raw sweeps; run `wdm import` first"),
        Passes::Fit => (
            store.count_main_sweeps(PortType::Drop)?,
            "drop-port main sweeps; run `wdm deembed` first",
        ),
    };
    if rows == 0 {
        return Err(AppError::new(3, format!("No {hint} ('{}').", path.display())));
    }
    Ok(())
}

fn write_corpus(path: &Path, snapshot: &crate::store::StoreSnapshot) -> Result<(), AppError> {
    let file = std::fs::File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create corpus '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), snapshot)
        .map_err(|e| AppError::new(2, format!("Failed to write corpus '{}': {e}", path.display())))
}

/// Apply CLI overrides on top of the environment-derived config.
pub fn config_from_args(mut config: ReductionConfig, tuning: &TuningArgs) -> Result<ReductionConfig, AppError> {
    if let Some(batch_size) = tuning.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(prominence) = tuning.prominence {
        config.prominence_threshold = prominence;
    }
    if let Some(target) = tuning.target_wavelength {
        config.target_wavelength_nm = target;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_environment() {
        let env = ReductionConfig {
            batch_size: 10,
            prominence_threshold: 0.3,
            ..ReductionConfig::default()
        };
        let tuning = TuningArgs {
            batch_size: Some(25),
            prominence: None,
            target_wavelength: Some(1560.0),
        };
        let config = config_from_args(env, &tuning).unwrap();
        assert_eq!(config.batch_size, 25);
        assert!((config.prominence_threshold - 0.3).abs() < 1e-12);
        assert!((config.target_wavelength_nm - 1560.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let tuning = TuningArgs {
            batch_size: Some(0),
            ..TuningArgs::default()
        };
        let err = config_from_args(ReductionConfig::default(), &tuning).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn empty_store_is_no_data() {
        let store = MemoryStore::new();
        let err = require_data(&store, Passes::Both, Path::new("s.json")).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        let err = require_data(&store, Passes::Fit, Path::new("s.json")).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn import_then_run_then_export_through_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("corpus.json");
        let store_path = dir.path().join("store.json");
        let out = dir.path().join("fits.csv");

        let corpus = demo_corpus(&DemoOptions {
            devices: 2,
            step_nm: 0.01,
            ..DemoOptions::default()
        })
        .unwrap();
        write_corpus(&source, &corpus.snapshot).unwrap();

        handle_import(
            ImportArgs {
                store: store_path.clone(),
                sources: vec![source],
            },
            &ReductionConfig::default(),
        )
        .unwrap();
        handle_reduce(
            RunArgs {
                store: store_path.clone(),
                tuning: TuningArgs::default(),
            },
            ReductionConfig::default(),
            Passes::Both,
        )
        .unwrap();
        handle_export(ExportArgs {
            store: store_path.clone(),
            out: out.clone(),
        })
        .unwrap();

        let expected: usize = corpus.truth.iter().map(|r| r.centers_nm.len()).sum();
        let csv = std::fs::read_to_string(&out).unwrap();
        assert_eq!(csv.lines().count(), expected + 1);

        let reopened = JsonStore::open(&store_path).unwrap();
        assert_eq!(reopened.count_main_sweeps(PortType::Drop).unwrap(), 2);
        assert_eq!(reopened.count_fit_records().unwrap(), expected);
    }

    #[test]
    fn import_without_sources_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = handle_import(
            ImportArgs {
                store: dir.path().join("s.json"),
                sources: Vec::new(),
            },
            &ReductionConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
