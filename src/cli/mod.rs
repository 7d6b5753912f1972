//! Command-line parsing for the `wdm` binary.
//!
//! Parsing only; dispatch lives in `app`. Every tuning flag is optional so
//! that an unset flag leaves the environment/default value alone.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wdm", version, about = "WDM ring-resonator measurement reduction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Merge ingested corpus files into the store (existing inputs are kept).
    Import(ImportArgs),
    /// De-embed every raw sweep into a main sweep.
    Deembed(RunArgs),
    /// Fit every drop-port main sweep and write fit records.
    Fit(RunArgs),
    /// De-embed, then fit.
    Run(RunArgs),
    /// Write committed fit records to CSV.
    Export(ExportArgs),
    /// Generate a synthetic corpus, reduce it in memory and print the summary.
    Demo(DemoArgs),
}

/// Overrides for `ReductionConfig`.
#[derive(Debug, Clone, Default, Args)]
pub struct TuningArgs {
    /// Sweeps per batch (and per commit).
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Minimum peak prominence, linear transmission units.
    #[arg(long)]
    pub prominence: Option<f64>,

    /// Wavelength (nm) at which FOMs are evaluated for the summary.
    #[arg(long)]
    pub target_wavelength: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Store file (created if missing).
    #[arg(long, value_name = "JSON")]
    pub store: PathBuf,

    /// Corpus files to merge. Defaults to `WDM_SOURCES`.
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Store file.
    #[arg(long, value_name = "JSON")]
    pub store: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Store file.
    #[arg(long, value_name = "JSON")]
    pub store: PathBuf,

    /// Output CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Seed for the synthetic corpus.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of rings to generate.
    #[arg(long, default_value_t = 8)]
    pub devices: usize,

    /// Also write the generated corpus here, in `wdm import` format.
    #[arg(long, value_name = "JSON")]
    pub write_corpus: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_tuning_flags() {
        let cli = Cli::parse_from([
            "wdm",
            "run",
            "--store",
            "corpus.json",
            "--batch-size",
            "25",
            "--prominence",
            "0.8",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.store, PathBuf::from("corpus.json"));
        assert_eq!(args.tuning.batch_size, Some(25));
        assert_eq!(args.tuning.prominence, Some(0.8));
        assert_eq!(args.tuning.target_wavelength, None);
    }

    #[test]
    fn import_takes_positional_sources() {
        let cli = Cli::parse_from(["wdm", "import", "--store", "s.json", "a.json", "b.json"]);
        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.sources, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
    }

    #[test]
    fn demo_defaults() {
        let cli = Cli::parse_from(["wdm", "demo"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.seed, 42);
        assert_eq!(args.devices, 8);
        assert!(args.write_corpus.is_none());
    }

    #[test]
    fn export_requires_out() {
        assert!(Cli::try_parse_from(["wdm", "export", "--store", "s.json"]).is_err());
    }
}
