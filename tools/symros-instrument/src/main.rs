use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use symros_check::{instrument_module, InstrumentOptions, ThresholdConfig};
use symros_ir::{verify_module, Module};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emit {
    /// The instrumented module as JSON (readable again by this tool).
    Json,
    /// Human-readable listing.
    Text,
}

#[derive(Debug, Parser)]
#[command(name = "symros-instrument")]
#[command(about = "Insert tagged arithmetic-exception checks into an IR module")]
struct Cli {
    /// JSON-encoded module to instrument.
    input: PathBuf,

    /// Where to write the instrumented module (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Magnitude above which a result counts as exceptional. Falls back to
    /// `SYMROS_SEMANTIC_THRESHOLD` when omitted.
    #[arg(long)]
    semantic_threshold: Option<f64>,

    #[arg(long, value_enum, default_value_t = Emit::Json)]
    emit: Emit,

    /// Write every inserted branch as a JSON array to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Do not insert integer checks.
    #[arg(long)]
    no_int_checks: bool,

    /// Do not insert floating-point checks.
    #[arg(long)]
    no_fp_checks: bool,

    /// Also verify the instrumented module. Input is always verified.
    #[arg(long)]
    verify: bool,
}

impl Cli {
    fn threshold(&self) -> Result<ThresholdConfig> {
        match self.semantic_threshold {
            Some(value) => ThresholdConfig::new(value).context("invalid --semantic-threshold"),
            None => ThresholdConfig::from_env().context("no semantic threshold configured"),
        }
    }

    fn options(&self) -> InstrumentOptions {
        InstrumentOptions {
            int_checks: !self.no_int_checks,
            fp_checks: !self.no_fp_checks,
            verify: self.verify,
            ..InstrumentOptions::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let threshold = cli.threshold()?;
    tracing::debug!(input = %cli.input.display(), %threshold, "instrumenting");

    let raw = fs::read_to_string(&cli.input)
        .with_context(|| format!("read {}", cli.input.display()))?;
    let mut module: Module = serde_json::from_str(&raw)
        .with_context(|| format!("parse module {}", cli.input.display()))?;
    verify_module(&module)
        .with_context(|| format!("malformed input module {}", cli.input.display()))?;

    let report = instrument_module(&mut module, &threshold, cli.options())
        .with_context(|| format!("instrument {}", cli.input.display()))?;

    let rendered = match cli.emit {
        Emit::Json => serde_json::to_string_pretty(&module).context("serialize module")? + "\n",
        Emit::Text => module.to_string(),
    };
    match &cli.output {
        Some(path) => {
            fs::write(path, &rendered).with_context(|| format!("write {}", path.display()))?
        }
        None => io::stdout()
            .lock()
            .write_all(rendered.as_bytes())
            .context("write stdout")?,
    }

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report.branches).context("serialize report")?;
        fs::write(path, json + "\n").with_context(|| format!("write {}", path.display()))?;
    }

    eprintln!(
        "{}: {} sites, {} checks, {} skipped",
        report.module,
        report.site_count(),
        report.check_count(),
        report.skipped_count()
    );
    Ok(())
}
