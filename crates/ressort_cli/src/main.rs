//! Ressort CLI
//!
//! Runs animation scenarios against a simulated clock and prints the
//! value of every spring on every frame.

mod scenario;
mod simulate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ressort_animation::Value;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use scenario::Scenario;
use simulate::Trace;

/// Headless runner for ressort animation scenarios
#[derive(Parser, Debug)]
#[command(name = "ressort")]
#[command(about = "Run spring animation scenarios headlessly")]
#[command(version)]
struct Cli {
    /// Log scheduler activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario and print its frames
    Run {
        /// Scenario file (TOML)
        scenario: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Override the scenario's frame limit
        #[arg(long)]
        max_frames: Option<usize>,
    },
    /// Write a starter scenario
    Init {
        /// Path of the new scenario; `.toml` is appended when missing
        path: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run {
            scenario,
            format,
            max_frames,
        } => {
            let mut loaded = Scenario::load(&scenario)?;
            if let Some(limit) = max_frames {
                loaded.max_frames = limit;
            }
            tracing::info!(path = %scenario.display(), springs = loaded.springs.len(), "running scenario");
            let trace = simulate::run(&loaded)?;
            match format {
                Format::Text => print_table(&trace),
                Format::Json => println!("{}", serde_json::to_string_pretty(&trace)?),
            }
        }
        Command::Init { path } => {
            let path = if path.extension().is_none() {
                path.with_extension("toml")
            } else {
                path
            };
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("scenario");
            fs::write(&path, scenario::template(name))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Created {}", path.display());
        }
    }
    Ok(())
}

fn print_table(trace: &Trace) {
    let Some(first) = trace.frames.first() else {
        println!("Nothing to animate");
        return;
    };
    let keys: Vec<&String> = first.values.keys().collect();

    print!("{:>6} {:>10}", "frame", "ms");
    for key in &keys {
        print!(" {key:>14}");
    }
    println!();

    for frame in &trace.frames {
        print!("{:>6} {:>10.2}", frame.index, frame.time_ms);
        for key in &keys {
            let cell = frame.values.get(*key).map(format_value).unwrap_or_default();
            print!(" {cell:>14}");
        }
        println!();
    }

    println!();
    for (key, result) in &trace.results {
        let status = if result.cancelled {
            "cancelled"
        } else if result.finished {
            "finished"
        } else {
            "stopped"
        };
        println!("{key}: {status} at {}", format_value(&result.value));
    }
    if trace.truncated {
        println!("(stopped after {} frames)", trace.frames.len());
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) => format!("{n:.4}"),
        Value::Vector(v) => {
            let parts: Vec<String> = v.iter().map(|n| format!("{n:.2}")).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Text(s) => s.clone(),
    }
}
