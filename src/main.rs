use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chord_timeline::export::{base_name, TrackExporter};
use chord_timeline::{MidiData, TimelineOptions};

#[derive(Parser, Debug)]
#[command(name = "chord-timeline")]
#[command(about = "Convert each MIDI track into a chord/silence timeline", long_about = None)]
struct Args {
    /// Path to the MIDI file. Outputs are written next to it as `<name>_Track<N>.txt`
    input: PathBuf,

    /// Print timelines to stdout instead of writing files
    #[arg(long)]
    stdout: bool,

    /// Suppress informational messages (only errors)
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log per-track details
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    tracing::info!("Processing MIDI file: {}", args.input.display());

    // Everything is parsed before the first file is written
    let midi_data = MidiData::from_file(&args.input)
        .with_context(|| format!("Could not load {}", args.input.display()))?;

    let exporter = TrackExporter::new(TimelineOptions::default());

    if args.stdout {
        for track in exporter.render_all(midi_data.tracks()) {
            match &track.name {
                Some(name) => println!("# Track {}: {}", track.index, name),
                None => println!("# Track {}", track.index),
            }
            print!("{}", track.text);
        }
        return Ok(());
    }

    let report = exporter.export(&midi_data, &base_name(&args.input));

    if report.written.is_empty() && report.failed.is_empty() {
        tracing::warn!("No tracks with notes found in {}", args.input.display());
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} track(s) could not be written",
            report.failed.len(),
            report.failed.len() + report.written.len()
        );
    }

    Ok(())
}

fn init_logging(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
