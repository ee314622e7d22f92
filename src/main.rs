use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use offline_sort::utils::{self, format_bytes, format_duration};
use offline_sort::{BoxError, JsonLinesCodec, SortConfig, Sorter};

mod json_key;

use json_key::JsonKeyExtractor;

#[derive(Parser)]
#[command(name = "offline-sort")]
#[command(about = "Sort JSON-lines records by key, spilling to temporary files when the input is large")]
struct Args {
    #[arg(short, long, default_value = "-", help = "Input JSON-lines file, or - for stdin")]
    input: PathBuf,

    #[arg(short, long, default_value = "-", help = "Output file, or - for stdout")]
    output: PathBuf,

    #[arg(
        short,
        long = "key",
        required = true,
        help = "Field name or JSON pointer to sort by; repeat for a composite key"
    )]
    keys: Vec<String>,

    #[arg(long, help = "Records per in-memory chunk (overrides the config file)")]
    chunk_size: Option<usize>,

    #[arg(long, help = "Derive the chunk size from system memory")]
    auto_chunk_size: bool,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(long, help = "Directory for spill files")]
    temp_dir: Option<PathBuf>,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    utils::setup_logging(if args.verbose { "verbose" } else { "normal" })?;

    let mut config = match &args.config {
        Some(path) => SortConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SortConfig::default(),
    };
    if let Some(dir) = &args.temp_dir {
        config.temp_directory = Some(dir.clone());
    }
    if args.auto_chunk_size {
        config.chunk_capacity = config.auto_chunk_capacity();
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_capacity = chunk_size;
    }

    let key_fn = JsonKeyExtractor::new(&args.keys);
    info!("Sorting {} by {:?}", describe(&args.input), key_fn.pointers());
    info!("Chunk capacity: {} records", config.chunk_capacity);

    let start_time = Instant::now();
    let reader = open_input(&args.input)?;

    // Records are `serde_json::Value`, which only a self-describing format can read back.
    let mut sorter =
        Sorter::from_results(read_records(reader), config, key_fn)?.with_codec(JsonLinesCodec);
    let sorted = match sorter.sort() {
        Ok(sorted) => sorted,
        Err(e) if e.is_spill_io() => {
            return Err(anyhow::Error::new(e)
                .context("Spilling to temporary files failed; check free space or pass --temp-dir"));
        }
        Err(e) => return Err(e.into()),
    };

    let mut writer = open_output(&args.output)?;
    for record in &sorted {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    let stats = sorter.stats();
    info!("Records sorted: {}", stats.total_records);
    info!(
        "Chunks: {} ({} spilled, {})",
        stats.chunks_created,
        stats.chunks_spilled,
        format_bytes(stats.bytes_spilled)
    );
    info!("Total time: {}", format_duration(start_time.elapsed().as_secs_f64()));

    Ok(())
}

fn read_records(reader: Box<dyn BufRead>) -> impl Iterator<Item = Result<Value, BoxError>> {
    reader
        .lines()
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(text) if text.trim().is_empty()))
        .map(|(index, line)| -> Result<Value, BoxError> {
            let line = line?;
            serde_json::from_str(&line)
                .map_err(|e| format!("line {}: {}", index + 1, e).into())
        })
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn describe(path: &Path) -> String {
    if is_stdio(path) {
        "stdin".to_string()
    } else {
        path.display().to_string()
    }
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if is_stdio(path) {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if is_stdio(path) {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}
