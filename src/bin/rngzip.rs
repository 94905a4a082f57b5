//! rngzip CLI: schema-driven XML compression.

use clap::{ArgAction, Parser};
use rngzip::rnz::Record;
use rngzip::{Automaton, BitCoding, CompressConfig, DataCompression, DecompressConfig, Error, Settings, TraceConfig};
use std::ffi::OsString;
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "rngzip", version, about = "Schema-driven XML compression")]
struct Cli {
    /// Input files (none: stdin to stdout)
    files: Vec<PathBuf>,

    /// Write to stdout, keep input files
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Decompress
    #[arg(short, long)]
    decompress: bool,

    /// Choice coder: fixed, huffman or byte
    #[arg(short = 'E', long, default_value = "huffman", value_name = "CODER")]
    tree_encoder: BitCoding,

    /// Overwrite existing output files
    #[arg(short, long)]
    force: bool,

    /// Print settings and schema reference of compressed files
    #[arg(short, long)]
    identify: bool,

    /// Decompress even if the schema checksum differs
    #[arg(long)]
    ignore_checksum: bool,

    /// Keep input files
    #[arg(short, long)]
    keep: bool,

    /// Indent decompressed XML (default 2 spaces)
    #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = "2", value_name = "N")]
    pretty: Option<usize>,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// More output (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Suffix of compressed files
    #[arg(short = 'S', long, default_value = ".rnz")]
    suffix: String,

    /// Tree automaton (JSON)
    #[arg(short, long, value_name = "FILE")]
    schema: Option<PathBuf>,

    /// Compressor for the tree channel: none, gz, bz2, ppm, ppm5, hpm, hpm5
    #[arg(short = 'T', long, default_value = "gz", value_name = "NAME")]
    tree_compressor: DataCompression,

    /// Compressor for the data channel: none, gz, bz2, ppm, ppm5, hpm, hpm5
    #[arg(short = 'Z', long, default_value = "gz", value_name = "NAME")]
    data_compressor: DataCompression,

    /// Print elapsed time per file
    #[arg(short, long)]
    timings: bool,

    /// Trace choices, forks and blocks; when compressing, list choices and
    /// content on stderr instead of writing output
    #[arg(short = 'D', long)]
    debug: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings::new(self.tree_encoder, self.tree_compressor, self.data_compressor)
    }

    fn trace(&self) -> TraceConfig {
        if self.debug { TraceConfig::all() } else { TraceConfig::default() }
    }

    fn compress_config(&self) -> CompressConfig {
        CompressConfig { trace: self.trace(), ..CompressConfig::with_settings(self.settings()) }
    }

    fn decompress_config(&self) -> DecompressConfig {
        DecompressConfig { ignore_checksum: self.ignore_checksum, trace: self.trace() }
    }

    fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            return log::LevelFilter::Trace;
        }
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Schema from `-s`, loaded once.
struct Schema {
    automaton: Automaton,
    reference: String,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();

    process::exit(run(&cli));
}

/// Processes every input; returns the exit status.
fn run(cli: &Cli) -> i32 {
    let schema = match (&cli.schema, cli.identify) {
        (Some(path), false) => match load_automaton(path) {
            Ok(automaton) => Some(Schema { automaton, reference: path.to_string_lossy().into_owned() }),
            Err(e) => {
                eprintln!("rngzip: {e}");
                return 1;
            }
        },
        _ => None,
    };

    if cli.files.is_empty() {
        return match process_stdin(cli, schema.as_ref()) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("rngzip: -: {e}");
                1
            }
        };
    }

    let mut failed = false;
    for file in &cli.files {
        let start = Instant::now();
        if let Err(e) = process_file(cli, schema.as_ref(), file) {
            eprintln!("rngzip: {}: {e}", file.display());
            failed = true;
            continue;
        }
        if cli.timings {
            eprintln!("{}: {} ms", file.display(), start.elapsed().as_millis());
        }
    }
    i32::from(failed)
}

fn process_stdin(cli: &Cli, schema: Option<&Schema>) -> Result<(), String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("reading from stdin (Ctrl+D to finish)...");
    }
    let mut input = Vec::new();
    stdin.lock().read_to_end(&mut input).map_err(|e| format!("read error: {e}"))?;

    let start = Instant::now();
    if cli.identify {
        println!("{}", describe("-", &input)?);
        return Ok(());
    }
    if cli.debug && !cli.decompress {
        return list(cli, schema, &input);
    }
    let output = if cli.decompress { decompress(cli, schema, &input)? } else { compress(cli, schema, &input)? };
    write_output(Path::new("-"), &output)?;
    if cli.timings {
        eprintln!("-: {} ms", start.elapsed().as_millis());
    }
    Ok(())
}

fn process_file(cli: &Cli, schema: Option<&Schema>, file: &Path) -> Result<(), String> {
    let input = std::fs::read(file).map_err(|e| format!("read error: {e}"))?;
    if cli.identify {
        println!("{}", describe(&file.display().to_string(), &input)?);
        return Ok(());
    }
    if cli.debug && !cli.decompress {
        return list(cli, schema, &input);
    }

    let target = if cli.stdout { PathBuf::from("-") } else { output_path(file, &cli.suffix, cli.decompress) };
    if target != Path::new("-") && target.exists() && !cli.force {
        return Err(format!("{}: already exists; use --force (-f) to overwrite", target.display()));
    }

    let output = if cli.decompress { decompress(cli, schema, &input)? } else { compress(cli, schema, &input)? };
    write_output(&target, &output)?;
    log::info!("{} -> {} ({} -> {} bytes)", file.display(), target.display(), input.len(), output.len());

    if !cli.keep && !cli.stdout {
        std::fs::remove_file(file).map_err(|e| format!("cannot remove input: {e}"))?;
    }
    Ok(())
}

fn compress(cli: &Cli, schema: Option<&Schema>, input: &[u8]) -> Result<Vec<u8>, String> {
    let schema = schema.ok_or_else(|| Error::MissingSchema.to_string())?;
    rngzip::compress_xml(input, &schema.automaton, &schema.reference, &cli.compress_config(), Vec::new())
        .map_err(|e| e.to_string())
}

/// `-D` while compressing: a listing instead of output; the input stays.
fn list(cli: &Cli, schema: Option<&Schema>, input: &[u8]) -> Result<(), String> {
    let schema = schema.ok_or_else(|| Error::MissingSchema.to_string())?;
    let records = rngzip::list_xml(input, &schema.automaton, &cli.compress_config()).map_err(|e| e.to_string())?;
    write_listing(&records, std::io::stderr().lock()).map_err(|e| format!("write error: {e}"))
}

/// One line per record, then totals.
fn write_listing(records: &[Record], mut out: impl Write) -> std::io::Result<()> {
    let (mut choices, mut strings, mut chars) = (0u64, 0u64, 0u64);
    for record in records {
        match record {
            Record::Choice { .. } => choices += 1,
            Record::Content(s) => {
                strings += 1;
                chars += s.chars().count() as u64;
            }
        }
        writeln!(out, "{record}")?;
    }
    writeln!(out, "bits: {choices} choices.")?;
    writeln!(out, "data: {strings} strings, {chars} characters.")?;
    out.flush()
}

/// Without `-s` the schema reference stored in the header is loaded.
fn decompress(cli: &Cli, schema: Option<&Schema>, input: &[u8]) -> Result<Vec<u8>, String> {
    let stored;
    let automaton = match schema {
        Some(s) => &s.automaton,
        None => {
            let info = rngzip::identify(input).map_err(|e| e.to_string())?;
            if info.schema_ref.is_empty() {
                return Err(Error::MissingSchema.to_string());
            }
            log::info!("using stored schema reference {}", info.schema_ref);
            stored = load_automaton(Path::new(&info.schema_ref))?;
            &stored
        }
    };
    rngzip::decompress_to_xml(input, automaton, cli.decompress_config(), cli.pretty, Vec::new())
        .map_err(|e| e.to_string())
}

/// `NAME: N bytes coding/tree/data`, plus the schema reference if present.
fn describe(name: &str, input: &[u8]) -> Result<String, String> {
    let info = rngzip::identify(input).map_err(|e| e.to_string())?;
    let mut line = format!("{name}: {} bytes {}", input.len(), info.settings);
    if !info.schema_ref.is_empty() {
        line.push_str(&format!("\n  schema: {}", info.schema_ref));
    }
    Ok(line)
}

fn load_automaton(path: &Path) -> Result<Automaton, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    Automaton::from_reader(std::io::BufReader::new(file)).map_err(|e| format!("{}: {e}", path.display()))
}

/// Compress: `FILE` + suffix. Decompress: `FILE` minus suffix, or `FILE.xml`.
fn output_path(input: &Path, suffix: &str, decompress: bool) -> PathBuf {
    let name = input.as_os_str().to_string_lossy();
    if decompress {
        return match name.strip_suffix(suffix).filter(|stem| !stem.is_empty() && !suffix.is_empty()) {
            Some(stem) => PathBuf::from(stem),
            None => {
                let mut out = OsString::from(input.as_os_str());
                out.push(".xml");
                PathBuf::from(out)
            }
        };
    }
    let mut out = OsString::from(input.as_os_str());
    out.push(suffix);
    PathBuf::from(out)
}

/// Writes to stdout ("-") or atomically to a file (tmp and rename).
fn write_output(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        return stdout
            .write_all(bytes)
            .and_then(|()| stdout.flush())
            .map_err(|e| format!("write error: {e}"));
    }
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(format!("write error: {e}"));
    }
    std::fs::rename(&tmp, path).map_err(|e| format!("rename error: {e}"))
}
