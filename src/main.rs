//! rfsweep: sweep an SDR receiver across the configured ranges and report
//! the strongest signals of every pass.
//!
//! Report lines go to stdout (`Frequency: <int>, Power: <float>`, or NDJSON
//! with `--json`); logs go to stderr or to a dated file under
//! `--log-directory`.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use rfsweep::config::ScanConfig;
use rfsweep::defaults::SEPARATOR_WIDTH;
use rfsweep::detector::NoiseLevel;
use rfsweep::device::Receiver;
use rfsweep::protocol::{self, ReportMessage, VERSION};
use rfsweep::record::{NullRecorder, Recorder, SigMfRecorder};
use rfsweep::scan::{PassReport, Scanner, ShutdownToken, SweepPlan};
use rfsweep::sim::SimulatedReceiver;
use rfsweep::ScanError;

#[derive(Parser, Debug)]
#[command(name = "rfsweep", version, about = "Sweep an SDR receiver and report strong signals")]
struct Cli {
    /// Path to the JSON configuration document
    #[arg(value_name = "FILE")]
    config: PathBuf,

    /// Store logs in DIR/YYYY-MM-DD/HH_MM_SS.txt instead of stderr
    #[arg(short, long, value_name = "DIR")]
    log_directory: Option<PathBuf>,

    /// Verbosity (-v warnings, -vv info, -vvv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Receiver index
    #[arg(long, default_value_t = 0)]
    device: u32,

    /// Sweep a simulated receiver instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Write NDJSON report messages instead of text lines
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ScanConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            println!("Error while loading json config: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(cli.verbose, cli.log_directory.as_deref()) {
        eprintln!("cannot set up logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ScanError>() {
                Some(ScanError::Device(device)) => {
                    log::error!("Device error, error message: {device} quitting!")
                }
                Some(other) => log::error!("{other}! quitting!"),
                None => log::error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

// ── Logging ────────────────────────────────────────────────────────────

fn level_filter(verbose: u8) -> LevelFilter {
    const LEVELS: [LevelFilter; 4] = [
        LevelFilter::ERROR,
        LevelFilter::WARN,
        LevelFilter::INFO,
        LevelFilter::DEBUG,
    ];
    LEVELS[usize::from(verbose).min(LEVELS.len() - 1)]
}

/// Route `log` records through a tracing fmt subscriber.
fn init_logging(verbose: u8, directory: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level_filter(verbose))
        .with_target(true);

    let result = match directory {
        Some(dir) => {
            let now = Local::now();
            let day = dir.join(now.format("%Y-%m-%d").to_string());
            fs::create_dir_all(&day)
                .with_context(|| format!("creating log directory {}", day.display()))?;
            let path = day.join(now.format("%H_%M_%S.txt").to_string());
            let file = File::create(&path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("{e}"))
}

// ── Startup banner ─────────────────────────────────────────────────────

fn log_banner(config: &ScanConfig) {
    log::info!("ignored frequency ranges:");
    for range in &config.ignored_frequencies_ranges {
        log::info!("  {range}");
    }
    log::info!("frequency ranges:");
    for range in &config.frequencies_ranges {
        log::info!("  {range}");
    }
    log::info!("{:-^width$}", " scanning started ", width = SEPARATOR_WIDTH);
}

// ── Scan ───────────────────────────────────────────────────────────────

fn run(cli: &Cli, config: ScanConfig) -> Result<()> {
    log_banner(&config);

    // Ranges are checked before any hardware is opened
    let plan = SweepPlan::new(&config)?;

    // SIGINT and SIGTERM both finish the current pass and exit cleanly
    let token = ShutdownToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to set signal handler")?;

    let recorder: Box<dyn Recorder> = if config.disable_recording {
        Box::new(NullRecorder)
    } else {
        Box::new(SigMfRecorder::new(
            config.recording_directory.clone(),
            config.recording_samples,
        ))
    };

    let receiver = open_receiver(cli)?;
    let mut scanner = Scanner::new(receiver, recorder, config, plan)?;

    if cli.json {
        let noise_level = match scanner.config().noise_level {
            NoiseLevel::Auto => None,
            NoiseLevel::Fixed(v) => Some(v),
        };
        let status = ReportMessage::Status {
            version: VERSION,
            ranges: scanner.ranges().len(),
            bandwidth: scanner.config().bandwidth,
            noise_level,
        };
        emit(&mut io::stdout().lock(), &status).context("writing report to stdout")?;
    }

    let json = cli.json;
    let passes = scanner.run(&token, |report| {
        if let Err(e) = write_report(&mut io::stdout().lock(), report, json) {
            log::error!("cannot write report to stdout: {e}");
            token.cancel();
        }
    })?;
    log::info!("scan finished after {passes} passes");
    Ok(())
}

fn open_receiver(cli: &Cli) -> Result<Box<dyn Receiver>> {
    if cli.simulate {
        log::info!("using simulated receiver");
        return Ok(Box::new(SimulatedReceiver::new(u64::from(cli.device))));
    }
    open_hardware(cli.device)
}

#[cfg(feature = "rtlsdr")]
fn open_hardware(index: u32) -> Result<Box<dyn Receiver>> {
    let receiver = rfsweep::rtlsdr::RtlSdrReceiver::open(index).map_err(ScanError::from)?;
    Ok(Box::new(receiver))
}

#[cfg(not(feature = "rtlsdr"))]
fn open_hardware(_index: u32) -> Result<Box<dyn Receiver>> {
    let e = rfsweep::device::DeviceError::Unsupported("built without the rtlsdr feature");
    Err(ScanError::from(e).into())
}

// ── Reporting ──────────────────────────────────────────────────────────

/// Write one pass. A failed write means nobody is reading the report.
fn write_report<W: Write>(out: &mut W, report: &PassReport, json: bool) -> io::Result<()> {
    if !json {
        for line in report.lines() {
            writeln!(out, "{line}")?;
        }
        return out.flush();
    }

    for best in &report.triggered {
        emit(
            out,
            &ReportMessage::Trigger {
                pass: report.pass,
                frequency: best.frequency,
                power: best.power,
                noise_level: best.noise_level,
            },
        )?;
    }
    for c in &report.reported {
        emit(
            out,
            &ReportMessage::Candidate {
                pass: report.pass,
                frequency: c.frequency,
                power: c.power,
            },
        )?;
    }
    emit(
        out,
        &ReportMessage::Pass {
            pass: report.pass,
            sub_bands: report.sub_bands,
            triggered: report.triggered.len(),
            reported: report.reported.len(),
        },
    )
}

fn emit<W: Write>(out: &mut W, msg: &ReportMessage) -> io::Result<()> {
    match protocol::to_ndjson(msg) {
        Some(buf) => {
            out.write_all(&buf)?;
            out.flush()
        }
        None => {
            log::warn!("report message too large: {:?}", msg);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfsweep::filter::Candidate;

    /// Behaves like a pipe whose reader has gone away.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    fn report() -> PassReport {
        PassReport {
            pass: 2,
            sub_bands: 3,
            triggered: Vec::new(),
            reported: vec![Candidate::new(1_000, 1.5), Candidate::new(2_000, -3.25)],
        }
    }

    // ── Report output ───────────────────────────────────────────────

    #[test]
    fn text_report_writes_one_line_per_candidate() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Frequency: 1000, Power: 1.50\nFrequency: 2000, Power: -3.25\n"
        );
    }

    #[test]
    fn json_report_ends_with_pass_summary() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(r#""type":"candidate""#));
        assert!(lines[2].contains(r#""type":"pass""#));
    }

    #[test]
    fn closed_stdout_is_an_error() {
        let err = write_report(&mut ClosedPipe, &report(), false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = write_report(&mut ClosedPipe, &report(), true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    // ── CLI ─────────────────────────────────────────────────────────

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_filter(0), LevelFilter::ERROR);
        assert_eq!(level_filter(1), LevelFilter::WARN);
        assert_eq!(level_filter(2), LevelFilter::INFO);
        assert_eq!(level_filter(3), LevelFilter::DEBUG);
        assert_eq!(level_filter(9), LevelFilter::DEBUG);
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "rfsweep",
            "config.json",
            "-l",
            "logs",
            "-vvv",
            "--device",
            "1",
            "--simulate",
            "--json",
        ]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.log_directory, Some(PathBuf::from("logs")));
        assert_eq!(cli.verbose, 3);
        assert_eq!(cli.device, 1);
        assert!(cli.simulate && cli.json);
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["rfsweep", "config.json"]);
        assert_eq!(cli.log_directory, None);
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.device, 0);
        assert!(!cli.simulate && !cli.json);
    }
}
