//! Phone Sensors CLI - Command-line interface for the phone sensor manager
//!
//! Commands:
//! - replay: Drive a device manager with recorded sensor events
//! - scan-calls: Run one hashed call-log scan
//! - hash: Print the salted hash of a phone number
//! - config: Print the default configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use phone_sensors::adapters::{
    MemoryBattery, MemoryCallLog, MemoryCallLogSink, NdjsonSink, SimulatedSensors,
};
use phone_sensors::clock::{Clock, ManualClock, SystemClock};
use phone_sensors::{
    hash_number, CallLogScanner, DeviceError, DeviceIdentity, DeviceManager, DeviceStatus,
    ManagerConfig, RawSensorEvent, StatusListener, VERSION,
};

/// Phone Sensors - On-device ingestion manager for phone sensor data
#[derive(Parser)]
#[command(name = "phone-sensors")]
#[command(author = "Synheart AI Inc")]
#[command(version = VERSION)]
#[command(about = "Convert phone sensor events into normalized measurements", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a device manager with recorded sensor events
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Manager configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Group ID, when no configuration file is given
        #[arg(long, default_value = "local")]
        group_id: String,

        /// Source ID, when no configuration file is given
        #[arg(long)]
        source_id: Option<String>,

        /// Battery level extra reported on every read
        #[arg(long, default_value = "100")]
        battery_level: i32,

        /// Battery scale extra reported on every read
        #[arg(long, default_value = "100")]
        battery_scale: i32,

        /// Call log entries to scan on start (JSON array)
        #[arg(long)]
        call_log: Option<PathBuf>,
    },

    /// Run one hashed call-log scan
    ScanCalls {
        /// Call log entries (JSON array, use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Source ID used as the hash salt
        #[arg(long)]
        source_id: String,

        /// Lookback window in hours
        #[arg(long, default_value = "24")]
        lookback_hours: u64,

        /// Scan time in milliseconds since the epoch (defaults to now)
        #[arg(long)]
        now_ms: Option<i64>,
    },

    /// Print the salted hash of a phone number
    Hash {
        /// Phone number as stored in the call log
        number: String,

        /// Salt (the device source ID)
        #[arg(long)]
        salt: String,
    },

    /// Print the default configuration
    Config {
        #[arg(long, default_value = "local")]
        group_id: String,

        #[arg(long)]
        source_id: Option<String>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SensorCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            config,
            group_id,
            source_id,
            battery_level,
            battery_scale,
            call_log,
        } => {
            let config = match config {
                Some(path) => ManagerConfig::from_json(&fs::read_to_string(path)?)?,
                None => ManagerConfig::new(group_id, source_id),
            };
            cmd_replay(
                &input,
                &output,
                input_format,
                config,
                (battery_level, battery_scale),
                call_log.as_deref(),
            )
        }

        Commands::ScanCalls {
            input,
            source_id,
            lookback_hours,
            now_ms,
        } => cmd_scan_calls(&input, &source_id, lookback_hours, now_ms),

        Commands::Hash { number, salt } => {
            println!("{}", hash_number(&number, &salt));
            Ok(())
        }

        Commands::Config {
            group_id,
            source_id,
        } => {
            let config = ManagerConfig::new(group_id, source_id);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Status listener that logs every transition
struct LoggingStatusListener;

impl StatusListener for LoggingStatusListener {
    fn device_status_updated(&self, identity: &DeviceIdentity, status: DeviceStatus) {
        info!(
            source_id = identity.source_id.as_deref().unwrap_or("unknown"),
            %status,
            "Device status updated"
        );
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    config: ManagerConfig,
    battery_extras: (i32, i32),
    call_log: Option<&Path>,
) -> Result<(), SensorCliError> {
    let input_data = read_input(input)?;
    let events = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => serde_json::from_str::<Vec<RawSensorEvent>>(&input_data)?,
    };

    if events.is_empty() {
        return Err(SensorCliError::NoEvents);
    }

    let call_log = match call_log {
        Some(path) => MemoryCallLog::from_json(&fs::read_to_string(path)?)?,
        None => MemoryCallLog::default(),
    };

    let writer: Box<dyn Write + Send> = if output.to_string_lossy() == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        Box::new(BufWriter::new(fs::File::create(output)?))
    };
    let sink = Arc::new(NdjsonSink::new(writer));
    let sensors = Arc::new(SimulatedSensors::with_all());

    let manager = DeviceManager::builder(config)
        .sensors(sensors.clone())
        .battery(Arc::new(MemoryBattery::new(Some(battery_extras))))
        .sink(sink.clone())
        .status_listener(Arc::new(LoggingStatusListener))
        .call_log(Arc::new(call_log))
        .build()?;

    manager.start(&HashSet::new())?;

    let mut failures = 0;
    for event in &events {
        for result in sensors.emit(event) {
            if let Err(e) = result {
                error!(error = %e, "Event rejected");
                failures += 1;
            }
        }
    }

    manager.close();
    sink.flush()?;

    info!(events = events.len(), failures, "Replay finished");
    eprintln!("{}", serde_json::to_string_pretty(&manager.state())?);

    if failures > 0 {
        Err(SensorCliError::RejectedEvents(failures))
    } else {
        Ok(())
    }
}

fn cmd_scan_calls(
    input: &Path,
    source_id: &str,
    lookback_hours: u64,
    now_ms: Option<i64>,
) -> Result<(), SensorCliError> {
    let store = Arc::new(MemoryCallLog::from_json(&read_input(input)?)?);
    let records = Arc::new(MemoryCallLogSink::default());
    let clock: Arc<dyn Clock> = match now_ms {
        Some(millis) => Arc::new(ManualClock::new(millis)),
        None => Arc::new(SystemClock),
    };

    let scanner = CallLogScanner::new(
        store,
        records.clone(),
        clock,
        source_id,
        lookback_window(lookback_hours),
    );
    let summary = scanner.scan()?;

    let mut stdout = io::stdout().lock();
    for record in records.records() {
        writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
    }
    stdout.flush()?;

    info!(emitted = summary.emitted, stopped = ?summary.stopped, "Scan finished");
    Ok(())
}

// Helper functions

/// Lookback window for `--lookback-hours`, saturating on huge values
fn lookback_window(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

fn read_input(input: &Path) -> Result<String, SensorCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_ndjson(ndjson: &str) -> Result<Vec<RawSensorEvent>, SensorCliError> {
    let mut events = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|e| {
            SensorCliError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;
        events.push(event);
    }
    Ok(events)
}

// Error types

#[derive(Debug)]
enum SensorCliError {
    Io(io::Error),
    Device(DeviceError),
    Json(serde_json::Error),
    NoEvents,
    RejectedEvents(usize),
    ParseError(String),
}

impl From<io::Error> for SensorCliError {
    fn from(e: io::Error) -> Self {
        SensorCliError::Io(e)
    }
}

impl From<DeviceError> for SensorCliError {
    fn from(e: DeviceError) -> Self {
        SensorCliError::Device(e)
    }
}

impl From<serde_json::Error> for SensorCliError {
    fn from(e: serde_json::Error) -> Self {
        SensorCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SensorCliError> for CliError {
    fn from(e: SensorCliError) -> Self {
        match e {
            SensorCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SensorCliError::Device(e) => CliError {
                code: "DEVICE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the manager configuration".to_string()),
            },
            SensorCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            SensorCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            SensorCliError::RejectedEvents(count) => CliError {
                code: "REJECTED_EVENTS".to_string(),
                message: format!("{} events were rejected", count),
                hint: Some("Run with RUST_LOG=debug for details".to_string()),
            },
            SensorCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be a raw sensor event".to_string()),
            },
        }
    }
}
