//! Wanderer command-line tool.
//!
//! Connects to a logger over a serial port, queries and programs it, and
//! downloads the recorded log as CSV or JSON. Exit codes map the host error
//! taxonomy so scripts can tell failure classes apart:
//!
//! | code | meaning                        |
//! |------|--------------------------------|
//! | 0    | success                        |
//! | 1    | local I/O failure              |
//! | 10   | serial port unavailable        |
//! | 11   | device timed out               |
//! | 12   | link I/O error                 |
//! | 13   | protocol violation             |
//! | 14   | operation illegal in state     |
//! | 15   | invalid arguments              |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wanderer_host::{
    DeviceSession, HostError, PortSettings, RetryPolicy, SerialLink, SessionConfig,
};
use wanderer_protocol::{Completeness, DeviceStatus, DownloadedLog, SamplingConfig};

#[derive(Parser, Debug)]
#[command(name = "wanderer")]
#[command(about = "Talk to a Wanderer temperature/vibration logger", version)]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports visible on this machine.
    ListPorts,

    /// Query device status and battery.
    Status {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Query the battery level.
    Battery {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Set the device clock to the host's current time.
    SetClock {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Program a new measurement. Discards the recorded log.
    Configure {
        #[command(flatten)]
        link: LinkArgs,

        /// Sensor read period in seconds (1-10).
        #[arg(long, default_value_t = 1)]
        sample_period: u16,

        /// Memory store period in seconds.
        #[arg(long, default_value_t = 1)]
        store_period: u16,

        /// Recording length in hours.
        #[arg(long, default_value_t = 1)]
        duration: u16,

        /// Temperature resolution threshold in percent (1 = store all).
        #[arg(long, default_value_t = 1)]
        res_temp: u8,

        /// Vibration resolution threshold in percent (1 = store all).
        #[arg(long, default_value_t = 1)]
        res_vib: u8,
    },

    /// Begin recording with the programmed configuration.
    Start {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Stop an in-progress recording.
    Stop {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Download the recorded log. An in-progress recording is stopped
    /// first, matching the device's own behavior on read-out.
    Download {
        #[command(flatten)]
        link: LinkArgs,

        /// Write samples as CSV to this file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the decoded log as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Serial port name (e.g. /dev/ttyUSB0, COM1).
    #[arg(short, long)]
    port: String,

    /// Baud rate.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Per-attempt response timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Attempts before a transient failure is reported.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,
}

impl LinkArgs {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            port: PortSettings {
                baud_rate: self.baud,
                ..PortSettings::default()
            },
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
            response_timeout: Duration::from_millis(self.timeout_ms),
            ..SessionConfig::default()
        }
    }

    /// Open the port and confirm the device answers.
    fn connect(&self) -> Result<(DeviceSession<SerialLink>, DeviceStatus), HostError> {
        let mut session = DeviceSession::open(&self.port, &self.session_config())?;
        let status = session.connect()?;
        Ok((session, status))
    }
}

/// Host failures keep their taxonomy; local file I/O gets its own lane.
enum CliError {
    Host(HostError),
    File(PathBuf, std::io::Error),
}

impl From<HostError> for CliError {
    fn from(err: HostError) -> Self {
        CliError::Host(err)
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Host(err) => err.fmt(f),
            CliError::File(path, err) => write!(f, "writing {}: {err}", path.display()),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &CliError) -> u8 {
    match err {
        CliError::File(..) => 1,
        CliError::Host(err) => match err {
            HostError::PortUnavailable { .. } => 10,
            HostError::Timeout { .. } => 11,
            HostError::Link { .. } | HostError::LinkClosed { .. } => 12,
            HostError::Protocol { .. } => 13,
            HostError::InvalidStateTransition { .. } | HostError::AlreadySampling => 14,
            HostError::InvalidPayload { .. } => 15,
        },
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::ListPorts => list_ports(),

        Commands::Status { link } => {
            let (mut session, status) = link.connect()?;
            let battery = session.battery()?;
            println!("sampling:      {}", status.sampling);
            println!("samples:       {}", status.sample_count);
            println!("battery:       {battery} %");
            println!("sample period: {:?}", status.sample_period);
            println!("store period:  {:?}", status.store_period);
            Ok(())
        }

        Commands::Battery { link } => {
            let (mut session, _) = link.connect()?;
            println!("{} %", session.battery()?);
            Ok(())
        }

        Commands::SetClock { link } => {
            let (mut session, _) = link.connect()?;
            let now = Utc::now();
            session.set_clock(unix_secs(&now))?;
            println!("clock set to {}", now.to_rfc3339());
            Ok(())
        }

        Commands::Configure {
            link,
            sample_period,
            store_period,
            duration,
            res_temp,
            res_vib,
        } => {
            let (mut session, _) = link.connect()?;
            session.enter_idle()?;
            // Program the clock alongside the measurement, the way the
            // vendor software does.
            session.set_clock(unix_secs(&Utc::now()))?;
            session.configure(SamplingConfig {
                sample_period_secs: sample_period,
                store_period_secs: store_period,
                duration_hours: duration,
                resolution_temp: res_temp,
                resolution_vib: res_vib,
            })?;
            println!("measurement programmed");
            Ok(())
        }

        Commands::Start { link } => {
            let (mut session, _) = link.connect()?;
            session.enter_idle()?;
            session.start_sampling()?;
            println!("recording started");
            Ok(())
        }

        Commands::Stop { link } => {
            let (mut session, _) = link.connect()?;
            session.resume_sampling()?;
            session.stop_sampling()?;
            println!("recording stopped");
            Ok(())
        }

        Commands::Download { link, output, json } => {
            let (mut session, status) = link.connect()?;
            if status.sampling {
                info!("recording in progress; stopping it for read-out");
                session.resume_sampling()?;
                session.stop_sampling()?;
            } else {
                session.enter_idle()?;
            }

            let log = session.download(None)?;
            summarize(&log);

            if let Some(path) = output {
                write_csv(&path, &log).map_err(|err| CliError::File(path.clone(), err))?;
                println!("wrote {} samples to {}", log.samples.len(), path.display());
            }
            if json {
                match serde_json::to_string_pretty(&log) {
                    Ok(text) => println!("{text}"),
                    Err(err) => eprintln!("error: JSON encoding failed: {err}"),
                }
            }
            Ok(())
        }
    }
}

fn unix_secs(now: &chrono::DateTime<Utc>) -> u32 {
    now.timestamp().clamp(0, u32::MAX as i64) as u32
}

fn list_ports() -> Result<(), CliError> {
    let ports = serialport::available_ports().map_err(|source| {
        CliError::Host(HostError::PortUnavailable {
            port: "(enumeration)".to_string(),
            source,
        })
    })?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

fn summarize(log: &DownloadedLog) {
    let completeness = match log.completeness {
        Completeness::Complete => "complete",
        Completeness::Partial => "partial",
    };
    println!("{} samples ({completeness})", log.samples.len());
    if log.dropped > 0 {
        println!("{} corrupt records dropped", log.dropped);
    }
    if log.clamped > 0 {
        println!("{} samples clamped at sensor limits", log.clamped);
    }
    if let (Some(min), Some(max)) = (
        log.samples
            .iter()
            .map(|s| s.temperature_c)
            .min_by(f32::total_cmp),
        log.samples
            .iter()
            .map(|s| s.temperature_c)
            .max_by(f32::total_cmp),
    ) {
        println!("temperature:    {min:.1} .. {max:.1} C");
    }
    if let Some(peak) = log
        .samples
        .iter()
        .map(|s| s.vibration_g)
        .max_by(f32::total_cmp)
    {
        println!("peak vibration: {peak:.2} G");
    }
}

fn write_csv(path: &Path, log: &DownloadedLog) -> Result<(), std::io::Error> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(
        writer,
        "sequence,elapsed_secs,temperature_c,vibration_g,temperature_clamped,vibration_clamped"
    )?;
    for sample in &log.samples {
        writeln!(
            writer,
            "{},{},{:.2},{:.3},{},{}",
            sample.sequence,
            sample.elapsed.as_secs(),
            sample.temperature_c,
            sample.vibration_g,
            sample.temperature_clamped,
            sample.vibration_clamped
        )?;
    }
    writer.flush()
}
