//! novapoll - NovaStar scan card telemetry poller
//!
//! Polls temperature, voltage and humidity from the scan cards behind a
//! NovaStar sending card and writes them out for monitoring.

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use novapoll_core::cli::{print_exit_codes, to_exit_code, ExitCodes, OutputFormat};
use novapoll_core::config::{AppConfig, ConfigError};
use novapoll_core::core::poller::{Poller, ResultSet};
use novapoll_core::core::protocol::{
    build_frame, decode, validate_response, CommandTemplate, ProtocolError,
};
use novapoll_core::core::report::{self, CsvLog, DEFAULT_CSV_DIR};
use novapoll_core::core::transport::{list_ports, SerialLink};
use novapoll_core::utils::{candidates, discover_port, select_port};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// novapoll CLI
#[derive(Parser, Debug)]
#[command(
    name = "novapoll",
    author = "Novapoll Team",
    version,
    about = "Telemetry poller for NovaStar LED display scan cards",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "NOVAPOLL_CONFIG")]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the scan cards and write the readings
    Poll {
        /// Host label written in front of every sender line
        hostname: Option<String>,

        /// Number of scan cards
        cards: Option<u32>,

        /// Also poll the multi-function card
        #[arg(short, long)]
        multifunction: bool,

        /// Skip the multi-function card even when the config enables it
        #[arg(long, conflicts_with = "multifunction")]
        no_multifunction: bool,

        /// Serial port name (auto-selected when absent)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Reply timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Sender file replaced after every cycle
        #[arg(long)]
        sender_file: Option<PathBuf>,

        /// Write a CSV log into this folder
        #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_CSV_DIR)]
        csv_dir: Option<PathBuf>,

        /// Operator recorded in CSV rows
        #[arg(long)]
        operator: Option<String>,

        /// Repeat cycles every SECS seconds until Ctrl+C
        #[arg(short, long, value_name = "SECS")]
        interval: Option<u64>,
    },

    /// List available serial ports
    ListPorts {
        /// Show descriptions and the port auto-selection would pick
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print the request frame of a command
    Frame {
        /// Command name
        command: String,

        /// Card index
        #[arg(short, long, default_value_t = 0)]
        card: u8,
    },

    /// Validate and decode a captured response
    Decode {
        /// Command the response answers
        command: String,

        /// Response bytes as hex
        #[arg(value_name = "HEX")]
        response: String,
    },

    /// List the configured commands
    Commands,

    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(ExitCodes::ERROR);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {e:#}");
            to_exit_code(&e)
        }
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let stderr_layer = if cli.log_json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &cli.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), PathBuf::from);
            let file_name = path
                .file_name()
                .with_context(|| format!("invalid log file path {}", path.display()))?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating log folder {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(&dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    config.context("loading configuration")
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Poll { .. } => {
            let mut config = load_config(cli)?;
            apply_poll_overrides(&cli.command, &mut config);
            config.validate()?;

            poll(cli, &config)
        }
        Commands::ListPorts { detailed } => list_serial_ports(cli, *detailed),
        Commands::Frame { command, card } => {
            let config = load_config(cli)?;
            let template = find_command(&config, command)?;
            let frame = build_frame(&template, *card)?;

            match cli.format {
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "command": template.name(),
                        "card": card,
                        "frame": hex::encode_upper(frame.as_bytes()),
                        "checksum": hex::encode_upper(frame.checksum()),
                        "response_len": template.response_len(),
                    });
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                OutputFormat::Text => println!("{frame}"),
            }
            Ok(())
        }
        Commands::Decode { command, response } => {
            let config = load_config(cli)?;
            let template = find_command(&config, command)?;

            let digits: String = response.chars().filter(|c| !c.is_whitespace()).collect();
            let digits = digits.strip_prefix("0x").unwrap_or(&digits);
            let raw = hex::decode(digits)
                .map_err(|e| ProtocolError::MalformedFrame(format!("invalid hex response: {e}")))?;

            let expected = config.poller_config().expected_len(&template);
            let response = validate_response(raw, expected)?;
            if !response.checksum_ok() {
                warn!("Response checksum does not verify");
            }
            let telemetry = decode(template.kind(), &response);

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&telemetry)?),
                OutputFormat::Text => {
                    for field in telemetry.fields() {
                        println!("{:<12} {:<3} {}", field.name, field.valid, field.value);
                    }
                }
            }
            Ok(())
        }
        Commands::Commands => {
            let config = load_config(cli)?;
            let set = config.command_set()?;

            match cli.format {
                OutputFormat::Json => {
                    let entries: Vec<_> = set
                        .iter()
                        .map(|t| {
                            serde_json::json!({
                                "name": t.name(),
                                "kind": t.kind(),
                                "multifunction": set.multifunction().contains(t),
                                "template": hex::encode_upper(t.bytes()),
                                "response_len": t.response_len(),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                }
                OutputFormat::Text => {
                    for (title, templates) in
                        [("Primary", set.primary()), ("Multi-function", set.multifunction())]
                    {
                        println!("{title} commands:");
                        for t in templates {
                            println!(
                                "  {:<24} {:<12} {} bytes  {}",
                                t.name(),
                                t.kind(),
                                t.response_len(),
                                hex::encode_upper(t.bytes())
                            );
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(())
        }
    }
}

/// Command line values of `poll` take precedence over the file
fn apply_poll_overrides(command: &Commands, config: &mut AppConfig) {
    let Commands::Poll {
        hostname,
        cards,
        multifunction,
        no_multifunction,
        port,
        baud,
        timeout_ms,
        sender_file,
        csv_dir,
        operator,
        interval,
    } = command
    else {
        return;
    };

    if let Some(hostname) = hostname {
        config.report.hostname = Some(hostname.clone());
    }
    if let Some(cards) = cards {
        config.polling.cards = *cards;
    }
    if *multifunction {
        config.polling.multifunction = true;
    } else if *no_multifunction {
        config.polling.multifunction = false;
    }
    if let Some(port) = port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = baud {
        config.serial.baud_rate = *baud;
    }
    if let Some(timeout_ms) = timeout_ms {
        config.serial.read_timeout_ms = *timeout_ms;
    }
    if let Some(path) = sender_file {
        config.report.sender_file = Some(path.clone());
    }
    if let Some(dir) = csv_dir {
        config.report.csv_dir = Some(dir.clone());
    }
    if let Some(operator) = operator {
        config.report.operator = operator.clone();
    }
    if let Some(interval) = interval {
        config.polling.interval_secs = Some(*interval);
    }
}

fn find_command(config: &AppConfig, name: &str) -> anyhow::Result<CommandTemplate> {
    let set = config.command_set()?;
    match set.find(name) {
        Some(template) => Ok(template.clone()),
        None => bail!("Unknown command '{name}', see `novapoll commands`"),
    }
}

fn poll(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let hostname = config.report.hostname.clone().ok_or_else(|| {
        ConfigError::Invalid("a hostname is required, pass it or set report.hostname".into())
    })?;
    let commands = config.command_set()?;

    let port = match &config.serial.port {
        Some(port) => port.clone(),
        None => discover_port(&config.serial.port_hint)?.name,
    };

    let link = SerialLink::open(config.serial_config(&port))?;
    info!("Connected to {}", link.connection_info());

    let mut poller = Poller::new(link, commands, config.poller_config());

    let mut csv_log = match &config.report.csv_dir {
        Some(dir) => Some(CsvLog::create(dir)?),
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    if config.polling.interval_secs.is_some() {
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })?;
    }

    loop {
        let results = poller.run_cycle()?;
        let now = Local::now();

        print_results(cli, &now, &hostname, &results)?;

        if let Some(path) = &config.report.sender_file {
            report::write_sender_file(path, &hostname, &results)?;
        }
        if let Some(log) = csv_log.as_mut() {
            log.append(&now, &hostname, &config.report.operator, &results)?;
        }

        let Some(interval) = config.polling.interval_secs else {
            break;
        };
        if !wait(&running, Duration::from_secs(interval)) {
            break;
        }
    }

    let link = poller.into_transport();
    info!(
        "Closed {}: {} frame(s) sent, {} timeout(s)",
        link.connection_info(),
        link.stats().packets_sent,
        link.stats().timeouts
    );
    if let Some(log) = &csv_log {
        info!("{} CSV row(s) in {}", log.rows(), log.path().display());
    }
    Ok(())
}

/// Sleep for `interval`, returning false when interrupted
fn wait(running: &AtomicBool, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(Duration::from_millis(100)));
    }
    info!("Interrupted");
    false
}

fn print_results(
    cli: &Cli,
    now: &chrono::DateTime<Local>,
    hostname: &str,
    results: &ResultSet,
) -> anyhow::Result<()> {
    match cli.format {
        OutputFormat::Json => println!("{}", report::to_json(now, hostname, results)?),
        OutputFormat::Text => {
            if !cli.quiet {
                for line in report::sender_lines(hostname, results) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

fn list_serial_ports(cli: &Cli, detailed: bool) -> anyhow::Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        if !cli.quiet {
            println!("No serial ports found.");
        }
        return Ok(());
    }

    let found = candidates(&ports);
    let hint = load_config(cli)
        .map(|c| c.serial.port_hint)
        .unwrap_or_else(|_| novapoll_core::utils::DEFAULT_PORT_HINT.to_string());
    let selected = select_port(&found, &hint).ok().map(|c| c.name.clone());

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    let description = found
                        .iter()
                        .find(|c| c.name == p.port_name)
                        .map(|c| c.description.clone());
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type),
                        "description": description,
                        "selected": selected.as_deref() == Some(p.port_name.as_str()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if detailed {
                println!("Available Serial Ports:");
                println!("{:-<60}", "");
                for port in &ports {
                    let marker = if selected.as_deref() == Some(port.port_name.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    match found.iter().find(|c| c.name == port.port_name) {
                        Some(candidate) => println!("{marker} {candidate}"),
                        None => println!("{marker} {} [{:?}]", port.port_name, port.port_type),
                    }
                }
            } else {
                for port in &ports {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(())
}
