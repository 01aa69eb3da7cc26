//! CAN Logger CLI Application
//!
//! Field logger daemon built on the can-logger library. It brings the CAN
//! interface up, loads the DBC schema, wires the GPIO button, status LED and
//! terminal commands into the capture loop, and runs until interrupted.

use anyhow::{bail, Context, Result};
use can_logger::bus::BusSource;
use can_logger::control::{run_terminal, ControlSender};
use can_logger::gpio::{ButtonConfig, ButtonWatcher, SysfsLed};
use can_logger::{
    control_channel, list_sessions, load_dbc_files, Decoder, EdgeTrigger, LinkManager,
    NullIndicator, RecordLayout, Schema, SessionManager, SessionStatus, ShutdownSignal,
    StatusIndicator, Supervisor,
};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod config;

use config::{AppConfig, Overrides};

/// CAN Logger - record CAN bus traffic to CSV session files
#[derive(Parser, Debug)]
#[command(name = "can-logger")]
#[command(about = "Log CAN bus frames to CSV, decoded with DBC files", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to DBC file(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// Directory for session files
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// CAN interface name
    #[arg(long, value_name = "IFACE")]
    channel: Option<String>,

    /// Bus bitrate in bit/s
    #[arg(long, value_name = "BPS")]
    bitrate: Option<u32>,

    /// Session file layout (long or wide)
    #[arg(long, value_name = "LAYOUT")]
    layout: Option<RecordLayout>,

    /// Run without the GPIO button and status LED
    #[arg(long)]
    no_gpio: bool,

    /// Do not reconfigure the interface with `ip link`
    #[arg(long)]
    no_link_setup: bool,

    /// List recorded sessions and exit
    #[arg(long)]
    list_sessions: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            dbc_files: self.dbc.clone(),
            output_dir: self.output_dir.clone(),
            channel: self.channel.clone(),
            bitrate: self.bitrate,
            layout: self.layout,
            no_gpio: self.no_gpio,
            no_link_setup: self.no_link_setup,
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Logger v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using logger library v{}", can_logger::VERSION);

    if let Err(e) = run(&args) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match load_app_config(args) {
        Ok(config) => config,
        Err(e) => {
            if !args.list_sessions {
                // Pins are unknown; reset the LED named by defaults and flags
                let mut fallback = AppConfig::default();
                fallback.apply_overrides(&args.overrides());
                fallback.expand_paths();
                switch_indicator_off(&fallback);
            }
            return Err(e);
        }
    };

    if args.list_sessions {
        return print_sessions(&config);
    }

    let mut indicator = open_indicator(&config)?;
    let shutdown = ShutdownSignal::new();
    let status = SessionStatus::new();
    let (sender, receiver) = control_channel(config.logger.control_capacity);

    let started = config
        .logger
        .validate()
        .context("Invalid logger configuration")
        .and_then(|()| prepare(&config, &sender, &status, &shutdown));
    let rig = match started {
        Ok(rig) => rig,
        Err(e) => {
            if let Err(led_err) = indicator.set(false) {
                log::warn!("Failed to switch indicator off: {}", led_err);
            }
            return Err(e);
        }
    };

    let Rig {
        bus,
        schema,
        link,
        button,
    } = rig;

    let sessions =
        SessionManager::new(&config.logger, schema.signal_columns()).with_status(status);
    let mut supervisor = Supervisor::new(
        bus,
        receiver,
        Decoder::new(schema),
        sessions,
        indicator,
        &config.logger,
    );

    log::info!(
        "Ready: sessions go to {:?}, waiting for a start trigger",
        config.logger.output_dir
    );
    let outcome = supervisor.run(&shutdown);

    drop(button);
    drop(supervisor);
    if let Some(link) = link {
        if let Err(e) = link.bring_down() {
            log::warn!("Interface teardown failed: {}", e);
        }
    }

    outcome.context("Failed to close the active session")?;
    log::info!("Logger stopped");
    Ok(())
}

/// Startup resources that must exist before the loop runs
struct Rig {
    bus: Box<dyn BusSource>,
    schema: Arc<dyn Schema>,
    link: Option<LinkManager>,
    button: Option<ButtonWatcher>,
}

/// Fatal startup steps, in order
fn prepare(
    config: &AppConfig,
    sender: &ControlSender,
    status: &SessionStatus,
    shutdown: &ShutdownSignal,
) -> Result<Rig> {
    std::fs::create_dir_all(&config.logger.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {:?}",
            config.logger.output_dir
        )
    })?;

    if config.schema.dbc_files.is_empty() {
        bail!("No DBC files configured (use --dbc or [schema] dbc_files)");
    }
    let schema: Arc<dyn Schema> = Arc::new(
        load_dbc_files(&config.schema.dbc_files).context("Failed to load DBC files")?,
    );

    let link = if config.bus.manage_interface {
        let link = LinkManager::new(&config.bus.channel, config.bus.bitrate)
            .with_sudo(config.bus.use_sudo);
        link.bring_up()
            .with_context(|| format!("Failed to bring up {}", config.bus.channel))?;
        Some(link)
    } else {
        None
    };

    let bus = open_bus(&config.bus.channel)?;

    let button = if config.gpio.enabled {
        let button_config = ButtonConfig {
            pin: config.gpio.button_pin,
            edge: config.gpio.edge,
            active_low: config.gpio.active_low,
            poll_interval: Duration::from_millis(config.gpio.poll_interval_ms),
        };
        let trigger = EdgeTrigger::new(sender.clone(), config.logger.debounce());
        Some(
            ButtonWatcher::spawn(&config.gpio.sysfs_root, button_config, trigger)
                .context("Failed to set up the logging button")?,
        )
    } else {
        log::info!("GPIO disabled; no hardware trigger");
        None
    };

    spawn_terminal(sender.clone(), status.clone())?;

    let handler_signal = shutdown.clone();
    ctrlc::set_handler(move || handler_signal.trigger())
        .context("Failed to install the interrupt handler")?;

    Ok(Rig {
        bus,
        schema,
        link,
        button,
    })
}

fn load_app_config(args: &Args) -> Result<AppConfig> {
    let mut config = config::load_config(args.config.as_deref())?;
    config.apply_overrides(&args.overrides());
    config.expand_paths();
    Ok(config)
}

/// Best-effort LED reset when startup fails before the indicator is open
fn switch_indicator_off(config: &AppConfig) {
    if !config.gpio.enabled {
        return;
    }
    // Opening the LED drives it off
    if let Err(e) = SysfsLed::open(
        &config.gpio.sysfs_root,
        config.gpio.led_pin,
        config.gpio.led_active_low,
    ) {
        log::warn!("Failed to switch indicator off: {}", e);
    }
}

fn open_indicator(config: &AppConfig) -> Result<Box<dyn StatusIndicator>> {
    if !config.gpio.enabled {
        return Ok(Box::new(NullIndicator));
    }
    let led = SysfsLed::open(
        &config.gpio.sysfs_root,
        config.gpio.led_pin,
        config.gpio.led_active_low,
    )
    .context("Failed to set up the status LED")?;
    Ok(Box::new(led))
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
fn open_bus(channel: &str) -> Result<Box<dyn BusSource>> {
    let bus = can_logger::bus::SocketCanBus::open(channel)
        .with_context(|| format!("Failed to open CAN interface {}", channel))?;
    Ok(Box::new(bus))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn open_bus(channel: &str) -> Result<Box<dyn BusSource>> {
    bail!(
        "Cannot open {}: this build has no SocketCAN support",
        channel
    )
}

/// Read `clear` commands from an interactive terminal
fn spawn_terminal(sender: ControlSender, status: SessionStatus) -> Result<()> {
    if !std::io::stdin().is_terminal() {
        log::debug!("stdin is not a terminal; commands disabled");
        return Ok(());
    }

    std::thread::Builder::new()
        .name("terminal".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            if let Err(e) = run_terminal(stdin.lock(), std::io::stdout(), &sender, &status) {
                log::warn!("Terminal input stopped: {}", e);
            }
        })
        .context("Failed to start the terminal thread")?;

    log::info!("Type 'clear' to delete recorded sessions");
    Ok(())
}

fn print_sessions(config: &AppConfig) -> Result<()> {
    let entries = list_sessions(&config.logger.output_dir, &config.logger.file_prefix)
        .with_context(|| format!("Failed to list {:?}", config.logger.output_dir))?;

    if entries.is_empty() {
        println!("No sessions in {:?}", config.logger.output_dir);
        return Ok(());
    }

    for entry in &entries {
        match &entry.metadata {
            Some(meta) => println!(
                "{}  {:>10} bytes  {:>8} records  {:>9.1} s  started {}",
                entry.file_name, entry.size_bytes, meta.records, meta.duration_s, meta.started_at
            ),
            None => println!("{}  {:>10} bytes", entry.file_name, entry.size_bytes),
        }
    }
    println!("{} session(s)", entries.len());
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
