use clap::Parser;
use log::{error, info, trace, warn};
use simplelog::{CombinedLogger, Config, LevelFilter, SharedLogger, SimpleLogger, WriteLogger};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use vf2_runner::channel::{SerialChannel, SystemPort};
use vf2_runner::config::{self, RunnerConfig};
use vf2_runner::console::{self, RawMode, TerminalKeys};
use vf2_runner::listener::{self, SharedSink};
use vf2_runner::session::Session;
use vf2_runner::transfer::TransferOptions;
use vf2_runner::{Error, BAUD_RATE};

// Command line arguments
#[derive(Parser)]
#[command(name = "vf2-runner")]
struct Cli {
    /// Serial device the board is attached to, e.g. /dev/ttyUSB0
    port_name: Option<String>,

    /// Image sent to the board on Ctrl+X
    binary_file: Option<PathBuf>,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 0 (off) to 5 (trace)
    #[arg(short, long, default_value = "3")]
    verbosity: u8,

    #[arg(long, default_value = "vf2-runner.log")]
    log_file: PathBuf,

    #[arg(long)]
    logtostderr: bool,
}

fn init_logging(
    verbosity: u8,
    log_file: &Path,
    logtostderr: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match verbosity {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![WriteLogger::new(
        log_level,
        Config::default(),
        File::create(log_file)?,
    )];
    if logtostderr {
        loggers.push(SimpleLogger::new(log_level, Config::default()));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

fn main() {
    let args = Cli::parse();
    let (Some(port_name), Some(binary_file)) = (&args.port_name, &args.binary_file) else {
        println!("Usage: vf2-runner <portName> <ELF-file>");
        return;
    };
    if let Err(e) = init_logging(args.verbosity, &args.log_file, args.logtostderr) {
        println!("[ERR] Failed to set up logging. {}", e);
        return;
    }
    trace!("Starting up");

    let config = match &args.config {
        Some(path) => match config::read_configuration(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                println!("[ERR] {}", e);
                return;
            }
        },
        None => RunnerConfig::default(),
    };
    trace!("Configuration loaded: {:?}", config);

    println!("[!] Trying to open the port at: {}", port_name);
    let channel = match SerialChannel::open(port_name, BAUD_RATE, &config.port) {
        Ok(channel) => Arc::new(channel),
        Err(e) => {
            error!("{}", e);
            let cause = match &e {
                Error::Connection { source, .. } => source.to_string(),
                other => other.to_string(),
            };
            println!("[ERR] Error occurred when opening the port. {}", cause);
            return;
        }
    };
    info!("Opened {} at {} baud", channel.device(), channel.baud_rate());
    install_signal_handler(Arc::clone(&channel));
    println!("[!] Press Ctrl+C to exit");

    match run(Arc::clone(&channel), binary_file, &config) {
        Ok(()) => info!("Successfully stopping"),
        Err(e) => {
            error!("Failed {}", e);
            println!("[ERR] {}", e);
        }
    }
}

// SIGINT/SIGTERM from outside the terminal: release the port and the
// terminal before going away.
fn install_signal_handler(channel: Arc<SerialChannel<SystemPort>>) {
    let installed = ctrlc::set_handler(move || {
        info!("Terminated by signal");
        channel.close();
        RawMode::restore();
        process::exit(0);
    });
    if let Err(e) = installed {
        warn!("Failed to install the signal handler: {}", e);
    }
}

fn run(
    channel: Arc<SerialChannel<SystemPort>>,
    binary_file: &Path,
    config: &RunnerConfig,
) -> vf2_runner::Result<()> {
    let display: SharedSink = Arc::new(Mutex::new(io::stdout()));
    let raw_mode = RawMode::enable()?;
    let listener = listener::spawn(
        Arc::clone(&channel),
        Arc::clone(&display),
        config.console.poll_interval(),
    )?;

    let keys = console::spawn_reader(
        TerminalKeys::new(config.console.trigger_key),
        Arc::clone(&channel),
    )?;

    let mut session = Session::new(
        Arc::clone(&channel),
        keys,
        display,
        binary_file.to_path_buf(),
        TransferOptions::from(&config.transfer),
    );
    let result = session.run();

    channel.close();
    if listener.join().is_err() {
        error!("Listener thread panicked");
    }
    drop(raw_mode);
    result
}
