//! # parport CLI
//!
//! Command-line front end for printer output and PC-to-PC transfer over a
//! parallel port. Needs root (or `CAP_SYS_RAWIO`) for port access.
//!
//! ## Usage
//!
//! ```bash
//! # Print text on a printer attached to LPT1
//! sudo parport --print 'Hola mundo'
//!
//! # Receive on one machine...
//! sudo parport --server
//!
//! # ...and send from the other (type 0 to close)
//! sudo parport --client
//!
//! # LPT2, slower timing from a file, debug logging
//! sudo parport --base 0x278 --config timing.toml -v --server
//! ```
//!
//! ## Exit Status
//!
//! 0 on a normal close, 1 on argument/permission/transfer errors, 130 when
//! interrupted with Ctrl+C.

use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{ArgGroup, Parser};
use log::info;

use parport_link::{
    CancelToken, HardwarePort, LinkConfig, LinkError, Mode, PrintOptions, Session,
};

const BANNER: &str = concat!("Send Data To Printer v", env!("CARGO_PKG_VERSION"));

/// Send data to a printer, or to another PC, through the parallel port
#[derive(Parser, Debug)]
#[command(name = "parport")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["print", "server", "client"])))]
#[command(after_help = "Example:\n\tparport --print 'Hola mundo'")]
struct Cli {
    /// Print characters on the printer attached to the port
    #[arg(long, value_name = "TEXT")]
    print: Option<String>,

    /// Receive data through the port from another PC
    #[arg(long)]
    server: bool,

    /// Send data through the port to another PC
    #[arg(long)]
    client: bool,

    /// Wait for BUSY/ACK around every printed byte
    #[arg(long, requires = "print")]
    handshake: bool,

    /// Port base address (data register), e.g. 0x378 or 0x278
    #[arg(long, value_parser = parse_base)]
    base: Option<u16>,

    /// TOML file with base address and protocol timing
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Give up on a silent peer after this many milliseconds (0 = never)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[arg(hide = true)]
    extra: Vec<String>,
}

impl Cli {
    /// Arguments a mode invocation is made of: the flag, the print text,
    /// and anything trailing.
    fn word_count(&self) -> usize {
        1 + usize::from(self.print.is_some()) + self.extra.len()
    }

    fn mode(&self) -> Option<Mode> {
        if let Some(text) = &self.print {
            Some(Mode::Print {
                text: text.clone(),
                options: PrintOptions {
                    handshake: self.handshake,
                },
            })
        } else if self.server {
            Some(Mode::Server)
        } else if self.client {
            Some(Mode::Client)
        } else {
            None
        }
    }
}

fn parse_base(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid port address '{}': {}", s, e))
}

fn print_banner() {
    println!("{}", BANNER);
    println!("Enter argument --help to help list");
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            // --help / --version go to stdout with status 0
            print!("{e}");
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Argument error");
            eprint!("{e}");
            process::exit(1);
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), LinkError> {
    let Some(mode) = cli.mode() else {
        match cli.extra.first() {
            Some(stray) if cli.extra.len() <= 2 => {
                return Err(LinkError::Argument(format!("unknown option '{}'", stray)));
            }
            _ => {
                print_banner();
                return Ok(());
            }
        }
    };
    if cli.word_count() > 2 {
        print_banner();
        return Ok(());
    }
    if let Some(stray) = cli.extra.first() {
        return Err(LinkError::Argument(format!("unexpected '{}'", stray)));
    }

    let mut config = match &cli.config {
        Some(path) => LinkConfig::load(path)?,
        None => LinkConfig::default(),
    };
    if let Some(base) = cli.base {
        config.base = base;
    }
    if let Some(ms) = cli.timeout_ms {
        config.timing = config
            .timing
            .with_handshake_timeout(Some(Duration::from_millis(ms)));
    }

    let cancel = CancelToken::new();
    let trip = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, releasing port...");
        trip.cancel();
    })
    .map_err(|e| LinkError::Io(io::Error::other(e.to_string())))?;

    let mut port = HardwarePort::open(config.base)?;
    let session = Session::new(config.timing, cancel);

    let input = io::BufReader::new(io::stdin());
    let result = session.run(&mode, &mut port, input, &mut io::stdout().lock());
    let released = port.close();

    result?;
    released
}
