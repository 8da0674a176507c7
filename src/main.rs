//! kismet-extract CLI
//!
//! Pulls device records from a Kismet server or a Kismet log file and
//! prints one line per device.

use anyhow::Context;
use clap::Parser;
use kismet_extract::{
    drain, open_reader, parse_filter, Config, Credentials, LoggingConfig, Target,
};
use std::io::{self, BufRead, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kismet-extract")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stream device records from Kismet's REST API or a Kismet log")]
#[command(
    long_about = "Stream device records from Kismet's REST API or a Kismet log.\n\n\
    With --rest-url, --filter is a space separated list of Kismet tracked field \
    paths (see /system/tracked_fields.html on your server).\n\
    With --db-file, --filter is a space separated list of table/column pairs, \
    all naming the same table, e.g. \"devices/devmac devices/avg_lat devices/avg_lon\"."
)]
struct Cli {
    /// Kismet REST API base URL
    #[arg(long, value_name = "URL")]
    rest_url: Option<String>,

    /// Kismet sqlite3 log file
    #[arg(long, value_name = "PATH")]
    db_file: Option<PathBuf>,

    /// Fields (REST) or table/column pairs (log file) to read
    #[arg(short, long, default_value = "")]
    filter: String,

    /// REST username (default: $KISMET_USERNAME, then prompt)
    #[arg(long)]
    username: Option<String>,

    /// REST password (default: $KISMET_PASSWORD, then prompt)
    #[arg(long)]
    password: Option<String>,

    /// Config file (default: search the standard locations)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// Print a default config file and exit
    #[arg(long, exclusive = true)]
    print_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", kismet_extract::config::generate_default_config());
        return ExitCode::SUCCESS;
    }

    let config = match &cli.config {
        Some(path) => match Config::load_with_env(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::load_default(),
    };

    init_logging(&config.logging, cli.verbose);

    let outcome = run(&cli, &config);
    println!("Exiting. Have a good day! (っ◕‿◕)っ");

    match outcome {
        Ok(count) => {
            tracing::debug!(count, "Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &Config) -> anyhow::Result<usize> {
    tracing::debug!("Parsing command line options");

    let target = Target::select(cli.rest_url.as_deref(), cli.db_file.as_deref())?;
    println!("Reading from {}", target);

    // Everything that needs no I/O is checked before asking for credentials
    target.validate()?;
    let filter = parse_filter(&cli.filter, target.filter_mode())?;

    let credentials = if target.needs_credentials() {
        Some(read_credentials(cli)?)
    } else {
        None
    };

    let reader = open_reader(&target, filter, credentials.as_ref(), config)
        .with_context(|| format!("failed to open {}", target))?;

    let count = drain(reader, |n, record| {
        println!("Got Elem {} {}", n, record);
        ControlFlow::Continue(())
    })?;

    Ok(count)
}

fn read_credentials(cli: &Cli) -> anyhow::Result<Credentials> {
    let username = match cli.username.clone().or_else(|| env_nonempty("KISMET_USERNAME")) {
        Some(username) => username,
        None => prompt("Kismet username: ").context("failed to read username")?,
    };

    let password = match cli.password.clone().or_else(|| env_nonempty("KISMET_PASSWORD")) {
        Some(password) => password,
        None => prompt("Kismet password: ").context("failed to read password")?,
    };

    let credentials = Credentials::new(username, password);
    credentials.validate()?;
    Ok(credentials)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn prompt(label: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", label)?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("kismet_extract={}", default_level))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}
