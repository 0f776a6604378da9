use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use debugapk::{Config, Error, RunRequest};

#[derive(Parser)]
#[command(name = "debugapk")]
#[command(about = "Make a release APK debuggable and re-sign it for local testing")]
struct Cli {
    /// APK to convert; the result is written beside it as <name>.debug.apk
    apk: PathBuf,

    /// Pass `debug` to show captured tool output when a stage fails
    #[arg(value_enum)]
    mode: Option<Mode>,

    /// Config file (defaults to ./debugapk.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Debug,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let capture = cli.mode == Some(Mode::Debug);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = RunRequest::new(cli.apk).capture(capture);

    match debugapk::run(&request, &config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn report_error(error: &Error) -> ExitCode {
    // A missing input is reported, not treated as a failure.
    if !error.is_fatal() {
        println!("{}", error);
        return ExitCode::SUCCESS;
    }

    if let Some(captured) = error.captured() {
        println!("Command output:\n{}", captured.stdout);
        println!("Command error:\n{}", captured.stderr);
    }

    eprintln!("❌ {}", error);
    ExitCode::FAILURE
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info,debugapk=info",
        2 => "info,debugapk=debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
