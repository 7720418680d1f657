use std::fmt;
use std::sync::Arc;

use dotenvy::dotenv;
use exam_core::model::ExamId;
use services::{Clock, SessionConfig, SessionController};
use storage::{AttemptStore, HttpAttemptStore, HttpStoreConfig};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod demo;
mod player;
mod render;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingExamId,
    UnknownArg(String),
    InvalidExamId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingExamId => write!(f, "--exam-id is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidExamId { raw } => write!(f, "invalid --exam-id value: {raw:?}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  exam-player play    --exam-id <id> [--code <code>] [backend]");
    eprintln!("  exam-player preview --exam-id <id> [backend]");
    eprintln!();
    eprintln!("Backend (one of):");
    eprintln!("  --base-url <url> [--token <token>]   grading API");
    eprintln!("  --demo                               built-in offline exam (code DEMO)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_API_BASE_URL, EXAM_API_TOKEN, EXAM_API_TIMEOUT_SECS,");
    eprintln!("  EXAM_TICK_MILLIS, EXAM_LOW_TIME_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Preview,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "play" => Some(Self::Play),
            "preview" => Some(Self::Preview),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    exam_id: ExamId,
    code: Option<String>,
    base_url: Option<String>,
    token: Option<String>,
    demo: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut exam_id = None;
        let mut code = None;
        let mut base_url = None;
        let mut token = None;
        let mut demo = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--exam-id" => {
                    let value = require_value(args, "--exam-id")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidExamId { raw: value });
                    }
                    exam_id = Some(ExamId::new(value.trim()));
                }
                "--code" => code = Some(require_value(args, "--code")?),
                "--base-url" => base_url = Some(require_value(args, "--base-url")?),
                "--token" => token = Some(require_value(args, "--token")?),
                "--demo" => demo = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            exam_id: exam_id.ok_or(ArgsError::MissingExamId)?,
            code,
            base_url,
            token,
            demo,
        })
    }
}

fn build_store(args: &Args, clock: Clock) -> Result<Arc<dyn AttemptStore>, Box<dyn std::error::Error>> {
    if args.demo {
        tracing::info!(exam_id = %args.exam_id, "using built-in demo exam");
        return Ok(Arc::new(demo::store(&args.exam_id, clock)?));
    }
    let config = match &args.base_url {
        Some(url) => HttpStoreConfig::new(url)?.with_token(
            args.token
                .clone()
                .or_else(|| std::env::var("EXAM_API_TOKEN").ok()),
        ),
        None => {
            let config = HttpStoreConfig::from_env()?;
            match &args.token {
                Some(token) => config.with_token(Some(token.clone())),
                None => config,
            }
        }
    };
    tracing::info!(base_url = %config.base_url, timeout = ?config.timeout, "using grading API");
    Ok(Arc::new(HttpAttemptStore::new(config)?))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.clone())
        })?,
    };

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let clock = Clock::system();
    let config = SessionConfig::from_env();
    let store = build_store(&args, clock)?;

    let controller = match cmd {
        Command::Play => {
            SessionController::new(store, clock, config, args.exam_id.clone())
        }
        Command::Preview => {
            SessionController::preview(store, config, args.exam_id.clone()).await?
        }
    };
    player::run(controller, args.code).await
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let file_appender = tracing_appender::rolling::daily("logs", "exam-player.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = log_fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Stdout belongs to the player; logs go to the file only.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "exam-player failed");
        eprintln!("{err}");
        std::process::exit(2);
    }
}
