//! consolepilot - stdio front end
//!
//! Reads one JSON request per line on stdin, runs each through the tool
//! layer concurrently and writes one JSON response per line on stdout.
//! Logs go to stderr so they never mix with the protocol.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use consolepilot::config::loader::ConfigLoader;
use consolepilot::models::ErrorKind;
use consolepilot::tools::{self, RunModuleRequest, SearchRequest, SessionCommandRequest, ToolContext};
use consolepilot::{Config, Error, PtyLauncher, RequestSerializer};

/// Command line options
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Enable debug logging
    debug: bool,
}

impl AppArgs {
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut app_args = AppArgs::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    let path = args.get(i + 1).context("Missing config file path")?;
                    app_args.config_path = Some(PathBuf::from(path));
                    i += 1;
                }
                "--debug" | "-d" => app_args.debug = true,
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("consolepilot v{}", consolepilot::VERSION);
                    process::exit(0);
                }
                other => anyhow::bail!("Unknown option: {}", other),
            }
            i += 1;
        }

        Ok(app_args)
    }
}

fn print_help() {
    println!("consolepilot - serialized automation for an interactive security console");
    println!();
    println!("USAGE:");
    println!("    consolepilot [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -d, --debug            Enable debug logging");
    println!("    -h, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("PROTOCOL:");
    println!("    stdin:  {{\"id\": 1, \"tool\": \"list_sessions\", \"params\": {{}}}}");
    println!("    stdout: {{\"id\": 1, \"ok\": true, \"result\": {{...}}}}");
    println!();
    println!("ENVIRONMENT:");
    println!("    CONSOLEPILOT_CONFIG    Path to configuration file");
    println!("    CONSOLEPILOT_DEBUG     Enable debug logging (1 or true)");
    println!("    RUST_LOG               Set logging level (error, warn, info, debug, trace)");
}

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    kind: Option<ErrorKind>,
    recoverable: bool,
}

impl From<&Error> for ErrorBody {
    fn from(error: &Error) -> Self {
        Self {
            message: error.to_string(),
            kind: error.kind(),
            recoverable: error.is_recoverable(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: u32,
}

#[derive(Debug, Deserialize)]
struct AdminParams {
    command: String,
}

fn params<T: serde::de::DeserializeOwned>(value: Value) -> consolepilot::Result<T> {
    // Tools without parameters may be called with `params` omitted
    let value = if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    };
    Ok(serde_json::from_value(value)?)
}

async fn dispatch(ctx: &ToolContext, tool: &str, raw: Value) -> consolepilot::Result<Value> {
    let value = match tool {
        "search_modules" => {
            let request: SearchRequest = params(raw)?;
            serde_json::to_value(tools::search_modules(ctx, request).await?)?
        }
        "list_sessions" => serde_json::to_value(tools::list_sessions(ctx).await?)?,
        "session_command" => {
            let request: SessionCommandRequest = params(raw)?;
            serde_json::to_value(tools::session_command(ctx, request).await?)?
        }
        "kill_session" => {
            let request: SessionParams = params(raw)?;
            serde_json::to_value(tools::kill_session(ctx, request.session_id).await?)?
        }
        "run_module" => {
            let request: RunModuleRequest = params(raw)?;
            serde_json::to_value(tools::run_module(ctx, request).await?)?
        }
        "admin_command" => {
            let request: AdminParams = params(raw)?;
            serde_json::to_value(tools::admin_command(ctx, &request.command).await?)?
        }
        "console_status" => serde_json::to_value(tools::console_status(ctx).await?)?,
        "list_jobs" => serde_json::to_value(tools::list_jobs(ctx).await?)?,
        other => {
            return Err(Error::InvalidParameter {
                name: "tool".to_string(),
                reason: format!("unknown tool '{}'", other),
            })
        }
    };
    Ok(value)
}

async fn handle_line(ctx: &ToolContext, line: &str) -> ToolResponse {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed request: {}", e);
            return ToolResponse {
                id: Value::Null,
                ok: false,
                result: None,
                error: Some(ErrorBody::from(&Error::from(e))),
            };
        }
    };

    debug!(tool = %request.tool, "Handling request");
    match dispatch(ctx, &request.tool, request.params).await {
        Ok(result) => ToolResponse {
            id: request.id,
            ok: true,
            result: Some(result),
            error: None,
        },
        Err(e) => {
            warn!(tool = %request.tool, "Tool failed: {}", e);
            ToolResponse {
                id: request.id,
                ok: false,
                result: None,
                error: Some(ErrorBody::from(&e)),
            }
        }
    }
}

fn load_configuration(args: &AppArgs) -> anyhow::Result<Config> {
    let config_path = args
        .config_path
        .clone()
        .or_else(|| env::var("CONSOLEPILOT_CONFIG").ok().map(PathBuf::from));

    match config_path {
        Some(path) => {
            debug!("Loading config from: {}", path.display());
            ConfigLoader::load_from_path(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(consolepilot::load_config()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AppArgs::parse().unwrap_or_else(|e| {
        eprintln!("{}", e);
        print_help();
        process::exit(1);
    });

    let debug_env = env::var("CONSOLEPILOT_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let log_level = if args.debug || debug_env { "debug" } else { "info" };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    info!("Starting consolepilot v{}", consolepilot::VERSION);

    let config = load_configuration(&args)?;
    let launcher = Arc::new(PtyLauncher::new(config.console.clone()));
    let serializer = Arc::new(
        RequestSerializer::from_config(&config, launcher)
            .await
            .context("Console failed to start")?,
    );
    let ctx = Arc::new(ToolContext::new(Arc::clone(&serializer), &config));

    // Single writer keeps response lines whole
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                error!("stdout closed, dropping responses");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let ctx = Arc::clone(&ctx);
                        let out_tx = out_tx.clone();
                        in_flight.spawn(async move {
                            let response = handle_line(&ctx, &line).await;
                            match serde_json::to_string(&response) {
                                Ok(json) => {
                                    let _ = out_tx.send(json);
                                }
                                Err(e) => error!("Failed to encode response: {}", e),
                            }
                        });
                    }
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    while in_flight.join_next().await.is_some() {}
    drop(ctx);

    if let Err(e) = serializer.shutdown().await {
        warn!("Console shutdown reported an error: {}", e);
    }

    drop(out_tx);
    let _ = writer.await;

    info!("consolepilot shutdown complete");
    Ok(())
}
