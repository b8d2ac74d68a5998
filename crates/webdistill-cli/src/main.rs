//! The `webdistill` CLI collaborator (spec §4.9): parses arguments, builds
//! an [`Orchestrator`], runs one URL through it, and prints the output
//! contract as JSON. Owns no routing/extraction/fetch logic itself.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use webdistill_cli::{Orchestrator, OrchestratorRequest};
use webdistill_config::{CoreConfig, LogFormat};

/// Convert a URL to clean Markdown plus metadata.
#[derive(Parser, Debug)]
#[command(name = "webdistill", version, about)]
struct Cli {
    /// The URL to fetch and extract.
    url: String,

    /// Per-request timeout in milliseconds; overrides the configured default.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Extra request header as `Key=Value`; may be repeated.
    #[arg(long = "header", value_name = "KEY=VALUE")]
    headers: Vec<String>,

    /// Bypass routing and force a specific fetcher (static_http, headless_browser, browser_attach).
    #[arg(long)]
    force_fetcher: Option<String>,

    /// Path to the routing rules YAML file.
    #[arg(long)]
    routing: Option<PathBuf>,

    /// Path to the template directory.
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Log output format: compact or json.
    #[arg(long)]
    log_format: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.log_format);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };
    std::process::exit(rt.block_on(run(config, cli)));
}

fn build_config(cli: &Cli) -> CoreConfig {
    let mut config = CoreConfig::from_env();
    if let Some(routing) = &cli.routing {
        config.routing_path = routing.clone();
    }
    if let Some(templates) = &cli.templates {
        config.template_root = templates.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        };
    }
    config
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
    }
}

async fn run(config: CoreConfig, cli: Cli) -> i32 {
    let orchestrator = match Orchestrator::new(&config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("failed to initialize orchestrator: {e}");
            return 1;
        }
    };

    let extra_headers = match parse_headers(&cli.headers) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("invalid --header value: {e}");
            return 1;
        }
    };

    let request = OrchestratorRequest {
        url: cli.url,
        user_timeout_ms: cli.timeout_ms,
        extra_headers,
        force_fetcher: cli.force_fetcher,
    };

    let output = orchestrator.process(request).await;
    let exit_code = if output.error.is_some() { 1 } else { 0 };

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
    exit_code
}

fn parse_headers(raw: &[String]) -> Result<HashMap<String, String>, String> {
    let mut headers = HashMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got {entry:?}"))?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}
