use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result, WrapErr};
use mcp_cloudfs_core::Storage;
use mcp_cloudfs_server::{HttpOptions, Server, ToolKind, ToolRegistry, DEFAULT_HEARTBEAT};
use mcp_cloudfs_storage_ephemeral::EphemeralStorage;
use mcp_cloudfs_storage_remote::{RemoteConfig, RemoteStorage, RetryPolicy};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TOKEN_ENV: &str = "CLOUDFS_ACCESS_TOKEN";

#[derive(Clone, Copy, Debug, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Backend {
    Ephemeral,
    Remote,
}

#[derive(Clone, Copy, Debug, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Transport {
    Stdio,
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "cloudfs", version, about = "MCP server for hierarchical cloud file storage")]
struct Cli {
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the server on stdio or HTTP.
    Serve(ServeArgs),
    /// Print the tool catalog with input schemas.
    Tools,
    /// Invoke one tool and print the response envelope.
    Call(CallArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    #[arg(long, value_enum)]
    backend: Option<Backend>,
    #[arg(long, value_enum)]
    transport: Option<Transport>,
    #[arg(long)]
    addr: Option<String>,
    #[arg(long = "auth-token", value_name = "TOKEN")]
    auth_token: Option<String>,
    #[arg(long = "heartbeat-secs", value_name = "SECS")]
    heartbeat_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct CallArgs {
    tool: String,
    /// Arguments as a JSON object.
    #[arg(default_value = "{}")]
    arguments: String,
    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let cfg = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Serve(args) => {
            let settings = ServeSettings::resolve(args, &cfg);
            with_backend(settings.backend, &cfg, |runtime, server| {
                runtime.block_on(serve(server, settings))
            })
        }
        Commands::Tools => print_tools(),
        Commands::Call(args) => {
            let backend = args
                .backend
                .or_else(|| cfg.serve.as_ref().and_then(|s| s.backend))
                .unwrap_or(Backend::Ephemeral);
            with_backend(backend, &cfg, |runtime, server| {
                runtime.block_on(call(server, &args.tool, &args.arguments))
            })
        }
    }
}

/// Builds the store outside the async runtime (the remote client blocks) and
/// keeps the last handle to it until the runtime has shut down.
fn with_backend<F>(backend: Backend, cfg: &AppConfig, run: F) -> Result<()>
where
    F: FnOnce(&tokio::runtime::Runtime, ServerHandle) -> Result<()>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start tokio runtime")?;
    match backend {
        Backend::Ephemeral => {
            let storage = Arc::new(EphemeralStorage::new());
            run(&runtime, ServerHandle::Ephemeral(Arc::clone(&storage)))
        }
        Backend::Remote => {
            let storage = Arc::new(remote_storage(cfg.remote.clone().unwrap_or_default())?);
            let result = run(&runtime, ServerHandle::Remote(Arc::clone(&storage)));
            drop(runtime);
            result
        }
    }
}

enum ServerHandle {
    Ephemeral(Arc<EphemeralStorage>),
    Remote(Arc<RemoteStorage>),
}

#[derive(Debug)]
struct ServeSettings {
    backend: Backend,
    transport: Transport,
    addr: String,
    auth_token: Option<SecretString>,
    heartbeat: Duration,
}

impl ServeSettings {
    /// CLI flags win over the config file and environment.
    fn resolve(args: ServeArgs, cfg: &AppConfig) -> Self {
        let section = cfg.serve.clone().unwrap_or_default();
        Self {
            backend: args
                .backend
                .or(section.backend)
                .unwrap_or(Backend::Ephemeral),
            transport: args
                .transport
                .or(section.transport)
                .unwrap_or(Transport::Stdio),
            addr: args
                .addr
                .or(section.addr)
                .unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            auth_token: args
                .auth_token
                .or(section.auth_token)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(SecretString::new),
            heartbeat: args
                .heartbeat_secs
                .or(section.heartbeat_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HEARTBEAT),
        }
    }
}

async fn serve(handle: ServerHandle, settings: ServeSettings) -> Result<()> {
    match handle {
        ServerHandle::Ephemeral(storage) => serve_with(storage, settings).await,
        ServerHandle::Remote(storage) => serve_with(storage, settings).await,
    }
}

async fn serve_with<S>(storage: Arc<S>, settings: ServeSettings) -> Result<()>
where
    S: Storage + Send + Sync + 'static,
{
    let server = Server::with_shared(storage).map_err(|e| eyre!("server init failed: {e}"))?;
    info!(backend = ?settings.backend, transport = ?settings.transport, "starting server");
    match settings.transport {
        Transport::Stdio => {
            if settings.auth_token.is_some() {
                warn!("auth token is ignored on the stdio transport");
            }
            server
                .run_stdio()
                .await
                .map_err(|e| eyre!("stdio transport failed: {e}"))
        }
        Transport::Http => {
            let options = HttpOptions {
                addr: settings.addr,
                auth_token: settings.auth_token,
                heartbeat: settings.heartbeat,
            };
            server
                .run_http(options)
                .await
                .map_err(|e| eyre!("http transport failed: {e}"))
        }
    }
}

async fn call(handle: ServerHandle, tool: &str, raw_arguments: &str) -> Result<()> {
    match handle {
        ServerHandle::Ephemeral(storage) => call_with(storage, tool, raw_arguments).await,
        ServerHandle::Remote(storage) => call_with(storage, tool, raw_arguments).await,
    }
}

async fn call_with<S>(storage: Arc<S>, tool: &str, raw_arguments: &str) -> Result<()>
where
    S: Storage + Send + Sync + 'static,
{
    let kind = ToolKind::from_name(tool).ok_or_else(|| eyre!("unknown tool: {tool}"))?;
    let arguments: Value = serde_json::from_str(raw_arguments)
        .wrap_err_with(|| format!("arguments for {tool} are not valid JSON"))?;
    let server = Server::with_shared(storage).map_err(|e| eyre!("server init failed: {e}"))?;
    let outcome = server
        .call_tool(kind, arguments)
        .await
        .map_err(|e| eyre!("{tool} failed: {e}"))?;
    let failed = outcome.is_error;
    println!("{}", serde_json::to_string_pretty(&outcome.into_result())?);
    if failed {
        return Err(eyre!("{tool} reported a failure"));
    }
    Ok(())
}

fn print_tools() -> Result<()> {
    let registry = ToolRegistry::new().map_err(|e| eyre!("tool registry failed: {e}"))?;
    let listing = serde_json::json!({ "tools": registry.definitions() });
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn remote_storage(section: RemoteSection) -> Result<RemoteStorage> {
    let token_env = section
        .access_token_env
        .clone()
        .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string());
    let token = section
        .access_token
        .clone()
        .or_else(|| std::env::var(&token_env).ok())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            eyre!("remote backend needs an access token (set remote.access_token or ${token_env})")
        })?;
    let mut config = RemoteConfig::new(SecretString::new(token));
    if let Some(url) = section.base_url {
        config.base_url = url;
    }
    if let Some(url) = section.upload_url {
        config.upload_url = url;
    }
    if let Some(secs) = section.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    let defaults = RetryPolicy::default();
    config.retry = RetryPolicy {
        max_attempts: section.max_attempts.unwrap_or(defaults.max_attempts).max(1),
        base_delay: section
            .base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay),
        max_delay: section
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay),
    };
    RemoteStorage::new(config).map_err(|e| eyre!("remote storage init failed: {e}"))
}

// -----------------
// Config handling

#[derive(Clone, Debug, Default, Deserialize)]
struct ServeSection {
    backend: Option<Backend>,
    transport: Option<Transport>,
    addr: Option<String>,
    auth_token: Option<String>,
    heartbeat_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RemoteSection {
    base_url: Option<String>,
    upload_url: Option<String>,
    access_token: Option<String>,
    access_token_env: Option<String>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct AppConfig {
    #[serde(default)]
    serve: Option<ServeSection>,
    #[serde(default)]
    remote: Option<RemoteSection>,
}

/// File first, then `CLOUDFS__SECTION__KEY` environment overrides.
fn load_config(path: Option<&str>) -> Result<AppConfig> {
    let mut builder = config::Config::builder();
    if let Some(raw) = path {
        let expanded = expand_path(raw);
        if !expanded.exists() {
            warn!(
                path = %expanded.display(),
                "config file not found; continuing with defaults and env overrides"
            );
        }
        builder = builder.add_source(config::File::from(expanded).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("CLOUDFS")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = builder
        .build()
        .map_err(|e| eyre!("config load error: {e}"))?;
    cfg.try_deserialize()
        .map_err(|e| eyre!("config parse error: {e}"))
}

fn expand_path(input: &str) -> PathBuf {
    if input == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from(input));
    }
    if let Some(rest) = input.strip_prefix("~/") {
        return home_dir()
            .map(|mut base| {
                base.push(rest);
                base
            })
            .unwrap_or_else(|| PathBuf::from(rest));
    }
    PathBuf::from(input)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
}
