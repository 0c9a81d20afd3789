//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::repository::RepoRef;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "gitfolio";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_RAW_URL: &str = "https://raw.githubusercontent.com";
const DEFAULT_GITHUB_BRANCH: &str = "main";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONTENT_DIR: &str = "content";
const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;
const DEFAULT_WRITE_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_UPLOAD_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Command-line arguments for the gitfolio binary.
#[derive(Debug, Parser)]
#[command(name = "gitfolio", version, about = "Gitfolio content server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "GITFOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP surface.
    Serve(Box<ServeArgs>),
    /// Resolve one logical content key and print it as JSON.
    Read(ReadArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ReadArgs {
    #[command(flatten)]
    pub source: SourceOverrides,

    /// Logical key, e.g. `config`, `works`, `page:home` or `scrap:{slug}`.
    #[arg(value_name = "KEY")]
    pub key: String,
}

/// Where content comes from; shared by every command.
#[derive(Debug, Args, Default, Clone)]
pub struct SourceOverrides {
    /// Fallback repository when the local configuration names none.
    #[arg(long = "github-repo-url", env = "GITHUB_REPO_URL", value_name = "URL")]
    pub github_repo_url: Option<String>,

    /// Server-side token used when a caller supplies none.
    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub github_token: Option<String>,

    /// Override the GitHub API base URL.
    #[arg(long = "github-api-url", value_name = "URL")]
    pub github_api_url: Option<String>,

    /// Override the local fallback content directory.
    #[arg(long = "content-dir", value_name = "PATH")]
    pub content_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub source: SourceOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the content cache time-to-live.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the conditional-write attempt budget.
    #[arg(long = "write-max-attempts", value_name = "COUNT")]
    pub write_max_attempts: Option<u32>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub github: GithubSettings,
    pub identity: IdentitySettings,
    pub content: ContentSettings,
    pub cache: CacheSettings,
    pub writes: WriteSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Clone)]
pub struct GithubSettings {
    pub api_url: Url,
    pub raw_url: Url,
    pub branch: String,
    pub repo: Option<RepoRef>,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubSettings")
            .field("api_url", &self.api_url.as_str())
            .field("raw_url", &self.raw_url.as_str())
            .field("branch", &self.branch)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct IdentitySettings {
    /// `None` leaves the identity provider unconfigured; every write is
    /// then refused.
    pub url: Option<Url>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub local_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub default_ttl: Duration,
    pub max_entries: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct WriteSettings {
    pub max_attempts: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_bytes: NonZeroU64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("GITFOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Read(args)) => raw.apply_source_overrides(&args.source),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    github: RawGithubSettings,
    identity: RawIdentitySettings,
    content: RawContentSettings,
    cache: RawCacheSettings,
    writes: RawWriteSettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.default_ttl_seconds = Some(ttl);
        }
        if let Some(attempts) = overrides.write_max_attempts {
            self.writes.max_attempts = Some(attempts);
        }

        self.apply_source_overrides(&overrides.source);
    }

    fn apply_source_overrides(&mut self, overrides: &SourceOverrides) {
        if let Some(url) = overrides.github_repo_url.as_ref() {
            self.github.repo_url = Some(url.clone());
        }
        if let Some(token) = overrides.github_token.as_ref() {
            self.github.token = Some(token.clone());
        }
        if let Some(url) = overrides.github_api_url.as_ref() {
            self.github.api_url = Some(url.clone());
        }
        if let Some(dir) = overrides.content_dir.as_ref() {
            self.content.local_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            github,
            identity,
            content,
            cache,
            writes,
            uploads,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            github: build_github_settings(github)?,
            identity: build_identity_settings(identity)?,
            content: build_content_settings(content)?,
            cache: build_cache_settings(cache)?,
            writes: build_write_settings(writes)?,
            uploads: build_upload_settings(uploads)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_github_settings(github: RawGithubSettings) -> Result<GithubSettings, LoadError> {
    let api_url = parse_base_url(
        github.api_url.as_deref().unwrap_or(DEFAULT_GITHUB_API_URL),
        "github.api_url",
    )?;
    let raw_url = parse_base_url(
        github.raw_url.as_deref().unwrap_or(DEFAULT_GITHUB_RAW_URL),
        "github.raw_url",
    )?;

    let branch = non_blank(github.branch).unwrap_or_else(|| DEFAULT_GITHUB_BRANCH.to_string());

    let repo = match non_blank(github.repo_url) {
        Some(url) => Some(
            RepoRef::parse(&url)
                .map_err(|err| LoadError::invalid("github.repo_url", err.to_string()))?,
        ),
        None => None,
    };

    let timeout = positive_seconds(
        github.timeout_seconds.unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
        "github.timeout_seconds",
    )?;

    Ok(GithubSettings {
        api_url,
        raw_url,
        branch,
        repo,
        token: non_blank(github.token),
        timeout,
    })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let url = match non_blank(identity.url) {
        Some(url) => Some(parse_base_url(&url, "identity.url")?),
        None => None,
    };
    let timeout = positive_seconds(
        identity
            .timeout_seconds
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
        "identity.timeout_seconds",
    )?;

    Ok(IdentitySettings {
        url,
        api_key: non_blank(identity.api_key),
        timeout,
    })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let local_dir = content
        .local_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR));
    if local_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "content.local_dir",
            "path must not be empty",
        ));
    }
    Ok(ContentSettings { local_dir })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let default_ttl = positive_seconds(
        cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.default_ttl_seconds",
    )?;
    let max_entries = NonZeroUsize::new(cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES))
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;

    Ok(CacheSettings {
        default_ttl,
        max_entries,
    })
}

fn build_write_settings(writes: RawWriteSettings) -> Result<WriteSettings, LoadError> {
    let attempts = writes.max_attempts.unwrap_or(DEFAULT_WRITE_MAX_ATTEMPTS);
    Ok(WriteSettings {
        max_attempts: non_zero_u32(attempts.into(), "writes.max_attempts")?,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_bytes_value = uploads.max_bytes.unwrap_or(DEFAULT_UPLOAD_MAX_BYTES);
    let max_bytes = NonZeroU64::new(max_bytes_value)
        .ok_or_else(|| LoadError::invalid("uploads.max_bytes", "must be greater than zero"))?;
    usize::try_from(max_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings { max_bytes })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGithubSettings {
    api_url: Option<String>,
    raw_url: Option<String>,
    branch: Option<String>,
    repo_url: Option<String>,
    token: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    url: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    default_ttl_seconds: Option<u64>,
    max_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWriteSettings {
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_bytes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_base_url(raw: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid URL: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "URL scheme must be http or https"));
    }
    Ok(url)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
