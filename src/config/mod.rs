//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampino";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_WINDOW: usize = 5;
const DEFAULT_FONTS_DIR: &str = "assets/fonts";
const DEFAULT_SCRATCH_DIR: &str = "/tmp/stampino-scratch";
const DEFAULT_COOKIE_NAME: &str = "stampino_identity";
const MIN_MASTER_SECRET_BYTES: usize = 32;

/// Command-line arguments for the stampino binary.
#[derive(Debug, Parser)]
#[command(name = "stampino", version, about = "Stampino overlay studio server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STAMPINO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the stampino HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,

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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the per-heading cached item window size.
    #[arg(long = "cache-window", value_name = "COUNT")]
    pub cache_window: Option<usize>,

    /// Override the bundled fonts directory.
    #[arg(long = "render-fonts-dir", value_name = "PATH")]
    pub fonts_dir: Option<PathBuf>,

    /// Override the export scratch directory.
    #[arg(long = "render-scratch-dir", value_name = "PATH")]
    pub scratch_dir: Option<PathBuf>,

    /// Override the identity cookie name.
    #[arg(long = "identity-cookie-name", value_name = "NAME")]
    pub cookie_name: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub media: MediaSettings,
    pub identity: IdentitySettings,
    pub render: RenderSettings,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Window size W for per-heading cached item prefixes.
    pub window: usize,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub endpoint: Option<String>,
    pub private_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub master_secret: String,
    pub cookie_name: String,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub fonts_dir: PathBuf,
    pub scratch_dir: PathBuf,
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

    builder = builder.add_source(Environment::with_prefix("STAMPINO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Parse the process CLI and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    media: RawMediaSettings,
    identity: RawIdentitySettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(window) = overrides.cache_window {
            self.cache.window = Some(window);
        }
        if let Some(dir) = overrides.fonts_dir.as_ref() {
            self.render.fonts_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.scratch_dir.as_ref() {
            self.render.scratch_dir = Some(dir.clone());
        }
        if let Some(name) = overrides.cookie_name.as_ref() {
            self.identity.cookie_name = Some(name.clone());
        }
    }
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    window: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMediaSettings {
    endpoint: Option<String>,
    private_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    master_secret: Option<String>,
    cookie_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    fonts_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            media,
            identity,
            render,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            media: build_media_settings(media),
            identity: build_identity_settings(identity)?,
            render: build_render_settings(render)?,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max = database.max_connections.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max)
        .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let window = cache.window.unwrap_or(DEFAULT_CACHE_WINDOW);
    if window == 0 {
        return Err(LoadError::invalid(
            "cache.window",
            "window must hold at least one item",
        ));
    }
    Ok(CacheSettings { window })
}

fn build_media_settings(media: RawMediaSettings) -> MediaSettings {
    MediaSettings {
        endpoint: media.endpoint.filter(|value| !value.trim().is_empty()),
        private_key: media.private_key.filter(|value| !value.trim().is_empty()),
    }
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let master_secret = identity
        .master_secret
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| LoadError::invalid("identity.master_secret", "must be set"))?;
    if master_secret.len() < MIN_MASTER_SECRET_BYTES {
        return Err(LoadError::invalid(
            "identity.master_secret",
            format!("must be at least {MIN_MASTER_SECRET_BYTES} bytes"),
        ));
    }

    let cookie_name = identity
        .cookie_name
        .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
    if cookie_name.trim().is_empty() {
        return Err(LoadError::invalid(
            "identity.cookie_name",
            "must not be empty",
        ));
    }

    Ok(IdentitySettings {
        master_secret,
        cookie_name,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let fonts_dir = render
        .fonts_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FONTS_DIR));
    if fonts_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.fonts_dir",
            "path must not be empty",
        ));
    }

    let scratch_dir = render
        .scratch_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR));
    if scratch_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.scratch_dir",
            "path must not be empty",
        ));
    }

    Ok(RenderSettings {
        fonts_dir,
        scratch_dir,
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("failed to parse `{host}:{port}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_secret() -> RawSettings {
        let mut raw = RawSettings::default();
        raw.identity.master_secret =
            Some("an-adequately-long-master-secret-value-0123456789".to_string());
        raw
    }

    #[test]
    fn defaults_resolve_when_only_the_secret_is_set() {
        let settings = Settings::from_raw(raw_with_secret()).unwrap();
        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.cache.window, DEFAULT_CACHE_WINDOW);
        assert_eq!(settings.identity.cookie_name, DEFAULT_COOKIE_NAME);
        assert_eq!(settings.render.fonts_dir, PathBuf::from(DEFAULT_FONTS_DIR));
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn missing_master_secret_is_rejected() {
        let err = Settings::from_raw(RawSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "identity.master_secret",
                ..
            }
        ));
    }

    #[test]
    fn short_master_secret_is_rejected() {
        let mut raw = RawSettings::default();
        raw.identity.master_secret = Some("short".to_string());
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut raw = raw_with_secret();
        raw.cache.window = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn serve_overrides_win_over_raw_values() {
        let mut raw = raw_with_secret();
        raw.server.port = Some(8080);
        raw.apply_serve_overrides(&ServeOverrides {
            server_port: Some(9090),
            cache_window: Some(12),
            ..ServeOverrides::default()
        });
        let settings = Settings::from_raw(raw).unwrap();
        assert_eq!(settings.server.addr.port(), 9090);
        assert_eq!(settings.cache.window, 12);
    }
}
