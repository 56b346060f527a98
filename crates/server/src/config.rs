use quire::ChromeConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_KEEPALIVE_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub document: DocumentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Browser binary; searched on `PATH` when unset.
    pub executable: Option<PathBuf>,
    /// Whitespace-separated command-line flags.
    pub args: String,
    /// How long the browser stays up without demand.
    pub keepalive_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Producer written into every PDF unless the request names one.
    pub producer: String,
}

/// `quire-server vX.Y.Z`, plus the homepage when the package declares one.
pub fn default_producer() -> String {
    let homepage = env!("CARGO_PKG_HOMEPAGE");
    let base = format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    if homepage.is_empty() {
        base
    } else {
        format!("{base} ({homepage})")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                body_limit_bytes: DEFAULT_BODY_LIMIT,
            },
            browser: BrowserConfig {
                executable: None,
                args: ChromeConfig::default().args,
                keepalive_ms: DEFAULT_KEEPALIVE_MS,
            },
            document: DocumentConfig {
                producer: default_producer(),
            },
        }
    }
}

impl Config {
    /// Loads configuration from, lowest precedence first: built-in defaults,
    /// the legacy `BROWSER_EXECUTABLE`, `CHROMIUM_ARGS`, `BROWSER_KEEPALIVE`
    /// and `BODY_LIMIT` variables, the TOML file named by `QUIRE_CONFIG`,
    /// and `QUIRE_*` variables (`QUIRE_BROWSER__KEEPALIVE_MS=60000`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Config::default();
        let mut builder = config::Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("server.body_limit_bytes", defaults.server.body_limit_bytes as i64)?
            .set_default("browser.args", defaults.browser.args)?
            .set_default("browser.keepalive_ms", defaults.browser.keepalive_ms as i64)?
            .set_default("document.producer", defaults.document.producer)?;

        for (var, key) in [
            ("BROWSER_EXECUTABLE", "browser.executable"),
            ("CHROMIUM_ARGS", "browser.args"),
            ("BROWSER_KEEPALIVE", "browser.keepalive_ms"),
        ] {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_default(key, value)?;
            }
        }
        if let Some(limit) = std::env::var("BODY_LIMIT").ok().and_then(|v| parse_size(&v)) {
            builder = builder.set_default("server.body_limit_bytes", limit as i64)?;
        }

        if let Ok(config_path) = std::env::var("QUIRE_CONFIG") {
            if !config_path.is_empty() {
                builder = builder.add_source(config::File::with_name(&config_path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("QUIRE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.browser.keepalive_ms)
    }

    pub fn chrome(&self) -> ChromeConfig {
        ChromeConfig {
            executable: self.browser.executable.clone(),
            args: self.browser.args.clone(),
        }
    }
}

/// Parses sizes such as `1mb`, `512kb` or `2048` (bytes).
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim().to_ascii_lowercase();
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(digits_end);
    let number: f64 = number.parse().ok()?;
    let multiplier = match unit.trim() {
        "" | "b" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((number * multiplier) as usize)
}
