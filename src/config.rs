//! Configuration loading for the inventory adapter
//!
//! Settings can come from:
//! - CLI flags, each also readable from a `ZOHO_*` environment variable
//! - A JSON file or inline JSON string (`--config`)
//! - Built-in defaults
//!
//! CLI/env values win over the JSON config. The five credential settings are
//! only checked when credentials are requested, so commands that never talk
//! to the upstream (`version`, the client side of `read`) run without them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::logging::LogFormat;
use crate::zoho::client::{ClientOptions, DEFAULT_REQUEST_TIMEOUT, MAX_PAGE_SIZE};
use crate::zoho::{Credentials, FileTokenStore, NoopTokenStore, TokenStore};

pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.zoho.eu";

// ============================================================================
// Configuration Arguments
// ============================================================================

/// Common configuration arguments (used across CLI commands)
#[derive(Args, Clone, Debug, Default)]
pub struct ConfigArgs {
    /// Configuration file (JSON file path or JSON string).
    ///
    /// - A file path: --config zoho.json
    ///
    /// - Inline JSON: --config '{"organization_id":"20071234","api_domain":"https://www.zohoapis.com"}'
    ///
    #[arg(long = "config", short = 'c', env = "ZOHO_CONFIG", value_name = "file.json or {json}")]
    pub config: Option<String>,

    /// OAuth refresh token
    #[arg(long, env = "ZOHO_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// OAuth client id
    #[arg(long, env = "ZOHO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "ZOHO_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// API domain of the data center, e.g. https://www.zohoapis.com
    #[arg(long, env = "ZOHO_API_DOMAIN", value_name = "https://...")]
    pub api_domain: Option<String>,

    /// Organization every request is scoped to
    #[arg(long, env = "ZOHO_ORGANIZATION_ID")]
    pub organization_id: Option<String>,

    /// OAuth accounts server (default https://accounts.zoho.eu)
    #[arg(long, env = "ZOHO_ACCOUNTS_URL", value_name = "https://...")]
    pub accounts_url: Option<String>,

    /// Access token to start with, refreshed when rejected
    #[arg(long, env = "ZOHO_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// JSON file where refreshed access tokens are kept across restarts
    #[arg(long, env = "ZOHO_TOKEN_CACHE", value_name = "FILE")]
    pub token_cache: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, env = "ZOHO_CONNECT_TIMEOUT", value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Timeout in seconds for every upstream call (default 30)
    #[arg(long, env = "ZOHO_REQUEST_TIMEOUT", value_name = "SECS")]
    pub request_timeout: Option<u64>,

    /// Items per page when listing (1-200, default 200)
    #[arg(long, env = "ZOHO_PAGE_SIZE")]
    pub page_size: Option<u32>,

    // -------------------------------------------------------------------------
    // Logging/Tracing Options
    // -------------------------------------------------------------------------

    /// Enable verbose output (INFO level logging)
    ///
    /// Default is WARN level. Use -v for INFO, -d for DEBUG.
    ///
    #[arg(short = 'v', long, env = "ZOHO_VERBOSE")]
    pub verbose: bool,

    /// Enable debug output (DEBUG level logging)
    #[arg(short = 'd', long, env = "ZOHO_DEBUG", conflicts_with = "verbose")]
    pub debug: bool,

    /// Quiet mode - only show errors
    #[arg(short = 'q', long, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Silent mode - suppress all terminal log output
    ///
    /// Log file output (if configured) is unaffected.
    ///
    #[arg(long, short = 's', conflicts_with_all = ["verbose", "debug", "quiet"])]
    pub silent: bool,

    /// Log output format
    #[arg(long, short = 'L', default_value = "pretty", value_enum, env = "ZOHO_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Write debug logs to file
    #[arg(long, short = 'l', env = "ZOHO_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

// ============================================================================
// Global Configuration
// ============================================================================

/// Merged configuration (also the schema of the `--config` JSON)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_domain: Option<String>,
    pub organization_id: Option<String>,
    pub accounts_url: Option<String>,
    pub access_token: Option<String>,
    pub token_cache: Option<PathBuf>,

    /// Connection timeout in seconds
    pub connect_timeout: Option<u64>,
    /// Per-call timeout in seconds
    pub request_timeout: Option<u64>,
    pub page_size: Option<u32>,

    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    pub silent: bool,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load `--config` and overlay the CLI/env values
    pub fn from_args(args: &ConfigArgs) -> Result<Self> {
        let mut global = match &args.config {
            Some(input) => {
                let json = load_json_string(input)?;
                serde_json::from_str(&json)
                    .map_err(|e| anyhow::anyhow!("Failed to parse config JSON: {}", e))?
            }
            None => GlobalConfig::default(),
        };

        overlay(&mut global.refresh_token, &args.refresh_token);
        overlay(&mut global.client_id, &args.client_id);
        overlay(&mut global.client_secret, &args.client_secret);
        overlay(&mut global.api_domain, &args.api_domain);
        overlay(&mut global.organization_id, &args.organization_id);
        overlay(&mut global.accounts_url, &args.accounts_url);
        overlay(&mut global.access_token, &args.access_token);
        overlay(&mut global.token_cache, &args.token_cache);
        overlay(&mut global.connect_timeout, &args.connect_timeout);
        overlay(&mut global.request_timeout, &args.request_timeout);
        overlay(&mut global.page_size, &args.page_size);

        global.verbose |= args.verbose;
        global.debug |= args.debug;
        global.quiet |= args.quiet;
        global.silent |= args.silent;
        // Always take log_format from CLI (it has a default value)
        global.log_format = args.log_format.clone();
        overlay(&mut global.log_file, &args.log_file);

        Ok(global)
    }

    /// Validated upstream credentials
    ///
    /// Every missing required setting is named in one error.
    pub fn credentials(&self) -> Result<Credentials, InventoryError> {
        let required = [
            ("refresh token (ZOHO_REFRESH_TOKEN)", &self.refresh_token),
            ("client id (ZOHO_CLIENT_ID)", &self.client_id),
            ("client secret (ZOHO_CLIENT_SECRET)", &self.client_secret),
            ("API domain (ZOHO_API_DOMAIN)", &self.api_domain),
            ("organization id (ZOHO_ORGANIZATION_ID)", &self.organization_id),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(InventoryError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let value = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();
        let api_domain = normalize_url("API domain", &value(&self.api_domain))?;
        let accounts_url = normalize_url(
            "accounts URL",
            self.accounts_url.as_deref().unwrap_or(DEFAULT_ACCOUNTS_URL),
        )?;

        Ok(Credentials {
            client_id: value(&self.client_id),
            client_secret: value(&self.client_secret),
            refresh_token: value(&self.refresh_token),
            api_domain,
            accounts_url,
            organization_id: value(&self.organization_id),
        })
    }

    /// File cache when `token_cache` is set, otherwise refreshed tokens are only logged
    pub fn token_store(&self) -> Arc<dyn TokenStore> {
        match &self.token_cache {
            Some(path) => Arc::new(FileTokenStore::new(path.clone())),
            None => Arc::new(NoopTokenStore),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: self.connect_timeout.map(Duration::from_secs),
            request_timeout: self
                .request_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            page_size: self.page_size.unwrap_or(MAX_PAGE_SIZE),
        }
    }

    /// Initialize tracing/logging based on configuration
    ///
    /// Call this once early in main() before any logging calls.
    pub fn init_tracing(&self) {
        crate::logging::init_tracing(crate::logging::TracingConfig {
            verbose: self.verbose,
            debug: self.debug,
            quiet: self.quiet,
            silent: self.silent,
            format: self.log_format.clone(),
            log_file: self.log_file.clone(),
        });
    }
}

fn overlay<T: Clone>(target: &mut Option<T>, cli: &Option<T>) {
    if let Some(value) = cli {
        *target = Some(value.clone());
    }
}

/// Parse-check an http(s) URL and drop any trailing `/`
fn normalize_url(what: &str, raw: &str) -> Result<String, InventoryError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| InventoryError::Config(format!("invalid {} '{}': {}", what, raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InventoryError::Config(format!(
            "invalid {} '{}': must be http(s)",
            what, raw
        )));
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Inline JSON (starts with `{`) or a path to a JSON file
fn load_json_string(input: &str) -> Result<String> {
    if input.trim_start().starts_with('{') {
        return Ok(input.to_string());
    }
    let path = std::path::Path::new(input);
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))
}
