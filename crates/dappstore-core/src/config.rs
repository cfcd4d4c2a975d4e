//! Release descriptor and pipeline settings.
//!
//! [`ReleaseConfig`] is the immutable snapshot every stage reads from. It is
//! loaded from a JSON or TOML file; relative asset paths are resolved against
//! the descriptor's own directory.
//!
//! [`PipelineSettings`] carries the runtime knobs (endpoints, concurrency and
//! the three independent simulation flags). Defaults can be overridden from
//! `DAPPSTORE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default Solana RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
/// Default storage bundler endpoint (multipart `POST`).
pub const DEFAULT_UPLOAD_URL: &str = "https://node2.irys.xyz/tx";
/// Default gateway; durable URIs are this base plus the transaction id.
pub const DEFAULT_GATEWAY_URL: &str = "https://arweave.net/";
/// HubSpot form submission API.
pub const PORTAL_API: &str = "https://api.hsforms.com/submissions/v3/integration/submit";
/// Solana Mobile publisher portal id.
pub const PORTAL_ID: &str = "22812690";
/// Solana Mobile publisher portal form guid.
pub const PORTAL_FORM_GUID: &str = "dda6baa7-df8f-4c6e-af65-af4ed5096c8a";

/// Publisher identity and contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherInfo {
    pub name: String,
    pub email: String,
    pub website: String,
    #[serde(default)]
    pub support_email: Option<String>,
}

/// App identity and store-listing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    #[serde(alias = "android_package")]
    pub package_id: String,
    pub short_description: String,
    pub long_description: String,
    pub new_in_version: String,
    /// Platform-specific feature text (shown on Saga devices).
    #[serde(default)]
    pub saga_features: Option<String>,
}

/// Policy and listing URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUrls {
    pub license: String,
    pub copyright: String,
    pub privacy_policy: String,
    pub website: String,
}

/// Local asset references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRefs {
    pub icon: PathBuf,
    #[serde(default)]
    pub banner: Option<PathBuf>,
    #[serde(default)]
    pub screenshots: Vec<PathBuf>,
    pub apk: PathBuf,
}

/// The full release descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub publisher: PublisherInfo,
    pub app: AppInfo,
    pub urls: PolicyUrls,
    pub assets: AssetRefs,
    #[serde(default = "default_category")]
    pub category: String,
    /// Companion Google Play package id, if the app is also listed there.
    #[serde(default)]
    pub google_play_package: Option<String>,
    #[serde(default = "default_testing_instructions")]
    pub testing_instructions: String,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Base58 public key of the publishing wallet.
    pub wallet_public_key: String,
}

fn default_category() -> String {
    "Other".to_string()
}

fn default_testing_instructions() -> String {
    "App ready for testing".to_string()
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

impl ReleaseConfig {
    /// Load a descriptor from a `.json` or `.toml` file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let config: ReleaseConfig = match ext.as_str() {
            "json" => serde_json::from_str(&raw)?,
            "toml" => toml::from_str(&raw)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolve_relative_to(base))
    }

    /// Rewrite relative asset paths so they are anchored at `base`.
    pub fn resolve_relative_to(mut self, base: &Path) -> Self {
        let anchor = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        self.assets.icon = anchor(self.assets.icon);
        self.assets.banner = self.assets.banner.map(anchor);
        self.assets.screenshots = self.assets.screenshots.into_iter().map(anchor).collect();
        self.assets.apk = anchor(self.assets.apk);
        self
    }

    /// Support address, falling back to the publisher contact email.
    pub fn support_email(&self) -> &str {
        self.publisher
            .support_email
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.publisher.email)
    }

    /// Platform feature text, if present and non-blank.
    pub fn saga_features(&self) -> Option<&str> {
        self.app
            .saga_features
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Companion store package id, if present and non-blank.
    pub fn google_play_package(&self) -> Option<&str> {
        self.google_play_package
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Per-component simulation switches, evaluated independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationFlags {
    pub uploads: bool,
    pub minting: bool,
    pub portal: bool,
}

impl SimulationFlags {
    /// Every external effect simulated.
    pub fn all() -> Self {
        Self {
            uploads: true,
            minting: true,
            portal: true,
        }
    }

    /// Fully real run.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Runtime settings for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Storage bundler endpoint receiving multipart uploads.
    pub upload_url: String,
    /// Base URL prefixed to every returned transaction id.
    pub gateway_url: String,
    /// Portal form endpoint.
    pub portal_url: String,
    /// `context.pageUri` sent with portal submissions.
    pub portal_page_uri: String,
    /// `context.pageName` sent with portal submissions.
    pub portal_page_name: String,
    /// Maximum uploads in flight at once.
    pub upload_concurrency: usize,
    pub simulation: SimulationFlags,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            portal_url: format!("{}/{}/{}", PORTAL_API, PORTAL_ID, PORTAL_FORM_GUID),
            portal_page_uri: "https://bubblewrapper.app".to_string(),
            portal_page_name: "BubbleWrapper CLI Submission".to_string(),
            upload_concurrency: 3,
            simulation: SimulationFlags::none(),
        }
    }
}

impl PipelineSettings {
    /// Defaults overridden by `DAPPSTORE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = lookup("DAPPSTORE_UPLOAD_URL") {
            settings.upload_url = v;
        }
        if let Some(v) = lookup("DAPPSTORE_GATEWAY_URL") {
            settings.gateway_url = v;
        }
        if let Some(v) = lookup("DAPPSTORE_PORTAL_URL") {
            settings.portal_url = v;
        }
        if let Some(v) = lookup("DAPPSTORE_UPLOAD_CONCURRENCY") {
            let n = v
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidSetting {
                    key: "DAPPSTORE_UPLOAD_CONCURRENCY".to_string(),
                    value: v.clone(),
                })?;
            settings = settings.with_upload_concurrency(n);
        }
        if parse_flag(&lookup, "DAPPSTORE_SIMULATE")? {
            settings.simulation = SimulationFlags::all();
        }
        if parse_flag(&lookup, "DAPPSTORE_SIMULATE_UPLOADS")? {
            settings.simulation.uploads = true;
        }
        if parse_flag(&lookup, "DAPPSTORE_SIMULATE_MINT")? {
            settings.simulation.minting = true;
        }
        if parse_flag(&lookup, "DAPPSTORE_SIMULATE_PORTAL")? {
            settings.simulation.portal = true;
        }

        Ok(settings)
    }

    /// Replace the simulation flags.
    pub fn with_simulation(mut self, simulation: SimulationFlags) -> Self {
        self.simulation = simulation;
        self
    }

    /// Set the upload worker count (clamped to at least one).
    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n.max(1);
        self
    }

    /// Point uploads at a different bundler and gateway.
    pub fn with_storage(mut self, upload_url: &str, gateway_url: &str) -> Self {
        self.upload_url = upload_url.to_string();
        self.gateway_url = gateway_url.to_string();
        self
    }

    /// Point portal submissions at a different form endpoint.
    pub fn with_portal_url(mut self, portal_url: &str) -> Self {
        self.portal_url = portal_url.to_string();
        self
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(false),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidSetting {
                key: key.to_string(),
                value: v,
            }),
        },
    }
}
