//! Minting of the App and Release tokens.
//!
//! The actual on-chain work belongs to a [`MintingService`]. The
//! [`MintCoordinator`] only translates the release into a [`MintRequest`],
//! checks the wallet is usable, and rescales the collaborator's
//! `(step, current, total)` callbacks into the pipeline's 70 to 90 band.
//!
//! In simulation mode the coordinator fabricates two `SIM`-prefixed addresses
//! and emits the same shape of progress events a real run would.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ReleaseConfig;
use crate::progress::{scale_into_band, ProgressReporter};
use crate::upload::UploadedAssets;
use crate::wallet::{TransactionSigner, WalletState};

/// Start of the minting progress band.
pub const MINT_BAND_START: u32 = 70;
/// End of the minting progress band.
pub const MINT_BAND_END: u32 = 90;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const SIMULATED_STEPS: [&str; 3] = [
    "Preparing mint transactions",
    "Creating App NFT",
    "Creating Release NFT",
];

/// Sub-progress reported by a minting collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintStep {
    pub step: String,
    pub current: u32,
    pub total: u32,
}

/// Everything a minting collaborator needs to create both tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    pub app_name: String,
    pub short_description: String,
    pub long_description: String,
    pub new_in_version: String,
    pub package_id: String,
    pub category: String,
    pub publisher_name: String,
    pub publisher_website: String,
    pub publisher_email: String,
    pub wallet_address: String,
    pub rpc_url: String,
    pub icon_uri: String,
    pub banner_uri: Option<String>,
    pub screenshot_uris: Vec<String>,
    pub apk_uri: String,
    pub metadata_uri: String,
}

impl MintRequest {
    /// Translate the release descriptor and uploaded URIs.
    pub fn from_release(config: &ReleaseConfig, uploads: &UploadedAssets, metadata_uri: &str) -> Self {
        MintRequest {
            app_name: config.app.name.clone(),
            short_description: config.app.short_description.clone(),
            long_description: config.app.long_description.clone(),
            new_in_version: config.app.new_in_version.clone(),
            package_id: config.app.package_id.clone(),
            category: config.category.clone(),
            publisher_name: config.publisher.name.clone(),
            publisher_website: config.urls.website.clone(),
            publisher_email: config.publisher.email.clone(),
            wallet_address: config.wallet_public_key.clone(),
            rpc_url: config.rpc_url.clone(),
            icon_uri: uploads.icon.uri.clone(),
            banner_uri: uploads.banner.as_ref().map(|b| b.uri.clone()),
            screenshot_uris: uploads.screenshots.iter().map(|s| s.uri.clone()).collect(),
            apk_uri: uploads.apk.uri.clone(),
            metadata_uri: metadata_uri.to_string(),
        }
    }
}

/// Addresses of the two minted tokens. Owned by the chain from here on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintResult {
    pub app_mint_address: String,
    pub release_mint_address: String,
}

/// Minting failures.
#[derive(Debug, thiserror::Error)]
pub enum MintError {
    /// The wallet cannot be used for this release.
    #[error("{0}")]
    Wallet(String),

    /// The collaborator's own failure reason, passed through verbatim.
    #[error("{0}")]
    Delegate(String),
}

/// External service that creates the App (collection) and Release tokens.
#[async_trait]
pub trait MintingService: Send + Sync {
    async fn mint(
        &self,
        request: &MintRequest,
        signer: &dyn TransactionSigner,
        progress: &(dyn Fn(MintStep) + Send + Sync),
    ) -> Result<MintResult, MintError>;
}

/// Adapter between the pipeline and a [`MintingService`].
pub struct MintCoordinator {
    service: Option<Arc<dyn MintingService>>,
    signer: Arc<dyn TransactionSigner>,
    simulate: bool,
}

impl MintCoordinator {
    /// Coordinator delegating to a real service.
    pub fn new(service: Arc<dyn MintingService>, signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            service: Some(service),
            signer,
            simulate: false,
        }
    }

    /// Coordinator that fabricates addresses.
    pub fn simulated(signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            service: None,
            signer,
            simulate: true,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.simulate || self.service.is_none()
    }

    /// Mint both tokens, reporting progress inside the 70 to 90 band.
    pub async fn mint(
        &self,
        config: &ReleaseConfig,
        uploads: &UploadedAssets,
        metadata_uri: &str,
        reporter: &ProgressReporter<'_>,
    ) -> Result<MintResult, MintError> {
        reporter.emit("nft", "Creating App NFT", MINT_BAND_START);

        let relay = |step: MintStep| {
            let numerator = scale_into_band(MINT_BAND_START, MINT_BAND_END, step.current, step.total);
            reporter.emit("nft", step.step, numerator);
        };

        let service = match (&self.service, self.simulate) {
            (Some(service), false) => service,
            (None, _) | (_, true) => {
                let total = SIMULATED_STEPS.len() as u32;
                for (i, step) in SIMULATED_STEPS.iter().enumerate() {
                    relay(MintStep {
                        step: step.to_string(),
                        current: i as u32 + 1,
                        total,
                    });
                }
                let result = MintResult {
                    app_mint_address: simulated_address(),
                    release_mint_address: simulated_address(),
                };
                info!(
                    app = %result.app_mint_address,
                    release = %result.release_mint_address,
                    "SIMULATION: created mock NFTs"
                );
                return Ok(result);
            }
        };

        self.check_wallet(config)?;

        let request = MintRequest::from_release(config, uploads, metadata_uri);
        let result = service.mint(&request, self.signer.as_ref(), &relay).await?;

        if result.app_mint_address.is_empty() || result.release_mint_address.is_empty() {
            return Err(MintError::Delegate(
                "minting service returned an empty address".to_string(),
            ));
        }
        Ok(result)
    }

    fn check_wallet(&self, config: &ReleaseConfig) -> Result<(), MintError> {
        match self.signer.state() {
            WalletState::Connected { public_key, .. } if public_key == config.wallet_public_key => {
                Ok(())
            }
            WalletState::Connected { public_key, .. } => Err(MintError::Wallet(format!(
                "connected wallet {} does not match publisher key {}",
                public_key, config.wallet_public_key
            ))),
            WalletState::Connecting => Err(MintError::Wallet(
                "wallet connection still in progress".to_string(),
            )),
            WalletState::Disconnected => {
                Err(MintError::Wallet("wallet not connected".to_string()))
            }
            WalletState::Error { message } => {
                Err(MintError::Wallet(format!("wallet error: {}", message)))
            }
        }
    }
}

/// `SIM` followed by 32 base58 characters.
pub fn simulated_address() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    let body: String = bytes
        .iter()
        .map(|b| BASE58_ALPHABET[*b as usize % BASE58_ALPHABET.len()] as char)
        .collect();
    format!("SIM{}", body)
}

// ---------------------------------------------------------------------------
// External minting command
// ---------------------------------------------------------------------------

/// Messages a minting command writes to stdout, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MintMessage {
    Progress {
        step: String,
        current: u32,
        total: u32,
    },
    Minted {
        app_mint_address: String,
        release_mint_address: String,
    },
    Error {
        message: String,
    },
}

/// Minting collaborator backed by an external executable.
///
/// The request is written as JSON to the child's stdin; progress and the
/// final result are read back as newline-delimited [`MintMessage`]s. The
/// command holds its own keypair, so the signer is not consulted.
#[derive(Debug, Clone)]
pub struct CommandMintingService {
    command: Vec<String>,
}

impl CommandMintingService {
    /// `command[0]` is the executable; the rest are its arguments.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl MintingService for CommandMintingService {
    async fn mint(
        &self,
        request: &MintRequest,
        _signer: &dyn TransactionSigner,
        progress: &(dyn Fn(MintStep) + Send + Sync),
    ) -> Result<MintResult, MintError> {
        let (exe, args) = self
            .command
            .split_first()
            .ok_or_else(|| MintError::Delegate("minting command is empty".to_string()))?;

        let payload = serde_json::to_vec(request)
            .map_err(|e| MintError::Delegate(format!("cannot encode mint request: {}", e)))?;

        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MintError::Delegate(format!("cannot start {}: {}", exe, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that exits before reading its input still reports
            // through stdout, stderr and its exit status.
            if let Err(e) = stdin.write_all(&payload).await {
                warn!(error = %e, "minting command did not accept the mint request");
            }
            // Dropping stdin closes the pipe so the command sees EOF.
        }

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MintError::Delegate("minting command has no stdout".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut minted: Option<MintResult> = None;
        let mut failure: Option<String> = None;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| MintError::Delegate(format!("cannot read minting output: {}", e)))?
        {
            match serde_json::from_str::<MintMessage>(&line) {
                Ok(MintMessage::Progress {
                    step,
                    current,
                    total,
                }) => progress(MintStep {
                    step,
                    current,
                    total,
                }),
                Ok(MintMessage::Minted {
                    app_mint_address,
                    release_mint_address,
                }) => {
                    minted = Some(MintResult {
                        app_mint_address,
                        release_mint_address,
                    })
                }
                Ok(MintMessage::Error { message }) => failure = Some(message),
                Err(_) => debug!(line = %line, "ignoring non-protocol output from minting command"),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| MintError::Delegate(format!("minting command did not exit: {}", e)))?;

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if let Some(message) = failure {
            return Err(MintError::Delegate(message));
        }
        if !status.success() {
            warn!(status = ?status.code(), stderr = %stderr, "minting command failed");
            return Err(MintError::Delegate(format!(
                "minting command exited with {}: {}",
                status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
                stderr.trim()
            )));
        }
        minted.ok_or_else(|| {
            MintError::Delegate("minting command finished without reporting addresses".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_addresses_are_prefixed_base58() {
        let addr = simulated_address();
        assert!(addr.starts_with("SIM"));
        assert_eq!(addr.len(), 35);
        assert!(addr[3..]
            .bytes()
            .all(|b| BASE58_ALPHABET.contains(&b)));
        assert_ne!(addr, simulated_address());
    }

    #[test]
    fn protocol_messages_parse() {
        let msg: MintMessage =
            serde_json::from_str(r#"{"type":"progress","step":"Creating App NFT","current":2,"total":6}"#)
                .unwrap();
        assert_eq!(
            msg,
            MintMessage::Progress {
                step: "Creating App NFT".to_string(),
                current: 2,
                total: 6
            }
        );

        let msg: MintMessage = serde_json::from_str(
            r#"{"type":"minted","app_mint_address":"A","release_mint_address":"R"}"#,
        )
        .unwrap();
        assert!(matches!(msg, MintMessage::Minted { .. }));
    }

    #[test]
    fn mint_error_displays_reason_verbatim() {
        assert_eq!(
            MintError::Delegate("blockhash expired".to_string()).to_string(),
            "blockhash expired"
        );
    }
}
