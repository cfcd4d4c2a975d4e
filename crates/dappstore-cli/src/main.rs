//! dApp Store publishing CLI
//!
//! The `dappstore` command drives a release descriptor through the publishing
//! pipeline.
//!
//! ## Commands
//!
//! - `validate`: Check a descriptor and its assets without any network call
//! - `publish`: Upload, mint and submit a release
//! - `metadata`: Print the metadata document a publish would upload
//! - `inspect-apk`: Print the facts read from a package binary

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use dappstore_core::{
    preview_metadata, ApkInspector, CommandMintingService, ConfigValidator, DetachedWallet,
    MintingService, PackageInspector, PipelineSettings, ReleaseConfig, WorkflowOrchestrator,
    WorkflowProgress,
};


#[derive(Parser)]
#[command(name = "dappstore")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish Android releases to the Solana dApp Store", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a release descriptor and its assets
    Validate {
        /// Path to the release descriptor (.json or .toml)
        descriptor: PathBuf,
    },

    /// Publish a release: upload assets, mint tokens, submit for review
    Publish(PublishArgs),

    /// Print the metadata document with placeholder URIs
    Metadata {
        /// Path to the release descriptor (.json or .toml)
        descriptor: PathBuf,
    },

    /// Read package id, version and permissions from an APK
    InspectApk {
        /// Path to the .apk file
        apk: PathBuf,
    },
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// Path to the release descriptor (.json or .toml)
    descriptor: PathBuf,

    /// Simulate every external effect
    #[arg(long)]
    simulate: bool,

    /// Simulate storage uploads only
    #[arg(long)]
    simulate_uploads: bool,

    /// Simulate token minting only
    #[arg(long)]
    simulate_mint: bool,

    /// Simulate the portal submission only
    #[arg(long)]
    simulate_portal: bool,

    /// Maximum concurrent uploads
    #[arg(long, env = "DAPPSTORE_UPLOAD_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Public key of the wallet the minting command signs with
    ///
    /// Required for a real mint; it must equal the descriptor's publisher key.
    #[arg(long, env = "DAPPSTORE_WALLET", value_name = "PUBKEY")]
    wallet: Option<String>,

    /// Wallet label recorded with the connection
    #[arg(long, default_value = "keypair")]
    wallet_name: String,

    /// Minting command and its arguments, after `--`
    #[arg(last = true)]
    mint_command: Vec<String>,
}

impl PublishArgs {
    fn settings(&self, mut settings: PipelineSettings) -> PipelineSettings {
        if self.simulate {
            settings.simulation = dappstore_core::SimulationFlags::all();
        }
        settings.simulation.uploads |= self.simulate_uploads;
        settings.simulation.minting |= self.simulate_mint;
        settings.simulation.portal |= self.simulate_portal;
        if let Some(n) = self.concurrency {
            settings = settings.with_upload_concurrency(n);
        }
        settings
    }

    /// The connected wallet. A simulated mint never signs, so it falls back to
    /// the publisher key.
    fn signer(
        &self,
        config: &ReleaseConfig,
        settings: &PipelineSettings,
    ) -> Result<DetachedWallet> {
        match (&self.wallet, settings.simulation.minting) {
            (Some(key), _) => Ok(DetachedWallet::new(key, &self.wallet_name)),
            (None, true) => Ok(DetachedWallet::new(&config.wallet_public_key, &self.wallet_name)),
            (None, false) => anyhow::bail!("--wallet is required for a real mint"),
        }
    }

    fn minting_service(&self) -> Option<Arc<dyn MintingService>> {
        if self.mint_command.is_empty() {
            None
        } else {
            Some(Arc::new(CommandMintingService::new(self.mint_command.clone())))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    dappstore_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate { descriptor } => cmd_validate(&descriptor),
        Commands::Publish(args) => cmd_publish(&args).await,
        Commands::Metadata { descriptor } => cmd_metadata(&descriptor),
        Commands::InspectApk { apk } => cmd_inspect_apk(&apk),
    }
}

fn load_descriptor(path: &Path) -> Result<ReleaseConfig> {
    ReleaseConfig::from_path(path)
        .with_context(|| format!("Failed to load release descriptor: {:?}", path))
}

/// Validate a descriptor, printing the outcome as JSON
fn cmd_validate(descriptor: &Path) -> Result<()> {
    let config = load_descriptor(descriptor)?;
    let outcome = ConfigValidator::default().validate(&config);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_valid() {
        anyhow::bail!("{} validation error(s)", outcome.errors.len());
    }
    Ok(())
}

/// Publish a release and print the result as JSON
async fn cmd_publish(args: &PublishArgs) -> Result<()> {
    let config = load_descriptor(&args.descriptor)?;
    let settings = args.settings(
        PipelineSettings::from_env().context("Invalid DAPPSTORE_* environment settings")?,
    );

    let signer = Arc::new(args.signer(&config, &settings)?);
    let orchestrator = WorkflowOrchestrator::from_settings(&settings, signer, args.minting_service())
        .context("Failed to set up publishing pipeline")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let progress = |p: WorkflowProgress| {
        info!(stage = %p.stage, progress = p.progress, total = p.total, "{}", p.step);
    };
    let result = orchestrator.run(&config, &progress, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    match result.error() {
        Some(error) => anyhow::bail!("Publishing failed: {}", error),
        None => Ok(()),
    }
}

/// Print the metadata document for a valid descriptor
fn cmd_metadata(descriptor: &Path) -> Result<()> {
    let config = load_descriptor(descriptor)?;
    let outcome = ConfigValidator::default().validate(&config);
    if !outcome.is_valid() {
        anyhow::bail!("Validation failed:\n{}", outcome.errors.join("\n"));
    }

    let document = preview_metadata(&config, &ApkInspector)?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

/// Print package facts read from an APK
fn cmd_inspect_apk(apk: &Path) -> Result<()> {
    let info = ApkInspector
        .inspect(apk)
        .with_context(|| format!("Failed to inspect {:?}", apk))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dappstore_core::fakes::fixtures::write_release;
    use dappstore_core::TransactionSigner;

    fn write_descriptor(dir: &Path, config: &ReleaseConfig) -> PathBuf {
        let path = dir.join("release.json");
        std::fs::write(&path, serde_json::to_vec_pretty(config).unwrap()).unwrap();
        path
    }

    #[test]
    fn publish_flags_layer_over_settings() {
        let cli = Cli::try_parse_from([
            "dappstore",
            "publish",
            "release.toml",
            "--simulate-mint",
            "--concurrency",
            "0",
            "--",
            "node",
            "mint.js",
            "--cluster",
            "devnet",
        ])
        .unwrap();

        let Commands::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        let settings = args.settings(PipelineSettings::default());
        assert!(settings.simulation.minting);
        assert!(!settings.simulation.uploads);
        assert_eq!(settings.upload_concurrency, 1);
        assert_eq!(args.mint_command, vec!["node", "mint.js", "--cluster", "devnet"]);
        assert!(args.minting_service().is_some());
    }

    #[test]
    fn simulate_turns_everything_on() {
        let cli = Cli::try_parse_from(["dappstore", "--json", "publish", "r.json", "--simulate"])
            .unwrap();
        assert!(cli.json);
        let Commands::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        let settings = args.settings(PipelineSettings::default());
        assert_eq!(settings.simulation, dappstore_core::SimulationFlags::all());
        assert!(args.minting_service().is_none());
    }

    #[test]
    fn validate_accepts_complete_release() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();
        let descriptor = write_descriptor(dir.path(), &config);

        assert!(cmd_validate(&descriptor).is_ok());
        assert!(cmd_metadata(&descriptor).is_ok());
        assert!(cmd_inspect_apk(&config.assets.apk).is_ok());
    }

    #[test]
    fn validate_fails_on_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();
        std::fs::remove_file(&config.assets.apk).unwrap();
        let descriptor = write_descriptor(dir.path(), &config);

        let err = cmd_validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("validation error"));
        assert!(cmd_metadata(&descriptor).is_err());
    }

    #[tokio::test]
    async fn simulated_publish_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();
        let descriptor = write_descriptor(dir.path(), &config);

        let cli = Cli::try_parse_from([
            "dappstore",
            "publish",
            descriptor.to_str().unwrap(),
            "--simulate",
        ])
        .unwrap();
        let Commands::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        assert!(cmd_publish(&args).await.is_ok());
    }

    fn publish_args(argv: &[&str]) -> PublishArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        let Commands::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        args
    }

    #[test]
    fn real_mint_needs_an_explicit_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();

        let args = publish_args(&["dappstore", "publish", "r.json", "--", "mint"]);
        let err = args
            .signer(&config, &args.settings(PipelineSettings::default()))
            .unwrap_err();
        assert!(err.to_string().contains("--wallet is required"));

        let args = publish_args(&["dappstore", "publish", "r.json", "--simulate-mint"]);
        let signer = args
            .signer(&config, &args.settings(PipelineSettings::default()))
            .unwrap();
        assert_eq!(
            signer.state().public_key(),
            Some(config.wallet_public_key.as_str())
        );
    }

    #[tokio::test]
    async fn mismatched_wallet_stops_a_real_mint() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();
        let descriptor = write_descriptor(dir.path(), &config);

        let args = publish_args(&[
            "dappstore",
            "publish",
            descriptor.to_str().unwrap(),
            "--simulate-uploads",
            "--simulate-portal",
            "--wallet",
            "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
            "--",
            "sh",
            "-c",
            "cat > /dev/null",
        ]);
        let err = cmd_publish(&args).await.unwrap_err();
        assert!(
            err.to_string().contains("does not match publisher key"),
            "{err}"
        );
    }
}
