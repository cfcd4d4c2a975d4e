//! dApp Store publishing core
//!
//! Drives one application release from a local descriptor to durable
//! storage, on-chain App/Release tokens and a publisher portal submission.
//! Collaborators (uploader, minting service, signer, package inspector) are
//! traits injected into [`WorkflowOrchestrator`]; every external effect has a
//! simulated counterpart that can be switched on independently.

pub mod config;
pub mod digest;
pub mod error;
pub mod fakes;
pub mod imaging;
pub mod metadata;
pub mod metrics;
pub mod mint;
pub mod obs;
pub mod package;
pub mod portal;
pub mod progress;
pub mod telemetry;
pub mod upload;
pub mod validate;
pub mod wallet;
pub mod workflow;

pub use config::{
    AppInfo, AssetRefs, PipelineSettings, PolicyUrls, PublisherInfo, ReleaseConfig,
    SimulationFlags,
};
pub use digest::ContentHash;
pub use error::{ConfigError, PublishError, Result};
pub use imaging::{read_dimensions, Dimensions};
pub use metadata::{build as build_metadata, ReleaseMetadataDocument, SCHEMA_VERSION};
pub use mint::{
    CommandMintingService, MintCoordinator, MintError, MintRequest, MintResult, MintStep,
    MintingService,
};
pub use package::{ApkInspector, InspectError, PackageInfo, PackageInspector};
pub use portal::{build_submission, PortalSubmission, PortalSubmitter};
pub use progress::{NullProgress, ProgressReporter, ProgressSink, WorkflowProgress};
pub use upload::{
    AssetKind, AssetUploader, BundlerUploader, SimulatedUploader, UploadBody, UploadError,
    UploadRequest, UploadedAsset, UploadedAssets,
};
pub use validate::{ConfigValidator, ValidationOutcome, ValidationRule};
pub use wallet::{DetachedWallet, SigningError, TransactionSigner, WalletState};
pub use workflow::{
    preview_metadata, PublishedRelease, PublishingResult, WorkflowOrchestrator, WorkflowState,
};

pub use metrics::METRICS;
pub use obs::PublishSpan;
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
