//! Publishing workflow orchestration.
//!
//! [`WorkflowOrchestrator::run`] drives one release through
//! `Validating → UploadingAssets → BuildingMetadata → MintingTokens →
//! SubmittingPortal → Complete`. Any stage failure moves straight to `Failed`
//! with a single error string; nothing already uploaded or minted is rolled
//! back.
//!
//! Progress bands: validation 0 to 10, uploads 10 to 60, metadata 60 to 70,
//! minting 70 to 90, portal 90, completion 100.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{PipelineSettings, ReleaseConfig};
use crate::error::PublishError;
use crate::metadata;
use crate::metrics::METRICS;
use crate::mint::{MintCoordinator, MintingService};
use crate::obs;
use crate::package::{ApkInspector, PackageInfo, PackageInspector};
use crate::portal::PortalSubmitter;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::upload::{
    upload_asset, AssetKind, AssetUploader, BundlerUploader, SimulatedUploader, UploadRequest,
    UploadedAsset, UploadedAssets,
};
use crate::validate::ConfigValidator;
use crate::wallet::TransactionSigner;

const UPLOAD_BAND_START: u32 = 10;
const UPLOAD_BAND_WIDTH: u32 = 50;

/// Pipeline state. Forward-only; `Failed` is absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Validating,
    UploadingAssets,
    BuildingMetadata,
    MintingTokens,
    SubmittingPortal,
    Complete,
    Failed,
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Validating => "validating",
            WorkflowState::UploadingAssets => "uploading_assets",
            WorkflowState::BuildingMetadata => "building_metadata",
            WorkflowState::MintingTokens => "minting_tokens",
            WorkflowState::SubmittingPortal => "submitting_portal",
            WorkflowState::Complete => "complete",
            WorkflowState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Complete | WorkflowState::Failed)
    }

    /// The single state that follows on success.
    pub fn next(&self) -> Option<WorkflowState> {
        match self {
            WorkflowState::Validating => Some(WorkflowState::UploadingAssets),
            WorkflowState::UploadingAssets => Some(WorkflowState::BuildingMetadata),
            WorkflowState::BuildingMetadata => Some(WorkflowState::MintingTokens),
            WorkflowState::MintingTokens => Some(WorkflowState::SubmittingPortal),
            WorkflowState::SubmittingPortal => Some(WorkflowState::Complete),
            WorkflowState::Complete | WorkflowState::Failed => None,
        }
    }

    /// `Failed` from any non-terminal state, otherwise only the next stage.
    pub fn can_transition_to(&self, target: WorkflowState) -> bool {
        if target == WorkflowState::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(target)
    }
}

/// Success payload of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRelease {
    pub app_mint_address: String,
    pub release_mint_address: String,
    pub metadata_uri: String,
    /// `false` when the portal rejected or never received the submission.
    pub portal_submitted: bool,
}

/// Terminal result: exactly one of the payload or the error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishingResult {
    Published(PublishedRelease),
    Failed { error: String },
}

impl PublishingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishingResult::Published(_))
    }

    pub fn published(&self) -> Option<&PublishedRelease> {
        match self {
            PublishingResult::Published(release) => Some(release),
            PublishingResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PublishingResult::Published(_) => None,
            PublishingResult::Failed { error } => Some(error),
        }
    }

    pub fn portal_submitted(&self) -> bool {
        self.published().is_some_and(|r| r.portal_submitted)
    }
}

/// Records transitions and logs each one.
struct StateTracker {
    current: WorkflowState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            current: WorkflowState::Validating,
        }
    }

    fn advance(&mut self, next: WorkflowState) {
        debug_assert!(
            self.current.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.current,
            next
        );
        obs::emit_stage_entered(self.current, next);
        self.current = next;
    }
}

/// Sequences validation, uploads, metadata, minting and portal submission.
pub struct WorkflowOrchestrator {
    validator: ConfigValidator,
    inspector: Arc<dyn PackageInspector>,
    uploader: Arc<dyn AssetUploader>,
    minter: MintCoordinator,
    portal: PortalSubmitter,
    upload_concurrency: usize,
}

impl WorkflowOrchestrator {
    /// Wire every collaborator explicitly.
    pub fn new(
        inspector: Arc<dyn PackageInspector>,
        uploader: Arc<dyn AssetUploader>,
        minter: MintCoordinator,
        portal: PortalSubmitter,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            validator: ConfigValidator::standard(Arc::clone(&inspector)),
            inspector,
            uploader,
            minter,
            portal,
            upload_concurrency: upload_concurrency.max(1),
        }
    }

    /// Build collaborators from settings, honouring each simulation flag.
    ///
    /// A real (non-simulated) mint requires `minting_service`.
    pub fn from_settings(
        settings: &PipelineSettings,
        signer: Arc<dyn TransactionSigner>,
        minting_service: Option<Arc<dyn MintingService>>,
    ) -> Result<Self, PublishError> {
        let uploader: Arc<dyn AssetUploader> = if settings.simulation.uploads {
            Arc::new(SimulatedUploader::new(&settings.gateway_url))
        } else {
            Arc::new(
                BundlerUploader::from_settings(settings)
                    .map_err(|e| PublishError::transport("Uploader setup", e))?,
            )
        };

        let minter = match (settings.simulation.minting, minting_service) {
            (true, _) => MintCoordinator::simulated(signer),
            (false, Some(service)) => MintCoordinator::new(service, signer),
            (false, None) => {
                return Err(PublishError::Delegate(
                    "no minting service configured".to_string(),
                ))
            }
        };

        let portal = PortalSubmitter::from_settings(settings)
            .map_err(|e| PublishError::transport("Portal setup", e))?;

        Ok(Self::new(
            Arc::new(ApkInspector),
            uploader,
            minter,
            portal,
            settings.upload_concurrency,
        ))
    }

    /// Replace the uploader.
    pub fn with_uploader(mut self, uploader: Arc<dyn AssetUploader>) -> Self {
        self.uploader = uploader;
        self
    }

    /// Replace the package inspector used by validation and metadata.
    pub fn with_inspector(mut self, inspector: Arc<dyn PackageInspector>) -> Self {
        self.validator = ConfigValidator::standard(Arc::clone(&inspector));
        self.inspector = inspector;
        self
    }

    /// Replace the mint coordinator.
    pub fn with_minter(mut self, minter: MintCoordinator) -> Self {
        self.minter = minter;
        self
    }

    /// Run the whole pipeline once.
    ///
    /// Never fails: every error ends up in [`PublishingResult::Failed`].
    pub async fn run(
        &self,
        config: &ReleaseConfig,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> PublishingResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let _span = obs::PublishSpan::enter(&run_id, &config.app.package_id);
        let start = Instant::now();
        obs::emit_run_started(&run_id, &config.app.name, self.minter.is_simulated());

        let reporter = ProgressReporter::new(sink);
        let mut state = StateTracker::new();

        let result = match self.execute(config, &reporter, cancel, &mut state).await {
            Ok(published) => {
                state.advance(WorkflowState::Complete);
                reporter.emit("complete", "Publishing complete", 100);
                PublishingResult::Published(published)
            }
            Err(e) => {
                warn!(stage = state.current.name(), error = %e, "publishing failed");
                state.advance(WorkflowState::Failed);
                PublishingResult::Failed {
                    error: e.to_string(),
                }
            }
        };

        METRICS.flush();
        obs::emit_run_finished(
            &run_id,
            start.elapsed().as_millis() as u64,
            result.is_success(),
        );
        result
    }

    async fn execute(
        &self,
        config: &ReleaseConfig,
        reporter: &ProgressReporter<'_>,
        cancel: &CancellationToken,
        state: &mut StateTracker,
    ) -> Result<PublishedRelease, PublishError> {
        // Validating
        ensure_live(cancel)?;
        reporter.emit("validation", "Validating configuration", 0);
        let outcome = self.validator.validate(config);
        if !outcome.is_valid() {
            return Err(PublishError::Validation(outcome.errors));
        }
        reporter.emit("validation", "Configuration valid", UPLOAD_BAND_START);

        // UploadingAssets
        state.advance(WorkflowState::UploadingAssets);
        ensure_live(cancel)?;
        let uploads = self.upload_assets(config, reporter, cancel).await?;

        // BuildingMetadata
        state.advance(WorkflowState::BuildingMetadata);
        ensure_live(cancel)?;
        reporter.emit("metadata", "Building metadata", 60);
        let package = self.package_info(config);
        let document = metadata::build(config, &uploads, &package);
        let bytes = document.to_json_bytes()?;
        let size = bytes.len() as u64;
        let metadata_uri = self
            .uploader
            .upload(UploadRequest::new("metadata.json", "application/json", bytes))
            .await
            .map_err(|e| {
                METRICS.inc_upload_failures();
                obs::emit_upload_failed("Metadata", &e);
                PublishError::transport("Metadata upload", e)
            })?;
        METRICS.record_upload(size);
        obs::emit_asset_uploaded("Metadata", &metadata_uri, size);
        reporter.emit("metadata", "Metadata uploaded", 70);

        // MintingTokens
        state.advance(WorkflowState::MintingTokens);
        ensure_live(cancel)?;
        let minted = self
            .minter
            .mint(config, &uploads, &metadata_uri, reporter)
            .await
            .map_err(|e| PublishError::Delegate(e.to_string()))?;
        obs::emit_mint_completed(
            &minted.app_mint_address,
            &minted.release_mint_address,
            self.minter.is_simulated(),
        );

        // SubmittingPortal
        state.advance(WorkflowState::SubmittingPortal);
        ensure_live(cancel)?;
        reporter.emit("submit", "Submitting to publisher portal", 90);
        let portal_submitted = self
            .portal
            .submit(config, &minted.app_mint_address, &minted.release_mint_address)
            .await;
        if portal_submitted {
            METRICS.inc_portal_submissions();
        }
        obs::emit_portal_submitted(portal_submitted);

        Ok(PublishedRelease {
            app_mint_address: minted.app_mint_address,
            release_mint_address: minted.release_mint_address,
            metadata_uri,
            portal_submitted,
        })
    }

    /// Upload every asset with bounded concurrency.
    ///
    /// Results are consumed in declared order, so progress events follow the
    /// declaration regardless of completion order. The first failure drops
    /// the stream, which abandons uploads still in flight.
    async fn upload_assets(
        &self,
        config: &ReleaseConfig,
        reporter: &ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<UploadedAssets, PublishError> {
        let plan = upload_plan(config);
        let total = plan.len() as u32;
        let uploader = self.uploader.as_ref();

        reporter.emit("upload", "Uploading assets", UPLOAD_BAND_START);

        let mut pending = stream::iter(plan)
            .map(move |(kind, path)| async move {
                if cancel.is_cancelled() {
                    return Err(PublishError::Cancelled);
                }
                upload_asset(uploader, kind, &path).await.map_err(|e| {
                    METRICS.inc_upload_failures();
                    obs::emit_upload_failed(&kind.label(), &e);
                    PublishError::transport(format!("{} upload", kind.label()), e)
                })
            })
            .buffered(self.upload_concurrency);

        let mut done: Vec<UploadedAsset> = Vec::with_capacity(total as usize);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
                next = pending.next() => next,
            };
            let Some(result) = next else {
                break;
            };
            let asset = result?;

            METRICS.record_upload(asset.size);
            obs::emit_asset_uploaded(&asset.kind.label(), &asset.uri, asset.size);
            let completed = done.len() as u32 + 1;
            reporter.emit(
                "upload",
                format!("{} uploaded", asset.kind.label()),
                UPLOAD_BAND_START + UPLOAD_BAND_WIDTH * completed / total.max(1),
            );
            done.push(asset);
        }

        collect_uploads(done)
    }

    fn package_info(&self, config: &ReleaseConfig) -> PackageInfo {
        package_info_or_default(self.inspector.as_ref(), config)
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), PublishError> {
    if cancel.is_cancelled() {
        info!("cancellation requested");
        return Err(PublishError::Cancelled);
    }
    Ok(())
}

/// Icon, banner (if any), screenshots in declared order, then the package.
pub fn upload_plan(config: &ReleaseConfig) -> Vec<(AssetKind, PathBuf)> {
    let assets = &config.assets;
    let mut plan = vec![(AssetKind::Icon, assets.icon.clone())];
    if let Some(banner) = &assets.banner {
        plan.push((AssetKind::Banner, banner.clone()));
    }
    plan.extend(
        assets
            .screenshots
            .iter()
            .enumerate()
            .map(|(i, p)| (AssetKind::Screenshot(i + 1), p.clone())),
    );
    plan.push((AssetKind::Apk, assets.apk.clone()));
    plan
}

/// Build the metadata document without touching the network.
///
/// Each asset gets a `pending://<file name>` placeholder URI; hashes, sizes and
/// dimensions come from the local files.
pub fn preview_metadata(
    config: &ReleaseConfig,
    inspector: &dyn PackageInspector,
) -> Result<metadata::ReleaseMetadataDocument, PublishError> {
    let mut described = Vec::new();
    for (kind, path) in upload_plan(config) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| kind.label().to_lowercase());
        described.push(UploadedAsset::local(kind, &path, &format!("pending://{}", name))?);
    }
    let uploads = collect_uploads(described)?;
    let package = package_info_or_default(inspector, config);
    Ok(metadata::build(config, &uploads, &package))
}

fn package_info_or_default(inspector: &dyn PackageInspector, config: &ReleaseConfig) -> PackageInfo {
    match inspector.inspect(&config.assets.apk) {
        Ok(info) => info,
        Err(e) => {
            warn!(error = %e, "package inspection failed, using default package facts");
            PackageInfo {
                package_id: config.app.package_id.clone(),
                ..PackageInfo::default()
            }
        }
    }
}

fn collect_uploads(done: Vec<UploadedAsset>) -> Result<UploadedAssets, PublishError> {
    let mut icon = None;
    let mut banner = None;
    let mut screenshots = Vec::new();
    let mut apk = None;
    for asset in done {
        match asset.kind {
            AssetKind::Icon => icon = Some(asset),
            AssetKind::Banner => banner = Some(asset),
            AssetKind::Screenshot(_) => screenshots.push(asset),
            AssetKind::Apk => apk = Some(asset),
        }
    }
    match (icon, apk) {
        (Some(icon), Some(apk)) => Ok(UploadedAssets {
            icon,
            banner,
            screenshots,
            apk,
        }),
        _ => Err(PublishError::transport(
            "Asset upload",
            "icon or package missing from upload results",
        )),
    }
}
