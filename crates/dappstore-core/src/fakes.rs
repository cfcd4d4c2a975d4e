//! In-memory fakes for the pipeline's collaborators (testing only)
//!
//! Provides `RecordingUploader`, `ScriptedMintingService`, `StaticSigner`,
//! `FixedInspector` and `RecordingProgress`, plus byte-level [`fixtures`] for
//! images, package binaries and a complete on-disk release.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::mint::{MintError, MintRequest, MintResult, MintStep, MintingService};
use crate::package::{InspectError, PackageInfo, PackageInspector};
use crate::progress::{ProgressSink, WorkflowProgress};
use crate::upload::{AssetUploader, UploadError, UploadRequest};
use crate::wallet::{SigningError, TransactionSigner, WalletState};

// ---------------------------------------------------------------------------
// RecordingUploader
// ---------------------------------------------------------------------------

type UploadHook = Box<dyn Fn(&str) + Send + Sync>;

/// Uploader that records every call and returns `{gateway}tx{n}`.
///
/// Individual file names can be scripted to fail with a 500.
pub struct RecordingUploader {
    gateway: String,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
    counter: AtomicUsize,
    hook: Option<UploadHook>,
}

impl RecordingUploader {
    pub fn new(gateway: &str) -> Self {
        Self {
            gateway: gateway.to_string(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            hook: None,
        }
    }

    /// Fail any upload whose file name equals `file_name`.
    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    /// Run `hook` with the file name at the start of every upload.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// File names in the order uploads started.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetUploader for RecordingUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().unwrap().push(request.file_name.clone());
        if let Some(hook) = &self.hook {
            hook(&request.file_name);
        }
        tokio::task::yield_now().await;

        if self.failing.contains(&request.file_name) {
            return Err(UploadError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        Ok(format!("{}tx{}", self.gateway, n))
    }
}

// ---------------------------------------------------------------------------
// ScriptedMintingService
// ---------------------------------------------------------------------------

/// Minting service with a scripted outcome.
pub struct ScriptedMintingService {
    outcome: Result<MintResult, String>,
    steps: Vec<&'static str>,
    requests: Mutex<Vec<MintRequest>>,
}

impl ScriptedMintingService {
    pub fn succeeding(app_mint_address: &str, release_mint_address: &str) -> Self {
        Self {
            outcome: Ok(MintResult {
                app_mint_address: app_mint_address.to_string(),
                release_mint_address: release_mint_address.to_string(),
            }),
            steps: vec![
                "Creating App NFT",
                "Confirming App NFT",
                "Creating Release NFT",
                "Confirming Release NFT",
            ],
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reports one step, then fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            outcome: Err(reason.to_string()),
            steps: vec!["Creating App NFT"],
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<MintRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MintingService for ScriptedMintingService {
    async fn mint(
        &self,
        request: &MintRequest,
        _signer: &dyn TransactionSigner,
        progress: &(dyn Fn(MintStep) + Send + Sync),
    ) -> Result<MintResult, MintError> {
        self.requests.lock().unwrap().push(request.clone());
        let total = self.steps.len() as u32;
        for (i, step) in self.steps.iter().enumerate() {
            progress(MintStep {
                step: step.to_string(),
                current: i as u32 + 1,
                total,
            });
        }
        self.outcome.clone().map_err(MintError::Delegate)
    }
}

// ---------------------------------------------------------------------------
// StaticSigner
// ---------------------------------------------------------------------------

/// Signer stuck in a fixed [`WalletState`].
#[derive(Debug, Clone)]
pub struct StaticSigner {
    state: WalletState,
}

impl StaticSigner {
    pub fn new(state: WalletState) -> Self {
        Self { state }
    }

    pub fn connected(public_key: &str) -> Self {
        Self::new(WalletState::Connected {
            public_key: public_key.to_string(),
            wallet_name: "fake".to_string(),
        })
    }
}

#[async_trait]
impl TransactionSigner for StaticSigner {
    fn state(&self) -> WalletState {
        self.state.clone()
    }

    async fn sign_and_send(&self, payload: &[u8]) -> Result<String, SigningError> {
        match &self.state {
            WalletState::Connected { .. } => Ok(format!("sig-{}", payload.len())),
            _ => Err(SigningError::NotConnected),
        }
    }
}

// ---------------------------------------------------------------------------
// FixedInspector
// ---------------------------------------------------------------------------

/// Inspector that ignores the file and returns a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct FixedInspector {
    info: Option<PackageInfo>,
}

impl FixedInspector {
    pub fn returning(info: PackageInfo) -> Self {
        Self { info: Some(info) }
    }

    pub fn failing() -> Self {
        Self { info: None }
    }
}

impl PackageInspector for FixedInspector {
    fn inspect(&self, _path: &Path) -> Result<PackageInfo, InspectError> {
        self.info.clone().ok_or(InspectError::NotAnArchive)
    }
}

// ---------------------------------------------------------------------------
// RecordingProgress
// ---------------------------------------------------------------------------

/// Progress sink that keeps every update.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<WorkflowProgress>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowProgress> {
        self.events.lock().unwrap().clone()
    }

    pub fn numerators(&self) -> Vec<u32> {
        self.events().into_iter().map(|p| p.progress).collect()
    }

    /// Distinct stage labels in first-seen order.
    pub fn stages(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for p in self.events() {
            if out.last() != Some(&p.stage) {
                out.push(p.stage);
            }
        }
        out
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, progress: WorkflowProgress) {
        self.events.lock().unwrap().push(progress);
    }
}

// ---------------------------------------------------------------------------
// Byte-level fixtures
// ---------------------------------------------------------------------------

pub mod fixtures {
    //! Synthetic images, archives and manifests that the real readers accept.

    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::{self, Write};
    use std::path::{Path, PathBuf};

    use crate::config::{AppInfo, AssetRefs, PolicyUrls, PublisherInfo, ReleaseConfig};
    use crate::imaging::PNG_SIGNATURE;

    /// A wallet key that passes the base58 shape check.
    pub const WALLET: &str = "GGVjQqnriuUdeLPoadfrV6CrpToYPmDquSBqdFpYhBts";
    pub const PACKAGE: &str = "me.monkemob.twa";

    /// Minimal PNG header with the given dimensions.
    pub fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        out.extend_from_slice(&13u32.to_be_bytes());
        out.extend_from_slice(b"IHDR");
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        // bit depth, colour type, compression, filter, interlace
        out.extend_from_slice(&[8, 6, 0, 0, 0]);
        out
    }

    /// Write a PNG header to `path`, creating parent directories.
    pub fn write_png(path: &Path, width: u32, height: u32) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, png_header(width, height))
    }

    /// What a synthetic binary manifest declares.
    #[derive(Debug, Clone)]
    pub struct ManifestFields {
        pub package: String,
        pub version_name: String,
        pub version_code: u64,
        pub min_sdk: u32,
        pub permissions: Vec<String>,
    }

    impl ManifestFields {
        pub fn for_package(package: &str) -> Self {
            Self {
                package: package.to_string(),
                version_name: "1.2.0".to_string(),
                version_code: 12,
                min_sdk: 24,
                permissions: vec!["android.permission.INTERNET".to_string()],
            }
        }
    }

    const TYPE_STRING: u8 = 0x03;
    const TYPE_INT_DEC: u8 = 0x10;
    const NO_INDEX: u32 = 0xFFFF_FFFF;

    enum Value {
        Str(u32),
        Int(u32),
    }

    struct Pool {
        strings: Vec<String>,
    }

    impl Pool {
        fn index(&mut self, s: &str) -> u32 {
            if let Some(i) = self.strings.iter().position(|x| x == s) {
                return i as u32;
            }
            self.strings.push(s.to_string());
            (self.strings.len() - 1) as u32
        }

        fn encode(&self) -> Vec<u8> {
            let mut offsets = Vec::new();
            let mut data = Vec::new();
            for s in &self.strings {
                offsets.extend_from_slice(&(data.len() as u32).to_le_bytes());
                let units: Vec<u16> = s.encode_utf16().collect();
                data.extend_from_slice(&(units.len() as u16).to_le_bytes());
                for u in units {
                    data.extend_from_slice(&u.to_le_bytes());
                }
                data.extend_from_slice(&0u16.to_le_bytes());
            }
            while data.len() % 4 != 0 {
                data.push(0);
            }

            let header_size = 28u32;
            let strings_start = header_size + offsets.len() as u32;
            let chunk_size = strings_start + data.len() as u32;

            let mut out = Vec::new();
            out.extend_from_slice(&0x0001u16.to_le_bytes());
            out.extend_from_slice(&(header_size as u16).to_le_bytes());
            out.extend_from_slice(&chunk_size.to_le_bytes());
            out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // styles
            out.extend_from_slice(&0u32.to_le_bytes()); // flags: UTF-16
            out.extend_from_slice(&strings_start.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // styles start
            out.extend_from_slice(&offsets);
            out.extend_from_slice(&data);
            out
        }
    }

    fn start_element(name: u32, attrs: &[(u32, Value)]) -> Vec<u8> {
        let chunk_size = 16 + 20 + 20 * attrs.len() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&0x0102u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(&chunk_size.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // line
        out.extend_from_slice(&NO_INDEX.to_le_bytes()); // comment

        out.extend_from_slice(&NO_INDEX.to_le_bytes()); // ns
        out.extend_from_slice(&name.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // attribute start
        out.extend_from_slice(&20u16.to_le_bytes()); // attribute size
        out.extend_from_slice(&(attrs.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 6]); // id, class, style

        for (attr_name, value) in attrs {
            let (raw, kind, data) = match value {
                Value::Str(i) => (*i, TYPE_STRING, *i),
                Value::Int(v) => (NO_INDEX, TYPE_INT_DEC, *v),
            };
            out.extend_from_slice(&NO_INDEX.to_le_bytes());
            out.extend_from_slice(&attr_name.to_le_bytes());
            out.extend_from_slice(&raw.to_le_bytes());
            out.extend_from_slice(&8u16.to_le_bytes());
            out.push(0);
            out.push(kind);
            out.extend_from_slice(&data.to_le_bytes());
        }
        out
    }

    /// Binary `AndroidManifest.xml` declaring `fields`.
    pub fn binary_manifest(fields: &ManifestFields) -> Vec<u8> {
        let mut pool = Pool {
            strings: Vec::new(),
        };
        let manifest = pool.index("manifest");
        let package = pool.index("package");
        let version_name = pool.index("versionName");
        let version_code = pool.index("versionCode");
        let uses_sdk = pool.index("uses-sdk");
        let min_sdk = pool.index("minSdkVersion");
        let uses_permission = pool.index("uses-permission");
        let name = pool.index("name");
        let package_value = pool.index(&fields.package);
        let version_value = pool.index(&fields.version_name);

        let mut body = start_element(
            manifest,
            &[
                (package, Value::Str(package_value)),
                (version_name, Value::Str(version_value)),
                (version_code, Value::Int(fields.version_code as u32)),
            ],
        );
        body.extend(start_element(uses_sdk, &[(min_sdk, Value::Int(fields.min_sdk))]));
        for permission in &fields.permissions {
            let value = pool.index(permission);
            body.extend(start_element(uses_permission, &[(name, Value::Str(value))]));
        }

        let strings = pool.encode();
        let total = 8 + strings.len() + body.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&0x0003u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend(strings);
        out.extend(body);
        out
    }

    /// Zip archive with every entry stored uncompressed.
    pub fn stored_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        zip_archive(entries, false)
    }

    /// Zip archive with every entry deflated, the way build tools write them.
    pub fn deflated_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        zip_archive(entries, true)
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .unwrap_or_default()
    }

    fn zip_archive(entries: &[(&str, &[u8])], deflated: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        let method: u16 = if deflated { 8 } else { 0 };

        for (name, data) in entries {
            let offset = out.len() as u32;
            let size = data.len() as u32;
            let payload = if deflated {
                deflate(data)
            } else {
                data.to_vec()
            };
            let packed = payload.len() as u32;

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&method.to_le_bytes());
            out.extend_from_slice(&[0u8; 4]); // time, date
            out.extend_from_slice(&0u32.to_le_bytes()); // crc
            out.extend_from_slice(&packed.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&payload);

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes()); // made by
            central.extend_from_slice(&20u16.to_le_bytes()); // needed
            central.extend_from_slice(&0u16.to_le_bytes()); // flags
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&[0u8; 4]); // time, date
            central.extend_from_slice(&0u32.to_le_bytes()); // crc
            central.extend_from_slice(&packed.to_le_bytes());
            central.extend_from_slice(&size.to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // extra
            central.extend_from_slice(&0u16.to_le_bytes()); // comment
            central.extend_from_slice(&0u16.to_le_bytes()); // disk
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }

        let cd_offset = out.len() as u32;
        let cd_size = central.len() as u32;
        out.extend(central);

        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    /// A minimal `.apk` carrying a stored binary manifest.
    pub fn apk_bytes(fields: &ManifestFields) -> Vec<u8> {
        let manifest = binary_manifest(fields);
        stored_zip(&[
            ("AndroidManifest.xml", manifest.as_slice()),
            ("classes.dex", b"dex\n035\0".as_slice()),
        ])
    }

    /// A minimal `.apk` whose entries are deflated.
    pub fn deflated_apk_bytes(fields: &ManifestFields) -> Vec<u8> {
        let manifest = binary_manifest(fields);
        deflated_zip(&[
            ("AndroidManifest.xml", manifest.as_slice()),
            ("classes.dex", b"dex\n035\0".as_slice()),
        ])
    }

    /// Descriptor for a release whose assets live under `dir`.
    ///
    /// Paths point at `media/` and `build/` but nothing is written.
    pub fn release_config(dir: &Path) -> ReleaseConfig {
        let media = dir.join("media");
        ReleaseConfig {
            publisher: PublisherInfo {
                name: "Bluefoot Labs".to_string(),
                email: "support@monkemob.me".to_string(),
                website: "https://monkemob.me".to_string(),
                support_email: None,
            },
            app: AppInfo {
                name: "MonkeMob".to_string(),
                package_id: PACKAGE.to_string(),
                short_description: "Join the mob".to_string(),
                long_description: "A community-driven collection for the mob.".to_string(),
                new_in_version: "First release".to_string(),
                saga_features: None,
            },
            urls: PolicyUrls {
                license: "https://monkemob.me/license".to_string(),
                copyright: "https://monkemob.me/copyright".to_string(),
                privacy_policy: "https://monkemob.me/privacy".to_string(),
                website: "https://monkemob.me".to_string(),
            },
            assets: AssetRefs {
                icon: media.join("icon.png"),
                banner: Some(media.join("banner.png")),
                screenshots: (1..=4)
                    .map(|i| media.join(format!("screenshot{}.png", i)))
                    .collect::<Vec<PathBuf>>(),
                apk: dir.join("build").join("app-release.apk"),
            },
            category: "Games".to_string(),
            google_play_package: None,
            testing_instructions: "App ready for testing".to_string(),
            rpc_url: crate::config::DEFAULT_RPC_URL.to_string(),
            wallet_public_key: WALLET.to_string(),
        }
    }

    /// Write a complete, valid release under `dir` and return its descriptor.
    pub fn write_release(dir: &Path) -> io::Result<ReleaseConfig> {
        let config = release_config(dir);
        write_png(&config.assets.icon, 512, 512)?;
        if let Some(banner) = &config.assets.banner {
            write_png(banner, 1200, 600)?;
        }
        for shot in &config.assets.screenshots {
            write_png(shot, 1080, 1920)?;
        }
        if let Some(parent) = config.assets.apk.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &config.assets.apk,
            apk_bytes(&ManifestFields::for_package(PACKAGE)),
        )?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::package::ApkInspector;

    #[test]
    fn written_release_is_inspectable() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();
        let info = ApkInspector.inspect(&config.assets.apk).unwrap();
        assert_eq!(info.package_id, PACKAGE);
        assert_eq!(info.version_code, 12);
    }

    #[tokio::test]
    async fn recording_uploader_scripts_failures() {
        let uploader = RecordingUploader::new("https://arweave.net/").failing_on("bad.png");
        let ok = uploader
            .upload(UploadRequest::new("good.png", "image/png", vec![1]))
            .await
            .unwrap();
        let err = uploader
            .upload(UploadRequest::new("bad.png", "image/png", vec![2]))
            .await
            .unwrap_err();

        assert_eq!(ok, "https://arweave.net/tx1");
        assert!(matches!(err, UploadError::Status { status: 500, .. }));
        assert_eq!(uploader.calls(), vec!["good.png", "bad.png"]);
    }

    #[test]
    fn recording_progress_collapses_stage_runs() {
        let sink = RecordingProgress::new();
        sink.report(WorkflowProgress::new("upload", "a", 10));
        sink.report(WorkflowProgress::new("upload", "b", 20));
        sink.report(WorkflowProgress::new("metadata", "c", 60));
        assert_eq!(sink.stages(), vec!["upload", "metadata"]);
        assert_eq!(sink.numerators(), vec![10, 20, 60]);
    }
}
