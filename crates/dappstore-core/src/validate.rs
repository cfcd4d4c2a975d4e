//! Release descriptor validation.
//!
//! Evaluates a [`ReleaseConfig`] against a list of [`ValidationRule`]s and
//! returns a [`ValidationOutcome`]. Every rule runs (fail-slow), so the caller
//! sees the complete defect list in one pass. The only I/O is one read per
//! referenced asset to check existence and header dimensions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::config::ReleaseConfig;
use crate::imaging::{read_dimensions, Dimensions};
use crate::package::{ApkInspector, PackageInspector};

/// Required icon size.
pub const ICON_SIZE: Dimensions = Dimensions {
    width: 512,
    height: 512,
};
/// Required banner size.
pub const BANNER_SIZE: Dimensions = Dimensions {
    width: 1200,
    height: 600,
};
/// Minimum screenshot edge, applied to both axes.
pub const MIN_SCREENSHOT_EDGE: u32 = 1080;
pub const MIN_SCREENSHOTS: usize = 4;
/// Token name limit on chain.
pub const MAX_APP_NAME_CHARS: usize = 32;
pub const MAX_SHORT_DESCRIPTION_CHARS: usize = 30;

static PACKAGE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)+$").expect("static regex")
});
static BASE58_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("static regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));
static HTTPS_URL: Lazy<Regex> = Lazy::new(|| {
    // Host is any run without separators, so IDN hosts pass unencoded.
    Regex::new(r"^https://[^\s/?#:@\[\]]+(:\d{1,5})?([/?#]\S*)?$")
        .expect("static regex")
});

/// A single validation rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// Names and descriptions must be non-blank.
    RequiredText,
    /// App name and short description length limits.
    TextLimits,
    /// Publisher email and website syntax.
    PublisherContact,
    /// License, copyright, privacy and website URLs must be `https`.
    PolicyUrls,
    /// Reverse-domain package identifier.
    PackageId,
    Icon,
    /// Optional banner; absence is only a warning.
    Banner,
    Screenshots,
    /// Package binary presence, extension and embedded package id.
    PackageBinary,
    /// Publisher public key shape (base58, 32 to 44 characters).
    WalletKey,
}

impl ValidationRule {
    /// Every rule, in evaluation order.
    pub fn all() -> Vec<ValidationRule> {
        vec![
            ValidationRule::RequiredText,
            ValidationRule::TextLimits,
            ValidationRule::PublisherContact,
            ValidationRule::PolicyUrls,
            ValidationRule::PackageId,
            ValidationRule::Icon,
            ValidationRule::Banner,
            ValidationRule::Screenshots,
            ValidationRule::PackageBinary,
            ValidationRule::WalletKey,
        ]
    }
}

/// Errors block publishing; warnings never do.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validates release descriptors before any network call.
#[derive(Clone)]
pub struct ConfigValidator {
    rules: Vec<ValidationRule>,
    inspector: Arc<dyn PackageInspector>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::standard(Arc::new(ApkInspector))
    }
}

impl ConfigValidator {
    /// All rules, with the given package inspector.
    pub fn standard(inspector: Arc<dyn PackageInspector>) -> Self {
        Self {
            rules: ValidationRule::all(),
            inspector,
        }
    }

    /// Only the given rules.
    pub fn with_rules(rules: Vec<ValidationRule>, inspector: Arc<dyn PackageInspector>) -> Self {
        Self { rules, inspector }
    }

    pub fn validate(&self, config: &ReleaseConfig) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        for rule in &self.rules {
            self.check_rule(*rule, config, &mut outcome);
        }
        for w in &outcome.warnings {
            warn!(warning = %w, "validation warning");
        }
        outcome
    }

    fn check_rule(&self, rule: ValidationRule, config: &ReleaseConfig, out: &mut ValidationOutcome) {
        match rule {
            ValidationRule::RequiredText => check_required_text(config, out),
            ValidationRule::TextLimits => check_text_limits(config, out),
            ValidationRule::PublisherContact => check_publisher_contact(config, out),
            ValidationRule::PolicyUrls => check_policy_urls(config, out),
            ValidationRule::PackageId => {
                if !PACKAGE_ID.is_match(&config.app.package_id) {
                    out.error("Invalid Android package name");
                }
            }
            ValidationRule::Icon => check_icon(&config.assets.icon, out),
            ValidationRule::Banner => check_banner(config.assets.banner.as_deref(), out),
            ValidationRule::Screenshots => check_screenshots(&config.assets.screenshots, out),
            ValidationRule::PackageBinary => self.check_package_binary(config, out),
            ValidationRule::WalletKey => {
                if !BASE58_KEY.is_match(&config.wallet_public_key) {
                    out.error("Invalid Solana wallet public key");
                }
            }
        }
    }

    fn check_package_binary(&self, config: &ReleaseConfig, out: &mut ValidationOutcome) {
        let apk = &config.assets.apk;
        if !apk.is_file() {
            out.error("APK file not found");
            return;
        }
        let is_apk = apk
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("apk"));
        if !is_apk {
            out.error("APK file must have .apk extension");
            return;
        }

        match self.inspector.inspect(apk) {
            Ok(info) if info.package_id != config.app.package_id => out.error(format!(
                "APK package ({}) doesn't match config ({})",
                info.package_id, config.app.package_id
            )),
            Ok(_) => {}
            Err(e) => {
                warn!(apk = %apk.display(), error = %e, "package inspection failed");
                out.warning("Could not extract APK metadata - ensure it's a valid APK");
            }
        }
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn check_required_text(config: &ReleaseConfig, out: &mut ValidationOutcome) {
    let required = [
        (&config.publisher.name, "Publisher name is required"),
        (&config.app.name, "App name is required"),
        (&config.app.short_description, "Short description is required"),
        (&config.app.long_description, "Long description is required"),
        (&config.app.new_in_version, "What's new text is required"),
    ];
    for (value, message) in required {
        if is_blank(value) {
            out.error(message);
        }
    }
}

fn check_text_limits(config: &ReleaseConfig, out: &mut ValidationOutcome) {
    if config.app.name.chars().count() > MAX_APP_NAME_CHARS {
        out.error("App name must be 32 characters or less (Metaplex limit)");
    }
    if config.app.short_description.chars().count() > MAX_SHORT_DESCRIPTION_CHARS {
        out.error("Short description must be 30 characters or less");
    }
}

fn check_publisher_contact(config: &ReleaseConfig, out: &mut ValidationOutcome) {
    if !EMAIL.is_match(config.publisher.email.trim()) {
        out.error("Invalid publisher email");
    }
    if let Some(support) = config.publisher.support_email.as_deref() {
        if !is_blank(support) && !EMAIL.is_match(support.trim()) {
            out.error("Invalid support email");
        }
    }
    if !HTTPS_URL.is_match(&config.publisher.website) {
        out.error("Invalid publisher website URL");
    }
}

fn check_policy_urls(config: &ReleaseConfig, out: &mut ValidationOutcome) {
    let urls = [
        (&config.urls.license, "Invalid license URL"),
        (&config.urls.copyright, "Invalid copyright URL"),
        (&config.urls.privacy_policy, "Invalid privacy policy URL"),
        (&config.urls.website, "Invalid website URL"),
    ];
    for (url, message) in urls {
        if !HTTPS_URL.is_match(url) {
            out.error(message);
        }
    }
}

/// Existence plus header check; `None` once an error has been recorded.
fn inspect_asset(path: &Path, label: &str, out: &mut ValidationOutcome) -> Option<Dimensions> {
    if !path.is_file() {
        out.error(format!("{} file not found", capitalize(label)));
        return None;
    }
    match read_dimensions(path) {
        Ok(dims) => Some(dims),
        Err(_) => {
            out.error(format!("Cannot read {} dimensions", label));
            None
        }
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn check_icon(path: &Path, out: &mut ValidationOutcome) {
    if let Some(dims) = inspect_asset(path, "icon", out) {
        if dims != ICON_SIZE {
            out.error("Icon must be exactly 512x512px");
        }
    }
}

fn check_banner(path: Option<&Path>, out: &mut ValidationOutcome) {
    let Some(path) = path else {
        out.warning("Banner is recommended (1200x600px)");
        return;
    };
    if let Some(dims) = inspect_asset(path, "banner", out) {
        if dims != BANNER_SIZE {
            out.error("Banner must be 1200x600px");
        }
    }
}

fn check_screenshots(paths: &[std::path::PathBuf], out: &mut ValidationOutcome) {
    if paths.len() < MIN_SCREENSHOTS {
        out.error("At least 4 screenshots are required");
    }
    for (i, path) in paths.iter().enumerate() {
        let label = format!("screenshot {}", i + 1);
        if let Some(dims) = inspect_asset(path, &label, out) {
            if dims.width < MIN_SCREENSHOT_EDGE || dims.height < MIN_SCREENSHOT_EDGE {
                out.error(format!(
                    "Screenshot {} must be at least 1080px in both width and height",
                    i + 1
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fixtures::{release_config, write_release, WALLET};
    use crate::fakes::FixedInspector;
    use crate::package::PackageInfo;

    fn text_only() -> ConfigValidator {
        ConfigValidator::with_rules(
            vec![
                ValidationRule::RequiredText,
                ValidationRule::TextLimits,
                ValidationRule::PublisherContact,
                ValidationRule::PolicyUrls,
                ValidationRule::PackageId,
                ValidationRule::WalletKey,
            ],
            Arc::new(FixedInspector::failing()),
        )
    }

    #[test]
    fn well_formed_text_passes() {
        let config = release_config(Path::new("/nowhere"));
        let outcome = text_only().validate(&config);
        assert!(outcome.is_valid(), "{:?}", outcome.errors);
    }

    #[test]
    fn text_failures_accumulate() {
        let mut config = release_config(Path::new("/nowhere"));
        config.publisher.name = "  ".to_string();
        config.app.name = "An App Name That Is Far Too Long To Mint".to_string();
        config.app.short_description = "This short description is longer than allowed".to_string();
        config.urls.privacy_policy = "http://monkemob.me/privacy".to_string();

        let outcome = text_only().validate(&config);
        assert_eq!(
            outcome.errors,
            vec![
                "Publisher name is required",
                "App name must be 32 characters or less (Metaplex limit)",
                "Short description must be 30 characters or less",
                "Invalid privacy policy URL",
            ]
        );
    }

    #[test]
    fn package_id_must_be_reverse_domain() {
        for bad in ["monkemob", "me.1monke", "me..twa", ".me.twa", "me.twa-app"] {
            let mut config = release_config(Path::new("/nowhere"));
            config.app.package_id = bad.to_string();
            let outcome = text_only().validate(&config);
            assert_eq!(outcome.errors, vec!["Invalid Android package name"], "{}", bad);
        }
        assert!(PACKAGE_ID.is_match("_me.monke_mob.twa2"));
    }

    #[test]
    fn wallet_key_alphabet_and_length() {
        assert!(BASE58_KEY.is_match(WALLET));
        assert!(!BASE58_KEY.is_match("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"));
        assert!(!BASE58_KEY.is_match("GGVjQqnriuUdeLPo"));
    }

    #[test]
    fn urls_require_encrypted_scheme() {
        assert!(HTTPS_URL.is_match("https://monkemob.me/license?v=2"));
        assert!(HTTPS_URL.is_match("https://localhost:8443"));
        assert!(!HTTPS_URL.is_match("http://monkemob.me"));
        assert!(!HTTPS_URL.is_match("https://"));
        assert!(!HTTPS_URL.is_match("ftp://monkemob.me"));
    }

    #[test]
    fn urls_allow_query_fragment_and_idn_hosts() {
        assert!(HTTPS_URL.is_match("https://monkemob.me?v=2"));
        assert!(HTTPS_URL.is_match("https://monkemob.me#privacy"));
        assert!(HTTPS_URL.is_match("https://bücher.example/licence"));
        assert!(HTTPS_URL.is_match("https://xn--bcher-kva.example:443?lang=de"));
        assert!(!HTTPS_URL.is_match("https://monkemob.me:port"));
        assert!(!HTTPS_URL.is_match("https:// spaced.example"));
        assert!(!HTTPS_URL.is_match("https://?v=2"));
    }

    #[test]
    fn valid_release_on_disk_passes_with_no_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();
        let outcome = ConfigValidator::default().validate(&config);
        assert!(outcome.is_valid(), "{:?}", outcome.errors);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    }

    #[test]
    fn missing_banner_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = write_release(dir.path()).unwrap();
        config.assets.banner = None;

        let outcome = ConfigValidator::default().validate(&config);
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings, vec!["Banner is recommended (1200x600px)"]);
    }

    #[test]
    fn package_mismatch_is_an_error_but_inspection_failure_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();

        let mismatched = ConfigValidator::standard(Arc::new(FixedInspector::returning(
            PackageInfo {
                package_id: "com.other.app".to_string(),
                ..PackageInfo::default()
            },
        )))
        .validate(&config);
        assert_eq!(
            mismatched.errors,
            vec!["APK package (com.other.app) doesn't match config (me.monkemob.twa)"]
        );

        let unreadable =
            ConfigValidator::standard(Arc::new(FixedInspector::failing())).validate(&config);
        assert!(unreadable.is_valid());
        assert_eq!(
            unreadable.warnings,
            vec!["Could not extract APK metadata - ensure it's a valid APK"]
        );
    }
}
