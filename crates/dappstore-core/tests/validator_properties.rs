use std::sync::Arc;

use dappstore_core::fakes::fixtures::{
    apk_bytes, binary_manifest, deflated_apk_bytes, stored_zip, write_png, write_release,
    ManifestFields,
};
use dappstore_core::fakes::FixedInspector;
use dappstore_core::validate::{ConfigValidator, ValidationRule};

fn validator() -> ConfigValidator {
    ConfigValidator::default()
}

// ---- Icon ----

#[test]
fn icon_must_be_exactly_512_square_in_both_axes() {
    for (w, h) in [(512, 511), (513, 512), (1024, 1024), (256, 256), (512, 1024)] {
        let dir = tempfile::tempdir().unwrap();
        let config = write_release(dir.path()).unwrap();
        write_png(&config.assets.icon, w, h).unwrap();

        let outcome = validator().validate(&config);
        assert!(!outcome.is_valid(), "{}x{}", w, h);
        assert!(outcome
            .errors
            .contains(&"Icon must be exactly 512x512px".to_string()));
    }
}

#[test]
fn unreadable_icon_reports_dimensions_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    std::fs::write(&config.assets.icon, b"not an image").unwrap();

    let outcome = validator().validate(&config);
    assert_eq!(outcome.errors, vec!["Cannot read icon dimensions"]);
}

#[test]
fn missing_icon_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    std::fs::remove_file(&config.assets.icon).unwrap();

    let outcome = validator().validate(&config);
    assert_eq!(outcome.errors, vec!["Icon file not found"]);
}

// ---- Banner ----

#[test]
fn wrong_banner_size_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    write_png(config.assets.banner.as_ref().unwrap(), 1024, 500).unwrap();

    let outcome = validator().validate(&config);
    assert_eq!(outcome.errors, vec!["Banner must be 1200x600px"]);
    assert!(outcome.warnings.is_empty());
}

// ---- Screenshots ----

#[test]
fn fewer_than_four_screenshots_is_an_error() {
    for keep in 0..4 {
        let dir = tempfile::tempdir().unwrap();
        let mut config = write_release(dir.path()).unwrap();
        config.assets.screenshots.truncate(keep);

        let outcome = validator().validate(&config);
        assert!(outcome
            .errors
            .contains(&"At least 4 screenshots are required".to_string()));
    }
}

#[test]
fn screenshot_errors_are_numbered_from_one() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    write_png(&config.assets.screenshots[1], 1079, 1920).unwrap();
    std::fs::remove_file(&config.assets.screenshots[3]).unwrap();

    let outcome = validator().validate(&config);
    assert_eq!(
        outcome.errors,
        vec![
            "Screenshot 2 must be at least 1080px in both width and height",
            "Screenshot 4 file not found",
        ]
    );
}

#[test]
fn landscape_screenshots_above_minimum_pass() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    for shot in &config.assets.screenshots {
        write_png(shot, 1920, 1080).unwrap();
    }
    assert!(validator().validate(&config).is_valid());
}

// ---- Package binary ----

#[test]
fn missing_apk_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    std::fs::remove_file(&config.assets.apk).unwrap();

    let outcome = validator().validate(&config);
    assert!(!outcome.is_valid());
    assert!(outcome.errors.iter().any(|e| e.contains("APK file not found")));
}

#[test]
fn apk_extension_is_required() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_release(dir.path()).unwrap();
    let renamed = config.assets.apk.with_extension("zip");
    std::fs::rename(&config.assets.apk, &renamed).unwrap();
    config.assets.apk = renamed;

    let outcome = validator().validate(&config);
    assert_eq!(outcome.errors, vec!["APK file must have .apk extension"]);
}

#[test]
fn embedded_package_must_match_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    std::fs::write(&config.assets.apk, apk_bytes(&ManifestFields::for_package("com.other"))).unwrap();

    let outcome = validator().validate(&config);
    assert_eq!(
        outcome.errors,
        vec!["APK package (com.other) doesn't match config (me.monkemob.twa)"]
    );
}

#[test]
fn deflated_manifest_is_still_checked_against_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    let mut fields = ManifestFields::for_package("com.other.app");
    fields.version_code = 77;
    std::fs::write(&config.assets.apk, deflated_apk_bytes(&fields)).unwrap();

    let outcome = validator().validate(&config);
    assert_eq!(
        outcome.errors,
        vec!["APK package (com.other.app) doesn't match config (me.monkemob.twa)"]
    );
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
}

#[test]
fn hostile_string_pool_only_warns_and_other_rules_still_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_release(dir.path()).unwrap();
    config.app.name = String::new();

    let mut manifest = binary_manifest(&ManifestFields::for_package("me.monkemob.twa"));
    manifest[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
    std::fs::write(
        &config.assets.apk,
        stored_zip(&[("AndroidManifest.xml", manifest.as_slice())]),
    )
    .unwrap();

    let outcome = validator().validate(&config);
    assert_eq!(outcome.errors, vec!["App name is required"]);
    assert_eq!(
        outcome.warnings,
        vec!["Could not extract APK metadata - ensure it's a valid APK"]
    );
}

#[test]
fn garbage_apk_is_only_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_release(dir.path()).unwrap();
    std::fs::write(&config.assets.apk, b"PK but not really").unwrap();

    let outcome = validator().validate(&config);
    assert!(outcome.is_valid(), "{:?}", outcome.errors);
    assert_eq!(
        outcome.warnings,
        vec!["Could not extract APK metadata - ensure it's a valid APK"]
    );
}

// ---- Aggregation ----

#[test]
fn invalid_outcome_always_carries_errors_and_keeps_warnings_separate() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_release(dir.path()).unwrap();
    config.assets.banner = None;
    config.publisher.email = "not-an-email".to_string();
    config.wallet_public_key = "0x1234".to_string();
    config.assets.screenshots.pop();

    let outcome = validator().validate(&config);
    assert!(!outcome.is_valid());
    assert_eq!(
        outcome.errors,
        vec![
            "Invalid publisher email",
            "At least 4 screenshots are required",
            "Invalid Solana wallet public key",
        ]
    );
    assert_eq!(outcome.warnings, vec!["Banner is recommended (1200x600px)"]);
    assert!(outcome.warnings.iter().all(|w| !outcome.errors.contains(w)));
}

#[test]
fn rule_subset_only_runs_selected_checks() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_release(dir.path()).unwrap();
    config.app.name = String::new();
    std::fs::remove_file(&config.assets.icon).unwrap();

    let only_icon =
        ConfigValidator::with_rules(vec![ValidationRule::Icon], Arc::new(FixedInspector::failing()));
    assert_eq!(only_icon.validate(&config).errors, vec!["Icon file not found"]);
}
