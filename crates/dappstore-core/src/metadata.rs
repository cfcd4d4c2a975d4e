//! Release metadata document.
//!
//! [`build`] is a pure function from the release descriptor, the upload
//! results and the inspected package facts to a [`ReleaseMetadataDocument`].
//! Serialization is deterministic (struct field order, `BTreeMap` for the
//! localization bucket), so two builds with identical inputs differ only in
//! `release_details.updated_on`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ReleaseConfig;
use crate::digest::ContentHash;
use crate::imaging::Dimensions;
use crate::package::{PackageInfo, APK_MIME};
use crate::upload::{UploadedAsset, UploadedAssets};
use crate::validate::{BANNER_SIZE, ICON_SIZE};

/// Metadata schema version emitted by this pipeline.
pub const SCHEMA_VERSION: &str = "v0.4.0";
/// The single locale bucket text is indirected into.
pub const LOCALE: &str = "en";

const KEY_LONG_DESCRIPTION: &str = "1";
const KEY_NEW_IN_VERSION: &str = "2";
const KEY_SAGA_FEATURES: &str = "3";
const KEY_NAME: &str = "4";
const KEY_SHORT_DESCRIPTION: &str = "5";

/// Declared size for screenshots whose header could not be read.
const FALLBACK_SCREENSHOT: Dimensions = Dimensions {
    width: 1080,
    height: 1920,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadataDocument {
    pub schema_version: String,
    pub name: String,
    pub description: String,
    /// Primary image (the icon URI).
    pub image: String,
    pub external_url: String,
    pub properties: Properties,
    pub extensions: Extensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub category: String,
    pub creators: Vec<Creator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub address: String,
    pub share: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extensions {
    pub solana_dapp_store: DappStoreExtension,
    /// locale -> localization key -> text
    pub i18n: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappStoreExtension {
    pub publisher_details: PublisherDetails,
    pub release_details: ReleaseDetails,
    pub media: Vec<MediaEntry>,
    pub files: Vec<FileEntry>,
    pub android_details: AndroidDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherDetails {
    pub name: String,
    pub website: String,
    pub contact: String,
    pub support_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDetails {
    pub updated_on: String,
    pub license_url: String,
    pub copyright_url: String,
    pub privacy_policy_url: String,
    pub localized_resources: LocalizedResources,
}

/// Field -> localization key. Values are keys into `extensions.i18n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedResources {
    pub long_description: String,
    pub new_in_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saga_features: Option<String>,
    pub name: String,
    pub short_description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPurpose {
    Icon,
    Banner,
    Screenshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub mime: String,
    pub purpose: MediaPurpose,
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub sha256: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub mime: String,
    pub purpose: String,
    pub uri: String,
    pub size: u64,
    pub sha256: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidDetails {
    pub android_package: String,
    pub version: String,
    pub version_code: u64,
    pub min_sdk: u32,
    pub cert_fingerprint: String,
    pub permissions: Vec<String>,
    pub locales: Vec<String>,
}

impl ReleaseMetadataDocument {
    /// Compact JSON, as uploaded to storage.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn updated_on(&self) -> &str {
        &self.extensions.solana_dapp_store.release_details.updated_on
    }
}

/// Build the document, stamped with the current time.
pub fn build(
    config: &ReleaseConfig,
    uploads: &UploadedAssets,
    package: &PackageInfo,
) -> ReleaseMetadataDocument {
    build_at(config, uploads, package, Utc::now())
}

/// Build the document with an explicit `updated_on` timestamp.
pub fn build_at(
    config: &ReleaseConfig,
    uploads: &UploadedAssets,
    package: &PackageInfo,
    updated_on: DateTime<Utc>,
) -> ReleaseMetadataDocument {
    let saga_features = config.saga_features();

    let mut strings = BTreeMap::new();
    strings.insert(KEY_LONG_DESCRIPTION.to_string(), config.app.long_description.clone());
    strings.insert(KEY_NEW_IN_VERSION.to_string(), config.app.new_in_version.clone());
    if let Some(features) = saga_features {
        strings.insert(KEY_SAGA_FEATURES.to_string(), features.to_string());
    }
    strings.insert(KEY_NAME.to_string(), config.app.name.clone());
    strings.insert(KEY_SHORT_DESCRIPTION.to_string(), config.app.short_description.clone());

    let mut i18n = BTreeMap::new();
    i18n.insert(LOCALE.to_string(), strings);

    let mut media = vec![media_entry(&uploads.icon, MediaPurpose::Icon, ICON_SIZE)];
    if let Some(banner) = &uploads.banner {
        media.push(media_entry(banner, MediaPurpose::Banner, BANNER_SIZE));
    }
    media.extend(
        uploads
            .screenshots
            .iter()
            .map(|s| media_entry(s, MediaPurpose::Screenshot, FALLBACK_SCREENSHOT)),
    );

    let locales = if package.locales.is_empty() {
        PackageInfo::default().locales
    } else {
        package.locales.clone()
    };

    ReleaseMetadataDocument {
        schema_version: SCHEMA_VERSION.to_string(),
        name: config.app.name.clone(),
        description: config.app.long_description.clone(),
        image: uploads.icon.uri.clone(),
        external_url: config.urls.website.clone(),
        properties: Properties {
            category: "dApp".to_string(),
            creators: vec![Creator {
                address: config.wallet_public_key.clone(),
                share: 100,
            }],
        },
        extensions: Extensions {
            solana_dapp_store: DappStoreExtension {
                publisher_details: PublisherDetails {
                    name: config.publisher.name.clone(),
                    website: config.publisher.website.clone(),
                    contact: config.publisher.email.clone(),
                    support_email: config.support_email().to_string(),
                },
                release_details: ReleaseDetails {
                    updated_on: updated_on.to_rfc3339_opts(SecondsFormat::Millis, true),
                    license_url: config.urls.license.clone(),
                    copyright_url: config.urls.copyright.clone(),
                    privacy_policy_url: config.urls.privacy_policy.clone(),
                    localized_resources: LocalizedResources {
                        long_description: KEY_LONG_DESCRIPTION.to_string(),
                        new_in_version: KEY_NEW_IN_VERSION.to_string(),
                        saga_features: saga_features.map(|_| KEY_SAGA_FEATURES.to_string()),
                        name: KEY_NAME.to_string(),
                        short_description: KEY_SHORT_DESCRIPTION.to_string(),
                    },
                },
                media,
                files: vec![FileEntry {
                    mime: APK_MIME.to_string(),
                    purpose: "install".to_string(),
                    uri: uploads.apk.uri.clone(),
                    size: uploads.apk.size,
                    sha256: uploads.apk.sha256.clone(),
                }],
                android_details: AndroidDetails {
                    android_package: config.app.package_id.clone(),
                    version: package.version_name.clone(),
                    version_code: package.version_code,
                    min_sdk: package.min_sdk,
                    cert_fingerprint: package.cert_fingerprint.clone(),
                    permissions: package.permissions.clone(),
                    locales,
                },
            },
            i18n,
        },
    }
}

fn media_entry(asset: &UploadedAsset, purpose: MediaPurpose, declared: Dimensions) -> MediaEntry {
    let dims = asset.dimensions.unwrap_or(declared);
    MediaEntry {
        mime: asset.content_type.clone(),
        purpose,
        uri: asset.uri.clone(),
        width: dims.width,
        height: dims.height,
        sha256: asset.sha256.clone(),
    }
}
