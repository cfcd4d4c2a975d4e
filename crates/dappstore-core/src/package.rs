//! Package binary inspection.
//!
//! The validator and the metadata builder both need facts embedded in the
//! `.apk` (package id, version, SDK floor, permissions). [`PackageInspector`]
//! is the seam; [`ApkInspector`] is the default implementation and reads the
//! archive directly:
//!
//! 1. locate the zip end-of-central-directory record,
//! 2. find the `AndroidManifest.xml` entry and inflate it if deflated,
//! 3. walk the binary XML chunks and collect the attributes we care about.
//!
//! Every length and count read from the file is checked against the bytes
//! actually present before it is used.
//!
//! Inspection failures are never fatal to a run: validation reports them as a
//! warning and the metadata builder falls back to [`PackageInfo::default`].

use flate2::read::DeflateDecoder;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

/// MIME type of an Android package.
pub const APK_MIME: &str = "application/vnd.android.package-archive";

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";
/// Upper bound on an inflated manifest.
const MAX_MANIFEST_BYTES: u64 = 8 * 1024 * 1024;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;

const RES_XML_TYPE: u16 = 0x0003;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const UTF8_FLAG: u32 = 0x0100;
const NO_INDEX: u32 = 0xFFFF_FFFF;
/// Size of one `ResXMLTree_attribute`.
const ATTRIBUTE_SIZE: usize = 20;

const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;

/// Facts extracted from a package binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_id: String,
    pub version_name: String,
    pub version_code: u64,
    pub min_sdk: u32,
    pub cert_fingerprint: String,
    pub permissions: Vec<String>,
    pub locales: Vec<String>,
}

impl Default for PackageInfo {
    fn default() -> Self {
        PackageInfo {
            package_id: String::new(),
            version_name: "1.0.0".to_string(),
            version_code: 1,
            min_sdk: 24,
            cert_fingerprint: String::new(),
            permissions: Vec::new(),
            locales: vec!["en-US".to_string()],
        }
    }
}

/// Errors produced while inspecting a package binary.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("cannot read package: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a zip archive")]
    NotAnArchive,

    #[error("AndroidManifest.xml not found in archive")]
    ManifestMissing,

    #[error("AndroidManifest.xml uses unsupported compression method {0}")]
    UnsupportedCompression(u16),

    #[error("AndroidManifest.xml cannot be inflated: {0}")]
    Inflate(String),

    #[error("malformed binary manifest: {0}")]
    MalformedManifest(&'static str),

    #[error("manifest does not declare a package")]
    NoPackage,
}

/// Extracts [`PackageInfo`] from a package binary on disk.
pub trait PackageInspector: Send + Sync {
    fn inspect(&self, path: &Path) -> Result<PackageInfo, InspectError>;
}

/// Reads `AndroidManifest.xml` (stored or deflated) straight out of an `.apk`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApkInspector;

impl PackageInspector for ApkInspector {
    fn inspect(&self, path: &Path) -> Result<PackageInfo, InspectError> {
        let archive = std::fs::read(path)?;
        let manifest = read_entry(&archive, MANIFEST_ENTRY)?;
        parse_binary_manifest(&manifest)
    }
}

// ---------------------------------------------------------------------------
// Zip
// ---------------------------------------------------------------------------

fn u16_at(data: &[u8], off: usize) -> Option<u16> {
    data.get(off..off + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(data: &[u8], off: usize) -> Option<u32> {
    data.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn find_eocd(data: &[u8]) -> Option<usize> {
    if data.len() < 22 {
        return None;
    }
    // The record is 22 bytes plus a comment of at most 64 KiB.
    let floor = data.len().saturating_sub(22 + u16::MAX as usize);
    (floor..=data.len() - 22)
        .rev()
        .find(|&off| u32_at(data, off) == Some(EOCD_SIGNATURE))
}

fn read_entry<'a>(archive: &'a [u8], wanted: &str) -> Result<Cow<'a, [u8]>, InspectError> {
    let eocd = find_eocd(archive).ok_or(InspectError::NotAnArchive)?;
    let entries = u16_at(archive, eocd + 10).ok_or(InspectError::NotAnArchive)?;
    let mut pos = u32_at(archive, eocd + 16).ok_or(InspectError::NotAnArchive)? as usize;

    for _ in 0..entries {
        if u32_at(archive, pos) != Some(CENTRAL_SIGNATURE) {
            return Err(InspectError::NotAnArchive);
        }
        let field = |off: usize| u16_at(archive, pos + off).ok_or(InspectError::NotAnArchive);
        let method = field(10)?;
        let name_len = field(28)? as usize;
        let extra_len = field(30)? as usize;
        let comment_len = field(32)? as usize;
        let compressed =
            u32_at(archive, pos + 20).ok_or(InspectError::NotAnArchive)? as usize;
        let uncompressed = u32_at(archive, pos + 24).ok_or(InspectError::NotAnArchive)?;
        let local = u32_at(archive, pos + 42).ok_or(InspectError::NotAnArchive)? as usize;
        let name = archive
            .get(pos + 46..pos + 46 + name_len)
            .ok_or(InspectError::NotAnArchive)?;

        if name == wanted.as_bytes() {
            if method != METHOD_STORED && method != METHOD_DEFLATED {
                return Err(InspectError::UnsupportedCompression(method));
            }
            if u32_at(archive, local) != Some(LOCAL_SIGNATURE) {
                return Err(InspectError::NotAnArchive);
            }
            let local_name = u16_at(archive, local + 26).ok_or(InspectError::NotAnArchive)?;
            let local_extra = u16_at(archive, local + 28).ok_or(InspectError::NotAnArchive)?;
            let start = local + 30 + local_name as usize + local_extra as usize;
            let raw = start
                .checked_add(compressed)
                .and_then(|end| archive.get(start..end))
                .ok_or(InspectError::NotAnArchive)?;

            return match method {
                METHOD_STORED => Ok(Cow::Borrowed(raw)),
                _ => inflate(raw, uncompressed).map(Cow::Owned),
            };
        }

        pos += 46 + name_len + extra_len + comment_len;
    }

    Err(InspectError::ManifestMissing)
}

/// Inflate a raw deflate stream, reading at most the declared size.
fn inflate(raw: &[u8], declared: u32) -> Result<Vec<u8>, InspectError> {
    let limit = u64::from(declared).min(MAX_MANIFEST_BYTES);
    let mut out = Vec::new();
    DeflateDecoder::new(raw)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| InspectError::Inflate(e.to_string()))?;
    if out.len() as u64 != u64::from(declared) {
        return Err(InspectError::Inflate(format!(
            "expected {} bytes, got {}",
            declared,
            out.len()
        )));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Binary XML
// ---------------------------------------------------------------------------

struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    /// `data` must already be cut to the chunk's declared size.
    fn parse(data: &[u8]) -> Result<Self, InspectError> {
        let bad = || InspectError::MalformedManifest("string pool");
        let header_size = u16_at(data, 2).ok_or_else(bad)? as usize;
        let count = u32_at(data, 8).ok_or_else(bad)? as usize;
        let flags = u32_at(data, 16).ok_or_else(bad)?;
        let strings_start = u32_at(data, 20).ok_or_else(bad)? as usize;
        let utf8 = flags & UTF8_FLAG != 0;

        let offsets_end = count
            .checked_mul(4)
            .and_then(|n| n.checked_add(header_size))
            .ok_or(InspectError::MalformedManifest("string count"))?;
        if offsets_end > data.len() || strings_start > data.len() {
            return Err(InspectError::MalformedManifest("string count"));
        }

        let mut strings = Vec::new();
        for i in 0..count {
            let offset = u32_at(data, header_size + i * 4)
                .ok_or(InspectError::MalformedManifest("string offsets"))?
                as usize;
            let at = strings_start
                .checked_add(offset)
                .ok_or(InspectError::MalformedManifest("string offsets"))?;
            let s = if utf8 {
                decode_utf8(data, at)
            } else {
                decode_utf16(data, at)
            }
            .ok_or(InspectError::MalformedManifest("string data"))?;
            strings.push(s);
        }
        Ok(Self { strings })
    }

    fn get(&self, index: u32) -> Option<&str> {
        if index == NO_INDEX {
            return None;
        }
        self.strings.get(index as usize).map(String::as_str)
    }
}

fn decode_utf16(data: &[u8], at: usize) -> Option<String> {
    let mut pos = at;
    let mut len = u16_at(data, pos)? as usize;
    pos += 2;
    if len & 0x8000 != 0 {
        len = ((len & 0x7FFF) << 16) | u16_at(data, pos)? as usize;
        pos += 2;
    }
    let bytes = data.get(pos..pos.checked_add(len.checked_mul(2)?)?)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

fn decode_utf8(data: &[u8], at: usize) -> Option<String> {
    // UTF-16 length first (ignored), then UTF-8 byte length.
    let (_, pos) = read_utf8_len(data, at)?;
    let (len, pos) = read_utf8_len(data, pos)?;
    let bytes = data.get(pos..pos.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

fn read_utf8_len(data: &[u8], at: usize) -> Option<(usize, usize)> {
    let first = *data.get(at)? as usize;
    if first & 0x80 == 0 {
        return Some((first, at + 1));
    }
    let second = *data.get(at + 1)? as usize;
    Some((((first & 0x7F) << 8) | second, at + 2))
}

fn parse_binary_manifest(data: &[u8]) -> Result<PackageInfo, InspectError> {
    if u16_at(data, 0) != Some(RES_XML_TYPE) {
        return Err(InspectError::MalformedManifest("missing XML header"));
    }
    let header_size =
        u16_at(data, 2).ok_or(InspectError::MalformedManifest("missing XML header"))? as usize;

    let mut info = PackageInfo::default();
    let mut pool: Option<StringPool> = None;
    let mut saw_package = false;
    let mut pos = header_size;

    while pos + 8 <= data.len() {
        let kind = u16_at(data, pos).ok_or(InspectError::MalformedManifest("chunk"))?;
        let chunk_header =
            u16_at(data, pos + 2).ok_or(InspectError::MalformedManifest("chunk"))? as usize;
        let chunk_size =
            u32_at(data, pos + 4).ok_or(InspectError::MalformedManifest("chunk"))? as usize;
        let chunk = pos
            .checked_add(chunk_size)
            .and_then(|end| data.get(pos..end))
            .filter(|_| chunk_size >= 8 && chunk_header <= chunk_size)
            .ok_or(InspectError::MalformedManifest("chunk size"))?;

        match kind {
            RES_STRING_POOL_TYPE => pool = Some(StringPool::parse(chunk)?),
            RES_XML_START_ELEMENT_TYPE => {
                let pool = pool
                    .as_ref()
                    .ok_or(InspectError::MalformedManifest("element before string pool"))?;
                let element = parse_element(&chunk[chunk_header..], pool)?;
                match element.name.as_str() {
                    "manifest" => {
                        for (name, value) in element.attributes {
                            match name.as_str() {
                                "package" => {
                                    saw_package = !value.is_empty();
                                    info.package_id = value;
                                }
                                "versionName" => info.version_name = value,
                                "versionCode" => {
                                    if let Ok(code) = value.parse() {
                                        info.version_code = code;
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    "uses-sdk" => {
                        if let Some((_, v)) =
                            element.attributes.iter().find(|(n, _)| n == "minSdkVersion")
                        {
                            if let Ok(sdk) = v.parse() {
                                info.min_sdk = sdk;
                            }
                        }
                    }
                    "uses-permission" => {
                        if let Some((_, v)) = element.attributes.into_iter().find(|(n, _)| n == "name")
                        {
                            info.permissions.push(v);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        pos += chunk_size;
    }

    if !saw_package {
        return Err(InspectError::NoPackage);
    }
    Ok(info)
}

struct Element {
    name: String,
    attributes: Vec<(String, String)>,
}

/// `data` starts at the element extension and ends with the chunk.
fn parse_element(data: &[u8], pool: &StringPool) -> Result<Element, InspectError> {
    let bad = || InspectError::MalformedManifest("start element");
    let name_idx = u32_at(data, 4).ok_or_else(bad)?;
    let attr_start = u16_at(data, 8).ok_or_else(bad)? as usize;
    let attr_size = u16_at(data, 10).ok_or_else(bad)? as usize;
    let attr_count = u16_at(data, 12).ok_or_else(bad)? as usize;

    if attr_size < ATTRIBUTE_SIZE || attr_start + attr_count * attr_size > data.len() {
        return Err(bad());
    }

    let name = pool.get(name_idx).unwrap_or_default().to_string();
    let mut attributes = Vec::new();

    for i in 0..attr_count {
        let at = attr_start + i * attr_size;
        let attr_name = u32_at(data, at + 4).ok_or_else(bad)?;
        let raw = u32_at(data, at + 8).ok_or_else(bad)?;
        let data_type = *data.get(at + 15).ok_or_else(bad)?;
        let value = u32_at(data, at + 16).ok_or_else(bad)?;

        let Some(attr_name) = pool.get(attr_name) else {
            continue;
        };
        let rendered = match (pool.get(raw), data_type) {
            (Some(s), _) => s.to_string(),
            (None, TYPE_STRING) => pool.get(value).unwrap_or_default().to_string(),
            (None, TYPE_INT_DEC) | (None, TYPE_INT_HEX) => value.to_string(),
            (None, TYPE_INT_BOOLEAN) => (value != 0).to_string(),
            (None, _) => continue,
        };
        attributes.push((attr_name.to_string(), rendered));
    }

    Ok(Element { name, attributes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fixtures::{
        apk_bytes, binary_manifest, deflated_apk_bytes, deflated_zip, stored_zip, ManifestFields,
    };

    fn fields() -> ManifestFields {
        ManifestFields {
            package: "me.monkemob.twa".to_string(),
            version_name: "2.1.0".to_string(),
            version_code: 42,
            min_sdk: 26,
            permissions: vec!["android.permission.INTERNET".to_string()],
        }
    }

    #[test]
    fn binary_manifest_yields_package_facts() {
        let info = parse_binary_manifest(&binary_manifest(&fields())).unwrap();
        assert_eq!(info.package_id, "me.monkemob.twa");
        assert_eq!(info.version_name, "2.1.0");
        assert_eq!(info.version_code, 42);
        assert_eq!(info.min_sdk, 26);
        assert_eq!(info.permissions, vec!["android.permission.INTERNET"]);
        assert_eq!(info.locales, vec!["en-US"]);
    }

    #[test]
    fn inspector_reads_stored_manifest_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app-release.apk");
        std::fs::write(&path, apk_bytes(&fields())).unwrap();

        let info = ApkInspector.inspect(&path).unwrap();
        assert_eq!(info.package_id, "me.monkemob.twa");
    }

    #[test]
    fn archive_without_manifest_is_reported() {
        let zip = stored_zip(&[("classes.dex", b"dex\n035\0".as_slice())]);
        let err = read_entry(&zip, MANIFEST_ENTRY).unwrap_err();
        assert!(matches!(err, InspectError::ManifestMissing));
    }

    #[test]
    fn non_archive_is_reported() {
        let err = read_entry(b"plain text, not a zip", MANIFEST_ENTRY).unwrap_err();
        assert!(matches!(err, InspectError::NotAnArchive));
    }

    #[test]
    fn manifest_without_package_is_rejected() {
        let mut s = fields();
        s.package = String::new();
        let err = parse_binary_manifest(&binary_manifest(&s)).unwrap_err();
        assert!(matches!(err, InspectError::NoPackage));
    }

    #[test]
    fn inspector_inflates_deflated_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app-release.apk");
        let mut s = fields();
        s.package = "com.other.app".to_string();
        s.version_code = 77;
        std::fs::write(&path, deflated_apk_bytes(&s)).unwrap();

        let info = ApkInspector.inspect(&path).unwrap();
        assert_eq!(info.package_id, "com.other.app");
        assert_eq!(info.version_code, 77);
        assert_eq!(info.min_sdk, 26);
    }

    #[test]
    fn corrupt_deflate_stream_is_an_error() {
        let manifest = binary_manifest(&fields());
        let mut zip = deflated_zip(&[("AndroidManifest.xml", manifest.as_slice())]);
        // Local header (30) + name (19): first byte of the deflate stream.
        zip[49] = 0xFF;
        let err = read_entry(&zip, MANIFEST_ENTRY).unwrap_err();
        assert!(matches!(err, InspectError::Inflate(_)));
    }

    #[test]
    fn unknown_compression_method_is_reported() {
        let mut zip = stored_zip(&[("AndroidManifest.xml", b"x".as_slice())]);
        let central = zip.len() - 22 - (46 + MANIFEST_ENTRY.len());
        zip[central + 10] = 14; // LZMA
        let err = read_entry(&zip, MANIFEST_ENTRY).unwrap_err();
        assert!(matches!(err, InspectError::UnsupportedCompression(14)));
    }

    #[test]
    fn oversized_string_count_is_malformed_not_fatal() {
        let mut manifest = binary_manifest(&fields());
        // XML header (8) + string pool count field (8).
        manifest[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = parse_binary_manifest(&manifest).unwrap_err();
        assert!(matches!(err, InspectError::MalformedManifest("string count")));
    }

    #[test]
    fn truncated_manifest_is_malformed() {
        let manifest = binary_manifest(&fields());
        let err = parse_binary_manifest(&manifest[..manifest.len() - 10]).unwrap_err();
        assert!(matches!(err, InspectError::MalformedManifest("chunk size")));
    }

    #[test]
    fn oversized_attribute_count_is_malformed() {
        let mut manifest = binary_manifest(&fields());
        let pool_size = u32::from_le_bytes(manifest[12..16].try_into().unwrap()) as usize;
        // First start element: chunk header (16) then attribute count at +12.
        let count_at = 8 + pool_size + 16 + 12;
        manifest[count_at..count_at + 2].copy_from_slice(&u16::MAX.to_le_bytes());
        let err = parse_binary_manifest(&manifest).unwrap_err();
        assert!(matches!(err, InspectError::MalformedManifest("start element")));
    }
}
