//! Translates a user request into a listable view: available versions,
//! modules, architectures, extensions, archive basenames, or tool variants.
//!
//! Two upstream data sources feed these views: the top-level HTML directory
//! listing (for versions/extensions/tool folder names) and the per-version
//! `Updates.xml` catalog (for modules/architectures/archives).

use std::cmp::Ordering;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::{
    archive_id::{ArchiveId, Category, Host},
    http::{HttpClient, HttpError},
    updates::{Updates, UpdatesError},
    version::{Spec, Version, VersionError},
};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Updates(#[from] UpdatesError),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{extension} is not a valid extension for {arch} on Qt {major}")]
    InvalidExtension { extension: String, arch: String, major: u64 },
    #[error("no versions found under {0}")]
    NoVersionsFound(String),
}

/// Every Qt minor line, grouped, mirroring upstream's `Versions` container.
#[derive(Debug, Default)]
pub struct Versions {
    /// Outer vec grouped by minor, inner vec sorted ascending by patch.
    pub minor_groups: Vec<Vec<Version>>,
}

impl Versions {
    pub fn flat(&self) -> impl Iterator<Item = &Version> {
        self.minor_groups.iter().flatten()
    }

    pub fn latest(&self) -> Option<&Version> {
        self.minor_groups.last().and_then(|group| group.last())
    }

    pub fn filter(&self, spec: &Spec) -> Versions {
        let minor_groups = self
            .minor_groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .filter(|v| spec.match_version(v))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|group: &Vec<Version>| !group.is_empty())
            .collect();
        Versions { minor_groups }
    }
}

/// Decodes a catalog folder suffix (`qt<maj>_<digits>[_<ext>]`) into a
/// `Version`. `digits` must be all-ASCII-digit and non-empty.
pub fn get_semantic_version(digits: &str, is_preview: bool) -> Result<Version, VersionError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidVersion(digits.to_owned()));
    }

    if is_preview {
        let major: u64 = digits[..1].parse().map_err(|_| VersionError::InvalidVersion(digits.to_owned()))?;
        let minor: u64 = digits[1..].parse().map_err(|_| VersionError::InvalidVersion(digits.to_owned()))?;
        return Ok(Version {
            major,
            minor,
            patch: 0,
            prerelease: Some("preview".to_owned()),
            build: None,
        });
    }

    match digits.len() {
        1 => Ok(Version::new(digits.parse().unwrap_or(0), 0, 0)),
        2 => {
            let major: u64 = digits[..1].parse().unwrap();
            let minor: u64 = digits[1..].parse().unwrap();
            Ok(Version::new(major, minor, 0))
        }
        3 => {
            let major: u64 = digits[..1].parse().unwrap();
            let minor: u64 = digits[1..2].parse().unwrap();
            let patch: u64 = digits[2..].parse().unwrap();
            Ok(Version::new(major, minor, patch))
        }
        _ => {
            let major: u64 = digits[..1].parse().unwrap();
            let minor: u64 = digits[1..3].parse().unwrap();
            let patch: u64 = digits[3..].parse().unwrap_or(0);
            Ok(Version::new(major, minor, patch))
        }
    }
}

/// Validates that `extension` is legal for `version`/`arch`, per the
/// Android-Qt6 and wasm rules.
pub fn validate_extension(version: &Version, arch: &str, extension: &str) -> Result<(), MetadataError> {
    const ANDROID_EXTENSIONS: &[&str] = &["x86_64", "x86", "armv7", "arm64_v8a"];

    let is_android_qt6 = arch.starts_with("android") && version.major >= 6;
    if is_android_qt6 && !ANDROID_EXTENSIONS.contains(&extension) {
        return Err(MetadataError::InvalidExtension {
            extension: extension.to_owned(),
            arch: arch.to_owned(),
            major: version.major,
        });
    }
    if ANDROID_EXTENSIONS.contains(&extension) && !is_android_qt6 {
        return Err(MetadataError::InvalidExtension {
            extension: extension.to_owned(),
            arch: arch.to_owned(),
            major: version.major,
        });
    }
    if extension == "wasm" {
        let in_legacy_range: Spec = ">=5.13,<6".parse().expect("valid spec");
        let in_qt6_range: Spec = ">=6.2".parse().expect("valid spec");
        let desktop_ok = arch == "desktop"
            && (in_legacy_range.match_version(version) || in_qt6_range.match_version(version));
        if !desktop_ok {
            return Err(MetadataError::InvalidExtension {
                extension: extension.to_owned(),
                arch: arch.to_owned(),
                major: version.major,
            });
        }
    }
    Ok(())
}

pub struct MetadataFactory<'a> {
    client: &'a HttpClient,
    base_url: &'a Url,
}

impl<'a> MetadataFactory<'a> {
    pub fn new(client: &'a HttpClient, base_url: &'a Url) -> Self {
        Self { client, base_url }
    }

    /// Fetches and parses the Apache/nginx-style autoindex HTML page listing
    /// subfolders under `dir`, returning the raw folder names (hrefs,
    /// trailing slash stripped) that start with `prefix`.
    async fn list_directory(&self, dir: &str, prefix: &str) -> Result<Vec<String>, MetadataError> {
        let url = self.base_url.join(dir)?;
        let body = self.client.get_text(&url).await?;
        Ok(parse_autoindex(&body, prefix))
    }

    pub async fn fetch_versions(
        &self,
        host: Host,
        target: &str,
        extension: &str,
    ) -> Result<Versions, MetadataError> {
        let archive_id = ArchiveId::new(Category::Qt, host, target, extension)
            .map_err(|e| MetadataError::InvalidExtension {
                extension: e.to_string(),
                arch: target.to_owned(),
                major: 0,
            })?;

        let folders = self.list_directory(&archive_id.repo_url_dir(), "qt").await?;
        let version_re = Regex::new(r"^qt(\d)_(\d+)(?:_(preview))?$").expect("valid regex");

        let mut versions = Vec::new();
        for folder in folders {
            let Some(caps) = version_re.captures(&folder) else {
                continue;
            };
            let digits = &caps[2];
            let is_preview = caps.get(3).is_some();
            if let Ok(version) = get_semantic_version(digits, is_preview) {
                versions.push(version);
            }
        }

        if versions.is_empty() {
            return Err(MetadataError::NoVersionsFound(archive_id.repo_url_dir()));
        }

        versions.sort();
        let mut minor_groups: Vec<Vec<Version>> = Vec::new();
        for version in versions {
            match minor_groups
                .last_mut()
                .filter(|group: &&mut Vec<Version>| group[0].major == version.major && group[0].minor == version.minor)
            {
                Some(group) => group.push(version),
                None => minor_groups.push(vec![version]),
            }
        }

        Ok(Versions { minor_groups })
    }

    pub async fn fetch_latest_version(
        &self,
        host: Host,
        target: &str,
        extension: &str,
        spec: Option<&Spec>,
    ) -> Result<Version, MetadataError> {
        let versions = self.fetch_versions(host, target, extension).await?;
        let filtered = match spec {
            Some(spec) => versions.filter(spec),
            None => versions,
        };
        filtered
            .latest()
            .cloned()
            .ok_or_else(|| MetadataError::NoVersionsFound(target.to_owned()))
    }

    async fn updates_for(
        &self,
        host: Host,
        target: &str,
        version: &Version,
        extension: &str,
    ) -> Result<Updates, MetadataError> {
        let archive_id = ArchiveId::new(Category::Qt, host, target, extension)
            .map_err(|e| MetadataError::InvalidExtension {
                extension: e.to_string(),
                arch: target.to_owned(),
                major: version.major,
            })?;
        let folder = format!("{}{}", archive_id.repo_url_dir(), archive_id.folder_name(version));
        let url = self.base_url.join(&format!("{folder}/Updates.xml"))?;
        let xml = self.client.get_text(&url).await?;
        Ok(Updates::parse(&xml)?)
    }

    pub async fn fetch_architectures(
        &self,
        host: Host,
        target: &str,
        version: &Version,
    ) -> Result<Vec<String>, MetadataError> {
        let updates = self.updates_for(host, target, version, "").await?;
        let vstr = crate::archive_id::QtRepoProperty::version_str(version);
        let mut archs: Vec<String> = updates
            .iter()
            .filter_map(|pkg| {
                let parts: Vec<&str> = pkg.name.split('.').collect();
                if parts.len() >= 2 && parts[parts.len() - 2] == vstr {
                    Some(parts[parts.len() - 1].to_owned())
                } else {
                    None
                }
            })
            .collect();
        archs.sort();
        archs.dedup();
        Ok(archs)
    }

    pub async fn fetch_modules(
        &self,
        host: Host,
        target: &str,
        version: &Version,
        arch: &str,
    ) -> Result<Vec<String>, MetadataError> {
        let updates = self.updates_for(host, target, version, "").await?;
        let vstr = crate::archive_id::QtRepoProperty::version_str(version);
        let base_names = [
            format!("qt.qt{}.{vstr}.{arch}", version.major),
            format!("qt.{vstr}.{arch}"),
        ];

        let mut modules: Vec<String> = updates
            .iter()
            .filter(|pkg| pkg.name.ends_with(&format!(".{arch}")) && !base_names.contains(&pkg.name))
            .filter_map(|pkg| {
                let prefix = format!("qt.qt{}.{vstr}.", version.major);
                let alt_prefix = format!("qt.{vstr}.");
                let suffix = pkg
                    .name
                    .strip_prefix(&prefix)
                    .or_else(|| pkg.name.strip_prefix(&alt_prefix))?;
                let module = suffix.strip_suffix(&format!(".{arch}"))?;
                Some(module.strip_prefix("addons.").unwrap_or(module).to_owned())
            })
            .collect();
        modules.sort();
        modules.dedup();
        Ok(modules)
    }

    pub async fn fetch_archives(
        &self,
        host: Host,
        target: &str,
        version: &Version,
        arch: &str,
        modules: Option<&[String]>,
    ) -> Result<Vec<String>, MetadataError> {
        let updates = self.updates_for(host, target, version, "").await?;
        let mut archives: Vec<String> = updates
            .iter()
            .filter(|pkg| pkg.name.ends_with(&format!(".{arch}")))
            .filter(|pkg| match modules {
                Some(wanted) => wanted.iter().any(|m| pkg.name.contains(m.as_str())),
                None => true,
            })
            .flat_map(|pkg| pkg.downloadable_archives.iter().cloned())
            .collect();
        archives.sort();
        archives.dedup();
        Ok(archives)
    }

    /// Module-name listing for the sources/docs/examples tree. Upstream only
    /// exposes this for the `doc` and `examples` flavors — `src` has no
    /// sub-module breakdown worth listing, only archives (`fetch_sde_archives`).
    pub async fn fetch_sde_modules(
        &self,
        host: Host,
        target: &str,
        version: &Version,
        flavor: crate::resolver::SrcDocFlavor,
    ) -> Result<Vec<String>, MetadataError> {
        debug_assert!(
            !matches!(flavor, crate::resolver::SrcDocFlavor::Src),
            "src has no module breakdown, use fetch_sde_archives instead"
        );
        let updates = self.updates_for(host, target, version, "src_doc_examples").await?;
        let suffix = sde_suffix(flavor);
        let vstr = crate::archive_id::QtRepoProperty::version_str(version);
        let base_name = format!("qt.qt{}.{vstr}.{suffix}", version.major);
        let prefix = format!("{base_name}.");

        let mut modules: Vec<String> = updates
            .iter()
            .filter(|pkg| pkg.name != base_name)
            .filter_map(|pkg| pkg.name.strip_prefix(&prefix).map(str::to_owned))
            .collect();
        modules.sort();
        modules.dedup();
        Ok(modules)
    }

    /// Archive-basename listing for the sources/docs/examples tree, open to
    /// all three flavors including `src`.
    pub async fn fetch_sde_archives(
        &self,
        host: Host,
        target: &str,
        version: &Version,
        flavor: crate::resolver::SrcDocFlavor,
        modules: Option<&[String]>,
    ) -> Result<Vec<String>, MetadataError> {
        let updates = self.updates_for(host, target, version, "src_doc_examples").await?;
        let suffix = sde_suffix(flavor);

        let mut archives: Vec<String> = updates
            .iter()
            .filter(|pkg| pkg.name.contains(&format!(".{suffix}")))
            .filter(|pkg| match modules {
                Some(wanted) => wanted.iter().any(|m| pkg.name.contains(m.as_str())),
                None => true,
            })
            .flat_map(|pkg| pkg.downloadable_archives.iter().cloned())
            .collect();
        archives.sort();
        archives.dedup();
        Ok(archives)
    }

    pub async fn fetch_tools(&self, host: Host) -> Result<Vec<String>, MetadataError> {
        let archive_id = ArchiveId::new(Category::Tools, host, "desktop", "")
            .map_err(|_| MetadataError::NoVersionsFound("tools".to_owned()))?;
        self.list_directory(&archive_id.repo_url_dir(), "tools").await
    }

    pub async fn fetch_tool_variants(
        &self,
        host: Host,
        tool_name: &str,
    ) -> Result<Updates, MetadataError> {
        let archive_id = ArchiveId::new(Category::Tools, host, "desktop", "")
            .map_err(|_| MetadataError::NoVersionsFound(tool_name.to_owned()))?;
        let url = self
            .base_url
            .join(&format!("{}{tool_name}/Updates.xml", archive_id.repo_url_dir()))?;
        let xml = self.client.get_text(&url).await?;
        Ok(Updates::parse(&xml)?)
    }

    /// Among tool variants whose permissively-parsed version satisfies
    /// `spec`, returns the variant name with the highest version. Ties are
    /// broken by catalog order (first one wins), which is deterministic for
    /// a fixed catalog.
    pub fn choose_highest_version_in_spec<'u>(
        updates: &'u Updates,
        spec: &Spec,
    ) -> Option<&'u str> {
        updates
            .iter()
            .filter_map(|pkg| pkg.version().ok().map(|v| (pkg, v)))
            .filter(|(_, v)| spec.match_version(v))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .map(|(pkg, _)| pkg.name.as_str())
    }
}

fn sde_suffix(flavor: crate::resolver::SrcDocFlavor) -> &'static str {
    match flavor {
        crate::resolver::SrcDocFlavor::Src => "src",
        crate::resolver::SrcDocFlavor::Doc => "doc",
        crate::resolver::SrcDocFlavor::Examples => "examples",
    }
}

/// Extracts `<a href="...">` targets from a directory-listing HTML page,
/// skipping `Parent Directory` and anything not starting with `prefix`.
fn parse_autoindex(body: &str, prefix: &str) -> Vec<String> {
    let href_re = Regex::new(r#"href="([^"/?][^"]*)/?""#).expect("valid regex");
    href_re
        .captures_iter(body)
        .map(|caps| caps[1].trim_end_matches('/').to_owned())
        .filter(|name| name.starts_with(prefix) && !name.eq_ignore_ascii_case("parent directory"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_version_three_digits() {
        let v = get_semantic_version("5150", false).unwrap();
        assert_eq!(v, Version::new(5, 15, 0));
    }

    #[test]
    fn semantic_version_two_digits_splits_major_minor() {
        let v = get_semantic_version("59", false).unwrap();
        assert_eq!(v, Version::new(5, 9, 0));
    }

    #[test]
    fn semantic_version_preview() {
        let v = get_semantic_version("614", true).unwrap();
        assert_eq!(v.major, 6);
        assert_eq!(v.minor, 14);
        assert!(v.is_preview());
    }

    #[test]
    fn android_qt6_requires_abi_extension() {
        assert!(validate_extension(&Version::new(6, 1, 0), "android_armv7", "armv7").is_ok());
        assert!(validate_extension(&Version::new(6, 1, 0), "android_armv7", "").is_err());
        assert!(validate_extension(&Version::new(5, 15, 0), "android_armv7", "armv7").is_err());
    }

    #[test]
    fn wasm_requires_supported_desktop_range() {
        assert!(validate_extension(&Version::new(6, 2, 0), "desktop", "wasm").is_ok());
        assert!(validate_extension(&Version::new(6, 0, 0), "desktop", "wasm").is_err());
    }

    #[test]
    fn parses_apache_autoindex() {
        let body = indoc::indoc! {r#"
            <tr><td><a href="../">Parent Directory</a></td></tr>
            <tr><td><a href="qt5_5150/">qt5_5150/</a></td></tr>
            <tr><td><a href="qt5_5150_src_doc_examples/">qt5_5150_src_doc_examples/</a></td></tr>
        "#};
        let names = parse_autoindex(body, "qt5");
        assert_eq!(names, vec!["qt5_5150", "qt5_5150_src_doc_examples"]);
    }
}
