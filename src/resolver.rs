//! Turns a user request into the concrete set of archives to download.
//!
//! Upstream models this as a small class hierarchy (`QtArchives`, overridden
//! by `SrcDocExamplesArchives` and `ToolArchives`). Here the three are a
//! single `Resolver` parameterized by `Flavor`, with the handful of points
//! where upstream overrides behavior expressed as `match` arms instead.

use thiserror::Error;
use url::Url;

use crate::{
    archive_id::{ArchiveId, Host},
    http::{HttpClient, HttpError},
    module_map::ModuleToPackage,
    updates::{PackageUpdate, Updates, UpdatesError},
    version::{Version, VersionError},
};

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Updates(#[from] UpdatesError),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("no package found for requested modules: {0:?}")]
    NoPackageFound(Vec<String>),
    #[error("no tool variant '{variant}' found in {tool_name}")]
    ToolVariantNotFound { tool_name: String, variant: String },
    #[error(
        "requested tool version '{requested}' does not match catalog version '{actual}' for {variant}"
    )]
    ToolVersionMismatch {
        variant: String,
        requested: String,
        actual: String,
    },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcDocFlavor {
    Src,
    Doc,
    Examples,
}

impl SrcDocFlavor {
    fn suffix(self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::Doc => "doc",
            Self::Examples => "examples",
        }
    }
}

/// Discriminates the three resolver shapes upstream expresses as
/// subclasses.
#[derive(Debug, Clone)]
pub enum Flavor {
    Qt,
    SrcDocExamples(SrcDocFlavor),
    Tool { tool_name: String, variant: String },
}

/// A single archive to download and extract, fully addressed.
#[derive(Debug, Clone)]
pub struct QtPackage {
    pub name: String,
    pub base_url: Url,
    pub archive_path: String,
    pub archive: String,
    pub package_desc: String,
    pub pkg_update_name: String,
    pub version: Option<Version>,
}

impl QtPackage {
    pub fn url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join(&self.archive_path)
    }
}

pub struct ResolveRequest<'a> {
    pub host: Host,
    pub target: &'a str,
    pub version: &'a Version,
    pub arch: &'a str,
    pub modules: &'a [String],
    pub subarchives: Option<&'a [String]>,
    pub all_extra: bool,
    pub include_base: bool,
    pub base_url: &'a Url,
}

/// Base-package candidate names for (major, version_str, arch).
fn base_candidates(qt_major: u64, version_str: &str, arch: &str) -> Vec<String> {
    vec![
        format!("qt.qt{qt_major}.{version_str}.{arch}"),
        format!("qt.{version_str}.{arch}"),
    ]
}

fn module_candidates(qt_major: u64, version_str: &str, module: &str, arch: &str) -> Vec<String> {
    let mut out = vec![
        format!("qt.qt{qt_major}.{version_str}.{module}.{arch}"),
        format!("qt.{version_str}.{module}.{arch}"),
    ];
    if !module.starts_with("addons.") {
        out.push(format!("qt.qt{qt_major}.{version_str}.addons.{module}.{arch}"));
    }
    out
}

fn version_str(version: &Version) -> String {
    crate::archive_id::QtRepoProperty::version_str(version)
}

/// Builds the `ModuleToPackage` table for a Qt-flavor request.
fn build_module_map(req: &ResolveRequest<'_>) -> ModuleToPackage {
    let mut map = ModuleToPackage::new();
    if req.all_extra {
        return map;
    }

    let vstr = version_str(req.version);
    if req.include_base {
        map.insert(
            "qt_base",
            base_candidates(req.version.major, &vstr, req.arch),
        );
    }
    for module in req.modules {
        map.insert(
            module.clone(),
            module_candidates(req.version.major, &vstr, module, req.arch),
        );
    }
    map
}

fn is_base_package(name: &str, qt_major: u64, version_str: &str, arch: &str) -> bool {
    name == format!("qt.qt{qt_major}.{version_str}.{arch}") || name == format!("qt.{version_str}.{arch}")
}

/// Resolves the archive set for an `install-qt`-class request.
pub async fn resolve_qt(
    client: &HttpClient,
    req: ResolveRequest<'_>,
) -> Result<Vec<QtPackage>, ResolverError> {
    let vstr = version_str(req.version);
    let archive_id = ArchiveId::new(
        crate::archive_id::Category::Qt,
        req.host,
        req.target,
        crate::archive_id::QtRepoProperty::arch_ext(req.arch, req.version.major),
    )
    .map_err(|e| ResolverError::NoPackageFound(vec![e.to_string()]))?;

    let os_target_folder = format!("{}{}", archive_id.repo_url_dir(), archive_id.folder_name(req.version));
    let updates_url = req.base_url.join(&format!("{os_target_folder}/Updates.xml"))?;

    let xml = client.get_text(&updates_url).await?;
    let updates = Updates::parse(&xml)?;

    let mut module_map = build_module_map(&req);
    let mut packages = Vec::new();

    for pkg in updates.iter() {
        if !pkg.name.contains(req.arch) {
            continue;
        }
        if !req.all_extra && module_map.module_for_package(&pkg.name).is_none() {
            continue;
        }
        let base = is_base_package(&pkg.name, req.version.major, &vstr, req.arch);
        if !req.include_base && base {
            continue;
        }

        for archive in filtered_archives(pkg, req.subarchives, base) {
            packages.push(emit_package(
                pkg,
                &archive,
                &os_target_folder,
                req.base_url,
                req.version,
            )?);
        }

        module_map.remove_module_for_package(&pkg.name);
    }

    if !req.all_extra && !module_map.is_empty() {
        return Err(ResolverError::NoPackageFound(
            module_map.remaining_modules().map(String::from).collect(),
        ));
    }

    Ok(packages)
}

/// Resolves a sources/docs/examples request.
pub async fn resolve_src_doc_examples(
    client: &HttpClient,
    host: Host,
    target: &str,
    version: &Version,
    flavor: SrcDocFlavor,
    modules: &[String],
    all_extra: bool,
    base_url: &Url,
) -> Result<Vec<QtPackage>, ResolverError> {
    let vstr = version_str(version);
    let archive_id = ArchiveId::new(crate::archive_id::Category::Qt, host, target, "src_doc_examples")
        .map_err(|e| ResolverError::NoPackageFound(vec![e.to_string()]))?;
    let os_target_folder = format!("{}{}", archive_id.repo_url_dir(), archive_id.folder_name(version));
    let updates_url = base_url.join(&format!("{os_target_folder}/Updates.xml"))?;

    let xml = client.get_text(&updates_url).await?;
    let updates = Updates::parse(&xml)?;

    let mut module_map = ModuleToPackage::new();
    if !all_extra {
        module_map.insert(
            "qt_base",
            vec![format!("qt.qt{}.{vstr}.{}", version.major, flavor.suffix())],
        );
        for module in modules {
            module_map.insert(
                module.clone(),
                vec![format!("qt.qt{}.{vstr}.{}.{module}", version.major, flavor.suffix())],
            );
        }
    }

    let mut packages = Vec::new();
    for pkg in updates.iter() {
        if !pkg.name.contains(flavor.suffix()) {
            continue;
        }
        if !all_extra && module_map.module_for_package(&pkg.name).is_none() {
            continue;
        }
        for archive in filtered_archives(pkg, None, false) {
            packages.push(emit_package(pkg, &archive, &os_target_folder, base_url, version)?);
        }
        module_map.remove_module_for_package(&pkg.name);
    }

    if !all_extra && !module_map.is_empty() {
        return Err(ResolverError::NoPackageFound(
            module_map.remaining_modules().map(String::from).collect(),
        ));
    }

    Ok(packages)
}

/// Resolves a tool install request (e.g. `tools_ifw`, variant `qt.tools.ifw.41`).
pub async fn resolve_tool(
    client: &HttpClient,
    host: Host,
    tool_name: &str,
    variant: &str,
    requested_version: Option<&str>,
    base_url: &Url,
) -> Result<Vec<QtPackage>, ResolverError> {
    let archive_id = ArchiveId::new(crate::archive_id::Category::Tools, host, "desktop", "")
        .map_err(|e| ResolverError::NoPackageFound(vec![e.to_string()]))?;
    let os_target_folder = archive_id.repo_url_dir();
    let updates_url = base_url.join(&format!("{os_target_folder}{tool_name}/Updates.xml"))?;

    let xml = client.get_text(&updates_url).await?;
    let updates = Updates::parse(&xml)?;

    let pkg = updates
        .get(variant)
        .ok_or_else(|| ResolverError::ToolVariantNotFound {
            tool_name: tool_name.to_owned(),
            variant: variant.to_owned(),
        })?;

    if let Some(requested) = requested_version {
        if pkg.full_version != requested {
            return Err(ResolverError::ToolVersionMismatch {
                variant: variant.to_owned(),
                requested: requested.to_owned(),
                actual: pkg.full_version.clone(),
            });
        }
    }

    let folder = format!("{os_target_folder}{tool_name}");
    let version = pkg.version().ok();
    pkg.downloadable_archives
        .iter()
        .map(|archive| {
            Ok(QtPackage {
                name: pkg.name.clone(),
                base_url: base_url.clone(),
                archive_path: format!("{folder}/{}/{}{archive}", pkg.name, pkg.full_version),
                archive: archive.clone(),
                package_desc: pkg.display_name.clone(),
                pkg_update_name: pkg.name.clone(),
                version: version.clone(),
            })
        })
        .collect()
}

/// Applies the `--archives`/`--noarchives` sub-archive filter: when
/// `subarchives` is set, only archives whose basename before the first `-`
/// is in the set are kept, but only for base packages or packages whose
/// name contains `debug_info` (upstream's literal substring check).
fn filtered_archives(
    pkg: &PackageUpdate,
    subarchives: Option<&[String]>,
    is_base_or_debug: bool,
) -> Vec<String> {
    let is_base_or_debug = is_base_or_debug || pkg.name.contains("debug_info");
    match subarchives {
        Some(wanted) if is_base_or_debug => pkg
            .downloadable_archives
            .iter()
            .filter(|archive| {
                let prefix = archive.split('-').next().unwrap_or(archive.as_str());
                wanted.iter().any(|w| w == prefix)
            })
            .cloned()
            .collect(),
        _ => pkg.downloadable_archives.clone(),
    }
}

fn emit_package(
    pkg: &PackageUpdate,
    archive: &str,
    os_target_folder: &str,
    base_url: &Url,
    version: &Version,
) -> Result<QtPackage, ResolverError> {
    Ok(QtPackage {
        name: pkg.name.clone(),
        base_url: base_url.clone(),
        archive_path: format!("{os_target_folder}/{}/{}{archive}", pkg.name, pkg.full_version),
        archive: archive.to_owned(),
        package_desc: pkg.display_name.clone(),
        pkg_update_name: pkg.name.clone(),
        version: Some(version.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_package_name_variants() {
        assert_eq!(
            base_candidates(5, "5150", "gcc_64"),
            vec!["qt.qt5.5150.gcc_64".to_owned(), "qt.5150.gcc_64".to_owned()]
        );
    }

    #[test]
    fn module_candidates_include_addons_alias() {
        let candidates = module_candidates(5, "5150", "qtcharts", "gcc_64");
        assert!(candidates.contains(&"qt.qt5.5150.addons.qtcharts.gcc_64".to_owned()));
    }

    #[test]
    fn module_candidates_skip_addons_alias_when_already_prefixed() {
        let candidates = module_candidates(5, "5150", "addons.qtcharts", "gcc_64");
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn filtered_archives_keeps_only_wanted_prefixes_for_base() {
        let pkg = PackageUpdate {
            name: "qt.qt5.5150.gcc_64".to_owned(),
            display_name: String::new(),
            description: String::new(),
            release_date: String::new(),
            full_version: "5.15.0-0".to_owned(),
            dependencies: vec![],
            auto_depend_on: vec![],
            downloadable_archives: vec![
                "qtbase-Linux.7z".to_owned(),
                "icu-linux.7z".to_owned(),
            ],
            default: true,
            virtual_: false,
            update_file: None,
        };
        let wanted = vec!["qtbase".to_owned()];
        let kept = filtered_archives(&pkg, Some(&wanted), true);
        assert_eq!(kept, vec!["qtbase-Linux.7z".to_owned()]);
    }
}
