//! Parses an upstream `Updates.xml` catalog into `PackageUpdate` rows and
//! exposes lookup, filtering, and dependency-closure operations over them.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::version::{Version, VersionError};

#[derive(Error, Debug)]
pub enum UpdatesError {
    #[error("failed to parse Updates.xml: {0}")]
    Xml(#[from] quick_xml::de::DeError),
    #[error("malformed version in catalog: {0}")]
    Version(#[from] VersionError),
}

fn csv_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(s) if !s.trim().is_empty() => {
            s.split(',').map(|part| part.trim().to_owned()).collect()
        }
        _ => Vec::new(),
    })
}

fn truthy_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref() == Some("true"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFile {
    #[serde(rename = "@UncompressedSize", default)]
    pub uncompressed_size: u64,
}

/// One `<PackageUpdate>` row of an `Updates.xml` catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageUpdate {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(rename = "Version", default)]
    pub full_version: String,
    #[serde(default, deserialize_with = "csv_list")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "csv_list")]
    pub auto_depend_on: Vec<String>,
    #[serde(default, deserialize_with = "csv_list")]
    pub downloadable_archives: Vec<String>,
    #[serde(default, deserialize_with = "truthy_bool")]
    pub default: bool,
    #[serde(rename = "Virtual", default, deserialize_with = "truthy_bool")]
    pub virtual_: bool,
    #[serde(default)]
    pub update_file: Option<UpdateFile>,
}

impl PackageUpdate {
    /// The arch suffix of this package's name (its last dot-component).
    pub fn arch(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn version(&self) -> Result<Version, VersionError> {
        Version::permissive(&self.full_version)
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.update_file.as_ref().map(|f| f.uncompressed_size).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpdatesXml {
    #[serde(rename = "PackageUpdate", default)]
    package_update: Vec<PackageUpdate>,
}

/// An ordered, name-indexed view of one `Updates.xml` catalog.
pub struct Updates {
    by_name: IndexMap<String, PackageUpdate>,
}

impl Updates {
    pub fn parse(xml: &str) -> Result<Self, UpdatesError> {
        let doc: UpdatesXml = quick_xml::de::from_str(xml)?;
        let by_name = doc
            .package_update
            .into_iter()
            .map(|pkg| (pkg.name.clone(), pkg))
            .collect();
        Ok(Self { by_name })
    }

    pub fn get(&self, name: &str) -> Option<&PackageUpdate> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageUpdate> {
        self.by_name.values()
    }

    pub fn filter_by_arch<'a>(&'a self, arch: &'a str) -> impl Iterator<Item = &'a PackageUpdate> {
        self.iter().filter(move |pkg| pkg.name.contains(arch))
    }

    /// DFS over `dependencies`, visiting each reachable package name once.
    /// The root itself is included. Iteration order is the order names were
    /// first discovered, which is deterministic for a fixed catalog.
    pub fn dependency_closure(&self, root: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root.to_owned()];

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            order.push(name.clone());
            if let Some(pkg) = self.get(&name) {
                for dep in pkg.dependencies.iter().rev() {
                    if !visited.contains(dep) {
                        stack.push(dep.clone());
                    }
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const SAMPLE: &str = indoc! {r#"
        <?xml version="1.0"?>
        <Updates>
          <PackageUpdate>
            <Name>qt.qt5.5150.gcc_64</Name>
            <DisplayName>Qt 5.15.0</DisplayName>
            <Description>The Qt 5.15.0 Core</Description>
            <ReleaseDate>2020-05-19</ReleaseDate>
            <Version>5.15.0-0</Version>
            <Dependencies>qt.licenses</Dependencies>
            <DownloadableArchives>qtbase-Linux-gcc_64.7z, icu-linux-Rhel7.2-gcc5.3-x64.7z</DownloadableArchives>
            <Default>true</Default>
            <Virtual>false</Virtual>
            <UpdateFile UncompressedSize="314572800" CompressedSize="104857600" OS="Any"/>
          </PackageUpdate>
          <PackageUpdate>
            <Name>qt.licenses</Name>
            <DisplayName>Qt Licenses</DisplayName>
            <Description/>
            <ReleaseDate>2020-05-19</ReleaseDate>
            <Version>5.15.0-0</Version>
            <DownloadableArchives>licenses.7z</DownloadableArchives>
            <Default>true</Default>
          </PackageUpdate>
        </Updates>
    "#};

    #[test]
    fn parses_csv_fields() {
        let updates = Updates::parse(SAMPLE).unwrap();
        let base = updates.get("qt.qt5.5150.gcc_64").unwrap();
        assert_eq!(base.dependencies, vec!["qt.licenses".to_owned()]);
        assert_eq!(
            base.downloadable_archives,
            vec![
                "qtbase-Linux-gcc_64.7z".to_owned(),
                "icu-linux-Rhel7.2-gcc5.3-x64.7z".to_owned()
            ]
        );
        assert!(base.default);
        assert!(!base.virtual_);
    }

    #[test]
    fn dependency_closure_is_visit_once() {
        let updates = Updates::parse(SAMPLE).unwrap();
        let closure = updates.dependency_closure("qt.qt5.5150.gcc_64");
        assert_eq!(closure.len(), 2);
        assert!(closure.contains(&"qt.licenses".to_owned()));
    }

    #[test]
    fn arch_is_last_dot_component() {
        let updates = Updates::parse(SAMPLE).unwrap();
        let base = updates.get("qt.qt5.5150.gcc_64").unwrap();
        assert_eq!(base.arch(), "gcc_64");
    }
}
