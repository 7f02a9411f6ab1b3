//! The four-tuple identifying one catalog tree on `download.qt.io`, plus the
//! directory/arch-naming rules layered on top of it.

use thiserror::Error;

use crate::version::Version;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArchiveIdError {
    #[error("'{target}' is not a valid target for host '{host}'")]
    IllegalTarget { host: &'static str, target: String },
    #[error("'{0}' is not a valid extension")]
    IllegalExtension(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Qt,
    Tools,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Host {
    Windows,
    Mac,
    Linux,
}

impl Host {
    /// Legal targets for this host.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &["android", "desktop", "winrt"],
            Self::Mac => &["android", "desktop", "ios"],
            Self::Linux => &["android", "desktop"],
        }
    }

    /// The URL word used in `<host>_<word>` repository directories.
    pub fn url_word(self) -> &'static str {
        match self {
            Self::Windows => "x86",
            Self::Mac | Self::Linux => "x64",
        }
    }
}

const LEGAL_EXTENSIONS: &[&str] = &[
    "",
    "wasm",
    "src_doc_examples",
    "preview",
    "wasm_preview",
    "x86_64",
    "x86",
    "armv7",
    "arm64_v8a",
];

const ANDROID_QT6_EXTENSIONS: &[&str] = &["x86_64", "x86", "armv7", "arm64_v8a"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveId {
    pub category: Category,
    pub host: Host,
    pub target: String,
    pub extension: String,
}

impl ArchiveId {
    pub fn new(
        category: Category,
        host: Host,
        target: impl Into<String>,
        extension: impl Into<String>,
    ) -> Result<Self, ArchiveIdError> {
        let target = target.into();
        let extension = extension.into();

        if !host.targets().contains(&target.as_str()) {
            return Err(ArchiveIdError::IllegalTarget {
                host: host_name(host),
                target,
            });
        }
        if !LEGAL_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ArchiveIdError::IllegalExtension(extension));
        }

        Ok(Self {
            category,
            host,
            target,
            extension,
        })
    }

    /// `online/qtsdkrepository/<host>_<word>/<target>/`
    pub fn repo_url_dir(&self) -> String {
        format!(
            "online/qtsdkrepository/{}_{}/{}/",
            self.host, self.host.url_word(), self.target
        )
    }

    /// `qt<major>_<verdigits>[_<ext>]`
    pub fn folder_name(&self, version: &Version) -> String {
        let verdigits = QtRepoProperty::version_str(version);
        if self.extension.is_empty() {
            format!("qt{}_{verdigits}", version.major)
        } else {
            format!("qt{}_{verdigits}_{}", version.major, self.extension)
        }
    }
}

fn host_name(host: Host) -> &'static str {
    match host {
        Host::Windows => "windows",
        Host::Mac => "mac",
        Host::Linux => "linux",
    }
}

/// Derived naming rules decoupled from any specific request, mirroring
/// upstream's `QtRepoProperty` helper namespace.
pub struct QtRepoProperty;

impl QtRepoProperty {
    /// Concatenation of major/minor digits, with patch appended unless the
    /// version is `5.9.0` or a preview release.
    pub fn version_str(version: &Version) -> String {
        if version.is_preview() || (version.major == 5 && version.minor == 9 && version.patch == 0)
        {
            format!("{}{}", version.major, version.minor)
        } else {
            format!("{}{}{}", version.major, version.minor, version.patch)
        }
    }

    /// The on-disk directory name under `<prefix>/<version>/` for an arch.
    pub fn get_arch_dir(host: Host, arch: &str, version: &Version) -> String {
        if let Some(rest) = arch.strip_prefix("win64_mingw") {
            return format!("mingw{rest}_64");
        }
        if let Some(rest) = arch.strip_prefix("win32_mingw") {
            return format!("mingw{rest}_32");
        }
        if let Some(rest) = arch.strip_prefix("win") {
            // win<NN>_msvcYYYY_winrt_<abi>
            if let Some(captures) = parse_winrt(rest) {
                return captures;
            }
            // win64_/win32_ prefix strip for remaining msvc/desktop arches
            if let Some(idx) = rest.find('_') {
                return rest[idx + 1..].to_owned();
            }
            return rest.to_owned();
        }
        match host {
            Host::Mac if arch == "clang_64" => {
                if version >= &Version::new(6, 1, 2) {
                    "macos".to_owned()
                } else {
                    "clang_64".to_owned()
                }
            }
            Host::Linux if arch == "gcc_64" => "gcc_64".to_owned(),
            _ => arch.to_owned(),
        }
    }

    /// `arch_ext` — the URL-fragment extension derived from an architecture
    /// name and the target Qt major version.
    pub fn arch_ext(arch: &str, qt_major: u64) -> &'static str {
        if arch == "wasm_32" {
            return "wasm";
        }
        if qt_major >= 6 {
            if let Some(abi) = arch.strip_prefix("android_") {
                if let Some(found) = ANDROID_QT6_EXTENSIONS.iter().find(|&&a| a == abi) {
                    return found;
                }
            }
        }
        ""
    }
}

fn parse_winrt(rest: &str) -> Option<String> {
    // expects: "<NN>_msvc<YYYY>_winrt_<abi>"
    let mut parts = rest.splitn(2, '_');
    let _bits = parts.next()?;
    let remainder = parts.next()?;
    let (msvc, after) = remainder.split_once('_')?;
    if !msvc.starts_with("msvc") {
        return None;
    }
    let winrt = after.strip_prefix("winrt_")?;
    Some(format!("winrt_{winrt}_{msvc}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_target_for_host() {
        assert!(ArchiveId::new(Category::Qt, Host::Windows, "desktop", "").is_ok());
        assert!(ArchiveId::new(Category::Qt, Host::Linux, "ios", "").is_err());
    }

    #[test]
    fn version_str_handles_5_9_special_case() {
        assert_eq!(QtRepoProperty::version_str(&Version::new(5, 9, 0)), "59");
        assert_eq!(QtRepoProperty::version_str(&Version::new(5, 9, 1)), "591");
    }

    #[test]
    fn arch_dir_strips_mingw_prefix() {
        let v = Version::new(5, 14, 0);
        assert_eq!(
            QtRepoProperty::get_arch_dir(Host::Windows, "win32_mingw73", &v),
            "mingw73_32"
        );
        assert_eq!(
            QtRepoProperty::get_arch_dir(Host::Windows, "win64_mingw73", &v),
            "mingw73_64"
        );
    }

    #[test]
    fn arch_dir_mac_desktop_follows_version_cutover() {
        assert_eq!(
            QtRepoProperty::get_arch_dir(Host::Mac, "clang_64", &Version::new(6, 1, 2)),
            "macos"
        );
        assert_eq!(
            QtRepoProperty::get_arch_dir(Host::Mac, "clang_64", &Version::new(6, 0, 0)),
            "clang_64"
        );
    }

    #[test]
    fn arch_ext_for_android_qt6() {
        assert_eq!(QtRepoProperty::arch_ext("android_armv7", 6), "armv7");
        assert_eq!(QtRepoProperty::arch_ext("android_armv7", 5), "");
    }
}
