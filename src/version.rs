//! A Qt-flavored semantic version and the spec matcher used to filter catalogs.
//!
//! Qt's own version strings don't fit plain semver: tags like `1.33-202102101246`
//! (tools_conan) or `2020-05-19-1` (tools_vcredist) only make sense under the
//! permissive parse described in `Version::permissive`.

use std::{cmp::Ordering, fmt, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version string: '{0}'")]
    InvalidVersion(String),
    #[error("invalid version spec: '{0}'")]
    InvalidSpec(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// `["preview"]` for `-preview` releases, `[build-tag]` under permissive parse.
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    pub fn is_preview(&self) -> bool {
        self.prerelease.as_deref() == Some("preview")
    }

    /// Strict Qt version syntax: `M.m.p` or `M.m-preview`.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let err = || VersionError::InvalidVersion(s.to_owned());

        let (head, is_preview) = match s.strip_suffix("-preview") {
            Some(head) => (head, true),
            None => (s, false),
        };

        let mut parts = head.splitn(3, '.');
        let major: u64 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let minor: u64 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let patch_str = parts.next();
        if parts.next().is_some() {
            return Err(err());
        }

        if is_preview && patch_str.is_some() {
            return Err(err());
        }
        let patch = match patch_str {
            Some(p) => p.parse().map_err(|_| err())?,
            None if is_preview => 0,
            None => return Err(err()),
        };

        Ok(Self {
            major,
            minor,
            patch,
            prerelease: is_preview.then(|| "preview".to_owned()),
            build: None,
        })
    }

    /// Converts a version string with dots (`5.X.Y`, etc.) into a `Version`.
    ///
    /// If the version omits the patch or minor component, it is filled with
    /// zero and the remainder becomes the build tag. Intended for `Version`
    /// tags read from an `Updates.xml` file.
    ///
    /// ```text
    /// "1.33.1-202102101246" => 1.33.1, build="202102101246"
    /// "1.33-202102101246"   => 1.33.0, build="202102101246"   (tools_conan)
    /// "2020-05-19-1"        => 2020.0.0, build="05-19-1"      (tools_vcredist)
    /// ```
    pub fn permissive(s: &str) -> Result<Self, VersionError> {
        let err = || VersionError::InvalidVersion(s.to_owned());

        let (core, build) = match s.split_once('-') {
            Some((core, build)) => (core, Some(build.to_owned())),
            None => (s, None),
        };

        let mut digits = core.split('.');
        let major_str = digits.next().filter(|s| !s.is_empty()).ok_or_else(err)?;
        if !major_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let major: u64 = major_str.parse().map_err(|_| err())?;

        let minor = match digits.next() {
            Some(s) if s.bytes().all(|b| b.is_ascii_digit()) && !s.is_empty() => {
                s.parse().map_err(|_| err())?
            }
            Some(_) => return Err(err()),
            None => 0,
        };

        let patch = match digits.next() {
            Some(s) if s.bytes().all(|b| b.is_ascii_digit()) && !s.is_empty() => {
                s.parse().map_err(|_| err())?
            }
            Some(_) => return Err(err()),
            None => 0,
        };

        if digits.next().is_some() {
            return Err(err());
        }

        Ok(Self {
            major,
            minor,
            patch,
            prerelease: None,
            build,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_preview() {
            write!(f, "{}.{}-preview", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
            if let Some(build) = &self.build {
                write!(f, "-{build}")?;
            }
            Ok(())
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    /// Operator-less bare clause, matches any version sharing `version`'s
    /// major (only the major component was given in the spec string).
    PrefixMajor,
    /// Operator-less bare clause, matches any version sharing `version`'s
    /// major and minor (major.minor was given, patch omitted).
    PrefixMajorMinor,
}

#[derive(Debug, Clone)]
struct Clause {
    op: Op,
    version: Version,
}

impl Clause {
    fn matches(&self, v: &Version) -> bool {
        match self.op {
            Op::Eq => v == &self.version,
            Op::Ge => v >= &self.version,
            Op::Gt => v > &self.version,
            Op::Le => v <= &self.version,
            Op::Lt => v < &self.version,
            Op::PrefixMajor => v.major == self.version.major,
            Op::PrefixMajorMinor => v.major == self.version.major && v.minor == self.version.minor,
        }
    }
}

/// A version predicate such as `"5.15"`, `">=6.2,<6.5"`, or `"*"`.
///
/// A bare `M.m` or `M.m.p` clause with no comparison operator matches any
/// version sharing that major (and minor, if given) prefix.
#[derive(Debug, Clone)]
pub struct Spec {
    clauses: Vec<Clause>,
    wildcard: bool,
}

impl Spec {
    pub fn match_version(&self, v: &Version) -> bool {
        self.wildcard || self.clauses.iter().all(|c| c.matches(v))
    }
}

impl FromStr for Spec {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" || s.is_empty() {
            return Ok(Self {
                clauses: Vec::new(),
                wildcard: true,
            });
        }

        let mut clauses = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            let (op, rest) = if let Some(rest) = part.strip_prefix(">=") {
                (Some(Op::Ge), rest)
            } else if let Some(rest) = part.strip_prefix("<=") {
                (Some(Op::Le), rest)
            } else if let Some(rest) = part.strip_prefix('>') {
                (Some(Op::Gt), rest)
            } else if let Some(rest) = part.strip_prefix('<') {
                (Some(Op::Lt), rest)
            } else if let Some(rest) = part.strip_prefix("==") {
                (Some(Op::Eq), rest)
            } else {
                (None, part)
            };

            let (version, specificity) = parse_partial(rest.trim())
                .ok_or_else(|| VersionError::InvalidSpec(s.to_owned()))?;
            let op = op.unwrap_or(match specificity {
                1 => Op::PrefixMajor,
                2 => Op::PrefixMajorMinor,
                _ => Op::Eq,
            });
            clauses.push(Clause { op, version });
        }

        Ok(Self {
            clauses,
            wildcard: false,
        })
    }
}

/// Parses a possibly-partial `M`, `M.m`, or `M.m.p` clause, expanding a
/// missing minor/patch to zero for comparison purposes. Returns the filled
/// `Version` alongside how many components were actually given (1, 2, or 3),
/// so the caller can decide whether a bare, operator-less clause should be
/// an exact match or a major/major.minor prefix match.
fn parse_partial(s: &str) -> Option<(Version, u8)> {
    let mut parts = s.splitn(3, '.');
    let major: u64 = parts.next()?.parse().ok()?;
    let minor: u64 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => return Some((Version::new(major, 0, 0), 1)),
    };
    let patch: u64 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => return Some((Version::new(major, minor, 0), 2)),
    };
    Some((Version::new(major, minor, patch), 3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_patch_version() {
        let v = Version::parse("5.15.2").unwrap();
        assert_eq!(v, Version::new(5, 15, 2));
        assert_eq!(v.to_string(), "5.15.2");
    }

    #[test]
    fn parses_preview_version() {
        let v = Version::parse("5.9-preview").unwrap();
        assert!(v.is_preview());
        assert_eq!(v.to_string(), "5.9-preview");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::parse("not.a.version").is_err());
        assert!(Version::parse("5.9.0-preview").is_err());
    }

    #[test]
    fn permissive_fills_minor_and_patch() {
        let v = Version::permissive("1.33-202102101246").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 33);
        assert_eq!(v.patch, 0);
        assert_eq!(v.build.as_deref(), Some("202102101246"));
    }

    #[test]
    fn permissive_vcredist_style() {
        let v = Version::permissive("2020-05-19-1").unwrap();
        assert_eq!(v.major, 2020);
        assert_eq!(v.minor, 0);
        assert_eq!(v.patch, 0);
        assert_eq!(v.build.as_deref(), Some("05-19-1"));
    }

    #[test]
    fn spec_matches_range() {
        let spec: Spec = ">=5.13,<6".parse().unwrap();
        assert!(spec.match_version(&Version::new(5, 15, 2)));
        assert!(!spec.match_version(&Version::new(6, 0, 0)));
        assert!(!spec.match_version(&Version::new(5, 12, 9)));
    }

    #[test]
    fn spec_wildcard_matches_anything() {
        let spec: Spec = "*".parse().unwrap();
        assert!(spec.match_version(&Version::new(1, 0, 0)));
    }

    #[test]
    fn bare_minor_spec_matches_any_patch() {
        let spec: Spec = "5.15".parse().unwrap();
        assert!(spec.match_version(&Version::new(5, 15, 0)));
        assert!(spec.match_version(&Version::new(5, 15, 2)));
        assert!(!spec.match_version(&Version::new(5, 16, 0)));
        assert!(!spec.match_version(&Version::new(5, 14, 9)));
    }

    #[test]
    fn bare_major_spec_matches_any_minor_and_patch() {
        let spec: Spec = "6".parse().unwrap();
        assert!(spec.match_version(&Version::new(6, 2, 1)));
        assert!(spec.match_version(&Version::new(6, 7, 0)));
        assert!(!spec.match_version(&Version::new(5, 15, 2)));
    }

    #[test]
    fn fully_qualified_bare_spec_is_exact() {
        let spec: Spec = "5.15.2".parse().unwrap();
        assert!(spec.match_version(&Version::new(5, 15, 2)));
        assert!(!spec.match_version(&Version::new(5, 15, 3)));
    }

    #[test]
    fn ordering_places_prerelease_below_release() {
        let preview = Version::parse("5.9-preview").unwrap();
        let release = Version::new(5, 9, 0);
        assert!(preview < release);
    }
}
