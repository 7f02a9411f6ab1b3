//! Post-install patcher: rewrites installation-prefix references baked into
//! the upstream archives (built against `/home/qt/work/install`,
//! `/Users/qt/work/install`, or similar Windows-style paths) so that they
//! point at the user's chosen destination instead.
//!
//! Two target classes exist: desktop Qt, where `qmake` itself is patched in
//! place (binary, pkg-config, libtool), and mobile/wasm Qt 6, where the
//! device-side `qmake` is a shell wrapper around a desktop host toolchain
//! and `target_qt.conf` carries the interesting paths.

use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use memmap2::MmapMut;
use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::{
    archive_id::{Host, QtRepoProperty},
    version::Version,
};

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("io error patching {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("replacement path for {path} is {len} bytes, which does not fit the original slot (max 255)")]
    SlotOverflow { path: PathBuf, len: usize },
}

fn io(path: &Path, source: std::io::Error) -> UpdaterError {
    UpdaterError::Io { path: path.to_owned(), source }
}

pub struct TargetConfig {
    pub version: Version,
    pub target: String,
    pub arch: String,
    pub os_name: Host,
}

const MOBILE_WASM_PREFIXES: &[&str] = &["ios", "android", "wasm"];

impl TargetConfig {
    fn is_mobile_or_wasm(&self) -> bool {
        is_mobile_or_wasm_arch(&self.arch)
    }
}

/// Whether `arch` belongs to the mobile/wasm patch class (ios/android*/wasm*),
/// as opposed to desktop. Exposed so callers can decide whether a desktop
/// arch directory needs to be located before patching.
pub fn is_mobile_or_wasm_arch(arch: &str) -> bool {
    MOBILE_WASM_PREFIXES.iter().any(|p| arch.starts_with(p))
}

/// Patches an installed Qt tree rooted at `base_dir`, for the arch/version
/// described by `target`. `desktop_arch_dir`, when the target is mobile or
/// wasm, names the sibling desktop Qt arch directory used by the
/// device-side qmake wrapper to find host tools.
pub fn patch(
    base_dir: &Utf8Path,
    target: &TargetConfig,
    desktop_arch_dir: Option<&str>,
) -> Result<(), UpdaterError> {
    let version_dir = QtRepoProperty::dir_for_version(&target.version);
    let arch_dir = QtRepoProperty::get_arch_dir(target.os_name, &target.arch, &target.version);
    let prefix = base_dir.join(&version_dir).join(&arch_dir);

    patch_qconfig_pri(&prefix)?;

    if target.is_mobile_or_wasm() {
        if target.version.major >= 6 {
            patch_mobile_qmake(&prefix, base_dir, &version_dir, desktop_arch_dir, target.os_name)?;
            patch_target_qt_conf(&prefix, base_dir, &version_dir, &arch_dir, desktop_arch_dir, target.os_name)?;
            patch_qdevice_pri(&prefix, target.os_name)?;
        } else {
            patch_mobile_qmake(&prefix, base_dir, &version_dir, desktop_arch_dir, target.os_name)?;
        }
        return Ok(());
    }

    make_qt_conf(&prefix)?;
    patch_qmake_binary(&prefix)?;

    match target.os_name {
        Host::Linux => patch_pkgconfig_and_libtool(&prefix, "/home/qt/work/install")?,
        Host::Mac => patch_pkgconfig_and_libtool(&prefix, "/Users/qt/work/install")?,
        Host::Windows => write_qtenv2_bat(&prefix)?,
    }

    if target.version < Version::new(5, 14, 0) {
        patch_qtcore_binary(&prefix, target.os_name)?;
    }

    Ok(())
}

impl QtRepoProperty {
    /// `5.9` for Qt 5.9.0 (upstream's special case), else `M.m.p`.
    pub fn dir_for_version(version: &Version) -> String {
        if version.major == 5 && version.minor == 9 && version.patch == 0 {
            "5.9".to_owned()
        } else {
            format!("{}.{}.{}", version.major, version.minor, version.patch)
        }
    }
}

fn make_qt_conf(prefix: &Utf8Path) -> Result<(), UpdaterError> {
    let path = prefix.join("bin").join("qt.conf");
    std::fs::write(path.as_std_path(), "[Paths]\nPrefix=..\n").map_err(|e| io(path.as_std_path(), e))
}

const PREFIX_KEYS: &[&[u8]] = &[b"qt_prfxpath=", b"qt_epfxpath=", b"qt_hpfxpath="];

/// Overwrites each `key=` slot found in `path`'s binary content with
/// `key` followed by `new_value`, NUL-padded to the original slot's length.
/// The slot is the run of bytes from the key up to (but not including) the
/// next NUL byte. Idempotent: re-patching an already-patched file with the
/// same value is a byte-for-byte no-op.
fn patch_prefix_slots(path: &Utf8Path, new_value: &[u8]) -> Result<(), UpdaterError> {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path.as_std_path())
        .map_err(|e| io(path.as_std_path(), e))?;
    let metadata = file.metadata().map_err(|e| io(path.as_std_path(), e))?;
    let permissions = metadata.permissions();

    let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| io(path.as_std_path(), e))?;

    for key in PREFIX_KEYS {
        let Some(key_start) = find_subslice(&mmap, key) else {
            continue;
        };
        let value_start = key_start + key.len();
        let slot_end = mmap[value_start..]
            .iter()
            .position(|&b| b == 0)
            .map(|offset| value_start + offset)
            .unwrap_or(mmap.len());
        let slot_len = slot_end - value_start;

        if new_value.len() >= slot_len {
            return Err(UpdaterError::SlotOverflow {
                path: path.as_std_path().to_owned(),
                len: new_value.len(),
            });
        }

        mmap[value_start..value_start + new_value.len()].copy_from_slice(new_value);
        for byte in &mut mmap[value_start + new_value.len()..slot_end] {
            *byte = 0;
        }
    }

    mmap.flush().map_err(|e| io(path.as_std_path(), e))?;
    drop(mmap);
    std::fs::set_permissions(path.as_std_path(), permissions).map_err(|e| io(path.as_std_path(), e))?;
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn patch_qmake_binary(prefix: &Utf8Path) -> Result<(), UpdaterError> {
    for candidate in ["qmake", "qmake.exe"] {
        let path = prefix.join("bin").join(candidate);
        if path.as_std_path().is_file() {
            info!(%path, "patching qmake");
            patch_prefix_slots(&path, prefix.as_str().as_bytes())?;
        }
    }
    Ok(())
}

fn patch_qtcore_binary(prefix: &Utf8Path, host: Host) -> Result<(), UpdaterError> {
    let candidates: Vec<Utf8PathBuf> = match host {
        Host::Mac => vec![
            prefix.join("lib/QtCore.framework/QtCore"),
            prefix.join("lib/QtCore.framework/QtCore_debug"),
        ],
        Host::Linux => vec![prefix.join("lib/libQt5Core.so")],
        Host::Windows => vec![
            prefix.join("bin/Qt5Core.dll"),
            prefix.join("bin/Qt5Cored.dll"),
        ],
    };
    for path in candidates {
        if path.as_std_path().is_file() {
            info!(%path, "patching QtCore");
            patch_prefix_slots(&path, prefix.as_str().as_bytes())?;
        }
    }
    Ok(())
}

fn patch_pkgconfig_and_libtool(prefix: &Utf8Path, build_time_prefix: &str) -> Result<(), UpdaterError> {
    let pkgconfig_dir = prefix.join("lib/pkgconfig");
    if pkgconfig_dir.as_std_path().is_dir() {
        for entry in walkdir::WalkDir::new(pkgconfig_dir.as_std_path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "pc"))
        {
            replace_in_text_file(
                entry.path(),
                &format!("prefix={build_time_prefix}"),
                &format!("prefix={prefix}"),
            )?;
        }
    }

    let lib_dir = prefix.join("lib");
    if lib_dir.as_std_path().is_dir() {
        for entry in walkdir::WalkDir::new(lib_dir.as_std_path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "la"))
        {
            let new_libdir = prefix.join("lib");
            replace_in_text_file(
                entry.path(),
                &format!("libdir='{build_time_prefix}/lib'"),
                &format!("libdir='{new_libdir}'"),
            )?;
            replace_in_text_file(
                entry.path(),
                &format!("-L{build_time_prefix}/lib"),
                &format!("-L{new_libdir}"),
            )?;
            replace_in_text_file(
                entry.path(),
                &format!("-F{build_time_prefix}/lib"),
                &format!("-F{new_libdir}"),
            )?;
        }
    }

    Ok(())
}

fn replace_in_text_file(path: &Path, from: &str, to: &str) -> Result<(), UpdaterError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io(path, e))?;
    if !contents.contains(from) {
        return Ok(());
    }
    let patched = contents.replace(from, to);
    std::fs::write(path, patched).map_err(|e| io(path, e))
}

fn write_qtenv2_bat(prefix: &Utf8Path) -> Result<(), UpdaterError> {
    let path = prefix.join("bin").join("qtenv2.bat");
    let contents = format!(
        "@echo off\r\nset PATH={prefix}\\bin;%PATH%\r\ncd /D {prefix}\r\necho Remember to call vcvarsall.bat to complete environment setup!\r\n"
    );
    std::fs::write(path.as_std_path(), contents).map_err(|e| io(path.as_std_path(), e))
}

fn patch_qconfig_pri(prefix: &Utf8Path) -> Result<(), UpdaterError> {
    let path = prefix.join("mkspecs/qconfig.pri");
    if !path.as_std_path().is_file() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path.as_std_path()).map_err(|e| io(path.as_std_path(), e))?;
    let edition_re = Regex::new(r"(?m)^QT_EDITION\s*=.*$").expect("valid regex");
    let licheck_re = Regex::new(r"(?m)^QT_LICHECK\s*=.*$").expect("valid regex");
    let patched = edition_re.replace(&contents, "QT_EDITION = OpenSource");
    let patched = licheck_re.replace(&patched, "QT_LICHECK =");
    std::fs::write(path.as_std_path(), patched.as_bytes()).map_err(|e| io(path.as_std_path(), e))
}

const MOBILE_BUILD_PREFIXES: &[&str] = &[
    "/home/qt/work/install/",
    "/Users/qt/work/install/",
    r"C:\Users\qt\work\install\",
    r"C:\Utils\work\install\",
];

fn patch_mobile_qmake(
    prefix: &Utf8Path,
    base_dir: &Utf8Path,
    version_dir: &str,
    desktop_arch_dir: Option<&str>,
    host: Host,
) -> Result<(), UpdaterError> {
    let Some(desktop_arch_dir) = desktop_arch_dir else {
        return Ok(());
    };
    let qmake_name = if matches!(host, Host::Windows) { "qmake.bat" } else { "qmake" };
    let path = prefix.join("bin").join(qmake_name);
    if !path.as_std_path().is_file() {
        return Ok(());
    }

    let desktop_bin = base_dir.join(version_dir).join(desktop_arch_dir).join("bin");
    let mut contents = std::fs::read_to_string(path.as_std_path()).map_err(|e| io(path.as_std_path(), e))?;
    for build_prefix in MOBILE_BUILD_PREFIXES {
        let old = format!("{build_prefix}bin");
        if contents.contains(&old) {
            contents = contents.replace(&old, desktop_bin.as_str());
        }
    }
    std::fs::write(path.as_std_path(), contents).map_err(|e| io(path.as_std_path(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path.as_std_path())
            .map_err(|e| io(path.as_std_path(), e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path.as_std_path(), perms).map_err(|e| io(path.as_std_path(), e))?;
    }

    Ok(())
}

fn patch_target_qt_conf(
    prefix: &Utf8Path,
    base_dir: &Utf8Path,
    version_dir: &str,
    arch_dir: &str,
    desktop_arch_dir: Option<&str>,
    host: Host,
) -> Result<(), UpdaterError> {
    let path = prefix.join("bin").join("target_qt.conf");
    if !path.as_std_path().is_file() {
        return Ok(());
    }

    let mut contents = std::fs::read_to_string(path.as_std_path()).map_err(|e| io(path.as_std_path(), e))?;

    let host_lib_executables = if matches!(host, Host::Windows) { "./bin" } else { "./libexec" };
    let host_lib_re = Regex::new(r"(?m)^HostLibraryExecutables\s*=.*$").expect("valid regex");
    contents = host_lib_re
        .replace(&contents, format!("HostLibraryExecutables={host_lib_executables}"))
        .into_owned();

    let prefix_re = Regex::new(r"(?m)^Prefix\s*=.*$").expect("valid regex");
    contents = prefix_re
        .replace(&contents, format!("Prefix={}/target", base_dir.join(version_dir).join(arch_dir)))
        .into_owned();

    if let Some(desktop_arch_dir) = desktop_arch_dir {
        contents = contents.replace("HostPrefix=../../", &format!("HostPrefix=../../{desktop_arch_dir}"));
    }
    contents = contents.replace("HostData=target", &format!("HostData=../{arch_dir}"));

    std::fs::write(path.as_std_path(), contents).map_err(|e| io(path.as_std_path(), e))
}

fn patch_qdevice_pri(prefix: &Utf8Path, host: Host) -> Result<(), UpdaterError> {
    let path = prefix.join("mkspecs/qdevice.pri");
    if !path.as_std_path().is_file() {
        return Ok(());
    }
    let host_slug = if matches!(host, Host::Mac) { "darwin" } else { host_os_name(host) };
    let contents = std::fs::read_to_string(path.as_std_path()).map_err(|e| io(path.as_std_path(), e))?;
    let ndk_re = Regex::new(r"(?m)^DEFAULT_ANDROID_NDK_HOST\s*=.*$").expect("valid regex");
    let patched = ndk_re.replace(&contents, format!("DEFAULT_ANDROID_NDK_HOST = {host_slug}-x86_64"));
    std::fs::write(path.as_std_path(), patched.as_bytes()).map_err(|e| io(path.as_std_path(), e))
}

fn host_os_name(host: Host) -> &'static str {
    match host {
        Host::Windows => "windows",
        Host::Mac => "darwin",
        Host::Linux => "linux",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_for_version_special_cases_5_9_0() {
        assert_eq!(QtRepoProperty::dir_for_version(&Version::new(5, 9, 0)), "5.9");
        assert_eq!(QtRepoProperty::dir_for_version(&Version::new(5, 9, 1)), "5.9.1");
    }

    #[test]
    fn find_subslice_locates_key() {
        let haystack = b"xxqt_prfxpath=/old/path\0yy";
        assert_eq!(find_subslice(haystack, b"qt_prfxpath="), Some(2));
    }

    #[test]
    fn patch_prefix_slots_rejects_oversized_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qmake");
        let mut slot = vec![0u8; 300];
        slot[..12].copy_from_slice(b"qt_prfxpath=");
        std::fs::write(&path, &slot).unwrap();

        let utf8_path = Utf8PathBuf::from_path_buf(path).unwrap();
        let too_long = vec![b'a'; 300];
        let result = patch_prefix_slots(&utf8_path, &too_long);
        assert!(matches!(result, Err(UpdaterError::SlotOverflow { .. })));
    }

    #[test]
    fn patch_prefix_slots_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qmake");
        let mut slot = vec![0u8; 64];
        slot[..12].copy_from_slice(b"qt_prfxpath=");
        std::fs::write(&path, &slot).unwrap();

        let utf8_path = Utf8PathBuf::from_path_buf(path.clone()).unwrap();
        patch_prefix_slots(&utf8_path, b"/opt/qt").unwrap();
        let first_pass = std::fs::read(&path).unwrap();
        patch_prefix_slots(&utf8_path, b"/opt/qt").unwrap();
        let second_pass = std::fs::read(&path).unwrap();
        assert_eq!(first_pass, second_pass);
    }
}
