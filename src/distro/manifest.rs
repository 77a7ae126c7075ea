//! Remote release manifest (`latest-releases.yaml`).

use crate::core::error::AndroshError;
use crate::distro::arch::Arch;
use serde::Deserialize;

/// Entry index used when no entry carries the wanted flavor.
const FALLBACK_INDEX: usize = 2;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReleaseEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
    #[serde(default)]
    pub sha512: Option<String>,
}

/// Unquoted versions such as `3.21` parse as YAML numbers.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_yaml::Value::Null) => None,
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(serde_yaml::to_string(&other).unwrap_or_default().trim().to_string()),
    })
}

/// The version/checksum pair the pipeline downloads and verifies against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: String,
    pub sha512: String,
}

pub fn manifest_url(mirror: &str, arch: Arch) -> String {
    format!(
        "{}/alpine/latest-stable/releases/{}/latest-releases.yaml",
        mirror.trim_end_matches('/'),
        arch
    )
}

pub fn archive_url(mirror: &str, arch: Arch, version: &str) -> String {
    format!(
        "{}/alpine/latest-stable/releases/{arch}/alpine-minirootfs-{version}-{arch}.tar.gz",
        mirror.trim_end_matches('/'),
    )
}

pub fn parse_manifest(text: &str) -> Result<Vec<ReleaseEntry>, AndroshError> {
    Ok(serde_yaml::from_str(text)?)
}

/// Pick the entry whose `flavor` matches, else the entry at the fixed
/// fallback index, and extract its version and digest.
pub fn select_release(entries: &[ReleaseEntry], flavor: &str) -> Result<Release, AndroshError> {
    let entry = entries
        .iter()
        .find(|e| e.flavor.as_deref() == Some(flavor))
        .or_else(|| entries.get(FALLBACK_INDEX))
        .ok_or_else(|| {
            AndroshError::Configuration(format!(
                "release manifest has no '{}' entry ({} entries)",
                flavor,
                entries.len()
            ))
        })?;

    let version = entry
        .version
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AndroshError::Configuration("The version hasn't been detected.".to_string())
        })?;
    let sha512 = entry
        .sha512
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AndroshError::Configuration(format!("release {} has no sha512 digest", version))
        })?;

    Ok(Release { version, sha512 })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
-
  title: "Netboot"
  branch: v3.20
  arch: aarch64
  version: 3.20.3
  flavor: alpine-netboot
  file: alpine-netboot-3.20.3-aarch64.tar.gz
  sha512: aaaa
-
  title: "Standard"
  branch: v3.20
  arch: aarch64
  version: 3.20.3
  flavor: alpine-standard
  file: alpine-standard-3.20.3-aarch64.iso
  sha512: bbbb
-
  title: "Mini root filesystem"
  branch: v3.20
  arch: aarch64
  version: 3.20.3
  flavor: alpine-minirootfs
  file: alpine-minirootfs-3.20.3-aarch64.tar.gz
  sha512: cccc
"#;

    #[test]
    fn selects_minirootfs_by_flavor() {
        let entries = parse_manifest(MANIFEST).unwrap();
        let release = select_release(&entries, "alpine-minirootfs").unwrap();
        assert_eq!(release.version, "3.20.3");
        assert_eq!(release.sha512, "cccc");
    }

    #[test]
    fn falls_back_to_third_entry() {
        let entries = parse_manifest(MANIFEST).unwrap();
        let release = select_release(&entries, "no-such-flavor").unwrap();
        assert_eq!(release.sha512, "cccc");
    }

    #[test]
    fn numeric_version_keeps_its_text() {
        let entries = parse_manifest("- {flavor: alpine-minirootfs, version: 3.21, sha512: dd}").unwrap();
        let release = select_release(&entries, "alpine-minirootfs").unwrap();
        assert_eq!(release.version, "3.21");
    }

    #[test]
    fn missing_version_is_configuration_error() {
        let entries = parse_manifest("- {flavor: alpine-minirootfs, sha512: dd}").unwrap();
        let err = select_release(&entries, "alpine-minirootfs").unwrap_err();
        assert!(matches!(err, AndroshError::Configuration(_)));
    }

    #[test]
    fn missing_digest_is_configuration_error() {
        let entries = parse_manifest("- {flavor: alpine-minirootfs, version: 3.20.3}").unwrap();
        assert!(select_release(&entries, "alpine-minirootfs").is_err());
    }

    #[test]
    fn urls_use_arch_tag() {
        assert_eq!(
            manifest_url("http://mirror/", Arch::Armhf),
            "http://mirror/alpine/latest-stable/releases/armhf/latest-releases.yaml"
        );
        assert_eq!(
            archive_url("http://mirror", Arch::Aarch64, "3.20.3"),
            "http://mirror/alpine/latest-stable/releases/aarch64/alpine-minirootfs-3.20.3-aarch64.tar.gz"
        );
    }
}
