use std::sync::OnceLock;

use regex::Regex;

use crate::DebuggerError;

/// A GDB version, as printed by `gdb --version`.
///
/// Only the leading numeric components matter; distro suffixes
/// (`9.2-0ubuntu1~20.04`) are ignored past the first non-dotted-digit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GdbVersion {
    components: Vec<u32>,
}

impl GdbVersion {
    pub fn new(components: Vec<u32>) -> Self {
        GdbVersion { components }
    }

    fn at_least(&self, other: &[u32]) -> bool {
        for i in 0..other.len().max(self.components.len()) {
            let mine = self.components.get(i).copied().unwrap_or(0);
            let theirs = other.get(i).copied().unwrap_or(0);
            if mine != theirs {
                return mine > theirs;
            }
        }
        true
    }

    /// `-gdb-set mi-async` replaced `target-async` in GDB 7.8.
    pub fn supports_mi_async(&self) -> bool {
        self.at_least(&[7, 8])
    }

    /// The `$_gthread` convenience variable appeared in GDB 7.11.
    pub fn supports_gthread(&self) -> bool {
        self.at_least(&[7, 11])
    }
}

impl std::fmt::Display for GdbVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Extract the version from `gdb --version` output.
///
/// The first line looks like `GNU gdb (distro detail) 12.1` with an
/// optional parenthesized description and arbitrary words before the
/// version number.
pub fn parse_gdb_version(text: &str) -> Option<GdbVersion> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| {
        Regex::new(r"(\d+)((?:\.\d+)+)").unwrap_or_else(|_| unreachable!())
    });

    let captures = re.captures(text)?;
    let mut components = vec![captures[1].parse().ok()?];
    for part in captures[2].split('.').skip(1) {
        components.push(part.parse().ok()?);
    }
    Some(GdbVersion::new(components))
}

/// Run `gdb --version` and parse the result.
pub async fn probe_version(gdb: &str) -> Result<GdbVersion, DebuggerError> {
    let output = tokio::process::Command::new(gdb)
        .arg("--version")
        .output()
        .await
        .map_err(|error| {
            DebuggerError::UserMessage(format!("Failed to run {gdb:?} --version: {error}"))
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_gdb_version(&stdout).ok_or_else(|| {
        DebuggerError::UserMessage(format!(
            "Could not determine the GDB version from {gdb:?} --version output"
        ))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test_case("GNU gdb (GDB) 12.1", vec![12, 1])]
    #[test_case("GNU gdb (Ubuntu 9.2-0ubuntu1~20.04) 9.2", vec![9, 2])]
    #[test_case("GNU gdb (GDB; openSUSE Tumbleweed) 13.2.50", vec![13, 2, 50])]
    #[test_case("GNU gdb 6.8.50.20080730-cvs", vec![6, 8, 50, 20080730])]
    fn parses_real_version_banners(banner: &str, expected: Vec<u32>) {
        assert_eq!(parse_gdb_version(banner).unwrap(), GdbVersion::new(expected));
    }

    #[test]
    fn distro_prefix_with_version_in_parens_takes_first_match() {
        // The parenthesized distro detail comes before the version; its
        // number wins, matching how the banner is actually laid out.
        let v = parse_gdb_version("GNU gdb (GDB) 7.8").unwrap();
        assert!(v.supports_mi_async());
        assert!(!v.supports_gthread());
    }

    #[test]
    fn version_comparisons_are_numeric_not_lexicographic() {
        let v = GdbVersion::new(vec![7, 11]);
        assert!(v.supports_gthread());
        let v = GdbVersion::new(vec![7, 9]);
        assert!(v.supports_mi_async());
        assert!(!v.supports_gthread());
        let v = GdbVersion::new(vec![10]);
        assert!(v.supports_gthread());
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_gdb_version("not a gdb banner"), None);
    }
}
