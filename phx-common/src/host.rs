//! Host name helpers
//!
//! Mesh node names are bare host names while the local system may report a
//! fully qualified name, so comparisons ignore any domain suffix.

use std::path::Path;

const HOSTNAME_FILE: &str = "/etc/hostname";

/// Best-effort local host name.
///
/// Order: `HOSTNAME` environment variable, `/etc/hostname`, `localhost`.
pub fn local_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    read_hostname_file(Path::new(HOSTNAME_FILE)).unwrap_or_else(|| "localhost".to_string())
}

fn read_hostname_file(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let name = contents.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Strip the domain suffix from a host name (`compute1.local` -> `compute1`)
pub fn short_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// True when both names refer to the same host, ignoring domain suffixes
/// and ASCII case.
pub fn same_host(a: &str, b: &str) -> bool {
    let (a, b) = (short_name(a.trim()), short_name(b.trim()));
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// True when `node` names the headnode `headnode`; `localhost` always does
pub fn is_headnode(node: &str, headnode: &str) -> bool {
    node.trim().eq_ignore_ascii_case("localhost") || same_host(node, headnode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_strips_domain() {
        assert_eq!(short_name("compute1.local"), "compute1");
        assert_eq!(short_name("compute1"), "compute1");
    }

    #[test]
    fn test_same_host_ignores_suffix_and_case() {
        assert!(same_host("Compute1.example.org", "compute1"));
        assert!(!same_host("compute1", "compute2"));
        assert!(!same_host("", ""));
    }

    #[test]
    fn test_is_headnode() {
        assert!(is_headnode("head", "head.cluster.local"));
        assert!(is_headnode("LOCALHOST", "head"));
        assert!(!is_headnode("compute1", "head"));
        assert!(!is_headnode("", ""));
    }

    #[test]
    fn test_read_hostname_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostname");
        std::fs::write(&path, "headnode\n").unwrap();
        assert_eq!(read_hostname_file(&path).as_deref(), Some("headnode"));

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(read_hostname_file(&path), None);
    }
}
