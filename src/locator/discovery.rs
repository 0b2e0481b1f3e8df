//! Candidate socket discovery
//!
//! Neovim creates its default listen socket under the temp or runtime
//! directory. Candidates are produced by globbing the known layouts in a fixed
//! order, after the override address when one is configured.

use std::path::Path;
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;

/// `nvim.<user>/<random>/nvim.<pid>.0` (Neovim 0.9+)
const PER_USER_LAYOUT: &[&str] = &["nvim.*", "*", "nvim.*.0"];
/// `nvim<random>/0` (older releases)
const LEGACY_LAYOUT: &[&str] = &["nvim*", "0"];
/// `nvim.<user>/<random>` under the runtime dir
const RUNTIME_LAYOUT: &[&str] = &["nvim.*", "*"];

#[cfg(target_os = "macos")]
const SYSTEM_PATTERNS: &[&str] = &[
    "/var/folders/*/*/T/nvim.*/*/nvim.*.0",
    "/private/var/folders/*/*/T/nvim.*/*/nvim.*.0",
];

#[cfg(target_os = "linux")]
const SYSTEM_PATTERNS: &[&str] = &["/run/user/*/nvim.*/*"];

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
const SYSTEM_PATTERNS: &[&str] = &[];

/// Glob patterns to scan, in priority order
pub fn candidate_patterns(config: &DiscoveryConfig) -> Vec<String> {
    let mut patterns = Vec::new();

    patterns.push(rooted_pattern(&config.tmp_dir, PER_USER_LAYOUT));
    patterns.push(rooted_pattern(&config.tmp_dir, LEGACY_LAYOUT));

    if config.scan_system_dirs && cfg!(unix) {
        let tmp = Path::new("/tmp");
        patterns.push(rooted_pattern(tmp, PER_USER_LAYOUT));
        patterns.push(rooted_pattern(tmp, LEGACY_LAYOUT));
    }

    if let Some(runtime_dir) = &config.runtime_dir {
        patterns.push(rooted_pattern(runtime_dir, RUNTIME_LAYOUT));
    }

    if config.scan_system_dirs {
        patterns.extend(SYSTEM_PATTERNS.iter().map(|pattern| pattern.to_string()));
    }

    patterns
}

/// Ordered, de-duplicated candidate addresses; the override comes first
pub fn discover_candidates(config: &DiscoveryConfig) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    if let Some(address) = &config.override_address {
        push(address.clone());
    }

    for pattern in candidate_patterns(config) {
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Skipping invalid discovery pattern {}: {}", pattern, e);
                continue;
            }
        };
        for entry in paths {
            match entry {
                Ok(path) => push(path.to_string_lossy().into_owned()),
                Err(e) => debug!("Unreadable discovery path: {}", e),
            }
        }
    }

    if candidates.is_empty() {
        warn!(
            tmp_dir = %config.tmp_dir.display(),
            runtime_dir = ?config.runtime_dir,
            "No Neovim socket candidates found"
        );
    }

    candidates
}

/// Join a literal root with glob segments, escaping the root
fn rooted_pattern(root: &Path, segments: &[&str]) -> String {
    let mut pattern = glob::Pattern::escape(&root.to_string_lossy());
    for segment in segments {
        if !pattern.ends_with(std::path::MAIN_SEPARATOR) {
            pattern.push(std::path::MAIN_SEPARATOR);
        }
        pattern.push_str(segment);
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> String {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"").unwrap();
        path.to_string_lossy().into_owned()
    }

    fn isolated_config(tmp_dir: PathBuf) -> DiscoveryConfig {
        DiscoveryConfig {
            override_address: None,
            tmp_dir,
            runtime_dir: None,
            scan_system_dirs: false,
        }
    }

    #[test]
    fn test_patterns_follow_layout_order() {
        let config = DiscoveryConfig {
            runtime_dir: Some(PathBuf::from("/run/user/1000")),
            ..isolated_config(PathBuf::from("/var/tmp"))
        };
        let sep = std::path::MAIN_SEPARATOR;
        let patterns = candidate_patterns(&config);
        assert_eq!(patterns.len(), 3);
        assert_eq!(patterns[0], format!("/var/tmp{sep}nvim.*{sep}*{sep}nvim.*.0"));
        assert_eq!(patterns[1], format!("/var/tmp{sep}nvim*{sep}0"));
        assert_eq!(patterns[2], format!("/run/user/1000{sep}nvim.*{sep}*"));
    }

    #[test]
    fn test_root_is_escaped() {
        let pattern = rooted_pattern(Path::new("/tmp/[weird]"), &["nvim*"]);
        assert!(pattern.starts_with("/tmp/[[]weird[]]"));
    }

    #[test]
    fn test_discovers_sockets_in_pattern_order() {
        let tmp = TempDir::new().unwrap();
        let legacy = touch(tmp.path(), "nvimAbc123/0");
        let per_user = touch(tmp.path(), "nvim.alice/xyz/nvim.4242.0");
        touch(tmp.path(), "unrelated/0");

        let candidates = discover_candidates(&isolated_config(tmp.path().to_path_buf()));
        assert_eq!(candidates, vec![per_user, legacy]);
    }

    #[test]
    fn test_runtime_dir_candidates() {
        let tmp = TempDir::new().unwrap();
        let runtime = TempDir::new().unwrap();
        let socket = touch(runtime.path(), "nvim.bob/0");

        let config = DiscoveryConfig {
            runtime_dir: Some(runtime.path().to_path_buf()),
            ..isolated_config(tmp.path().to_path_buf())
        };
        assert_eq!(discover_candidates(&config), vec![socket]);
    }

    #[test]
    fn test_override_first_and_deduplicated() {
        let tmp = TempDir::new().unwrap();
        let socket = touch(tmp.path(), "nvim.alice/xyz/nvim.1.0");
        let other = touch(tmp.path(), "nvim.alice/xyz/nvim.2.0");

        let config = DiscoveryConfig {
            override_address: Some(other.clone()),
            ..isolated_config(tmp.path().to_path_buf())
        };
        assert_eq!(discover_candidates(&config), vec![other, socket]);
    }

    #[test]
    fn test_no_candidates() {
        let tmp = TempDir::new().unwrap();
        assert!(discover_candidates(&isolated_config(tmp.path().to_path_buf())).is_empty());
    }
}
