//! Environment health check run on session entry

use crate::config::LivePatchConfig;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// Longest debounce interval considered sane
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Something that will keep live patching from working as expected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthIssue {
    /// Watch root is missing or not a directory
    WatchRootMissing(String),
    /// No include prefixes, so no change can ever qualify
    NoIncludePrefixes,
    /// Debounce is zero or unreasonably long
    DebounceOutOfRange(u64),
    /// Patch engine failed to initialize
    PatchEngineUnavailable,
}

impl Display for HealthIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::WatchRootMissing(root) => write!(f, "watch root {root} does not exist"),
            Self::NoIncludePrefixes => write!(f, "no include prefixes configured; nothing will be watched"),
            Self::DebounceOutOfRange(ms) => {
                write!(f, "debounce of {ms} ms is outside 1..={MAX_DEBOUNCE_MS} ms")
            }
            Self::PatchEngineUnavailable => write!(f, "patch engine is not initialized"),
        }
    }
}

/// Check the environment a session is about to run in
#[must_use]
pub fn check_environment(
    root: &Path,
    config: &LivePatchConfig,
    engine_initialized: bool,
) -> Vec<HealthIssue> {
    let mut issues = Vec::new();
    if !root.is_dir() {
        issues.push(HealthIssue::WatchRootMissing(root.display().to_string()));
    }
    if config.include_prefixes.is_empty() {
        issues.push(HealthIssue::NoIncludePrefixes);
    }
    if config.debounce_ms == 0 || config.debounce_ms > MAX_DEBOUNCE_MS {
        issues.push(HealthIssue::DebounceOutOfRange(config.debounce_ms));
    }
    if !engine_initialized {
        issues.push(HealthIssue::PatchEngineUnavailable);
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_environment() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_environment(dir.path(), &LivePatchConfig::default(), true).is_empty());
    }

    #[test]
    fn every_problem_is_reported() {
        let config = LivePatchConfig::default()
            .with_include_prefixes(Vec::<String>::new())
            .with_debounce_ms(0);
        let issues = check_environment(Path::new("/no/such/root"), &config, false);
        assert_eq!(
            issues,
            vec![
                HealthIssue::WatchRootMissing("/no/such/root".to_string()),
                HealthIssue::NoIncludePrefixes,
                HealthIssue::DebounceOutOfRange(0),
                HealthIssue::PatchEngineUnavailable,
            ]
        );
    }
}
