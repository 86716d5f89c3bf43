use std::collections::{HashMap, HashSet};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const VERSIONS_PREFIX: &str = "META-INF/versions/";

/// Looks for `Multi-Release: true` in the manifest's main section.
pub fn is_multi_release(manifest: &[u8]) -> bool {
    let text = String::from_utf8_lossy(manifest);
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':')
            && key.trim().eq_ignore_ascii_case("Multi-Release")
        {
            return value.trim().eq_ignore_ascii_case("true");
        }
    }
    false
}

/// Splits `META-INF/versions/17/a/B.class` into `(17, "a/B.class")`.
pub fn versioned_path(name: &str) -> Option<(u16, &str)> {
    let rest = name.strip_prefix(VERSIONS_PREFIX)?;
    let (version, path) = rest.split_once('/')?;
    let version = version.parse().ok()?;
    (!path.is_empty()).then_some((version, path))
}

/// Indices of the entries that lose to another entry for the same logical
/// path. The winner is the highest `N` not above `target`, the newest `N`
/// without a target, or the base entry when no version qualifies. Directory
/// entries (names ending in `/`) are never shadowed.
pub fn shadowed_entries<'a>(
    entries: impl IntoIterator<Item = (usize, &'a str)>,
    target: Option<u16>,
) -> HashSet<usize> {
    let mut candidates: HashMap<&str, Vec<(Option<u16>, usize)>> = HashMap::new();
    for (index, name) in entries {
        if name.ends_with('/') {
            continue;
        }
        let (version, path) = match versioned_path(name) {
            Some((version, path)) => (Some(version), path),
            None => (None, name),
        };
        candidates.entry(path).or_default().push((version, index));
    }

    let mut shadowed = HashSet::new();
    for (_, versions) in candidates {
        // `None` (the base entry) orders below every release.
        let winner = versions
            .iter()
            .filter(|(version, _)| match (version, target) {
                (Some(version), Some(target)) => *version <= target,
                _ => true,
            })
            .max_by_key(|(version, _)| *version)
            .map(|(_, index)| *index);
        shadowed.extend(
            versions
                .into_iter()
                .map(|(_, index)| index)
                .filter(|index| Some(*index) != winner),
        );
    }
    shadowed
}
