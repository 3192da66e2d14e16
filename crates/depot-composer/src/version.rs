//! Composer version normalization.

use depot_registry::ExtractError;

/// Normalize a version string.
///
/// A leading `v` is dropped and missing minor or patch components become
/// `0`, so `v1.2` is stored as `1.2.0`. Composer's four-part form
/// (`1.0.0.0`) is kept as given. Pre-release and build suffixes are kept
/// as given.
pub fn normalize_version(raw: &str) -> Result<String, ExtractError> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix(|c: char| c == 'v' || c == 'V')
        .unwrap_or(trimmed);

    let (core, suffix) = match stripped.find(|c: char| c == '-' || c == '+') {
        Some(at) => stripped.split_at(at),
        None => (stripped, ""),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
        return Err(ExtractError::InvalidVersion(raw.to_string()));
    }
    let fourth = if parts.len() == 4 { parts.pop() } else { None };
    parts.resize(3, "0");

    let semver_form = format!("{}{suffix}", parts.join("."));
    semver::Version::parse(&semver_form)
        .map_err(|e| ExtractError::InvalidVersion(format!("{raw}: {e}")))?;

    match fourth {
        None => Ok(semver_form),
        Some(revision) if is_numeric_identifier(revision) => {
            Ok(format!("{}.{revision}{suffix}", parts.join(".")))
        }
        Some(_) => Err(ExtractError::InvalidVersion(raw.to_string())),
    }
}

/// Digits only, without a leading zero unless the value is `0`.
fn is_numeric_identifier(part: &str) -> bool {
    !part.is_empty()
        && part.bytes().all(|b| b.is_ascii_digit())
        && (part == "0" || !part.starts_with('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_strips_prefix() {
        let cases = [
            ("1.0.3", "1.0.3"),
            ("v1.0.3", "1.0.3"),
            ("V2", "2.0.0"),
            ("1.2", "1.2.0"),
            (" 3.1.4 ", "3.1.4"),
            ("1.0-beta.1", "1.0.0-beta.1"),
            ("1.0.0+build.5", "1.0.0+build.5"),
            ("1.0.0.0", "1.0.0.0"),
            ("v2.3.4.5", "2.3.4.5"),
            ("1.0.0.0-beta1", "1.0.0.0-beta1"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_version(raw).unwrap(), expected, "input {raw:?}");
        }
    }

    #[test]
    fn rejects_malformed_versions() {
        for raw in [
            "", "v", "latest", "1..2", "1.2.3.4.5", "01.0.0", "1.x", "1.0.0.x", "1.0.0.01",
            "1.0.0.",
        ] {
            assert!(
                matches!(normalize_version(raw), Err(ExtractError::InvalidVersion(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
