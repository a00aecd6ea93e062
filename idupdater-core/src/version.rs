//! Installed/advertised version comparison
//!
//! Versions are dot-separated. Segments that are plain non-negative integers
//! compare numerically, anything else falls back to a collating string
//! comparison. This keeps `1.0.10` newer than `1.0.9` while still tolerating
//! build tags such as `3.12.0.beta`.

use std::cmp::Ordering;

/// Returns true if `current` should be considered older than `available`
pub fn less_than(current: &str, available: &str) -> bool {
    compare(current, available) == Ordering::Less
}

/// Total comparison of two version strings using the mixed numeric/lexical policy
pub fn compare(a: &str, b: &str) -> Ordering {
    let a_segments: Vec<&str> = a.split('.').collect();
    let b_segments: Vec<&str> = b.split('.').collect();

    for i in 0..a_segments.len().max(b_segments.len()) {
        let a_seg = a_segments.get(i).copied();
        let b_seg = b_segments.get(i).copied();

        let ordering = match (numeric(a_seg, b_seg), numeric(b_seg, a_seg)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => collate(a_seg.unwrap_or(""), b_seg.unwrap_or("")),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Numeric value of a segment. A missing segment counts as zero when the
/// opposite segment is numeric, so `1.0` and `1.0.0` are equal.
fn numeric(segment: Option<&str>, other: Option<&str>) -> Option<u64> {
    match segment {
        Some(s) => parse_segment(s),
        None => other.and_then(parse_segment).map(|_| 0),
    }
}

fn parse_segment(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Case-insensitive ordering with a case-sensitive tie-break
fn collate(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_is_not_less() {
        for v in ["", "1", "1.0", "3.12.0.1024", "2.3.beta", "none"] {
            assert!(!less_than(v, v), "{} < {}", v, v);
        }
    }

    #[test]
    fn test_numeric_precedence_over_lexical() {
        assert!(less_than("1.0.9", "1.0.10"));
        assert!(!less_than("1.0.10", "1.0.9"));
        assert!(less_than("2.3.0", "2.3.1"));
        assert!(less_than("3.9.99", "3.10.0"));
    }

    #[test]
    fn test_missing_trailing_segments() {
        assert!(!less_than("1.0", "1.0.0"));
        assert!(!less_than("1.0.0", "1.0"));
        assert!(less_than("1.0", "1.0.1"));
        assert!(!less_than("1.0.1", "1.0"));
    }

    #[test]
    fn test_non_numeric_segments() {
        assert!(less_than("1.0.alpha", "1.0.beta"));
        assert!(less_than("1.0.Alpha", "1.0.beta"));
        assert!(less_than("1.0.Beta", "1.0.beta"));
        assert!(!less_than("1.0.beta", "1.0.Beta"));
        // A tag against an absent segment compares with the empty string
        assert!(less_than("1.0", "1.0.rc1"));
    }

    #[test]
    fn test_not_installed_never_older() {
        // Registry lookups that found nothing must not trigger an install
        assert!(!less_than("none", "3.12.0"));
    }

    #[test]
    fn test_transitive_for_numeric_versions() {
        let versions = [
            "0.9", "1", "1.0.1", "1.0.9", "1.0.10", "1.2", "2.0.0.1", "10.0",
        ];
        for a in versions {
            for b in versions {
                for c in versions {
                    if less_than(a, b) && less_than(b, c) {
                        assert!(less_than(a, c), "{} < {} < {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_large_segments_do_not_overflow() {
        assert!(less_than("1.4294967295", "1.4294967296"));
    }
}
