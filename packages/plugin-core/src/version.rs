//! Ordering for plugin version strings.
//!
//! Versions are split on `.` and `-` into segments. Two numeric segments compare
//! numerically; otherwise segments compare by qualifier rank and then
//! case-insensitively:
//!
//! ```text
//! SNAPSHOT < ALPHA < BETA < RC < release (numeric or unknown qualifier)
//! ```
//!
//! Within the release rank, unrecognised qualifiers sort below numbers, so
//! `1.0.0-GA < 1.0.0-0`. A missing trailing segment counts as `0`, so
//! `1.0.0-RC1 < 1.0.0` and `1.0 == 1.0.0`.

use std::cmp::Ordering;

/// Rank of a version segment. Numeric segments and unrecognised qualifiers
/// count as [`QualifierRank::Release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualifierRank {
    Snapshot,
    Alpha,
    Beta,
    ReleaseCandidate,
    Release,
}

impl QualifierRank {
    /// Classifies a non-numeric segment by its (case-insensitive) prefix.
    #[must_use]
    pub fn of(segment: &str) -> Self {
        let upper = segment.to_ascii_uppercase();
        if upper.starts_with("SNAPSHOT") {
            Self::Snapshot
        } else if upper.starts_with("ALPHA") {
            Self::Alpha
        } else if upper.starts_with("BETA") {
            Self::Beta
        } else if upper.starts_with("RC") {
            Self::ReleaseCandidate
        } else {
            Self::Release
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment<'a> {
    raw: &'a str,
    number: Option<u64>,
}

impl<'a> Segment<'a> {
    fn parse(raw: &'a str) -> Self {
        Self {
            raw,
            number: raw.parse::<u64>().ok(),
        }
    }

    fn rank(&self) -> QualifierRank {
        if self.number.is_some() {
            QualifierRank::Release
        } else {
            QualifierRank::of(self.raw)
        }
    }

    fn cmp_segment(&self, other: &Segment<'_>) -> Ordering {
        match (self.number, other.number) {
            (Some(a), Some(b)) => a.cmp(&b),
            // Numbers rank as releases and sort above every qualifier.
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self
                .rank()
                .cmp(&other.rank())
                .then_with(|| cmp_ignore_case(self.raw, other.raw)),
        }
    }

    /// Compares this segment against a segment the other version does not have.
    fn cmp_missing(&self) -> Ordering {
        self.cmp_segment(&Segment {
            raw: "0",
            number: Some(0),
        })
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    version
        .trim()
        .split(['.', '-'])
        .map(Segment::parse)
        .collect()
}

/// Compares two version strings.
///
/// ```
/// use std::cmp::Ordering;
/// use process_plugin_core::version::compare_versions;
///
/// assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
/// assert_eq!(compare_versions("1.0.0-SNAPSHOT", "1.0.0"), Ordering::Less);
/// ```
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);

    for i in 0..left.len().max(right.len()) {
        let ord = match (left.get(i), right.get(i)) {
            (Some(l), Some(r)) => l.cmp_segment(r),
            (Some(l), None) => l.cmp_missing(),
            (None, Some(r)) => r.cmp_missing().reverse(),
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Returns the highest version under [`compare_versions`], or `None` for an
/// empty input.
pub fn latest_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
}

/// Sorts versions ascending in place.
pub fn sort_versions<S: AsRef<str>>(versions: &mut [S]) {
    versions.sort_by(|a, b| compare_versions(a.as_ref(), b.as_ref()));
}
