use std::cmp::Ordering;

/// Dotted release version such as `1.20.4` or `1.20.5-pre1`.
/// Anything after the first `-` or space is a pre-release tag.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Version(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
enum Part {
    Numeric(u64),
    String(String),
}

impl Version {
    pub fn new(v: &str) -> Self {
        Version(v.trim().to_string())
    }

    /// Version without its pre-release tag
    fn base(&self) -> &str {
        match self.0.find(|c: char| c == '-' || c == ' ') {
            Some(idx) => &self.0[..idx],
            None => self.0.as_str(),
        }
    }

    fn split_parts(s: &str) -> Vec<Part> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut numeric = true;

        let flush = |current: &mut String, numeric: bool, parts: &mut Vec<Part>| {
            if current.is_empty() {
                return;
            }
            let part = if numeric {
                Part::Numeric(current.parse().unwrap_or(0))
            } else {
                Part::String(current.clone())
            };
            parts.push(part);
            current.clear();
        };

        for c in s.chars() {
            if c == '.' || c == '-' {
                flush(&mut current, numeric, &mut parts);
                continue;
            }
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != numeric {
                flush(&mut current, numeric, &mut parts);
            }
            if current.is_empty() {
                numeric = is_digit;
            }
            current.push(c);
        }
        flush(&mut current, numeric, &mut parts);

        parts
    }

    /// Numeric components of the base version; `None` when any component is not a number.
    pub fn numeric_base(&self) -> Option<Vec<u64>> {
        let base = self.base();
        if base.is_empty() {
            return None;
        }
        base.split('.').map(|p| p.parse::<u64>().ok()).collect()
    }

    /// Compare base versions only, treating missing trailing components as zero.
    /// `1.20.5-pre1` is at least `1.20.5` under this ordering.
    pub fn cmp_base(&self, other: &Self) -> Ordering {
        let a = Self::split_parts(self.base());
        let b = Self::split_parts(other.base());
        let zero = Part::Numeric(0);
        for i in 0..a.len().max(b.len()) {
            let ap = a.get(i).unwrap_or(&zero);
            let bp = b.get(i).unwrap_or(&zero);
            match ap.cmp(bp) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

/// Weekly snapshot identifier such as `24w14a`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotId {
    pub year: u32,
    pub week: u32,
    pub revision: char,
}

impl SnapshotId {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (year, rest) = s.split_once('w')?;
        if year.len() != 2 || rest.len() < 3 {
            return None;
        }
        let (week, revision) = rest.split_at(2);
        let mut rev_chars = revision.chars();
        let revision = rev_chars.next()?;
        if rev_chars.next().is_some() || !revision.is_ascii_alphabetic() {
            return None;
        }
        Some(Self {
            year: year.parse().ok()?,
            week: week.parse().ok()?,
            revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_comparison_pads_with_zero() {
        assert_eq!(Version::new("1.20").cmp_base(&Version::new("1.20.0")), Ordering::Equal);
        assert_eq!(
            Version::new("1.20.5-pre1").cmp_base(&Version::new("1.20.5")),
            Ordering::Equal
        );
        assert_eq!(
            Version::new("1.14 Pre-Release 1").cmp_base(&Version::new("1.14")),
            Ordering::Equal
        );
    }

    #[test]
    fn numeric_base_rejects_non_numbers() {
        assert_eq!(Version::new("1.20.4").numeric_base(), Some(vec![1, 20, 4]));
        assert_eq!(Version::new("26.1-snapshot-1").numeric_base(), Some(vec![26, 1]));
        assert_eq!(Version::new("b1.7.3").numeric_base(), None);
        assert_eq!(Version::new("").numeric_base(), None);
    }

    #[test]
    fn parses_snapshots() {
        let snap = SnapshotId::parse("24w14a").unwrap();
        assert_eq!((snap.year, snap.week, snap.revision), (24, 14, 'a'));
        assert!(SnapshotId::parse("21w19a").unwrap() < snap);
        assert!(SnapshotId::parse("1.20.4").is_none());
        assert!(SnapshotId::parse("24w1").is_none());
    }
}
