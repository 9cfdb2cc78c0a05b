use crate::utils::version::{SnapshotId, Version};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Java feature release the launcher bundles a runtime for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum RuntimeMajor {
    Java8,
    Java17,
    Java21,
}

impl RuntimeMajor {
    pub const ALL: [RuntimeMajor; 3] = [RuntimeMajor::Java8, RuntimeMajor::Java17, RuntimeMajor::Java21];

    pub fn number(self) -> u32 {
        match self {
            RuntimeMajor::Java8 => 8,
            RuntimeMajor::Java17 => 17,
            RuntimeMajor::Java21 => 21,
        }
    }

    /// Directory name of the extracted runtime, e.g. `java-17`
    pub fn dir_name(self) -> String {
        format!("java-{}", self.number())
    }

    /// Pick the runtime a game version needs.
    ///
    /// Releases from 1.20.5 (and snapshot 24w14a) need 21, from 1.17 (and
    /// 21w19a) need 17. Year-numbered releases (`26.1` and later) need 21.
    /// Older, pre-release-era and unrecognized versions get 8.
    pub fn select_for_game_version(version: &str) -> RuntimeMajor {
        let trimmed = version.trim();

        if let Some(snapshot) = SnapshotId::parse(trimmed) {
            return if snapshot >= SNAPSHOT_JAVA_21 {
                RuntimeMajor::Java21
            } else if snapshot >= SNAPSHOT_JAVA_17 {
                RuntimeMajor::Java17
            } else {
                RuntimeMajor::Java8
            };
        }

        let parsed = Version::new(trimmed);
        let Some(parts) = parsed.numeric_base() else {
            log::debug!("Unrecognized game version '{}', defaulting to Java 8", version);
            return RuntimeMajor::Java8;
        };

        if parts.first().copied().unwrap_or(0) > 1 {
            return RuntimeMajor::Java21;
        }

        if parsed.cmp_base(&Version::new("1.20.5")) != Ordering::Less {
            RuntimeMajor::Java21
        } else if parsed.cmp_base(&Version::new("1.17")) != Ordering::Less {
            RuntimeMajor::Java17
        } else {
            RuntimeMajor::Java8
        }
    }

    /// Other bundled majors to try when this one is unusable, nearest newer first.
    pub fn fallback_order(self) -> [RuntimeMajor; 2] {
        match self {
            RuntimeMajor::Java8 => [RuntimeMajor::Java17, RuntimeMajor::Java21],
            RuntimeMajor::Java17 => [RuntimeMajor::Java21, RuntimeMajor::Java8],
            RuntimeMajor::Java21 => [RuntimeMajor::Java17, RuntimeMajor::Java8],
        }
    }
}

const SNAPSHOT_JAVA_17: SnapshotId = SnapshotId {
    year: 21,
    week: 19,
    revision: 'a',
};

const SNAPSHOT_JAVA_21: SnapshotId = SnapshotId {
    year: 24,
    week: 14,
    revision: 'a',
};

impl fmt::Display for RuntimeMajor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl TryFrom<u32> for RuntimeMajor {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(RuntimeMajor::Java8),
            17 => Ok(RuntimeMajor::Java17),
            21 => Ok(RuntimeMajor::Java21),
            other => Err(format!("unsupported Java major version {}", other)),
        }
    }
}

impl From<RuntimeMajor> for u32 {
    fn from(value: RuntimeMajor) -> Self {
        value.number()
    }
}
