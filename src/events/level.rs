use serde::{Deserialize, Serialize};

/// Event severity.
///
/// The level maps to the numeric queue priority: a higher level is dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Emergency,
}

impl Level {
    /// Numeric priority used by the queue (`Debug = 0` .. `Emergency = 4`).
    #[inline]
    pub fn priority(self) -> u8 {
        self as u8
    }

    /// Upper-case label, as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Emergency => "EMERGENCY",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_follows_severity() {
        assert!(Level::Emergency.priority() > Level::Error.priority());
        assert!(Level::Error.priority() > Level::Warning.priority());
        assert!(Level::Warning.priority() > Level::Info.priority());
        assert!(Level::Info.priority() > Level::Debug.priority());
        assert_eq!(Level::Debug.priority(), 0);
    }
}
