use std::time::{SystemTime, UNIX_EPOCH};

/// A stored value stamped with a logical write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub timestamp: u64,
    pub value: Vec<u8>,
}

impl Versioned {
    pub fn new(timestamp: u64, value: Vec<u8>) -> Self {
        Self { timestamp, value }
    }

    /// Stamps `value` with nanoseconds since the Unix epoch.
    pub fn now(value: Vec<u8>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self { timestamp, value }
    }

    /// Whether this value wins a last-writer-wins merge against `stored`.
    ///
    /// Ties go to the incoming write.
    pub fn supersedes(&self, stored: &Versioned) -> bool {
        self.timestamp >= stored.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_and_equal_timestamps_win() {
        let stored = Versioned::new(10, b"old".to_vec());
        assert!(Versioned::new(11, b"new".to_vec()).supersedes(&stored));
        assert!(Versioned::new(10, b"same".to_vec()).supersedes(&stored));
        assert!(!Versioned::new(9, b"stale".to_vec()).supersedes(&stored));
    }

    #[test]
    fn now_is_monotonic_enough() {
        let a = Versioned::now(vec![]);
        let b = Versioned::now(vec![]);
        assert!(b.supersedes(&a));
        assert!(a.timestamp > 0);
    }
}
