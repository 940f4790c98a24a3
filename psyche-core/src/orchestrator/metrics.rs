//! Loop metrics: monotone counters, reset only on process restart.

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub idle: u64,
    pub consecutive_idle: u64,
    pub audits: u64,
}

impl LoopMetrics {
    /// `total == successful + failed + idle` holds after every cycle.
    pub fn is_consistent(&self) -> bool {
        self.total == self.successful + self.failed + self.idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_identity() {
        let metrics = LoopMetrics {
            total: 5,
            successful: 2,
            failed: 1,
            idle: 2,
            consecutive_idle: 2,
            audits: 1,
        };
        assert!(metrics.is_consistent());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = serde_json::to_value(LoopMetrics::default()).unwrap();
        assert!(json.get("consecutiveIdle").is_some());
        assert!(json.get("consecutive_idle").is_none());
    }
}
