use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// What one reconciliation unit did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub mutations: usize,
    pub conflicts: usize,
    /// No counterpart was found, so nothing was compared.
    pub skipped: bool,
}

impl UnitReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn absorb(&mut self, other: UnitReport) {
        self.mutations += other.mutations;
        self.conflicts += other.conflicts;
    }
}

/// Totals for one full pass or incremental cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub mutations: usize,
    pub cancelled: usize,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl CycleReport {
    pub fn record(&mut self, unit: UnitReport) {
        if unit.skipped {
            self.skipped += 1;
        } else {
            self.succeeded += 1;
        }
        self.mutations += unit.mutations;
        self.conflicts += unit.conflicts;
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.conflicts == 0
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidates: {} ok, {} skipped, {} failed, {} cancelled, {} conflicts, {} writes in {:.1}s",
            self.candidates,
            self.succeeded,
            self.skipped,
            self.failed,
            self.cancelled,
            self.conflicts,
            self.mutations,
            self.duration.as_secs_f64()
        )
    }
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_units() {
        let mut report = CycleReport::default();
        report.record(UnitReport {
            mutations: 2,
            conflicts: 1,
            skipped: false,
        });
        report.record(UnitReport::skipped());
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.mutations, 2);
        assert!(!report.is_clean());
    }
}
