//! Statistics collection and reporting
//!
//! Counters gathered by the scheduler and the fleet world during a run, and
//! the summary printed when the run ends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::simulation::clock::format_time;

/// Counters for one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Identifier of the run, also attached to log spans
    pub run_id: Uuid,

    // Scheduler
    /// Events whose action ran
    pub events_processed: usize,
    /// Actions that returned an error
    pub handler_errors: usize,
    /// Events dropped because their chain had gone dormant
    pub events_discarded: usize,
    /// Chains put to sleep after repeated failures
    pub dormant_chains: usize,
    /// Events still queued when the run ended
    pub events_pending: usize,

    // Output
    /// Flush attempts that failed
    pub missed_flushes: usize,
    /// Updates handed to the output sink
    pub items_flushed: usize,

    // Timeline
    /// Virtual time when the run started
    pub start_virtual_time: f64,
    /// Virtual time when the run ended
    pub final_virtual_time: f64,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Fresh statistics with a new run id
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            events_processed: 0,
            handler_errors: 0,
            events_discarded: 0,
            dormant_chains: 0,
            events_pending: 0,
            missed_flushes: 0,
            items_flushed: 0,
            start_virtual_time: 0.0,
            final_virtual_time: 0.0,
            elapsed: Duration::ZERO,
        }
    }

    /// Virtual seconds covered by the run
    pub fn virtual_span(&self) -> f64 {
        (self.final_virtual_time - self.start_virtual_time).max(0.0)
    }

    /// Share of processed events whose action failed, in percent
    pub fn handler_error_percentage(&self) -> f64 {
        if self.events_processed == 0 {
            0.0
        } else {
            (self.handler_errors as f64 / self.events_processed as f64) * 100.0
        }
    }

    /// Virtual seconds simulated per wall-clock second
    pub fn speedup(&self) -> f64 {
        let wall = self.elapsed.as_secs_f64();
        if wall > 0.0 {
            self.virtual_span() / wall
        } else {
            0.0
        }
    }

    /// One-line summary for logs
    pub fn compact_summary(&self) -> String {
        format!(
            "{} events, {} handler errors, {} updates flushed, {} missed flushes",
            self.events_processed, self.handler_errors, self.items_flushed, self.missed_flushes
        )
    }

    /// Multi-line report printed at the end of a run
    pub fn generate_summary_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Fleet Simulation Summary ===\n\n");
        report.push_str(&format!("Run ID: {}\n", self.run_id));
        report.push_str(&format!(
            "Wall-clock Duration: {:.2} seconds\n\n",
            self.elapsed.as_secs_f64()
        ));

        report.push_str("Timeline:\n");
        report.push_str(&format!("  • Started: {}\n", format_time(self.start_virtual_time)));
        report.push_str(&format!("  • Ended: {}\n", format_time(self.final_virtual_time)));
        report.push_str(&format!(
            "  • Virtual Span: {:.0} seconds ({:.1}x real time)\n\n",
            self.virtual_span(),
            self.speedup()
        ));

        report.push_str("Events:\n");
        report.push_str(&format!("  • Processed: {}\n", self.events_processed));
        report.push_str(&format!(
            "  • Handler Errors: {} ({:.1}%)\n",
            self.handler_errors,
            self.handler_error_percentage()
        ));
        report.push_str(&format!("  • Discarded: {}\n", self.events_discarded));
        report.push_str(&format!("  • Dormant Chains: {}\n", self.dormant_chains));
        report.push_str(&format!("  • Still Pending: {}\n\n", self.events_pending));

        report.push_str("Output:\n");
        report.push_str(&format!("  • Updates Flushed: {}\n", self.items_flushed));
        report.push_str(&format!("  • Missed Flushes: {}\n", self.missed_flushes));

        report
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compact_summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_statistics_are_empty() {
        let stats = RunStatistics::new();
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.handler_error_percentage(), 0.0);
        assert_eq!(stats.speedup(), 0.0);
        assert_ne!(stats.run_id, RunStatistics::new().run_id);
    }

    #[test]
    fn test_derived_values() {
        let stats = RunStatistics {
            events_processed: 200,
            handler_errors: 10,
            start_virtual_time: 1000.0,
            final_virtual_time: 4600.0,
            elapsed: Duration::from_secs(2),
            ..RunStatistics::new()
        };
        assert_eq!(stats.handler_error_percentage(), 5.0);
        assert_eq!(stats.virtual_span(), 3600.0);
        assert_eq!(stats.speedup(), 1800.0);
    }

    #[test]
    fn test_summary_report_contents() {
        let stats = RunStatistics {
            events_processed: 42,
            items_flushed: 40,
            missed_flushes: 1,
            ..RunStatistics::new()
        };
        let report = stats.generate_summary_report();
        assert!(report.contains("Fleet Simulation Summary"));
        assert!(report.contains(&stats.run_id.to_string()));
        assert!(report.contains("Processed: 42"));
        assert!(report.contains("Updates Flushed: 40"));
        assert!(report.contains("Missed Flushes: 1"));
        assert_eq!(
            stats.to_string(),
            "42 events, 0 handler errors, 40 updates flushed, 1 missed flushes"
        );
    }
}
