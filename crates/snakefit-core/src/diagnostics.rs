//! Solve diagnostics: timing, iteration counts and solver-specific
//! metrics.
//!
//! Every solve collects a [`SolveDiagnostics`] alongside its result.
//! Timestamps are captured via the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveDiagnostics {
    /// Time spent before the first iteration (field derivation, matrix
    /// inversion, interpolant fit).
    #[serde(with = "duration_serde")]
    pub setup_duration: Duration,
    /// Total wall-clock duration including setup (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Number of contour points.
    pub point_count: usize,
    /// Solver-specific metrics.
    pub metrics: SolverMetrics,
}

/// Metrics that differ between the two solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolverMetrics {
    /// Continuous gradient-descent snake.
    Continuous {
        /// Largest per-point `|Δrow| + |Δcol|` in the last iteration.
        last_step: f64,
        /// Distance reported by the last convergence check, if any ran.
        window_distance: Option<f64>,
    },
    /// Discrete greedy snake.
    Greedy {
        /// Total energy of the starting contour.
        initial_energy: f64,
        /// Total energy of the final contour.
        final_energy: f64,
        /// Points moved during the last pass.
        last_moved: usize,
    },
}

impl SolveDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Solve Diagnostics Report\n{}", "=".repeat(40)));
        lines.push(format!("Points: {}", self.point_count));
        lines.push(format!(
            "Setup: {:.3}ms  Total: {:.3}ms",
            duration_ms(self.setup_duration),
            duration_ms(self.total_duration),
        ));
        lines.push(format_metrics(&self.metrics));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format solver metrics into a compact detail string.
fn format_metrics(metrics: &SolverMetrics) -> String {
    match metrics {
        SolverMetrics::Continuous {
            last_step,
            window_distance,
        } => {
            let window = window_distance.map_or_else(|| "n/a".to_string(), |d| format!("{d:.4}"));
            format!("Continuous: last step={last_step:.4}px window distance={window}")
        }
        SolverMetrics::Greedy {
            initial_energy,
            final_energy,
            last_moved,
        } => format!(
            "Greedy: energy {initial_energy:.3} -> {final_energy:.3}, {last_moved} moved in last pass"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn continuous_diagnostics() -> SolveDiagnostics {
        SolveDiagnostics {
            setup_duration: Duration::from_millis(3),
            total_duration: Duration::from_millis(12),
            point_count: 40,
            metrics: SolverMetrics::Continuous {
                last_step: 0.01,
                window_distance: Some(0.05),
            },
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn report_mentions_solver() {
        let report = continuous_diagnostics().report();
        assert!(report.contains("Solve Diagnostics Report"));
        assert!(report.contains("Points: 40"));
        assert!(report.contains("window distance=0.0500"));
    }

    #[test]
    fn greedy_report_shows_energy() {
        let diag = SolveDiagnostics {
            metrics: SolverMetrics::Greedy {
                initial_energy: -10.0,
                final_energy: -250.5,
                last_moved: 0,
            },
            ..continuous_diagnostics()
        };
        assert!(diag.report().contains("-10.000 -> -250.500"));
    }

    #[test]
    fn serde_round_trip() {
        let diag = continuous_diagnostics();
        let json = serde_json::to_string(&diag).unwrap();
        let back: SolveDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(diag, back);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"setup_duration":-1.0,"total_duration":0.0,"point_count":3,"metrics":{"Continuous":{"last_step":0.0,"window_distance":null}}}"#;
        assert!(serde_json::from_str::<SolveDiagnostics>(json).is_err());
    }
}
