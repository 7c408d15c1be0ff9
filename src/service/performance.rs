use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default, Clone)]
struct AlgorithmStats {
    executions: u64,
    total_duration: Duration,
    total_results: u64,
}

#[derive(Debug, Serialize, Clone)]
pub struct AlgorithmPerformance {
    pub algorithm: String,
    pub executions: u64,
    pub avg_duration_ms: f64,
    pub avg_results: f64,
}

/// Per-algorithm execution counters, shared across workers. Updated
/// only when a request enables performance tracking.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    stats: Mutex<HashMap<String, AlgorithmStats>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        PerformanceMonitor::default()
    }

    pub fn track_execution(&self, algorithm: &str, duration: Duration, result_count: usize) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(algorithm.to_string()).or_default();
        entry.executions += 1;
        entry.total_duration += duration;
        entry.total_results += result_count as u64;
    }

    pub fn snapshot(&self) -> Vec<AlgorithmPerformance> {
        let stats = self.stats.lock().unwrap();
        let mut report: Vec<AlgorithmPerformance> = stats
            .iter()
            .map(|(name, s)| AlgorithmPerformance {
                algorithm: name.clone(),
                executions: s.executions,
                avg_duration_ms: if s.executions > 0 {
                    s.total_duration.as_secs_f64() * 1000.0 / s.executions as f64
                } else {
                    0.0
                },
                avg_results: if s.executions > 0 {
                    s.total_results as f64 / s.executions as f64
                } else {
                    0.0
                },
            })
            .collect();
        report.sort_by(|a, b| a.algorithm.cmp(&b.algorithm));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_and_averages_executions() {
        let monitor = PerformanceMonitor::new();
        monitor.track_execution("enhanced", Duration::from_millis(10), 5);
        monitor.track_execution("enhanced", Duration::from_millis(30), 15);
        monitor.track_execution("geo-aware", Duration::from_millis(5), 1);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 2);
        let enhanced = snapshot.iter().find(|s| s.algorithm == "enhanced").unwrap();
        assert_eq!(enhanced.executions, 2);
        assert!((enhanced.avg_duration_ms - 20.0).abs() < 1.0);
        assert!((enhanced.avg_results - 10.0).abs() < f64::EPSILON);
    }
}
