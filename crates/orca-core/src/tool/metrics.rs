//! Per-tool execution metrics
//!
//! The only state mutated from concurrent tool batches. Updates go through
//! a [`DashMap`] entry, so each record is an atomic per-key update.

use std::time::Duration;

use dashmap::DashMap;

/// Running totals for one tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolMetrics {
    pub call_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_latency: Duration,
    /// `None` until the first call
    pub min_latency: Option<Duration>,
    pub max_latency: Duration,
}

impl ToolMetrics {
    fn record(&mut self, latency: Duration, is_error: bool) {
        self.call_count += 1;
        if is_error {
            self.failure_count += 1;
        } else {
            self.success_count += 1;
        }
        self.total_latency += latency;
        self.min_latency = Some(self.min_latency.map_or(latency, |min| min.min(latency)));
        self.max_latency = self.max_latency.max(latency);
    }

    /// Mean latency over all calls
    pub fn average_latency(&self) -> Duration {
        match u32::try_from(self.call_count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
            Err(_) => Duration::from_secs_f64(self.total_latency.as_secs_f64() / self.call_count as f64),
        }
    }

    /// Fraction of calls that failed, in `0.0..=1.0`
    pub fn error_rate(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.call_count as f64
        }
    }
}

/// Metrics for every tool an agent has invoked
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    tools: DashMap<String, ToolMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation
    pub fn record(&self, tool: &str, latency: Duration, is_error: bool) {
        self.tools
            .entry(tool.to_string())
            .or_default()
            .record(latency, is_error);
    }

    /// Metrics for one tool
    pub fn get(&self, tool: &str) -> Option<ToolMetrics> {
        self.tools.get(tool).map(|entry| entry.value().clone())
    }

    /// All metrics, sorted by tool name
    pub fn snapshot(&self) -> Vec<(String, ToolMetrics)> {
        let mut all: Vec<_> = self
            .tools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Calls across all tools
    pub fn total_calls(&self) -> u64 {
        self.tools.iter().map(|entry| entry.call_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Reset everything (test harnesses and `/clear`)
    pub fn clear(&self) {
        self.tools.clear();
    }

    /// Human-readable summary
    pub fn report(&self) -> String {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return "No tool calls recorded.".to_string();
        }

        let mut out = String::from("Tool execution metrics\n");
        for (name, m) in &snapshot {
            out.push_str(&format!(
                "\n{}\n  calls: {} ({} ok, {} failed, {:.1}% errors)\n  latency: avg {:.1}ms, min {:.1}ms, max {:.1}ms, total {:.1}ms\n",
                name,
                m.call_count,
                m.success_count,
                m.failure_count,
                m.error_rate() * 100.0,
                millis(m.average_latency()),
                millis(m.min_latency.unwrap_or_default()),
                millis(m.max_latency),
                millis(m.total_latency),
            ));
        }
        out.push_str(&format!("\nTotal calls: {}\n", self.total_calls()));
        out
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_updates_totals() {
        let metrics = MetricsRegistry::new();
        metrics.record("calc", Duration::from_millis(10), false);
        metrics.record("calc", Duration::from_millis(30), true);
        metrics.record("calc", Duration::from_millis(20), false);

        let m = metrics.get("calc").unwrap();
        assert_eq!(m.call_count, 3);
        assert_eq!(m.success_count, 2);
        assert_eq!(m.failure_count, 1);
        assert_eq!(m.min_latency, Some(Duration::from_millis(10)));
        assert_eq!(m.max_latency, Duration::from_millis(30));
        assert_eq!(m.total_latency, Duration::from_millis(60));
        assert_eq!(m.average_latency(), Duration::from_millis(20));
        assert!((m.error_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_tool_has_no_metrics() {
        let metrics = MetricsRegistry::new();
        assert!(metrics.get("nope").is_none());
        assert_eq!(ToolMetrics::default().average_latency(), Duration::ZERO);
        assert_eq!(ToolMetrics::default().error_rate(), 0.0);
    }

    #[test]
    fn test_snapshot_sorted_and_clear() {
        let metrics = MetricsRegistry::new();
        metrics.record("zeta", Duration::ZERO, false);
        metrics.record("alpha", Duration::ZERO, false);

        let names: Vec<_> = metrics.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(metrics.total_calls(), 2);

        metrics.clear();
        assert!(metrics.is_empty());
        assert_eq!(metrics.report(), "No tool calls recorded.");
    }

    #[test]
    fn test_report_mentions_each_tool() {
        let metrics = MetricsRegistry::new();
        metrics.record("calculator", Duration::from_millis(2), false);
        metrics.record("web_fetch", Duration::from_millis(200), true);

        let report = metrics.report();
        assert!(report.contains("calculator"));
        assert!(report.contains("web_fetch"));
        assert!(report.contains("100.0% errors"));
        assert!(report.contains("Total calls: 2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records() {
        let metrics = std::sync::Arc::new(MetricsRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let metrics = std::sync::Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    metrics.record("shared", Duration::from_micros(5), false);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(metrics.get("shared").unwrap().call_count, 800);
    }
}
