//! Prometheus-compatible request metrics for kpi-sim
//!
//! Family names and labels follow the usual client-library conventions so the
//! simulated KPIs line up with existing dashboards:
//!
//! - `http_requests_total{code, method, endpoint}` where `code` is the status
//!   text (`OK`, `Service Unavailable`, ...)
//! - `http_request_duration_seconds{endpoint}` histogram
//!
//! Endpoint: GET /metrics

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Upper bounds of the duration histogram, in seconds
pub const DURATION_BUCKETS: [f64; 5] = [0.1, 0.3, 0.5, 1.0, 3.0];

/// Labels attached to every completed request
#[derive(Hash, PartialEq, Eq, Clone, Debug, PartialOrd, Ord)]
pub struct RequestMetricLabels {
    pub status_text: String,
    pub method: String,
    pub route: String,
}

#[derive(Debug, Default, Clone)]
struct HistogramState {
    /// Cumulative: bucket i counts observations <= DURATION_BUCKETS[i]
    buckets: [u64; DURATION_BUCKETS.len()],
    count: u64,
    sum: f64,
}

impl HistogramState {
    fn observe(&mut self, secs: f64) {
        for (bound, bucket) in DURATION_BUCKETS.iter().zip(self.buckets.iter_mut()) {
            if secs <= *bound {
                *bucket += 1;
            }
        }
        self.count += 1;
        self.sum += secs;
    }
}

/// Request counters and duration histograms, shared by every in-flight request
pub struct HttpMetrics {
    requests: DashMap<RequestMetricLabels, AtomicU64>,
    durations: DashMap<String, Mutex<HistogramState>>,
    start_time: Instant,
}

impl Default for HttpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            durations: DashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Record one completed request: one counter increment, one histogram observation
    pub fn record(&self, labels: RequestMetricLabels, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if let Some(hist) = self.durations.get(&labels.route) {
            hist.lock().observe(secs);
        } else {
            self.durations
                .entry(labels.route.clone())
                .or_default()
                .lock()
                .observe(secs);
        }

        if let Some(counter) = self.requests.get(&labels) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests
                .entry(labels)
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    pub fn request_count(&self, status_text: &str, method: &str, route: &str) -> u64 {
        let key = RequestMetricLabels {
            status_text: status_text.to_string(),
            method: method.to_string(),
            route: route.to_string(),
        };
        self.requests
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn duration_count(&self, route: &str) -> u64 {
        self.durations.get(route).map(|h| h.lock().count).unwrap_or(0)
    }

    /// Total requests counted across all label sets
    pub fn total_requests(&self) -> u64 {
        self.requests.iter().map(|c| c.value().load(Ordering::Relaxed)).sum()
    }

    /// Generate Prometheus-format metrics text
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);

        // ──────────────────────────────────────────────
        // Server info
        // ──────────────────────────────────────────────
        write_help_type(&mut out, "kpi_sim_up", "Whether the KPI simulator is up.", "gauge");
        writeln!(out, "kpi_sim_up 1").ok();

        write_help_type(&mut out, "kpi_sim_uptime_seconds", "Uptime since server boot in seconds.", "counter");
        writeln!(out, "kpi_sim_uptime_seconds {:.3}", self.start_time.elapsed().as_secs_f64()).ok();

        // ──────────────────────────────────────────────
        // Request counter
        // ──────────────────────────────────────────────
        let mut requests: Vec<(RequestMetricLabels, u64)> = self
            .requests
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        requests.sort();

        write_help_type(&mut out, "http_requests_total", "Total HTTP requests", "counter");
        for (labels, count) in requests {
            writeln!(
                out,
                "http_requests_total{{code=\"{}\",method=\"{}\",endpoint=\"{}\"}} {}",
                escape_label(&labels.status_text),
                escape_label(&labels.method),
                escape_label(&labels.route),
                count
            )
            .ok();
        }

        // ──────────────────────────────────────────────
        // Duration histogram
        // ──────────────────────────────────────────────
        let mut durations: Vec<(String, HistogramState)> = self
            .durations
            .iter()
            .map(|e| (e.key().clone(), e.value().lock().clone()))
            .collect();
        durations.sort_by(|a, b| a.0.cmp(&b.0));

        write_help_type(&mut out, "http_request_duration_seconds", "Request duration distribution", "histogram");
        for (route, hist) in durations {
            let endpoint = escape_label(&route);
            for (bound, count) in DURATION_BUCKETS.iter().zip(hist.buckets.iter()) {
                writeln!(
                    out,
                    "http_request_duration_seconds_bucket{{endpoint=\"{}\",le=\"{}\"}} {}",
                    endpoint, bound, count
                )
                .ok();
            }
            writeln!(
                out,
                "http_request_duration_seconds_bucket{{endpoint=\"{}\",le=\"+Inf\"}} {}",
                endpoint, hist.count
            )
            .ok();
            writeln!(out, "http_request_duration_seconds_sum{{endpoint=\"{}\"}} {}", endpoint, hist.sum).ok();
            writeln!(out, "http_request_duration_seconds_count{{endpoint=\"{}\"}} {}", endpoint, hist.count).ok();
        }

        // ──────────────────────────────────────────────
        // Build info
        // ──────────────────────────────────────────────
        write_help_type(&mut out, "kpi_sim_build_info", "kpi-sim build information.", "gauge");
        writeln!(out, "kpi_sim_build_info{{version=\"{}\"}} 1", env!("CARGO_PKG_VERSION")).ok();

        out
    }
}

// ── helpers ─────────────────────────────────────────

fn write_help_type(out: &mut String, name: &str, help: &str, metric_type: &str) {
    writeln!(out, "# HELP {} {}", name, help).ok();
    writeln!(out, "# TYPE {} {}", name, metric_type).ok();
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn labels(status: &str, method: &str, route: &str) -> RequestMetricLabels {
        RequestMetricLabels {
            status_text: status.to_string(),
            method: method.to_string(),
            route: route.to_string(),
        }
    }

    #[test]
    fn test_record_counts_once_per_request() {
        let metrics = HttpMetrics::new();
        metrics.record(labels("OK", "GET", "/kpi/availability"), Duration::from_millis(5));
        metrics.record(labels("Service Unavailable", "GET", "/kpi/availability"), Duration::from_millis(5));
        metrics.record(labels("OK", "GET", "/kpi/availability"), Duration::from_millis(5));

        assert_eq!(metrics.request_count("OK", "GET", "/kpi/availability"), 2);
        assert_eq!(metrics.request_count("Service Unavailable", "GET", "/kpi/availability"), 1);
        assert_eq!(metrics.duration_count("/kpi/availability"), 3);
        assert_eq!(metrics.total_requests(), 3);
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let metrics = HttpMetrics::new();
        for ms in [50, 200, 400, 900, 2000, 5000] {
            metrics.record(labels("OK", "GET", "/benchmark"), Duration::from_millis(ms));
        }
        let text = metrics.render();
        assert!(text.contains("# TYPE http_request_duration_seconds histogram"));
        assert!(text.contains("http_request_duration_seconds_bucket{endpoint=\"/benchmark\",le=\"0.1\"} 1"));
        assert!(text.contains("http_request_duration_seconds_bucket{endpoint=\"/benchmark\",le=\"0.3\"} 2"));
        assert!(text.contains("http_request_duration_seconds_bucket{endpoint=\"/benchmark\",le=\"0.5\"} 3"));
        assert!(text.contains("http_request_duration_seconds_bucket{endpoint=\"/benchmark\",le=\"1\"} 4"));
        assert!(text.contains("http_request_duration_seconds_bucket{endpoint=\"/benchmark\",le=\"3\"} 5"));
        assert!(text.contains("http_request_duration_seconds_bucket{endpoint=\"/benchmark\",le=\"+Inf\"} 6"));
        assert!(text.contains("http_request_duration_seconds_count{endpoint=\"/benchmark\"} 6"));
    }

    #[test]
    fn test_render_counter_lines() {
        let metrics = HttpMetrics::new();
        metrics.record(labels("Internal Server Error", "POST", "/kpi/errors"), Duration::ZERO);
        let text = metrics.render();
        assert!(text.contains("# TYPE http_requests_total counter"));
        assert!(text.contains(
            "http_requests_total{code=\"Internal Server Error\",method=\"POST\",endpoint=\"/kpi/errors\"} 1"
        ));
        assert!(text.contains("kpi_sim_up 1"));
    }

    #[test]
    fn test_escape_label() {
        assert_eq!(escape_label("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let metrics = Arc::new(HttpMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record(labels("OK", "GET", "/healthz"), Duration::from_micros(10));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.request_count("OK", "GET", "/healthz"), 8000);
        assert_eq!(metrics.duration_count("/healthz"), 8000);
    }
}
