use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge, Counter, Gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter of rows matching the signal pattern
pub const SIGNAL_COUNTER: &str = "app_errors_total";
const BUILD_INFO: &str = "log_query_build_info";

/// Holds the signal counter and renders it with process self-metrics
///
/// Cheap to clone; clones share the same counter. The recorder is local to
/// the publisher rather than installed globally, so several publishers can
/// coexist in one process (tests).
#[derive(Clone)]
pub struct MetricPublisher {
    inner: Arc<Inner>,
}

struct Inner {
    handle: PrometheusHandle,
    signal: Counter,
    total: AtomicU64,
    process: ProcessMetrics,
}

impl MetricPublisher {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let (signal, process) = metrics::with_local_recorder(&recorder, || {
            describe_counter!(
                SIGNAL_COUNTER,
                "Rows whose message matched the signal pattern"
            );
            describe_gauge!(BUILD_INFO, "Build version information");
            gauge!(BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            (counter!(SIGNAL_COUNTER), ProcessMetrics::register())
        });

        Self {
            inner: Arc::new(Inner {
                handle,
                signal,
                total: AtomicU64::new(0),
                process,
            }),
        }
    }

    /// Add to the signal counter; it never decreases or resets
    pub fn add(&self, amount: u64) {
        self.inner.signal.increment(amount);
        self.inner.total.fetch_add(amount, Ordering::Relaxed);
    }

    /// Current counter value
    pub fn value(&self) -> u64 {
        self.inner.total.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of all metrics
    pub fn render(&self) -> String {
        self.inner.process.refresh();
        self.inner.handle.render()
    }
}

impl Default for MetricPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard `process_*` gauges, refreshed on every scrape
struct ProcessMetrics {
    started_at: DateTime<Utc>,
    uptime: Gauge,
    resident_memory: Gauge,
    virtual_memory: Gauge,
    open_fds: Gauge,
    threads: Gauge,
}

impl ProcessMetrics {
    /// Must run inside a recorder scope
    fn register() -> Self {
        describe_gauge!("process_start_time_seconds", "Start time of the process since unix epoch in seconds");
        describe_gauge!("process_uptime_seconds", "Seconds since the process started");
        describe_gauge!("process_resident_memory_bytes", "Resident memory size in bytes");
        describe_gauge!("process_virtual_memory_bytes", "Virtual memory size in bytes");
        describe_gauge!("process_open_fds", "Number of open file descriptors");
        describe_gauge!("process_threads", "Number of OS threads in the process");

        let started_at = Utc::now();
        gauge!("process_start_time_seconds").set(started_at.timestamp() as f64);

        Self {
            started_at,
            uptime: gauge!("process_uptime_seconds"),
            resident_memory: gauge!("process_resident_memory_bytes"),
            virtual_memory: gauge!("process_virtual_memory_bytes"),
            open_fds: gauge!("process_open_fds"),
            threads: gauge!("process_threads"),
        }
    }

    fn refresh(&self) {
        let uptime = (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.uptime.set(uptime.max(0.0));

        let stats = read_process_stats();
        if let Some(bytes) = stats.resident_bytes {
            self.resident_memory.set(bytes as f64);
        }
        if let Some(bytes) = stats.virtual_bytes {
            self.virtual_memory.set(bytes as f64);
        }
        if let Some(threads) = stats.threads {
            self.threads.set(threads as f64);
        }
        if let Some(fds) = stats.open_fds {
            self.open_fds.set(fds as f64);
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct ProcessStats {
    resident_bytes: Option<u64>,
    virtual_bytes: Option<u64>,
    threads: Option<u64>,
    open_fds: Option<u64>,
}

#[cfg(target_os = "linux")]
fn read_process_stats() -> ProcessStats {
    let mut stats = std::fs::read_to_string("/proc/self/status")
        .map(|status| parse_proc_status(&status))
        .unwrap_or_default();
    stats.open_fds = std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count() as u64)
        .ok();
    stats
}

#[cfg(not(target_os = "linux"))]
fn read_process_stats() -> ProcessStats {
    ProcessStats::default()
}

/// Parse `VmRSS`, `VmSize` (kB) and `Threads` from `/proc/<pid>/status`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_status(status: &str) -> ProcessStats {
    let mut stats = ProcessStats::default();
    for line in status.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let number = value
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<u64>().ok());
        match key {
            "VmRSS" => stats.resident_bytes = number.map(|kb| kb * 1024),
            "VmSize" => stats.virtual_bytes = number.map(|kb| kb * 1024),
            "Threads" => stats.threads = number,
            _ => {}
        }
    }
    stats
}
