use crate::state::{new_state, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub polls_completed: u64,
    pub last_poll: Option<String>,
    pub last_poll_duration_ms: Option<u64>,
    pub sources_tracked: u32,
    pub subjects_tracked: u32,
    pub last_poll_errors: Option<u32>,
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Debug, Clone)]
struct PollStats {
    finished_at: OffsetDateTime,
    duration: Duration,
    errors: usize,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    polls_completed: Arc<AtomicU64>,
    last_poll: Shared<Option<PollStats>>,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Shared<String>,
}

impl HealthTracker {
    pub fn new(mqtt_enabled: bool) -> Self {
        let status = if mqtt_enabled { "connecting" } else { "disabled" };
        Self {
            start_time: Instant::now(),
            polls_completed: Arc::new(AtomicU64::new(0)),
            last_poll: new_state(None),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: new_state(status.to_string()),
        }
    }

    pub fn record_poll(&self, finished_at: OffsetDateTime, duration: Duration, errors: usize) {
        self.polls_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_poll.lock() = Some(PollStats { finished_at, duration, errors });
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, sources_tracked: usize, subjects_tracked: usize) -> KernelHealth {
        let last = self.last_poll.lock().clone();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            polls_completed: self.polls_completed.load(Ordering::Relaxed),
            last_poll: last.as_ref().and_then(|p| p.finished_at.format(&Rfc3339).ok()),
            last_poll_duration_ms: last.as_ref().map(|p| p.duration.as_millis() as u64),
            sources_tracked: sources_tracked as u32,
            subjects_tracked: subjects_tracked as u32,
            last_poll_errors: last.as_ref().map(|p| p.errors as u32),
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }

    // unknown
    0.0
}
