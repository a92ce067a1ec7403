use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// Past this many tracked clients, idle entries are dropped, at most once per window.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-client sliding-window limiter keyed by remote address.
#[derive(Debug)]
pub struct ClientRateLimiter {
    limit: usize,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    // hit timestamps per client, oldest first
    hits: HashMap<IpAddr, VecDeque<Instant>>,
    last_pruned: Option<Instant>,
}

impl WindowState {
    fn prune_due(&self, now: Instant, window: Duration) -> bool {
        self.hits.len() > PRUNE_THRESHOLD
            && self
                .last_pruned
                .map_or(true, |at| now.saturating_duration_since(at) >= window)
    }
}

impl ClientRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                hits: HashMap::new(),
                last_pruned: None,
            }),
        }
    }

    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Record a hit for `client`. Returns the wait before the next hit would be
    /// accepted when the client is over its limit.
    pub async fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.check_at(client, Instant::now()).await
    }

    pub async fn check_at(&self, client: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock().await;

        if state.prune_due(now, self.window) {
            let window = self.window;
            state.hits.retain(|_, log| {
                log.back()
                    .map_or(false, |last| now.saturating_duration_since(*last) < window)
            });
            state.last_pruned = Some(now);
        }

        let log = state.hits.entry(client).or_default();
        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.limit {
            let oldest = log.front().copied().unwrap_or(now);
            let retry_after = self.window - now.saturating_duration_since(oldest);
            return Err(retry_after);
        }

        log.push_back(now);
        Ok(())
    }

    pub async fn tracked_clients(&self) -> usize {
        self.state.lock().await.hits.len()
    }
}

/// Whole seconds a client should wait, never less than one.
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
