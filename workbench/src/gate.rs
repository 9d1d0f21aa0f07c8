//! Fixed-window request limiter keyed by (route, client).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

pub const CHAT_ROUTE: &str = "chat";
pub const SEARCH_ROUTE: &str = "search";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLimit {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// Denied until the current window rolls over.
    Deny { retry_after: Duration },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    /// Whole seconds to wait, rounded up and never zero.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GateDecision::Allow => None,
            GateDecision::Deny { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
        }
    }
}

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

struct GateInner {
    limits: HashMap<String, RouteLimit>,
    windows: DashMap<(String, String), WindowState>,
}

/// Per-route, per-client request counter.
///
/// A disabled gate allows everything and keeps no state. Routes without a
/// configured limit are never throttled.
#[derive(Clone)]
pub struct RequestGate {
    inner: Option<Arc<GateInner>>,
}

impl RequestGate {
    pub fn new(limits: HashMap<String, RouteLimit>) -> Self {
        Self {
            inner: Some(Arc::new(GateInner {
                limits,
                windows: DashMap::new(),
            })),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let window = Duration::from_secs(config.window_secs.max(1));
        let limits = HashMap::from([
            (
                CHAT_ROUTE.to_string(),
                RouteLimit {
                    max_requests: config.chat_limit,
                    window,
                },
            ),
            (
                SEARCH_ROUTE.to_string(),
                RouteLimit {
                    max_requests: config.search_limit,
                    window,
                },
            ),
        ]);
        Self::new(limits)
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn check(&self, route: &str, client_key: &str) -> GateDecision {
        let Some(inner) = &self.inner else {
            return GateDecision::Allow;
        };
        let Some(limit) = inner.limits.get(route) else {
            return GateDecision::Allow;
        };

        let now = Instant::now();
        let mut state = inner
            .windows
            .entry((route.to_string(), client_key.to_string()))
            .or_insert(WindowState {
                window_start: now,
                count: 0,
            });

        if now >= state.window_start + limit.window {
            state.window_start = now;
            state.count = 0;
        }

        if state.count < limit.max_requests {
            state.count += 1;
            GateDecision::Allow
        } else {
            let retry_after = (state.window_start + limit.window).saturating_duration_since(now);
            tracing::debug!(route, client = client_key, ?retry_after, "Request denied by gate");
            GateDecision::Deny { retry_after }
        }
    }

    /// Forget clients whose window has already rolled over.
    pub fn prune(&self) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let now = Instant::now();
        let before = inner.windows.len();
        inner.windows.retain(|(route, _), state| {
            inner
                .limits
                .get(route)
                .is_some_and(|limit| now < state.window_start + limit.window)
        });
        before.saturating_sub(inner.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.windows.len())
    }
}
