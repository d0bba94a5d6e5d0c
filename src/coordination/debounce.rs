//! Debounced trigger registry
//!
//! Named handlers that run at most once per configured interval. Used for
//! hotkey edges from the host frame thread and for periodic maintenance, so
//! `call` is cheap to invoke every frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

type Handler = Arc<dyn Fn() + Send + Sync>;

struct Trigger {
    handler: Handler,
    interval: Duration,
    last_run: Option<Instant>,
}

/// Registry of debounced triggers, safe to call from several threads
#[derive(Default)]
pub struct DebounceRegistry {
    triggers: Mutex<HashMap<String, Trigger>>,
}

impl DebounceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. Names are registered once; a second
    /// registration is ignored and returns false.
    pub fn register<F>(&self, name: &str, interval: Duration, handler: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut triggers = self.lock();
        if triggers.contains_key(name) {
            warn!("Debounced trigger {} already registered", name);
            return false;
        }
        triggers.insert(
            name.to_string(),
            Trigger {
                handler: Arc::new(handler),
                interval,
                last_run: None,
            },
        );
        true
    }

    /// Run the handler if its interval elapsed; returns whether it ran
    pub fn call(&self, name: &str) -> bool {
        self.call_at(name, Instant::now())
    }

    /// Same as [`call`](Self::call) with an explicit clock reading
    pub fn call_at(&self, name: &str, now: Instant) -> bool {
        let handler = {
            let mut triggers = self.lock();
            let Some(trigger) = triggers.get_mut(name) else {
                warn!("Debounced trigger {} is not registered", name);
                return false;
            };

            if let Some(last) = trigger.last_run {
                if now.saturating_duration_since(last) < trigger.interval {
                    return false;
                }
            }
            trigger.last_run = Some(now);
            Arc::clone(&trigger.handler)
        };

        // The lock is released so handlers may call back into the registry.
        trace!("Running debounced trigger {}", name);
        handler();
        true
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Trigger>> {
        self.triggers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for DebounceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        f.debug_struct("DebounceRegistry")
            .field("triggers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting(registry: &DebounceRegistry, name: &str, interval_ms: u64) -> Arc<AtomicU32> {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        registry.register(name, Duration::from_millis(interval_ms), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_fires_once_per_interval() {
        let registry = DebounceRegistry::new();
        let count = counting(&registry, "toggle", 1000);
        let t0 = Instant::now();

        assert!(registry.call_at("toggle", t0));
        assert!(!registry.call_at("toggle", t0 + Duration::from_millis(200)));
        assert!(!registry.call_at("toggle", t0 + Duration::from_millis(400)));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(registry.call_at("toggle", t0 + Duration::from_millis(1100)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_interval_measured_from_last_actual_run() {
        let registry = DebounceRegistry::new();
        let count = counting(&registry, "hover", 50);
        let t0 = Instant::now();

        registry.call_at("hover", t0);
        // Suppressed calls do not push the window forward.
        for ms in [10, 20, 30, 40, 49] {
            registry.call_at("hover", t0 + Duration::from_millis(ms));
        }
        assert!(registry.call_at("hover", t0 + Duration::from_millis(50)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_names_do_not_share_timers() {
        let registry = DebounceRegistry::new();
        let a = counting(&registry, "a", 1000);
        let b = counting(&registry, "b", 1000);
        let t0 = Instant::now();

        registry.call_at("a", t0);
        registry.call_at("b", t0 + Duration::from_millis(10));

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_and_duplicate_names() {
        let registry = DebounceRegistry::new();
        assert!(!registry.call("missing"));

        let first = counting(&registry, "x", 0);
        assert!(!registry.register("x", Duration::ZERO, || panic!("replaced")));
        registry.call("x");
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_callers_run_handler_once() {
        let registry = Arc::new(DebounceRegistry::new());
        let count = counting(&registry, "edge", 60_000);
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.call_at("edge", now))
            })
            .collect();
        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fired| *fired)
            .count();

        assert_eq!(fired, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
