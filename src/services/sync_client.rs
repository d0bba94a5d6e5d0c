//! Follower-side synchronization client
//!
//! One exchange is a single `GET` against the leader's broadcast endpoint.
//! At most one exchange is in flight per process; the slot is released on
//! every exit path, including errors and a dropped future.

use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::domain::NetworkActivityObject;
use crate::error::{FollowerError, Result};
use crate::settings::SharedSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRequestStatus {
    Finished,
    Working,
}

/// Single-slot in-flight marker
#[derive(Debug, Clone, Default)]
pub struct RequestSlot {
    working: Arc<AtomicBool>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot; `None` while another exchange holds it
    pub fn try_acquire(&self) -> Option<InFlight> {
        self.working
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlight {
                working: Arc::clone(&self.working),
            })
    }

    pub fn status(&self) -> NetworkRequestStatus {
        if self.working.load(Ordering::SeqCst) {
            NetworkRequestStatus::Working
        } else {
            NetworkRequestStatus::Finished
        }
    }
}

/// Held for the duration of one exchange; releases the slot on drop
#[derive(Debug)]
pub struct InFlight {
    working: Arc<AtomicBool>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.working.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyUrl,
    /// Previous exchange still in flight
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Leader answered with a payload
    Received(NetworkActivityObject),
    /// Leader answered 200 with a `null` body
    Empty,
    Skipped(SkipReason),
    /// Exchange abandoned this cycle; the next scheduled cycle retries
    Failed(String),
}

impl SyncOutcome {
    pub fn payload(&self) -> Option<&NetworkActivityObject> {
        match self {
            SyncOutcome::Received(obj) => Some(obj),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncClient {
    http: Client,
    slot: RequestSlot,
}

impl SyncClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("follower/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FollowerError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            slot: RequestSlot::new(),
        })
    }

    pub fn slot(&self) -> &RequestSlot {
        &self.slot
    }

    pub fn status(&self) -> NetworkRequestStatus {
        self.slot.status()
    }

    /// Run one exchange without applying the result.
    ///
    /// Never returns an error: configuration and transport problems are
    /// logged and reported as a skipped or failed outcome.
    pub async fn exchange(&self, url: &str, timeout: Duration) -> SyncOutcome {
        trace!("exchange called");

        if url.trim().is_empty() {
            debug!("Sync url is empty, skipping exchange");
            return SyncOutcome::Skipped(SkipReason::EmptyUrl);
        }

        let Some(_in_flight) = self.slot.try_acquire() else {
            debug!("Previous sync request has not finished, skipping");
            return SyncOutcome::Skipped(SkipReason::Busy);
        };

        match self.fetch(url, timeout).await {
            Ok(Some(obj)) => {
                debug!(
                    leader = %obj.leader_name,
                    radius = obj.leader_proximity_radius,
                    "Leader status received"
                );
                SyncOutcome::Received(obj)
            }
            Ok(None) => SyncOutcome::Empty,
            Err(FollowerError::UnexpectedStatus(code)) => {
                debug!("Request to {} was not successful (status {})", url, code);
                SyncOutcome::Failed(format!("status {code}"))
            }
            Err(e) => {
                if e.is_transport() {
                    warn!("Sync request to {} failed: {}", url, e);
                } else {
                    error!("Sync request to {} failed unexpectedly: {}", url, e);
                }
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run one exchange and overwrite local targeting with the result
    pub async fn perform_sync(
        &self,
        url: &str,
        timeout: Duration,
        settings: &SharedSettings,
    ) -> SyncOutcome {
        let outcome = self.exchange(url, timeout).await;
        if let Some(obj) = outcome.payload() {
            settings.write().apply_network_activity(obj);
        }
        outcome
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Option<NetworkActivityObject>> {
        let response = self.http.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FollowerError::UnexpectedStatus(status.as_u16()));
        }

        let body = response.text().await?;
        NetworkActivityObject::parse(&body)
    }
}
