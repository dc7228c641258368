//! Tiered sliding-window admission control for outbound calls.
//!
//! Every outbound request belongs to a [`Tier`]. Each tier has a
//! [`TierQuota`]: at most `request_limit` admissions inside any trailing
//! `window`. The limiter keeps an ordered log of admission instants per tier;
//! a caller that would exceed the quota sleeps until the oldest admission
//! ages out of the window and then re-checks.
//!
//! Tiers never share quota. There is no FIFO guarantee between waiting
//! callers: whoever re-checks first after a slot frees up wins it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::GatewayError;

/// A named class of outbound operations sharing one admission quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Whole-file, node, and image render requests.
    Tier1,
    /// Metadata endpoints (components, versions). Configured but unused here.
    Tier2,
    /// Lightweight lookups such as published styles.
    Tier3,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Tier1 => write!(f, "tier1"),
            Tier::Tier2 => write!(f, "tier2"),
            Tier::Tier3 => write!(f, "tier3"),
        }
    }
}

/// Static admission quota for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuota {
    pub tier: Tier,
    /// Maximum admissions inside any trailing `window`.
    pub request_limit: u32,
    /// Length of the sliding window.
    pub window: Duration,
}

impl TierQuota {
    pub fn new(tier: Tier, request_limit: u32, window: Duration) -> Self {
        Self {
            tier,
            request_limit,
            window,
        }
    }

    /// Quota of `request_limit` calls per minute.
    pub fn per_minute(tier: Tier, request_limit: u32) -> Self {
        Self::new(tier, request_limit, Duration::from_secs(60))
    }

    /// Default quotas, matching the public design API's documented tiers.
    pub fn defaults() -> Vec<TierQuota> {
        vec![
            Self::per_minute(Tier::Tier1, 10),
            Self::per_minute(Tier::Tier2, 25),
            Self::per_minute(Tier::Tier3, 50),
        ]
    }
}

/// Sliding-window rate limiter with independent per-tier quotas.
#[derive(Debug)]
pub struct RateLimiter {
    quotas: HashMap<Tier, TierQuota>,
    /// Admission instants per tier, oldest first.
    admissions: Mutex<HashMap<Tier, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Build a limiter from a set of quotas.
    ///
    /// Rejects zero limits, zero windows, and tiers configured twice.
    pub fn new(quotas: impl IntoIterator<Item = TierQuota>) -> Result<Self, GatewayError> {
        let mut map = HashMap::new();
        for quota in quotas {
            if quota.request_limit == 0 {
                return Err(GatewayError::Config(format!(
                    "{}: request limit must be positive",
                    quota.tier
                )));
            }
            if quota.window.is_zero() {
                return Err(GatewayError::Config(format!(
                    "{}: window must be positive",
                    quota.tier
                )));
            }
            if map.insert(quota.tier, quota).is_some() {
                return Err(GatewayError::Config(format!(
                    "{}: quota configured more than once",
                    quota.tier
                )));
            }
        }
        Ok(Self {
            quotas: map,
            admissions: Mutex::new(HashMap::new()),
        })
    }

    /// The quota configured for `tier`, if any.
    pub fn quota(&self, tier: Tier) -> Option<&TierQuota> {
        self.quotas.get(&tier)
    }

    /// Suspend until one more call for `tier` can be admitted, then record it.
    ///
    /// Returns [`GatewayError::Cancelled`] if `cancel` fires first, and
    /// [`GatewayError::Config`] for a tier without a quota.
    pub async fn wait_for_slot(
        &self,
        tier: Tier,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let quota = *self
            .quotas
            .get(&tier)
            .ok_or_else(|| GatewayError::Config(format!("no quota configured for {tier}")))?;

        loop {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            let Some(wait) = self.try_admit(&quota) else {
                trace!("Admitted {tier} request");
                return Ok(());
            };
            debug!(
                "{tier} quota of {} per {:?} exhausted, waiting {:.1}s for a slot",
                quota.request_limit,
                quota.window,
                wait.as_secs_f64()
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Number of admissions for `tier` still inside its window.
    pub fn in_window(&self, tier: Tier) -> usize {
        let Some(quota) = self.quotas.get(&tier) else {
            return 0;
        };
        let mut admissions = self.admissions.lock().unwrap_or_else(|e| e.into_inner());
        let log = admissions.entry(tier).or_default();
        expire(log, Instant::now(), quota.window);
        log.len()
    }

    /// Admit now (returning `None`) or report how long until the oldest
    /// admission leaves the window.
    fn try_admit(&self, quota: &TierQuota) -> Option<Duration> {
        let now = Instant::now();
        let mut admissions = self.admissions.lock().unwrap_or_else(|e| e.into_inner());
        let log = admissions.entry(quota.tier).or_default();
        expire(log, now, quota.window);

        if log.len() < quota.request_limit as usize {
            log.push_back(now);
            return None;
        }
        let oldest = *log.front()?;
        Some(quota.window.saturating_sub(now.duration_since(oldest)))
    }
}

/// Drop admissions whose age has reached the window length.
fn expire(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while log
        .front()
        .is_some_and(|oldest| now.duration_since(*oldest) >= window)
    {
        log.pop_front();
    }
}
