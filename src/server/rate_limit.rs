//! Per-client request limits, one GCRA limiter per (bucket, client address)

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter as Governor};

type DirectRateLimiter =
    Governor<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Routes with their own budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Register,
    Events,
}

/// A client over its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttled {
    /// Seconds until the next request would be allowed, at least 1
    pub retry_after: u64,
}

/// Per-minute limits. A limit of 0 disables the bucket.
pub struct RateLimiter {
    register_per_minute: u32,
    events_per_minute: u32,
    limiters: DashMap<(Bucket, String), Arc<DirectRateLimiter>>,
}

impl RateLimiter {
    pub fn new(register_per_minute: u32, events_per_minute: u32) -> Self {
        Self {
            register_per_minute,
            events_per_minute,
            limiters: DashMap::new(),
        }
    }

    fn limit(&self, bucket: Bucket) -> Option<NonZeroU32> {
        match bucket {
            Bucket::Register => NonZeroU32::new(self.register_per_minute),
            Bucket::Events => NonZeroU32::new(self.events_per_minute),
        }
    }

    fn limiter_for(
        &self,
        bucket: Bucket,
        client: &str,
        per_minute: NonZeroU32,
    ) -> Arc<DirectRateLimiter> {
        self.limiters
            .entry((bucket, client.to_string()))
            .or_insert_with(|| Arc::new(Governor::direct(Quota::per_minute(per_minute))))
            .clone()
    }

    /// Count one request from `client`.
    pub fn check(&self, bucket: Bucket, client: &str) -> Result<(), Throttled> {
        let Some(per_minute) = self.limit(bucket) else {
            return Ok(());
        };

        match self.limiter_for(bucket, client, per_minute).check() {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until
                    .wait_time_from(DefaultClock::default().now())
                    .as_secs()
                    .max(1);
                tracing::debug!(
                    "[questhook:http] {:?} limit hit for {}, retry in {}s",
                    bucket,
                    client,
                    retry_after
                );
                Err(Throttled { retry_after })
            }
        }
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.limiters.len()
    }
}
