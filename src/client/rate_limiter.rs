use crate::client::providers::EndpointFamily;
use crate::client::SourceId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Closed interval of milliseconds a random pause is drawn from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: Self = Self::from_millis(0, 0);

    #[must_use]
    pub const fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    #[must_use]
    pub const fn from_secs(min_secs: u64, max_secs: u64) -> Self {
        Self::from_millis(min_secs * 1000, max_secs * 1000)
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.max_ms == 0
    }

    /// Draw a pause from the interval
    #[must_use]
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

/// Pauses applied around the requests of one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessProfile {
    /// Before every outbound request
    pub request: DelayRange,
    /// Between two strategies of the same chain
    pub between_strategies: DelayRange,
    /// After each item accepted by a streaming strategy
    pub item: DelayRange,
    /// Take a longer cool-down every this many items (0 disables it)
    pub cooldown_every: u32,
    pub cooldown: DelayRange,
    /// After a failed request
    pub error_pause: DelayRange,
}

impl PolitenessProfile {
    /// No pauses at all
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Official APIs that tolerate quick successive calls
    #[must_use]
    pub const fn official_api() -> Self {
        Self {
            request: DelayRange::from_millis(0, 250),
            between_strategies: DelayRange::ZERO,
            item: DelayRange::ZERO,
            cooldown_every: 0,
            cooldown: DelayRange::ZERO,
            error_pause: DelayRange::ZERO,
        }
    }

    /// Search pages that block anything resembling a bot
    #[must_use]
    pub const fn scraped_search() -> Self {
        Self {
            request: DelayRange::from_secs(2, 5),
            between_strategies: DelayRange::from_secs(2, 5),
            item: DelayRange::from_secs(3, 7),
            cooldown_every: 3,
            cooldown: DelayRange::from_secs(5, 10),
            error_pause: DelayRange::from_secs(5, 10),
        }
    }

    /// Publisher portals
    #[must_use]
    pub const fn publisher_site() -> Self {
        Self {
            request: DelayRange::from_secs(1, 3),
            between_strategies: DelayRange::from_secs(1, 3),
            item: DelayRange::ZERO,
            cooldown_every: 0,
            cooldown: DelayRange::ZERO,
            error_pause: DelayRange::ZERO,
        }
    }

    /// Check that every interval is well-formed
    pub fn validate(&self) -> Result<(), String> {
        for (name, range) in [
            ("request", self.request),
            ("between_strategies", self.between_strategies),
            ("item", self.item),
            ("cooldown", self.cooldown),
            ("error_pause", self.error_pause),
        ] {
            if range.min_ms > range.max_ms {
                return Err(format!(
                    "{name} delay has min {}ms greater than max {}ms",
                    range.min_ms, range.max_ms
                ));
            }
        }
        Ok(())
    }
}

/// Per-source politeness state for one chain execution
#[derive(Debug)]
pub struct PolitenessThrottle {
    source: SourceId,
    profile: PolitenessProfile,
    max_consecutive_errors: u32,
    consecutive_errors: u32,
    items_seen: u32,
    exhausted: HashSet<EndpointFamily>,
}

impl PolitenessThrottle {
    #[must_use]
    pub fn new(source: SourceId, profile: PolitenessProfile, max_consecutive_errors: u32) -> Self {
        debug!(
            "Created politeness throttle for {} (gives up after {} consecutive errors)",
            source, max_consecutive_errors
        );

        Self {
            source,
            profile,
            max_consecutive_errors: max_consecutive_errors.max(1),
            consecutive_errors: 0,
            items_seen: 0,
            exhausted: HashSet::new(),
        }
    }

    /// Wait before an outbound request
    pub async fn before_request(&self) {
        self.pause(self.profile.request, "request").await;
    }

    /// Wait before moving on to the next strategy
    pub async fn between_strategies(&self) {
        self.pause(self.profile.between_strategies, "strategy switch")
            .await;
    }

    /// Wait after an item was accepted, with a longer cool-down every few items
    pub async fn after_item(&mut self) {
        self.items_seen += 1;

        let every = self.profile.cooldown_every;
        if every > 0 && self.items_seen % every == 0 {
            let pause = self.profile.cooldown.sample();
            if !pause.is_zero() {
                info!(
                    "⏳ {} cool-down after {} items - waiting {:.1}s",
                    self.source,
                    self.items_seen,
                    pause.as_secs_f64()
                );
                sleep(pause).await;
            }
        } else {
            self.pause(self.profile.item, "item").await;
        }
    }

    /// Record a successful request
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Record a failed request against `family`.
    ///
    /// Returns `true` when this error exhausted the family.
    pub async fn record_error(&mut self, family: EndpointFamily) -> bool {
        self.consecutive_errors += 1;

        if self.consecutive_errors >= self.max_consecutive_errors {
            if self.exhausted.insert(family) {
                warn!(
                    "{} gave up on {} after {} consecutive errors",
                    self.source, family, self.consecutive_errors
                );
            }
            self.consecutive_errors = 0;
            return true;
        }

        self.pause(self.profile.error_pause, "error").await;
        false
    }

    #[must_use]
    pub fn is_exhausted(&self, family: EndpointFamily) -> bool {
        self.exhausted.contains(&family)
    }

    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    #[must_use]
    pub const fn source(&self) -> SourceId {
        self.source
    }

    async fn pause(&self, range: DelayRange, what: &str) {
        if range.is_zero() {
            return;
        }
        let wait_time = range.sample();
        debug!(
            "Politeness throttle ({}): waiting {}ms before {}",
            self.source,
            wait_time.as_millis(),
            what
        );
        sleep(wait_time).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_delay_range_sample_within_bounds() {
        let range = DelayRange::from_millis(100, 200);
        for _ in 0..50 {
            let pause = range.sample();
            assert!(pause >= Duration::from_millis(100));
            assert!(pause <= Duration::from_millis(200));
        }
        assert_eq!(DelayRange::ZERO.sample(), Duration::ZERO);
    }

    #[test]
    fn test_profile_validation() {
        assert!(PolitenessProfile::scraped_search().validate().is_ok());

        let mut profile = PolitenessProfile::publisher_site();
        profile.request = DelayRange::from_millis(500, 100);
        assert!(profile.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_delay_is_applied() {
        let throttle =
            PolitenessThrottle::new(SourceId::Ieee, PolitenessProfile::publisher_site(), 3);

        let start = Instant::now();
        throttle.before_request().await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_secs(1));
        assert!(waited <= Duration::from_secs(3) + Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_family_exhausted_after_consecutive_errors() {
        let mut throttle = PolitenessThrottle::new(SourceId::Acm, PolitenessProfile::none(), 3);

        assert!(!throttle.record_error(EndpointFamily::AcmWeb).await);
        assert!(!throttle.record_error(EndpointFamily::AcmWeb).await);
        assert_eq!(throttle.consecutive_errors(), 2);
        assert!(throttle.record_error(EndpointFamily::AcmWeb).await);

        assert!(throttle.is_exhausted(EndpointFamily::AcmWeb));
        assert!(!throttle.is_exhausted(EndpointFamily::WebSearch));
    }

    #[tokio::test]
    async fn test_success_resets_error_streak() {
        let mut throttle = PolitenessThrottle::new(SourceId::Scholar, PolitenessProfile::none(), 2);

        throttle.record_error(EndpointFamily::ScholarWeb).await;
        throttle.record_success();
        assert!(!throttle.record_error(EndpointFamily::ScholarWeb).await);
        assert!(!throttle.is_exhausted(EndpointFamily::ScholarWeb));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_every_n_items() {
        let profile = PolitenessProfile {
            item: DelayRange::from_millis(10, 10),
            cooldown_every: 3,
            cooldown: DelayRange::from_secs(5, 5),
            ..PolitenessProfile::none()
        };
        let mut throttle = PolitenessThrottle::new(SourceId::Scholar, profile, 3);

        let start = Instant::now();
        for _ in 0..3 {
            throttle.after_item().await;
        }

        assert_eq!(start.elapsed(), Duration::from_millis(5020));
    }
}
