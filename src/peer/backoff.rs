use std::time::Duration;

use rand::Rng;

use crate::config::PeerSettings;

/// Reconnect delay: nothing before the first attempt, then
/// `min(max, 2^n * min) + uniform(0, jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
	min: Duration,
	max: Duration,
	jitter: Duration,
}

impl Backoff {
	pub fn new(min: Duration, max: Duration, jitter: Duration) -> Self {
		Self { min, max, jitter }
	}

	pub fn from_settings(settings: &PeerSettings) -> Self {
		Self::new(settings.min_delay, settings.max_delay, settings.max_jitter)
	}

	pub fn delay(&self, attempt: u32) -> Duration {
		if attempt == 0 {
			return Duration::ZERO;
		}
		let factor = 2u32.saturating_pow(attempt);
		self.min.saturating_mul(factor).min(self.max) + self.random_jitter()
	}

	fn random_jitter(&self) -> Duration {
		let bound = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
		if bound == 0 {
			return Duration::ZERO;
		}
		Duration::from_millis(rand::thread_rng().gen_range(0 ..= bound))
	}
}

impl Default for Backoff {
	fn default() -> Self {
		Self::from_settings(&PeerSettings::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ms(value: u64) -> Duration {
		Duration::from_millis(value)
	}

	#[test]
	fn test_first_attempt_is_immediate() {
		assert_eq!(Backoff::default().delay(0), Duration::ZERO);
	}

	#[test]
	fn test_exponential_without_jitter() {
		let backoff = Backoff::new(ms(100), ms(30_000), Duration::ZERO);
		let delays: Vec<u128> =
			(1 ..= 9).map(|n| backoff.delay(n).as_millis()).collect();
		assert_eq!(delays, vec![
			200, 400, 800, 1_600, 3_200, 6_400, 12_800, 25_600, 30_000
		]);
		assert_eq!(backoff.delay(64), ms(30_000));
		assert_eq!(backoff.delay(u32::MAX), ms(30_000));
	}

	#[test]
	fn test_jitter_bounds() {
		let backoff = Backoff::default();
		for attempt in 1 .. 40 {
			let base = ms(100)
				.saturating_mul(2u32.saturating_pow(attempt))
				.min(ms(30_000));
			let delay = backoff.delay(attempt);
			assert!(delay >= base, "attempt {attempt}: {delay:?} < {base:?}");
			assert!(
				delay <= base + ms(1_000),
				"attempt {attempt}: {delay:?} exceeds jitter"
			);
		}
	}
}
