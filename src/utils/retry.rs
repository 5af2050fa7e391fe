use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff parameters for retried source queries and store writes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub initial_interval: Duration,
	pub max_interval: Duration,
	/// Give up once this much time has passed since the first attempt.
	pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			initial_interval: Duration::from_millis(400),
			max_interval: Duration::from_secs(120),
			max_elapsed_time: Duration::from_secs(600),
		}
	}
}

/// Run `operation` until it succeeds or the retry budget runs out.
///
/// Delays grow 0.4, 0.8, 1.6, ... seconds (with 10% jitter) up to `max_interval`.
/// Every error is treated as transient; the last one is returned on exhaustion.
pub async fn retry_with_max_elapsed_time<T, E, F, Fut>(
	config: &RetryConfig,
	what: &str,
	mut operation: F,
) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: std::fmt::Display,
{
	let backoff = ExponentialBackoffBuilder::new()
		.with_initial_interval(config.initial_interval)
		.with_randomization_factor(0.1)
		.with_multiplier(2.0)
		.with_max_interval(config.max_interval)
		.with_max_elapsed_time(Some(config.max_elapsed_time))
		.build();

	backoff::future::retry(backoff, || {
		let fut = operation();
		async move {
			fut.await.map_err(|e| {
				debug!("Retrying {} due to error: {}", what, e);
				backoff::Error::transient(e)
			})
		}
	})
	.await
}
