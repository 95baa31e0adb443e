//! Exponential backoff for fallible async requests.
//!
//! ```ignore
//! Retry::exponential(|| client.status(), NonZeroU64::new(2).unwrap())
//!     .max_delay(Duration::from_secs(10))
//!     .max_num_retries(3)
//!     .when(|e| e.is_transient())
//!     .await
//! ```
use std::future::Future;
use std::marker::PhantomData;
use std::num::NonZeroU64;
use std::time::Duration;

use tokio_retry::RetryIf;

/// Builder for a retried request. Nothing runs until [Retry::when] is awaited.
pub struct Retry<T, E, Fut, FutureFactory>
where
    Fut: Future<Output = Result<T, E>>,
    FutureFactory: FnMut() -> Fut,
{
    future_factory: FutureFactory,
    base: u64,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    max_num_retries: Option<usize>,
    _output: PhantomData<fn() -> (Fut, T, E)>,
}

impl<T, E, Fut, FutureFactory> Retry<T, E, Fut, FutureFactory>
where
    Fut: Future<Output = Result<T, E>>,
    FutureFactory: FnMut() -> Fut,
{
    /// The n-th retry waits `initial_delay * base^n`, one second initially.
    pub fn exponential(future_factory: FutureFactory, base: NonZeroU64) -> Self {
        Self {
            future_factory,
            base: base.get(),
            initial_delay: Duration::from_secs(1),
            max_delay: None,
            max_num_retries: None,
            _output: PhantomData,
        }
    }

    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Unbounded unless set.
    pub fn max_num_retries(mut self, max_num_retries: usize) -> Self {
        self.max_num_retries = Some(max_num_retries);
        self
    }

    /// Runs the request, retrying for as long as `retry_condition` holds for
    /// the error. The last error is returned once retries are exhausted.
    pub async fn when<RetryCondition>(self, retry_condition: RetryCondition) -> Result<T, E>
    where
        RetryCondition: FnMut(&E) -> bool,
    {
        let strategy = backoff(
            self.base,
            self.initial_delay,
            self.max_delay,
            self.max_num_retries,
        );
        RetryIf::spawn(strategy, self.future_factory, retry_condition).await
    }
}

fn backoff(
    base: u64,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    max_num_retries: Option<usize>,
) -> impl Iterator<Item = Duration> {
    let base = u32::try_from(base).unwrap_or(u32::MAX);
    let max_delay = max_delay.unwrap_or(Duration::MAX);

    std::iter::successors(Some(initial_delay), move |delay| {
        delay.checked_mul(base).or(Some(Duration::MAX))
    })
    .map(move |delay| delay.min(max_delay))
    .take(max_num_retries.unwrap_or(usize::MAX))
}
