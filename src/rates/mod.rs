//! Exchange-rate retrieval: provider seam, retry policy and the cache-first
//! rate service.

pub mod http;

use crate::cache::DailyCache;
use crate::model::{ExchangeRate, SyncKind};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, Months, NaiveDate};
use std::time::Duration;
use tracing::{debug, warn};

/// The implicit base currency; never fetched.
pub const BASE_CURRENCY: &str = "USD";

/// Returned series never reach further back than this, whatever the caller
/// asks for.
const HISTORY_MONTHS: u32 = 24;

/// Outcome of one provider call. Rate limiting is not an error; the service
/// retries it under its [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Series(Vec<ExchangeRate>),
    RateLimited,
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetches the full monthly close series for one (kind, ticker) pair.
    async fn fetch_monthly(
        &self,
        kind: SyncKind,
        ticker: &str,
        token: &str,
    ) -> Result<FetchOutcome>;
}

/// Bounded fixed-delay retry for rate-limited responses. Injected rather
/// than hard-coded so tests and callers control the wall-clock cost.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(60),
        }
    }
}

pub struct RateService<P> {
    provider: P,
    cache: DailyCache<Vec<ExchangeRate>>,
    retry: RetryPolicy,
}

impl<P: RateProvider> RateService<P> {
    pub fn new(provider: P, cache: DailyCache<Vec<ExchangeRate>>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            cache,
            retry,
        }
    }

    /// Returns the monthly series for a ticker, clamped to the last
    /// [`HISTORY_MONTHS`] months and to `start` when given. `None` means the
    /// ticker is unset or the fetch failed; it is never an error.
    pub async fn get_rates(
        &self,
        kind: SyncKind,
        ticker: &str,
        token: &str,
        start: Option<NaiveDate>,
    ) -> Option<Vec<ExchangeRate>> {
        if ticker.is_empty() {
            return None;
        }

        // USD is the base currency: a constant identity rate, no network.
        if kind == SyncKind::Currency && ticker == BASE_CURRENCY {
            return Some(vec![ExchangeRate {
                month: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                value: 1.0,
            }]);
        }

        let key = format!("{kind}-{ticker}");
        let series = match self.cache.get(&key).await {
            Some(series) => series,
            None => {
                let series = self.fetch_with_retry(kind, ticker, token).await?;
                self.cache.set(&key, series.clone()).await;
                series
            }
        };

        Some(clamp_history(series, start, Local::now().date_naive()))
    }

    async fn fetch_with_retry(
        &self,
        kind: SyncKind,
        ticker: &str,
        token: &str,
    ) -> Option<Vec<ExchangeRate>> {
        for attempt in 1..=self.retry.max_attempts {
            match self.provider.fetch_monthly(kind, ticker, token).await {
                Ok(FetchOutcome::Series(series)) => return Some(series),
                Ok(FetchOutcome::RateLimited) => {
                    if attempt == self.retry.max_attempts {
                        break;
                    }
                    debug!(%kind, ticker, attempt, "Rate limited, retrying after delay");
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    warn!(%kind, ticker, error = %e, "Rate fetch failed");
                    return None;
                }
            }
        }
        warn!(%kind, ticker, "Gave up after repeated rate limiting");
        None
    }
}

/// Drops entries older than `max(start, today - HISTORY_MONTHS)`.
fn clamp_history(
    series: Vec<ExchangeRate>,
    start: Option<NaiveDate>,
    today: NaiveDate,
) -> Vec<ExchangeRate> {
    let window = today
        .checked_sub_months(Months::new(HISTORY_MONTHS))
        .unwrap_or(today);
    let cutoff = match start {
        Some(start) if start > window => start,
        _ => window,
    };
    series.into_iter().filter(|r| r.month >= cutoff).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use anyhow::anyhow;
    use chrono::Datelike;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rate(year: i32, month: u32, value: f64) -> ExchangeRate {
        ExchangeRate {
            month: NaiveDate::from_ymd_opt(year, month, 1).unwrap(),
            value,
        }
    }

    fn months_ago(n: u32) -> NaiveDate {
        Local::now()
            .date_naive()
            .checked_sub_months(Months::new(n))
            .unwrap()
            .with_day(1)
            .unwrap()
    }

    struct ScriptedProvider {
        outcomes: std::sync::Mutex<VecDeque<Result<FetchOutcome>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<Result<FetchOutcome>>) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateProvider for &ScriptedProvider {
        async fn fetch_monthly(
            &self,
            _kind: SyncKind,
            _ticker: &str,
            _token: &str,
        ) -> Result<FetchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn service<'a>(
        provider: &'a ScriptedProvider,
        retry: RetryPolicy,
    ) -> RateService<&'a ScriptedProvider> {
        let cache = DailyCache::new("rates", Arc::new(MemoryBackend::new()));
        RateService::new(provider, cache, retry)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_usd_short_circuit_skips_provider() {
        let provider = ScriptedProvider::new(vec![]);
        let service = service(&provider, fast_retry(1));

        let rates = service
            .get_rates(SyncKind::Currency, "USD", "token", None)
            .await
            .unwrap();

        assert_eq!(rates, vec![rate(1970, 1, 1.0)]);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_ticker_is_a_no_op() {
        let provider = ScriptedProvider::new(vec![]);
        let service = service(&provider, fast_retry(1));

        for kind in [SyncKind::Currency, SyncKind::Crypto, SyncKind::Stock] {
            assert!(service.get_rates(kind, "", "token", None).await.is_none());
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let series = vec![ExchangeRate {
            month: months_ago(1),
            value: 0.92,
        }];
        let provider =
            ScriptedProvider::new(vec![Ok(FetchOutcome::Series(series.clone()))]);
        let service = service(&provider, fast_retry(1));

        let first = service
            .get_rates(SyncKind::Currency, "EUR", "token", None)
            .await
            .unwrap();
        let second = service
            .get_rates(SyncKind::Currency, "EUR", "token", None)
            .await
            .unwrap();

        assert_eq!(first, series);
        assert_eq!(second, series);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_then_succeeds() {
        let series = vec![ExchangeRate {
            month: months_ago(1),
            value: 43000.5,
        }];
        let provider = ScriptedProvider::new(vec![
            Ok(FetchOutcome::RateLimited),
            Ok(FetchOutcome::RateLimited),
            Ok(FetchOutcome::Series(series.clone())),
        ]);
        let service = service(&provider, fast_retry(5));

        let rates = service
            .get_rates(SyncKind::Crypto, "BTC", "token", None)
            .await
            .unwrap();

        assert_eq!(rates, series);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_are_bounded() {
        let provider = ScriptedProvider::new(vec![
            Ok(FetchOutcome::RateLimited),
            Ok(FetchOutcome::RateLimited),
            Ok(FetchOutcome::RateLimited),
        ]);
        let service = service(&provider, fast_retry(3));

        let result = service
            .get_rates(SyncKind::Stock, "VTI", "token", None)
            .await;

        assert!(result.is_none());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces_as_none() {
        let provider = ScriptedProvider::new(vec![Err(anyhow!("connection refused"))]);
        let service = service(&provider, fast_retry(3));

        let result = service
            .get_rates(SyncKind::Currency, "EUR", "token", None)
            .await;

        assert!(result.is_none());
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_clamp_never_returns_more_than_the_window() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let series = vec![
            rate(2023, 1, 1.0), // older than 24 months
            rate(2024, 9, 2.0),
            rate(2026, 7, 3.0),
        ];

        // Start far earlier than the window: window wins
        let clamped = clamp_history(
            series.clone(),
            Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
            today,
        );
        assert_eq!(clamped, vec![rate(2024, 9, 2.0), rate(2026, 7, 3.0)]);

        // Start within the window: start wins
        let clamped = clamp_history(
            series.clone(),
            Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            today,
        );
        assert_eq!(clamped, vec![rate(2026, 7, 3.0)]);

        // No start: window alone applies
        let clamped = clamp_history(series, None, today);
        assert_eq!(clamped, vec![rate(2024, 9, 2.0), rate(2026, 7, 3.0)]);
    }
}
