//! Bulk currency synchronization.
//!
//! Fetches every configured currency concurrently and commits either all of
//! the resulting rate series or none of them. A failed batch flips the
//! sync-broken flag on the state; the rule engine turns that into the
//! user-facing notification.

use crate::Tracker;
use crate::model::SyncKind;
use crate::rates::{RateProvider, RateService};
use crate::store::Mutation;
use futures::future::join_all;
use tracing::{debug, info, warn};

pub struct SyncOptions {
    pub token: String,
    /// Best-effort connectivity guard, checked once before the batch starts.
    pub online: bool,
}

struct SyncTarget {
    currency_id: String,
    kind: SyncKind,
    ticker: String,
}

pub async fn sync_currencies<P: RateProvider>(
    tracker: &mut Tracker,
    service: &RateService<P>,
    options: &SyncOptions,
) {
    if !options.online {
        debug!("Offline, skipping currency sync");
        return;
    }

    // Rates older than the oldest transaction are never consulted.
    let earliest = tracker.state().transactions.iter().map(|t| t.date).min();

    let targets: Vec<SyncTarget> = tracker
        .state()
        .currencies
        .iter()
        .filter_map(|currency| {
            currency.sync.as_ref().map(|sync| SyncTarget {
                currency_id: currency.id.clone(),
                kind: sync.kind,
                ticker: sync.ticker.clone(),
            })
        })
        // An unset ticker is a no-op, not a batch failure
        .filter(|target| !target.ticker.is_empty())
        .collect();

    if targets.is_empty() {
        debug!("No currencies configured for sync");
        return;
    }

    let fetches = targets
        .iter()
        .map(|target| service.get_rates(target.kind, &target.ticker, &options.token, earliest));
    let results = join_all(fetches).await;

    // All-or-nothing: one failed ticker discards the whole batch so the
    // rate dataset never ends up half-updated.
    let series: Option<Vec<_>> = results.into_iter().collect();
    let Some(series) = series else {
        warn!("Currency sync failed, discarding batch");
        tracker.dispatch(vec![Mutation::SetCurrencySyncBroken(true)]);
        return;
    };

    info!(currencies = targets.len(), "Currency sync complete");
    let mut batch: Vec<Mutation> = targets
        .into_iter()
        .zip(series)
        .map(|(target, rates)| Mutation::SetCurrencyRates {
            currency_id: target.currency_id,
            rates,
        })
        .collect();
    batch.push(Mutation::SetCurrencySyncBroken(false));
    tracker.dispatch(batch);
}
