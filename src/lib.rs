pub mod cache;
pub mod config;
pub mod log;
pub mod model;
pub mod rates;
pub mod rules;
pub mod store;
pub mod sync;

use crate::cache::{CacheBackend, DailyCache, FjallBackend, MemoryBackend};
use crate::model::Currency;
use crate::rates::http::HttpRateProvider;
use crate::rates::{RateService, RetryPolicy};
use crate::rules::{NotificationRule, RuleEngine};
use crate::store::{EntityStore, Mutation, State};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// The full rule registry, in evaluation order.
pub fn default_rules() -> Vec<Box<dyn NotificationRule>> {
    vec![
        Box::new(rules::accounts::StaleAccounts),
        Box::new(rules::transactions::UncategorisedTransactions),
        Box::new(rules::milestone::NetWorthMilestone),
        Box::new(rules::milestone::DebtMilestone),
        Box::new(rules::sync_status::CurrencySyncBroken),
        Box::new(rules::sync_status::CloudSyncBroken),
    ]
}

/// Composition root tying the entity store to the rule engine: every
/// committed batch is followed by one rule pass over the resulting
/// `(previous, current)` snapshot pair.
pub struct Tracker {
    store: EntityStore,
    engine: RuleEngine,
}

impl Tracker {
    pub fn new(engine: RuleEngine) -> Self {
        Self {
            store: EntityStore::new(),
            engine,
        }
    }

    pub fn with_default_rules() -> Self {
        Self::new(RuleEngine::new(default_rules()))
    }

    pub fn state(&self) -> &State {
        self.store.state()
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Commits a batch and runs one rule pass over it. Mutations the pass
    /// requests are applied to the same transition without re-entering the
    /// engine; rules are pure in the snapshot pair, so their own output is
    /// already a fixpoint.
    pub fn dispatch(&mut self, mutations: Vec<Mutation>) {
        self.store.commit(mutations);
        let follow_ups = self
            .engine
            .evaluate(self.store.previous(), self.store.state());
        self.store.apply_all(follow_ups);
    }

    /// Explicit user dismissal. Deletes without a rule pass so a still-true
    /// condition cannot resurrect the notification in the same instant.
    pub fn dismiss(&mut self, id: &str) {
        self.store
            .apply_all(vec![Mutation::DeleteNotification { id: id.to_string() }]);
    }
}

pub enum AppCommand {
    Sync,
    Notifications,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("finwatch starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let mut tracker = Tracker::with_default_rules();
    let seed = config
        .currencies
        .iter()
        .map(|c| {
            Mutation::UpsertCurrency(Currency {
                id: format!("cur-{}", c.code.to_lowercase()),
                code: c.code.clone(),
                sync: c.sync.clone(),
                rates: Vec::new(),
            })
        })
        .collect();
    tracker.dispatch(seed);

    if let AppCommand::Sync = command {
        let backend: Arc<dyn CacheBackend> = match config
            .default_data_path()
            .ok()
            .and_then(|path| FjallBackend::open(&path.join("cache")).ok())
        {
            Some(backend) => Arc::new(backend),
            None => Arc::new(MemoryBackend::new()),
        };
        let cache = DailyCache::new("exchange-rates", backend);
        let provider = HttpRateProvider::new(&config.rates.base_url);
        let service = RateService::new(provider, cache, RetryPolicy::default());
        let options = sync::SyncOptions {
            token: config.rates.api_key.clone().unwrap_or_default(),
            online: true,
        };
        sync::sync_currencies(&mut tracker, &service, &options).await;

        for currency in &tracker.state().currencies {
            println!("{}: {} rate point(s)", currency.code, currency.rates.len());
        }
    }

    for notification in tracker.state().active_notifications() {
        if let Some(metadata) = tracker.engine().display(&notification) {
            println!("! {} — {}", metadata.title, metadata.message);
        }
    }

    Ok(())
}
