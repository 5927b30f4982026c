//! Entity store: state snapshots plus the mutation dispatch surface.
//!
//! The store exclusively owns all entities. The rule engine and the sync
//! orchestrator never touch `State` directly; they request changes as
//! [`Mutation`] values. A committed batch produces exactly one
//! `(previous, current)` snapshot transition, however many mutations it
//! contains, so rules always see one consistent pair per logical change.

use crate::model::{
    Account, Category, Currency, ExchangeRate, Notification, SyncStatus, Transaction, UserSettings,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub accounts: Vec<Account>,
    pub categories: Vec<Category>,
    pub currencies: Vec<Currency>,
    pub transactions: Vec<Transaction>,
    pub user: UserSettings,
    pub sync: SyncStatus,
    /// Active notifications, rule id -> contents.
    pub notifications: BTreeMap<String, String>,
}

impl State {
    pub fn notification(&self, id: &str) -> Option<&str> {
        self.notifications.get(id).map(String::as_str)
    }

    pub fn active_notifications(&self) -> Vec<Notification> {
        self.notifications
            .iter()
            .map(|(id, contents)| Notification {
                id: id.clone(),
                contents: contents.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    UpsertAccount(Account),
    UpsertCategory(Category),
    UpsertCurrency(Currency),
    UpsertTransaction(Transaction),
    SetUser(UserSettings),
    SetCurrencyRates {
        currency_id: String,
        rates: Vec<ExchangeRate>,
    },
    SetNetWorthMilestone(f64),
    SetDebtMilestone(f64),
    SetCurrencySyncBroken(bool),
    SetCloudFailureStreak(u32),
    UpsertNotification {
        id: String,
        contents: String,
    },
    DeleteNotification {
        id: String,
    },
}

fn upsert_by_id<T>(items: &mut Vec<T>, item: T, id_of: impl Fn(&T) -> &str) {
    match items.iter().position(|existing| id_of(existing) == id_of(&item)) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

#[derive(Default)]
pub struct EntityStore {
    current: State,
    previous: Option<State>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: State) -> Self {
        Self {
            current: state,
            previous: None,
        }
    }

    pub fn state(&self) -> &State {
        &self.current
    }

    pub fn previous(&self) -> Option<&State> {
        self.previous.as_ref()
    }

    /// Applies a batch of mutations as a single snapshot transition.
    pub fn commit(&mut self, mutations: Vec<Mutation>) {
        self.previous = Some(self.current.clone());
        for mutation in mutations {
            self.apply(mutation);
        }
    }

    /// Applies mutations to the current state without starting a new
    /// snapshot transition. Used for rule-engine output, which belongs to
    /// the transition that produced it.
    pub fn apply_all(&mut self, mutations: Vec<Mutation>) {
        for mutation in mutations {
            self.apply(mutation);
        }
    }

    fn apply(&mut self, mutation: Mutation) {
        let state = &mut self.current;
        match mutation {
            Mutation::UpsertAccount(account) => {
                upsert_by_id(&mut state.accounts, account, |a| &a.id)
            }
            Mutation::UpsertCategory(category) => {
                upsert_by_id(&mut state.categories, category, |c| &c.id)
            }
            Mutation::UpsertCurrency(currency) => {
                upsert_by_id(&mut state.currencies, currency, |c| &c.id)
            }
            Mutation::UpsertTransaction(transaction) => {
                upsert_by_id(&mut state.transactions, transaction, |t| &t.id)
            }
            Mutation::SetUser(user) => state.user = user,
            Mutation::SetCurrencyRates { currency_id, rates } => {
                if let Some(currency) = state
                    .currencies
                    .iter_mut()
                    .find(|c| c.id == currency_id)
                {
                    currency.rates = rates;
                }
            }
            Mutation::SetNetWorthMilestone(value) => state.user.net_worth_milestone = value,
            Mutation::SetDebtMilestone(value) => state.user.debt_milestone = Some(value),
            Mutation::SetCurrencySyncBroken(broken) => state.sync.currency_broken = broken,
            Mutation::SetCloudFailureStreak(streak) => state.sync.cloud_failure_streak = streak,
            Mutation::UpsertNotification { id, contents } => {
                state.notifications.insert(id, contents);
            }
            Mutation::DeleteNotification { id } => {
                state.notifications.remove(&id);
            }
        }
    }
}
