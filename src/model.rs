//! Domain entities shared by the store, the rate sync and the rule engine.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Which remote endpoint shape a currency is synced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Currency,
    Crypto,
    Stock,
}

impl Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SyncKind::Currency => "currency",
                SyncKind::Crypto => "crypto",
                SyncKind::Stock => "stock",
            }
        )
    }
}

impl FromStr for SyncKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "currency" => Ok(SyncKind::Currency),
            "crypto" => Ok(SyncKind::Crypto),
            "stock" => Ok(SyncKind::Stock),
            _ => Err(anyhow::anyhow!("Invalid sync kind: {}", s)),
        }
    }
}

/// Ticker plus endpoint selector, attached to a [`Currency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub kind: SyncKind,
    pub ticker: String,
}

/// One point of a monthly exchange-rate series. `month` is the first of the
/// month; `value` is the close price against the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub month: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub sync: Option<SyncConfig>,
    #[serde(default)]
    pub rates: Vec<ExchangeRate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Debt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub balance: f64,
    pub currency: String,
    pub kind: AccountKind,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub notes: String,
}

/// User-level settings, including the milestone ratchet fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub base_currency: String,
    /// Last net-worth milestone the user was notified about.
    pub net_worth_milestone: f64,
    /// Last debt milestone; `None` until the debt rule has seen a balance.
    pub debt_milestone: Option<f64>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            net_worth_milestone: 0.0,
            debt_milestone: None,
        }
    }
}

/// Background sync health, written by the sync orchestrator and read by the
/// sync-status notification rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub currency_broken: bool,
    pub cloud_failure_streak: u32,
}

/// An active notification. At most one per rule id; existence means active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub contents: String,
}
