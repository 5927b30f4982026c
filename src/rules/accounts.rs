//! Stale-account detection.

use crate::model::Notification;
use crate::rules::{DisplayMetadata, NotificationAction, NotificationRule, RuleContext};
use crate::store::State;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

pub const RULE_ID: &str = "stale-accounts";

/// Days without a new transaction before an account counts as stale.
pub const STALE_AFTER_DAYS: i64 = 30;

/// Payload entry, JSON-encoded into the notification contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleAccount {
    pub id: String,
    /// Days since the account's newest transaction.
    pub age: i64,
}

pub struct StaleAccounts;

fn stale_accounts(state: &State, today: NaiveDate) -> Vec<StaleAccount> {
    let mut stale = Vec::new();
    for account in state.accounts.iter().filter(|a| !a.closed) {
        // Accounts with no transactions at all are not nagged about.
        let Some(newest) = state
            .transactions
            .iter()
            .filter(|t| t.account_id == account.id)
            .map(|t| t.date)
            .max()
        else {
            continue;
        };
        let age = (today - newest).num_days();
        if age > STALE_AFTER_DAYS {
            stale.push(StaleAccount {
                id: account.id.clone(),
                age,
            });
        }
    }
    stale.sort_by(|a, b| a.id.cmp(&b.id));
    stale
}

impl NotificationRule for StaleAccounts {
    fn id(&self) -> &'static str {
        RULE_ID
    }

    fn evaluate(
        &self,
        _previous: Option<&State>,
        current: &State,
        ctx: &mut RuleContext,
    ) -> Result<()> {
        let stale = stale_accounts(current, Local::now().date_naive());
        if stale.is_empty() {
            ctx.ensure_inactive(RULE_ID);
        } else {
            let contents =
                serde_json::to_string(&stale).context("Failed to encode stale accounts")?;
            ctx.ensure_active(RULE_ID, contents);
        }
        Ok(())
    }

    fn display(&self, notification: &Notification) -> DisplayMetadata {
        let count = serde_json::from_str::<Vec<StaleAccount>>(&notification.contents)
            .map(|stale| stale.len())
            .unwrap_or(0);
        DisplayMetadata {
            icon: "clock",
            title: "Accounts need attention".to_string(),
            message: format!(
                "{count} account(s) have no transactions in the last {STALE_AFTER_DAYS} days."
            ),
            actions: vec![NotificationAction::OpenAccounts, NotificationAction::Dismiss],
        }
    }
}
