//! Rules deriving notifications from background sync health.

use crate::model::Notification;
use crate::rules::{DisplayMetadata, NotificationAction, NotificationRule, RuleContext};
use crate::store::State;
use anyhow::Result;

pub const CURRENCY_SYNC_RULE_ID: &str = "currency-sync-broken";
pub const CLOUD_SYNC_RULE_ID: &str = "cloud-sync-broken";

/// Consecutive cloud sync failures tolerated before notifying.
pub const CLOUD_FAILURE_THRESHOLD: u32 = 3;

pub struct CurrencySyncBroken;

impl NotificationRule for CurrencySyncBroken {
    fn id(&self) -> &'static str {
        CURRENCY_SYNC_RULE_ID
    }

    fn evaluate(
        &self,
        _previous: Option<&State>,
        current: &State,
        ctx: &mut RuleContext,
    ) -> Result<()> {
        if current.sync.currency_broken {
            ctx.ensure_active(CURRENCY_SYNC_RULE_ID, "1".to_string());
        } else {
            ctx.ensure_inactive(CURRENCY_SYNC_RULE_ID);
        }
        Ok(())
    }

    fn display(&self, _notification: &Notification) -> DisplayMetadata {
        DisplayMetadata {
            icon: "cloud-off",
            title: "Currency sync failed".to_string(),
            message: "Exchange rates could not be updated. Existing rates are kept.".to_string(),
            actions: vec![NotificationAction::RetrySync, NotificationAction::Dismiss],
        }
    }
}

pub struct CloudSyncBroken;

impl NotificationRule for CloudSyncBroken {
    fn id(&self) -> &'static str {
        CLOUD_SYNC_RULE_ID
    }

    fn evaluate(
        &self,
        _previous: Option<&State>,
        current: &State,
        ctx: &mut RuleContext,
    ) -> Result<()> {
        let streak = current.sync.cloud_failure_streak;
        if streak >= CLOUD_FAILURE_THRESHOLD {
            ctx.ensure_active(CLOUD_SYNC_RULE_ID, streak.to_string());
        } else {
            ctx.ensure_inactive(CLOUD_SYNC_RULE_ID);
        }
        Ok(())
    }

    fn display(&self, notification: &Notification) -> DisplayMetadata {
        DisplayMetadata {
            icon: "cloud-off",
            title: "Cloud sync failing".to_string(),
            message: format!(
                "The last {} attempts to sync your data failed.",
                notification.contents
            ),
            actions: vec![NotificationAction::RetrySync, NotificationAction::Dismiss],
        }
    }
}
