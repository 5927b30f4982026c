//! Uncategorised-transaction counting.

use crate::model::Notification;
use crate::rules::{DisplayMetadata, NotificationAction, NotificationRule, RuleContext};
use crate::store::State;
use anyhow::Result;

pub const RULE_ID: &str = "uncategorised-transactions";

pub struct UncategorisedTransactions;

fn uncategorised_count(state: &State) -> usize {
    state
        .transactions
        .iter()
        .filter(|t| match &t.category_id {
            // A category id pointing at a deleted category is just as
            // uncategorised as no id at all.
            Some(id) => !state.categories.iter().any(|c| &c.id == id),
            None => true,
        })
        .count()
}

impl NotificationRule for UncategorisedTransactions {
    fn id(&self) -> &'static str {
        RULE_ID
    }

    fn evaluate(
        &self,
        previous: Option<&State>,
        current: &State,
        ctx: &mut RuleContext,
    ) -> Result<()> {
        // Counting scans every transaction; skip when nothing it depends on
        // changed since the last pass.
        if let Some(previous) = previous {
            if previous.transactions == current.transactions
                && previous.categories == current.categories
            {
                return Ok(());
            }
        }

        let count = uncategorised_count(current);
        if count == 0 {
            ctx.ensure_inactive(RULE_ID);
        } else {
            ctx.ensure_active(RULE_ID, count.to_string());
        }
        Ok(())
    }

    fn display(&self, notification: &Notification) -> DisplayMetadata {
        DisplayMetadata {
            icon: "tag",
            title: "Uncategorised transactions".to_string(),
            message: format!(
                "{} transaction(s) have no category yet.",
                notification.contents
            ),
            actions: vec![
                NotificationAction::OpenTransactions,
                NotificationAction::Dismiss,
            ],
        }
    }
}
