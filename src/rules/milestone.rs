//! Net-worth and debt milestone rules.
//!
//! Both use a ratchet against a value stored on the user entity: a new
//! notification fires only when the freshly computed milestone crosses the
//! stored one (upward for net worth, downward for debt). Milestones are
//! rounded to "nice" human values: the power of ten below the balance,
//! bumped to twice or five times that power when the balance clears it,
//! giving the 10k / 20k / 50k / 100k sequence.

use crate::model::{AccountKind, Notification};
use crate::rules::{DisplayMetadata, NotificationAction, NotificationRule, RuleContext};
use crate::store::{Mutation, State};
use anyhow::Result;

pub const NET_WORTH_RULE_ID: &str = "net-worth-milestone";
pub const DEBT_RULE_ID: &str = "debt-milestone";

/// Net-worth milestones below this are too trivial to announce.
pub const MILESTONE_FLOOR: f64 = 10_000.0;

/// Rounds down to the nearest nice value: `10^floor(log10(v))`, bumped x2 or
/// x5 when the value clears that multiple.
pub fn nice_milestone(value: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    let power = 10f64.powf(value.log10().floor());
    if value >= power * 5.0 {
        power * 5.0
    } else if value >= power * 2.0 {
        power * 2.0
    } else {
        power
    }
}

fn net_worth(state: &State) -> f64 {
    state
        .accounts
        .iter()
        .filter(|a| !a.closed)
        .map(|a| match a.kind {
            AccountKind::Asset => a.balance,
            AccountKind::Debt => -a.balance,
        })
        .sum()
}

/// Total outstanding debt as a positive magnitude.
fn total_debt(state: &State) -> f64 {
    state
        .accounts
        .iter()
        .filter(|a| !a.closed && a.kind == AccountKind::Debt)
        .map(|a| a.balance)
        .sum()
}

pub struct NetWorthMilestone;

impl NotificationRule for NetWorthMilestone {
    fn id(&self) -> &'static str {
        NET_WORTH_RULE_ID
    }

    fn evaluate(
        &self,
        _previous: Option<&State>,
        current: &State,
        ctx: &mut RuleContext,
    ) -> Result<()> {
        let milestone = nice_milestone(net_worth(current));
        if milestone >= MILESTONE_FLOOR && milestone > current.user.net_worth_milestone {
            ctx.ensure_active(NET_WORTH_RULE_ID, format!("{milestone}"));
            ctx.push(Mutation::SetNetWorthMilestone(milestone));
        }
        Ok(())
    }

    fn display(&self, notification: &Notification) -> DisplayMetadata {
        DisplayMetadata {
            icon: "trophy",
            title: "Net worth milestone".to_string(),
            message: format!("Your net worth passed {}.", notification.contents),
            actions: vec![NotificationAction::Dismiss],
        }
    }
}

pub struct DebtMilestone;

impl NotificationRule for DebtMilestone {
    fn id(&self) -> &'static str {
        DEBT_RULE_ID
    }

    fn evaluate(
        &self,
        _previous: Option<&State>,
        current: &State,
        ctx: &mut RuleContext,
    ) -> Result<()> {
        let debt = total_debt(current);
        match current.user.debt_milestone {
            // First sighting of debt seeds the ratchet silently.
            None => {
                if debt > 0.0 {
                    ctx.push(Mutation::SetDebtMilestone(nice_milestone(debt)));
                }
            }
            Some(last) => {
                if debt == 0.0 {
                    if last > 0.0 {
                        ctx.ensure_active(DEBT_RULE_ID, "0".to_string());
                        ctx.push(Mutation::SetDebtMilestone(0.0));
                    }
                } else {
                    let milestone = nice_milestone(debt);
                    if milestone < last {
                        ctx.ensure_active(DEBT_RULE_ID, format!("{milestone}"));
                        ctx.push(Mutation::SetDebtMilestone(milestone));
                    }
                }
            }
        }
        Ok(())
    }

    fn display(&self, notification: &Notification) -> DisplayMetadata {
        if notification.contents == "0" {
            DisplayMetadata {
                icon: "party",
                title: "Debt fully paid".to_string(),
                message: "Every debt account is at zero.".to_string(),
                actions: vec![NotificationAction::Dismiss],
            }
        } else {
            DisplayMetadata {
                icon: "trending-down",
                title: "Debt shrinking".to_string(),
                message: format!(
                    "Your remaining debt has fallen into the {} range.",
                    notification.contents
                ),
                actions: vec![NotificationAction::Dismiss],
            }
        }
    }
}
