//! Notification rule engine.
//!
//! Rules are stateless evaluators registered once at startup in a fixed
//! order. After every committed state change the engine runs each rule
//! against the `(previous, current)` snapshot pair; rules request
//! notification writes through the idempotent [`RuleContext`] primitives and
//! never mutate state themselves. A failing rule is logged and skipped so it
//! cannot block the pass for the others.

pub mod accounts;
pub mod milestone;
pub mod sync_status;
pub mod transactions;

use crate::model::Notification;
use crate::store::{Mutation, State};
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::warn;

/// Action buttons a notification can expose. Purely presentational; the
/// surrounding application decides what each one dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Dismiss,
    OpenAccounts,
    OpenTransactions,
    RetrySync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMetadata {
    pub icon: &'static str,
    pub title: String,
    pub message: String,
    pub actions: Vec<NotificationAction>,
}

/// Write surface handed to rules during one evaluation pass.
///
/// Holds a working copy of the notification map so that the primitives can
/// no-op when the desired end state already holds, and so that later rules
/// observe writes made by earlier rules in the same pass.
pub struct RuleContext {
    notifications: BTreeMap<String, String>,
    mutations: Vec<Mutation>,
}

impl RuleContext {
    pub fn new(current: &State) -> Self {
        Self {
            notifications: current.notifications.clone(),
            mutations: Vec::new(),
        }
    }

    /// Creates or overwrites the notification. No-op when it already holds
    /// exactly these contents.
    pub fn ensure_active(&mut self, id: &str, contents: String) {
        if self.notifications.get(id) == Some(&contents) {
            return;
        }
        self.notifications.insert(id.to_string(), contents.clone());
        self.mutations.push(Mutation::UpsertNotification {
            id: id.to_string(),
            contents,
        });
    }

    /// Deletes the notification if present; otherwise a no-op.
    pub fn ensure_inactive(&mut self, id: &str) {
        if self.notifications.remove(id).is_some() {
            self.mutations
                .push(Mutation::DeleteNotification { id: id.to_string() });
        }
    }

    /// Queues a non-notification mutation, e.g. a milestone ratchet update.
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Reads a notification, including writes from earlier in this pass.
    pub fn notification(&self, id: &str) -> Option<&str> {
        self.notifications.get(id).map(String::as_str)
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

pub trait NotificationRule: Send + Sync {
    fn id(&self) -> &'static str;

    /// Recomputes the rule's signal from scratch. `previous` is `None` on
    /// the first pass after startup.
    fn evaluate(
        &self,
        previous: Option<&State>,
        current: &State,
        ctx: &mut RuleContext,
    ) -> Result<()>;

    /// Pure mapping from a stored notification to presentation metadata.
    fn display(&self, notification: &Notification) -> DisplayMetadata;
}

/// Ordered, immutable rule registry.
pub struct RuleEngine {
    rules: Vec<Box<dyn NotificationRule>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Box<dyn NotificationRule>>) -> Self {
        Self { rules }
    }

    /// Runs every rule once, in registration order, and returns the
    /// mutations the pass requested. A rule error skips that rule only.
    pub fn evaluate(&self, previous: Option<&State>, current: &State) -> Vec<Mutation> {
        let mut ctx = RuleContext::new(current);
        for rule in &self.rules {
            if let Err(e) = rule.evaluate(previous, current, &mut ctx) {
                warn!(rule = rule.id(), error = %e, "Rule evaluation failed, skipping");
            }
        }
        ctx.into_mutations()
    }

    pub fn display(&self, notification: &Notification) -> Option<DisplayMetadata> {
        self.rules
            .iter()
            .find(|rule| rule.id() == notification.id)
            .map(|rule| rule.display(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_ensure_active_is_idempotent() {
        let state = State::default();
        let mut ctx = RuleContext::new(&state);

        ctx.ensure_active("r1", "hello".to_string());
        ctx.ensure_active("r1", "hello".to_string());

        let mutations = ctx.into_mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(
            mutations[0],
            Mutation::UpsertNotification {
                id: "r1".to_string(),
                contents: "hello".to_string(),
            }
        );
    }

    #[test]
    fn test_ensure_active_skips_already_committed_contents() {
        let mut state = State::default();
        state
            .notifications
            .insert("r1".to_string(), "hello".to_string());
        let mut ctx = RuleContext::new(&state);

        ctx.ensure_active("r1", "hello".to_string());
        assert!(ctx.into_mutations().is_empty());
    }

    #[test]
    fn test_ensure_active_overwrites_changed_contents() {
        let mut state = State::default();
        state
            .notifications
            .insert("r1".to_string(), "old".to_string());
        let mut ctx = RuleContext::new(&state);

        ctx.ensure_active("r1", "new".to_string());
        assert_eq!(ctx.into_mutations().len(), 1);
    }

    #[test]
    fn test_ensure_inactive_is_idempotent() {
        let mut state = State::default();
        state
            .notifications
            .insert("r1".to_string(), "hello".to_string());
        let mut ctx = RuleContext::new(&state);

        ctx.ensure_inactive("r1");
        ctx.ensure_inactive("r1");
        ctx.ensure_inactive("never-existed");

        let mutations = ctx.into_mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(
            mutations[0],
            Mutation::DeleteNotification {
                id: "r1".to_string()
            }
        );
    }

    struct AlwaysActive(&'static str);

    impl NotificationRule for AlwaysActive {
        fn id(&self) -> &'static str {
            self.0
        }

        fn evaluate(
            &self,
            _previous: Option<&State>,
            _current: &State,
            ctx: &mut RuleContext,
        ) -> Result<()> {
            ctx.ensure_active(self.0, "on".to_string());
            Ok(())
        }

        fn display(&self, notification: &Notification) -> DisplayMetadata {
            DisplayMetadata {
                icon: "bell",
                title: self.0.to_string(),
                message: notification.contents.clone(),
                actions: vec![NotificationAction::Dismiss],
            }
        }
    }

    struct Broken;

    impl NotificationRule for Broken {
        fn id(&self) -> &'static str {
            "broken"
        }

        fn evaluate(
            &self,
            _previous: Option<&State>,
            _current: &State,
            _ctx: &mut RuleContext,
        ) -> Result<()> {
            Err(anyhow!("boom"))
        }

        fn display(&self, _notification: &Notification) -> DisplayMetadata {
            unreachable!()
        }
    }

    #[test]
    fn test_failing_rule_does_not_block_the_pass() {
        let engine = RuleEngine::new(vec![
            Box::new(AlwaysActive("first")),
            Box::new(Broken),
            Box::new(AlwaysActive("last")),
        ]);

        let mutations = engine.evaluate(None, &State::default());
        assert_eq!(mutations.len(), 2);
    }

    #[test]
    fn test_display_maps_by_rule_id() {
        let engine = RuleEngine::new(vec![Box::new(AlwaysActive("first"))]);

        let metadata = engine
            .display(&Notification {
                id: "first".to_string(),
                contents: "on".to_string(),
            })
            .unwrap();
        assert_eq!(metadata.title, "first");
        assert_eq!(metadata.message, "on");

        assert!(
            engine
                .display(&Notification {
                    id: "unknown".to_string(),
                    contents: String::new(),
                })
                .is_none()
        );
    }
}
