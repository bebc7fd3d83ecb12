//! Ordered, cursor-driven execution plan carried by every envelope.
//!
//! A [`Route`] is a value: every mutation returns a new route and leaves the
//! original untouched, so two envelopes can never alias one plan.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub steps: Vec<String>,
    pub current_step: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handler: Option<String>,
}

/// Raised by [`Route::check_bounds`] when the cursor sits outside `steps`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("route cursor {current_step} out of bounds for {len} steps")]
pub struct RouteBoundsError {
    pub current_step: usize,
    pub len: usize,
}

impl Route {
    pub fn new(steps: Vec<String>, error_handler: Option<String>) -> Self {
        Self {
            steps,
            current_step: 0,
            error_handler,
        }
    }

    /// Step about to run, `None` once the route is terminal.
    pub fn current(&self) -> Option<&str> {
        self.steps.get(self.current_step).map(String::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.current_step >= self.steps.len()
    }

    /// Steps after the cursor, in execution order.
    pub fn remaining(&self) -> &[String] {
        let from = (self.current_step + 1).min(self.steps.len());
        &self.steps[from..]
    }

    /// The same plan with the cursor moved one step forward.
    #[must_use]
    pub fn advanced(&self) -> Self {
        Self {
            current_step: (self.current_step + 1).min(self.steps.len()),
            ..self.clone()
        }
    }

    /// Address the envelope goes to next: the step under the cursor, or the
    /// aggregation address once the plan is exhausted.
    pub fn next_address<'a>(&'a self, aggregation: &'a str) -> &'a str {
        self.current().unwrap_or(aggregation)
    }

    /// Replace the whole plan and rewind the cursor to its first step.
    #[must_use]
    pub fn replace_remaining(&self, steps: Vec<String>) -> Self {
        Self {
            steps,
            current_step: 0,
            error_handler: self.error_handler.clone(),
        }
    }

    /// Insert `address` immediately after the cursor.
    ///
    /// Executed steps (everything up to and including the cursor) are kept
    /// as-is. Splicing a step that is already scheduled after the cursor
    /// returns an identical route, which keeps redelivered decisions
    /// idempotent.
    #[must_use]
    pub fn splice_after_current(&self, address: &str) -> Self {
        if self.remaining().iter().any(|s| s == address) {
            return self.clone();
        }
        let mut next = self.clone();
        let at = (self.current_step + 1).min(next.steps.len());
        next.steps.insert(at, address.to_string());
        next
    }

    /// Drop everything after the cursor and schedule `escalation` as the
    /// only remaining step. Escalation never returns to the main pipeline.
    #[must_use]
    pub fn insert_escalation_after_current(&self, escalation: &str) -> Self {
        let mut next = self.clone();
        let keep = (self.current_step + 1).min(next.steps.len());
        next.steps.truncate(keep);
        next.steps.push(escalation.to_string());
        next
    }

    /// Move the cursor to the first occurrence of `address`.
    #[must_use]
    pub fn retarget(&self, address: &str) -> Option<Self> {
        let idx = self.steps.iter().position(|s| s == address)?;
        Some(Self {
            current_step: idx,
            ..self.clone()
        })
    }

    /// Cursor for re-running `address`: unchanged when it already points
    /// there, else the first occurrence.
    #[must_use]
    pub fn retry_at(&self, address: &str) -> Option<Self> {
        if self.current() == Some(address) {
            return Some(self.clone());
        }
        self.retarget(address)
    }

    /// In-flight invariant: `0 <= current_step < len(steps)`.
    pub fn check_bounds(&self) -> Result<(), RouteBoundsError> {
        if self.current_step < self.steps.len() {
            Ok(())
        } else {
            Err(RouteBoundsError {
                current_step: self.current_step,
                len: self.steps.len(),
            })
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn route(steps: &[&str], cursor: usize) -> Route {
        Route {
            steps: steps.iter().map(|s| s.to_string()).collect(),
            current_step: cursor,
            error_handler: Some("escalation-router".into()),
        }
    }

    #[test]
    fn advance_walks_to_aggregation() {
        let r = route(&["a", "b"], 0);
        assert_eq!(r.next_address("agg"), "a");
        let r = r.advanced();
        assert_eq!(r.next_address("agg"), "b");
        let r = r.advanced();
        assert!(r.is_terminal());
        assert_eq!(r.next_address("agg"), "agg");
        assert!(r.check_bounds().is_err());
        // saturates at len
        assert_eq!(r.advanced().current_step, 2);
    }

    #[test]
    fn advanced_leaves_original_untouched() {
        let r = route(&["a", "b"], 0);
        let _ = r.advanced();
        assert_eq!(r.current_step, 0);
    }

    #[test]
    fn splice_preserves_prefix_and_inserts_after_cursor() {
        let r = route(&["a", "router", "c", "d"], 1);
        let spliced = r.splice_after_current("x");
        assert_eq!(spliced.steps, vec!["a", "router", "x", "c", "d"]);
        assert_eq!(spliced.current_step, 1);
        assert_eq!(&spliced.steps[..2], &r.steps[..2]);
    }

    #[test]
    fn splice_is_noop_when_already_scheduled() {
        let r = route(&["a", "router", "x", "c"], 1);
        assert_eq!(r.splice_after_current("x"), r);

        let later = route(&["a", "router", "c", "x"], 1);
        assert_eq!(later.splice_after_current("x"), later);
    }

    #[test]
    fn splice_twice_does_not_duplicate() {
        let r = route(&["a", "router", "c"], 1);
        let once = r.splice_after_current("x");
        let twice = once.splice_after_current("x");
        assert_eq!(once, twice);
    }

    #[test]
    fn splice_ignores_executed_prefix() {
        // "x" already ran before the cursor; a fresh run is still scheduled.
        let r = route(&["x", "router", "c"], 1);
        let spliced = r.splice_after_current("x");
        assert_eq!(spliced.steps, vec!["x", "router", "x", "c"]);
    }

    #[test]
    fn escalation_truncates_remaining() {
        let r = route(&["a", "router", "c", "d"], 1);
        let esc = r.insert_escalation_after_current("esc");
        assert_eq!(esc.steps, vec!["a", "router", "esc"]);
        assert_eq!(esc.advanced().current(), Some("esc"));
    }

    #[test]
    fn replace_remaining_rewinds_cursor() {
        let r = route(&["a", "router", "c"], 1);
        let replaced = r.replace_remaining(vec!["esc".into(), "agg".into()]);
        assert_eq!(replaced.current_step, 0);
        assert_eq!(replaced.current(), Some("esc"));
        assert_eq!(replaced.error_handler, r.error_handler);
    }

    #[test]
    fn retarget_finds_first_occurrence() {
        let r = route(&["a", "b", "c"], 2);
        assert_eq!(r.retarget("b").unwrap().current_step, 1);
        assert!(r.retarget("zzz").is_none());
    }

    #[test]
    fn retry_keeps_the_cursor_on_a_repeated_step() {
        let r = route(&["a", "b", "a", "c"], 2);
        assert_eq!(r.retry_at("a").unwrap().current_step, 2);
        assert_eq!(r.retry_at("b").unwrap().current_step, 1);
        assert!(r.retry_at("zzz").is_none());
    }

    #[test]
    fn serde_uses_camel_case() {
        let r = route(&["a"], 0);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["currentStep"], 0);
        assert_eq!(json["errorHandler"], "escalation-router");
    }
}
