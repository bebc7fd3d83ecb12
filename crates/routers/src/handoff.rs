//! Simulated queue of conversations waiting for a human agent.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::ttl_cache::TtlCache;

/// Position handed to a conversation entering the human queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffTicket {
    pub position: u64,
    pub estimated_wait: String,
}

const TICKET_TTL: Duration = Duration::from_secs(3600);
const MAX_TICKETS: usize = 10_000;
/// Positions at or below this are served within the short wait window.
const SHORT_QUEUE: u64 = 5;

/// Tickets expire after [`TICKET_TTL`]; the position counts only the
/// conversations still waiting.
pub struct HandoffQueue {
    agents_available: AtomicBool,
    tickets: Mutex<TtlCache<HandoffTicket>>,
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self::with_ttl(TICKET_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            agents_available: AtomicBool::new(true),
            tickets: Mutex::new(TtlCache::new(ttl, MAX_TICKETS)),
        }
    }

    pub fn set_agents_available(&self, available: bool) {
        self.agents_available.store(available, Ordering::Relaxed);
    }

    /// Enqueue `message_id`. A message already in the queue keeps its ticket.
    pub fn enqueue(&self, message_id: &str) -> HandoffTicket {
        let mut tickets = self.tickets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ticket) = tickets.get(message_id) {
            return ticket.clone();
        }
        let position = tickets.len() as u64 + 1;
        let estimated_wait = match (self.agents_available.load(Ordering::Relaxed), position) {
            (false, _) => "30+ minutes",
            (true, p) if p <= SHORT_QUEUE => "5-10 minutes",
            (true, _) => "15-30 minutes",
        };
        let ticket = HandoffTicket {
            position,
            estimated_wait: estimated_wait.to_string(),
        };
        tickets.insert(message_id, ticket.clone());
        ticket
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_increase_and_repeat_for_the_same_message() {
        let queue = HandoffQueue::new();
        let first = queue.enqueue("m-1");
        let second = queue.enqueue("m-2");
        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
        assert_eq!(queue.enqueue("m-1"), first);
    }

    #[test]
    fn wait_estimate_depends_on_queue_and_agents() {
        let queue = HandoffQueue::new();
        for i in 0..SHORT_QUEUE {
            assert_eq!(queue.enqueue(&format!("m-{i}")).estimated_wait, "5-10 minutes");
        }
        assert_eq!(queue.enqueue("late").estimated_wait, "15-30 minutes");

        queue.set_agents_available(false);
        assert_eq!(queue.enqueue("closed").estimated_wait, "30+ minutes");
    }

    #[test]
    fn expired_tickets_leave_the_queue() {
        let queue = HandoffQueue::with_ttl(Duration::from_millis(20));
        for i in 0..1000 {
            queue.enqueue(&format!("old-{i}"));
        }
        std::thread::sleep(Duration::from_millis(40));

        let fresh = queue.enqueue("fresh");
        assert_eq!(fresh.position, 1);
        assert_eq!(fresh.estimated_wait, "5-10 minutes");
        assert_eq!(queue.enqueue("next").position, 2);
    }
}
