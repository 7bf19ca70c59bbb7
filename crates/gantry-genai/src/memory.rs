use std::collections::HashMap;

use crate::error::{GenAiError, GenAiResult};
use crate::exchange::Exchange;

/// Conversation history keyed by session id. Implementations are
/// single-threaded by contract; callers serialise writes externally.
pub trait Memory: Send {
    /// Upsert by exchange id: an existing exchange with the same id is
    /// replaced in place, preserving order.
    fn add(&mut self, session_id: &str, exchange: Exchange);

    /// Last `n` exchanges in insertion order; `n <= 0` (or `n >= len`)
    /// returns them all.
    fn last(&self, session_id: &str, n: isize) -> Vec<Exchange>;

    /// Semantic lookup. The in-memory implementation ignores the query and
    /// returns the full history.
    fn fetch(&self, session_id: &str, query: &str) -> GenAiResult<Vec<Exchange>>;

    /// Drop the session's history entirely.
    fn erase(&mut self, session_id: &str);
}

/// Process-local, non-durable memory.
#[derive(Debug, Default)]
pub struct InMemory {
    sessions: HashMap<String, Vec<Exchange>>,
}

impl InMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Memory for InMemory {
    fn add(&mut self, session_id: &str, exchange: Exchange) {
        let exchanges = self.sessions.entry(session_id.to_string()).or_default();
        match exchanges.iter_mut().find(|existing| existing.id == exchange.id) {
            Some(existing) => *existing = exchange,
            None => exchanges.push(exchange),
        }
    }

    fn last(&self, session_id: &str, n: isize) -> Vec<Exchange> {
        let Some(exchanges) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        if n <= 0 || n as usize >= exchanges.len() {
            return exchanges.clone();
        }
        exchanges[exchanges.len() - n as usize..].to_vec()
    }

    fn fetch(&self, session_id: &str, _query: &str) -> GenAiResult<Vec<Exchange>> {
        self.sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| GenAiError::UnknownSession(session_id.to_string()))
    }

    fn erase(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn exchange(id: &str, text: &str) -> Exchange {
        let mut exchange = Exchange::with_id(id);
        exchange.append(Message::user_text(text));
        exchange
    }

    #[test]
    fn add_is_upsert_by_exchange_id() {
        let mut memory = InMemory::new();
        memory.add("s", exchange("e1", "first"));
        memory.add("s", exchange("e1", "second"));

        let all = memory.last("s", -1);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].texts_by_role(crate::Role::User), vec!["second"]);
    }

    #[test]
    fn upsert_preserves_order() {
        let mut memory = InMemory::new();
        memory.add("s", exchange("e1", "one"));
        memory.add("s", exchange("e2", "two"));
        memory.add("s", exchange("e1", "one again"));

        let all = memory.last("s", 0);
        assert_eq!(all[0].id, "e1");
        assert_eq!(all[1].id, "e2");
    }

    #[test]
    fn last_bounds_are_forgiving() {
        let mut memory = InMemory::new();
        memory.add("s", exchange("e1", "one"));
        memory.add("s", exchange("e2", "two"));
        memory.add("s", exchange("e3", "three"));

        assert_eq!(memory.last("s", 2).len(), 2);
        assert_eq!(memory.last("s", 2)[0].id, "e2");
        assert_eq!(memory.last("s", 99).len(), 3);
        assert_eq!(memory.last("s", -1).len(), 3);
        assert!(memory.last("other", 1).is_empty());
    }

    #[test]
    fn fetch_requires_a_known_session() {
        let mut memory = InMemory::new();
        memory.add("s", exchange("e1", "one"));
        assert_eq!(memory.fetch("s", "anything").unwrap().len(), 1);
        assert!(matches!(
            memory.fetch("nope", "anything"),
            Err(GenAiError::UnknownSession(_))
        ));
    }

    #[test]
    fn erase_removes_the_session() {
        let mut memory = InMemory::new();
        memory.add("s", exchange("e1", "one"));
        memory.erase("s");
        assert!(memory.last("s", -1).is_empty());
        assert!(memory.fetch("s", "").is_err());
    }
}
