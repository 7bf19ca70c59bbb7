use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::message::{Message, PartData, Role};

/// Ordered set of related messages grouped under a unique id — one turn or
/// subconversation, plus free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            properties: HashMap::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn prepend(&mut self, message: Message) {
        self.messages.insert(0, message);
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.properties.insert(key.into(), value);
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn messages_by_role(&self, roles: &[Role]) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|message| roles.contains(&message.role))
            .collect()
    }

    pub fn messages_by_mime(&self, mime: &str) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|message| message.parts.iter().any(|part| part.mime == mime))
            .collect()
    }

    /// Plain-text contents of every message with the given role, in order.
    pub fn texts_by_role(&self, role: Role) -> Vec<String> {
        self.messages
            .iter()
            .filter(|message| message.role == role)
            .flat_map(|message| {
                message.parts.iter().filter_map(|part| match &part.data {
                    PartData::Text(text) if part.is_plain_text() => Some(text.clone()),
                    _ => None,
                })
            })
            .collect()
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Part;

    #[test]
    fn prepend_puts_message_first() {
        let mut exchange = Exchange::new();
        exchange.append(Message::user_text("second"));
        exchange.prepend(Message::system_text("first"));
        assert_eq!(exchange.messages[0].role, Role::System);
        assert_eq!(exchange.last().unwrap().role, Role::User);
    }

    #[test]
    fn role_filter_selects_matching_messages() {
        let mut exchange = Exchange::new();
        exchange.append(Message::user_text("q"));
        exchange.append(Message::assistant_text("a"));
        assert_eq!(exchange.messages_by_role(&[Role::User]).len(), 1);
        assert_eq!(
            exchange
                .messages_by_role(&[Role::User, Role::Assistant])
                .len(),
            2
        );
    }

    #[test]
    fn texts_by_role_skips_non_text_parts() {
        let mut exchange = Exchange::new();
        let mut message = Message::user_text("what is rust?");
        message.parts.push(Part::blob("img", "image/png", vec![0]));
        exchange.append(message);
        assert_eq!(exchange.texts_by_role(Role::User), vec!["what is rust?"]);
        assert!(exchange.texts_by_role(Role::Assistant).is_empty());
    }
}
