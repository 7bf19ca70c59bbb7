use serde::{Deserialize, Serialize};

pub const PART_NAME_TEXT: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Payload carried by one part. Exactly one shape per part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartData {
    Text(String),
    FileUri(String),
    Blob(Vec<u8>),
    FunctionCall {
        id: String,
        name: String,
        args: serde_json::Map<String, serde_json::Value>,
    },
    FunctionResponse(FunctionContent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionContent {
    Text(String),
    Uri(String),
    Blob(Vec<u8>),
}

/// Typed content fragment: a name, a media type and one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub mime: String,
    pub data: PartData,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            name: PART_NAME_TEXT.to_string(),
            mime: gantry_codec::MIME_TEXT.to_string(),
            data: PartData::Text(text.into()),
        }
    }

    pub fn file_uri(name: impl Into<String>, mime: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: PartData::FileUri(uri.into()),
        }
    }

    pub fn blob(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: PartData::Blob(data),
        }
    }

    pub fn function_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let name = name.into();
        Self {
            name: name.clone(),
            mime: gantry_codec::MIME_JSON.to_string(),
            data: PartData::FunctionCall {
                id: id.into(),
                name,
                args,
            },
        }
    }

    pub fn function_response(name: impl Into<String>, content: FunctionContent) -> Self {
        Self {
            name: name.into(),
            mime: gantry_codec::MIME_TEXT.to_string(),
            data: PartData::FunctionResponse(content),
        }
    }

    pub fn is_plain_text(&self) -> bool {
        matches!(self.data, PartData::Text(_)) && self.mime.starts_with("text/plain")
    }
}

/// One conversation turn: a role plus an ordered sequence of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self::new(Role::System).with_part(Part::text(text))
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User).with_part(Part::text(text))
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant).with_part(Part::text(text))
    }

    /// All plain-text part contents joined by newline; `None` when the
    /// message carries no text.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match &part.data {
                PartData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_parts_with_newline() {
        let message = Message::new(Role::User)
            .with_part(Part::text("one"))
            .with_part(Part::text("two"));
        assert_eq!(message.text().as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn text_is_none_without_text_parts() {
        let message =
            Message::new(Role::User).with_part(Part::blob("img", "image/png", vec![1, 2]));
        assert!(message.text().is_none());
    }
}
