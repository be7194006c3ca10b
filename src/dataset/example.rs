/// Training example records
///
/// One record per image, serialized as a single JSONL line:
///
/// ```json
/// {"messages":[
///   {"role":"system","content":"..."},
///   {"role":"user","content":"..."},
///   {"role":"user","content":[{"type":"image_url","image_url":{"url":"..."}}]},
///   {"role":"assistant","content":"BIRADS 3"}]}
/// ```
///
/// The prompt text and the image are two separate user turns; the
/// fine-tuning consumer expects exactly this shape.

use serde::{Deserialize, Serialize};

/// Prefix of the assistant answer, followed by a space and the label
pub const ANSWER_PREFIX: &str = "BIRADS";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub messages: Vec<Message>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Either plain text or a list of typed content blocks
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
        }
    }

    pub fn image(role: Role, url: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.into() },
            }]),
        }
    }
}

impl TrainingExample {
    /// Build the four-turn conversation for one image
    pub fn new(image_reference: impl Into<String>, label: &str, system_message: &str, user_text: &str) -> Self {
        Self {
            messages: vec![
                Message::text(Role::System, system_message),
                Message::text(Role::User, user_text),
                Message::image(Role::User, image_reference),
                Message::text(Role::Assistant, answer_for(label)),
            ],
        }
    }

    /// The image reference carried by the image turn
    #[cfg(test)]
    pub fn image_reference(&self) -> Option<&str> {
        self.messages.iter().find_map(|message| match &message.content {
            Content::Parts(parts) => parts.iter().find_map(|part| match part {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
            }),
            Content::Text(_) => None,
        })
    }

    /// The assistant's answer text
    pub fn answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == Role::Assistant)
            .and_then(|message| match &message.content {
                Content::Text(text) => Some(text.as_str()),
                Content::Parts(_) => None,
            })
    }

    /// Compact single-line JSON, no trailing newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// "BIRADS <label>"
pub fn answer_for(label: &str) -> String {
    format!("{} {}", ANSWER_PREFIX, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_four_turn_shape() {
        let example = TrainingExample::new("https://host/img.png", "4", "sys", "what?");
        let value: Value = serde_json::from_str(&example.to_json_line().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "what?"},
                    {"role": "user", "content": [
                        {"type": "image_url", "image_url": {"url": "https://host/img.png"}}
                    ]},
                    {"role": "assistant", "content": "BIRADS 4"}
                ]
            })
        );
    }

    #[test]
    fn test_json_line_is_compact() {
        let example = TrainingExample::new("u", "1", "a\nb", "c");
        let line = example.to_json_line().unwrap();

        assert!(!line.contains('\n'));
        assert!(line.starts_with(r#"{"messages":[{"role":"system""#));
    }

    #[test]
    fn test_accessors_and_parse_back() {
        let example = TrainingExample::new("data:image/png;base64,AAAA", "2", "s", "u");
        assert_eq!(example.image_reference(), Some("data:image/png;base64,AAAA"));
        assert_eq!(example.answer(), Some("BIRADS 2"));

        let parsed: TrainingExample = serde_json::from_str(&example.to_json_line().unwrap()).unwrap();
        assert_eq!(parsed, example);
    }
}
