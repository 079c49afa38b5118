//! Typed secrets: the plaintext that goes inside an envelope.
//!
//! A [`Secret`] is a shared header (title, description) plus one of four
//! bodies. It is serialized to JSON before sealing; the `type` tag inside
//! the JSON doubles as the header's type discriminator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator persisted in the `type_id` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecretKind {
    Card,
    Auth,
    Text,
    Binary,
}

impl SecretKind {
    pub fn type_id(self) -> i64 {
        match self {
            SecretKind::Card => 1,
            SecretKind::Auth => 2,
            SecretKind::Text => 3,
            SecretKind::Binary => 4,
        }
    }

    pub fn from_type_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(SecretKind::Card),
            2 => Some(SecretKind::Auth),
            3 => Some(SecretKind::Text),
            4 => Some(SecretKind::Binary),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecretKind::Card => "card",
            SecretKind::Auth => "auth",
            SecretKind::Text => "text",
            SecretKind::Binary => "binary",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecretKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "card" => Ok(SecretKind::Card),
            "auth" | "login" => Ok(SecretKind::Auth),
            "text" | "note" => Ok(SecretKind::Text),
            "binary" | "file" => Ok(SecretKind::Binary),
            other => Err(format!("unknown secret type: {}", other)),
        }
    }
}

/// Variant payload of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum SecretBody {
    Card {
        cardholder: String,
        pan: String,
        expiration_month: u8,
        expiration_year: u16,
        code: String,
    },
    Auth {
        login: String,
        password: String,
    },
    Text {
        text: String,
    },
    Binary {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        content_type: String,
        filename: String,
    },
}

impl SecretBody {
    pub fn kind(&self) -> SecretKind {
        match self {
            SecretBody::Card { .. } => SecretKind::Card,
            SecretBody::Auth { .. } => SecretKind::Auth,
            SecretBody::Text { .. } => SecretKind::Text,
            SecretBody::Binary { .. } => SecretKind::Binary,
        }
    }
}

/// A complete secret as the user sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub body: SecretBody,
}

impl Secret {
    pub fn new(title: impl Into<String>, description: impl Into<String>, body: SecretBody) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            body,
        }
    }

    pub fn kind(&self) -> SecretKind {
        self.body.kind()
    }

    pub fn type_id(&self) -> i64 {
        self.kind().type_id()
    }

    pub fn header(&self) -> SecretHeader {
        SecretHeader {
            type_id: self.type_id(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

/// The plaintext columns stored next to the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretHeader {
    pub type_id: i64,
    pub title: String,
    pub description: String,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ids_are_stable() {
        assert_eq!(SecretKind::Card.type_id(), 1);
        assert_eq!(SecretKind::Auth.type_id(), 2);
        assert_eq!(SecretKind::Text.type_id(), 3);
        assert_eq!(SecretKind::Binary.type_id(), 4);
        for id in 1..=4 {
            assert_eq!(SecretKind::from_type_id(id).unwrap().type_id(), id);
        }
        assert!(SecretKind::from_type_id(0).is_none());
        assert!(SecretKind::from_type_id(5).is_none());
    }

    #[test]
    fn json_carries_header_and_tag() {
        let secret = Secret::new(
            "github",
            "work account",
            SecretBody::Auth {
                login: "alice".to_string(),
                password: "hunter2".to_string(),
            },
        );

        let value = serde_json::to_value(&secret).unwrap();
        assert_eq!(value["type"], "AUTH");
        assert_eq!(value["title"], "github");
        assert_eq!(value["description"], "work account");
        assert_eq!(value["login"], "alice");

        let back: Secret = serde_json::from_value(value).unwrap();
        assert_eq!(back, secret);
    }

    #[test]
    fn binary_data_is_base64_in_json() {
        let secret = Secret::new(
            "key file",
            "",
            SecretBody::Binary {
                data: vec![0, 1, 2, 255],
                content_type: "application/octet-stream".to_string(),
                filename: "id.bin".to_string(),
            },
        );

        let value = serde_json::to_value(&secret).unwrap();
        assert_eq!(value["data"], "AAEC/w==");
        assert_eq!(serde_json::from_value::<Secret>(value).unwrap(), secret);
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let json = r#"{"type":"SSH","title":"x","description":""}"#;
        assert!(serde_json::from_str::<Secret>(json).is_err());
    }

    #[test]
    fn kind_parses_from_cli_names() {
        assert_eq!("card".parse::<SecretKind>().unwrap(), SecretKind::Card);
        assert_eq!("LOGIN".parse::<SecretKind>().unwrap(), SecretKind::Auth);
        assert_eq!("note".parse::<SecretKind>().unwrap(), SecretKind::Text);
        assert!("ssh".parse::<SecretKind>().is_err());
    }
}
