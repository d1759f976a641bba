//! Client Protocol
//!
//! Messages exchanged between a client and its session worker. Clients send
//! batches of input values; sessions answer with render commands.
//!
//! Messages are internally tagged by `type` and encode either as MessagePack
//! (struct fields as maps, so the schema is self-describing) or as JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::render::RenderKind;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client to session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// New input values, applied as one external event.
    Update { inputs: IndexMap<String, Value> },
    /// End the session.
    Close,
}

/// Session to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Render {
        name: String,
        kind: RenderKind,
        payload: Value,
    },
    Clear {
        name: String,
    },
    Error {
        name: String,
        message: String,
    },
    /// The session has ended; no further messages follow.
    Closed,
}

impl ClientMessage {
    /// Build an update from `(name, value)` pairs.
    pub fn update<I, K>(inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        ClientMessage::Update {
            inputs: inputs.into_iter().map(|(name, value)| (name.into(), value)).collect(),
        }
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_json(source: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(source)?)
    }
}

impl ServerMessage {
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_decodes_from_json() {
        let message = ClientMessage::from_json(r#"{"type":"update","inputs":{"state":"NY","bins":30}}"#).unwrap();

        assert_eq!(message, ClientMessage::update([("state", json!("NY")), ("bins", json!(30))]));
    }

    #[test]
    fn update_survives_msgpack() {
        let message = ClientMessage::update([("cities", json!(["Albany", "Buffalo"]))]);
        let bytes = message.to_msgpack().unwrap();

        assert_eq!(ClientMessage::from_msgpack(&bytes).unwrap(), message);
    }

    #[test]
    fn render_serializes_with_tag() {
        let message = ServerMessage::Render {
            name: "plot".into(),
            kind: RenderKind::Plot,
            payload: json!({"x": [1, 2]}),
        };

        assert_eq!(
            message.to_json().unwrap(),
            r#"{"type":"render","name":"plot","kind":"plot","payload":{"x":[1,2]}}"#
        );
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            ClientMessage::from_msgpack(&[0xc1]),
            Err(ProtocolError::Decode(_))
        ));
    }
}
