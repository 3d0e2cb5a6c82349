//! Wire format for the C6 streaming socket: newline-delimited JSON, one
//! object per line. Sync/serde-only — no I/O here, `roguehunterd` owns
//! the socket.

use serde::{Deserialize, Serialize};

use crate::model::SampleBatch;

/// Messages the server sends to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InitialState {
        samples: Vec<SampleBatch>,
        sample_count: usize,
    },
    Sample(#[serde(flatten)] SampleBatch),
}

/// Messages a client may send to the server at will.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Log {
        source: String,
        level: String,
        message: String,
        #[serde(default)]
        fields: serde_json::Map<String, serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SampleBatch;

    #[test]
    fn initial_state_round_trips() {
        let msg = ServerMessage::InitialState {
            samples: vec![SampleBatch::empty(0.0)],
            sample_count: 1,
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn sample_serializes_as_flattened_batch_with_type_tag() {
        let batch = SampleBatch::empty(5.0);
        let msg = ServerMessage::Sample(batch);
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "sample");
        assert_eq!(value["timestamp"], 5.0);
    }

    #[test]
    fn client_log_message_parses() {
        let text = r#"{"type":"log","source":"viewer","level":"info","message":"hi","fields":{}}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        match msg {
            ClientMessage::Log { source, level, message, .. } => {
                assert_eq!(source, "viewer");
                assert_eq!(level, "info");
                assert_eq!(message, "hi");
            }
        }
    }
}
