use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ClientError(pub String);

/// Remote chat-platform operations available to action functions.
///
/// Calls are synchronous: the render thread blocks until they return.
pub trait ChatClient: Send + Sync {
    fn send_direct_message(&self, user_id: i64, content: &str) -> Result<(), ClientError>;
    fn add_member_role(&self, guild_id: i64, user_id: i64, role_id: i64)
        -> Result<(), ClientError>;
    fn remove_member_role(
        &self,
        guild_id: i64,
        user_id: i64,
        role_id: i64,
    ) -> Result<(), ClientError>;
    fn add_reaction(&self, channel_id: i64, message_id: i64, emoji: &str)
        -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientAction {
    #[serde(rename_all = "camelCase")]
    DirectMessage { user_id: i64, content: String },
    #[serde(rename_all = "camelCase")]
    AddRole {
        guild_id: i64,
        user_id: i64,
        role_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    RemoveRole {
        guild_id: i64,
        user_id: i64,
        role_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    Reaction {
        channel_id: i64,
        message_id: i64,
        emoji: String,
    },
}

/// In-memory client that records every call instead of talking to a server.
#[derive(Debug, Default)]
pub struct RecordingClient {
    actions: Mutex<Vec<ClientAction>>,
    failure: Option<String>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `message` and nothing is recorded.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    pub fn actions(&self) -> Vec<ClientAction> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, action: ClientAction) -> Result<(), ClientError> {
        if let Some(message) = &self.failure {
            return Err(ClientError(message.clone()));
        }
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
        Ok(())
    }
}

impl ChatClient for RecordingClient {
    fn send_direct_message(&self, user_id: i64, content: &str) -> Result<(), ClientError> {
        self.record(ClientAction::DirectMessage {
            user_id,
            content: content.to_string(),
        })
    }

    fn add_member_role(
        &self,
        guild_id: i64,
        user_id: i64,
        role_id: i64,
    ) -> Result<(), ClientError> {
        self.record(ClientAction::AddRole {
            guild_id,
            user_id,
            role_id,
        })
    }

    fn remove_member_role(
        &self,
        guild_id: i64,
        user_id: i64,
        role_id: i64,
    ) -> Result<(), ClientError> {
        self.record(ClientAction::RemoveRole {
            guild_id,
            user_id,
            role_id,
        })
    }

    fn add_reaction(
        &self,
        channel_id: i64,
        message_id: i64,
        emoji: &str,
    ) -> Result<(), ClientError> {
        self.record(ClientAction::Reaction {
            channel_id,
            message_id,
            emoji: emoji.to_string(),
        })
    }
}

#[cfg(test)]
mod client_tests {
    use super::*;

    #[test]
    fn recording_client_keeps_call_order() {
        let client = RecordingClient::new();
        client.add_member_role(1, 2, 3).expect("add role");
        client.add_reaction(4, 5, "👍").expect("reaction");
        assert_eq!(
            client.actions(),
            vec![
                ClientAction::AddRole {
                    guild_id: 1,
                    user_id: 2,
                    role_id: 3
                },
                ClientAction::Reaction {
                    channel_id: 4,
                    message_id: 5,
                    emoji: "👍".to_string()
                },
            ]
        );
    }

    #[test]
    fn failing_client_records_nothing() {
        let client = RecordingClient::failing("offline");
        let error = client
            .send_direct_message(1, "hi")
            .expect_err("call should fail");
        assert_eq!(error.to_string(), "offline");
        assert!(client.actions().is_empty());
    }

    #[test]
    fn actions_serialize_with_kind_tag() {
        let json = serde_json::to_value(ClientAction::DirectMessage {
            user_id: 1,
            content: "x".to_string(),
        })
        .expect("action json");
        assert_eq!(json["kind"], "directMessage");
        assert_eq!(json["userId"], 1);
    }
}
