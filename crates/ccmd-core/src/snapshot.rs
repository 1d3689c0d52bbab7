//! Immutable copies of live state handed to templates.
//!
//! Field names follow the PascalCase naming templates were written against
//! (`Server.Name`, `Member.User.ID`), independent of the live records' JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::{ChannelKind, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GuildSnapshot {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    #[serde(rename = "OwnerID")]
    pub owner_id: i64,
    pub member_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelSnapshot {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "GuildID")]
    pub guild_id: i64,
    pub name: String,
    pub topic: String,
    #[serde(rename = "Type")]
    pub kind: ChannelKind,
    #[serde(rename = "NSFW")]
    pub nsfw: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserSnapshot {
    #[serde(rename = "ID")]
    pub id: i64,
    pub username: String,
    pub discriminator: String,
    pub bot: bool,
}

impl From<&User> for UserSnapshot {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            discriminator: user.discriminator.clone(),
            bot: user.bot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MemberSnapshot {
    #[serde(rename = "GuildID")]
    pub guild_id: i64,
    pub name: String,
    pub nick: String,
    pub roles: Vec<i64>,
    pub joined_at: Option<DateTime<Utc>>,
    pub user: UserSnapshot,
}

#[cfg(test)]
mod snapshot_tests {
    use super::*;

    #[test]
    fn snapshots_serialize_with_template_field_names() {
        let member = MemberSnapshot {
            guild_id: 1,
            name: "alice".to_string(),
            nick: String::new(),
            roles: vec![3],
            joined_at: None,
            user: UserSnapshot {
                id: 2,
                username: "alice".to_string(),
                discriminator: "0001".to_string(),
                bot: false,
            },
        };
        let json = serde_json::to_value(&member).expect("member json");
        assert_eq!(json["GuildID"], 1);
        assert_eq!(json["Name"], "alice");
        assert_eq!(json["User"]["ID"], 2);
        assert_eq!(json["Roles"][0], 3);

        let channel = ChannelSnapshot {
            id: 4,
            guild_id: 1,
            name: "general".to_string(),
            topic: String::new(),
            kind: ChannelKind::Text,
            nsfw: false,
            position: 0,
        };
        let json = serde_json::to_value(&channel).expect("channel json");
        assert_eq!(json["Type"], "text");
        assert_eq!(json["NSFW"], false);
    }
}
