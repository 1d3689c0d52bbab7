use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard, TryLockError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::{ChannelSnapshot, GuildSnapshot, MemberSnapshot, UserSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub color: i64,
    #[serde(default)]
    pub mentionable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub channel_id: i64,
    pub author: User,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildState {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner_id: i64,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub channel_ids: Vec<i64>,
}

impl GuildState {
    /// Copy without the channel and role lists.
    pub fn light_copy(&self) -> GuildSnapshot {
        GuildSnapshot {
            id: self.id,
            name: self.name.clone(),
            icon: self.icon.clone(),
            owner_id: self.owner_id,
            member_count: self.member_count,
        }
    }

    pub fn role_directory(&self) -> Vec<Role> {
        self.roles.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Category,
    News,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub id: i64,
    #[serde(default)]
    pub guild_id: i64,
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub position: i64,
}

impl ChannelState {
    pub fn copy(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            id: self.id,
            guild_id: self.guild_id,
            name: self.name.clone(),
            topic: self.topic.clone(),
            kind: self.kind,
            nsfw: self.nsfw,
            position: self.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberState {
    #[serde(default)]
    pub guild_id: i64,
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<i64>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

impl MemberState {
    pub fn display_name(&self) -> &str {
        match self.nick.as_deref() {
            Some(nick) if !nick.is_empty() => nick,
            _ => &self.user.username,
        }
    }

    pub fn copy(&self) -> MemberSnapshot {
        MemberSnapshot {
            guild_id: self.guild_id,
            name: self.display_name().to_string(),
            nick: self.nick.clone().unwrap_or_default(),
            roles: self.roles.clone(),
            joined_at: self.joined_at,
            user: self.user_copy(),
        }
    }

    pub fn user_copy(&self) -> UserSnapshot {
        UserSnapshot::from(&self.user)
    }
}

/// Shared handle to a live record that other threads keep updating.
///
/// Readers only ever hold the lock for the duration of the closure passed to
/// [`StateHandle::read_with`].
#[derive(Debug, Default)]
pub struct StateHandle<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for StateHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StateHandle<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    pub fn read_with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        read(&guard)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `None` while any reader or writer holds the lock.
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        match self.inner.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;

    fn member(nick: Option<&str>) -> MemberState {
        MemberState {
            guild_id: 1,
            user: User {
                id: 7,
                username: "alice".to_string(),
                discriminator: "0001".to_string(),
                bot: false,
            },
            nick: nick.map(str::to_string),
            roles: vec![10, 11],
            joined_at: None,
        }
    }

    #[test]
    fn display_name_prefers_non_empty_nick() {
        assert_eq!(member(None).display_name(), "alice");
        assert_eq!(member(Some("")).display_name(), "alice");
        assert_eq!(member(Some("Al")).display_name(), "Al");
        assert_eq!(member(Some("Al")).copy().name, "Al");
    }

    #[test]
    fn light_copy_drops_role_and_channel_lists() {
        let guild = GuildState {
            id: 1,
            name: "Test".to_string(),
            roles: vec![Role {
                id: 2,
                name: "mods".to_string(),
                ..Role::default()
            }],
            channel_ids: vec![3, 4],
            ..GuildState::default()
        };
        let copy = guild.light_copy();
        assert_eq!(copy.name, "Test");
        let json = serde_json::to_value(&copy).expect("snapshot should serialize");
        assert!(json.get("Roles").is_none());
        assert!(json.get("ChannelIDs").is_none());
        assert_eq!(guild.role_directory().len(), 1);
    }

    #[test]
    fn state_handle_write_is_blocked_only_while_reading() {
        let handle = StateHandle::new(member(None));
        handle.read_with(|_| {
            assert!(handle.try_write().is_none());
        });
        {
            let mut guard = handle.try_write().expect("lock should be free");
            guard.nick = Some("Ally".to_string());
        }
        assert_eq!(handle.read_with(|state| state.display_name().to_string()), "Ally");
        handle.write().roles.push(12);
        assert_eq!(handle.read_with(|state| state.roles.len()), 3);
    }

    #[test]
    fn live_records_deserialize_from_camel_case_json() {
        let guild: GuildState = serde_json::from_str(
            r#"{"id": 5, "name": "Test", "ownerId": 9, "roles": [{"id": 1, "name": "a"}]}"#,
        )
        .expect("guild json");
        assert_eq!(guild.owner_id, 9);
        assert_eq!(guild.roles[0].position, 0);

        let member: MemberState = serde_json::from_str(
            r#"{"user": {"id": 1, "username": "bob"}, "joinedAt": "2020-01-02T03:04:05Z"}"#,
        )
        .expect("member json");
        assert!(member.joined_at.is_some());
    }
}
