use std::collections::BTreeMap;

use ccmd_core::{
    ChannelSnapshot, ChannelState, GuildSnapshot, GuildState, MemberSnapshot, MemberState, Role,
    StateHandle, TemplateError, UserSnapshot,
};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

const GUILD_KEYS: [&str; 3] = ["Guild", "Server", "server"];
const CHANNEL_KEYS: [&str; 2] = ["Channel", "channel"];
const MEMBER_KEYS: [&str; 1] = ["Member"];
const USER_KEYS: [&str; 2] = ["User", "user"];

/// Every key a data bag can hold. Keys of absent handles still resolve to unit
/// in templates, so `{{ if Member }}` is simply false without a member.
pub(crate) fn data_keys() -> impl Iterator<Item = &'static str> {
    GUILD_KEYS
        .into_iter()
        .chain(CHANNEL_KEYS)
        .chain(MEMBER_KEYS)
        .chain(USER_KEYS)
}

/// Copies of server, channel and member state taken for one render.
///
/// Nothing in here points back at the live records, so rendering never needs
/// their locks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub guild: Option<GuildSnapshot>,
    pub roles: Vec<Role>,
    pub channel: Option<ChannelSnapshot>,
    pub member: Option<MemberSnapshot>,
}

impl Snapshot {
    /// Read-locks each present handle just long enough to copy it.
    pub fn capture(
        guild: Option<&StateHandle<GuildState>>,
        channel: Option<&StateHandle<ChannelState>>,
        member: Option<&StateHandle<MemberState>>,
    ) -> Self {
        let (guild, roles) = match guild {
            Some(handle) => {
                handle.read_with(|state| (Some(state.light_copy()), state.role_directory()))
            }
            None => (None, Vec::new()),
        };
        let channel = channel.map(|handle| handle.read_with(ChannelState::copy));
        let member = member.map(|handle| handle.read_with(MemberState::copy));
        trace!(
            guild = guild.is_some(),
            channel = channel.is_some(),
            member = member.is_some(),
            "captured state snapshot"
        );

        Self {
            guild,
            roles,
            channel,
            member,
        }
    }

    pub fn guild_id(&self) -> Option<i64> {
        self.guild.as_ref().map(|guild| guild.id)
    }

    pub fn user(&self) -> Option<&UserSnapshot> {
        self.member.as_ref().map(|member| &member.user)
    }

    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|role| role.name == name)
    }

    /// Template-facing values, each stored under every alias templates use.
    pub fn data_bag(&self) -> Result<DataBag, TemplateError> {
        let mut bag = DataBag::default();
        if let Some(guild) = &self.guild {
            bag.insert_aliased(&GUILD_KEYS, guild)?;
        }
        if let Some(channel) = &self.channel {
            bag.insert_aliased(&CHANNEL_KEYS, channel)?;
        }
        if let Some(member) = &self.member {
            bag.insert_aliased(&MEMBER_KEYS, member)?;
            bag.insert_aliased(&USER_KEYS, &member.user)?;
        }
        Ok(bag)
    }
}

/// Named values a template reads as constants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBag {
    values: BTreeMap<String, Value>,
}

impl DataBag {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert_aliased(&mut self, keys: &[&str], value: &impl Serialize) -> Result<(), TemplateError> {
        let value = serde_json::to_value(value).map_err(|error| {
            TemplateError::new("CONTEXT_SNAPSHOT", format!("Snapshot encode failed: {}", error))
        })?;
        for key in keys {
            self.values.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }
}
