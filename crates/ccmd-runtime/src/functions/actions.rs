//! Functions that change what happens around a render: mention grants,
//! role changes, deletions, direct messages and reactions.
//!
//! Each family is one capability type; [`install_base_actions`] wires them
//! into a context under their template names.

use std::sync::Arc;

use ccmd_core::{ClientError, TemplateError};
use rhai::Dynamic;
use tracing::warn;

use crate::context::Context;
use crate::functions::args::{arg, flatten_args, optional_int_arg, strict_int, text_arg};
use crate::helpers::rhai_bridge::dynamic_to_text;
use crate::registry::{CallEnv, TemplateFunction};
use crate::sanitize::{sanitize_mentions, MentionPolicy};
use crate::session::clamp_delay;

/// Registry name of the extension that installs the base actions.
pub const BASE_ACTIONS_EXTENSION: &str = "base-actions";

const SEND_DM_KEY: &str = "send_dm";
const ADD_ROLE_KEY: &str = "add_role_id";
const REMOVE_ROLE_KEY: &str = "remove_role_id";
const REACTIONS_KEY: &str = "add_reactions";

/// Mention grants. Each call unlocks the matching mention for the final
/// sanitizing pass and returns the mention text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionControl {
    Everyone,
    Here,
    RoleName,
    RoleId,
}

impl TemplateFunction for MentionControl {
    fn call(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
        match self {
            Self::Everyone => {
                env.session.mentions.everyone = true;
                Ok(Dynamic::from("@everyone".to_string()))
            }
            Self::Here => {
                env.session.mentions.here = true;
                Ok(Dynamic::from("@here".to_string()))
            }
            Self::RoleName => {
                let name = text_arg(args, 0, env.name)?;
                env.session.mentions.allow_role_name(&name);
                let mention = env
                    .snapshot
                    .role_by_name(&name)
                    .map(|role| role_mention(role.id))
                    .unwrap_or_default();
                Ok(Dynamic::from(mention))
            }
            Self::RoleId => {
                let role_id = id_arg(args, 0, env.name)?;
                env.session.mentions.allow_role_id(role_id);
                Ok(Dynamic::from(role_mention(role_id)))
            }
        }
    }
}

/// Member role queries and mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleControl {
    HasName,
    HasId,
    AddId,
    RemoveId,
}

impl TemplateFunction for RoleControl {
    fn call(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
        match self {
            Self::HasName => {
                let name = text_arg(args, 0, env.name)?;
                let Some(member) = &env.snapshot.member else {
                    return Ok(Dynamic::from_bool(false));
                };
                let found = env.snapshot.roles.iter().any(|role| {
                    role.name.eq_ignore_ascii_case(&name) && member.roles.contains(&role.id)
                });
                Ok(Dynamic::from_bool(found))
            }
            Self::HasId => {
                let role_id = id_arg(args, 0, env.name)?;
                let found = env
                    .snapshot
                    .member
                    .as_ref()
                    .is_some_and(|member| member.roles.contains(&role_id));
                Ok(Dynamic::from_bool(found))
            }
            Self::AddId | Self::RemoveId => self.mutate(env, args),
        }
    }
}

impl RoleControl {
    fn mutate(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
        let key = if *self == Self::AddId {
            ADD_ROLE_KEY
        } else {
            REMOVE_ROLE_KEY
        };
        if env.session.check_and_increment(key, env.limits.role_mutations) {
            return Err(TemplateError::new(
                "ACTION_LIMIT_EXCEEDED",
                format!(
                    "{}() may run at most {} times per command.",
                    env.name, env.limits.role_mutations
                ),
            ));
        }

        let role_id = id_arg(args, 0, env.name)?;
        let (Some(guild_id), Some(user)) = (env.snapshot.guild_id(), env.snapshot.user()) else {
            return Err(TemplateError::new(
                "ACTION_CONTEXT_MISSING",
                format!("{}() needs a server and a member.", env.name),
            ));
        };

        let result = if *self == Self::AddId {
            env.client.add_member_role(guild_id, user.id, role_id)
        } else {
            env.client.remove_member_role(guild_id, user.id, role_id)
        };
        result.map_err(|error| client_error(env.name, error))?;
        Ok(Dynamic::from(String::new()))
    }
}

/// Deletion intents and direct messages tied to the triggering message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageControl {
    DeleteResponse,
    DeleteTrigger,
    SendDm,
}

impl TemplateFunction for MessageControl {
    fn call(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
        match self {
            Self::DeleteResponse => {
                let delay = optional_int_arg(args, 0, env.name)?.unwrap_or(0);
                env.session.deletion.delete_response = true;
                env.session.deletion.response_delay_secs = clamp_delay(delay);
            }
            Self::DeleteTrigger => {
                let delay = optional_int_arg(args, 0, env.name)?.unwrap_or(0);
                env.session.deletion.delete_trigger = true;
                env.session.deletion.trigger_delay_secs = clamp_delay(delay);
            }
            Self::SendDm => send_direct_message(env, args)?,
        }
        Ok(Dynamic::from(String::new()))
    }
}

fn send_direct_message(env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<(), TemplateError> {
    let Some(user_id) = env.snapshot.user().map(|user| user.id) else {
        return Ok(());
    };
    if env.session.check_and_increment(SEND_DM_KEY, env.limits.send_dm) {
        return Ok(());
    }

    let body: String = args.iter().map(dynamic_to_text).collect::<Vec<_>>().join(" ");
    let server = env
        .snapshot
        .guild
        .as_ref()
        .map(|guild| guild.name.as_str())
        .unwrap_or_default();
    let content = sanitize_mentions(
        &format!("Custom Command DM from the server **{}**\n{}", server, body),
        &MentionPolicy::deny_all(),
        &env.snapshot.roles,
    );
    env.client
        .send_direct_message(user_id, &content)
        .map_err(|error| client_error(env.name, error))
}

/// Reactions on the message that triggered the command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionControl;

impl TemplateFunction for ReactionControl {
    fn call(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
        if env
            .session
            .check_and_increment(REACTIONS_KEY, env.limits.reactions)
        {
            return Err(TemplateError::new(
                "ACTION_LIMIT_EXCEEDED",
                format!(
                    "{}() may run at most {} times per command.",
                    env.name, env.limits.reactions
                ),
            ));
        }

        let (channel_id, message_id) = (env.message.channel_id, env.message.id);
        for emoji in flatten_args(args) {
            let emoji = dynamic_to_text(&emoji);
            env.client
                .add_reaction(channel_id, message_id, &emoji)
                .map_err(|error| client_error(env.name, error))?;
        }
        Ok(Dynamic::from(String::new()))
    }
}

/// Installs every base action on `context`.
pub fn install_base_actions(context: &mut Context) {
    let entries: [(&str, Arc<dyn TemplateFunction>); 12] = [
        ("sendDM", Arc::new(MessageControl::SendDm)),
        ("mentionEveryone", Arc::new(MentionControl::Everyone)),
        ("mentionHere", Arc::new(MentionControl::Here)),
        ("mentionRoleName", Arc::new(MentionControl::RoleName)),
        ("mentionRoleID", Arc::new(MentionControl::RoleId)),
        ("hasRoleName", Arc::new(RoleControl::HasName)),
        ("hasRoleID", Arc::new(RoleControl::HasId)),
        ("addRoleID", Arc::new(RoleControl::AddId)),
        ("removeRoleID", Arc::new(RoleControl::RemoveId)),
        ("deleteResponse", Arc::new(MessageControl::DeleteResponse)),
        ("deleteTrigger", Arc::new(MessageControl::DeleteTrigger)),
        ("addReactions", Arc::new(ReactionControl)),
    ];
    for (name, function) in entries {
        context.register_function(name, function);
    }
}

fn role_mention(role_id: i64) -> String {
    format!("<@&{}>", role_id)
}

fn id_arg(args: &[Dynamic], index: usize, name: &str) -> Result<i64, TemplateError> {
    let value = arg(args, index, name)?;
    strict_int(value).ok_or_else(|| {
        TemplateError::new(
            "ACTION_ARG_INVALID",
            format!(
                "{}() expects an id, got \"{}\".",
                name,
                dynamic_to_text(value)
            ),
        )
    })
}

fn client_error(name: &str, error: ClientError) -> TemplateError {
    warn!(function = name, %error, "chat client call failed");
    TemplateError::new("ACTION_CLIENT_ERROR", format!("{}(): {}", name, error))
}
