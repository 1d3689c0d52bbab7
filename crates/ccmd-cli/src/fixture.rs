use std::fs;
use std::path::Path;

use ccmd_core::{ChannelState, GuildState, MemberState, Message, StateHandle, TemplateError};
use ccmd_runtime::{Context, ContextOptions, ExtensionRegistry};
use serde::Deserialize;
use tracing::debug;

use crate::{map_cli_world_invalid, map_cli_world_read};

/// Server state a template renders against, loaded from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct WorldFixture {
    pub(crate) guild: Option<GuildState>,
    pub(crate) channel: Option<ChannelState>,
    pub(crate) member: Option<MemberState>,
    pub(crate) message: Option<Message>,
    pub(crate) options: ContextOptions,
}

impl WorldFixture {
    /// Wraps each record in its own handle and binds them to a new context.
    pub(crate) fn into_context(self, registry: &ExtensionRegistry, seed: Option<u32>) -> Context {
        let mut options = self.options;
        if seed.is_some() {
            options.random_seed = seed;
        }
        let context = Context::new(
            registry,
            self.guild.map(StateHandle::new),
            self.channel.map(StateHandle::new),
            self.member.map(StateHandle::new),
            options,
        );
        match self.message {
            Some(message) => context.with_message(message),
            None => context,
        }
    }
}

pub(crate) fn load_world(path: &Path) -> Result<WorldFixture, TemplateError> {
    if !path.exists() {
        return Err(TemplateError::new(
            "CLI_WORLD_NOT_FOUND",
            format!("World file does not exist: {}", path.display()),
        ));
    }

    let raw = fs::read_to_string(path).map_err(map_cli_world_read)?;
    let world: WorldFixture = serde_json::from_str(&raw).map_err(map_cli_world_invalid)?;
    debug!(
        path = %path.display(),
        guild = world.guild.is_some(),
        channel = world.channel.is_some(),
        member = world.member.is_some(),
        message = world.message.is_some(),
        "loaded world fixture"
    );
    Ok(world)
}
