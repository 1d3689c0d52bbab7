use std::collections::BTreeMap;
use std::sync::Arc;

use ccmd_core::{
    ChannelState, ChatClient, GuildState, MemberState, Message, RenderError, StateHandle,
    TemplateError,
};
use rhai::Dynamic;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::functions::builtins::builtin_table;
use crate::options::ContextOptions;
use crate::outcome::RenderOutcome;
use crate::registry::{CallEnv, ExtensionRegistry, FunctionTable, TemplateFunction};
use crate::render::{render, RenderInput};
use crate::rng::seed_from_clock;
use crate::sanitize::{sanitize_mentions, MentionPolicy};
use crate::session::{DeletionIntent, Session};
use crate::snapshot::{DataBag, Snapshot};

/// One rendering session for one triggering event.
///
/// Counters, mention grants and deletion intents accumulate across every
/// [`Context::execute`] call; the data bag is rebuilt each time.
#[derive(Debug)]
pub struct Context {
    guild: Option<StateHandle<GuildState>>,
    channel: Option<StateHandle<ChannelState>>,
    member: Option<StateHandle<MemberState>>,
    message: Option<Message>,
    options: ContextOptions,
    functions: FunctionTable,
    data: DataBag,
    session: Session,
    cancel: Option<CancelToken>,
}

impl Context {
    /// Binds the handles and runs every extension in `registry`.
    pub fn new(
        registry: &ExtensionRegistry,
        guild: Option<StateHandle<GuildState>>,
        channel: Option<StateHandle<ChannelState>>,
        member: Option<StateHandle<MemberState>>,
        options: ContextOptions,
    ) -> Self {
        let seed = options.random_seed.unwrap_or_else(seed_from_clock);
        let mut context = Self {
            guild,
            channel,
            member,
            message: None,
            options,
            functions: FunctionTable::new(),
            data: DataBag::default(),
            session: Session::new(seed),
            cancel: None,
        };
        registry.apply(&mut context);
        debug!(
            extensions = registry.len(),
            functions = context.functions.len(),
            "context created"
        );
        context
    }

    /// Attaches the message that triggered the command.
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Installs `function` under `name`, replacing any earlier entry.
    pub fn register_function(&mut self, name: impl Into<String>, function: Arc<dyn TemplateFunction>) {
        self.functions.insert(name, function);
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&mut CallEnv<'_>, &[Dynamic]) -> Result<Dynamic, TemplateError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name, Arc::new(function));
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn guild_handle(&self) -> Option<&StateHandle<GuildState>> {
        self.guild.as_ref()
    }

    pub fn channel_handle(&self) -> Option<&StateHandle<ChannelState>> {
        self.channel.as_ref()
    }

    pub fn member_handle(&self) -> Option<&StateHandle<MemberState>> {
        self.member.as_ref()
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Same counters the action functions use.
    pub fn check_and_increment(&mut self, key: &str, limit: u64) -> bool {
        self.session.check_and_increment(key, limit)
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        self.session.counters()
    }

    /// Data bag of the most recent [`Context::execute`].
    pub fn data(&self) -> &DataBag {
        &self.data
    }

    pub fn mention_policy(&self) -> &MentionPolicy {
        &self.session.mentions
    }

    pub fn deletion(&self) -> &DeletionIntent {
        &self.session.deletion
    }

    /// Snapshots the bound state, renders `source` and sanitizes the result.
    pub fn execute(&mut self, client: Arc<dyn ChatClient>, source: &str) -> RenderOutcome {
        let snapshot = Snapshot::capture(
            self.guild.as_ref(),
            self.channel.as_ref(),
            self.member.as_ref(),
        );

        let message = match self.trigger_message(&snapshot) {
            Ok(message) => message,
            Err(error) => return self.fail_fast(error),
        };
        self.data = match snapshot.data_bag() {
            Ok(data) => data,
            Err(error) => return self.fail_fast(error),
        };
        debug!(keys = self.data.len(), "data bag rebuilt");

        let functions = self.functions.merged_over(builtin_table());
        let roles = snapshot.roles.clone();
        let outcome = render(
            RenderInput {
                source,
                functions: &functions,
                data: &self.data,
                snapshot,
                message,
                client,
                options: &self.options,
                cancel: self.cancel.clone(),
            },
            &mut self.session,
        );

        let policy = &self.session.mentions;
        let outcome = match outcome {
            RenderOutcome::Success(output) => {
                RenderOutcome::Success(sanitize_mentions(&output, policy, &roles))
            }
            RenderOutcome::PartialFailure { output, error } => RenderOutcome::PartialFailure {
                output: sanitize_mentions(&output, policy, &roles),
                error,
            },
            fatal @ RenderOutcome::Fatal(_) => fatal,
        };

        match outcome.error() {
            Some(error) => warn!(
                stage = %error.stage(),
                code = error.code(),
                error = %error,
                "template render failed"
            ),
            None => debug!(bytes = outcome.output().len(), "template rendered"),
        }
        outcome
    }

    fn trigger_message(&self, snapshot: &Snapshot) -> Result<Message, TemplateError> {
        if let Some(message) = &self.message {
            return Ok(message.clone());
        }
        let Some(guild_id) = snapshot.guild_id() else {
            return Err(TemplateError::new(
                "CONTEXT_NO_TRIGGER",
                "A context needs a triggering message or a server.",
            ));
        };
        let channel_id = snapshot
            .channel
            .as_ref()
            .map(|channel| channel.id)
            .unwrap_or(guild_id);
        Ok(Message {
            id: 0,
            channel_id,
            author: self.options.bot_user.clone(),
            content: String::new(),
        })
    }

    fn fail_fast(&mut self, error: TemplateError) -> RenderOutcome {
        self.data = DataBag::default();
        let error = RenderError::Context(error);
        warn!(code = error.code(), error = %error, "render context rejected");
        RenderOutcome::Fatal(error)
    }
}
