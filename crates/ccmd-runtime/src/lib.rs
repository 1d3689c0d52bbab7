mod cancel;
mod context;
mod functions;
mod helpers;
mod limiter;
mod options;
mod outcome;
mod registry;
mod render;
mod rng;
mod sanitize;
mod session;
mod snapshot;

pub use cancel::CancelToken;
pub use context::Context;
pub use functions::actions::{
    install_base_actions, MentionControl, MessageControl, ReactionControl, RoleControl,
    BASE_ACTIONS_EXTENSION,
};
pub use functions::builtins::{builtin_table, Builtin};
pub use limiter::CallLimiter;
pub use options::{ActionLimits, ContextOptions};
pub use outcome::RenderOutcome;
pub use registry::{
    template_fn, CallEnv, Extension, ExtensionRegistry, FunctionTable, TemplateFunction,
};
pub use sanitize::{sanitize_mentions, MentionPolicy};
pub use session::{DeletionIntent, Session};
pub use snapshot::{DataBag, Snapshot};

pub use rhai::Dynamic;
