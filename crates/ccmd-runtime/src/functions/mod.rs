pub mod actions;
pub(crate) mod args;
pub mod builtins;
