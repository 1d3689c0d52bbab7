use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ccmd_core::{ChatClient, Message, TemplateError};
use rhai::Dynamic;

use crate::context::Context;
use crate::options::ActionLimits;
use crate::session::Session;
use crate::snapshot::Snapshot;

/// Everything a function can see while a template calls it.
pub struct CallEnv<'a> {
    /// Name the template used to reach this function.
    pub name: &'a str,
    pub session: &'a mut Session,
    pub snapshot: &'a Snapshot,
    pub message: &'a Message,
    pub client: &'a dyn ChatClient,
    pub limits: &'a ActionLimits,
}

/// A callable exposed to templates under one or more names.
pub trait TemplateFunction: Send + Sync {
    fn call(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError>;
}

impl<F> TemplateFunction for F
where
    F: Fn(&mut CallEnv<'_>, &[Dynamic]) -> Result<Dynamic, TemplateError> + Send + Sync,
{
    fn call(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
        self(env, args)
    }
}

/// Boxes a closure as a [`TemplateFunction`].
pub fn template_fn<F>(function: F) -> Arc<dyn TemplateFunction>
where
    F: Fn(&mut CallEnv<'_>, &[Dynamic]) -> Result<Dynamic, TemplateError> + Send + Sync + 'static,
{
    Arc::new(function)
}

/// Name-to-function lookup; inserting an existing name replaces it.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, Arc<dyn TemplateFunction>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, function: Arc<dyn TemplateFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TemplateFunction>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn TemplateFunction>)> {
        self.functions
            .iter()
            .map(|(name, function)| (name.as_str(), function))
    }

    /// `self` layered over `base`: on a name clash the entry from `self` wins.
    pub fn merged_over(&self, base: &FunctionTable) -> FunctionTable {
        let mut merged = base.clone();
        for (name, function) in &self.functions {
            merged.functions.insert(name.clone(), Arc::clone(function));
        }
        merged
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

/// Callback run against every new [`Context`] to install its functions.
pub type Extension = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Ordered list of extensions, built once at startup and shared afterwards.
#[derive(Clone)]
pub struct ExtensionRegistry {
    extensions: Vec<(String, Extension)>,
}

impl ExtensionRegistry {
    pub fn empty() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, extension: F) -> &mut Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.extensions.push((name.into(), Arc::new(extension)));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub(crate) fn apply(&self, context: &mut Context) {
        for (_, extension) in &self.extensions {
            extension(context);
        }
    }
}

/// Starts with the base action extension installed.
impl Default for ExtensionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            crate::functions::actions::BASE_ACTIONS_EXTENSION,
            crate::functions::actions::install_base_actions,
        );
        registry
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    fn constant(text: &'static str) -> Arc<dyn TemplateFunction> {
        template_fn(move |_env, _args| Ok(Dynamic::from(text.to_string())))
    }

    #[test]
    fn merged_table_prefers_the_upper_layer() {
        let mut base = FunctionTable::new();
        base.insert("lower", constant("base"));
        base.insert("title", constant("base"));
        let mut upper = FunctionTable::new();
        upper.insert("lower", constant("upper"));

        let merged = upper.merged_over(&base);
        assert_eq!(merged.len(), 2);
        assert!(Arc::ptr_eq(
            merged.get("lower").expect("lower"),
            upper.get("lower").expect("upper lower")
        ));
        assert!(Arc::ptr_eq(
            merged.get("title").expect("title"),
            base.get("title").expect("base title")
        ));
    }

    #[test]
    fn later_insert_replaces_earlier() {
        let mut table = FunctionTable::new();
        let first = constant("first");
        let second = constant("second");
        table.insert("f", Arc::clone(&first));
        table.insert("f", Arc::clone(&second));
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(table.get("f").expect("f"), &second));
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["f"]);
    }

    #[test]
    fn registry_keeps_registration_order() {
        let mut registry = ExtensionRegistry::default();
        registry.register("metrics", |_ctx: &mut Context| {});
        registry.register("extras", |_ctx: &mut Context| {});
        assert_eq!(
            registry.names(),
            vec![
                crate::functions::actions::BASE_ACTIONS_EXTENSION,
                "metrics",
                "extras"
            ]
        );
        assert!(ExtensionRegistry::empty().is_empty());
    }
}
