//! Compiles parsed template nodes into a tree of Rhai expressions and walks it.
//!
//! Each tag body is compiled on its own as a single Rhai expression, so tag
//! text can never add statements or change the block structure. Blocks, loops
//! and `let` bindings are driven from Rust; Rhai only ever evaluates one
//! expression at a time.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ccmd_core::{ChatClient, Message, RenderError, SourceSpan, TemplateError};
use ccmd_parser::{parse_template, TemplateNode};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, Scope, AST, INT,
};
use tracing::debug;

// rhai keeps its range aliases private; these match its definitions.
type ExclusiveRange = std::ops::Range<INT>;
type InclusiveRange = std::ops::RangeInclusive<INT>;

use crate::cancel::CancelToken;
use crate::helpers::rhai_bridge::{dynamic_to_text, json_to_dynamic};
use crate::options::{ActionLimits, ContextOptions};
use crate::outcome::RenderOutcome;
use crate::registry::{CallEnv, FunctionTable, TemplateFunction};
use crate::session::Session;
use crate::snapshot::{data_keys, DataBag, Snapshot};

/// Everything one render reads; the session is passed separately because it
/// is written back afterwards.
pub(crate) struct RenderInput<'a> {
    pub source: &'a str,
    pub functions: &'a FunctionTable,
    pub data: &'a DataBag,
    pub snapshot: Snapshot,
    pub message: Message,
    pub client: Arc<dyn ChatClient>,
    pub options: &'a ContextOptions,
    pub cancel: Option<CancelToken>,
}

#[derive(Debug, Clone)]
enum Step {
    Text {
        value: String,
        location: SourceSpan,
    },
    Emit {
        expr: AST,
        location: SourceSpan,
    },
    Let {
        name: String,
        expr: AST,
        location: SourceSpan,
    },
    If {
        arms: Vec<Arm>,
        otherwise: Vec<Step>,
    },
    For {
        item: String,
        index: Option<String>,
        iterable: AST,
        location: SourceSpan,
        body: Vec<Step>,
    },
}

#[derive(Debug, Clone)]
struct Arm {
    condition: AST,
    location: SourceSpan,
    body: Vec<Step>,
}

enum BlockEnd {
    ElseIf(String, SourceSpan),
    Else(SourceSpan),
    End(SourceSpan),
    Eof,
}

/// Builds the step tree, compiling every expression against the names that
/// are visible at that point of the template.
struct Compiler<'a> {
    engine: &'a Engine,
    nodes: &'a [TemplateNode],
    cursor: usize,
    scope: Scope<'static>,
}

impl<'a> Compiler<'a> {
    fn new(engine: &'a Engine, nodes: &'a [TemplateNode], scope: Scope<'static>) -> Self {
        Self {
            engine,
            nodes,
            cursor: 0,
            scope,
        }
    }

    fn template(&mut self) -> Result<Vec<Step>, TemplateError> {
        match self.block()? {
            (steps, BlockEnd::Eof) => Ok(steps),
            (_, BlockEnd::ElseIf(_, location) | BlockEnd::Else(location) | BlockEnd::End(location)) => {
                Err(unexpected_tag(location))
            }
        }
    }

    fn block(&mut self) -> Result<(Vec<Step>, BlockEnd), TemplateError> {
        let mark = self.scope.len();
        let mut steps = Vec::new();
        let nodes = self.nodes;
        let end = loop {
            let Some(node) = nodes.get(self.cursor) else {
                break BlockEnd::Eof;
            };
            self.cursor += 1;
            match node {
                TemplateNode::Text { value, location } => steps.push(Step::Text {
                    value: value.clone(),
                    location: location.clone(),
                }),
                TemplateNode::Output { expr, location } => steps.push(Step::Emit {
                    expr: self.expression(expr, location)?,
                    location: location.clone(),
                }),
                TemplateNode::Let {
                    name,
                    expr,
                    location,
                } => {
                    let expr = self.expression(expr, location)?;
                    self.scope.push_dynamic(name.as_str(), Dynamic::UNIT);
                    steps.push(Step::Let {
                        name: name.clone(),
                        expr,
                        location: location.clone(),
                    });
                }
                TemplateNode::If {
                    condition,
                    location,
                } => steps.push(self.conditional(condition, location)?),
                TemplateNode::For {
                    item,
                    index,
                    iterable,
                    location,
                } => {
                    let iterable = self.expression(iterable, location)?;
                    let loop_mark = self.scope.len();
                    self.scope.push_dynamic(item.as_str(), Dynamic::UNIT);
                    if let Some(index) = index {
                        self.scope.push_dynamic(index.as_str(), Dynamic::UNIT);
                    }
                    let body = match self.block()? {
                        (body, BlockEnd::End(_)) => body,
                        (_, BlockEnd::Eof) => return Err(unclosed_block(location.clone())),
                        (_, BlockEnd::ElseIf(_, at) | BlockEnd::Else(at)) => {
                            return Err(unexpected_tag(at))
                        }
                    };
                    self.scope.rewind(loop_mark);
                    steps.push(Step::For {
                        item: item.clone(),
                        index: index.clone(),
                        iterable,
                        location: location.clone(),
                        body,
                    });
                }
                TemplateNode::ElseIf {
                    condition,
                    location,
                } => break BlockEnd::ElseIf(condition.clone(), location.clone()),
                TemplateNode::Else { location } => break BlockEnd::Else(location.clone()),
                TemplateNode::End { location } => break BlockEnd::End(location.clone()),
            }
        };
        self.scope.rewind(mark);
        Ok((steps, end))
    }

    fn conditional(&mut self, condition: &str, location: &SourceSpan) -> Result<Step, TemplateError> {
        let mut arms = Vec::new();
        let mut condition = self.expression(condition, location)?;
        let mut arm_location = location.clone();
        loop {
            let (body, end) = self.block()?;
            arms.push(Arm {
                condition,
                location: arm_location,
                body,
            });
            match end {
                BlockEnd::ElseIf(next, at) => {
                    condition = self.expression(&next, &at)?;
                    arm_location = at;
                }
                BlockEnd::Else(at) => {
                    return match self.block()? {
                        (otherwise, BlockEnd::End(_)) => Ok(Step::If { arms, otherwise }),
                        (_, BlockEnd::Eof) => Err(unclosed_block(location.clone())),
                        (_, BlockEnd::ElseIf(..) | BlockEnd::Else(_)) => Err(unexpected_tag(at)),
                    };
                }
                BlockEnd::End(_) => {
                    return Ok(Step::If {
                        arms,
                        otherwise: Vec::new(),
                    })
                }
                BlockEnd::Eof => return Err(unclosed_block(location.clone())),
            }
        }
    }

    fn expression(&self, source: &str, location: &SourceSpan) -> Result<AST, TemplateError> {
        self.engine
            .compile_expression_with_scope(&self.scope, source)
            .map_err(|error| {
                TemplateError::with_span(
                    "TEMPLATE_COMPILE_ERROR",
                    error.0.to_string(),
                    location.clone(),
                )
            })
    }
}

fn unexpected_tag(location: SourceSpan) -> TemplateError {
    TemplateError::with_span(
        "TEMPLATE_BLOCK_UNEXPECTED",
        "Block tag does not belong to an open block.",
        location,
    )
}

fn unclosed_block(location: SourceSpan) -> TemplateError {
    TemplateError::with_span(
        "TEMPLATE_BLOCK_UNCLOSED",
        "Block is missing its {{ end }}.",
        location,
    )
}

/// Shared by every closure registered on the engine for one render.
struct RenderState {
    session: RefCell<Session>,
    snapshot: Snapshot,
    message: Message,
    client: Arc<dyn ChatClient>,
    limits: ActionLimits,
    output: RefCell<String>,
    max_output_bytes: usize,
    failure: RefCell<Option<TemplateError>>,
}

impl RenderState {
    /// Stashes `error` so its code survives the trip through the engine.
    fn fail(&self, error: TemplateError) -> Box<EvalAltResult> {
        let runtime = EvalAltResult::ErrorRuntime(Dynamic::from(error.message.clone()), Position::NONE);
        *self.failure.borrow_mut() = Some(error);
        Box::new(runtime)
    }

    fn emit(&self, text: &str, location: &SourceSpan) -> Result<(), TemplateError> {
        let mut output = self.output.borrow_mut();
        if self.max_output_bytes > 0 && output.len() + text.len() > self.max_output_bytes {
            return Err(TemplateError::with_span(
                "TEMPLATE_OUTPUT_LIMIT",
                format!("Output is longer than {} bytes.", self.max_output_bytes),
                location.clone(),
            ));
        }
        output.push_str(text);
        Ok(())
    }
}

struct Dispatch {
    name: String,
    function: Arc<dyn TemplateFunction>,
    state: Rc<RenderState>,
}

impl Dispatch {
    fn call(&self, args: Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>> {
        let result = {
            let mut session = self.state.session.borrow_mut();
            let mut env = CallEnv {
                name: &self.name,
                session: &mut *session,
                snapshot: &self.state.snapshot,
                message: &self.state.message,
                client: self.state.client.as_ref(),
                limits: &self.state.limits,
            };
            self.function.call(&mut env, &args)
        };
        result.map_err(|error| self.state.fail(error))
    }
}

/// Registers one engine overload per arity so templates can pass any number
/// of arguments up to the largest listed.
macro_rules! register_arities {
    ($engine:expr, $name:expr, $dispatch:expr; $( ( $($arg:ident),* ) ),+ $(,)?) => {
        $({
            let dispatch = Rc::clone(&$dispatch);
            $engine.register_fn(
                $name,
                move |$($arg: Dynamic),*| -> Result<Dynamic, Box<EvalAltResult>> {
                    dispatch.call(vec![$($arg),*])
                },
            );
        })+
    };
}

/// Walks the step tree. Every step taken counts against `max_steps`, which
/// bounds loops the engine's own operation counter never sees.
struct Runner<'a> {
    engine: &'a Engine,
    state: &'a RenderState,
    scope: Scope<'static>,
    cancel: Option<&'a CancelToken>,
    steps_taken: u64,
    max_steps: u64,
}

impl Runner<'_> {
    fn run_block(&mut self, steps: &[Step]) -> Result<(), TemplateError> {
        let mark = self.scope.len();
        self.run_steps(steps)?;
        self.scope.rewind(mark);
        Ok(())
    }

    fn run_steps(&mut self, steps: &[Step]) -> Result<(), TemplateError> {
        for step in steps {
            match step {
                Step::Text { value, location } => {
                    self.tick(location)?;
                    self.state.emit(value, location)?;
                }
                Step::Emit { expr, location } => {
                    self.tick(location)?;
                    let value = self.eval(expr, location)?;
                    self.state.emit(&dynamic_to_text(&value), location)?;
                }
                Step::Let {
                    name,
                    expr,
                    location,
                } => {
                    self.tick(location)?;
                    let value = self.eval(expr, location)?;
                    self.scope.push_dynamic(name.as_str(), value);
                }
                Step::If { arms, otherwise } => {
                    let mut chosen = otherwise;
                    for arm in arms {
                        self.tick(&arm.location)?;
                        if is_truthy(&self.eval(&arm.condition, &arm.location)?) {
                            chosen = &arm.body;
                            break;
                        }
                    }
                    self.run_block(chosen)?;
                }
                Step::For {
                    item,
                    index,
                    iterable,
                    location,
                    body,
                } => {
                    self.tick(location)?;
                    let entries = iterate(self.eval(iterable, location)?, location)?;
                    let mark = self.scope.len();
                    for (value, position) in entries {
                        self.tick(location)?;
                        self.scope.rewind(mark);
                        self.scope.push_dynamic(item.as_str(), value);
                        if let Some(index) = index {
                            self.scope.push_dynamic(index.as_str(), position);
                        }
                        self.run_steps(body)?;
                    }
                    self.scope.rewind(mark);
                }
            }
        }
        Ok(())
    }

    fn tick(&mut self, location: &SourceSpan) -> Result<(), TemplateError> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(TemplateError::with_span(
                "TEMPLATE_CANCELLED",
                "Render was cancelled.",
                location.clone(),
            ));
        }
        self.steps_taken += 1;
        if self.max_steps > 0 && self.steps_taken > self.max_steps {
            return Err(TemplateError::with_span(
                "TEMPLATE_RESOURCE_LIMIT",
                format!("Template ran more than {} steps.", self.max_steps),
                location.clone(),
            ));
        }
        Ok(())
    }

    fn eval(&mut self, expr: &AST, location: &SourceSpan) -> Result<Dynamic, TemplateError> {
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, expr)
            .map_err(|error| execution_error(&error, self.state, location))
    }
}

/// Loosely follows Go templates: unit, `false`, zero and empty values are false.
fn is_truthy(value: &Dynamic) -> bool {
    if value.is_unit() {
        return false;
    }
    if let Ok(flag) = value.as_bool() {
        return flag;
    }
    if let Ok(number) = value.as_int() {
        return number != 0;
    }
    if let Ok(number) = value.as_float() {
        return number != 0.0;
    }
    if let Some(text) = value.read_lock::<ImmutableString>() {
        return !text.is_empty();
    }
    if let Some(items) = value.read_lock::<Array>() {
        return !items.is_empty();
    }
    if let Some(map) = value.read_lock::<Map>() {
        return !map.is_empty();
    }
    true
}

type Entries = Box<dyn Iterator<Item = (Dynamic, Dynamic)>>;

/// Loop entries as `(item, index)`; maps yield `(value, key)` and unit yields nothing.
fn iterate(value: Dynamic, location: &SourceSpan) -> Result<Entries, TemplateError> {
    fn position(index: usize) -> Dynamic {
        Dynamic::from_int(INT::try_from(index).unwrap_or(INT::MAX))
    }

    if value.is_unit() {
        return Ok(Box::new(std::iter::empty()));
    }
    let type_name = value.type_name();
    if value.is::<Array>() {
        let items = value.into_array().unwrap_or_default();
        return Ok(Box::new(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (item, position(index))),
        ));
    }
    if value.is_string() {
        let text = value.into_immutable_string().unwrap_or_default();
        let chars: Vec<char> = text.chars().collect();
        return Ok(Box::new(
            chars
                .into_iter()
                .enumerate()
                .map(|(index, ch)| (Dynamic::from(ch), position(index))),
        ));
    }
    if value.is::<Map>() {
        let map = value.try_cast::<Map>().unwrap_or_default();
        return Ok(Box::new(
            map.into_iter()
                .map(|(key, item)| (item, Dynamic::from(key.to_string()))),
        ));
    }
    if value.is::<ExclusiveRange>() {
        let range = value.try_cast::<ExclusiveRange>().unwrap_or(0..0);
        return Ok(Box::new(
            range
                .enumerate()
                .map(|(index, item)| (Dynamic::from_int(item), position(index))),
        ));
    }
    if value.is::<InclusiveRange>() {
        let range = value.try_cast::<InclusiveRange>().unwrap_or(1..=0);
        return Ok(Box::new(
            range
                .enumerate()
                .map(|(index, item)| (Dynamic::from_int(item), position(index))),
        ));
    }
    Err(TemplateError::with_span(
        "TEMPLATE_NOT_ITERABLE",
        format!("Cannot loop over a value of type {}.", type_name),
        location.clone(),
    ))
}

/// Renders `input.source`, returning unsanitized output.
///
/// `session` is lent to the action functions for the duration of the run and
/// always handed back, even when compilation or execution fails.
pub(crate) fn render(input: RenderInput<'_>, session: &mut Session) -> RenderOutcome {
    let parsed = match parse_template(input.source) {
        Ok(parsed) => parsed,
        Err(error) => return RenderOutcome::Fatal(RenderError::Parse(error)),
    };

    let state = Rc::new(RenderState {
        session: RefCell::new(std::mem::replace(session, Session::new(0))),
        snapshot: input.snapshot,
        message: input.message,
        client: input.client,
        limits: input.options.limits.clone(),
        output: RefCell::new(String::new()),
        max_output_bytes: input.options.max_output_bytes,
        failure: RefCell::new(None),
    });

    let engine = build_engine(input.options, input.cancel.clone(), input.functions, &state);
    let scope = data_scope(input.data);
    let result = Compiler::new(&engine, &parsed.nodes, scope.clone())
        .template()
        .map_err(RenderError::Parse)
        .and_then(|steps| {
            debug!(nodes = parsed.nodes.len(), steps = steps.len(), "compiled template");
            let mut runner = Runner {
                engine: &engine,
                state: state.as_ref(),
                scope,
                cancel: input.cancel.as_ref(),
                steps_taken: 0,
                max_steps: input.options.max_operations,
            };
            runner.run_steps(&steps).map_err(RenderError::Execution)
        });

    *session = state.session.replace(Session::new(0));
    let output = state.output.take();
    match result {
        Ok(()) => RenderOutcome::Success(output),
        Err(error @ RenderError::Execution(_)) => RenderOutcome::PartialFailure { output, error },
        Err(error) => RenderOutcome::Fatal(error),
    }
}

/// Data-bag entries as constants, plus unit for every key whose handle is absent.
fn data_scope(data: &DataBag) -> Scope<'static> {
    let mut scope = Scope::new();
    for key in data_keys() {
        if data.get(key).is_none() {
            scope.push_constant_dynamic(key, Dynamic::UNIT);
        }
    }
    for (key, value) in data.iter() {
        scope.push_constant_dynamic(key.to_string(), json_to_dynamic(value));
    }
    scope
}

fn build_engine(
    options: &ContextOptions,
    cancel: Option<CancelToken>,
    functions: &FunctionTable,
    state: &Rc<RenderState>,
) -> Engine {
    let mut engine = Engine::new();
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.set_strict_variables(true);
    engine.disable_symbol("eval");
    engine.disable_symbol("import");
    engine.on_print(|_| {});
    engine.on_debug(|_, _, _| {});
    engine.set_max_operations(options.max_operations);
    engine.set_max_call_levels(options.max_call_levels);
    engine.set_max_string_size(options.max_string_size);
    engine.set_max_array_size(options.max_array_size);
    if let Some(token) = cancel {
        engine.on_progress(move |_| {
            token
                .is_cancelled()
                .then(|| Dynamic::from("cancelled".to_string()))
        });
    }

    for (name, function) in functions.iter() {
        let dispatch = Rc::new(Dispatch {
            name: name.to_string(),
            function: Arc::clone(function),
            state: Rc::clone(state),
        });
        register_arities!(engine, name, dispatch;
            (),
            (a),
            (a, b),
            (a, b, c),
            (a, b, c, d),
            (a, b, c, d, e),
            (a, b, c, d, e, f),
            (a, b, c, d, e, f, g),
            (a, b, c, d, e, f, g, h),
        );
    }
    engine
}

fn execution_error(error: &EvalAltResult, state: &RenderState, location: &SourceSpan) -> TemplateError {
    let inner = innermost(error);

    let stashed = state.failure.borrow_mut().take();
    if let (EvalAltResult::ErrorRuntime(value, _), Some(stashed)) = (inner, stashed) {
        if value.to_string() == stashed.message {
            return TemplateError {
                span: stashed.span.or_else(|| Some(location.clone())),
                ..stashed
            };
        }
    }

    let code = match inner {
        EvalAltResult::ErrorTerminated(..) => "TEMPLATE_CANCELLED",
        EvalAltResult::ErrorTooManyOperations(..)
        | EvalAltResult::ErrorStackOverflow(..)
        | EvalAltResult::ErrorDataTooLarge(..) => "TEMPLATE_RESOURCE_LIMIT",
        _ => "TEMPLATE_EXEC_ERROR",
    };
    let message = inner.to_string();
    let position_suffix = format!(" ({})", inner.position());
    let message = message
        .strip_suffix(&position_suffix)
        .map(str::to_string)
        .unwrap_or(message);

    TemplateError::with_span(code, message, location.clone())
}

fn innermost(mut error: &EvalAltResult) -> &EvalAltResult {
    while let EvalAltResult::ErrorInFunctionCall(_, _, inner, _) = error {
        error = inner;
    }
    error
}
