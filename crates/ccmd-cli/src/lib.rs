use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use ccmd_core::{RecordingClient, TemplateError};
use ccmd_parser::parse_template;
use ccmd_runtime::ExtensionRegistry;
use clap::Parser;
use tracing::info;

mod cli_args;
mod error_map;
mod fixture;
mod report;
mod source_loader;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, RenderArgs};
pub(crate) use error_map::{
    emit_error, json_string, map_cli_source_path, map_cli_source_read, map_cli_source_scan,
    map_cli_template_read, map_cli_world_invalid, map_cli_world_read,
};
pub(crate) use fixture::load_world;
pub(crate) use report::{emit_check_error, emit_check_ok, emit_outcome, emit_side_effects};
pub(crate) use source_loader::{read_template, read_templates_from_dir, resolve_templates_dir};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, TemplateError> {
    match cli.command {
        Mode::Render(args) => run_render(args),
        Mode::Check(args) => run_check(args),
    }
}

fn run_render(args: RenderArgs) -> Result<i32, TemplateError> {
    let world = load_world(Path::new(&args.world))?;
    let template = read_template(Path::new(&args.template))?;

    let registry = ExtensionRegistry::default();
    let mut context = world.into_context(&registry, args.seed);
    let client = Arc::new(RecordingClient::new());

    let mut succeeded = true;
    for run_index in 0..args.repeat.max(1) {
        let outcome = context.execute(client.clone(), &template);
        info!(run = run_index, success = outcome.is_success(), "render finished");
        emit_outcome(&outcome);
        succeeded &= outcome.is_success();
    }
    emit_side_effects(&context, &client.actions());

    Ok(if succeeded { 0 } else { 1 })
}

fn run_check(args: CheckArgs) -> Result<i32, TemplateError> {
    let root = resolve_templates_dir(&args.templates_dir)?;
    let templates = read_templates_from_dir(&root)?;

    let mut failures = 0usize;
    for (name, source) in &templates {
        match parse_template(source) {
            Ok(_) => emit_check_ok(name),
            Err(error) => {
                failures += 1;
                emit_check_error(name, &error);
            }
        }
    }
    info!(templates = templates.len(), failures, "template check finished");

    Ok(if failures == 0 { 0 } else { 1 })
}
