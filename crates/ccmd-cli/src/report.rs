use ccmd_core::{ClientAction, RenderError, TemplateError};
use ccmd_runtime::{Context, RenderOutcome};

use crate::json_string;

pub(crate) fn emit_outcome(outcome: &RenderOutcome) {
    let result = match outcome {
        RenderOutcome::Success(_) => "OK",
        RenderOutcome::PartialFailure { .. } => "PARTIAL",
        RenderOutcome::Fatal(_) => "ERROR",
    };
    println!("RESULT:{}", result);
    println!("OUTPUT_JSON:{}", json_string(outcome.output()));
    if let Some(error) = outcome.error() {
        emit_render_error(error);
    }
}

fn emit_render_error(error: &RenderError) {
    println!("ERROR_STAGE:{}", error.stage());
    println!("ERROR_CODE:{}", error.code());
    if let Some(span) = &error.inner().span {
        println!("ERROR_AT:{}:{}", span.start.line, span.start.column);
    }
    println!("ERROR_MSG_JSON:{}", json_string(&error.inner().message));
}

/// Everything the caller would act on after rendering.
pub(crate) fn emit_side_effects(context: &Context, actions: &[ClientAction]) {
    let deletion = context.deletion();
    println!(
        "DELETE_RESPONSE:{}|{}",
        deletion.delete_response, deletion.response_delay_secs
    );
    println!(
        "DELETE_TRIGGER:{}|{}",
        deletion.delete_trigger, deletion.trigger_delay_secs
    );
    for action in actions {
        println!(
            "ACTION_JSON:{}",
            serde_json::to_string(action).unwrap_or_else(|_| "{}".to_string())
        );
    }
    for (key, count) in context.counters() {
        println!("COUNTER:{}={}", key, count);
    }
}

pub(crate) fn emit_check_ok(name: &str) {
    println!("CHECK_OK:{}", name);
}

pub(crate) fn emit_check_error(name: &str, error: &TemplateError) {
    let at = error
        .span
        .as_ref()
        .map(|span| format!("{}:{}", span.start.line, span.start.column))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "CHECK_ERROR:{}|{}|{}|{}",
        name,
        error.code,
        at,
        json_string(&error.message)
    );
}
