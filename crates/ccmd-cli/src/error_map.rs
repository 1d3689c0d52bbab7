use std::fmt::Display;

use ccmd_core::TemplateError;

fn map_error(code: &'static str, error: impl Display) -> TemplateError {
    TemplateError::new(code, error.to_string())
}

pub(crate) fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn emit_error(error: TemplateError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn map_cli_world_read(error: std::io::Error) -> TemplateError {
    map_error("CLI_WORLD_READ", error)
}

pub(crate) fn map_cli_world_invalid(error: serde_json::Error) -> TemplateError {
    map_error("CLI_WORLD_INVALID", error)
}

pub(crate) fn map_cli_template_read(error: std::io::Error) -> TemplateError {
    map_error("CLI_TEMPLATE_READ", error)
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> TemplateError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> TemplateError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> TemplateError {
    map_error("CLI_SOURCE_READ", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(TemplateError::new("ERR", "failed"));
        assert_eq!(code, 1);
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(
            map_cli_world_read(std::io::Error::other("io")).code,
            "CLI_WORLD_READ"
        );
        let invalid = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert_eq!(map_cli_world_invalid(invalid).code, "CLI_WORLD_INVALID");
        assert_eq!(
            map_cli_template_read(std::io::Error::other("read")).code,
            "CLI_TEMPLATE_READ"
        );
        assert_eq!(
            map_cli_source_path(std::io::Error::other("path")).code,
            "CLI_SOURCE_PATH"
        );

        let strip_error = std::path::Path::new("/a")
            .strip_prefix("/b")
            .expect_err("strip prefix");
        assert_eq!(map_cli_source_scan(strip_error).code, "CLI_SOURCE_SCAN");
        assert_eq!(
            map_cli_source_read(std::io::Error::other("read")).code,
            "CLI_SOURCE_READ"
        );
    }

    #[test]
    fn json_string_escapes_quotes_and_newlines() {
        assert_eq!(json_string("a\"b\nc"), r#""a\"b\nc""#);
    }
}
