use ccmd_core::TemplateError;
use rhai::{Array, Dynamic, ImmutableString, INT};

use crate::helpers::rhai_bridge::dynamic_to_text;

pub(crate) fn arg<'a>(args: &'a [Dynamic], index: usize, name: &str) -> Result<&'a Dynamic, TemplateError> {
    args.get(index).ok_or_else(|| {
        TemplateError::new(
            "TEMPLATE_ARG_MISSING",
            format!("{}() expects an argument at position {}.", name, index + 1),
        )
    })
}

pub(crate) fn int_arg(args: &[Dynamic], index: usize, name: &str) -> Result<INT, TemplateError> {
    let value = arg(args, index, name)?;
    strict_int(value).ok_or_else(|| {
        TemplateError::new(
            "TEMPLATE_ARG_TYPE",
            format!(
                "{}() expects an integer at position {}, got {}.",
                name,
                index + 1,
                value.type_name()
            ),
        )
    })
}

pub(crate) fn optional_int_arg(
    args: &[Dynamic],
    index: usize,
    name: &str,
) -> Result<Option<INT>, TemplateError> {
    if args.len() <= index {
        return Ok(None);
    }
    int_arg(args, index, name).map(Some)
}

pub(crate) fn text_arg(args: &[Dynamic], index: usize, name: &str) -> Result<String, TemplateError> {
    arg(args, index, name).map(dynamic_to_text)
}

/// Integers, integral floats and numeric strings.
pub(crate) fn strict_int(value: &Dynamic) -> Option<INT> {
    if let Ok(value) = value.as_int() {
        return Some(value);
    }
    if let Ok(value) = value.as_float() {
        if value.fract() == 0.0 && value.is_finite() {
            return Some(value as INT);
        }
        return None;
    }
    if let Some(text) = value.read_lock::<ImmutableString>() {
        return text.trim().parse::<INT>().ok();
    }
    None
}

/// Like [`strict_int`] but truncates fractions and falls back to zero.
pub(crate) fn lenient_int(value: &Dynamic) -> INT {
    if let Ok(value) = value.as_float() {
        return value.trunc() as INT;
    }
    if let Ok(value) = value.as_bool() {
        return INT::from(value);
    }
    if let Some(text) = value.read_lock::<ImmutableString>() {
        let text = text.trim();
        if let Ok(value) = text.parse::<INT>() {
            return value;
        }
        return text.parse::<f64>().map(|value| value.trunc() as INT).unwrap_or(0);
    }
    strict_int(value).unwrap_or(0)
}

/// Arguments with arrays expanded one level, in order.
pub(crate) fn flatten_args(args: &[Dynamic]) -> Vec<Dynamic> {
    let mut out = Vec::with_capacity(args.len());
    for value in args {
        match value.read_lock::<Array>() {
            Some(array) => out.extend(array.iter().cloned()),
            None => out.push(value.clone()),
        }
    }
    out
}

#[cfg(test)]
mod args_tests {
    use super::*;

    #[test]
    fn strict_int_accepts_numeric_forms_only() {
        assert_eq!(strict_int(&Dynamic::from_int(4)), Some(4));
        assert_eq!(strict_int(&Dynamic::from_float(4.0)), Some(4));
        assert_eq!(strict_int(&Dynamic::from_float(4.5)), None);
        assert_eq!(strict_int(&Dynamic::from(" 42 ".to_string())), Some(42));
        assert_eq!(strict_int(&Dynamic::from("x".to_string())), None);
        assert_eq!(strict_int(&Dynamic::UNIT), None);
    }

    #[test]
    fn lenient_int_never_fails() {
        assert_eq!(lenient_int(&Dynamic::from_float(-2.9)), -2);
        assert_eq!(lenient_int(&Dynamic::from("7.8".to_string())), 7);
        assert_eq!(lenient_int(&Dynamic::from("abc".to_string())), 0);
        assert_eq!(lenient_int(&Dynamic::from_bool(true)), 1);
        assert_eq!(lenient_int(&Dynamic::UNIT), 0);
    }

    #[test]
    fn argument_errors_name_the_function() {
        let error = int_arg(&[Dynamic::from("x".to_string())], 0, "seq").expect_err("type");
        assert_eq!(error.code, "TEMPLATE_ARG_TYPE");
        assert!(error.message.starts_with("seq()"));
        let missing = text_arg(&[], 1, "slice").expect_err("missing");
        assert_eq!(missing.code, "TEMPLATE_ARG_MISSING");
        assert_eq!(optional_int_arg(&[], 0, "deleteTrigger").expect("none"), None);
    }

    #[test]
    fn flatten_expands_arrays_once() {
        let nested = Dynamic::from_array(vec![
            Dynamic::from_int(1),
            Dynamic::from_array(vec![Dynamic::from_int(2)]),
        ]);
        let flat = flatten_args(&[nested, Dynamic::from_int(3)]);
        assert_eq!(flat.len(), 3);
        assert!(flat[1].is_array());
    }
}
