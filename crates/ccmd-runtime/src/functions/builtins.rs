//! Stateless helpers every template can call.
//!
//! The only state they touch is the context's random generator.

use std::sync::{Arc, OnceLock};

use ccmd_core::TemplateError;
use chrono::{DateTime, TimeZone, Utc};
use rhai::{Array, Dynamic, ImmutableString, Map, FLOAT, INT};

use crate::functions::args::{arg, flatten_args, int_arg, lenient_int, text_arg};
use crate::helpers::rhai_bridge::{dynamic_to_json, dynamic_to_text};
use crate::registry::{CallEnv, FunctionTable, TemplateFunction};

/// Longest list `seq` will build.
const MAX_SEQUENCE_LEN: INT = 10_000;
const DEFAULT_TIME_LAYOUT: &str = "%d %b %y %H:%M UTC";

const ADJECTIVES: &[&str] = &[
    "adorable", "brave", "calm", "clever", "cozy", "curious", "daring", "eager", "fancy",
    "fearless", "fluffy", "gentle", "glorious", "grumpy", "happy", "jolly", "kind", "lively",
    "lucky", "mighty", "mysterious", "nimble", "plucky", "proud", "quirky", "shiny", "silly",
    "sleepy", "sneaky", "spicy", "swift", "witty", "zesty",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Dict,
    Json,
    InList,
    Title,
    Lower,
    Add,
    RoleAbove,
    Adjective,
    RandInt,
    Shuffle,
    Seq,
    JoinStr,
    Str,
    ToString,
    ToInt,
    ToInt64,
    FormatTime,
    Slice,
}

impl Builtin {
    pub const ALL: [Builtin; 18] = [
        Self::Dict,
        Self::Json,
        Self::InList,
        Self::Title,
        Self::Lower,
        Self::Add,
        Self::RoleAbove,
        Self::Adjective,
        Self::RandInt,
        Self::Shuffle,
        Self::Seq,
        Self::JoinStr,
        Self::Str,
        Self::ToString,
        Self::ToInt,
        Self::ToInt64,
        Self::FormatTime,
        Self::Slice,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Dict => "dict",
            Self::Json => "json",
            Self::InList => "inList",
            Self::Title => "title",
            Self::Lower => "lower",
            Self::Add => "add",
            Self::RoleAbove => "roleAbove",
            Self::Adjective => "adjective",
            Self::RandInt => "randInt",
            Self::Shuffle => "shuffle",
            Self::Seq => "seq",
            Self::JoinStr => "joinStr",
            Self::Str => "str",
            Self::ToString => "toString",
            Self::ToInt => "toInt",
            Self::ToInt64 => "toInt64",
            Self::FormatTime => "formatTime",
            Self::Slice => "slice",
        }
    }
}

impl TemplateFunction for Builtin {
    fn call(&self, env: &mut CallEnv<'_>, args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
        let name = self.name();
        match self {
            Self::Dict => dict(args),
            Self::Json => {
                let value = dynamic_to_json(arg(args, 0, name)?)?;
                Ok(Dynamic::from(value.to_string()))
            }
            Self::InList => in_list(args, name),
            Self::Title => Ok(Dynamic::from(title_case(&text_arg(args, 0, name)?))),
            Self::Lower => Ok(Dynamic::from(text_arg(args, 0, name)?.to_lowercase())),
            Self::Add => add(args),
            Self::RoleAbove => role_above(args, name),
            Self::Adjective => {
                let bound = ADJECTIVES.len() as u32;
                let index = env.session.random_below(bound) as usize;
                Ok(Dynamic::from(ADJECTIVES[index].to_string()))
            }
            Self::RandInt => rand_int(env, args, name),
            Self::Shuffle => {
                let mut items = arg(args, 0, name)?
                    .read_lock::<Array>()
                    .map(|array| array.clone())
                    .ok_or_else(|| type_error(name, "an array"))?;
                env.session.shuffle(&mut items);
                Ok(Dynamic::from_array(items))
            }
            Self::Seq => sequence(args, name),
            Self::JoinStr => {
                let separator = text_arg(args, 0, name)?;
                let parts: Vec<String> = flatten_args(&args[1..])
                    .iter()
                    .map(dynamic_to_text)
                    .collect();
                Ok(Dynamic::from(parts.join(&separator)))
            }
            Self::Str | Self::ToString => Ok(Dynamic::from(text_arg(args, 0, name)?)),
            Self::ToInt | Self::ToInt64 => Ok(Dynamic::from_int(lenient_int(arg(args, 0, name)?))),
            Self::FormatTime => format_time(args, name),
            Self::Slice => slice(args, name),
        }
    }
}

/// The helper table shared by every context.
pub fn builtin_table() -> &'static FunctionTable {
    static TABLE: OnceLock<FunctionTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = FunctionTable::new();
        for builtin in Builtin::ALL {
            table.insert(builtin.name(), Arc::new(builtin));
        }
        table
    })
}

fn type_error(name: &str, expected: &str) -> TemplateError {
    TemplateError::new(
        "TEMPLATE_ARG_TYPE",
        format!("{}() expects {}.", name, expected),
    )
}

fn dict(args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
    if args.len() % 2 != 0 {
        return Err(TemplateError::new(
            "TEMPLATE_DICT_ARITY",
            "dict() expects key/value pairs.",
        ));
    }
    let mut map = Map::new();
    for pair in args.chunks(2) {
        map.insert(dynamic_to_text(&pair[0]).into(), pair[1].clone());
    }
    Ok(Dynamic::from_map(map))
}

fn in_list(args: &[Dynamic], name: &str) -> Result<Dynamic, TemplateError> {
    let list = arg(args, 0, name)?;
    let needle = dynamic_to_json(arg(args, 1, name)?)?;
    let Some(items) = list.read_lock::<Array>() else {
        return Err(type_error(name, "an array as its first argument"));
    };
    for item in items.iter() {
        if dynamic_to_json(item)? == needle {
            return Ok(Dynamic::from_bool(true));
        }
    }
    Ok(Dynamic::from_bool(false))
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if at_word_start && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric() && ch != '\'';
    }
    out
}

fn add(args: &[Dynamic]) -> Result<Dynamic, TemplateError> {
    if args.iter().any(|value| value.is_float()) {
        let mut sum: FLOAT = 0.0;
        for value in args {
            sum += match value.as_float() {
                Ok(value) => value,
                Err(_) => lenient_int(value) as FLOAT,
            };
        }
        return Ok(Dynamic::from_float(sum));
    }

    let mut sum: INT = 0;
    for value in args {
        sum = sum.checked_add(lenient_int(value)).ok_or_else(|| {
            TemplateError::new("TEMPLATE_INT_OVERFLOW", "add() overflowed.")
        })?;
    }
    Ok(Dynamic::from_int(sum))
}

fn role_above(args: &[Dynamic], name: &str) -> Result<Dynamic, TemplateError> {
    let position = |index: usize| -> Result<INT, TemplateError> {
        let value = arg(args, index, name)?;
        let map = value
            .read_lock::<Map>()
            .ok_or_else(|| type_error(name, "two roles"))?;
        Ok(map.get("Position").map(lenient_int).unwrap_or(0))
    };
    Ok(Dynamic::from_bool(position(0)? > position(1)?))
}

fn rand_int(env: &mut CallEnv<'_>, args: &[Dynamic], name: &str) -> Result<Dynamic, TemplateError> {
    let (start, stop) = match args.len() {
        0 => (0, INT::from(i32::MAX)),
        1 => (0, int_arg(args, 0, name)?),
        _ => (int_arg(args, 0, name)?, int_arg(args, 1, name)?),
    };
    if stop <= start {
        return Err(TemplateError::new(
            "TEMPLATE_RANGE_INVALID",
            format!("randInt() stop ({}) must be greater than start ({}).", stop, start),
        ));
    }
    let span = stop
        .checked_sub(start)
        .and_then(|span| u32::try_from(span).ok())
        .ok_or_else(|| {
            TemplateError::new("TEMPLATE_RANGE_INVALID", "randInt() range is too large.")
        })?;
    Ok(Dynamic::from_int(start + INT::from(env.session.random_below(span))))
}

fn sequence(args: &[Dynamic], name: &str) -> Result<Dynamic, TemplateError> {
    let start = int_arg(args, 0, name)?;
    let stop = int_arg(args, 1, name)?;
    if stop < start {
        return Err(TemplateError::new(
            "TEMPLATE_RANGE_INVALID",
            "seq() stop is less than start.",
        ));
    }
    if stop
        .checked_sub(start)
        .map_or(true, |len| len > MAX_SEQUENCE_LEN)
    {
        return Err(TemplateError::new(
            "TEMPLATE_RANGE_INVALID",
            format!("seq() can build at most {} numbers.", MAX_SEQUENCE_LEN),
        ));
    }
    Ok(Dynamic::from_array(
        (start..stop).map(Dynamic::from_int).collect(),
    ))
}

fn format_time(args: &[Dynamic], name: &str) -> Result<Dynamic, TemplateError> {
    let value = arg(args, 0, name)?;
    let time: DateTime<Utc> = if let Ok(seconds) = value.as_int() {
        Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
            TemplateError::new("TEMPLATE_TIME_INVALID", "formatTime() timestamp is out of range.")
        })?
    } else if let Some(text) = value.read_lock::<ImmutableString>() {
        DateTime::parse_from_rfc3339(text.as_str())
            .map(|time| time.with_timezone(&Utc))
            .map_err(|error| {
                TemplateError::new(
                    "TEMPLATE_TIME_INVALID",
                    format!("formatTime() could not parse \"{}\": {}", text.as_str(), error),
                )
            })?
    } else {
        return Err(type_error(name, "an RFC 3339 string or unix seconds"));
    };

    let layout = if args.len() > 1 {
        text_arg(args, 1, name)?
    } else {
        DEFAULT_TIME_LAYOUT.to_string()
    };
    let mut out = String::new();
    use std::fmt::Write as _;
    write!(out, "{}", time.format(&layout)).map_err(|_| {
        TemplateError::new(
            "TEMPLATE_TIME_LAYOUT",
            format!("formatTime() layout \"{}\" is invalid.", layout),
        )
    })?;
    Ok(Dynamic::from(out))
}

fn slice(args: &[Dynamic], name: &str) -> Result<Dynamic, TemplateError> {
    let item = arg(args, 0, name)?;
    let start = int_arg(args, 1, name)?;
    let end = if args.len() > 2 {
        Some(int_arg(args, 2, name)?)
    } else {
        None
    };

    if let Some(text) = item.read_lock::<ImmutableString>() {
        let chars: Vec<char> = text.chars().collect();
        let (from, to) = slice_bounds(chars.len(), start, end)?;
        return Ok(Dynamic::from(chars[from..to].iter().collect::<String>()));
    }
    if let Some(array) = item.read_lock::<Array>() {
        let (from, to) = slice_bounds(array.len(), start, end)?;
        return Ok(Dynamic::from_array(array[from..to].to_vec()));
    }
    Err(type_error(name, "a string or an array"))
}

fn slice_bounds(len: usize, start: INT, end: Option<INT>) -> Result<(usize, usize), TemplateError> {
    let len_int = INT::try_from(len).unwrap_or(INT::MAX);
    let end = end.unwrap_or(len_int);
    if start < 0 || end < start || end > len_int {
        return Err(TemplateError::new(
            "TEMPLATE_SLICE_RANGE",
            format!("slice [{}:{}] is out of range for length {}.", start, end, len),
        ));
    }
    Ok((start as usize, end as usize))
}

#[cfg(test)]
mod builtins_tests {
    use super::*;
    use crate::options::ActionLimits;
    use crate::session::Session;
    use crate::snapshot::Snapshot;
    use ccmd_core::{Message, RecordingClient};

    fn call(builtin: Builtin, args: Vec<Dynamic>) -> Result<Dynamic, TemplateError> {
        let mut session = Session::new(7);
        let snapshot = Snapshot::default();
        let message = Message::default();
        let client = RecordingClient::new();
        let limits = ActionLimits::default();
        let mut env = CallEnv {
            name: builtin.name(),
            session: &mut session,
            snapshot: &snapshot,
            message: &message,
            client: &client,
            limits: &limits,
        };
        builtin.call(&mut env, &args)
    }

    fn text(value: Dynamic) -> String {
        dynamic_to_text(&value)
    }

    fn s(value: &str) -> Dynamic {
        Dynamic::from(value.to_string())
    }

    #[test]
    fn table_exposes_every_builtin_by_name() {
        let table = builtin_table();
        assert_eq!(table.len(), Builtin::ALL.len());
        assert!(table.contains("inList"));
        assert!(table.contains("toInt64"));
        assert!(!table.contains("in"));
    }

    #[test]
    fn string_helpers() {
        assert_eq!(
            text(call(Builtin::Title, vec![s("hello big-world it's")]).expect("title")),
            "Hello Big-World It's"
        );
        assert_eq!(text(call(Builtin::Lower, vec![s("MiXeD")]).expect("lower")), "mixed");
        assert_eq!(
            text(call(Builtin::JoinStr, vec![s(", "), s("a"), Dynamic::from_array(vec![s("b"), Dynamic::from_int(3)])]).expect("join")),
            "a, b, 3"
        );
        assert_eq!(text(call(Builtin::Str, vec![Dynamic::from_int(12)]).expect("str")), "12");
    }

    #[test]
    fn dict_and_json() {
        let map = call(Builtin::Dict, vec![s("a"), Dynamic::from_int(1), s("b"), s("x")])
            .expect("dict");
        assert_eq!(
            text(call(Builtin::Json, vec![map]).expect("json")),
            r#"{"a":1,"b":"x"}"#
        );
        let error = call(Builtin::Dict, vec![s("a")]).expect_err("odd dict");
        assert_eq!(error.code, "TEMPLATE_DICT_ARITY");
    }

    #[test]
    fn membership_compares_values() {
        let list = Dynamic::from_array(vec![Dynamic::from_int(1), s("two")]);
        assert!(call(Builtin::InList, vec![list.clone(), s("two")])
            .expect("in")
            .as_bool()
            .expect("bool"));
        assert!(!call(Builtin::InList, vec![list, s("1")])
            .expect("in")
            .as_bool()
            .expect("bool"));
        assert!(call(Builtin::InList, vec![s("nope"), s("x")]).is_err());
    }

    #[test]
    fn arithmetic_and_coercion() {
        assert_eq!(
            call(Builtin::Add, vec![Dynamic::from_int(2), s("3")])
                .expect("add")
                .as_int()
                .expect("int"),
            5
        );
        assert_eq!(
            call(Builtin::Add, vec![Dynamic::from_int(1), Dynamic::from_float(0.5)])
                .expect("add")
                .as_float()
                .expect("float"),
            1.5
        );
        assert_eq!(
            call(Builtin::Add, vec![Dynamic::from_int(INT::MAX), Dynamic::from_int(1)])
                .expect_err("overflow")
                .code,
            "TEMPLATE_INT_OVERFLOW"
        );
        assert_eq!(
            call(Builtin::ToInt, vec![s("12abc")]).expect("toInt").as_int().expect("int"),
            0
        );
        assert_eq!(
            call(Builtin::ToInt64, vec![s("-8")]).expect("toInt64").as_int().expect("int"),
            -8
        );
    }

    #[test]
    fn role_above_compares_positions() {
        let role = |position: INT| {
            let mut map = Map::new();
            map.insert("Position".into(), Dynamic::from_int(position));
            Dynamic::from_map(map)
        };
        assert!(call(Builtin::RoleAbove, vec![role(5), role(2)])
            .expect("above")
            .as_bool()
            .expect("bool"));
        assert!(!call(Builtin::RoleAbove, vec![role(2), role(2)])
            .expect("above")
            .as_bool()
            .expect("bool"));
    }

    #[test]
    fn random_helpers_stay_in_range() {
        for _ in 0..20 {
            let value = call(Builtin::RandInt, vec![Dynamic::from_int(5), Dynamic::from_int(8)])
                .expect("randInt")
                .as_int()
                .expect("int");
            assert!((5..8).contains(&value));
        }
        assert_eq!(
            call(Builtin::RandInt, vec![Dynamic::from_int(0)])
                .expect_err("empty range")
                .code,
            "TEMPLATE_RANGE_INVALID"
        );
        let adjective = text(call(Builtin::Adjective, vec![]).expect("adjective"));
        assert!(ADJECTIVES.contains(&adjective.as_str()));

        let shuffled = call(
            Builtin::Shuffle,
            vec![Dynamic::from_array((0..10).map(Dynamic::from_int).collect())],
        )
        .expect("shuffle")
        .cast::<Array>();
        let mut values: Vec<INT> = shuffled.iter().map(|v| v.as_int().expect("int")).collect();
        values.sort_unstable();
        assert_eq!(values, (0..10).collect::<Vec<INT>>());
    }

    #[test]
    fn sequences_are_bounded() {
        let seq = call(Builtin::Seq, vec![Dynamic::from_int(2), Dynamic::from_int(5)])
            .expect("seq")
            .cast::<Array>();
        assert_eq!(seq.len(), 3);
        assert!(call(Builtin::Seq, vec![Dynamic::from_int(5), Dynamic::from_int(2)]).is_err());
        assert!(call(Builtin::Seq, vec![Dynamic::from_int(0), Dynamic::from_int(10_001)]).is_err());
    }

    #[test]
    fn ranges_wider_than_an_int_are_rejected() {
        let wide = || vec![Dynamic::from_int(INT::MIN + 1), Dynamic::from_int(INT::MAX)];
        assert_eq!(
            call(Builtin::Seq, wide()).expect_err("seq overflow").code,
            "TEMPLATE_RANGE_INVALID"
        );
        assert_eq!(
            call(Builtin::RandInt, wide()).expect_err("randInt overflow").code,
            "TEMPLATE_RANGE_INVALID"
        );
        let edge = call(
            Builtin::Seq,
            vec![Dynamic::from_int(INT::MAX - 2), Dynamic::from_int(INT::MAX)],
        )
        .expect("seq at the top of the range")
        .cast::<Array>();
        assert_eq!(edge.len(), 2);
    }

    #[test]
    fn format_time_reports_the_unparsable_text() {
        let error = call(Builtin::FormatTime, vec![s("not-a-time")]).expect_err("bad time");
        assert!(error.message.contains("\"not-a-time\""));
    }

    #[test]
    fn time_formatting() {
        assert_eq!(
            text(call(Builtin::FormatTime, vec![s("2021-03-04T05:06:07Z"), s("%Y-%m-%d")]).expect("format")),
            "2021-03-04"
        );
        assert_eq!(
            text(call(Builtin::FormatTime, vec![Dynamic::from_int(0)]).expect("epoch")),
            "01 Jan 70 00:00 UTC"
        );
        assert_eq!(
            call(Builtin::FormatTime, vec![s("yesterday")])
                .expect_err("bad time")
                .code,
            "TEMPLATE_TIME_INVALID"
        );
    }

    #[test]
    fn slicing_strings_and_arrays() {
        assert_eq!(
            text(call(Builtin::Slice, vec![s("héllo"), Dynamic::from_int(1), Dynamic::from_int(3)]).expect("slice")),
            "él"
        );
        let tail = call(
            Builtin::Slice,
            vec![
                Dynamic::from_array(vec![Dynamic::from_int(1), Dynamic::from_int(2)]),
                Dynamic::from_int(1),
            ],
        )
        .expect("slice array")
        .cast::<Array>();
        assert_eq!(tail.len(), 1);
        assert_eq!(
            call(Builtin::Slice, vec![s("abc"), Dynamic::from_int(4)])
                .expect_err("range")
                .code,
            "TEMPLATE_SLICE_RANGE"
        );
    }
}
