use ccmd_core::TemplateError;
use rhai::{Array, Dynamic, ImmutableString, Map, FLOAT, INT};
use serde_json::{Number, Value};

pub(crate) fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(value) => Dynamic::from_bool(*value),
        Value::Number(number) => number_to_dynamic(number),
        Value::String(value) => Dynamic::from(value.clone()),
        Value::Array(values) => {
            Dynamic::from_array(values.iter().map(json_to_dynamic).collect::<Array>())
        }
        Value::Object(values) => {
            let mut map = Map::new();
            for (key, value) in values {
                map.insert(key.as_str().into(), json_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

fn number_to_dynamic(number: &Number) -> Dynamic {
    if let Some(value) = number.as_i64() {
        return Dynamic::from_int(value as INT);
    }
    Dynamic::from_float(number.as_f64().unwrap_or_default() as FLOAT)
}

pub(crate) fn dynamic_to_json(value: &Dynamic) -> Result<Value, TemplateError> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(value) = value.as_bool() {
        return Ok(Value::Bool(value));
    }
    if let Ok(value) = value.as_int() {
        return Ok(Value::from(value));
    }
    if let Ok(value) = value.as_float() {
        return Number::from_f64(value).map(Value::Number).ok_or_else(|| {
            TemplateError::new(
                "TEMPLATE_VALUE_UNSUPPORTED",
                format!("Number {} cannot be represented as JSON.", value),
            )
        });
    }
    if let Ok(value) = value.as_char() {
        return Ok(Value::String(value.to_string()));
    }
    if let Some(value) = value.read_lock::<ImmutableString>() {
        return Ok(Value::String(value.to_string()));
    }
    if let Some(array) = value.read_lock::<Array>() {
        return array
            .iter()
            .map(dynamic_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if let Some(map) = value.read_lock::<Map>() {
        let mut out = serde_json::Map::new();
        for (key, value) in map.iter() {
            out.insert(key.to_string(), dynamic_to_json(value)?);
        }
        return Ok(Value::Object(out));
    }

    Err(TemplateError::new(
        "TEMPLATE_VALUE_UNSUPPORTED",
        format!("Value of type {} cannot be converted.", value.type_name()),
    ))
}

/// How a value prints when interpolated: unit prints nothing and integral
/// floats drop their fraction.
pub(crate) fn dynamic_to_text(value: &Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if let Ok(value) = value.as_float() {
        if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
            return (value as i64).to_string();
        }
        return value.to_string();
    }
    if let Some(value) = value.read_lock::<ImmutableString>() {
        return value.to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod rhai_bridge_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_objects_become_rhai_maps() {
        let dynamic = json_to_dynamic(&json!({"Name": "Test", "ID": 5, "Tags": ["a"], "X": null}));
        let map = dynamic.cast::<Map>();
        assert_eq!(
            map.get("Name").expect("name").clone().into_string().expect("string"),
            "Test"
        );
        assert_eq!(map.get("ID").expect("id").as_int().expect("int"), 5);
        assert!(map.get("Tags").expect("tags").is_array());
        assert!(map.get("X").expect("x").is_unit());
    }

    #[test]
    fn dynamic_values_convert_back_to_json() {
        let original = json!({"a": [1, 2.5, "x", true], "b": null});
        let roundtrip = dynamic_to_json(&json_to_dynamic(&original)).expect("to json");
        assert_eq!(roundtrip, original);
        assert_eq!(
            dynamic_to_json(&Dynamic::from('c')).expect("char"),
            json!("c")
        );
        assert!(dynamic_to_json(&Dynamic::from(FLOAT::NAN)).is_err());
    }

    #[test]
    fn text_rendering_of_scalars() {
        assert_eq!(dynamic_to_text(&Dynamic::UNIT), "");
        assert_eq!(dynamic_to_text(&Dynamic::from_float(2.0)), "2");
        assert_eq!(dynamic_to_text(&Dynamic::from_float(2.5)), "2.5");
        assert_eq!(dynamic_to_text(&Dynamic::from_int(-3)), "-3");
        assert_eq!(dynamic_to_text(&Dynamic::from("hi".to_string())), "hi");
        assert_eq!(dynamic_to_text(&Dynamic::from_bool(true)), "true");
    }
}
