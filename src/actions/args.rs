//! Positional argument decoding.

use crate::error::ArgumentError;
use serde_json::{Map, Value};

pub trait ParseArgs: Sized {
    /// # Errors
    /// Returns an argument error for a short list or a mistyped position.
    fn parse_args(args: &[Value]) -> Result<Self, ArgumentError>;
}

/// A call whose only argument is a VM cid.
#[derive(Debug)]
pub struct VmIdArgs {
    pub vm_id: String,
}

impl ParseArgs for VmIdArgs {
    fn parse_args(args: &[Value]) -> Result<Self, ArgumentError> {
        let args = Positional::expect(args, 1)?;
        Ok(Self {
            vm_id: args.string(0, "vm_cid")?.to_string(),
        })
    }
}

/// Checked view over a call's argument list.
#[derive(Debug, Clone, Copy)]
pub struct Positional<'a> {
    values: &'a [Value],
}

impl<'a> Positional<'a> {
    /// # Errors
    /// Returns `MissingArguments` when fewer than `expected` values are given.
    pub fn expect(values: &'a [Value], expected: usize) -> Result<Self, ArgumentError> {
        if values.len() < expected {
            return Err(ArgumentError::MissingArguments {
                expected,
                got: values.len(),
            });
        }
        Ok(Self { values })
    }

    fn at(&self, index: usize) -> &'a Value {
        self.values.get(index).unwrap_or(&Value::Null)
    }

    /// # Errors
    /// Returns `InvalidType` when the value is not a string.
    pub fn string(&self, index: usize, name: &str) -> Result<&'a str, ArgumentError> {
        let value = self.at(index);
        value.as_str().ok_or_else(|| invalid_type(name, "string", value))
    }

    /// # Errors
    /// Returns `InvalidType` when the value is not an object.
    pub fn object(&self, index: usize, name: &str) -> Result<&'a Map<String, Value>, ArgumentError> {
        let value = self.at(index);
        value.as_object().ok_or_else(|| invalid_type(name, "object", value))
    }

    /// # Errors
    /// Returns `InvalidType` when the value is not a number.
    pub fn number(&self, index: usize, name: &str) -> Result<f64, ArgumentError> {
        let value = self.at(index);
        value.as_f64().ok_or_else(|| invalid_type(name, "number", value))
    }
}

/// # Errors
/// Returns `InvalidType` when `key` is absent or not a string.
pub fn required_string_property<'a>(
    properties: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ArgumentError> {
    let value = properties.get(key).unwrap_or(&Value::Null);
    value
        .as_str()
        .ok_or_else(|| invalid_type(&format!("cloud_properties.{key}"), "string", value))
}

pub fn invalid_type(name: &str, expected: &'static str, value: &Value) -> ArgumentError {
    ArgumentError::InvalidType {
        name: name.to_string(),
        expected,
        got: json_value_type_name(value),
    }
}

pub const fn json_value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{required_string_property, Positional};
    use crate::error::ArgumentError;
    use serde_json::json;

    #[test]
    fn given_short_argument_list_when_expected_then_missing_arguments_is_returned() {
        let args = [json!("vm-1")];

        let result = Positional::expect(&args, 2);

        assert!(matches!(
            result,
            Err(ArgumentError::MissingArguments { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn given_number_where_string_expected_when_decoded_then_type_names_are_reported() -> Result<(), ArgumentError> {
        let args = [json!(42)];
        let positional = Positional::expect(&args, 1)?;

        let err = positional.string(0, "vm_cid").err();

        assert_eq!(
            err.map(|e| e.to_string()),
            Some("Unexpected argument where vm_cid should be: expected string, got number".to_string())
        );
        Ok(())
    }

    #[test]
    fn given_missing_property_when_read_then_invalid_type_names_the_property() {
        let properties = json!({"vm_flavor": "core-100"});
        let map = properties.as_object().cloned().unwrap_or_default();

        let err = required_string_property(&map, "disk_flavor");

        assert!(matches!(
            err,
            Err(ArgumentError::InvalidType { ref name, got: "null", .. }) if name == "cloud_properties.disk_flavor"
        ));
    }
}
