//! Configuration validation against a [`Schema`].
//!
//! Validation produces diagnostics rather than errors so the host can show
//! every problem in a configuration at once.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_newrelic::schema::{Attribute, Schema};
//! use hemmer_provider_newrelic::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute(
//!     "domain",
//!     Attribute::optional_string()
//!         .with_allowed_values(["APM", "BROWSER"])
//!         .case_insensitive(),
//! );
//!
//! assert!(validate(&schema, &json!({"domain": "apm"})).is_empty());
//! assert_eq!(validate(&schema, &json!({"domain": "NOPE"})).len(), 1);
//! ```

use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped
/// - Attribute types and allowed values must match
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        }
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    let value = match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
            return;
        }
        Some(v) => v,
    };

    match attr.attr_type {
        AttributeType::String => match value.as_str() {
            Some(s) => validate_allowed_value(attr, s, path, diagnostics),
            None => diagnostics.push(type_error(path, "string", value)),
        },
        AttributeType::Int64 => {
            if value.as_i64().is_none() {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
    }
}

fn validate_allowed_value(
    attr: &Attribute,
    value: &str,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.allowed_values.is_empty() {
        return;
    }

    let accepted = attr.allowed_values.iter().any(|allowed| {
        if attr.case_insensitive {
            allowed.eq_ignore_ascii_case(value)
        } else {
            allowed == value
        }
    });

    if !accepted {
        diagnostics.push(
            Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                .with_detail(format!(
                    "Expected one of [{}], got {:?}",
                    attr.allowed_values.join(", "),
                    value
                ))
                .with_attribute(path),
        );
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // List and set blocks share a JSON array representation.
    let items = match value {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(arr)) => arr.as_slice(),
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", type_name(v)))
                    .with_attribute(path),
            );
            return;
        }
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (i, item) in items.iter().enumerate() {
        validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn aws_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("account_id", Attribute::optional_computed_int64())
            .with_block(
                "aws",
                NestedBlock::set(
                    Block::new()
                        .with_attribute("linked_account_id", Attribute::computed_int64())
                        .with_attribute("arn", Attribute::required_string())
                        .with_attribute("name", Attribute::required_string()),
                ),
            )
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "checkout-service"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required"));
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("account_id", Attribute::optional_int64());

        assert!(validate(&schema, &json!({"account_id": 123})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(&schema, &json!({"account_id": "123"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail,
            Some("Expected int64, got string".to_string())
        );

        assert_eq!(validate(&schema, &json!({"account_id": 1.5})).len(), 1);
    }

    #[test]
    fn test_validate_allowed_values() {
        let strict = Schema::v0().with_attribute(
            "region",
            Attribute::optional_string().with_allowed_values(["US", "EU"]),
        );
        assert!(validate(&strict, &json!({"region": "EU"})).is_empty());
        assert_eq!(validate(&strict, &json!({"region": "eu"})).len(), 1);

        let folded = Schema::v0().with_attribute(
            "type",
            Attribute::optional_computed_string()
                .with_allowed_values(["APPLICATION", "HOST"])
                .case_insensitive(),
        );
        assert!(validate(&folded, &json!({"type": "application"})).is_empty());

        let diagnostics = validate(&folded, &json!({"type": "dashboards"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("type".to_string()));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let diagnostics = validate(&aws_schema(), &json!({"id": 5, "aws": []}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_set_block_items() {
        let valid = json!({
            "aws": [
                {"arn": "arn:aws:iam::1:role/a", "name": "a"},
                {"arn": "arn:aws:iam::2:role/b", "name": "b"}
            ]
        });
        assert!(validate(&aws_schema(), &valid).is_empty());

        let invalid = json!({"aws": [{"arn": "arn:aws:iam::1:role/a"}]});
        let diagnostics = validate(&aws_schema(), &invalid);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("aws.0.name".to_string()));

        let diagnostics = validate(&aws_schema(), &json!({"aws": "not-a-list"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_validate_max_items() {
        let schema = Schema::v0().with_block(
            "tag",
            NestedBlock::list(
                Block::new()
                    .with_attribute("key", Attribute::required_string())
                    .with_attribute("value", Attribute::required_string()),
            )
            .with_max_items(1),
        );

        assert!(validate(&schema, &json!({"tag": [{"key": "env", "value": "prod"}]})).is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"tag": [
                {"key": "env", "value": "prod"},
                {"key": "team", "value": "core"}
            ]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));
    }

    #[test]
    fn test_validate_root_not_object() {
        let diagnostics = validate(&aws_schema(), &json!("oops"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert!(diagnostics[0].attribute.is_none());
    }
}
