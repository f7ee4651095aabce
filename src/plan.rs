//! Schema-driven planning.
//!
//! The planner compares prior and proposed state for the top-level
//! attributes and blocks a [`Schema`] declares:
//!
//! - computed-only attributes are carried over from prior state
//! - optional+computed attributes left null keep their prior value
//! - case-insensitive attributes that only differ in case keep the prior spelling
//! - set blocks compare order-insensitively, ignoring computed nested attributes
//! - a change to a `force_new` attribute requires replacement

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::schema::{Attribute, Block, BlockNestingMode, NestedBlock, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Plan the transition from `prior` to `proposed`.
///
/// `prior` is `None` when the resource is being created; `proposed` is
/// `Value::Null` when it is being destroyed.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    match (prior, proposed) {
        (Some(prior), Value::Null) => plan_destroy(schema, prior),
        (None, proposed) => plan_create(schema, proposed),
        (Some(prior), proposed) => plan_update(schema, prior, proposed),
    }
}

fn plan_create(schema: &Schema, proposed: &Value) -> PlanResult {
    let changes = top_level_names(&schema.block)
        .into_iter()
        .filter_map(|name| {
            field(proposed, &name).map(|value| AttributeChange::added(name, value.clone()))
        })
        .collect();

    PlanResult {
        planned_state: proposed.clone(),
        changes,
        requires_replace: false,
    }
}

fn plan_destroy(schema: &Schema, prior: &Value) -> PlanResult {
    let changes = top_level_names(&schema.block)
        .into_iter()
        .filter_map(|name| {
            field(prior, &name).map(|value| AttributeChange::removed(name, value.clone()))
        })
        .collect();

    PlanResult {
        planned_state: Value::Null,
        changes,
        requires_replace: false,
    }
}

fn plan_update(schema: &Schema, prior: &Value, proposed: &Value) -> PlanResult {
    let mut planned = proposed.as_object().cloned().unwrap_or_default();
    let mut changes = Vec::new();
    let mut requires_replace = false;

    let mut names: Vec<_> = schema.block.attributes.iter().collect();
    names.sort_by(|a, b| a.0.cmp(b.0));
    for (name, attr) in names {
        let before = field(prior, name);
        let after = field(proposed, name);

        if attr.flags.is_computed_only() || (attr.flags.computed && after.is_none()) {
            set_field(&mut planned, name, before.cloned());
            continue;
        }

        if attribute_equal(attr, before, after) {
            set_field(&mut planned, name, before.cloned());
            continue;
        }

        requires_replace |= attr.force_new;
        changes.push(change(name, before, after));
    }

    let mut blocks: Vec<_> = schema.block.blocks.iter().collect();
    blocks.sort_by(|a, b| a.0.cmp(b.0));
    for (name, nested) in blocks {
        let before = items(field(prior, name));
        let after = items(field(proposed, name));

        if !blocks_equal(nested, &before, &after) {
            changes.push(change(name, field(prior, name), field(proposed, name)));
        }

        let carried = carry_computed(&nested.block, &before, &after);
        if !carried.is_empty() || field(proposed, name).is_some() {
            planned.insert(name.clone(), Value::Array(carried));
        }
    }

    if requires_replace {
        // The replacement gets fresh computed values from create.
        for (name, attr) in &schema.block.attributes {
            if attr.flags.is_computed_only() {
                planned.insert(name.clone(), Value::Null);
            }
        }
    }

    PlanResult {
        planned_state: Value::Object(planned),
        changes,
        requires_replace,
    }
}

fn top_level_names(block: &Block) -> BTreeSet<String> {
    block
        .attributes
        .keys()
        .chain(block.blocks.keys())
        .cloned()
        .collect()
}

/// A present, non-null field of a JSON object.
fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value.get(name).filter(|v| !v.is_null())
}

fn set_field(planned: &mut Map<String, Value>, name: &str, value: Option<Value>) {
    match value {
        Some(v) => {
            planned.insert(name.to_string(), v);
        }
        None => {
            planned.remove(name);
        }
    }
}

fn change(name: &str, before: Option<&Value>, after: Option<&Value>) -> AttributeChange {
    match (before, after) {
        (Some(b), Some(a)) => AttributeChange::modified(name, b.clone(), a.clone()),
        (Some(b), None) => AttributeChange::removed(name, b.clone()),
        (None, Some(a)) => AttributeChange::added(name, a.clone()),
        (None, None) => AttributeChange::modified(name, Value::Null, Value::Null),
    }
}

fn attribute_equal(attr: &Attribute, before: Option<&Value>, after: Option<&Value>) -> bool {
    match (before, after) {
        (Some(Value::String(b)), Some(Value::String(a))) if attr.case_insensitive => {
            b.eq_ignore_ascii_case(a)
        }
        (b, a) => b == a,
    }
}

fn items(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Drop computed-only attributes so configured and stored items compare equal.
fn configured_part(block: &Block, item: &Value) -> Value {
    match item.as_object() {
        Some(obj) => Value::Object(
            obj.iter()
                .filter(|(k, v)| {
                    !v.is_null()
                        && !block
                            .attributes
                            .get(k.as_str())
                            .is_some_and(|a| a.flags.is_computed_only())
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        None => item.clone(),
    }
}

fn blocks_equal(nested: &NestedBlock, before: &[Value], after: &[Value]) -> bool {
    let normalize = |list: &[Value]| -> Vec<Value> {
        list.iter()
            .map(|item| configured_part(&nested.block, item))
            .collect()
    };
    let (mut b, mut a) = (normalize(before), normalize(after));

    if nested.nesting_mode == BlockNestingMode::Set {
        let key = |v: &Value| v.to_string();
        b.sort_by_key(key);
        b.dedup();
        a.sort_by_key(key);
        a.dedup();
    }

    b == a
}

/// Fill computed-only attributes of proposed items from the matching prior item.
fn carry_computed(block: &Block, before: &[Value], after: &[Value]) -> Vec<Value> {
    after
        .iter()
        .map(|item| {
            let wanted = configured_part(block, item);
            let matching = before
                .iter()
                .find(|prior| configured_part(block, prior) == wanted);

            match (item.as_object(), matching.and_then(Value::as_object)) {
                (Some(obj), Some(prior)) => {
                    let mut merged = obj.clone();
                    for (name, attr) in &block.attributes {
                        if attr.flags.is_computed_only() {
                            if let Some(v) = prior.get(name) {
                                merged.insert(name.clone(), v.clone());
                            }
                        }
                    }
                    Value::Object(merged)
                }
                _ => item.clone(),
            }
        })
        .collect()
}
