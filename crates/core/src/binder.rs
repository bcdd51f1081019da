//! Writes scalar parameters into a template.
//!
//! Binding only changes literals inside existing nodes. It never adds or
//! removes nodes, and it never overwrites a reference: a path that lands
//! on one counts as a structural failure and the fallback path is tried.

use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::diagnostics::{report, Diagnostic, Rewritten};
use crate::graph::{Graph, Lookup, Node, NodeId};
use crate::path::ParamPath;
use crate::registry::{ParameterRegistry, ParameterSpec, ValueKind};

/// User-supplied parameters by name.
pub type ParameterSet = BTreeMap<String, Value>;

/// Bind `parameters` into a copy of `template`.
pub fn bind(
    template: &Graph,
    parameters: &ParameterSet,
    registry: &ParameterRegistry,
) -> Rewritten {
    let mut graph = template.clone();
    let mut diagnostics = Vec::new();

    for (name, value) in parameters {
        let specs: Vec<&ParameterSpec> = registry.specs_for(name).collect();
        if specs.is_empty() {
            report(
                &mut diagnostics,
                Diagnostic::UnknownParameter {
                    parameter: name.clone(),
                },
            );
            continue;
        }

        // Selectors look at the template's wiring, which binding never changes.
        let targets: Vec<(&ParameterSpec, NodeId)> = specs
            .iter()
            .flat_map(|spec| {
                template
                    .nodes()
                    .filter(move |(id, node)| spec.applies_to(template, id, node))
                    .map(move |(id, _)| (*spec, id.clone()))
            })
            .collect();

        if targets.is_empty() {
            let mut names: Vec<String> = specs.iter().map(|s| s.target.to_string()).collect();
            names.dedup();
            report(
                &mut diagnostics,
                Diagnostic::NoMatchingNode {
                    parameter: name.clone(),
                    targets: names,
                },
            );
            continue;
        }

        for (spec, id) in targets {
            if let Err(diagnostic) = bind_one(&mut graph, spec, &id, value) {
                report(&mut diagnostics, diagnostic);
            }
        }
    }

    tracing::debug!(
        parameters = parameters.len(),
        diagnostics = diagnostics.len(),
        "Parameters bound",
    );

    Rewritten { graph, diagnostics }
}

/// Write `value` to one node, primary path first.
fn bind_one(
    graph: &mut Graph,
    spec: &ParameterSpec,
    id: &NodeId,
    value: &Value,
) -> Result<(), Diagnostic> {
    let Some(node) = graph.get_mut(id) else {
        return Ok(());
    };

    let primary_err = match write(node, &spec.primary, spec, value)? {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    let Some(fallback) = &spec.fallback else {
        return Err(Diagnostic::BindFailed {
            parameter: spec.name.clone(),
            node: id.clone(),
            reason: primary_err,
        });
    };

    match write(node, fallback, spec, value)? {
        Ok(()) => {
            tracing::debug!(
                parameter = %spec.name,
                node = %id,
                path = %fallback,
                "Primary path unusable, wrote fallback",
            );
            Ok(())
        }
        Err(fallback_err) => Err(Diagnostic::BindFailed {
            parameter: spec.name.clone(),
            node: id.clone(),
            reason: format!("{primary_err}; fallback: {fallback_err}"),
        }),
    }
}

/// Coerce and write. The outer error is a coercion failure (no point
/// trying another path); the inner one is a structural failure.
fn write(
    node: &mut Node,
    path: &ParamPath,
    spec: &ParameterSpec,
    value: &Value,
) -> Result<Result<(), String>, Diagnostic> {
    let existing = match node.get_path(path) {
        Lookup::Value(v) => Some(v.clone()),
        Lookup::Reference(_) | Lookup::NotFound => None,
    };
    let coerced = coerce(value, spec.value_kind, existing.as_ref()).ok_or_else(|| {
        Diagnostic::CoercionFailed {
            parameter: spec.name.clone(),
            expected: spec.value_kind.label().to_string(),
            value: value.to_string(),
        }
    })?;
    Ok(node.set_path(path, coerced).map_err(|e| e.to_string()))
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Convert `value` to the literal representation the target expects.
///
/// Float parameters keep their fractional part. An existing integer
/// literal only makes a whole float come out as `8` rather than `8.0`; an
/// existing float literal turns integer parameters into floats.
pub fn coerce(value: &Value, kind: ValueKind, existing: Option<&Value>) -> Option<Value> {
    match kind {
        ValueKind::Text => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        ValueKind::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            _ => None,
        },
        ValueKind::Integer | ValueKind::Float | ValueKind::Seed => {
            let number = as_f64(value)?;
            let existing_float = match existing {
                Some(Value::Number(n)) => Some(n.is_f64()),
                _ => None,
            };
            match (kind, existing_float) {
                // Fractions always survive; an integer literal only decides
                // how a whole number is spelled.
                (ValueKind::Float, Some(false)) if number.fract() == 0.0 => to_integer(number),
                (ValueKind::Float, _) | (_, Some(true)) => {
                    Number::from_f64(number).map(Value::Number)
                }
                (ValueKind::Seed, _) => to_seed(value, number),
                _ => to_integer(number.round()),
            }
        }
    }
}

fn to_integer(number: f64) -> Option<Value> {
    (number.is_finite() && number.abs() < i64::MAX as f64).then(|| Value::from(number as i64))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Seeds are unsigned 64-bit; large ones lose precision through `f64`, so
/// integers are read directly.
fn to_seed(value: &Value, number: f64) -> Option<Value> {
    if let Some(n) = value.as_u64() {
        return Some(Value::from(n));
    }
    if let Some(n) = value.as_str().and_then(|s| s.trim().parse::<u64>().ok()) {
        return Some(Value::from(n));
    }
    (number.is_finite() && number >= 0.0 && number.fract() == 0.0 && number < u64::MAX as f64)
        .then(|| Value::from(number as u64))
}
