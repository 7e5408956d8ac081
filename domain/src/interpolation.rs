//! Interpolation engine: substitutes `${path.to.value}` tokens in a
//! template against a context object.
//!
//! Pure domain logic, no I/O — mirrors the teacher's text-pattern
//! functions in `quorum_domain::quorum::parsing`: small, independently
//! testable, and deliberately tolerant of malformed input rather than
//! erroring.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Matches a template string that is *entirely* one interpolation token,
/// e.g. `"${a.b.c}"`. Capture group 1 is the (possibly empty) expression.
static EXACT_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$\{([^}]*)\}$").unwrap());

/// Matches any `${...}` occurrence, for partial substitution within a
/// larger string.
static PARTIAL_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").unwrap());

/// Substitute every `${expr}` occurrence in `template` against `ctx`.
///
/// Resolution never fails: missing paths resolve to `Value::Null` in the
/// exact-match case, and are left as the literal `${...}` text in the
/// partial-match case. This is by design — step inputs are best-effort
/// templates (see spec §4.1).
pub fn interpolate(template: &Value, ctx: &Value) -> Value {
    match template {
        Value::String(s) => interpolate_string(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate(v, ctx)).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), interpolate(v, ctx));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn interpolate_string(s: &str, ctx: &Value) -> Value {
    if let Some(caps) = EXACT_TOKEN.captures(s) {
        let expr = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if expr.is_empty() {
            return Value::Null;
        }
        return resolve_path(expr, ctx).unwrap_or(Value::Null);
    }

    if !PARTIAL_TOKEN.is_match(s) {
        return Value::String(s.to_string());
    }

    let replaced = PARTIAL_TOKEN.replace_all(s, |caps: &regex::Captures| {
        let expr = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if expr.is_empty() {
            return String::new();
        }
        match resolve_path(expr, ctx) {
            Some(value) => display_string(&value),
            None => caps.get(0).unwrap().as_str().to_string(),
        }
    });

    Value::String(replaced.into_owned())
}

/// Resolve a dot-separated path against `ctx`. Each segment is trimmed of
/// surrounding whitespace. Numeric segments index into arrays; all other
/// segments look up object keys. Only own properties are consulted —
/// trivially true here since `serde_json::Map` has no prototype chain.
fn resolve_path(path: &str, ctx: &Value) -> Option<Value> {
    let mut current = ctx;
    for raw_segment in path.split('.') {
        let segment = raw_segment.trim();
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

/// JS-`String()`-equivalent rendering of a resolved value for partial
/// substitution into a larger string.
fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exact_match_any_type() {
        let ctx = json!({"x": {"y": 42}});
        assert_eq!(interpolate(&json!("${x.y}"), &ctx), json!(42));
    }

    #[test]
    fn test_exact_match_missing_path_yields_null() {
        let ctx = json!({"x": {}});
        assert_eq!(interpolate(&json!("${x.missing}"), &ctx), Value::Null);
    }

    #[test]
    fn test_exact_match_empty_expression_yields_null() {
        let ctx = json!({});
        assert_eq!(interpolate(&json!("${}"), &ctx), Value::Null);
    }

    #[test]
    fn test_partial_match_empty_expression_yields_empty_string() {
        let ctx = json!({});
        assert_eq!(interpolate(&json!("a${}b"), &ctx), json!("ab"));
    }

    #[test]
    fn test_partial_match_substitutes_stringified_value() {
        let ctx = json!({"x": {"y": 42, "z": "Q"}});
        let template = json!({
            "a": "${x.y}",
            "b": ["${x.z}", "literal"],
            "c": "prefix-${x.y}-suffix"
        });
        let expected = json!({
            "a": 42,
            "b": ["Q", "literal"],
            "c": "prefix-42-suffix"
        });
        assert_eq!(interpolate(&template, &ctx), expected);
    }

    #[test]
    fn test_partial_match_unresolved_token_left_in_place() {
        let ctx = json!({});
        assert_eq!(
            interpolate(&json!("hello ${missing.path} world"), &ctx),
            json!("hello ${missing.path} world")
        );
    }

    #[test]
    fn test_array_index_path() {
        let ctx = json!({"list": [{"field": "first"}, {"field": "second"}]});
        assert_eq!(
            interpolate(&json!("${list.1.field}"), &ctx),
            json!("second")
        );
    }

    #[test]
    fn test_literal_values_returned_unchanged() {
        let ctx = json!({"x": 1});
        let literal = json!({"a": 1, "b": [true, null, "plain"], "c": 3.14});
        assert_eq!(interpolate(&literal, &ctx), literal);
    }

    #[test]
    fn test_whitespace_trimmed_per_segment() {
        let ctx = json!({"x": {"y": "hit"}});
        assert_eq!(interpolate(&json!("${ x . y }"), &ctx), json!("hit"));
    }

    #[test]
    fn test_resolution_never_panics_on_scalar_traversal() {
        let ctx = json!({"x": 5});
        // "x.y" tries to index into a number — should resolve to None, not panic.
        assert_eq!(interpolate(&json!("${x.y}"), &ctx), Value::Null);
    }

    #[test]
    fn test_recurse_nested_arrays_and_objects() {
        let ctx = json!({"a": 1, "b": 2});
        let template = json!([{"v": "${a}"}, {"v": "${b}"}, ["${a}", "${b}"]]);
        let expected = json!([{"v": 1}, {"v": 2}, [1, 2]]);
        assert_eq!(interpolate(&template, &ctx), expected);
    }
}
