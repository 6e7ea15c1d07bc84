//! `${identifier}` interpolation over JSON value trees.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::ContextStore;

/// Matches `${identifier}`; the identifier is everything up to the first `}`.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex is valid"));

/// Resolve every placeholder in a value tree against `ctx`.
///
/// Strings are scanned for placeholders, which are replaced by the string
/// form of the matching context entry, or by nothing when the entry is
/// absent or `null`. Other scalars pass through. Arrays and objects are
/// resolved element-wise with their structure and order preserved.
pub fn resolve(value: &Value, ctx: &ContextStore) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replace the placeholders in a single string.
pub fn interpolate(input: &str, ctx: &ContextStore) -> String {
    PLACEHOLDER_RE
        .replace_all(input, |caps: &Captures<'_>| {
            ctx.get(&caps[1]).map(display_value).unwrap_or_default()
        })
        .into_owned()
}

/// String form of a value as inserted into a template: strings raw,
/// `null` empty, containers as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> ContextStore {
        let mut ctx = ContextStore::new();
        for (k, v) in pairs {
            ctx.set(*k, v.clone());
        }
        ctx
    }

    #[test]
    fn missing_key_is_empty_string() {
        assert_eq!(resolve(&json!("${missing}"), &ContextStore::new()), json!(""));
    }

    #[test]
    fn scalars_use_display_form() {
        let ctx = ctx(&[
            ("n", json!(2)),
            ("f", json!(1.5)),
            ("b", json!(true)),
            ("s", json!("x")),
            ("z", Value::Null),
        ]);
        assert_eq!(interpolate("${n}|${f}|${b}|${s}|${z}", &ctx), "2|1.5|true|x|");
    }

    #[test]
    fn containers_render_as_json() {
        let ctx = ctx(&[("user", json!({"id": 1})), ("ids", json!([1, 2]))]);
        assert_eq!(interpolate("${user} ${ids}", &ctx), r#"{"id":1} [1,2]"#);
    }

    #[test]
    fn walks_nested_trees_and_keeps_non_strings() {
        let ctx = ctx(&[("who", json!("ada")), ("lvl", json!(4))]);
        let input = json!({
            "message": "hello ${who}",
            "level": "${lvl}",
            "raw": 3,
            "flags": [true, null, "${who}!"],
            "nested": {"deep": ["${lvl}${lvl}"]}
        });
        assert_eq!(
            resolve(&input, &ctx),
            json!({
                "message": "hello ada",
                "level": "4",
                "raw": 3,
                "flags": [true, null, "ada!"],
                "nested": {"deep": ["44"]}
            })
        );
    }

    #[test]
    fn resolve_is_idempotent_on_its_output() {
        let ctx = ctx(&[("x", json!(2))]);
        let once = resolve(&json!(["${x}", {"a": "${y} and ${x}"}]), &ctx);
        let twice = resolve(&once, &ctx);
        assert_eq!(once, twice);
    }

    #[test]
    fn unterminated_placeholder_is_left_alone() {
        let ctx = ctx(&[("x", json!(1))]);
        assert_eq!(interpolate("${x", &ctx), "${x");
        assert_eq!(interpolate("$x", &ctx), "$x");
        assert_eq!(interpolate("${}", &ctx), "${}");
    }
}
