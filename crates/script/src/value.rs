use std::collections::BTreeMap;

use crate::error::ScriptError;

/// Runtime value produced by script evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// One resolved step of an assignment path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Name(String),
    Position(usize),
}

impl Value {
    /// Convert a `serde_json::Value` into a runtime `Value`.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Null
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => {
                Self::List(arr.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(obj) => Self::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(v) => serde_json::Value::Array(v.iter().map(Self::to_json).collect()),
            Self::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Truthiness for conditions and logical operators.
    ///
    /// `null`, `false`, zero, NaN and the empty string are falsy; lists and
    /// maps are always truthy, even when empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::List(_) | Self::Map(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Text used for string concatenation, templates and log lines.
    ///
    /// Strings appear raw, integral floats drop their fraction and
    /// containers render as compact JSON.
    #[allow(clippy::cast_possible_truncation)]
    pub fn display_string(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                (*f as i64).to_string()
            }
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::List(_) | Self::Map(_) => self.to_json().to_string(),
        }
    }

    /// Read a named property. Missing keys read as `null`; `length` is
    /// defined on strings and lists.
    pub fn field(&self, name: &str) -> Result<Self, ScriptError> {
        match self {
            Self::Map(m) => Ok(m.get(name).cloned().unwrap_or(Self::Null)),
            Self::String(s) if name == "length" => Ok(Self::Int(len_to_int(s.chars().count()))),
            Self::List(v) if name == "length" => Ok(Self::Int(len_to_int(v.len()))),
            Self::Null => Err(ScriptError::TypeError(format!(
                "cannot read property '{name}' of null"
            ))),
            _ => Ok(Self::Null),
        }
    }

    /// Read by index. Out-of-range positions read as `null`.
    pub fn index(&self, idx: &Self) -> Result<Self, ScriptError> {
        match (self, idx) {
            (Self::List(v), _) => {
                let pos = idx.as_position()?;
                Ok(pos.and_then(|p| v.get(p)).cloned().unwrap_or(Self::Null))
            }
            (Self::String(s), _) => {
                let pos = idx.as_position()?;
                Ok(pos
                    .and_then(|p| s.chars().nth(p))
                    .map_or(Self::Null, |c| Self::String(c.to_string())))
            }
            (Self::Map(_), Self::String(key)) => self.field(key),
            (Self::Map(m), Self::Int(_) | Self::Float(_)) => Ok(m
                .get(&idx.display_string())
                .cloned()
                .unwrap_or(Self::Null)),
            _ => Err(ScriptError::TypeError(format!(
                "cannot index {} with {}",
                self.type_name(),
                idx.type_name()
            ))),
        }
    }

    /// Interpret an index operand as a list position. Negative and
    /// fractional numbers address nothing.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub(crate) fn as_position(&self) -> Result<Option<usize>, ScriptError> {
        match self {
            Self::Int(i) => Ok(usize::try_from(*i).ok()),
            Self::Float(f) if f.fract() == 0.0 && *f >= 0.0 => Ok(Some(*f as usize)),
            Self::Float(_) => Ok(None),
            other => Err(ScriptError::TypeError(format!(
                "list index must be a number, got {}",
                other.type_name()
            ))),
        }
    }

    /// Convert an evaluated index operand into a path key.
    pub(crate) fn to_key(&self) -> Result<Key, ScriptError> {
        match self {
            Self::String(s) => Ok(Key::Name(s.clone())),
            _ => self.as_position()?.map(Key::Position).ok_or_else(|| {
                ScriptError::TypeError(format!(
                    "invalid assignment index {}",
                    self.display_string()
                ))
            }),
        }
    }

    /// Approximate in-memory size in bytes, or `None` when lists and maps
    /// nest deeper than `max_depth`.
    pub fn footprint(&self, max_depth: usize) -> Option<usize> {
        let slot = std::mem::size_of::<Self>();
        match self {
            Self::String(s) => Some(slot + s.len()),
            Self::List(_) | Self::Map(_) if max_depth == 0 => None,
            Self::List(items) => items.iter().try_fold(slot, |total, item| {
                Some(total + item.footprint(max_depth - 1)?)
            }),
            Self::Map(entries) => entries.iter().try_fold(slot, |total, (key, item)| {
                Some(total + key.len() + item.footprint(max_depth - 1)?)
            }),
            _ => Some(slot),
        }
    }

    /// Read the value at `path`, `null` when any step is missing.
    pub fn get_path(&self, path: &[Key]) -> Self {
        let mut current = self;
        for key in path {
            let next = match (current, key) {
                (Self::Map(m), Key::Name(name)) => m.get(name),
                (Self::Map(m), Key::Position(p)) => m.get(&p.to_string()),
                (Self::List(v), Key::Position(p)) => v.get(*p),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Self::Null,
            }
        }
        current.clone()
    }

    /// Write `value` at `path`, creating intermediate maps for missing or
    /// null steps. Writing past the end of a list pads it with nulls.
    pub fn set_path(&mut self, path: &[Key], value: Self) -> Result<(), ScriptError> {
        let Some((first, rest)) = path.split_first() else {
            *self = value;
            return Ok(());
        };

        if matches!(self, Self::Null) {
            *self = Self::Map(BTreeMap::new());
        }

        let slot = match (self, first) {
            (Self::Map(m), Key::Name(name)) => m.entry(name.clone()).or_insert(Self::Null),
            (Self::Map(m), Key::Position(p)) => m.entry(p.to_string()).or_insert(Self::Null),
            (Self::List(v), Key::Position(p)) => {
                if *p >= v.len() {
                    v.resize(p + 1, Self::Null);
                }
                &mut v[*p]
            }
            (target, key) => {
                return Err(ScriptError::TypeError(format!(
                    "cannot assign {} on {}",
                    match key {
                        Key::Name(name) => format!("property '{name}'"),
                        Key::Position(p) => format!("index {p}"),
                    },
                    target.type_name()
                )));
            }
        };
        slot.set_path(rest, value)
    }
}

fn len_to_int(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion_preserves_shape() {
        let json = json!({"a": [1, 2.5, "x", null, true], "b": {"c": {}}});
        assert_eq!(Value::from_json(json.clone()).to_json(), json);
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
        assert!(Value::Map(BTreeMap::new()).is_truthy());
        assert!(Value::String("0".into()).is_truthy());
    }

    #[test]
    fn display() {
        assert_eq!(Value::Float(3.0).display_string(), "3");
        assert_eq!(Value::Float(0.5).display_string(), "0.5");
        assert_eq!(
            Value::from_json(json!({"k": [1]})).display_string(),
            r#"{"k":[1]}"#
        );
    }

    #[test]
    fn length_and_missing_fields() {
        assert_eq!(
            Value::String("héllo".into()).field("length").unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            Value::List(vec![Value::Null]).field("length").unwrap(),
            Value::Int(1)
        );
        assert_eq!(Value::Int(1).field("x").unwrap(), Value::Null);
        assert!(Value::Null.field("x").is_err());
    }

    #[test]
    fn indexing() {
        let list = Value::from_json(json!([10, 20]));
        assert_eq!(list.index(&Value::Int(1)).unwrap(), Value::Int(20));
        assert_eq!(list.index(&Value::Int(5)).unwrap(), Value::Null);
        assert_eq!(list.index(&Value::Int(-1)).unwrap(), Value::Null);
        assert!(list.index(&Value::String("0".into())).is_err());

        let map = Value::from_json(json!({"1": "one", "k": "v"}));
        assert_eq!(map.index(&Value::Int(1)).unwrap(), Value::String("one".into()));
        assert_eq!(map.index(&Value::String("k".into())).unwrap(), Value::String("v".into()));

        assert_eq!(
            Value::String("abc".into()).index(&Value::Int(2)).unwrap(),
            Value::String("c".into())
        );
    }

    #[test]
    fn set_path_creates_intermediate_maps() {
        let mut value = Value::Null;
        value
            .set_path(
                &[Key::Name("user".into()), Key::Name("id".into())],
                Value::Int(7),
            )
            .unwrap();
        assert_eq!(value.to_json(), json!({"user": {"id": 7}}));
        assert_eq!(
            value.get_path(&[Key::Name("user".into()), Key::Name("id".into())]),
            Value::Int(7)
        );
        assert_eq!(value.get_path(&[Key::Name("nope".into())]), Value::Null);
    }

    #[test]
    fn footprint_grows_with_contents() {
        let small = Value::from_json(json!([1, 2]));
        let large = Value::from_json(json!([1, 2, "a long string value", {"k": [3]}]));
        assert!(large.footprint(8).unwrap() > small.footprint(8).unwrap());
        assert_eq!(
            Value::Int(1).footprint(0),
            Some(std::mem::size_of::<Value>())
        );
    }

    #[test]
    fn footprint_refuses_deep_nesting() {
        let nested = Value::from_json(json!([[[1]]]));
        assert!(nested.footprint(3).is_some());
        assert!(nested.footprint(2).is_none());
    }

    #[test]
    fn set_path_pads_lists() {
        let mut value = Value::List(vec![]);
        value
            .set_path(&[Key::Position(2)], Value::Bool(true))
            .unwrap();
        assert_eq!(value.to_json(), json!([null, null, true]));
    }

    #[test]
    fn set_path_rejects_scalars() {
        let mut value = Value::Int(1);
        let err = value
            .set_path(&[Key::Name("x".into())], Value::Null)
            .unwrap_err();
        assert!(err.to_string().contains("cannot assign property 'x' on int"));
    }
}
