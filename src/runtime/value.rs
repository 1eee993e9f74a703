use crate::runtime::error::{RuntimeError, RuntimeResult};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Upper bound on the size of a string built by `string * number`.
const MAX_REPEAT_BYTES: usize = 1 << 28;

/// An immutable JSON value. Containers are reference counted so that values can
/// be shared across streams and environments without copying.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<BTreeMap<String, Value>>),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Rc::from(text.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(entries))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    /// `type (value)`, the way values are quoted in error messages.
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        if text.chars().count() > 24 {
            text = text.chars().take(21).collect::<String>() + "...";
        }
        format!("{} ({})", self.type_name(), text)
    }

    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Less),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    let ord = left.compare(right);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => {
                let keys = a.keys().cmp(b.keys());
                if keys != Ordering::Equal {
                    return keys;
                }
                for (left, right) in a.values().zip(b.values()) {
                    let ord = left.compare(right);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    pub fn length(&self) -> RuntimeResult<Value> {
        match self {
            Value::Null => Ok(Value::Number(0.0)),
            Value::Number(n) => Ok(Value::Number(n.abs())),
            Value::String(text) => Ok(Value::Number(text.chars().count() as f64)),
            Value::Array(items) => Ok(Value::Number(items.len() as f64)),
            Value::Object(entries) => Ok(Value::Number(entries.len() as f64)),
            Value::Bool(_) => Err(RuntimeError::type_mismatch(format!(
                "{} has no length",
                self.describe()
            ))),
        }
    }

    pub fn keys(&self) -> RuntimeResult<Value> {
        match self {
            Value::Object(entries) => Ok(Value::array(
                entries.keys().map(Value::string).collect(),
            )),
            Value::Array(items) => Ok(Value::array(
                (0..items.len()).map(|idx| Value::Number(idx as f64)).collect(),
            )),
            other => Err(RuntimeError::type_mismatch(format!(
                "{} has no keys",
                other.describe()
            ))),
        }
    }

    pub fn field(&self, name: &str) -> RuntimeResult<Value> {
        match self {
            Value::Object(entries) => Ok(entries.get(name).cloned().unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            other => Err(RuntimeError::index(format!(
                "Cannot index {} with \"{}\"",
                other.type_name(),
                name
            ))),
        }
    }

    pub fn index(&self, key: &Value) -> RuntimeResult<Value> {
        match (self, key) {
            (Value::Null, Value::String(_) | Value::Number(_) | Value::Null) => Ok(Value::Null),
            (Value::Object(_), Value::String(name)) => self.field(name),
            (Value::Array(items), Value::Number(n)) => {
                let len = items.len() as f64;
                let idx = n.floor();
                let idx = if idx < 0.0 { idx + len } else { idx };
                if idx.is_nan() || idx < 0.0 || idx >= len {
                    Ok(Value::Null)
                } else {
                    Ok(items[idx as usize].clone())
                }
            }
            (target, key) => Err(RuntimeError::index(format!(
                "Cannot index {} with {}",
                target.type_name(),
                key.type_name()
            ))),
        }
    }

    pub fn slice(&self, from: &Value, to: &Value) -> RuntimeResult<Value> {
        let len = match self {
            Value::Null => return Ok(Value::Null),
            Value::Array(items) => items.len(),
            Value::String(text) => text.chars().count(),
            other => {
                return Err(RuntimeError::index(format!(
                    "Cannot index {} with object",
                    other.type_name()
                )))
            }
        };
        let start = slice_bound(from, 0, len, f64::floor)?;
        let end = slice_bound(to, len, len, f64::ceil)?.max(start);
        match self {
            Value::Array(items) => Ok(Value::array(items[start..end].to_vec())),
            Value::String(text) => Ok(Value::string(
                text.chars().skip(start).take(end - start).collect::<String>(),
            )),
            _ => Ok(Value::Null),
        }
    }

    pub fn iterate(&self) -> RuntimeResult<Vec<Value>> {
        match self {
            Value::Array(items) => Ok(items.to_vec()),
            Value::Object(entries) => Ok(entries.values().cloned().collect()),
            other => Err(RuntimeError::index(format!(
                "Cannot iterate over {}",
                other.describe()
            ))),
        }
    }

    pub fn add(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Null, value) | (value, Value::Null) => Ok(value.clone()),
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => {
                let mut items = a.to_vec();
                items.extend(b.iter().cloned());
                Ok(Value::array(items))
            }
            (Value::Object(a), Value::Object(b)) => {
                let mut entries = (**a).clone();
                entries.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(Value::object(entries))
            }
            _ => Err(self.operand_error(other, "added")),
        }
    }

    pub fn sub(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
            (Value::Array(a), Value::Array(b)) => Ok(Value::array(
                a.iter()
                    .filter(|item| !b.iter().any(|removed| removed == *item))
                    .cloned()
                    .collect(),
            )),
            _ => Err(self.operand_error(other, "subtracted")),
        }
    }

    pub fn mul(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
            (Value::String(text), Value::Number(n)) | (Value::Number(n), Value::String(text)) => {
                if n.is_nan() || *n <= 0.0 {
                    return Ok(Value::Null);
                }
                let count = n.ceil() as usize;
                match text.len().checked_mul(count) {
                    Some(len) if len <= MAX_REPEAT_BYTES => Ok(Value::string(text.repeat(count))),
                    _ => Err(RuntimeError::type_mismatch(format!(
                        "{} repeated {} times is too long",
                        self.describe(),
                        n
                    ))),
                }
            }
            (Value::Object(a), Value::Object(b)) => Ok(Value::object(deep_merge(a, b))),
            _ => Err(self.operand_error(other, "multiplied")),
        }
    }

    pub fn div(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(_), Value::Number(b)) if *b == 0.0 => Err(self.zero_divisor(other)),
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
            (Value::String(text), Value::String(sep)) => {
                let parts = if text.is_empty() {
                    Vec::new()
                } else if sep.is_empty() {
                    text.chars().map(|c| Value::string(c.to_string())).collect()
                } else {
                    text.split(&**sep).map(Value::string).collect()
                };
                Ok(Value::array(parts))
            }
            _ => Err(self.operand_error(other, "divided")),
        }
    }

    pub fn rem(&self, other: &Value) -> RuntimeResult<Value> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                let divisor = b.trunc() as i64;
                if divisor == 0 {
                    return Err(self.zero_divisor(other));
                }
                // Wrapping only differs for i64::MIN % -1, which is 0.
                let rem = (a.trunc() as i64).wrapping_rem(divisor);
                Ok(Value::Number(rem as f64))
            }
            _ => Err(self.operand_error(other, "divided")),
        }
    }

    fn operand_error(&self, other: &Value, verb: &str) -> RuntimeError {
        RuntimeError::type_mismatch(format!(
            "{} and {} cannot be {}",
            self.describe(),
            other.describe(),
            verb
        ))
    }

    fn zero_divisor(&self, other: &Value) -> RuntimeError {
        RuntimeError::type_mismatch(format!(
            "{} and {} cannot be divided because the divisor is zero",
            self.describe(),
            other.describe()
        ))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(text) => serde_json::Value::String(text.to_string()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| self.to_string())
    }
}

fn slice_bound(
    bound: &Value,
    default: usize,
    len: usize,
    round: fn(f64) -> f64,
) -> RuntimeResult<usize> {
    match bound {
        Value::Null => Ok(default),
        Value::Number(n) => {
            let n = round(*n);
            let n = if n < 0.0 { n + len as f64 } else { n };
            Ok(n.clamp(0.0, len as f64) as usize)
        }
        other => Err(RuntimeError::index(format!(
            "Start and end indices of a slice must be numbers, not {}",
            other.type_name()
        ))),
    }
}

fn deep_merge(
    left: &BTreeMap<String, Value>,
    right: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = left.clone();
    for (key, value) in right {
        let combined = match (merged.get(key), value) {
            (Some(Value::Object(a)), Value::Object(b)) => Value::object(deep_merge(a, b)),
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_infinite() {
        let clamped = if n > 0.0 { f64::MAX } else { f64::MIN };
        return serde_json::Number::from_f64(clamped)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if n.fract() == 0.0 && n.abs() < 1e17 {
        return serde_json::Value::Number(serde_json::Number::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Value::string(text),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::string(text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(Value::Number(200.0).to_string(), "200");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(v(json!([1, {"a": null}])).to_string(), "[1,{\"a\":null}]");
    }

    #[test]
    fn ordering_follows_type_rank() {
        let mut values = vec![
            v(json!({})),
            v(json!([])),
            v(json!("a")),
            v(json!(1)),
            v(json!(true)),
            v(json!(false)),
            v(json!(null)),
        ];
        values.sort_by(Value::compare);
        let names: Vec<_> = values.iter().map(Value::type_name).collect();
        assert_eq!(
            names,
            vec!["null", "boolean", "boolean", "number", "string", "array", "object"]
        );
        assert_eq!(values[1], Value::Bool(false));
    }

    #[test]
    fn addition_covers_containers_and_null() {
        assert_eq!(v(json!(null)).add(&v(json!(3))).unwrap(), v(json!(3)));
        assert_eq!(
            v(json!([1])).add(&v(json!([2, 3]))).unwrap(),
            v(json!([1, 2, 3]))
        );
        assert_eq!(
            v(json!({"a": 1, "b": 1})).add(&v(json!({"b": 2}))).unwrap(),
            v(json!({"a": 1, "b": 2}))
        );
        let err = v(json!(1)).add(&v(json!("a"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "number (1) and string (\"a\") cannot be added"
        );
    }

    #[test]
    fn object_multiplication_merges_recursively() {
        let merged = v(json!({"a": {"x": 1}, "b": 1}))
            .mul(&v(json!({"a": {"y": 2}})))
            .unwrap();
        assert_eq!(merged, v(json!({"a": {"x": 1, "y": 2}, "b": 1})));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(v(json!(1)).div(&v(json!(0))).is_err());
        assert!(v(json!(5)).rem(&v(json!(0))).is_err());
        assert_eq!(v(json!(7)).rem(&v(json!(3))).unwrap(), v(json!(1)));
        assert_eq!(
            v(json!("a,b")).div(&v(json!(","))).unwrap(),
            v(json!(["a", "b"]))
        );
    }

    #[test]
    fn indexing_handles_negative_and_missing() {
        let arr = v(json!([1, 2, 3]));
        assert_eq!(arr.index(&v(json!(-1))).unwrap(), v(json!(3)));
        assert_eq!(arr.index(&v(json!(9))).unwrap(), Value::Null);
        assert_eq!(v(json!(null)).field("a").unwrap(), Value::Null);
        assert!(v(json!(1)).field("a").is_err());
    }

    #[test]
    fn slicing_clamps_bounds() {
        let arr = v(json!([1, 2, 3, 4]));
        assert_eq!(
            arr.slice(&v(json!(1)), &Value::Null).unwrap(),
            v(json!([2, 3, 4]))
        );
        assert_eq!(
            arr.slice(&v(json!(-2)), &v(json!(10))).unwrap(),
            v(json!([3, 4]))
        );
        assert_eq!(
            v(json!("hello")).slice(&v(json!(1)), &v(json!(3))).unwrap(),
            v(json!("el"))
        );
    }

    #[test]
    fn length_of_boolean_is_an_error() {
        assert!(Value::Bool(true).length().is_err());
        assert_eq!(v(json!(-3)).length().unwrap(), v(json!(3)));
    }

    #[test]
    fn remainder_at_integer_extremes() {
        let min = Value::Number(i64::MIN as f64);
        assert_eq!(min.rem(&Value::Number(-1.0)).unwrap(), Value::Number(0.0));
        assert_eq!(
            Value::Number(f64::INFINITY).rem(&Value::Number(-1.0)).unwrap(),
            Value::Number(0.0)
        );
        assert!(Value::Number(1.0).rem(&Value::Number(f64::NAN)).is_err());
    }

    #[test]
    fn string_repetition_is_bounded() {
        let text = Value::string("ab");
        assert_eq!(text.mul(&Value::Number(2.5)).unwrap(), Value::string("ababab"));
        assert_eq!(text.mul(&Value::Number(0.0)).unwrap(), Value::Null);
        assert_eq!(text.mul(&Value::Number(f64::NAN)).unwrap(), Value::Null);
        assert!(text.mul(&Value::Number(1e19)).is_err());
        assert!(Value::Number(f64::INFINITY).mul(&text).is_err());
    }

    #[test]
    fn nan_bounds_and_indices_do_not_panic() {
        let arr = v(json!([1, 2]));
        let nan = Value::Number(f64::NAN);
        assert_eq!(arr.slice(&nan, &Value::Null).unwrap(), v(json!([1, 2])));
        assert_eq!(arr.slice(&Value::Null, &nan).unwrap(), v(json!([])));
        assert_eq!(arr.index(&nan).unwrap(), Value::Null);
        assert_eq!(v(json!([])).index(&nan).unwrap(), Value::Null);
    }
}
