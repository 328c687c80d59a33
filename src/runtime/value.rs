//! JavaScript value types
//!
//! This module defines the runtime representation of JavaScript values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::environment::EnvRef;
use super::interpreter::{Flow, Interpreter};
use crate::ast::FunctionRef;

/// Shared, mutable handle to a heap object
pub type ObjectRef = Rc<RefCell<Object>>;

/// Native function implementation: `(interpreter, this, arguments)`
pub type NativeFn = fn(&mut Interpreter, &Value, &[Value]) -> Flow<Value>;

/// A JavaScript value
#[derive(Clone)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Object (includes arrays, functions, etc.)
    Object(ObjectRef),
}

/// A heap object
pub struct Object {
    pub kind: ObjectKind,
    /// Own string-keyed properties in insertion order
    pub properties: IndexMap<String, Value>,
    pub prototype: Option<ObjectRef>,
    /// Set by `Object.freeze`; writes are silently ignored
    pub frozen: bool,
}

/// Built-in prototype identities, used for method lookup and `instanceof`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Object,
    Function,
    Array,
    String,
    Number,
    Boolean,
    Error,
    Map,
    Set,
    RegExp,
}

/// Internal object kinds
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array elements (holes are stored as undefined)
    Array(Vec<Value>),
    /// User-defined function
    Closure(Closure),
    /// Built-in function
    Native(NativeFunction),
    /// Result of `Function.prototype.bind`
    Bound(BoundFunction),
    Error(ErrorData),
    /// Set members in insertion order
    Set(Vec<Value>),
    /// Map entries in insertion order
    Map(Vec<(Value, Value)>),
    RegExp(Box<RegExpData>),
    /// `Array.prototype` and friends
    Prototype(Intrinsic),
}

/// A user function together with its captured scope
pub struct Closure {
    pub func: FunctionRef,
    pub env: EnvRef,
    /// Declared or inferred name (`const f = () => {}` is named `f`)
    pub name: String,
}

pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
    /// Behavior under `new`; `None` means not a constructor
    pub constructor: Option<NativeFn>,
    /// Receiver captured when a built-in method is read as a value
    pub receiver: Option<Value>,
}

pub struct BoundFunction {
    pub target: Value,
    pub this: Value,
    pub args: Vec<Value>,
}

pub struct ErrorData {
    pub name: String,
    pub message: String,
}

pub struct RegExpData {
    pub source: String,
    pub flags: String,
    pub regex: regex::Regex,
    pub last_index: usize,
}

impl RegExpData {
    pub fn global(&self) -> bool {
        self.flags.contains('g')
    }

    pub fn sticky(&self) -> bool {
        self.flags.contains('y')
    }
}

impl Object {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            prototype: None,
            frozen: false,
        }
    }

    pub fn with_prototype(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            prototype,
            ..Self::new(kind)
        }
    }

    /// Own enumerable keys: array indices, then integer-like keys ascending,
    /// then the rest in insertion order
    pub fn own_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let ObjectKind::Array(elements) = &self.kind {
            keys.extend((0..elements.len()).map(|i| i.to_string()));
        }

        let mut integers: Vec<(u32, &String)> = self
            .properties
            .keys()
            .filter_map(|k| array_index(k).map(|i| (i, k)))
            .collect();
        integers.sort_by_key(|(i, _)| *i);
        keys.extend(integers.into_iter().map(|(_, k)| k.clone()));
        keys.extend(
            self.properties
                .keys()
                .filter(|k| array_index(k).is_none())
                .cloned(),
        );
        keys
    }

    /// Own property lookup including kind-specific virtual properties
    pub fn get_own(&self, key: &str) -> Option<Value> {
        match &self.kind {
            ObjectKind::Array(elements) => {
                if key == "length" {
                    return Some(Value::Number(elements.len() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Some(elements.get(index as usize).cloned().unwrap_or(Value::Undefined));
                }
            }
            ObjectKind::Closure(closure) => match key {
                "name" => return Some(Value::String(closure.name.clone())),
                "length" => {
                    let arity = closure
                        .func
                        .params
                        .params
                        .iter()
                        .take_while(|p| !matches!(p, crate::ast::Pattern::Assignment(_)))
                        .count();
                    return Some(Value::Number(arity as f64));
                }
                _ => {}
            },
            ObjectKind::Native(native) => match key {
                "name" if !self.properties.contains_key("name") => {
                    return Some(Value::String(native.name.to_string()))
                }
                "length" => return Some(Value::Number(0.0)),
                _ => {}
            },
            ObjectKind::Bound(_) if key == "name" => {
                return Some(Value::String("bound".to_string()))
            }
            ObjectKind::Set(items) if key == "size" => {
                return Some(Value::Number(items.len() as f64))
            }
            ObjectKind::Map(entries) if key == "size" => {
                return Some(Value::Number(entries.len() as f64))
            }
            ObjectKind::RegExp(re) => match key {
                "source" => return Some(Value::String(re.source.clone())),
                "flags" => return Some(Value::String(re.flags.clone())),
                "global" => return Some(Value::Boolean(re.global())),
                "ignoreCase" => return Some(Value::Boolean(re.flags.contains('i'))),
                "multiline" => return Some(Value::Boolean(re.flags.contains('m'))),
                "lastIndex" => return Some(Value::Number(re.last_index as f64)),
                _ => {}
            },
            _ => {}
        }

        if let Some(value) = self.properties.get(key) {
            return Some(value.clone());
        }

        if let ObjectKind::Error(err) = &self.kind {
            match key {
                "name" => return Some(Value::String(err.name.clone())),
                "message" => return Some(Value::String(err.message.clone())),
                "stack" => return Some(Value::String(format!("{}: {}", err.name, err.message))),
                _ => {}
            }
        }
        None
    }

    pub fn has_own(&self, key: &str) -> bool {
        match &self.kind {
            ObjectKind::Array(elements) => {
                if key == "length" {
                    return true;
                }
                if let Some(index) = array_index(key) {
                    return (index as usize) < elements.len();
                }
            }
            ObjectKind::Error(_) if key == "message" => return true,
            _ => {}
        }
        self.properties.contains_key(key)
    }

    /// Prototype whose built-in methods apply to this object
    pub fn method_table(&self) -> Option<Intrinsic> {
        match &self.kind {
            ObjectKind::Array(_) => Some(Intrinsic::Array),
            ObjectKind::Closure(_) | ObjectKind::Native(_) | ObjectKind::Bound(_) => {
                Some(Intrinsic::Function)
            }
            ObjectKind::Error(_) => Some(Intrinsic::Error),
            ObjectKind::Set(_) => Some(Intrinsic::Set),
            ObjectKind::Map(_) => Some(Intrinsic::Map),
            ObjectKind::RegExp(_) => Some(Intrinsic::RegExp),
            ObjectKind::Prototype(tag) => Some(*tag),
            ObjectKind::Ordinary => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Closure(_) | ObjectKind::Native(_) | ObjectKind::Bound(_)
        )
    }
}

/// Parse a canonical array index ("0", "17"; not "01" or "-1")
pub fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || key.len() > 10 || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|&i| i != u32::MAX)
}

impl Value {
    pub fn from_object(object: Object) -> Value {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn new_object() -> Value {
        Value::from_object(Object::new(ObjectKind::Ordinary))
    }

    pub fn new_array(elements: Vec<Value>) -> Value {
        Value::from_object(Object::new(ObjectKind::Array(elements)))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    /// Check if value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if value is nullish (null or undefined)
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(|o| o.borrow().is_callable())
    }

    pub fn is_array(&self) -> bool {
        self.as_object()
            .is_some_and(|o| matches!(o.borrow().kind, ObjectKind::Array(_)))
    }

    /// Snapshot of array elements, if this is an array
    pub fn array_elements(&self) -> Option<Vec<Value>> {
        let obj = self.as_object()?.borrow();
        match &obj.kind {
            ObjectKind::Array(elements) => Some(elements.clone()),
            _ => None,
        }
    }

    /// Convert to boolean (truthiness)
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Convert to number; objects go through their default string form
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(_) => string_to_number(&self.to_js_string()),
        }
    }

    /// Convert to JavaScript string representation
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Object(obj) => object_to_string(obj, &mut Vec::new()),
        }
    }

    /// Get the typeof string
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) => {
                if obj.borrow().is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Strict equality (===)
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValueZero, used by `includes`, `Set` and `Map`
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// Abstract equality (==)
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
            (Value::Null | Value::Undefined, _) | (_, Value::Null | Value::Undefined) => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Boolean(b), _) => Value::Number(f64::from(u8::from(*b))).loose_equals(other),
            (_, Value::Boolean(b)) => self.loose_equals(&Value::Number(f64::from(u8::from(*b)))),
            (Value::Object(_), Value::Number(_) | Value::String(_)) => {
                Value::String(self.to_js_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::String(_), Value::Object(_)) => {
                self.loose_equals(&Value::String(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }
}

fn object_to_string(obj: &ObjectRef, seen: &mut Vec<*const RefCell<Object>>) -> String {
    let ptr = Rc::as_ptr(obj);
    if seen.contains(&ptr) {
        return String::new();
    }
    let o = obj.borrow();
    match &o.kind {
        ObjectKind::Array(elements) => {
            seen.push(ptr);
            let parts: Vec<String> = elements
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    Value::Object(inner) => object_to_string(inner, seen),
                    other => other.to_js_string(),
                })
                .collect();
            seen.pop();
            parts.join(",")
        }
        ObjectKind::Closure(closure) => format!("function {}() {{ [code] }}", closure.name),
        ObjectKind::Native(native) => format!("function {}() {{ [native code] }}", native.name),
        ObjectKind::Bound(_) => "function () { [native code] }".to_string(),
        ObjectKind::Error(err) => {
            let name = o
                .properties
                .get("name")
                .map(|v| v.to_js_string())
                .unwrap_or_else(|| err.name.clone());
            let message = o
                .properties
                .get("message")
                .map(|v| v.to_js_string())
                .unwrap_or_else(|| err.message.clone());
            if message.is_empty() {
                name
            } else {
                format!("{}: {}", name, message)
            }
        }
        ObjectKind::RegExp(re) => format!("/{}/{}", re.source, re.flags),
        ObjectKind::Map(_) => "[object Map]".to_string(),
        ObjectKind::Set(_) => "[object Set]".to_string(),
        ObjectKind::Ordinary | ObjectKind::Prototype(_) => "[object Object]".to_string(),
    }
}

/// Parse a string the way `Number(s)` does
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }

    if unsigned.len() > 2 && sign > 0.0 && unsigned.as_bytes()[0] == b'0' {
        let radix = match unsigned.as_bytes()[1] {
            b'x' | b'X' => 16,
            b'o' | b'O' => 8,
            b'b' | b'B' => 2,
            _ => 10,
        };
        if radix != 10 && unsigned.len() == trimmed.len() {
            return u64::from_str_radix(&unsigned[2..], radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }

    if !unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    lexical_core::parse::<f64>(unsigned.as_bytes())
        .map(|n| sign * n)
        .unwrap_or(f64::NAN)
}

/// Length in UTF-16 code units, the unit string indices count in
pub(crate) fn utf16_len(s: &str) -> usize {
    if s.is_ascii() {
        s.len()
    } else {
        s.encode_utf16().count()
    }
}

/// Byte offset of code unit `index`, rounded up to a char boundary
pub(crate) fn utf16_to_byte(s: &str, index: usize) -> usize {
    let mut units = 0;
    for (byte, c) in s.char_indices() {
        if units >= index {
            return byte;
        }
        units += c.len_utf16();
    }
    s.len()
}

pub(crate) fn byte_to_utf16(s: &str, byte: usize) -> usize {
    utf16_len(&s[..byte])
}

/// Code units `start..end`; half of a surrogate pair becomes U+FFFD since
/// a Rust string cannot hold it alone
pub(crate) fn utf16_slice(s: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    if s.is_ascii() {
        let end = end.min(s.len());
        return s.get(start.min(end)..end).unwrap_or_default().to_string();
    }
    let units: Vec<u16> = s.encode_utf16().skip(start).take(end - start).collect();
    String::from_utf16_lossy(&units)
}

/// Format a number the way `Number.prototype.toString()` does
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let abs = n.abs();
    // f64 Display is already the shortest round-trip form without exponent
    if (1e-6..1e21).contains(&abs) {
        return format!("{}", n);
    }

    let s = format!("{:e}", n);
    match s.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => s,
    }
}

/// ToInt32 as used by the bitwise operators
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 as u64 & 0xffff_ffff) as u32 as i32
}

/// ToUint32 as used by `>>>`
pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

// ========== Inspection ==========

/// Render a value the way `console.log` shows it
pub fn inspect(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => inspect_nested(other, 0, &mut Vec::new()),
    }
}

const INSPECT_DEPTH: usize = 2;

fn inspect_nested(value: &Value, depth: usize, seen: &mut Vec<*const RefCell<Object>>) -> String {
    let obj = match value {
        Value::String(s) => return format!("'{}'", s.replace('\'', "\\'")),
        Value::Object(obj) => obj,
        other => return other.to_js_string(),
    };

    let ptr = Rc::as_ptr(obj);
    if seen.contains(&ptr) {
        return "[Circular]".to_string();
    }

    let o = obj.borrow();
    match &o.kind {
        ObjectKind::Closure(c) => {
            if c.name.is_empty() {
                "[Function (anonymous)]".to_string()
            } else {
                format!("[Function: {}]", c.name)
            }
        }
        ObjectKind::Native(n) => format!("[Function: {}]", n.name),
        ObjectKind::Bound(_) => "[Function: bound]".to_string(),
        ObjectKind::Error(_) => value.to_js_string(),
        ObjectKind::RegExp(re) => format!("/{}/{}", re.source, re.flags),
        ObjectKind::Array(elements) => {
            if elements.is_empty() {
                return "[]".to_string();
            }
            if depth > INSPECT_DEPTH {
                return "[Array]".to_string();
            }
            seen.push(ptr);
            let parts: Vec<String> = elements
                .iter()
                .map(|v| inspect_nested(v, depth + 1, seen))
                .collect();
            seen.pop();
            format!("[ {} ]", parts.join(", "))
        }
        ObjectKind::Set(items) if items.is_empty() => "Set(0) {}".to_string(),
        ObjectKind::Map(entries) if entries.is_empty() => "Map(0) {}".to_string(),
        ObjectKind::Set(items) => {
            seen.push(ptr);
            let parts: Vec<String> = items
                .iter()
                .map(|v| inspect_nested(v, depth + 1, seen))
                .collect();
            seen.pop();
            format!("Set({}) {{ {} }}", items.len(), parts.join(", "))
        }
        ObjectKind::Map(entries) => {
            seen.push(ptr);
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{} => {}",
                        inspect_nested(k, depth + 1, seen),
                        inspect_nested(v, depth + 1, seen)
                    )
                })
                .collect();
            seen.pop();
            format!("Map({}) {{ {} }}", entries.len(), parts.join(", "))
        }
        ObjectKind::Ordinary | ObjectKind::Prototype(_) => {
            let keys = o.own_keys();
            if keys.is_empty() {
                return "{}".to_string();
            }
            if depth > INSPECT_DEPTH {
                return "[Object]".to_string();
            }
            seen.push(ptr);
            let parts: Vec<String> = keys
                .iter()
                .map(|k| {
                    let v = o.properties.get(k).cloned().unwrap_or(Value::Undefined);
                    format!("{}: {}", inspect_key(k), inspect_nested(&v, depth + 1, seen))
                })
                .collect();
            seen.pop();
            format!("{{ {} }}", parts.join(", "))
        }
    }
}

fn inspect_key(key: &str) -> String {
    let plain = key
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if plain || array_index(key).is_some() {
        key.to_string()
    } else {
        format!("'{}'", key)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&inspect(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => f.write_str(&inspect(other)),
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
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(123456789012.0), "123456789012");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(2f64.powi(53)), "9007199254740992");
        assert_eq!(number_to_string(-1e20), "-100000000000000000000");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_utf16_indexing() {
        let s = "a😀b";
        assert_eq!(utf16_len(s), 4);
        assert_eq!(utf16_to_byte(s, 1), 1);
        assert_eq!(utf16_to_byte(s, 3), 5);
        assert_eq!(byte_to_utf16(s, 5), 3);
        assert_eq!(utf16_slice(s, 1, 3), "😀");
        assert_eq!(utf16_slice(s, 0, 2), "a\u{FFFD}");
        assert_eq!(utf16_slice("kata", 1, 10), "ata");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42  "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(!Value::String(String::new()).to_boolean());
        assert!(Value::new_array(vec![]).to_boolean());
    }

    #[test]
    fn test_equality() {
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::Number(1.0)));
        assert!(Value::Boolean(true).loose_equals(&Value::Number(1.0)));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
    }

    #[test]
    fn test_array_to_string() {
        let arr = Value::new_array(vec![
            Value::Number(1.0),
            Value::Null,
            Value::new_array(vec![Value::from("a"), Value::from("b")]),
        ]);
        assert_eq!(arr.to_js_string(), "1,,a,b");
    }

    #[test]
    fn test_own_keys_order() {
        let mut obj = Object::new(ObjectKind::Ordinary);
        obj.properties.insert("b".into(), Value::Number(1.0));
        obj.properties.insert("2".into(), Value::Number(2.0));
        obj.properties.insert("a".into(), Value::Number(3.0));
        obj.properties.insert("1".into(), Value::Number(4.0));
        assert_eq!(obj.own_keys(), vec!["1", "2", "b", "a"]);
    }

    #[test]
    fn test_inspect() {
        let mut obj = Object::new(ObjectKind::Ordinary);
        obj.properties.insert("name".into(), Value::from("Ada"));
        obj.properties.insert("tags".into(), Value::new_array(vec![Value::Number(1.0)]));
        assert_eq!(inspect(&Value::from_object(obj)), "{ name: 'Ada', tags: [ 1 ] }");
        assert_eq!(inspect(&Value::from("top")), "top");
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(4294967296.0 + 5.0), 5);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_uint32(-1.0), u32::MAX);
    }
}
