//! Built-in functions and objects
//!
//! Registers the global constructors and namespaces learner code can reach:
//! Object, Array, Number, String, Boolean, Math, JSON, console, the error
//! constructors, Map, Set and RegExp.

use std::rc::Rc;

use super::interpreter::{js_pow, ConsoleLevel, Flow, Interpreter, Interrupt, MAX_ARRAY_LENGTH};
use super::methods::{arg, integer_arg};
use super::value::*;
use crate::error::messages;

/// Register all built-in globals
pub fn install(interp: &mut Interpreter) {
    register_errors(interp);
    register_object(interp);
    register_array(interp);
    register_number(interp);
    register_string(interp);
    register_boolean(interp);
    register_math(interp);
    register_json(interp);
    register_console(interp);
    register_map(interp);
    register_set(interp);
    register_regexp(interp);
    register_global_functions(interp);
}

fn native(name: &'static str, func: NativeFn) -> Value {
    Value::from_object(Object::new(ObjectKind::Native(NativeFunction {
        name,
        func,
        constructor: None,
        receiver: None,
    })))
}

/// A callable constructor whose `prototype` is `proto`
fn constructor(
    name: &'static str,
    func: NativeFn,
    construct: NativeFn,
    proto: Option<ObjectRef>,
) -> Value {
    let mut object = Object::new(ObjectKind::Native(NativeFunction {
        name,
        func,
        constructor: Some(construct),
        receiver: None,
    }));
    if let Some(proto) = proto {
        object
            .properties
            .insert("prototype".to_string(), Value::Object(proto));
    }
    Value::from_object(object)
}

fn define(target: &Value, name: &str, value: Value) {
    if let Value::Object(obj) = target {
        obj.borrow_mut().properties.insert(name.to_string(), value);
    }
}

fn define_functions(target: &Value, functions: &[(&'static str, NativeFn)]) {
    for (name, func) in functions {
        define(target, name, native(name, *func));
    }
}

fn requires_new(interp: &mut Interpreter, name: &str) -> Interrupt {
    interp.type_error(format!("Constructor {} requires 'new'", name))
}

// ========== Errors ==========

macro_rules! error_constructor {
    ($func:ident, $name:literal) => {
        fn $func(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
            let message = match args.first() {
                None | Some(Value::Undefined) => String::new(),
                Some(value) => interp.to_string(value)?,
            };
            Ok(interp.make_error($name, message))
        }
    };
}

error_constructor!(error_ctor, "Error");
error_constructor!(type_error_ctor, "TypeError");
error_constructor!(range_error_ctor, "RangeError");
error_constructor!(reference_error_ctor, "ReferenceError");
error_constructor!(syntax_error_ctor, "SyntaxError");
error_constructor!(eval_error_ctor, "EvalError");
error_constructor!(uri_error_ctor, "URIError");

fn register_errors(interp: &mut Interpreter) {
    let base = interp.intrinsic(Intrinsic::Error);
    if let Some(base) = &base {
        let mut proto = base.borrow_mut();
        proto.properties.insert("name".to_string(), Value::from("Error"));
        proto.properties.insert("message".to_string(), Value::from(""));
    }
    if let Some(base) = base.clone() {
        interp.register_error_prototype("Error", base);
    }
    interp.define_global(
        "Error",
        constructor("Error", error_ctor, error_ctor, base.clone()),
        true,
    );

    let subclasses: [(&'static str, NativeFn); 6] = [
        ("TypeError", type_error_ctor),
        ("RangeError", range_error_ctor),
        ("ReferenceError", reference_error_ctor),
        ("SyntaxError", syntax_error_ctor),
        ("EvalError", eval_error_ctor),
        ("URIError", uri_error_ctor),
    ];
    for (name, func) in subclasses {
        let mut proto = Object::with_prototype(ObjectKind::Prototype(Intrinsic::Error), base.clone());
        proto.properties.insert("name".to_string(), Value::from(name));
        proto.properties.insert("message".to_string(), Value::from(""));
        let proto = Rc::new(std::cell::RefCell::new(proto));
        interp.register_error_prototype(name, proto.clone());
        interp.define_global(name, constructor(name, func, func, Some(proto)), true);
    }
}

// ========== Object ==========

fn require_object_coercible(interp: &Interpreter, value: &Value) -> Flow<()> {
    if value.is_nullish() {
        Err(interp.type_error("Cannot convert undefined or null to object"))
    } else {
        Ok(())
    }
}

fn object_call(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(match arg(args, 0) {
        value @ Value::Object(_) => value,
        _ => Value::new_object(),
    })
}

fn object_keys(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let target = arg(args, 0);
    require_object_coercible(interp, &target)?;
    Ok(Value::new_array(
        interp
            .own_entries(&target)
            .into_iter()
            .map(|(k, _)| Value::String(k))
            .collect(),
    ))
}

fn object_values(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let target = arg(args, 0);
    require_object_coercible(interp, &target)?;
    Ok(Value::new_array(
        interp.own_entries(&target).into_iter().map(|(_, v)| v).collect(),
    ))
}

fn object_entries(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let target = arg(args, 0);
    require_object_coercible(interp, &target)?;
    Ok(Value::new_array(
        interp
            .own_entries(&target)
            .into_iter()
            .map(|(k, v)| Value::new_array(vec![Value::String(k), v]))
            .collect(),
    ))
}

fn object_assign(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let target = arg(args, 0);
    require_object_coercible(interp, &target)?;
    for source in args.iter().skip(1) {
        for (key, value) in interp.own_entries(source) {
            interp.set(&target, &key, value)?;
        }
    }
    Ok(target)
}

fn object_from_entries(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let entries = interp.iterate(&arg(args, 0))?;
    let mut object = Object::new(ObjectKind::Ordinary);
    for entry in entries {
        let key = interp.get(&entry, "0")?;
        let key = interp.to_property_key(&key)?;
        let value = interp.get(&entry, "1")?;
        object.properties.insert(key, value);
    }
    Ok(Value::from_object(object))
}

fn object_freeze(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let target = arg(args, 0);
    if let Value::Object(obj) = &target {
        obj.borrow_mut().frozen = true;
    }
    Ok(target)
}

fn object_is_frozen(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(match arg(args, 0) {
        Value::Object(obj) => obj.borrow().frozen,
        _ => true,
    }))
}

fn object_create(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let proto = match arg(args, 0) {
        Value::Object(obj) => Some(obj),
        Value::Null => None,
        other => {
            return Err(interp.type_error(format!(
                "Object prototype may only be an Object or null: {}",
                other.to_js_string()
            )))
        }
    };
    let object = Value::from_object(Object::with_prototype(ObjectKind::Ordinary, proto));
    if let Some(props) = args.get(1).filter(|v| !v.is_undefined()) {
        for (key, descriptor) in interp.own_entries(props) {
            let value = interp.get(&descriptor, "value")?;
            interp.set(&object, &key, value)?;
        }
    }
    Ok(object)
}

fn object_get_prototype_of(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let target = arg(args, 0);
    require_object_coercible(interp, &target)?;
    let proto = match &target {
        Value::Object(obj) => {
            let o = obj.borrow();
            o.prototype.clone().or_else(|| match o.kind {
                ObjectKind::Ordinary => interp.intrinsic(Intrinsic::Object),
                _ => o.method_table().and_then(|tag| interp.intrinsic(tag)),
            })
        }
        Value::String(_) => interp.intrinsic(Intrinsic::String),
        Value::Number(_) => interp.intrinsic(Intrinsic::Number),
        Value::Boolean(_) => interp.intrinsic(Intrinsic::Boolean),
        _ => None,
    };
    Ok(proto.map(Value::Object).unwrap_or(Value::Null))
}

fn object_get_own_property_names(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let target = arg(args, 0);
    require_object_coercible(interp, &target)?;
    let mut names: Vec<Value> = interp
        .own_entries(&target)
        .into_iter()
        .map(|(k, _)| Value::String(k))
        .collect();
    if target.is_array() || matches!(target, Value::String(_)) {
        names.push(Value::from("length"));
    }
    Ok(Value::new_array(names))
}

fn object_is(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    Ok(Value::Boolean(match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => {
            (x.is_nan() && y.is_nan()) || (x == y && x.is_sign_negative() == y.is_sign_negative())
        }
        _ => a.strict_equals(&b),
    }))
}

fn register_object(interp: &mut Interpreter) {
    let object = constructor(
        "Object",
        object_call,
        object_call,
        interp.intrinsic(Intrinsic::Object),
    );
    define_functions(
        &object,
        &[
            ("keys", object_keys),
            ("values", object_values),
            ("entries", object_entries),
            ("assign", object_assign),
            ("fromEntries", object_from_entries),
            ("freeze", object_freeze),
            ("isFrozen", object_is_frozen),
            ("create", object_create),
            ("getPrototypeOf", object_get_prototype_of),
            ("getOwnPropertyNames", object_get_own_property_names),
            ("is", object_is),
        ],
    );
    interp.define_global("Object", object, true);
}

// ========== Array ==========

fn array_construct(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    if let [Value::Number(n)] = args {
        if *n < 0.0 || n.fract() != 0.0 || *n as usize > MAX_ARRAY_LENGTH {
            return Err(interp.range_error(messages::INVALID_ARRAY_LENGTH));
        }
        return Ok(Value::new_array(vec![Value::Undefined; *n as usize]));
    }
    Ok(Value::new_array(args.to_vec()))
}

fn array_is_array(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(arg(args, 0).is_array()))
}

fn array_from(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let source = arg(args, 0);
    require_object_coercible(interp, &source)?;
    let items = match &source {
        Value::Object(obj)
            if matches!(
                obj.borrow().kind,
                ObjectKind::Array(_) | ObjectKind::Set(_) | ObjectKind::Map(_)
            ) =>
        {
            interp.iterate(&source)?
        }
        Value::String(_) => interp.iterate(&source)?,
        Value::Object(_) => {
            // Array-like: { length: n, 0: ..., 1: ... }
            let length = interp.get(&source, "length")?;
            let length = interp.to_number(&length)?;
            let length = if length.is_nan() { 0.0 } else { length.max(0.0) };
            if length as usize > MAX_ARRAY_LENGTH {
                return Err(interp.range_error(messages::INVALID_ARRAY_LENGTH));
            }
            let mut items = Vec::with_capacity(length as usize);
            for i in 0..length as usize {
                items.push(interp.get(&source, &i.to_string())?);
            }
            items
        }
        _ => Vec::new(),
    };

    let map_fn = arg(args, 1);
    if map_fn.is_undefined() {
        return Ok(Value::new_array(items));
    }
    if !map_fn.is_callable() {
        return Err(interp.type_error(messages::not_a_function(&inspect(&map_fn))));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        mapped.push(interp.call(&map_fn, arg(args, 2), &[item, Value::Number(i as f64)])?);
    }
    Ok(Value::new_array(mapped))
}

fn array_of(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::new_array(args.to_vec()))
}

fn register_array(interp: &mut Interpreter) {
    let array = constructor(
        "Array",
        array_construct,
        array_construct,
        interp.intrinsic(Intrinsic::Array),
    );
    define_functions(
        &array,
        &[
            ("isArray", array_is_array),
            ("from", array_from),
            ("of", array_of),
        ],
    );
    interp.define_global("Array", array, true);
}

// ========== Number ==========

fn number_call(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    match args.first() {
        None => Ok(Value::Number(0.0)),
        Some(value) => Ok(Value::Number(interp.to_number(value)?)),
    }
}

fn number_is_integer(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(
        matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0),
    ))
}

fn number_is_safe_integer(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(matches!(
        arg(args, 0),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0
    )))
}

fn number_is_finite(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(
        matches!(arg(args, 0), Value::Number(n) if n.is_finite()),
    ))
}

fn number_is_nan(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(
        matches!(arg(args, 0), Value::Number(n) if n.is_nan()),
    ))
}

fn register_number(interp: &mut Interpreter) {
    let number = constructor(
        "Number",
        number_call,
        number_call,
        interp.intrinsic(Intrinsic::Number),
    );
    define_functions(
        &number,
        &[
            ("isInteger", number_is_integer),
            ("isSafeInteger", number_is_safe_integer),
            ("isFinite", number_is_finite),
            ("isNaN", number_is_nan),
            ("parseFloat", parse_float),
            ("parseInt", parse_int),
        ],
    );
    for (name, value) in [
        ("MAX_SAFE_INTEGER", 9_007_199_254_740_991.0),
        ("MIN_SAFE_INTEGER", -9_007_199_254_740_991.0),
        ("EPSILON", f64::EPSILON),
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ] {
        define(&number, name, Value::Number(value));
    }
    interp.define_global("Number", number, true);
}

// ========== String / Boolean ==========

fn string_call(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    match args.first() {
        None => Ok(Value::from("")),
        Some(value) => Ok(Value::String(interp.to_string(value)?)),
    }
}

fn string_from_char_code(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let mut units = Vec::with_capacity(args.len());
    for value in args {
        units.push((to_uint32(interp.to_number(value)?) & 0xFFFF) as u16);
    }
    Ok(Value::String(String::from_utf16_lossy(&units)))
}

fn string_from_code_point(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let mut out = String::new();
    for value in args {
        let n = interp.to_number(value)?;
        match char::from_u32(n as u32).filter(|_| n.fract() == 0.0 && n >= 0.0) {
            Some(c) => out.push(c),
            None => {
                return Err(interp.range_error(format!("Invalid code point {}", number_to_string(n))))
            }
        }
    }
    Ok(Value::String(out))
}

fn register_string(interp: &mut Interpreter) {
    let string = constructor(
        "String",
        string_call,
        string_call,
        interp.intrinsic(Intrinsic::String),
    );
    define_functions(
        &string,
        &[
            ("fromCharCode", string_from_char_code),
            ("fromCodePoint", string_from_code_point),
        ],
    );
    interp.define_global("String", string, true);
}

fn boolean_call(_interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(arg(args, 0).to_boolean()))
}

fn register_boolean(interp: &mut Interpreter) {
    let boolean = constructor(
        "Boolean",
        boolean_call,
        boolean_call,
        interp.intrinsic(Intrinsic::Boolean),
    );
    interp.define_global("Boolean", boolean, true);
}

// ========== Math ==========

fn number_arg(interp: &mut Interpreter, args: &[Value], index: usize) -> Flow<f64> {
    match args.get(index) {
        Some(value) => interp.to_number(value),
        None => Ok(f64::NAN),
    }
}

macro_rules! math_unary {
    ($($func:ident => $op:expr),* $(,)?) => {
        $(
            fn $func(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
                let op: fn(f64) -> f64 = $op;
                Ok(Value::Number(op(number_arg(interp, args, 0)?)))
            }
        )*
    };
}

math_unary! {
    math_abs => f64::abs,
    math_floor => f64::floor,
    math_ceil => f64::ceil,
    math_trunc => f64::trunc,
    math_sqrt => f64::sqrt,
    math_cbrt => f64::cbrt,
    math_exp => f64::exp,
    math_expm1 => f64::exp_m1,
    math_log => f64::ln,
    math_log2 => f64::log2,
    math_log10 => f64::log10,
    math_log1p => f64::ln_1p,
    math_sin => f64::sin,
    math_cos => f64::cos,
    math_tan => f64::tan,
    math_asin => f64::asin,
    math_acos => f64::acos,
    math_atan => f64::atan,
    math_sinh => f64::sinh,
    math_cosh => f64::cosh,
    math_tanh => f64::tanh,
    math_fround => |x| x as f32 as f64,
    math_round => |x| {
        let floor = x.floor();
        if x - floor >= 0.5 { floor + 1.0 } else { floor }
    },
    math_sign => |x| {
        if x.is_nan() || x == 0.0 { x } else { x.signum() }
    },
    math_clz32 => |x| f64::from(to_uint32(x).leading_zeros()),
}

fn math_pow(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let base = number_arg(interp, args, 0)?;
    let exponent = number_arg(interp, args, 1)?;
    Ok(Value::Number(js_pow(base, exponent)))
}

fn math_atan2(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let y = number_arg(interp, args, 0)?;
    let x = number_arg(interp, args, 1)?;
    Ok(Value::Number(y.atan2(x)))
}

fn math_max(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let mut result = f64::NEG_INFINITY;
    for value in args {
        let n = interp.to_number(value)?;
        if n.is_nan() {
            result = f64::NAN;
        } else if !result.is_nan() && n > result {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

fn math_min(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let mut result = f64::INFINITY;
    for value in args {
        let n = interp.to_number(value)?;
        if n.is_nan() {
            result = f64::NAN;
        } else if !result.is_nan() && n < result {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

fn math_hypot(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let mut sum = 0.0;
    for value in args {
        let n = interp.to_number(value)?;
        sum += n * n;
    }
    Ok(Value::Number(sum.sqrt()))
}

fn math_random(_interp: &mut Interpreter, _this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::Number(rand::random::<f64>()))
}

fn register_math(interp: &mut Interpreter) {
    let math = Value::new_object();

    for (name, value) in [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ] {
        define(&math, name, Value::Number(value));
    }

    define_functions(
        &math,
        &[
            ("abs", math_abs),
            ("floor", math_floor),
            ("ceil", math_ceil),
            ("round", math_round),
            ("trunc", math_trunc),
            ("sign", math_sign),
            ("sqrt", math_sqrt),
            ("cbrt", math_cbrt),
            ("pow", math_pow),
            ("exp", math_exp),
            ("expm1", math_expm1),
            ("log", math_log),
            ("log2", math_log2),
            ("log10", math_log10),
            ("log1p", math_log1p),
            ("sin", math_sin),
            ("cos", math_cos),
            ("tan", math_tan),
            ("asin", math_asin),
            ("acos", math_acos),
            ("atan", math_atan),
            ("atan2", math_atan2),
            ("sinh", math_sinh),
            ("cosh", math_cosh),
            ("tanh", math_tanh),
            ("hypot", math_hypot),
            ("fround", math_fround),
            ("clz32", math_clz32),
            ("max", math_max),
            ("min", math_min),
            ("random", math_random),
        ],
    );
    interp.define_global("Math", math, true);
}

// ========== JSON ==========

/// Nesting beyond this in `JSON.stringify` is reported as a stack overflow
const MAX_JSON_DEPTH: usize = 1000;

fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Serialize a value; `None` for values JSON omits (undefined, functions)
fn to_json(
    interp: &mut Interpreter,
    value: &Value,
    stack: &mut Vec<ObjectRef>,
) -> Flow<Option<serde_json::Value>> {
    let obj = match value {
        Value::Undefined => return Ok(None),
        Value::Null => return Ok(Some(serde_json::Value::Null)),
        Value::Boolean(b) => return Ok(Some(serde_json::Value::Bool(*b))),
        Value::Number(n) => return Ok(Some(json_number(*n))),
        Value::String(s) => return Ok(Some(serde_json::Value::String(s.clone()))),
        Value::Object(obj) => obj,
    };
    if obj.borrow().is_callable() {
        return Ok(None);
    }
    if stack.iter().any(|seen| Rc::ptr_eq(seen, obj)) {
        return Err(interp.type_error("Converting circular structure to JSON"));
    }
    if stack.len() >= MAX_JSON_DEPTH {
        return Err(interp.range_error(messages::MAXIMUM_CALL_STACK));
    }

    let to_json_method = obj.borrow().properties.get("toJSON").cloned();
    if let Some(method) = to_json_method.filter(|m| m.is_callable()) {
        let replaced = interp.call(&method, value.clone(), &[])?;
        if !matches!(&replaced, Value::Object(o) if Rc::ptr_eq(o, obj)) {
            return to_json(interp, &replaced, stack);
        }
    }

    stack.push(obj.clone());
    let result = if let Some(elements) = value.array_elements() {
        let mut items = Vec::with_capacity(elements.len());
        for element in &elements {
            items.push(to_json(interp, element, stack)?.unwrap_or(serde_json::Value::Null));
        }
        serde_json::Value::Array(items)
    } else {
        let mut map = serde_json::Map::new();
        let entries = match obj.borrow().kind {
            ObjectKind::Ordinary | ObjectKind::Error(_) => None,
            _ => Some(Vec::new()),
        };
        let entries = entries.unwrap_or_else(|| interp.own_entries(value));
        for (key, item) in entries {
            if let Some(json) = to_json(interp, &item, stack)? {
                map.insert(key, json);
            }
        }
        serde_json::Value::Object(map)
    };
    stack.pop();
    Ok(Some(result))
}

fn json_stringify(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let value = arg(args, 0);
    let indent = match arg(args, 2) {
        Value::Number(n) if n >= 1.0 => " ".repeat((n as usize).min(10)),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };

    let Some(json) = to_json(interp, &value, &mut Vec::new())? else {
        return Ok(Value::Undefined);
    };

    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        serde::Serialize::serialize(&json, &mut serializer)
            .map(|_| String::from_utf8_lossy(&out).into_owned())
    };
    text.map(Value::String)
        .map_err(|e| interp.type_error(e.to_string()))
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::new_array(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => {
            let mut object = Object::new(ObjectKind::Ordinary);
            for (key, value) in map {
                object.properties.insert(key, from_json(value));
            }
            Value::from_object(object)
        }
    }
}

fn json_parse(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let text = interp.to_string(&arg(args, 0))?;
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => Ok(from_json(json)),
        Err(e) => Err(interp.syntax_error(format!(
            "Unexpected token in JSON at line {} column {}",
            e.line(),
            e.column()
        ))),
    }
}

fn register_json(interp: &mut Interpreter) {
    let json = Value::new_object();
    define_functions(
        &json,
        &[("stringify", json_stringify), ("parse", json_parse)],
    );
    interp.define_global("JSON", json, true);
}

// ========== console ==========

/// Render console arguments: strings raw, everything else inspected
pub fn format_console_args(args: &[Value]) -> String {
    args.iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => inspect(other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

macro_rules! console_method {
    ($($func:ident => $level:expr),* $(,)?) => {
        $(
            fn $func(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
                interp.console_write($level, format_console_args(args));
                Ok(Value::Undefined)
            }
        )*
    };
}

console_method! {
    console_log => ConsoleLevel::Log,
    console_info => ConsoleLevel::Info,
    console_warn => ConsoleLevel::Warn,
    console_error => ConsoleLevel::Error,
    console_debug => ConsoleLevel::Debug,
}

fn register_console(interp: &mut Interpreter) {
    let console = Value::new_object();
    define_functions(
        &console,
        &[
            ("log", console_log),
            ("info", console_info),
            ("warn", console_warn),
            ("error", console_error),
            ("debug", console_debug),
            ("trace", console_debug),
        ],
    );
    interp.define_global("console", console, true);
}

// ========== Map / Set ==========

fn map_call(interp: &mut Interpreter, _this: &Value, _args: &[Value]) -> Flow<Value> {
    Err(requires_new(interp, "Map"))
}

fn map_construct(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let mut entries: Vec<(Value, Value)> = Vec::new();
    let source = arg(args, 0);
    if !source.is_nullish() {
        for entry in interp.iterate(&source)? {
            if !matches!(entry, Value::Object(_)) {
                return Err(interp.type_error(format!(
                    "Iterator value {} is not an entry object",
                    entry.to_js_string()
                )));
            }
            let key = interp.get(&entry, "0")?;
            let value = interp.get(&entry, "1")?;
            match entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
                Some(existing) => existing.1 = value,
                None => entries.push((key, value)),
            }
        }
    }
    Ok(Value::from_object(Object::with_prototype(
        ObjectKind::Map(entries),
        interp.intrinsic(Intrinsic::Map),
    )))
}

fn register_map(interp: &mut Interpreter) {
    let map = constructor("Map", map_call, map_construct, interp.intrinsic(Intrinsic::Map));
    interp.define_global("Map", map, true);
}

fn set_call(interp: &mut Interpreter, _this: &Value, _args: &[Value]) -> Flow<Value> {
    Err(requires_new(interp, "Set"))
}

fn set_construct(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let mut items: Vec<Value> = Vec::new();
    let source = arg(args, 0);
    if !source.is_nullish() {
        for item in interp.iterate(&source)? {
            if !items.iter().any(|v| v.same_value_zero(&item)) {
                items.push(item);
            }
        }
    }
    Ok(Value::from_object(Object::with_prototype(
        ObjectKind::Set(items),
        interp.intrinsic(Intrinsic::Set),
    )))
}

fn register_set(interp: &mut Interpreter) {
    let set = constructor("Set", set_call, set_construct, interp.intrinsic(Intrinsic::Set));
    interp.define_global("Set", set, true);
}

// ========== RegExp ==========

fn regexp_construct(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let pattern = arg(args, 0);
    let existing = pattern.as_object().and_then(|o| match &o.borrow().kind {
        ObjectKind::RegExp(re) => Some((re.source.clone(), re.flags.clone())),
        _ => None,
    });
    let (source, inherited_flags) = match existing {
        Some(found) => found,
        None if pattern.is_undefined() => ("(?:)".to_string(), String::new()),
        None => (interp.to_string(&pattern)?, String::new()),
    };
    let flags = match args.get(1) {
        None | Some(Value::Undefined) => inherited_flags,
        Some(value) => interp.to_string(value)?,
    };
    interp.make_regexp(&source, &flags)
}

fn register_regexp(interp: &mut Interpreter) {
    let regexp = constructor(
        "RegExp",
        regexp_construct,
        regexp_construct,
        interp.intrinsic(Intrinsic::RegExp),
    );
    interp.define_global("RegExp", regexp, true);
}

// ========== Global functions ==========

fn parse_int(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let text = interp.to_string(&arg(args, 0))?;
    let radix = integer_arg(interp, args, 1, 0.0)? as i64;
    Ok(Value::Number(parse_int_str(&text, radix)))
}

/// `parseInt` on an already converted string
pub(crate) fn parse_int_str(text: &str, radix: i64) -> f64 {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let has_hex_prefix = rest.starts_with("0x") || rest.starts_with("0X");
    let (radix, digits) = match radix {
        0 if has_hex_prefix => (16, &rest[2..]),
        0 => (10, rest),
        16 if has_hex_prefix => (16, &rest[2..]),
        r if (2..=36).contains(&r) => (r as u32, rest),
        _ => return f64::NAN,
    };

    let mut result: f64 = 0.0;
    let mut any = false;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                result = result * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    if !any {
        return f64::NAN;
    }
    if negative {
        -result
    } else {
        result
    }
}

fn parse_float(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    let text = interp.to_string(&arg(args, 0))?;
    Ok(Value::Number(parse_float_str(&text)))
}

/// `parseFloat`: the longest decimal-literal prefix
pub(crate) fn parse_float_str(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if trimmed[end..].starts_with("Infinity") {
        return if bytes.first() == Some(&b'-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if bytes.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        mantissa_digits += frac_end - end - 1;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    let literal = trimmed[..end].trim_end_matches('.');
    lexical_core::parse::<f64>(literal.as_bytes()).unwrap_or(f64::NAN)
}

fn global_is_nan(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(number_arg(interp, args, 0)?.is_nan()))
}

fn global_is_finite(interp: &mut Interpreter, _this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(number_arg(interp, args, 0)?.is_finite()))
}

fn register_global_functions(interp: &mut Interpreter) {
    interp.define_global("undefined", Value::Undefined, false);
    interp.define_global("NaN", Value::Number(f64::NAN), false);
    interp.define_global("Infinity", Value::Number(f64::INFINITY), false);

    for (name, func) in [
        ("parseInt", parse_int as NativeFn),
        ("parseFloat", parse_float),
        ("isNaN", global_is_nan),
        ("isFinite", global_is_finite),
    ] {
        interp.define_global(name, native(name, func), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int_str("  42px", 0), 42.0);
        assert_eq!(parse_int_str("-0x1F", 0), -31.0);
        assert_eq!(parse_int_str("101", 2), 5.0);
        assert!(parse_int_str("abc", 10).is_nan());
        assert!(parse_int_str("12", 1).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float_str("3.14abc"), 3.14);
        assert_eq!(parse_float_str("  -.5"), -0.5);
        assert_eq!(parse_float_str("1e3x"), 1000.0);
        assert_eq!(parse_float_str("2e"), 2.0);
        assert_eq!(parse_float_str("7."), 7.0);
        assert_eq!(parse_float_str("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float_str(".").is_nan());
        assert!(parse_float_str("x1").is_nan());
    }

    #[test]
    fn test_json_numbers() {
        assert_eq!(json_number(3.0).to_string(), "3");
        assert_eq!(json_number(0.5).to_string(), "0.5");
        assert_eq!(json_number(f64::NAN).to_string(), "null");
    }

    #[test]
    fn test_console_formatting() {
        let args = vec![
            Value::from("total:"),
            Value::Number(3.0),
            Value::new_array(vec![Value::from("a")]),
        ];
        assert_eq!(format_console_args(&args), "total: 3 [ 'a' ]");
    }
}
