//! Built-in prototype methods
//!
//! Methods are plain [`NativeFn`]s looked up by receiver kind; nothing is
//! stored on the prototype objects themselves. Array callbacks index into the
//! live array and never hold a borrow while learner code runs.

use std::cell::RefMut;
use std::cmp::Ordering;

use super::interpreter::{Flow, Interpreter, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH};
use super::value::*;
use crate::error::messages;

macro_rules! table {
    ($key:expr; $($name:literal => $func:path),* $(,)?) => {
        match $key {
            $($name => Some(($name, $func as NativeFn)),)*
            _ => None,
        }
    };
}

/// Find a built-in method for a receiver kind
pub fn lookup(table: Intrinsic, key: &str) -> Option<(&'static str, NativeFn)> {
    match table {
        Intrinsic::Array => table!(key;
            "push" => array_push,
            "pop" => array_pop,
            "shift" => array_shift,
            "unshift" => array_unshift,
            "slice" => array_slice,
            "splice" => array_splice,
            "concat" => array_concat,
            "join" => array_join,
            "reverse" => array_reverse,
            "indexOf" => array_index_of,
            "lastIndexOf" => array_last_index_of,
            "includes" => array_includes,
            "find" => array_find,
            "findIndex" => array_find_index,
            "findLast" => array_find_last,
            "findLastIndex" => array_find_last_index,
            "filter" => array_filter,
            "map" => array_map,
            "forEach" => array_for_each,
            "reduce" => array_reduce,
            "reduceRight" => array_reduce_right,
            "some" => array_some,
            "every" => array_every,
            "sort" => array_sort,
            "toSorted" => array_to_sorted,
            "toReversed" => array_to_reversed,
            "flat" => array_flat,
            "flatMap" => array_flat_map,
            "fill" => array_fill,
            "keys" => array_keys,
            "values" => array_values,
            "entries" => array_entries,
            "at" => array_at,
            "toString" => array_to_string,
        ),
        Intrinsic::String => table!(key;
            "charAt" => string_char_at,
            "charCodeAt" => string_char_code_at,
            "codePointAt" => string_code_point_at,
            "at" => string_at,
            "indexOf" => string_index_of,
            "lastIndexOf" => string_last_index_of,
            "includes" => string_includes,
            "startsWith" => string_starts_with,
            "endsWith" => string_ends_with,
            "slice" => string_slice,
            "substring" => string_substring,
            "substr" => string_substr,
            "toUpperCase" => string_to_upper_case,
            "toLowerCase" => string_to_lower_case,
            "toLocaleUpperCase" => string_to_upper_case,
            "toLocaleLowerCase" => string_to_lower_case,
            "trim" => string_trim,
            "trimStart" => string_trim_start,
            "trimEnd" => string_trim_end,
            "padStart" => string_pad_start,
            "padEnd" => string_pad_end,
            "repeat" => string_repeat,
            "split" => string_split,
            "replace" => string_replace,
            "replaceAll" => string_replace_all,
            "match" => string_match,
            "matchAll" => string_match_all,
            "search" => string_search,
            "concat" => string_concat,
            "localeCompare" => string_locale_compare,
            "normalize" => string_value_of,
            "toString" => string_value_of,
            "valueOf" => string_value_of,
        ),
        Intrinsic::Number => table!(key;
            "toFixed" => number_to_fixed,
            "toString" => number_to_string_method,
            "toPrecision" => number_to_precision,
            "toLocaleString" => number_to_locale_string,
            "valueOf" => number_value_of,
        ),
        Intrinsic::Boolean => table!(key;
            "toString" => boolean_to_string,
            "valueOf" => boolean_value_of,
        ),
        Intrinsic::Function => table!(key;
            "call" => function_call,
            "apply" => function_apply,
            "bind" => function_bind,
            "toString" => function_to_string,
        ),
        Intrinsic::Error => table!(key;
            "toString" => error_to_string,
        ),
        Intrinsic::Map => table!(key;
            "get" => map_get,
            "set" => map_set,
            "has" => map_has,
            "delete" => map_delete,
            "clear" => map_clear,
            "forEach" => map_for_each,
            "keys" => map_keys,
            "values" => map_values,
            "entries" => map_entries,
        ),
        Intrinsic::Set => table!(key;
            "add" => set_add,
            "has" => set_has,
            "delete" => set_delete,
            "clear" => set_clear,
            "forEach" => set_for_each,
            "values" => set_values,
            "keys" => set_values,
            "entries" => set_entries,
        ),
        Intrinsic::RegExp => table!(key;
            "test" => regexp_test,
            "exec" => regexp_exec,
            "toString" => regexp_to_string,
        ),
        Intrinsic::Object => table!(key;
            "hasOwnProperty" => object_has_own_property,
            "isPrototypeOf" => object_is_prototype_of,
            "propertyIsEnumerable" => object_has_own_property,
            "toString" => object_to_string_method,
            "toLocaleString" => object_to_string_method,
            "valueOf" => object_value_of,
        ),
    }
}

// ========== Argument helpers ==========

pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// ToIntegerOrInfinity with a default for `undefined`
pub(crate) fn integer_arg(
    interp: &mut Interpreter,
    args: &[Value],
    index: usize,
    default: f64,
) -> Flow<f64> {
    match args.get(index) {
        None | Some(Value::Undefined) => Ok(default),
        Some(value) => {
            let n = interp.to_number(value)?;
            Ok(if n.is_nan() { 0.0 } else { n.trunc() })
        }
    }
}

/// Resolve a possibly negative relative index against a length
pub(crate) fn relative_index(n: f64, len: usize) -> usize {
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn callback_arg(interp: &Interpreter, args: &[Value]) -> Flow<Value> {
    let callback = arg(args, 0);
    if callback.is_callable() {
        Ok(callback)
    } else {
        Err(interp.type_error(messages::not_a_function(&inspect(&callback))))
    }
}

// ========== Array ==========

fn this_array(interp: &Interpreter, this: &Value) -> Flow<ObjectRef> {
    match this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Array(_)) => Ok(obj.clone()),
        _ => Err(interp.type_error("Array.prototype method called on incompatible receiver")),
    }
}

fn snapshot(obj: &ObjectRef) -> Vec<Value> {
    match &obj.borrow().kind {
        ObjectKind::Array(elements) => elements.clone(),
        _ => Vec::new(),
    }
}

fn length(obj: &ObjectRef) -> usize {
    match &obj.borrow().kind {
        ObjectKind::Array(elements) => elements.len(),
        _ => 0,
    }
}

fn element(obj: &ObjectRef, index: usize) -> Value {
    match &obj.borrow().kind {
        ObjectKind::Array(elements) => elements.get(index).cloned().unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    }
}

fn elements_mut<'a>(interp: &Interpreter, obj: &'a ObjectRef) -> Flow<RefMut<'a, Vec<Value>>> {
    if obj.borrow().frozen {
        return Err(interp.type_error("Cannot modify a frozen array"));
    }
    RefMut::filter_map(obj.borrow_mut(), |o| match &mut o.kind {
        ObjectKind::Array(elements) => Some(elements),
        _ => None,
    })
    .map_err(|_| interp.type_error("Array.prototype method called on incompatible receiver"))
}

fn check_length(interp: &Interpreter, len: usize) -> Flow<()> {
    if len > MAX_ARRAY_LENGTH {
        Err(interp.range_error(messages::INVALID_ARRAY_LENGTH))
    } else {
        Ok(())
    }
}

fn array_push(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let mut elements = elements_mut(interp, &obj)?;
    check_length(interp, elements.len() + args.len())?;
    elements.extend_from_slice(args);
    Ok(Value::Number(elements.len() as f64))
}

fn array_pop(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let mut elements = elements_mut(interp, &obj)?;
    Ok(elements.pop().unwrap_or(Value::Undefined))
}

fn array_shift(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let mut elements = elements_mut(interp, &obj)?;
    if elements.is_empty() {
        Ok(Value::Undefined)
    } else {
        Ok(elements.remove(0))
    }
}

fn array_unshift(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let mut elements = elements_mut(interp, &obj)?;
    check_length(interp, elements.len() + args.len())?;
    elements.splice(0..0, args.iter().cloned());
    Ok(Value::Number(elements.len() as f64))
}

fn array_slice(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let len = length(&obj);
    let start = relative_index(integer_arg(interp, args, 0, 0.0)?, len);
    let end = relative_index(integer_arg(interp, args, 1, len as f64)?, len);
    let items = snapshot(&obj);
    Ok(Value::new_array(
        items.get(start..end.max(start)).unwrap_or(&[]).to_vec(),
    ))
}

fn array_splice(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let len = length(&obj);
    let start = relative_index(integer_arg(interp, args, 0, 0.0)?, len);
    let delete_count = match args.len() {
        0 => 0,
        1 => len - start,
        _ => (integer_arg(interp, args, 1, 0.0)?.max(0.0) as usize).min(len - start),
    };
    let inserted = args.get(2..).unwrap_or(&[]);
    let mut elements = elements_mut(interp, &obj)?;
    check_length(interp, elements.len() + inserted.len())?;
    let removed: Vec<Value> = elements
        .splice(start..start + delete_count, inserted.iter().cloned())
        .collect();
    Ok(Value::new_array(removed))
}

fn array_concat(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let mut result = snapshot(&obj);
    for value in args {
        match value.array_elements() {
            Some(items) => result.extend(items),
            None => result.push(value.clone()),
        }
    }
    check_length(interp, result.len())?;
    Ok(Value::new_array(result))
}

fn join_elements(interp: &mut Interpreter, items: &[Value], separator: &str) -> Flow<String> {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        match item {
            Value::Undefined | Value::Null => {}
            Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Array(_)) => {
                out.push_str(&item.to_js_string())
            }
            other => out.push_str(&interp.to_string(other)?),
        }
        if out.len() > MAX_STRING_LENGTH {
            return Err(interp.range_error(messages::INVALID_STRING_LENGTH));
        }
    }
    Ok(out)
}

fn array_join(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let separator = match args.first() {
        None | Some(Value::Undefined) => ",".to_string(),
        Some(sep) => interp.to_string(sep)?,
    };
    let items = snapshot(&obj);
    Ok(Value::String(join_elements(interp, &items, &separator)?))
}

fn array_to_string(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    array_join(interp, this, &[])
}

fn array_reverse(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    elements_mut(interp, &obj)?.reverse();
    Ok(this.clone())
}

fn array_to_reversed(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let mut items = snapshot(&obj);
    items.reverse();
    Ok(Value::new_array(items))
}

fn array_index_of(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let items = snapshot(&obj);
    let target = arg(args, 0);
    let from = relative_index(integer_arg(interp, args, 1, 0.0)?, items.len());
    let found = items
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, v)| v.strict_equals(&target))
        .map(|(i, _)| i as f64);
    Ok(Value::Number(found.unwrap_or(-1.0)))
}

fn array_last_index_of(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let items = snapshot(&obj);
    let target = arg(args, 0);
    let from = integer_arg(interp, args, 1, items.len() as f64 - 1.0)?;
    let from = if from < 0.0 { items.len() as f64 + from } else { from };
    if from < 0.0 {
        return Ok(Value::Number(-1.0));
    }
    let end = (from as usize).min(items.len().saturating_sub(1));
    let found = (0..=end)
        .rev()
        .find(|&i| items.get(i).is_some_and(|v| v.strict_equals(&target)));
    Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
}

fn array_includes(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let items = snapshot(&obj);
    let target = arg(args, 0);
    let from = relative_index(integer_arg(interp, args, 1, 0.0)?, items.len());
    Ok(Value::Boolean(
        items.iter().skip(from).any(|v| v.same_value_zero(&target)),
    ))
}

/// Invoke `callback(item, index, array)` for one element
fn visit(
    interp: &mut Interpreter,
    callback: &Value,
    this_arg: &Value,
    obj: &ObjectRef,
    array: &Value,
    index: usize,
) -> Flow<(Value, Value)> {
    let item = element(obj, index);
    let result = interp.call(
        callback,
        this_arg.clone(),
        &[item.clone(), Value::Number(index as f64), array.clone()],
    )?;
    Ok((item, result))
}

fn find_impl(
    interp: &mut Interpreter,
    this: &Value,
    args: &[Value],
    from_end: bool,
) -> Flow<Option<(usize, Value)>> {
    let obj = this_array(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let this_arg = arg(args, 1);
    let len = length(&obj);
    let indices: Box<dyn Iterator<Item = usize>> = if from_end {
        Box::new((0..len).rev())
    } else {
        Box::new(0..len)
    };
    for i in indices {
        let (item, result) = visit(interp, &callback, &this_arg, &obj, this, i)?;
        if result.to_boolean() {
            return Ok(Some((i, item)));
        }
    }
    Ok(None)
}

fn array_find(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(find_impl(interp, this, args, false)?
        .map(|(_, v)| v)
        .unwrap_or(Value::Undefined))
}

fn array_find_index(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Number(
        find_impl(interp, this, args, false)?
            .map(|(i, _)| i as f64)
            .unwrap_or(-1.0),
    ))
}

fn array_find_last(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(find_impl(interp, this, args, true)?
        .map(|(_, v)| v)
        .unwrap_or(Value::Undefined))
}

fn array_find_last_index(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Number(
        find_impl(interp, this, args, true)?
            .map(|(i, _)| i as f64)
            .unwrap_or(-1.0),
    ))
}

fn array_filter(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let this_arg = arg(args, 1);
    let mut result = Vec::new();
    for i in 0..length(&obj) {
        let (item, keep) = visit(interp, &callback, &this_arg, &obj, this, i)?;
        if keep.to_boolean() {
            result.push(item);
        }
    }
    Ok(Value::new_array(result))
}

fn array_map(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let this_arg = arg(args, 1);
    let len = length(&obj);
    let mut result = Vec::with_capacity(len);
    for i in 0..len {
        let (_, mapped) = visit(interp, &callback, &this_arg, &obj, this, i)?;
        result.push(mapped);
    }
    Ok(Value::new_array(result))
}

fn array_for_each(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let this_arg = arg(args, 1);
    for i in 0..length(&obj) {
        visit(interp, &callback, &this_arg, &obj, this, i)?;
    }
    Ok(Value::Undefined)
}

fn array_some(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(find_impl(interp, this, args, false)?.is_some()))
}

fn array_every(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let this_arg = arg(args, 1);
    for i in 0..length(&obj) {
        let (_, result) = visit(interp, &callback, &this_arg, &obj, this, i)?;
        if !result.to_boolean() {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

fn reduce_impl(interp: &mut Interpreter, this: &Value, args: &[Value], from_end: bool) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let len = length(&obj);
    let mut indices: Vec<usize> = (0..len).collect();
    if from_end {
        indices.reverse();
    }
    let mut indices = indices.into_iter();

    let mut accumulator = if args.len() >= 2 {
        args[1].clone()
    } else {
        match indices.next() {
            Some(i) => element(&obj, i),
            None => return Err(interp.type_error("Reduce of empty array with no initial value")),
        }
    };
    for i in indices {
        let item = element(&obj, i);
        accumulator = interp.call(
            &callback,
            Value::Undefined,
            &[accumulator, item, Value::Number(i as f64), this.clone()],
        )?;
    }
    Ok(accumulator)
}

fn array_reduce(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    reduce_impl(interp, this, args, false)
}

fn array_reduce_right(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    reduce_impl(interp, this, args, true)
}

fn comparator_arg(interp: &Interpreter, args: &[Value]) -> Flow<Value> {
    let comparator = arg(args, 0);
    if comparator.is_undefined() || comparator.is_callable() {
        Ok(comparator)
    } else {
        Err(interp.type_error(
            "The comparison function must be either a function or undefined",
        ))
    }
}

fn array_sort(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let comparator = comparator_arg(interp, args)?;
    let sorted = sort_values(interp, snapshot(&obj), &comparator)?;
    *elements_mut(interp, &obj)? = sorted;
    Ok(this.clone())
}

fn array_to_sorted(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let comparator = comparator_arg(interp, args)?;
    Ok(Value::new_array(sort_values(interp, snapshot(&obj), &comparator)?))
}

/// Stable sort; `undefined` elements always go last
pub(crate) fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    comparator: &Value,
) -> Flow<Vec<Value>> {
    let (defined, undefined): (Vec<Value>, Vec<Value>) =
        items.into_iter().partition(|v| !v.is_undefined());
    let mut sorted = merge_sort(interp, defined, comparator)?;
    sorted.extend(undefined);
    Ok(sorted)
}

fn merge_sort(interp: &mut Interpreter, mut items: Vec<Value>, comparator: &Value) -> Flow<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(interp, items, comparator)?;
    let right = merge_sort(interp, right, comparator)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        if sort_compare(interp, r, l, comparator)? == Ordering::Less {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn sort_compare(interp: &mut Interpreter, a: &Value, b: &Value, comparator: &Value) -> Flow<Ordering> {
    if comparator.is_undefined() {
        let a = interp.to_string(a)?;
        let b = interp.to_string(b)?;
        return Ok(a.cmp(&b));
    }
    let result = interp.call(comparator, Value::Undefined, &[a.clone(), b.clone()])?;
    let n = interp.to_number(&result)?;
    Ok(if n < 0.0 {
        Ordering::Less
    } else if n > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    })
}

fn flatten_into(out: &mut Vec<Value>, items: Vec<Value>, depth: f64) {
    for item in items {
        match item.array_elements() {
            Some(inner) if depth >= 1.0 => flatten_into(out, inner, depth - 1.0),
            _ => out.push(item),
        }
    }
}

fn array_flat(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let depth = integer_arg(interp, args, 0, 1.0)?.min(512.0);
    let mut out = Vec::new();
    flatten_into(&mut out, snapshot(&obj), depth);
    Ok(Value::new_array(out))
}

fn array_flat_map(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let mapped = array_map(interp, this, args)?;
    let mut out = Vec::new();
    flatten_into(&mut out, mapped.array_elements().unwrap_or_default(), 1.0);
    Ok(Value::new_array(out))
}

fn array_fill(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let len = length(&obj);
    let value = arg(args, 0);
    let start = relative_index(integer_arg(interp, args, 1, 0.0)?, len);
    let end = relative_index(integer_arg(interp, args, 2, len as f64)?, len);
    let mut elements = elements_mut(interp, &obj)?;
    for slot in elements.iter_mut().take(end).skip(start) {
        *slot = value.clone();
    }
    Ok(this.clone())
}

fn array_keys(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    Ok(Value::new_array(
        (0..length(&obj)).map(|i| Value::Number(i as f64)).collect(),
    ))
}

fn array_values(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    Ok(Value::new_array(snapshot(&obj)))
}

fn array_entries(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    Ok(Value::new_array(
        snapshot(&obj)
            .into_iter()
            .enumerate()
            .map(|(i, v)| Value::new_array(vec![Value::Number(i as f64), v]))
            .collect(),
    ))
}

fn array_at(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_array(interp, this)?;
    let len = length(&obj) as f64;
    let n = integer_arg(interp, args, 0, 0.0)?;
    let index = if n < 0.0 { len + n } else { n };
    if index < 0.0 || index >= len {
        return Ok(Value::Undefined);
    }
    Ok(element(&obj, index as usize))
}

// ========== String ==========

fn this_string(interp: &mut Interpreter, this: &Value) -> Flow<String> {
    match this {
        Value::String(s) => Ok(s.clone()),
        Value::Undefined | Value::Null => Err(interp.type_error(format!(
            "String.prototype method called on {}",
            this.to_js_string()
        ))),
        other => interp.to_string(other),
    }
}

fn string_arg(interp: &mut Interpreter, args: &[Value], index: usize) -> Flow<String> {
    let value = arg(args, index);
    interp.to_string(&value)
}

fn check_string_length(interp: &Interpreter, len: usize) -> Flow<()> {
    if len > MAX_STRING_LENGTH {
        Err(interp.range_error(messages::INVALID_STRING_LENGTH))
    } else {
        Ok(())
    }
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

fn string_value_of(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::String(this_string(interp, this)?))
}

fn string_char_at(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let index = integer_arg(interp, args, 0, 0.0)?;
    if index < 0.0 {
        return Ok(Value::from(""));
    }
    let index = index as usize;
    Ok(Value::String(utf16_slice(&s, index, index.saturating_add(1))))
}

fn string_char_code_at(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let index = integer_arg(interp, args, 0, 0.0)?;
    if index < 0.0 {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(
        s.encode_utf16()
            .nth(index as usize)
            .map(f64::from)
            .unwrap_or(f64::NAN),
    ))
}

fn string_code_point_at(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let index = integer_arg(interp, args, 0, 0.0)?;
    if index < 0.0 {
        return Ok(Value::Undefined);
    }
    // A high surrogate followed by a low one decodes to the full code point
    let units: Vec<u16> = s.encode_utf16().skip(index as usize).take(2).collect();
    Ok(char::decode_utf16(units)
        .next()
        .map(|unit| {
            let code = unit.map(u32::from).unwrap_or_else(|e| u32::from(e.unpaired_surrogate()));
            Value::Number(f64::from(code))
        })
        .unwrap_or(Value::Undefined))
}

fn string_at(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let len = utf16_len(&s) as f64;
    let n = integer_arg(interp, args, 0, 0.0)?;
    let index = if n < 0.0 { len + n } else { n };
    if index < 0.0 || index >= len {
        return Ok(Value::Undefined);
    }
    let index = index as usize;
    Ok(Value::String(utf16_slice(&s, index, index + 1)))
}

fn string_index_of(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let search = string_arg(interp, args, 0)?;
    let from = relative_index(integer_arg(interp, args, 1, 0.0)?.max(0.0), utf16_len(&s));
    let start = utf16_to_byte(&s, from);
    Ok(Value::Number(
        s[start..]
            .find(&search)
            .map(|b| byte_to_utf16(&s, start + b) as f64)
            .unwrap_or(-1.0),
    ))
}

fn string_last_index_of(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let search = string_arg(interp, args, 0)?;
    let len = utf16_len(&s);
    let from = match args.get(1) {
        None | Some(Value::Undefined) => len,
        Some(v) => {
            let n = interp.to_number(v)?;
            if n.is_nan() {
                len
            } else {
                relative_index(n.trunc().max(0.0), len)
            }
        }
    };
    // A match may start at `from` and extend past it
    let limit = (utf16_to_byte(&s, from) + search.len()).min(s.len());
    let limit = (0..=limit).rev().find(|&b| s.is_char_boundary(b)).unwrap_or(0);
    Ok(Value::Number(
        s[..limit]
            .rfind(&search)
            .map(|b| byte_to_utf16(&s, b) as f64)
            .unwrap_or(-1.0),
    ))
}

fn string_includes(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    if is_regexp(&arg(args, 0)) {
        return Err(interp.type_error(
            "First argument to String.prototype.includes must not be a regular expression",
        ));
    }
    Ok(Value::Boolean(
        string_index_of(interp, this, args)?.to_number() >= 0.0,
    ))
}

fn string_starts_with(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let search = string_arg(interp, args, 0)?;
    let position = relative_index(integer_arg(interp, args, 1, 0.0)?.max(0.0), utf16_len(&s));
    Ok(Value::Boolean(s[utf16_to_byte(&s, position)..].starts_with(&search)))
}

fn string_ends_with(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let search = string_arg(interp, args, 0)?;
    let len = utf16_len(&s);
    let end = relative_index(integer_arg(interp, args, 1, len as f64)?.max(0.0), len);
    Ok(Value::Boolean(s[..utf16_to_byte(&s, end)].ends_with(&search)))
}

fn string_slice(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let len = utf16_len(&s);
    let start = relative_index(integer_arg(interp, args, 0, 0.0)?, len);
    let end = relative_index(integer_arg(interp, args, 1, len as f64)?, len);
    Ok(Value::String(utf16_slice(&s, start, end)))
}

fn string_substring(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let len = utf16_len(&s);
    let a = integer_arg(interp, args, 0, 0.0)?.clamp(0.0, len as f64) as usize;
    let b = integer_arg(interp, args, 1, len as f64)?.clamp(0.0, len as f64) as usize;
    Ok(Value::String(utf16_slice(&s, a.min(b), a.max(b))))
}

fn string_substr(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let len = utf16_len(&s);
    let start = relative_index(integer_arg(interp, args, 0, 0.0)?, len);
    let count = integer_arg(interp, args, 1, len as f64)?.max(0.0);
    let end = (start as f64 + count).min(len as f64) as usize;
    Ok(Value::String(utf16_slice(&s, start, end)))
}

fn string_to_upper_case(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::String(this_string(interp, this)?.to_uppercase()))
}

fn string_to_lower_case(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::String(this_string(interp, this)?.to_lowercase()))
}

fn string_trim(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::from(this_string(interp, this)?.trim_matches(is_js_whitespace)))
}

fn string_trim_start(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::from(
        this_string(interp, this)?.trim_start_matches(is_js_whitespace),
    ))
}

fn string_trim_end(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::from(
        this_string(interp, this)?.trim_end_matches(is_js_whitespace),
    ))
}

fn pad(interp: &mut Interpreter, this: &Value, args: &[Value], at_start: bool) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let target = integer_arg(interp, args, 0, 0.0)?;
    let filler = match args.get(1) {
        None | Some(Value::Undefined) => " ".to_string(),
        Some(v) => interp.to_string(v)?,
    };
    let len = utf16_len(&s);
    if target <= len as f64 || filler.is_empty() {
        return Ok(Value::String(s));
    }
    check_string_length(interp, target as usize)?;
    let units: Vec<u16> = filler.encode_utf16().cycle().take(target as usize - len).collect();
    let padding = String::from_utf16_lossy(&units);
    Ok(Value::String(if at_start {
        padding + &s
    } else {
        s + &padding
    }))
}

fn string_pad_start(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    pad(interp, this, args, true)
}

fn string_pad_end(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    pad(interp, this, args, false)
}

fn string_repeat(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let count = integer_arg(interp, args, 0, 0.0)?;
    if count < 0.0 || count.is_infinite() {
        return Err(interp.range_error(format!("Invalid count value: {}", number_to_string(count))));
    }
    check_string_length(interp, s.len().saturating_mul(count as usize))?;
    Ok(Value::String(s.repeat(count as usize)))
}

fn string_concat(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let mut s = this_string(interp, this)?;
    for value in args {
        s.push_str(&interp.to_string(value)?);
        check_string_length(interp, s.len())?;
    }
    Ok(Value::String(s))
}

fn string_locale_compare(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let a = this_string(interp, this)?;
    let b = string_arg(interp, args, 0)?;
    // Case-insensitive first; on a tie lowercase sorts before uppercase
    let ordering = a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| {
        a.chars()
            .zip(b.chars())
            .find(|(x, y)| x != y)
            .map(|(x, _)| {
                if x.is_lowercase() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            })
            .unwrap_or(Ordering::Equal)
    });
    Ok(Value::Number(match ordering {
        Ordering::Less => -1.0,
        Ordering::Equal => 0.0,
        Ordering::Greater => 1.0,
    }))
}

fn string_split(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let limit = match args.get(1) {
        None | Some(Value::Undefined) => usize::MAX,
        Some(v) => to_uint32(interp.to_number(v)?) as usize,
    };
    let separator = arg(args, 0);

    let parts: Vec<String> = if separator.is_undefined() {
        vec![s.clone()]
    } else if let Some(regex) = regexp_of(&separator) {
        split_regex(&regex, &s)
    } else {
        let sep = interp.to_string(&separator)?;
        if sep.is_empty() {
            s.chars().map(String::from).collect()
        } else {
            s.split(sep.as_str()).map(String::from).collect()
        }
    };
    Ok(Value::new_array(
        parts.into_iter().take(limit).map(Value::String).collect(),
    ))
}

fn split_regex(regex: &regex::Regex, s: &str) -> Vec<String> {
    if s.is_empty() {
        return if regex.is_match(s) {
            Vec::new()
        } else {
            vec![String::new()]
        };
    }
    let mut parts = Vec::new();
    let mut last = 0;
    for caps in regex.captures_iter(s) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() == m.end() && (m.start() == 0 || m.start() >= s.len()) {
            continue;
        }
        parts.push(s[last..m.start()].to_string());
        for group in caps.iter().skip(1) {
            parts.push(group.map(|g| g.as_str().to_string()).unwrap_or_default());
        }
        last = m.end();
    }
    parts.push(s[last..].to_string());
    parts
}

fn string_replace(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    replace_impl(interp, this, args, false)
}

fn string_replace_all(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    replace_impl(interp, this, args, true)
}

fn replace_impl(interp: &mut Interpreter, this: &Value, args: &[Value], all: bool) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let pattern = arg(args, 0);
    let replacement = arg(args, 1);

    let matches: Vec<MatchInfo> = if let Some(obj) = pattern.as_object().filter(|_| is_regexp(&pattern)) {
        let (regex, global) = match &obj.borrow().kind {
            ObjectKind::RegExp(re) => (re.regex.clone(), re.global()),
            _ => return Ok(Value::String(s)),
        };
        if all && !global {
            return Err(interp.type_error("replaceAll must be called with a global RegExp"));
        }
        if global {
            set_last_index(obj, 0);
            regex.captures_iter(&s).map(|c| MatchInfo::new(&regex, &c)).collect()
        } else {
            regex.captures(&s).map(|c| MatchInfo::new(&regex, &c)).into_iter().collect()
        }
    } else {
        let needle = interp.to_string(&pattern)?;
        let positions: Vec<usize> = if all {
            if needle.is_empty() {
                s.char_indices().map(|(b, _)| b).chain(std::iter::once(s.len())).collect()
            } else {
                s.match_indices(needle.as_str()).map(|(b, _)| b).collect()
            }
        } else {
            s.find(needle.as_str()).into_iter().collect()
        };
        positions
            .into_iter()
            .map(|start| MatchInfo::plain(start, start + needle.len()))
            .collect()
    };

    let mut out = String::new();
    let mut last = 0;
    for m in &matches {
        out.push_str(&s[last..m.start]);
        let text = if replacement.is_callable() {
            let mut call_args = vec![Value::from(&s[m.start..m.end])];
            call_args.extend(m.groups.iter().map(group_value));
            call_args.push(Value::Number(byte_to_utf16(&s, m.start) as f64));
            call_args.push(Value::String(s.clone()));
            if !m.named.is_empty() {
                call_args.push(m.groups_object());
            }
            let result = interp.call(&replacement, Value::Undefined, &call_args)?;
            interp.to_string(&result)?
        } else {
            let template = interp.to_string(&replacement)?;
            expand_replacement(&template, &s, m)
        };
        out.push_str(&text);
        check_string_length(interp, out.len())?;
        last = m.end;
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

/// Expand `$$`, `$&`, `` $` ``, `$'`, `$n` and `$<name>` in a replacement
fn expand_replacement(template: &str, input: &str, m: &MatchInfo) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                out.push_str(&input[m.start..m.end]);
            }
            Some('`') => {
                chars.next();
                out.push_str(&input[..m.start]);
            }
            Some('\'') => {
                chars.next();
                out.push_str(&input[m.end..]);
            }
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                let first = d.to_digit(10).unwrap_or(0) as usize;
                let two = chars
                    .peek()
                    .and_then(|n| n.to_digit(10))
                    .map(|n| first * 10 + n as usize);
                match two {
                    Some(n) if n >= 1 && n <= m.groups.len() => {
                        chars.next();
                        out.push_str(m.groups[n - 1].as_deref().unwrap_or(""));
                    }
                    _ if first >= 1 && first <= m.groups.len() => {
                        out.push_str(m.groups[first - 1].as_deref().unwrap_or(""));
                    }
                    _ => {
                        out.push('$');
                        out.push(d);
                    }
                }
            }
            Some('<') if !m.named.is_empty() => {
                chars.next();
                let name: String = chars.by_ref().take_while(|&c| c != '>').collect();
                if let Some((_, value)) = m.named.iter().find(|(n, _)| *n == name) {
                    out.push_str(value.as_deref().unwrap_or(""));
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

fn string_match(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let re = to_regexp(interp, &arg(args, 0), "")?;
    let Some(obj) = re.as_object().cloned() else {
        return Ok(Value::Null);
    };
    let (regex, global) = match &obj.borrow().kind {
        ObjectKind::RegExp(data) => (data.regex.clone(), data.global()),
        _ => return Ok(Value::Null),
    };
    if !global {
        return exec_at(interp, &obj, &s);
    }
    set_last_index(&obj, 0);
    let found: Vec<Value> = regex.find_iter(&s).map(|m| Value::from(m.as_str())).collect();
    Ok(if found.is_empty() {
        Value::Null
    } else {
        Value::new_array(found)
    })
}

fn string_match_all(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let pattern = arg(args, 0);
    if is_regexp(&pattern) && !regexp_flags(&pattern).contains('g') {
        return Err(interp.type_error("String.prototype.matchAll called with a non-global RegExp argument"));
    }
    let re = to_regexp(interp, &pattern, "g")?;
    let regex = regexp_of(&re).ok_or_else(|| interp.type_error("Invalid regular expression"))?;
    let results = regex
        .captures_iter(&s)
        .map(|caps| MatchInfo::new(&regex, &caps).to_array(&s))
        .collect();
    Ok(Value::new_array(results))
}

fn string_search(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let s = this_string(interp, this)?;
    let re = to_regexp(interp, &arg(args, 0), "")?;
    let regex = regexp_of(&re).ok_or_else(|| interp.type_error("Invalid regular expression"))?;
    Ok(Value::Number(
        regex
            .find(&s)
            .map(|m| byte_to_utf16(&s, m.start()) as f64)
            .unwrap_or(-1.0),
    ))
}

// ========== RegExp ==========

/// One match with byte offsets into the input
struct MatchInfo {
    start: usize,
    end: usize,
    groups: Vec<Option<String>>,
    named: Vec<(String, Option<String>)>,
}

impl MatchInfo {
    fn new(regex: &regex::Regex, caps: &regex::Captures<'_>) -> Self {
        let (start, end) = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let groups = caps
            .iter()
            .skip(1)
            .map(|g| g.map(|g| g.as_str().to_string()))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .map(|name| (name.to_string(), caps.name(name).map(|g| g.as_str().to_string())))
            .collect();
        Self {
            start,
            end,
            groups,
            named,
        }
    }

    fn plain(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            groups: Vec::new(),
            named: Vec::new(),
        }
    }

    fn groups_object(&self) -> Value {
        let mut object = Object::new(ObjectKind::Ordinary);
        for (name, value) in &self.named {
            object
                .properties
                .insert(name.clone(), value.clone().map(Value::String).unwrap_or(Value::Undefined));
        }
        Value::from_object(object)
    }

    /// The array returned by `exec`: match, groups, plus `index`/`input`/`groups`
    fn to_array(&self, input: &str) -> Value {
        let mut items = vec![Value::from(&input[self.start..self.end])];
        items.extend(self.groups.iter().map(group_value));
        let mut array = Object::new(ObjectKind::Array(items));
        array.properties.insert(
            "index".to_string(),
            Value::Number(byte_to_utf16(input, self.start) as f64),
        );
        array
            .properties
            .insert("input".to_string(), Value::from(input));
        array.properties.insert(
            "groups".to_string(),
            if self.named.is_empty() {
                Value::Undefined
            } else {
                self.groups_object()
            },
        );
        Value::from_object(array)
    }
}

fn group_value(group: &Option<String>) -> Value {
    group.clone().map(Value::String).unwrap_or(Value::Undefined)
}

fn is_regexp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| matches!(o.borrow().kind, ObjectKind::RegExp(_)))
}

fn regexp_of(value: &Value) -> Option<regex::Regex> {
    value.as_object().and_then(|o| match &o.borrow().kind {
        ObjectKind::RegExp(re) => Some(re.regex.clone()),
        _ => None,
    })
}

fn regexp_flags(value: &Value) -> String {
    value
        .as_object()
        .and_then(|o| match &o.borrow().kind {
            ObjectKind::RegExp(re) => Some(re.flags.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn set_last_index(obj: &ObjectRef, index: usize) {
    if let ObjectKind::RegExp(re) = &mut obj.borrow_mut().kind {
        re.last_index = index;
    }
}

/// Use a RegExp argument as is, or compile anything else as a pattern
fn to_regexp(interp: &mut Interpreter, value: &Value, flags: &str) -> Flow<Value> {
    if is_regexp(value) {
        return Ok(value.clone());
    }
    let source = match value {
        Value::Undefined => "(?:)".to_string(),
        other => interp.to_string(other)?,
    };
    interp.make_regexp(&source, flags)
}

/// `RegExp.prototype.exec` honouring `lastIndex` for global and sticky patterns
fn exec_at(interp: &mut Interpreter, obj: &ObjectRef, input: &str) -> Flow<Value> {
    let (regex, tracks, sticky, last_index) = match &obj.borrow().kind {
        ObjectKind::RegExp(re) => (
            re.regex.clone(),
            re.global() || re.sticky(),
            re.sticky(),
            re.last_index,
        ),
        _ => return Err(interp.type_error("RegExp.prototype.exec called on incompatible receiver")),
    };

    let start_char = if tracks { last_index } else { 0 };
    let found = if start_char > utf16_len(input) {
        None
    } else {
        let start = utf16_to_byte(input, start_char);
        regex
            .captures_at(input, start)
            .filter(|caps| !sticky || caps.get(0).map(|m| m.start()) == Some(start))
            .map(|caps| MatchInfo::new(&regex, &caps))
    };

    match found {
        Some(m) => {
            if tracks {
                set_last_index(obj, byte_to_utf16(input, m.end));
            }
            Ok(m.to_array(input))
        }
        None => {
            if tracks {
                set_last_index(obj, 0);
            }
            Ok(Value::Null)
        }
    }
}

fn this_regexp(interp: &Interpreter, this: &Value) -> Flow<ObjectRef> {
    match this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::RegExp(_)) => Ok(obj.clone()),
        _ => Err(interp.type_error("RegExp.prototype method called on incompatible receiver")),
    }
}

fn regexp_exec(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_regexp(interp, this)?;
    let input = string_arg(interp, args, 0)?;
    exec_at(interp, &obj, &input)
}

fn regexp_test(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(!matches!(
        regexp_exec(interp, this, args)?,
        Value::Null
    )))
}

fn regexp_to_string(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_regexp(interp, this)?;
    let text = match &obj.borrow().kind {
        ObjectKind::RegExp(re) => format!("/{}/{}", re.source, re.flags),
        _ => String::new(),
    };
    Ok(Value::String(text))
}

// ========== Number ==========

fn this_number(interp: &Interpreter, this: &Value) -> Flow<f64> {
    match this {
        Value::Number(n) => Ok(*n),
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Prototype(Intrinsic::Number)) => {
            Ok(0.0)
        }
        _ => Err(interp.type_error("Number.prototype method called on incompatible receiver")),
    }
}

fn number_value_of(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::Number(this_number(interp, this)?))
}

fn number_to_fixed(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let n = this_number(interp, this)?;
    let digits = integer_arg(interp, args, 0, 0.0)?;
    if !(0.0..=100.0).contains(&digits) {
        return Err(interp.range_error("toFixed() digits argument must be between 0 and 100"));
    }
    Ok(Value::String(to_fixed(n, digits as usize)))
}

/// `Number.prototype.toFixed`, rounding half up on the exact binary value
pub(crate) fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return number_to_string(n);
    }
    // Every finite double has a terminating decimal expansion within this many digits
    let exact = format!("{:.1100}", n.abs());
    let (int, frac) = exact.split_once('.').unwrap_or((&exact, ""));
    let mut kept: Vec<u8> = int.bytes().chain(frac.bytes().take(digits)).collect();
    if frac.as_bytes().get(digits).is_some_and(|&d| d >= b'5') {
        let mut i = kept.len();
        loop {
            if i == 0 {
                kept.insert(0, b'1');
                break;
            }
            i -= 1;
            if kept[i] == b'9' {
                kept[i] = b'0';
            } else {
                kept[i] += 1;
                break;
            }
        }
    }

    let int_len = kept.len() - digits;
    let mut text = String::from_utf8_lossy(&kept[..int_len]).into_owned();
    if digits > 0 {
        text.push('.');
        text.push_str(&String::from_utf8_lossy(&kept[int_len..]));
    }
    if n < 0.0 {
        format!("-{}", text)
    } else {
        text
    }
}

fn number_to_string_method(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let n = this_number(interp, this)?;
    let radix = integer_arg(interp, args, 0, 10.0)?;
    if !(2.0..=36.0).contains(&radix) {
        return Err(interp.range_error("toString() radix must be between 2 and 36"));
    }
    Ok(Value::String(if radix == 10.0 {
        number_to_string(n)
    } else {
        to_radix_string(n, radix as u32)
    }))
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let digit = |d: u32| std::char::from_digit(d, radix).unwrap_or('0');
    let mut int = n.abs().trunc();
    let mut frac = n.abs() - int;

    let mut digits = Vec::new();
    if int == 0.0 {
        digits.push('0');
    }
    while int >= 1.0 {
        digits.push(digit((int % radix as f64) as u32));
        int = (int / radix as f64).trunc();
    }
    let mut out: String = if n < 0.0 { "-".to_string() } else { String::new() };
    out.extend(digits.iter().rev());

    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= radix as f64;
            let d = frac.trunc();
            out.push(digit(d as u32));
            frac -= d;
            if frac == 0.0 {
                break;
            }
        }
    }
    out
}

fn number_to_precision(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let n = this_number(interp, this)?;
    if args.first().map_or(true, |v| v.is_undefined()) {
        return Ok(Value::String(number_to_string(n)));
    }
    let precision = integer_arg(interp, args, 0, 1.0)?;
    if !(1.0..=100.0).contains(&precision) {
        return Err(interp.range_error("toPrecision() argument must be between 1 and 100"));
    }
    if !n.is_finite() {
        return Ok(Value::String(number_to_string(n)));
    }
    let p = precision as usize;
    if n == 0.0 {
        return Ok(Value::String(to_fixed(0.0, p - 1)));
    }
    let exponent = n.abs().log10().floor() as i32;
    let text = if exponent < -6 || exponent >= p as i32 {
        let formatted = format!("{:.*e}", p - 1, n);
        match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            Some((mantissa, exp)) => format!("{}e{}", mantissa, exp),
            None => formatted,
        }
    } else {
        to_fixed(n, (p as i32 - 1 - exponent).max(0) as usize)
    };
    Ok(Value::String(text))
}

fn number_to_locale_string(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let n = this_number(interp, this)?;
    Ok(Value::String(locale_string(n)))
}

/// en-US formatting: thousands separators, at most three fraction digits
pub(crate) fn locale_string(n: f64) -> String {
    if !n.is_finite() {
        return if n.is_nan() {
            "NaN".to_string()
        } else if n > 0.0 {
            "∞".to_string()
        } else {
            "-∞".to_string()
        };
    }
    let fixed = to_fixed(n.abs(), 3);
    let (int, frac) = fixed.split_once('.').unwrap_or((&fixed, ""));
    let frac = frac.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if n < 0.0 && (int != "0" || !frac.is_empty()) { "-" } else { "" };
    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}

// ========== Boolean ==========

fn this_boolean(interp: &Interpreter, this: &Value) -> Flow<bool> {
    match this {
        Value::Boolean(b) => Ok(*b),
        _ => Err(interp.type_error("Boolean.prototype method called on incompatible receiver")),
    }
}

fn boolean_to_string(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::String(this_boolean(interp, this)?.to_string()))
}

fn boolean_value_of(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::Boolean(this_boolean(interp, this)?))
}

// ========== Function ==========

fn this_callable(interp: &Interpreter, this: &Value) -> Flow<()> {
    if this.is_callable() {
        Ok(())
    } else {
        Err(interp.type_error("Function.prototype method called on incompatible receiver"))
    }
}

fn function_call(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    this_callable(interp, this)?;
    interp.call(this, arg(args, 0), args.get(1..).unwrap_or(&[]))
}

fn function_apply(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    this_callable(interp, this)?;
    let call_args = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        list => list.array_elements().ok_or_else(|| {
            interp.type_error("CreateListFromArrayLike called on non-object")
        })?,
    };
    interp.call(this, arg(args, 0), &call_args)
}

fn function_bind(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    this_callable(interp, this)?;
    Ok(Value::from_object(Object::new(ObjectKind::Bound(BoundFunction {
        target: this.clone(),
        this: arg(args, 0),
        args: args.get(1..).unwrap_or(&[]).to_vec(),
    }))))
}

fn function_to_string(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    this_callable(interp, this)?;
    Ok(Value::String(this.to_js_string()))
}

// ========== Error ==========

fn error_to_string(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let name = interp.get(this, "name")?;
    let message = interp.get(this, "message")?;
    let name = if name.is_undefined() {
        "Error".to_string()
    } else {
        interp.to_string(&name)?
    };
    let message = if message.is_undefined() {
        String::new()
    } else {
        interp.to_string(&message)?
    };
    Ok(Value::String(match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    }))
}

// ========== Map ==========

fn this_map(interp: &Interpreter, this: &Value) -> Flow<ObjectRef> {
    match this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Map(_)) => Ok(obj.clone()),
        _ => Err(interp.type_error("Map.prototype method called on incompatible receiver")),
    }
}

fn map_entries_of(obj: &ObjectRef) -> Vec<(Value, Value)> {
    match &obj.borrow().kind {
        ObjectKind::Map(entries) => entries.clone(),
        _ => Vec::new(),
    }
}

fn map_get(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    let key = arg(args, 0);
    let found = match &obj.borrow().kind {
        ObjectKind::Map(entries) => entries
            .iter()
            .find(|(k, _)| k.same_value_zero(&key))
            .map(|(_, v)| v.clone()),
        _ => None,
    };
    Ok(found.unwrap_or(Value::Undefined))
}

fn map_set(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    let key = arg(args, 0);
    let value = arg(args, 1);
    if let ObjectKind::Map(entries) = &mut obj.borrow_mut().kind {
        match entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }
    Ok(this.clone())
}

fn map_has(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    let key = arg(args, 0);
    let has = match &obj.borrow().kind {
        ObjectKind::Map(entries) => entries.iter().any(|(k, _)| k.same_value_zero(&key)),
        _ => false,
    };
    Ok(Value::Boolean(has))
}

fn map_delete(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    let key = arg(args, 0);
    let mut removed = false;
    if let ObjectKind::Map(entries) = &mut obj.borrow_mut().kind {
        if let Some(pos) = entries.iter().position(|(k, _)| k.same_value_zero(&key)) {
            entries.remove(pos);
            removed = true;
        }
    }
    Ok(Value::Boolean(removed))
}

fn map_clear(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    if let ObjectKind::Map(entries) = &mut obj.borrow_mut().kind {
        entries.clear();
    }
    Ok(Value::Undefined)
}

fn map_for_each(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let this_arg = arg(args, 1);
    for (key, value) in map_entries_of(&obj) {
        interp.call(&callback, this_arg.clone(), &[value, key, this.clone()])?;
    }
    Ok(Value::Undefined)
}

fn map_keys(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    Ok(Value::new_array(
        map_entries_of(&obj).into_iter().map(|(k, _)| k).collect(),
    ))
}

fn map_values(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    Ok(Value::new_array(
        map_entries_of(&obj).into_iter().map(|(_, v)| v).collect(),
    ))
}

fn map_entries(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_map(interp, this)?;
    Ok(Value::new_array(
        map_entries_of(&obj)
            .into_iter()
            .map(|(k, v)| Value::new_array(vec![k, v]))
            .collect(),
    ))
}

// ========== Set ==========

fn this_set(interp: &Interpreter, this: &Value) -> Flow<ObjectRef> {
    match this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Set(_)) => Ok(obj.clone()),
        _ => Err(interp.type_error("Set.prototype method called on incompatible receiver")),
    }
}

fn set_items_of(obj: &ObjectRef) -> Vec<Value> {
    match &obj.borrow().kind {
        ObjectKind::Set(items) => items.clone(),
        _ => Vec::new(),
    }
}

fn set_add(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_set(interp, this)?;
    let value = arg(args, 0);
    if let ObjectKind::Set(items) = &mut obj.borrow_mut().kind {
        if !items.iter().any(|v| v.same_value_zero(&value)) {
            items.push(value);
        }
    }
    Ok(this.clone())
}

fn set_has(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_set(interp, this)?;
    let value = arg(args, 0);
    Ok(Value::Boolean(
        set_items_of(&obj).iter().any(|v| v.same_value_zero(&value)),
    ))
}

fn set_delete(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_set(interp, this)?;
    let value = arg(args, 0);
    let mut removed = false;
    if let ObjectKind::Set(items) = &mut obj.borrow_mut().kind {
        if let Some(pos) = items.iter().position(|v| v.same_value_zero(&value)) {
            items.remove(pos);
            removed = true;
        }
    }
    Ok(Value::Boolean(removed))
}

fn set_clear(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_set(interp, this)?;
    if let ObjectKind::Set(items) = &mut obj.borrow_mut().kind {
        items.clear();
    }
    Ok(Value::Undefined)
}

fn set_for_each(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let obj = this_set(interp, this)?;
    let callback = callback_arg(interp, args)?;
    let this_arg = arg(args, 1);
    for value in set_items_of(&obj) {
        interp.call(&callback, this_arg.clone(), &[value.clone(), value, this.clone()])?;
    }
    Ok(Value::Undefined)
}

fn set_values(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_set(interp, this)?;
    Ok(Value::new_array(set_items_of(&obj)))
}

fn set_entries(interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    let obj = this_set(interp, this)?;
    Ok(Value::new_array(
        set_items_of(&obj)
            .into_iter()
            .map(|v| Value::new_array(vec![v.clone(), v]))
            .collect(),
    ))
}

// ========== Object ==========

fn object_has_own_property(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let key = interp.to_property_key(&arg(args, 0))?;
    Ok(Value::Boolean(match this {
        Value::Object(obj) => {
            let o = obj.borrow();
            o.has_own(&key) || (o.get_own(&key).is_some() && !matches!(o.kind, ObjectKind::Prototype(_)))
        }
        Value::String(s) => key == "length" || array_index(&key).is_some_and(|i| (i as usize) < utf16_len(s)),
        _ => false,
    }))
}

fn object_is_prototype_of(_interp: &mut Interpreter, this: &Value, args: &[Value]) -> Flow<Value> {
    let (Some(proto), Some(obj)) = (this.as_object(), args.first().and_then(|v| v.as_object())) else {
        return Ok(Value::Boolean(false));
    };
    let mut current = obj.borrow().prototype.clone();
    while let Some(p) = current {
        if std::rc::Rc::ptr_eq(&p, proto) {
            return Ok(Value::Boolean(true));
        }
        current = p.borrow().prototype.clone();
    }
    Ok(Value::Boolean(false))
}

fn object_to_string_method(_interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(Value::String(match this {
        Value::Undefined => "[object Undefined]".to_string(),
        Value::Null => "[object Null]".to_string(),
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Ordinary) => {
            "[object Object]".to_string()
        }
        other => other.to_js_string(),
    }))
}

fn object_value_of(_interp: &mut Interpreter, this: &Value, _args: &[Value]) -> Flow<Value> {
    Ok(this.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed_rounds_ties_up() {
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(1.45, 1), "1.4");
        assert_eq!(to_fixed(-1.5, 0), "-2");
        assert_eq!(to_fixed(0.1, 3), "0.100");
        assert_eq!(to_fixed(-0.0001, 2), "-0.00");
        assert_eq!(to_fixed(9.995, 2), "9.99");
        assert_eq!(to_fixed(99.5, 0), "100");
    }

    #[test]
    fn test_radix_strings() {
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(-5.0, 2), "-101");
        assert_eq!(to_radix_string(0.5, 2), "0.1");
    }

    #[test]
    fn test_locale_string_groups_thousands() {
        assert_eq!(locale_string(1234567.891), "1,234,567.891");
        assert_eq!(locale_string(1000.0), "1,000");
        assert_eq!(locale_string(-42.5), "-42.5");
        assert_eq!(locale_string(0.1234), "0.123");
    }

    #[test]
    fn test_relative_index() {
        assert_eq!(relative_index(-1.0, 5), 4);
        assert_eq!(relative_index(-10.0, 5), 0);
        assert_eq!(relative_index(10.0, 5), 5);
    }

    #[test]
    fn test_expand_replacement() {
        let m = MatchInfo {
            start: 4,
            end: 7,
            groups: vec![Some("b".to_string()), None],
            named: Vec::new(),
        };
        assert_eq!(expand_replacement("[$&|$1|$2|$$|$3]", "xyz abc", &m), "[abc|b||$|$3]");
        assert_eq!(expand_replacement("$`", "xyz abc", &m), "xyz ");
    }

    #[test]
    fn test_split_regex_keeps_captures() {
        let regex = regex::Regex::new(r"(-)").unwrap();
        assert_eq!(split_regex(&regex, "a-b"), vec!["a", "-", "b"]);
        let empty = regex::Regex::new("").unwrap();
        assert_eq!(split_regex(&empty, "abc"), vec!["a", "b", "c"]);
    }
}
