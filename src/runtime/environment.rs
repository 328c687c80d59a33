//! Lexical environments
//!
//! Scopes form a parent-linked chain. Function bodies (and the program body)
//! carry a [`FunctionScope`] holding `this` and the call arguments; arrow
//! functions and blocks don't, so lookups of `this` walk outward to the
//! nearest one.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap as HashMap;

use super::value::Value;

/// Shared handle to a scope
pub type EnvRef = Rc<RefCell<Environment>>;

/// A single binding; `value` is `None` while in the temporal dead zone
#[derive(Clone)]
struct Binding {
    value: Option<Value>,
    mutable: bool,
}

/// Per-call state visible to `this` and `arguments`
pub struct FunctionScope {
    pub this: Value,
    pub arguments: Vec<Value>,
}

pub struct Environment {
    bindings: HashMap<String, Binding>,
    parent: Option<EnvRef>,
    function: Option<FunctionScope>,
}

/// Outcome of resolving a name
pub enum Lookup {
    Found(Value),
    /// Declared with let/const but not initialized yet
    Uninitialized,
    Missing,
}

/// Why an assignment failed
#[derive(Debug, PartialEq, Eq)]
pub enum AssignError {
    Constant,
    Uninitialized,
    Missing,
}

impl Environment {
    fn with(parent: Option<EnvRef>, function: Option<FunctionScope>) -> EnvRef {
        Rc::new(RefCell::new(Self {
            bindings: HashMap::default(),
            parent,
            function,
        }))
    }

    /// The outermost scope holding the built-in globals
    pub fn new_global() -> EnvRef {
        Self::with(
            None,
            Some(FunctionScope {
                this: Value::Undefined,
                arguments: Vec::new(),
            }),
        )
    }

    /// Block scope
    pub fn new_child(parent: &EnvRef) -> EnvRef {
        Self::with(Some(parent.clone()), None)
    }

    /// Scope of a non-arrow function call
    pub fn new_function(parent: &EnvRef, this: Value, arguments: Vec<Value>) -> EnvRef {
        Self::with(Some(parent.clone()), Some(FunctionScope { this, arguments }))
    }

    /// Declare a binding in this scope, replacing any previous one
    pub fn declare(&mut self, name: &str, value: Option<Value>, mutable: bool) {
        self.bindings
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Initialize a let/const binding declared in this scope (or create it)
    pub fn initialize(&mut self, name: &str, value: Value, mutable: bool) {
        match self.bindings.get_mut(name) {
            Some(binding) => {
                binding.value = Some(value);
                binding.mutable = mutable;
            }
            None => self.declare(name, Some(value), mutable),
        }
    }

    /// Names bound directly in this scope
    pub fn names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    /// Value of a binding declared directly in this scope
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).and_then(|b| b.value.clone())
    }
}

/// Resolve `name` through the scope chain
pub fn lookup(env: &EnvRef, name: &str) -> Lookup {
    let mut current = env.clone();
    loop {
        let next = {
            let scope = current.borrow();
            if let Some(binding) = scope.bindings.get(name) {
                return match &binding.value {
                    Some(value) => Lookup::Found(value.clone()),
                    None => Lookup::Uninitialized,
                };
            }
            scope.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => return Lookup::Missing,
        }
    }
}

/// Assign to an existing binding somewhere in the chain
pub fn assign(env: &EnvRef, name: &str, value: Value) -> Result<(), AssignError> {
    let mut current = env.clone();
    loop {
        let next = {
            let mut scope = current.borrow_mut();
            if let Some(binding) = scope.bindings.get_mut(name) {
                if binding.value.is_none() {
                    return Err(AssignError::Uninitialized);
                }
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                binding.value = Some(value);
                return Ok(());
            }
            scope.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => return Err(AssignError::Missing),
        }
    }
}

/// Nearest scope that belongs to a function (the target of `var`)
pub fn function_scope(env: &EnvRef) -> EnvRef {
    let mut current = env.clone();
    loop {
        let next = {
            let scope = current.borrow();
            if scope.function.is_some() {
                None
            } else {
                scope.parent.clone()
            }
        };
        match next {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}

/// Outermost scope in the chain
pub fn global_scope(env: &EnvRef) -> EnvRef {
    let mut current = env.clone();
    loop {
        let next = current.borrow().parent.clone();
        match next {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}

/// `this` of the nearest non-arrow function
pub fn this_value(env: &EnvRef) -> Value {
    let scope = function_scope(env);
    let scope = scope.borrow();
    scope
        .function
        .as_ref()
        .map(|f| f.this.clone())
        .unwrap_or(Value::Undefined)
}

/// `arguments` of the nearest non-arrow function
pub fn arguments(env: &EnvRef) -> Vec<Value> {
    let scope = function_scope(env);
    let scope = scope.borrow();
    scope
        .function
        .as_ref()
        .map(|f| f.arguments.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let global = Environment::new_global();
        global.borrow_mut().declare("x", Some(Value::Number(1.0)), true);
        let child = Environment::new_child(&global);
        assert!(matches!(lookup(&child, "x"), Lookup::Found(Value::Number(n)) if n == 1.0));
        assert!(matches!(lookup(&child, "y"), Lookup::Missing));
    }

    #[test]
    fn test_tdz_and_const() {
        let env = Environment::new_global();
        env.borrow_mut().declare("a", None, true);
        assert!(matches!(lookup(&env, "a"), Lookup::Uninitialized));
        assert_eq!(
            assign(&env, "a", Value::Null),
            Err(AssignError::Uninitialized)
        );

        env.borrow_mut().initialize("b", Value::Number(2.0), false);
        assert_eq!(assign(&env, "b", Value::Null), Err(AssignError::Constant));
    }

    #[test]
    fn test_shadowing() {
        let global = Environment::new_global();
        global.borrow_mut().declare("x", Some(Value::Number(1.0)), true);
        let child = Environment::new_child(&global);
        child.borrow_mut().declare("x", Some(Value::Number(2.0)), true);
        assign(&child, "x", Value::Number(3.0)).unwrap();
        assert!(matches!(lookup(&global, "x"), Lookup::Found(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn test_this_skips_block_scopes() {
        let global = Environment::new_global();
        let func = Environment::new_function(&global, Value::from("me"), vec![]);
        let block = Environment::new_child(&func);
        assert!(matches!(this_value(&block), Value::String(s) if s == "me"));
        assert!(Rc::ptr_eq(&function_scope(&block), &func));
    }
}
