//! Tree-walking evaluator
//!
//! Statements produce a [`Completion`]; thrown values and hard stops travel
//! on the error side of [`Flow`]. Only [`Interrupt::Throw`] is visible to
//! `try`/`catch`: resource limits and the external interrupt flag abort the
//! whole run.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap as HashMap;

use super::environment::{self as scope, AssignError, EnvRef, Environment, Lookup};
use super::value::*;
use super::{builtins, methods, ResourceLimits};
use crate::ast::*;
use crate::error::{messages, Error, ErrorKind};

/// Default maximum nesting of function calls
pub const DEFAULT_STACK_DEPTH: usize = 1000;

/// Largest array the interpreter will materialize
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Largest string (in bytes) the interpreter will build
pub const MAX_STRING_LENGTH: usize = 1 << 28;

/// Console lines kept per runtime; later lines are still logged
const MAX_CONSOLE_LINES: usize = 10_000;

/// Non-local exit from evaluation
#[derive(Debug)]
pub enum Interrupt {
    /// A JavaScript `throw`; catchable
    Throw(Value),
    /// Resource limit, interrupt flag or engine failure; not catchable
    Abort(Error),
}

/// Evaluation result
pub type Flow<T> = std::result::Result<T, Interrupt>;

/// Statement completion record
enum Completion {
    Normal,
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

/// What a loop does after its body completed
enum LoopStep {
    Next,
    Exit(Completion),
}

/// Bindings left behind by a program body that ran to completion
pub struct Bindings(EnvRef);

impl Bindings {
    /// Value of a top-level binding; `None` if undeclared or uninitialized
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get_own(name)
    }

    /// All top-level names
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().names()
    }
}

/// How a program body finished
pub enum BodyOutcome {
    /// A top-level `return` produced this value
    Returned(Value),
    /// The body ran to its end
    Completed(Bindings),
}

/// Console severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

/// Target of a pattern binding
#[derive(Clone, Copy)]
enum Binder<'a> {
    Var(&'a EnvRef),
    Let(&'a EnvRef),
    Const(&'a EnvRef),
    Assign(&'a EnvRef),
}

impl<'a> Binder<'a> {
    fn declaration(kind: VariableKind, env: &'a EnvRef) -> Self {
        match kind {
            VariableKind::Var => Binder::Var(env),
            VariableKind::Let => Binder::Let(env),
            VariableKind::Const => Binder::Const(env),
        }
    }

    fn env(&self) -> &'a EnvRef {
        match self {
            Binder::Var(e) | Binder::Let(e) | Binder::Const(e) | Binder::Assign(e) => e,
        }
    }
}

/// An assignable location
enum Reference {
    Binding(String),
    Property(Value, String),
}

/// Result of a property read: a plain value, or a built-in method that is
/// invoked directly without allocating a function object
pub(crate) enum Property {
    Value(Value),
    Method(&'static str, NativeFn),
}

/// Values produced by `for...of`
enum IterSource {
    /// Arrays are read live so pushes during iteration are visited
    Array(ObjectRef, usize),
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for IterSource {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            IterSource::Array(obj, index) => {
                let item = match &obj.borrow().kind {
                    ObjectKind::Array(elements) => elements.get(*index).cloned(),
                    _ => None,
                };
                *index += 1;
                item
            }
            IterSource::Items(items) => items.next(),
        }
    }
}

/// The evaluator
pub struct Interpreter {
    global: EnvRef,
    intrinsics: HashMap<Intrinsic, ObjectRef>,
    error_prototypes: HashMap<String, ObjectRef>,
    limits: ResourceLimits,
    interrupt: Option<Arc<AtomicBool>>,
    operations: u64,
    started: Instant,
    depth: usize,
    console: Vec<String>,
    hoisted: HashMap<usize, (FunctionRef, Rc<Vec<String>>)>,
    regex_cache: HashMap<(String, String), regex::Regex>,
    completion: Value,
}

impl Interpreter {
    /// Create an interpreter with the built-in globals installed
    pub fn new(limits: ResourceLimits) -> Self {
        let mut intrinsics = HashMap::default();
        for tag in [
            Intrinsic::Object,
            Intrinsic::Function,
            Intrinsic::Array,
            Intrinsic::String,
            Intrinsic::Number,
            Intrinsic::Boolean,
            Intrinsic::Error,
            Intrinsic::Map,
            Intrinsic::Set,
            Intrinsic::RegExp,
        ] {
            intrinsics.insert(
                tag,
                Rc::new(RefCell::new(Object::new(ObjectKind::Prototype(tag)))),
            );
        }

        let mut interp = Self {
            global: Environment::new_global(),
            intrinsics,
            error_prototypes: HashMap::default(),
            limits,
            interrupt: None,
            operations: 0,
            started: Instant::now(),
            depth: 0,
            console: Vec::new(),
            hoisted: HashMap::default(),
            regex_cache: HashMap::default(),
            completion: Value::Undefined,
        };
        builtins::install(&mut interp);
        interp
    }

    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    pub fn console_output(&self) -> &[String] {
        &self.console
    }

    /// Completion value of the last expression statement
    pub fn completion_value(&self) -> Value {
        self.completion.clone()
    }

    pub fn global(&self) -> &EnvRef {
        &self.global
    }

    pub(crate) fn intrinsic(&self, tag: Intrinsic) -> Option<ObjectRef> {
        self.intrinsics.get(&tag).cloned()
    }

    pub(crate) fn register_error_prototype(&mut self, name: &str, proto: ObjectRef) {
        self.error_prototypes.insert(name.to_string(), proto);
    }

    pub(crate) fn define_global(&mut self, name: &str, value: Value, mutable: bool) {
        self.global.borrow_mut().declare(name, Some(value), mutable);
    }

    // ========== Errors ==========

    /// Create an error object with the matching prototype
    pub fn make_error(&self, name: &str, message: impl Into<String>) -> Value {
        let proto = self
            .error_prototypes
            .get(name)
            .or_else(|| self.error_prototypes.get("Error"))
            .cloned();
        Value::from_object(Object::with_prototype(
            ObjectKind::Error(ErrorData {
                name: name.to_string(),
                message: message.into(),
            }),
            proto,
        ))
    }

    pub fn throw(&self, kind: ErrorKind, message: impl Into<String>) -> Interrupt {
        Interrupt::Throw(self.make_error(kind.name(), message))
    }

    pub fn type_error(&self, message: impl Into<String>) -> Interrupt {
        self.throw(ErrorKind::TypeError, message)
    }

    pub fn range_error(&self, message: impl Into<String>) -> Interrupt {
        self.throw(ErrorKind::RangeError, message)
    }

    pub fn reference_error(&self, message: impl Into<String>) -> Interrupt {
        self.throw(ErrorKind::ReferenceError, message)
    }

    pub fn syntax_error(&self, message: impl Into<String>) -> Interrupt {
        self.throw(ErrorKind::SyntaxError, message)
    }

    /// Turn an escaped interrupt into a crate error
    pub fn into_error(&mut self, interrupt: Interrupt) -> Error {
        match interrupt {
            Interrupt::Abort(err) => err,
            Interrupt::Throw(value) => self.thrown_to_error(&value),
        }
    }

    fn thrown_to_error(&mut self, value: &Value) -> Error {
        let is_error = value
            .as_object()
            .is_some_and(|o| matches!(o.borrow().kind, ObjectKind::Error(_)));
        if let Value::Object(_) = value {
            let message = self.get(value, "message").unwrap_or(Value::Undefined);
            if is_error || !message.is_undefined() {
                let name = self
                    .get(value, "name")
                    .map(|v| v.to_js_string())
                    .unwrap_or_default();
                return Error::runtime(ErrorKind::from_name(&name), message.to_js_string());
            }
        }
        Error::Uncaught(value.to_js_string())
    }

    // ========== Limits ==========

    fn tick(&mut self) -> Flow<()> {
        self.operations += 1;
        if self.operations % self.limits.check_interval.max(1) != 0 {
            return Ok(());
        }

        if let Some(flag) = &self.interrupt {
            if flag.load(AtomicOrdering::Relaxed) {
                return Err(Interrupt::Abort(Error::Interrupted));
            }
        }

        if let Some(limit) = self.limits.time_limit_ms {
            let elapsed = self.started.elapsed().as_millis() as u64;
            if elapsed > limit {
                return Err(Interrupt::Abort(Error::time_limit_exceeded(elapsed, limit)));
            }
        }

        if let Some(limit) = self.limits.operation_limit {
            if self.operations > limit {
                return Err(Interrupt::Abort(Error::operation_limit_exceeded(
                    self.operations,
                    limit,
                )));
            }
        }

        Ok(())
    }

    fn enter_call(&mut self) -> Flow<()> {
        let limit = self.limits.stack_depth_limit.unwrap_or(DEFAULT_STACK_DEPTH);
        if self.depth >= limit {
            return Err(self.range_error(messages::MAXIMUM_CALL_STACK));
        }
        self.depth += 1;
        Ok(())
    }

    // ========== Console ==========

    pub(crate) fn console_write(&mut self, level: ConsoleLevel, line: String) {
        match level {
            ConsoleLevel::Error => tracing::error!(target: "kata::console", "{}", line),
            ConsoleLevel::Warn => tracing::warn!(target: "kata::console", "{}", line),
            ConsoleLevel::Debug => tracing::debug!(target: "kata::console", "{}", line),
            ConsoleLevel::Log | ConsoleLevel::Info => {
                tracing::info!(target: "kata::console", "{}", line)
            }
        }
        if self.console.len() < MAX_CONSOLE_LINES {
            self.console.push(line);
        }
    }

    // ========== Programs ==========

    /// Run a parsed program as a function body
    pub fn run_program(&mut self, program: &Program) -> Flow<BodyOutcome> {
        self.started = Instant::now();
        self.completion = Value::Undefined;

        let env = Environment::new_function(&self.global, Value::Undefined, Vec::new());
        let vars = collect_var_names(&program.body);
        self.instantiate_body(&program.body, &vars, &env);

        match self.exec_statements(&program.body, &env)? {
            Completion::Return(value) => Ok(BodyOutcome::Returned(value)),
            _ => Ok(BodyOutcome::Completed(Bindings(env))),
        }
    }

    /// Hoist `var` names and block-level declarations into a body scope
    fn instantiate_body(&mut self, body: &[Statement], vars: &[String], env: &EnvRef) {
        {
            let mut scope = env.borrow_mut();
            for name in vars {
                if !scope.has_own(name) {
                    scope.declare(name, Some(Value::Undefined), true);
                }
            }
        }
        self.declare_lexical(body, env);
    }

    /// Declare let/const (uninitialized) and function declarations of a block
    fn declare_lexical<'a>(&mut self, body: impl IntoIterator<Item = &'a Statement>, env: &EnvRef) {
        for stmt in body {
            match stmt {
                Statement::VariableDeclaration(decl) if decl.kind != VariableKind::Var => {
                    let mut scope = env.borrow_mut();
                    for declarator in &decl.declarations {
                        for id in declarator.id.bound_names() {
                            scope.declare(&id.name, None, true);
                        }
                    }
                }
                Statement::FunctionDeclaration(func) => {
                    let closure = self.make_closure(func, env, func.name());
                    env.borrow_mut().declare(func.name(), Some(closure), true);
                }
                _ => {}
            }
        }
    }

    fn has_lexical(body: &[Statement]) -> bool {
        body.iter().any(|s| match s {
            Statement::VariableDeclaration(decl) => decl.kind != VariableKind::Var,
            Statement::FunctionDeclaration(_) => true,
            _ => false,
        })
    }

    fn var_names_of(&mut self, func: &FunctionRef) -> Rc<Vec<String>> {
        let key = Rc::as_ptr(func) as usize;
        if let Some((_, names)) = self.hoisted.get(&key) {
            return names.clone();
        }
        let names = match &func.body {
            FunctionBody::Block(block) => Rc::new(collect_var_names(&block.body)),
            FunctionBody::Expression(_) => Rc::new(Vec::new()),
        };
        self.hoisted.insert(key, (func.clone(), names.clone()));
        names
    }

    // ========== Statements ==========

    fn exec_statements(&mut self, body: &[Statement], env: &EnvRef) -> Flow<Completion> {
        for stmt in body {
            match self.exec_statement(stmt, env)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, block: &BlockStatement, env: &EnvRef) -> Flow<Completion> {
        if Self::has_lexical(&block.body) {
            let scope = Environment::new_child(env);
            self.declare_lexical(&block.body, &scope);
            self.exec_statements(&block.body, &scope)
        } else {
            self.exec_statements(&block.body, env)
        }
    }

    fn exec_statement(&mut self, stmt: &Statement, env: &EnvRef) -> Flow<Completion> {
        self.tick()?;

        match stmt {
            Statement::Expression(s) => {
                self.completion = self.eval_expression(&s.expression, env)?;
                Ok(Completion::Normal)
            }
            Statement::VariableDeclaration(decl) => {
                self.exec_variable_declaration(decl, env)?;
                Ok(Completion::Normal)
            }
            Statement::FunctionDeclaration(_) | Statement::Empty(_) => Ok(Completion::Normal),
            Statement::Return(r) => {
                let value = match &r.argument {
                    Some(expr) => self.eval_expression(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Statement::Block(block) => self.exec_block(block, env),
            Statement::If(s) => {
                if self.eval_expression(&s.test, env)?.to_boolean() {
                    self.exec_statement(&s.consequent, env)
                } else if let Some(alternate) = &s.alternate {
                    self.exec_statement(alternate, env)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Statement::While(_)
            | Statement::DoWhile(_)
            | Statement::For(_)
            | Statement::ForIn(_)
            | Statement::ForOf(_) => self.exec_loop(stmt, env, &[]),
            Statement::Switch(s) => self.exec_switch(s, env),
            Statement::Break(j) => Ok(Completion::Break(j.label.as_ref().map(|l| l.name.clone()))),
            Statement::Continue(j) => {
                Ok(Completion::Continue(j.label.as_ref().map(|l| l.name.clone())))
            }
            Statement::Throw(t) => {
                let value = self.eval_expression(&t.argument, env)?;
                Err(Interrupt::Throw(value))
            }
            Statement::Try(t) => self.exec_try(t, env),
            Statement::Labeled(l) => {
                let mut labels = vec![l.label.name.clone()];
                let mut body = &l.body;
                while let Statement::Labeled(inner) = body {
                    labels.push(inner.label.name.clone());
                    body = &inner.body;
                }
                let completion = match body {
                    Statement::While(_)
                    | Statement::DoWhile(_)
                    | Statement::For(_)
                    | Statement::ForIn(_)
                    | Statement::ForOf(_) => self.exec_loop(body, env, &labels)?,
                    other => self.exec_statement(other, env)?,
                };
                match completion {
                    Completion::Break(Some(ref name)) if labels.contains(name) => {
                        Ok(Completion::Normal)
                    }
                    other => Ok(other),
                }
            }
        }
    }

    fn exec_variable_declaration(&mut self, decl: &VariableDeclaration, env: &EnvRef) -> Flow<()> {
        for declarator in &decl.declarations {
            let value = match (&declarator.init, &declarator.id) {
                (Some(init), Pattern::Identifier(id)) => self.eval_named(init, &id.name, env)?,
                (Some(init), _) => self.eval_expression(init, env)?,
                // `var x;` keeps the hoisted value
                (None, _) if decl.kind == VariableKind::Var => continue,
                (None, _) => Value::Undefined,
            };
            self.bind_pattern(&declarator.id, value, Binder::declaration(decl.kind, env))?;
        }
        Ok(())
    }

    fn loop_step(completion: Completion, labels: &[String]) -> LoopStep {
        match completion {
            Completion::Normal | Completion::Continue(None) => LoopStep::Next,
            Completion::Continue(Some(ref l)) if labels.contains(l) => LoopStep::Next,
            Completion::Break(None) => LoopStep::Exit(Completion::Normal),
            Completion::Break(Some(ref l)) if labels.contains(l) => {
                LoopStep::Exit(Completion::Normal)
            }
            other => LoopStep::Exit(other),
        }
    }

    fn exec_loop(&mut self, stmt: &Statement, env: &EnvRef, labels: &[String]) -> Flow<Completion> {
        match stmt {
            Statement::While(w) => {
                while self.eval_expression(&w.test, env)?.to_boolean() {
                    let completion = self.exec_statement(&w.body, env)?;
                    if let LoopStep::Exit(c) = Self::loop_step(completion, labels) {
                        return Ok(c);
                    }
                }
                Ok(Completion::Normal)
            }
            Statement::DoWhile(w) => {
                loop {
                    let completion = self.exec_statement(&w.body, env)?;
                    if let LoopStep::Exit(c) = Self::loop_step(completion, labels) {
                        return Ok(c);
                    }
                    if !self.eval_expression(&w.test, env)?.to_boolean() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Statement::For(f) => self.exec_for(f, env, labels),
            Statement::ForIn(f) => self.exec_for_each(f, env, labels, false),
            Statement::ForOf(f) => self.exec_for_each(f, env, labels, true),
            other => self.exec_statement(other, env),
        }
    }

    fn exec_for(&mut self, stmt: &ForStatement, env: &EnvRef, labels: &[String]) -> Flow<Completion> {
        let mut loop_env = env.clone();
        let mut per_iteration: Vec<String> = Vec::new();
        let mut mutable = true;

        match &stmt.init {
            Some(ForInit::VariableDeclaration(decl)) => {
                if decl.kind != VariableKind::Var {
                    loop_env = Environment::new_child(env);
                    mutable = decl.kind != VariableKind::Const;
                    for declarator in &decl.declarations {
                        for id in declarator.id.bound_names() {
                            loop_env.borrow_mut().declare(&id.name, None, mutable);
                            per_iteration.push(id.name.clone());
                        }
                    }
                }
                self.exec_variable_declaration(decl, &loop_env)?;
            }
            Some(ForInit::Expression(expr)) => {
                self.eval_expression(expr, env)?;
            }
            None => {}
        }

        // Each iteration gets fresh copies of let bindings so closures
        // created in the body observe the value of their own iteration
        let mut iter_env = copy_iteration_env(&loop_env, env, &per_iteration, mutable);
        loop {
            self.tick()?;
            if let Some(test) = &stmt.test {
                if !self.eval_expression(test, &iter_env)?.to_boolean() {
                    break;
                }
            }

            let completion = self.exec_statement(&stmt.body, &iter_env)?;
            if let LoopStep::Exit(c) = Self::loop_step(completion, labels) {
                return Ok(c);
            }

            iter_env = copy_iteration_env(&iter_env, env, &per_iteration, mutable);
            if let Some(update) = &stmt.update {
                self.eval_expression(update, &iter_env)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_each(
        &mut self,
        stmt: &ForInStatement,
        env: &EnvRef,
        labels: &[String],
        of: bool,
    ) -> Flow<Completion> {
        let subject = self.eval_expression(&stmt.right, env)?;

        let source = if of {
            match &subject {
                Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Array(_)) => {
                    IterSource::Array(obj.clone(), 0)
                }
                other => IterSource::Items(self.iterate(other)?.into_iter()),
            }
        } else {
            let keys: Vec<Value> = self
                .enumerable_keys(&subject)
                .into_iter()
                .map(Value::String)
                .collect();
            IterSource::Items(keys.into_iter())
        };

        for item in source {
            self.tick()?;
            let iter_env = match &stmt.left {
                ForInLeft::Declaration(kind, pattern) => {
                    let iter_env = if *kind == VariableKind::Var {
                        env.clone()
                    } else {
                        Environment::new_child(env)
                    };
                    self.bind_pattern(pattern, item, Binder::declaration(*kind, &iter_env))?;
                    iter_env
                }
                ForInLeft::Pattern(pattern) => {
                    self.bind_pattern(pattern, item, Binder::Assign(env))?;
                    env.clone()
                }
            };

            let completion = self.exec_statement(&stmt.body, &iter_env)?;
            if let LoopStep::Exit(c) = Self::loop_step(completion, labels) {
                return Ok(c);
            }
        }
        Ok(Completion::Normal)
    }

    /// Keys visited by `for...in`: own then inherited, without duplicates
    fn enumerable_keys(&self, subject: &Value) -> Vec<String> {
        match subject {
            Value::String(s) => (0..utf16_len(s)).map(|i| i.to_string()).collect(),
            Value::Object(obj) => {
                let mut keys: Vec<String> = Vec::new();
                let mut current = Some(obj.clone());
                while let Some(o) = current {
                    let o = o.borrow();
                    if matches!(o.kind, ObjectKind::Prototype(_)) {
                        break;
                    }
                    for key in o.own_keys() {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                    current = o.prototype.clone();
                }
                keys
            }
            _ => Vec::new(),
        }
    }

    fn exec_switch(&mut self, stmt: &SwitchStatement, env: &EnvRef) -> Flow<Completion> {
        let discriminant = self.eval_expression(&stmt.discriminant, env)?;

        let all = stmt.cases.iter().flat_map(|c| c.consequent.iter());
        let scope = if all.clone().any(|s| Self::has_lexical(std::slice::from_ref(s))) {
            let scope = Environment::new_child(env);
            self.declare_lexical(all, &scope);
            scope
        } else {
            env.clone()
        };

        let mut start = None;
        for (i, case) in stmt.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval_expression(test, &scope)?.strict_equals(&discriminant) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = match start.or_else(|| stmt.cases.iter().position(|c| c.test.is_none())) {
            Some(i) => i,
            None => return Ok(Completion::Normal),
        };

        for case in &stmt.cases[start..] {
            match self.exec_statements(&case.consequent, &scope)? {
                Completion::Normal => {}
                Completion::Break(None) => return Ok(Completion::Normal),
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(&mut self, stmt: &TryStatement, env: &EnvRef) -> Flow<Completion> {
        let result = self.exec_block(&stmt.block, env);

        let result = match (result, &stmt.handler) {
            (Err(Interrupt::Throw(value)), Some(handler)) => {
                let catch_env = Environment::new_child(env);
                let bound = match &handler.param {
                    Some(param) => self.bind_pattern(param, value, Binder::Let(&catch_env)),
                    None => Ok(()),
                };
                bound.and_then(|_| self.exec_block(&handler.body, &catch_env))
            }
            (other, _) => other,
        };

        if let Some(finalizer) = &stmt.finalizer {
            if matches!(result, Err(Interrupt::Abort(_))) {
                return result;
            }
            match self.exec_block(finalizer, env)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    // ========== Patterns ==========

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, binder: Binder<'_>) -> Flow<()> {
        match pattern {
            Pattern::Identifier(id) => self.bind_name(&id.name, value, binder),
            Pattern::Member(member) => {
                let env = binder.env();
                let object = self.eval_expression(&member.object, env)?;
                let key = self.member_key(&member.property, env)?;
                self.set(&object, &key, value)
            }
            Pattern::Assignment(assign) => {
                let value = if value.is_undefined() {
                    match &assign.left {
                        Pattern::Identifier(id) => self.eval_named(&assign.right, &id.name, binder.env())?,
                        _ => self.eval_expression(&assign.right, binder.env())?,
                    }
                } else {
                    value
                };
                self.bind_pattern(&assign.left, value, binder)
            }
            Pattern::Array(array) => {
                let items = self.iterate(&value)?;
                let mut items = items.into_iter();
                for element in &array.elements {
                    let item = items.next().unwrap_or(Value::Undefined);
                    if let Some(element) = element {
                        self.bind_pattern(element, item, binder)?;
                    }
                }
                if let Some(rest) = &array.rest {
                    self.bind_pattern(rest, Value::new_array(items.collect()), binder)?;
                }
                Ok(())
            }
            Pattern::Object(object) => {
                if value.is_nullish() {
                    return Err(self.type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_js_string(),
                        value.to_js_string()
                    )));
                }
                let mut used = Vec::new();
                for prop in &object.properties {
                    let key = self.property_key(&prop.key, binder.env())?;
                    let item = self.get(&value, &key)?;
                    used.push(key);
                    self.bind_pattern(&prop.value, item, binder)?;
                }
                if let Some(rest) = &object.rest {
                    let mut remaining = Object::new(ObjectKind::Ordinary);
                    for (key, item) in self.own_entries(&value) {
                        if !used.contains(&key) {
                            remaining.properties.insert(key, item);
                        }
                    }
                    self.bind_pattern(rest, Value::from_object(remaining), binder)?;
                }
                Ok(())
            }
        }
    }

    fn bind_name(&mut self, name: &str, value: Value, binder: Binder<'_>) -> Flow<()> {
        match binder {
            Binder::Let(env) => {
                env.borrow_mut().initialize(name, value, true);
                Ok(())
            }
            Binder::Const(env) => {
                env.borrow_mut().initialize(name, value, false);
                Ok(())
            }
            Binder::Var(env) => {
                if scope::assign(env, name, value.clone()).is_err() {
                    scope::function_scope(env)
                        .borrow_mut()
                        .declare(name, Some(value), true);
                }
                Ok(())
            }
            Binder::Assign(env) => self.assign_name(name, value, env),
        }
    }

    fn assign_name(&mut self, name: &str, value: Value, env: &EnvRef) -> Flow<()> {
        match scope::assign(env, name, value.clone()) {
            Ok(()) => Ok(()),
            Err(AssignError::Constant) => Err(self.type_error(messages::CONST_ASSIGNMENT)),
            Err(AssignError::Uninitialized) => {
                Err(self.reference_error(messages::before_initialization(name)))
            }
            Err(AssignError::Missing) => {
                // Sloppy-mode implicit global
                scope::global_scope(env)
                    .borrow_mut()
                    .declare(name, Some(value), true);
                Ok(())
            }
        }
    }

    // ========== Expressions ==========

    /// Evaluate an expression, naming anonymous functions after their binding
    fn eval_named(&mut self, expr: &Expression, name: &str, env: &EnvRef) -> Flow<Value> {
        match expr {
            Expression::Function(func) if func.id.is_none() => {
                Ok(self.make_closure(func, env, name))
            }
            other => self.eval_expression(other, env),
        }
    }

    pub(crate) fn eval_expression(&mut self, expr: &Expression, env: &EnvRef) -> Flow<Value> {
        match expr {
            Expression::Identifier(id) => self.resolve_identifier(&id.name, env),
            Expression::Literal(lit) => self.eval_literal(lit),
            Expression::TemplateLiteral(t) => {
                let mut out = String::new();
                for (i, quasi) in t.quasis.iter().enumerate() {
                    out.push_str(&quasi.cooked);
                    if let Some(expr) = t.expressions.get(i) {
                        let value = self.eval_expression(expr, env)?;
                        out.push_str(&self.to_string(&value)?);
                    }
                }
                Ok(Value::String(out))
            }
            Expression::Array(array) => {
                let mut elements = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    match element {
                        Some(Expression::Spread(spread)) => {
                            let value = self.eval_expression(&spread.argument, env)?;
                            elements.extend(self.iterate(&value)?);
                        }
                        Some(expr) => elements.push(self.eval_expression(expr, env)?),
                        None => elements.push(Value::Undefined),
                    }
                }
                Ok(Value::new_array(elements))
            }
            Expression::Object(object) => self.eval_object_literal(object, env),
            Expression::Function(func) => Ok(self.make_closure(func, env, func.name())),
            Expression::This(_) => Ok(scope::this_value(env)),
            Expression::Member(member) => Ok(match self.eval_member(member, env)? {
                Some((object, property)) => self.property_value(property, object),
                None => Value::Undefined,
            }),
            Expression::Call(call) => Ok(self.eval_call(call, env)?.unwrap_or(Value::Undefined)),
            Expression::OptionalChain(inner) => {
                Ok(self.eval_chain(inner, env)?.unwrap_or(Value::Undefined))
            }
            Expression::New(call) => {
                let callee = self.eval_expression(&call.callee, env)?;
                let args = self.eval_arguments(&call.arguments, env)?;
                if !self.is_constructor(&callee) {
                    return Err(self.type_error(messages::not_a_constructor(&describe(&call.callee))));
                }
                self.construct(&callee, &args)
            }
            Expression::Unary(unary) => self.eval_unary(unary, env),
            Expression::Update(update) => {
                let reference = self.resolve_reference(&update.argument, env)?;
                let old = self.get_reference(&reference, env)?;
                let old = self.to_number(&old)?;
                let new = match update.operator {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.put_reference(&reference, Value::Number(new), env)?;
                Ok(Value::Number(if update.prefix { new } else { old }))
            }
            Expression::Binary(binary) => {
                let left = self.eval_expression(&binary.left, env)?;
                let right = self.eval_expression(&binary.right, env)?;
                self.binary_op(binary.operator, &left, &right)
            }
            Expression::Logical(logical) => {
                let left = self.eval_expression(&logical.left, env)?;
                let short_circuit = match logical.operator {
                    LogicalOperator::And => !left.to_boolean(),
                    LogicalOperator::Or => left.to_boolean(),
                    LogicalOperator::NullishCoalescing => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_expression(&logical.right, env)
                }
            }
            Expression::Assignment(assign) => self.eval_assignment(assign, env),
            Expression::Conditional(cond) => {
                if self.eval_expression(&cond.test, env)?.to_boolean() {
                    self.eval_expression(&cond.consequent, env)
                } else {
                    self.eval_expression(&cond.alternate, env)
                }
            }
            Expression::Sequence(seq) => {
                let mut last = Value::Undefined;
                for expr in &seq.expressions {
                    last = self.eval_expression(expr, env)?;
                }
                Ok(last)
            }
            Expression::Spread(_) => Err(Interrupt::Abort(Error::InternalError(
                "spread element outside of a list".to_string(),
            ))),
        }
    }

    fn resolve_identifier(&mut self, name: &str, env: &EnvRef) -> Flow<Value> {
        match scope::lookup(env, name) {
            Lookup::Found(value) => Ok(value),
            Lookup::Uninitialized => Err(self.reference_error(messages::before_initialization(name))),
            Lookup::Missing if name == "arguments" => Ok(Value::new_array(scope::arguments(env))),
            Lookup::Missing => Err(self.reference_error(messages::not_defined(name))),
        }
    }

    fn eval_literal(&mut self, lit: &Literal) -> Flow<Value> {
        Ok(match &lit.value {
            LiteralValue::Null => Value::Null,
            LiteralValue::Boolean(b) => Value::Boolean(*b),
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::String(s) => Value::String(s.clone()),
            LiteralValue::Regex { pattern, flags } => self.make_regexp(pattern, flags)?,
        })
    }

    fn eval_object_literal(&mut self, object: &ObjectExpression, env: &EnvRef) -> Flow<Value> {
        let mut result = Object::new(ObjectKind::Ordinary);
        for prop in &object.properties {
            match prop {
                ObjectProperty::Property { key, value, .. } => {
                    let key = self.property_key(key, env)?;
                    let value = self.eval_named(value, &key, env)?;
                    result.properties.insert(key, value);
                }
                ObjectProperty::Spread { argument, .. } => {
                    let source = self.eval_expression(argument, env)?;
                    for (key, value) in self.own_entries(&source) {
                        result.properties.insert(key, value);
                    }
                }
            }
        }
        Ok(Value::from_object(result))
    }

    fn property_key(&mut self, key: &PropertyKey, env: &EnvRef) -> Flow<String> {
        Ok(match key {
            PropertyKey::Identifier(id) => id.name.clone(),
            PropertyKey::String(s) => s.clone(),
            PropertyKey::Number(n) => number_to_string(*n),
            PropertyKey::Computed(expr) => {
                let value = self.eval_expression(expr, env)?;
                self.to_property_key(&value)?
            }
        })
    }

    fn member_key(&mut self, property: &MemberProperty, env: &EnvRef) -> Flow<String> {
        match property {
            MemberProperty::Identifier(id) => Ok(id.name.clone()),
            MemberProperty::Expression(expr) => {
                let value = self.eval_expression(expr, env)?;
                self.to_property_key(&value)
            }
        }
    }

    pub(crate) fn to_property_key(&mut self, value: &Value) -> Flow<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => self.to_string(other),
        }
    }

    /// Evaluate a link of a member/call chain; `None` means an optional link
    /// short-circuited and the rest of the chain is skipped
    fn eval_chain(&mut self, expr: &Expression, env: &EnvRef) -> Flow<Option<Value>> {
        match expr {
            Expression::Member(member) => Ok(self
                .eval_member(member, env)?
                .map(|(object, property)| self.property_value(property, object))),
            Expression::Call(call) => self.eval_call(call, env),
            other => self.eval_expression(other, env).map(Some),
        }
    }

    fn eval_member(
        &mut self,
        member: &MemberExpression,
        env: &EnvRef,
    ) -> Flow<Option<(Value, Property)>> {
        let Some(object) = self.eval_chain(&member.object, env)? else {
            return Ok(None);
        };
        if member.optional && object.is_nullish() {
            return Ok(None);
        }
        let key = self.member_key(&member.property, env)?;
        let property = self.lookup_property(&object, &key)?;
        Ok(Some((object, property)))
    }

    fn eval_call(&mut self, call: &CallExpression, env: &EnvRef) -> Flow<Option<Value>> {
        let (this, callee) = match &call.callee {
            Expression::Member(member) => match self.eval_member(member, env)? {
                Some(found) => found,
                None => return Ok(None),
            },
            other => match self.eval_chain(other, env)? {
                Some(value) => (Value::Undefined, Property::Value(value)),
                None => return Ok(None),
            },
        };

        match callee {
            Property::Method(_, func) => {
                let args = self.eval_arguments(&call.arguments, env)?;
                self.call_native(func, &this, &args).map(Some)
            }
            Property::Value(callee) => {
                if call.optional && callee.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_arguments(&call.arguments, env)?;
                if !callee.is_callable() {
                    return Err(self.type_error(messages::not_a_function(&describe(&call.callee))));
                }
                self.call(&callee, this, &args).map(Some)
            }
        }
    }

    fn eval_arguments(&mut self, arguments: &[Expression], env: &EnvRef) -> Flow<Vec<Value>> {
        let mut args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            match arg {
                Expression::Spread(spread) => {
                    let value = self.eval_expression(&spread.argument, env)?;
                    args.extend(self.iterate(&value)?);
                }
                other => args.push(self.eval_expression(other, env)?),
            }
        }
        Ok(args)
    }

    fn eval_unary(&mut self, unary: &UnaryExpression, env: &EnvRef) -> Flow<Value> {
        match unary.operator {
            UnaryOperator::Typeof => {
                if let Expression::Identifier(id) = &unary.argument {
                    if let Lookup::Missing = scope::lookup(env, &id.name) {
                        return Ok(Value::from("undefined"));
                    }
                }
                let value = self.eval_expression(&unary.argument, env)?;
                Ok(Value::from(value.type_of()))
            }
            UnaryOperator::Delete => match &unary.argument {
                Expression::Member(member) => {
                    let object = self.eval_expression(&member.object, env)?;
                    let key = self.member_key(&member.property, env)?;
                    Ok(Value::Boolean(self.delete_property(&object, &key)))
                }
                Expression::Identifier(_) => Ok(Value::Boolean(false)),
                other => {
                    self.eval_expression(other, env)?;
                    Ok(Value::Boolean(true))
                }
            },
            operator => {
                let value = self.eval_expression(&unary.argument, env)?;
                Ok(match operator {
                    UnaryOperator::Minus => Value::Number(-self.to_number(&value)?),
                    UnaryOperator::Plus => Value::Number(self.to_number(&value)?),
                    UnaryOperator::Not => Value::Boolean(!value.to_boolean()),
                    UnaryOperator::BitwiseNot => {
                        Value::Number(f64::from(!to_int32(self.to_number(&value)?)))
                    }
                    UnaryOperator::Void => Value::Undefined,
                    UnaryOperator::Typeof | UnaryOperator::Delete => Value::Undefined,
                })
            }
        }
    }

    fn eval_assignment(&mut self, assign: &AssignmentExpression, env: &EnvRef) -> Flow<Value> {
        let target = match &assign.left {
            AssignmentTarget::Pattern(pattern) => {
                let value = self.eval_expression(&assign.right, env)?;
                self.bind_pattern(pattern, value.clone(), Binder::Assign(env))?;
                return Ok(value);
            }
            AssignmentTarget::Simple(target) => target,
        };

        let reference = self.resolve_reference(target, env)?;

        if assign.operator == AssignmentOperator::Assign {
            let value = match &reference {
                Reference::Binding(name) => self.eval_named(&assign.right, name, env)?,
                Reference::Property(..) => self.eval_expression(&assign.right, env)?,
            };
            self.put_reference(&reference, value.clone(), env)?;
            return Ok(value);
        }

        let current = self.get_reference(&reference, env)?;

        if let Some(logical) = assign.operator.logical_operator() {
            let keep = match logical {
                LogicalOperator::And => !current.to_boolean(),
                LogicalOperator::Or => current.to_boolean(),
                LogicalOperator::NullishCoalescing => !current.is_nullish(),
            };
            if keep {
                return Ok(current);
            }
            let value = self.eval_expression(&assign.right, env)?;
            self.put_reference(&reference, value.clone(), env)?;
            return Ok(value);
        }

        let right = self.eval_expression(&assign.right, env)?;
        let value = match assign.operator.binary_operator() {
            Some(op) => self.binary_op(op, &current, &right)?,
            None => right,
        };
        self.put_reference(&reference, value.clone(), env)?;
        Ok(value)
    }

    fn resolve_reference(&mut self, expr: &Expression, env: &EnvRef) -> Flow<Reference> {
        match expr {
            Expression::Identifier(id) => Ok(Reference::Binding(id.name.clone())),
            Expression::Member(member) => {
                let object = self.eval_expression(&member.object, env)?;
                let key = self.member_key(&member.property, env)?;
                Ok(Reference::Property(object, key))
            }
            _ => Err(self.syntax_error(messages::INVALID_LEFT_HAND_SIDE)),
        }
    }

    fn get_reference(&mut self, reference: &Reference, env: &EnvRef) -> Flow<Value> {
        match reference {
            Reference::Binding(name) => self.resolve_identifier(name, env),
            Reference::Property(object, key) => self.get(object, key),
        }
    }

    fn put_reference(&mut self, reference: &Reference, value: Value, env: &EnvRef) -> Flow<()> {
        match reference {
            Reference::Binding(name) => self.assign_name(name, value, env),
            Reference::Property(object, key) => self.set(object, key, value),
        }
    }

    // ========== Operators ==========

    pub(crate) fn binary_op(&mut self, op: BinaryOperator, left: &Value, right: &Value) -> Flow<Value> {
        Ok(match op {
            BinaryOperator::Add => {
                let l = self.to_primitive(left)?;
                let r = self.to_primitive(right)?;
                if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                    let mut out = l.to_js_string();
                    let tail = r.to_js_string();
                    if out.len() + tail.len() > MAX_STRING_LENGTH {
                        return Err(self.range_error(messages::INVALID_STRING_LENGTH));
                    }
                    out.push_str(&tail);
                    Value::String(out)
                } else {
                    Value::Number(l.to_number() + r.to_number())
                }
            }
            BinaryOperator::Sub => Value::Number(self.to_number(left)? - self.to_number(right)?),
            BinaryOperator::Mul => Value::Number(self.to_number(left)? * self.to_number(right)?),
            BinaryOperator::Div => Value::Number(self.to_number(left)? / self.to_number(right)?),
            BinaryOperator::Mod => Value::Number(self.to_number(left)? % self.to_number(right)?),
            BinaryOperator::Pow => {
                let base = self.to_number(left)?;
                let exponent = self.to_number(right)?;
                Value::Number(js_pow(base, exponent))
            }
            BinaryOperator::Eq => Value::Boolean(left.loose_equals(right)),
            BinaryOperator::Ne => Value::Boolean(!left.loose_equals(right)),
            BinaryOperator::StrictEq => Value::Boolean(left.strict_equals(right)),
            BinaryOperator::StrictNe => Value::Boolean(!left.strict_equals(right)),
            BinaryOperator::Lt => Value::Boolean(self.compare(left, right)? == Some(Ordering::Less)),
            BinaryOperator::Gt => {
                Value::Boolean(self.compare(left, right)? == Some(Ordering::Greater))
            }
            BinaryOperator::Le => Value::Boolean(matches!(
                self.compare(left, right)?,
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOperator::Ge => Value::Boolean(matches!(
                self.compare(left, right)?,
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOperator::BitwiseAnd => {
                Value::Number(f64::from(self.to_int32(left)? & self.to_int32(right)?))
            }
            BinaryOperator::BitwiseOr => {
                Value::Number(f64::from(self.to_int32(left)? | self.to_int32(right)?))
            }
            BinaryOperator::BitwiseXor => {
                Value::Number(f64::from(self.to_int32(left)? ^ self.to_int32(right)?))
            }
            BinaryOperator::Shl => {
                let shift = to_uint32(self.to_number(right)?) & 31;
                Value::Number(f64::from(self.to_int32(left)?.wrapping_shl(shift)))
            }
            BinaryOperator::Shr => {
                let shift = to_uint32(self.to_number(right)?) & 31;
                Value::Number(f64::from(self.to_int32(left)? >> shift))
            }
            BinaryOperator::UShr => {
                let shift = to_uint32(self.to_number(right)?) & 31;
                Value::Number(f64::from(to_uint32(self.to_number(left)?) >> shift))
            }
            BinaryOperator::In => {
                let Value::Object(obj) = right else {
                    return Err(self.type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        left.to_js_string(),
                        right.to_js_string()
                    )));
                };
                let key = self.to_property_key(left)?;
                Value::Boolean(self.has_property(obj, &key))
            }
            BinaryOperator::Instanceof => Value::Boolean(self.instance_of(left, right)?),
        })
    }

    /// Relational comparison; `None` when either side is NaN
    pub(crate) fn compare(&mut self, left: &Value, right: &Value) -> Flow<Option<Ordering>> {
        let l = self.to_primitive(left)?;
        let r = self.to_primitive(right)?;
        Ok(match (&l, &r) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => l.to_number().partial_cmp(&r.to_number()),
        })
    }

    fn has_property(&self, obj: &ObjectRef, key: &str) -> bool {
        let mut current = Some(obj.clone());
        while let Some(o) = current {
            let o = o.borrow();
            if o.has_own(key) || o.get_own(key).is_some() {
                return true;
            }
            if let Some(table) = o.method_table() {
                if methods::lookup(table, key).is_some() {
                    return true;
                }
            }
            current = o.prototype.clone();
        }
        false
    }

    fn instance_of(&mut self, left: &Value, right: &Value) -> Flow<bool> {
        if !right.is_callable() {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let Value::Object(object) = left else {
            return Ok(false);
        };

        let brand = right.as_object().and_then(|r| match &r.borrow().kind {
            ObjectKind::Native(native) => Some(native.name),
            _ => None,
        });
        let kind_matches = |name: &str| {
            let o = object.borrow();
            match name {
                "Object" => Some(true),
                "Array" => Some(matches!(o.kind, ObjectKind::Array(_))),
                "Function" => Some(o.is_callable()),
                "Map" => Some(matches!(o.kind, ObjectKind::Map(_))),
                "Set" => Some(matches!(o.kind, ObjectKind::Set(_))),
                "RegExp" => Some(matches!(o.kind, ObjectKind::RegExp(_))),
                _ => None,
            }
        };
        if let Some(result) = brand.and_then(kind_matches) {
            return Ok(result);
        }

        let proto = self.get(right, "prototype")?;
        let Some(proto) = proto.as_object() else {
            return Ok(false);
        };
        let mut current = object.borrow().prototype.clone();
        while let Some(p) = current {
            if Rc::ptr_eq(&p, proto) {
                return Ok(true);
            }
            current = p.borrow().prototype.clone();
        }
        Ok(false)
    }

    // ========== Conversions ==========

    /// A user-defined method reachable through own or inherited properties
    fn user_method(&self, obj: &ObjectRef, name: &str) -> Option<Value> {
        let mut current = Some(obj.clone());
        while let Some(o) = current {
            let o = o.borrow();
            if let Some(value) = o.properties.get(name) {
                return value.is_callable().then(|| value.clone());
            }
            current = o.prototype.clone();
        }
        None
    }

    /// ToPrimitive, honouring user-defined `valueOf` and `toString`
    pub(crate) fn to_primitive(&mut self, value: &Value) -> Flow<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        for name in ["valueOf", "toString"] {
            if let Some(method) = self.user_method(obj, name) {
                let result = self.call(&method, value.clone(), &[])?;
                if !matches!(result, Value::Object(_)) {
                    return Ok(result);
                }
            }
        }
        Ok(Value::String(value.to_js_string()))
    }

    pub fn to_string(&mut self, value: &Value) -> Flow<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Object(_) => Ok(self.to_primitive(value)?.to_js_string()),
            other => Ok(other.to_js_string()),
        }
    }

    pub fn to_number(&mut self, value: &Value) -> Flow<f64> {
        match value {
            Value::Object(_) => Ok(self.to_primitive(value)?.to_number()),
            other => Ok(other.to_number()),
        }
    }

    fn to_int32(&mut self, value: &Value) -> Flow<i32> {
        Ok(to_int32(self.to_number(value)?))
    }

    // ========== Properties ==========

    /// `target[key]`
    pub fn get(&mut self, target: &Value, key: &str) -> Flow<Value> {
        let property = self.lookup_property(target, key)?;
        Ok(self.property_value(property, target.clone()))
    }

    fn property_value(&self, property: Property, receiver: Value) -> Value {
        match property {
            Property::Value(value) => value,
            Property::Method(name, func) => Value::from_object(Object::new(ObjectKind::Native(
                NativeFunction {
                    name,
                    func,
                    constructor: None,
                    receiver: Some(receiver),
                },
            ))),
        }
    }

    pub(crate) fn lookup_property(&mut self, target: &Value, key: &str) -> Flow<Property> {
        let table = match target {
            Value::Undefined | Value::Null => {
                return Err(
                    self.type_error(messages::cannot_read_property(key, &target.to_js_string()))
                );
            }
            Value::Boolean(_) => Intrinsic::Boolean,
            Value::Number(_) => Intrinsic::Number,
            Value::String(s) => {
                if key == "length" {
                    return Ok(Property::Value(Value::Number(utf16_len(s) as f64)));
                }
                if let Some(index) = array_index(key) {
                    let index = index as usize;
                    return Ok(Property::Value(if index < utf16_len(s) {
                        Value::String(utf16_slice(s, index, index + 1))
                    } else {
                        Value::Undefined
                    }));
                }
                Intrinsic::String
            }
            Value::Object(obj) => return Ok(self.lookup_object_property(obj, key)),
        };

        Ok(methods::lookup(table, key)
            .or_else(|| methods::lookup(Intrinsic::Object, key))
            .map(|(name, func)| Property::Method(name, func))
            .unwrap_or(Property::Value(Value::Undefined)))
    }

    fn lookup_object_property(&self, obj: &ObjectRef, key: &str) -> Property {
        let mut current = obj.clone();
        loop {
            let next = {
                let o = current.borrow();
                if let Some(value) = o.get_own(key) {
                    return Property::Value(value);
                }
                if let Some(table) = o.method_table() {
                    if let Some((name, func)) = methods::lookup(table, key) {
                        return Property::Method(name, func);
                    }
                }
                o.prototype.clone()
            };
            match next {
                Some(proto) => current = proto,
                None => break,
            }
        }
        methods::lookup(Intrinsic::Object, key)
            .map(|(name, func)| Property::Method(name, func))
            .unwrap_or(Property::Value(Value::Undefined))
    }

    /// `target[key] = value`
    pub fn set(&mut self, target: &Value, key: &str, value: Value) -> Flow<()> {
        let obj = match target {
            Value::Undefined | Value::Null => {
                return Err(
                    self.type_error(messages::cannot_set_property(key, &target.to_js_string()))
                );
            }
            Value::Object(obj) => obj,
            // Writes to primitives are silently dropped
            _ => return Ok(()),
        };

        let mut o = obj.borrow_mut();
        if o.frozen {
            return Ok(());
        }
        match &mut o.kind {
            ObjectKind::Array(elements) => {
                if key == "length" {
                    let n = value.to_number();
                    if n < 0.0 || n.fract() != 0.0 || n as usize > MAX_ARRAY_LENGTH {
                        return Err(self.range_error(messages::INVALID_ARRAY_LENGTH));
                    }
                    elements.resize(n as usize, Value::Undefined);
                    return Ok(());
                }
                if let Some(index) = array_index(key) {
                    let index = index as usize;
                    if index >= MAX_ARRAY_LENGTH {
                        return Err(self.range_error(messages::INVALID_ARRAY_LENGTH));
                    }
                    if index >= elements.len() {
                        elements.resize(index + 1, Value::Undefined);
                    }
                    elements[index] = value;
                    return Ok(());
                }
            }
            ObjectKind::RegExp(re) if key == "lastIndex" => {
                re.last_index = value.to_number().max(0.0) as usize;
                return Ok(());
            }
            ObjectKind::Error(err) if key == "message" || key == "name" => {
                if let Value::String(s) = &value {
                    if key == "message" {
                        err.message = s.clone();
                    } else {
                        err.name = s.clone();
                    }
                    return Ok(());
                }
            }
            _ => {}
        }
        o.properties.insert(key.to_string(), value);
        Ok(())
    }

    fn delete_property(&mut self, target: &Value, key: &str) -> bool {
        let Value::Object(obj) = target else {
            return true;
        };
        let mut o = obj.borrow_mut();
        if o.frozen {
            return false;
        }
        if let ObjectKind::Array(elements) = &mut o.kind {
            if let Some(index) = array_index(key) {
                if let Some(slot) = elements.get_mut(index as usize) {
                    *slot = Value::Undefined;
                }
                return true;
            }
        }
        o.properties.shift_remove(key);
        true
    }

    /// Own enumerable `[key, value]` pairs, as used by spread and `Object.entries`
    pub(crate) fn own_entries(&self, value: &Value) -> Vec<(String, Value)> {
        match value {
            Value::String(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
                .collect(),
            Value::Object(obj) => {
                let o = obj.borrow();
                if matches!(o.kind, ObjectKind::Prototype(_)) {
                    return Vec::new();
                }
                o.own_keys()
                    .into_iter()
                    .map(|k| {
                        let v = o.get_own(&k).unwrap_or(Value::Undefined);
                        (k, v)
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Materialize an iterable into its values
    pub fn iterate(&mut self, value: &Value) -> Flow<Vec<Value>> {
        match value {
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            Value::Object(obj) => {
                let items = match &obj.borrow().kind {
                    ObjectKind::Array(elements) => Some(elements.clone()),
                    ObjectKind::Set(items) => Some(items.clone()),
                    ObjectKind::Map(entries) => Some(
                        entries
                            .iter()
                            .map(|(k, v)| Value::new_array(vec![k.clone(), v.clone()]))
                            .collect(),
                    ),
                    _ => None,
                };
                items.ok_or_else(|| self.type_error(messages::not_iterable("object")))
            }
            other => Err(self.type_error(messages::not_iterable(&other.to_js_string()))),
        }
    }

    // ========== Functions ==========

    pub(crate) fn make_closure(&mut self, func: &FunctionRef, env: &EnvRef, name: &str) -> Value {
        let mut object = Object::new(ObjectKind::Closure(Closure {
            func: func.clone(),
            env: env.clone(),
            name: name.to_string(),
        }));
        if !func.is_arrow {
            let proto = Object::with_prototype(ObjectKind::Ordinary, self.intrinsic(Intrinsic::Object));
            object
                .properties
                .insert("prototype".to_string(), Value::from_object(proto));
        }
        Value::from_object(object)
    }

    fn is_constructor(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|o| match &o.borrow().kind {
            ObjectKind::Closure(c) => !c.func.is_arrow,
            ObjectKind::Native(n) => n.constructor.is_some(),
            ObjectKind::Bound(b) => self.is_constructor(&b.target),
            _ => false,
        })
    }

    /// Call a function value
    pub fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> Flow<Value> {
        enum Target {
            Closure(FunctionRef, EnvRef),
            Native(NativeFn, Option<Value>),
            Bound(Value, Value, Vec<Value>),
        }

        let target = match callee {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Closure(c) => Some(Target::Closure(c.func.clone(), c.env.clone())),
                ObjectKind::Native(n) => Some(Target::Native(n.func, n.receiver.clone())),
                ObjectKind::Bound(b) => {
                    Some(Target::Bound(b.target.clone(), b.this.clone(), b.args.clone()))
                }
                _ => None,
            },
            _ => None,
        };

        match target {
            Some(Target::Closure(func, env)) => self.call_closure(&func, &env, this, args, callee),
            Some(Target::Native(func, receiver)) => {
                let this = receiver.unwrap_or(this);
                self.call_native(func, &this, args)
            }
            Some(Target::Bound(target, bound_this, mut bound_args)) => {
                bound_args.extend_from_slice(args);
                self.call(&target, bound_this, &bound_args)
            }
            None => Err(self.type_error(messages::not_a_function(&callee.to_js_string()))),
        }
    }

    fn call_native(&mut self, func: NativeFn, this: &Value, args: &[Value]) -> Flow<Value> {
        self.enter_call()?;
        let result = func(self, this, args);
        self.depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        func: &FunctionRef,
        env: &EnvRef,
        this: Value,
        args: &[Value],
        callee: &Value,
    ) -> Flow<Value> {
        self.tick()?;
        self.enter_call()?;
        let result = self.invoke_closure(func, env, this, args, callee);
        self.depth -= 1;
        result
    }

    fn invoke_closure(
        &mut self,
        func: &FunctionRef,
        env: &EnvRef,
        this: Value,
        args: &[Value],
        callee: &Value,
    ) -> Flow<Value> {
        let scope = if func.is_arrow {
            Environment::new_child(env)
        } else {
            let scope = Environment::new_function(env, this, args.to_vec());
            // A named function expression can refer to itself
            if let Some(id) = &func.id {
                scope.borrow_mut().declare(&id.name, Some(callee.clone()), false);
            }
            scope
        };

        for (i, param) in func.params.params.iter().enumerate() {
            let arg = args.get(i).cloned().unwrap_or(Value::Undefined);
            self.bind_pattern(param, arg, Binder::Let(&scope))?;
        }
        if let Some(rest) = &func.params.rest {
            let remaining = args.get(func.params.params.len()..).unwrap_or(&[]).to_vec();
            self.bind_pattern(rest, Value::new_array(remaining), Binder::Let(&scope))?;
        }

        match &func.body {
            FunctionBody::Expression(expr) => self.eval_expression(expr, &scope),
            FunctionBody::Block(block) => {
                let vars = self.var_names_of(func);
                self.instantiate_body(&block.body, &vars, &scope);
                match self.exec_statements(&block.body, &scope)? {
                    Completion::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> Flow<Value> {
        enum Ctor {
            Closure(FunctionRef, EnvRef, Option<ObjectRef>),
            Native(NativeFn),
            Bound(Value, Vec<Value>),
        }

        let ctor = match callee {
            Value::Object(obj) => {
                let o = obj.borrow();
                match &o.kind {
                    ObjectKind::Closure(c) if !c.func.is_arrow => {
                        let proto = o
                            .properties
                            .get("prototype")
                            .and_then(|p| p.as_object().cloned());
                        Some(Ctor::Closure(c.func.clone(), c.env.clone(), proto))
                    }
                    ObjectKind::Native(NativeFunction {
                        constructor: Some(ctor),
                        ..
                    }) => Some(Ctor::Native(*ctor)),
                    ObjectKind::Bound(b) => Some(Ctor::Bound(b.target.clone(), b.args.clone())),
                    _ => None,
                }
            }
            _ => None,
        };

        match ctor {
            Some(Ctor::Closure(func, env, proto)) => {
                let instance = Value::from_object(Object::with_prototype(ObjectKind::Ordinary, proto));
                let result = self.call_closure(&func, &env, instance.clone(), args, callee)?;
                Ok(if matches!(result, Value::Object(_)) {
                    result
                } else {
                    instance
                })
            }
            Some(Ctor::Native(ctor)) => self.call_native(ctor, &Value::Undefined, args),
            Some(Ctor::Bound(target, mut bound_args)) => {
                bound_args.extend_from_slice(args);
                self.construct(&target, &bound_args)
            }
            None => Err(self.type_error(messages::not_a_constructor(&callee.to_js_string()))),
        }
    }

    // ========== Regular expressions ==========

    /// Compile a regular expression literal or `new RegExp(...)`
    pub fn make_regexp(&mut self, source: &str, flags: &str) -> Flow<Value> {
        let key = (source.to_string(), flags.to_string());
        let regex = match self.regex_cache.get(&key) {
            Some(regex) => regex.clone(),
            None => {
                if let Some(bad) = flags.chars().find(|c| !"dgimsuy".contains(*c)) {
                    return Err(self.syntax_error(format!(
                        "Invalid flags supplied to RegExp constructor '{}'",
                        bad
                    )));
                }
                let regex = regex::RegexBuilder::new(source)
                    .case_insensitive(flags.contains('i'))
                    .multi_line(flags.contains('m'))
                    .dot_matches_new_line(flags.contains('s'))
                    .size_limit(1 << 22)
                    .build()
                    .map_err(|e| {
                        self.syntax_error(format!(
                            "Invalid regular expression: /{}/: {}",
                            source,
                            e.to_string().lines().last().unwrap_or("invalid pattern")
                        ))
                    })?;
                self.regex_cache.insert(key, regex.clone());
                regex
            }
        };

        Ok(Value::from_object(Object::with_prototype(
            ObjectKind::RegExp(Box::new(RegExpData {
                source: source.to_string(),
                flags: flags.to_string(),
                regex,
                last_index: 0,
            })),
            self.intrinsic(Intrinsic::RegExp),
        )))
    }
}

fn copy_iteration_env(from: &EnvRef, outer: &EnvRef, names: &[String], mutable: bool) -> EnvRef {
    if names.is_empty() {
        return from.clone();
    }
    let next = Environment::new_child(outer);
    {
        let source = from.borrow();
        let mut target = next.borrow_mut();
        for name in names {
            target.declare(name, source.get_own(name), mutable);
        }
    }
    next
}

/// `Math.pow` semantics, which differ from `powf` for NaN exponents and ±1 bases
pub(crate) fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// Source-ish rendering of a callee for error messages
fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(id) => id.name.clone(),
        Expression::This(_) => "this".to_string(),
        Expression::Member(member) => match &member.property {
            MemberProperty::Identifier(prop) => format!("{}.{}", describe(&member.object), prop.name),
            MemberProperty::Expression(_) => format!("{}[...]", describe(&member.object)),
        },
        Expression::Call(call) => format!("{}(...)", describe(&call.callee)),
        Expression::OptionalChain(inner) => describe(inner),
        _ => "expression".to_string(),
    }
}

/// Names declared with `var` anywhere in a body, not descending into functions
fn collect_var_names(body: &[Statement]) -> Vec<String> {
    fn visit(stmt: &Statement, names: &mut Vec<String>) {
        let mut add = |pattern: &Pattern, names: &mut Vec<String>| {
            for id in pattern.bound_names() {
                if !names.contains(&id.name) {
                    names.push(id.name.clone());
                }
            }
        };
        match stmt {
            Statement::VariableDeclaration(decl) if decl.kind == VariableKind::Var => {
                for d in &decl.declarations {
                    add(&d.id, names);
                }
            }
            Statement::Block(block) => block.body.iter().for_each(|s| visit(s, names)),
            Statement::If(s) => {
                visit(&s.consequent, names);
                if let Some(alt) = &s.alternate {
                    visit(alt, names);
                }
            }
            Statement::While(w) | Statement::DoWhile(w) => visit(&w.body, names),
            Statement::For(f) => {
                if let Some(ForInit::VariableDeclaration(decl)) = &f.init {
                    if decl.kind == VariableKind::Var {
                        for d in &decl.declarations {
                            add(&d.id, names);
                        }
                    }
                }
                visit(&f.body, names);
            }
            Statement::ForIn(f) | Statement::ForOf(f) => {
                if let ForInLeft::Declaration(VariableKind::Var, pattern) = &f.left {
                    add(pattern, names);
                }
                visit(&f.body, names);
            }
            Statement::Switch(s) => s
                .cases
                .iter()
                .flat_map(|c| c.consequent.iter())
                .for_each(|s| visit(s, names)),
            Statement::Try(t) => {
                t.block.body.iter().for_each(|s| visit(s, names));
                if let Some(handler) = &t.handler {
                    handler.body.body.iter().for_each(|s| visit(s, names));
                }
                if let Some(finalizer) = &t.finalizer {
                    finalizer.body.iter().for_each(|s| visit(s, names));
                }
            }
            Statement::Labeled(l) => visit(&l.body, names),
            _ => {}
        }
    }

    let mut names = Vec::new();
    for stmt in body {
        visit(stmt, &mut names);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(source: &str) -> Flow<BodyOutcome> {
        let program = parse(source).unwrap();
        let mut interp = Interpreter::new(ResourceLimits::new().with_stack_depth_limit(50));
        interp.run_program(&program)
    }

    fn returned(source: &str) -> String {
        match run(source) {
            Ok(BodyOutcome::Returned(value)) => value.to_js_string(),
            Ok(BodyOutcome::Completed(_)) => panic!("no return in {}", source),
            Err(e) => panic!("{} failed: {:?}", source, e),
        }
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(returned("return 1 + 2 * 3"), "7");
        assert_eq!(returned("return '1' + 2"), "12");
        assert_eq!(returned("return 7 % -3"), "1");
        assert_eq!(returned("return 2 ** 10"), "1024");
        assert_eq!(returned("return -7 >> 1"), "-4");
        assert_eq!(returned("return -1 >>> 28"), "15");
    }

    #[test]
    fn test_top_level_bindings_are_visible() {
        let Ok(BodyOutcome::Completed(bindings)) = run("function add(a, b) { return a + b; } let x = 1;")
        else {
            panic!("expected completion");
        };
        assert!(bindings.get("add").is_some_and(|v| v.is_callable()));
        assert!(bindings.get("x").is_some());
        assert!(bindings.get("missing").is_none());
    }

    #[test]
    fn test_hoisting() {
        assert_eq!(returned("return f(); function f() { return 'hoisted'; }"), "hoisted");
        assert_eq!(returned("var r = typeof v; var v = 1; return r;"), "undefined");
    }

    #[test]
    fn test_tdz() {
        let err = run("x; let x = 1;").err().unwrap();
        let mut interp = Interpreter::new(ResourceLimits::new());
        let err = interp.into_error(err);
        assert_eq!(err.message(), "Cannot access 'x' before initialization");
    }

    #[test]
    fn test_const_assignment_throws() {
        assert_eq!(
            returned("const a = 1; try { a = 2; } catch (e) { return e.message; }"),
            "Assignment to constant variable."
        );
    }

    #[test]
    fn test_closures_capture_loop_iterations() {
        assert_eq!(
            returned(
                "const fns = []; for (let i = 0; i < 3; i++) { fns.push(() => i); } \
                 return fns.map(f => f()).join(',');"
            ),
            "0,1,2"
        );
    }

    #[test]
    fn test_destructuring() {
        assert_eq!(
            returned("const { a, b: [c, ...d], e = 5 } = { a: 1, b: [2, 3, 4] }; return [a, c, d.length, e].join();"),
            "1,2,2,5"
        );
        assert_eq!(returned("let x = 1, y = 2; [x, y] = [y, x]; return x + '' + y;"), "21");
    }

    #[test]
    fn test_labels_and_switch() {
        assert_eq!(
            returned(
                "let n = 0; outer: for (let i = 0; i < 3; i++) { for (let j = 0; j < 3; j++) { \
                 if (j === 1) continue outer; if (i === 2) break outer; n++; } } return n;"
            ),
            "2"
        );
        assert_eq!(
            returned("switch (3) { case 1: return 'one'; case 3: case 4: return 'three'; default: return 'd'; }"),
            "three"
        );
    }

    #[test]
    fn test_try_finally_overrides() {
        assert_eq!(returned("try { throw 1 } catch { return 'c' } finally { }"), "c");
        assert_eq!(returned("function f() { try { return 1 } finally { return 2 } } return f()"), "2");
    }

    #[test]
    fn test_call_depth_is_catchable() {
        assert_eq!(
            returned("function f() { return f(); } try { f(); } catch (e) { return e.message; }"),
            "Maximum call stack size exceeded"
        );
    }

    #[test]
    fn test_optional_chaining() {
        assert_eq!(returned("const o = null; return o?.a.b.c"), "undefined");
        assert_eq!(returned("const o = { a: { b: () => 4 } }; return o?.a?.b?.()"), "4");
        assert_eq!(returned("const o = {}; return o.missing?.()"), "undefined");
    }

    #[test]
    fn test_this_in_methods_and_arrows() {
        assert_eq!(
            returned("const o = { n: 2, get() { return [1, 2].map(x => x * this.n); } }; return o.get().join();"),
            "2,4"
        );
    }

    #[test]
    fn test_constructors_and_instanceof() {
        assert_eq!(
            returned(
                "function P(n) { this.n = n; } P.prototype.twice = function () { return this.n * 2; }; \
                 const p = new P(4); return [p.twice(), p instanceof P, [] instanceof Array].join();"
            ),
            "8,true,true"
        );
    }

    #[test]
    fn test_interrupt_aborts_uncatchably() {
        let program = parse("try { while (true) {} } catch (e) { return 'caught'; }").unwrap();
        let mut interp = Interpreter::new(ResourceLimits::new());
        let flag = Arc::new(AtomicBool::new(true));
        interp.set_interrupt(flag);
        assert!(matches!(
            interp.run_program(&program),
            Err(Interrupt::Abort(Error::Interrupted))
        ));
    }

    #[test]
    fn test_operation_limit() {
        let program = parse("let i = 0; while (true) { i++; }").unwrap();
        let mut interp = Interpreter::new(ResourceLimits::new().with_operation_limit(10_000));
        assert!(matches!(
            interp.run_program(&program),
            Err(Interrupt::Abort(Error::ResourceLimitError { .. }))
        ));
    }

    #[test]
    fn test_thrown_values_convert_to_errors() {
        let mut interp = Interpreter::new(ResourceLimits::new());
        let err = interp.into_error(Interrupt::Throw(Value::from("plain")));
        assert_eq!(err.message(), "plain");
        let thrown = interp.make_error("TypeError", "bad input");
        let err = interp.into_error(Interrupt::Throw(thrown));
        assert_eq!(err.to_string(), "TypeError: bad input");
    }

    #[test]
    fn test_var_names_skip_nested_functions() {
        let program = parse("var a; if (x) { var b; } function f() { var c; }").unwrap();
        assert_eq!(collect_var_names(&program.body), vec!["a", "b"]);
    }
}
