use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use hopsim_core::ContextStore;
use tracing::{debug, error, info, warn};

use crate::ast::{
    AssignOp, BinaryOp, Capability, Expr, PathSegment, Place, Stmt, TemplatePart, UnaryOp,
};
use crate::builtins::call_builtin;
use crate::config::{MAX_VALUE_DEPTH, SandboxConfig};
use crate::error::ScriptError;
use crate::hook::ScriptHttp;
use crate::value::{Key, Value};

/// Names that refer to the context store. They cannot be rebound.
const CONTEXT_NAMES: &[&str] = &["ctx", "context"];

fn is_context(name: &str) -> bool {
    CONTEXT_NAMES.contains(&name)
}

/// How a statement sequence finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Next,
    Return(Value),
}

/// Steps between two deadline checks.
const DEADLINE_CHECK_STEPS: u64 = 64;

/// Steps between two voluntary yields to the runtime.
const YIELD_STEPS: u64 = 4096;

/// Mutable state of one script run.
pub struct Scope<'a> {
    ctx: &'a mut ContextStore,
    locals: HashMap<String, Value>,
    consts: HashSet<String>,
    http: Option<Arc<dyn ScriptHttp>>,
    limits: SandboxConfig,
    deadline: Instant,
    steps: u64,
    next_yield: u64,
    /// Approximate bytes held by each local and each context entry this
    /// run has written.
    held_locals: HashMap<String, usize>,
    held_context: HashMap<String, usize>,
}

impl<'a> Scope<'a> {
    /// Start a run whose deadline is `limits.timeout_ms` from now.
    pub fn new(
        ctx: &'a mut ContextStore,
        http: Option<Arc<dyn ScriptHttp>>,
        limits: SandboxConfig,
    ) -> Self {
        Self {
            ctx,
            locals: HashMap::new(),
            consts: HashSet::new(),
            http,
            limits,
            deadline: Instant::now() + Duration::from_millis(limits.timeout_ms),
            steps: 0,
            next_yield: YIELD_STEPS,
            held_locals: HashMap::new(),
            held_context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    /// Count one evaluation step. Runs that are still stepping past their
    /// deadline fail with [`ScriptError::Timeout`], even when they never
    /// await.
    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps % DEADLINE_CHECK_STEPS == 0 && Instant::now() >= self.deadline {
            return Err(ScriptError::Timeout(self.limits.timeout_ms));
        }
        Ok(())
    }

    fn yield_due(&mut self) -> bool {
        if self.steps < self.next_yield {
            return false;
        }
        self.next_yield = self.steps + YIELD_STEPS;
        true
    }

    /// Approximate size of `value`, failing when it is a string, list or
    /// map over the size limits.
    fn measure(&self, value: &Value) -> Result<usize, ScriptError> {
        if let Value::String(s) = value
            && s.len() > self.limits.max_string_bytes
        {
            return Err(ScriptError::Fault(format!(
                "string of {} bytes exceeds limit of {} bytes",
                s.len(),
                self.limits.max_string_bytes
            )));
        }
        let bytes = value.footprint(MAX_VALUE_DEPTH).ok_or_else(|| {
            ScriptError::Fault(format!("value nests deeper than {MAX_VALUE_DEPTH} levels"))
        })?;
        if bytes > self.limits.max_value_bytes {
            return Err(ScriptError::Fault(format!(
                "value of about {bytes} bytes exceeds limit of {} bytes",
                self.limits.max_value_bytes
            )));
        }
        Ok(bytes)
    }

    fn check_value(&self, value: Value) -> Result<Value, ScriptError> {
        self.measure(&value)?;
        Ok(value)
    }

    /// Record what a local or context entry now holds. Everything the run
    /// has stored together stays under `max_value_bytes`.
    fn hold(&mut self, name: &str, in_context: bool, bytes: usize) -> Result<(), ScriptError> {
        let held = if in_context {
            &mut self.held_context
        } else {
            &mut self.held_locals
        };
        held.insert(name.to_owned(), bytes);
        let total: usize = self
            .held_locals
            .values()
            .chain(self.held_context.values())
            .sum();
        if total > self.limits.max_value_bytes {
            return Err(ScriptError::Fault(format!(
                "script holds about {total} bytes, limit is {} bytes",
                self.limits.max_value_bytes
            )));
        }
        Ok(())
    }

    /// Writing at `position` pads a list up to it; refuse positions whose
    /// padding alone would break the value limit.
    fn check_position(&self, position: usize) -> Result<(), ScriptError> {
        if position.saturating_mul(std::mem::size_of::<Value>()) > self.limits.max_value_bytes {
            return Err(ScriptError::Fault(format!(
                "index {position} exceeds the value size limit"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Execute statements in order until one returns.
pub fn exec_block<'a, 's: 'a>(
    stmts: &'a [Stmt],
    scope: &'a mut Scope<'s>,
) -> BoxFuture<'a, Result<Control, ScriptError>> {
    Box::pin(async move {
        for stmt in stmts {
            if scope.yield_due() {
                tokio::task::yield_now().await;
            }
            if let Control::Return(value) = exec_stmt(stmt, scope).await? {
                return Ok(Control::Return(value));
            }
        }
        Ok(Control::Next)
    })
}

async fn exec_stmt(stmt: &Stmt, scope: &mut Scope<'_>) -> Result<Control, ScriptError> {
    scope.tick()?;
    match stmt {
        Stmt::Let {
            name,
            value,
            constant,
        } => {
            if is_context(name) {
                return Err(ScriptError::Fault(format!("cannot rebind '{name}'")));
            }
            if scope.consts.contains(name) {
                return Err(ScriptError::Fault(format!(
                    "assignment to constant variable '{name}'"
                )));
            }
            let value = eval(value, scope).await?;
            let bytes = scope.measure(&value)?;
            scope.hold(name, false, bytes)?;
            scope.locals.insert(name.clone(), value);
            if *constant {
                scope.consts.insert(name.clone());
            }
            Ok(Control::Next)
        }

        Stmt::Assign { place, op, value } => {
            exec_assign(place, *op, value, scope).await?;
            Ok(Control::Next)
        }

        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            if eval(cond, scope).await?.is_truthy() {
                exec_block(then_branch, scope).await
            } else {
                exec_block(else_branch, scope).await
            }
        }

        Stmt::Return(value) => {
            let value = match value {
                Some(expr) => eval(expr, scope).await?,
                None => Value::Null,
            };
            Ok(Control::Return(value))
        }

        Stmt::Block(body) => exec_block(body, scope).await,

        Stmt::Expr(expr) => {
            eval(expr, scope).await?;
            Ok(Control::Next)
        }
    }
}

async fn exec_assign(
    place: &Place,
    op: AssignOp,
    value: &Expr,
    scope: &mut Scope<'_>,
) -> Result<(), ScriptError> {
    let mut keys = Vec::with_capacity(place.path.len());
    for segment in &place.path {
        keys.push(match segment {
            PathSegment::Field(name) => Key::Name(name.clone()),
            PathSegment::Index(expr) => eval(expr, scope).await?.to_key()?,
        });
    }
    for key in &keys {
        if let Key::Position(position) = key {
            scope.check_position(*position)?;
        }
    }
    let rhs = eval(value, scope).await?;

    if is_context(&place.root) {
        let Some((first, rest)) = keys.split_first() else {
            return Err(ScriptError::Fault(format!(
                "cannot assign to '{}' itself",
                place.root
            )));
        };
        let top_key = match first {
            Key::Name(name) => name.clone(),
            Key::Position(p) => p.to_string(),
        };
        let mut top = scope
            .ctx
            .get(&top_key)
            .cloned()
            .map_or(Value::Null, Value::from_json);
        let new_value = combine(op, top.get_path(rest), rhs, scope)?;
        top.set_path(rest, new_value)?;
        let bytes = scope.measure(&top)?;
        scope.hold(&top_key, true, bytes)?;
        scope.ctx.set(top_key, top.to_json());
        return Ok(());
    }

    if scope.consts.contains(&place.root) {
        return Err(ScriptError::Fault(format!(
            "assignment to constant variable '{}'",
            place.root
        )));
    }
    let Some(current) = scope.locals.get(&place.root) else {
        return Err(ScriptError::UndefinedVariable(place.root.clone()));
    };
    let new_value = combine(op, current.get_path(&keys), rhs, scope)?;
    if let Some(local) = scope.locals.get_mut(&place.root) {
        local.set_path(&keys, new_value)?;
    }
    if let Some(local) = scope.locals.get(&place.root) {
        let bytes = scope.measure(local)?;
        scope.hold(&place.root, false, bytes)?;
    }
    Ok(())
}

/// Apply a compound assignment operator to the old and new values.
fn combine(op: AssignOp, old: Value, rhs: Value, scope: &Scope<'_>) -> Result<Value, ScriptError> {
    match op.binary() {
        None => Ok(rhs),
        Some(binary) => apply_binary(binary, &old, &rhs, scope),
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Evaluate an expression.
pub fn eval<'a, 's: 'a>(
    expr: &'a Expr,
    scope: &'a mut Scope<'s>,
) -> BoxFuture<'a, Result<Value, ScriptError>> {
    Box::pin(async move {
        scope.tick()?;
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::String(s) => Ok(Value::String(s.clone())),

            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => {
                            out.push_str(&eval(expr, scope).await?.display_string());
                        }
                    }
                }
                scope.check_value(Value::String(out))
            }

            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(eval(item, scope).await?);
                }
                scope.check_value(Value::List(values))
            }

            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), eval(value, scope).await?);
                }
                scope.check_value(Value::Map(map))
            }

            Expr::Ident(name) => resolve_ident(name, scope),

            Expr::Field(base, name) => {
                if let Expr::Ident(root) = base.as_ref()
                    && is_context(root)
                {
                    return Ok(scope
                        .ctx
                        .get(name)
                        .cloned()
                        .map_or(Value::Null, Value::from_json));
                }
                eval(base, scope).await?.field(name)
            }

            Expr::Index(base, index) => {
                let base = eval(base, scope).await?;
                let index = eval(index, scope).await?;
                base.index(&index)
            }

            Expr::Unary(op, operand) => {
                let value = eval(operand, scope).await?;
                eval_unary(*op, &value)
            }

            Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, scope).await,

            Expr::Ternary(cond, then_branch, else_branch) => {
                if eval(cond, scope).await?.is_truthy() {
                    eval(then_branch, scope).await
                } else {
                    eval(else_branch, scope).await
                }
            }

            Expr::Call(name, args) => {
                let args = eval_args(args, scope).await?;
                scope.check_value(call_builtin(name, &args)?)
            }

            Expr::Invoke(capability, method, args) => {
                let args = eval_args(args, scope).await?;
                match capability {
                    Capability::Logger => invoke_logger(method, &args),
                    Capability::Http => invoke_http(method, args, scope).await,
                }
            }
        }
    })
}

async fn eval_args(args: &[Expr], scope: &mut Scope<'_>) -> Result<Vec<Value>, ScriptError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, scope).await?);
    }
    Ok(values)
}

/// Resolve a bare identifier: locals first, then the context store.
fn resolve_ident(name: &str, scope: &Scope<'_>) -> Result<Value, ScriptError> {
    if let Some(value) = scope.locals.get(name) {
        return Ok(value.clone());
    }
    if is_context(name) {
        return Ok(Value::from_json(scope.ctx.to_value()));
    }
    Err(ScriptError::UndefinedVariable(name.to_owned()))
}

fn eval_unary(op: UnaryOp, value: &Value) -> Result<Value, ScriptError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ScriptError::Fault("integer overflow".into())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(ScriptError::TypeError(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
    }
}

/// `&&` and `||` short-circuit and yield the deciding operand.
async fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    scope: &mut Scope<'_>,
) -> Result<Value, ScriptError> {
    match op {
        BinaryOp::And => {
            let left = eval(lhs, scope).await?;
            if left.is_truthy() {
                eval(rhs, scope).await
            } else {
                Ok(left)
            }
        }
        BinaryOp::Or => {
            let left = eval(lhs, scope).await?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, scope).await
            }
        }
        _ => {
            let left = eval(lhs, scope).await?;
            let right = eval(rhs, scope).await?;
            apply_binary(op, &left, &right, scope)
        }
    }
}

fn apply_binary(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    scope: &Scope<'_>,
) -> Result<Value, ScriptError> {
    match op {
        BinaryOp::Add => scope.check_value(eval_add(left, right)?),
        BinaryOp::Sub => eval_arithmetic(left, right, i64::checked_sub, |a, b| a - b, "-"),
        BinaryOp::Mul => eval_arithmetic(left, right, i64::checked_mul, |a, b| a * b, "*"),
        BinaryOp::Div => eval_div(left, right),
        BinaryOp::Mod => eval_mod(left, right),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt => eval_compare(left, right, std::cmp::Ordering::is_lt),
        BinaryOp::Le => eval_compare(left, right, std::cmp::Ordering::is_le),
        BinaryOp::Gt => eval_compare(left, right, std::cmp::Ordering::is_gt),
        BinaryOp::Ge => eval_compare(left, right, std::cmp::Ordering::is_ge),
        BinaryOp::And => Ok(if left.is_truthy() {
            right.clone()
        } else {
            left.clone()
        }),
        BinaryOp::Or => Ok(if left.is_truthy() {
            left.clone()
        } else {
            right.clone()
        }),
    }
}

/// Numbers add; a string on either side concatenates.
#[allow(clippy::cast_precision_loss)]
fn eval_add(left: &Value, right: &Value) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Fault("integer overflow".into())),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::String(a), b) => Ok(Value::String(format!("{a}{}", b.display_string()))),
        (a, Value::String(b)) => Ok(Value::String(format!("{}{b}", a.display_string()))),
        (Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (a, b) => Err(ScriptError::TypeError(format!(
            "cannot add {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn eval_arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    op_name: &str,
) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Fault("integer overflow".into())),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        (a, b) => Err(ScriptError::TypeError(format!(
            "cannot apply '{op_name}' to {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Division stays integral only when it is exact.
#[allow(clippy::cast_precision_loss)]
fn eval_div(left: &Value, right: &Value) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(_), Value::Int(0)) => Err(ScriptError::Fault("division by zero".into())),
        (Value::Int(a), Value::Int(b)) if a.checked_rem(*b) == Some(0) => Ok(Value::Int(a / b)),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Float(*a as f64 / *b as f64)),
        (Value::Float(_) | Value::Int(_), Value::Float(b)) if *b == 0.0 => {
            Err(ScriptError::Fault("division by zero".into()))
        }
        (Value::Float(_), Value::Int(0)) => Err(ScriptError::Fault("division by zero".into())),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
        (a, b) => Err(ScriptError::TypeError(format!(
            "cannot divide {} by {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn eval_mod(left: &Value, right: &Value) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(_), Value::Int(0)) => Err(ScriptError::Fault("modulo by zero".into())),
        (Value::Int(a), Value::Int(b)) => a
            .checked_rem(*b)
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Fault("integer overflow".into())),
        (a, b) => Err(ScriptError::TypeError(format!(
            "cannot compute {} % {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            (*a as f64 - b).abs() < f64::EPSILON
        }
        (Value::Float(a), Value::Float(b)) => (a - b).abs() < f64::EPSILON,
        _ => left == right,
    }
}

#[allow(clippy::cast_precision_loss)]
fn eval_compare(
    left: &Value,
    right: &Value,
    pred: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, ScriptError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(ScriptError::TypeError(format!(
                "cannot compare {} and {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    // NaN compares false against everything.
    Ok(Value::Bool(ordering.is_some_and(pred)))
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

fn invoke_logger(method: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let message = args
        .iter()
        .map(Value::display_string)
        .collect::<Vec<_>>()
        .join(" ");
    match method {
        "trace" | "debug" => debug!(target: "hopsim::script", "{message}"),
        "info" | "log" => info!(target: "hopsim::script", "{message}"),
        "warn" => warn!(target: "hopsim::script", "{message}"),
        "error" => error!(target: "hopsim::script", "{message}"),
        other => return Err(ScriptError::UndefinedFunction(format!("logger.{other}"))),
    }
    Ok(Value::Null)
}

async fn invoke_http(
    method: &str,
    mut args: Vec<Value>,
    scope: &Scope<'_>,
) -> Result<Value, ScriptError> {
    let Some(http) = scope.http.clone() else {
        return Err(ScriptError::Capability(
            "http is not available in this sandbox".into(),
        ));
    };

    let (verb, url, body) = match method {
        "get" | "delete" => {
            if args.len() != 1 {
                return Err(ScriptError::TypeError(format!(
                    "http.{method}() expects 1 argument(s), got {}",
                    args.len()
                )));
            }
            (method.to_uppercase(), args.remove(0), None)
        }
        "post" | "put" | "patch" => {
            if args.is_empty() || args.len() > 2 {
                return Err(ScriptError::TypeError(format!(
                    "http.{method}() expects 1 or 2 argument(s), got {}",
                    args.len()
                )));
            }
            let url = args.remove(0);
            (method.to_uppercase(), url, args.pop())
        }
        "request" => {
            if args.len() < 2 || args.len() > 3 {
                return Err(ScriptError::TypeError(format!(
                    "http.request() expects 2 or 3 argument(s), got {}",
                    args.len()
                )));
            }
            let verb = args.remove(0).display_string().to_uppercase();
            let url = args.remove(0);
            (verb, url, args.pop())
        }
        other => return Err(ScriptError::UndefinedFunction(format!("http.{other}"))),
    };

    let Value::String(url) = url else {
        return Err(ScriptError::TypeError(format!(
            "http.{method}() expects a string url, got {}",
            url.type_name()
        )));
    };

    let response = http
        .request(&verb, &url, body.map(|b| b.to_json()))
        .await?;
    scope.check_value(Value::from_json(response))
}
