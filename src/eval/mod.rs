// Purpose: Tree-walking evaluator executing unit items into shared namespaces.
// Inputs/Outputs: Runs parsed units/functions against a namespace, producing values.
// Invariants: Free names resolve at call time (locals, then namespace, then intrinsics),
//             so later bindings shadow earlier ones for all existing functions.
// Gotchas: Function values capture the namespace object, never a snapshot of it.

pub mod intrinsics;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::EvalError;
use crate::frontend::ast::{
    BinaryOp, Block, Expr, ExprKind, Item, Span, Stmt, UnaryOp, UnitAst,
};
use value::{FuncValue, Namespace, Value};

const MAX_CALL_DEPTH: usize = 200;

pub struct Interp<'e> {
    pub engine: &'e Engine,
}

pub(crate) struct Scope<'a> {
    pub globals: &'a Arc<Namespace>,
    pub locals: Vec<HashMap<String, Value>>,
    pub unit: &'a str,
    pub depth: usize,
}

impl<'a> Scope<'a> {
    fn top(globals: &'a Arc<Namespace>, unit: &'a str) -> Self {
        Self {
            globals,
            locals: Vec::new(),
            unit,
            depth: 0,
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        for frame in self.locals.iter().rev() {
            if let Some(v) = frame.get(name) {
                return Some(v.clone());
            }
        }
        self.globals.get(name)
    }

    fn declare(&mut self, name: &str, value: Value) {
        match self.locals.last_mut() {
            Some(frame) => {
                frame.insert(name.to_string(), value);
            }
            None => self.globals.set(name, value),
        }
    }

    /// Rebinds an existing name; locals win over the unit namespace.
    fn assign(&mut self, name: &str, value: Value) -> bool {
        for frame in self.locals.iter_mut().rev() {
            if frame.contains_key(name) {
                frame.insert(name.to_string(), value);
                return true;
            }
        }
        if self.globals.contains(name) {
            self.globals.set(name, value);
            return true;
        }
        false
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

impl<'e> Interp<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Executes a transformed unit into `ns`: resolves its `use` bindings,
    /// then binds items in source order. Function bodies are not run here;
    /// they close over `ns` and resolve names when called.
    pub fn exec_unit(
        &self,
        ast: &UnitAst,
        ns: &Arc<Namespace>,
        unit_name: &str,
    ) -> Result<(), EvalError> {
        for spec in &ast.uses {
            if spec.leading_dots != 0 {
                return Err(EvalError::at(
                    "relative use reached execution unrewritten",
                    &spec.span,
                ));
            }
            let path = spec.path();
            let unit = self
                .engine
                .use_unit(&path)
                .map_err(|e| EvalError::at(e.to_string(), &spec.span))?;
            ns.set(spec.binding_name(), unit);
        }
        for item in &ast.items {
            match item {
                Item::Function(f) => {
                    ns.set(
                        &f.name,
                        Value::Func(Arc::new(FuncValue {
                            name: f.name.clone(),
                            params: f.params.clone(),
                            body: f.body.clone(),
                            globals: ns.clone(),
                            unit: unit_name.to_string(),
                        })),
                    );
                }
                Item::Binding(b) => {
                    let mut scope = Scope::top(ns, unit_name);
                    let v = self.eval_expr(&b.init, &mut scope)?;
                    ns.set(&b.name, v);
                }
                Item::Expr(e) => {
                    let mut scope = Scope::top(ns, unit_name);
                    self.eval_expr(&e.expr, &mut scope)?;
                }
            }
        }
        Ok(())
    }

    pub fn call_value(
        &self,
        callee: &Value,
        args: Vec<Value>,
        span: &Span,
        depth: usize,
    ) -> Result<Value, EvalError> {
        match callee {
            Value::Func(f) => self.call_func(f, args, span, depth),
            other => Err(EvalError::at(
                format!("value of type {} is not callable", other.type_name()),
                span,
            )),
        }
    }

    fn call_func(
        &self,
        f: &FuncValue,
        args: Vec<Value>,
        span: &Span,
        depth: usize,
    ) -> Result<Value, EvalError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(EvalError::at(
                format!("call depth limit reached while calling {}", f.name),
                span,
            ));
        }
        if args.len() != f.params.len() {
            return Err(EvalError::at(
                format!(
                    "fn {} expects {} argument(s), got {}",
                    f.name,
                    f.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        let mut frame = HashMap::new();
        for (param, arg) in f.params.iter().zip(args) {
            frame.insert(param.clone(), arg);
        }
        let mut scope = Scope {
            globals: &f.globals,
            locals: vec![frame],
            unit: &f.unit,
            depth: depth + 1,
        };
        match self.exec_block(&f.body, &mut scope)? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::Nil),
            Flow::Break | Flow::Continue => Err(EvalError::at(
                format!("break or continue outside of a loop in fn {}", f.name),
                &f.body.span,
            )),
        }
    }

    fn exec_block(&self, block: &Block, scope: &mut Scope) -> Result<Flow, EvalError> {
        scope.locals.push(HashMap::new());
        let result = self.exec_stmts(&block.stmts, scope);
        scope.locals.pop();
        result
    }

    fn exec_stmts(&self, stmts: &[Stmt], scope: &mut Scope) -> Result<Flow, EvalError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, scope: &mut Scope) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Let { name, init, .. } => {
                let v = self.eval_expr(init, scope)?;
                scope.declare(name, v);
                Ok(Flow::Normal)
            }
            Stmt::Assign { name, value, span } => {
                let v = self.eval_expr(value, scope)?;
                if !scope.assign(name, v) {
                    return Err(EvalError::at(
                        format!("assignment to undefined name {}", name),
                        span,
                    ));
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr { expr, .. } => {
                self.eval_expr(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Return { expr, .. } => {
                let v = match expr {
                    Some(e) => self.eval_expr(e, scope)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(v))
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => {
                if self.eval_cond(cond, scope, span)? {
                    self.exec_block(then_block, scope)
                } else if let Some(block) = else_block {
                    self.exec_block(block, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body, span } => {
                while self.eval_cond(cond, scope, span)? {
                    match self.exec_block(body, scope)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                name,
                iter,
                body,
                span,
            } => {
                let items = match self.eval_expr(iter, scope)? {
                    Value::List(items) => items,
                    other => {
                        return Err(EvalError::at(
                            format!("for expects a list, got {}", other.type_name()),
                            span,
                        ));
                    }
                };
                for item in items.iter() {
                    let mut frame = HashMap::new();
                    frame.insert(name.clone(), item.clone());
                    scope.locals.push(frame);
                    let flow = self.exec_block(body, scope);
                    scope.locals.pop();
                    match flow? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
        }
    }

    fn eval_cond(&self, cond: &Expr, scope: &mut Scope, span: &Span) -> Result<bool, EvalError> {
        match self.eval_expr(cond, scope)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::at(
                format!("condition must be bool, got {}", other.type_name()),
                span,
            )),
        }
    }

    pub(crate) fn eval_expr(&self, expr: &Expr, scope: &mut Scope) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(v) => Ok(Value::Int(*v)),
            ExprKind::Float(v) => Ok(Value::Float(*v)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::Ident(name) => scope.lookup(name).ok_or_else(|| {
                EvalError::at(format!("undefined name {}", name), &expr.span)
            }),
            ExprKind::List(elems) => {
                let mut values = Vec::with_capacity(elems.len());
                for e in elems {
                    values.push(self.eval_expr(e, scope)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval_expr(a, scope)?);
                }
                if let ExprKind::Ident(name) = &callee.kind {
                    if let Some(v) = scope.lookup(name) {
                        return self.call_value(&v, values, &expr.span, scope.depth);
                    }
                    if intrinsics::is_intrinsic(name) {
                        return intrinsics::call(self, scope, name, values, &expr.span);
                    }
                    return Err(EvalError::at(
                        format!("undefined name {}", name),
                        &callee.span,
                    ));
                }
                let callee_value = self.eval_expr(callee, scope)?;
                self.call_value(&callee_value, values, &expr.span, scope.depth)
            }
            ExprKind::Field { base, name } => {
                let base_value = self.eval_expr(base, scope)?;
                match base_value {
                    Value::Unit(unit) => {
                        crate::mount::resolve::unit_attr(self.engine, &unit, name, &expr.span)
                    }
                    other => Err(EvalError::at(
                        format!("type {} has no members", other.type_name()),
                        &expr.span,
                    )),
                }
            }
            ExprKind::Index { base, index } => {
                let base_value = self.eval_expr(base, scope)?;
                let index_value = self.eval_expr(index, scope)?;
                let Value::Int(i) = index_value else {
                    return Err(EvalError::at(
                        format!("index must be int, got {}", index_value.type_name()),
                        &expr.span,
                    ));
                };
                match base_value {
                    Value::List(items) => {
                        if i < 0 || i as usize >= items.len() {
                            return Err(EvalError::at(
                                format!("index {} out of bounds (len {})", i, items.len()),
                                &expr.span,
                            ));
                        }
                        Ok(items[i as usize].clone())
                    }
                    other => Err(EvalError::at(
                        format!("type {} is not indexable", other.type_name()),
                        &expr.span,
                    )),
                }
            }
            ExprKind::Unary { op, expr: inner } => {
                let v = self.eval_expr(inner, scope)?;
                match (op, v) {
                    (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(-v)),
                    (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (op, v) => Err(EvalError::at(
                        format!("{:?} is not defined for {}", op, v.type_name()),
                        &expr.span,
                    )),
                }
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, scope, &expr.span),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &mut Scope,
        span: &Span,
    ) -> Result<Value, EvalError> {
        // && and || short-circuit on the left operand.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let l = self.eval_expr(left, scope)?;
            let Value::Bool(l) = l else {
                return Err(EvalError::at(
                    format!("{:?} expects bool operands, got {}", op, l.type_name()),
                    span,
                ));
            };
            if (op == BinaryOp::And && !l) || (op == BinaryOp::Or && l) {
                return Ok(Value::Bool(l));
            }
            let r = self.eval_expr(right, scope)?;
            let Value::Bool(r) = r else {
                return Err(EvalError::at(
                    format!("{:?} expects bool operands, got {}", op, r.type_name()),
                    span,
                ));
            };
            return Ok(Value::Bool(r));
        }

        let l = self.eval_expr(left, scope)?;
        let r = self.eval_expr(right, scope)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(l == r)),
            BinaryOp::NotEq => Ok(Value::Bool(l != r)),
            BinaryOp::Add => match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
                (Value::List(a), Value::List(b)) => {
                    let mut out = a.as_ref().clone();
                    out.extend(b.iter().cloned());
                    Ok(Value::list(out))
                }
                _ => self.numeric(op, &l, &r, span),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
                    return match op {
                        BinaryOp::Sub => Ok(Value::Int(a - b)),
                        BinaryOp::Mul => Ok(Value::Int(a * b)),
                        BinaryOp::Div => {
                            if *b == 0 {
                                Err(EvalError::at("division by zero", span))
                            } else {
                                Ok(Value::Int(a / b))
                            }
                        }
                        BinaryOp::Rem => {
                            if *b == 0 {
                                Err(EvalError::at("division by zero", span))
                            } else {
                                Ok(Value::Int(a % b))
                            }
                        }
                        _ => unreachable!(),
                    };
                }
                self.numeric(op, &l, &r, span)
            }
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                let ordering = match (&l, &r) {
                    (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                    _ => self.as_float(&l).zip(self.as_float(&r)).and_then(|(a, b)| a.partial_cmp(&b)),
                };
                let Some(ordering) = ordering else {
                    return Err(EvalError::at(
                        format!(
                            "{:?} is not defined for {} and {}",
                            op,
                            l.type_name(),
                            r.type_name()
                        ),
                        span,
                    ));
                };
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Lte => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Gte => ordering.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn numeric(
        &self,
        op: BinaryOp,
        l: &Value,
        r: &Value,
        span: &Span,
    ) -> Result<Value, EvalError> {
        let (Some(a), Some(b)) = (self.as_float(l), self.as_float(r)) else {
            return Err(EvalError::at(
                format!(
                    "{:?} is not defined for {} and {}",
                    op,
                    l.type_name(),
                    r.type_name()
                ),
                span,
            ));
        };
        let v = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => {
                if b == 0.0 {
                    return Err(EvalError::at("division by zero", span));
                }
                a / b
            }
            BinaryOp::Rem => {
                if b == 0.0 {
                    return Err(EvalError::at("division by zero", span));
                }
                a % b
            }
            _ => unreachable!(),
        };
        Ok(Value::Float(v))
    }

    fn as_float(&self, v: &Value) -> Option<f64> {
        match v {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use std::path::PathBuf;

    fn exec(src: &str) -> Arc<Namespace> {
        let engine = Engine::new(Vec::<PathBuf>::new());
        let ast = Parser::new(Lexer::new(src).lex_all())
            .parse_unit()
            .expect("fixture should parse");
        let ns = Arc::new(Namespace::new());
        Interp::new(&engine)
            .exec_unit(&ast, &ns, "test_unit")
            .expect("fixture should execute");
        ns
    }

    fn call(ns: &Arc<Namespace>, name: &str, args: Vec<Value>) -> Value {
        let engine = Engine::new(Vec::<PathBuf>::new());
        let func = ns.get(name).expect("function should be bound");
        Interp::new(&engine)
            .call_value(
                &func,
                args,
                &Span {
                    start: 0,
                    end: 0,
                    line: 1,
                    column: 1,
                },
                0,
            )
            .expect("call should succeed")
    }

    #[test]
    fn binds_items_in_order() {
        let ns = exec("let A = 1\nlet B = A + 1\n");
        assert_eq!(ns.get("B"), Some(Value::Int(2)));
    }

    #[test]
    fn arithmetic_and_strings() {
        let ns = exec(
            "let I = 7 / 2\nlet R = 7 % 2\nlet F = 1 + 0.5\nlet S = \"a\" + \"b\"\nlet L = [1] + [2]\n",
        );
        assert_eq!(ns.get("I"), Some(Value::Int(3)));
        assert_eq!(ns.get("R"), Some(Value::Int(1)));
        assert_eq!(ns.get("F"), Some(Value::Float(1.5)));
        assert_eq!(ns.get("S"), Some(Value::Str("ab".to_string())));
        assert_eq!(
            ns.get("L"),
            Some(Value::list(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn control_flow_loops_and_indexing() {
        let ns = exec(
            "fn total(xs) {\n  let sum = 0\n  for x in xs {\n    if x % 2 == 0 {\n      continue\n    }\n    sum = sum + x\n  }\n  let i = 0\n  while true {\n    if i >= 2 {\n      break\n    }\n    i = i + 1\n  }\n  return sum + i + xs[0]\n}\n",
        );
        let out = call(
            &ns,
            "total",
            vec![Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])],
        );
        // odd sum 4 + while count 2 + first element 1
        assert_eq!(out, Value::Int(7));
    }

    #[test]
    fn functions_resolve_free_names_at_call_time() {
        let ns = exec("fn greet() { return WORD }\nlet WORD = \"hi\"\n");
        assert_eq!(call(&ns, "greet", vec![]), Value::Str("hi".to_string()));

        // Rebinding after definition is visible to the existing function.
        ns.set("WORD", Value::Str("hello".to_string()));
        assert_eq!(call(&ns, "greet", vec![]), Value::Str("hello".to_string()));
    }

    #[test]
    fn later_function_definitions_shadow_earlier_ones() {
        let ns = exec("fn inner() { return 1 }\nfn outer() { return inner() }\n");
        assert_eq!(call(&ns, "outer", vec![]), Value::Int(1));

        // Simulate an override executing into the same namespace.
        let src = "fn inner() { return 2 }\n";
        let engine = Engine::new(Vec::<PathBuf>::new());
        let ast = Parser::new(Lexer::new(src).lex_all())
            .parse_unit()
            .expect("override should parse");
        Interp::new(&engine)
            .exec_unit(&ast, &ns, "test_unit")
            .expect("override should execute");
        assert_eq!(call(&ns, "outer", vec![]), Value::Int(2));
    }

    #[test]
    fn runtime_errors_carry_spans() {
        let engine = Engine::new(Vec::<PathBuf>::new());
        let ast = Parser::new(Lexer::new("let X = missing + 1\n").lex_all())
            .parse_unit()
            .expect("fixture should parse");
        let ns = Arc::new(Namespace::new());
        let err = Interp::new(&engine)
            .exec_unit(&ast, &ns, "test_unit")
            .expect_err("undefined name");
        assert!(err.message.contains("undefined name missing"));
        assert!(err.span.is_some());
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let ns = exec("fn spin() { return spin() }\n");
        let engine = Engine::new(Vec::<PathBuf>::new());
        let func = ns.get("spin").expect("function should be bound");
        let err = Interp::new(&engine)
            .call_value(
                &func,
                vec![],
                &Span {
                    start: 0,
                    end: 0,
                    line: 1,
                    column: 1,
                },
                0,
            )
            .expect_err("must hit the depth limit");
        assert!(err.message.contains("call depth limit"));
    }
}
