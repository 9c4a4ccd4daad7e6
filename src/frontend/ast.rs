use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

/// Parsed form of a single `.ov` unit: its `use` declarations followed by
/// top-level items, in source order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitAst {
    pub uses: Vec<UseSpec>,
    pub items: Vec<Item>,
}

/// A `use` declaration. `leading_dots` counts the dots of a relative path
/// (`use .sibling`, `use ..cousin`); the rewriter absolutizes these, so an
/// executed unit only ever sees `leading_dots == 0`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UseSpec {
    pub leading_dots: usize,
    pub segments: Vec<String>,
    pub alias: Option<String>,
    pub span: Span,
}

impl UseSpec {
    pub fn path(&self) -> String {
        self.segments.join(".")
    }

    /// Name the resolved unit is bound under: the alias when present,
    /// otherwise the last path segment.
    pub fn binding_name(&self) -> &str {
        self.alias
            .as_deref()
            .unwrap_or_else(|| self.segments.last().map(String::as_str).unwrap_or(""))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Item {
    Function(Function),
    Binding(Binding),
    /// A top-level expression statement, run for its side effects when the
    /// unit executes.
    Expr(ExprItem),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExprItem {
    pub expr: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub init: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        name: String,
        init: Expr,
        span: Span,
    },
    Assign {
        name: String,
        value: Expr,
        span: Span,
    },
    Expr {
        expr: Expr,
        span: Span,
    },
    Return {
        expr: Option<Expr>,
        span: Span,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    For {
        name: String,
        iter: Expr,
        body: Block,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ExprKind {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Nil,
    Ident(String),
    List(Vec<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Field {
        base: Box<Expr>,
        name: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}
