use super::ast::*;
use super::diagnostic::Diagnostics;
use super::lexer::{Keyword, Symbol, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    pub diags: Diagnostics,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            idx: 0,
            diags: Diagnostics::default(),
        }
    }

    pub fn parse_unit(&mut self) -> Option<UnitAst> {
        self.consume_semis();
        let mut uses = Vec::new();
        while self.at_keyword(Keyword::Use) {
            if let Some(spec) = self.parse_use_spec() {
                uses.push(spec);
            }
            self.consume_semis();
        }
        let mut items = Vec::new();
        while !self.at_eof() {
            if self.at_symbol(Symbol::Semi) {
                self.bump();
                continue;
            }
            if self.at_keyword(Keyword::Use) {
                self.error_here("use declarations must precede items");
                self.parse_use_spec();
                self.consume_semis();
                continue;
            }
            if self.at_keyword(Keyword::Fn) {
                if let Some(func) = self.parse_function() {
                    items.push(Item::Function(func));
                }
                continue;
            }
            if self.at_keyword(Keyword::Let) {
                if let Some(binding) = self.parse_binding() {
                    items.push(Item::Binding(binding));
                }
                continue;
            }
            // Anything else is a top-level expression statement.
            if let Some(expr) = self.parse_expr() {
                let span = expr.span.clone();
                items.push(Item::Expr(ExprItem { expr, span }));
            } else {
                self.bump();
            }
        }
        if self.diags.is_empty() {
            Some(UnitAst { uses, items })
        } else {
            None
        }
    }

    fn parse_use_spec(&mut self) -> Option<UseSpec> {
        let start = self.bump().span; // `use`
        let mut leading_dots = 0;
        while self.at_symbol(Symbol::Dot) {
            self.bump();
            leading_dots += 1;
        }
        let mut segments = vec![self.expect_ident("unit path segment")?];
        while self.at_symbol(Symbol::Dot) {
            self.bump();
            segments.push(self.expect_ident("unit path segment")?);
        }
        let alias = if self.at_keyword(Keyword::As) {
            self.bump();
            Some(self.expect_ident("alias name")?)
        } else {
            None
        };
        Some(UseSpec {
            leading_dots,
            segments,
            alias,
            span: start,
        })
    }

    fn parse_function(&mut self) -> Option<Function> {
        let start = self.bump().span; // `fn`
        let name = self.expect_ident("function name")?;
        self.expect_symbol(Symbol::LParen)?;
        let mut params = Vec::new();
        if !self.at_symbol(Symbol::RParen) {
            loop {
                params.push(self.expect_ident("parameter name")?);
                if self.at_symbol(Symbol::Comma) {
                    self.bump();
                    if self.at_symbol(Symbol::RParen) {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        self.expect_symbol(Symbol::RParen)?;
        let body = self.parse_block()?;
        Some(Function {
            name,
            params,
            body,
            span: start,
        })
    }

    fn parse_binding(&mut self) -> Option<Binding> {
        let start = self.bump().span; // `let`
        let name = self.expect_ident("binding name")?;
        self.expect_symbol(Symbol::Eq)?;
        let init = self.parse_expr()?;
        Some(Binding {
            name,
            init,
            span: start,
        })
    }

    fn parse_block(&mut self) -> Option<Block> {
        let start = self.expect_symbol(Symbol::LBrace)?;
        let mut stmts = Vec::new();
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            } else {
                // Recover at the next statement boundary.
                while !self.at_symbol(Symbol::Semi)
                    && !self.at_symbol(Symbol::RBrace)
                    && !self.at_eof()
                {
                    self.bump();
                }
            }
            self.consume_semis();
        }
        self.expect_symbol(Symbol::RBrace)?;
        Some(Block { stmts, span: start })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        if self.at_keyword(Keyword::Let) {
            let span = self.bump().span;
            let name = self.expect_ident("binding name")?;
            self.expect_symbol(Symbol::Eq)?;
            let init = self.parse_expr()?;
            return Some(Stmt::Let { name, init, span });
        }
        if self.at_keyword(Keyword::Return) {
            let span = self.bump().span;
            let expr = if self.at_symbol(Symbol::Semi) || self.at_symbol(Symbol::RBrace) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            return Some(Stmt::Return { expr, span });
        }
        if self.at_keyword(Keyword::Break) {
            let span = self.bump().span;
            return Some(Stmt::Break { span });
        }
        if self.at_keyword(Keyword::Continue) {
            let span = self.bump().span;
            return Some(Stmt::Continue { span });
        }
        if self.at_keyword(Keyword::If) {
            return self.parse_if_stmt();
        }
        if self.at_keyword(Keyword::While) {
            let span = self.bump().span;
            let cond = self.parse_expr()?;
            let body = self.parse_block()?;
            return Some(Stmt::While { cond, body, span });
        }
        if self.at_keyword(Keyword::For) {
            let span = self.bump().span;
            let name = self.expect_ident("loop variable")?;
            if !self.at_keyword(Keyword::In) {
                self.error_here("expected `in` after loop variable");
                return None;
            }
            self.bump();
            let iter = self.parse_expr()?;
            let body = self.parse_block()?;
            return Some(Stmt::For {
                name,
                iter,
                body,
                span,
            });
        }
        // `name = expr` rebinds; anything else is an expression statement.
        if let TokenKind::Ident(name) = self.peek().kind.clone()
            && matches!(self.peek_nth(1).kind, TokenKind::Symbol(Symbol::Eq))
        {
            let span = self.bump().span; // ident
            self.bump(); // `=`
            let value = self.parse_expr()?;
            return Some(Stmt::Assign { name, value, span });
        }
        let expr = self.parse_expr()?;
        let span = expr.span.clone();
        Some(Stmt::Expr { expr, span })
    }

    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        let span = self.bump().span; // `if`
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let else_block = if self.at_keyword(Keyword::Else) {
            self.bump();
            if self.at_keyword(Keyword::If) {
                // `else if` desugars to an else block holding one if stmt.
                let nested = self.parse_if_stmt()?;
                let nested_span = match &nested {
                    Stmt::If { span, .. } => span.clone(),
                    _ => span.clone(),
                };
                Some(Block {
                    stmts: vec![nested],
                    span: nested_span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Some(Stmt::If {
            cond,
            then_block,
            else_block,
            span,
        })
    }

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.at_symbol(Symbol::OrOr) {
            let span = self.bump().span;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right, span);
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_equality()?;
        while self.at_symbol(Symbol::AndAnd) {
            let span = self.bump().span;
            let right = self.parse_equality()?;
            left = binary(BinaryOp::And, left, right, span);
        }
        Some(left)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.at_symbol(Symbol::EqEq) {
                BinaryOp::Eq
            } else if self.at_symbol(Symbol::NotEq) {
                BinaryOp::NotEq
            } else {
                break;
            };
            let span = self.bump().span;
            let right = self.parse_comparison()?;
            left = binary(op, left, right, span);
        }
        Some(left)
    }

    fn parse_comparison(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.at_symbol(Symbol::Lt) {
                BinaryOp::Lt
            } else if self.at_symbol(Symbol::Lte) {
                BinaryOp::Lte
            } else if self.at_symbol(Symbol::Gt) {
                BinaryOp::Gt
            } else if self.at_symbol(Symbol::Gte) {
                BinaryOp::Gte
            } else {
                break;
            };
            let span = self.bump().span;
            let right = self.parse_additive()?;
            left = binary(op, left, right, span);
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.at_symbol(Symbol::Plus) {
                BinaryOp::Add
            } else if self.at_symbol(Symbol::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let span = self.bump().span;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right, span);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.at_symbol(Symbol::Star) {
                BinaryOp::Mul
            } else if self.at_symbol(Symbol::Slash) {
                BinaryOp::Div
            } else if self.at_symbol(Symbol::Percent) {
                BinaryOp::Rem
            } else {
                break;
            };
            let span = self.bump().span;
            let right = self.parse_unary()?;
            left = binary(op, left, right, span);
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        if self.at_symbol(Symbol::Minus) {
            let span = self.bump().span;
            let expr = self.parse_unary()?;
            return Some(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                },
                span,
            });
        }
        if self.at_symbol(Symbol::Bang) {
            let span = self.bump().span;
            let expr = self.parse_unary()?;
            return Some(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at_symbol(Symbol::LParen) {
                let span = self.bump().span;
                let mut args = Vec::new();
                if !self.at_symbol(Symbol::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.at_symbol(Symbol::Comma) {
                            self.bump();
                            if self.at_symbol(Symbol::RParen) {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
                self.expect_symbol(Symbol::RParen)?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                };
                continue;
            }
            if self.at_symbol(Symbol::Dot) {
                let span = self.bump().span;
                let name = self.expect_ident("member name")?;
                expr = Expr {
                    kind: ExprKind::Field {
                        base: Box::new(expr),
                        name,
                    },
                    span,
                };
                continue;
            }
            if self.at_symbol(Symbol::LBracket) {
                let span = self.bump().span;
                let index = self.parse_expr()?;
                self.expect_symbol(Symbol::RBracket)?;
                expr = Expr {
                    kind: ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                };
                continue;
            }
            break;
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLit(text) => {
                self.bump();
                let value = match text.parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => {
                        self.diags
                            .push(format!("integer literal out of range: {}", text), Some(tok.span.clone()));
                        0
                    }
                };
                Some(Expr {
                    kind: ExprKind::Int(value),
                    span: tok.span,
                })
            }
            TokenKind::FloatLit(text) => {
                self.bump();
                let value = match text.parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => {
                        self.diags
                            .push(format!("malformed float literal: {}", text), Some(tok.span.clone()));
                        0.0
                    }
                };
                Some(Expr {
                    kind: ExprKind::Float(value),
                    span: tok.span,
                })
            }
            TokenKind::StringLit(text) => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Str(text),
                    span: tok.span,
                })
            }
            TokenKind::Ident(name) => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Ident(name),
                    span: tok.span,
                })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Bool(true),
                    span: tok.span,
                })
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Bool(false),
                    span: tok.span,
                })
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Nil,
                    span: tok.span,
                })
            }
            TokenKind::Symbol(Symbol::LParen) => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect_symbol(Symbol::RParen)?;
                Some(expr)
            }
            TokenKind::Symbol(Symbol::LBracket) => {
                let span = self.bump().span;
                let mut elems = Vec::new();
                self.consume_semis();
                if !self.at_symbol(Symbol::RBracket) {
                    loop {
                        elems.push(self.parse_expr()?);
                        self.consume_semis();
                        if self.at_symbol(Symbol::Comma) {
                            self.bump();
                            self.consume_semis();
                            if self.at_symbol(Symbol::RBracket) {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
                self.expect_symbol(Symbol::RBracket)?;
                Some(Expr {
                    kind: ExprKind::List(elems),
                    span,
                })
            }
            _ => {
                self.error_here("expected an expression");
                None
            }
        }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.idx)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends with EOF"))
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens
            .get(self.idx + n)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends with EOF"))
    }

    fn peek_span(&self) -> Option<Span> {
        Some(self.peek().span.clone())
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(k) if *k == kw)
    }

    fn at_symbol(&self, sym: Symbol) -> bool {
        matches!(&self.peek().kind, TokenKind::Symbol(s) if *s == sym)
    }

    fn consume_semis(&mut self) {
        while self.at_symbol(Symbol::Semi) {
            self.bump();
        }
    }

    fn expect_symbol(&mut self, sym: Symbol) -> Option<Span> {
        if self.at_symbol(sym) {
            return Some(self.bump().span);
        }
        self.error_here(format!("expected {:?}", sym));
        None
    }

    fn expect_ident(&mut self, what: &str) -> Option<String> {
        if let TokenKind::Ident(name) = self.peek().kind.clone() {
            self.bump();
            return Some(name);
        }
        self.error_here(format!("expected {}", what));
        None
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let span = self.peek_span();
        self.diags.push(message, span);
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, span: Span) -> Expr {
    Expr {
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}
