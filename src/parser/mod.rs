//! The operator-expression compiler: turns a flow's textual `flow_content`
//! into a tree of live operations.
//!
//! The original language embeds this as operator overloading evaluated by
//! the host interpreter over a sandboxed name table. Rust doesn't offer
//! dynamic evaluation, so the same grammar is parsed explicitly: each
//! non-blank line but the last is a statement (a plain assignment or an
//! attach-assignment), and the last non-blank line is the expression whose
//! value becomes the flow's root operation. `>>`/`<<` share the binding
//! strength of Python's shift operators, `|` binds looser, matching the
//! original's effective precedence when both are used unparenthesized.

mod lexer;

use std::collections::HashMap;

use lexer::{Token, TokenKind};

use crate::config::OpConfig;
use crate::error::{ExpressionError, ParseError};
use crate::op::{self, Op};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Ref(String),
    Seq(Box<Expr>, Box<Expr>),
    Par(Box<Expr>, Box<Expr>),
    Attach(Box<Expr>, Box<Expr>),
}

enum Statement {
    Assign { target: String, value: Expr },
    AttachAssign { target: String, value: Expr },
}

struct LineParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> LineParser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                ..
            }) => Ok(name.clone()),
            Some(token) => Err(ParseError::UnexpectedToken(token.kind.describe(), token.pos)),
            None => Err(ParseError::ExpectedPrimary(self.eof_pos())),
        }
    }

    fn eof_pos(&self) -> usize {
        self.tokens.last().map(|t| t.pos + 1).unwrap_or(0)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                ..
            }) => Ok(Expr::Ref(name.clone())),
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                let inner = self.or_expr()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(token) => Err(ParseError::UnexpectedToken(token.kind.describe(), token.pos)),
                    None => Err(ParseError::ExpectedCloseParen(self.eof_pos())),
                }
            }
            Some(token) => Err(ParseError::UnexpectedToken(token.kind.describe(), token.pos)),
            None => Err(ParseError::ExpectedPrimary(self.eof_pos())),
        }
    }

    fn shift_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.primary()?;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Sequential) => {
                    self.advance();
                    let right = self.primary()?;
                    left = Expr::Seq(Box::new(left), Box::new(right));
                }
                Some(TokenKind::Attach) => {
                    self.advance();
                    let right = self.primary()?;
                    left = Expr::Attach(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.shift_expr()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Parallel)) {
            self.advance();
            let right = self.shift_expr()?;
            left = Expr::Par(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        match self.advance() {
            None => Ok(()),
            Some(token) => Err(ParseError::UnexpectedToken(token.kind.describe(), token.pos)),
        }
    }

    /// Parse a whole line as either `target = expr`, `target.path... =
    /// expr` (an attach-assignment), or a bare expression.
    fn statement_or_expr(&mut self) -> Result<Result<Statement, Expr>, ParseError> {
        let checkpoint = self.pos;
        if let Some(Token {
            kind: TokenKind::Identifier(target),
            ..
        }) = self.peek().cloned()
        {
            self.advance();
            let mut attach_form = false;
            while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Dot)) {
                attach_form = true;
                self.advance();
                self.expect_identifier()?;
            }
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Assign)) {
                self.advance();
                let value = self.or_expr()?;
                self.finish()?;
                return Ok(Ok(if attach_form {
                    Statement::AttachAssign { target, value }
                } else {
                    Statement::Assign { target, value }
                }));
            }
        }
        self.pos = checkpoint;
        let expr = self.or_expr()?;
        self.finish()?;
        Ok(Err(expr))
    }
}

fn resolve_ref(
    name: &str,
    env: &mut HashMap<String, Box<dyn Op>>,
    registry: &Registry<Box<dyn Op>>,
    op_configs: &HashMap<String, OpConfig>,
) -> Result<Box<dyn Op>, ExpressionError> {
    if let Some(op) = env.remove(name) {
        return Ok(op);
    }
    if !registry.contains(name) {
        return Err(ExpressionError::UnknownOperation(name.to_string()));
    }
    let op_config = op_configs.get(name).cloned().unwrap_or_default();
    let backend = if op_config.backend.is_empty() {
        name.to_string()
    } else {
        op_config.backend.clone()
    };
    let mut instance = registry.build(&backend, &op_config.params)?;
    {
        let base = instance.base_mut();
        base.retry.max_retries = op_config.max_retries;
        base.retry.raise_on_exhaust = op_config.raise_exception;
    }
    Ok(instance)
}

fn eval(
    expr: &Expr,
    env: &mut HashMap<String, Box<dyn Op>>,
    registry: &Registry<Box<dyn Op>>,
    op_configs: &HashMap<String, OpConfig>,
) -> Result<Box<dyn Op>, ExpressionError> {
    match expr {
        Expr::Ref(name) => resolve_ref(name, env, registry, op_configs),
        Expr::Seq(left, right) => {
            let left = eval(left, env, registry, op_configs)?;
            let right = eval(right, env, registry, op_configs)?;
            Ok(op::sequential(left, right)?)
        }
        Expr::Par(left, right) => {
            let left = eval(left, env, registry, op_configs)?;
            let right = eval(right, env, registry, op_configs)?;
            Ok(op::parallel(left, right)?)
        }
        Expr::Attach(left, right) => {
            let mut left = eval(left, env, registry, op_configs)?;
            let right = eval(right, env, registry, op_configs)?;
            left.attach(right)?;
            Ok(left)
        }
    }
}

/// Compile `content` (a flow's multi-line operator-expression source) into
/// a live root operation, instantiating each referenced name through
/// `registry` using its per-op configuration from `op_configs`.
pub fn compile(
    content: &str,
    registry: &Registry<Box<dyn Op>>,
    op_configs: &HashMap<String, OpConfig>,
) -> Result<Box<dyn Op>, ExpressionError> {
    let lines: Vec<&str> = content.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return Err(ParseError::Empty.into());
    }

    let mut env: HashMap<String, Box<dyn Op>> = HashMap::new();
    let (statements, final_line) = lines.split_at(lines.len() - 1);

    for line in statements {
        let tokens = lexer::tokenize(line)?;
        let mut parser = LineParser::new(&tokens);
        match parser.statement_or_expr()? {
            Ok(Statement::Assign { target, value }) => {
                let built = eval(&value, &mut env, registry, op_configs)?;
                env.insert(target, built);
            }
            Ok(Statement::AttachAssign { target, value }) => {
                let mut base = resolve_ref(&target, &mut env, registry, op_configs)?;
                let child = eval(&value, &mut env, registry, op_configs)?;
                base.attach(child)?;
                env.insert(target, base);
            }
            Err(_) => return Err(ParseError::ExpectedAssignmentValue(line.to_string()).into()),
        }
    }

    let tokens = lexer::tokenize(final_line[0])?;
    let mut parser = LineParser::new(&tokens);
    let expr = match parser.statement_or_expr()? {
        Err(expr) => expr,
        Ok(_) => return Err(ParseError::MissingFinalExpression.into()),
    };

    eval(&expr, &mut env, registry, op_configs)
}
