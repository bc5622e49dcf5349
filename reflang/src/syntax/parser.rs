//! Hand-written recursive-descent parsers for the DSL surfaces of the
//! external interface: grammar rule sets, type annotations, refinement
//! predicates, and path selectors.

use logos::Logos;
use thiserror::Error;

use crate::path::{PathSelector, Step};
use crate::span::Span;

use super::lexer::Token;
use super::{Clause, ClauseKind, Expr, ExprKind, Rule, TypeExpr, TypeExprKind};

/// A parse failure, tied to the offending source location.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("syntax error: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

type Result<T> = std::result::Result<T, SyntaxError>;

/// Parse a grammar rule set: `name ':' clause ';'` repeated at least once.
pub fn parse_rules(src: &str) -> Result<Vec<Rule>> {
    let mut parser = Parser::new(src)?;
    let mut rules = vec![parser.rule()?];
    while !parser.at_end() {
        rules.push(parser.rule()?);
    }
    Ok(rules)
}

/// Parse a type annotation.
pub fn parse_type(src: &str) -> Result<TypeExpr> {
    let mut parser = Parser::new(src)?;
    let ty = parser.type_expr()?;
    parser.expect_end()?;
    Ok(ty)
}

/// Parse a predicate expression.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let mut parser = Parser::new(src)?;
    let expr = parser.expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a path selector, e.g. `..part`, `.field[2].value`, `item..key`.
pub fn parse_path(src: &str) -> Result<PathSelector> {
    let mut parser = Parser::new(src)?;
    let path = parser.path()?;
    parser.expect_end()?;
    Ok(path)
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    eof: Span,
}

impl Parser {
    fn new(src: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut lexer = Token::lexer(src);
        while let Some(token) = lexer.next() {
            let span = Span::new(lexer.span().start, lexer.span().end);
            match token {
                Ok(token) => tokens.push((token, span)),
                Err(()) => return Err(SyntaxError::new("unrecognized token", span)),
            }
        }
        let eof = Span::new(src.len(), src.len());
        Ok(Self {
            tokens,
            pos: 0,
            eof,
        })
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn here(&self) -> Span {
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or(self.eof)
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.wrapping_sub(1))
            .map(|(_, s)| *s)
            .unwrap_or(self.eof)
    }

    fn advance(&mut self) -> Option<(Token, Span)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<Span> {
        match self.advance() {
            Some((found, span)) if found == token => Ok(span),
            Some((found, span)) => Err(SyntaxError::new(
                format!("expected {token}, found {found}"),
                span,
            )),
            None => Err(SyntaxError::new(
                format!("expected {token}, found end of input"),
                self.eof,
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        match self.advance() {
            Some((Token::Ident(name), span)) => Ok((name, span)),
            Some((found, span)) => Err(SyntaxError::new(
                format!("expected identifier, found {found}"),
                span,
            )),
            None => Err(SyntaxError::new(
                "expected identifier, found end of input",
                self.eof,
            )),
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(found) => Err(SyntaxError::new(
                format!("expected end of input, found {found}"),
                self.here(),
            )),
        }
    }

    // --- Grammar rules ---

    fn rule(&mut self) -> Result<Rule> {
        let (name, name_span) = self.expect_ident()?;
        self.expect(Token::Colon)?;
        let body = self.clause()?;
        let end = self.expect(Token::Semi)?;
        Ok(Rule {
            name,
            name_span,
            body,
            span: name_span.to(end),
        })
    }

    /// `alt := seq ('|' seq)*`
    fn clause(&mut self) -> Result<Clause> {
        let first = self.concatenation()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut clauses = vec![first];
        while self.eat(&Token::Pipe) {
            clauses.push(self.concatenation()?);
        }
        let span = clauses[0].span.to(clauses.last().unwrap().span);
        Ok(Clause::new(ClauseKind::Alt(clauses), span))
    }

    /// `seq := rep+`
    fn concatenation(&mut self) -> Result<Clause> {
        let first = self.repetition()?;
        let mut clauses = vec![first];
        while self.at_atom_start() {
            clauses.push(self.repetition()?);
        }
        if clauses.len() == 1 {
            Ok(clauses.pop().unwrap())
        } else {
            let span = clauses[0].span.to(clauses.last().unwrap().span);
            Ok(Clause::new(ClauseKind::Seq(clauses), span))
        }
    }

    fn at_atom_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Str(_)
                    | Token::CharSet(_)
                    | Token::CharCode(_)
                    | Token::Ident(_)
                    | Token::LParen
            )
        )
    }

    /// `rep := atom ('*' | '+' | '?' | '{' n '}' | '{' n? ',' n? '}')?`
    fn repetition(&mut self) -> Result<Clause> {
        let atom = self.clause_atom()?;
        let (lower, upper) = match self.peek() {
            Some(Token::Star) => {
                self.advance();
                (0, None)
            }
            Some(Token::Plus) => {
                self.advance();
                (1, None)
            }
            Some(Token::Question) => {
                self.advance();
                (0, Some(1))
            }
            Some(Token::LBrace) => {
                self.advance();
                let bounds = self.rep_bounds()?;
                self.expect(Token::RBrace)?;
                bounds
            }
            _ => return Ok(atom),
        };
        let span = atom.span.to(self.prev_span());
        Ok(Clause::new(
            ClauseKind::Rep {
                inner: Box::new(atom),
                lower,
                upper,
            },
            span,
        ))
    }

    fn rep_bounds(&mut self) -> Result<(u32, Option<u32>)> {
        let lower = match self.peek() {
            Some(&Token::Int(n)) => {
                self.advance();
                Some(self.as_bound(n)?)
            }
            _ => None,
        };
        if self.eat(&Token::Comma) {
            let upper = match self.peek() {
                Some(&Token::Int(n)) => {
                    self.advance();
                    Some(self.as_bound(n)?)
                }
                _ => None,
            };
            Ok((lower.unwrap_or(0), upper))
        } else {
            match lower {
                // `{n}`: exactly n
                Some(n) => Ok((n, Some(n))),
                None => Err(SyntaxError::new("expected repetition bound", self.here())),
            }
        }
    }

    fn as_bound(&self, n: i64) -> Result<u32> {
        u32::try_from(n)
            .map_err(|_| SyntaxError::new("repetition bound out of range", self.prev_span()))
    }

    fn clause_atom(&mut self) -> Result<Clause> {
        match self.advance() {
            Some((Token::Str(text), span)) => Ok(Clause::new(ClauseKind::Token(text), span)),
            Some((Token::CharSet((lo, hi)), span)) => {
                Ok(Clause::new(ClauseKind::CharSet { lo, hi }, span))
            }
            Some((Token::CharCode((lo, hi)), span)) => Ok(match hi {
                Some(hi) => Clause::new(ClauseKind::CharSet { lo, hi }, span),
                None => Clause::new(ClauseKind::Token(lo.to_string()), span),
            }),
            Some((Token::Ident(name), span)) => Ok(Clause::new(ClauseKind::Symbol(name), span)),
            Some((Token::LParen, _)) => {
                let clause = self.clause()?;
                self.expect(Token::RParen)?;
                Ok(clause)
            }
            Some((found, span)) => Err(SyntaxError::new(
                format!("expected a clause, found {found}"),
                span,
            )),
            None => Err(SyntaxError::new(
                "expected a clause, found end of input",
                self.eof,
            )),
        }
    }

    // --- Types ---

    fn type_expr(&mut self) -> Result<TypeExpr> {
        if self.peek() == Some(&Token::LBrace) {
            let start = self.here();
            self.advance();
            let base = self.type_expr()?;
            self.expect(Token::Pipe)?;
            let pred = self.expr()?;
            let end = self.expect(Token::RBrace)?;
            return Ok(TypeExpr::new(
                TypeExprKind::Refinement {
                    base: Box::new(base),
                    pred: Box::new(pred),
                },
                start.to(end),
            ));
        }
        self.fun_type()
    }

    fn fun_type(&mut self) -> Result<TypeExpr> {
        if self.peek() == Some(&Token::LParen) {
            let start = self.here();
            self.advance();
            let mut args = vec![self.type_expr()?];
            while self.eat(&Token::Comma) {
                args.push(self.type_expr()?);
            }
            self.expect(Token::RParen)?;
            if self.eat(&Token::Arrow) {
                let ret = self.fun_type()?;
                let span = start.to(ret.span);
                return Ok(TypeExpr::new(TypeExprKind::Fun(args, Box::new(ret)), span));
            }
            if args.len() == 1 {
                return Ok(args.pop().unwrap());
            }
            return Err(SyntaxError::new("expected `->`", self.here()));
        }
        let atom = self.type_atom()?;
        if self.eat(&Token::Arrow) {
            let ret = self.fun_type()?;
            let span = atom.span.to(ret.span);
            return Ok(TypeExpr::new(
                TypeExprKind::Fun(vec![atom], Box::new(ret)),
                span,
            ));
        }
        Ok(atom)
    }

    fn type_atom(&mut self) -> Result<TypeExpr> {
        match self.advance() {
            Some((Token::KwInt, span)) => Ok(TypeExpr::new(TypeExprKind::Int, span)),
            Some((Token::KwBool, span)) => Ok(TypeExpr::new(TypeExprKind::Bool, span)),
            Some((Token::KwString, span)) => Ok(TypeExpr::new(TypeExprKind::String, span)),
            Some((Token::KwUnit, span)) => Ok(TypeExpr::new(TypeExprKind::Unit, span)),
            Some((Token::Ident(name), span)) => Ok(TypeExpr::new(TypeExprKind::Named(name), span)),
            Some((Token::LBracket, start)) => {
                let elem = self.type_expr()?;
                let end = self.expect(Token::RBracket)?;
                Ok(TypeExpr::new(
                    TypeExprKind::List(Box::new(elem)),
                    start.to(end),
                ))
            }
            Some((found, span)) => Err(SyntaxError::new(
                format!("expected a type, found {found}"),
                span,
            )),
            None => Err(SyntaxError::new(
                "expected a type, found end of input",
                self.eof,
            )),
        }
    }

    // --- Expressions ---

    fn expr(&mut self) -> Result<Expr> {
        if let Some(lambda) = self.try_lambda()? {
            return Ok(lambda);
        }
        if self.peek() == Some(&Token::If) {
            return self.if_expr();
        }
        self.or_expr()
    }

    fn if_expr(&mut self) -> Result<Expr> {
        let start = self.expect(Token::If)?;
        let cond = self.expr()?;
        self.expect(Token::Then)?;
        let then_branch = self.expr()?;
        self.expect(Token::Else)?;
        let else_branch = self.expr()?;
        let span = start.to(else_branch.span);
        Ok(Expr::new(
            ExprKind::IfThenElse {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    /// Lambdas need lookahead: `x -> e` and `(x, y) -> e` share their prefix
    /// with variables and parenthesized expressions.
    fn try_lambda(&mut self) -> Result<Option<Expr>> {
        let params = match self.peek() {
            Some(Token::Ident(_)) if self.peek_at(1) == Some(&Token::Arrow) => {
                let (name, span) = self.expect_ident()?;
                self.expect(Token::Arrow)?;
                (vec![name], span)
            }
            Some(Token::LParen) if self.lambda_params_ahead() => {
                let start = self.here();
                self.advance();
                let mut params = vec![self.expect_ident()?.0];
                while self.eat(&Token::Comma) {
                    params.push(self.expect_ident()?.0);
                }
                self.expect(Token::RParen)?;
                self.expect(Token::Arrow)?;
                (params, start)
            }
            _ => return Ok(None),
        };
        let body = self.expr()?;
        let span = params.1.to(body.span);
        Ok(Some(Expr::new(
            ExprKind::Lambda {
                params: params.0,
                body: Box::new(body),
            },
            span,
        )))
    }

    fn lambda_params_ahead(&self) -> bool {
        // At `(`: accept only `(ident (, ident)*) ->`.
        let mut offset = 1;
        loop {
            match self.peek_at(offset) {
                Some(Token::Ident(_)) => offset += 1,
                _ => return false,
            }
            match self.peek_at(offset) {
                Some(Token::Comma) => offset += 1,
                Some(Token::RParen) => {
                    return self.peek_at(offset + 1) == Some(&Token::Arrow);
                }
                _ => return false,
            }
        }
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::PipePipe) {
            let rhs = self.and_expr()?;
            lhs = Expr::infix("||", lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.not_expr()?;
        while self.eat(&Token::AmpAmp) {
            let rhs = self.not_expr()?;
            lhs = Expr::infix("&&", lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            let operand = self.not_expr()?;
            return Ok(Expr::prefix("!", operand));
        }
        self.cmp_expr()
    }

    fn cmp_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => "==",
                Some(Token::BangEq) => "!=",
                Some(Token::Le) => "<=",
                Some(Token::Ge) => ">=",
                Some(Token::Lt) => "<",
                Some(Token::Gt) => ">",
                Some(Token::In) => {
                    self.advance();
                    let (lang, span) = self.expect_ident()?;
                    let full = lhs.span.to(span);
                    lhs = Expr::new(
                        ExprKind::InLang {
                            receiver: Box::new(lhs),
                            lang,
                        },
                        full,
                    );
                    continue;
                }
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.add_expr()?;
            lhs = Expr::infix(op, lhs, rhs);
        }
    }

    fn add_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => "+",
                Some(Token::Minus) => "-",
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.mul_expr()?;
            lhs = Expr::infix(op, lhs, rhs);
        }
    }

    fn mul_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.neg_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => "*",
                Some(Token::Slash) => "/",
                Some(Token::Percent) => "%",
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.neg_expr()?;
            lhs = Expr::infix(op, lhs, rhs);
        }
    }

    fn neg_expr(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.neg_expr()?;
            return Ok(Expr::prefix("-", operand));
        }
        self.call_expr()
    }

    fn call_expr(&mut self) -> Result<Expr> {
        let mut callee = self.primary()?;
        while self.peek() == Some(&Token::LParen) {
            self.advance();
            let mut args = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                args.push(self.expr()?);
                while self.eat(&Token::Comma) {
                    args.push(self.expr()?);
                }
            }
            let end = self.expect(Token::RParen)?;
            let span = callee.span.to(end);
            callee = Expr::new(
                ExprKind::App {
                    fun: Box::new(callee),
                    args,
                },
                span,
            );
        }
        Ok(callee)
    }

    fn primary(&mut self) -> Result<Expr> {
        // `select(@Lang: path, receiver)` and its `select_all` twin are
        // syntactic forms, not ordinary applications.
        if let Some(Token::Ident(name)) = self.peek() {
            let select_all = match name.as_str() {
                "select" => Some(false),
                "select_all" => Some(true),
                _ => None,
            };
            if let Some(select_all) = select_all {
                if self.peek_at(1) == Some(&Token::LParen) && self.peek_at(2) == Some(&Token::At) {
                    return self.select_expr(select_all);
                }
            }
        }
        match self.advance() {
            Some((Token::Int(n), span)) => Ok(Expr::new(ExprKind::Int(n), span)),
            Some((Token::True, span)) => Ok(Expr::new(ExprKind::Bool(true), span)),
            Some((Token::False, span)) => Ok(Expr::new(ExprKind::Bool(false), span)),
            Some((Token::Str(s), span)) => Ok(Expr::new(ExprKind::Str(s), span)),
            Some((Token::Ident(name), span)) => Ok(Expr::new(ExprKind::Var(name), span)),
            Some((Token::KwInt, span)) => Ok(Expr::new(ExprKind::Var("int".to_string()), span)),
            Some((Token::LParen, _)) => {
                let expr = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some((Token::If, span)) => {
                self.pos -= 1;
                let _ = span;
                self.if_expr()
            }
            Some((found, span)) => Err(SyntaxError::new(
                format!("expected an expression, found {found}"),
                span,
            )),
            None => Err(SyntaxError::new(
                "expected an expression, found end of input",
                self.eof,
            )),
        }
    }

    fn select_expr(&mut self, select_all: bool) -> Result<Expr> {
        let (_, start) = self.expect_ident()?;
        self.expect(Token::LParen)?;
        self.expect(Token::At)?;
        let (lang, _) = self.expect_ident()?;
        self.expect(Token::Colon)?;
        let path = self.path()?;
        self.expect(Token::Comma)?;
        let receiver = self.expr()?;
        let end = self.expect(Token::RParen)?;
        Ok(Expr::new(
            ExprKind::Select {
                receiver: Box::new(receiver),
                select_all,
                lang,
                path,
            },
            start.to(end),
        ))
    }

    // --- Paths ---

    /// `path := anchor? step*` with `step := '.' name ('[' k ']')? | '..' name`.
    /// A path starting with a step is absolute (anchored at `start`); a
    /// leading bare identifier anchors it at every occurrence of that symbol.
    fn path(&mut self) -> Result<PathSelector> {
        let anchor = match self.peek() {
            Some(Token::Ident(_)) => Some(self.expect_ident()?.0),
            _ => None,
        };
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let (symbol, _) = self.expect_ident()?;
                    if self.eat(&Token::LBracket) {
                        let k = match self.advance() {
                            Some((Token::Int(k), span)) if k >= 1 => {
                                u32::try_from(k).map_err(|_| {
                                    SyntaxError::new("index out of range", span)
                                })?
                            }
                            Some((found, span)) => {
                                return Err(SyntaxError::new(
                                    format!("expected an index of at least 1, found {found}"),
                                    span,
                                ))
                            }
                            None => {
                                return Err(SyntaxError::new(
                                    "expected an index, found end of input",
                                    self.eof,
                                ))
                            }
                        };
                        self.expect(Token::RBracket)?;
                        steps.push(Step::At { symbol, k });
                    } else {
                        steps.push(Step::AllDirect { symbol });
                    }
                }
                Some(Token::DotDot) => {
                    self.advance();
                    let (symbol, _) = self.expect_ident()?;
                    steps.push(Step::AllIndirect { symbol });
                }
                _ => break,
            }
        }
        if anchor.is_none() && steps.is_empty() {
            return Err(SyntaxError::new("expected a path", self.here()));
        }
        Ok(PathSelector { anchor, steps })
    }
}
