//! Parser for the plotting subset: imports, assignments and expressions.

use super::lexer::{Tok, Token, MAX_NESTING};
use ragchart_core::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Unpack(Vec<Target>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import a.b as c`
    Import { module: String, alias: Option<String> },
    /// `from a import b as c`
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    Assign { targets: Vec<Target>, value: Expr },
    Expr(Expr),
}

/// Keywords that introduce constructs outside the subset.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "and", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif", "else",
    "except", "finally", "for", "global", "if", "in", "is", "lambda", "nonlocal", "not", "or",
    "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Deepest expression tree the interpreter will walk.
const MAX_EXPR_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open `expr` calls
    depth: usize,
}

/// Parse a token stream into at most `max_statements` statements.
pub fn parse(tokens: Vec<Token>, max_statements: usize) -> AppResult<Vec<Stmt>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut program = Vec::new();

    while !parser.at(&Tok::Eof) {
        if parser.eat(&Tok::Newline) {
            continue;
        }
        if program.len() == max_statements {
            return Err(AppError::Sandbox(format!(
                "more than {} statements",
                max_statements
            )));
        }
        let stmt = parser.statement()?;
        if stmt_depth(&stmt) > MAX_EXPR_DEPTH {
            return Err(parser.error("expression nested too deeply"));
        }
        program.push(stmt);
    }

    Ok(program)
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.line)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        self.pos += 1;
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> AppError {
        AppError::Sandbox(format!("line {}: {}", self.line(), msg))
    }

    fn unexpected(&self) -> AppError {
        match self.peek() {
            Tok::Name(n) if FORBIDDEN_KEYWORDS.contains(&n.as_str()) => {
                self.error(format!("'{}' is not allowed", n))
            }
            Tok::Newline | Tok::Eof => self.error("unexpected end of statement"),
            other => self.error(format!("unexpected {:?}", other)),
        }
    }

    fn expect(&mut self, tok: Tok) -> AppResult<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn ident(&mut self) -> AppResult<String> {
        match self.peek() {
            Tok::Name(n) if !is_reserved(n) => {
                let n = n.clone();
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn dotted_name(&mut self) -> AppResult<String> {
        let mut name = self.ident()?;
        while self.eat(&Tok::Dot) {
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    fn end_of_statement(&mut self) -> AppResult<()> {
        if self.eat(&Tok::Newline) || self.at(&Tok::Eof) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn statement(&mut self) -> AppResult<Stmt> {
        let stmt = match self.peek() {
            Tok::Name(n) if n == "import" => {
                self.pos += 1;
                let module = self.dotted_name()?;
                let alias = if self.eat_keyword("as") {
                    Some(self.ident()?)
                } else {
                    None
                };
                if self.at(&Tok::Comma) {
                    return Err(self.error("import one module per statement"));
                }
                Stmt::Import { module, alias }
            }
            Tok::Name(n) if n == "from" => {
                self.pos += 1;
                let module = self.dotted_name()?;
                if !self.eat_keyword("import") {
                    return Err(self.unexpected());
                }
                if self.at(&Tok::Star) {
                    return Err(self.error("wildcard imports are not allowed"));
                }
                let mut names = Vec::new();
                loop {
                    let name = self.ident()?;
                    let alias = if self.eat_keyword("as") {
                        Some(self.ident()?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                Stmt::FromImport { module, names }
            }
            _ => self.assignment_or_expr()?,
        };

        self.end_of_statement()?;
        Ok(stmt)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Tok::Name(n) if n == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn assignment_or_expr(&mut self) -> AppResult<Stmt> {
        let first = self.expr_list()?;
        if !self.at(&Tok::Assign) {
            return Ok(Stmt::Expr(first));
        }

        let mut targets = vec![self.to_target(first)?];
        let mut value = None;
        while self.eat(&Tok::Assign) {
            let next = self.expr_list()?;
            if self.at(&Tok::Assign) {
                targets.push(self.to_target(next)?);
            } else {
                value = Some(next);
            }
        }

        let value = value.ok_or_else(|| self.unexpected())?;
        Ok(Stmt::Assign { targets, value })
    }

    fn to_target(&self, expr: Expr) -> AppResult<Target> {
        match expr {
            Expr::Name(n) => Ok(Target::Name(n)),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Unpack(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<AppResult<_>>()?,
            )),
            _ => Err(self.error("only plain names can be assigned")),
        }
    }

    /// `a` or `a, b, ...` (a bare tuple).
    fn expr_list(&mut self) -> AppResult<Expr> {
        let first = self.expr()?;
        if !self.at(&Tok::Comma) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.ends_expr_list() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn ends_expr_list(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Assign | Tok::Newline | Tok::Eof | Tok::RParen
        )
    }

    fn expr(&mut self) -> AppResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        let expr = self.sum();
        self.depth -= 1;
        expr
    }

    fn chain_limit(&self, length: usize) -> AppResult<()> {
        if length > MAX_NESTING {
            return Err(self.error("expression chain too long"));
        }
        Ok(())
    }

    fn sum(&mut self) -> AppResult<Expr> {
        let mut left = self.term()?;
        for length in 1.. {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.chain_limit(length)?;
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> AppResult<Expr> {
        let mut left = self.unary()?;
        for length in 1.. {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.chain_limit(length)?;
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> AppResult<Expr> {
        let mut negations = 0;
        loop {
            if self.eat(&Tok::Minus) {
                negations += 1;
                self.chain_limit(negations)?;
            } else if !self.eat(&Tok::Plus) {
                break;
            }
        }

        let mut expr = self.postfix()?;
        for _ in 0..negations {
            expr = Expr::Neg(Box::new(expr));
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> AppResult<Expr> {
        let mut expr = self.atom()?;
        for length in 1.. {
            if matches!(self.peek(), Tok::Dot | Tok::LParen | Tok::LBracket) {
                self.chain_limit(length)?;
            }
            match self.peek() {
                Tok::Dot => {
                    self.pos += 1;
                    let name = self.ident()?;
                    expr = Expr::Attr(Box::new(expr), name);
                }
                Tok::LParen => {
                    self.pos += 1;
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Tok::LBracket => {
                    self.pos += 1;
                    let index = self.expr()?;
                    if self.at(&Tok::Colon) {
                        return Err(self.error("slices are not allowed"));
                    }
                    self.expect(Tok::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> AppResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while !self.eat(&Tok::RParen) {
            if matches!(self.peek(), Tok::Star) {
                return Err(self.error("argument unpacking is not allowed"));
            }

            let keyword = match (self.peek(), self.peek_at(1)) {
                (Tok::Name(n), Tok::Assign) => Some(n.clone()),
                _ => None,
            };

            match keyword {
                Some(name) => {
                    self.pos += 2;
                    if kwargs.iter().any(|(k, _)| *k == name) {
                        return Err(self.error(format!("repeated keyword argument '{}'", name)));
                    }
                    kwargs.push((name, self.expr()?));
                }
                None if !kwargs.is_empty() => {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                None => args.push(self.expr()?),
            }

            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RParen)?;
                break;
            }
        }

        Ok((args, kwargs))
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: Tok) -> AppResult<(Vec<Expr>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while !self.eat(&close) {
            items.push(self.expr()?);
            trailing_comma = self.eat(&Tok::Comma);
            if !trailing_comma {
                self.expect(close)?;
                break;
            }
        }
        Ok((items, trailing_comma))
    }

    fn atom(&mut self) -> AppResult<Expr> {
        match self.advance() {
            Tok::Num(n) => Ok(Expr::Num(n)),
            Tok::Str(mut s) => {
                // Adjacent literals concatenate.
                while let Tok::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Str(s))
            }
            Tok::Name(n) => match n.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                _ if is_reserved(&n) => {
                    self.pos -= 1;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Name(n)),
            },
            Tok::LParen => {
                let (items, trailing_comma) = self.sequence(Tok::RParen)?;
                match items.len() {
                    1 if !trailing_comma => Ok(items.into_iter().next().unwrap_or(Expr::None)),
                    _ => Ok(Expr::Tuple(items)),
                }
            }
            Tok::LBracket => Ok(Expr::List(self.sequence(Tok::RBracket)?.0)),
            Tok::LBrace => {
                let mut entries = Vec::new();
                while !self.eat(&Tok::RBrace) {
                    let key = self.expr()?;
                    self.expect(Tok::Colon)?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RBrace)?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }
}

fn stmt_depth(stmt: &Stmt) -> usize {
    match stmt {
        Stmt::Assign { value, .. } | Stmt::Expr(value) => expr_depth(value),
        Stmt::Import { .. } | Stmt::FromImport { .. } => 0,
    }
}

/// Height of an expression tree, walked without recursion.
fn expr_depth(root: &Expr) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(root, 1)];
    while let Some((expr, depth)) = stack.pop() {
        deepest = deepest.max(depth);
        let next = depth + 1;
        match expr {
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None | Expr::Name(_) => {}
            Expr::List(items) | Expr::Tuple(items) => {
                stack.extend(items.iter().map(|e| (e, next)));
            }
            Expr::Dict(entries) => {
                for (k, v) in entries {
                    stack.push((k, next));
                    stack.push((v, next));
                }
            }
            Expr::Attr(obj, _) | Expr::Neg(obj) => stack.push((obj, next)),
            Expr::Index(a, b) | Expr::Binary(_, a, b) => {
                stack.push((a, next));
                stack.push((b, next));
            }
            Expr::Call { func, args, kwargs } => {
                stack.push((func, next));
                stack.extend(args.iter().map(|e| (e, next)));
                stack.extend(kwargs.iter().map(|(_, e)| (e, next)));
            }
        }
    }
    deepest
}

fn is_reserved(name: &str) -> bool {
    FORBIDDEN_KEYWORDS.contains(&name) || matches!(name, "import" | "from" | "as")
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse_src(src: &str) -> AppResult<Vec<Stmt>> {
        parse(tokenize(src)?, 256)
    }

    #[test]
    fn test_imports() {
        let program = parse_src(
            "import matplotlib.pyplot as plt\nimport seaborn as sns\nfrom matplotlib import pyplot",
        )
        .unwrap();
        assert_eq!(
            program[0],
            Stmt::Import {
                module: "matplotlib.pyplot".into(),
                alias: Some("plt".into())
            }
        );
        assert_eq!(
            program[2],
            Stmt::FromImport {
                module: "matplotlib".into(),
                names: vec![("pyplot".into(), None)]
            }
        );
    }

    #[test]
    fn test_call_with_keywords() {
        let program = parse_src("plt.bar(labels, values, color='skyblue')").unwrap();
        match &program[0] {
            Stmt::Expr(Expr::Call { func, args, kwargs }) => {
                assert_eq!(
                    **func,
                    Expr::Attr(Box::new(Expr::Name("plt".into())), "bar".into())
                );
                assert_eq!(args.len(), 2);
                assert_eq!(kwargs[0].0, "color");
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_tuple_unpacking() {
        let program = parse_src("fig, (ax1, ax2) = plt.subplots(1, 2)").unwrap();
        match &program[0] {
            Stmt::Assign { targets, .. } => assert_eq!(
                targets[0],
                Target::Unpack(vec![
                    Target::Name("fig".into()),
                    Target::Unpack(vec![Target::Name("ax1".into()), Target::Name("ax2".into())]),
                ])
            ),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse_src("x = 1 + 2 * -3").unwrap();
        assert_eq!(
            program[0],
            Stmt::Assign {
                targets: vec![Target::Name("x".into())],
                value: Expr::Binary(
                    BinOp::Add,
                    Box::new(Expr::Num(1.0)),
                    Box::new(Expr::Binary(
                        BinOp::Mul,
                        Box::new(Expr::Num(2.0)),
                        Box::new(Expr::Neg(Box::new(Expr::Num(3.0))))
                    ))
                )
            }
        );
    }

    #[test]
    fn test_rejected_constructs() {
        for src in [
            "for x in values: print(x)",
            "def f(): pass",
            "f = lambda x: x",
            "x = [v for v in values]",
            "x = values[1:]",
            "from os import *",
            "plt.bar(*args)",
            "plt.bar(x=1, values)",
            "x.y = 1",
            "import os, sys",
            "x = 1 if y else 2",
        ] {
            assert!(
                matches!(parse_src(src), Err(AppError::Sandbox(_))),
                "expected rejection for {:?}",
                src
            );
        }
    }

    #[test]
    fn test_nesting_limits() {
        let negations = format!("x = {}1", "-".repeat(5000));
        let chain = format!("x = 1{}", " + 1".repeat(5000));
        let calls = format!("x = f{}", "()".repeat(5000));
        for src in [negations, chain, calls] {
            let err = parse_src(&src).unwrap_err();
            assert!(err.to_string().contains("too"), "{}", err);
        }

        assert!(parse_src("x = --1 + (2 * (3 - -4))").is_ok());
    }

    #[test]
    fn test_deep_tree_from_short_chains() {
        // Every level stays under the chain and bracket limits, the tree does not.
        let level = format!("){}", " + 1".repeat(12));
        let src = format!("x = {}1{}", "(".repeat(40), level.repeat(40));
        let err = parse_src(&src).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "{}", err);
        assert_eq!(expr_depth(&Expr::Num(1.0)), 1);
    }

    #[test]
    fn test_statement_limit() {
        let src = "x = 1\n".repeat(5);
        assert!(parse(tokenize(&src).unwrap(), 5).is_ok());
        assert!(matches!(
            parse(tokenize(&src).unwrap(), 4),
            Err(AppError::Sandbox(_))
        ));
    }
}
