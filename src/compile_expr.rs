use crate::error::CompileError;
use crate::expr::Number;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprAst {
    Call {
        name: String,
        args: Vec<ExprAst>,
        kwargs: BTreeMap<String, ExprAst>,
    },
    Identifier(String),
    Number(Number),
    Unary {
        op: UnaryOp,
        expr: Box<ExprAst>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<ExprAst>,
        rhs: Box<ExprAst>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// One `NAME = expr` line of a formula block.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub name: String,
    /// Right-hand side as written.
    pub source: String,
    pub ast: ExprAst,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(Number),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Amp,
    Pipe,
    Tilde,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    Comma,
    Equal,
    LParen,
    RParen,
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        while self.chars.next_if(char::is_ascii_whitespace).is_some() {}
        let Some(ch) = self.chars.next() else {
            return Ok(Token::Eof);
        };
        let token = match ch {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '/' => Token::Slash,
            '&' => Token::Amp,
            '|' => Token::Pipe,
            '~' => Token::Tilde,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '*' => self.pair('*', Token::StarStar, Token::Star),
            '<' => self.pair('=', Token::Le, Token::Lt),
            '>' => self.pair('=', Token::Ge, Token::Gt),
            '=' => self.pair('=', Token::EqEq, Token::Equal),
            '!' if self.chars.next_if_eq(&'=').is_some() => Token::NotEq,
            c if is_ident_start(c) => Token::Ident(self.read_ident(c)),
            c if c.is_ascii_digit() || c == '.' => Token::Number(parse_number(&self.read_number(c))?),
            other => {
                return Err(CompileError::InvalidExpression {
                    expr: other.to_string(),
                    reason: format!("unexpected character `{other}`"),
                })
            }
        };
        Ok(token)
    }

    /// Two-character operator when `next` follows, else the one-character one.
    fn pair(&mut self, next: char, joined: Token, single: Token) -> Token {
        match self.chars.next_if_eq(&next) {
            Some(_) => joined,
            None => single,
        }
    }

    fn read_ident(&mut self, first: char) -> String {
        let mut out = String::from(first);
        while let Some(c) = self.chars.next_if(|c| is_ident_continue(*c)) {
            out.push(c);
        }
        out
    }

    /// Digits with at most one `.` and an optional signed exponent.
    fn read_number(&mut self, first: char) -> String {
        let mut out = String::from(first);
        let mut seen_dot = first == '.';
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || (*c == '.' && !seen_dot)) {
            seen_dot |= c == '.';
            out.push(c);
        }
        if let Some(e) = self.chars.next_if(|c| matches!(c, 'e' | 'E')) {
            out.push(e);
            if let Some(sign) = self.chars.next_if(|c| matches!(c, '+' | '-')) {
                out.push(sign);
            }
            while let Some(c) = self.chars.next_if(char::is_ascii_digit) {
                out.push(c);
            }
        }
        out
    }
}

/// Literals written without `.` or an exponent are integers; everything else is a float.
fn parse_number(raw: &str) -> Result<Number, CompileError> {
    let invalid = || CompileError::InvalidExpression {
        expr: raw.to_string(),
        reason: format!("invalid number `{raw}`"),
    };
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return raw.parse::<i64>().map(Number::Int).map_err(|_| invalid());
    }
    raw.parse::<f64>().map(Number::Float).map_err(|_| invalid())
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn parse_expression(source: &str) -> Result<ExprAst, CompileError> {
    let mut parser = Parser::new(source);
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parses a block of `NAME = expr` lines. Blank lines and `#` comments are skipped.
pub fn parse_formulas(source: &str) -> Result<Vec<Formula>, CompileError> {
    let mut formulas = Vec::new();
    for line in source.lines() {
        let line = line.split_once('#').map_or(line, |(code, _)| code).trim();
        if line.is_empty() {
            continue;
        }
        formulas.push(parse_formula(line)?);
    }
    Ok(formulas)
}

pub fn parse_formula(source: &str) -> Result<Formula, CompileError> {
    let mut parser = Parser::new(source);
    let name = match parser.next_token()? {
        Token::Ident(name) => name,
        other => {
            return Err(CompileError::InvalidExpression {
                expr: source.to_string(),
                reason: format!("expected output name, got {other:?}"),
            });
        }
    };
    parser.expect_token(Token::Equal)?;
    let ast = parser.parse_expr()?;
    parser.expect_eof()?;
    let rhs = source.split_once('=').map_or(source, |(_, rhs)| rhs).trim();
    Ok(Formula {
        name,
        source: rhs.to_string(),
        ast,
    })
}

struct Parser<'a> {
    source: &'a str,
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            lexer: Lexer::new(source),
            lookahead: None,
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        if let Some(tok) = self.lookahead.take() {
            return Ok(tok);
        }
        self.lexer.next_token()
    }

    fn peek_token(&mut self) -> Result<Token, CompileError> {
        if let Some(tok) = &self.lookahead {
            return Ok(tok.clone());
        }
        let tok = self.lexer.next_token()?;
        self.lookahead = Some(tok.clone());
        Ok(tok)
    }

    fn parse_expr(&mut self) -> Result<ExprAst, CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<ExprAst, CompileError> {
        let mut lhs = self.parse_and()?;
        while let Token::Pipe = self.peek_token()? {
            self.next_token()?;
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<ExprAst, CompileError> {
        let mut lhs = self.parse_compare()?;
        while let Token::Amp = self.peek_token()? {
            self.next_token()?;
            let rhs = self.parse_compare()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_compare(&mut self) -> Result<ExprAst, CompileError> {
        let mut lhs = self.parse_add_sub()?;
        loop {
            let op = match self.peek_token()? {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_add_sub()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_add_sub(&mut self) -> Result<ExprAst, CompileError> {
        let mut lhs = self.parse_mul_div()?;
        loop {
            let op = match self.peek_token()? {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_mul_div()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_mul_div(&mut self) -> Result<ExprAst, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_token()? {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprAst, CompileError> {
        let op = match self.peek_token()? {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            Token::Tilde => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        self.next_token()?;
        let expr = self.parse_unary()?;
        Ok(ExprAst::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    // `**` is right-associative and binds tighter than a unary sign on its left.
    fn parse_power(&mut self) -> Result<ExprAst, CompileError> {
        let base = self.parse_primary()?;
        if let Token::StarStar = self.peek_token()? {
            self.next_token()?;
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<ExprAst, CompileError> {
        match self.next_token()? {
            Token::Ident(name) => {
                if matches!(self.peek_token()?, Token::LParen) {
                    self.next_token()?; // consume '('
                    let (args, kwargs) = self.parse_arg_list()?;
                    self.expect_token(Token::RParen)?;
                    Ok(ExprAst::Call { name, args, kwargs })
                } else {
                    Ok(ExprAst::Identifier(name))
                }
            }
            Token::Number(value) => Ok(ExprAst::Number(value)),
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect_token(Token::RParen)?;
                Ok(expr)
            }
            other => Err(CompileError::InvalidExpression {
                expr: self.source.to_string(),
                reason: format!("unexpected token: {other:?}"),
            }),
        }
    }

    fn parse_arg_list(
        &mut self,
    ) -> Result<(Vec<ExprAst>, BTreeMap<String, ExprAst>), CompileError> {
        let mut args = Vec::new();
        let mut kwargs = BTreeMap::new();
        loop {
            match self.peek_token()? {
                Token::RParen => break,
                Token::Eof => {
                    return Err(CompileError::InvalidExpression {
                        expr: self.source.to_string(),
                        reason: "unexpected EOF in argument list".to_string(),
                    });
                }
                _ => {}
            }

            let expr = self.parse_expr()?;
            if let ExprAst::Identifier(name) = &expr {
                if matches!(self.peek_token()?, Token::Equal) {
                    self.next_token()?;
                    let value = self.parse_expr()?;
                    if kwargs.insert(name.clone(), value).is_some() {
                        return Err(CompileError::InvalidExpression {
                            expr: self.source.to_string(),
                            reason: format!("duplicate keyword arg `{name}`"),
                        });
                    }
                } else if !kwargs.is_empty() {
                    return Err(self.positional_after_keyword());
                } else {
                    args.push(expr);
                }
            } else if !kwargs.is_empty() {
                return Err(self.positional_after_keyword());
            } else {
                args.push(expr);
            }

            match self.peek_token()? {
                Token::Comma => {
                    self.next_token()?;
                }
                Token::RParen => break,
                other => {
                    return Err(CompileError::InvalidExpression {
                        expr: self.source.to_string(),
                        reason: format!("invalid token in argument list: {other:?}"),
                    });
                }
            }
        }
        Ok((args, kwargs))
    }

    fn positional_after_keyword(&self) -> CompileError {
        CompileError::InvalidExpression {
            expr: self.source.to_string(),
            reason: "positional argument follows keyword argument".to_string(),
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), CompileError> {
        let got = self.next_token()?;
        if got == expected {
            Ok(())
        } else {
            Err(CompileError::InvalidExpression {
                expr: self.source.to_string(),
                reason: format!("expected {expected:?}, got {got:?}"),
            })
        }
    }

    fn expect_eof(&mut self) -> Result<(), CompileError> {
        match self.next_token()? {
            Token::Eof => Ok(()),
            other => Err(CompileError::InvalidExpression {
                expr: self.source.to_string(),
                reason: format!("unexpected trailing token: {other:?}"),
            }),
        }
    }
}

fn binary(op: BinaryOp, lhs: ExprAst, rhs: ExprAst) -> ExprAst {
    ExprAst::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let ast = parse_expression("a + b * c").expect("parse should succeed");
        match ast {
            ExprAst::Binary {
                op: BinaryOp::Add, ..
            } => {}
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_nested_calls_with_kwargs() {
        let ast = parse_expression("cs_rank(ts_mean(CLOSE, d=5))").expect("parse should succeed");
        match ast {
            ExprAst::Call { name, args, .. } => {
                assert_eq!(name, "cs_rank");
                match &args[0] {
                    ExprAst::Call { kwargs, .. } => {
                        assert_eq!(kwargs.get("d"), Some(&ExprAst::Number(Number::Int(5))));
                    }
                    other => panic!("unexpected arg: {other:?}"),
                }
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_comparison_and_logical_precedence() {
        let ast = parse_expression("a < b & c >= d | ~e").expect("parse should succeed");
        match ast {
            ExprAst::Binary {
                op: BinaryOp::Or, ..
            } => {}
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let ast = parse_expression("-a ** 2").expect("parse should succeed");
        match ast {
            ExprAst::Unary {
                op: UnaryOp::Minus,
                expr,
            } => assert!(matches!(
                *expr,
                ExprAst::Binary {
                    op: BinaryOp::Pow,
                    ..
                }
            )),
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative_and_accepts_signed_exponent() {
        let ast = parse_expression("a ** b ** -1").expect("parse should succeed");
        let ExprAst::Binary {
            op: BinaryOp::Pow,
            rhs,
            ..
        } = ast
        else {
            panic!("expected pow");
        };
        assert!(matches!(
            *rhs,
            ExprAst::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn integer_and_float_literals_stay_distinct() {
        assert_eq!(
            parse_expression("10").expect("int"),
            ExprAst::Number(Number::Int(10))
        );
        assert_eq!(
            parse_expression("2.0").expect("float"),
            ExprAst::Number(Number::Float(2.0))
        );
        assert_eq!(
            parse_expression("1e-3").expect("float"),
            ExprAst::Number(Number::Float(1e-3))
        );
    }

    #[test]
    fn parses_formula_block_with_comments() {
        let formulas = parse_formulas(
            "
            # moving averages
            MA_10 = ts_mean(CLOSE, 10)
            MA_40 = ts_mean(ts_mean(CLOSE, 5), 40)  # nested
            ",
        )
        .expect("parse should succeed");
        let names: Vec<_> = formulas.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["MA_10", "MA_40"]);
        assert_eq!(formulas[1].source, "ts_mean(ts_mean(CLOSE, 5), 40)");
    }

    #[test]
    fn formula_requires_assignment() {
        let err = parse_formula("ts_mean(CLOSE, 10)").expect_err("missing name");
        assert!(matches!(err, CompileError::InvalidExpression { .. }));
        let err = parse_formula("A == B").expect_err("comparison is not assignment");
        assert!(matches!(err, CompileError::InvalidExpression { .. }));
    }

    #[test]
    fn rejects_positional_after_keyword() {
        let err = parse_expression("ts_corr(x=A, B, 5)").expect_err("bad arg order");
        assert!(matches!(err, CompileError::InvalidExpression { .. }));
    }

    #[test]
    fn identifiers_stop_at_dots() {
        for source in ["bar.close", "ts_mean(bar.close, 5)"] {
            let err = parse_expression(source).expect_err("dotted names are not columns");
            assert!(matches!(err, CompileError::InvalidExpression { .. }), "{source}");
        }
        let err = parse_formula("a.b = CLOSE").expect_err("dotted output name");
        assert!(matches!(err, CompileError::InvalidExpression { .. }));
    }

    #[test]
    fn lexes_two_character_operators() {
        let ast = parse_expression("a ** 2 <= b != c").expect("parse should succeed");
        assert!(matches!(ast, ExprAst::Binary { op: BinaryOp::Ne, .. }));
        let err = parse_expression("!a").expect_err("bare `!` is not an operator");
        assert!(matches!(err, CompileError::InvalidExpression { .. }));
    }
}
