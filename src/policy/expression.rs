//! Boolean expressions used by constraint checks.
//!
//! Supported syntax:
//! - Comparisons: `==`, `!=`, `>`, `<`, `>=`, `<=` (numbers and strings)
//! - Boolean operators: `&&`, `||`, `!` (short-circuiting)
//! - Membership: `x in list`
//! - Dot-path access: `input.justification`, `subject.email`
//! - Literals: integers, floats, `"strings"`, `true`, `false`, `null`, `[lists]`
//! - Functions: `size(x)`, `startsWith(s, p)`, `endsWith(s, p)`, `contains(s, p)`,
//!   also callable as methods: `s.startsWith(p)`, `x.size()`
//! - Parentheses for grouping

use serde_json::Value;

use crate::policy::errors::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    In,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(Value),
    Str(String),
    Op(BinOp),
    Not,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn malformed(message: impl Into<String>) -> EvaluationError {
    EvaluationError::Malformed(message.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvaluationError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '=' | '!' | '<' | '>' if chars.peek() == Some(&'=') => {
                chars.next();
                Token::Op(match c {
                    '=' => BinOp::Eq,
                    '!' => BinOp::Ne,
                    '<' => BinOp::Le,
                    _ => BinOp::Ge,
                })
            }
            '!' => Token::Not,
            '<' => Token::Op(BinOp::Lt),
            '>' => Token::Op(BinOp::Gt),
            '&' | '|' => {
                if chars.next() != Some(c) {
                    return Err(malformed(format!("expected `{c}{c}`")));
                }
                Token::Op(if c == '&' { BinOp::And } else { BinOp::Or })
            }
            '"' | '\'' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(malformed("unterminated string literal")),
                        Some('\\') => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => return Err(malformed("unterminated string literal")),
                        },
                        Some(q) if q == c => break,
                        Some(other) => s.push(other),
                    }
                }
                Token::Str(s)
            }
            c if c.is_ascii_digit() => {
                let mut literal = c.to_string();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    literal.push(d);
                    chars.next();
                }
                let number = if literal.contains('.') {
                    literal
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                } else {
                    literal.parse::<i64>().ok().map(Value::from)
                };
                Token::Number(
                    number.ok_or_else(|| malformed(format!("invalid number `{literal}`")))?,
                )
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = c.to_string();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    word.push(d);
                    chars.next();
                }
                if word == "in" {
                    Token::Op(BinOp::In)
                } else {
                    Token::Ident(word)
                }
            }
            c => return Err(malformed(format!("unexpected character `{c}`"))),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Recursive-descent parser; precedence from lowest: `||`, `&&`,
/// comparisons and `in`, `!`, primary.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvaluationError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(malformed(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn binary(
        &mut self,
        ops: &[BinOp],
        operand: fn(&mut Self) -> Result<Expr, EvaluationError>,
    ) -> Result<Expr, EvaluationError> {
        let mut left = operand(self)?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if !ops.contains(&op) {
                break;
            }
            self.pos += 1;
            let right = operand(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, EvaluationError> {
        self.binary(&[BinOp::Or], Self::and)
    }

    fn and(&mut self) -> Result<Expr, EvaluationError> {
        self.binary(&[BinOp::And], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, EvaluationError> {
        let left = self.unary()?;
        match self.peek() {
            Some(Token::Op(op)) if !matches!(op, BinOp::And | BinOp::Or) => {
                let op = *op;
                self.pos += 1;
                let right = self.unary()?;
                Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            _ => Ok(left),
        }
    }

    fn unary(&mut self) -> Result<Expr, EvaluationError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, EvaluationError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::Str(s)) => self.member(Expr::Literal(Value::String(s))),
            Some(Token::Ident(word)) if word == "true" => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::Ident(word)) if word == "false" => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Ident(word)) if word == "null" => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(word)) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let args = self.list(Token::RParen)?;
                self.member(Expr::Call {
                    function: word,
                    args,
                })
            }
            Some(Token::Ident(word)) => self.member(Expr::Path(vec![word])),
            Some(Token::LBracket) => Ok(Expr::List(self.list(Token::RBracket)?)),
            Some(Token::LParen) => {
                let expr = self.or()?;
                self.expect(Token::RParen)?;
                self.member(expr)
            }
            other => Err(malformed(format!("unexpected token: {other:?}"))),
        }
    }

    /// Trailing `.field` and `.method(args)` selections. A method call
    /// passes its receiver as the first argument, so `s.startsWith(p)` is
    /// the same as `startsWith(s, p)`.
    fn member(&mut self, mut expr: Expr) -> Result<Expr, EvaluationError> {
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                _ => return Err(malformed("expected identifier after `.`")),
            };
            expr = if self.peek() == Some(&Token::LParen) {
                self.pos += 1;
                let mut args = vec![expr];
                args.extend(self.list(Token::RParen)?);
                Expr::Call {
                    function: name,
                    args,
                }
            } else {
                match expr {
                    Expr::Path(mut path) => {
                        path.push(name);
                        Expr::Path(path)
                    }
                    _ => return Err(malformed(format!("cannot select `{name}` here"))),
                }
            };
        }
        Ok(expr)
    }

    /// Comma-separated expressions up to and including `close`.
    fn list(&mut self, close: Token) -> Result<Vec<Expr>, EvaluationError> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.or()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(token) if token == close => return Ok(items),
                other => return Err(malformed(format!("expected `,` or {close:?}, found {other:?}"))),
            }
        }
    }
}

/// Parse an expression string into an AST.
pub fn parse(input: &str) -> Result<Expr, EvaluationError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(malformed("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or()?;
    if let Some(trailing) = parser.peek() {
        return Err(malformed(format!("unexpected trailing token: {trailing:?}")));
    }
    Ok(expr)
}

/// Evaluate a parsed expression against a JSON context. Paths that do not
/// exist evaluate to `null`.
pub fn evaluate(expr: &Expr, context: &Value) -> Result<bool, EvaluationError> {
    match eval(expr, context)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationError::NotBoolean(other.to_string())),
    }
}

fn as_bool(value: Value, op: &str) -> Result<bool, EvaluationError> {
    value
        .as_bool()
        .ok_or_else(|| malformed(format!("`{op}` requires boolean operands")))
}

fn as_str<'a>(value: &'a Value, function: &str) -> Result<&'a str, EvaluationError> {
    value
        .as_str()
        .ok_or_else(|| malformed(format!("`{function}` requires string arguments")))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn eval(expr: &Expr, context: &Value) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => Ok(segments
            .iter()
            .try_fold(context, |current, seg| current.get(seg))
            .cloned()
            .unwrap_or(Value::Null)),
        Expr::List(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| eval(item, context))
                .collect::<Result<_, _>>()?,
        )),
        Expr::Not(inner) => Ok(Value::Bool(!as_bool(eval(inner, context)?, "!")?)),
        Expr::Binary {
            op: BinOp::And,
            left,
            right,
        } => Ok(Value::Bool(
            as_bool(eval(left, context)?, "&&")? && as_bool(eval(right, context)?, "&&")?,
        )),
        Expr::Binary {
            op: BinOp::Or,
            left,
            right,
        } => Ok(Value::Bool(
            as_bool(eval(left, context)?, "||")? || as_bool(eval(right, context)?, "||")?,
        )),
        Expr::Binary { op, left, right } => {
            let l = eval(left, context)?;
            let r = eval(right, context)?;
            let result = match op {
                BinOp::Eq => values_equal(&l, &r),
                BinOp::Ne => !values_equal(&l, &r),
                BinOp::In => match &r {
                    Value::Array(items) => items.iter().any(|item| values_equal(item, &l)),
                    _ => return Err(malformed("`in` requires a list on the right side")),
                },
                _ => {
                    let ordering = match (&l, &r) {
                        (Value::String(a), Value::String(b)) => a.cmp(b),
                        _ => {
                            let (a, b) = l.as_f64().zip(r.as_f64()).ok_or_else(|| {
                                malformed("comparison requires two numbers or two strings")
                            })?;
                            a.partial_cmp(&b)
                                .ok_or_else(|| malformed("comparison of non-finite numbers"))?
                        }
                    };
                    match op {
                        BinOp::Gt => ordering.is_gt(),
                        BinOp::Lt => ordering.is_lt(),
                        BinOp::Ge => ordering.is_ge(),
                        _ => ordering.is_le(),
                    }
                }
            };
            Ok(Value::Bool(result))
        }
        Expr::Call { function, args } => {
            let args = args
                .iter()
                .map(|arg| eval(arg, context))
                .collect::<Result<Vec<_>, _>>()?;
            call(function, &args)
        }
    }
}

fn call(function: &str, args: &[Value]) -> Result<Value, EvaluationError> {
    match (function, args) {
        ("size", [value]) => match value {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::Null => Ok(Value::from(0)),
            _ => Err(malformed("`size` requires a string or list")),
        },
        ("startsWith", [s, prefix]) => Ok(Value::Bool(
            as_str(s, function)?.starts_with(as_str(prefix, function)?),
        )),
        ("endsWith", [s, suffix]) => Ok(Value::Bool(
            as_str(s, function)?.ends_with(as_str(suffix, function)?),
        )),
        ("contains", [s, part]) => Ok(Value::Bool(
            as_str(s, function)?.contains(as_str(part, function)?),
        )),
        ("size" | "startsWith" | "endsWith" | "contains", _) => Err(malformed(format!(
            "wrong number of arguments for `{function}`"
        ))),
        _ => Err(malformed(format!("unknown function `{function}`"))),
    }
}
