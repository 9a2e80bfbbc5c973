//! `(( calc "expression" ))`
//!
//! Arithmetic over numbers found in the tree:
//!
//! ```text
//! (( calc "meta.instances * 2 + 1" ))
//! (( calc "max(meta.a, meta.b) % 3" ))
//! ```
//!
//! Operators: `+ - * / %`, unary minus and parentheses. Functions (fixed
//! arity): `ceil(x)`, `floor(x)`, `sqrt(x)`, `min(x, y)`, `max(x, y)`,
//! `mod(x, y)`, `pow(x, y)`. Every other identifier is a reference into the
//! tree and must resolve to a number.
use super::{check_arity, Operator, Response};
use crate::cursor::Cursor;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::opcall::Opcall;
use crate::value::Value;

pub struct Calc;

impl Operator for Calc {
    fn dependencies(
        &self,
        ev: &Evaluator,
        args: &[Expr],
        _locations: &[Cursor],
        auto: &[Cursor],
    ) -> Vec<Cursor> {
        let mut deps = auto.to_vec();
        let Some(source) = args.first().and_then(|arg| source_text(ev, arg)) else {
            return deps;
        };

        let Ok(tokens) = tokenize(&source) else {
            return deps;
        };

        for cursor in references(&tokens) {
            let cursor = cursor.canonical_with(&ev.tree, ev.merge_key()).unwrap_or(cursor);
            if !deps.contains(&cursor) {
                deps.push(cursor);
            }
        }
        deps
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("calc", args, 1, Some(1))?;

        let source = match args[0].resolve_with(&ev.tree, ev.merge_key())? {
            Expr::Literal(Value::String(source)) => source,
            Expr::Reference(cursor) => match cursor.resolve_with(&ev.tree, ev.merge_key())? {
                Value::String(source) => source.clone(),
                number @ (Value::Integer(_) | Value::Decimal(_)) => {
                    return Ok(Response::Replace(number.clone()))
                }
                other => return Err(not_calculable(&cursor, other)),
            },
            other => {
                return Err(Error::msg(format!(
                    "calc operator only accepts a string expression or a reference to one, got {other}"
                )))
            }
        };

        let tokens = tokenize(&source)?;
        let mut values = vec![];
        let mut unresolved = vec![];
        for cursor in references(&tokens) {
            match cursor.resolve_with(&ev.tree, ev.merge_key()) {
                Ok(value) => values.push((cursor, value.clone())),
                Err(err) if err.is_not_found() => unresolved.push(cursor.to_string()),
                Err(err) => return Err(err),
            }
        }

        if !unresolved.is_empty() {
            return Err(Error::msg(format!(
                "calc: unable to resolve {} in expression `{source}`; named variables are not supported",
                unresolved.iter().map(|n| format!("`{n}`")).collect::<Vec<_>>().join(", ")
            )));
        }

        let mut parser = Parser {
            tokens: &tokens,
            position: 0,
            values: &values,
        };
        let result = parser.expression()?;
        if let Some(token) = tokens.get(parser.position) {
            return Err(Error::msg(format!("calc: unexpected {token} in `{source}`")));
        }

        tracing::debug!(here = %ev.here, %source, result, "calculated");
        Ok(Response::Replace(number(result)))
    }
}

/// Expression text of the argument, if it is known yet
///
/// A referenced call that has not run yet has no expression; the reference
/// itself is already among the automatic dependencies.
fn source_text(ev: &Evaluator, arg: &Expr) -> Option<String> {
    let source = match arg {
        Expr::Literal(Value::String(source)) => source.as_str(),
        Expr::Reference(cursor) => cursor.resolve_with(&ev.tree, ev.merge_key()).ok()?.as_str()?,
        _ => return None,
    };
    (!Opcall::is_call(source)).then(|| source.to_string())
}

fn not_calculable(cursor: &Cursor, value: &Value) -> Error {
    Error::msg(format!(
        "`{}` is of type {} and cannot be used in calculations",
        cursor.rooted(),
        value.kind()
    ))
}

/// Integral results become integers
fn number(result: f64) -> Value {
    if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
        Value::Integer(result as i64)
    } else {
        Value::Decimal(result)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    Open,
    Close,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Ident(name) => write!(f, "`{name}`"),
            Token::Op(op) => write!(f, "`{op}`"),
            Token::Open => f.write_str("`(`"),
            Token::Close => f.write_str("`)`"),
            Token::Comma => f.write_str("`,`"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = vec![];
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse().map_err(|_| Error::Syntax {
                    input: source.to_string(),
                    problem: format!("invalid number `{text}`"),
                    position: start,
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.' | '[' | ']' | '$'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::Syntax {
                    input: source.to_string(),
                    problem: format!("unexpected character `{other}`"),
                    position: i,
                })
            }
        }
    }

    Ok(tokens)
}

const FUNCTIONS: [(&str, usize); 7] = [
    ("ceil", 1),
    ("floor", 1),
    ("sqrt", 1),
    ("min", 2),
    ("max", 2),
    ("mod", 2),
    ("pow", 2),
];

fn is_function_call(tokens: &[Token], index: usize) -> bool {
    matches!(tokens.get(index + 1), Some(Token::Open))
}

/// Identifiers that are not function names, as cursors
fn references(tokens: &[Token]) -> Vec<Cursor> {
    let mut found: Vec<Cursor> = vec![];
    for (index, token) in tokens.iter().enumerate() {
        let Token::Ident(name) = token else { continue };
        if is_function_call(tokens, index) {
            continue;
        }
        if let Ok(cursor) = Cursor::parse(name) {
            if !found.contains(&cursor) {
                found.push(cursor);
            }
        }
    }
    found
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    values: &'a [(Cursor, Value)],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<&'a Token, Error> {
        let token = self
            .tokens
            .get(self.position)
            .ok_or_else(|| Error::msg("calc: unexpected end of expression"))?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, wanted: Token) -> Result<(), Error> {
        let token = self.next()?;
        if *token != wanted {
            return Err(Error::msg(format!("calc: expected {wanted}, found {token}")));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<f64, Error> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.position += 1;
            let rhs = self.term()?;
            value = if *op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, Error> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.position += 1;
            let rhs = self.unary()?;
            value = match *op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(Error::msg("calc: division by zero")),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, Error> {
        if let Some(Token::Op('-')) = self.peek() {
            self.position += 1;
            return Ok(-self.unary()?);
        }
        if let Some(Token::Op('+')) = self.peek() {
            self.position += 1;
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64, Error> {
        let index = self.position;
        match self.next()? {
            Token::Number(n) => Ok(*n),
            Token::Open => {
                let value = self.expression()?;
                self.expect(Token::Close)?;
                Ok(value)
            }
            Token::Ident(name) if is_function_call(self.tokens, index) => self.call(name),
            Token::Ident(name) => self.variable(name),
            other => Err(Error::msg(format!("calc: unexpected {other}"))),
        }
    }

    fn variable(&self, name: &str) -> Result<f64, Error> {
        let cursor = Cursor::parse(name)?;
        let (cursor, value) = self
            .values
            .iter()
            .find(|(c, _)| *c == cursor)
            .ok_or_else(|| Error::msg(format!("calc: unable to resolve `{name}`")))?;
        value.as_f64().ok_or_else(|| not_calculable(cursor, value))
    }

    fn call(&mut self, name: &str) -> Result<f64, Error> {
        let Some((_, arity)) = FUNCTIONS.iter().find(|(f, _)| *f == name) else {
            return Err(Error::msg(format!("calc: unknown function `{name}`")));
        };

        self.expect(Token::Open)?;
        let mut args = vec![];
        if self.peek() != Some(&Token::Close) {
            loop {
                args.push(self.expression()?);
                if self.peek() == Some(&Token::Comma) {
                    self.position += 1;
                    continue;
                }
                break;
            }
        }
        self.expect(Token::Close)?;

        if args.len() != *arity {
            return Err(Error::msg(format!(
                "calc: function `{name}` expects {arity} argument(s), got {}",
                args.len()
            )));
        }

        Ok(match (name, args.as_slice()) {
            ("ceil", [x]) => x.ceil(),
            ("floor", [x]) => x.floor(),
            ("sqrt", [x]) => x.sqrt(),
            ("min", [x, y]) => x.min(*y),
            ("max", [x, y]) => x.max(*y),
            ("mod", [_, y]) if *y == 0.0 => return Err(Error::msg("calc: division by zero")),
            ("mod", [x, y]) => x % y,
            ("pow", [x, y]) => x.powf(*y),
            _ => return Err(Error::msg(format!("calc: unknown function `{name}`"))),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operator::test::{evaluator, replace};
    use pretty_assertions::assert_eq;

    const TREE: &str = r#"
meta:
  a: 4
  b: 2.5
  list: [1, 2]
  name: web
  formula: "meta.a * 10"
"#;

    fn calc(expression: &str) -> Result<Value, Error> {
        let mut ev = evaluator(TREE, "out");
        replace(&mut ev, "calc", &format!("{expression:?}"))
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(calc("1 + 2 * 3"), Ok(Value::Integer(7)));
        assert_eq!(calc("(1 + 2) * 3"), Ok(Value::Integer(9)));
        assert_eq!(calc("-meta.a + 10 % 4"), Ok(Value::Integer(-2)));
        assert_eq!(calc("meta.a / 8"), Ok(Value::Decimal(0.5)));
        assert_eq!(calc("meta.a * meta.b"), Ok(Value::Integer(10)));
    }

    #[test]
    fn functions() {
        assert_eq!(calc("ceil(meta.b)"), Ok(Value::Integer(3)));
        assert_eq!(calc("floor(meta.b)"), Ok(Value::Integer(2)));
        assert_eq!(calc("max(meta.a, meta.b) + min(1, 2)"), Ok(Value::Integer(5)));
        assert_eq!(calc("pow(2, 10)"), Ok(Value::Integer(1024)));
        assert_eq!(calc("mod(7, 3)"), Ok(Value::Integer(1)));
        assert_eq!(calc("sqrt(16)"), Ok(Value::Integer(4)));
    }

    #[test]
    fn function_arity_is_checked() {
        assert_eq!(
            calc("min(1)").unwrap_err().to_string(),
            "calc: function `min` expects 2 argument(s), got 1"
        );
    }

    #[test]
    fn non_numeric_references_are_typed_errors() {
        assert_eq!(
            calc("ceil(meta.list)").unwrap_err().to_string(),
            "`$.meta.list` is of type slice and cannot be used in calculations"
        );
        assert_eq!(
            calc("meta.name + 1").unwrap_err().to_string(),
            "`$.meta.name` is of type string and cannot be used in calculations"
        );
    }

    #[test]
    fn unresolved_names_are_reported() {
        let err = calc("foo + meta.a + bar").unwrap_err().to_string();
        assert!(err.contains("`foo`, `bar`"), "{err}");
    }

    #[test]
    fn expression_from_reference() {
        let mut ev = evaluator(TREE, "out");
        assert_eq!(replace(&mut ev, "calc", "meta.formula"), Ok(Value::Integer(40)));
        assert_eq!(
            replace(&mut ev, "calc", "meta.list").unwrap_err().to_string(),
            "`$.meta.list` is of type slice and cannot be used in calculations"
        );
    }

    #[test]
    fn division_by_zero() {
        assert!(calc("1 / 0").is_err());
        assert!(calc("mod(1, 0)").is_err());
    }

    #[test]
    fn dependencies_follow_identifiers() {
        let ev = evaluator(TREE, "out");
        let args = crate::opcall::parse_args("\"meta.a + max(meta.b, 1)\"").unwrap();
        let deps: Vec<String> = Calc
            .dependencies(&ev, &args, &[], &[])
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(deps, ["meta.a", "meta.b"]);
    }

    #[test]
    fn pending_expression_only_depends_on_its_reference() {
        let ev = evaluator("meta:\n  formula: (( grab meta.text ))\n  text: meta.a * 2\n", "out");
        let args = crate::opcall::parse_args("meta.formula").unwrap();
        let auto = [Cursor::parse("meta.formula").unwrap()];
        let deps: Vec<String> = Calc
            .dependencies(&ev, &args, &[], &auto)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(deps, ["meta.formula"]);
    }

    #[test]
    fn expression_produced_by_another_call() {
        let source = r#"
meta:
  a: 3
  formula: (( concat "meta.a" " * 2" ))
out: (( calc meta.formula ))
"#;
        let tree = crate::evaluator::evaluate(
            [Value::from_yaml_str(source).unwrap()],
            &crate::config::Config::default(),
            &crate::evaluator::RunOptions::default(),
        )
        .unwrap();
        assert_eq!(tree.as_object().unwrap()["out"], Value::Integer(6));
    }
}
