//! parsing of `(( operator args... ))` calls
//!
//! ```text
//! (( grab meta.name ))
//! (( concat "http://" meta.host ":" meta.port ))
//! (( grab meta.override || meta.default || "fallback" ))
//! (( static_ips(0, 1, 2) ))
//! ```
//!
//! Arguments are separated by whitespace and/or commas and may be wrapped in
//! parentheses. An argument is one of
//! - a double-quoted string (`\"` and `\\` escapes)
//! - a number (integers too large for an i64 become floats)
//! - `nil`/`null`/`~`, `true`/`false`
//! - `$NAME`, an environment variable
//! - anything else is a reference ([Cursor] syntax, `$.` for the root)
//!
//! Alternatives are joined with `||`.
use crate::cursor::Cursor;
use crate::error::Error;
use crate::expr::Expr;
use crate::operator::{self, Phase};
use crate::value::Value;

/// A parsed operator call found in the tree
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Opcall {
    pub name: String,
    pub args: Vec<Expr>,
    pub phase: Phase,
    /// The source text of the call
    pub src: String,
    /// Location in the tree the call replaces
    #[new(default)]
    pub location: Cursor,
}

impl Opcall {
    /// Parses `src` as an operator call of the given phase
    ///
    /// `Ok(None)` means the string is not a call for this phase: it is not
    /// call syntax at all, it is a bang-prefixed `((!name))`, it names an
    /// operator of another phase, or it is an unknown name without arguments
    /// (such as template markers `((var-name))` meant for other tools).
    pub fn parse(phase: Phase, src: &str) -> Result<Option<Opcall>, Error> {
        let Some(inner) = call_body(src) else {
            return Ok(None);
        };

        if inner.starts_with('!') {
            return Ok(None);
        }

        let name_len = inner
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(inner.len());
        let name = &inner[..name_len];
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Ok(None);
        }

        let mut rest = inner[name_len..].trim();
        if rest.starts_with('(') && rest.ends_with(')') {
            rest = rest[1..rest.len() - 1].trim();
        }

        let Some(op) = operator::registry().get(name) else {
            if rest.is_empty() {
                tracing::trace!(name, "ignoring unknown operator without arguments");
                return Ok(None);
            }
            return Err(Error::msg(format!("unknown operator `{name}`")));
        };

        if op.phase() != phase {
            return Ok(None);
        }

        let args = parse_args(rest)?;
        Ok(Some(Opcall::new(name.to_string(), args, phase, src.to_string())))
    }

    /// True for strings that look like `(( ... ))`
    pub fn is_call(src: &str) -> bool {
        call_body(src).is_some()
    }

    pub fn at(mut self, location: Cursor) -> Self {
        self.location = location;
        self
    }
}

fn call_body(src: &str) -> Option<&str> {
    let inner = src.trim().strip_prefix("((")?.strip_suffix("))")?;
    Some(inner.trim())
}

#[derive(Debug, PartialEq)]
enum Token {
    Quoted(String),
    Bare(String),
    Or,
}

/// Splits an argument list into tokens, remembering where each started
fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, Error> {
    let syntax = |problem: &str, position: usize| Error::Syntax {
        input: input.to_string(),
        problem: problem.to_string(),
        position,
    };

    let chars: Vec<char> = input.chars().collect();
    let mut tokens = vec![];
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() || c == ',' => i += 1,
            '"' => {
                let start = i;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax("unterminated string literal", start)),
                        Some('"') => break,
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some(escaped @ ('"' | '\\')) => text.push(*escaped),
                                Some(other) => {
                                    text.push('\\');
                                    text.push(*other);
                                }
                                None => return Err(syntax("unterminated string literal", start)),
                            }
                            i += 2;
                        }
                        Some(other) => {
                            text.push(*other);
                            i += 1;
                        }
                    }
                }
                i += 1;
                tokens.push((start, Token::Quoted(text)));
            }
            '|' => {
                if chars.get(i + 1) != Some(&'|') {
                    return Err(syntax("expected '||'", i));
                }
                tokens.push((i, Token::Or));
                i += 2;
            }
            _ => {
                let start = i;
                let mut text = String::new();
                while let Some(&c) = chars.get(i) {
                    if c.is_whitespace() || c == ',' || c == '|' || c == '"' {
                        break;
                    }
                    text.push(c);
                    i += 1;
                }
                tokens.push((start, Token::Bare(text)));
            }
        }
    }

    Ok(tokens)
}

/// Parses an argument list into expressions
pub fn parse_args(input: &str) -> Result<Vec<Expr>, Error> {
    let syntax = |problem: &str, position: usize| Error::Syntax {
        input: input.to_string(),
        problem: problem.to_string(),
        position,
    };

    let mut args: Vec<Expr> = vec![];
    let mut pending_or: Option<usize> = None;

    for (position, token) in tokenize(input)? {
        let operand = match token {
            Token::Or => {
                if args.is_empty() || pending_or.is_some() {
                    return Err(syntax("'||' needs an expression on its left", position));
                }
                pending_or = Some(position);
                continue;
            }
            Token::Quoted(text) => Expr::Literal(Value::String(text)),
            Token::Bare(text) => operand(&text).map_err(|err| match err {
                Error::Syntax { problem, position: offset, .. } => {
                    syntax(&problem, position + offset)
                }
                other => other,
            })?,
        };

        let left = pending_or.take().and_then(|_| args.pop());
        match left {
            Some(left) => args.push(Expr::or(left, operand)),
            None => args.push(operand),
        }
    }

    if let Some(position) = pending_or {
        return Err(syntax("'||' needs an expression on its right", position));
    }

    Ok(args)
}

fn operand(text: &str) -> Result<Expr, Error> {
    match text {
        "nil" | "null" | "~" => return Ok(Expr::Literal(Value::Null)),
        "true" => return Ok(Expr::Literal(Value::Boolean(true))),
        "false" => return Ok(Expr::Literal(Value::Boolean(false))),
        _ => {}
    }

    if let Some(number) = number(text) {
        return Ok(Expr::Literal(number));
    }

    if let Some(name) = text.strip_prefix('$') {
        if name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            return Ok(Expr::EnvVar(name.to_string()));
        }
    }

    Cursor::parse(text).map(Expr::Reference)
}

fn number(text: &str) -> Option<Value> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || fraction.is_some_and(|f| !all_digits(f)) {
        return None;
    }

    if fraction.is_none() {
        if let Ok(int) = text.parse::<i64>() {
            return Some(Value::Integer(int));
        }
    }
    text.parse::<f64>().ok().map(Value::Decimal)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference(s: &str) -> Expr {
        Expr::Reference(Cursor::parse(s).unwrap())
    }

    fn literal(v: impl Into<Value>) -> Expr {
        Expr::Literal(v.into())
    }

    fn parse(src: &str) -> Opcall {
        Opcall::parse(Phase::Eval, src)
            .expect("must parse")
            .expect("must be an eval phase call")
    }

    #[test]
    fn simple_call() {
        let call = parse("(( grab meta.name ))");
        assert_eq!(call.name, "grab");
        assert_eq!(call.args, vec![reference("meta.name")]);
    }

    #[test]
    fn parenthesized_and_comma_separated() {
        for src in [
            "(( concat(a, \"b\", 1) ))",
            "((concat a \"b\" 1))",
            "((\tconcat\ta,\"b\",\t1 ))",
            "(( concat (a \"b\" 1) ))",
        ] {
            assert_eq!(parse(src).args, vec![reference("a"), literal("b"), literal(1)], "{src}");
        }
    }

    #[test]
    fn literals() {
        let call = parse(r#"(( concat "with \"quotes\" and \\" 3.25 -7 nil true 18446744073709551616 ))"#);
        assert_eq!(
            call.args,
            vec![
                literal(r#"with "quotes" and \"#),
                literal(3.25),
                literal(-7),
                Expr::Literal(Value::Null),
                literal(true),
                literal(18446744073709551616.0),
            ]
        );
    }

    #[test]
    fn environment_variables_and_root_references() {
        let call = parse("(( concat $HOME $dotted.name $.meta.x ))");
        assert_eq!(
            call.args,
            vec![
                Expr::EnvVar("HOME".into()),
                Expr::EnvVar("dotted.name".into()),
                reference("meta.x"),
            ]
        );
    }

    #[test]
    fn logical_or_is_left_associative() {
        let call = parse("(( grab a || b || \"c\" ))");
        assert_eq!(
            call.args,
            vec![Expr::or(Expr::or(reference("a"), reference("b")), literal("c"))]
        );
    }

    #[test]
    fn logical_or_syntax_errors() {
        for src in ["(( grab || a ))", "(( grab a || ))", "(( grab a || || b ))", "(( grab a | b ))"] {
            assert!(
                matches!(Opcall::parse(Phase::Eval, src), Err(Error::Syntax { .. })),
                "{src}"
            );
        }
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(
            Opcall::parse(Phase::Eval, r#"(( concat "abc ))"#),
            Err(Error::Syntax { position: 0, .. })
        ));
    }

    #[test]
    fn non_calls_are_ignored() {
        for src in ["plain", "(( 1 + 2 ))", "((!grab foo))", "(( var-name ))", "((unknown_marker))"] {
            assert_eq!(Opcall::parse(Phase::Eval, src), Ok(None), "{src}");
        }
    }

    #[test]
    fn unknown_operator_with_arguments_is_an_error() {
        assert_eq!(
            Opcall::parse(Phase::Eval, "(( nope a b ))"),
            Err(Error::msg("unknown operator `nope`"))
        );
    }

    #[test]
    fn phase_filtering() {
        assert_eq!(Opcall::parse(Phase::Merge, "(( grab a ))"), Ok(None));
        assert!(Opcall::parse(Phase::Merge, "(( inject a ))").unwrap().is_some());
        assert_eq!(Opcall::parse(Phase::Eval, "(( inject a ))"), Ok(None));
    }

    #[test]
    fn bad_reference_reports_position() {
        let Err(Error::Syntax { position, .. }) = Opcall::parse(Phase::Eval, "(( grab a]b ))") else {
            panic!("expected syntax error");
        };
        assert_eq!(position, 1);
    }
}
