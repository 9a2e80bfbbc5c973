use super::{check_arity, concat_args, resolve_arg, scalar_arg, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;
use base64::Engine;

/// `(( base64 "user:" meta.password ))`
pub struct Base64;

impl Operator for Base64 {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("base64", args, 1, None)?;
        let plain = concat_args(ev, "base64", args)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(plain);
        Ok(Response::Replace(Value::String(encoded)))
    }
}

/// `(( base64-decode meta.encoded ))`
pub struct Base64Decode;

impl Operator for Base64Decode {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("base64-decode", args, 1, Some(1))?;
        let encoded = scalar_arg(ev, "base64-decode", &args[0])?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| Error::msg(format!("base64-decode: {arg} is not valid base64: {err}", arg = args[0])))?;
        let decoded = String::from_utf8(bytes)
            .map_err(|_| Error::msg(format!("base64-decode: {} does not decode to UTF-8 text", args[0])))?;

        Ok(Response::Replace(Value::String(decoded)))
    }
}

/// `(( stringify meta.config ))`: the value rendered as YAML text
pub struct Stringify;

impl Operator for Stringify {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("stringify", args, 1, Some(1))?;
        let (_, value) = resolve_arg(ev, &args[0])?;
        let text = value
            .to_yaml_string()
            .map_err(|err| Error::msg(format!("stringify: unable to render {}: {err}", args[0])))?;
        Ok(Response::Replace(Value::String(text)))
    }
}

#[cfg(test)]
mod test {
    use crate::operator::test::{evaluator, replace};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    const TREE: &str = "user: admin\npass: s3cret\nencoded: YWRtaW46czNjcmV0\nconfig: {b: [1, 2], a: x}\n";

    #[test]
    fn base64_round_trip() {
        let mut ev = evaluator(TREE, "out");
        assert_eq!(
            replace(&mut ev, "base64", r#"user ":" pass"#),
            Ok(Value::from("YWRtaW46czNjcmV0"))
        );
        assert_eq!(replace(&mut ev, "base64-decode", "encoded"), Ok(Value::from("admin:s3cret")));
        assert!(replace(&mut ev, "base64-decode", "\"not base64!\"").is_err());
    }

    #[test]
    fn stringify_renders_yaml() {
        let mut ev = evaluator(TREE, "out");
        assert_eq!(
            replace(&mut ev, "stringify", "config"),
            Ok(Value::from("a: x\nb:\n- 1\n- 2\n"))
        );
    }
}
