//! IPv4 arithmetic shared by `ips` and `static_ips`
use super::{check_arity, resolve_arg, scalar_arg, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;
use std::net::Ipv4Addr;

/// Inclusive range of IPv4 addresses, stored as integers so arithmetic rolls
/// over octets naturally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IpRange {
    pub first: u32,
    pub last: u32,
}

impl IpRange {
    /// Parses `10.0.0.5`, `10.0.0.5 - 10.0.0.10` or `10.0.0.0/24`
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();

        if let Some((first, last)) = text.split_once('-') {
            let first = parse_ip(first)?;
            let last = parse_ip(last)?;
            if last < first {
                return Err(Error::msg(format!(
                    "invalid IP range `{text}`: the end lies before the start"
                )));
            }
            return Ok(Self { first, last });
        }

        if let Some((ip, bits)) = text.split_once('/') {
            let bits: u32 = bits
                .trim()
                .parse()
                .ok()
                .filter(|bits| *bits <= 32)
                .ok_or_else(|| Error::msg(format!("invalid CIDR `{text}`: bad prefix length")))?;
            let mask = u32::MAX.checked_shl(32 - bits).unwrap_or(0);
            let first = parse_ip(ip)? & mask;
            return Ok(Self {
                first,
                last: first | !mask,
            });
        }

        let ip = parse_ip(text)?;
        Ok(Self { first: ip, last: ip })
    }

    pub fn len(&self) -> u64 {
        u64::from(self.last - self.first) + 1
    }

    /// Address `offset` positions into the range
    pub fn get(&self, offset: u64) -> Option<u32> {
        (offset < self.len()).then(|| self.first + offset as u32)
    }

    pub fn contains(&self, ip: u32) -> bool {
        self.first <= ip && ip <= self.last
    }
}

pub(crate) fn parse_ip(text: &str) -> Result<u32, Error> {
    text.trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| Error::msg(format!("`{}` is not a valid IPv4 address", text.trim())))
}

pub(crate) fn ip_string(ip: u32) -> String {
    Ipv4Addr::from(ip).to_string()
}

/// `(( ips BASE OFFSET [COUNT] ))`
///
/// `BASE` is an address or a CIDR. With a CIDR, negative offsets count back
/// from the end of the network. Returns one address, or a list of `COUNT`
/// consecutive addresses.
pub struct Ips;

impl Operator for Ips {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("ips", args, 2, Some(3))?;

        let base = scalar_arg(ev, "ips", &args[0])?;
        let offset = integer_arg(ev, &args[1])?;
        let count = match args.get(2) {
            Some(arg) => Some(integer_arg(ev, arg)?),
            None => None,
        };

        let range = if base.contains('/') {
            IpRange::parse(&base)?
        } else {
            IpRange {
                first: parse_ip(&base)?,
                last: u32::MAX,
            }
        };

        let start = if offset < 0 {
            if !base.contains('/') {
                return Err(Error::msg(format!(
                    "ips: negative offset {offset} requires a CIDR base, got `{base}`"
                )));
            }
            i128::from(range.len()) + i128::from(offset)
        } else {
            i128::from(offset)
        };

        let address = |index: i128| {
            u64::try_from(index)
                .ok()
                .and_then(|index| range.get(index))
                .map(ip_string)
                .ok_or_else(|| Error::msg(format!("ips: offset {index} is out of range for `{base}`")))
        };

        let result = match count {
            None => Value::String(address(start)?),
            Some(count) if count < 0 => {
                return Err(Error::msg(format!("ips: count must not be negative, got {count}")))
            }
            Some(count) => Value::Array(
                (0..i128::from(count))
                    .map(|i| address(start + i).map(Value::String))
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(Response::Replace(result))
    }
}

fn integer_arg(ev: &Evaluator, arg: &Expr) -> Result<i64, Error> {
    match resolve_arg(ev, arg)? {
        (_, Value::Integer(i)) => Ok(i),
        (Some(cursor), other) => Err(Error::type_mismatch(&cursor, "an integer", other.kind())),
        (None, other) => Err(Error::msg(format!("ips: {arg} is a {}, expected an integer", other.kind()))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operator::test::{evaluator, replace};
    use pretty_assertions::assert_eq;

    #[test]
    fn ranges() {
        let range = IpRange::parse("10.0.0.5 - 10.0.0.10").unwrap();
        assert_eq!(range.len(), 6);
        assert_eq!(range.get(0).map(ip_string).as_deref(), Some("10.0.0.5"));
        assert_eq!(range.get(5).map(ip_string).as_deref(), Some("10.0.0.10"));
        assert_eq!(range.get(6), None);

        let cidr = IpRange::parse("10.0.0.77/24").unwrap();
        assert_eq!(ip_string(cidr.first), "10.0.0.0");
        assert_eq!(ip_string(cidr.last), "10.0.0.255");

        assert_eq!(IpRange::parse("10.0.0.1").unwrap().len(), 1);
        assert_eq!(IpRange::parse("0.0.0.0/0").unwrap().len(), 1 << 32);
    }

    #[test]
    fn octet_rollover() {
        let range = IpRange::parse("10.0.0.250 - 10.0.2.10").unwrap();
        assert_eq!(range.get(6).map(ip_string).as_deref(), Some("10.0.1.0"));
        assert_eq!(range.len(), 6 + 256 + 11);
    }

    #[test]
    fn malformed_input() {
        assert!(IpRange::parse("10.0.0").is_err());
        assert!(IpRange::parse("10.0.0.300").is_err());
        assert!(IpRange::parse("10.0.0.10 - 10.0.0.5").is_err());
        assert!(IpRange::parse("10.0.0.0/33").is_err());
    }

    #[test]
    fn ips_operator() {
        let mut ev = evaluator("net: 10.0.0.0/24\n", "out");
        assert_eq!(replace(&mut ev, "ips", "net 5"), Ok(Value::from("10.0.0.5")));
        assert_eq!(replace(&mut ev, "ips", "net -1"), Ok(Value::from("10.0.0.255")));
        assert_eq!(
            replace(&mut ev, "ips", "\"10.0.0.254\" 0 3"),
            Ok(Value::from(vec!["10.0.0.254", "10.0.0.255", "10.0.1.0"]))
        );
        assert!(replace(&mut ev, "ips", "net 256").is_err());
        assert!(replace(&mut ev, "ips", "\"10.0.0.1\" -1").is_err());
    }
}
