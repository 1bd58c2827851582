//! `Accept-Encoding` parsing and the gzip/identity decision.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum CompressionType {
    Gzip,
    None,
}

/// Outcome of evaluating a single coding from the header.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Acceptance {
    Gzip,
    Identity,
    Reject,
}

/// One member of an `Accept-Encoding` list. `quality` is in thousandths.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Coding {
    pub name: String,
    pub quality: u16,
}

impl Coding {
    fn is_wildcard(&self) -> bool {
        self.name == "*"
    }
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").expect("valid regex"))
}

fn qvalue_pattern() -> &'static Regex {
    static QVALUE: OnceLock<Regex> = OnceLock::new();
    QVALUE.get_or_init(|| {
        Regex::new(r"^(?:0(?:\.[0-9]{0,3})?|1(?:\.0{0,3})?)$").expect("valid regex")
    })
}

fn parse_quality(value: &str) -> Option<u16> {
    if !qvalue_pattern().is_match(value) {
        return None;
    }
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    let mut thousandths = whole.parse::<u16>().ok()? * 1000;
    for (digit, scale) in frac.bytes().zip([100, 10, 1]) {
        thousandths += u16::from(digit - b'0') * scale;
    }
    Some(thousandths)
}

/// Parses an `Accept-Encoding` value. Names are lowercased and `x-gzip` is
/// folded into `gzip`. Empty list members are ignored.
pub fn parse_accept_encoding(header: &str) -> Result<Vec<Coding>> {
    let mut codings = Vec::new();

    for member in header.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        let mut parts = member.split(';').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if !token_pattern().is_match(name) {
            return Err(Error::Negotiation(format!("invalid coding {:?}", name)));
        }

        let mut quality = 1000;
        for param in parts {
            let (key, value) = param
                .split_once('=')
                .ok_or_else(|| Error::Negotiation(format!("invalid parameter {:?}", param)))?;
            if !key.trim().eq_ignore_ascii_case("q") {
                return Err(Error::Negotiation(format!("unsupported parameter {:?}", key)));
            }
            quality = parse_quality(value.trim())
                .ok_or_else(|| Error::Negotiation(format!("invalid quality {:?}", value)))?;
        }

        let name = match name.to_ascii_lowercase().as_str() {
            "x-gzip" => "gzip".to_string(),
            other => other.to_string(),
        };
        codings.push(Coding { name, quality });
    }

    Ok(codings)
}

/// True when `name` has been ruled out: listed with `q=0`, or unlisted while
/// the wildcard carries `q=0`.
pub fn is_disallowed(codings: &[Coding], name: &str) -> bool {
    match codings.iter().find(|c| c.name == name) {
        Some(coding) => coding.quality == 0,
        None => codings.iter().any(|c| c.is_wildcard() && c.quality == 0),
    }
}

/// Decides what a single coding lets the server send.
pub fn evaluate_acceptance(coding: &Coding, codings: &[Coding]) -> Acceptance {
    if coding.quality == 0 {
        return Acceptance::Reject;
    }
    if coding.name == "gzip" || (coding.is_wildcard() && !is_disallowed(codings, "gzip")) {
        Acceptance::Gzip
    } else if coding.name == "identity"
        || (coding.is_wildcard() && !is_disallowed(codings, "identity"))
    {
        Acceptance::Identity
    } else {
        Acceptance::Reject
    }
}

/// Picks the representation for a request. `Ok(None)` means nothing the
/// server has is acceptable; `Err` means the header could not be parsed.
pub fn determine_compression(accept_encoding: Option<&str>) -> Result<Option<CompressionType>> {
    let header = match accept_encoding {
        Some(h) if !h.trim().is_empty() => h,
        _ => return Ok(Some(CompressionType::None)),
    };

    let mut codings = parse_accept_encoding(header)?;
    if codings.is_empty() {
        return Err(Error::Negotiation("no codings listed".to_string()));
    }
    let listed = codings.clone();
    codings.sort_by(|a, b| b.quality.cmp(&a.quality));

    for coding in &codings {
        match evaluate_acceptance(coding, &listed) {
            Acceptance::Gzip => return Ok(Some(CompressionType::Gzip)),
            Acceptance::Identity => return Ok(Some(CompressionType::None)),
            Acceptance::Reject => {}
        }
    }

    if is_disallowed(&listed, "identity") {
        Ok(None)
    } else {
        Ok(Some(CompressionType::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(header: &str) -> Option<CompressionType> {
        determine_compression(Some(header)).unwrap()
    }

    #[test]
    fn test_missing_or_empty_header_is_identity() {
        assert_eq!(determine_compression(None).unwrap(), Some(CompressionType::None));
        assert_eq!(decide(""), Some(CompressionType::None));
        assert_eq!(decide("   "), Some(CompressionType::None));
    }

    #[test]
    fn test_plain_codings() {
        assert_eq!(decide("gzip"), Some(CompressionType::Gzip));
        assert_eq!(decide("GZip"), Some(CompressionType::Gzip));
        assert_eq!(decide("x-gzip"), Some(CompressionType::Gzip));
        assert_eq!(decide("identity"), Some(CompressionType::None));
        assert_eq!(decide("br, deflate"), Some(CompressionType::None));
        assert_eq!(decide("gzip, deflate, br"), Some(CompressionType::Gzip));
    }

    #[test]
    fn test_quality_ordering() {
        assert_eq!(decide("identity;q=1, gzip;q=0.5"), Some(CompressionType::None));
        assert_eq!(decide("identity;q=0.5, gzip;q=0.8"), Some(CompressionType::Gzip));
        assert_eq!(decide("gzip;q=0, identity"), Some(CompressionType::None));
        assert_eq!(decide("gzip;q=0"), Some(CompressionType::None));
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(decide("*"), Some(CompressionType::Gzip));
        assert_eq!(decide("gzip;q=0, *"), Some(CompressionType::None));
        assert_eq!(decide("*;q=0, gzip"), Some(CompressionType::Gzip));
        assert_eq!(decide("*;q=0, identity;q=0.1"), Some(CompressionType::None));
    }

    #[test]
    fn test_nothing_acceptable() {
        assert_eq!(decide("identity;q=0"), None);
        assert_eq!(decide("*;q=0"), None);
        assert_eq!(decide("br, *;q=0"), None);
    }

    #[test]
    fn test_malformed_headers() {
        for header in [
            "gzip;q=2",
            "gzip;q=0.5555",
            "gzip;level=9",
            "gzip;q",
            "gz ip",
            "\"gzip\"",
            ",,",
        ] {
            assert!(
                determine_compression(Some(header)).is_err(),
                "{:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn test_parse_quality() {
        assert_eq!(parse_quality("1"), Some(1000));
        assert_eq!(parse_quality("1.000"), Some(1000));
        assert_eq!(parse_quality("0.5"), Some(500));
        assert_eq!(parse_quality("0.05"), Some(50));
        assert_eq!(parse_quality("0."), Some(0));
        assert_eq!(parse_quality("1.5"), None);
        assert_eq!(parse_quality("-0"), None);
    }

    #[test]
    fn test_evaluate_acceptance_is_pure() {
        let codings = parse_accept_encoding("gzip;q=0, *").unwrap();
        assert_eq!(evaluate_acceptance(&codings[0], &codings), Acceptance::Reject);
        assert_eq!(evaluate_acceptance(&codings[1], &codings), Acceptance::Identity);
        assert_eq!(evaluate_acceptance(&codings[1], &codings), Acceptance::Identity);
    }
}
