use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::{collections::BTreeMap, fmt};

/// A record: attribute name to typed value.
///
/// Records are partial by nature: only the attributes present are exported, so a
/// record can carry a full item or just the attributes of an update.
pub type Record = BTreeMap<String, Value>;

/// Most significant digits an `N` attribute keeps
const MAX_DIGITS: usize = 38;
/// Largest decimal exponent of the leading digit
const MAX_EXPONENT: i64 = 125;
/// Smallest decimal exponent of the leading digit
const MIN_EXPONENT: i64 = -130;

/// Exact decimal in the range an `N` attribute holds
///
/// The value is `digits * 10^scale`. Digits carry no leading or trailing
/// zeros, and zero is the empty digit string with a positive sign, so equal
/// values have equal representations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Decimal {
    negative: bool,
    digits: String,
    scale: i64,
}

impl Decimal {
    /// Parse decimal notation with an optional exponent.
    ///
    /// Returns `None` for malformed input and for numbers the store would
    /// reject: more than 38 significant digits or a magnitude outside
    /// `1e-130..1e126`.
    pub(crate) fn parse(s: &str) -> Option<Decimal> {
        let (negative, unsigned) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i64>().ok()?),
            None => (unsigned, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let all = format!("{whole}{fraction}");
        let significant = all.trim_start_matches('0');
        let digits = significant.trim_end_matches('0');
        if digits.is_empty() {
            return Some(Decimal::zero());
        }
        if digits.len() > MAX_DIGITS {
            return None;
        }

        let trailing = (significant.len() - digits.len()) as i64;
        let scale = exponent
            .checked_sub(fraction.len() as i64)?
            .checked_add(trailing)?;
        let decimal = Decimal {
            negative,
            digits: digits.to_string(),
            scale,
        };
        (MIN_EXPONENT..=MAX_EXPONENT)
            .contains(&decimal.exponent())
            .then_some(decimal)
    }

    fn zero() -> Decimal {
        Decimal {
            negative: false,
            digits: String::new(),
            scale: 0,
        }
    }

    /// Decimal exponent of the leading digit
    fn exponent(&self) -> i64 {
        self.digits.len() as i64 - 1 + self.scale
    }

    /// Digits shifted so the value reads `digits * 10^scale` at a lower `scale`
    fn aligned(&self, scale: i64) -> String {
        let shift = usize::try_from(self.scale - scale).unwrap_or(0);
        format!("{}{}", self.digits, "0".repeat(shift))
    }

    /// Exact sum, or `None` when it leaves the storable range
    pub(crate) fn checked_add(&self, other: &Decimal) -> Option<Decimal> {
        let scale = self.scale.min(other.scale);
        let (a, b) = (self.aligned(scale), other.aligned(scale));
        let (negative, digits) = if self.negative == other.negative {
            (self.negative, add_digits(&a, &b))
        } else {
            match compare_digits(&a, &b) {
                Ordering::Less => (other.negative, subtract_digits(&b, &a)),
                _ => (self.negative, subtract_digits(&a, &b)),
            }
        };
        if digits.trim_start_matches('0').is_empty() {
            return Some(Decimal::zero());
        }
        let sign = if negative { "-" } else { "" };
        Decimal::parse(&format!("{sign}{digits}e{scale}"))
    }
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn add_digits(a: &str, b: &str) -> String {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let width = a.len().max(b.len());
    let digit = |s: &[u8], i: usize| if i < s.len() { s[s.len() - 1 - i] - b'0' } else { 0 };

    let mut sum = Vec::with_capacity(width + 1);
    let mut carry = 0;
    for i in 0..width {
        let total = digit(a, i) + digit(b, i) + carry;
        sum.push(b'0' + total % 10);
        carry = total / 10;
    }
    if carry > 0 {
        sum.push(b'0' + carry);
    }
    sum.reverse();
    String::from_utf8(sum).unwrap_or_default()
}

/// `a - b` for `a >= b`
fn subtract_digits(a: &str, b: &str) -> String {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let digit = |s: &[u8], i: usize| -> i8 {
        if i < s.len() {
            (s[s.len() - 1 - i] - b'0') as i8
        } else {
            0
        }
    };

    let mut difference = Vec::with_capacity(a.len());
    let mut borrow = 0;
    for i in 0..a.len() {
        let mut d = digit(a, i) - digit(b, i) - borrow;
        borrow = 0;
        if d < 0 {
            d += 10;
            borrow = 1;
        }
        difference.push(b'0' + d as u8);
    }
    difference.reverse();
    String::from_utf8(difference).unwrap_or_default()
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let sign = |d: &Decimal| match (d.digits.is_empty(), d.negative) {
            (true, _) => 0,
            (false, true) => -1,
            (false, false) => 1,
        };
        match sign(self).cmp(&sign(other)) {
            Ordering::Equal => {}
            unequal => return unequal,
        }

        let magnitude = self
            .exponent()
            .cmp(&other.exponent())
            .then_with(|| self.digits.cmp(&other.digits));
        if self.negative {
            magnitude.reverse()
        } else {
            magnitude
        }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Decimal {
    /// Plain notation, the form the store returns numbers in
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.digits.is_empty() {
            return f.write_str("0");
        }
        if self.negative {
            f.write_str("-")?;
        }
        let point = self.digits.len() as i64 + self.scale;
        if self.scale >= 0 {
            write!(f, "{}{}", self.digits, "0".repeat(self.scale as usize))
        } else if point > 0 {
            let (whole, fraction) = self.digits.split_at(point as usize);
            write!(f, "{whole}.{fraction}")
        } else {
            write!(f, "0.{}{}", "0".repeat((-point) as usize), self.digits)
        }
    }
}

/// Compare two `N` wire strings by value
pub(crate) fn compare_numbers(a: &str, b: &str) -> Option<Ordering> {
    Some(Decimal::parse(a)?.cmp(&Decimal::parse(b)?))
}

/// Numeric value as stored in `N` attributes
#[derive(Clone, Debug, PartialEq)]
pub enum Number {
    /// Integral number
    Int(i64),
    /// Floating point number (always finite)
    Float(f64),
    /// Exact decimal neither an `i64` nor an `f64` holds without loss, in
    /// plain notation
    Decimal(String),
}

impl Number {
    /// Parse the decimal string form used on the wire.
    ///
    /// Integral strings that fit an `i64` become [`Number::Int`]. Other strings
    /// become [`Number::Float`] when the float prints back as the same string,
    /// and [`Number::Decimal`] otherwise, so no digit is ever rounded away.
    /// Strings the store cannot hold are rejected.
    pub fn parse(s: &str) -> Option<Number> {
        if let Ok(int) = s.parse::<i64>() {
            return Some(Number::Int(int));
        }
        let decimal = Decimal::parse(s)?;
        match s.parse::<f64>() {
            Ok(float) if float.is_finite() && format!("{float:?}") == s => {
                Some(Number::Float(float))
            }
            _ => Some(Number::Decimal(decimal.to_string())),
        }
    }

    /// Integral value, if this number is an integer that fits an `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::Float(_) | Number::Decimal(_) => None,
        }
    }

    /// Value as a float, rounded for decimals
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
            Number::Decimal(s) => s.parse().unwrap_or(f64::NAN),
        }
    }

    /// Wire string, or `None` when the store cannot hold the value
    pub(crate) fn to_wire(&self) -> Option<String> {
        match self {
            Number::Int(i) => Some(i.to_string()),
            Number::Float(f) if f.is_finite() => {
                let wire = format!("{f:?}");
                Decimal::parse(&wire).map(|_| wire)
            }
            Number::Float(_) => None,
            Number::Decimal(s) => Decimal::parse(s).map(|d| d.to_string()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            // Debug keeps a fractional or exponent part, so the value parses back as a float
            Number::Float(x) => write!(f, "{x:?}"),
            Number::Decimal(s) => f.write_str(s),
        }
    }
}

/// Application-level typed value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// UTF-8 string
    String(String),
    /// Number
    Number(Number),
    /// Boolean flag
    Bool(bool),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Set of strings
    StringSet(Vec<String>),
    /// Set of numbers
    NumberSet(Vec<Number>),
    /// Set of byte strings
    BinarySet(Vec<Vec<u8>>),
    /// Arbitrary JSON, stored either as a JSON string or as a native document
    Json(serde_json::Value),
    /// Point in time with millisecond precision
    Date(DateTime<Utc>),
}

impl Value {
    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Binary(_) => "binary",
            Value::StringSet(_) => "string set",
            Value::NumberSet(_) => "number set",
            Value::BinarySet(_) => "binary set",
            Value::Json(_) => "json",
            Value::Date(_) => "date",
        }
    }

    /// String content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integral number
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Float content, if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    /// Boolean content, if this is a flag
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Number::Int(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(Number::Int(value.into()))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(Number::Int(value.into()))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(int) => Value::Number(Number::Int(int)),
            Err(_) => Value::Number(Number::Decimal(value.to_string())),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(Number::Float(value))
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_parse_int_and_float() {
        assert_eq!(Number::parse("42"), Some(Number::Int(42)));
        assert_eq!(Number::parse("-7"), Some(Number::Int(-7)));
        assert_eq!(Number::parse("2.5"), Some(Number::Float(2.5)));
        assert_eq!(Number::parse("2.0"), Some(Number::Float(2.0)));
    }

    #[test]
    fn test_number_parse_rejects_non_numeric() {
        assert_eq!(Number::parse("abc"), None);
        assert_eq!(Number::parse(""), None);
        assert_eq!(Number::parse("inf"), None);
        assert_eq!(Number::parse("NaN"), None);
    }

    #[test]
    fn test_number_parse_keeps_every_digit() {
        let big = "12345678901234567890123";
        assert_eq!(Number::parse(big), Some(Number::Decimal(big.to_string())));
        assert_eq!(Number::parse(big).unwrap().to_wire().unwrap(), big);

        let id = "10000000000000000001";
        assert_eq!(Number::parse(id).unwrap().to_string(), id);
        assert_eq!(Value::from(10000000000000000001u64), Value::Number(Number::Decimal(id.into())));

        let precise = "0.1234567890123456789";
        assert_eq!(Number::parse(precise).unwrap().to_wire().unwrap(), precise);
        assert_eq!(Number::parse("1e5"), Some(Number::Decimal("100000".to_string())));
        assert_eq!(Number::parse("-0.000120"), Some(Number::Decimal("-0.00012".to_string())));
    }

    #[test]
    fn test_number_parse_rejects_unstorable() {
        assert_eq!(Number::parse(&"1".repeat(39)), None);
        assert_eq!(Number::parse("1e126"), None);
        assert_eq!(Number::parse("1e-131"), None);
        assert_eq!(Number::parse("1.2.3"), None);
        assert_eq!(Number::parse("12e"), None);
        assert!(Number::parse(&"9".repeat(38)).is_some());
        assert_eq!(Number::Float(1e300).to_wire(), None);
        assert_eq!(Number::Decimal("twelve".to_string()).to_wire(), None);
    }

    #[test]
    fn test_compare_numbers_by_value() {
        assert_eq!(compare_numbers("2.0", "2"), Some(Ordering::Equal));
        assert_eq!(compare_numbers("10", "9.99"), Some(Ordering::Greater));
        assert_eq!(compare_numbers("-10", "-9"), Some(Ordering::Less));
        assert_eq!(compare_numbers("0", "-0.0"), Some(Ordering::Equal));
        assert_eq!(
            compare_numbers("12345678901234567890124", "12345678901234567890123"),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_numbers("a", "1"), None);
    }

    #[test]
    fn test_decimal_add_is_exact() {
        let sum = |a: &str, b: &str| {
            Decimal::parse(a)
                .unwrap()
                .checked_add(&Decimal::parse(b).unwrap())
                .map(|d| d.to_string())
        };
        assert_eq!(sum("10000000000000000001", "1").unwrap(), "10000000000000000002");
        assert_eq!(sum("0.1", "0.2").unwrap(), "0.3");
        assert_eq!(sum("1.5", "-2").unwrap(), "-0.5");
        assert_eq!(sum("5", "-5").unwrap(), "0");
        assert_eq!(sum("9e125", "9e125"), None);
    }

    #[test]
    fn test_number_display_keeps_float_marker() {
        assert_eq!(Number::Int(3).to_string(), "3");
        assert_eq!(Number::Float(3.0).to_string(), "3.0");
        assert_eq!(Number::Float(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from("a").as_str(), Some("a"));
        assert_eq!(Value::from(5i64).as_i64(), Some(5));
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("a").as_i64(), None);
    }
}
