//! Primitive value conversion shared by both codecs

use crate::error::{FormatError, Result};
use fhirkit_models::{DecimalValue, PrimitiveKind, PrimitiveValue};
use std::borrow::Cow;

/// Check that a stored value fits the declared kind; the error is the stored
/// value's kind name.
pub(crate) fn check_value(kind: PrimitiveKind, value: &PrimitiveValue) -> std::result::Result<(), &'static str> {
    let fits = match value {
        PrimitiveValue::Boolean(_) => kind == PrimitiveKind::Boolean,
        PrimitiveValue::Decimal(_) => kind == PrimitiveKind::Decimal,
        PrimitiveValue::Integer(i) => kind
            .integer_bounds()
            .is_some_and(|(min, max)| (min..=max).contains(i)),
        PrimitiveValue::String(_) => {
            !kind.is_integer() && !matches!(kind, PrimitiveKind::Boolean | PrimitiveKind::Decimal)
        }
    };
    if fits {
        Ok(())
    } else {
        Err(value.kind_name())
    }
}

/// Textual form used by XML `value` attributes
pub(crate) fn to_text(value: &PrimitiveValue) -> Cow<'_, str> {
    match value {
        PrimitiveValue::Boolean(true) => Cow::Borrowed("true"),
        PrimitiveValue::Boolean(false) => Cow::Borrowed("false"),
        PrimitiveValue::Integer(i) => Cow::Owned(i.to_string()),
        PrimitiveValue::Decimal(d) => Cow::Borrowed(d.as_str()),
        PrimitiveValue::String(s) => Cow::Borrowed(s),
    }
}

/// Parse the textual form of a primitive of the given kind
pub(crate) fn from_text(kind: PrimitiveKind, text: &str) -> Result<PrimitiveValue> {
    match kind {
        PrimitiveKind::Boolean => match text {
            "true" => Ok(PrimitiveValue::Boolean(true)),
            "false" => Ok(PrimitiveValue::Boolean(false)),
            _ => Err(FormatError::conversion(text, kind, "expected 'true' or 'false'")),
        },
        PrimitiveKind::Decimal => DecimalValue::parse(text)
            .map(PrimitiveValue::Decimal)
            .map_err(|_| FormatError::conversion(text, kind, "not a decimal literal")),
        k if k.is_integer() => parse_integer(k, text).map(PrimitiveValue::Integer),
        _ => Ok(PrimitiveValue::String(text.to_string())),
    }
}

/// Parse an integer literal and check it against the kind's range
pub(crate) fn parse_integer(kind: PrimitiveKind, text: &str) -> Result<i64> {
    let value: i64 = text
        .parse()
        .map_err(|_| FormatError::conversion(text, kind, "not an integer"))?;
    check_integer(kind, value, text)
}

pub(crate) fn check_integer(kind: PrimitiveKind, value: i64, text: &str) -> Result<i64> {
    match kind.integer_bounds() {
        Some((min, max)) if value < min || value > max => Err(FormatError::conversion(
            text,
            kind,
            format!("out of range {}..={}", min, max),
        )),
        _ => Ok(value),
    }
}
