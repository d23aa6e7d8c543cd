//! In-memory resource values
//!
//! Values are schema-agnostic: an [`Element`] is a named bag of fields, and the
//! [`TypeRegistry`](crate::TypeRegistry) decides how it maps to the wire.
//! Choice fields are stored under their wire name (`value`, not `value[x]`);
//! the runtime type of the stored value selects the concrete wire key.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

/// Any value a field can hold
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive(Primitive),
    Element(Element),
    Resource(Resource),
}

impl Value {
    /// Runtime type name (the resource type for resources)
    pub fn type_name(&self) -> &str {
        match self {
            Value::Primitive(p) => &p.type_name,
            Value::Element(e) => e.type_name(),
            Value::Resource(r) => r.resource_type(),
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Value::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Primitive> for Value {
    fn from(p: Primitive) -> Self {
        Value::Primitive(p)
    }
}

impl From<Element> for Value {
    fn from(e: Element) -> Self {
        Value::Element(e)
    }
}

impl From<Resource> for Value {
    fn from(r: Resource) -> Self {
        Value::Resource(r)
    }
}

/// Scalar payload of a primitive
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    /// integer, unsignedInt, positiveInt and integer64
    Integer(i64),
    Decimal(DecimalValue),
    /// Every string-like type: code, uri, date/time, base64Binary, xhtml, ...
    String(String),
}

impl PrimitiveValue {
    /// Short description used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            PrimitiveValue::Boolean(_) => "boolean",
            PrimitiveValue::Integer(_) => "integer",
            PrimitiveValue::Decimal(_) => "decimal",
            PrimitiveValue::String(_) => "string",
        }
    }
}

/// A decimal kept in its textual form so `1.10` stays `1.10`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecimalValue(String);

impl DecimalValue {
    /// Validate and wrap a decimal literal (JSON number grammar)
    pub fn parse(text: &str) -> Result<Self> {
        if is_number_literal(text.as_bytes()) {
            Ok(Self(text.to_string()))
        } else {
            Err(Error::InvalidDecimal(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value; fails for literals outside `rust_decimal`'s range
    pub fn to_decimal(&self) -> Result<rust_decimal::Decimal> {
        let parsed = if self.0.contains(|c| c == 'e' || c == 'E') {
            rust_decimal::Decimal::from_scientific(&self.0)
        } else {
            rust_decimal::Decimal::from_str(&self.0)
        };
        parsed.map_err(|_| Error::InvalidDecimal(self.0.clone()))
    }
}

impl FromStr for DecimalValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<rust_decimal::Decimal> for DecimalValue {
    fn from(d: rust_decimal::Decimal) -> Self {
        Self(d.to_string())
    }
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a byte string against the JSON number grammar:
/// `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`
pub fn is_number_literal(bytes: &[u8]) -> bool {
    number_literal_len(bytes) == Some(bytes.len())
}

/// Length of the longest JSON number prefix of `bytes`, if it starts with one
pub fn number_literal_len(bytes: &[u8]) -> Option<usize> {
    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut x = 0;
    if bytes.first() == Some(&b'-') {
        x += 1;
    }
    match bytes.get(x) {
        Some(b'0') => x += 1,
        Some(b'1'..=b'9') => x += digits(x),
        _ => return None,
    }
    if bytes.get(x) == Some(&b'.') {
        let n = digits(x + 1);
        if n == 0 {
            return None;
        }
        x += 1 + n;
    }
    if matches!(bytes.get(x), Some(b'e' | b'E')) {
        let mut y = x + 1;
        if matches!(bytes.get(y), Some(b'+' | b'-')) {
            y += 1;
        }
        let n = digits(y);
        if n == 0 {
            return None;
        }
        x = y + n;
    }
    Some(x)
}

/// The `id`/`extension` sidecar every primitive may carry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveMeta {
    pub id: Option<String>,
    pub extension: Vec<Element>,
}

impl PrimitiveMeta {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.extension.is_empty()
    }
}

/// A primitive value with its metadata sidecar
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// FHIR primitive type name (e.g. "string", "dateTime")
    pub type_name: String,
    pub value: Option<PrimitiveValue>,
    pub meta: PrimitiveMeta,
}

impl Primitive {
    pub fn new(type_name: impl Into<String>, value: PrimitiveValue) -> Self {
        Self {
            type_name: type_name.into(),
            value: Some(value),
            meta: PrimitiveMeta::default(),
        }
    }

    /// A primitive without a value, to carry only an id or extensions
    pub fn empty(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: None,
            meta: PrimitiveMeta::default(),
        }
    }

    /// A string-like primitive of the given type (`code`, `uri`, `date`, ...)
    pub fn text(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(type_name, PrimitiveValue::String(value.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::text("string", value)
    }

    pub fn code(value: impl Into<String>) -> Self {
        Self::text("code", value)
    }

    pub fn uri(value: impl Into<String>) -> Self {
        Self::text("uri", value)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new("boolean", PrimitiveValue::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::new("integer", PrimitiveValue::Integer(value))
    }

    /// A decimal from its literal text; fails when the text is not a number
    pub fn decimal(text: &str) -> Result<Self> {
        Ok(Self::new("decimal", PrimitiveValue::Decimal(DecimalValue::parse(text)?)))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.meta.id = Some(id.into());
        self
    }

    pub fn with_extension(mut self, extension: Element) -> Self {
        self.meta.extension.push(extension);
        self
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn has_meta(&self) -> bool {
        !self.meta.is_empty()
    }

    /// No value, no id and no extensions
    pub fn is_absent(&self) -> bool {
        self.value.is_none() && self.meta.is_empty()
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(PrimitiveValue::String(s)) => Some(s),
            Some(PrimitiveValue::Decimal(d)) => Some(d.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Some(PrimitiveValue::Boolean(b)) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            Some(PrimitiveValue::Integer(i)) => Some(i),
            _ => None,
        }
    }
}

/// A composite value: a complex datatype, a backbone element or a resource body
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    type_name: String,
    fields: BTreeMap<String, Vec<Value>>,
}

impl Element {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// An `Extension` carrying a single `value[x]`
    pub fn extension(url: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new("Extension")
            .with("url", Primitive::uri(url))
            .with("value", value)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Builder form of [`Element::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder form of [`Element::set_all`]
    pub fn with_all<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.set_all(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Replace a field with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), vec![value.into()]);
    }

    /// Replace a field with a list of values; an empty list removes the field
    pub fn set_all(&mut self, name: impl Into<String>, values: Vec<Value>) {
        let name = name.into();
        if values.is_empty() {
            self.fields.remove(&name);
        } else {
            self.fields.insert(name, values);
        }
    }

    /// Append a value to a field
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<Value>> {
        self.fields.remove(name)
    }

    /// First value of a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(|v| v.first())
    }

    /// All values of a field (empty when absent)
    pub fn get_all(&self, name: &str) -> &[Value] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_primitive(&self, name: &str) -> Option<&Primitive> {
        self.get(name).and_then(Value::as_primitive)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get_primitive(name).and_then(Primitive::as_str)
    }

    /// Field names and values, in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A resource: an element whose type name is its `resourceType`
#[derive(Debug, Clone, PartialEq)]
pub struct Resource(Element);

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self(Element::new(resource_type))
    }

    pub fn from_element(element: Element) -> Self {
        Self(element)
    }

    pub fn resource_type(&self) -> &str {
        self.0.type_name()
    }

    /// Logical id, if set
    pub fn id(&self) -> Option<&str> {
        self.0.get_str("id")
    }

    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(self.0.with(name, value))
    }

    pub fn with_all<V: Into<Value>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self(self.0.with_all(name, values))
    }

    pub fn as_element(&self) -> &Element {
        &self.0
    }

    pub fn into_element(self) -> Element {
        self.0
    }
}

impl Deref for Resource {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.0
    }
}

impl DerefMut for Resource {
    fn deref_mut(&mut self) -> &mut Element {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_literal_grammar() {
        for ok in ["0", "-1", "1.10", "6.02e23", "1E-7", "-0.5"] {
            assert!(is_number_literal(ok.as_bytes()), "{ok}");
        }
        for bad in ["", "01", "1.", ".5", "1e", "+1", "1.0x", "-"] {
            assert!(!is_number_literal(bad.as_bytes()), "{bad}");
        }
        assert_eq!(number_literal_len(b"12,"), Some(2));
    }

    #[test]
    fn decimal_keeps_text() {
        let d = DecimalValue::parse("1.10").unwrap();
        assert_eq!(d.as_str(), "1.10");
        assert_eq!(d.to_decimal().unwrap().to_string(), "1.10");
        assert_eq!(DecimalValue::parse("1e3").unwrap().to_decimal().unwrap(), rust_decimal::Decimal::from(1000));
        assert!(DecimalValue::parse("abc").is_err());
    }

    #[test]
    fn primitive_absence() {
        assert!(Primitive::empty("string").is_absent());
        assert!(!Primitive::empty("string").with_id("x").is_absent());
        assert!(!Primitive::boolean(false).is_absent());
    }

    #[test]
    fn element_fields() {
        let mut name = Element::new("HumanName")
            .with("family", Primitive::string("Chalmers"))
            .with_all("given", [Primitive::string("Peter"), Primitive::string("James")]);
        assert_eq!(name.get_str("family"), Some("Chalmers"));
        assert_eq!(name.get_all("given").len(), 2);

        name.set_all("given", Vec::new());
        assert!(name.get("given").is_none());

        let patient = Resource::new("Patient").with("id", Primitive::text("id", "example"));
        assert_eq!(patient.resource_type(), "Patient");
        assert_eq!(patient.id(), Some("example"));
    }
}
