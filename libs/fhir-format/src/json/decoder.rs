//! Token-driven JSON decoder
//!
//! Objects are decoded field by field straight from the token stream. Each
//! field collects into a pending record that takes the value key and the `_`
//! sidecar key in either order and is only turned into values once the
//! object closes.

use super::reader::Reader;
use crate::contained;
use crate::error::{FormatError, Result};
use crate::primitive::parse_integer;
use fhirkit_models::{
    DecimalValue, Element, FieldDefinition, Primitive, PrimitiveKind, PrimitiveMeta,
    PrimitiveValue, Resource, TypeDefinition, TypeKind, TypeRegistry, Value,
};
use std::collections::BTreeMap;

pub(crate) struct Decoder<'r, 'a> {
    registry: &'r TypeRegistry,
    reader: Reader<'a>,
}

/// Decode a resource whose type is given by its own `resourceType`.
///
/// `base` is the absolute offset of `data` within the outer document and
/// `depth` the nesting it is found at.
pub(crate) fn any_resource(
    registry: &TypeRegistry,
    data: &[u8],
    base: usize,
    depth: usize,
) -> Result<Resource> {
    let discriminator = peek_resource_type(data, base, depth)?;
    let type_def = contained::resolve(registry, &discriminator)?;
    let mut decoder = Decoder {
        registry,
        reader: Reader::nested(data, base, depth),
    };
    let resource = decoder.resource_as(type_def)?;
    decoder.finish()?;
    Ok(resource)
}

/// Find the `resourceType` member of an object without decoding anything else
fn peek_resource_type(data: &[u8], base: usize, depth: usize) -> Result<String> {
    let mut reader = Reader::nested(data, base, depth);
    reader.open(b'{')?;
    let mut first = true;
    while reader.next_member(&mut first, b'}')? {
        if reader.read_key()? == "resourceType" {
            return Ok(reader.read_str()?.into_owned());
        }
        reader.skip_value()?;
    }
    Err(FormatError::MissingResourceType { offset: base })
}

impl<'r, 'a> Decoder<'r, 'a> {
    pub fn new(registry: &'r TypeRegistry, data: &'a [u8]) -> Self {
        Self {
            registry,
            reader: Reader::new(data),
        }
    }

    /// Decode a resource of a known type; its `resourceType` member is skipped
    pub fn resource_as(&mut self, type_def: &TypeDefinition) -> Result<Resource> {
        self.object(type_def, true).map(Resource::from_element)
    }

    pub fn element_as(&mut self, type_def: &TypeDefinition) -> Result<Element> {
        self.object(type_def, false)
    }

    /// Require the end of input after the decoded value
    pub fn finish(&mut self) -> Result<()> {
        self.reader.finish()
    }

    fn object(&mut self, type_def: &TypeDefinition, is_resource: bool) -> Result<Element> {
        self.reader.open(b'{')?;
        let mut pending: BTreeMap<usize, Pending<'_>> = BTreeMap::new();
        let mut first = true;

        while self.reader.next_member(&mut first, b'}')? {
            let key = self.reader.read_key()?;
            if is_resource && key == "resourceType" {
                self.reader.read_str()?;
                continue;
            }

            let (sidecar, wire_key) = match key.strip_prefix('_') {
                Some(rest) => (true, rest),
                None => (false, &*key),
            };
            let resolved = type_def
                .resolve_key(wire_key)
                .ok_or_else(|| FormatError::unknown_field(&*key, &type_def.name))?;
            let field = resolved.field;
            let value_type = self.registry.require_type(resolved.type_name)?;
            if sidecar && !value_type.is_primitive() {
                return Err(FormatError::unknown_field(&*key, &type_def.name));
            }

            let record = pending
                .entry(resolved.index)
                .or_insert_with(|| Pending::new(resolved.type_name));
            // A second variant of the same choice field
            if record.type_name != resolved.type_name {
                return Err(FormatError::duplicate_field(&field.wire_name, &type_def.name));
            }
            let seen = if sidecar {
                &mut record.seen_meta
            } else {
                &mut record.seen_value
            };
            if std::mem::replace(seen, true) {
                return Err(FormatError::duplicate_field(&*key, &type_def.name));
            }

            match value_type.kind {
                TypeKind::Primitive if sidecar => self.sidecars(field, record)?,
                TypeKind::Primitive => {
                    let kind = value_type.primitive.unwrap_or_default();
                    self.primitives(field, kind, record)?;
                }
                TypeKind::Element if !field.is_resource() => {
                    self.each(field, |decoder, _| {
                        let element = decoder.element_as(value_type)?;
                        record.values.push(element.into());
                        Ok(())
                    })?;
                }
                _ => {
                    self.each(field, |decoder, _| {
                        let resource = decoder.contained()?;
                        record.values.push(resource.into());
                        Ok(())
                    })?;
                }
            }
        }
        self.reader.close();

        let mut element = Element::new(type_def.name.clone());
        for (index, record) in pending {
            element.set_all(type_def.fields()[index].wire_name.clone(), record.finish());
        }
        Ok(element)
    }

    /// Run `decode` once for a single-valued field, or per array entry
    fn each(
        &mut self,
        field: &FieldDefinition,
        mut decode: impl FnMut(&mut Self, usize) -> Result<()>,
    ) -> Result<()> {
        if !field.multiple() {
            return decode(self, 0);
        }
        self.reader.open(b'[')?;
        let mut first = true;
        let mut index = 0;
        while self.reader.next_member(&mut first, b']')? {
            decode(self, index)?;
            index += 1;
        }
        self.reader.close();
        Ok(())
    }

    fn primitives(&mut self, field: &FieldDefinition, kind: PrimitiveKind, record: &mut Pending<'_>) -> Result<()> {
        self.each(field, |decoder, index| {
            if !decoder.reader.eat_null() {
                let value = decoder.literal(kind)?;
                record.slot(index).value = Some(value);
            }
            Ok(())
        })
    }

    fn sidecars(&mut self, field: &FieldDefinition, record: &mut Pending<'_>) -> Result<()> {
        let owner = record.type_name;
        self.each(field, |decoder, index| {
            if !decoder.reader.eat_null() {
                let meta = decoder.meta(owner)?;
                record.slot(index).meta = Some(meta);
            }
            Ok(())
        })
    }

    /// A sidecar object: `{"id": ..., "extension": [...]}`
    fn meta(&mut self, owner: &str) -> Result<PrimitiveMeta> {
        let mut meta = PrimitiveMeta::default();
        let mut seen_extension = false;
        self.reader.open(b'{')?;
        let mut first = true;
        while self.reader.next_member(&mut first, b'}')? {
            let key = self.reader.read_key()?;
            match &*key {
                "id" if meta.id.is_none() => {
                    meta.id = Some(self.reader.read_str()?.into_owned());
                }
                "extension" if !seen_extension => {
                    seen_extension = true;
                    let extension = self.registry.require_type("Extension")?;
                    self.reader.open(b'[')?;
                    let mut first = true;
                    while self.reader.next_member(&mut first, b']')? {
                        meta.extension.push(self.element_as(extension)?);
                    }
                    self.reader.close();
                }
                "id" | "extension" => return Err(FormatError::duplicate_field(&*key, owner)),
                _ => return Err(FormatError::unknown_field(&*key, owner)),
            }
        }
        self.reader.close();
        Ok(meta)
    }

    fn literal(&mut self, kind: PrimitiveKind) -> Result<PrimitiveValue> {
        match kind {
            PrimitiveKind::Boolean => self.reader.read_bool().map(PrimitiveValue::Boolean),
            PrimitiveKind::Decimal => {
                let text = self.reader.read_number()?;
                Ok(PrimitiveValue::Decimal(DecimalValue::parse(text)?))
            }
            k if k.is_json_number() => {
                let text = self.reader.read_number()?;
                parse_integer(k, text).map(PrimitiveValue::Integer)
            }
            k if k.is_integer() => {
                let text = self.reader.read_str()?;
                parse_integer(k, &text).map(PrimitiveValue::Integer)
            }
            _ => Ok(PrimitiveValue::String(self.reader.read_str()?.into_owned())),
        }
    }

    /// A resource-typed value: decoded by a fresh decoder over its own span
    fn contained(&mut self) -> Result<Resource> {
        let depth = self.reader.depth();
        let (span, offset) = self.reader.skip_value()?;
        any_resource(self.registry, span, offset, depth)
    }
}

/// Decode state of one field while its object is open
struct Pending<'t> {
    /// Concrete type; fixes the variant of a choice field
    type_name: &'t str,
    seen_value: bool,
    seen_meta: bool,
    /// Primitive positions, padded as either array reaches them
    slots: Vec<Slot>,
    /// Element and resource values
    values: Vec<Value>,
}

#[derive(Default)]
struct Slot {
    value: Option<PrimitiveValue>,
    meta: Option<PrimitiveMeta>,
}

impl<'t> Pending<'t> {
    fn new(type_name: &'t str) -> Self {
        Self {
            type_name,
            seen_value: false,
            seen_meta: false,
            slots: Vec::new(),
            values: Vec::new(),
        }
    }

    fn slot(&mut self, index: usize) -> &mut Slot {
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, Slot::default);
        }
        &mut self.slots[index]
    }

    fn finish(self) -> Vec<Value> {
        if self.slots.is_empty() {
            return self.values;
        }
        let type_name = self.type_name;
        self.slots
            .into_iter()
            .map(|slot| {
                Value::Primitive(Primitive {
                    type_name: type_name.to_string(),
                    value: slot.value,
                    meta: slot.meta.unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_DEPTH;
    use fhirkit_models::core_registry;

    fn decode(json: &str) -> Result<Resource> {
        any_resource(core_registry(), json.as_bytes(), 0, 0)
    }

    #[test]
    fn sidecar_order_does_not_matter() {
        let before = decode(r#"{"resourceType":"Patient","_gender":{"id":"g"},"gender":"male"}"#).unwrap();
        let after = decode(r#"{"resourceType":"Patient","gender":"male","_gender":{"id":"g"}}"#).unwrap();
        assert_eq!(before, after);
        let gender = before.get_primitive("gender").unwrap();
        assert_eq!(gender.as_str(), Some("male"));
        assert_eq!(gender.meta.id.as_deref(), Some("g"));
    }

    #[test]
    fn arrays_are_padded_to_the_furthest_index() {
        let name = r#"{"resourceType":"Patient","name":[{"_given":[null,null,{"id":"x"}],"given":["a"]}]}"#;
        let patient = decode(name).unwrap();
        let human_name = patient.get("name").unwrap().as_element().unwrap();
        let given = human_name.get_all("given");
        assert_eq!(given.len(), 3);
        let given: Vec<_> = given.iter().map(|v| v.as_primitive().unwrap()).collect();
        assert_eq!(given[0].as_str(), Some("a"));
        assert!(given[1].is_absent());
        assert!(!given[2].has_value());
        assert_eq!(given[2].meta.id.as_deref(), Some("x"));
    }

    #[test]
    fn resource_type_of_static_type_is_not_checked() {
        let registry = core_registry();
        let basic = registry.resource_type("Basic").unwrap();
        let mut decoder = Decoder::new(registry, br#"{"resourceType":"Other","id":"b1"}"#);
        let resource = decoder.resource_as(basic).unwrap();
        assert_eq!(resource.resource_type(), "Basic");
        assert_eq!(resource.id(), Some("b1"));
    }

    #[test]
    fn duplicate_keys_and_choice_variants_fail() {
        assert!(matches!(
            decode(r#"{"resourceType":"Patient","active":true,"active":false}"#),
            Err(FormatError::DuplicateField { ref field, .. }) if field == "active"
        ));
        assert!(matches!(
            decode(r#"{"resourceType":"Patient","deceasedBoolean":true,"deceasedDateTime":"2020"}"#),
            Err(FormatError::DuplicateField { ref field, .. }) if field == "deceased"
        ));
    }

    #[test]
    fn sidecar_on_complex_field_is_unknown() {
        assert!(matches!(
            decode(r#"{"resourceType":"Patient","_name":[{"id":"x"}]}"#),
            Err(FormatError::UnknownField { ref field, .. }) if field == "_name"
        ));
    }

    #[test]
    fn missing_discriminator_reports_offset() {
        let json = r#"{"resourceType":"Patient","contained":[{"id":"x"}]}"#;
        match decode(json) {
            Err(FormatError::MissingResourceType { offset }) => assert_eq!(offset, 39),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    fn nested_extensions(levels: usize) -> String {
        let mut json = String::from(r#"{"resourceType":"Basic","extension":"#);
        for _ in 0..levels {
            json.push_str(r#"[{"url":"u","extension":"#);
        }
        json.push_str("[]");
        for _ in 0..levels {
            json.push_str("}]");
        }
        json.push('}');
        json
    }

    #[test]
    fn deep_nesting_fails_instead_of_overflowing() {
        let err = decode(&nested_extensions(5_000)).unwrap_err();
        assert!(matches!(err, FormatError::DepthLimit { limit: MAX_DEPTH, .. }), "{err}");

        // Each extension level opens an array and an object
        let resource = decode(&nested_extensions(MAX_DEPTH / 2 - 2)).unwrap();
        assert_eq!(resource.get_all("extension").len(), 1);
    }

    #[test]
    fn contained_resources_count_toward_depth() {
        let mut json = String::from(r#"{"resourceType":"Patient","contained":"#);
        let levels = MAX_DEPTH;
        for _ in 0..levels {
            json.push_str(r#"[{"resourceType":"Patient","contained":"#);
        }
        json.push_str("[]");
        for _ in 0..levels {
            json.push_str("}]");
        }
        json.push('}');
        assert!(matches!(decode(&json), Err(FormatError::DepthLimit { .. })));
    }

    #[test]
    fn sidecar_extensions_count_toward_depth() {
        let mut json = String::from(r#"{"resourceType":"Patient","_active":{"extension":"#);
        for _ in 0..MAX_DEPTH {
            json.push_str(r#"[{"url":"u","extension":"#);
        }
        json.push_str("[]");
        for _ in 0..MAX_DEPTH {
            json.push_str("}]");
        }
        json.push_str("}}");
        assert!(matches!(decode(&json), Err(FormatError::DepthLimit { .. })));
    }

    #[test]
    fn trailing_content_is_rejected() {
        assert!(matches!(
            decode(r#"{"resourceType":"Patient"} {}"#),
            Err(FormatError::UnexpectedToken { .. })
        ));
    }
}
