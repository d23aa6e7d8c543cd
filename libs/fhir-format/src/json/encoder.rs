//! Streaming JSON encoder
//!
//! Writes straight to the output; any write failure aborts the document.

use crate::contained;
use crate::error::Result;
use crate::fields::{meta_extensions, ordered_fields, FieldEntry, FieldValues};
use fhirkit_models::{
    Element, Primitive, PrimitiveKind, PrimitiveMeta, PrimitiveValue, Resource, TypeDefinition,
    TypeRegistry,
};
use std::io::Write;

pub(crate) struct Encoder<'r, W> {
    registry: &'r TypeRegistry,
    writer: W,
    pretty: bool,
    depth: usize,
    /// A member has been written in the current container
    needs_comma: bool,
}

impl<'r, W: Write> Encoder<'r, W> {
    pub fn new(registry: &'r TypeRegistry, writer: W, pretty: bool) -> Self {
        Self {
            registry,
            writer,
            pretty,
            depth: 0,
            needs_comma: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Encode a resource object, `resourceType` first
    pub fn resource(&mut self, resource: &Resource) -> Result<()> {
        let type_def = contained::definition_of(self.registry, resource)?;
        self.begin(b'{')?;
        self.key("resourceType")?;
        self.string(resource.resource_type())?;
        self.fields(type_def, resource)?;
        self.end(b'}')
    }

    /// Encode an element object of the given type
    pub fn element(&mut self, type_def: &TypeDefinition, element: &Element) -> Result<()> {
        self.begin(b'{')?;
        self.fields(type_def, element)?;
        self.end(b'}')
    }

    fn fields(&mut self, type_def: &TypeDefinition, element: &Element) -> Result<()> {
        let registry = self.registry;
        for entry in ordered_fields(registry, type_def, element)? {
            let key = entry.key();
            match &entry.values {
                FieldValues::Primitive(values) => self.primitive_field(&entry, &key, values)?,
                FieldValues::Element(values) => {
                    let value_type = registry.require_type(entry.type_name)?;
                    self.key(&key)?;
                    self.many(&entry, values, |enc, e| enc.element(value_type, e))?;
                }
                FieldValues::Resource(values) => {
                    self.key(&key)?;
                    self.many(&entry, values, |enc, r| enc.resource(r))?;
                }
            }
        }
        Ok(())
    }

    /// Write one value, or an array of values for a repeating field
    fn many<T>(
        &mut self,
        entry: &FieldEntry<'_>,
        values: &[&T],
        mut write: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        if !entry.field.multiple() {
            return write(self, values[0]);
        }
        self.begin(b'[')?;
        for value in values {
            self.item()?;
            write(self, *value)?;
        }
        self.end(b']')
    }

    /// A primitive field: the value key and the independent `_` sidecar key
    fn primitive_field(&mut self, entry: &FieldEntry<'_>, key: &str, values: &[&Primitive]) -> Result<()> {
        let kind = self
            .registry
            .require_type(entry.type_name)?
            .primitive
            .unwrap_or_default();
        let sidecar = format!("_{}", key);

        if !entry.field.multiple() {
            let primitive = values[0];
            if let Some(value) = &primitive.value {
                self.key(key)?;
                self.literal(kind, value)?;
            }
            if primitive.has_meta() {
                self.key(&sidecar)?;
                self.meta(&primitive.meta)?;
            }
            return Ok(());
        }

        // Arrays stay index-aligned: absent positions are written as null
        if values.iter().any(|p| p.has_value()) {
            self.key(key)?;
            self.begin(b'[')?;
            for primitive in values {
                self.item()?;
                match &primitive.value {
                    Some(value) => self.literal(kind, value)?,
                    None => self.null()?,
                }
            }
            self.end(b']')?;
        }
        if values.iter().any(|p| p.has_meta()) {
            self.key(&sidecar)?;
            self.begin(b'[')?;
            for primitive in values {
                self.item()?;
                if primitive.has_meta() {
                    self.meta(&primitive.meta)?;
                } else {
                    self.null()?;
                }
            }
            self.end(b']')?;
        }
        Ok(())
    }

    fn meta(&mut self, meta: &PrimitiveMeta) -> Result<()> {
        self.begin(b'{')?;
        if let Some(id) = &meta.id {
            self.key("id")?;
            self.string(id)?;
        }
        if !meta.extension.is_empty() {
            let extension = meta_extensions(self.registry, meta)?;
            self.key("extension")?;
            self.begin(b'[')?;
            for ext in &meta.extension {
                self.item()?;
                self.element(extension, ext)?;
            }
            self.end(b']')?;
        }
        self.end(b'}')
    }

    fn literal(&mut self, kind: PrimitiveKind, value: &PrimitiveValue) -> Result<()> {
        match value {
            PrimitiveValue::Boolean(b) => self.raw(if *b { "true" } else { "false" }),
            PrimitiveValue::Integer(i) if kind.is_json_number() => self.raw(&i.to_string()),
            PrimitiveValue::Integer(i) => self.string(&i.to_string()),
            PrimitiveValue::Decimal(d) => self.raw(d.as_str()),
            PrimitiveValue::String(s) => self.string(s),
        }
    }

    fn key(&mut self, name: &str) -> Result<()> {
        self.item()?;
        serde_json::to_writer(&mut self.writer, name)?;
        self.writer
            .write_all(if self.pretty { b": " } else { b":" })?;
        // The value follows the key directly
        self.needs_comma = false;
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.needs_comma = true;
        Ok(())
    }

    fn null(&mut self) -> Result<()> {
        self.raw("null")
    }

    fn raw(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.needs_comma = true;
        Ok(())
    }

    /// Separator and indentation before the next member of a container
    fn item(&mut self) -> Result<()> {
        if self.needs_comma {
            self.writer.write_all(b",")?;
        }
        self.newline()
    }

    fn begin(&mut self, open: u8) -> Result<()> {
        self.writer.write_all(&[open])?;
        self.depth += 1;
        self.needs_comma = false;
        Ok(())
    }

    fn end(&mut self, close: u8) -> Result<()> {
        self.depth -= 1;
        if self.needs_comma {
            self.newline()?;
        }
        self.writer.write_all(&[close])?;
        self.needs_comma = true;
        Ok(())
    }

    fn newline(&mut self) -> Result<()> {
        if self.pretty {
            self.writer.write_all(b"\n")?;
            for _ in 0..self.depth {
                self.writer.write_all(b"  ")?;
            }
        }
        Ok(())
    }
}
