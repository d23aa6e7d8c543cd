//! Subcommand implementations

use std::borrow::Cow;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use fhirkit_format::{Codec, Format, FormatOptions};
use fhirkit_models::{core_registry, Resource, TypeKind, TypeRegistry};

/// Path argument meaning stdin or stdout
pub const STDIO: &str = "-";

/// Use the embedded R4 schema unless StructureDefinition bundles are given.
pub fn load_registry(definitions: &[PathBuf]) -> anyhow::Result<Cow<'static, TypeRegistry>> {
    if definitions.is_empty() {
        return Ok(Cow::Borrowed(core_registry()));
    }

    let bundles = definitions
        .iter()
        .map(|path| {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read definitions from {}", path.display()))?;
            serde_json::from_str::<serde_json::Value>(&text)
                .with_context(|| format!("Definitions in {} are not valid JSON", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let registry = TypeRegistry::from_definitions_bundles(&bundles)
        .context("Failed to build type registry from definitions")?;
    Ok(Cow::Owned(registry))
}

pub struct ConvertArgs<'a> {
    pub input: &'a Path,
    pub output: Option<&'a Path>,
    pub from: Option<Format>,
    pub to: Option<Format>,
    pub pretty: bool,
}

pub fn convert(registry: &TypeRegistry, args: ConvertArgs<'_>) -> anyhow::Result<()> {
    let data = read_input(args.input)?;
    let from = input_format(args.from, args.input, &data)?;
    let to = args
        .to
        .or_else(|| args.output.and_then(Format::from_path))
        .unwrap_or_else(|| from.opposite());

    tracing::info!(input = %args.input.display(), %from, %to, "Converting");

    let options = FormatOptions {
        pretty: args.pretty,
    };
    let bytes = Codec::new(registry)
        .with_options(options)
        .convert(&data, from, to)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    write_output(args.output, &bytes)
}

/// Decode a document and describe what it holds
pub fn check(
    registry: &TypeRegistry,
    input: &Path,
    from: Option<Format>,
    resource_type: Option<&str>,
) -> anyhow::Result<String> {
    let data = read_input(input)?;
    let format = input_format(from, input, &data)?;
    let codec = Codec::new(registry);

    let resource = match resource_type {
        Some(name) => codec.decode_as(format, name, &data),
        None => codec.decode(format, &data),
    }
    .with_context(|| format!("{} is not a valid {format} resource", input.display()))?;

    Ok(format!("{} ({format}, FHIR {})", describe(&resource), registry.release()))
}

/// Registry type names, sorted, optionally restricted to one kind
pub fn list_types(registry: &TypeRegistry, kind: Option<TypeKind>) -> Vec<String> {
    let mut lines: Vec<(TypeKind, String)> = registry
        .types()
        .filter(|t| kind.map_or(true, |k| t.kind == k))
        .map(|t| {
            let name = if t.is_abstract {
                format!("{} (abstract)", t.name)
            } else {
                t.name.clone()
            };
            (t.kind, name)
        })
        .collect();
    lines.sort_by(|a, b| kind_rank(a.0).cmp(&kind_rank(b.0)).then_with(|| a.1.cmp(&b.1)));

    lines
        .into_iter()
        .map(|(k, name)| match kind {
            Some(_) => name,
            None => format!("{:<10}{name}", kind_label(k)),
        })
        .collect()
}

fn describe(resource: &Resource) -> String {
    match resource.id() {
        Some(id) => format!("{}/{id}", resource.resource_type()),
        None => resource.resource_type().to_string(),
    }
}

fn kind_rank(kind: TypeKind) -> u8 {
    match kind {
        TypeKind::Primitive => 0,
        TypeKind::Element => 1,
        TypeKind::Resource => 2,
    }
}

fn kind_label(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Primitive => "primitive",
        TypeKind::Element => "element",
        TypeKind::Resource => "resource",
    }
}

/// Explicit format, then file extension, then the first significant byte.
fn input_format(explicit: Option<Format>, path: &Path, data: &[u8]) -> anyhow::Result<Format> {
    explicit
        .or_else(|| Format::from_path(path))
        .or_else(|| sniff(data))
        .ok_or_else(|| anyhow!("Cannot tell the format of {}; pass --from", path.display()))
}

fn sniff(data: &[u8]) -> Option<Format> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Some(Format::Json),
        Some(b'<') => Some(Format::Xml),
        _ => None,
    }
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new(STDIO) {
        let mut data = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut data)
            .context("Failed to read stdin")?;
        return Ok(data);
    }
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match path {
        Some(path) if path != Path::new(STDIO) => {
            fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
        }
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes).context("Failed to write stdout")?;
            stdout.flush().context("Failed to write stdout")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATIENT_JSON: &str = r#"{"resourceType":"Patient","id":"p1","active":true}"#;

    #[test]
    fn sniffs_formats() {
        assert_eq!(sniff(b"  \n{\"resourceType\":\"Basic\"}"), Some(Format::Json));
        assert_eq!(sniff(b"\xEF\xBB\xBF<Basic/>"), Some(Format::Xml));
        assert_eq!(sniff(b"resourceType"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn extension_wins_over_content() {
        let format = input_format(None, Path::new("patient.xml"), b"{}").unwrap();
        assert_eq!(format, Format::Xml);
        let format = input_format(Some(Format::Json), Path::new("patient.xml"), b"<x/>").unwrap();
        assert_eq!(format, Format::Json);
        assert!(input_format(None, Path::new("patient.txt"), b"???").is_err());
    }

    #[test]
    fn converts_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("patient.json");
        let output = dir.path().join("patient.xml");
        fs::write(&input, PATIENT_JSON).unwrap();

        convert(
            core_registry(),
            ConvertArgs {
                input: &input,
                output: Some(&output),
                from: None,
                to: None,
                pretty: false,
            },
        )
        .unwrap();

        let xml = fs::read_to_string(&output).unwrap();
        assert!(xml.contains(r#"<Patient xmlns="http://hl7.org/fhir">"#), "{xml}");
        assert!(xml.contains(r#"<active value="true"/>"#), "{xml}");
    }

    #[test]
    fn check_reports_type_and_id() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("patient.json");
        fs::write(&input, PATIENT_JSON).unwrap();

        let summary = check(core_registry(), &input, None, None).unwrap();
        assert_eq!(summary, "Patient/p1 (json, FHIR 4.0.1)");

        fs::write(&input, r#"{"resourceType":"Patient","nickname":"x"}"#).unwrap();
        let err = check(core_registry(), &input, None, None).unwrap_err();
        assert!(format!("{err:#}").contains("nickname"), "{err:#}");
    }

    #[test]
    fn lists_types_by_kind() {
        let resources = list_types(core_registry(), Some(TypeKind::Resource));
        assert!(resources.contains(&"Patient".to_string()));
        assert!(resources.contains(&"Resource (abstract)".to_string()));
        assert!(!resources.iter().any(|t| t == "HumanName"));

        let all = list_types(core_registry(), None);
        assert_eq!(all.len(), core_registry().len());
        assert!(all[0].starts_with("primitive"));
    }

    #[test]
    fn embedded_registry_without_definitions() {
        let registry = load_registry(&[]).unwrap();
        assert!(matches!(registry, Cow::Borrowed(_)));
        assert!(load_registry(&[PathBuf::from("/nonexistent/types.json")]).is_err());
    }
}
