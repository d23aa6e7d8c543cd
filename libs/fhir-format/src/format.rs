//! Wire format selection

use std::fmt;
use std::path::Path;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// JSON format (application/fhir+json)
    #[default]
    Json,
    /// XML format (application/fhir+xml)
    Xml,
}

impl Format {
    /// Parse a `_format` token or MIME type.
    ///
    /// Accepted values:
    /// - json, application/json, application/fhir+json -> JSON
    /// - xml, text/xml, application/xml, application/fhir+xml -> XML
    ///
    /// Parameters such as `charset` are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let mime_type = s.split(';').next().unwrap_or(s).trim();
        let s_lower = mime_type.to_ascii_lowercase();

        match s_lower.as_str() {
            "json" | "application/json" | "application/fhir+json" => Some(Self::Json),
            "xml" | "text/xml" | "application/xml" | "application/fhir+xml" => Some(Self::Xml),
            _ => None,
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
    }

    /// The formal FHIR MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Json => "application/fhir+json",
            Self::Xml => "application/fhir+xml",
        }
    }

    pub fn mime_type_with_charset(&self) -> String {
        format!("{}; charset=utf-8", self.mime_type())
    }

    /// The other format
    pub fn opposite(&self) -> Self {
        match self {
            Self::Json => Self::Xml,
            Self::Xml => Self::Json,
        }
    }
}

impl std::str::FromStr for Format {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Xml => "xml",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tokens_and_mime_types() {
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("application/fhir+json; charset=utf-8"), Some(Format::Json));
        assert_eq!(Format::parse("Application/JSON"), Some(Format::Json));
        assert_eq!(Format::parse("text/xml"), Some(Format::Xml));
        assert_eq!(Format::parse("application/fhir+xml"), Some(Format::Xml));
        assert_eq!(Format::parse("text/html"), None);
        assert_eq!("xml".parse::<Format>(), Ok(Format::Xml));
    }

    #[test]
    fn mime_types_and_paths() {
        assert_eq!(Format::Json.mime_type(), "application/fhir+json");
        assert_eq!(Format::Xml.mime_type_with_charset(), "application/fhir+xml; charset=utf-8");
        assert_eq!(Format::from_path(Path::new("patient.XML")), Some(Format::Xml));
        assert_eq!(Format::from_path(Path::new("patient")), None);
        assert_eq!(Format::Json.opposite(), Format::Xml);
    }
}
