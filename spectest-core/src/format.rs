//! Classification of raw specification text.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Error, Result};

/// Textual formats a specification (or a response body) can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Format {
    Json,
    Yaml,
    Xml,
}

impl Format {
    /// Media type used when a body is sent in this format.
    pub fn media_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Yaml => "application/yaml",
            Format::Xml => "application/xml",
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Format> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "xml" => Ok(Format::Xml),
            _ => Err(Error::UnsupportedFormat),
        }
    }
}

/// Classify raw text by its shape.
///
/// The first non-whitespace character decides between JSON (`{`, `[`) and XML (`<`).
/// Anything else that carries a `key: value` separator is treated as YAML.
pub fn resolve(raw: &str) -> Result<Format> {
    let trimmed = raw.trim_start();
    match trimmed.chars().next() {
        Some('{' | '[') => Ok(Format::Json),
        Some('<') => Ok(Format::Xml),
        Some(_) if trimmed.contains(':') => Ok(Format::Yaml),
        _ => Err(Error::UnsupportedFormat),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(r#"{"url": "https://x"}"#, Format::Json; "object")]
    #[test_case("  \n[1, 2]", Format::Json; "array with leading whitespace")]
    #[test_case("<spec><url>https://x</url></spec>", Format::Xml; "xml")]
    #[test_case("\t<?xml version=\"1.0\"?><a/>", Format::Xml; "xml declaration")]
    #[test_case("url: https://x\nmethod: GET", Format::Yaml; "yaml")]
    #[test_case("url: https://x\nheaders: {a: b}", Format::Yaml; "yaml with flow mapping")]
    fn resolves(raw: &str, expected: Format) -> eyre::Result<()> {
        assert_eq!(resolve(raw)?, expected);
        Ok(())
    }

    #[test_case(""; "empty")]
    #[test_case("   \n\t"; "blank")]
    #[test_case("just some words"; "plain text")]
    fn rejects(raw: &str) {
        assert!(matches!(resolve(raw), Err(Error::UnsupportedFormat)));
    }

    #[test]
    fn parse_name() -> eyre::Result<()> {
        assert_eq!("json".parse::<Format>()?, Format::Json);
        assert_eq!("YAML".parse::<Format>()?, Format::Yaml);
        assert_eq!(" Xml ".parse::<Format>()?, Format::Xml);
        assert!("toml".parse::<Format>().is_err());
        assert_eq!(Format::Yaml.media_type(), "application/yaml");
        Ok(())
    }
}
