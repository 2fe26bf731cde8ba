//! Extension descriptor parsing and required-field validation.
//!
//! # Responsibility
//! - Turn raw `.ltc` descriptor text into metadata + code body.
//! - Check the required metadata keys before anything is evaluated.
//!
//! # Invariants
//! - Parsing never fails; malformed input yields empty metadata and/or code.
//! - Every code line is stored followed by `\n`, including the last one.
//! - Validation only checks key presence, never value format.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Marker line opening the metadata section.
pub const METADATA_MARKER: &str = "[metadata]";
/// Marker line opening the code section.
pub const CODE_MARKER: &str = "[code]";
/// Key/value separator inside the metadata section.
pub const METADATA_SEPARATOR: char = '=';

/// Metadata key holding the display name.
pub const FIELD_NAME: &str = "name";
/// Metadata key holding the extension version.
pub const FIELD_VERSION: &str = "version";
/// Metadata key holding the human-readable description.
pub const FIELD_DESCRIPTION: &str = "description";
/// Metadata key holding the store category.
pub const FIELD_CATEGORY: &str = "category";

const REQUIRED_FIELDS: &[&str] = &[FIELD_NAME, FIELD_VERSION, FIELD_DESCRIPTION, FIELD_CATEGORY];

/// Required metadata keys in validation order.
pub fn required_fields() -> &'static [&'static str] {
    REQUIRED_FIELDS
}

/// One parsed extension descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    /// Trimmed metadata pairs. Unknown keys are kept as-is.
    pub metadata: BTreeMap<String, String>,
    /// Extension source, one `\n`-terminated line per code-section line.
    pub code: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Metadata,
    Code,
}

impl ExtensionDescriptor {
    /// Parses descriptor text.
    ///
    /// Repeated section markers simply switch the active section again, so
    /// later metadata values overwrite earlier ones and code lines from every
    /// code section are concatenated in file order.
    pub fn parse(raw: &str) -> Self {
        let mut descriptor = Self::default();
        let mut section = Section::Preamble;

        for line in raw.lines() {
            match line.trim() {
                METADATA_MARKER => {
                    section = Section::Metadata;
                    continue;
                }
                CODE_MARKER => {
                    section = Section::Code;
                    continue;
                }
                _ => {}
            }

            match section {
                Section::Preamble => {}
                Section::Metadata => {
                    if let Some((key, value)) = line.split_once(METADATA_SEPARATOR) {
                        descriptor
                            .metadata
                            .insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
                Section::Code => {
                    descriptor.code.push_str(line);
                    descriptor.code.push('\n');
                }
            }
        }

        descriptor
    }

    /// Returns one metadata value by exact key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Display name, if declared.
    pub fn name(&self) -> Option<&str> {
        self.field(FIELD_NAME)
    }

    pub fn version(&self) -> Option<&str> {
        self.field(FIELD_VERSION)
    }

    pub fn description(&self) -> Option<&str> {
        self.field(FIELD_DESCRIPTION)
    }

    pub fn category(&self) -> Option<&str> {
        self.field(FIELD_CATEGORY)
    }

    /// Number of lines in the code body.
    pub fn code_line_count(&self) -> usize {
        self.code.lines().count()
    }

    /// Validates required metadata keys. See [`validate`].
    pub fn validate(&self) -> Result<(), MissingFieldError> {
        validate(self)
    }

    /// Renders descriptor text that parses back into `self`.
    ///
    /// Required keys come first in validation order, remaining keys follow
    /// in sorted order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(METADATA_MARKER);
        out.push('\n');

        for key in REQUIRED_FIELDS {
            if let Some(value) = self.metadata.get(*key) {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        for (key, value) in &self.metadata {
            if !REQUIRED_FIELDS.contains(&key.as_str()) {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }

        out.push_str(CODE_MARKER);
        out.push('\n');
        out.push_str(&self.code);
        out
    }
}

/// Parses descriptor text. Shorthand for [`ExtensionDescriptor::parse`].
pub fn parse(raw: &str) -> ExtensionDescriptor {
    ExtensionDescriptor::parse(raw)
}

/// Checks that every required metadata key is present.
///
/// Fails on the first missing key in the order `name`, `version`,
/// `description`, `category`. Empty values count as present.
pub fn validate(descriptor: &ExtensionDescriptor) -> Result<(), MissingFieldError> {
    match REQUIRED_FIELDS
        .iter()
        .find(|field| !descriptor.metadata.contains_key(**field))
    {
        Some(field) => Err(MissingFieldError { field: *field }),
        None => Ok(()),
    }
}

/// Validation error naming the first missing required key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingFieldError {
    pub field: &'static str,
}

impl Display for MissingFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "descriptor missing required field: {}", self.field)
    }
}

impl Error for MissingFieldError {}

#[cfg(test)]
mod tests {
    use super::{parse, validate, ExtensionDescriptor, MissingFieldError};

    const ECHO: &str = "\
preamble line that is ignored
[metadata]
name=Echo
version = 1.0
description =  says hello
category=util
[code]
def main():
    return \"hello\"
";

    fn complete_descriptor() -> ExtensionDescriptor {
        parse(ECHO)
    }

    #[test]
    fn parses_metadata_and_code_sections() {
        let descriptor = complete_descriptor();
        assert_eq!(descriptor.name(), Some("Echo"));
        assert_eq!(descriptor.version(), Some("1.0"));
        assert_eq!(descriptor.description(), Some("says hello"));
        assert_eq!(descriptor.category(), Some("util"));
        assert_eq!(descriptor.code, "def main():\n    return \"hello\"\n");
    }

    #[test]
    fn ignores_preamble_and_separatorless_metadata_lines() {
        let descriptor = parse("name=ignored\n[metadata]\njust text\nname=Kept\n");
        assert_eq!(descriptor.metadata.len(), 1);
        assert_eq!(descriptor.name(), Some("Kept"));
        assert!(descriptor.code.is_empty());
    }

    #[test]
    fn splits_metadata_on_first_separator_only() {
        let descriptor = parse("[metadata]\nformula = a=b+c\n");
        assert_eq!(descriptor.field("formula"), Some("a=b+c"));
    }

    #[test]
    fn detects_markers_after_trimming_but_case_sensitive() {
        let descriptor = parse("  [metadata]  \nname=A\n[CODE]\n\t[code]\t\nx = 1\n");
        assert_eq!(descriptor.name(), Some("A"));
        assert!(!descriptor.metadata.contains_key("[CODE]"));
        assert_eq!(descriptor.code, "x = 1\n");
    }

    #[test]
    fn keeps_code_lines_verbatim_with_trailing_newline() {
        let descriptor = parse("[code]\n  indented  \n\nlast");
        assert_eq!(descriptor.code, "  indented  \n\nlast\n");
    }

    #[test]
    fn code_section_keeps_separator_lines() {
        let descriptor = parse("[code]\nvalue = 3\n");
        assert!(descriptor.metadata.is_empty());
        assert_eq!(descriptor.code, "value = 3\n");
    }

    #[test]
    fn repeated_sections_flip_mode_again() {
        let descriptor = parse("[metadata]\nname=First\n[code]\na = 1\n[metadata]\nname=Second\n[code]\nb = 2\n");
        assert_eq!(descriptor.name(), Some("Second"));
        assert_eq!(descriptor.code, "a = 1\nb = 2\n");
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let descriptor = parse("[metadata]\r\nname = Crlf\r\n[code]\r\nx = 1\r\n");
        assert_eq!(descriptor.name(), Some("Crlf"));
        assert_eq!(descriptor.code, "x = 1\n");
    }

    #[test]
    fn missing_markers_yield_empty_descriptor() {
        let descriptor = parse("no markers here\nkey=value\n");
        assert_eq!(descriptor, ExtensionDescriptor::default());
    }

    #[test]
    fn validates_complete_descriptor_with_extra_keys() {
        let mut descriptor = complete_descriptor();
        descriptor
            .metadata
            .insert("author".to_string(), "someone".to_string());
        assert!(validate(&descriptor).is_ok());
    }

    #[test]
    fn reports_first_missing_field_in_fixed_order() {
        let descriptor = parse("[metadata]\ncategory=util\ndescription=d\n");
        assert_eq!(
            validate(&descriptor).expect_err("name and version are missing"),
            MissingFieldError { field: "name" }
        );

        let descriptor = parse("[metadata]\nname=A\nversion=1\ndescription=d\n");
        let err = descriptor.validate().expect_err("category is missing");
        assert_eq!(err.field, "category");
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn each_required_field_is_reported_when_it_is_the_only_gap() {
        let cases = [
            ("version=1\ndescription=d\ncategory=c\n", "name"),
            ("name=A\ndescription=d\ncategory=c\n", "version"),
            ("name=A\nversion=1\ncategory=c\n", "description"),
            ("name=A\nversion=1\ndescription=d\n", "category"),
        ];
        for (metadata, missing) in cases {
            let descriptor = parse(&format!("[metadata]\n{metadata}[code]\ndef main():\n    pass\n"));
            let err = validate(&descriptor).expect_err("one required key is absent");
            assert_eq!(err, MissingFieldError { field: missing });
        }
    }

    #[test]
    fn version_is_reported_before_description() {
        let descriptor = parse("[metadata]\nname=A\ncategory=c\n");
        assert_eq!(
            validate(&descriptor).expect_err("version and description are missing").field,
            "version"
        );
    }

    #[test]
    fn empty_values_count_as_present() {
        let descriptor = parse("[metadata]\nname=\nversion=\ndescription=\ncategory=\n");
        assert!(validate(&descriptor).is_ok());
    }

    #[test]
    fn render_parses_back_to_equal_descriptor() {
        let mut descriptor = complete_descriptor();
        descriptor
            .metadata
            .insert("capabilities".to_string(), "file".to_string());
        let reparsed = parse(&descriptor.render());
        assert_eq!(reparsed, descriptor);
    }
}
