//! Binary-format walking for the parts of a module this crate trusts.
//!
//! Only the module header and section framing are interpreted; section
//! contents other than custom sections are skipped by size. Custom section
//! names are certified as UTF-8 and the `name` section is handed to
//! [`names::NameDecoder`].

pub mod names;
pub mod reader;

use std::borrow::Cow;

use serde::Serialize;

use self::names::{NameDecoder, NameError, NameErrorKind, NameTable};
use self::reader::{ReadError, Reader};
use crate::utf8::{self, Utf8Error, Utf8Policy};

/// `\0asm`
pub const MAGIC: u32 = 0x6d736100;
pub const VERSION: u32 = 1;
pub const CUSTOM_SECTION_ID: u8 = 0;
pub const NAME_SECTION: &str = "name";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("truncated module header")]
    TruncatedHeader,
    #[error("magic header not detected: {0:#010x}")]
    BadMagic(u32),
    #[error("unknown binary version: {0}")]
    UnsupportedVersion(u32),
    #[error("section {id} at offset {offset}: {source}")]
    Section {
        id: u8,
        offset: usize,
        #[source]
        source: ReadError,
    },
    #[error("custom section name at offset {offset}: {source}")]
    CustomName {
        offset: usize,
        #[source]
        source: Utf8Error,
    },
}

/// A custom section, borrowed from the module bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection<'a> {
    pub name: Cow<'a, str>,
    /// Offset of `payload` within the module.
    pub offset: usize,
    pub payload: &'a [u8],
}

/// Result of [`parse_names`]. Diagnostic offsets are relative to the start
/// of the module.
#[derive(Debug, Default, Serialize)]
pub struct ModuleNames {
    pub names: NameTable,
    pub diagnostics: Vec<NameError>,
}

fn read_header(reader: &mut Reader<'_>) -> Result<(), ParseError> {
    let magic = reader.read_u32().map_err(|_| ParseError::TruncatedHeader)?;
    if magic != MAGIC {
        return Err(ParseError::BadMagic(magic));
    }
    let version = reader.read_u32().map_err(|_| ParseError::TruncatedHeader)?;
    if version != VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Walk every section of `bytes` and collect the custom ones, in order.
pub fn custom_sections(bytes: &[u8]) -> Result<Vec<CustomSection<'_>>, ParseError> {
    let mut reader = Reader::new(bytes);
    read_header(&mut reader)?;

    let mut sections = Vec::new();
    while !reader.is_empty() {
        let offset = reader.pos();
        let id = reader.read_byte().map_err(|source| ParseError::Section { id: 0, offset, source })?;
        let section_err = |source| ParseError::Section { id, offset, source };

        let size = reader.read_vu32().map_err(section_err)?;
        let size = usize::try_from(size).map_err(|_| section_err(ReadError::Overflow))?;
        let payload_offset = reader.pos();
        let payload = reader.read_bytes(size).map_err(section_err)?;

        if id != CUSTOM_SECTION_ID {
            continue;
        }

        let mut inner = Reader::new(payload);
        let name_len = inner.read_vu32().map_err(section_err)?;
        let name_len = usize::try_from(name_len).map_err(|_| section_err(ReadError::Overflow))?;
        let name_offset = payload_offset + inner.pos();
        let name = inner.read_bytes(name_len).map_err(section_err)?;
        utf8::validate(Utf8Policy::Rfc3629, name)
            .map_err(|source| ParseError::CustomName { offset: name_offset, source })?;

        sections.push(CustomSection {
            // Borrowed: the bytes were validated above.
            name: String::from_utf8_lossy(name),
            offset: payload_offset + inner.pos(),
            payload: &payload[inner.pos()..],
        });
    }

    Ok(sections)
}

/// Decode the first `name` custom section of a module. Later `name`
/// sections are reported and ignored.
pub fn parse_names(bytes: &[u8], decoder: &NameDecoder) -> Result<ModuleNames, ParseError> {
    let mut result = ModuleNames::default();
    let mut seen = false;

    for section in custom_sections(bytes)? {
        if section.name != NAME_SECTION {
            tracing::debug!(name = %section.name, offset = section.offset, "skipping custom section");
            continue;
        }
        if seen {
            result.diagnostics.push(NameError {
                offset: section.offset,
                kind: NameErrorKind::DuplicateNameSection,
            });
            continue;
        }
        seen = true;

        let diagnostics = decoder.decode(&mut result.names, section.payload);
        result.diagnostics.extend(diagnostics.into_iter().map(|mut diagnostic| {
            diagnostic.offset += section.offset;
            diagnostic
        }));
    }

    Ok(result)
}
