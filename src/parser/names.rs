//! Decoder for the `name` custom section.
//!
//! The section is a sequence of subsections, each framed as
//! `id:u8 size:u32 payload:byte^size`. Custom sections must never stop a
//! module from loading, so decoding does not fail: problems are collected as
//! [`NameError`]s and decoding carries on from the nearest point that can
//! still be trusted.
//!
//! - A problem inside a subsection abandons the rest of that subsection and
//!   resumes at its declared end.
//! - A subsection whose own size cannot be read, does not fit the host, or
//!   runs past the end of the section abandons the rest of the section.
//!
//! Every stored name is valid UTF-8 without NUL characters.
//!
//! See: <https://webassembly.github.io/spec/core/appendix/custom.html#name-section>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::reader::Reader;
use crate::utf8::{self, Strategy, Utf8Error, Utf8Policy};

/// Upper bounds on declared entry counts, checked before any entry is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameParserLimits {
    pub max_function_names: u32,
    pub max_code_local_functions: u32,
    pub max_locals_per_function: u32,
}

impl Default for NameParserLimits {
    fn default() -> Self {
        Self {
            max_function_names: 1 << 20,
            max_code_local_functions: 1 << 20,
            max_locals_per_function: 1 << 16,
        }
    }
}

pub type NameMap = BTreeMap<u32, String>;
pub type IndirectNameMap = BTreeMap<u32, NameMap>;

/// Names recovered from a `name` section.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct NameTable {
    pub module_name: Option<String>,
    pub function_names: NameMap,
    /// Function index to local index to name.
    pub local_names: IndirectNameMap,
    pub type_names: NameMap,
    /// Type index to field index to name.
    pub field_names: IndirectNameMap,
    pub tag_names: NameMap,
}

impl NameTable {
    pub fn is_empty(&self) -> bool {
        *self == NameTable::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSubsection {
    ModuleName,
    FunctionNames,
    LocalNames,
    TypeNames,
    FieldNames,
    TagNames,
    Unknown(u8),
}

impl From<u8> for NameSubsection {
    fn from(id: u8) -> Self {
        match id {
            0 => NameSubsection::ModuleName,
            1 => NameSubsection::FunctionNames,
            2 => NameSubsection::LocalNames,
            4 => NameSubsection::TypeNames,
            10 => NameSubsection::FieldNames,
            11 => NameSubsection::TagNames,
            other => NameSubsection::Unknown(other),
        }
    }
}

impl NameSubsection {
    pub fn id(self) -> u8 {
        match self {
            NameSubsection::ModuleName => 0,
            NameSubsection::FunctionNames => 1,
            NameSubsection::LocalNames => 2,
            NameSubsection::TypeNames => 4,
            NameSubsection::FieldNames => 10,
            NameSubsection::TagNames => 11,
            NameSubsection::Unknown(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum NameErrorKind {
    #[error("subsection size cannot be decoded")]
    SubsectionLengthUnreadable,
    #[error("subsection size does not fit in the host size type")]
    SubsectionLengthOverflow,
    #[error("subsection size {size} exceeds the {remaining} bytes left in the section")]
    SubsectionLengthExceedsSection { size: usize, remaining: usize },
    #[error("subsection id {0} appears more than once")]
    DuplicateSubsection(u8),
    #[error("module has more than one name section")]
    DuplicateNameSection,
    #[error("subsection id {0} appears out of order")]
    OutOfOrderSubsection(u8),
    #[error("name length cannot be decoded")]
    InvalidLength,
    #[error("name length does not fit in the host size type")]
    LengthOverflow,
    #[error("name length {len} exceeds the {remaining} bytes left in the subsection")]
    LengthExceedsSubsection { len: usize, remaining: usize },
    #[error("name is empty")]
    EmptyName,
    #[error("{0}")]
    IllegalUtf8(Utf8Error),
    #[error("module name is already set")]
    DuplicateModuleName,
    #[error("index {0} already has a name")]
    DuplicateName(u32),
    #[error("index {0} repeated within one map")]
    DuplicateIndex(u32),
    #[error("index {index} follows {previous}; indices must increase")]
    IndexOutOfOrder { index: u32, previous: u32 },
    #[error("index cannot be decoded")]
    InvalidIndex,
    #[error("entry count cannot be decoded")]
    InvalidCount,
    #[error("{what} count {value} exceeds the limit of {max}")]
    LimitExceeded { what: &'static str, value: u32, max: u32 },
    #[error("{0} bytes of trailing data in subsection")]
    TrailingData(usize),
}

/// A problem found while decoding, with the offset (relative to the start of
/// the section payload) where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind} at offset {offset}")]
pub struct NameError {
    pub offset: usize,
    pub kind: NameErrorKind,
}

/// Decode `bytes` into `storage` with default limits.
pub fn decode(storage: &mut NameTable, bytes: &[u8]) -> Vec<NameError> {
    NameDecoder::default().decode(storage, bytes)
}

#[derive(Debug, Clone, Copy)]
pub struct NameDecoder {
    limits: NameParserLimits,
    strategy: Strategy,
}

impl Default for NameDecoder {
    fn default() -> Self {
        Self::new(NameParserLimits::default())
    }
}

impl NameDecoder {
    pub fn new(limits: NameParserLimits) -> Self {
        Self {
            limits,
            strategy: utf8::detected(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn decode(&self, storage: &mut NameTable, bytes: &[u8]) -> Vec<NameError> {
        let mut errors = Vec::new();
        let mut reader = Reader::new(bytes);
        let mut last_id: Option<u8> = None;

        while !reader.is_empty() {
            let start = reader.pos();
            let fail = |kind| NameError { offset: start, kind };

            let Ok(id) = reader.read_byte() else { break };
            let Ok(size) = reader.read_vu32() else {
                errors.push(fail(NameErrorKind::SubsectionLengthUnreadable));
                break;
            };
            let Ok(size) = usize::try_from(size) else {
                errors.push(fail(NameErrorKind::SubsectionLengthOverflow));
                break;
            };
            let remaining = reader.remaining();
            if size > remaining {
                errors.push(fail(NameErrorKind::SubsectionLengthExceedsSection { size, remaining }));
                break;
            }
            let base = reader.pos();
            let Ok(payload) = reader.read_bytes(size) else { break };

            let subsection = NameSubsection::from(id);
            if let NameSubsection::Unknown(id) = subsection {
                tracing::debug!(id, size, offset = start, "skipping unknown name subsection");
                continue;
            }

            match last_id {
                Some(last) if last == id => errors.push(fail(NameErrorKind::DuplicateSubsection(id))),
                Some(last) if last > id => errors.push(fail(NameErrorKind::OutOfOrderSubsection(id))),
                _ => last_id = Some(id),
            }

            let mut cursor = Subsection {
                reader: Reader::new(payload),
                base,
                strategy: self.strategy,
                errors: &mut errors,
            };
            let outcome = self.decode_subsection(subsection, storage, &mut cursor);
            let trailing = cursor.reader.remaining();
            let end = cursor.offset();
            match outcome {
                Ok(()) if trailing > 0 => errors.push(NameError {
                    offset: end,
                    kind: NameErrorKind::TrailingData(trailing),
                }),
                Ok(()) => {}
                Err(error) => errors.push(error),
            }
        }

        errors
    }

    fn decode_subsection(
        &self,
        subsection: NameSubsection,
        storage: &mut NameTable,
        cursor: &mut Subsection<'_, '_>,
    ) -> Result<(), NameError> {
        let limits = &self.limits;
        match subsection {
            NameSubsection::ModuleName => {
                let at = cursor.offset();
                if let Some(name) = cursor.read_name()? {
                    if storage.module_name.is_some() {
                        cursor.note(at, NameErrorKind::DuplicateModuleName);
                    } else {
                        storage.module_name = Some(name);
                    }
                }
                Ok(())
            }
            NameSubsection::FunctionNames => cursor.name_map(
                &mut storage.function_names,
                "function name",
                limits.max_function_names,
            ),
            NameSubsection::LocalNames => cursor.indirect_name_map(
                &mut storage.local_names,
                ("code local function", limits.max_code_local_functions),
                ("local name", limits.max_locals_per_function),
            ),
            NameSubsection::TypeNames => {
                cursor.name_map(&mut storage.type_names, "type name", limits.max_function_names)
            }
            NameSubsection::FieldNames => cursor.indirect_name_map(
                &mut storage.field_names,
                ("field type", limits.max_code_local_functions),
                ("field name", limits.max_locals_per_function),
            ),
            NameSubsection::TagNames => {
                cursor.name_map(&mut storage.tag_names, "tag name", limits.max_function_names)
            }
            NameSubsection::Unknown(_) => Ok(()),
        }
    }
}

/// Cursor over one subsection payload. `base` is the payload's offset in
/// the section so that diagnostics carry section-relative offsets.
struct Subsection<'a, 'e> {
    reader: Reader<'a>,
    base: usize,
    strategy: Strategy,
    errors: &'e mut Vec<NameError>,
}

impl<'a, 'e> Subsection<'a, 'e> {
    fn offset(&self) -> usize {
        self.base + self.reader.pos()
    }

    fn error(&self, offset: usize, kind: NameErrorKind) -> NameError {
        NameError { offset, kind }
    }

    /// Record a problem that does not abandon the subsection.
    fn note(&mut self, offset: usize, kind: NameErrorKind) {
        self.errors.push(NameError { offset, kind });
    }

    fn read_index(&mut self) -> Result<u32, NameError> {
        let at = self.offset();
        self.reader.read_vu32().map_err(|_| self.error(at, NameErrorKind::InvalidIndex))
    }

    fn read_count(&mut self, what: &'static str, max: u32) -> Result<u32, NameError> {
        let at = self.offset();
        let count = self.reader.read_vu32().map_err(|_| self.error(at, NameErrorKind::InvalidCount))?;
        if count > max {
            return Err(self.error(at, NameErrorKind::LimitExceeded { what, value: count, max }));
        }
        Ok(count)
    }

    /// A length-prefixed name. Empty names are noted and yield `None`.
    fn read_name(&mut self) -> Result<Option<String>, NameError> {
        let at = self.offset();
        let len = self.reader.read_vu32().map_err(|_| self.error(at, NameErrorKind::InvalidLength))?;
        let len = usize::try_from(len).map_err(|_| self.error(at, NameErrorKind::LengthOverflow))?;
        let remaining = self.reader.remaining();
        if len > remaining {
            return Err(self.error(at, NameErrorKind::LengthExceedsSubsection { len, remaining }));
        }
        if len == 0 {
            self.note(at, NameErrorKind::EmptyName);
            return Ok(None);
        }

        let start = self.offset();
        let bytes = self
            .reader
            .read_bytes(len)
            .map_err(|_| self.error(at, NameErrorKind::LengthExceedsSubsection { len, remaining }))?;
        utf8::validate_with(self.strategy, Utf8Policy::Rfc3629ZeroIllegal, bytes)
            .map_err(|e| self.error(start + e.position, NameErrorKind::IllegalUtf8(e)))?;

        // Already validated, so the lossy conversion is exact.
        Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// `vec(index name)` with strictly increasing indices.
    fn name_map(&mut self, target: &mut NameMap, what: &'static str, max: u32) -> Result<(), NameError> {
        let count = self.read_count(what, max)?;
        let mut previous: Option<u32> = None;

        for _ in 0..count {
            let at = self.offset();
            let index = self.read_index()?;
            check_order(previous, index).map_err(|kind| self.error(at, kind))?;
            previous = Some(index);

            let Some(name) = self.read_name()? else { continue };
            if target.contains_key(&index) {
                self.note(at, NameErrorKind::DuplicateName(index));
            } else {
                target.insert(index, name);
            }
        }

        Ok(())
    }

    /// `vec(index vec(index name))` with strictly increasing outer indices.
    fn indirect_name_map(
        &mut self,
        target: &mut IndirectNameMap,
        (outer_what, outer_max): (&'static str, u32),
        (inner_what, inner_max): (&'static str, u32),
    ) -> Result<(), NameError> {
        let count = self.read_count(outer_what, outer_max)?;
        let mut previous: Option<u32> = None;
        let mut result = Ok(());

        for _ in 0..count {
            let at = self.offset();
            let index = match self.read_index() {
                Ok(index) => index,
                Err(error) => {
                    result = Err(error);
                    break;
                }
            };
            if let Err(kind) = check_order(previous, index) {
                result = Err(self.error(at, kind));
                break;
            }
            previous = Some(index);

            let inner = target.entry(index).or_default();
            result = self.name_map(inner, inner_what, inner_max);
            if result.is_err() {
                break;
            }
        }

        // Entries whose inner map came out empty or was abandoned early.
        target.retain(|_, inner| !inner.is_empty());
        result
    }
}

fn check_order(previous: Option<u32>, index: u32) -> Result<(), NameErrorKind> {
    match previous {
        Some(previous) if index == previous => Err(NameErrorKind::DuplicateIndex(index)),
        Some(previous) if index < previous => Err(NameErrorKind::IndexOutOfOrder { index, previous }),
        _ => Ok(()),
    }
}
