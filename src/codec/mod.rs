//! Decoders for the binary formats published by listing mirrors

pub mod cursor;
pub mod program;
pub mod summary;

pub use cursor::BinaryCursor;
#[cfg(test)]
pub use program::DayFileBuilder;
pub use program::{attribute_kind, DecodedDayFile, FieldKind, ProgramRecordCodec, FIELD_TABLE};
pub use summary::SummaryCodec;
