//! Per channel and day program file format
//!
//! ```text
//! file_version:1 data_version:1 frame_count:1
//! frame_count * {
//!     frame_slot:1 field_count:1
//!     field_count * { tag:1 length:3 payload:length }
//! }
//! ```
//!
//! Tags are resolved through [`FIELD_TABLE`]. Tags missing from the table are
//! skipped so newer servers can add fields without breaking older clients.

use std::collections::{BTreeMap, BTreeSet};

use chrono_tz::Tz;
use tracing::{trace, warn};

use super::cursor::{text_from_bytes, uint_from_bytes, BinaryCursor};
use crate::errors::{DecodeError, DecodeResult};
use crate::models::{
    ChannelUpdateTask, FieldValue, ProgramField, ProgramRecord, MAX_FRAME_SLOT, MIN_FRAME_SLOT,
    UNKNOWN_END_TIME,
};
use crate::utils::time::{parse_time_zone, resolve_local_minutes, MINUTES_PER_DAY};

/// How a field payload is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Minutes past local midnight of the file's day
    Minutes,
    Integer,
    Text,
    Binary,
}

impl FieldKind {
    fn decode(self, tag: u8, payload: &[u8]) -> DecodeResult<FieldValue> {
        match self {
            FieldKind::Minutes | FieldKind::Integer => {
                uint_from_bytes(tag, payload).map(FieldValue::Integer)
            }
            FieldKind::Text => Ok(FieldValue::Text(text_from_bytes(payload))),
            FieldKind::Binary => Ok(FieldValue::Binary(payload.to_vec())),
        }
    }
}

/// Where a decoded field lands on the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    StartTime,
    EndTime,
    Attribute(ProgramField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub tag: u8,
    pub target: FieldTarget,
    pub kind: FieldKind,
}

const fn spec(tag: u8, target: FieldTarget, kind: FieldKind) -> FieldSpec {
    FieldSpec { tag, target, kind }
}

const fn attr(tag: u8, field: ProgramField, kind: FieldKind) -> FieldSpec {
    spec(tag, FieldTarget::Attribute(field), kind)
}

use FieldKind::{Binary, Integer, Minutes, Text};
use ProgramField as F;

pub const FIELD_TABLE: [FieldSpec; 40] = [
    spec(0x01, FieldTarget::StartTime, Minutes),
    spec(0x02, FieldTarget::EndTime, Minutes),
    attr(0x03, F::Title, Text),
    attr(0x04, F::TitleOriginal, Text),
    attr(0x05, F::EpisodeTitle, Text),
    attr(0x06, F::EpisodeTitleOriginal, Text),
    attr(0x07, F::ShortDescription, Text),
    attr(0x08, F::Description, Text),
    attr(0x0A, F::Actors, Text),
    attr(0x0B, F::Director, Text),
    attr(0x0C, F::CustomInfo, Text),
    attr(0x0D, F::Categories, Integer),
    attr(0x0E, F::AgeLimit, Integer),
    attr(0x0F, F::WebsiteLink, Text),
    attr(0x10, F::Genre, Text),
    attr(0x11, F::Origin, Text),
    attr(0x12, F::NetPlayingTime, Integer),
    attr(0x13, F::Vps, Integer),
    attr(0x14, F::Script, Text),
    attr(0x15, F::RepetitionFrom, Text),
    attr(0x16, F::Music, Text),
    attr(0x17, F::Moderation, Text),
    attr(0x18, F::ProductionYear, Integer),
    attr(0x19, F::RepetitionOn, Text),
    attr(0x1A, F::Picture, Binary),
    attr(0x1B, F::PictureCopyright, Text),
    attr(0x1C, F::PictureDescription, Text),
    attr(0x1D, F::EpisodeNumber, Integer),
    attr(0x1E, F::EpisodeCount, Integer),
    attr(0x1F, F::SeasonNumber, Integer),
    attr(0x20, F::Producer, Text),
    attr(0x21, F::Camera, Text),
    attr(0x22, F::Cut, Text),
    attr(0x23, F::OtherPersons, Text),
    attr(0x24, F::Rating, Integer),
    attr(0x25, F::ProductionFirm, Text),
    attr(0x26, F::AgeLimitString, Text),
    attr(0x27, F::LastProductionYear, Integer),
    attr(0x28, F::AdditionalInfo, Text),
    attr(0x29, F::Series, Text),
];

const fn build_tag_index() -> [Option<FieldSpec>; 256] {
    let mut index = [None; 256];
    let mut i = 0;
    while i < FIELD_TABLE.len() {
        let spec = FIELD_TABLE[i];
        index[spec.tag as usize] = Some(spec);
        i += 1;
    }
    index
}

static TAG_INDEX: [Option<FieldSpec>; 256] = build_tag_index();

/// Table entry for a tag, `None` for tags this decoder does not know
pub fn field_spec(tag: u8) -> Option<FieldSpec> {
    TAG_INDEX[tag as usize]
}

/// Payload kind of an attribute, used to pick its storage type
pub fn attribute_kind(field: ProgramField) -> FieldKind {
    FIELD_TABLE
        .iter()
        .find(|spec| spec.target == FieldTarget::Attribute(field))
        .map(|spec| spec.kind)
        .unwrap_or(FieldKind::Text)
}

/// Everything decoded from one day file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDayFile {
    pub file_version: u8,
    pub data_version: u8,
    pub records: Vec<ProgramRecord>,
    /// Highest frame slot present, 0 for a file without frames
    pub max_frame_slot: u8,
    /// Valid slots the file did not carry, ascending
    pub missing_slots: Vec<u8>,
}

impl DecodedDayFile {
    /// Missing slots the file is authoritative for
    ///
    /// Slots above the highest one present were never described by the file,
    /// so their absence says nothing about cancellation.
    pub fn slots_to_delete(&self) -> Vec<u8> {
        self.missing_slots
            .iter()
            .copied()
            .take_while(|&slot| slot <= self.max_frame_slot)
            .collect()
    }
}

pub struct ProgramRecordCodec;

impl ProgramRecordCodec {
    pub fn decode(data: &[u8], task: &ChannelUpdateTask) -> DecodeResult<DecodedDayFile> {
        let tz = match parse_time_zone(&task.time_zone) {
            Ok(tz) => tz,
            Err(e) => {
                warn!("{}, reading {} as UTC", e, task.url);
                Tz::UTC
            }
        };

        let mut cursor = BinaryCursor::new(data);
        let file_version = cursor.read_u8()?;
        let data_version = cursor.read_u8()?;
        let frame_count = cursor.read_u8()?;

        let mut records = Vec::with_capacity(frame_count as usize);
        let mut present = BTreeSet::new();
        let mut max_frame_slot = 0u8;

        for _ in 0..frame_count {
            let record = Self::decode_frame(&mut cursor, task, tz)?;
            present.insert(record.frame_slot_id);
            max_frame_slot = max_frame_slot.max(record.frame_slot_id);
            records.push(record);
        }

        let missing_slots = (MIN_FRAME_SLOT..=MAX_FRAME_SLOT)
            .filter(|slot| !present.contains(slot))
            .collect();

        Ok(DecodedDayFile {
            file_version,
            data_version,
            records,
            max_frame_slot,
            missing_slots,
        })
    }

    fn decode_frame(
        cursor: &mut BinaryCursor<'_>,
        task: &ChannelUpdateTask,
        tz: Tz,
    ) -> DecodeResult<ProgramRecord> {
        let frame_slot_id = cursor.read_u8()?;
        let field_count = cursor.read_u8()?;

        let mut start_minutes = None;
        let mut end_minutes = None;
        let mut fields = BTreeMap::new();

        for _ in 0..field_count {
            let tag = cursor.read_u8()?;
            let payload = cursor.read_u24_prefixed()?;

            let Some(spec) = field_spec(tag) else {
                trace!("Skipping unknown field tag {:#04x} in slot {}", tag, frame_slot_id);
                continue;
            };

            match spec.target {
                FieldTarget::StartTime => start_minutes = Some(uint_from_bytes(tag, payload)?),
                FieldTarget::EndTime => end_minutes = Some(uint_from_bytes(tag, payload)?),
                FieldTarget::Attribute(field) => {
                    fields.insert(field, spec.kind.decode(tag, payload)?);
                }
            }
        }

        let start_minutes =
            start_minutes.ok_or(DecodeError::MissingStartTime { frame_slot: frame_slot_id })?;
        let start_time_millis = resolve_local_minutes(task.day_epoch_millis, tz, start_minutes)?;

        let end_time_millis = match end_minutes {
            Some(minutes) => {
                let end = resolve_local_minutes(task.day_epoch_millis, tz, minutes)?;
                if end < start_time_millis {
                    resolve_local_minutes(task.day_epoch_millis, tz, minutes + MINUTES_PER_DAY)?
                } else {
                    end
                }
            }
            None => UNKNOWN_END_TIME,
        };

        Ok(ProgramRecord {
            frame_slot_id,
            channel_id: task.channel_id,
            day_epoch_millis: task.day_epoch_millis,
            start_time_millis,
            end_time_millis,
            fields,
        })
    }
}

/// Builds day files in wire layout, frames in the given order
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct DayFileBuilder {
    data_version: u8,
    frames: Vec<(u8, Vec<(u8, Vec<u8>)>)>,
}

#[cfg(test)]
impl DayFileBuilder {
    pub fn new(data_version: u8) -> Self {
        Self {
            data_version,
            frames: Vec::new(),
        }
    }

    pub fn frame(mut self, slot: u8, fields: Vec<(u8, Vec<u8>)>) -> Self {
        self.frames.push((slot, fields));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![1, self.data_version, self.frames.len() as u8];
        for (slot, fields) in &self.frames {
            out.push(*slot);
            out.push(fields.len() as u8);
            for (tag, payload) in fields {
                out.push(*tag);
                out.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
                out.extend_from_slice(payload);
            }
        }
        out
    }
}

/// Encodes minutes past midnight as a two byte field payload
#[cfg(test)]
pub fn minutes_payload(minutes: u16) -> Vec<u8> {
    minutes.to_be_bytes().to_vec()
}
