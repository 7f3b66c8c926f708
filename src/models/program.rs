use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lowest frame slot id a day file may carry
pub const MIN_FRAME_SLOT: u8 = 2;
/// Highest frame slot id a day file may carry
pub const MAX_FRAME_SLOT: u8 = 254;

/// Sentinel for an end time that is not known yet
pub const UNKNOWN_END_TIME: i64 = 0;

/// Optional program attributes carried by a day file
///
/// The snake case name doubles as the storage column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ProgramField {
    Title,
    TitleOriginal,
    EpisodeTitle,
    EpisodeTitleOriginal,
    ShortDescription,
    Description,
    Actors,
    Director,
    CustomInfo,
    Categories,
    AgeLimit,
    WebsiteLink,
    Genre,
    Origin,
    NetPlayingTime,
    Vps,
    Script,
    RepetitionFrom,
    Music,
    Moderation,
    ProductionYear,
    RepetitionOn,
    Picture,
    PictureCopyright,
    PictureDescription,
    EpisodeNumber,
    EpisodeCount,
    SeasonNumber,
    Producer,
    Camera,
    Cut,
    OtherPersons,
    Rating,
    ProductionFirm,
    AgeLimitString,
    LastProductionYear,
    AdditionalInfo,
    Series,
}

impl ProgramField {
    pub fn column(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Binary(Vec<u8>),
}

/// Unique identity of a stored program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey {
    pub frame_slot_id: u8,
    pub day_epoch_millis: i64,
    pub channel_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub frame_slot_id: u8,
    pub channel_id: i64,
    pub day_epoch_millis: i64,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
    pub fields: BTreeMap<ProgramField, FieldValue>,
}

impl ProgramRecord {
    pub fn key(&self) -> ProgramKey {
        ProgramKey {
            frame_slot_id: self.frame_slot_id,
            day_epoch_millis: self.day_epoch_millis,
            channel_id: self.channel_id,
        }
    }

    pub fn text(&self, field: ProgramField) -> Option<&str> {
        match self.fields.get(&field) {
            Some(FieldValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, field: ProgramField) -> Option<i64> {
        match self.fields.get(&field) {
            Some(FieldValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn has_end_time(&self) -> bool {
        self.end_time_millis != UNKNOWN_END_TIME
    }
}

/// Projection used by the end time backfill pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct ProgramTiming {
    pub id: i64,
    pub channel_id: i64,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_field_columns_are_snake_case() {
        assert_eq!(ProgramField::TitleOriginal.column(), "title_original");
        assert_eq!(ProgramField::Vps.column(), "vps");
        assert_eq!(ProgramField::AgeLimitString.column(), "age_limit_string");
        assert_eq!(ProgramField::iter().count(), 38);
    }

    #[test]
    fn test_typed_accessors() {
        let mut fields = BTreeMap::new();
        fields.insert(ProgramField::Title, FieldValue::Text("News".to_string()));
        fields.insert(ProgramField::AgeLimit, FieldValue::Integer(12));
        let record = ProgramRecord {
            frame_slot_id: 7,
            channel_id: 1,
            day_epoch_millis: 0,
            start_time_millis: 60_000,
            end_time_millis: UNKNOWN_END_TIME,
            fields,
        };

        assert_eq!(record.text(ProgramField::Title), Some("News"));
        assert_eq!(record.integer(ProgramField::AgeLimit), Some(12));
        assert_eq!(record.integer(ProgramField::Title), None);
        assert!(!record.has_end_time());
    }
}
