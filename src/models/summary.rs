use std::collections::HashMap;

use super::Level;

/// Per group manifest of tier versions per channel and day
///
/// `start_day_since_1970` is kept one day before the value on the wire.
/// Frame day `d` therefore describes epoch day `start_day_since_1970 + d + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub version: u8,
    pub start_day_since_1970: i64,
    pub level_count: u8,
    pub frames: HashMap<String, ChannelFrame>,
}

impl Summary {
    /// Frame for an external channel id
    pub fn frame(&self, external_channel_id: &str) -> Option<&ChannelFrame> {
        self.frames.get(external_channel_id)
    }

    /// Adds a frame, keeping the first one published for a channel id
    pub fn add_frame(&mut self, frame: ChannelFrame) {
        self.frames
            .entry(frame.external_channel_id.clone())
            .or_insert(frame);
    }

    /// Absolute epoch day described by frame day `day`
    pub fn epoch_day(&self, day: usize) -> i64 {
        self.start_day_since_1970 + day as i64 + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelFrame {
    pub country: String,
    pub external_channel_id: String,
    pub day_count: u8,
    /// `version_matrix[day][level]`, 0 meaning no data
    pub version_matrix: Vec<Vec<u8>>,
}

impl ChannelFrame {
    pub fn version(&self, day: usize, level: Level) -> Option<u8> {
        self.version_matrix
            .get(day)
            .and_then(|row| row.get(level.index()))
            .copied()
    }
}
