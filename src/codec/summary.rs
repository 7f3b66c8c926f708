//! Group summary format
//!
//! ```text
//! version:1 start_day:3 level_count:1 frame_count:2
//! frame_count * {
//!     country_len:1 country channel_len:1 channel day_count:1
//!     day_count * level_count * version:1
//! }
//! ```
//!
//! All integers are unsigned big-endian. A summary either decodes completely
//! or not at all.

use tracing::debug;

use super::cursor::{latin1_to_string, BinaryCursor};
use crate::errors::DecodeResult;
use crate::models::{ChannelFrame, Summary};

pub struct SummaryCodec;

impl SummaryCodec {
    pub fn decode(data: &[u8]) -> DecodeResult<Summary> {
        let mut cursor = BinaryCursor::new(data);

        let version = cursor.read_u8()?;
        let raw_start_day = i64::from(cursor.read_u24()?);
        let level_count = cursor.read_u8()?;
        let frame_count = cursor.read_u16()?;

        let mut summary = Summary {
            version,
            start_day_since_1970: raw_start_day - 1,
            level_count,
            frames: Default::default(),
        };

        for _ in 0..frame_count {
            let country = latin1_to_string(cursor.read_u8_prefixed()?);
            let external_channel_id = latin1_to_string(cursor.read_u8_prefixed()?);
            let day_count = cursor.read_u8()?;

            let mut version_matrix = Vec::with_capacity(day_count as usize);
            for _ in 0..day_count {
                version_matrix.push(cursor.read_bytes(level_count as usize)?.to_vec());
            }

            summary.add_frame(ChannelFrame {
                country,
                external_channel_id,
                day_count,
                version_matrix,
            });
        }

        debug!(
            "Decoded summary v{} starting at day {} with {} frames ({} trailing bytes)",
            summary.version,
            raw_start_day,
            summary.frames.len(),
            cursor.remaining()
        );

        Ok(summary)
    }

    /// Writes a summary in wire layout, undoing the start day shift
    #[cfg(test)]
    pub fn encode(summary: &Summary) -> Vec<u8> {
        let mut out = Vec::new();
        let raw_start_day = (summary.start_day_since_1970 + 1) as u32;

        out.push(summary.version);
        out.extend_from_slice(&raw_start_day.to_be_bytes()[1..]);
        out.push(summary.level_count);
        out.extend_from_slice(&(summary.frames.len() as u16).to_be_bytes());

        let mut frames: Vec<&ChannelFrame> = summary.frames.values().collect();
        frames.sort_by(|a, b| a.external_channel_id.cmp(&b.external_channel_id));

        for frame in frames {
            out.push(frame.country.len() as u8);
            out.extend_from_slice(frame.country.as_bytes());
            out.push(frame.external_channel_id.len() as u8);
            out.extend_from_slice(frame.external_channel_id.as_bytes());
            out.push(frame.day_count);
            for row in &frame.version_matrix {
                for level in 0..summary.level_count as usize {
                    out.push(row.get(level).copied().unwrap_or(0));
                }
            }
        }

        out
    }
}
