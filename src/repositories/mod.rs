//! Storage abstraction for the sync pipeline
//!
//! The pipeline only ever talks to a [`ScheduleStore`]. Every method is
//! independently atomic; no transaction spans two calls, so a cycle torn
//! down half way leaves a consistent (if incomplete) store behind that the
//! next cycle simply overwrites.
//!
//! Two implementations exist: the SQLite [`Database`](crate::database::Database)
//! used by the binary, and [`MemoryStore`] used by tests and dry runs.

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::models::{
    Channel, ChannelUpsert, Group, GroupUpsert, ProgramKey, ProgramRecord, ProgramTiming,
    VersionRecord,
};

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert or update a group keyed by (data service id, group key)
    async fn upsert_group(&self, group: &GroupUpsert) -> RepositoryResult<Group>;

    async fn list_groups(&self, data_service_id: &str) -> RepositoryResult<Vec<Group>>;

    /// Replace the `;` separated mirror string of a group
    async fn update_group_mirrors(&self, group_id: i64, mirrors: &str) -> RepositoryResult<()>;

    /// Insert or update a channel keyed by (group id, external channel id)
    ///
    /// The selection flag of an existing channel is preserved.
    async fn upsert_channel(&self, channel: &ChannelUpsert) -> RepositoryResult<Channel>;

    /// All channels ordered by group and external id
    async fn list_channels(&self) -> RepositoryResult<Vec<Channel>>;

    /// Selected channels ordered by group and external id
    async fn selected_channels(&self) -> RepositoryResult<Vec<Channel>>;

    /// Flags every channel with the given external id, returns the number touched
    async fn set_channel_selected(
        &self,
        external_channel_id: &str,
        selected: bool,
    ) -> RepositoryResult<u64>;

    /// Version rows of a channel for the inclusive epoch day range
    async fn versions_in_range(
        &self,
        channel_id: i64,
        first_day: i64,
        last_day: i64,
    ) -> RepositoryResult<Vec<VersionRecord>>;

    /// Write the base level version of a (channel, day), creating the row if needed
    async fn upsert_base_version(
        &self,
        channel_id: i64,
        days_since_1970: i64,
        version: i64,
    ) -> RepositoryResult<()>;

    /// Overwrite start, end and the fields present on `record` of the
    /// program with the same key. Returns `false` when no such program exists.
    async fn update_program(&self, record: &ProgramRecord) -> RepositoryResult<bool>;

    async fn insert_program(&self, record: &ProgramRecord) -> RepositoryResult<()>;

    async fn find_program(&self, key: &ProgramKey) -> RepositoryResult<Option<ProgramRecord>>;

    /// Programs of one channel ordered by start time
    async fn channel_programs(&self, channel_id: i64) -> RepositoryResult<Vec<ProgramRecord>>;

    /// Delete the given slots of one (channel, day), returns the number removed
    async fn delete_program_slots(
        &self,
        channel_id: i64,
        day_epoch_millis: i64,
        slots: &[u8],
    ) -> RepositoryResult<u64>;

    /// Timing of every stored program ordered by (channel, start time)
    async fn program_timings(&self) -> RepositoryResult<Vec<ProgramTiming>>;

    async fn set_program_end_time(&self, id: i64, end_time_millis: i64) -> RepositoryResult<()>;
}
