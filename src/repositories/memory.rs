//! In-memory [`ScheduleStore`] for tests and dry runs.
//!
//! All tables live in one `std::sync::RwLock` so ids and uniqueness rules
//! stay consistent across tables. No lock is held across an await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::ScheduleStore;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{
    Channel, ChannelUpsert, Group, GroupUpsert, ProgramKey, ProgramRecord, ProgramTiming,
    VersionRecord,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    groups: Vec<Group>,
    channels: Vec<Channel>,
    versions: HashMap<(i64, i64), VersionRecord>,
    programs: BTreeMap<ProgramKey, (i64, ProgramRecord)>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| RepositoryError::query_failed("read", "memory store lock poisoned"))
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| RepositoryError::query_failed("write", "memory store lock poisoned"))
    }

    /// Number of stored programs across all channels
    pub fn program_count(&self) -> RepositoryResult<usize> {
        Ok(self.read()?.programs.len())
    }
}

fn sorted_channels<'a>(channels: impl Iterator<Item = &'a Channel>) -> Vec<Channel> {
    let mut channels: Vec<Channel> = channels.cloned().collect();
    channels.sort_by(|a, b| {
        (a.group_id, &a.external_channel_id).cmp(&(b.group_id, &b.external_channel_id))
    });
    channels
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn upsert_group(&self, group: &GroupUpsert) -> RepositoryResult<Group> {
        let mut tables = self.write()?;

        if let Some(existing) = tables.groups.iter_mut().find(|g| {
            g.data_service_id == group.data_service_id && g.group_key == group.group_key
        }) {
            existing.name = group.name.clone();
            existing.provider_name = group.provider_name.clone();
            existing.description = group.description.clone();
            existing.mirrors = group.mirrors.clone();
            return Ok(existing.clone());
        }

        let id = tables.allocate_id();
        let created = Group {
            id,
            data_service_id: group.data_service_id.clone(),
            group_key: group.group_key.clone(),
            name: group.name.clone(),
            provider_name: group.provider_name.clone(),
            description: group.description.clone(),
            mirrors: group.mirrors.clone(),
        };
        tables.groups.push(created.clone());
        Ok(created)
    }

    async fn list_groups(&self, data_service_id: &str) -> RepositoryResult<Vec<Group>> {
        Ok(self
            .read()?
            .groups
            .iter()
            .filter(|g| g.data_service_id == data_service_id)
            .cloned()
            .collect())
    }

    async fn update_group_mirrors(&self, group_id: i64, mirrors: &str) -> RepositoryResult<()> {
        let mut tables = self.write()?;
        let group = tables
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| RepositoryError::record_not_found("groups", "id", group_id.to_string()))?;
        group.mirrors = mirrors.to_string();
        Ok(())
    }

    async fn upsert_channel(&self, channel: &ChannelUpsert) -> RepositoryResult<Channel> {
        let mut tables = self.write()?;

        let id = match tables.channels.iter().find(|c| {
            c.group_id == channel.group_id && c.external_channel_id == channel.external_channel_id
        }) {
            Some(existing) => existing.id,
            None => tables.allocate_id(),
        };
        let selected = tables
            .channels
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.selected)
            .unwrap_or(false);

        let stored = Channel {
            id,
            group_id: channel.group_id,
            external_channel_id: channel.external_channel_id.clone(),
            base_country: channel.base_country.clone(),
            time_zone: channel.time_zone.clone(),
            name: channel.name.clone(),
            full_name: channel.full_name.clone(),
            copyright: channel.copyright.clone(),
            website: channel.website.clone(),
            logo_url: channel.logo_url.clone(),
            category: channel.category,
            all_countries: channel.all_countries.clone(),
            joined_channel_id: channel.joined_channel_id.clone(),
            selected,
        };

        match tables.channels.iter_mut().find(|c| c.id == id) {
            Some(slot) => *slot = stored.clone(),
            None => tables.channels.push(stored.clone()),
        }
        Ok(stored)
    }

    async fn list_channels(&self) -> RepositoryResult<Vec<Channel>> {
        Ok(sorted_channels(self.read()?.channels.iter()))
    }

    async fn selected_channels(&self) -> RepositoryResult<Vec<Channel>> {
        Ok(sorted_channels(
            self.read()?.channels.iter().filter(|c| c.selected),
        ))
    }

    async fn set_channel_selected(
        &self,
        external_channel_id: &str,
        selected: bool,
    ) -> RepositoryResult<u64> {
        let mut tables = self.write()?;
        let mut touched = 0;
        for channel in tables
            .channels
            .iter_mut()
            .filter(|c| c.external_channel_id == external_channel_id)
        {
            channel.selected = selected;
            touched += 1;
        }
        Ok(touched)
    }

    async fn versions_in_range(
        &self,
        channel_id: i64,
        first_day: i64,
        last_day: i64,
    ) -> RepositoryResult<Vec<VersionRecord>> {
        let tables = self.read()?;
        let mut versions: Vec<VersionRecord> = tables
            .versions
            .values()
            .filter(|v| {
                v.channel_id == channel_id
                    && v.days_since_1970 >= first_day
                    && v.days_since_1970 <= last_day
            })
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.days_since_1970);
        Ok(versions)
    }

    async fn upsert_base_version(
        &self,
        channel_id: i64,
        days_since_1970: i64,
        version: i64,
    ) -> RepositoryResult<()> {
        let mut tables = self.write()?;
        tables
            .versions
            .entry((channel_id, days_since_1970))
            .or_insert_with(|| VersionRecord {
                channel_id,
                days_since_1970,
                ..Default::default()
            })
            .base_version = version;
        Ok(())
    }

    async fn update_program(&self, record: &ProgramRecord) -> RepositoryResult<bool> {
        let mut tables = self.write()?;
        let Some((_, stored)) = tables.programs.get_mut(&record.key()) else {
            return Ok(false);
        };

        stored.start_time_millis = record.start_time_millis;
        stored.end_time_millis = record.end_time_millis;
        for (field, value) in &record.fields {
            stored.fields.insert(*field, value.clone());
        }
        Ok(true)
    }

    async fn insert_program(&self, record: &ProgramRecord) -> RepositoryResult<()> {
        let mut tables = self.write()?;
        if tables.programs.contains_key(&record.key()) {
            return Err(RepositoryError::query_failed(
                "insert programs",
                format!("duplicate key {:?}", record.key()),
            ));
        }
        let id = tables.allocate_id();
        tables.programs.insert(record.key(), (id, record.clone()));
        Ok(())
    }

    async fn find_program(&self, key: &ProgramKey) -> RepositoryResult<Option<ProgramRecord>> {
        Ok(self.read()?.programs.get(key).map(|(_, r)| r.clone()))
    }

    async fn channel_programs(&self, channel_id: i64) -> RepositoryResult<Vec<ProgramRecord>> {
        let tables = self.read()?;
        let mut programs: Vec<ProgramRecord> = tables
            .programs
            .values()
            .filter(|(_, r)| r.channel_id == channel_id)
            .map(|(_, r)| r.clone())
            .collect();
        programs.sort_by_key(|r| r.start_time_millis);
        Ok(programs)
    }

    async fn delete_program_slots(
        &self,
        channel_id: i64,
        day_epoch_millis: i64,
        slots: &[u8],
    ) -> RepositoryResult<u64> {
        let mut tables = self.write()?;
        let mut removed = 0;
        for &frame_slot_id in slots {
            let key = ProgramKey {
                frame_slot_id,
                day_epoch_millis,
                channel_id,
            };
            if tables.programs.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn program_timings(&self) -> RepositoryResult<Vec<ProgramTiming>> {
        let tables = self.read()?;
        let mut timings: Vec<ProgramTiming> = tables
            .programs
            .values()
            .map(|(id, r)| ProgramTiming {
                id: *id,
                channel_id: r.channel_id,
                start_time_millis: r.start_time_millis,
                end_time_millis: r.end_time_millis,
            })
            .collect();
        timings.sort_by_key(|t| (t.channel_id, t.start_time_millis, t.id));
        Ok(timings)
    }

    async fn set_program_end_time(&self, id: i64, end_time_millis: i64) -> RepositoryResult<()> {
        let mut tables = self.write()?;
        let (_, record) = tables
            .programs
            .values_mut()
            .find(|(stored_id, _)| *stored_id == id)
            .ok_or_else(|| RepositoryError::record_not_found("programs", "id", id.to_string()))?;
        record.end_time_millis = end_time_millis;
        Ok(())
    }
}
