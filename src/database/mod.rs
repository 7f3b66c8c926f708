//! SQLite backed [`ScheduleStore`]
//!
//! Programs are stored one column per [`ProgramField`], so an update only
//! touches the columns a day file actually carried.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use strum::IntoEnumIterator;
use tracing::{debug, info};

use crate::codec::{attribute_kind, FieldKind};
use crate::config::DatabaseConfig;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{
    Channel, ChannelUpsert, FieldValue, Group, GroupUpsert, ProgramField, ProgramKey,
    ProgramRecord, ProgramTiming, VersionRecord,
};
use crate::repositories::ScheduleStore;

/// Migrations compiled into the binary, applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema.sql",
    include_str!("../../migrations/001_initial_schema.sql"),
)];

const CHANNEL_COLUMNS: &str = "id, group_id, external_channel_id, base_country, time_zone, name, \
     full_name, copyright, website, logo_url, category, all_countries, joined_channel_id, selected";

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> RepositoryResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(10))
            .connect_with(options)
            .await?;

        debug!("Connected to {}", config.url);
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                success BOOLEAN NOT NULL,
                checksum BLOB NOT NULL,
                execution_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for &(name, content) in MIGRATIONS {
            // "001_initial_schema.sql" -> 1
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| RepositoryError::MigrationFailed {
                    version: name.to_string(),
                    message: "file name does not start with a version number".to_string(),
                })?;

            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM _sqlx_migrations WHERE version = ? AND success = true",
            )
            .bind(version)
            .fetch_one(&self.pool)
            .await?;

            if existing > 0 {
                continue;
            }

            let start = std::time::Instant::now();
            let mut transaction = self.pool.begin().await?;

            if let Err(e) = sqlx::query(content).execute(&mut *transaction).await {
                transaction.rollback().await?;
                return Err(RepositoryError::MigrationFailed {
                    version: name.to_string(),
                    message: e.to_string(),
                });
            }

            let execution_time = start.elapsed().as_millis() as i64;
            sqlx::query(
                r#"
                INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time)
                VALUES (?, ?, true, ?, ?)
                "#,
            )
            .bind(version)
            .bind(name)
            .bind(Self::calculate_checksum(content))
            .bind(execution_time)
            .execute(&mut *transaction)
            .await?;

            transaction.commit().await?;
            info!("Applied migration: {} ({}ms)", name, execution_time);
        }

        Ok(())
    }

    fn calculate_checksum(content: &str) -> Vec<u8> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish().to_be_bytes().to_vec()
    }
}

fn push_field_value<'args>(builder: &mut QueryBuilder<'args, Sqlite>, value: &FieldValue) {
    match value {
        FieldValue::Integer(v) => builder.push_bind(*v),
        FieldValue::Text(v) => builder.push_bind(v.clone()),
        FieldValue::Binary(v) => builder.push_bind(v.clone()),
    };
}

fn program_from_row(row: &SqliteRow) -> RepositoryResult<ProgramRecord> {
    let mut fields = BTreeMap::new();
    for field in ProgramField::iter() {
        let column = field.column();
        let value = match attribute_kind(field) {
            FieldKind::Integer | FieldKind::Minutes => row
                .try_get::<Option<i64>, _>(column)?
                .map(FieldValue::Integer),
            FieldKind::Text => row
                .try_get::<Option<String>, _>(column)?
                .map(FieldValue::Text),
            FieldKind::Binary => row
                .try_get::<Option<Vec<u8>>, _>(column)?
                .map(FieldValue::Binary),
        };
        if let Some(value) = value {
            fields.insert(field, value);
        }
    }

    let frame_slot_id: i64 = row.try_get("frame_slot_id")?;
    let frame_slot_id = u8::try_from(frame_slot_id).map_err(|_| {
        RepositoryError::query_failed(
            "select programs",
            format!("frame slot {} out of range", frame_slot_id),
        )
    })?;

    Ok(ProgramRecord {
        frame_slot_id,
        channel_id: row.try_get("channel_id")?,
        day_epoch_millis: row.try_get("day_epoch_millis")?,
        start_time_millis: row.try_get("start_time_millis")?,
        end_time_millis: row.try_get("end_time_millis")?,
        fields,
    })
}

#[async_trait]
impl ScheduleStore for Database {
    async fn upsert_group(&self, group: &GroupUpsert) -> RepositoryResult<Group> {
        let stored = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (data_service_id, group_key, name, provider_name, description, mirrors)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (data_service_id, group_key) DO UPDATE SET
                name = excluded.name,
                provider_name = excluded.provider_name,
                description = excluded.description,
                mirrors = excluded.mirrors
            RETURNING id, data_service_id, group_key, name, provider_name, description, mirrors
            "#,
        )
        .bind(&group.data_service_id)
        .bind(&group.group_key)
        .bind(&group.name)
        .bind(&group.provider_name)
        .bind(&group.description)
        .bind(&group.mirrors)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn list_groups(&self, data_service_id: &str) -> RepositoryResult<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT id, data_service_id, group_key, name, provider_name, description, mirrors
             FROM groups WHERE data_service_id = ? ORDER BY id",
        )
        .bind(data_service_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    async fn update_group_mirrors(&self, group_id: i64, mirrors: &str) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE groups SET mirrors = ? WHERE id = ?")
            .bind(mirrors)
            .bind(group_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::record_not_found(
                "groups",
                "id",
                group_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn upsert_channel(&self, channel: &ChannelUpsert) -> RepositoryResult<Channel> {
        let query = format!(
            r#"
            INSERT INTO channels (group_id, external_channel_id, base_country, time_zone, name,
                full_name, copyright, website, logo_url, category, all_countries, joined_channel_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (group_id, external_channel_id) DO UPDATE SET
                base_country = excluded.base_country,
                time_zone = excluded.time_zone,
                name = excluded.name,
                full_name = excluded.full_name,
                copyright = excluded.copyright,
                website = excluded.website,
                logo_url = excluded.logo_url,
                category = excluded.category,
                all_countries = excluded.all_countries,
                joined_channel_id = excluded.joined_channel_id
            RETURNING {}
            "#,
            CHANNEL_COLUMNS
        );

        let stored = sqlx::query_as::<_, Channel>(&query)
            .bind(channel.group_id)
            .bind(&channel.external_channel_id)
            .bind(&channel.base_country)
            .bind(&channel.time_zone)
            .bind(&channel.name)
            .bind(&channel.full_name)
            .bind(&channel.copyright)
            .bind(&channel.website)
            .bind(&channel.logo_url)
            .bind(channel.category)
            .bind(&channel.all_countries)
            .bind(&channel.joined_channel_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    async fn list_channels(&self) -> RepositoryResult<Vec<Channel>> {
        let query = format!(
            "SELECT {} FROM channels ORDER BY group_id, external_channel_id",
            CHANNEL_COLUMNS
        );
        Ok(sqlx::query_as::<_, Channel>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn selected_channels(&self) -> RepositoryResult<Vec<Channel>> {
        let query = format!(
            "SELECT {} FROM channels WHERE selected = 1 ORDER BY group_id, external_channel_id",
            CHANNEL_COLUMNS
        );
        Ok(sqlx::query_as::<_, Channel>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn set_channel_selected(
        &self,
        external_channel_id: &str,
        selected: bool,
    ) -> RepositoryResult<u64> {
        let result = sqlx::query("UPDATE channels SET selected = ? WHERE external_channel_id = ?")
            .bind(selected)
            .bind(external_channel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn versions_in_range(
        &self,
        channel_id: i64,
        first_day: i64,
        last_day: i64,
    ) -> RepositoryResult<Vec<VersionRecord>> {
        let versions = sqlx::query_as::<_, VersionRecord>(
            "SELECT channel_id, days_since_1970, base_version, more0016_version, more1600_version,
                    picture0016_version, picture1600_version
             FROM data_versions
             WHERE channel_id = ? AND days_since_1970 BETWEEN ? AND ?
             ORDER BY days_since_1970",
        )
        .bind(channel_id)
        .bind(first_day)
        .bind(last_day)
        .fetch_all(&self.pool)
        .await?;

        Ok(versions)
    }

    async fn upsert_base_version(
        &self,
        channel_id: i64,
        days_since_1970: i64,
        version: i64,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO data_versions (channel_id, days_since_1970, base_version)
             VALUES (?, ?, ?)
             ON CONFLICT (channel_id, days_since_1970) DO UPDATE SET
                base_version = excluded.base_version",
        )
        .bind(channel_id)
        .bind(days_since_1970)
        .bind(version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_program(&self, record: &ProgramRecord) -> RepositoryResult<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE programs SET start_time_millis = ");
        builder.push_bind(record.start_time_millis);
        builder.push(", end_time_millis = ");
        builder.push_bind(record.end_time_millis);

        for (field, value) in &record.fields {
            builder.push(", ");
            builder.push(field.column());
            builder.push(" = ");
            push_field_value(&mut builder, value);
        }

        builder.push(" WHERE channel_id = ");
        builder.push_bind(record.channel_id);
        builder.push(" AND day_epoch_millis = ");
        builder.push_bind(record.day_epoch_millis);
        builder.push(" AND frame_slot_id = ");
        builder.push_bind(i64::from(record.frame_slot_id));

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_program(&self, record: &ProgramRecord) -> RepositoryResult<()> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO programs (channel_id, day_epoch_millis, frame_slot_id, \
             start_time_millis, end_time_millis",
        );
        for field in record.fields.keys() {
            builder.push(", ");
            builder.push(field.column());
        }

        builder.push(") VALUES (");
        builder.push_bind(record.channel_id);
        builder.push(", ");
        builder.push_bind(record.day_epoch_millis);
        builder.push(", ");
        builder.push_bind(i64::from(record.frame_slot_id));
        builder.push(", ");
        builder.push_bind(record.start_time_millis);
        builder.push(", ");
        builder.push_bind(record.end_time_millis);
        for value in record.fields.values() {
            builder.push(", ");
            push_field_value(&mut builder, value);
        }
        builder.push(")");

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn find_program(&self, key: &ProgramKey) -> RepositoryResult<Option<ProgramRecord>> {
        let row = sqlx::query(
            "SELECT * FROM programs
             WHERE channel_id = ? AND day_epoch_millis = ? AND frame_slot_id = ?",
        )
        .bind(key.channel_id)
        .bind(key.day_epoch_millis)
        .bind(i64::from(key.frame_slot_id))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(program_from_row).transpose()
    }

    async fn channel_programs(&self, channel_id: i64) -> RepositoryResult<Vec<ProgramRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM programs WHERE channel_id = ? ORDER BY start_time_millis, id",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(program_from_row).collect()
    }

    async fn delete_program_slots(
        &self,
        channel_id: i64,
        day_epoch_millis: i64,
        slots: &[u8],
    ) -> RepositoryResult<u64> {
        if slots.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM programs WHERE channel_id = ");
        builder.push_bind(channel_id);
        builder.push(" AND day_epoch_millis = ");
        builder.push_bind(day_epoch_millis);
        builder.push(" AND frame_slot_id IN (");
        let mut separated = builder.separated(", ");
        for &slot in slots {
            separated.push_bind(i64::from(slot));
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn program_timings(&self) -> RepositoryResult<Vec<ProgramTiming>> {
        let timings = sqlx::query_as::<_, ProgramTiming>(
            "SELECT id, channel_id, start_time_millis, end_time_millis
             FROM programs ORDER BY channel_id, start_time_millis, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(timings)
    }

    async fn set_program_end_time(&self, id: i64, end_time_millis: i64) -> RepositoryResult<()> {
        sqlx::query("UPDATE programs SET end_time_millis = ? WHERE id = ?")
            .bind(end_time_millis)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
