//! Group and channel catalogs
//!
//! Both catalogs are `;` separated text, one record per line. The groups
//! catalog is served plain, channel lists are gzip compressed ISO-8859-1.
//! A malformed line is logged and skipped; the rest of the catalog still
//! applies.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::codec::cursor::{latin1_to_string, text_from_bytes};
use crate::errors::{AppResult, DecodeError, DecodeResult};
use crate::models::{ChannelUpsert, Group, GroupUpsert};
use crate::repositories::ScheduleStore;
use crate::utils::DecompressionService;

const GROUPS_CATALOG: &str = "groups";
const CHANNELS_CATALOG: &str = "channels";

/// Splits a catalog line on `;`, dropping trailing empty fields
fn split_fields(line: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = line.split(';').collect();
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

/// `groupKey;name;provider;description;mirror[;mirror...]`
pub fn parse_group_line(data_service_id: &str, line: &str) -> DecodeResult<GroupUpsert> {
    let parts = split_fields(line);
    if parts.len() < 5 {
        return Err(DecodeError::catalog(
            GROUPS_CATALOG,
            format!("expected at least 5 fields, got {}", parts.len()),
        ));
    }

    Ok(GroupUpsert {
        data_service_id: data_service_id.to_string(),
        group_key: parts[0].to_string(),
        name: parts[1].to_string(),
        provider_name: parts[2].to_string(),
        description: parts[3].to_string(),
        mirrors: parts[4..].join(";"),
    })
}

/// `country;tz;id;name;copyright;website;logo;category[;"full;name"[;countries[;joined]]]`
///
/// The full name may itself contain `;`: it runs from the ninth field up
/// to and including the first field ending in a double quote.
pub fn parse_channel_line(group_id: i64, line: &str) -> DecodeResult<ChannelUpsert> {
    let parts = split_fields(line);
    if parts.len() < 8 {
        return Err(DecodeError::catalog(
            CHANNELS_CATALOG,
            format!("expected at least 8 fields, got {}", parts.len()),
        ));
    }

    let category = parts[7].trim().parse::<i64>().map_err(|_| {
        DecodeError::catalog(CHANNELS_CATALOG, format!("invalid category '{}'", parts[7]))
    })?;

    let mut index = 8;
    let mut full_name_parts = Vec::new();
    while index < parts.len() {
        let part = parts[index];
        full_name_parts.push(part);
        index += 1;
        if part.ends_with('"') {
            break;
        }
    }

    let full_name = full_name_parts.join(";").replace('"', "");
    let name = parts[3].to_string();
    let base_country = parts[0].to_string();

    let all_countries = parts
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| base_country.clone());
    let joined_channel_id = parts
        .get(index + 1)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok(ChannelUpsert {
        group_id,
        external_channel_id: parts[2].to_string(),
        base_country,
        time_zone: parts[1].to_string(),
        full_name: if full_name.is_empty() {
            name.clone()
        } else {
            full_name
        },
        name,
        copyright: parts[4].to_string(),
        website: parts[5].to_string(),
        logo_url: parts[6].to_string(),
        category,
        all_countries,
        joined_channel_id,
    })
}

/// Inflates and parses a downloaded channel list
///
/// CPU bound; the orchestrator runs it on the blocking pool.
pub fn decode_channel_list(group_id: i64, body: Bytes) -> DecodeResult<Vec<ChannelUpsert>> {
    let text = latin1_to_string(&DecompressionService::decompress(body)?);

    let mut channels = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match parse_channel_line(group_id, line) {
            Ok(channel) => channels.push(channel),
            Err(e) => warn!("Skipping channel line {}: {}", line_number + 1, e),
        }
    }
    Ok(channels)
}

/// Writes catalogs into the store
pub struct CatalogSyncer {
    store: Arc<dyn ScheduleStore>,
    data_service_id: String,
}

impl CatalogSyncer {
    pub fn new(store: Arc<dyn ScheduleStore>, data_service_id: impl Into<String>) -> Self {
        Self {
            store,
            data_service_id: data_service_id.into(),
        }
    }

    /// Upserts every group of the groups catalog, returning them stored
    pub async fn sync_groups(&self, body: Bytes) -> AppResult<Vec<Group>> {
        let text = text_from_bytes(&DecompressionService::decompress(body)?);

        let mut groups = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            match parse_group_line(&self.data_service_id, line) {
                Ok(group) => match self.store.upsert_group(&group).await {
                    Ok(stored) => {
                        debug!("Upserted group {} ({})", stored.group_key, stored.id);
                        groups.push(stored);
                    }
                    Err(e) => warn!("Group {} not stored: {}", group.group_key, e),
                },
                Err(e) => warn!("Skipping group line {}: {}", line_number + 1, e),
            }
        }

        info!("Synchronized {} groups", groups.len());
        Ok(groups)
    }

    /// Upserts decoded channels, returning how many were written
    pub async fn sync_channels(&self, group: &Group, channels: &[ChannelUpsert]) -> AppResult<usize> {
        for channel in channels {
            self.store.upsert_channel(channel).await?;
        }
        info!(
            "Synchronized {} channels of group {}",
            channels.len(),
            group.group_key
        );
        Ok(channels.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_group_line_rejoins_mirrors() {
        let group = parse_group_line(
            "epgfree",
            "main;Main group;TV-Browser;Free data;http://a.org/#5;http://b.org/",
        )
        .unwrap();

        assert_eq!(group.group_key, "main");
        assert_eq!(group.provider_name, "TV-Browser");
        assert_eq!(group.mirrors, "http://a.org/#5;http://b.org/");
    }

    #[test]
    fn test_short_group_line_is_rejected() {
        assert!(matches!(
            parse_group_line("epgfree", "main;Main;Provider"),
            Err(DecodeError::InvalidCatalogLine { .. })
        ));
    }

    #[test]
    fn test_channel_line_with_quoted_full_name() {
        let channel = parse_channel_line(
            7,
            "de;Europe/Berlin;ard;ARD;(c) ARD;http://ard.de;http://ard.de/logo.png;1;\"Das Erste; ARD\";de,at;daserste",
        )
        .unwrap();

        assert_eq!(channel.group_id, 7);
        assert_eq!(channel.external_channel_id, "ard");
        assert_eq!(channel.time_zone, "Europe/Berlin");
        assert_eq!(channel.category, 1);
        assert_eq!(channel.full_name, "Das Erste; ARD");
        assert_eq!(channel.all_countries, "de,at");
        assert_eq!(channel.joined_channel_id.as_deref(), Some("daserste"));
    }

    #[rstest]
    #[case::no_optional_fields("de;UTC;zdf;ZDF;c;w;l;2", "ZDF", "de", None)]
    #[case::trailing_separators("de;UTC;zdf;ZDF;c;w;l;2;;;", "ZDF", "de", None)]
    #[case::unquoted_full_name("de;UTC;zdf;ZDF;c;w;l;2;\"Zweites\";de,ch", "Zweites", "de,ch", None)]
    #[case::unterminated_quote("de;UTC;zdf;ZDF;c;w;l;2;\"Zweites;Deutsches", "Zweites;Deutsches", "de", None)]
    fn test_channel_line_optional_fields(
        #[case] line: &str,
        #[case] full_name: &str,
        #[case] all_countries: &str,
        #[case] joined: Option<&str>,
    ) {
        let channel = parse_channel_line(1, line).unwrap();
        assert_eq!(channel.full_name, full_name);
        assert_eq!(channel.all_countries, all_countries);
        assert_eq!(channel.joined_channel_id.as_deref(), joined);
    }

    #[test]
    fn test_invalid_category_is_rejected() {
        assert!(parse_channel_line(1, "de;UTC;zdf;ZDF;c;w;l;news").is_err());
    }

    #[test]
    fn test_channel_list_is_latin1_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(b"de;Europe/Berlin;br;Bayerisches Fernsehen;c;w;l;1;\"M\xfcnchen\"\r\nbroken line\n")
            .unwrap();
        let body = Bytes::from(encoder.finish().unwrap());

        let channels = decode_channel_list(3, body).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].full_name, "München");
    }

    #[tokio::test]
    async fn test_sync_groups_skips_bad_lines() {
        let store = Arc::new(MemoryStore::new());
        let syncer = CatalogSyncer::new(store.clone(), "epgfree");

        let groups = syncer
            .sync_groups(Bytes::from_static(
                b"main;Main;P;D;http://a.org/\n\nbad line\nextra;Extra;P;D;http://b.org/;http://c.org/\n",
            ))
            .await
            .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(store.list_groups("epgfree").await.unwrap().len(), 2);

        let channels = vec![parse_channel_line(groups[0].id, "de;UTC;zdf;ZDF;c;w;l;2").unwrap()];
        assert_eq!(syncer.sync_channels(&groups[0], &channels).await.unwrap(), 1);
        assert_eq!(store.list_channels().await.unwrap().len(), 1);
    }
}
