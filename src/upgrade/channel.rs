//! Migration of legacy notification channels into receivers and a routing tree.
//!
//! Every organization gets one configuration document. Its root route targets a default
//! receiver holding the channels flagged as default; alerts linked to other channels get a
//! child route matching their `rule_uid` label.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::amconfig::{ManagedIntegration, Matcher, MatcherError, Receiver, Route, UserConfig};
use super::rule::{ALERT_NAME_LABEL, RULE_UID_LABEL};
use super::settings::{ChannelSettings, NotificationKey, SettingsError, parse_secure_settings};
use crate::config::RouteStrategy;
use crate::crypto::{self, CryptoError, SecretKey};
use crate::models::alert_notification;

pub const DEFAULT_RECEIVER_NAME: &str = "autogen-contact-point-default";
pub const UNLINKED_RECEIVER_NAME: &str = "autogen-unlinked-channel-recv";
const BUNDLED_RECEIVER_PREFIX: &str = "autogen-contact-point-";
const RECEIVER_NAME_SEPARATOR: &str = "::sep::";
const RECEIVER_HASH_LEN: usize = 10;
pub const FOLDER_LABEL: &str = "grafana_folder";

pub const SUPPORTED_CHANNEL_TYPES: &[&str] = &[
    "email",
    "slack",
    "pagerduty",
    "opsgenie",
    "victorops",
    "webhook",
    "telegram",
    "teams",
    "discord",
    "googlechat",
    "line",
    "LINE",
    "threema",
    "pushover",
    "sensugo",
    "kafka",
    "dingding",
    "prometheus-alertmanager",
    "wecom",
];

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel '{uid}': {source}")]
    Settings {
        uid: String,
        #[source]
        source: SettingsError,
    },
    #[error("channel '{uid}': secure settings: {source}")]
    Crypto {
        uid: String,
        #[source]
        source: CryptoError,
    },
    #[error("route matcher: {0}")]
    Matcher(#[from] MatcherError),
}

pub fn is_supported(kind: &str) -> bool {
    SUPPORTED_CHANNEL_TYPES.contains(&kind)
}

/// Plain settings that are secrets for a channel type and belong in secure settings.
pub fn sensitive_fields(kind: &str) -> &'static [&'static str] {
    match kind {
        "slack" => &["url", "token"],
        "pagerduty" => &["integrationKey"],
        "opsgenie" => &["apiKey"],
        "telegram" => &["bottoken"],
        "webhook" => &["password"],
        "line" | "LINE" => &["token"],
        "threema" => &["api_secret"],
        "pushover" => &["apiToken", "userKey"],
        "sensugo" => &["apikey"],
        "kafka" => &["password"],
        "prometheus-alertmanager" => &["basicAuthPassword"],
        "wecom" => &["url", "secret"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions<'a> {
    pub strategy: RouteStrategy,
    pub promote_first_default: bool,
    pub key: &'a SecretKey,
}

/// Channels a migrated rule notified directly.
#[derive(Debug, Clone)]
pub struct AlertChannelLinks {
    pub rule_uid: String,
    pub notifications: Vec<NotificationKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub receivers: usize,
    pub routes: usize,
    pub unsupported_channels: usize,
    pub unknown_references: usize,
}

#[derive(Debug, Clone)]
pub struct OrgChannelMigration {
    pub config: UserConfig,
    pub stats: ChannelStats,
}

/// A supported channel with its secrets in plain text.
#[derive(Debug, Clone)]
struct MigratedChannel {
    id: i64,
    uid: String,
    name: String,
    /// Receiver name when the channel stands alone; unique within the org
    receiver_name: String,
    kind: String,
    is_default: bool,
    disable_resolve_message: bool,
    settings: JsonValue,
    secure_settings: BTreeMap<String, String>,
}

enum Resolution {
    Found(usize),
    Unsupported,
    Unknown,
}

/// Supported channels of one org, addressable by uid and by id.
struct ChannelCatalog {
    channels: Vec<MigratedChannel>,
    by_uid: HashMap<String, usize>,
    by_id: HashMap<i64, usize>,
    unsupported_uids: HashSet<String>,
    unsupported_ids: HashSet<i64>,
}

impl ChannelCatalog {
    fn build(
        org_id: i64,
        models: &[alert_notification::Model],
        key: &SecretKey,
    ) -> Result<Self, ChannelError> {
        let mut sorted: Vec<&alert_notification::Model> = models.iter().collect();
        sorted.sort_by_key(|m| m.id);

        let mut catalog = ChannelCatalog {
            channels: Vec::with_capacity(sorted.len()),
            by_uid: HashMap::new(),
            by_id: HashMap::new(),
            unsupported_uids: HashSet::new(),
            unsupported_ids: HashSet::new(),
        };

        for model in sorted {
            if !is_supported(&model.kind) {
                warn!(
                    org_id,
                    channel_uid = %model.uid,
                    channel_type = %model.kind,
                    "dropping notification channel of unsupported type"
                );
                catalog.unsupported_uids.insert(model.uid.clone());
                catalog.unsupported_ids.insert(model.id);
                continue;
            }
            let channel = migrate_channel(org_id, model, key)?;
            let idx = catalog.channels.len();
            catalog.by_uid.insert(channel.uid.clone(), idx);
            catalog.by_id.insert(channel.id, idx);
            catalog.channels.push(channel);
        }
        catalog.assign_receiver_names();
        Ok(catalog)
    }

    /// Channel names are not unique and may clash with generated receivers. The lowest-id
    /// holder of a free name keeps it; the others become `<name>-<uid>`.
    fn assign_receiver_names(&mut self) {
        let mut taken: HashSet<String> = HashSet::new();
        let mut renamed: Vec<usize> = Vec::new();
        for (idx, channel) in self.channels.iter().enumerate() {
            if is_reserved_receiver_name(&channel.name) || !taken.insert(channel.name.clone()) {
                renamed.push(idx);
            }
        }
        for idx in renamed {
            let channel = &self.channels[idx];
            let base = format!("{}-{}", channel.name, channel.uid);
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{base}-{n}");
            }
            debug!(
                channel_uid = %channel.uid,
                channel_name = %channel.name,
                receiver = %name,
                "renamed receiver of channel"
            );
            self.channels[idx].receiver_name = name;
        }
    }

    /// `id` wins when a reference carries both keys.
    fn resolve(&self, key: &NotificationKey) -> Resolution {
        if let Some(id) = key.id.filter(|id| *id != 0) {
            if let Some(&idx) = self.by_id.get(&id) {
                return Resolution::Found(idx);
            }
            if self.unsupported_ids.contains(&id) {
                return Resolution::Unsupported;
            }
            return Resolution::Unknown;
        }
        match key.uid.as_deref().filter(|uid| !uid.is_empty()) {
            Some(uid) if self.by_uid.contains_key(uid) => Resolution::Found(self.by_uid[uid]),
            Some(uid) if self.unsupported_uids.contains(uid) => Resolution::Unsupported,
            _ => Resolution::Unknown,
        }
    }
}

/// Parses settings, decrypts stored secrets and moves plain secrets into secure settings.
fn migrate_channel(
    org_id: i64,
    model: &alert_notification::Model,
    key: &SecretKey,
) -> Result<MigratedChannel, ChannelError> {
    let settings_err = |source| ChannelError::Settings {
        uid: model.uid.clone(),
        source,
    };
    let mut settings = ChannelSettings::parse(&model.settings).map_err(settings_err)?;
    let stored = parse_secure_settings(model.secure_settings.as_ref()).map_err(settings_err)?;

    let aad = crypto::secure_settings_aad(org_id, &model.uid);
    let mut secure_settings = crypto::decrypt_secure_settings(key, &aad, &stored).map_err(|source| {
        ChannelError::Crypto {
            uid: model.uid.clone(),
            source,
        }
    })?;

    for field in sensitive_fields(&model.kind) {
        if let Some(value) = settings.take_string(field) {
            secure_settings.entry((*field).to_string()).or_insert(value);
        }
    }

    Ok(MigratedChannel {
        id: model.id,
        uid: model.uid.clone(),
        name: model.name.clone(),
        receiver_name: model.name.clone(),
        kind: model.kind.clone(),
        is_default: model.is_default,
        disable_resolve_message: model.disable_resolve_message,
        settings: settings.into_value(),
        secure_settings,
    })
}

/// Receivers and routes under construction for one org.
struct ConfigBuilder<'a> {
    org_id: i64,
    key: &'a SecretKey,
    catalog: ChannelCatalog,
    receivers: Vec<Receiver>,
    receiver_index: HashMap<String, usize>,
    integration_uids: HashSet<String>,
    routes: Vec<Route>,
}

impl<'a> ConfigBuilder<'a> {
    /// Copies a channel into a receiver. Integration uids stay unique across the document.
    fn integration(&mut self, idx: usize) -> Result<ManagedIntegration, ChannelError> {
        let channel = &self.catalog.channels[idx];
        let mut uid = channel.uid.clone();
        let mut n = 1;
        while !self.integration_uids.insert(uid.clone()) {
            n += 1;
            uid = format!("{}-{}", channel.uid, n);
        }

        let aad = crypto::secure_settings_aad(self.org_id, &uid);
        let secure_settings = crypto::encrypt_secure_settings(self.key, &aad, &channel.secure_settings)
            .map_err(|source| ChannelError::Crypto {
                uid: channel.uid.clone(),
                source,
            })?;

        Ok(ManagedIntegration {
            uid,
            name: channel.name.clone(),
            kind: channel.kind.clone(),
            disable_resolve_message: channel.disable_resolve_message,
            settings: channel.settings.clone(),
            secure_settings,
        })
    }

    /// Returns the name of the receiver holding exactly `members`, creating it on first use.
    fn receiver_for(&mut self, name: String, members: &[usize]) -> Result<String, ChannelError> {
        if self.receiver_index.contains_key(&name) {
            return Ok(name);
        }
        let mut receiver = Receiver::new(name.clone());
        for &idx in members {
            let integration = self.integration(idx)?;
            receiver.grafana_managed_receiver_configs.push(integration);
        }
        debug!(org_id = self.org_id, receiver = %name, members = members.len(), "created receiver");
        self.receiver_index.insert(name.clone(), self.receivers.len());
        self.receivers.push(receiver);
        Ok(name)
    }

    fn single_receiver(&mut self, idx: usize) -> Result<String, ChannelError> {
        let name = self.catalog.channels[idx].receiver_name.clone();
        self.receiver_for(name, &[idx])
    }
}

fn is_reserved_receiver_name(name: &str) -> bool {
    name == UNLINKED_RECEIVER_NAME || name.starts_with(BUNDLED_RECEIVER_PREFIX)
}

/// Name of the receiver bundling a set of channels, derived from their uids. Identical sets
/// share a name.
pub fn bundled_receiver_name<'n>(channel_uids: impl IntoIterator<Item = &'n str>) -> String {
    let sorted: BTreeSet<&str> = channel_uids.into_iter().collect();
    let joined = sorted.into_iter().collect::<Vec<_>>().join(RECEIVER_NAME_SEPARATOR);
    let digest = hex::encode(Sha256::digest(joined.as_bytes()));
    format!("{}{}", BUNDLED_RECEIVER_PREFIX, &digest[..RECEIVER_HASH_LEN])
}

/// Builds the configuration document of one organization.
pub fn migrate_org_channels(
    org_id: i64,
    channels: &[alert_notification::Model],
    links: &[AlertChannelLinks],
    options: ChannelOptions<'_>,
) -> Result<OrgChannelMigration, ChannelError> {
    let catalog = ChannelCatalog::build(org_id, channels, options.key)?;
    let mut stats = ChannelStats {
        unsupported_channels: channels.len() - catalog.channels.len(),
        ..ChannelStats::default()
    };

    let mut defaults: Vec<usize> = (0..catalog.channels.len())
        .filter(|&idx| catalog.channels[idx].is_default)
        .collect();
    if defaults.is_empty() && options.promote_first_default && !catalog.channels.is_empty() {
        // Catalog is ordered by id.
        info!(
            org_id,
            channel_uid = %catalog.channels[0].uid,
            "no default channel, promoting the first channel to default"
        );
        defaults.push(0);
    }
    let default_set: HashSet<usize> = defaults.iter().copied().collect();

    let mut builder = ConfigBuilder {
        org_id,
        key: options.key,
        catalog,
        receivers: Vec::new(),
        receiver_index: HashMap::new(),
        integration_uids: HashSet::new(),
        routes: Vec::new(),
    };
    builder.receiver_for(DEFAULT_RECEIVER_NAME.to_string(), &defaults)?;

    let mut linked: HashSet<usize> = HashSet::new();
    for link in links {
        let mut targets: BTreeSet<usize> = BTreeSet::new();
        for key in &link.notifications {
            match builder.catalog.resolve(key) {
                Resolution::Found(idx) => {
                    linked.insert(idx);
                    if !default_set.contains(&idx) {
                        targets.insert(idx);
                    }
                }
                Resolution::Unsupported => {}
                Resolution::Unknown => {
                    warn!(
                        org_id,
                        rule_uid = %link.rule_uid,
                        channel_uid = ?key.uid,
                        channel_id = ?key.id,
                        "alert references an unknown notification channel"
                    );
                    stats.unknown_references += 1;
                }
            }
        }
        if targets.is_empty() {
            continue;
        }

        // Order members by name so the bundle content does not depend on link order.
        let mut members: Vec<usize> = targets.into_iter().collect();
        members.sort_by(|a, b| {
            builder.catalog.channels[*a]
                .name
                .cmp(&builder.catalog.channels[*b].name)
        });

        let matcher = Matcher::equal(RULE_UID_LABEL, &link.rule_uid)?;
        let route = match (options.strategy, members.as_slice()) {
            (_, [only]) => Route {
                receiver: builder.single_receiver(*only)?,
                object_matchers: vec![matcher],
                ..Route::default()
            },
            (RouteStrategy::Bundled, _) => {
                let name = bundled_receiver_name(
                    members
                        .iter()
                        .map(|&idx| builder.catalog.channels[idx].uid.as_str()),
                );
                Route {
                    receiver: builder.receiver_for(name, &members)?,
                    object_matchers: vec![matcher],
                    ..Route::default()
                }
            }
            (RouteStrategy::FanOut, _) => {
                let mut children = Vec::with_capacity(members.len());
                for &idx in &members {
                    children.push(Route {
                        receiver: builder.single_receiver(idx)?,
                        object_matchers: vec![matcher.clone()],
                        continue_matching: true,
                        ..Route::default()
                    });
                }
                Route {
                    object_matchers: vec![matcher],
                    routes: children,
                    ..Route::default()
                }
            }
        };
        builder.routes.push(route);
    }

    let unlinked: Vec<usize> = (0..builder.catalog.channels.len())
        .filter(|idx| !linked.contains(idx) && !default_set.contains(idx))
        .collect();
    if !unlinked.is_empty() {
        builder.receiver_for(UNLINKED_RECEIVER_NAME.to_string(), &unlinked)?;
    }

    stats.receivers = builder.receivers.len();
    stats.routes = builder.routes.len();

    let root = Route {
        receiver: DEFAULT_RECEIVER_NAME.to_string(),
        group_by: vec![FOLDER_LABEL.to_string(), ALERT_NAME_LABEL.to_string()],
        routes: builder.routes,
        ..Route::default()
    };
    Ok(OrgChannelMigration {
        config: UserConfig::new(root, builder.receivers),
        stats,
    })
}
