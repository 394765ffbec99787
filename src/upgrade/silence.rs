//! Silences for alerts that were paused before the upgrade.
//!
//! The silence store is a concatenation of length-delimited `MeshSilence` protobuf
//! messages. The file is staged in a temp file next to the store and renamed into place
//! once the upgrade has committed.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use prost::Message;
use prost_types::Timestamp;
use scopeguard::ScopeGuard;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::rule::RULE_UID_LABEL;

pub const SILENCE_CREATED_BY: &str = "Alerting Upgrade";
pub const SILENCE_COMMENT: &str = "Created during auto migration to unified alerting";
const SILENCE_EXPIRY_DAYS: i64 = 365 * 20;

#[derive(Debug, Error)]
pub enum SilenceError {
    #[error("failed to write silences to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MatcherType {
    Equal = 0,
    Regexp = 1,
    NotEqual = 2,
    NotRegexp = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Matcher {
    #[prost(enumeration = "MatcherType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub pattern: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Silence {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, repeated, tag = "2")]
    pub matchers: Vec<Matcher>,
    #[prost(message, optional, tag = "3")]
    pub starts_at: Option<Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub ends_at: Option<Timestamp>,
    #[prost(message, optional, tag = "5")]
    pub updated_at: Option<Timestamp>,
    #[prost(string, tag = "6")]
    pub created_by: String,
    #[prost(string, tag = "7")]
    pub comment: String,
}

/// Silence plus the time the store may garbage collect it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshSilence {
    #[prost(message, optional, tag = "1")]
    pub silence: Option<Silence>,
    #[prost(message, optional, tag = "2")]
    pub expires_at: Option<Timestamp>,
}

/// Silence muting every alert of one rule for twenty years.
pub fn rule_silence(rule_uid: &str, now: DateTime<Utc>) -> MeshSilence {
    let ends_at = now + Duration::days(SILENCE_EXPIRY_DAYS);
    MeshSilence {
        silence: Some(Silence {
            id: Uuid::new_v4().to_string(),
            matchers: vec![Matcher {
                r#type: MatcherType::Equal as i32,
                name: RULE_UID_LABEL.to_string(),
                pattern: rule_uid.to_string(),
            }],
            starts_at: Some(to_timestamp(now)),
            ends_at: Some(to_timestamp(ends_at)),
            updated_at: Some(to_timestamp(now)),
            created_by: SILENCE_CREATED_BY.to_string(),
            comment: SILENCE_COMMENT.to_string(),
        }),
        expires_at: Some(to_timestamp(ends_at)),
    }
}

fn to_timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Silences collected during a pass, written once at the end.
#[derive(Debug, Default)]
pub struct SilenceBuffer {
    silences: Vec<MeshSilence>,
}

impl SilenceBuffer {
    pub fn add_for_rule(&mut self, rule_uid: &str, now: DateTime<Utc>) {
        debug!(rule_uid, "silencing paused alert");
        self.silences.push(rule_silence(rule_uid, now));
    }

    pub fn len(&self) -> usize {
        self.silences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.silences.is_empty()
    }

    pub fn silences(&self) -> &[MeshSilence] {
        &self.silences
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for silence in &self.silences {
            // A Vec grows on demand, so encoding cannot run out of space.
            let _ = silence.encode_length_delimited(&mut buf);
        }
        buf
    }

    /// Replaces the file at `path` with the buffered silences. Nothing is written when the
    /// buffer is empty. Returns the number of silences written.
    pub fn write_to(&self, path: &Path) -> Result<usize, SilenceError> {
        self.stage(path)?.publish()
    }

    /// Writes the buffered silences to a temp file next to `path` without replacing it.
    pub fn stage(&self, path: &Path) -> Result<StagedSilences, SilenceError> {
        let mut staged = StagedSilences {
            tmp: None,
            target: path.to_path_buf(),
            count: self.silences.len(),
        };
        if self.silences.is_empty() {
            return Ok(staged);
        }
        let write_err = |source| SilenceError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(write_err)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("silences");
        let tmp_path = dir.join(format!("{}.{:016x}", file_name, rand::random::<u64>()));
        let tmp = scopeguard::guard(tmp_path, remove_staged as fn(PathBuf));

        let mut file = File::create(&*tmp).map_err(write_err)?;
        file.write_all(&self.encode()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        debug!(path = %tmp.display(), count = staged.count, "staged silences");
        staged.tmp = Some(tmp);
        Ok(staged)
    }
}

fn remove_staged(tmp: PathBuf) {
    let _ = fs::remove_file(&tmp);
}

/// Silences written to a temp file and not yet published. Dropping it removes the temp file
/// and leaves the target untouched.
pub struct StagedSilences {
    tmp: Option<ScopeGuard<PathBuf, fn(PathBuf)>>,
    target: PathBuf,
    count: usize,
}

impl StagedSilences {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Atomically replaces the target with the staged file.
    pub fn publish(self) -> Result<usize, SilenceError> {
        let Some(tmp) = self.tmp else {
            return Ok(0);
        };
        fs::rename(&*tmp, &self.target).map_err(|source| SilenceError::Write {
            path: self.target.clone(),
            source,
        })?;
        ScopeGuard::into_inner(tmp);

        info!(path = %self.target.display(), count = self.count, "wrote silences");
        Ok(self.count)
    }
}

impl fmt::Debug for StagedSilences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedSilences")
            .field("target", &self.target)
            .field("count", &self.count)
            .field("staged", &self.tmp.is_some())
            .finish()
    }
}

/// Reads back a silence file; used to verify what was written.
pub fn decode_silences(mut bytes: &[u8]) -> Result<Vec<MeshSilence>, prost::DecodeError> {
    let mut silences = Vec::new();
    while !bytes.is_empty() {
        silences.push(MeshSilence::decode_length_delimited(&mut bytes)?);
    }
    Ok(silences)
}
