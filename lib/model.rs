//! Core data types shared by tiers, the chain engine, and the wire facade.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Metadata describing one entry of the virtual tree, plus the full content
/// for whole-file reads.
///
/// This doubles as the wire type of the HTTP facade, which keeps capitalized
/// JSON field names (`Name`, `Size`, `Mode`, `ModTime`, `IsDir`, `Content`).
/// `Content` travels base64-encoded and is only populated by `/read`
/// responses and `/write` requests; for directories it is always absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileInfo {
    /// Base name of the entry.
    pub name: String,
    /// Size in bytes. Ignored by consumers when `is_dir` is set.
    pub size: u64,
    /// POSIX mode bits as recorded by the underlying filesystem.
    pub mode: u32,
    /// Last modification time, carried as seconds since the epoch.
    #[serde(with = "unix_seconds")]
    pub mod_time: SystemTime,
    pub is_dir: bool,
    /// Full file content; `None` for metadata-only responses.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub content: Option<Vec<u8>>,
}

impl FileInfo {
    /// Build a `FileInfo` from local filesystem metadata.
    pub fn from_metadata(name: impl Into<String>, meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt as _;

        Self {
            name: name.into(),
            size: meta.len(),
            mode: meta.mode(),
            mod_time: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: meta.is_dir(),
            content: None,
        }
    }
}

/// The kind of advisory lock held on a path.
///
/// Wire representation is the integer discriminant (0/1/2), used by the
/// `type` query parameter of the `/lock` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Read,
    Write,
    Exclusive,
}

impl LockType {
    /// Integer form used on the wire.
    #[must_use]
    pub fn as_wire(self) -> u8 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::Exclusive => 2,
        }
    }

    /// Parse the wire integer; `None` for unknown values.
    #[must_use]
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::Exclusive),
            _ => None,
        }
    }

    /// Whether a holder of this lock keeps other processes from reading.
    #[must_use]
    pub fn excludes_readers(self) -> bool {
        matches!(self, Self::Write | Self::Exclusive)
    }
}

/// A lock record. At most one exists per path; the creating process is the
/// sole owner and the only one allowed to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLock {
    pub lock_type: LockType,
    pub pid: u32,
    pub created_at: SystemTime,
}

/// Capabilities a tier declares to the chain engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierFeatures {
    /// Writes (and read back-propagation) are allowed.
    pub can_update: bool,
    /// Deletes are allowed.
    pub can_delete: bool,
    /// The tier carries the chain's lock table. Only valid on the first tier.
    pub can_lock: bool,
}

impl TierFeatures {
    /// Capability union, used for chain-level feature aggregation.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            can_update: self.can_update || other.can_update,
            can_delete: self.can_delete || other.can_delete,
            can_lock: self.can_lock || other.can_lock,
        }
    }
}

/// The role a tier plays in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierRole {
    /// Authoritative backend.
    Main,
    /// Budgeted front tier filled by read back-propagation.
    Cache,
}

mod unix_seconds {
    use std::time::{Duration, SystemTime};

    use serde::{Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &SystemTime, ser: S) -> Result<S::Ok, S::Error> {
        let secs = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        ser.serialize_u64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<SystemTime, D::Error> {
        let secs = u64::deserialize(de)?;
        Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => ser.serialize_str(&STANDARD.encode(bytes)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw = Option::<String>::deserialize(de)?;
        raw.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
