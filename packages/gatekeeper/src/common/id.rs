//! Typed, prefixed opaque ID wrappers for compile-time type safety.
//!
//! `Id<T>` wraps a `uuid::Uuid` the way the teacher's `common::id::Id<T, V>`
//! does, but additionally knows how to render itself with a stable string
//! prefix (`req_…`, `key_…`, `dtok_…`) per spec §3 — so different entity
//! kinds can't be mixed up at compile time *or* accidentally passed to the
//! wrong HTTP endpoint at runtime.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// Implemented by each entity marker type to give `Id<T>` its display prefix.
pub trait Prefixed {
    /// Stable string prefix, e.g. `"req"` for `Request`.
    const PREFIX: &'static str;
}

/// A typed, prefixed wrapper around `Uuid`.
#[repr(transparent)]
pub struct Id<T>(Uuid, PhantomData<fn() -> T>);

impl<T> Id<T> {
    /// Mint a new random ID.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4(), PhantomData)
    }

    /// Wrap an existing `Uuid` (e.g. loaded from storage).
    #[inline]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    #[inline]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    #[inline]
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl<T: Prefixed> Id<T> {
    /// Parse an opaque ID of the form `<prefix>_<uuid>`.
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let rest = s
            .strip_prefix(T::PREFIX)
            .and_then(|r| r.strip_prefix('_'))
            .ok_or(IdParseError::WrongPrefix)?;
        let uuid = Uuid::parse_str(rest).map_err(|_| IdParseError::BadUuid)?;
        Ok(Self::from_uuid(uuid))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdParseError {
    #[error("id did not carry the expected prefix")]
    WrongPrefix,
    #[error("id body was not a valid uuid")]
    BadUuid,
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(&format!("Id<{}>", std::any::type_name::<T>()))
            .field(&self.0)
            .finish()
    }
}

impl<T: Prefixed> Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", T::PREFIX, self.0)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> From<Uuid> for Id<T> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<T> From<Id<T>> for Uuid {
    fn from(id: Id<T>) -> Self {
        id.0
    }
}

/// `FromStr` parses the bare UUID (no prefix) — used when reading values
/// back out of the database, where the column only ever stores the UUID.
impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?, PhantomData))
    }
}

// Serde: always the bare UUID on the wire for fields embedded in larger
// JSON documents (e.g. inside `details`); top-level path/body IDs are
// rendered with `Display` (prefixed) by the HTTP layer explicitly.
impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

// sqlx (SQLite has no native UUID column type; store as TEXT).
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Type};

impl<T> Type<Sqlite> for Id<T> {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'q, T> Encode<'q, Sqlite> for Id<T> {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, BoxDynError> {
        <String as Encode<Sqlite>>::encode(self.0.to_string(), buf)
    }
}

impl<'r, T> Decode<'r, Sqlite> for Id<T> {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        Ok(Self(Uuid::parse_str(&s)?, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;
    impl Prefixed for Widget {
        const PREFIX: &'static str = "wgt";
    }
    type WidgetId = Id<Widget>;

    #[test]
    fn new_creates_unique_ids() {
        assert_ne!(WidgetId::new(), WidgetId::new());
    }

    #[test]
    fn display_carries_prefix() {
        let id = WidgetId::new();
        assert!(id.to_string().starts_with("wgt_"));
    }

    #[test]
    fn parse_roundtrips_prefixed_string() {
        let id = WidgetId::new();
        let rendered = id.to_string();
        let parsed = WidgetId::parse(&rendered).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_wrong_prefix() {
        let id = WidgetId::new();
        let wrong = format!("oth_{}", id.as_uuid());
        assert!(matches!(
            WidgetId::parse(&wrong),
            Err(IdParseError::WrongPrefix)
        ));
    }

    #[test]
    fn serde_roundtrips_bare_uuid() {
        let id = WidgetId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: WidgetId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
