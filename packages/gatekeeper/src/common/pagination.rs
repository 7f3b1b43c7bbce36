//! Opaque cursor helper for `GET /api/requests`, grounded on the teacher's
//! `common::pagination::Cursor` (base64-encoded, not a raw offset a client
//! could tamper with to skip the 50-row cap).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A cursor encoding "the last row seen": its `created_at` plus `id` as a
/// tiebreaker, since `created_at` alone is not unique.
#[derive(Debug, Clone, Copy)]
pub struct RequestCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl RequestCursor {
    pub fn encode(&self) -> String {
        let raw = format!("{}|{}", self.created_at.to_rfc3339(), self.id);
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(s: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(s).ok()?;
        let raw = String::from_utf8(bytes).ok()?;
        let (ts, id) = raw.split_once('|')?;
        Some(Self {
            created_at: DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc),
            id: Uuid::parse_str(id).ok()?,
        })
    }
}

/// The hard cap spec §6 places on `GET /api/requests`.
pub const MAX_REQUEST_LIST_LIMIT: i64 = 50;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrips() {
        let cursor = RequestCursor {
            created_at: Utc::now(),
            id: Uuid::new_v4(),
        };
        let encoded = cursor.encode();
        let decoded = RequestCursor::decode(&encoded).unwrap();
        assert_eq!(decoded.id, cursor.id);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(RequestCursor::decode("not-a-cursor!!").is_none());
    }
}
