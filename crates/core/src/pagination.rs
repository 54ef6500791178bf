//! Opaque continuation cursors for `(created_at DESC, id DESC)` listings.
//!
//! A cursor carries the sort key of the last row a caller has seen. The
//! payload is versioned JSON, signed with HMAC-SHA256 and wrapped in URL-safe
//! base64. A cursor that fails to decode for any reason is ignored and the
//! listing restarts from the top.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const CURSOR_VERSION: u8 = 1;

/// Sort key of the last row returned on a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

impl Cursor {
    pub fn new(timestamp: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self { timestamp, id: id.into() }
    }

    /// True when a row sorts strictly after this cursor in descending order.
    pub fn precedes(&self, created_at: DateTime<Utc>, id: &str) -> bool {
        created_at < self.timestamp || (created_at == self.timestamp && id < self.id.as_str())
    }
}

/// Anything listed with cursor pagination exposes its sort key.
pub trait CursorKey {
    fn cursor_timestamp(&self) -> DateTime<Utc>;
    fn cursor_id(&self) -> &str;

    fn cursor(&self) -> Cursor {
        Cursor::new(self.cursor_timestamp(), self.cursor_id())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding,
    #[error("cursor is missing its signature")]
    MissingSignature,
    #[error("cursor signature does not verify")]
    Signature,
    #[error("cursor payload is malformed")]
    Payload,
    #[error("cursor version {0} is not supported")]
    Version(u8),
}

#[derive(Serialize, Deserialize)]
struct WireCursor {
    v: u8,
    ts: DateTime<Utc>,
    id: String,
}

#[derive(Clone)]
pub struct CursorCodec {
    signing_key: Vec<u8>,
}

impl std::fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCodec").field("signing_key", &"<redacted>").finish()
    }
}

impl CursorCodec {
    pub fn new(signing_key: impl AsRef<[u8]>) -> Self {
        Self { signing_key: signing_key.as_ref().to_vec() }
    }

    pub fn encode<T: CursorKey>(&self, item: &T) -> String {
        self.encode_cursor(&item.cursor())
    }

    pub fn encode_cursor(&self, cursor: &Cursor) -> String {
        let wire = WireCursor { v: CURSOR_VERSION, ts: cursor.timestamp, id: cursor.id.clone() };
        // Serializing a struct of a u8, a timestamp and a string cannot fail.
        let payload = serde_json::to_vec(&wire).unwrap_or_default();
        let tag = self.sign(&payload);
        format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), URL_SAFE_NO_PAD.encode(tag))
    }

    pub fn decode(&self, raw: &str) -> Result<Cursor, CursorError> {
        let (payload_part, tag_part) =
            raw.trim().split_once('.').ok_or(CursorError::MissingSignature)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_part).map_err(|_| CursorError::Encoding)?;
        let tag = URL_SAFE_NO_PAD.decode(tag_part).map_err(|_| CursorError::Encoding)?;

        let mut mac = self.mac().ok_or(CursorError::Signature)?;
        mac.update(&payload);
        mac.verify_slice(&tag).map_err(|_| CursorError::Signature)?;

        let wire: WireCursor =
            serde_json::from_slice(&payload).map_err(|_| CursorError::Payload)?;
        if wire.v != CURSOR_VERSION {
            return Err(CursorError::Version(wire.v));
        }
        Ok(Cursor { timestamp: wire.ts, id: wire.id })
    }

    /// Decodes a caller cursor, treating any failure as "no cursor".
    pub fn decode_lenient(&self, raw: Option<&str>) -> Option<Cursor> {
        let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
        match self.decode(raw) {
            Ok(cursor) => Some(cursor),
            Err(error) => {
                debug!(
                    event_name = "pagination.cursor.ignored",
                    error = %error,
                    "ignoring undecodable cursor; listing from the start"
                );
                None
            }
        }
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        match self.mac() {
            Some(mut mac) => {
                mac.update(payload);
                mac.finalize().into_bytes().to_vec()
            }
            None => Vec::new(),
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.signing_key).ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self { default_limit: 20, max_limit: 100 }
    }
}

impl PageLimits {
    pub fn resolve(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_limit).clamp(1, self.max_limit.max(1))
    }
}

/// A decoded page request handed to repositories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    pub after: Option<Cursor>,
    pub limit: u32,
}

impl PageQuery {
    pub fn first(limit: u32) -> Self {
        Self { after: None, limit }
    }

    /// Rows to fetch: one more than the page size to detect `has_more`.
    pub fn fetch_size(&self) -> u32 {
        self.limit.saturating_add(1)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T: CursorKey> Page<T> {
    /// Builds a page from `limit + 1` fetched rows.
    pub fn from_overfetch(mut rows: Vec<T>, limit: u32, codec: &CursorCodec) -> Self {
        let limit = limit as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more { rows.last().map(|last| codec.encode(last)) } else { None };
        Self { items: rows, next_cursor }
    }
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), next_cursor: self.next_cursor }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Cursor, CursorCodec, CursorError, CursorKey, Page, PageLimits};

    #[derive(Clone, Debug, PartialEq)]
    struct Row {
        id: String,
        created_at: chrono::DateTime<Utc>,
    }

    impl CursorKey for Row {
        fn cursor_timestamp(&self) -> chrono::DateTime<Utc> {
            self.created_at
        }

        fn cursor_id(&self) -> &str {
            &self.id
        }
    }

    fn codec() -> CursorCodec {
        CursorCodec::new("test-cursor-secret")
    }

    #[test]
    fn decode_returns_the_encoded_sort_key() {
        let row = Row {
            id: "R-7".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).single().expect("ts"),
        };
        let codec = codec();
        let decoded = codec.decode(&codec.encode(&row)).expect("decode");

        assert_eq!(decoded, Cursor::new(row.created_at, "R-7"));
    }

    #[test]
    fn tampered_or_foreign_cursors_are_rejected() {
        let codec = codec();
        let token = codec.encode_cursor(&Cursor::new(Utc::now(), "R-1"));

        let other = CursorCodec::new("another-secret");
        assert_eq!(other.decode(&token), Err(CursorError::Signature));
        assert_eq!(codec.decode("not-a-cursor"), Err(CursorError::MissingSignature));
        assert_eq!(codec.decode("%%%.%%%"), Err(CursorError::Encoding));
        assert_eq!(codec.decode_lenient(Some("garbage.token")), None);
        assert_eq!(codec.decode_lenient(Some("   ")), None);
    }

    #[test]
    fn precedes_breaks_timestamp_ties_by_id() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("ts");
        let cursor = Cursor::new(ts, "B");

        assert!(cursor.precedes(ts - Duration::seconds(1), "Z"));
        assert!(cursor.precedes(ts, "A"));
        assert!(!cursor.precedes(ts, "B"));
        assert!(!cursor.precedes(ts, "C"));
        assert!(!cursor.precedes(ts + Duration::seconds(1), "A"));
    }

    #[test]
    fn overfetch_sets_next_cursor_only_when_more_rows_exist() {
        let codec = codec();
        let ts = Utc::now();
        let rows: Vec<Row> =
            (0..3).map(|i| Row { id: format!("R-{i}"), created_at: ts }).collect();

        let page = Page::from_overfetch(rows.clone(), 2, &codec);
        assert_eq!(page.items.len(), 2);
        let next = page.next_cursor.expect("has more");
        assert_eq!(codec.decode(&next).expect("decode").id, "R-1");

        let last_page = Page::from_overfetch(rows, 3, &codec);
        assert_eq!(last_page.items.len(), 3);
        assert_eq!(last_page.next_cursor, None);
    }

    #[test]
    fn limits_are_clamped() {
        let limits = PageLimits { default_limit: 20, max_limit: 50 };
        assert_eq!(limits.resolve(None), 20);
        assert_eq!(limits.resolve(Some(0)), 1);
        assert_eq!(limits.resolve(Some(500)), 50);
    }
}
