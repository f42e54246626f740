use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Opaque position in an event log.
///
/// Application code only compares cursors for equality. Ordering is the
/// log store's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(CompactString);

impl Cursor {
    pub fn new(value: impl Into<CompactString>) -> Self {
        Self(value.into())
    }

    /// Position before the first record of any topic.
    pub fn start() -> Self {
        Self(CompactString::const_new("0-0"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_start(&self) -> bool {
        matches!(StreamId::parse(self), Some(id) if id == StreamId::ZERO)
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Internal ordered form of a cursor: `<unix-millis>-<sequence>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    /// Accepts `ms-seq` as well as a bare `ms` (sequence 0).
    pub fn parse(cursor: &Cursor) -> Option<Self> {
        let raw = cursor.as_str();
        let (ms, seq) = match raw.split_once('-') {
            Some((ms, seq)) => (ms.parse().ok()?, seq.parse().ok()?),
            None => (raw.parse().ok()?, 0),
        };
        Some(Self { ms, seq })
    }

    /// The id following `self` at wall-clock time `now_ms`.
    ///
    /// Strictly greater than `self` even if the clock went backwards.
    pub fn successor(self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self { ms: now_ms, seq: 0 }
        } else {
            Self {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }

    pub fn to_cursor(self) -> Cursor {
        Cursor(compact_str::format_compact!("{}-{}", self.ms, self.seq))
    }
}

pub(crate) fn now_millis() -> u64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            StreamId::parse(&Cursor::new("1700000000000-3")),
            Some(StreamId { ms: 1_700_000_000_000, seq: 3 })
        );
        assert_eq!(StreamId::parse(&Cursor::new("0")), Some(StreamId::ZERO));
        assert_eq!(StreamId::parse(&Cursor::new("$")), None);
        assert_eq!(StreamId::parse(&Cursor::new("12-x")), None);
        assert!(Cursor::start().is_start());
    }

    #[test]
    fn test_successor_is_strictly_increasing() {
        let id = StreamId { ms: 100, seq: 4 };
        assert_eq!(id.successor(200), StreamId { ms: 200, seq: 0 });
        assert_eq!(id.successor(100), StreamId { ms: 100, seq: 5 });
        // Clock went backwards.
        assert_eq!(id.successor(50), StreamId { ms: 100, seq: 5 });
    }

    #[test]
    fn test_cursor_text_round_trip() {
        let id = StreamId { ms: 42, seq: 7 };
        assert_eq!(id.to_cursor().as_str(), "42-7");
        assert_eq!(StreamId::parse(&id.to_cursor()), Some(id));
    }
}
