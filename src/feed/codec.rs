//! Field codecs for the feed document.
//!
//! Dates use the RFC-1123 layout with a numeric zone
//! (`Mon, 02 Jan 2006 15:04:05 -0700`) and keep one-second resolution.
//! URLs are written in their canonical serialized form; decoding rejects
//! anything the URL parser does not accept instead of truncating it.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;
use url::Url;

/// Timestamp type used for every date field in the model.
pub type FeedDate = DateTime<FixedOffset>;

/// RFC-1123 with numeric zone, as a chrono format string.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Errors raised when decoding a field from its wire form.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to parse {value:?} as RFC1123Z date: {source}")]
    Date {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Failed to parse {value:?} as url: {source}")]
    Url {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

pub fn encode_date(date: &FeedDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a date written by [`encode_date`].
pub fn decode_date(value: &str) -> Result<FeedDate, CodecError> {
    DateTime::parse_from_str(value.trim(), DATE_FORMAT).map_err(|source| CodecError::Date {
        value: value.to_owned(),
        source,
    })
}

pub fn encode_url(url: &Url) -> String {
    url.as_str().to_owned()
}

/// Parses an absolute URL, reporting malformed input as an error.
pub fn decode_url(value: &str) -> Result<Url, CodecError> {
    Url::parse(value.trim()).map_err(|source| CodecError::Url {
        value: value.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;

    #[test]
    fn test_encode_date_layout() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let date = ist.with_ymd_and_hms(2020, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(encode_date(&date), "Sun, 05 Jan 2020 00:00:00 +0530");
    }

    #[test]
    fn test_decode_date_keeps_offset() {
        let date = decode_date("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(date.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(date.timestamp(), 1136239445);
    }

    #[test]
    fn test_decode_date_rejects_other_layouts() {
        assert!(decode_date("2020-01-05T00:00:00Z").is_err());
        assert!(decode_date("January 5, 2020").is_err());
        assert!(decode_date("").is_err());
    }

    #[test]
    fn test_decode_url_rejects_malformed() {
        for bad in ["", "not a url", "://missing-scheme", "http://", "http://exa mple.com/"] {
            let result = decode_url(bad);
            assert!(
                matches!(result, Err(CodecError::Url { .. })),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_url_canonical_form() {
        let url = decode_url("HTTPS://Example.COM/a/../b?x=1").unwrap();
        assert_eq!(encode_url(&url), "https://example.com/b?x=1");
    }

    proptest! {
        #[test]
        fn prop_date_round_trip_truncates_to_seconds(
            secs in 0i64..4_102_444_800,
            nanos in 0u32..1_000_000_000,
            offset_minutes in -720i32..=840,
        ) {
            let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap();
            let date = offset.timestamp_opt(secs, nanos).unwrap();

            let decoded = decode_date(&encode_date(&date)).unwrap();

            prop_assert_eq!(decoded, date.with_nanosecond(0).unwrap());
            prop_assert_eq!(decoded.offset(), date.offset());
        }

        #[test]
        fn prop_url_round_trip_preserves_canonical_form(
            host in "[a-z]{1,12}\\.(com|org|in)",
            segments in proptest::collection::vec("[a-zA-Z0-9_-]{0,8}", 0..4),
            query in proptest::option::of("[a-z]{1,5}=[a-z0-9]{0,5}"),
        ) {
            let mut raw = format!("https://{host}/{}", segments.join("/"));
            if let Some(q) = query {
                raw.push('?');
                raw.push_str(&q);
            }
            let original = Url::parse(&raw).unwrap();

            let decoded = decode_url(&encode_url(&original)).unwrap();

            prop_assert_eq!(decoded.as_str(), original.as_str());
        }
    }
}
