pub mod usage;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use log::{debug, warn};

use crate::domain::{PaymentRecord, RawMessage};
use usage::{UsageField, split_usage_line};

/// Timezone annotation ANA appends to its `Date` headers.
const JST_SUFFIX: &str = " +0900 (JST)";
const JST_OFFSET_SECS: i32 = 9 * 3600;

const HEADER_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S", "%d %b %Y %H:%M:%S"];

const USAGE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M",
];

const USAGE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognised {field} date {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("unrecognised amount {value:?}")]
    InvalidAmount { value: String },
}

/// Extract a payment record from a notification.
///
/// Never fails: fields that cannot be read are logged and left unset.
pub fn parse_message(msg: &RawMessage) -> PaymentRecord {
    let mut record = PaymentRecord::default();

    if let Some(value) = msg.header("Date") {
        match parse_email_date(value) {
            Ok(date) => record.email_date = Some(date),
            Err(e) => warn!("message {}: {e}", msg.id),
        }
    }

    let Some(body) = msg.plain_text() else {
        debug!("message {}: no text/plain body", msg.id);
        return record;
    };

    let text = String::from_utf8_lossy(body);
    apply_body(&msg.id, &text, &mut record);
    record
}

/// Read every usage line of `text` into `record`; later lines overwrite
/// earlier ones.
pub fn apply_body(id: &str, text: &str, record: &mut PaymentRecord) {
    for line in text.lines() {
        let Some((key, value)) = split_usage_line(line) else {
            continue;
        };
        let Some(field) = UsageField::from_key(key) else {
            continue;
        };
        if let Err(e) = field.apply(value, record) {
            warn!("message {id}: {e}");
        }
    }
}

/// Parse a `Date` header into JST wall-clock time.
pub fn parse_email_date(value: &str) -> Result<NaiveDateTime, ParseError> {
    let stripped = value.replace(JST_SUFFIX, "");
    let stripped = stripped.trim();

    for fmt in HEADER_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stripped, fmt) {
            return Ok(dt);
        }
    }

    // Headers from other relays carry a different offset; normalize to JST.
    if let (Ok(dt), Some(jst)) = (
        DateTime::parse_from_rfc2822(value.trim()),
        FixedOffset::east_opt(JST_OFFSET_SECS),
    ) {
        return Ok(dt.with_timezone(&jst).naive_local());
    }

    Err(ParseError::InvalidDate {
        field: "email",
        value: value.to_string(),
    })
}

pub fn parse_usage_date(value: &str) -> Result<NaiveDateTime, ParseError> {
    let value = value.trim();

    for fmt in USAGE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(dt);
        }
    }
    for fmt in USAGE_DATE_FORMATS {
        if let Some(dt) = NaiveDate::parse_from_str(value, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(dt);
        }
    }

    Err(ParseError::InvalidDate {
        field: "usage",
        value: value.to_string(),
    })
}

/// `"12,345円"` -> `12345`.
///
/// The whole value must be an integer once separators and `円` are removed;
/// trailing text such as `（税込）` is rejected rather than truncated.
pub fn parse_amount(value: &str) -> Result<i64, ParseError> {
    let digits = value.replace(',', "").replace('円', "");
    digits
        .trim()
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidAmount {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Header, MessageBody, MessagePart};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn message(date: Option<&str>, body: MessageBody) -> RawMessage {
        RawMessage {
            id: "m1".into(),
            headers: date
                .map(|d| {
                    vec![Header {
                        name: "Date".into(),
                        value: d.into(),
                    }]
                })
                .unwrap_or_default(),
            body,
        }
    }

    fn plain(body: &str) -> MessageBody {
        MessageBody::Single(Some(body.as_bytes().to_vec()))
    }

    #[test]
    fn full_notification() {
        let body = "ANA Pay をご利用いただきありがとうございます。\n\
                    ご利用日時：2023-12-01 10:14:59\n\
                    ご利用金額：12,345円\n\
                    ご利用店舗：  Some Store  \n";
        let msg = message(Some("Fri, 01 Dec 2023 10:15:30 +0900 (JST)"), plain(body));

        let record = parse_message(&msg);

        assert_eq!(record.email_date, Some(at(2023, 12, 1, 10, 15, 30)));
        assert_eq!(record.date_of_use, Some(at(2023, 12, 1, 10, 14, 59)));
        assert_eq!(record.amount, Some(12345));
        assert_eq!(record.store.as_deref(), Some("Some Store"));
    }

    #[test]
    fn crlf_bodies_parse_the_same() {
        let msg = message(None, plain("ご利用金額：800円\r\nご利用店舗：Cafe\r\n"));
        let record = parse_message(&msg);
        assert_eq!(record.amount, Some(800));
        assert_eq!(record.store.as_deref(), Some("Cafe"));
    }

    #[test]
    fn last_occurrence_wins() {
        let body = "ご利用金額：100円\nご利用店舗：First\nご利用金額：2,000円\nご利用店舗：Second\n";
        let record = parse_message(&message(None, plain(body)));
        assert_eq!(record.amount, Some(2000));
        assert_eq!(record.store.as_deref(), Some("Second"));
    }

    #[test]
    fn unparseable_header_date_leaves_email_date_unset() {
        let msg = message(Some("sometime last week"), plain("ご利用金額：500円\n"));
        let record = parse_message(&msg);
        assert_eq!(record.email_date, None);
        assert_eq!(record.amount, Some(500));
    }

    #[test]
    fn bad_usage_date_does_not_stop_later_lines() {
        let body = "ご利用日時：不明\nご利用金額：1,000円\nご利用店舗：Shop\n";
        let record = parse_message(&message(None, plain(body)));
        assert_eq!(record.date_of_use, None);
        assert_eq!(record.amount, Some(1000));
        assert_eq!(record.store.as_deref(), Some("Shop"));
    }

    #[test]
    fn html_only_message_keeps_header_fields() {
        let body = MessageBody::Parts(vec![MessagePart {
            mime_type: "text/html".into(),
            data: Some("ご利用金額：1円".as_bytes().to_vec()),
        }]);
        let record = parse_message(&message(Some("Fri, 01 Dec 2023 10:15:30 +0900 (JST)"), body));
        assert!(record.email_date.is_some());
        assert_eq!(record.amount, None);
    }

    #[test]
    fn empty_message_yields_empty_record() {
        let record = parse_message(&message(None, MessageBody::Single(None)));
        assert!(record.is_empty());
    }

    #[test]
    fn unknown_keys_and_plain_lines_are_ignored() {
        let body = "ご利用可能残高：9,999円\n金額：1円\nご利用金額：42円\n";
        let record = parse_message(&message(None, plain(body)));
        assert_eq!(record.amount, Some(42));
    }

    #[test]
    fn email_date_with_other_offset_is_converted_to_jst() {
        let dt = parse_email_date("Fri, 1 Dec 2023 01:15:30 +0000").unwrap();
        assert_eq!(dt, at(2023, 12, 1, 10, 15, 30));
    }

    #[test]
    fn usage_date_variants() {
        assert_eq!(
            parse_usage_date("2023/12/01 09:05:00\n").unwrap(),
            at(2023, 12, 1, 9, 5, 0)
        );
        assert_eq!(
            parse_usage_date("2023年12月1日 09:05").unwrap(),
            at(2023, 12, 1, 9, 5, 0)
        );
        assert_eq!(
            parse_usage_date("2023-12-01").unwrap(),
            at(2023, 12, 1, 0, 0, 0)
        );
        assert!(parse_usage_date("昨日").is_err());
    }

    #[test]
    fn amount_strips_separators_and_suffix() {
        assert_eq!(parse_amount("12,345円"), Ok(12345));
        assert_eq!(parse_amount(" 1,000,000 円 "), Ok(1_000_000));
        assert!(parse_amount("円").is_err());
        assert_eq!(
            parse_amount("1,000円（税込）"),
            Err(ParseError::InvalidAmount {
                value: "1,000円（税込）".into()
            })
        );
    }
}
