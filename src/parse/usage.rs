//! The `ご利用…：value` lines of an ANA Pay notification body.

use crate::domain::PaymentRecord;
use crate::parse::{ParseError, parse_amount, parse_usage_date};

/// Every usage line starts with this marker.
pub const USAGE_PREFIX: &str = "ご利用";
/// Full-width colon between key and value.
pub const SEPARATOR: char = '：';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageField {
    DateOfUse,
    Amount,
    Store,
}

const USAGE_KEYS: [(&str, UsageField); 3] = [
    ("ご利用日時", UsageField::DateOfUse),
    ("ご利用金額", UsageField::Amount),
    ("ご利用店舗", UsageField::Store),
];

impl UsageField {
    pub fn from_key(key: &str) -> Option<Self> {
        USAGE_KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, field)| *field)
    }

    /// Store `value` in the matching field of `record`, replacing any earlier
    /// value. On error the record is left untouched.
    pub fn apply(self, value: &str, record: &mut PaymentRecord) -> Result<(), ParseError> {
        match self {
            UsageField::DateOfUse => record.date_of_use = Some(parse_usage_date(value)?),
            UsageField::Amount => record.amount = Some(parse_amount(value)?),
            UsageField::Store => record.store = Some(value.trim().to_string()),
        }
        Ok(())
    }
}

/// Split a usage line into key and value.
///
/// Returns `None` for lines without the usage marker or without a separator.
/// Text after a second separator is dropped.
pub fn split_usage_line(line: &str) -> Option<(&str, &str)> {
    if !line.starts_with(USAGE_PREFIX) {
        return None;
    }
    let mut pieces = line.split(SEPARATOR);
    let key = pieces.next()?;
    let value = pieces.next()?;
    Some((key, value))
}
