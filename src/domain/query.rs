use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SENDER: &str = "payinfo@121.ana.co.jp";
pub const DEFAULT_SUBJECT: &str = "ご利用のお知らせ";

/// Which notifications a run looks at. Both dates are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub sender: String,
    pub subject: String,
    pub after: NaiveDate,
    pub before: NaiveDate,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            sender: DEFAULT_SENDER.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            after: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            before: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
        }
    }
}

impl Query {
    /// Gmail search syntax for this query.
    ///
    /// Gmail's `before:` excludes the given day, so the day after the last
    /// inclusive date is sent instead.
    pub fn to_search_string(&self) -> String {
        let end = self
            .before
            .checked_add_days(Days::new(1))
            .unwrap_or(self.before);
        format!(
            "from:{} subject:{} after:{} before:{}",
            self.sender,
            self.subject,
            self.after.format("%Y/%-m/%-d"),
            end.format("%Y/%-m/%-d"),
        )
    }
}
