use chrono::NaiveDateTime;

/// One ANA Pay usage notification, as far as it could be read.
///
/// Every field is optional on its own: a field that failed to parse, or whose
/// line was missing from the body, stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentRecord {
    /// When the notification was sent (`Date` header, JST wall clock).
    pub email_date: Option<NaiveDateTime>,
    /// When the purchase happened (`ご利用日時` line).
    pub date_of_use: Option<NaiveDateTime>,
    /// Whole yen (`ご利用金額` line).
    pub amount: Option<i64>,
    /// Merchant name (`ご利用店舗` line).
    pub store: Option<String>,
}

impl PaymentRecord {
    pub fn is_empty(&self) -> bool {
        self.email_date.is_none()
            && self.date_of_use.is_none()
            && self.amount.is_none()
            && self.store.is_none()
    }
}
