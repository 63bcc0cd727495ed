pub mod client;

use log::info;
use std::rc::Rc;
use std::time::Duration;

use crate::domain::PaymentRecord;
use crate::error::{ServiceError, ServiceResult};
use crate::retry::{RetryPolicy, Sleeper};

pub use client::GoogleWorksheet;

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Number(i64),
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Columns 1-4 of a record's row; `None` leaves that cell untouched.
pub fn row_cells(record: &PaymentRecord) -> [Option<CellValue>; 4] {
    [
        record
            .email_date
            .map(|d| CellValue::Text(d.format(TIMESTAMP_FORMAT).to_string())),
        record
            .date_of_use
            .map(|d| CellValue::Text(d.format(TIMESTAMP_FORMAT).to_string())),
        record.amount.map(CellValue::Number),
        record.store.clone().map(CellValue::Text),
    ]
}

/// A worksheet with buffered writes. Rows and columns are 1-based.
pub trait Worksheet {
    /// Rows currently holding data, as seen by the service.
    fn num_rows(&mut self) -> ServiceResult<usize>;
    /// Buffer a cell write; nothing is sent until `save`.
    fn set(&mut self, row: usize, col: usize, value: CellValue);
    /// Send buffered writes. The buffer is emptied whether or not this succeeds.
    fn save(&mut self) -> ServiceResult<()>;
}

/// Where parsed records end up.
pub trait RecordSink {
    fn append(&mut self, record: &PaymentRecord) -> ServiceResult<()>;
}

/// Retries forever on rate limits, with a fixed 60s pause.
pub fn rate_limit_policy() -> RetryPolicy<ServiceError> {
    RetryPolicy::unbounded("sheet rate limit", RATE_LIMIT_DELAY, ServiceError::is_rate_limited)
}

/// Appends each record as a new row below the last one in use.
pub struct SpreadsheetSink<W: Worksheet> {
    worksheet: W,
    rate_limit: RetryPolicy<ServiceError>,
    sleeper: Rc<dyn Sleeper>,
}

impl<W: Worksheet> SpreadsheetSink<W> {
    pub fn new(worksheet: W, sleeper: Rc<dyn Sleeper>) -> Self {
        Self {
            worksheet,
            rate_limit: rate_limit_policy(),
            sleeper,
        }
    }

    pub fn worksheet(&self) -> &W {
        &self.worksheet
    }

    pub fn into_worksheet(self) -> W {
        self.worksheet
    }
}

fn write_row<W: Worksheet>(worksheet: &mut W, cells: &[Option<CellValue>]) -> ServiceResult<usize> {
    let row = worksheet.num_rows()? + 1;
    for (col, cell) in cells.iter().enumerate() {
        if let Some(value) = cell {
            worksheet.set(row, col + 1, value.clone());
        }
    }
    worksheet.save()?;
    Ok(row)
}

impl<W: Worksheet> RecordSink for SpreadsheetSink<W> {
    fn append(&mut self, record: &PaymentRecord) -> ServiceResult<()> {
        let cells = row_cells(record);
        let Self {
            worksheet,
            rate_limit,
            sleeper,
        } = self;
        // Every attempt re-reads the row count and rewrites the whole row.
        let row = rate_limit.run(sleeper.as_ref(), || write_row(&mut *worksheet, &cells))?;
        info!("wrote row {row}");
        Ok(())
    }
}

/// Prints rows as tab-separated lines instead of writing them.
pub struct PrintSink;

impl RecordSink for PrintSink {
    fn append(&mut self, record: &PaymentRecord) -> ServiceResult<()> {
        let line = row_cells(record)
            .iter()
            .map(|c| c.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\t");
        println!("{line}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Duration>>);

    impl Sleeper for Recorder {
        fn sleep(&self, delay: Duration) {
            self.0.borrow_mut().push(delay);
        }
    }

    /// In-memory sheet; `save_results` scripts the outcome of each save.
    #[derive(Default)]
    struct MemorySheet {
        rows: usize,
        pending: Vec<(usize, usize, CellValue)>,
        saved: Vec<(usize, usize, CellValue)>,
        save_results: VecDeque<ServiceResult<()>>,
        saves: usize,
    }

    impl Worksheet for MemorySheet {
        fn num_rows(&mut self) -> ServiceResult<usize> {
            Ok(self.rows)
        }

        fn set(&mut self, row: usize, col: usize, value: CellValue) {
            self.pending.push((row, col, value));
        }

        fn save(&mut self) -> ServiceResult<()> {
            self.saves += 1;
            let pending = std::mem::take(&mut self.pending);
            self.save_results.pop_front().unwrap_or(Ok(()))?;
            self.rows = self.rows.max(pending.iter().map(|c| c.0).max().unwrap_or(0));
            self.saved.extend(pending);
            Ok(())
        }
    }

    fn limited() -> ServiceError {
        ServiceError::RateLimited {
            service: "sheets",
            message: "quota".into(),
        }
    }

    fn full_record() -> PaymentRecord {
        let at = |h| {
            NaiveDate::from_ymd_opt(2023, 12, 1)
                .unwrap()
                .and_hms_opt(h, 5, 9)
                .unwrap()
        };
        PaymentRecord {
            email_date: Some(at(10)),
            date_of_use: Some(at(9)),
            amount: Some(12345),
            store: Some("Some Store".into()),
        }
    }

    #[test]
    fn cells_are_formatted() {
        assert_eq!(
            row_cells(&full_record()),
            [
                Some(CellValue::Text("2023/12/01 10:05:09".into())),
                Some(CellValue::Text("2023/12/01 09:05:09".into())),
                Some(CellValue::Number(12345)),
                Some(CellValue::Text("Some Store".into())),
            ]
        );
    }

    #[test]
    fn append_goes_below_existing_rows() {
        let sheet = MemorySheet {
            rows: 7,
            ..MemorySheet::default()
        };
        let mut sink = SpreadsheetSink::new(sheet, Rc::new(Recorder::default()));

        sink.append(&full_record()).unwrap();

        let saved = &sink.worksheet().saved;
        assert_eq!(saved.len(), 4);
        assert!(saved.iter().all(|(row, _, _)| *row == 8));
        assert_eq!(saved[2], (8, 3, CellValue::Number(12345)));
    }

    #[test]
    fn unset_fields_leave_columns_untouched() {
        let record = PaymentRecord {
            amount: Some(500),
            ..PaymentRecord::default()
        };
        let mut sink = SpreadsheetSink::new(MemorySheet::default(), Rc::new(Recorder::default()));

        sink.append(&record).unwrap();

        assert_eq!(sink.worksheet().saved, vec![(1, 3, CellValue::Number(500))]);
    }

    #[test]
    fn empty_record_still_saves() {
        let mut sink = SpreadsheetSink::new(MemorySheet::default(), Rc::new(Recorder::default()));
        sink.append(&PaymentRecord::default()).unwrap();
        assert_eq!(sink.worksheet().saves, 1);
        assert!(sink.worksheet().saved.is_empty());
    }

    #[test]
    fn rate_limit_twice_then_success_writes_once() {
        let sheet = MemorySheet {
            save_results: VecDeque::from(vec![Err(limited()), Err(limited()), Ok(())]),
            ..MemorySheet::default()
        };
        let sleeper = Rc::new(Recorder::default());
        let mut sink = SpreadsheetSink::new(sheet, sleeper.clone());

        sink.append(&full_record()).unwrap();

        assert_eq!(sink.worksheet().saves, 3);
        assert_eq!(sink.worksheet().saved.len(), 4);
        assert_eq!(*sleeper.0.borrow(), vec![RATE_LIMIT_DELAY; 2]);
    }

    #[test]
    fn other_errors_are_returned_immediately() {
        let sheet = MemorySheet {
            save_results: VecDeque::from(vec![Err(ServiceError::Server {
                service: "sheets",
                status: 500,
                message: "oops".into(),
            })]),
            ..MemorySheet::default()
        };
        let sleeper = Rc::new(Recorder::default());
        let mut sink = SpreadsheetSink::new(sheet, sleeper.clone());

        let err = sink.append(&full_record()).unwrap_err();

        assert!(matches!(err, ServiceError::Server { status: 500, .. }));
        assert!(sleeper.0.borrow().is_empty());
        assert!(sink.worksheet().saved.is_empty());
    }
}
