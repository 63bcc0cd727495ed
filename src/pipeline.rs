use anyhow::{Context, Result};
use log::{info, warn};
use std::rc::Rc;
use std::time::Duration;

use crate::domain::{PaymentRecord, Query};
use crate::error::{ServiceError, ServiceResult};
use crate::mail::{MailService, MessageSource};
use crate::parse::parse_message;
use crate::retry::{RetryPolicy, Sleeper};
use crate::sheets::RecordSink;

pub const WRITE_ATTEMPTS: u32 = 3;
pub const WRITE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Pause after every successful write to stay under the sheet's quota.
pub const PACING_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: usize,
    pub messages: usize,
    /// Records with at least one field, each written as a row.
    pub written: usize,
    /// Records with every field unset. They still go through the sink, but a
    /// worksheet receives no cells for them.
    pub empty: usize,
}

/// Up to three attempts on server or client errors.
pub fn write_policy() -> RetryPolicy<ServiceError> {
    RetryPolicy::bounded(
        "row write",
        WRITE_ATTEMPTS,
        WRITE_RETRY_DELAY,
        ServiceError::is_transient,
    )
}

/// Search -> fetch -> parse -> append, one message at a time.
pub struct Pipeline<'a, M: MailService + ?Sized, S: RecordSink> {
    mail: &'a M,
    sink: S,
    sleeper: Rc<dyn Sleeper>,
    write_retry: RetryPolicy<ServiceError>,
}

impl<'a, M: MailService + ?Sized, S: RecordSink> Pipeline<'a, M, S> {
    pub fn new(mail: &'a M, sink: S, sleeper: Rc<dyn Sleeper>) -> Self {
        Self {
            mail,
            sink,
            sleeper,
            write_retry: write_policy(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process every message the query matches. A fetch error, or a write
    /// that still fails after its retries, ends the run.
    pub fn run(&mut self, query: &Query) -> Result<RunSummary> {
        info!("searching mail: {}", query.to_search_string());
        let source = MessageSource::new(self.mail);
        let mut messages = source.search(query);
        let mut summary = RunSummary::default();

        for msg in messages.by_ref() {
            let msg = msg.context("failed to fetch notification")?;
            summary.messages += 1;

            let record = parse_message(&msg);
            if record.is_empty() {
                warn!("message {}: nothing could be read; appending an empty row", msg.id);
                summary.empty += 1;
            } else {
                info!("message {}: parsed {:?}", msg.id, record);
            }

            self.write(&record)
                .with_context(|| format!("failed to write record for message {}", msg.id))?;
            if !record.is_empty() {
                summary.written += 1;
            }
        }

        summary.pages = messages.pages_listed();
        info!(
            "run finished: {} pages, {} messages, {} rows written ({} empty)",
            summary.pages, summary.messages, summary.written, summary.empty
        );
        Ok(summary)
    }

    fn write(&mut self, record: &PaymentRecord) -> ServiceResult<()> {
        let Self {
            sink,
            sleeper,
            write_retry,
            ..
        } = self;
        write_retry.run(sleeper.as_ref(), || {
            sink.append(record)?;
            sleeper.sleep(PACING_DELAY);
            Ok(())
        })
    }
}
