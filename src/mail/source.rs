use log::{debug, info};
use std::collections::VecDeque;
use std::mem;

use crate::domain::{Query, RawMessage};
use crate::error::{ServiceError, ServiceResult};
use crate::mail::MailService;

/// Lazily walks every message matching a query, page by page.
pub struct MessageSource<'a, S: MailService + ?Sized> {
    service: &'a S,
}

impl<'a, S: MailService + ?Sized> MessageSource<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    pub fn search(&self, query: &Query) -> Messages<'a, S> {
        Messages {
            service: self.service,
            query: query.to_search_string(),
            pending: VecDeque::new(),
            listing: Listing::Start,
            pages: 0,
        }
    }
}

enum Listing {
    Start,
    More(String),
    Done,
}

/// Iterator over fetched messages. Yields the first service error it hits
/// and then ends.
pub struct Messages<'a, S: MailService + ?Sized> {
    service: &'a S,
    query: String,
    pending: VecDeque<String>,
    listing: Listing,
    pages: usize,
}

impl<S: MailService + ?Sized> Messages<'_, S> {
    pub fn pages_listed(&self) -> usize {
        self.pages
    }

    fn fail<T>(&mut self, e: ServiceError) -> Option<ServiceResult<T>> {
        self.pending.clear();
        self.listing = Listing::Done;
        Some(Err(e))
    }
}

impl<S: MailService + ?Sized> Iterator for Messages<'_, S> {
    type Item = ServiceResult<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.pending.pop_front() {
                debug!("fetching message {id}");
                return match self.service.get_message(&id) {
                    Ok(msg) => Some(Ok(msg)),
                    Err(e) => self.fail(e),
                };
            }

            let token = match mem::replace(&mut self.listing, Listing::Done) {
                Listing::Done => return None,
                Listing::Start => None,
                Listing::More(token) => Some(token),
            };

            let page = match self.service.list_messages(&self.query, token.as_deref()) {
                Ok(page) => page,
                Err(e) => return self.fail(e),
            };
            self.pages += 1;
            info!(
                "listed page {} ({} messages, more: {})",
                self.pages,
                page.ids.len(),
                page.next_page_token.is_some()
            );

            self.pending.extend(page.ids);
            if let Some(next) = page.next_page_token {
                self.listing = Listing::More(next);
            }
        }
    }
}
