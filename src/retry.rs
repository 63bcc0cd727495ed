use std::fmt::Display;
use std::thread;
use std::time::Duration;

use log::warn;

/// Blocking delay between attempts.
pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// Retry `operation` while `retry_on` classifies the error as retryable,
/// waiting a fixed `delay` in between.
pub struct RetryPolicy<E> {
    pub name: &'static str,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub delay: Duration,
    pub retry_on: fn(&E) -> bool,
}

impl<E: Display> RetryPolicy<E> {
    pub fn unbounded(name: &'static str, delay: Duration, retry_on: fn(&E) -> bool) -> Self {
        Self {
            name,
            max_attempts: None,
            delay,
            retry_on,
        }
    }

    pub fn bounded(
        name: &'static str,
        max_attempts: u32,
        delay: Duration,
        retry_on: fn(&E) -> bool,
    ) -> Self {
        Self {
            name,
            max_attempts: Some(max_attempts.max(1)),
            delay,
            retry_on,
        }
    }

    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match operation() {
                Ok(v) => return Ok(v),
                Err(e) if (self.retry_on)(&e) && self.attempts_left(attempt) => {
                    warn!(
                        "{}: attempt {} failed ({e}); retrying in {}s",
                        self.name,
                        attempt,
                        self.delay.as_secs_f32()
                    );
                    sleeper.sleep(self.delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn attempts_left(&self, made: u32) -> bool {
        self.max_attempts.is_none_or(|max| made < max)
    }
}
