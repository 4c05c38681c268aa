//! Templated answer composition behind a rate limiter and a response cache.
//!
//! A cache hit is returned before validation and before the rate limiter is
//! consulted, so repeating an identical `(prompt, context)` pair never spends
//! request budget. Only successful compositions are cached.

use crate::cache::BoundedCache;
use crate::clock::{Clock, SystemClock};
use crate::error::ComposeError;
use crate::models::ComposedResponse;
use crate::rate_limit::RateLimiter;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_RATE_LIMIT: u32 = 10;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_RESPONSE_CACHE_CAPACITY: usize = 50;

type ResponseKey = (String, Vec<String>);

#[derive(Debug)]
pub struct ResponseComposer {
    limiter: RateLimiter,
    cache: BoundedCache<ResponseKey, ComposedResponse>,
}

impl Default for ResponseComposer {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT)
    }
}

impl ResponseComposer {
    pub fn new(rate_limit: u32) -> Self {
        Self::with_clock(
            rate_limit,
            DEFAULT_RATE_WINDOW,
            DEFAULT_RESPONSE_CACHE_CAPACITY,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        rate_limit: u32,
        window: Duration,
        cache_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(rate_limit, window, clock),
            cache: BoundedCache::new(cache_capacity),
        }
    }

    pub fn request_count(&self) -> u32 {
        self.limiter.request_count()
    }

    pub fn rate_limit(&self) -> u32 {
        self.limiter.limit()
    }

    pub fn compose(&self, prompt: &str, context: &[String]) -> Result<ComposedResponse, ComposeError> {
        let key = (prompt.to_string(), context.to_vec());
        if let Some(cached) = self.cache.get(&key) {
            debug!("response cache hit");
            return Ok(cached);
        }

        if prompt.trim().is_empty() {
            warn!("received an empty prompt");
            return Err(ComposeError::EmptyPrompt);
        }
        if context.is_empty() {
            warn!(prompt, "no context found for prompt");
            return Err(ComposeError::EmptyContext);
        }

        if let Err(error) = self.limiter.try_acquire() {
            warn!(%error, "rate limit exceeded");
            return Err(error);
        }

        let response = render(prompt, context).map_err(|fault| {
            error!(%fault, "failed to render response");
            ComposeError::Internal
        })?;

        let composed = ComposedResponse { response };
        self.cache.put(key, composed.clone());
        Ok(composed)
    }
}

fn render(prompt: &str, context: &[String]) -> Result<String, std::fmt::Error> {
    let mut numbered = String::new();
    for (position, chunk) in context.iter().enumerate() {
        if position > 0 {
            numbered.push('\n');
        }
        write!(numbered, "{}. {}", position + 1, chunk)?;
    }

    let mut response = String::new();
    write!(
        response,
        "Based on context, here are the most relevant pieces:\n\n{numbered}\n\nThese seem relevant to your question:{prompt}"
    )?;
    Ok(response)
}
