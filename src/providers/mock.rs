/*!
 * Mock provider implementations for testing.
 *
 * This module provides a scriptable in-process backend that answers numbered
 * batches the way a real model would, or misbehaves on purpose:
 * - `MockProvider::working()` - Always answers every position
 * - `MockProvider::partial(n)` - Answers only the first `n` positions
 * - `MockProvider::failing()` - Always fails with an error
 *
 * Clones share their counters, so a test can keep one handle while the
 * pipeline owns another.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::TranslationProvider;
use crate::translation::protocol::BatchRequest;

/// Prefix the mock puts in front of every translated line
pub const MOCK_PREFIX: &str = "[TRANSLATED] ";

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper numbered translation
    Working,
    /// Answers only the first `keep` positions of each batch
    Partial { keep: usize },
    /// Answers with `1. text` lines instead of `[1] text`
    LooseNumbering,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Fails whenever a line of the batch contains the marker
    FailWhenContains(&'static str),
    /// Panics whenever a line of the batch contains the marker
    PanicWhenContains(&'static str),
    /// Returns an empty response
    Empty,
    /// Simulates slow responses
    Slow { delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Every line that was sent, in arrival order
    sent_lines: Arc<Mutex<Vec<String>>>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&BatchRequest) -> String>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            sent_lines: Arc::new(Mutex::new(Vec::new())),
            custom_response: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that only answers the first `keep` positions
    pub fn partial(keep: usize) -> Self {
        Self::new(MockBehavior::Partial { keep })
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Create a mock that sleeps before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: fn(&BatchRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Number of batches received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every line received so far
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent_lines.lock().clone()
    }

    /// The deterministic translation of one line
    pub fn translate_text(text: &str) -> String {
        format!("{}{}", MOCK_PREFIX, text)
    }

    /// Generate a properly numbered response for the first `keep` lines
    pub fn generate_numbered_response<S: AsRef<str>>(texts: &[S], keep: usize) -> String {
        texts
            .iter()
            .take(keep)
            .enumerate()
            .map(|(i, text)| format!("[{}] {}\n\n", i + 1, Self::translate_text(text.as_ref())))
            .collect()
    }

    /// Generate a `1. text` style response
    pub fn generate_loose_response<S: AsRef<str>>(texts: &[S]) -> String {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{}. {}\n", i + 1, Self::translate_text(text.as_ref())))
            .collect()
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            sent_lines: Arc::clone(&self.sent_lines),
            custom_response: self.custom_response,
        }
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.sent_lines.lock().extend(request.texts.iter().cloned());

        if let Some(generator) = self.custom_response {
            return Ok(generator(request));
        }

        let contains = |marker: &str| request.texts.iter().any(|t| t.contains(marker));

        match self.behavior {
            MockBehavior::Working => Ok(Self::generate_numbered_response(&request.texts, request.len())),

            MockBehavior::Partial { keep } => Ok(Self::generate_numbered_response(&request.texts, keep)),

            MockBehavior::LooseNumbering => Ok(Self::generate_loose_response(&request.texts)),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(Self::generate_numbered_response(&request.texts, request.len()))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::FailWhenContains(marker) => {
                if contains(marker) {
                    Err(ProviderError::ConnectionError(format!("Simulated failure on '{}'", marker)))
                } else {
                    Ok(Self::generate_numbered_response(&request.texts, request.len()))
                }
            }

            MockBehavior::PanicWhenContains(marker) => {
                if contains(marker) {
                    panic!("Simulated backend panic on '{}'", marker);
                }
                Ok(Self::generate_numbered_response(&request.texts, request.len()))
            }

            MockBehavior::Empty => Ok(String::new()),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(Self::generate_numbered_response(&request.texts, request.len()))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
