//! Timeout + bounded linear retry around a [`CompletionBackend`].

use std::time::Duration;

use tracing::{debug, warn};

use noteforge_shared::CompletionSettings;

use crate::completion::{CompletionBackend, CompletionError, CompletionRequest};

/// How hard to try before giving up on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    /// Retry `n` waits `base_delay * n`.
    pub base_delay: Duration,
    /// Budget of a single attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

impl From<&CompletionSettings> for RetryPolicy {
    fn from(settings: &CompletionSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.retry_base_delay,
            timeout: settings.timeout,
        }
    }
}

/// A completion client that survives an unreliable backend.
///
/// Every attempt runs under [`RetryPolicy::timeout`]; the attempt's future is
/// dropped when the budget runs out. Blank text is never returned as success.
pub struct ResilientClient<B> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: CompletionBackend> ResilientClient<B> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolve `request`, retrying on any failure; returns the last error on exhaustion.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let attempts = self.policy.max_retries.saturating_add(1);
        let mut last_error = CompletionError::EmptyBody;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying completion");
                tokio::time::sleep(delay).await;
            }

            let outcome =
                tokio::time::timeout(self.policy.timeout, self.backend.complete(request)).await;

            last_error = match outcome {
                Ok(Ok(text)) if !text.trim().is_empty() => return Ok(text),
                Ok(Ok(_)) => CompletionError::EmptyBody,
                Ok(Err(e)) => e,
                Err(_) => CompletionError::Timeout(self.policy.timeout),
            };

            warn!(
                attempt = attempt + 1,
                of = attempts,
                error = %last_error,
                "completion attempt failed"
            );
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays scripted results, then succeeds with "done".
    struct Scripted {
        script: Mutex<Vec<Step>>,
        calls: Mutex<u32>,
    }

    enum Step {
        Fail(CompletionError),
        Reply(&'static str),
        Hang,
    }

    impl Scripted {
        fn new(mut steps: Vec<Step>) -> Self {
            steps.reverse();
            Self {
                script: Mutex::new(steps),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl CompletionBackend for Scripted {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            *self.calls.lock().unwrap() += 1;
            let step = self.script.lock().unwrap().pop();
            match step {
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Reply(text)) => Ok(text.to_string()),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("too late".into())
                }
                None => Ok("done".into()),
            }
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: String::new(),
            user_prompt: "chunk".into(),
            max_tokens: 16,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn first_success_is_returned() {
        let client = ResilientClient::new(Scripted::new(vec![Step::Reply("notes")]), policy(3));
        assert_eq!(client.complete(&request()).await.unwrap(), "notes");
        assert_eq!(client.backend().calls(), 1);
    }

    #[tokio::test]
    async fn retries_through_transient_failures() {
        let backend = Scripted::new(vec![
            Step::Fail(CompletionError::HttpStatus {
                status: 502,
                body: "bad gateway".into(),
            }),
            Step::Reply("   "),
            Step::Hang,
        ]);
        let client = ResilientClient::new(backend, policy(3));
        assert_eq!(client.complete(&request()).await.unwrap(), "done");
        assert_eq!(client.backend().calls(), 4);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let backend = Scripted::new(vec![
            Step::Fail(CompletionError::Transport("reset".into())),
            Step::Fail(CompletionError::EmptyBody),
            Step::Fail(CompletionError::HttpStatus {
                status: 500,
                body: "boom".into(),
            }),
        ]);
        let client = ResilientClient::new(backend, policy(2));
        let err = client.complete(&request()).await.unwrap_err();
        assert_eq!(
            err,
            CompletionError::HttpStatus {
                status: 500,
                body: "boom".into()
            }
        );
        assert_eq!(client.backend().calls(), 3);
    }

    #[tokio::test]
    async fn hanging_attempt_times_out() {
        let client = ResilientClient::new(Scripted::new(vec![Step::Hang]), policy(0));
        let err = client.complete(&request()).await.unwrap_err();
        assert_eq!(err, CompletionError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn blank_reply_is_never_success() {
        let client = ResilientClient::new(Scripted::new(vec![Step::Reply("")]), policy(0));
        assert_eq!(
            client.complete(&request()).await.unwrap_err(),
            CompletionError::EmptyBody
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_linearly_between_attempts() {
        struct Timed {
            started: tokio::time::Instant,
            seen: Mutex<Vec<Duration>>,
        }

        impl CompletionBackend for Timed {
            async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
                let mut seen = self.seen.lock().unwrap();
                seen.push(self.started.elapsed());
                if seen.len() < 4 {
                    Err(CompletionError::Transport("reset".into()))
                } else {
                    Ok("finally".into())
                }
            }
        }

        let backend = Timed {
            started: tokio::time::Instant::now(),
            seen: Mutex::new(Vec::new()),
        };
        let client = ResilientClient::new(
            backend,
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(200),
                timeout: Duration::from_secs(5),
            },
        );

        assert_eq!(client.complete(&request()).await.unwrap(), "finally");
        let seen = client.backend().seen.lock().unwrap().clone();
        let ms = |n: u64| Duration::from_millis(n);
        // waits of 200, 400 and 600 ms before retries 1..=3
        assert_eq!(seen, vec![ms(0), ms(200), ms(600), ms(1_200)]);
    }

    #[test]
    fn delay_scales_linearly() {
        let p = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(3), Duration::from_millis(1_500));
    }
}
