//! Retry/backoff controller.
//!
//! Executes a built request up to `num_retries + 1` times. A retry is
//! warranted on a transport-level failure, or when the step expects a
//! non-`Any` status that the response does not yet satisfy - the latter
//! tolerates eventual-consistency windows in ingestion/indexing pipelines
//! (index refresh, bulk commit). Backoff between attempts is a fixed short
//! delay: fixtures model settle-time, not congestion, so there is nothing
//! to back off exponentially from.
//!
//! After the final attempt whatever response (or error) was last observed
//! is handed back for matching; a transport error on the final attempt
//! surfaces as a failure, never a silent pass. When the final response
//! satisfies the status expectation, the controller pauses for the step's
//! `sleep_after` settle delay before returning control to the dispatcher.

use crate::http::{HttpClient, HttpResponse, TransportError};
use crate::request::BuiltRequest;
use crate::scenario::StatusExpectation;
use std::time::Duration;
use tracing::debug;

/// Outcome of a retried execution.
#[derive(Debug)]
pub struct RetryOutcome {
    /// Last observed response or transport error.
    pub result: Result<HttpResponse, TransportError>,
    /// Attempts actually made (1-based).
    pub attempts: u32,
}

/// Wraps request execution with a bounded fixed-delay retry policy.
#[derive(Debug, Clone)]
pub struct RetryController {
    backoff: Duration,
}

impl RetryController {
    /// Creates a controller with the given inter-attempt delay.
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Executes `request` until the status expectation is satisfied or
    /// attempts are exhausted, then applies the settle delay on success.
    pub async fn execute(
        &self,
        client: &dyn HttpClient,
        request: &BuiltRequest,
        status: StatusExpectation,
        num_retries: u32,
        sleep_after: Duration,
    ) -> RetryOutcome {
        let max_attempts = num_retries + 1;
        let mut last: Option<Result<HttpResponse, TransportError>> = None;

        for attempt in 1..=max_attempts {
            let result = client.execute(request).await;

            let settled = match &result {
                Ok(response) => status.accepts(response.status),
                Err(_) => false,
            };

            if settled {
                if !sleep_after.is_zero() {
                    debug!(delay = ?sleep_after, "settle delay after successful step");
                    tokio::time::sleep(sleep_after).await;
                }
                return RetryOutcome {
                    result,
                    attempts: attempt,
                };
            }

            if attempt < max_attempts {
                match &result {
                    Ok(response) => debug!(
                        attempt,
                        status = response.status,
                        expected = %status,
                        "status not yet satisfied, retrying"
                    ),
                    Err(error) => debug!(attempt, %error, "transport failure, retrying"),
                }
                tokio::time::sleep(self.backoff).await;
            }

            last = Some(result);
        }

        RetryOutcome {
            result: last.expect("at least one attempt is always made"),
            attempts: max_attempts,
        }
    }
}
