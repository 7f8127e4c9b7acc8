//! The retry loop: budget, backoff, admission, guarded attempt, verdict

use rawfetch_http::{HttpRequest, HttpResponse, ReqwestTransport, Timer, Timing, TrafficRecorder, Transport};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::classify::Verdict;
use crate::errors::{AttemptFailure, BudgetStage, FetchError};
use crate::rate_limit::Admission;
use crate::strategy::Strategy;
use crate::timeout::{effective_kill_timeout, AttemptTimeout};

/// One transport-level try within a logical request
#[derive(Debug)]
pub struct Attempt {
    /// Sequence number, starting at 1
    pub number: u32,
    /// Kill timeout this attempt ran under
    pub kill_timeout: Duration,
    pub timing: Timing,
    pub outcome: Result<HttpResponse, AttemptFailure>,
}

/// Runs requests through a [`Transport`] under a [`Strategy`]
pub struct ResilientClient<T: Transport = ReqwestTransport> {
    transport: T,
    strategy: Strategy,
}

impl ResilientClient<ReqwestTransport> {
    /// Client over a default reqwest transport
    pub fn with_default_transport(strategy: Strategy) -> Self {
        Self::new(ReqwestTransport::new(), strategy)
    }
}

impl<T: Transport> ResilientClient<T> {
    /// Create a client that sends through `transport` under `strategy`
    pub fn new(transport: T, strategy: Strategy) -> Self {
        Self { transport, strategy }
    }

    /// Get the strategy every request runs under
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Get the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET `url` with retries, see [`execute`](Self::execute)
    pub async fn get(
        &self,
        url: impl Into<String>,
        recorder: Option<&mut dyn TrafficRecorder>,
    ) -> Result<HttpResponse, FetchError> {
        self.execute(&HttpRequest::get(url), recorder).await
    }

    /// POST `body` to `url` with retries, see [`execute`](Self::execute)
    pub async fn post(
        &self,
        url: impl Into<String>,
        body: impl Into<Vec<u8>>,
        recorder: Option<&mut dyn TrafficRecorder>,
    ) -> Result<HttpResponse, FetchError> {
        self.execute(&HttpRequest::post(url).with_body(body), recorder)
            .await
    }

    /// Run the full retry sequence for one logical request.
    ///
    /// Returns the first response classified as a success. A fatal status
    /// ends the sequence at once, as does running out of total time; running
    /// out of tries is reported with the number of tries made.
    pub async fn execute(
        &self,
        request: &HttpRequest,
        mut recorder: Option<&mut dyn TrafficRecorder>,
    ) -> Result<HttpResponse, FetchError> {
        let started = Instant::now();
        let strategy = &self.strategy;
        let max_tries = strategy.max_tries();
        let mut tries = 0;
        let mut last_failure = None;

        while tries < max_tries {
            if tries > 0 {
                let pause = strategy.backoff().delay_before(tries);
                if let Some(budget) = strategy.max_total_time() {
                    if remaining(budget, started) <= pause {
                        warn!("Total time of {:?} would run out during backoff", budget);
                        return Err(FetchError::BudgetExhausted {
                            budget,
                            stage: BudgetStage::Backoff { pause },
                        });
                    }
                }
                debug!("Try #{} failed, sleeping {:?} before retry", tries, pause);
                sleep(pause).await;
            }

            tries += 1;

            let mut time_left = None;
            if let Some(budget) = strategy.max_total_time() {
                let left = remaining(budget, started);
                if left.is_zero() {
                    warn!("Total time of {:?} reached before try #{}", budget, tries);
                    return Err(FetchError::BudgetExhausted {
                        budget,
                        stage: BudgetStage::BeforeAttempt,
                    });
                }
                time_left = Some(left);
            }
            let kill_timeout = effective_kill_timeout(strategy.kill_timeout(), time_left);

            self.wait_for_admission(started).await?;

            debug!("Try #{} (of {} maximum)", tries, max_tries);
            let attempt = self
                .run_attempt(tries, request, kill_timeout, recorder.as_deref_mut())
                .await;

            let response = match attempt.outcome {
                Ok(response) => response,
                Err(failure) => {
                    debug!("Try #{} failed ({}): {}", tries, failure.kind_name(), failure);
                    last_failure = Some(failure);
                    continue;
                }
            };

            match strategy.status_policy().classify_status(response.status) {
                Verdict::Success => {
                    if tries > 1 {
                        info!("Request to {} succeeded after {} tries", request.url, tries);
                    }
                    return Ok(response);
                }
                Verdict::Fatal => {
                    warn!(
                        "Request to {} failed with fatal status {}",
                        request.url, response.status
                    );
                    return Err(FetchError::fatal_status(response));
                }
                Verdict::Retry => {
                    debug!("Try #{} got retryable status {}", tries, response.status);
                    last_failure = Some(AttemptFailure::RetryableStatus {
                        status: response.status,
                    });
                }
            }
        }

        warn!("Request to {} failed (total: {} tries)", request.url, tries);
        Err(FetchError::RetriesExhausted {
            tries,
            last_failure,
        })
    }

    /// Exactly one transport call under `kill_timeout`, recorded whatever
    /// its outcome. Statuses are not judged here.
    pub async fn run_attempt(
        &self,
        number: u32,
        request: &HttpRequest,
        kill_timeout: Duration,
        recorder: Option<&mut (dyn TrafficRecorder + '_)>,
    ) -> Attempt {
        let timer = Timer::start();
        let sent = AttemptTimeout::new(kill_timeout)
            .run(self.transport.send(request, self.strategy.timeouts()))
            .await;
        let timing = timer.stop();

        let outcome = match sent {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(transport_error)) => Err(AttemptFailure::Transport(transport_error)),
            Err(timed_out) => Err(AttemptFailure::Timeout(timed_out)),
        };

        if let Some(recorder) = recorder {
            match &outcome {
                Ok(response) => recorder.record_success(response, &timing),
                Err(failure) => {
                    let sent = self.transport.prepare(request);
                    recorder.record_failure(&sent, &failure.note(), &timing)
                }
            }
        }

        Attempt {
            number,
            kill_timeout,
            timing,
            outcome,
        }
    }

    /// Block until the rate limiter admits the next attempt, unless the
    /// wait would run past the total budget
    async fn wait_for_admission(&self, started: Instant) -> Result<(), FetchError> {
        let Some(limiter) = self.strategy.rate_limiter() else {
            return Ok(());
        };

        loop {
            let admission = limiter.lock().check();
            let Admission::Rejected { retry_after } = admission else {
                return Ok(());
            };

            let wait = retry_after + self.strategy.rate_limit_pad();
            if let Some(budget) = self.strategy.max_total_time() {
                if remaining(budget, started) <= wait {
                    warn!(
                        "Total time of {:?} would run out waiting {:?} for the rate limiter",
                        budget, retry_after
                    );
                    return Err(FetchError::BudgetExhausted {
                        budget,
                        stage: BudgetStage::RateLimit { retry_after },
                    });
                }
            }

            debug!("Rate limited, sleeping {:?} before sending", wait);
            sleep(wait).await;
        }
    }
}

fn remaining(budget: Duration, started: Instant) -> Duration {
    budget.saturating_sub(started.elapsed())
}
