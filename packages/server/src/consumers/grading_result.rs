use std::sync::Arc;
use std::time::Duration;

use common::ResultStatus;
use common::grading::{CorrelationError, GradingResponse, TestOutcome};
use futures::StreamExt;
use mq::{Broker, Delivery, MqError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::hub::{Notifier, SUBMISSION_UPDATE_EVENT};
use crate::models::ResultUpdate;
use crate::store::{ResultStore, StoreError};

/// Pause after the broker fails to hand out a message.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Why a grading response was rejected.
#[derive(Debug)]
pub enum RejectReason {
    /// Not a grading response at all.
    Malformed(serde_json::Error),
    /// Results cannot be matched to testcases.
    Misaligned(CorrelationError),
    /// The submission or one of its testcases is unknown.
    UnknownSubmission(StoreError),
    /// The commit failed and was rolled back.
    Persistence(StoreError),
}

#[derive(Debug)]
pub enum HandleOutcome {
    Ack,
    Reject(RejectReason),
}

/// Map one graded testcase onto its stored result.
///
/// A failed testcase keeps the grader's output hash as its detail, if any.
pub fn result_update(testcase_id: i64, outcome: &TestOutcome) -> ResultUpdate {
    let status_detail =
        (!outcome.pass && !outcome.hash.is_empty()).then(|| outcome.hash.clone());

    ResultUpdate {
        testcase_id,
        status: ResultStatus::from_pass(outcome.pass),
        status_detail,
        memory_usage: None,
        time_usage: Some(outcome.time),
    }
}

/// Consumes grading responses, persists them and notifies submission owners.
pub struct ResultConsumer {
    store: ResultStore,
    broker: Arc<dyn Broker>,
    notifier: Notifier,
    queue: String,
    max_in_flight: usize,
}

impl ResultConsumer {
    pub fn new(
        store: ResultStore,
        broker: Arc<dyn Broker>,
        notifier: Notifier,
        queue: impl Into<String>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            store,
            broker,
            notifier,
            queue: queue.into(),
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Consume until the subscription ends.
    ///
    /// Each delivery is handled on its own task, at most `max_in_flight` at a
    /// time. Neither a bad message nor a failed receive stops the loop.
    /// Returns once the stream ends and in-flight messages are settled.
    pub async fn run(self: Arc<Self>) -> Result<(), MqError> {
        info!(queue = %self.queue, "Starting grading result consumer");

        let mut stream = self.broker.subscribe(&self.queue).await?;
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        loop {
            let delivery = match stream.next().await {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    warn!(queue = %self.queue, error = %e, "Failed to receive grading response");
                    tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                    continue;
                }
                None => break,
            };

            // Reap finished tasks so the set does not grow unbounded.
            while let Some(joined) = tasks.try_join_next() {
                log_panic(joined);
            }

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let consumer = Arc::clone(&self);
            tasks.spawn(async move {
                consumer.settle(delivery).await;
                drop(permit);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            log_panic(joined);
        }

        info!(queue = %self.queue, "Grading result consumer finished");
        Ok(())
    }

    async fn settle(&self, delivery: Delivery) {
        let settled = match self.handle_response(delivery.body()).await {
            HandleOutcome::Ack => delivery.ack().await,
            HandleOutcome::Reject(reason) => {
                match &reason {
                    RejectReason::Malformed(e) => {
                        warn!(error = %e, "Rejecting malformed grading response")
                    }
                    RejectReason::Misaligned(e) => {
                        warn!(error = %e, "Rejecting misaligned grading response")
                    }
                    RejectReason::UnknownSubmission(e) => {
                        warn!(error = %e, "Rejecting grading response for unknown submission")
                    }
                    RejectReason::Persistence(e) => {
                        error!(error = %e, "Failed to persist grading response")
                    }
                }
                delivery.reject().await
            }
        };

        if let Err(e) = settled {
            error!(queue = %self.queue, error = %e, "Failed to settle delivery");
        }
    }

    /// Process one raw grading response.
    ///
    /// Acknowledge only after the results are committed. The live push is
    /// best effort and never changes the outcome.
    pub async fn handle_response(&self, body: &[u8]) -> HandleOutcome {
        let response: GradingResponse = match serde_json::from_slice(body) {
            Ok(response) => response,
            Err(e) => return HandleOutcome::Reject(RejectReason::Malformed(e)),
        };
        let submission_id = response.metadata.submission_id;

        let updates: Vec<ResultUpdate> = match response.correlate() {
            Ok(pairs) => pairs
                .into_iter()
                .map(|(testcase_id, outcome)| result_update(testcase_id, outcome))
                .collect(),
            Err(e) => return HandleOutcome::Reject(RejectReason::Misaligned(e)),
        };

        let compilation_log = Some(response.compile_output);
        if let Err(e) = self
            .store
            .commit_results(submission_id, compilation_log, &updates)
            .await
        {
            let reason = match e {
                StoreError::SubmissionNotFound(_) | StoreError::UnknownTestcase { .. } => {
                    RejectReason::UnknownSubmission(e)
                }
                other => RejectReason::Persistence(other),
            };
            return HandleOutcome::Reject(reason);
        }

        info!(submission_id, results = updates.len(), "Processed grading response");
        self.push_update(submission_id).await;

        HandleOutcome::Ack
    }

    async fn push_update(&self, submission_id: i64) {
        let view = match self.store.load_submission(submission_id).await {
            Ok(view) => view,
            Err(e) => {
                warn!(submission_id, error = %e, "Could not reload submission for push");
                return;
            }
        };

        match self.notifier.notify(view.user_id, SUBMISSION_UPDATE_EVENT, &view) {
            Ok(()) => debug!(
                submission_id,
                user_id = view.user_id,
                status = %view.status,
                "Queued submission update"
            ),
            Err(e) => warn!(submission_id, error = %e, "Submission update not queued"),
        }
    }
}

fn log_panic(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Grading response task panicked");
    }
}
