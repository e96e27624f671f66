//! Broadcast dispatcher.
//!
//! Sends one timeline card to every registered user. The per-user
//! requests are never issued individually: they are accumulated and
//! submitted as exactly one batched call, whose per-item outcomes are
//! folded into a success/failure summary in wire-arrival order.
//!
//! A hard quota ceiling (configurable, default 10) protects the fixed
//! external call quota: above it the broadcast aborts before any network
//! traffic. Transport failure of the batch itself is deliberately not
//! caught here and propagates to the caller.

use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::mirror::{BatchExecutor, ServiceFactory};
use crate::protocol::{BatchItemResult, TimelineItem};

/// Accumulated per-item outcomes of one broadcast.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub success: usize,
    pub failure: usize,
}

impl BatchOutcome {
    /// Fold in one per-item result, logging failures with their
    /// correlation id.
    pub fn record(&mut self, result: &BatchItemResult) {
        if result.is_success() {
            self.success += 1;
        } else {
            self.failure += 1;
            tracing::error!(
                user = result.correlation_id.as_str(),
                status = result.status,
                error = result.error.as_deref().unwrap_or(""),
                "Failed to insert item for user"
            );
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Successfully sent cards to {} users ({} failed).",
            self.success, self.failure
        )
    }
}

/// Send `item` to every registered user and return a summary string.
pub async fn broadcast_to_all<E: BatchExecutor>(
    credentials: &CredentialStore,
    services: &ServiceFactory,
    executor: &E,
    quota: usize,
    item: TimelineItem,
) -> Result<String> {
    let total_users = credentials.user_count();

    // Hard ceiling, not a rate limit: above it, no network calls at all.
    if total_users > quota {
        tracing::warn!(total_users, quota, "Aborting broadcast over user quota");
        return Ok(format!(
            "Total user count is {}. Aborting broadcast to save your quota",
            total_users
        ));
    }

    let mut outcome = BatchOutcome::default();
    let mut requests = Vec::with_capacity(total_users);

    for user_id in credentials.user_ids() {
        match services.client_for(credentials, &user_id) {
            Ok(client) => {
                requests.push(client.timeline_insert_request(&user_id, item.clone()));
            }
            Err(e) => {
                // A user without a usable credential fails their own item
                // only; siblings still go out.
                outcome.failure += 1;
                tracing::error!(user = user_id.as_str(), error = %e, "Skipping user in broadcast");
            }
        }
    }

    if !requests.is_empty() {
        // One wire round trip for all sub-requests. An outright transport
        // failure propagates via `?`.
        let results = executor.execute(requests).await?;
        for result in &results {
            outcome.record(result);
        }
    }

    tracing::info!(
        success = outcome.success,
        failure = outcome.failure,
        "Broadcast complete"
    );
    Ok(outcome.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::Error;
    use crate::protocol::BatchRequest;

    /// Scripted batch executor: answers with canned per-item results and
    /// records what it was asked to send.
    struct StubExecutor {
        calls: Mutex<Vec<Vec<BatchRequest>>>,
        respond: fn(&[BatchRequest]) -> Result<Vec<BatchItemResult>>,
    }

    impl StubExecutor {
        fn new(respond: fn(&[BatchRequest]) -> Result<Vec<BatchItemResult>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                respond,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl BatchExecutor for StubExecutor {
        async fn execute(&self, requests: Vec<BatchRequest>) -> Result<Vec<BatchItemResult>> {
            let response = (self.respond)(&requests);
            self.calls.lock().unwrap().push(requests);
            response
        }
    }

    fn all_ok(requests: &[BatchRequest]) -> Result<Vec<BatchItemResult>> {
        Ok(requests
            .iter()
            .map(|r| BatchItemResult {
                correlation_id: r.correlation_id.clone(),
                status: 200,
                error: None,
            })
            .collect())
    }

    fn registered_users(n: usize) -> CredentialStore {
        let credentials = CredentialStore::new(None);
        for i in 0..n {
            credentials.put_token(&format!("user-{}", i), format!("blob-{}", i));
        }
        credentials
    }

    fn services() -> ServiceFactory {
        ServiceFactory::new(reqwest::Client::new(), "http://localhost:9000")
    }

    #[tokio::test]
    async fn test_quota_exceeded_makes_no_network_calls() {
        let credentials = registered_users(11);
        let executor = StubExecutor::new(all_ok);

        let summary = broadcast_to_all(
            &credentials,
            &services(),
            &executor,
            10,
            TimelineItem::text("Hello Everyone!"),
        )
        .await
        .unwrap();

        assert_eq!(executor.call_count(), 0);
        assert_eq!(
            summary,
            "Total user count is 11. Aborting broadcast to save your quota"
        );
    }

    #[tokio::test]
    async fn test_quota_is_configurable() {
        let credentials = registered_users(4);
        let executor = StubExecutor::new(all_ok);

        let summary = broadcast_to_all(
            &credentials,
            &services(),
            &executor,
            3,
            TimelineItem::text("Hello Everyone!"),
        )
        .await
        .unwrap();

        assert_eq!(executor.call_count(), 0);
        assert!(summary.starts_with("Total user count is 4."));
    }

    #[tokio::test]
    async fn test_single_batch_with_one_request_per_user() {
        let credentials = registered_users(10);
        let executor = StubExecutor::new(all_ok);

        let summary = broadcast_to_all(
            &credentials,
            &services(),
            &executor,
            10,
            TimelineItem::text("Hello Everyone!"),
        )
        .await
        .unwrap();

        assert_eq!(executor.call_count(), 1);
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls[0].len(), 10);
        assert_eq!(summary, "Successfully sent cards to 10 users (0 failed).");
    }

    #[tokio::test]
    async fn test_per_item_failure_is_counted_not_fatal() {
        let credentials = registered_users(3);

        // Results come back out of enqueue order, with one failure.
        let executor = StubExecutor::new(|requests| {
            let mut results: Vec<BatchItemResult> = requests
                .iter()
                .map(|r| BatchItemResult {
                    correlation_id: r.correlation_id.clone(),
                    status: if r.correlation_id == "user-1" { 500 } else { 200 },
                    error: (r.correlation_id == "user-1")
                        .then(|| "insert failed".to_string()),
                })
                .collect();
            results.reverse();
            Ok(results)
        });

        let summary = broadcast_to_all(
            &credentials,
            &services(),
            &executor,
            10,
            TimelineItem::text("Hello Everyone!"),
        )
        .await
        .unwrap();

        assert_eq!(summary, "Successfully sent cards to 2 users (1 failed).");
    }

    #[tokio::test]
    async fn test_user_without_credential_fails_own_item_only() {
        let credentials = registered_users(2);
        credentials.put_display_name("user-no-token", "Tokenless");
        let executor = StubExecutor::new(all_ok);

        let summary = broadcast_to_all(
            &credentials,
            &services(),
            &executor,
            10,
            TimelineItem::text("Hello Everyone!"),
        )
        .await
        .unwrap();

        // The two users with tokens go out in the batch; the third counts
        // as a failure.
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls[0].len(), 2);
        assert_eq!(summary, "Successfully sent cards to 2 users (1 failed).");
    }

    #[tokio::test]
    async fn test_batch_transport_failure_propagates() {
        let credentials = registered_users(2);
        let executor = StubExecutor::new(|_| {
            Err(Error::Api {
                status: 502,
                body: "bad gateway".to_string(),
            })
        });

        let result = broadcast_to_all(
            &credentials,
            &services(),
            &executor,
            10,
            TimelineItem::text("Hello Everyone!"),
        )
        .await;

        assert!(matches!(result, Err(Error::Api { status: 502, .. })));
    }
}
