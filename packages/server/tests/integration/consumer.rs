use std::sync::Arc;

use autograde_server::consumers::{HandleOutcome, RejectReason};
use autograde_server::hub::{self, Notifier};
use common::ResultStatus;
use mq::{Broker, Settlement};
use serde_json::{Value, json};

use crate::common::{RESPONSE_QUEUE, TestEnv};

fn scenario_response() -> Value {
    json!({
        "compileOutput": "",
        "results": [
            {"hash": "a", "pass": true, "time": 50},
            {"hash": "b", "pass": false, "time": 80},
            {"hash": "c", "pass": true, "time": 40},
        ],
        "metadata": {"submissionId": 100, "testcaseIds": [1, 2, 3]},
    })
}

fn body(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

mod handle_response {
    use super::*;

    #[tokio::test]
    async fn end_to_end_scenario_is_persisted() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;
        let (notifier, mut queue) = Notifier::channel(8);
        let consumer = env.consumer(notifier);

        let outcome = consumer.handle_response(&body(&scenario_response())).await;

        assert!(matches!(outcome, HandleOutcome::Ack));
        let view = env.store.load_submission(100).await.unwrap();
        let got: Vec<_> = view
            .results
            .iter()
            .map(|r| (r.testcase_id, r.status, r.time_usage, r.memory_usage))
            .collect();
        assert_eq!(
            got,
            vec![
                (1, ResultStatus::Done, Some(50), None),
                (2, ResultStatus::Error, Some(80), None),
                (3, ResultStatus::Done, Some(40), None),
            ]
        );
        assert_eq!(view.status, ResultStatus::Error);
        assert_eq!(view.results[0].status_detail, None);
        assert_eq!(view.results[1].status_detail.as_deref(), Some("b"));

        let notification = queue.try_recv().unwrap();
        assert_eq!(notification.user_id, 42);
        assert_eq!(notification.event, hub::SUBMISSION_UPDATE_EVENT);
        assert_eq!(notification.payload["id"], 100);
        assert_eq!(notification.payload["status"], "ERROR");
    }

    #[tokio::test]
    async fn length_mismatch_rejects_without_writes() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;
        let (notifier, mut queue) = Notifier::channel(8);
        let consumer = env.consumer(notifier);

        let mut response = scenario_response();
        response["results"].as_array_mut().unwrap().pop();
        let outcome = consumer.handle_response(&body(&response)).await;

        assert!(matches!(
            outcome,
            HandleOutcome::Reject(RejectReason::Misaligned(_))
        ));
        let view = env.store.load_submission(100).await.unwrap();
        assert!(view.results.iter().all(|r| r.status == ResultStatus::Grading));
        assert_eq!(view.compilation_log, None);
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn echoed_ids_must_match_metadata() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;
        let (notifier, _queue) = Notifier::channel(8);
        let consumer = env.consumer(notifier);

        let mut response = scenario_response();
        response["results"][0]["testcaseId"] = json!(2);
        let outcome = consumer.handle_response(&body(&response)).await;

        assert!(matches!(
            outcome,
            HandleOutcome::Reject(RejectReason::Misaligned(_))
        ));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let env = TestEnv::new().await;
        let (notifier, _queue) = Notifier::channel(8);
        let consumer = env.consumer(notifier);

        let outcome = consumer.handle_response(b"{not json").await;

        assert!(matches!(
            outcome,
            HandleOutcome::Reject(RejectReason::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unknown_submission_is_rejected() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;
        let (notifier, _queue) = Notifier::channel(8);
        let consumer = env.consumer(notifier);

        let mut response = scenario_response();
        response["metadata"]["submissionId"] = json!(555);
        let outcome = consumer.handle_response(&body(&response)).await;

        assert!(matches!(
            outcome,
            HandleOutcome::Reject(RejectReason::UnknownSubmission(_))
        ));
    }

    #[tokio::test]
    async fn push_failure_still_acks() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;
        // The hub side of the hand-off is gone.
        let (notifier, queue) = Notifier::channel(1);
        drop(queue);
        let consumer = env.consumer(notifier);

        let outcome = consumer.handle_response(&body(&scenario_response())).await;

        assert!(matches!(outcome, HandleOutcome::Ack));
        let view = env.store.load_submission(100).await.unwrap();
        assert_eq!(view.status, ResultStatus::Error);
    }
}

mod run {
    use super::*;

    #[tokio::test]
    async fn malformed_message_does_not_stop_the_loop() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;

        env.broker
            .publish(RESPONSE_QUEUE, b"garbage".to_vec())
            .await
            .unwrap();
        env.broker
            .publish(RESPONSE_QUEUE, body(&scenario_response()))
            .await
            .unwrap();
        env.broker.close(RESPONSE_QUEUE);

        let (notifier, _queue) = Notifier::channel(8);
        env.consumer(notifier).run().await.unwrap();

        let mut settlements = env.broker.settlements(RESPONSE_QUEUE);
        settlements.sort_by_key(|(body, _)| body.len());
        assert_eq!(settlements.len(), 2);
        assert_eq!(settlements[0], (b"garbage".to_vec(), Settlement::Rejected));
        assert_eq!(settlements[1].1, Settlement::Acked);

        let view = env.store.load_submission(100).await.unwrap();
        assert_eq!(view.status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn connected_owner_receives_update() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;

        let (first, mut first_rx) = env.hub.new_connection();
        let (second, mut second_rx) = env.hub.new_connection();
        env.hub.register(42, first);
        env.hub.register(42, second);

        let (notifier, queue) = Notifier::channel(8);
        let dispatcher = tokio::spawn(hub::run_dispatcher(Arc::clone(&env.hub), queue));

        env.broker
            .publish(RESPONSE_QUEUE, body(&scenario_response()))
            .await
            .unwrap();
        env.broker.close(RESPONSE_QUEUE);
        env.consumer(notifier).run().await.unwrap();
        dispatcher.await.unwrap();

        let frame = first_rx.try_recv().unwrap();
        assert_eq!(frame, second_rx.try_recv().unwrap());
        let frame: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(frame["channel"], "onSubmissionUpdate");
        assert_eq!(frame["message"]["id"], 100);
        assert_eq!(frame["message"]["results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn offline_owner_does_not_block_ack() {
        let env = TestEnv::new().await;
        env.seed_scenario().await;

        let (notifier, queue) = Notifier::channel(8);
        let dispatcher = tokio::spawn(hub::run_dispatcher(Arc::clone(&env.hub), queue));

        env.broker
            .publish(RESPONSE_QUEUE, body(&scenario_response()))
            .await
            .unwrap();
        env.broker.close(RESPONSE_QUEUE);
        env.consumer(notifier).run().await.unwrap();
        dispatcher.await.unwrap();

        let settlements = env.broker.settlements(RESPONSE_QUEUE);
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].1, Settlement::Acked);
        assert_eq!(env.hub.connection_count(42), 0);
    }
}
