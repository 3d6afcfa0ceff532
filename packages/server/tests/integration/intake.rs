use autograde_server::grading::{DispatchError, SubmitError};
use autograde_server::store::StoreError;
use common::ResultStatus;
use common::grading::GradingRequest;
use common::storage::ObjectStore;
use mq::MqError;

use crate::common::{PUBLIC_BASE_URL, REQUEST_QUEUE, TestEnv, reader};

#[tokio::test]
async fn submit_dispatches_aligned_request() {
    let env = TestEnv::new().await;
    let assignment = env.assignment_with_testcases(3).await;

    let submission = env
        .service
        .submit(42, assignment.assignment.id, "python", reader(b"print(1)"))
        .await
        .unwrap();

    let published = env.broker.published(REQUEST_QUEUE);
    assert_eq!(published.len(), 1);
    let request: GradingRequest = serde_json::from_slice(&published[0]).unwrap();

    assert!(request.is_aligned());
    assert_eq!(request.tests.len(), 3);
    let testcase_ids: Vec<i64> = assignment.testcases.iter().map(|t| t.id).collect();
    assert_eq!(request.metadata.testcase_ids, testcase_ids);
    assert_eq!(request.metadata.submission_id, submission.id);
    assert_eq!(request.metadata.assignment_id, assignment.assignment.id);
    assert_eq!(request.settings.time_limit, 1000);
    assert_eq!(request.settings.memory_limit, 256);
    assert_eq!(request.language, "python");
    assert_eq!(
        request.source_url,
        format!("{PUBLIC_BASE_URL}/{}", submission.source_path)
    );
    for (test, testcase) in request.tests.iter().zip(&assignment.testcases) {
        assert_eq!(
            test.input_url,
            format!("{PUBLIC_BASE_URL}/{}", testcase.input_path)
        );
        assert_eq!(
            test.output_url,
            format!("{PUBLIC_BASE_URL}/{}", testcase.output_path)
        );
    }

    assert!(env.objects.exists(&submission.source_path).await.unwrap());
    let view = env.store.load_submission(submission.id).await.unwrap();
    assert_eq!(view.results.len(), 3);
    assert_eq!(view.status, ResultStatus::Grading);
}

#[tokio::test]
async fn publish_failure_leaves_submission_recorded() {
    let env = TestEnv::new().await;
    let assignment = env.assignment_with_testcases(2).await;
    env.broker.set_unavailable(true);

    let err = env
        .service
        .submit(42, assignment.assignment.id, "cpp", reader(b"int main() {}"))
        .await
        .unwrap_err();

    let SubmitError::NotScheduled {
        submission_id,
        source,
    } = err
    else {
        panic!("expected NotScheduled");
    };
    assert!(matches!(
        source,
        DispatchError::PublishFailed(MqError::Unavailable)
    ));

    let view = env.store.load_submission(submission_id).await.unwrap();
    assert_eq!(view.status, ResultStatus::Grading);
    assert_eq!(view.results.len(), 2);
    assert!(env.broker.published(REQUEST_QUEUE).is_empty());
}

#[tokio::test]
async fn assignment_without_testcases_is_refused() {
    let env = TestEnv::new().await;
    let assignment = env.assignment_with_testcases(0).await;

    let err = env
        .service
        .submit(42, assignment.assignment.id, "cpp", reader(b"x"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SubmitError::Store(StoreError::NoTestcases(_))
    ));
    assert!(env.broker.published(REQUEST_QUEUE).is_empty());
}

#[tokio::test]
async fn testcase_fixtures_are_uploaded() {
    let env = TestEnv::new().await;
    let assignment = env.assignment_with_testcases(2).await;

    for testcase in &assignment.testcases {
        assert!(env.objects.exists(&testcase.input_path).await.unwrap());
        assert!(env.objects.exists(&testcase.output_path).await.unwrap());
    }
}

#[tokio::test]
async fn submissions_get_distinct_ids() {
    let env = TestEnv::new().await;
    let assignment = env.assignment_with_testcases(1).await;

    let a = env
        .service
        .submit(1, assignment.assignment.id, "cpp", reader(b"a"))
        .await
        .unwrap();
    let b = env
        .service
        .submit(1, assignment.assignment.id, "cpp", reader(b"b"))
        .await
        .unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(env.broker.published(REQUEST_QUEUE).len(), 2);
}
