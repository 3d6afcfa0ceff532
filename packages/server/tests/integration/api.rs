use serde_json::json;

use crate::common::{TestApp, routes};

fn submission_body() -> serde_json::Value {
    json!({"language": "cpp", "source": "int main() { return 0; }"})
}

mod submit {
    use super::*;

    #[tokio::test]
    async fn user_can_submit() {
        let app = TestApp::spawn().await;
        let assignment = app.env.assignment_with_testcases(2).await;
        let token = app.env.token(42);

        let res = app
            .post_with_token(
                &routes::assignment_submissions(assignment.assignment.id),
                &submission_body(),
                &token,
            )
            .await;

        assert_eq!(res.status, 201);
        assert_eq!(res.body["language"], "cpp");
        assert_eq!(res.body["userId"], 42);
        assert_eq!(res.body["status"], "GRADING");
        assert_eq!(res.body["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let app = TestApp::spawn().await;
        let assignment = app.env.assignment_with_testcases(1).await;

        let res = app
            .post_without_token(
                &routes::assignment_submissions(assignment.assignment.id),
                &submission_body(),
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let app = TestApp::spawn().await;
        let assignment = app.env.assignment_with_testcases(1).await;

        let res = app
            .post_with_token(
                &routes::assignment_submissions(assignment.assignment.id),
                &submission_body(),
                "not-a-token",
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn empty_source_is_a_validation_error() {
        let app = TestApp::spawn().await;
        let assignment = app.env.assignment_with_testcases(1).await;
        let token = app.env.token(1);

        let res = app
            .post_with_token(
                &routes::assignment_submissions(assignment.assignment.id),
                &json!({"language": "cpp", "source": ""}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_assignment_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.env.token(1);

        let res = app
            .post_with_token(&routes::assignment_submissions(404), &submission_body(), &token)
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn unpublished_submission_reports_not_scheduled() {
        let app = TestApp::spawn().await;
        let assignment = app.env.assignment_with_testcases(1).await;
        app.env.broker.set_unavailable(true);
        let token = app.env.token(1);

        let res = app
            .post_with_token(
                &routes::assignment_submissions(assignment.assignment.id),
                &submission_body(),
                &token,
            )
            .await;

        assert_eq!(res.status, 503);
        assert_eq!(res.body["code"], "NOT_SCHEDULED");
    }
}

mod view {
    use super::*;

    #[tokio::test]
    async fn owner_can_poll_submission() {
        let app = TestApp::spawn().await;
        app.env.seed_scenario().await;
        let token = app.env.token(42);

        let res = app.get_with_token(&routes::submission(100), &token).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["id"], 100);
        assert_eq!(res.body["status"], "GRADING");
        assert_eq!(res.body["results"][0]["testcaseId"], 1);
    }

    #[tokio::test]
    async fn other_users_are_denied() {
        let app = TestApp::spawn().await;
        app.env.seed_scenario().await;
        let token = app.env.token(7);

        let res = app.get_with_token(&routes::submission(100), &token).await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn missing_submission_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.env.token(7);

        let res = app.get_with_token(&routes::submission(1), &token).await;

        assert_eq!(res.status, 404);
    }
}
