use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use reqwest::Client;
use serde_json::Value;
use tempfile::TempDir;

use autograde_server::auth::JwtAuthenticator;
use autograde_server::config::{DatabaseConfig, HubConfig};
use autograde_server::consumers::ResultConsumer;
use autograde_server::database::init_db;
use autograde_server::grading::{GradingDispatcher, SubmissionService};
use autograde_server::hub::{Hub, Notifier};
use autograde_server::models::{AssignmentWithTestcases, NewAssignment, NewSubmission};
use autograde_server::state::AppState;
use autograde_server::store::ResultStore;
use common::IdGenerator;
use common::storage::filesystem::FilesystemObjectStore;
use common::storage::{BoxReader, ObjectStore};
use mq::MemoryBroker;

pub const REQUEST_QUEUE: &str = "grading.request";
pub const RESPONSE_QUEUE: &str = "grading.response";
pub const PUBLIC_BASE_URL: &str = "http://files.test/objects";
pub const JWT_SECRET: &str = "test-secret-for-integration-tests";

pub mod routes {
    pub fn assignment_submissions(assignment_id: i64) -> String {
        format!("/api/v1/assignments/{assignment_id}/submissions")
    }

    pub fn submission(id: i64) -> String {
        format!("/api/v1/submissions/{id}")
    }
}

pub fn reader(bytes: &[u8]) -> BoxReader {
    Box::new(Cursor::new(bytes.to_vec()))
}

/// Database, storage and broker wired together, without an HTTP listener.
pub struct TestEnv {
    pub store: ResultStore,
    pub broker: MemoryBroker,
    pub objects: Arc<FilesystemObjectStore>,
    pub service: SubmissionService,
    pub hub: Arc<Hub>,
    pub auth: Arc<JwtAuthenticator>,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");

        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let db = init_db(&DatabaseConfig {
            url: db_url,
            max_connections: 1,
            min_connections: 1,
        })
        .await
        .expect("Failed to initialize test database");
        let store = ResultStore::new(db);

        let objects = Arc::new(
            FilesystemObjectStore::new(dir.path().join("objects"), 1024 * 1024)
                .await
                .expect("Failed to create object store"),
        );

        let broker = MemoryBroker::new();
        let dispatcher = Arc::new(
            GradingDispatcher::new(Arc::new(broker.clone()), PUBLIC_BASE_URL, REQUEST_QUEUE)
                .expect("Invalid base URL"),
        );
        let ids = Arc::new(IdGenerator::new(1, 0).expect("Invalid id tag"));
        let service = SubmissionService::new(
            store.clone(),
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
            dispatcher,
            ids,
        );

        Self {
            store,
            broker,
            objects,
            service,
            hub: Arc::new(Hub::new(&HubConfig::default())),
            auth: Arc::new(JwtAuthenticator::new(JWT_SECRET)),
            _dir: dir,
        }
    }

    /// An assignment with `count` testcases, built through the intake service.
    pub async fn assignment_with_testcases(&self, count: usize) -> AssignmentWithTestcases {
        let assignment = self
            .service
            .create_assignment(NewAssignment {
                workspace_id: 1,
                time_limit: 1000,
                memory_limit: 256,
            })
            .await
            .expect("Failed to create assignment");

        for i in 0..count {
            self.service
                .add_testcase(
                    assignment.id,
                    reader(format!("input {i}").as_bytes()),
                    reader(format!("output {i}").as_bytes()),
                )
                .await
                .expect("Failed to add testcase");
        }

        self.store
            .load_assignment(assignment.id)
            .await
            .expect("Failed to load assignment")
    }

    /// Assignment 7 with testcases [1, 2, 3] and submission 100 owned by user 42.
    pub async fn seed_scenario(&self) {
        self.store
            .create_assignment(
                7,
                NewAssignment {
                    workspace_id: 1,
                    time_limit: 1000,
                    memory_limit: 256,
                },
            )
            .await
            .expect("Failed to create assignment");

        for id in [1, 2, 3] {
            self.store
                .add_testcase(
                    id,
                    7,
                    format!("assignments/7/testcases/{id}/input"),
                    format!("assignments/7/testcases/{id}/output"),
                )
                .await
                .expect("Failed to add testcase");
        }

        self.store
            .create_submission(NewSubmission {
                id: 100,
                assignment_id: 7,
                user_id: 42,
                language: "cpp".into(),
                source_path: "submissions/7/100/source".into(),
            })
            .await
            .expect("Failed to create submission");
    }

    pub fn consumer(&self, notifier: Notifier) -> Arc<ResultConsumer> {
        Arc::new(ResultConsumer::new(
            self.store.clone(),
            Arc::new(self.broker.clone()),
            notifier,
            RESPONSE_QUEUE,
            4,
        ))
    }

    pub fn token(&self, user_id: i64) -> String {
        self.auth
            .sign(user_id, &format!("user{user_id}"), Duration::hours(1))
            .expect("Failed to sign token")
    }
}

/// A running test server.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub env: TestEnv,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let env = TestEnv::new().await;

        let state = AppState {
            store: env.store.clone(),
            submissions: env.service.clone(),
            hub: Arc::clone(&env.hub),
            authenticator: env.auth.clone(),
        };
        let app = autograde_server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            env,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");
        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");
        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");
        TestResponse::from_response(res).await
    }
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, body }
    }
}
