use std::sync::Arc;

use crate::auth::Authenticator;
use crate::grading::SubmissionService;
use crate::hub::Hub;
use crate::store::ResultStore;

#[derive(Clone)]
pub struct AppState {
    pub store: ResultStore,
    pub submissions: SubmissionService,
    pub hub: Arc<Hub>,
    pub authenticator: Arc<dyn Authenticator>,
}
