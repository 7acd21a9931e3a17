use qa_core::ApiContext;

use crate::hub::SessionHub;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) hub: SessionHub,
}
