use crate::api::ApiContext;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    /// Honour `X-Forwarded-For` on `/ip`. Only safe behind a proxy that sets it.
    pub(crate) trust_forwarded_for: bool,
}
