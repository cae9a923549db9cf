use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{DocumentKeysResponse, DocumentUpdate, IpLookupResponse, UpdateResponse},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

mod api;
mod app_state;
mod config;

use api::ApiContext;
use app_state::AppState;
use config::{load_settings, prepare_database_url};

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
        trust_forwarded_for: settings.trust_forwarded_for,
    };
    let app = build_router(Arc::new(state), settings.body_limit_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(
        %addr,
        body_limit_bytes = settings.body_limit_bytes,
        trust_forwarded_for = settings.trust_forwarded_for,
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ip", get(lookup_ip))
        .route("/collections/:collection/documents", get(http_list_documents))
        .route(
            "/collections/:collection/documents/:key",
            get(http_get_document)
                .put(http_put_document)
                .patch(http_update_document),
        )
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}

async fn lookup_ip(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> HttpResult<Json<IpLookupResponse>> {
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());
    let peer = connect_info.map(|ConnectInfo(addr)| addr);

    let ip = api::client_address(forwarded_for, peer, state.trust_forwarded_for).ok_or_else(|| {
        reject(ApiError::new(
            ErrorCode::Internal,
            "client address unavailable",
        ))
    })?;
    Ok(Json(IpLookupResponse { ip: ip.to_string() }))
}

async fn http_list_documents(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> HttpResult<Json<DocumentKeysResponse>> {
    let keys = api::list_document_keys(&state.api, &collection)
        .await
        .map_err(reject)?;
    Ok(Json(DocumentKeysResponse { keys }))
}

async fn http_get_document(
    State(state): State<Arc<AppState>>,
    Path((collection, key)): Path<(String, String)>,
) -> HttpResult<Json<Value>> {
    let body = api::get_document(&state.api, &collection, &key)
        .await
        .map_err(reject)?;
    Ok(Json(body))
}

async fn http_put_document(
    State(state): State<Arc<AppState>>,
    Path((collection, key)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> HttpResult<StatusCode> {
    api::put_document(&state.api, &collection, &key, &body)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_update_document(
    State(state): State<Arc<AppState>>,
    Path((collection, key)): Path<(String, String)>,
    Json(update): Json<DocumentUpdate>,
) -> HttpResult<Json<UpdateResponse>> {
    let outcome = api::update_document(&state.api, &collection, &key, &update)
        .await
        .map_err(reject)?;
    Ok(Json(UpdateResponse { outcome }))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
