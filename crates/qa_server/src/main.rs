use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use qa_core::{
    answer, create_session, delete_question, edit_question, focus, generate_nickname, get_session,
    hide, join_session, restore, session_stats, submit_question, unfocus, upvote, ApiContext,
    CoreError, Dispatch, WordListFilter,
};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        ClientRequest, CreateSessionRequest, NicknameResponse, ServerEvent, SessionStats,
        SessionSummary,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod hub;
mod sweeper;

use app_state::AppState;
use config::load_settings;
use hub::ViewerId;
use sweeper::spawn_session_sweeper;

/// Room for a 5 MiB speaker image plus the rest of the JSON body.
const MAX_REQUEST_BYTES: usize = 6 * 1024 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = settings.database_url.clone();
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    storage
        .seed_session_counter(settings.session_counter_baseline)
        .await?;

    let filter = WordListFilter::new().with_extra_terms(settings.extra_blocked_terms.iter());
    let state = AppState {
        api: ApiContext::new(storage, filter),
        hub: Default::default(),
    };
    spawn_session_sweeper(
        state.clone(),
        settings.sweep_interval(),
        settings.session_retention(),
    );
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/sessions", post(http_create_session))
        .route("/api/sessions/:slug", get(http_get_session))
        .route("/api/nickname", get(http_nickname))
        .route("/api/stats", get(http_stats))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn http_create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>, HttpError> {
    let session = create_session(&state.api, &req)
        .await
        .map_err(http_error)?;
    Ok(Json(session))
}

async fn http_get_session(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<SessionSummary>, HttpError> {
    let session = get_session(&state.api, &slug).await.map_err(http_error)?;
    Ok(Json(session))
}

async fn http_nickname() -> Json<NicknameResponse> {
    Json(NicknameResponse {
        nickname: generate_nickname(),
    })
}

async fn http_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionStats>, HttpError> {
    let stats = session_stats(&state.api).await.map_err(http_error)?;
    Ok(Json(stats))
}

fn http_error(err: CoreError) -> HttpError {
    if let CoreError::Persistence(error) = &err {
        error!(error = %format!("{error:#}"), "request failed");
    }
    let body = ApiError::from(err);
    let status = match body.code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Unauthorized => StatusCode::FORBIDDEN,
        ErrorCode::AlreadyVoted => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(body))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    use futures::{SinkExt, StreamExt};

    let (viewer, mut outbox) = state.hub.register().await;
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(error) => {
                    warn!(%error, "failed to encode server event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        let msg = tokio::select! {
            // the hub dropped this viewer's outbox
            _ = &mut send_task => break,
            frame = receiver.next() => match frame {
                Some(Ok(msg)) => msg,
                _ => break,
            },
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientRequest>(&text) {
                Ok(request) => dispatch(&state, viewer, request).await,
                Err(error) => {
                    warn!(viewer, %error, "rejected websocket frame");
                    let rejection = ApiError::new(ErrorCode::Validation, "malformed request");
                    state
                        .hub
                        .send_to(viewer, ServerEvent::Error(rejection))
                        .await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.hub.disconnect(viewer).await;
    send_task.abort();
}

/// Runs one client request in its session's turn, so viewers receive the
/// lists in the order the changes were committed.
async fn dispatch(state: &AppState, viewer: ViewerId, request: ClientRequest) {
    let slug = request.slug().to_string();
    state
        .hub
        .in_turn(&slug, deliver(state, viewer, request))
        .await;
}

/// Broadcasts go to the room of the session; replies and rejections go to
/// the requesting viewer only.
async fn deliver(state: &AppState, viewer: ViewerId, request: ClientRequest) {
    match handle_request(state, viewer, request).await {
        Ok(dispatch) => {
            for event in &dispatch.broadcast {
                state.hub.publish(&dispatch.slug, event).await;
            }
            for event in dispatch.reply {
                state.hub.send_to(viewer, event).await;
            }
        }
        Err(err) if err.is_silent() => {
            debug!(viewer, error = %err, "request dropped");
        }
        Err(err) => {
            match &err {
                CoreError::Persistence(error) => {
                    error!(viewer, error = %format!("{error:#}"), "request failed")
                }
                _ => debug!(viewer, error = %err, "request rejected"),
            }
            state
                .hub
                .send_to(viewer, ServerEvent::Error(err.into()))
                .await;
        }
    }
}

async fn handle_request(
    state: &AppState,
    viewer: ViewerId,
    request: ClientRequest,
) -> Result<Dispatch, CoreError> {
    let api = &state.api;
    match request {
        ClientRequest::JoinSession { slug } => {
            let dispatch = join_session(api, &slug).await?;
            state.hub.join(viewer, &dispatch.slug).await;
            Ok(dispatch)
        }
        ClientRequest::NewQuestion {
            slug,
            text,
            visitor_id,
            nickname,
        } => submit_question(api, &slug, &text, &visitor_id, nickname.as_deref()).await,
        ClientRequest::Upvote {
            slug,
            question_id,
            visitor_id,
        } => upvote(api, &slug, question_id, &visitor_id).await,
        ClientRequest::FocusQuestion { slug, question_id } => {
            focus(api, &slug, question_id).await
        }
        ClientRequest::UnfocusQuestion { slug, question_id } => {
            unfocus(api, &slug, question_id).await
        }
        ClientRequest::AnswerQuestion { slug, question_id } => {
            answer(api, &slug, question_id).await
        }
        ClientRequest::HideQuestion { slug, question_id } => hide(api, &slug, question_id).await,
        ClientRequest::RestoreQuestion { slug, question_id } => {
            restore(api, &slug, question_id).await
        }
        ClientRequest::EditQuestion {
            slug,
            question_id,
            new_text,
            nickname,
        } => edit_question(api, &slug, question_id, &new_text, &nickname).await,
        ClientRequest::DeleteQuestion {
            slug,
            question_id,
            nickname,
        } => delete_question(api, &slug, question_id, nickname.as_deref()).await,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
