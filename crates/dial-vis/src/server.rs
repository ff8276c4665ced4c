//! Axum web server streaming render frames to browser views.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dial_model::MessageId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::bus::VisEvent;
use crate::controller::{Control, ControllerHandle};
use crate::error::Result;
use crate::reconciler::ReconcilerStatus;

/// Shared application state.
struct AppState {
    controller: ControllerHandle,
}

/// Visualization server.
pub struct VisServer {
    state: Arc<AppState>,
    static_dir: Option<PathBuf>,
}

impl VisServer {
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            state: Arc::new(AppState { controller }),
            static_dir: None,
        }
    }

    /// Serve a browser front-end from `dir` for every non-API path.
    #[must_use]
    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Build the router for the server.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/api/status", get(status_handler))
            .route("/api/control", post(control_handler))
            .route("/api/playback/{action}", post(playback_handler))
            .route("/api/playback/speed", post(speed_handler))
            .route("/api/reorder", post(reorder_handler))
            .route("/ws", get(ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone());

        match &self.static_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        }
    }

    /// Run the server on the given address.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Visualization server running on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<ReconcilerStatus> {
    Json(state.controller.status())
}

async fn dispatch(state: &AppState, control: Control) -> impl IntoResponse {
    match state.controller.send(control).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(state.controller.status())).into_response(),
        Err(error) => (StatusCode::SERVICE_UNAVAILABLE, error.to_string()).into_response(),
    }
}

async fn control_handler(
    State(state): State<Arc<AppState>>,
    Json(control): Json<Control>,
) -> impl IntoResponse {
    dispatch(&state, control).await
}

/// Map a `/api/playback/{action}` path segment to a control.
fn playback_control(action: &str) -> Option<Control> {
    let control = match action {
        "play" => Control::Play,
        "pause" => Control::Pause,
        "toggle" => Control::TogglePlay,
        "next" => Control::Next,
        "prev" => Control::Prev,
        "step-forward" => Control::StepForward,
        "step-backward" => Control::StepBackward,
        "fast-forward" => Control::FastForward,
        "fast-backward" => Control::FastBackward,
        "reset" => Control::Reset,
        "jump-to-start" => Control::JumpToStart,
        "jump-to-end" => Control::JumpToEnd,
        "scrub-start" => Control::ScrubStart,
        "scrub-stop" => Control::ScrubStop,
        _ => return None,
    };
    Some(control)
}

async fn playback_handler(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Response {
    match playback_control(&action) {
        Some(control) => dispatch(&state, control).await.into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown playback action {action:?}")).into_response(),
    }
}

#[derive(Deserialize)]
struct SpeedRequest {
    speed: f64,
}

async fn speed_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeedRequest>,
) -> impl IntoResponse {
    dispatch(&state, Control::SetSpeed { speed: req.speed }).await
}

#[derive(Deserialize)]
struct ReorderRequest {
    order: Vec<MessageId>,
}

async fn reorder_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReorderRequest>,
) -> impl IntoResponse {
    dispatch(&state, Control::Reorder { order: req.order }).await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsGreeting {
    Status(ReconcilerStatus),
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.controller.subscribe();

    let greeting = WsGreeting::Status(state.controller.status());
    if let Ok(json) = serde_json::to_string(&greeting) {
        if socket.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }
    // Make the controller render once so the new view gets a full frame.
    if state.controller.send(Control::Refresh).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_event(&mut socket, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "websocket client lagging"),
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Control>(&text) {
                    Ok(control) => {
                        if state.controller.send(control).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => warn!(%error, "ignoring malformed control"),
                },
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("websocket closed");
}

async fn send_event(socket: &mut WebSocket, event: &VisEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(error) => {
            warn!(%error, "could not encode event");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisConfig;
    use crate::controller::Controller;
    use dial_client::testing::MockSimulator;

    fn server() -> VisServer {
        let (_controller, handle) =
            Controller::new(MockSimulator::default(), VisConfig::default()).unwrap();
        VisServer::new(handle)
    }

    #[tokio::test]
    async fn router_builds() {
        let _router = server().router();
        let _router = server().with_static_dir(Some("web".into())).router();
    }

    #[test]
    fn playback_actions_map_to_controls() {
        assert_eq!(playback_control("play"), Some(Control::Play));
        assert_eq!(playback_control("fast-backward"), Some(Control::FastBackward));
        assert_eq!(playback_control("jump-to-end"), Some(Control::JumpToEnd));
        assert_eq!(playback_control("rewind"), None);
    }
}
