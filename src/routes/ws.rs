//! WebSocket handler: one live prayer wall per connection.
//!
//! DESIGN
//! ======
//! On upgrade, the connection gets its own `PrayerWall` and enters a
//! `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Ledger snapshots → re-render and push `wall:render`
//!
//! Handler functions call into the wall and return an `Outcome`. The
//! dispatch layer turns outcomes into reply frames, so tests can drive the
//! protocol without a socket.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (optional `ticket` signs in) → send `session:connected`
//! 2. Push the first `wall:render`; every snapshot pushes another
//! 3. Client sends frames → dispatch → reply
//! 4. Close → the wall drops, tearing down its ledger subscription

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame};
use crate::state::AppState;
use crate::wall::model::{Identity, RequestDraft};
use crate::wall::{DeleteOutcome, FeedEvent, PrayerWall};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. Handlers never send frames directly.
enum Outcome {
    /// Send done+data to sender.
    Reply(Data),
    /// Send empty done to sender.
    Done,
    /// Reply, then push a fresh `wall:render`.
    ReplyAndRender(Data),
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    // No ticket is fine: the wall starts signed out.
    let identity = match params.get("ticket") {
        None => None,
        Some(ticket) => match state.directory.identify(ticket).await {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
            Err(e) => {
                tracing::error!(error = %e, "ws ticket validation failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
            }
        },
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, identity))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let client_id = Uuid::new_v4();
    let mut wall = state.new_wall();
    if let Some(identity) = identity {
        wall.sign_in(identity).await;
    }

    let welcome = Frame::request("session:connected", Data::new())
        .with_data("client_id", client_id.to_string())
        .with_data("user", identity_json(wall.identity()));
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }
    if send_frame(&mut socket, &render_frame(&wall)).await.is_err() {
        return;
    }

    info!(%client_id, signed_in = wall.identity().is_some(), "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let frames = process_inbound_text(&state, &mut wall, client_id, &text).await;
                        for frame in frames {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = wall.poll_feed() => {
                if send_frames(&mut socket, &feed_frames(&wall, event)).await.is_err() {
                    break;
                }
                if event == FeedEvent::Ended {
                    wall.resubscribe().await;
                }
            }
        }
    }

    if wall.sign_out() {
        info!(%client_id, "ws: subscription released");
    }
    info!(%client_id, "ws: client disconnected");
}

/// Frames pushed after a feed event.
fn feed_frames(wall: &PrayerWall, event: FeedEvent) -> Vec<Frame> {
    match event {
        FeedEvent::Snapshot => vec![render_frame(wall)],
        FeedEvent::Failed | FeedEvent::Ended => {
            let view = wall.render();
            let message = view.message.clone().unwrap_or_default();
            vec![Frame::push("wall:status", Data::new()).with_data("message", message), render_frame(wall)]
        }
    }
}

fn render_frame(wall: &PrayerWall) -> Frame {
    Frame::push("wall:render", Data::new()).with_data("view", serde_json::to_value(wall.render()).unwrap_or_default())
}

fn identity_json(identity: Option<&Identity>) -> serde_json::Value {
    serde_json::to_value(identity).unwrap_or_default()
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
async fn process_inbound_text(state: &AppState, wall: &mut PrayerWall, client_id: Uuid, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Stamp the signed-in identity as `from`; clients cannot choose it.
    req.from = wall.identity().map(|i| i.uid.to_string());
    info!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match req.prefix() {
        "session" => handle_session(state, wall, &req).await,
        "wall" => handle_wall(wall, &req),
        "prayer" => handle_prayer(wall, &req).await,
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::ReplyAndRender(data)) => vec![req.done_with(data), render_frame(wall)],
        Err(err_frame) => {
            warn!(%client_id, syscall = %req.syscall, error = %err_frame.str_field("message"), "ws: request failed");
            vec![err_frame]
        }
    }
}

fn view_data(wall: &PrayerWall) -> Data {
    let mut data = Data::new();
    data.insert("view".into(), serde_json::to_value(wall.render()).unwrap_or_default());
    data
}

fn required_id(req: &Frame) -> Result<Uuid, Frame> {
    req.uuid_field("id").ok_or_else(|| req.error("id required"))
}

// =============================================================================
// SESSION HANDLERS
// =============================================================================

async fn handle_session(state: &AppState, wall: &mut PrayerWall, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "sign_in" => {
            let ticket = req.str_field("ticket");
            if ticket.is_empty() {
                return Err(req.error("ticket required"));
            }
            let identity = match state.directory.identify(ticket).await {
                Ok(Some(identity)) => identity,
                Ok(None) => return Err(req.error("invalid or expired ticket")),
                Err(e) => return Err(req.error_from(&e)),
            };
            wall.sign_in(identity).await;

            let mut data = Data::new();
            data.insert("user".into(), identity_json(wall.identity()));
            data.insert("can_delete".into(), serde_json::json!(wall.capability().can_delete));
            Ok(Outcome::ReplyAndRender(data))
        }
        "sign_out" => {
            wall.sign_out();
            Ok(Outcome::ReplyAndRender(Data::new()))
        }
        op => Err(req.error(format!("unknown session op: {op}"))),
    }
}

// =============================================================================
// WALL HANDLERS
// =============================================================================

fn handle_wall(wall: &mut PrayerWall, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "render" => Ok(Outcome::Reply(view_data(wall))),
        "toggle" => {
            let id = required_id(req)?;
            wall.toggle(id).map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Reply(view_data(wall)))
        }
        op => Err(req.error(format!("unknown wall op: {op}"))),
    }
}

// =============================================================================
// PRAYER HANDLERS
// =============================================================================

async fn handle_prayer(wall: &mut PrayerWall, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "pray" => {
            let id = required_id(req)?;
            wall.pray(id).await.map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Done)
        }
        "delete" => {
            let id = required_id(req)?;
            let prompt = wall.request_delete(id).map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("id".into(), serde_json::json!(prompt.id));
            data.insert("confirm".into(), serde_json::json!(prompt.confirm));
            Ok(Outcome::Reply(data))
        }
        "delete:confirm" => {
            let id = required_id(req)?;
            let accepted = req
                .data
                .get("accepted")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            let outcome = wall
                .confirm_delete(id, accepted)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = Data::new();
            data.insert("deleted".into(), serde_json::json!(outcome == DeleteOutcome::Deleted));
            data.insert("outcome".into(), serde_json::to_value(outcome).unwrap_or_default());
            Ok(Outcome::Reply(data))
        }
        "submit" => {
            let draft = RequestDraft {
                name: req.str_field("name").to_owned(),
                title: req.str_field("title").to_owned(),
                body: req.str_field("body").to_owned(),
            };
            let id = wall.submit(draft).await.map_err(|e| req.error_from(&e))?;
            let mut data = view_data(wall);
            data.insert("id".into(), serde_json::json!(id));
            Ok(Outcome::Reply(data))
        }
        op => Err(req.error(format!("unknown prayer op: {op}"))),
    }
}

// =============================================================================
// SEND HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, syscall = %frame.syscall, "ws: frame serialization failed");
            return Ok(());
        }
    };
    // Pushes repeat on every snapshot; only log replies.
    if frame.status.is_terminal() {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await
}

async fn send_frames(socket: &mut WebSocket, frames: &[Frame]) -> Result<(), axum::Error> {
    for frame in frames {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
