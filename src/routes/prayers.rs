//! Read-only REST view of the wall.
//!
//! `GET /api/prayers` renders the wall once for the session user: subscribe,
//! take the first snapshot, render, and let the subscription drop.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use tokio::time::{Duration, timeout};

use crate::routes::auth::AuthUser;
use crate::state::AppState;
use crate::wall::view::WallView;
use crate::wall::PrayerWall;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET /api/prayers`: the rendered wall for the signed-in user.
pub async fn list_prayers(State(state): State<AppState>, auth: AuthUser) -> Result<Json<WallView>, StatusCode> {
    let mut wall = state.new_wall();
    wall.sign_in(auth.identity).await;
    first_render(&mut wall).await.map(Json)
}

/// Wait for the first snapshot, then render. A failed subscription still
/// renders, carrying its status message.
pub(crate) async fn first_render(wall: &mut PrayerWall) -> Result<WallView, StatusCode> {
    if wall.is_subscribed() {
        match timeout(SNAPSHOT_TIMEOUT, wall.poll_feed()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("prayers: first snapshot timed out");
                return Err(StatusCode::GATEWAY_TIMEOUT);
            }
        }
    }
    Ok(wall.render())
}

#[cfg(test)]
#[path = "prayers_test.rs"]
mod tests;
