//! Subscription advertisement read by the sidecar at startup

use crate::server::AppState;
use axum::{extract::State, response::Json};
use tasklane_messaging::{subscription_table, Subscription};

pub async fn list_subscriptions(State(state): State<AppState>) -> Json<Vec<Subscription>> {
    Json(subscription_table(&state.config.pubsub_component))
}
