use super::*;

pub(super) fn build_router(state: AppState, security: ApiSecurity) -> Router {
    Router::new()
        .route("/cast", post(cast_spell))
        .route("/status", get(get_status))
        .route("/impacts", get(get_impacts))
        .route("/impacts/stream", get(stream_impacts))
        .with_state(state)
        .layer(middleware::from_fn_with_state(security, api_guard))
}
