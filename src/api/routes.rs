use super::*;

const CHANNEL_CLOSED: &str = "Channel closed";

pub(super) async fn cast_spell(
    State(state): State<AppState>,
    Json(req): Json<CastRequest>,
) -> Json<ApiResponse<CastReport>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let command = HostCommand::Cast {
        source: req.source,
        origin: CastOrigin::Api,
        reply: Some(tx),
    };
    if state.sender.send(command).is_err() {
        return Json(ApiResponse::failure(CHANNEL_CLOSED));
    }
    match rx.await {
        Ok(Ok(report)) => Json(ApiResponse::success(report)),
        Ok(Err(e)) => Json(ApiResponse::failure(e)),
        Err(_) => Json(ApiResponse::failure(CHANNEL_CLOSED)),
    }
}

pub(super) async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<SessionStatus>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = state.sender.send(HostCommand::GetStatus(tx));
    match rx.await {
        Ok(status) => Json(ApiResponse::success(status)),
        Err(_) => Json(ApiResponse::failure(CHANNEL_CLOSED)),
    }
}

pub(super) async fn get_impacts(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ImpactRecord>>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = state.sender.send(HostCommand::GetImpacts(tx));
    match rx.await {
        Ok(impacts) => Json(ApiResponse::success(impacts)),
        Err(_) => Json(ApiResponse::failure(CHANNEL_CLOSED)),
    }
}

/// Records not yet sent on a stream that has seen everything up to
/// `last_frame`. Impacts of one frame are recorded together, so the frame
/// number is a complete cursor.
pub(super) fn unseen_impacts(impacts: &[ImpactRecord], last_frame: u64) -> &[ImpactRecord] {
    let start = impacts.partition_point(|record| record.frame <= last_frame);
    &impacts[start..]
}

pub(super) async fn stream_impacts(State(state): State<AppState>) -> impl IntoResponse {
    let sender = state.sender.clone();
    let stream = async_stream::stream! {
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(100));
        let mut last_frame = 0u64;
        loop {
            tick.tick().await;
            let (tx, rx) = tokio::sync::oneshot::channel();
            if sender.send(HostCommand::GetImpacts(tx)).is_err() {
                break;
            }
            let Ok(impacts) = rx.await else {
                break;
            };
            for record in unseen_impacts(&impacts, last_frame) {
                let payload = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
                yield Ok::<SseEvent, Infallible>(SseEvent::default().event("impact").data(payload));
            }
            if let Some(newest) = impacts.last() {
                last_frame = last_frame.max(newest.frame);
            }
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(5))
            .text("keep-alive"),
    )
}
