use serde::Serialize;

use remindr_infra::jobs::QueueState;

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatusResponse {
    #[serde(flatten)]
    pub queue: QueueState,
    /// Whether a run currently holds the overlap guard.
    pub running: bool,
}
