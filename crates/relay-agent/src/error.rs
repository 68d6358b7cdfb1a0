use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use relay_process::StreamId;

#[derive(Debug, serde::Serialize)]
pub struct ErrorBody {
    pub message: String,
}

pub fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("stream {stream_id} is already running (pid {pid})")]
    AlreadyRunning { stream_id: StreamId, pid: u32 },

    #[error("failed to launch process: {0}")]
    Launch(#[source] std::io::Error),

    #[error("failed to signal process {pid}: {source}")]
    Termination { pid: u32, source: std::io::Error },
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let code = match &self {
            AgentError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            AgentError::Launch(_) | AgentError::Termination { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        json_error(code, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let resp = AgentError::AlreadyRunning {
            stream_id: StreamId(4),
            pid: 99,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn launch_failure_maps_to_500() {
        let resp = AgentError::Launch(std::io::Error::other("boom")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
