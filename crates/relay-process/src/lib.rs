/// Stream identifier assigned by the controller.
///
/// NOTE: The agent never generates these. One stream id maps to at most one
/// live transcoding process on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub i64);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StreamState {
    Idle,
    Running,
}

/// Status reported back to the controller's callback endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallbackStatus {
    Live,
    Error,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StreamReport {
    pub stream_id: StreamId,
    pub state: StreamState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}
