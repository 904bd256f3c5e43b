use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ServiceError {
    #[snafu(display("http request failed on `{stage}`: {source}"))]
    HttpRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("{endpoint} returned status {status}: {body}"))]
    HttpStatus {
        stage: &'static str,
        endpoint: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode response body on `{stage}`: {source}"))]
    DecodeBody {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("websocket failure on `{stage}`: {source}"))]
    WebSocket {
        stage: &'static str,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("failed to encode socket frame on `{stage}`: {source}"))]
    EncodeFrame {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("realtime transport is closed on `{stage}`"))]
    TransportClosed { stage: &'static str },
    #[snafu(display("inbound messages were already subscribed on `{stage}`"))]
    AlreadySubscribed { stage: &'static str },
    #[snafu(display("failed to read session file {path:?} on `{stage}`: {source}"))]
    ReadSession {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse session file {path:?} on `{stage}`: {source}"))]
    ParseSession {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type ServiceResult<T> = Result<T, ServiceError>;
