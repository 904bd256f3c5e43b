use natter_services::ServiceError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SyncError {
    #[snafu(display("no signed-in session is available on `{stage}`"))]
    MissingSession { stage: &'static str },
    #[snafu(display("failed to read session on `{stage}`: {source}"))]
    ReadSession {
        stage: &'static str,
        source: ServiceError,
    },
    #[snafu(display("outbound transport failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: ServiceError,
    },
    #[snafu(display("fetch failed on `{stage}`: {source}"))]
    Fetch {
        stage: &'static str,
        source: ServiceError,
    },
    #[snafu(display("no peer is selected on `{stage}`"))]
    NoActivePeer { stage: &'static str },
    #[snafu(display("refusing to send an empty message on `{stage}`"))]
    EmptyMessage { stage: &'static str },
    #[snafu(display("transcript controller has shut down on `{stage}`"))]
    ControllerClosed { stage: &'static str },
}

pub type SyncResult<T> = Result<T, SyncError>;
