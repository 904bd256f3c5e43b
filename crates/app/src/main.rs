use std::process::ExitCode;
use std::sync::Arc;

use natter_services::{
    FileSessionStore, HttpChatApi, HttpTopicClassifier, ServiceError, SessionStore,
    WebSocketTransport,
};
use natter_sync::{
    Collaborators, ControllerHandle, SyncError, TokioScheduler, TranscriptController,
};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};

mod console;
mod settings;

use console::{ConsoleCommand, ConsoleNotifier, ConsoleView, parse_line};
use settings::SettingsStore;

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("failed to read session on `{stage}`: {source}"))]
    Session {
        stage: &'static str,
        source: ServiceError,
    },
    #[snafu(display("nobody is signed in on `{stage}`; write a session file first"))]
    SignedOut { stage: &'static str },
    #[snafu(display("failed to open realtime socket on `{stage}`: {source}"))]
    Connect {
        stage: &'static str,
        source: ServiceError,
    },
    #[snafu(display("transcript controller failed on `{stage}`: {source}"))]
    Controller {
        stage: &'static str,
        source: SyncError,
    },
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "natter exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let settings_store = SettingsStore::load();
    let settings = settings_store.settings();
    tracing::info!(path = ?settings_store.config_path(), "settings loaded");

    let session_store = Arc::new(FileSessionStore::new(settings.session_file.clone()));
    let session = session_store
        .get()
        .context(SessionSnafu {
            stage: "read-startup-session",
        })?
        .context(SignedOutSnafu {
            stage: "read-startup-session",
        })?;

    let connection = WebSocketTransport::connect(&settings.socket_url, &session.user_id)
        .await
        .context(ConnectSnafu {
            stage: "connect-realtime",
        })?;
    let socket_worker = tokio::spawn(connection.worker);

    let chat_api = Arc::new(HttpChatApi::new(settings.api_base_url.clone()));
    let collaborators = Collaborators {
        session_store,
        history: chat_api.clone(),
        persistence: chat_api,
        transport: Arc::new(connection.transport),
        classifier: Arc::new(HttpTopicClassifier::new(settings.classifier_url.clone())),
        notifier: Arc::new(ConsoleNotifier),
    };

    let (controller, mut views) = TranscriptController::new(
        collaborators,
        Arc::new(TokioScheduler),
        settings.poller.to_poller_config(),
    )
    .context(ControllerSnafu {
        stage: "construct-controller",
    })?;
    let (handle, commands) = ControllerHandle::channel();
    let controller_task = tokio::spawn(controller.run(commands));

    let renderer = tokio::spawn(async move {
        let mut view = ConsoleView::default();
        while let Some(event) = views.recv().await {
            for line in view.render(&event) {
                println!("{line}");
            }
        }
    });

    println!("signed in as {}. /peer <id> to start a conversation.", session.user_id);

    let input = read_commands(&handle, &settings_store).await;

    if let Err(error) = handle.shutdown() {
        tracing::debug!(error = %error, "controller already stopped");
    }
    if let Err(error) = controller_task.await {
        tracing::warn!(error = %error, "controller task ended abnormally");
    }
    if let Err(error) = renderer.await {
        tracing::warn!(error = %error, "renderer task ended abnormally");
    }
    socket_worker.abort();

    input
}

async fn read_commands(
    handle: &ControllerHandle,
    settings_store: &SettingsStore,
) -> Result<(), AppError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
        stage: "read-stdin-line",
    })? {
        let dispatched = match parse_line(&line) {
            ConsoleCommand::Empty => Ok(()),
            ConsoleCommand::Invalid(usage) => {
                println!("{usage}");
                Ok(())
            }
            ConsoleCommand::Quit => break,
            ConsoleCommand::SelectPeer(peer) => handle.select_peer(peer),
            ConsoleCommand::ToggleTopics => handle.toggle_polling(),
            ConsoleCommand::StopTopics => handle.stop_polling(),
            ConsoleCommand::RefreshSession => handle.refresh_session(),
            ConsoleCommand::ReloadSettings => {
                let settings = settings_store.reload();
                handle.reconfigure(settings.poller.to_poller_config())
            }
            ConsoleCommand::Send(text) => handle.send_text(text),
        };
        dispatched.context(ControllerSnafu {
            stage: "dispatch-command",
        })?;
    }

    Ok(())
}
