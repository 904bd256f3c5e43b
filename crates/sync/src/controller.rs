use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use natter_services::{
    BoxFuture, ClassificationService, HistoryService, InboundMessage, InboundReceiver,
    NotificationSink, PeerId, PersistenceService, RealtimeTransport, ServiceResult, SessionStore,
    TopicPrediction,
};
use snafu::{OptionExt, ResultExt};
use tokio::sync::mpsc;

use crate::error::{
    ControllerClosedSnafu, MissingSessionSnafu, NoActivePeerSnafu, ReadSessionSnafu, SyncResult,
    TransportSnafu,
};
use crate::events::ViewEvent;
use crate::history::history_operation;
use crate::ingest;
use crate::message::{Message, MessageId, Peer, Session};
use crate::poller::{ClassifiedCycle, PollCycleId, PollState, PollerConfig, TickOutcome, TopicPoller};
use crate::scheduler::{ArmedTimer, Scheduler, TimerId};
use crate::transcript::{HistoryApply, HistoryGeneration, Transcript};

/// In-flight work; resolves to `None` when it was cancelled.
pub(crate) type PendingOperation = BoxFuture<'static, Option<Completion>>;

/// External services the controller is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub session_store: Arc<dyn SessionStore>,
    pub history: Arc<dyn HistoryService>,
    pub persistence: Arc<dyn PersistenceService>,
    pub transport: Arc<dyn RealtimeTransport>,
    pub classifier: Arc<dyn ClassificationService>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// Result of one suspended operation, applied on its own turn.
#[derive(Debug)]
pub enum Completion {
    HistoryLoaded {
        generation: HistoryGeneration,
        peer_id: PeerId,
        result: SyncResult<Vec<Message>>,
    },
    Persisted {
        message_id: MessageId,
        result: SyncResult<()>,
    },
    TimerFired(TimerId),
    Classified {
        cycle: PollCycleId,
        result: ServiceResult<Vec<TopicPrediction>>,
    },
}

/// Requests from the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectPeer(Peer),
    Send(String),
    TogglePolling,
    StopPolling,
    RefreshSession,
    Reconfigure(PollerConfig),
    Shutdown,
}

/// Cloneable sender side for a controller running under [`TranscriptController::run`].
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { commands }, receiver)
    }

    pub fn select_peer(&self, peer: Peer) -> SyncResult<()> {
        self.dispatch(Command::SelectPeer(peer), "handle-select-peer")
    }

    pub fn send_text(&self, text: impl Into<String>) -> SyncResult<()> {
        self.dispatch(Command::Send(text.into()), "handle-send-text")
    }

    pub fn toggle_polling(&self) -> SyncResult<()> {
        self.dispatch(Command::TogglePolling, "handle-toggle-polling")
    }

    pub fn stop_polling(&self) -> SyncResult<()> {
        self.dispatch(Command::StopPolling, "handle-stop-polling")
    }

    pub fn refresh_session(&self) -> SyncResult<()> {
        self.dispatch(Command::RefreshSession, "handle-refresh-session")
    }

    pub fn reconfigure(&self, config: PollerConfig) -> SyncResult<()> {
        self.dispatch(Command::Reconfigure(config), "handle-reconfigure")
    }

    pub fn shutdown(&self) -> SyncResult<()> {
        self.dispatch(Command::Shutdown, "handle-shutdown")
    }

    fn dispatch(&self, command: Command, stage: &'static str) -> SyncResult<()> {
        if self.commands.send(command).is_err() {
            return ControllerClosedSnafu { stage }.fail();
        }
        Ok(())
    }
}

/// Owns the transcript for the selected peer and the topic poller.
///
/// Every method runs to completion without awaiting. Network calls and timer delays are
/// queued as pending operations; their completions come back through
/// [`Self::handle_completion`], one per turn, so there is never more than one writer.
pub struct TranscriptController {
    session: Session,
    peer: Option<Peer>,
    transcript: Transcript,
    history_failed: bool,
    poller: TopicPoller,
    collaborators: Collaborators,
    pending: FuturesUnordered<PendingOperation>,
    view_tx: mpsc::UnboundedSender<ViewEvent>,
    inbound: Option<InboundReceiver>,
}

impl TranscriptController {
    /// Fails with `MissingSession` when nobody is signed in.
    pub fn new(
        collaborators: Collaborators,
        scheduler: Arc<dyn Scheduler>,
        config: PollerConfig,
    ) -> SyncResult<(Self, mpsc::UnboundedReceiver<ViewEvent>)> {
        let session = read_session(collaborators.session_store.as_ref(), "construct-controller")?;
        let inbound = collaborators
            .transport
            .subscribe()
            .context(TransportSnafu {
                stage: "subscribe-inbound",
            })?;
        let (view_tx, view_rx) = mpsc::unbounded_channel();

        tracing::info!(user_id = %session.user_id, "transcript controller ready");

        Ok((
            Self {
                session,
                peer: None,
                transcript: Transcript::new(),
                history_failed: false,
                poller: TopicPoller::new(config, scheduler),
                collaborators,
                pending: FuturesUnordered::new(),
                view_tx,
                inbound: Some(inbound),
            },
            view_rx,
        ))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn poll_state(&self) -> PollState {
        self.poller.state()
    }

    pub fn pending_operations(&self) -> usize {
        self.pending.len()
    }

    /// Re-reads the session store. On failure the previous session stays in place.
    ///
    /// A different user starts a new conversation with the selected peer: polling stops
    /// and the peer's history is fetched again for the new user.
    pub fn refresh_session(&mut self) -> SyncResult<&Session> {
        let session = read_session(self.collaborators.session_store.as_ref(), "refresh-session")?;
        if session.user_id == self.session.user_id {
            self.session = session;
            return Ok(&self.session);
        }

        tracing::info!(
            previous = %self.session.user_id,
            current = %session.user_id,
            "session user changed"
        );
        self.session = session;
        self.stop_polling();
        if let Some(peer) = self.peer.take() {
            self.load_conversation(peer);
        }
        Ok(&self.session)
    }

    /// Selecting the current peer again only refetches after a failed history load.
    pub fn select_peer(&mut self, peer: Peer) {
        if self
            .peer
            .as_ref()
            .is_some_and(|active| active.peer_id == peer.peer_id)
            && !self.history_failed
        {
            tracing::debug!(peer_id = %peer.peer_id, "peer already selected");
            return;
        }

        // Nothing scheduled for the previous peer may run against the new transcript.
        self.stop_polling();
        self.load_conversation(peer);
    }

    fn load_conversation(&mut self, peer: Peer) {
        let generation = self.transcript.reset_for_peer();
        self.history_failed = false;
        tracing::info!(peer_id = %peer.peer_id, ?generation, "loading conversation history");

        self.pending.push(history_operation(
            Arc::clone(&self.collaborators.history),
            self.session.clone(),
            peer.clone(),
            generation,
        ));
        self.emit(ViewEvent::HistoryLoading {
            peer_id: peer.peer_id.clone(),
        });
        self.peer = Some(peer);
    }

    /// Echoes the message locally, then publishes it to the socket and the persistence
    /// service. Delivery failures keep the echo and surface as `DeliveryFailed`.
    pub fn send_local(&mut self, text: impl Into<String>) -> SyncResult<MessageId> {
        let peer = self.peer.as_ref().context(NoActivePeerSnafu {
            stage: "send-local",
        })?;
        let outbound = ingest::outbound_message(&self.session, peer, text.into())?;
        let message_id = self.append(Message::local(outbound.text.clone()));

        if let Err(error) = ingest::publish(self.collaborators.transport.as_ref(), outbound.clone())
        {
            tracing::warn!(%message_id, error = %error, "live delivery failed; keeping local echo");
            self.emit(ViewEvent::DeliveryFailed {
                message_id,
                error: error.to_string(),
            });
        }

        self.pending.push(ingest::persist_operation(
            Arc::clone(&self.collaborators.persistence),
            message_id,
            outbound,
        ));

        Ok(message_id)
    }

    /// Returns `None` when no peer is selected and the message was dropped.
    pub fn receive_remote(&mut self, text: impl Into<String>) -> Option<MessageId> {
        let Some(peer) = &self.peer else {
            tracing::warn!("dropping inbound message received with no peer selected");
            return None;
        };
        tracing::debug!(
            peer_id = %peer.peer_id,
            history_loading = self.transcript.is_loading(),
            "inbound message"
        );
        Some(self.append(Message::peer(text)))
    }

    pub fn toggle_polling(&mut self) -> PollState {
        if let Some(armed) = self.poller.toggle() {
            self.schedule_tick(armed);
        }
        let state = self.poller.state();
        self.emit(ViewEvent::PollingChanged {
            running: state.running,
        });
        state
    }

    pub fn stop_polling(&mut self) {
        let was_running = self.poller.is_running();
        self.poller.stop();
        if was_running {
            self.emit(ViewEvent::PollingChanged { running: false });
        }
    }

    pub fn reconfigure_poller(&mut self, config: PollerConfig) {
        tracing::info!(
            interval_ms = config.interval.as_millis() as u64,
            sample_size = config.sample_size,
            "topic poller reconfigured"
        );
        self.poller.reconfigure(config);
    }

    /// Stops polling and drops every in-flight operation.
    pub fn teardown(&mut self) {
        self.stop_polling();
        let dropped = self.pending.len();
        self.pending = FuturesUnordered::new();
        tracing::info!(dropped_operations = dropped, "transcript controller torn down");
    }

    /// Waits for the next live completion; cancelled operations are skipped.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        while let Some(outcome) = self.pending.next().await {
            if let Some(completion) = outcome {
                return Some(completion);
            }
        }
        None
    }

    pub fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::HistoryLoaded {
                generation,
                peer_id,
                result,
            } => {
                // Failures are logged and reported to the view inside.
                let _ = self.apply_history(generation, peer_id, result);
            }
            Completion::Persisted { message_id, result } => {
                self.handle_persisted(message_id, result)
            }
            Completion::TimerFired(timer) => self.handle_tick(timer),
            Completion::Classified { cycle, result } => self.handle_classified(cycle, result),
        }
    }

    /// Applies a history response. On failure the transcript is left exactly as it was.
    pub fn apply_history(
        &mut self,
        generation: HistoryGeneration,
        peer_id: PeerId,
        result: SyncResult<Vec<Message>>,
    ) -> SyncResult<HistoryApply> {
        if generation != self.transcript.generation() {
            tracing::debug!(
                peer_id = %peer_id,
                ?generation,
                "dropping history for a previous peer selection"
            );
            return Ok(HistoryApply::Stale);
        }

        match result {
            Ok(history) => {
                let applied = self.transcript.apply_history(generation, history);
                if let HistoryApply::Replaced {
                    history_len,
                    live_preserved,
                } = applied
                {
                    tracing::info!(peer_id = %peer_id, history_len, live_preserved, "history loaded");
                    self.emit(ViewEvent::TranscriptReplaced {
                        peer_id,
                        messages: self.transcript.messages().to_vec(),
                    });
                    self.emit(ViewEvent::ScrollToLatest);
                }
                Ok(applied)
            }
            Err(error) => {
                self.transcript.abandon_history(generation);
                self.history_failed = true;
                tracing::error!(peer_id = %peer_id, error = %error, "failed to load history");
                self.emit(ViewEvent::HistoryFailed {
                    peer_id,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Event loop: commands, inbound messages and completions, one at a time.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut inbound = self.inbound.take();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                message = recv_inbound(&mut inbound) => match message {
                    Some(message) => {
                        self.receive_remote(message.text);
                    }
                    None => {
                        tracing::warn!("inbound transport closed; continuing without live messages");
                        inbound = None;
                    }
                },
                Some(outcome) = self.pending.next(), if !self.pending.is_empty() => {
                    if let Some(completion) = outcome {
                        self.handle_completion(completion);
                    }
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SelectPeer(peer) => self.select_peer(peer),
            Command::Send(text) => {
                if let Err(error) = self.send_local(text) {
                    tracing::warn!(error = %error, "message not sent");
                }
            }
            Command::TogglePolling => {
                self.toggle_polling();
            }
            Command::StopPolling => self.stop_polling(),
            Command::RefreshSession => {
                if let Err(error) = self.refresh_session() {
                    tracing::warn!(error = %error, "session refresh failed; keeping previous session");
                }
            }
            Command::Reconfigure(config) => self.reconfigure_poller(config),
            Command::Shutdown => self.teardown(),
        }
    }

    fn handle_persisted(&mut self, message_id: MessageId, result: SyncResult<()>) {
        match result {
            Ok(()) => tracing::debug!(%message_id, "message persisted"),
            Err(error) => {
                tracing::warn!(%message_id, error = %error, "failed to persist message");
                self.emit(ViewEvent::DeliveryFailed {
                    message_id,
                    error: error.to_string(),
                });
            }
        }
    }

    fn handle_tick(&mut self, timer: TimerId) {
        match self.poller.on_timer_fired(timer, &self.transcript) {
            TickOutcome::Stale => {}
            TickOutcome::EmptySample => self.emit(ViewEvent::PollingChanged { running: false }),
            TickOutcome::Sample { cycle, samples } => {
                let classifier = Arc::clone(&self.collaborators.classifier);
                self.pending.push(Box::pin(async move {
                    let result = classifier.classify(&samples).await;
                    Some(Completion::Classified { cycle, result })
                }));
            }
        }
    }

    fn handle_classified(
        &mut self,
        cycle: PollCycleId,
        result: ServiceResult<Vec<TopicPrediction>>,
    ) {
        let Some(ClassifiedCycle { topics, next }) = self.poller.on_classified(cycle, result)
        else {
            return;
        };

        tracing::info!(?cycle, topic_count = topics.len(), "poll cycle finished");
        for topic in &topics {
            self.collaborators.notifier.notify(topic.as_str());
        }
        self.schedule_tick(next);
    }

    fn schedule_tick(&mut self, armed: ArmedTimer) {
        let ArmedTimer { id, delay } = armed;
        self.pending.push(Box::pin(async move {
            delay.await.ok().map(|()| Completion::TimerFired(id))
        }));
    }

    fn append(&mut self, message: Message) -> MessageId {
        let id = self.transcript.append(message.clone());
        self.emit(ViewEvent::MessageAppended { message });
        self.emit(ViewEvent::ScrollToLatest);
        id
    }

    fn emit(&self, event: ViewEvent) {
        // The view may be gone already; the controller keeps its own state regardless.
        let _ = self.view_tx.send(event);
    }
}

fn read_session(store: &dyn SessionStore, stage: &'static str) -> SyncResult<Session> {
    let record = store.get().context(ReadSessionSnafu { stage })?;
    record
        .map(Session::from)
        .context(MissingSessionSnafu { stage })
}

async fn recv_inbound(inbound: &mut Option<InboundReceiver>) -> Option<InboundMessage> {
    match inbound {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
