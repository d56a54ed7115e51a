//! Chat view model.
//!
//! Composes the session binding and a conversation channel into the state a
//! presentation layer renders: the latest messages, the pending error and the
//! draft. State is published through a `watch` channel; every transition is
//! applied by the single owner of the view model, either directly through
//! `&mut self` or by the dispatch loop started with [`ChatViewModel::spawn`].

use crate::channel::ConversationChannel;
use crate::error::{ChatClosed, ChatError};
use crate::message::{Message, MessageBody};
use crate::store::Snapshot;
use parley_core::{MessageId, PrincipalId};
use parley_session::{SessionManager, SessionWatch};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Observable chat state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    /// The principal the state belongs to.
    pub principal: Option<PrincipalId>,
    /// Latest conversation snapshot; empty until the first one arrives.
    pub messages: Vec<Message>,
    /// Last send or subscription error.
    pub pending_error: Option<ChatError>,
    /// Text typed but not yet sent.
    pub draft: String,
}

/// Who wrote a message, from the viewer's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    /// The signed-in principal.
    You,
    /// Anyone else, normally the counterpart.
    Counterpart,
}

/// A message prepared for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatEntry<'a> {
    /// Who wrote it.
    pub author: Author,
    /// The message.
    pub message: &'a Message,
}

impl ChatState {
    /// Returns the messages tagged with their author.
    pub fn entries(&self) -> impl Iterator<Item = ChatEntry<'_>> {
        self.messages.iter().map(|message| {
            let own = self
                .principal
                .as_ref()
                .is_some_and(|principal| message.is_from(principal));
            ChatEntry {
                author: if own { Author::You } else { Author::Counterpart },
                message,
            }
        })
    }
}

/// Commands accepted by a running view model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Replace the draft.
    SetDraft(String),
    /// Send the draft.
    Send,
    /// Reopen the subscription after a failure.
    Reopen,
}

/// View model for the chat with the counterpart.
pub struct ChatViewModel {
    session: SessionWatch,
    session_live: bool,
    channel: ConversationChannel,
    state: watch::Sender<ChatState>,
}

impl ChatViewModel {
    /// Creates a view model following `session`.
    ///
    /// Call [`ChatViewModel::sync_session`] (or [`ChatViewModel::spawn`]) to
    /// bind to the current principal.
    #[must_use]
    pub fn new(session: &SessionManager, channel: ConversationChannel) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            session: session.subscribe(),
            session_live: true,
            channel,
            state,
        }
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn current(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Replaces the draft.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.draft = text);
    }

    /// Binds to the session's current principal.
    pub async fn sync_session(&mut self) {
        let principal = if self.session_live {
            self.session.borrow_and_update().clone()
        } else {
            None
        };
        self.apply_principal(principal).await;
    }

    /// The bound principal; nobody once the session binding has closed.
    fn principal(&self) -> Option<PrincipalId> {
        if self.session_live {
            self.session.borrow().clone()
        } else {
            None
        }
    }

    /// Sends the draft.
    ///
    /// Errors are stored in `pending_error` rather than returned. The draft is
    /// cleared only once the store has accepted the message.
    pub async fn send(&mut self) -> Option<MessageId> {
        self.state.send_modify(|state| state.pending_error = None);

        let draft = self.state.borrow().draft.clone();
        if let Err(err) = MessageBody::parse(&draft) {
            self.fail(err);
            return None;
        }

        let principal = self.principal();
        match self.channel.send(principal.as_ref(), &draft).await {
            Ok(id) => {
                self.state.send_modify(|state| {
                    state.draft.clear();
                    state.pending_error = None;
                });
                Some(id)
            }
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    /// Reopens the subscription for the current principal.
    pub async fn reopen(&mut self) {
        let Some(principal) = self.principal() else {
            self.fail(ChatError::Unauthenticated);
            return;
        };
        match self.channel.open(&principal).await {
            Ok(_) => self.state.send_modify(|state| state.pending_error = None),
            Err(err) => self.fail(err),
        }
    }

    /// Waits for one notification (a session transition or a snapshot) and
    /// applies it.
    ///
    /// Returns false once there is nothing left to wait for.
    pub async fn next_event(&mut self) -> bool {
        let subscribed = self.channel.is_open();
        tokio::select! {
            changed = self.session.changed(), if self.session_live => {
                self.on_session_changed(changed.is_ok()).await;
                true
            }
            snapshot = self.channel.next_snapshot(), if subscribed => {
                self.on_snapshot(snapshot);
                true
            }
            else => false,
        }
    }

    /// Runs the view model on its own task.
    #[must_use]
    pub fn spawn(self) -> ChatHandle {
        let (commands, receiver) = mpsc::channel(32);
        let state = self.state();
        let task = tokio::spawn(self.run(receiver));
        ChatHandle {
            commands,
            state,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ChatCommand>) {
        self.sync_session().await;
        loop {
            let subscribed = self.channel.is_open();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ChatCommand::SetDraft(text)) => self.set_draft(text),
                    Some(ChatCommand::Send) => {
                        self.send().await;
                    }
                    Some(ChatCommand::Reopen) => self.reopen().await,
                    None => break,
                },
                changed = self.session.changed(), if self.session_live => {
                    self.on_session_changed(changed.is_ok()).await;
                }
                snapshot = self.channel.next_snapshot(), if subscribed => {
                    self.on_snapshot(snapshot);
                }
            }
        }
        self.channel.close();
        debug!("chat view model stopped");
    }

    async fn on_session_changed(&mut self, live: bool) {
        if !live {
            debug!("session binding closed");
            self.session_live = false;
            self.apply_principal(None).await;
            return;
        }
        let principal = self.session.borrow_and_update().clone();
        self.apply_principal(principal).await;
    }

    async fn apply_principal(&mut self, principal: Option<PrincipalId>) {
        let result = self.channel.rebind(principal.as_ref()).await;
        self.state.send_modify(|state| {
            if state.principal != principal {
                state.messages.clear();
                state.principal = principal.clone();
            }
            state.pending_error = match (&principal, result) {
                (None, _) => Some(ChatError::Unauthenticated),
                (Some(_), Ok(_)) => None,
                (Some(_), Err(err)) => Some(err),
            };
        });
    }

    fn on_snapshot(&mut self, snapshot: Option<Result<Snapshot, ChatError>>) {
        match snapshot {
            Some(Ok(snapshot)) => {
                self.state
                    .send_modify(|state| state.messages = snapshot.into_messages());
            }
            Some(Err(err)) => self.fail(err),
            None => debug!("conversation subscription ended"),
        }
    }

    fn fail(&mut self, err: ChatError) {
        debug!(error = %err, "chat error");
        self.state.send_modify(|state| state.pending_error = Some(err));
    }
}

/// Handle to a view model running on its own task.
#[derive(Debug)]
pub struct ChatHandle {
    commands: mpsc::Sender<ChatCommand>,
    state: watch::Receiver<ChatState>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    /// Subscribes to state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ChatState> {
        self.state.clone()
    }

    /// Replaces the draft.
    ///
    /// # Errors
    ///
    /// Returns [`ChatClosed`] if the view model has stopped.
    pub async fn set_draft(&self, text: impl Into<String>) -> Result<(), ChatClosed> {
        self.command(ChatCommand::SetDraft(text.into())).await
    }

    /// Sends the draft.
    ///
    /// # Errors
    ///
    /// Returns [`ChatClosed`] if the view model has stopped.
    pub async fn send(&self) -> Result<(), ChatClosed> {
        self.command(ChatCommand::Send).await
    }

    /// Reopens the subscription after a failure.
    ///
    /// # Errors
    ///
    /// Returns [`ChatClosed`] if the view model has stopped.
    pub async fn reopen(&self) -> Result<(), ChatClosed> {
        self.command(ChatCommand::Reopen).await
    }

    async fn command(&self, command: ChatCommand) -> Result<(), ChatClosed> {
        self.commands.send(command).await.map_err(|_| ChatClosed)
    }

    /// Stops the view model and releases its subscription.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!(error = %e, "chat view model task failed");
        }
    }
}
