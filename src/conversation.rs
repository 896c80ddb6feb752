/// Conversation actor: owns the message history and answers one turn at a time.
///
/// Each question travels as a single `TurnRequest` that carries its own event
/// sender and cancellation token, so the caller gets back a `Turn` it can
/// drain and cancel independently of any other turn.
use std::future::Future;

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{Client, Message, ModelResponse};

// ── Backend seam ──────────────────────────────────────────────────────────────

/// Something that can stream one assistant reply for a message history.
pub trait ChatBackend: Send + Sync + 'static {
    fn stream_reply(
        &self,
        system: Option<&str>,
        messages: &[Message],
        on_text: &(dyn Fn(&str) + Send + Sync),
    ) -> impl Future<Output = Result<ModelResponse>> + Send;
}

impl ChatBackend for Client {
    async fn stream_reply(
        &self,
        system: Option<&str>,
        messages: &[Message],
        on_text: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<ModelResponse> {
        self.chat(system, messages, on_text).await
    }
}

// ── Turn protocol ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A streamed fragment of the reply
    Chunk(String),
    /// The reply completed; it is now part of the history
    Finished { input_tokens: u32, output_tokens: u32 },
    /// The request failed; the question was dropped from the history
    Failed(String),
    /// The turn was cancelled before the reply completed
    Cancelled,
}

#[cfg(test)]
impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnEvent::Chunk(_))
    }
}

pub struct TurnRequest {
    question: String,
    events: mpsc::UnboundedSender<TurnEvent>,
    cancel: CancellationToken,
}

#[cfg(test)]
impl TurnRequest {
    pub fn question(&self) -> &str {
        &self.question
    }
}

/// The caller's end of one in-flight question.
pub struct Turn {
    events: mpsc::UnboundedReceiver<TurnEvent>,
    cancel: CancellationToken,
}

impl Turn {
    /// Next event for this turn; `None` once the actor has dropped its sender.
    pub async fn next(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Clone)]
pub struct ConversationHandle {
    requests: mpsc::UnboundedSender<TurnRequest>,
}

impl ConversationHandle {
    /// Queue a question. Fails only if the conversation actor has stopped.
    pub fn ask(&self, question: impl Into<String>) -> Result<Turn> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let request = TurnRequest {
            question: question.into(),
            events: events_tx,
            cancel: cancel.clone(),
        };
        self.requests
            .send(request)
            .map_err(|_| anyhow!("conversation has shut down"))?;
        Ok(Turn { events: events_rx, cancel })
    }
}

/// Start the actor. It stops once every `ConversationHandle` is dropped.
pub fn spawn<B: ChatBackend>(
    backend: B,
    system_prompt: Option<String>,
) -> (ConversationHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conversation = Conversation {
        backend,
        system_prompt,
        history: Vec::new(),
    };
    let handle = tokio::spawn(conversation.run(rx));
    (ConversationHandle { requests: tx }, handle)
}

/// A handle with no actor behind it; requests pile up in the returned receiver.
#[cfg(test)]
pub(crate) fn detached() -> (ConversationHandle, mpsc::UnboundedReceiver<TurnRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConversationHandle { requests: tx }, rx)
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct Conversation<B> {
    backend: B,
    system_prompt: Option<String>,
    history: Vec<Message>,
}

impl<B: ChatBackend> Conversation<B> {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<TurnRequest>) {
        while let Some(request) = requests.recv().await {
            self.take_turn(request).await;
        }
        tracing::debug!(messages = self.history.len(), "conversation closed");
    }

    async fn take_turn(&mut self, request: TurnRequest) {
        let TurnRequest { question, events, cancel } = request;

        if cancel.is_cancelled() {
            let _ = events.send(TurnEvent::Cancelled);
            return;
        }

        tracing::info!(turn = self.history.len() / 2 + 1, chars = question.len(), "turn started");
        self.history.push(Message::user(question));

        let chunk_tx = events.clone();
        let on_text = move |text: &str| {
            let _ = chunk_tx.send(TurnEvent::Chunk(text.to_string()));
        };

        let outcome = tokio::select! {
            result = self.backend.stream_reply(self.system_prompt.as_deref(), &self.history, &on_text) => Some(result),
            _ = cancel.cancelled() => None,
        };

        let terminal = match outcome {
            Some(Ok(response)) => {
                tracing::info!(
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "turn finished"
                );
                let event = TurnEvent::Finished {
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                };
                self.history.push(Message::assistant(response.text));
                event
            }
            Some(Err(e)) => {
                tracing::warn!(error = %format!("{e:#}"), "turn failed");
                self.history.pop();
                TurnEvent::Failed(format!("{e:#}"))
            }
            None => {
                tracing::info!("turn cancelled");
                self.history.pop();
                TurnEvent::Cancelled
            }
        };
        let _ = events.send(terminal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    enum Script {
        Reply(Vec<&'static str>),
        Fail(&'static str),
        Hang,
    }

    #[derive(Clone, Default)]
    struct FakeBackend {
        script: Arc<Mutex<VecDeque<Script>>>,
        seen: Arc<Mutex<Vec<(Option<String>, Vec<Message>)>>>,
    }

    impl FakeBackend {
        fn with(script: Vec<Script>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                ..Default::default()
            }
        }

        fn seen(&self) -> Vec<(Option<String>, Vec<Message>)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ChatBackend for FakeBackend {
        async fn stream_reply(
            &self,
            system: Option<&str>,
            messages: &[Message],
            on_text: &(dyn Fn(&str) + Send + Sync),
        ) -> Result<ModelResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((system.map(str::to_string), messages.to_vec()));
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Script::Reply(chunks)) => {
                    for c in &chunks {
                        on_text(c);
                        tokio::task::yield_now().await;
                    }
                    Ok(ModelResponse {
                        text: chunks.concat(),
                        finish_reason: Some("stop".to_string()),
                        input_tokens: 3,
                        output_tokens: chunks.len() as u32,
                    })
                }
                Some(Script::Fail(msg)) => Err(anyhow!(msg)),
                Some(Script::Hang) | None => std::future::pending().await,
            }
        }
    }

    async fn drain(turn: &mut Turn) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        while let Some(ev) = turn.next().await {
            let done = ev.is_terminal();
            out.push(ev);
            if done {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn test_chunks_then_single_finished() {
        let backend = FakeBackend::with(vec![Script::Reply(vec!["a", "b", "c"])]);
        let (convo, _task) = spawn(backend, None);

        let mut turn = convo.ask("q").unwrap();
        let events = drain(&mut turn).await;
        assert_eq!(
            events,
            vec![
                TurnEvent::Chunk("a".into()),
                TurnEvent::Chunk("b".into()),
                TurnEvent::Chunk("c".into()),
                TurnEvent::Finished { input_tokens: 3, output_tokens: 3 },
            ]
        );
        // Actor drops the sender after the terminal event
        assert_eq!(turn.next().await, None);
    }

    #[tokio::test]
    async fn test_history_accumulates_across_turns() {
        let backend = FakeBackend::with(vec![
            Script::Reply(vec!["one"]),
            Script::Reply(vec!["two"]),
        ]);
        let (convo, _task) = spawn(backend.clone(), Some("sys".to_string()));

        drain(&mut convo.ask("first").unwrap()).await;
        drain(&mut convo.ask("second").unwrap()).await;

        let seen = backend.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.as_deref(), Some("sys"));
        assert_eq!(seen[0].1, vec![Message::user("first")]);
        assert_eq!(
            seen[1].1,
            vec![
                Message::user("first"),
                Message::assistant("one"),
                Message::user("second"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_turn_is_rolled_back() {
        let backend = FakeBackend::with(vec![
            Script::Fail("connection reset"),
            Script::Reply(vec!["ok"]),
        ]);
        let (convo, _task) = spawn(backend.clone(), None);

        let events = drain(&mut convo.ask("lost").unwrap()).await;
        assert_eq!(events, vec![TurnEvent::Failed("connection reset".into())]);

        drain(&mut convo.ask("again").unwrap()).await;
        assert_eq!(backend.seen()[1].1, vec![Message::user("again")]);
    }

    #[tokio::test]
    async fn test_cancel_in_flight() {
        let backend = FakeBackend::with(vec![Script::Hang, Script::Reply(vec!["after"])]);
        let (convo, _task) = spawn(backend.clone(), None);

        let mut turn = convo.ask("slow").unwrap();
        while backend.seen().is_empty() {
            tokio::task::yield_now().await;
        }
        turn.cancel();
        assert!(turn.is_cancelled());
        assert_eq!(drain(&mut turn).await, vec![TurnEvent::Cancelled]);

        // The actor is free again and the cancelled question left no trace
        let events = drain(&mut convo.ask("next").unwrap()).await;
        assert_eq!(events.last(), Some(&TurnEvent::Finished { input_tokens: 3, output_tokens: 1 }));
        assert_eq!(backend.seen()[1].1, vec![Message::user("next")]);
    }

    #[tokio::test]
    async fn test_cancel_before_start_never_reaches_backend() {
        let backend = FakeBackend::with(vec![Script::Reply(vec!["x"])]);
        let (convo, _task) = spawn(backend.clone(), None);

        let mut first = convo.ask("a").unwrap();
        // The actor has not been polled yet, so it sees the token already cancelled
        first.cancel();
        assert_eq!(drain(&mut first).await, vec![TurnEvent::Cancelled]);
        assert!(backend.seen().is_empty());

        let events = drain(&mut convo.ask("b").unwrap()).await;
        assert_eq!(events[0], TurnEvent::Chunk("x".into()));
    }

    #[tokio::test]
    async fn test_actor_stops_when_handles_dropped() {
        let (convo, task) = spawn(FakeBackend::default(), None);
        drop(convo);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_ask_fails_after_actor_stops() {
        let (convo, task) = spawn(FakeBackend::default(), None);
        task.abort();
        let _ = task.await;
        assert!(convo.ask("anyone?").is_err());
    }
}
