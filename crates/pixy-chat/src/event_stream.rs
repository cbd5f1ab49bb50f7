use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};

use crate::types::{ChatResponse, Outcome, StreamEvent};

struct StreamState {
    outcome: Option<Outcome>,
}

struct ChatEventStreamInner {
    sender: mpsc::UnboundedSender<StreamEvent>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<StreamEvent>>,
    state: Mutex<StreamState>,
    event_notify: Notify,
    final_notify: Notify,
}

/// Ordered events of one request. `Done` is always the last event; anything
/// pushed after it is dropped.
pub struct ChatEventStream {
    inner: Arc<ChatEventStreamInner>,
}

impl Clone for ChatEventStream {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ChatEventStream {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ChatEventStreamInner {
                sender,
                receiver: AsyncMutex::new(receiver),
                state: Mutex::new(StreamState { outcome: None }),
                event_notify: Notify::new(),
                final_notify: Notify::new(),
            }),
        }
    }

    /// Returns false when the stream was already finished and the event was
    /// dropped.
    pub fn push(&self, event: StreamEvent) -> bool {
        let mut state = self
            .inner
            .state
            .lock()
            .expect("event stream state mutex poisoned");
        if state.outcome.is_some() {
            return false;
        }
        let finished = match &event {
            StreamEvent::Done { outcome } => Some(*outcome),
            _ => None,
        };
        let _ = self.inner.sender.send(event);
        state.outcome = finished;
        drop(state);

        self.inner.event_notify.notify_waiters();
        if finished.is_some() {
            self.inner.final_notify.notify_waiters();
        }
        true
    }

    /// Pushes the terminal `Done` unless one was already delivered.
    pub fn finish(&self, outcome: Outcome) -> bool {
        self.push(StreamEvent::Done { outcome })
    }

    pub fn is_finished(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("event stream state mutex poisoned")
            .outcome
            .is_some()
    }

    pub async fn next(&self) -> Option<StreamEvent> {
        loop {
            let notified = self.inner.event_notify.notified();
            {
                let mut receiver = self.inner.receiver.lock().await;
                match receiver.try_recv() {
                    Ok(event) => return Some(event),
                    Err(mpsc::error::TryRecvError::Disconnected) => return None,
                    Err(mpsc::error::TryRecvError::Empty) => {
                        if self.is_finished() {
                            return None;
                        }
                    }
                }
            }

            notified.await;
        }
    }

    /// Waits for the terminal outcome without consuming events.
    pub async fn outcome(&self) -> Outcome {
        loop {
            let notified = self.inner.final_notify.notified();
            if let Some(outcome) = self
                .inner
                .state
                .lock()
                .expect("event stream state mutex poisoned")
                .outcome
            {
                return outcome;
            }
            notified.await;
        }
    }

    /// Drains the remaining events into a [`ChatResponse`].
    pub async fn collect(&self) -> ChatResponse {
        let mut response = ChatResponse::default();
        while let Some(event) = self.next().await {
            response.absorb(event);
        }
        response
    }
}

impl Default for ChatEventStream {
    fn default() -> Self {
        Self::new()
    }
}
