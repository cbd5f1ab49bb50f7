//! Request lifecycle.
//!
//! A [`ChatClient`] runs at most one request at a time. Each request gets its
//! own [`ResponseSession`] and [`ChatEventStream`]; a driver task pumps
//! transport events into the session and closes the stream with exactly one
//! `Done`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ProviderConfig};
use crate::error::{ChatError, ChatErrorCode};
use crate::event_stream::ChatEventStream;
use crate::providers::{ChatProvider, ChatProviderRef, OpenAiCompletionsProvider};
use crate::session::ResponseSession;
use crate::transport::{HttpTransport, Transport, TransportEvent, TransportHandle};
use crate::types::{Message, Outcome, StreamEvent, ToolSpec};
use crate::wire::extract_error_message;

struct ActiveRequest {
    id: u64,
    events: ChatEventStream,
    task: JoinHandle<()>,
}

pub struct ChatClient {
    provider: ChatProviderRef,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    active: Option<ActiveRequest>,
    next_request_id: u64,
}

impl ChatClient {
    pub fn new(
        provider: ChatProviderRef,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Self {
        Self {
            provider,
            transport,
            config,
            active: None,
            next_request_id: 1,
        }
    }

    /// Chat Completions provider over the reqwest transport.
    pub fn openai_compatible(provider: ProviderConfig, config: ClientConfig) -> Self {
        Self::new(
            Arc::new(OpenAiCompletionsProvider::new(provider)),
            Arc::new(HttpTransport),
            config,
        )
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_in_flight(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished() && !active.events.is_finished())
    }

    /// Starts a request, cancelling whatever was in flight. Pre-flight
    /// failures are reported on the returned stream as `Error` followed by
    /// `Done(Failed)` without any I/O.
    pub fn send(
        &mut self,
        messages: &[Message],
        model_id: &str,
        tools: &[ToolSpec],
    ) -> ChatEventStream {
        self.cancel();

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let events = ChatEventStream::new();

        let mut request = match self.provider.build_request(messages, model_id, tools) {
            Ok(request) => request,
            Err(error) => {
                warn!(request_id, code = ?error.code, "request rejected before sending: {}", error.message);
                fail_before_flight(&events, &error);
                return events;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                let error = ChatError::new(
                    ChatErrorCode::RuntimeUnavailable,
                    format!("No Tokio runtime available to drive the request: {error}"),
                );
                warn!(request_id, "{}", error.message);
                fail_before_flight(&events, &error);
                return events;
            }
        };

        if request.timeout.is_none() {
            request.timeout = self.config.request_timeout;
        }
        info!(
            request_id,
            url = %request.url,
            model = model_id,
            "sending chat request"
        );

        let handle = self.transport.open(request);
        let driver = RequestDriver {
            request_id,
            provider: Arc::clone(&self.provider),
            session: ResponseSession::new(&self.config),
            events: events.clone(),
            status: None,
            failure: None,
        };
        let task = runtime.spawn(driver.run(handle));

        self.active = Some(ActiveRequest {
            id: request_id,
            events: events.clone(),
            task,
        });
        events
    }

    /// Stops the in-flight request, if any. Its stream ends with
    /// `Done(Cancelled)` and nothing is delivered afterwards.
    pub fn cancel(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if active.events.finish(Outcome::Cancelled) {
            info!(request_id = active.id, "chat request cancelled");
        }
        active.task.abort();
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn fail_before_flight(events: &ChatEventStream, error: &ChatError) {
    events.push(StreamEvent::Error {
        message: error.message.clone(),
    });
    events.finish(Outcome::Failed);
}

struct RequestDriver {
    request_id: u64,
    provider: ChatProviderRef,
    session: ResponseSession,
    events: ChatEventStream,
    status: Option<u16>,
    failure: Option<String>,
}

impl RequestDriver {
    async fn run(mut self, mut handle: TransportHandle) {
        while let Some(event) = handle.next().await {
            match event {
                TransportEvent::Status(status) => {
                    debug!(request_id = self.request_id, status, "response status");
                    self.status = Some(status);
                }
                TransportEvent::Chunk(bytes) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    let events = &self.events;
                    let mut emit = |event: StreamEvent| {
                        events.push(event);
                    };
                    self.session.append(&bytes, &mut emit);
                }
                TransportEvent::Failed(message) => {
                    self.failure = Some(message);
                    break;
                }
            }
        }
        drop(handle);
        self.on_complete();
    }

    fn on_complete(&mut self) {
        if let Some(message) = self.failure.clone() {
            if self.session.received_len() == 0 {
                self.report(ChatError::new(ChatErrorCode::ProviderTransport, message));
                self.events.finish(Outcome::Failed);
                return;
            }
        }

        let ok_status = self.status == Some(200);
        {
            let events = &self.events;
            let mut emit = |event: StreamEvent| {
                events.push(event);
            };
            self.session.complete(ok_status, &mut emit);
        }

        let outcome = match self.classify_failure(ok_status) {
            Some(error) => {
                self.report(error);
                Outcome::Failed
            }
            None => Outcome::Success,
        };

        info!(
            request_id = self.request_id,
            status = ?self.status,
            outcome = ?outcome,
            received = self.session.received_len(),
            "chat request finished"
        );
        self.events.finish(outcome);
        self.session.reset();
    }

    fn classify_failure(&self, ok_status: bool) -> Option<ChatError> {
        if let Some(message) = self.failure.clone() {
            return Some(ChatError::new(ChatErrorCode::ProviderTransport, message));
        }

        let unknown_status = matches!(self.status, None | Some(0));
        if ok_status || (unknown_status && self.session.received_stream_content()) {
            return self
                .session
                .protocol_error()
                .map(|message| ChatError::new(ChatErrorCode::ProviderProtocol, message));
        }

        let code = if unknown_status {
            ChatErrorCode::ProviderTransport
        } else {
            ChatErrorCode::ProviderHttp
        };
        Some(ChatError::new(code, self.failure_message()))
    }

    /// Pushes the failure as an `Error` event unless the response already
    /// reported one while streaming.
    fn report(&self, error: ChatError) {
        warn!(
            request_id = self.request_id,
            status = ?self.status,
            code = ?error.code,
            "chat request failed: {}",
            error.message
        );
        if self.session.protocol_error().is_some() {
            return;
        }
        self.events.push(StreamEvent::Error {
            message: error.message,
        });
    }

    fn failure_message(&self) -> String {
        let body = self.session.body_text();
        let body = body.trim();

        if let Some(message) = self
            .provider
            .translate_error(self.status, body)
            .filter(|message| !message.trim().is_empty())
        {
            return message;
        }
        if let Some(message) = extract_error_message(body) {
            return message;
        }

        match (self.status, body.is_empty()) {
            (Some(status), false) if status != 0 => format!("HTTP {status}: {body}"),
            (Some(status), true) if status != 0 => format!("HTTP {status}"),
            _ => "response ended without a status or streamed content".to_string(),
        }
    }
}
