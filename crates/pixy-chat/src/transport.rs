use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// A fully built request, ready to be issued by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Option<Duration>,
}

/// Signals delivered while a request is in flight. The channel closing is
/// the completion signal; `Failed` is always the last event sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Status(u16),
    Chunk(Vec<u8>),
    Failed(String),
}

/// Receiving end of one in-flight request. Dropping it aborts the request.
pub struct TransportHandle {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: Option<AbortHandle>,
}

impl TransportHandle {
    pub fn new(events: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { events, task: None }
    }

    pub fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub trait Transport: Send + Sync {
    /// Issues `request`. Called from within a Tokio runtime.
    fn open(&self, request: TransportRequest) -> TransportHandle;
}

/// `reqwest`-backed transport streaming the response body chunk by chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(execute_http_request(request, sender));
        TransportHandle::new(receiver).with_task(task.abort_handle())
    }
}

async fn execute_http_request(
    request: TransportRequest,
    sender: mpsc::UnboundedSender<TransportEvent>,
) {
    let client = shared_http_client(&request.url);
    let mut builder = client.post(request.url.as_str()).json(&request.body);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(timeout) = request.timeout {
        builder = builder.timeout(timeout);
    }

    let mut response = match builder.send().await {
        Ok(response) => response,
        Err(error) => {
            let _ = sender.send(TransportEvent::Failed(format!(
                "HTTP transport failed: {error}"
            )));
            return;
        }
    };

    let status = response.status().as_u16();
    debug!(status, url = %request.url, "response headers received");
    if sender.send(TransportEvent::Status(status)).is_err() {
        return;
    }

    loop {
        match response.chunk().await {
            Ok(Some(bytes)) => {
                if sender.send(TransportEvent::Chunk(bytes.to_vec())).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(error) => {
                let _ = sender.send(TransportEvent::Failed(format!(
                    "HTTP stream read failed: {error}"
                )));
                return;
            }
        }
    }
}

pub(crate) fn shared_http_client(url: &str) -> &'static Client {
    static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();
    static LOOPBACK_CLIENT: OnceLock<Client> = OnceLock::new();

    if is_loopback_url(url) {
        LOOPBACK_CLIENT.get_or_init(|| {
            Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new())
        })
    } else {
        DEFAULT_CLIENT.get_or_init(Client::new)
    }
}

pub(crate) fn is_loopback_url(url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "[::1]"
}
