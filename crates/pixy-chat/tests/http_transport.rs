use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pixy_chat::{
    ChatClient, ClientConfig, Message, Outcome, ProviderConfig, StopReason, ToolSpec, Usage,
};
use serde_json::{json, Value};

struct ServedResponse {
    status_line: &'static str,
    content_type: &'static str,
    body: String,
}

fn spawn_http_server(response: ServedResponse) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local test server");
    let address = listener.local_addr().expect("server local addr");
    let (request_sender, request_receiver) = mpsc::channel();
    thread::spawn(move || {
        if let Ok((mut socket, _)) = listener.accept() {
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("set read timeout");
            let request = read_request(&mut socket);
            let _ = request_sender.send(request);

            let raw = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status_line,
                response.content_type,
                response.body.as_bytes().len(),
                response.body
            );
            socket.write_all(raw.as_bytes()).expect("write response");
            let _ = socket.flush();
        }
    });

    (format!("http://{address}/v1"), request_receiver)
}

fn read_request(socket: &mut impl Read) -> String {
    let mut received = Vec::new();
    let mut buffer = [0_u8; 4096];
    loop {
        let read = match socket.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        received.extend_from_slice(&buffer[..read]);
        let text = String::from_utf8_lossy(&received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if received.len() >= header_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}

fn sse_body(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(&serde_json::to_string(chunk).expect("serialize chunk"));
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn client_for(base_url: String) -> ChatClient {
    ChatClient::openai_compatible(
        ProviderConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            ..ProviderConfig::default()
        },
        ClientConfig::default(),
    )
}

#[tokio::test]
async fn streams_content_and_tool_call_over_http() {
    let body = sse_body(&[
        json!({"choices":[{"delta":{"content":"Checking "}}]}),
        json!({"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_weather","arguments":"{\"city\":"}}]}}]}),
        json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Paris\"}"}}]},"finish_reason":"tool_calls"}]}),
        json!({"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":7}}),
    ]);
    let (base_url, requests) = spawn_http_server(ServedResponse {
        status_line: "200 OK",
        content_type: "text/event-stream",
        body,
    });
    let mut client = client_for(base_url);
    let tool = ToolSpec {
        name: "get_weather".to_string(),
        description: "Look up the weather".to_string(),
        parameters: json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"]
        }),
    };

    let response = client
        .send(&[Message::user("weather in Paris?")], "gpt-test", &[tool.clone()])
        .collect()
        .await;

    assert_eq!(response.outcome, Outcome::Success, "{:?}", response.errors);
    assert_eq!(response.text, "Checking ");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_1");
    assert_eq!(response.tool_calls[0].arguments, json!({ "city": "Paris" }));
    assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
    assert_eq!(
        response.usage,
        Some(Usage {
            prompt_tokens: 12,
            completion_tokens: 7,
            cached_tokens: 0,
        })
    );
    let validated = pixy_chat::validate_tool_call(&[tool], &response.tool_calls[0])
        .expect("arguments match the schema");
    assert_eq!(validated["city"], "Paris");

    let request = requests
        .recv_timeout(Duration::from_secs(2))
        .expect("server saw the request");
    assert!(request.starts_with("POST /v1/chat/completions "));
    assert!(request
        .to_ascii_lowercase()
        .contains("authorization: bearer test-key"));
}

#[tokio::test]
async fn json_document_response_is_decoded() {
    let body = json!({
        "choices": [{
            "message": { "content": "plain answer", "reasoning_content": "short" },
            "finish_reason": "length"
        }]
    })
    .to_string();
    let (base_url, _requests) = spawn_http_server(ServedResponse {
        status_line: "200 OK",
        content_type: "application/json",
        body,
    });
    let mut client = client_for(base_url);

    let response = client
        .send(&[Message::user("hi")], "gpt-test", &[])
        .collect()
        .await;

    assert_eq!(response.outcome, Outcome::Success);
    assert_eq!(response.text, "plain answer");
    assert_eq!(response.reasoning, "short");
    assert_eq!(response.stop_reason, Some(StopReason::Length));
}

#[tokio::test]
async fn unauthorized_response_reports_provider_message() {
    let (base_url, _requests) = spawn_http_server(ServedResponse {
        status_line: "401 Unauthorized",
        content_type: "application/json",
        body: r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#.to_string(),
    });
    let mut client = client_for(base_url);

    let response = client
        .send(&[Message::user("hi")], "gpt-test", &[])
        .collect()
        .await;

    assert_eq!(response.outcome, Outcome::Failed);
    assert_eq!(response.errors, vec!["bad key"]);
    assert!(response.text.is_empty());
}

#[tokio::test]
async fn refused_connection_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local test server");
    let address = listener.local_addr().expect("server local addr");
    drop(listener);
    let mut client = client_for(format!("http://{address}/v1"));

    let response = client
        .send(&[Message::user("hi")], "gpt-test", &[])
        .collect()
        .await;

    assert_eq!(response.outcome, Outcome::Failed);
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].starts_with("HTTP transport failed"));
}
