//! End-to-end RPC tests against an in-process HTTP/2 server.
//!
//! Each test spins up a hyper server on an ephemeral port with a
//! scripted handler, points a real [`Client`] at it, and drives a call
//! through the full stack: option resolution, retries, the channel,
//! and response decoding.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::future::BoxFuture;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use prost::Message;
use tokio::net::TcpListener;

use gapic_client::{
    CallOptions, ChannelArgs, Client, Code, Credentials, Idempotency, MethodDescriptor,
    PageableRequest, PageableResponse, RetryPolicy,
};
use gapic_core::{ENVELOPE_HEADER_SIZE, envelope_flags, wrap_envelope};

// ============================================================================
// Test messages
// ============================================================================

#[derive(Clone, PartialEq, Debug, Default)]
struct EchoMessage {
    text: String,
}

impl prost::Message for EchoMessage {
    fn encode_raw(&self, buf: &mut impl bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.text.is_empty() {
            prost::encoding::string::encode(1, &self.text, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        if tag == 1 {
            prost::encoding::string::merge(wire_type, &mut self.text, buf, ctx)
        } else {
            prost::encoding::skip_field(wire_type, tag, buf, ctx)
        }
    }

    fn encoded_len(&self) -> usize {
        if self.text.is_empty() {
            0
        } else {
            prost::encoding::string::encoded_len(1, &self.text)
        }
    }

    fn clear(&mut self) {
        self.text.clear();
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
struct ListRequest {
    filter: String,
    page_token: String,
}

impl prost::Message for ListRequest {
    fn encode_raw(&self, buf: &mut impl bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.filter.is_empty() {
            prost::encoding::string::encode(1, &self.filter, buf);
        }
        if !self.page_token.is_empty() {
            prost::encoding::string::encode(2, &self.page_token, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::string::merge(wire_type, &mut self.filter, buf, ctx),
            2 => prost::encoding::string::merge(wire_type, &mut self.page_token, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.filter.is_empty() {
            len += prost::encoding::string::encoded_len(1, &self.filter);
        }
        if !self.page_token.is_empty() {
            len += prost::encoding::string::encoded_len(2, &self.page_token);
        }
        len
    }

    fn clear(&mut self) {
        self.filter.clear();
        self.page_token.clear();
    }
}

impl PageableRequest for ListRequest {
    fn set_page_token(&mut self, token: String) {
        self.page_token = token;
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
struct ListResponse {
    items: Vec<String>,
    next_page_token: String,
}

impl prost::Message for ListResponse {
    fn encode_raw(&self, buf: &mut impl bytes::BufMut)
    where
        Self: Sized,
    {
        prost::encoding::string::encode_repeated(1, &self.items, buf);
        if !self.next_page_token.is_empty() {
            prost::encoding::string::encode(2, &self.next_page_token, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::string::merge_repeated(wire_type, &mut self.items, buf, ctx),
            2 => prost::encoding::string::merge(wire_type, &mut self.next_page_token, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        prost::encoding::string::encoded_len_repeated(1, &self.items)
            + if self.next_page_token.is_empty() {
                0
            } else {
                prost::encoding::string::encoded_len(2, &self.next_page_token)
            }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.next_page_token.clear();
    }
}

impl PageableResponse for ListResponse {
    type Item = String;

    fn next_page_token(&self) -> &str {
        &self.next_page_token
    }

    fn into_items(self) -> Vec<String> {
        self.items
    }
}

const ECHO: MethodDescriptor = MethodDescriptor::new("test.v1.Echo/Echo", Idempotency::Idempotent);
const MUTATE: MethodDescriptor =
    MethodDescriptor::new("test.v1.Echo/Mutate", Idempotency::NonIdempotent);
const WATCH: MethodDescriptor =
    MethodDescriptor::new("test.v1.Echo/Watch", Idempotency::Idempotent);
const LIST: MethodDescriptor = MethodDescriptor::new("test.v1.Echo/List", Idempotency::Idempotent);

// ============================================================================
// Server harness
// ============================================================================

type Handler = Arc<
    dyn Fn(http::request::Parts, Bytes) -> BoxFuture<'static, http::Response<Full<Bytes>>>
        + Send
        + Sync,
>;

/// Start an HTTP/2 server on an ephemeral port that answers every request
/// with the given handler. Returns the bound address.
async fn start_server(handler: Handler) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: http::Request<Incoming>| {
                    let handler = handler.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body.collect().await.unwrap().to_bytes();
                        Ok::<_, Infallible>(handler(parts, body).await)
                    }
                });
                let _ = http2::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

fn client_for(addr: SocketAddr) -> Client {
    Client::builder(format!("http://{}", addr)).build().unwrap()
}

fn proto_response(message: &impl prost::Message) -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/proto")
        .body(Full::new(Bytes::from(message.encode_to_vec())))
        .unwrap()
}

fn error_response(status: StatusCode, code: &str, message: &str) -> http::Response<Full<Bytes>> {
    let body = format!(r#"{{"error":{{"code":"{}","message":"{}"}}}}"#, code, message);
    http::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn stream_response(frames: Vec<u8>) -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/proto-stream")
        .body(Full::new(Bytes::from(frames)))
        .unwrap()
}

/// Build an end-of-stream frame carrying the given JSON document.
fn end_frame(json: &str) -> Vec<u8> {
    let mut frame = vec![envelope_flags::END_STREAM];
    frame.extend_from_slice(&(json.len() as u32).to_be_bytes());
    frame.extend_from_slice(json.as_bytes());
    frame
}

// ============================================================================
// Unary calls
// ============================================================================

#[tokio::test]
async fn test_unary_round_trip() {
    let handler: Handler = Arc::new(|_parts, body| {
        Box::pin(async move {
            let req = EchoMessage::decode(body).unwrap();
            let mut response = proto_response(&EchoMessage {
                text: req.text.to_uppercase(),
            });
            response
                .headers_mut()
                .insert("x-served-by", "rpc-test".parse().unwrap());
            response
        })
    });
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let response = client
        .unary::<EchoMessage, EchoMessage>(
            &ECHO,
            &EchoMessage {
                text: "hello".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(response.get_ref().text, "HELLO");
    assert_eq!(response.metadata().get("x-served-by"), Some("rpc-test"));
}

#[tokio::test]
async fn test_unary_error_passthrough() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let handler: Handler = {
        let attempts = attempts.clone();
        Arc::new(move |_parts, _body| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                error_response(StatusCode::NOT_FOUND, "not_found", "no such echo")
            })
        })
    };
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let err = client
        .unary::<EchoMessage, EchoMessage>(&ECHO, &EchoMessage::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.status().unwrap().message(), Some("no such echo"));
    // Not a retryable code, so exactly one attempt
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unary_retries_transient_errors() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let request_ids = Arc::new(Mutex::new(Vec::<String>::new()));
    let handler: Handler = {
        let attempts = attempts.clone();
        let request_ids = request_ids.clone();
        Arc::new(move |parts, _body| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            let id = parts
                .headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            request_ids.lock().unwrap().push(id);
            Box::pin(async move {
                if n < 2 {
                    error_response(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "try again")
                } else {
                    proto_response(&EchoMessage {
                        text: "ok".to_string(),
                    })
                }
            })
        })
    };
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let options = CallOptions::new().retry_policy(
        RetryPolicy::new()
            .initial_backoff(Duration::from_millis(5))
            .max_attempts(5),
    );
    let response = client
        .unary_with_options::<EchoMessage, EchoMessage>(&ECHO, &EchoMessage::default(), options)
        .await
        .unwrap();

    assert_eq!(response.get_ref().text, "ok");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // Every attempt carries the same request id, so server logs correlate
    let ids = request_ids.lock().unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id == &ids[0]));
    assert_eq!(ids[0].len(), 32);
    assert!(ids[0].chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_non_idempotent_not_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let handler: Handler = {
        let attempts = attempts.clone();
        Arc::new(move |_parts, _body| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                error_response(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "try again")
            })
        })
    };
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let options = CallOptions::new().retry_policy(
        RetryPolicy::new()
            .initial_backoff(Duration::from_millis(5))
            .max_attempts(5),
    );
    let err = client
        .unary_with_options::<EchoMessage, EchoMessage>(&MUTATE, &EchoMessage::default(), options)
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_idempotent_retried_after_opt_in() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let handler: Handler = {
        let attempts = attempts.clone();
        Arc::new(move |_parts, _body| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n == 0 {
                    error_response(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "try again")
                } else {
                    proto_response(&EchoMessage {
                        text: "created".to_string(),
                    })
                }
            })
        })
    };
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let options = CallOptions::new().retry_policy(
        RetryPolicy::new()
            .initial_backoff(Duration::from_millis(5))
            .max_attempts(5)
            .retry_non_idempotent(true),
    );
    let response = client
        .unary_with_options::<EchoMessage, EchoMessage>(&MUTATE, &EchoMessage::default(), options)
        .await
        .unwrap();

    assert_eq!(response.get_ref().text, "created");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unary_deadline_exceeded() {
    let handler: Handler = Arc::new(|_parts, _body| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            proto_response(&EchoMessage::default())
        })
    });
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let start = std::time::Instant::now();
    let err = client
        .unary_with_options::<EchoMessage, EchoMessage>(
            &ECHO,
            &EchoMessage::default(),
            CallOptions::new().timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_oversize_request_rejected_before_send() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let handler: Handler = {
        let attempts = attempts.clone();
        Arc::new(move |_parts, _body| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { proto_response(&EchoMessage::default()) })
        })
    };
    let addr = start_server(handler).await;

    let mut args = ChannelArgs::default();
    args.set("max_send_message_length", 4).unwrap();
    let client = Client::builder(format!("http://{}", addr))
        .channel_args(args)
        .build()
        .unwrap();

    let err = client
        .unary::<EchoMessage, EchoMessage>(
            &ECHO,
            &EchoMessage {
                text: "far more than four bytes".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::ResourceExhausted);
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Metadata and credentials
// ============================================================================

#[tokio::test]
async fn test_per_call_metadata_overrides_default() {
    let seen = Arc::new(Mutex::new(None));
    let handler: Handler = {
        let seen = seen.clone();
        Arc::new(move |parts, _body| {
            *seen.lock().unwrap() = Some(parts.headers.clone());
            Box::pin(async move { proto_response(&EchoMessage::default()) })
        })
    };
    let addr = start_server(handler).await;

    let client = Client::builder(format!("http://{}", addr))
        .header("x-tenant", "default-tenant")
        .header("x-keep", "kept")
        .build()
        .unwrap();

    client
        .unary_with_options::<EchoMessage, EchoMessage>(
            &ECHO,
            &EchoMessage::default(),
            CallOptions::new().header("x-tenant", "override"),
        )
        .await
        .unwrap();

    let headers = seen.lock().unwrap().take().unwrap();
    assert_eq!(headers.get("x-tenant").unwrap(), "override");
    assert_eq!(headers.get("x-keep").unwrap(), "kept");
}

#[tokio::test]
async fn test_bearer_credentials_attached() {
    let handler: Handler = Arc::new(|parts, _body| {
        Box::pin(async move {
            match parts.headers.get(http::header::AUTHORIZATION) {
                Some(v) if v == "Bearer secret-token" => proto_response(&EchoMessage {
                    text: "authed".to_string(),
                }),
                _ => error_response(StatusCode::UNAUTHORIZED, "unauthenticated", "bad token"),
            }
        })
    });
    let addr = start_server(handler).await;

    let client = Client::builder(format!("http://{}", addr))
        .credentials(Credentials::bearer("secret-token").unwrap())
        .build()
        .unwrap();

    let response = client
        .unary::<EchoMessage, EchoMessage>(&ECHO, &EchoMessage::default())
        .await
        .unwrap();
    assert_eq!(response.get_ref().text, "authed");
}

// ============================================================================
// Server streaming
// ============================================================================

#[tokio::test]
async fn test_server_streaming_messages_and_trailers() {
    let handler: Handler = Arc::new(|_parts, body| {
        Box::pin(async move {
            // The request arrives as a single enveloped frame
            let req = EchoMessage::decode(&body[ENVELOPE_HEADER_SIZE..]).unwrap();

            let mut frames = Vec::new();
            for i in 1..=3 {
                let msg = EchoMessage {
                    text: format!("{}-{}", req.text, i),
                };
                frames.extend_from_slice(&wrap_envelope(&msg.encode_to_vec()));
            }
            frames.extend_from_slice(&end_frame(
                r#"{"metadata":{"x-items-served":["3"]}}"#,
            ));

            let mut response = stream_response(frames);
            response
                .headers_mut()
                .insert("x-head", "yes".parse().unwrap());
            response
        })
    });
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let response = client
        .server_streaming::<EchoMessage, EchoMessage>(
            &WATCH,
            &EchoMessage {
                text: "row".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(response.metadata().get("x-head"), Some("yes"));
    let mut stream = response.into_inner();

    let mut texts = Vec::new();
    while let Some(item) = stream.next().await {
        texts.push(item.unwrap().text);
    }
    assert_eq!(texts, vec!["row-1", "row-2", "row-3"]);

    let trailers = stream.trailers().unwrap();
    assert_eq!(trailers.get("x-items-served"), Some("3"));
}

#[tokio::test]
async fn test_server_streaming_error_mid_stream() {
    let handler: Handler = Arc::new(|_parts, _body| {
        Box::pin(async move {
            let mut frames = Vec::new();
            for text in ["a", "b"] {
                let msg = EchoMessage {
                    text: text.to_string(),
                };
                frames.extend_from_slice(&wrap_envelope(&msg.encode_to_vec()));
            }
            frames.extend_from_slice(&end_frame(
                r#"{"error":{"code":"out_of_range","message":"past end of table"}}"#,
            ));
            stream_response(frames)
        })
    });
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let mut stream = client
        .server_streaming::<EchoMessage, EchoMessage>(&WATCH, &EchoMessage::default())
        .await
        .unwrap()
        .into_inner();

    assert_eq!(stream.next().await.unwrap().unwrap().text, "a");
    assert_eq!(stream.next().await.unwrap().unwrap().text, "b");

    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.code(), Code::OutOfRange);
    assert_eq!(err.status().unwrap().message(), Some("past end of table"));

    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_server_stream_open_error_uses_error_body() {
    let handler: Handler = Arc::new(|_parts, _body| {
        Box::pin(async move {
            error_response(
                StatusCode::FORBIDDEN,
                "permission_denied",
                "watch not allowed",
            )
        })
    });
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let err = client
        .server_streaming::<EchoMessage, EchoMessage>(&WATCH, &EchoMessage::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::PermissionDenied);
    assert_eq!(err.status().unwrap().message(), Some("watch not allowed"));
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_paged_walks_all_pages() {
    let tokens_seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let handler: Handler = {
        let tokens_seen = tokens_seen.clone();
        Arc::new(move |_parts, body| {
            let req = ListRequest::decode(body).unwrap();
            tokens_seen.lock().unwrap().push(req.page_token.clone());
            Box::pin(async move {
                let page = match req.page_token.as_str() {
                    "" => ListResponse {
                        items: vec!["a".to_string(), "b".to_string()],
                        next_page_token: "t1".to_string(),
                    },
                    "t1" => ListResponse {
                        items: vec!["c".to_string()],
                        next_page_token: "t2".to_string(),
                    },
                    _ => ListResponse {
                        items: vec!["d".to_string()],
                        next_page_token: String::new(),
                    },
                };
                proto_response(&page)
            })
        })
    };
    let addr = start_server(handler).await;
    let client = client_for(addr);

    let mut pager = client.paged::<ListRequest, ListResponse>(
        &LIST,
        ListRequest {
            filter: "active".to_string(),
            page_token: String::new(),
        },
    );

    let items = pager.all_items().await.unwrap();
    assert_eq!(items, vec!["a", "b", "c", "d"]);
    assert!(pager.is_exhausted());
    assert_eq!(*tokens_seen.lock().unwrap(), vec!["", "t1", "t2"]);
}
