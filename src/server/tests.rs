//! Tests for the HTTP server implementation.

#[cfg(test)]
mod server_tests {
    use std::collections::HashMap;
    use std::io::{self, Cursor};
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::time;

    use crate::config::{AppErrorMail, MailerConfig};
    use crate::failure::ErrorReporter;
    use crate::logger::Logger;
    use crate::notify::{ChannelNotifier, MailMessage};
    use crate::plugin::{
        HandlerError, Params, Payload, Plugin, PluginContext, PluginLoader, PluginModule, PluginRegistration,
        PluginRegistry, Reply,
    };
    use crate::router::{RouteDescriptor, Router};
    use crate::server::{HttpServer, ServerConfig};

    // Mock TcpStream for testing
    struct MockTcpStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
    }

    impl MockTcpStream {
        fn new(read_data: impl Into<Vec<u8>>) -> Self {
            Self {
                read_data: Cursor::new(read_data.into()),
                write_data: Vec::new(),
            }
        }

        fn written_data(&self) -> &[u8] {
            &self.write_data
        }
    }

    impl AsyncRead for MockTcpStream {
        fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let n = std::io::Read::read(&mut this.read_data, buf.initialize_unfilled())?;
            buf.advance(n);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockTcpStream {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    const WEB_PLUGIN: &str = "tests/plugins/web";

    struct Fixture {
        server: HttpServer,
        calls: Arc<AtomicUsize>,
        mail: mpsc::Receiver<MailMessage>,
    }

    fn web_plugin(calls: Arc<AtomicUsize>) -> impl Fn(&PluginContext) -> Result<Arc<dyn Plugin>, HandlerError> {
        move |_ctx: &PluginContext| -> Result<Arc<dyn Plugin>, HandlerError> {
            let counter = Arc::clone(&calls);
            let module = PluginModule::new()
                .callback("hello", |_: Params, _: Payload| -> Result<Reply, HandlerError> { Ok(Reply::text("hi")) })
                .callback("json", |_: Params, _: Payload| -> Result<Reply, HandlerError> {
                    Ok(Reply::json(json!({ "a": 1 })))
                })
                .callback("echo", move |_: Params, payload: Payload| -> Result<Reply, HandlerError> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Reply::json(payload.to_value()))
                })
                .callback("params", |params: Params, _: Payload| -> Result<Reply, HandlerError> {
                    Ok(Reply::json(Value::Object(params)))
                })
                .callback("fail", |_: Params, _: Payload| -> Result<Reply, HandlerError> {
                    Err("database unreachable".into())
                })
                .callback("later", |_: Params, _: Payload| -> Result<Reply, HandlerError> {
                    Ok(Reply::deferred(async {
                        time::sleep(Duration::from_millis(5)).await;
                        Ok::<_, HandlerError>(json!({ "done": true }))
                    }))
                })
                .callback("later_fail", |_: Params, _: Payload| -> Result<Reply, HandlerError> {
                    Ok(Reply::deferred(async {
                        time::sleep(Duration::from_millis(5)).await;
                        Err::<Value, HandlerError>("queue rejected the job".into())
                    }))
                })
                .callback("boom", |_: Params, _: Payload| -> Result<Reply, HandlerError> {
                    panic!("handler exploded")
                })
                .callback("nothing", |_: Params, _: Payload| -> Result<Reply, HandlerError> { Ok(Reply::empty()) });
            Ok(Arc::new(module))
        }
    }

    fn fixture(config: ServerConfig) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let logger = Logger::default();
        let (notifier, mail) = ChannelNotifier::new(8);
        let notifier = Arc::new(notifier);
        let mailer = MailerConfig {
            enabled: None,
            apperrors: Some(AppErrorMail {
                to: vec!["ops@example.com".to_string()],
                ..AppErrorMail::default()
            }),
        };
        let reporter = Arc::new(ErrorReporter::new(logger.clone(), notifier.clone(), Some(mailer)));

        let mut registry = PluginRegistry::new();
        registry.register(WEB_PLUGIN, web_plugin(Arc::clone(&calls)));
        let ctx = PluginContext::new(json!({}), logger.clone(), notifier, Arc::clone(&reporter));

        let mut statics = Params::new();
        statics.insert("id".to_string(), json!("static"));

        let mut router = Router::new(PluginLoader::new(registry, ctx), logger);
        router
            .register_all(&[PluginRegistration {
                name: "web".to_string(),
                path: WEB_PLUGIN.to_string(),
                routes: Some(vec![
                    RouteDescriptor::new("GET", "/hello", "hello"),
                    RouteDescriptor::new("GET", "/json$", "json"),
                    RouteDescriptor::new("POST", "/echo", "echo"),
                    RouteDescriptor::new("GET", "/items", "params").with_params(statics),
                    RouteDescriptor::new("GET", "/fail", "fail"),
                    RouteDescriptor::new("GET", "/later", "later"),
                    RouteDescriptor::new("GET", "/nothing", "nothing"),
                    RouteDescriptor::new("GET", "/deferred-fail", "later_fail"),
                    RouteDescriptor::new("GET", "/panic", "boom"),
                    RouteDescriptor::new("HEAD", "/hello", "hello"),
                ]),
            }])
            .unwrap();

        Fixture {
            server: HttpServer::new(config, Arc::new(router), reporter),
            calls,
            mail,
        }
    }

    struct Answer {
        status: u16,
        headers: HashMap<String, String>,
        body: String,
    }

    fn parse_answer(raw: &[u8]) -> Answer {
        let text = String::from_utf8_lossy(raw).into_owned();
        let (head, body) = text.split_once("\r\n\r\n").expect("response has a head");
        let mut lines = head.lines();
        let status = lines.next().unwrap().split_whitespace().nth(1).unwrap().parse().unwrap();
        let headers = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();
        Answer {
            status,
            headers,
            body: body.to_string(),
        }
    }

    async fn exchange(fixture: &Fixture, request: impl Into<Vec<u8>>) -> Answer {
        let mut stream = MockTcpStream::new(request);
        HttpServer::handle_connection(&mut stream, None, fixture.server.state(), 1024)
            .await
            .unwrap();
        parse_answer(stream.written_data())
    }

    fn post(path: &str, body: &str) -> String {
        format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            addr: "127.0.0.1:8080".parse().unwrap(),
            max_connections: 100,
            read_buffer_size: 4096,
            max_body_size: 2048,
        };

        let fixture = fixture(config.clone());
        assert_eq!(fixture.server.config.addr, config.addr);
        assert_eq!(fixture.server.config.max_connections, 100);
        assert_eq!(fixture.server.state().max_body_size, 2048);
        assert_eq!(fixture.server.state().router.routes().len(), 10);
    }

    #[tokio::test]
    async fn test_text_reply() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 200);
        assert_eq!(answer.headers["content-type"], "text/plain");
        assert_eq!(answer.headers["connection"], "close");
        assert_eq!(answer.body, "hi");
    }

    #[tokio::test]
    async fn test_json_reply() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /json HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 200);
        assert_eq!(answer.headers["content-type"], "application/json");
        assert_eq!(serde_json::from_str::<Value>(&answer.body).unwrap(), json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn test_cors_headers_on_every_answer() {
        let fixture = fixture(ServerConfig::default());
        for request in [
            "GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n",
            "GET /missing HTTP/1.1\r\nHost: localhost\r\n\r\n",
            "GET /fail HTTP/1.1\r\nHost: localhost\r\n\r\n",
        ] {
            let answer = exchange(&fixture, request).await;
            assert_eq!(answer.headers["access-control-allow-origin"], "*");
            assert_eq!(answer.headers["access-control-request-method"], "*");
            assert_eq!(
                answer.headers["access-control-allow-methods"],
                "OPTIONS, GET, POST, PUT, PATCH, DELETE"
            );
            assert_eq!(answer.headers["access-control-allow-headers"], "*");
        }
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /missing HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 422);
        assert_eq!(answer.headers["content-type"], "text/plain");
        assert_eq!(answer.body, "Invalid or no route supplied");
    }

    #[tokio::test]
    async fn test_method_not_supported() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, post("/hello", "")).await;

        assert_eq!(answer.status, 405);
        assert_eq!(answer.body, "Specified route does not support POST");
    }

    #[tokio::test]
    async fn test_unroutable_method_on_known_path() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "TRACE /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 405);
        assert_eq!(answer.body, "Specified route does not support TRACE");
    }

    #[tokio::test]
    async fn test_unroutable_method_on_unknown_path() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "PROPFIND /missing HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 422);
        assert_eq!(answer.body, "Invalid or no route supplied");
    }

    #[tokio::test]
    async fn test_head_keeps_length_without_body() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "HEAD /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 200);
        assert_eq!(answer.headers["content-length"], "2");
        assert_eq!(answer.headers["content-type"], "text/plain");
        assert!(answer.body.is_empty());
    }

    #[tokio::test]
    async fn test_favicon_is_no_content() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 204);
        assert!(answer.body.is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_no_content() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /nothing HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 204);
        assert_eq!(answer.headers["content-length"], "0");
    }

    #[tokio::test]
    async fn test_json_body_reaches_handler() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, post("/echo", r#"{"test":"hello"}"#)).await;

        assert_eq!(answer.status, 200);
        assert_eq!(serde_json::from_str::<Value>(&answer.body).unwrap(), json!({ "test": "hello" }));
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_json_bodies_stay_text() {
        let fixture = fixture(ServerConfig::default());

        let answer = exchange(&fixture, post("/echo", "plain words")).await;
        assert_eq!(answer.headers["content-type"], "text/plain");
        assert_eq!(answer.body, "plain words");

        // A bare JSON scalar is not treated as JSON
        let answer = exchange(&fixture, post("/echo", "42")).await;
        assert_eq!(answer.headers["content-type"], "text/plain");
        assert_eq!(answer.body, "42");
    }

    #[tokio::test]
    async fn test_static_params_override_query() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(
            &fixture,
            "GET /items?id=5&page=2&tag=a&tag=b HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await;

        assert_eq!(
            serde_json::from_str::<Value>(&answer.body).unwrap(),
            json!({ "id": "static", "page": "2", "tag": ["a", "b"] })
        );
    }

    #[tokio::test]
    async fn test_deferred_reply_is_awaited() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /later HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 200);
        assert_eq!(serde_json::from_str::<Value>(&answer.body).unwrap(), json!({ "done": true }));
    }

    #[tokio::test]
    async fn test_failing_handler_is_hidden_and_reported() {
        let mut fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /fail HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 500);
        assert_eq!(answer.body, "Internal Server Error");
        assert!(!answer.body.contains("database"));

        let mail = fixture.mail.try_recv().unwrap();
        assert_eq!(mail.to, vec!["ops@example.com"]);
        assert!(mail.subject.starts_with("[hookr ERROR] Callback web.fail"));
        assert!(mail.text.unwrap_or_default().contains("database unreachable"));
    }

    #[tokio::test]
    async fn test_failing_deferred_reply_is_reported() {
        let mut fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /deferred-fail HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 500);
        assert_eq!(answer.body, "Internal Server Error");

        let mail = fixture.mail.try_recv().unwrap();
        assert!(mail.text.unwrap_or_default().contains("queue rejected the job"));
        assert!(fixture.mail.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_reported() {
        let mut fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /panic HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 500);
        assert_eq!(answer.body, "Internal Server Error");
        assert!(!answer.body.contains("exploded"));

        let mail = fixture.mail.try_recv().unwrap();
        let text = mail.text.unwrap_or_default();
        assert!(text.contains("handler exploded"));
        assert!(!text.contains("disabled backtrace"));
        assert!(fixture.mail.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_declared_body_over_limit() {
        let fixture = fixture(ServerConfig::default());
        let request = "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 1000001\r\n\r\n";
        let answer = exchange(&fixture, request).await;

        assert_eq!(answer.status, 413);
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit() {
        let fixture = fixture(ServerConfig {
            max_body_size: 16,
            ..ServerConfig::default()
        });
        let request = "POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
                       a\r\n0123456789\r\na\r\n0123456789\r\n0\r\n\r\n";
        let answer = exchange(&fixture, request).await;

        assert_eq!(answer.status, 413);
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chunked_body_within_limit() {
        let fixture = fixture(ServerConfig::default());
        let request = "POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
                       7\r\n{\"a\":1}\r\n0\r\n\r\n";
        let answer = exchange(&fixture, request).await;

        assert_eq!(answer.status, 200);
        assert_eq!(serde_json::from_str::<Value>(&answer.body).unwrap(), json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let fixture = fixture(ServerConfig::default());
        let answer = exchange(&fixture, "GET /hello HTTP/9.9\r\nHost: localhost\r\n\r\n").await;

        assert_eq!(answer.status, 400);
        assert!(answer.body.starts_with("Error parsing request"));
    }

    #[tokio::test]
    async fn test_closed_connection_writes_nothing() {
        let fixture = fixture(ServerConfig::default());
        let mut stream = MockTcpStream::new(Vec::<u8>::new());
        HttpServer::handle_connection(&mut stream, None, fixture.server.state(), 1024)
            .await
            .unwrap();
        assert!(stream.written_data().is_empty());
    }

    async fn send_over_tcp(addr: std::net::SocketAddr, request: &str) -> Answer {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        parse_answer(&raw)
    }

    #[tokio::test]
    async fn test_serves_over_tcp_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(fixture(ServerConfig::default()).server);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move { running.run(listener, shutdown_rx).await });

        let answer = send_over_tcp(addr, "GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(answer.status, 200);
        assert_eq!(answer.body, "hi");

        shutdown_tx.send(()).await.unwrap();
        time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(
            fixture(ServerConfig {
                max_connections: 0,
                ..ServerConfig::default()
            })
            .server,
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move { running.run(listener, shutdown_rx).await });

        // Rejected before anything is read, so send nothing
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let answer = parse_answer(&raw);
        assert_eq!(answer.status, 503);
        assert_eq!(answer.body, "Server is at capacity, please try again later");

        drop(shutdown_tx);
        time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
