//! Test utilities and fake upstreams for Shroud
//!
//! This module provides common test utilities used across integration tests:
//! a relay on an ephemeral port, plain and TLS echo targets, minimal SOCKS4
//! and SOCKS5 proxies, and fake REST and gateway upstreams.

#![allow(dead_code)]

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use shroud::transport::{DirectDialer, SocketOpts};
use shroud::tunnel::RelayServer;
use std::convert::Infallible;
use std::io::BufReader;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as WsRequest, Response as WsResponse,
};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Address nothing is listening on
pub async fn closed_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Echo server accepting any number of connections
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = socket.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

/// Running relay; dropping it stops the listener
pub struct TestRelay {
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Start a relay dialing destinations directly
pub async fn spawn_relay() -> TestRelay {
    let server = RelayServer::bind_with_dialer(
        &["127.0.0.1:0".to_string()],
        Arc::new(DirectDialer::default()),
        SocketOpts::default(),
    )
    .await
    .unwrap();
    start_relay(server)
}

/// Start a relay chaining through `proxy`
pub async fn spawn_relay_with_proxy(proxy: &str) -> TestRelay {
    let config = shroud::config::RelayConfig {
        listeners: vec!["127.0.0.1:0".to_string()],
        proxy: Some(proxy.to_string()),
        tcp: Default::default(),
        connect_timeout: 5,
    };
    start_relay(RelayServer::bind(&config).await.unwrap())
}

fn start_relay(server: RelayServer) -> TestRelay {
    let addr = server.local_addrs()[0];
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(server.run(shutdown_rx));
    TestRelay { addr, shutdown_tx }
}

/// CONNECT request observed by the test SOCKS5 proxy
#[derive(Debug, Clone, PartialEq)]
pub struct SocksRequest {
    /// Destination as sent by the client (IP literal or domain)
    pub host: String,
    pub port: u16,
    /// Whether the destination was sent as a domain name
    pub domain: bool,
    pub credentials: Option<(String, String)>,
}

/// Minimal SOCKS5 proxy supporting no-auth and username/password
///
/// Every CONNECT request is reported on the returned channel before the proxy
/// dials the destination and pipes bytes.
pub async fn spawn_socks5_proxy(
    require_auth: bool,
) -> (SocketAddr, mpsc::UnboundedReceiver<SocksRequest>) {
    let (listener, addr) = create_test_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = serve_socks5(socket, require_auth, tx).await;
            });
        }
    });

    (addr, rx)
}

async fn serve_socks5(
    mut socket: TcpStream,
    require_auth: bool,
    tx: mpsc::UnboundedSender<SocksRequest>,
) -> std::io::Result<()> {
    let mut greeting = [0u8; 2];
    socket.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; greeting[1] as usize];
    socket.read_exact(&mut methods).await?;

    let mut credentials = None;
    if require_auth {
        if !methods.contains(&2) {
            socket.write_all(&[5, 0xff]).await?;
            return Ok(());
        }
        socket.write_all(&[5, 2]).await?;

        let mut ver_ulen = [0u8; 2];
        socket.read_exact(&mut ver_ulen).await?;
        let mut user = vec![0u8; ver_ulen[1] as usize];
        socket.read_exact(&mut user).await?;
        let mut plen = [0u8; 1];
        socket.read_exact(&mut plen).await?;
        let mut pass = vec![0u8; plen[0] as usize];
        socket.read_exact(&mut pass).await?;
        socket.write_all(&[1, 0]).await?;

        credentials = Some((
            String::from_utf8_lossy(&user).into_owned(),
            String::from_utf8_lossy(&pass).into_owned(),
        ));
    } else {
        socket.write_all(&[5, 0]).await?;
    }

    let mut head = [0u8; 4];
    socket.read_exact(&mut head).await?;

    let (host, domain) = match head[3] {
        1 => {
            let mut ip = [0u8; 4];
            socket.read_exact(&mut ip).await?;
            (std::net::Ipv4Addr::from(ip).to_string(), false)
        }
        3 => {
            let mut len = [0u8; 1];
            socket.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            socket.read_exact(&mut name).await?;
            (String::from_utf8_lossy(&name).into_owned(), true)
        }
        _ => {
            socket.write_all(&[5, 8, 0, 1, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
    };

    let mut port = [0u8; 2];
    socket.read_exact(&mut port).await?;
    let port = u16::from_be_bytes(port);

    let _ = tx.send(SocksRequest {
        host: host.clone(),
        port,
        domain,
        credentials,
    });

    let target = match TcpStream::connect((host.as_str(), port)).await {
        Ok(target) => target,
        Err(_) => {
            socket.write_all(&[5, 5, 0, 1, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
    };

    socket.write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 0]).await?;
    shroud::helper::pipe_streams(socket, target).await;
    Ok(())
}

/// CONNECT request observed by the test SOCKS4 proxy
#[derive(Debug, Clone, PartialEq)]
pub struct Socks4Request {
    /// IPv4 destination, or the host name for a SOCKS4a request
    pub host: String,
    pub port: u16,
    /// Whether the request used the SOCKS4a `0.0.0.x` marker
    pub domain: bool,
    pub user_id: String,
}

/// Minimal SOCKS4/4a proxy
///
/// Every CONNECT request is reported on the returned channel before the proxy
/// dials the destination and pipes bytes.
pub async fn spawn_socks4_proxy() -> (SocketAddr, mpsc::UnboundedReceiver<Socks4Request>) {
    let (listener, addr) = create_test_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = serve_socks4(socket, tx).await;
            });
        }
    });

    (addr, rx)
}

async fn read_nul_terminated(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = socket.read_u8().await?;
        if byte == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.push(byte);
    }
}

async fn serve_socks4(
    mut socket: TcpStream,
    tx: mpsc::UnboundedSender<Socks4Request>,
) -> std::io::Result<()> {
    let mut head = [0u8; 8];
    socket.read_exact(&mut head).await?;
    if head[0] != 4 || head[1] != 1 {
        socket.write_all(&[0, 91, 0, 0, 0, 0, 0, 0]).await?;
        return Ok(());
    }

    let port = u16::from_be_bytes([head[2], head[3]]);
    let ip = Ipv4Addr::new(head[4], head[5], head[6], head[7]);
    let user_id = read_nul_terminated(&mut socket).await?;

    let domain = head[4..7] == [0, 0, 0] && head[7] != 0;
    let host = if domain {
        read_nul_terminated(&mut socket).await?
    } else {
        ip.to_string()
    };

    let _ = tx.send(Socks4Request {
        host: host.clone(),
        port,
        domain,
        user_id,
    });

    let target = match TcpStream::connect((host.as_str(), port)).await {
        Ok(target) => target,
        Err(_) => {
            socket.write_all(&[0, 91, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
    };

    socket.write_all(&[0, 90, 0, 0, 0, 0, 0, 0]).await?;
    shroud::helper::pipe_streams(socket, target).await;
    Ok(())
}

/// PEM file of the CA that signed the test server certificate
pub fn test_ca_path() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/ca.pem").to_string()
}

/// Acceptor serving the `localhost` / `127.0.0.1` test certificate
pub fn test_tls_acceptor() -> TlsAcceptor {
    let fixture = |name: &str| {
        let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
        BufReader::new(std::fs::File::open(path).unwrap())
    };

    let certs = rustls_pemfile::certs(&mut fixture("server.pem"))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut fixture("server.key"))
        .unwrap()
        .unwrap();

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// TLS echo server; reports the SNI of every accepted session
pub async fn spawn_tls_echo_server() -> (SocketAddr, mpsc::UnboundedReceiver<Option<String>>) {
    let (listener, addr) = create_test_listener().await;
    let acceptor = test_tls_acceptor();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(socket).await else {
                    return;
                };
                let _ = tx.send(stream.get_ref().1.server_name().map(str::to_string));

                let (mut r, mut w) = tokio::io::split(stream);
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });

    (addr, rx)
}

/// HTTPS server answering every request with `secure hello`
pub async fn spawn_tls_http_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    let acceptor = test_tls_acceptor();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(socket).await else {
                    return;
                };
                let service = service_fn(|_req: Request<Incoming>| async {
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(
                        b"secure hello",
                    ))))
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// Fake REST upstream mounted under `/api`
pub struct FakeApi {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl FakeApi {
    /// Base URL to configure as `api_base`
    pub fn base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Number of requests that reached the upstream
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn fake_api(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let authorization = header("authorization");
    let accept_encoding = header("accept-encoding");

    let body = req.into_body().collect().await.map(|b| b.to_bytes()).unwrap_or_default();

    let response = match path.as_str() {
        "/api/v10/gateway/bot" => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/json")
            .header("x-accept-encoding-seen", accept_encoding.is_some().to_string())
            .body(Full::new(Bytes::from(
                json!({"url": "wss://real-gateway", "shards": 1}).to_string(),
            ))),
        "/api/limited" => Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("content-type", "application/json")
            .header("retry-after", "1")
            .body(Full::new(Bytes::from(
                json!({"message": "You are being rate limited.", "retry_after": 1.0}).to_string(),
            ))),
        _ => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/json")
            .header("location", "/somewhere-else")
            .header("content-range", "bytes 0-1/2")
            .header("x-upstream", "fake")
            .body(Full::new(Bytes::from(
                json!({
                    "method": method,
                    "path": path,
                    "query": query,
                    "authorization": authorization,
                    "body": String::from_utf8_lossy(&body),
                })
                .to_string(),
            ))),
    };

    Ok(response.unwrap())
}

/// Start the fake REST upstream
pub async fn spawn_fake_api() -> FakeApi {
    let (listener, addr) = create_test_listener().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    fake_api(req)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    FakeApi { addr, hits }
}

/// Something the fake gateway observed
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Path and query of the upgrade request
    Connected(String),
    /// A data frame from the facade
    Frame(Value),
    /// A close frame from the facade: code and reason
    Closed(Option<(u16, String)>),
}

/// Start a fake gateway upstream
///
/// - identify (`op` 2) is answered with a READY dispatch
/// - `{"op": 99, "d": "close"}` makes the gateway close with `4000 going away`
/// - every other frame is recorded only
pub async fn spawn_fake_gateway() -> (SocketAddr, mpsc::UnboundedReceiver<GatewayEvent>) {
    let (listener, addr) = create_test_listener().await;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let path_tx = tx.clone();
                let callback = move |req: &WsRequest, resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
                    let path = req
                        .uri()
                        .path_and_query()
                        .map(|pq| pq.as_str().to_string())
                        .unwrap_or_default();
                    let _ = path_tx.send(GatewayEvent::Connected(path));
                    Ok(resp)
                };

                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };

                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Text(text) => {
                            let Ok(payload) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            let _ = tx.send(GatewayEvent::Frame(payload.clone()));

                            if payload["op"] == 2 {
                                let ready = json!({
                                    "op": 0,
                                    "t": "READY",
                                    "s": 1,
                                    "d": {
                                        "session_id": "session-1",
                                        "resume_gateway_url": "wss://resume.real-gateway"
                                    }
                                });
                                let _ = ws.send(Message::Text(ready.to_string())).await;
                            } else if payload["op"] == 99 && payload["d"] == "close" {
                                let _ = ws
                                    .close(Some(CloseFrame {
                                        code: CloseCode::from(4000),
                                        reason: "going away".into(),
                                    }))
                                    .await;
                            }
                        }
                        Message::Close(frame) => {
                            let _ = tx.send(GatewayEvent::Closed(
                                frame.map(|f| (u16::from(f.code), f.reason.to_string())),
                            ));
                            break;
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_listener() {
        let (listener, addr) = create_test_listener().await;
        assert!(addr.port() > 0);
        drop(listener);
    }

    #[tokio::test]
    async fn test_echo_server() {
        let addr = spawn_echo_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }
}
