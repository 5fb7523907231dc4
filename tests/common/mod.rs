//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lb_configurator::config::RegistryConfig;
use lb_configurator::render::{
    FsWriter, JinjaEngine, ProxyReloader, ReloadError, RenderPipeline, StatsCredentials,
};

/// What the mock registry answers to one request.
pub enum Reply {
    /// A complete response with `Content-Length`.
    Full {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    },
    /// Newline-delimited lines written one at a time. With `hold_open` the
    /// connection stays open after the last line, like a live watch.
    Stream { lines: Vec<String>, hold_open: bool },
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Reply::Full {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Reply::Full {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_index(status: u16, index: u64, body: impl Into<String>) -> Self {
        Reply::Full {
            status,
            headers: vec![("X-Etcd-Index", index.to_string())],
            body: body.into(),
        }
    }
}

/// Requests seen by the mock, in arrival order (path and query).
pub type RequestLog = Arc<Mutex<Vec<String>>>;

/// Start a programmable mock registry on an ephemeral port.
///
/// `handler` maps the request target (path plus query) to a reply.
pub async fn start_registry<F>(handler: F) -> (SocketAddr, RequestLog)
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let accept_log = log.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let handler = handler.clone();
                    let log = accept_log.clone();
                    tokio::spawn(async move {
                        serve(socket, handler.as_ref(), &log).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, log)
}

async fn serve<F>(mut socket: TcpStream, handler: &F, log: &RequestLog)
where
    F: Fn(&str) -> Reply,
{
    let Some(target) = read_request_target(&mut socket).await else {
        return;
    };
    log.lock().unwrap().push(target.clone());

    match handler(&target) {
        Reply::Full { status, headers, body } => {
            let mut head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                status,
                reason(status),
                body.len()
            );
            for (name, value) in headers {
                head.push_str(&format!("{}: {}\r\n", name, value));
            }
            head.push_str("\r\n");
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Reply::Stream { lines, hold_open } => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for line in lines {
                if socket.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            if hold_open {
                std::future::pending::<()>().await;
            }
            let _ = socket.shutdown().await;
        }
        Reply::Hang => std::future::pending::<()>().await,
    }
}

async fn read_request_target(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    request_line.split_whitespace().nth(1).map(str::to_string)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Registry config pointing both endpoints at the mock.
pub fn registry_config(addr: SocketAddr) -> RegistryConfig {
    RegistryConfig {
        base_url: format!("http://{}", addr),
        store_url: format!("http://{}", addr),
        ..RegistryConfig::default()
    }
}

/// Counts reload invocations instead of running a proxy.
#[derive(Clone, Default)]
pub struct CountingReloader {
    pub reloads: Arc<AtomicUsize>,
}

impl CountingReloader {
    pub fn count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyReloader for CountingReloader {
    async fn reload(&self, _config_path: &Path) -> Result<(), ReloadError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A fresh scratch directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lbc-it-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A real pipeline writing into `dir`, with a counting reloader.
pub fn pipeline(dir: &Path) -> (RenderPipeline, CountingReloader) {
    let reloader = CountingReloader::default();
    let writer = FsWriter::new(dir.join("haproxy.cfg"), dir.join("ssl")).unwrap();
    let pipeline = RenderPipeline::new(
        Box::new(JinjaEngine::new()),
        Box::new(writer),
        Box::new(reloader.clone()),
        StatsCredentials {
            username: "stats".into(),
            password: Some("secret".into()),
        },
        false,
    );
    (pipeline, reloader)
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// A pod object as JSON.
pub fn pod_json(name: &str, namespace: &str, uid: &str, app: &str, ready: bool) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": uid,
            "resourceVersion": "1",
            "labels": {"app": app}
        },
        "status": {
            "podIP": "10.1.0.7",
            "containerStatuses": [
                {"name": "app", "image": "app:1", "imageID": "", "restartCount": 0, "ready": ready}
            ]
        }
    })
}

/// A config map in the configurator's namespace.
pub fn config_map_json(name: &str, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": "lb", "resourceVersion": "1"},
        "data": data
    })
}

/// The `services` config map with one `api` service in `ns1`.
pub fn services_json() -> serde_json::Value {
    config_map_json(
        "services",
        serde_json::json!({"api": r#"{"namespace":"ns1","selector":{"app":"api"}}"#}),
    )
}

/// A secret in the configurator's namespace; `data` values are already base64.
pub fn secret_json(name: &str, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": "lb", "resourceVersion": "1"},
        "data": data
    })
}

/// True for the cluster API's watch requests (as opposed to listings).
pub fn is_watch(target: &str) -> bool {
    target.contains("watch=true")
}

/// A list response as the cluster API sends it.
pub fn list_reply(kind: &str, items: Vec<serde_json::Value>) -> Reply {
    Reply::json(
        serde_json::json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"resourceVersion": "1"},
            "items": items
        })
        .to_string(),
    )
}

/// One line of a watch response.
pub fn watch_line(event_type: &str, object: serde_json::Value) -> String {
    serde_json::json!({"type": event_type, "object": object}).to_string()
}

/// A watch that delivers `lines` and then stays open.
pub fn watch_reply(lines: Vec<String>) -> Reply {
    Reply::Stream { lines, hold_open: true }
}

/// Template used across scenarios: one backend per service, one crt per bundle.
pub const TEMPLATE: &str = "\
{% for s in services %}backend {{ s.name }}\n\
{% for name, pod in s.pods.items() %}  server {{ name }} {{ pod.status.podIP }}\n{% endfor %}\
{% endfor %}\
{% for c in certificates %}crt {{ c }}.pem\n{% endfor %}";
