//! Reference artifact repository for mason publish targets.
//!
//! Accepts `PUT`, `GET` and `HEAD` on arbitrary paths, the way an Artifactory
//! generic repository or an S3 bucket addressed path-style would. Uploads
//! carrying `X-Checksum-Md5`, `X-Checksum-Sha1` or `X-Checksum-Sha256` headers
//! are verified against the body and rejected with 409 on mismatch. When
//! credentials are configured, writes require matching HTTP basic auth.
//!
//! Objects live in memory and, when a data directory is given, are mirrored to
//! `{data_dir}/{path}`. Paths ending in `/` are directory markers.
//!
//! [`TestServer`] runs one on a random port for integration tests and keeps a
//! log of every request it saw.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use mason_signing::all_checksums_bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

const CHECKSUM_HEADERS: [(&str, usize); 3] = [
    ("x-checksum-md5", 0),
    ("x-checksum-sha1", 1),
    ("x-checksum-sha256", 2),
];

#[derive(Debug, Clone, Default)]
pub struct RepoOptions {
    /// Required basic auth `(username, password)` for writes. `None` accepts
    /// anonymous uploads.
    pub credentials: Option<(String, String)>,
    pub data_dir: Option<PathBuf>,
}

/// A stored object and the request headers it was uploaded with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    /// Lowercased header names.
    pub headers: BTreeMap<String, String>,
}

impl StoredObject {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
}

/// One entry of the `GET /` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub path: String,
    pub size: usize,
    pub sha256: String,
}

pub struct Store {
    options: RepoOptions,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Store {
    /// Create a store, loading any objects already present under the data
    /// directory.
    pub fn new(options: RepoOptions) -> io::Result<Self> {
        let mut objects = BTreeMap::new();
        if let Some(dir) = &options.data_dir {
            fs::create_dir_all(dir)?;
            load_tree(dir, dir, &mut objects)?;
            debug!("loaded {} objects from {}", objects.len(), dir.display());
        }
        Ok(Self {
            options,
            objects: RwLock::new(objects),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.options.data_dir.as_deref()
    }

    pub fn put(&self, path: &str, object: StoredObject) -> io::Result<()> {
        if let Some(dir) = &self.options.data_dir {
            let target = dir.join(path.trim_start_matches('/'));
            if path.ends_with('/') {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, &object.body)?;
            }
        }
        self.objects
            .write()
            .expect("object lock poisoned")
            .insert(path.to_owned(), object);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .expect("object lock poisoned")
            .get(path)
            .cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .read()
            .expect("object lock poisoned")
            .contains_key(path)
    }

    pub fn list(&self) -> Vec<ObjectSummary> {
        self.objects
            .read()
            .expect("object lock poisoned")
            .iter()
            .map(|(path, obj)| ObjectSummary {
                path: path.clone(),
                size: obj.body.len(),
                sha256: all_checksums_bytes(&obj.body).sha256,
            })
            .collect()
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    fn record(&self, req: RecordedRequest) {
        self.requests.lock().expect("request log poisoned").push(req);
    }

    fn authorized(&self, header: Option<&str>) -> bool {
        let Some((user, pass)) = &self.options.credentials else {
            return true;
        };
        let expected = format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")));
        header == Some(expected.as_str())
    }
}

fn load_tree(
    root: &Path,
    dir: &Path,
    out: &mut BTreeMap<String, StoredObject>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let key = format!("/{}", rel.to_string_lossy().replace('\\', "/"));
        if entry.file_type()?.is_dir() {
            out.insert(format!("{key}/"), StoredObject::default());
            load_tree(root, &path, out)?;
        } else {
            out.insert(
                key,
                StoredObject {
                    body: fs::read(&path)?,
                    headers: BTreeMap::new(),
                },
            );
        }
    }
    Ok(())
}

/// Strip the query string, percent-decode, and reject paths that are relative
/// or climb out of the repository root.
pub fn normalize_path(url: &str) -> Option<String> {
    let raw = url.split(['?', '#']).next().unwrap_or_default();
    let path = urlencoding::decode(raw).ok()?;
    if !path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some(path.into_owned())
}

/// Compare the `X-Checksum-*` headers present on an upload against its body.
/// Returns the first mismatching header name.
pub fn checksum_mismatch(body: &[u8], headers: &BTreeMap<String, String>) -> Option<&'static str> {
    let sums = all_checksums_bytes(body);
    let actual = [&sums.md5, &sums.sha1, &sums.sha256];
    CHECKSUM_HEADERS.into_iter().find_map(|(name, idx)| {
        let claimed = headers.get(name)?;
        (!claimed.eq_ignore_ascii_case(actual[idx])).then_some(name)
    })
}

fn header_map(req: &Request) -> BTreeMap<String, String> {
    req.headers()
        .iter()
        .map(|h| {
            (
                h.field.as_str().as_str().to_ascii_lowercase(),
                h.value.as_str().to_owned(),
            )
        })
        .collect()
}

fn respond_err(req: Request, code: u16, msg: &str) {
    let _ = req.respond(Response::from_string(msg).with_status_code(StatusCode(code)));
}

fn respond_json(req: Request, json: impl Into<Vec<u8>>) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(Response::from_data(json.into()).with_header(header));
}

fn respond_unauthorized(req: Request) {
    let challenge = Header::from_bytes("WWW-Authenticate", "Basic realm=\"mason-repo\"")
        .expect("valid header");
    let _ = req.respond(
        Response::from_string("unauthorized")
            .with_status_code(StatusCode(401))
            .with_header(challenge),
    );
}

fn read_body(req: &mut Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn handle_put(store: &Store, mut req: Request, path: &str, headers: BTreeMap<String, String>) {
    if !store.authorized(headers.get("authorization").map(String::as_str)) {
        warn!("PUT {path}: rejected credentials");
        respond_unauthorized(req);
        return;
    }
    let Some(body) = read_body(&mut req) else {
        respond_err(req, 500, "read error");
        return;
    };
    if let Some(header) = checksum_mismatch(&body, &headers) {
        warn!("PUT {path}: {header} does not match body");
        respond_err(req, 409, &format!("{header} mismatch"));
        return;
    }
    let size = body.len();
    match store.put(path, StoredObject { body, headers }) {
        Ok(()) => {
            info!("PUT {path}: {size} bytes");
            let _ = req.respond(Response::from_string("created").with_status_code(StatusCode(201)));
        }
        Err(e) => {
            error!("PUT {path}: {e}");
            respond_err(req, 500, &format!("write error: {e}"));
        }
    }
}

/// Handle a single HTTP request.
pub fn handle_request(store: &Store, req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let Some(path) = normalize_path(&url) else {
        respond_err(req, 400, "invalid path");
        return;
    };
    let headers = header_map(&req);
    store.record(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        headers: headers.clone(),
    });

    match method {
        Method::Put => handle_put(store, req, &path, headers),
        Method::Get if path == "/" => {
            let json = serde_json::to_string(&store.list()).unwrap_or_else(|_| "[]".to_owned());
            respond_json(req, json);
        }
        Method::Get if path == "/health" => {
            respond_json(req, r#"{"status":"ok"}"#);
        }
        Method::Get => match store.get(&path) {
            Some(obj) => {
                let header = Header::from_bytes("Content-Type", "application/octet-stream")
                    .expect("valid header");
                let _ = req.respond(Response::from_data(obj.body).with_header(header));
            }
            None => respond_err(req, 404, "not found"),
        },
        Method::Head => {
            let code = if store.contains(&path) { 200 } else { 404 };
            let _ = req.respond(Response::empty(StatusCode(code)));
        }
        _ => respond_err(req, 405, "method not allowed"),
    }
}

/// Serve requests on `addr`, blocking the current thread.
pub fn run_server(
    store: &Arc<Store>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(addr)?;
    for request in server.incoming_requests() {
        handle_request(store, request);
    }
    Ok(())
}

/// A repository on `127.0.0.1` with a random port, served from a background
/// thread. Dropping it stops the server.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    store: Arc<Store>,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    pub fn start(options: RepoOptions) -> Self {
        let store = Arc::new(Store::new(options).expect("failed to create test store"));
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let srv = Arc::clone(&server);
        let st = Arc::clone(&store);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&st, request);
            }
        });

        Self {
            url,
            port,
            store,
            server,
            _handle: handle,
        }
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.store.get(path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.store.requests()
    }

    /// Insert an object directly, bypassing HTTP and the request log.
    pub fn seed(&self, path: &str, body: &[u8]) {
        self.store
            .put(
                path,
                StoredObject {
                    body: body.to_vec(),
                    headers: BTreeMap::new(),
                },
            )
            .expect("failed to seed test object");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
