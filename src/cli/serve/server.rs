//! HTTP server for the contact API.

use anyhow::Result;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ApiResponse, ContactListResponse, HealthResponse, UpsertResponse};
use crate::config::AppConfig;
use crate::db::{Database, StoreError, StoreOptions};
use crate::validate::ContactCreateRequest;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(15);
/// Request bodies larger than this are refused.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP server for the contact API. Every connection is served on its own
/// thread with its own database connection and a deadline of
/// `request_timeout`.
pub struct ContactServer {
    listener: TcpListener,
    handler: Arc<RequestHandler>,
}

/// Per-request state shared by the connection threads.
struct RequestHandler {
    db_path: PathBuf,
    options: StoreOptions,
    request_timeout: Duration,
    start_time: Instant,
}

impl ContactServer {
    /// Bind the listener and make sure the database opens (and is migrated).
    pub fn bind(addr: impl ToSocketAddrs, config: &AppConfig) -> Result<Self> {
        config.open_database()?;

        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            handler: Arc::new(RequestHandler {
                db_path: config.db_path.clone(),
                options: config.store.clone(),
                request_timeout: config.request_timeout,
                start_time: Instant::now(),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is set (blocking).
    pub fn start(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        info!(addr = %self.local_addr()?, "contact server listening");
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while !shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let handler = Arc::clone(&self.handler);
                    workers.retain(|w| !w.is_finished());
                    workers.push(std::thread::spawn(move || {
                        if let Err(e) = handler.handle_connection(stream, peer_addr) {
                            error!(%peer_addr, "request error: {:#}", e);
                        }
                    }));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!("accept error: {}", e);
                }
            }
        }

        info!(
            in_flight = workers.iter().filter(|w| !w.is_finished()).count(),
            "contact server stopped accepting connections"
        );
        // Socket timeouts bound how long an in-flight request can take
        for worker in workers {
            let _ = worker.join();
        }
        Ok(())
    }
}

impl RequestHandler {
    fn handle_connection(&self, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
        stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;
        let started = Instant::now();

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            let response: ApiResponse<()> = ApiResponse::err("malformed request line");
            self.send_json_response(&mut stream, 400, &response)?;
            return Ok(());
        }

        let method = parts[0];
        let target = parts[1];
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        // Parse headers
        let mut headers = HashMap::new();
        let mut content_length = 0usize;

        loop {
            let mut header_line = String::new();
            reader.read_line(&mut header_line)?;
            let header_line = header_line.trim();
            if header_line.is_empty() {
                break;
            }
            if let Some((key, value)) = header_line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();
                if key == "content-length" {
                    content_length = value.parse().unwrap_or(0);
                }
                headers.insert(key, value);
            }
        }
        debug!(%peer_addr, method, path, ?headers, "request headers");

        if content_length > MAX_BODY_BYTES {
            let response: ApiResponse<()> = ApiResponse::err("request body too large");
            self.send_json_response(&mut stream, 413, &response)?;
            return Ok(());
        }

        // Read body
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            reader.read_exact(&mut body)?;
        }

        let status = self.route(&mut stream, method, path, query, &body)?;

        info!(
            %peer_addr,
            method,
            path,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request handled"
        );
        Ok(())
    }

    fn route(
        &self,
        stream: &mut TcpStream,
        method: &str,
        path: &str,
        query: &str,
        body: &[u8],
    ) -> Result<u16> {
        let path = path.trim_end_matches('/');

        match (method, path) {
            ("GET", "/health") => self.handle_health(stream),
            ("POST", "/api/contacts") => self.handle_upsert(stream, body),
            ("GET", "/api/contacts") => self.handle_list(stream, query),
            ("GET", p) if p.starts_with("/api/contacts/") => {
                let id = p.strip_prefix("/api/contacts/").unwrap_or("");
                self.handle_get(stream, id)
            }
            (_, "/api/contacts") | (_, "/health") => {
                let response: ApiResponse<()> = ApiResponse::err("method not allowed");
                self.send_json_response(stream, 405, &response)
            }
            _ => {
                let response: ApiResponse<()> = ApiResponse::err("not found");
                self.send_json_response(stream, 404, &response)
            }
        }
    }

    /// Per-request connection bounded by the request deadline.
    fn open_db(&self) -> Result<Database> {
        let db = Database::open_at(&self.db_path, self.options.clone())?;
        db.set_deadline(Some(Instant::now() + self.request_timeout))?;
        Ok(db)
    }

    /// Health check endpoint.
    fn handle_health(&self, stream: &mut TcpStream) -> Result<u16> {
        let counted = self
            .open_db()
            .and_then(|db| db.count_contacts().map_err(anyhow::Error::from));
        let contacts = match counted {
            Ok(count) => count,
            Err(e) => {
                warn!("health check failed: {:#}", e);
                let response: ApiResponse<()> = ApiResponse::err("database unavailable");
                return self.send_json_response(stream, 503, &response);
            }
        };

        let health = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            contacts,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        self.send_json_response(stream, 200, &ApiResponse::ok(health))
    }

    /// Create a contact or merge tags onto the existing one.
    fn handle_upsert(&self, stream: &mut TcpStream, body: &[u8]) -> Result<u16> {
        let mut req: ContactCreateRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                let response: ApiResponse<()> = ApiResponse::err(format!("invalid json: {}", e));
                return self.send_json_response(stream, 400, &response);
            }
        };

        let errors = req.validate();
        if !errors.is_empty() {
            let response: ApiResponse<()> = ApiResponse::invalid(errors);
            return self.send_json_response(stream, 400, &response);
        }

        let db = self.open_db()?;
        match db.upsert_contact(&req.into_input()) {
            Ok(id) => self.send_json_response(stream, 201, &ApiResponse::ok(UpsertResponse { id })),
            Err(e) => self.send_store_error(stream, &e),
        }
    }

    /// List contacts. Bad `limit`/`offset` values fall back to defaults.
    fn handle_list(&self, stream: &mut TcpStream, query: &str) -> Result<u16> {
        let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let limit = params
            .get("limit")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let offset = params
            .get("offset")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let with_tags = params
            .get("tags")
            .map_or(false, |v| matches!(v.as_str(), "1" | "true" | "yes"));

        let db = self.open_db()?;
        let result = if with_tags {
            db.list_contacts_with_tags(limit, offset)
        } else {
            db.list_contacts(limit, offset)
        };

        match result {
            Ok(contacts) => {
                let (limit, offset) = crate::db::clamp_page(limit, offset);
                let response = ApiResponse::ok(ContactListResponse {
                    count: contacts.len(),
                    contacts,
                    limit,
                    offset,
                });
                self.send_json_response(stream, 200, &response)
            }
            Err(e) => self.send_store_error(stream, &e),
        }
    }

    /// Get one contact with its tags.
    fn handle_get(&self, stream: &mut TcpStream, id: &str) -> Result<u16> {
        let id: i64 = match id.parse() {
            Ok(id) => id,
            Err(_) => {
                let response: ApiResponse<()> = ApiResponse::err("contact id must be an integer");
                return self.send_json_response(stream, 400, &response);
            }
        };

        let db = self.open_db()?;
        match db.get_contact_by_id(id) {
            Ok(Some(contact)) => self.send_json_response(stream, 200, &ApiResponse::ok(contact)),
            Ok(None) => {
                let response: ApiResponse<()> = ApiResponse::err("contact not found");
                self.send_json_response(stream, 404, &response)
            }
            Err(e) => self.send_store_error(stream, &e),
        }
    }

    fn send_store_error(&self, stream: &mut TcpStream, err: &StoreError) -> Result<u16> {
        let (status, message) = match err {
            StoreError::EmailRequired | StoreError::TagsRequired => (422, err.to_string()),
            e if e.is_timeout() => {
                warn!("store deadline exceeded: {}", e);
                (503, "request timed out".to_string())
            }
            StoreError::Storage(e) => {
                error!("storage failure: {}", e);
                (500, "internal server error".to_string())
            }
        };

        let response: ApiResponse<()> = ApiResponse::err(message);
        self.send_json_response(stream, status, &response)
    }

    fn send_json_response<T: serde::Serialize>(
        &self,
        stream: &mut TcpStream,
        status: u16,
        body: &T,
    ) -> Result<u16> {
        let status_text = match status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Payload Too Large",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        };

        let json_body = serde_json::to_string(body)?;

        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status, status_text, json_body.len(), json_body
        );

        stream.write_all(response.as_bytes())?;
        stream.flush()?;
        Ok(status)
    }
}
