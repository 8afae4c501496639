//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection. Every handler returns a
//! complete `Full<Bytes>` response; documents are small enough to buffer.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::Args;
use crate::protocol::{RelayConfig, SigningRelay};
use crate::retention::{self, RetentionPolicy, RetentionSweeper};
use crate::routes;
use crate::session::{SessionKind, SessionRegistry};
use crate::store::{DocumentStore, FileDocumentStore, MemoryDocumentStore};
use crate::types::{RelayError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub relay: Arc<SigningRelay>,
    pub sweeper: Arc<RetentionSweeper>,
    pub started_at: Instant,
}

impl AppState {
    /// Build state from configuration: wall clock, file-backed store when
    /// `STORAGE_DIR` is set, memory otherwise
    pub async fn new(args: Args) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match &args.storage_dir {
            Some(dir) => Arc::new(FileDocumentStore::new(dir, args.max_payload_bytes).await?),
            None => Arc::new(MemoryDocumentStore::new(args.max_payload_bytes)),
        };
        Ok(Self::with_parts(args, Arc::new(SystemClock::new()), store))
    }

    /// Build state from explicit parts
    pub fn with_parts(args: Args, clock: Arc<dyn Clock>, store: Arc<dyn DocumentStore>) -> Self {
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&clock)));
        let relay = Arc::new(SigningRelay::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            RelayConfig {
                signed_suffix: args.signed_suffix.clone(),
            },
        ));
        let sweeper = Arc::new(RetentionSweeper::new(
            registry,
            store,
            clock,
            RetentionPolicy {
                session_ttl: args.session_ttl(),
                prestage_ttl: args.prestage_ttl(),
                grace_window: args.grace_window(),
            },
        ));
        Self {
            args,
            relay,
            sweeper,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listen = state.args.listen;
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| RelayError::Internal(format!("Failed to bind {}: {}", listen, e)))?;

    info!(
        "Signer relay listening on {} ({} document store)",
        listen,
        state.relay.store().backend()
    );

    retention::spawn_sweeper_tasks(
        Arc::clone(&state.sweeper),
        state.args.sweep_interval(),
        state.args.prestage_sweep_interval(),
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move {
                            debug!("[{}] {} {}", addr, req.method(), req.uri().path());
                            Ok::<_, Infallible>(handle_request(state, req).await)
                        }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route an HTTP request
pub async fn handle_request<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    if method == Method::OPTIONS {
        return routes::preflight_response();
    }

    let body_limit = match (&method, segments.as_slice()) {
        (&Method::PUT, ["sessions", _, "upload"]) => state.args.max_payload_bytes,
        _ => state.args.max_body_bytes(),
    };
    let body = match routes::read_body(&parts.headers, body, body_limit).await {
        Ok(b) => b,
        Err(e) => return routes::error_response(e),
    };
    let content_type = routes::content_type(&parts.headers);

    match (&method, segments.as_slice()) {
        (&Method::GET, [""]) => routes::root_banner(),

        (&Method::GET, ["health"]) | (&Method::GET, ["healthz"]) => routes::health_check(&state),

        (&Method::POST, ["sessions"]) => {
            let base = base_url(&state.args, &parts.headers);
            routes::handle_create(&state, &base, body, SessionKind::Standard).await
        }

        (&Method::POST, ["prestage"]) => {
            let base = base_url(&state.args, &parts.headers);
            routes::handle_create(&state, &base, body, SessionKind::Prestaged).await
        }

        (&Method::GET, ["servlet"]) | (&Method::POST, ["servlet"]) => {
            routes::handle_servlet(&state, query.as_deref(), content_type, body).await
        }

        (m, ["sessions", id, action]) => {
            let id = urlencoding::decode(id)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| id.to_string());
            match (m, *action) {
                (&Method::PUT, "upload") => routes::handle_upload(&state, &id, body).await,
                (&Method::GET, "original") => routes::handle_original(&state, &id).await,
                (&Method::POST, "signed") => {
                    routes::handle_submit(&state, &id, content_type, body).await
                }
                (&Method::GET, "signed") => {
                    routes::handle_submit_query(&state, &id, query.as_deref()).await
                }
                (&Method::GET, "retrieve") => routes::handle_retrieve(&state, &id).await,
                (&Method::GET, "status") => routes::handle_status(&state, &id),
                (&Method::GET, "download") => routes::handle_download(&state, &id).await,
                _ => routes::not_found_response(&path),
            }
        }

        _ => routes::not_found_response(&path),
    }
}

/// Base URL for links handed to the browser and the signer
fn base_url(args: &Args, headers: &hyper::HeaderMap) -> String {
    if let Some(url) = &args.public_url {
        return url.trim_end_matches('/').to_string();
    }

    let host = headers
        .get(hyper::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| args.listen.to_string());
    let scheme = headers
        .get("X-Forwarded-Proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", scheme, host)
}
