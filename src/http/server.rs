//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Build the origin and probe HTTP clients
//! - Drive each request through classify → fetch → transform
//! - Observability (metrics, request-scoped logs)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ProxyConfig, TimeoutConfig, TransformConfig};
use crate::error::{ProxyError, Result};
use crate::http::cookies::CookiePolicy;
use crate::http::request::{OriginRequestBuilder, RequestContext};
use crate::http::response::UpstreamResponse;
use crate::observability::metrics;
use crate::policy::{AllowList, HostPolicyStore};
use crate::transform::{self, HttpImageProber, ResponseKind, TransformContext};

/// Redirects an image probe may follow before giving up.
const PROBE_REDIRECT_LIMIT: usize = 5;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Origin client. Never follows redirects; they are rewritten for the client.
    pub client: reqwest::Client,
    pub prober: Arc<HttpImageProber>,
    pub host_policy: HostPolicyStore,
    pub allow_list: Arc<AllowList>,
    pub transform: Arc<TransformConfig>,
    pub max_body_size: usize,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    host_policy: HostPolicyStore,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig, allow_list: AllowList) -> Result<Self> {
        let host_policy = HostPolicyStore::new();

        let client = client_builder(&config.timeouts)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let probe_client = client_builder(&config.timeouts)
            .redirect(reqwest::redirect::Policy::limited(PROBE_REDIRECT_LIMIT))
            .build()?;

        let state = AppState {
            client,
            prober: Arc::new(HttpImageProber::new(probe_client, host_policy.clone())),
            host_policy: host_policy.clone(),
            allow_list: Arc::new(allow_list),
            transform: Arc::new(config.transform.clone()),
            max_body_size: config.security.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            host_policy,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        // A page fetch plus one round of image probes.
        let deadline = Duration::from_secs(
            config.timeouts.connect_secs + 2 * config.timeouts.request_secs,
        );

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(deadline))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::result::Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Router with all layers, for driving the proxy in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Handle on the shared forceSecure store.
    pub fn host_policy(&self) -> &HostPolicyStore {
        &self.host_policy
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

fn client_builder(timeouts: &TimeoutConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.request_secs))
        .no_proxy()
}

/// Main proxy handler.
/// Every failure becomes the uniform 502 page.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    match forward(&state, request).await {
        Ok((kind, response)) => {
            metrics::record_request(&method, response.status().as_u16(), kind.as_str(), start_time);
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Request failed");
            metrics::record_request(&method, 502, "error", start_time);
            e.into_response()
        }
    }
}

async fn forward(state: &AppState, request: Request<Body>) -> Result<(ResponseKind, Response)> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("unreadable body: {}", e)))?;
    let ctx = RequestContext::from_parts(&parts, body)?;

    let trust = state.allow_list.classify(&ctx.host);
    tracing::info!(method = %ctx.method, url = %ctx.url, trust = trust.as_str(), "site classified");

    let outbound = OriginRequestBuilder::new(
        &state.host_policy,
        CookiePolicy::new(state.transform.block_cookies),
    )
    .build(&ctx);
    tracing::debug!(target_url = %outbound.url, "Fetching from origin");
    let upstream = UpstreamResponse::fetch(&state.client, outbound).await?;

    let cx = TransformContext {
        request_url: &ctx.url,
        host: &ctx.host,
        trust,
        settings: state.transform.as_ref(),
        policy: &state.host_policy,
        prober: state.prober.as_ref(),
    };
    transform::respond(&cx, upstream).await
}
