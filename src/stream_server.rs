//! HTTP front end of the audio cache
//!
//! [`StreamServer`] routes requests and drives the per-request state machine
//! for `/stream`:
//!
//! 1. Look the asset up in the store. A hit goes straight to serving.
//! 2. On a miss, try to become the owner of the asset's fetch. The owner runs
//!    the [`FetchPipeline`] to completion (success or failure).
//! 3. A request that could not become the owner either answers 503 at once or
//!    waits for the owner to finish, depending on [`InflightPolicy`].
//! 4. Look again. If the asset is still absent the request fails with
//!    [`StreamError::AssetNotReady`]. Only the owner sees its fetch error; a
//!    waiter whose owner failed gets 503 and its retry starts a new fetch.
//! 5. Resolve the requested range against the asset size and stream the
//!    bytes with the matching headers.

use crate::asset_store::AssetStore;
use crate::config::{InflightPolicy, ServerConfig};
use crate::content_source;
use crate::error::{Result, StreamError};
use crate::fetch_pipeline::FetchPipeline;
use crate::job_registry::{JobGuard, JobRegistry};
use crate::metrics::ServiceMetrics;
use crate::models::{AssetId, AssetRecord};
use crate::range_parser::RangeParser;
use crate::response::{
    error_response, json_response, method_not_allowed_response, not_found_response,
    reader_body, stream_headers, text_response, with_parts, ResponseBody,
};
use crate::search::{SearchProvider, YoutubeSearchProvider};
use crate::transcoder::FfmpegTranscoder;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Request router and stream orchestrator
pub struct StreamServer {
    config: Arc<ServerConfig>,
    registry: Arc<JobRegistry>,
    pipeline: Arc<FetchPipeline>,
    range_parser: RangeParser,
    search: Option<Arc<dyn SearchProvider>>,
    metrics: ServiceMetrics,
}

impl StreamServer {
    /// Create a server around an already assembled pipeline
    ///
    /// Search stays disabled until [`StreamServer::with_search`] is called.
    pub fn new(
        config: Arc<ServerConfig>,
        pipeline: Arc<FetchPipeline>,
        metrics: ServiceMetrics,
    ) -> Self {
        let range_parser = if config.strict_range_parsing {
            RangeParser::strict()
        } else {
            RangeParser::new()
        };

        StreamServer {
            config,
            registry: Arc::new(JobRegistry::new()),
            pipeline,
            range_parser,
            search: None,
            metrics,
        }
    }

    /// Build the production server: command or HTTP source, ffmpeg
    /// transcoder, and the search provider if one is configured
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let store = AssetStore::new(&config.asset_dir, &config.audio_extension);
        let source = content_source::from_config(&config.source)?;
        let transcoder = Arc::new(FfmpegTranscoder::new(config.transcoder.clone()));
        let pipeline =
            FetchPipeline::new(store, source, transcoder).with_timeout(config.fetch_timeout());

        let metrics = ServiceMetrics::new().map_err(|e| {
            StreamError::InternalError(format!("Failed to register metrics: {}", e))
        })?;

        let search = match config.enabled_search() {
            Some(search_config) => {
                Some(Arc::new(YoutubeSearchProvider::new(search_config)?) as Arc<dyn SearchProvider>)
            }
            None => None,
        };

        let server = StreamServer::new(Arc::new(config), Arc::new(pipeline), metrics);
        Ok(match search {
            Some(provider) => server.with_search(provider),
            None => server,
        })
    }

    /// Share `registry` with other servers over the same asset directory
    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &AssetStore {
        self.pipeline.store()
    }

    /// Create the asset directory and remove temp files left by a previous
    /// process
    pub async fn prepare(&self) -> Result<()> {
        self.store().init().await?;
        self.store().sweep_temp_files().await?;
        Ok(())
    }

    /// Route one request
    ///
    /// Never fails: every error becomes a response with the matching status.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody> {
        let (parts, _) = req.into_parts();
        debug!("{} {}", parts.method, parts.uri);

        if parts.method != Method::GET {
            return method_not_allowed_response();
        }

        let path = parts.uri.path();
        let query = parts.uri.query();
        let prefix = self.config.route_prefix.as_str();

        match path.strip_prefix(prefix) {
            Some("/stream") => self.handle_stream(query, &parts.headers).await,
            Some("/search") => self.handle_search(query).await,
            _ => match path {
                "/health" => json_response(StatusCode::OK, &json!({ "status": "healthy" })),
                "/metrics" => self.metrics_response(),
                _ => not_found_response(),
            },
        }
    }

    async fn handle_stream(&self, query: Option<&str>, headers: &HeaderMap) -> Response<ResponseBody> {
        let result = match query_param(query, "id") {
            Some(raw) => match AssetId::parse(&raw) {
                Ok(id) => self.stream(&id, headers).await,
                Err(e) => Err(e),
            },
            None => Err(StreamError::MissingParameter("id".to_string())),
        };

        match result {
            Ok(response) => {
                let outcome = if response.status() == StatusCode::PARTIAL_CONTENT {
                    "partial"
                } else {
                    "full"
                };
                self.metrics.record_request(outcome);
                response
            }
            Err(e) => {
                self.metrics.record_request("error");
                match &e {
                    StreamError::AssetNotReady(_)
                    | StreamError::InvalidIdentifier(_)
                    | StreamError::MissingParameter(_)
                    | StreamError::MalformedRange(_)
                    | StreamError::UnsatisfiableRange { .. } => debug!("Stream request refused: {}", e),
                    _ => warn!("Stream request failed: {}", e),
                }
                error_response(&e)
            }
        }
    }

    /// Serve the asset for `id`, fetching it first if needed
    ///
    /// # Returns
    /// * `Ok(response)` with status 200 or 206 and a streaming body
    /// * `Err(StreamError::AssetNotReady)` if another request owns the fetch
    /// * `Err(..)` from the fetch pipeline when this request's fetch failed
    /// * `Err(StreamError::MalformedRange | UnsatisfiableRange)` for bad ranges
    pub async fn stream(&self, id: &AssetId, headers: &HeaderMap) -> Result<Response<ResponseBody>> {
        let (path, size) = self.ensure_asset(id).await?;

        let requested = self.range_parser.extract(headers)?;
        let range = self.range_parser.resolve(&requested, size)?;

        let reader = self.store().open_range(&path, &range).await?;
        let (status, response_headers) = stream_headers(&self.config.content_type, &range)?;

        self.metrics.record_bytes_served(range.length);
        debug!(
            "Serving {} bytes {}-{} of {} ({})",
            id,
            range.start,
            range.end(),
            size,
            status
        );

        Ok(with_parts(status, response_headers, reader_body(reader)))
    }

    /// Make sure the asset is in the store, returning its path and size
    async fn ensure_asset(&self, id: &AssetId) -> Result<(PathBuf, u64)> {
        if let AssetRecord::Present { path, size } = self.store().lookup(id).await? {
            self.metrics.record_lookup(true);
            return Ok((path, size));
        }
        self.metrics.record_lookup(false);

        match self.registry.try_acquire(id) {
            Some(guard) => {
                // The previous owner may have published between our lookup
                // and the acquire.
                if !self.store().lookup(id).await?.is_present() {
                    self.run_fetch(guard).await?;
                }
            }
            None => match self.config.inflight_policy {
                InflightPolicy::Reject => {}
                InflightPolicy::Wait => self.wait_for_fetch(id).await,
            },
        }

        match self.store().lookup(id).await? {
            AssetRecord::Present { path, size } => Ok((path, size)),
            AssetRecord::Absent => {
                self.metrics.not_ready_total.inc();
                Err(StreamError::AssetNotReady(id.to_string()))
            }
        }
    }

    /// Run the pipeline for the guarded id
    ///
    /// The run happens on its own task that owns the guard, so the fetch
    /// completes and the job is released even if this request is dropped.
    async fn run_fetch(&self, guard: JobGuard) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let metrics = self.metrics.clone();

        let task = tokio::spawn(async move {
            metrics.fetches_in_flight.inc();
            let started = Instant::now();

            let result = pipeline.run(guard.id()).await;

            metrics.fetches_in_flight.dec();
            let label = match &result {
                Ok(_) => "success",
                Err(e) => e.kind(),
            };
            metrics.record_fetch(label, started.elapsed());

            drop(guard);
            result
        });

        task.await
            .map_err(|e| StreamError::InternalError(format!("Fetch task failed: {}", e)))?
            .map(|_| ())
    }

    /// Wait until the current owner of `id` releases it, or the configured
    /// wait time passes
    async fn wait_for_fetch(&self, id: &AssetId) {
        let Some(mut done) = self.registry.subscribe(id) else {
            return;
        };

        debug!("Waiting for running fetch of {}", id);
        let limit = self.config.inflight_wait();
        // The sender is dropped when the job ends, which completes `changed`.
        if tokio::time::timeout(limit, done.changed()).await.is_err() {
            debug!("Gave up waiting for {} after {:?}", id, limit);
        }
    }

    async fn handle_search(&self, query: Option<&str>) -> Response<ResponseBody> {
        let Some(provider) = &self.search else {
            return not_found_response();
        };

        let keywords = match query_param(query, "query") {
            Some(q) if !q.trim().is_empty() => q,
            _ => return error_response(&StreamError::MissingParameter("query".to_string())),
        };

        match provider.search(keywords.trim()).await {
            Ok(results) => json_response(StatusCode::OK, &results),
            Err(e) => {
                warn!("Search for {:?} failed: {}", keywords, e);
                error_response(&e)
            }
        }
    }

    fn metrics_response(&self) -> Response<ResponseBody> {
        match self.metrics.render() {
            Ok(body) => {
                let mut response = text_response(StatusCode::OK, body);
                response.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
                );
                response
            }
            Err(e) => error_response(&StreamError::InternalError(format!(
                "Failed to render metrics: {}",
                e
            ))),
        }
    }

    /// Accept connections on `listener` until the task is dropped
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!("Audio cache server listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let server = Arc::clone(&self);

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Error serving connection from {}: {:?}", peer, err);
                }
            });
        }
    }
}

/// First value of `name` in a query string, percent-decoded
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
