//! tower middleware applying the rate limiting decision to each request.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::Response;
use futures::future::BoxFuture;
use http::Request;
use tower::{Layer, Service};
use tracing::error;

use crate::clock::{Clock, SystemClock};
use crate::config::{HeaderNames, HeadersConfig, ThrottleConfig};
use crate::error::{Result, ThrottleError};
use crate::hooks::{NoopHooks, ThrottleHooks};
use crate::identity::{client_address, IdentityFn};
use crate::ratelimit::{RateLimiter, RateWindowStore, ThrottleInfo};

use super::response::{internal_error, ResponseShaper};

/// Function deriving the call weight of a request.
///
/// Most deployments count every request as one call; heavier endpoints
/// can charge more. A weight of zero is a configuration fault.
pub type WeightFn = Arc<dyn Fn(&Request<Body>) -> u64 + Send + Sync>;

/// State shared by every service the layer wraps.
struct ThrottleState {
    limiter: RateLimiter,
    hooks: Arc<dyn ThrottleHooks>,
    identity: IdentityFn,
    weight: WeightFn,
    shaper: ResponseShaper,
    clock: Arc<dyn Clock>,
    limit: u64,
    period: u64,
}

/// tower layer wrapping services with fixed-window rate limiting.
///
/// Built through [`ThrottleLayer::builder`], which validates the
/// configuration and the store before anything handles traffic.
#[derive(Clone)]
pub struct ThrottleLayer {
    state: Arc<ThrottleState>,
}

impl ThrottleLayer {
    /// Start building a layer counting requests in `store`.
    pub fn builder(store: Arc<dyn RateWindowStore>) -> ThrottleLayerBuilder {
        ThrottleLayerBuilder::new(store)
    }
}

// The callbacks and trait objects carry no useful Debug output.
impl fmt::Debug for ThrottleLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleLayer")
            .field("limit", &self.state.limit)
            .field("period", &self.state.period)
            .field("shaper", &self.state.shaper)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ThrottleService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

/// Builder collecting configuration for a [`ThrottleLayer`].
pub struct ThrottleLayerBuilder {
    store: Arc<dyn RateWindowStore>,
    config: ThrottleConfig,
    hooks: Arc<dyn ThrottleHooks>,
    identity: IdentityFn,
    weight: WeightFn,
    clock: Arc<dyn Clock>,
}

impl ThrottleLayerBuilder {
    fn new(store: Arc<dyn RateWindowStore>) -> Self {
        Self {
            store,
            config: ThrottleConfig::default(),
            hooks: Arc::new(NoopHooks),
            identity: Arc::new(client_address),
            weight: Arc::new(|_: &Request<Body>| 1),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the whole configuration, e.g. one loaded from YAML.
    pub fn config(mut self, config: ThrottleConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum requests allowed per window.
    pub fn limit(mut self, limit: u64) -> Self {
        self.config.limit = limit;
        self
    }

    /// Window length in seconds.
    pub fn period(mut self, period: u64) -> Self {
        self.config.period = period;
        self
    }

    /// Override the rejection body.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.config.message = Some(message.into());
        self
    }

    /// Custom names for the rate limit headers.
    pub fn header_names(mut self, names: HeaderNames) -> Self {
        self.config.headers = HeadersConfig::Names(names);
        self
    }

    /// Do not add rate limit headers to responses.
    pub fn disable_headers(mut self) -> Self {
        self.config.headers = HeadersConfig::Toggle(false);
        self
    }

    /// Body sent with rejections.
    pub fn response_body(mut self, body: impl Into<String>) -> Self {
        self.config.response.body = body.into();
        self
    }

    /// Content type of the rejection body.
    pub fn response_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config.response.content_type = content_type.into();
        self
    }

    /// Add a static header to rejection responses.
    pub fn response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .response
            .headers
            .insert(name.into(), value.into());
        self
    }

    /// Replace the identity resolver.
    pub fn identifier<F>(mut self, identifier: F) -> Self
    where
        F: Fn(&Request<Body>) -> Option<String> + Send + Sync + 'static,
    {
        self.identity = Arc::new(identifier);
        self
    }

    /// Install a hook set.
    pub fn hooks<H>(mut self, hooks: H) -> Self
    where
        H: ThrottleHooks + 'static,
    {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Derive per-request weights instead of counting every request as one.
    pub fn weight<F>(mut self, weight: F) -> Self
    where
        F: Fn(&Request<Body>) -> u64 + Send + Sync + 'static,
    {
        self.weight = Arc::new(weight);
        self
    }

    /// Replace the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and the store, then build the layer.
    pub fn build(self) -> Result<ThrottleLayer> {
        self.config.validate()?;
        let shaper = ResponseShaper::from_config(&self.config)?;

        if !self.store.supports_counters() {
            return Err(ThrottleError::IncompatibleStore(
                "store cannot provide atomic per-key counters".to_string(),
            ));
        }

        let limiter = RateLimiter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.hooks),
            Arc::clone(&self.clock),
        );

        Ok(ThrottleLayer {
            state: Arc::new(ThrottleState {
                limiter,
                hooks: self.hooks,
                identity: self.identity,
                weight: self.weight,
                shaper,
                clock: self.clock,
                limit: self.config.limit,
                period: self.config.period,
            }),
        })
    }
}

/// Service produced by [`ThrottleLayer`].
///
/// Per request: consult the skip hook, resolve the identity, let the
/// policy hook adjust the draft, count the request, then reject with a
/// 429 or forward and annotate the response. Faults never let traffic
/// through uncounted; they fail closed with an empty 500.
#[derive(Clone)]
pub struct ThrottleService<S> {
    inner: S,
    state: Arc<ThrottleState>,
}

impl<S> Service<Request<Body>> for ThrottleService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Swap in the clone and keep the service poll_ready reported on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            if state.hooks.skip(&request) {
                return inner.call(request).await;
            }

            let identity = state
                .hooks
                .identity(&request)
                .or_else(|| (state.identity)(&request));
            let identity = match identity {
                Some(identity) => identity,
                None => {
                    error!("No client identity resolved for request, failing closed");
                    return Ok(internal_error());
                }
            };

            let mut throttle = ThrottleInfo::new(identity, state.limit, state.period);
            state.hooks.throttle(&request, &mut throttle);

            let weight = (state.weight)(&request);
            if weight == 0 {
                error!(
                    key = %throttle.key(),
                    "Request weight must be at least one, failing closed"
                );
                return Ok(internal_error());
            }

            let info = match state.limiter.rate_limit(&throttle, weight).await {
                Ok(info) => info,
                Err(e) => {
                    error!(
                        key = %throttle.key(),
                        error = %e,
                        "Rate limit check failed, failing closed"
                    );
                    return Ok(internal_error());
                }
            };

            if info.limit_exceeded() {
                return Ok(state.shaper.rejection(&info, state.clock.epoch_secs()));
            }

            let response = inner.call(request).await?;
            Ok(state.shaper.decorate(response, &info))
        })
    }
}
