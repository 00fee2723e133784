//! Tower layer that instruments inbound requests and runs the route hook.
//!
//! Each request gets a server span with an empty [`RpcMetadata`] slot in its
//! extensions. The [`RouteNormalizer`] hook fills in the route before the
//! inner service runs; once the response is ready the span is renamed to
//! `"<METHOD> <route>"`, tagged with the status code, and the request is
//! counted per route.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::KeyValue;
use tower::{Layer, Service};

use super::{request_target, HookRequest, RouteNormalizer, RpcMetadata};

const INSTRUMENTATION_NAME: &str = "telemetry-agent";
const HTTP_SERVER_REQUEST_COUNT_METRIC: &str = "http.server.request.count";

const HTTP_REQUEST_METHOD_LABEL: &str = "http.request.method";
const HTTP_ROUTE_LABEL: &str = "http.route";
const HTTP_RESPONSE_STATUS_CODE_LABEL: &str = "http.response.status_code";
const URL_PATH_LABEL: &str = "url.path";

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// [`Layer`] producing [`RouteService`]s.
pub struct RouteLayer<T = BoxedTracer> {
    tracer: Arc<T>,
    normalizer: Arc<RouteNormalizer>,
    requests: Counter<u64>,
}

impl RouteLayer<BoxedTracer> {
    /// Instrument with the globally installed tracer and meter providers.
    pub fn new(normalizer: Arc<RouteNormalizer>) -> Self {
        Self::with_tracer(
            global::tracer(INSTRUMENTATION_NAME),
            &global::meter(INSTRUMENTATION_NAME),
            normalizer,
        )
    }
}

impl<T> RouteLayer<T> {
    pub fn with_tracer(tracer: T, meter: &Meter, normalizer: Arc<RouteNormalizer>) -> Self {
        Self {
            tracer: Arc::new(tracer),
            normalizer,
            requests: meter
                .u64_counter(HTTP_SERVER_REQUEST_COUNT_METRIC)
                .with_description("Number of inbound HTTP requests, grouped by route.")
                .init(),
        }
    }
}

impl<T> Clone for RouteLayer<T> {
    fn clone(&self) -> Self {
        Self {
            tracer: Arc::clone(&self.tracer),
            normalizer: Arc::clone(&self.normalizer),
            requests: self.requests.clone(),
        }
    }
}

impl<S, T> Layer<S> for RouteLayer<T> {
    type Service = RouteService<S, T>;

    fn layer(&self, inner: S) -> Self::Service {
        RouteService {
            inner,
            tracer: Arc::clone(&self.tracer),
            normalizer: Arc::clone(&self.normalizer),
            requests: self.requests.clone(),
        }
    }
}

/// Service wrapper created by [`RouteLayer`].
pub struct RouteService<S, T = BoxedTracer> {
    inner: S,
    tracer: Arc<T>,
    normalizer: Arc<RouteNormalizer>,
    requests: Counter<u64>,
}

impl<S: Clone, T> Clone for RouteService<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tracer: Arc::clone(&self.tracer),
            normalizer: Arc::clone(&self.normalizer),
            requests: self.requests.clone(),
        }
    }
}

impl<S, T, ReqBody, ResBody> Service<http::Request<ReqBody>> for RouteService<S, T>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Future: Send + 'static,
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        // Owned copies so the extensions can be borrowed mutably below.
        let method = req.method().as_str().to_owned();
        let path = req.uri().path().to_owned();
        let target = request_target(req.uri()).to_owned();

        let mut span = self
            .tracer
            .span_builder(method.clone())
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new(HTTP_REQUEST_METHOD_LABEL, method.clone()),
                KeyValue::new(URL_PATH_LABEL, path.clone()),
            ])
            .start(self.tracer.as_ref());

        req.extensions_mut().insert(RpcMetadata::default());
        let route = self.normalizer.on_request(
            Some(&mut span),
            &HookRequest::incoming(Some(&method), Some(&target)),
            req.extensions_mut().get_mut::<RpcMetadata>(),
        );

        let cx = opentelemetry::Context::current_with_span(span);
        let future = self.inner.call(req).with_context(cx.clone());
        let requests = self.requests.clone();

        Box::pin(async move {
            let result = future.await;
            let span = cx.span();

            let mut labels = vec![KeyValue::new(HTTP_REQUEST_METHOD_LABEL, method.clone())];
            if let Some(route) = route {
                span.update_name(format!("{method} {route}"));
                labels.push(KeyValue::new(HTTP_ROUTE_LABEL, route));
            }
            match &result {
                Ok(response) => {
                    let status = i64::from(response.status().as_u16());
                    span.set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE_LABEL, status));
                    if status >= 500 {
                        span.set_status(Status::error("server error"));
                    }
                }
                Err(_) => span.set_status(Status::error("inner service failed")),
            }
            requests.add(1, &labels);
            span.end();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteConfig;
    use axum::{body::Body, extract::Extension, routing::get, Router};
    use opentelemetry::metrics::noop::NoopMeterProvider;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::Value;
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use opentelemetry_sdk::trace::TracerProvider;
    use tower::ServiceExt;

    fn app(prefix: &str, exporter: &InMemorySpanExporter) -> (Router, TracerProvider) {
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let normalizer = Arc::new(RouteNormalizer::new(RouteConfig::new(prefix, None).unwrap()));
        let layer = RouteLayer::with_tracer(
            provider.tracer("layer-test"),
            &NoopMeterProvider::new().meter("layer-test"),
            normalizer,
        );
        let router = Router::new()
            .route(
                "/orders",
                get(|Extension(rpc): Extension<RpcMetadata>| async move {
                    rpc.route.unwrap_or_default()
                }),
            )
            .route("/favicon.ico", get(|| async { "icon" }))
            .fallback(|| async { http::StatusCode::NOT_FOUND })
            .layer(layer);
        (router, provider)
    }

    fn attribute(span: &SpanData, key: &str) -> Option<Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    async fn body_text(response: http::Response<Body>) -> String {
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn span_is_named_after_route() {
        let exporter = InMemorySpanExporter::default();
        let (router, _provider) = app("/api", &exporter);

        let response = router
            .oneshot(http::Request::get("/orders?page=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        // The handler sees the route recorded by the hook.
        assert_eq!(body_text(response).await, "/api/orders?page=2");

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "GET /api/orders?page=2");
        assert_eq!(span.span_kind, SpanKind::Server);
        assert_eq!(
            attribute(span, "resource.name"),
            Some(Value::from("GET /api/orders?page=2".to_string()))
        );
        assert_eq!(
            attribute(span, HTTP_RESPONSE_STATUS_CODE_LABEL),
            Some(Value::I64(200))
        );
        assert_eq!(
            attribute(span, URL_PATH_LABEL),
            Some(Value::from("/orders".to_string()))
        );
    }

    #[tokio::test]
    async fn excluded_path_keeps_method_name() {
        let exporter = InMemorySpanExporter::default();
        let (router, _provider) = app("", &exporter);

        let response = router
            .oneshot(http::Request::get("/favicon.ico").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET");
        assert_eq!(attribute(&spans[0], "resource.name"), None);
    }

    #[tokio::test]
    async fn unmatched_request_still_records_status() {
        let exporter = InMemorySpanExporter::default();
        let (router, _provider) = app("", &exporter);

        let response = router
            .oneshot(
                http::Request::post("/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "POST /missing");
        assert_eq!(
            attribute(&spans[0], HTTP_RESPONSE_STATUS_CODE_LABEL),
            Some(Value::I64(404))
        );
    }

    #[tokio::test]
    async fn excluded_query_string_leaves_span_unnamed() {
        let exporter = InMemorySpanExporter::default();
        let (router, _provider) = app("", &exporter);

        let response = router
            .oneshot(
                http::Request::get("/page?asset=static")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET");
        assert_eq!(attribute(&spans[0], "resource.name"), None);
    }
}
