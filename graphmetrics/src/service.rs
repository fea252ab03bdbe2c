//! The publish-metrics RPC: authenticates, aggregates, then writes both
//! batches in parallel.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::FromRequest;
use axum::extract::Request;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use chrono::Utc;
use http::StatusCode;
use serde::Deserialize;

use crate::aggregation::aggregate;
use crate::error::MetricsError;
use crate::guard::DEFAULT_OP_GUARD_CAPACITY;
use crate::guard::OperationGuard;
use crate::report::PublishMetricsRequest;
use crate::report::PublishMetricsResponse;
use crate::store::UsageStore;
use crate::writer::save_operations;
use crate::writer::save_usage_metrics;

/// Connect-style route of the publish-metrics RPC.
pub const PUBLISH_METRICS_PATH: &str =
    "/graphqlmetrics.v1.GraphQLMetricsService/PublishGraphQLMetrics";

/// Token claims the host's auth middleware stores in request extensions.
/// Their absence is what makes a request unauthenticated; token parsing
/// itself is not this crate's concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claims {
    pub organization_id: String,
    pub federated_graph_id: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetricsConfig {
    /// Address the host should bind the ingest endpoint on.
    pub listen_addr: SocketAddr,

    /// Capacity of the operation-doc guard.
    pub op_guard_size: NonZeroUsize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 4005)),
            op_guard_size: DEFAULT_OP_GUARD_CAPACITY,
        }
    }
}

/// RPC endpoint state: the store connection and the operation-doc guard,
/// both living for as long as the service.
pub struct MetricsService {
    store: Arc<dyn UsageStore>,
    op_guard: OperationGuard,
}

impl MetricsService {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self::with_guard_capacity(store, DEFAULT_OP_GUARD_CAPACITY)
    }

    pub fn with_guard_capacity(store: Arc<dyn UsageStore>, capacity: NonZeroUsize) -> Self {
        Self {
            store,
            op_guard: OperationGuard::with_capacity(capacity),
        }
    }

    pub fn from_config(store: Arc<dyn UsageStore>, config: &MetricsConfig) -> Self {
        Self::with_guard_capacity(store, config.op_guard_size)
    }

    /// Handles one publish-metrics RPC.
    ///
    /// Both batch writes share one insert time and run as siblings under
    /// `try_join!`; the first failure aborts the RPC and the in-flight
    /// sibling batch is abandoned to the store's own rollback.
    pub async fn publish_graphql_metrics(
        &self,
        claims: Option<Claims>,
        request: PublishMetricsRequest,
    ) -> Result<PublishMetricsResponse, MetricsError> {
        let claims = claims.ok_or(MetricsError::NotAuthenticated)?;

        let started = Instant::now();
        let insert_time = Utc::now();
        let reports = aggregate(request.schema_usage);

        let (operations, metrics) = tokio::try_join!(
            save_operations(self.store.as_ref(), &self.op_guard, insert_time, &reports),
            save_usage_metrics(self.store.as_ref(), &claims, insert_time, &reports),
        )?;

        tracing::debug!(
            duration = ?started.elapsed(),
            metrics,
            operations,
            "metric write finished"
        );

        Ok(PublishMetricsResponse::default())
    }
}

/// HTTP surface of the ingest service.
pub fn router(service: Arc<MetricsService>) -> Router {
    Router::new()
        .route(PUBLISH_METRICS_PATH, post(publish_graphql_metrics_handler))
        .with_state(service)
}

async fn publish_graphql_metrics_handler(
    State(service): State<Arc<MetricsService>>,
    request: Request,
) -> Response {
    let claims = request.extensions().get::<Claims>().cloned();

    let Json(body) = match Json::<PublishMetricsRequest>::from_request(request, &()).await {
        Ok(json) => json,
        Err(rejection) => return rejection.into_response(),
    };

    match service.publish_graphql_metrics(claims, body).await {
        Ok(response) => Json(response).into_response(),
        Err(err @ MetricsError::NotAuthenticated) => {
            (StatusCode::UNAUTHORIZED, err.to_string()).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
