//! Batch writers for the operations and metrics tables.

use chrono::DateTime;
use chrono::Utc;

use crate::error::MetricsError;
use crate::guard::OperationGuard;
use crate::report::UsageReport;
use crate::service::Claims;
use crate::store::MetricRow;
use crate::store::OperationRow;
use crate::store::UsageStore;

/// Writes one operation row per report whose hash is not already guarded.
///
/// Hashes are remembered only after the batch send succeeds, so a failed
/// batch never makes the guard claim a document was stored.
pub(crate) async fn save_operations(
    store: &dyn UsageStore,
    guard: &OperationGuard,
    insert_time: DateTime<Utc>,
    reports: &[UsageReport],
) -> Result<usize, MetricsError> {
    let mut batch = store.operations_batch().await.map_err(|err| {
        tracing::error!(error = %err, "failed to prepare batch for operations");
        MetricsError::OperationWriteFailed
    })?;

    for report in reports {
        let operation_type = report.operation.kind.as_lowercase();

        // Already written recently, skip it and don't write it again.
        if guard.seen(&report.operation.hash) {
            continue;
        }

        batch
            .append(OperationRow {
                insert_time,
                name: report.operation.name.clone(),
                hash: report.operation.hash.clone(),
                operation_type: operation_type.to_string(),
                document: report.operation.document.clone(),
            })
            .map_err(|err| {
                tracing::error!(error = %err, "failed to append operation to batch");
                MetricsError::OperationWriteFailed
            })?;
    }

    let rows = batch.rows();
    batch.send().await.map_err(|err| {
        tracing::error!(error = %err, "failed to send operation batch");
        MetricsError::OperationWriteFailed
    })?;

    for report in reports {
        guard.remember(report.operation.hash.clone());
    }

    Ok(rows)
}

/// Writes one metric row per field, argument and input usage entry of every
/// report.
pub(crate) async fn save_usage_metrics(
    store: &dyn UsageStore,
    claims: &Claims,
    insert_time: DateTime<Utc>,
    reports: &[UsageReport],
) -> Result<usize, MetricsError> {
    let mut batch = store.metrics_batch().await.map_err(|err| {
        tracing::error!(error = %err, "failed to prepare batch for metrics");
        MetricsError::MetricWriteFailed
    })?;

    for report in reports {
        let operation_type = report.operation.kind.as_lowercase();
        let base = RowTemplate {
            insert_time,
            claims,
            report,
            operation_type,
        };

        for field in &report.type_field_metrics {
            // Sort fields where the order doesn't matter. This reduces
            // cardinality and improves compression.
            let mut type_names = field.type_names.clone();
            type_names.sort();
            let mut subgraph_ids = field.subgraph_ids.clone();
            subgraph_ids.sort();

            batch
                .append(base.row(
                    field.count,
                    field.path.clone(),
                    type_names,
                    field.named_type.clone(),
                    subgraph_ids,
                    false,
                    false,
                ))
                .map_err(|err| {
                    tracing::error!(error = %err, "failed to append field metric to batch");
                    MetricsError::MetricWriteFailed
                })?;
        }

        for argument in &report.argument_metrics {
            batch
                .append(base.row(
                    argument.count,
                    argument.path.clone(),
                    vec![argument.type_name.clone()],
                    argument.named_type.clone(),
                    Vec::new(),
                    true,
                    false,
                ))
                .map_err(|err| {
                    tracing::error!(error = %err, "failed to append argument metric to batch");
                    MetricsError::MetricWriteFailed
                })?;
        }

        for input in &report.input_metrics {
            batch
                .append(base.row(
                    input.count,
                    input.path.clone(),
                    vec![input.type_name.clone()],
                    input.named_type.clone(),
                    Vec::new(),
                    false,
                    true,
                ))
                .map_err(|err| {
                    tracing::error!(error = %err, "failed to append input metric to batch");
                    MetricsError::MetricWriteFailed
                })?;
        }
    }

    let rows = batch.rows();
    batch.send().await.map_err(|err| {
        tracing::error!(error = %err, "failed to send metrics batch");
        MetricsError::MetricWriteFailed
    })?;

    Ok(rows)
}

/// Per-report fields shared by all of its metric rows.
struct RowTemplate<'a> {
    insert_time: DateTime<Utc>,
    claims: &'a Claims,
    report: &'a UsageReport,
    operation_type: &'static str,
}

impl RowTemplate<'_> {
    #[allow(clippy::too_many_arguments)]
    fn row(
        &self,
        count: u64,
        path: Vec<String>,
        type_names: Vec<String>,
        named_type: String,
        subgraph_ids: Vec<String>,
        is_argument: bool,
        is_input: bool,
    ) -> MetricRow {
        MetricRow {
            insert_time: self.insert_time,
            organization_id: self.claims.organization_id.clone(),
            federated_graph_id: self.claims.federated_graph_id.clone(),
            schema_version: self.report.schema.version.clone(),
            operation_hash: self.report.operation.hash.clone(),
            operation_name: self.report.operation.name.clone(),
            operation_type: self.operation_type.to_string(),
            count,
            path,
            type_names,
            named_type,
            client_name: self.report.client.name.clone(),
            client_version: self.report.client.version.clone(),
            status_code: self.report.request.status_code.to_string(),
            error: self.report.request.error.clone(),
            subgraph_ids,
            is_argument,
            is_input,
            attributes: self.report.attributes.clone(),
        }
    }
}
