//! Groups equivalent usage reports and sums their counts.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::hash::Hasher;

use crate::report::OperationKind;
use crate::report::UsageReport;

/// Value-typed grouping key. Two reports merge iff their keys are equal.
///
/// The operation document is deliberately absent: one document per hash is
/// assumed. `metric_shape` fingerprints the paths of all three metric
/// sequences, so reports with a different field set never merge even when
/// they share an operation hash, and the positional count merge below is
/// always over sequences of equal length.
#[derive(PartialEq, Eq, Hash)]
struct GroupKey {
    operation_hash: String,
    operation_name: String,
    operation_kind: OperationKind,
    schema_version: String,
    client_name: String,
    client_version: String,
    status_code: i32,
    error: String,
    attributes: Vec<(String, String)>,
    metric_shape: u64,
}

impl GroupKey {
    fn of(report: &UsageReport) -> Self {
        Self {
            operation_hash: report.operation.hash.clone(),
            operation_name: report.operation.name.clone(),
            operation_kind: report.operation.kind,
            schema_version: report.schema.version.clone(),
            client_name: report.client.name.clone(),
            client_version: report.client.version.clone(),
            status_code: report.request.status_code,
            error: report.request.error.clone(),
            attributes: canonical_attributes(&report.attributes),
            metric_shape: metric_shape(report),
        }
    }
}

/// Attributes are unordered on the wire; a key-sorted pair list makes them a
/// deterministic key component.
fn canonical_attributes(attributes: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    pairs.sort();
    pairs
}

fn metric_shape(report: &UsageReport) -> u64 {
    let mut hasher = DefaultHasher::new();
    for field in &report.type_field_metrics {
        field.path.hash(&mut hasher);
    }
    report.type_field_metrics.len().hash(&mut hasher);
    for argument in &report.argument_metrics {
        argument.path.hash(&mut hasher);
    }
    report.argument_metrics.len().hash(&mut hasher);
    for input in &report.input_metrics {
        input.path.hash(&mut hasher);
    }
    report.input_metrics.len().hash(&mut hasher);
    hasher.finish()
}

/// Collapses equivalent reports into one report per group, summing counts
/// element-wise across the metric sequences. Non-count fields are taken from
/// the first report of each group, and groups keep the order in which their
/// key first appeared in the input. Runs in O(reports × metrics).
pub fn aggregate(reports: Vec<UsageReport>) -> Vec<UsageReport> {
    let mut groups: Vec<UsageReport> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for report in reports {
        match index.entry(GroupKey::of(&report)) {
            Entry::Occupied(slot) => merge_counts(&mut groups[*slot.get()], &report),
            Entry::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push(report);
            }
        }
    }

    groups
}

/// Equal keys imply equal metric shapes, so the three zips are over
/// sequences of identical length.
fn merge_counts(into: &mut UsageReport, from: &UsageReport) {
    for (target, source) in into.type_field_metrics.iter_mut().zip(&from.type_field_metrics) {
        target.count = target.count.saturating_add(source.count);
    }
    for (target, source) in into.argument_metrics.iter_mut().zip(&from.argument_metrics) {
        target.count = target.count.saturating_add(source.count);
    }
    for (target, source) in into.input_metrics.iter_mut().zip(&from.input_metrics) {
        target.count = target.count.saturating_add(source.count);
    }
}
