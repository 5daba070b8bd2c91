//! Cross-shard aggregation and ordered result merging.
//!
//! Shards each answer the same statement; this module combines their
//! per-shard COUNT/SUM/AVG/MIN/MAX into one row, and merges pre-sorted
//! shard results into one ordered stream with LIMIT/OFFSET applied during
//! the merge rather than after materialization.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use protocol::message::QueryResult;
use protocol::{Row, SqlValue};

use crate::errors::Error;
use crate::parser::{Aggregate, AggregateFunc, SortDirection};

/// Numeric accumulator: stays an i64 until a float joins in or an addition
/// overflows, then widens to f64.
#[derive(Debug, Clone, Copy)]
enum Acc {
    Int(i64),
    Float(f64),
}

impl Acc {
    fn add(self, value: &SqlValue) -> Result<Acc, Error> {
        match (self, value) {
            (Acc::Int(acc), SqlValue::Int(n)) => Ok(match acc.checked_add(*n) {
                Some(sum) => Acc::Int(sum),
                None => Acc::Float(acc as f64 + *n as f64),
            }),
            (acc, value) => {
                let x = value.as_f64().ok_or_else(|| {
                    Error::Type(format!(
                        "cannot aggregate non-numeric value of type {}",
                        value.type_name()
                    ))
                })?;
                Ok(Acc::Float(acc.as_f64() + x))
            }
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Acc::Int(n) => n as f64,
            Acc::Float(x) => x,
        }
    }

    fn into_value(self) -> SqlValue {
        match self {
            Acc::Int(n) => SqlValue::Int(n),
            Acc::Float(x) => SqlValue::Float(x),
        }
    }
}

/// Combine per-shard aggregate rows into a single-row result.
///
/// AVG prefers the exact path (Σsum / Σcount) whenever the same result set
/// also carries SUM and COUNT for the tracked expression; otherwise it
/// falls back to the documented lossy mean over the concatenated rows.
pub fn merge_aggregate(
    aggregates: &[Aggregate],
    shard_results: &[QueryResult],
) -> Result<QueryResult, Error> {
    let mut row = Row::new();

    for aggregate in aggregates {
        let column = aggregate.output_column();
        let values = collect_column(shard_results, &column);

        let merged = match aggregate.func {
            AggregateFunc::Count | AggregateFunc::Sum => {
                let mut acc = Acc::Int(0);
                for value in &values {
                    acc = acc.add(value)?;
                }
                acc.into_value()
            }
            AggregateFunc::Min => values
                .iter()
                .min_by(|a, b| a.sql_cmp(b))
                .cloned()
                .unwrap_or(SqlValue::Null),
            AggregateFunc::Max => values
                .iter()
                .max_by(|a, b| a.sql_cmp(b))
                .cloned()
                .unwrap_or(SqlValue::Null),
            AggregateFunc::Avg => merge_avg(aggregate, aggregates, shard_results, &values)?,
        };

        row.insert(column, merged);
    }

    let fields = shard_results
        .iter()
        .find(|r| !r.fields.is_empty())
        .map(|r| r.fields.clone())
        .unwrap_or_default();
    let duration_ms = shard_results.iter().map(|r| r.duration_ms).max().unwrap_or(0);

    Ok(QueryResult::with_rows(fields, vec![row], duration_ms))
}

fn merge_avg(
    avg: &Aggregate,
    aggregates: &[Aggregate],
    shard_results: &[QueryResult],
    avg_values: &[SqlValue],
) -> Result<SqlValue, Error> {
    let sibling = |func: AggregateFunc| {
        aggregates
            .iter()
            .find(|a| a.func == func && a.expr.eq_ignore_ascii_case(&avg.expr))
    };

    if let (Some(sum), Some(count)) = (sibling(AggregateFunc::Sum), sibling(AggregateFunc::Count)) {
        // Exact path: Σsum / Σcount over the shards.
        let mut total = Acc::Int(0);
        for value in collect_column(shard_results, &sum.output_column()) {
            total = total.add(&value)?;
        }
        let mut n = Acc::Int(0);
        for value in collect_column(shard_results, &count.output_column()) {
            n = n.add(&value)?;
        }
        if n.as_f64() == 0.0 {
            return Ok(SqlValue::Null);
        }
        return Ok(SqlValue::Float(total.as_f64() / n.as_f64()));
    }

    // Lossy path: unweighted mean of the concatenated avg column.
    if avg_values.is_empty() {
        return Ok(SqlValue::Null);
    }
    let mut total = Acc::Int(0);
    for value in avg_values {
        total = total.add(value)?;
    }
    Ok(SqlValue::Float(total.as_f64() / avg_values.len() as f64))
}

fn collect_column(shard_results: &[QueryResult], column: &str) -> Vec<SqlValue> {
    let mut values = Vec::new();
    for result in shard_results {
        for row in &result.rows {
            if let Some((_, value)) = row
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
            {
                if !value.is_null() {
                    values.push(value.clone());
                }
            }
        }
    }
    values
}

struct MergeEntry {
    key: Vec<SqlValue>,
    directions: Vec<SortDirection>,
    shard_idx: usize,
    row_idx: usize,
}

impl MergeEntry {
    fn ordering(&self, other: &Self) -> Ordering {
        for ((a, b), direction) in self.key.iter().zip(&other.key).zip(&self.directions) {
            let ord = match direction {
                SortDirection::Asc => a.sql_cmp(b),
                SortDirection::Desc => b.sql_cmp(a),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        // Ties break by shard list order, then input order.
        self.shard_idx
            .cmp(&other.shard_idx)
            .then(self.row_idx.cmp(&other.row_idx))
    }
}

struct HeapItem {
    entry: MergeEntry,
    row: Row,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.entry.ordering(&other.entry) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // Reversed so the BinaryHeap pops the smallest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry.ordering(&other.entry).reverse()
    }
}

/// K-way merge of per-shard results that are each pre-sorted by the same
/// ORDER BY (a documented client contract). LIMIT/OFFSET are applied while
/// merging so discarded rows are never materialized.
pub fn merge_ordered(
    order_by: &[(String, SortDirection)],
    mut shard_results: Vec<QueryResult>,
    limit: Option<u64>,
    offset: Option<u64>,
) -> QueryResult {
    let directions: Vec<SortDirection> = order_by.iter().map(|(_, d)| *d).collect();
    let fields = shard_results
        .iter()
        .find(|r| !r.fields.is_empty())
        .map(|r| r.fields.clone())
        .unwrap_or_default();
    let duration_ms = shard_results.iter().map(|r| r.duration_ms).max().unwrap_or(0);

    let mut cursors: Vec<std::vec::IntoIter<Row>> = shard_results
        .drain(..)
        .map(|r| r.rows.into_iter())
        .collect();

    let key_of = |row: &Row| -> Vec<SqlValue> {
        order_by
            .iter()
            .map(|(column, _)| {
                row.iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(column))
                    .map(|(_, v)| v.clone())
                    .unwrap_or(SqlValue::Null)
            })
            .collect()
    };

    let mut heap: BinaryHeap<HeapItem> = BinaryHeap::new();
    let mut row_counter = 0usize;
    for (shard_idx, cursor) in cursors.iter_mut().enumerate() {
        if let Some(row) = cursor.next() {
            heap.push(HeapItem {
                entry: MergeEntry {
                    key: key_of(&row),
                    directions: directions.clone(),
                    shard_idx,
                    row_idx: row_counter,
                },
                row,
            });
            row_counter += 1;
        }
    }

    let mut skip = offset.unwrap_or(0);
    let mut remaining = limit.unwrap_or(u64::MAX);
    let mut rows = Vec::new();

    while let Some(HeapItem { entry, row }) = heap.pop() {
        if let Some(next) = cursors[entry.shard_idx].next() {
            heap.push(HeapItem {
                entry: MergeEntry {
                    key: key_of(&next),
                    directions: directions.clone(),
                    shard_idx: entry.shard_idx,
                    row_idx: row_counter,
                },
                row: next,
            });
            row_counter += 1;
        }

        if skip > 0 {
            skip -= 1;
            continue;
        }
        if remaining == 0 {
            break;
        }
        rows.push(row);
        remaining -= 1;
    }

    QueryResult::with_rows(fields, rows, duration_ms)
}

/// Unordered scatter: concatenate rows in shard order and slice.
pub fn concat(
    shard_results: Vec<QueryResult>,
    limit: Option<u64>,
    offset: Option<u64>,
) -> QueryResult {
    let fields = shard_results
        .iter()
        .find(|r| !r.fields.is_empty())
        .map(|r| r.fields.clone())
        .unwrap_or_default();
    let duration_ms = shard_results.iter().map(|r| r.duration_ms).max().unwrap_or(0);

    let mut rows: Vec<Row> = shard_results.into_iter().flat_map(|r| r.rows).collect();

    if let Some(offset) = offset {
        let offset = (offset as usize).min(rows.len());
        rows.drain(..offset);
    }
    if let Some(limit) = limit {
        rows.truncate(limit as usize);
    }

    QueryResult::with_rows(fields, rows, duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(func: AggregateFunc, expr: &str, alias: Option<&str>) -> Aggregate {
        Aggregate {
            func,
            expr: expr.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    fn result_with_rows(rows: Vec<Vec<(&str, SqlValue)>>) -> QueryResult {
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|cols| {
                cols.into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect()
            })
            .collect();
        QueryResult::with_rows(vec![], rows, 0)
    }

    #[test]
    fn counts_sum_across_shards() {
        let shards = vec![
            result_with_rows(vec![vec![("count", SqlValue::Int(10))]]),
            result_with_rows(vec![vec![("count", SqlValue::Int(7))]]),
        ];
        let merged =
            merge_aggregate(&[agg(AggregateFunc::Count, "*", None)], &shards).unwrap();

        assert_eq!(merged.row_count, 1);
        assert_eq!(merged.rows[0].get("count"), Some(&SqlValue::Int(17)));
    }

    #[test]
    fn sum_widens_to_double_on_overflow() {
        let shards = vec![
            result_with_rows(vec![vec![("sum", SqlValue::Int(i64::MAX))]]),
            result_with_rows(vec![vec![("sum", SqlValue::Int(1))]]),
        ];
        let merged = merge_aggregate(&[agg(AggregateFunc::Sum, "x", None)], &shards).unwrap();

        match merged.rows[0].get("sum") {
            Some(SqlValue::Float(x)) => assert!(*x > i64::MAX as f64),
            other => panic!("expected widened float, got {other:?}"),
        }
    }

    #[test]
    fn min_max_span_all_shards() {
        let shards = vec![
            result_with_rows(vec![vec![
                ("min", SqlValue::Int(4)),
                ("max", SqlValue::Int(90)),
            ]]),
            result_with_rows(vec![vec![
                ("min", SqlValue::Int(2)),
                ("max", SqlValue::Int(50)),
            ]]),
        ];
        let aggs = [
            agg(AggregateFunc::Min, "age", None),
            agg(AggregateFunc::Max, "age", None),
        ];
        let merged = merge_aggregate(&aggs, &shards).unwrap();

        assert_eq!(merged.rows[0].get("min"), Some(&SqlValue::Int(2)));
        assert_eq!(merged.rows[0].get("max"), Some(&SqlValue::Int(90)));
    }

    #[test]
    fn avg_prefers_exact_sum_count_path() {
        // shard 1: sum=10 count=2, shard 2: sum=50 count=3.
        // Exact avg = 60/5 = 12; a naive mean of the avg column would be
        // (5 + 16.666..)/2 ≈ 10.83.
        let shards = vec![
            result_with_rows(vec![vec![
                ("avg", SqlValue::Float(5.0)),
                ("sum", SqlValue::Int(10)),
                ("count", SqlValue::Int(2)),
            ]]),
            result_with_rows(vec![vec![
                ("avg", SqlValue::Float(50.0 / 3.0)),
                ("sum", SqlValue::Int(50)),
                ("count", SqlValue::Int(3)),
            ]]),
        ];
        let aggs = [
            agg(AggregateFunc::Avg, "x", None),
            agg(AggregateFunc::Sum, "x", None),
            agg(AggregateFunc::Count, "x", None),
        ];
        let merged = merge_aggregate(&aggs, &shards).unwrap();

        assert_eq!(merged.rows[0].get("avg"), Some(&SqlValue::Float(12.0)));
    }

    #[test]
    fn avg_falls_back_to_lossy_mean() {
        let shards = vec![
            result_with_rows(vec![vec![("avg", SqlValue::Float(10.0))]]),
            result_with_rows(vec![vec![("avg", SqlValue::Float(20.0))]]),
        ];
        let merged = merge_aggregate(&[agg(AggregateFunc::Avg, "x", None)], &shards).unwrap();
        assert_eq!(merged.rows[0].get("avg"), Some(&SqlValue::Float(15.0)));
    }

    #[test]
    fn aggregate_partition_identity_holds() {
        // AGG over the whole dataset equals the merge of per-partition AGGs.
        let data = [3i64, 9, 1, 7, 5, 8, 2];
        let (left, right) = data.split_at(3);

        let per_shard = |part: &[i64]| {
            result_with_rows(vec![vec![
                ("count", SqlValue::Int(part.len() as i64)),
                ("sum", SqlValue::Int(part.iter().sum())),
                ("min", SqlValue::Int(*part.iter().min().unwrap())),
                ("max", SqlValue::Int(*part.iter().max().unwrap())),
            ]])
        };

        let aggs = [
            agg(AggregateFunc::Count, "x", None),
            agg(AggregateFunc::Sum, "x", None),
            agg(AggregateFunc::Min, "x", None),
            agg(AggregateFunc::Max, "x", None),
        ];
        let merged = merge_aggregate(&aggs, &[per_shard(left), per_shard(right)]).unwrap();

        assert_eq!(
            merged.rows[0].get("count"),
            Some(&SqlValue::Int(data.len() as i64))
        );
        assert_eq!(
            merged.rows[0].get("sum"),
            Some(&SqlValue::Int(data.iter().sum()))
        );
        assert_eq!(merged.rows[0].get("min"), Some(&SqlValue::Int(1)));
        assert_eq!(merged.rows[0].get("max"), Some(&SqlValue::Int(9)));
    }

    fn age_rows(ages: &[i64]) -> QueryResult {
        result_with_rows(ages.iter().map(|&a| vec![("age", SqlValue::Int(a))]).collect())
    }

    #[test]
    fn ordered_merge_honors_direction_and_limit() {
        let shards = vec![age_rows(&[50, 30]), age_rows(&[45, 20, 10])];
        let merged = merge_ordered(
            &[("age".to_string(), SortDirection::Desc)],
            shards,
            Some(3),
            None,
        );

        let ages: Vec<i64> = merged
            .rows
            .iter()
            .map(|r| r.get("age").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ages, vec![50, 45, 30]);
        assert_eq!(merged.row_count, 3);
    }

    #[test]
    fn ordered_merge_applies_offset_during_merge() {
        let shards = vec![age_rows(&[1, 3, 5]), age_rows(&[2, 4, 6])];
        let merged = merge_ordered(
            &[("age".to_string(), SortDirection::Asc)],
            shards,
            Some(2),
            Some(2),
        );

        let ages: Vec<i64> = merged
            .rows
            .iter()
            .map(|r| r.get("age").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ages, vec![3, 4]);
    }

    #[test]
    fn ordered_merge_breaks_ties_by_shard_order() {
        let shards = vec![
            result_with_rows(vec![vec![
                ("age", SqlValue::Int(30)),
                ("shard", SqlValue::Text("first".into())),
            ]]),
            result_with_rows(vec![vec![
                ("age", SqlValue::Int(30)),
                ("shard", SqlValue::Text("second".into())),
            ]]),
        ];
        let merged = merge_ordered(
            &[("age".to_string(), SortDirection::Asc)],
            shards,
            None,
            None,
        );

        assert_eq!(
            merged.rows[0].get("shard"),
            Some(&SqlValue::Text("first".into()))
        );
        assert_eq!(
            merged.rows[1].get("shard"),
            Some(&SqlValue::Text("second".into()))
        );
    }

    #[test]
    fn concat_slices_after_concatenation() {
        let shards = vec![age_rows(&[1, 2]), age_rows(&[3, 4, 5])];
        let sliced = concat(shards, Some(2), Some(1));
        let ages: Vec<i64> = sliced
            .rows
            .iter()
            .map(|r| r.get("age").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ages, vec![2, 3]);
    }
}
