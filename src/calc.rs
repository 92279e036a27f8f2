use crate::db;
use crate::error::{Result, ServiceError};
use crate::ids::NumericId;
use rusqlite::Connection;
use serde::Serialize;

/// Round to one decimal place, ties to even.
///
/// Decided on the exact binary value of `x`. Scaling by ten first would
/// round twice and can pull a value just above a tie onto it.
pub fn round_half_even_1_decimal(x: f64) -> f64 {
    format!("{x:.1}").parse().unwrap_or(x)
}

/// Descriptive statistics for one test, every field except `count` expressed
/// as a percentage of the test's capacity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestAggregate {
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub count: usize,
}

fn mean(values: &[i64]) -> f64 {
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    sum / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Needs at least two values.
fn sample_stddev(values: &[i64]) -> f64 {
    let m = mean(values);
    let ss: f64 = values
        .iter()
        .map(|&v| {
            let d = v as f64 - m;
            d * d
        })
        .sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Quartile cut points using the exclusive method.
///
/// Positions are spread over `n + 1` slots and interpolated between
/// neighbouring order statistics; the lower index is clamped to
/// `1..=n-1`, so with two values the outer quartiles extrapolate past the
/// data. `sorted` must be ascending with at least two values.
fn quartiles_exclusive(sorted: &[i64]) -> [f64; 3] {
    const GROUPS: i64 = 4;
    let ld = sorted.len() as i64;
    let m = ld + 1;
    let mut out = [0.0; 3];
    for (slot, i) in out.iter_mut().zip(1..GROUPS) {
        let j = (i * m / GROUPS).clamp(1, ld - 1);
        let delta = i * m - j * GROUPS;
        let lo = sorted[(j - 1) as usize] as f64;
        let hi = sorted[j as usize] as f64;
        *slot = (lo * (GROUPS - delta) as f64 + hi * delta as f64) / GROUPS as f64;
    }
    out
}

/// Summarize raw marks against a capacity. `None` when there are no marks.
///
/// With a single mark the spread is zero and every quartile is that mark.
pub fn summarize(marks: &[i64], marks_available: i64) -> Option<TestAggregate> {
    let (&first, _) = marks.split_first()?;
    let capacity = marks_available as f64;
    let pct = |v: f64| round_half_even_1_decimal(v / capacity * 100.0);

    let mut sorted = marks.to_vec();
    sorted.sort_unstable();
    let min = sorted[0] as f64;
    let max = sorted[sorted.len() - 1] as f64;

    let (stddev, [p25, p50, p75]) = if sorted.len() >= 2 {
        (sample_stddev(&sorted), quartiles_exclusive(&sorted))
    } else {
        let only = first as f64;
        (0.0, [only, only, only])
    };

    Some(TestAggregate {
        mean: pct(mean(&sorted)),
        stddev: pct(stddev),
        min: pct(min),
        max: pct(max),
        p25: pct(p25),
        p50: pct(p50),
        p75: pct(p75),
        count: sorted.len(),
    })
}

/// Statistics for a stored test, wrapped in a one-element list to keep the
/// response shape existing clients expect.
///
/// Test and results are read in one transaction so they come from the same
/// snapshot.
pub fn aggregate(conn: &Connection, test_id: &NumericId) -> Result<Vec<TestAggregate>> {
    let tx = conn.unchecked_transaction()?;

    tracing::debug!(%test_id, "fetching test");
    let Some(marks_available) = db::test_marks_available(&tx, test_id)? else {
        tracing::warn!(%test_id, "test not found");
        return Err(ServiceError::TestNotFound(test_id.clone()));
    };
    if marks_available <= 0 {
        tracing::error!(%test_id, marks_available, "stored capacity is not positive");
        return Err(ServiceError::StorageFailure(
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Integer,
                format!("test {test_id} has non-positive marks_available {marks_available}")
                    .into(),
            ),
        ));
    }

    tracing::debug!(%test_id, "fetching results");
    let marks = db::result_marks(&tx, test_id)?;
    tx.finish()?;

    let Some(stats) = summarize(&marks, marks_available) else {
        tracing::warn!(%test_id, "no results found");
        return Err(ServiceError::NoResultsFound(test_id.clone()));
    };
    tracing::info!(%test_id, count = stats.count, "aggregate computed");
    Ok(vec![stats])
}
