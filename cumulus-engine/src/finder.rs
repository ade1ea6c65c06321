//! Eventual-consistency finder.
//!
//! Wraps a describe/list call that may return zero, one or many records and
//! reduces it to exactly one record, [`ReconcileError::NotFound`], or a
//! terminal "too many results" failure. The finder never retries; callers
//! wrap it with [`crate::waiter`] helpers when propagation lag is expected.

use std::future::Future;

use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{ApiError, ReconcileError, Result};

/// Reduce `records` to the single record that passes `exact`.
pub fn single_result<T>(records: Vec<T>, what: &str, exact: impl Fn(&T) -> bool) -> Result<T> {
    if records.len() > 1 {
        return Err(ReconcileError::terminal(format!(
            "{}: too many results: wanted 1, got {}",
            what,
            records.len()
        )));
    }
    match records.into_iter().next() {
        None => Err(ReconcileError::not_found(format!("{}: empty result", what))),
        Some(record) if exact(&record) => Ok(record),
        Some(_) => {
            debug!(what, "describe returned a non-matching record");
            Err(ReconcileError::not_found(format!("{}: no exact match", what)))
        }
    }
}

/// Issue `describe` and reduce its records with [`single_result`].
///
/// Remote errors with a code in `not_found_codes` become not found; other
/// errors are classified by `config`.
pub async fn find_one<T, Fut>(
    config: &ProviderConfig,
    what: &str,
    not_found_codes: &[&str],
    describe: Fut,
    exact: impl Fn(&T) -> bool,
) -> Result<T>
where
    Fut: Future<Output = std::result::Result<Vec<T>, ApiError>>,
{
    let records = config.classify(describe.await, not_found_codes)?;
    single_result(records, what, exact)
}
