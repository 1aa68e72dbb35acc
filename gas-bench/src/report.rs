//! Awaits transactions and appends their cost to a CSV report file.
//!
//! [`log`] is the single entry point: hand it the outcome of
//! `transact_async()` together with a description, and on success it writes
//! one row of `description,gas_burnt,gas_price,cost_near` to the report file.
//! The file is a process-lifetime singleton, created with a header on first
//! use; every test in a binary appends to the same report.

use std::fs::{File, OpenOptions};
use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};

use csv::{QuoteStyle, WriterBuilder};
use near_workspaces::result::{ExecutionFailure, ExecutionFinalResult, ExecutionSuccess};
use serde::Serialize;

/// Environment variable overriding the report file location.
pub const REPORT_PATH_ENV: &str = "GAS_REPORT_PATH";

const DEFAULT_REPORT_PATH: &str = "gas_report.csv";

const REPORT_HEADER: [&str; 4] = ["description", "gas_burnt", "gas_price", "cost_near"];

/// Yocto-NEAR per NEAR.
const ONE_NEAR: u128 = 10u128.pow(24);

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The transaction was rejected on submission, so there is no pending
    /// execution to await.
    #[error("invalid transaction handle: {0}")]
    InvalidTransactionHandle(#[source] near_workspaces::error::Error),
    /// Awaiting the final execution outcome failed.
    #[error("failed to confirm transaction: {0}")]
    Confirmation(#[source] near_workspaces::error::Error),
    /// The transaction was executed and failed.
    #[error("transaction execution failed: {0}")]
    Execution(#[source] ExecutionFailure),
    #[error("failed to write gas report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write gas report: {0}")]
    Csv(#[from] csv::Error),
}

/// Awaits the transaction behind `handle`, prints a cost summary and appends
/// it to the report file. Returns the execution receipt.
///
/// `handle` is the value returned by `transact_async()`: the submission
/// result wrapping an awaitable transaction status. If submission itself
/// failed there is nothing to await and the call returns
/// [`ReportError::InvalidTransactionHandle`] before touching the report file.
/// Failures while awaiting or executing the transaction are logged together
/// with `description` and propagated; nothing is appended for them.
pub async fn log<T>(
    description: &str,
    handle: near_workspaces::Result<T>,
) -> Result<ExecutionSuccess, ReportError>
where
    T: IntoFuture<Output = near_workspaces::Result<ExecutionFinalResult>>,
{
    let pending = match handle {
        Ok(pending) => pending,
        Err(err) => {
            tracing::error!(description, error = %err, "transaction was not accepted");
            return Err(ReportError::InvalidTransactionHandle(err));
        }
    };

    let outcome = match pending.await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(description, error = %err, "failed to await transaction");
            return Err(ReportError::Confirmation(err));
        }
    };

    let receipt = match outcome.into_result() {
        Ok(receipt) => receipt,
        Err(err) => {
            tracing::error!(description, error = %err, "transaction failed");
            return Err(ReportError::Execution(err));
        }
    };

    let gas_burnt = receipt.total_gas_burnt.as_gas();
    let tokens_burnt: u128 = receipt
        .outcomes()
        .iter()
        .map(|outcome| outcome.tokens_burnt.as_yoctonear())
        .sum();
    let gas_price = format_ratio(tokens_burnt, u128::from(gas_burnt), 6);
    let cost_near = format_ratio(tokens_burnt, ONE_NEAR, 24);

    tracing::info!("{description}: {gas_burnt} gas burnt, {cost_near} NEAR ({gas_price} yoctoNEAR per gas)");

    ReportSink::global().append(&CostRow {
        description,
        gas_burnt,
        gas_price,
        cost_near,
    })?;

    Ok(receipt)
}

/// A row of the report file. Serialized in declaration order, matching
/// [`REPORT_HEADER`].
#[derive(Serialize)]
struct CostRow<'a> {
    description: &'a str,
    gas_burnt: u64,
    gas_price: String,
    cost_near: String,
}

/// The report file. Lazily initialized once per process; the path is fixed at
/// first use.
struct ReportSink {
    path: PathBuf,
    /// Guards file access and tracks whether the header has been written.
    header_written: Mutex<bool>,
}

static SINK: OnceLock<ReportSink> = OnceLock::new();

impl ReportSink {
    fn global() -> &'static Self {
        SINK.get_or_init(|| Self {
            path: std::env::var_os(REPORT_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH)),
            header_written: Mutex::new(false),
        })
    }

    fn append(&self, row: &CostRow<'_>) -> Result<(), ReportError> {
        let mut header_written = self
            .header_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !*header_written {
            // First use in this process: start a fresh report, discarding any
            // file left over from an earlier run.
            let mut writer = csv_writer(File::create(&self.path)?);
            writer.write_record(REPORT_HEADER)?;
            writer.flush()?;
            *header_written = true;
        }

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }
}

/// Quoting descriptions but not numbers keeps the report both spreadsheet-
/// and grep-friendly.
fn csv_writer(file: File) -> csv::Writer<File> {
    WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(file)
}

/// Formats `numer / denom` as a decimal string with at most `max_decimals`
/// fractional digits, trailing zeros trimmed.
fn format_ratio(numer: u128, denom: u128, max_decimals: u32) -> String {
    if denom == 0 {
        return "0".to_string();
    }
    let whole = numer / denom;
    let mut rem = numer % denom;
    let mut frac = String::new();
    for _ in 0..max_decimals {
        if rem == 0 {
            break;
        }
        rem *= 10;
        let digit = u32::try_from(rem / denom).unwrap_or(0);
        frac.push(std::char::from_digit(digit, 10).unwrap_or('0'));
        rem %= denom;
    }
    while frac.ends_with('0') {
        frac.pop();
    }
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}
