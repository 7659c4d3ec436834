//! Common datatypes shared by the decoder, the aggregation engine and the server

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{errors::RowParseError, month::MonthKey};

/// Header names of a ledger export, in file order
pub const LEDGER_COLUMNS: [&str; 10] = [
    "計算対象",
    "日付",
    "内容",
    "金額（円）",
    "保有金融機関",
    "大項目",
    "中項目",
    "メモ",
    "振替",
    "ID",
];

/// Label used for records whose major category is blank
pub const UNKNOWN_CATEGORY: &str = "(不明)";

/// One parsed transaction row from a ledger file.
///
/// Records are never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    /// Whether the row counts toward aggregation (`計算対象` is exactly `1`)
    pub eligible: bool,
    /// Transaction date
    pub date: NaiveDate,
    /// Free-text description of the transaction
    pub description: String,
    /// Signed amount in yen: negative for outflows, positive for inflows
    pub amount: Decimal,
    /// Bank, card or wallet holding the transaction
    pub institution: String,
    /// Top-level category (`大項目`)
    pub major_category: String,
    /// Sub-category (`中項目`)
    pub minor_category: String,
    /// User memo
    pub memo: String,
    /// Whether the row is a transfer between the user's own accounts
    pub is_transfer: bool,
    /// Opaque identifier from the export
    pub id: String,
}

/// The records decoded from one or more ledger files, plus rows that were skipped.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    /// Successfully parsed records, in file order
    pub records: Vec<LedgerRecord>,
    /// Rows that failed to parse and were skipped
    pub warnings: Vec<RowParseError>,
}

impl Ledger {
    /// Appends another ledger's records and warnings to this one
    pub fn extend(&mut self, other: Ledger) {
        self.records.extend(other.records);
        self.warnings.extend(other.warnings);
    }
}

/// What to do with a row that cannot be parsed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RowPolicy {
    /// Skip the row and record a warning
    #[default]
    SkipAndContinue,
    /// Fail the whole file on the first bad row
    Strict,
}

/// How transfer-flagged records are treated by the aggregation engine.
///
/// Transfers between the user's own accounts can show up twice (once per side), so
/// callers that want pure income/expense figures should exclude them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TransferPolicy {
    /// Count transfers like any other record
    #[default]
    Include,
    /// Drop records with `is_transfer == true` before aggregating
    Exclude,
}

/// Knobs for a single aggregation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Whether to produce [`Summary::by_category`]
    pub by_category: bool,
    /// Treatment of transfer-flagged records
    pub transfers: TransferPolicy,
    /// How many of the largest expenses to list in [`Summary::top_expenses`]
    pub top_expenses: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            by_category: true,
            transfers: TransferPolicy::Include,
            top_expenses: 5,
        }
    }
}

/// Net contribution of one major category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    /// The major category, or [`UNKNOWN_CATEGORY`]
    pub category: String,
    /// Sum of signed amounts in the category
    pub total: Decimal,
}

/// One of the month's largest expenses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopExpense {
    /// Transaction date
    pub date: NaiveDate,
    /// Transaction description
    pub title: String,
    /// Signed (negative) amount
    pub amount: Decimal,
    /// Major category
    pub category: String,
    /// Minor category
    pub subcategory: String,
}

/// Aggregate figures for one month.
///
/// Always recomputed from records; `net == income - expense` holds exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// The month that was aggregated
    pub month: MonthKey,
    /// Sum of positive amounts
    pub income: Decimal,
    /// Sum of the absolute values of negative amounts
    pub expense: Decimal,
    /// `income - expense`
    pub net: Decimal,
    /// Number of records that passed the eligibility, month and transfer filters
    pub record_count: usize,
    /// Per-category net totals, ascending by total, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_category: Option<Vec<CategoryTotal>>,
    /// The month's most negative records, most negative first
    pub top_expenses: Vec<TopExpense>,
}
