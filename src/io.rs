//! Decoding of ledger export files into typed records

use std::{path::Path, str::FromStr};

use chrono::NaiveDate;
use csv::{StringRecord, Trim};
use encoding_rs::{SHIFT_JIS, UTF_8};
use rust_decimal::Decimal;

use crate::{
    errors::{Error, RowParseError},
    types::{Ledger, LedgerRecord, RowPolicy, LEDGER_COLUMNS},
};

/// A candidate text decoding; `None` means the bytes are malformed for it.
type TextDecoder = fn(&[u8]) -> Option<String>;

/// Encodings tried in order, first success wins.
///
/// Exports saved by Excel on Japanese Windows come out as Shift_JIS (code page 932),
/// everything else as UTF-8, sometimes with a byte-order mark.
const ENCODING_LADDER: [(&str, TextDecoder); 2] = [
    ("UTF-8", decode_utf8 as TextDecoder),
    ("Shift_JIS", decode_shift_jis as TextDecoder),
];

/// Largest magnitude accepted for a single amount; sums of in-range amounts cannot overflow
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

const DATE_FORMATS: [&str; 3] = ["%Y/%m/%d", "%Y-%m-%d", "%Y年%m月%d日"];

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    UTF_8
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

fn decode_shift_jis(bytes: &[u8]) -> Option<String> {
    SHIFT_JIS
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

/// Decodes raw file content with the first encoding that accepts it.
///
/// Returns the name of the winning encoding along with the text.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> Option<(&'static str, String)> {
    ENCODING_LADDER
        .iter()
        .find_map(|(name, decode)| decode(bytes).map(|text| (*name, text)))
}

/// Positions of the expected columns within a particular file's header
struct ColumnIndex([usize; LEDGER_COLUMNS.len()]);

impl ColumnIndex {
    /// Fails with [`Error::Schema`] naming the first expected column that is absent
    fn from_header(header: &StringRecord) -> Result<Self, Error> {
        let mut positions = [0; LEDGER_COLUMNS.len()];
        for (slot, column) in positions.iter_mut().zip(LEDGER_COLUMNS) {
            *slot = header
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| Error::Schema(column.to_string()))?;
        }
        Ok(Self(positions))
    }

    fn field<'r>(&self, record: &'r StringRecord, column: usize) -> &'r str {
        record.get(self.0[column]).unwrap_or("")
    }
}

/// Strips currency signs, thousands separators and whitespace, then parses what is left.
///
/// `▲`/`△` and full-width minus signs count as a negative sign. Magnitudes above
/// [`MAX_AMOUNT`] are rejected.
fn parse_amount(text: &str) -> Option<Decimal> {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '0'..='9' | '.' | '-' => cleaned.push(c),
            '０'..='９' => cleaned.push(char::from_u32(c as u32 - '０' as u32 + '0' as u32)?),
            '−' | '－' | '▲' | '△' => cleaned.push('-'),
            ',' | '，' | '¥' | '￥' | '円' | '+' | '＋' => {}
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }
    Decimal::from_str(&cleaned)
        .ok()
        .filter(|amount| amount.abs() <= MAX_AMOUNT)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    // Some exports append a time of day
    let date_part = text.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

fn parse_record(
    record: &StringRecord,
    index: &ColumnIndex,
    row: usize,
) -> Result<LedgerRecord, RowParseError> {
    let text = |column: usize| index.field(record, column).to_string();

    let date_text = index.field(record, 1);
    let date = parse_date(date_text).ok_or_else(|| {
        RowParseError::new(row, LEDGER_COLUMNS[1], format!("invalid date {date_text:?}"))
    })?;
    let amount_text = index.field(record, 3);
    let amount = parse_amount(amount_text).ok_or_else(|| {
        RowParseError::new(row, LEDGER_COLUMNS[3], format!("invalid amount {amount_text:?}"))
    })?;

    Ok(LedgerRecord {
        eligible: index.field(record, 0) == "1",
        date,
        description: text(2),
        amount,
        institution: text(4),
        major_category: text(5),
        minor_category: text(6),
        memo: text(7),
        is_transfer: index.field(record, 8) == "1",
        id: text(9),
    })
}

/// Parses decoded ledger text.
///
/// The first row must be a header containing every column in [`LEDGER_COLUMNS`]; extra
/// columns and column order do not matter. `source` names the file in errors and logs.
///
/// # Errors
/// - [`Error::Schema`] if the header lacks an expected column
/// - [`Error::RowParse`] on the first bad row under [`RowPolicy::Strict`]
/// - [`Error::NoUsableRows`] if there were data rows but none of them parsed
pub fn parse_ledger(text: &str, source: &str, policy: RowPolicy) -> Result<Ledger, Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let index = ColumnIndex::from_header(csv_reader.headers()?)?;

    let mut ledger = Ledger::default();
    for (position, record) in csv_reader.records().enumerate() {
        let record = record?;
        match parse_record(&record, &index, position + 1) {
            Ok(parsed) => ledger.records.push(parsed),
            Err(err) if policy == RowPolicy::SkipAndContinue => {
                tracing::warn!(source, %err, "skipping ledger row");
                ledger.warnings.push(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    if ledger.records.is_empty() && !ledger.warnings.is_empty() {
        return Err(Error::NoUsableRows(source.to_string()));
    }
    Ok(ledger)
}

/// Decodes raw ledger bytes, trying each encoding in turn, then parses them.
///
/// Expects input data in this format (including header):
/// ```csv
/// 計算対象,日付,内容,金額（円）,保有金融機関,大項目,中項目,メモ,振替,ID
/// 1,2025/08/30,スーパー,-1329,楽天カード,食費,食料品,,0,abc123
/// ```
/// # Errors
/// [`Error::Decode`] if no encoding accepts the bytes, otherwise as [`parse_ledger`]
pub fn decode_ledger(bytes: &[u8], source: &str, policy: RowPolicy) -> Result<Ledger, Error> {
    let (encoding, text) = decode_text(bytes).ok_or_else(|| Error::Decode(source.to_string()))?;
    tracing::debug!(source, encoding, "decoded ledger");
    parse_ledger(&text, source, policy)
}

/// Reads and decodes a ledger file that has already been resolved under the ledger root.
/// # Errors
/// [`Error::Io`] if the file cannot be read, otherwise as [`decode_ledger`]
pub fn load_ledger(path: &Path, policy: RowPolicy) -> Result<Ledger, Error> {
    let bytes = std::fs::read(path)?;
    decode_ledger(&bytes, &source_name(path), policy)
}

/// The file name used to identify a ledger in messages
#[must_use]
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
