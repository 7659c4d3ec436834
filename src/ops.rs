use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::{
    month::MonthKey,
    types::{
        CategoryTotal, LedgerRecord, Summary, SummaryOptions, TopExpense, TransferPolicy,
        UNKNOWN_CATEGORY,
    },
};

impl LedgerRecord {
    /// Whether this record takes part in the summary of `month`
    fn counts_toward(&self, month: MonthKey, transfers: TransferPolicy) -> bool {
        self.eligible
            && month.contains(self.date)
            && !(transfers == TransferPolicy::Exclude && self.is_transfer)
    }

    fn category_label(&self) -> &str {
        if self.major_category.is_empty() {
            UNKNOWN_CATEGORY
        } else {
            &self.major_category
        }
    }
}

/// Aggregates the records of one month.
///
/// A record is included when it is eligible, dated inside `month`, and not dropped by
/// the transfer policy. Negative amounts add their magnitude to `expense`, positive
/// amounts add to `income`, and zero amounts only add to `record_count`.
///
/// The result depends only on the arguments, so identical input always gives an
/// identical [`Summary`].
#[must_use]
pub fn summarize(records: &[LedgerRecord], month: MonthKey, options: &SummaryOptions) -> Summary {
    let included: Vec<&LedgerRecord> = records
        .iter()
        .filter(|record| record.counts_toward(month, options.transfers))
        .collect();

    let mut income = Decimal::ZERO;
    let mut expense = Decimal::ZERO;
    for record in &included {
        if record.amount < Decimal::ZERO {
            expense += record.amount.abs();
        } else if record.amount > Decimal::ZERO {
            income += record.amount;
        }
    }

    let by_category = options.by_category.then(|| category_totals(&included));

    Summary {
        month,
        income,
        expense,
        net: income - expense,
        record_count: included.len(),
        by_category,
        top_expenses: top_expenses(&included, options.top_expenses),
    }
}

/// Signed totals per major category, largest spend (most negative) first.
/// Ties are broken by category name.
fn category_totals(included: &[&LedgerRecord]) -> Vec<CategoryTotal> {
    let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for record in included {
        *totals.entry(record.category_label()).or_default() += record.amount;
    }
    let mut totals: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, total)| CategoryTotal {
            category: category.to_string(),
            total,
        })
        .collect();
    totals.sort_by(|a, b| a.total.cmp(&b.total));
    totals
}

fn top_expenses(included: &[&LedgerRecord], limit: usize) -> Vec<TopExpense> {
    let mut expenses: Vec<&&LedgerRecord> = included
        .iter()
        .filter(|record| record.amount < Decimal::ZERO)
        .collect();
    expenses.sort_by(|a, b| a.amount.cmp(&b.amount));
    expenses
        .into_iter()
        .take(limit)
        .map(|record| TopExpense {
            date: record.date,
            title: record.description.clone(),
            amount: record.amount,
            category: record.major_category.clone(),
            subcategory: record.minor_category.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;

    fn record(eligible: bool, date: (i32, u32, u32), amount: Decimal) -> LedgerRecord {
        LedgerRecord {
            eligible,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            description: format!("item {amount}"),
            amount,
            institution: String::new(),
            major_category: "食費".to_string(),
            minor_category: String::new(),
            memo: String::new(),
            is_transfer: false,
            id: String::new(),
        }
    }

    fn august() -> MonthKey {
        MonthKey::new(2025, 8).unwrap()
    }

    #[test]
    fn test_ineligible_rows_are_excluded() {
        let records = vec![
            record(true, (2025, 8, 30), dec!(-1329)),
            record(true, (2025, 8, 29), dec!(-362)),
            record(false, (2025, 8, 29), dec!(-436)),
        ];
        let summary = summarize(&records, august(), &SummaryOptions::default());
        assert_eq!(summary.income, dec!(0));
        assert_eq!(summary.expense, dec!(1691));
        assert_eq!(summary.net, dec!(-1691));
        assert_eq!(summary.record_count, 2);
    }

    #[test]
    fn test_other_months_are_excluded() {
        let records = vec![
            record(true, (2025, 7, 31), dec!(-100)),
            record(true, (2025, 8, 1), dec!(-200)),
            record(true, (2025, 9, 1), dec!(-400)),
            record(true, (2024, 8, 15), dec!(-800)),
        ];
        let summary = summarize(&records, august(), &SummaryOptions::default());
        assert_eq!(summary.expense, dec!(200));
        assert_eq!(summary.record_count, 1);
    }

    #[test]
    fn test_zero_amount_only_counts() {
        let records = vec![
            record(true, (2025, 8, 1), dec!(0)),
            record(true, (2025, 8, 2), dec!(5000)),
        ];
        let summary = summarize(&records, august(), &SummaryOptions::default());
        assert_eq!(summary.income, dec!(5000));
        assert_eq!(summary.expense, dec!(0));
        assert_eq!(summary.record_count, 2);
        assert!(summary.top_expenses.is_empty());
    }

    #[test]
    fn test_transfer_policies() {
        let mut out = record(true, (2025, 8, 10), dec!(-30000));
        out.is_transfer = true;
        let mut back = record(true, (2025, 8, 10), dec!(30000));
        back.is_transfer = true;
        let records = vec![out, back, record(true, (2025, 8, 11), dec!(-1000))];

        let included = summarize(&records, august(), &SummaryOptions::default());
        assert_eq!(included.income, dec!(30000));
        assert_eq!(included.expense, dec!(31000));
        assert_eq!(included.record_count, 3);

        let options = SummaryOptions {
            transfers: TransferPolicy::Exclude,
            ..SummaryOptions::default()
        };
        let excluded = summarize(&records, august(), &options);
        assert_eq!(excluded.income, dec!(0));
        assert_eq!(excluded.expense, dec!(1000));
        assert_eq!(excluded.net, dec!(-1000));
        assert_eq!(excluded.record_count, 1);
    }

    #[test]
    fn test_category_totals_are_signed() {
        let mut salary = record(true, (2025, 8, 25), dec!(300000));
        salary.major_category = "収入".to_string();
        let mut refund = record(true, (2025, 8, 26), dec!(500));
        refund.major_category = String::new();
        let records = vec![
            record(true, (2025, 8, 1), dec!(-1200)),
            record(true, (2025, 8, 2), dec!(300)),
            salary,
            refund,
        ];
        let summary = summarize(&records, august(), &SummaryOptions::default());
        let categories = summary.by_category.unwrap();
        assert_eq!(
            categories,
            vec![
                CategoryTotal {
                    category: "食費".to_string(),
                    total: dec!(-900)
                },
                CategoryTotal {
                    category: UNKNOWN_CATEGORY.to_string(),
                    total: dec!(500)
                },
                CategoryTotal {
                    category: "収入".to_string(),
                    total: dec!(300000)
                },
            ]
        );
    }

    #[test]
    fn test_categories_can_be_skipped() {
        let options = SummaryOptions {
            by_category: false,
            ..SummaryOptions::default()
        };
        let summary = summarize(&[record(true, (2025, 8, 1), dec!(-1))], august(), &options);
        assert!(summary.by_category.is_none());
    }

    #[test]
    fn test_top_expenses_most_negative_first() {
        let records: Vec<LedgerRecord> = [-100, -5000, 2000, -300, -40, -700, -20]
            .into_iter()
            .enumerate()
            .map(|(day, amount)| record(true, (2025, 8, day as u32 + 1), Decimal::from(amount)))
            .collect();
        let summary = summarize(&records, august(), &SummaryOptions::default());
        let amounts: Vec<Decimal> = summary.top_expenses.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![dec!(-5000), dec!(-700), dec!(-300), dec!(-100), dec!(-40)]);
    }

    #[test]
    fn test_repeat_runs_are_identical() {
        let records = vec![
            record(true, (2025, 8, 30), dec!(-1329.5)),
            record(true, (2025, 8, 29), dec!(1200)),
            record(true, (2025, 8, 28), dec!(-1200)),
        ];
        let first = summarize(&records, august(), &SummaryOptions::default());
        let second = summarize(&records, august(), &SummaryOptions::default());
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_net_is_income_minus_expense() {
        // Small linear congruential generator so the record sets are reproducible
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            seed >> 33
        };
        for _ in 0..50 {
            let len = next() % 40;
            let records: Vec<LedgerRecord> = (0..len)
                .map(|_| {
                    let cents = (next() % 2_000_000) as i64 - 1_000_000;
                    let day = (next() % 28) as u32 + 1;
                    let month = if next() % 4 == 0 { 7 } else { 8 };
                    record(next() % 5 != 0, (2025, month, day), Decimal::new(cents, 2))
                })
                .collect();
            let summary = summarize(&records, august(), &SummaryOptions::default());
            assert_eq!(summary.net, summary.income - summary.expense);
            assert!(summary.income >= Decimal::ZERO);
            assert!(summary.expense >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_oversized_amount_is_skipped_before_aggregation() {
        let text = format!(
            "{}\n1,2025/08/01,huge,79228162514264337593543950335,,食費,,,0,a\n\
             1,2025/08/02,small,1,,食費,,,0,b\n\
             1,2025/08/03,cap,-1000000000000000000,,食費,,,0,c\n",
            crate::types::LEDGER_COLUMNS.join(",")
        );
        let ledger = crate::io::parse_ledger(&text, "huge.csv", Default::default()).unwrap();
        assert_eq!(ledger.warnings.len(), 1);
        assert_eq!(ledger.warnings[0].row, 1);

        let summary = summarize(&ledger.records, august(), &SummaryOptions::default());
        assert_eq!(summary.income, dec!(1));
        assert_eq!(summary.expense, crate::io::MAX_AMOUNT);
        assert_eq!(summary.net, dec!(1) - crate::io::MAX_AMOUNT);
        assert_eq!(summary.record_count, 2);
    }
}
