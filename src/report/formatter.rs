//! Plain-text rendering of aggregate rows

use crate::currency::CurrencyError;
use crate::period::Period;
use crate::store::ReportRow;
use crate::texts;
use rust_decimal::Decimal;
use std::fmt::Write;

/// Render rows (already in the display currency) as an aligned table
///
/// ```text
/// Расходы за месяц, BYN:
///  Сумма | Категория
/// ------------------
///  12.50 | Еда
///   3.00 | Такси
/// ------------------
///  15.50 | Итого
/// ```
///
/// The amount column is as wide as the total plus one; zero rows render the
/// "no data" message instead. Fails if the total does not fit a `Decimal`.
pub fn format_report(
    rows: &[ReportRow],
    currency: &str,
    period: Period,
) -> Result<String, CurrencyError> {
    if rows.is_empty() {
        return Ok(texts::report_empty(period.title()));
    }

    let total = rows
        .iter()
        .try_fold(Decimal::ZERO, |sum, row| sum.checked_add(row.amount))
        .ok_or_else(|| CurrencyError::Overflow(currency.to_string()))?;
    let total_text = money(total);
    let width = total_text.chars().count() + 1;

    let label_width = rows
        .iter()
        .map(|row| row.category.chars().count())
        .chain([
            texts::REPORT_CATEGORY_HEADER.chars().count(),
            texts::REPORT_TOTAL.chars().count(),
        ])
        .max()
        .unwrap_or(0);
    let amount_width = width.max(texts::REPORT_AMOUNT_HEADER.chars().count());
    let separator = "-".repeat(amount_width + 3 + label_width);

    let mut out = texts::report_heading(period.title(), currency);
    out.push('\n');
    let _ = writeln!(
        out,
        "{:>amount_width$} | {}",
        texts::REPORT_AMOUNT_HEADER,
        texts::REPORT_CATEGORY_HEADER
    );
    out.push_str(&separator);
    out.push('\n');
    for row in rows {
        let _ = writeln!(out, "{:>amount_width$} | {}", money(row.amount), row.category);
    }
    out.push_str(&separator);
    out.push('\n');
    let _ = write!(out, "{total_text:>amount_width$} | {}", texts::REPORT_TOTAL);
    Ok(out)
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
