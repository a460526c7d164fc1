//! Stateless posting validation.

use std::collections::{BTreeMap, HashMap};

use meridian_shared::types::Currency;
use rust_decimal::Decimal;

use super::error::PostingError;
use super::types::{LedgerLine, LineTarget};

/// Validates the shape and balance of a posting's lines.
///
/// Lines are grouped by currency and every group must net to exactly
/// zero on its own; a surplus in one currency can never offset a deficit
/// in another. Targets must be unique within a posting so the
/// application order and any later reversal stay unambiguous.
///
/// # Errors
///
/// Returns the first violation found, indexed by input position.
pub fn validate_lines(lines: &[LedgerLine], max_lines: usize) -> Result<(), PostingError> {
    if lines.is_empty() {
        return Err(PostingError::Empty);
    }
    if lines.len() > max_lines {
        return Err(PostingError::TooManyLines {
            count: lines.len(),
            max: max_lines,
        });
    }

    let mut seen: HashMap<LineTarget, usize> = HashMap::with_capacity(lines.len());
    let mut nets: BTreeMap<Currency, Decimal> = BTreeMap::new();
    for (index, line) in lines.iter().enumerate() {
        if line.amount.is_zero() {
            return Err(PostingError::ZeroLineAmount { index });
        }
        if !line.amount.scale_fits_currency() {
            return Err(PostingError::InvalidScale {
                index,
                currency: line.amount.currency,
                scale: line.amount.currency.decimal_places(),
            });
        }
        if let Some(first) = seen.insert(line.target, index) {
            return Err(PostingError::DuplicateTarget { index, first });
        }
        *nets.entry(line.amount.currency).or_insert(Decimal::ZERO) += line.amount.amount;
    }

    for (currency, net) in nets {
        if !net.is_zero() {
            return Err(PostingError::Unbalanced { currency, net });
        }
    }
    Ok(())
}
