//! Domain operations. Handlers in `api` stay thin and call into these; every
//! multi-row write runs inside a single transaction here.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod import;
pub mod orders;
pub mod payment;
pub mod reviews;

use rust_decimal::Decimal;

/// Normalises an amount to two decimal places for storage and display.
pub fn money(amount: Decimal) -> Decimal {
    let mut value = amount.round_dp(2);
    value.rescale(2);
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_has_two_places() {
        assert_eq!(money(Decimal::from(40)).to_string(), "40.00");
        assert_eq!(money(Decimal::new(19999, 3)).to_string(), "20.00");
    }
}
