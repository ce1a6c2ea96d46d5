//! Pure spread-percentage and trade-direction math for the pair-spread DCA
//! strategy. Stateless, decimal-only; never touches the network or a database.

use rust_decimal::Decimal;

/// `(current/start - 1) * 100`. Returns 0 if `start` is zero rather than
/// dividing by it.
pub fn pct_change(current: Decimal, start: Decimal) -> Decimal {
    if start.is_zero() {
        return Decimal::ZERO;
    }
    (current / start - Decimal::ONE) * Decimal::ONE_HUNDRED
}

/// Signed spread between two markets' percentage change from their baselines.
pub fn spread(m1_current: Decimal, m1_start: Decimal, m2_current: Decimal, m2_start: Decimal) -> Decimal {
    pct_change(m1_current, m1_start) - pct_change(m2_current, m2_start)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// Short the leader, long the laggard: the market with the larger percentage
/// change gets sold, the other gets bought.
pub fn direction(m1_change: Decimal, m2_change: Decimal) -> (Side, Side) {
    if m1_change > m2_change {
        (Side::Sell, Side::Buy)
    } else {
        (Side::Buy, Side::Sell)
    }
}

/// Regression-mode take-profit: spread has reverted back towards the level it
/// was at on first entry by at least `ratio` percentage points.
pub fn take_profit_regression(current_spread: Decimal, first_spread: Decimal, ratio: Decimal) -> bool {
    (first_spread - current_spread).abs() >= ratio
}

/// Position-mode take-profit: realized-equivalent P&L as a percentage of
/// total margin at risk has reached `ratio`.
pub fn take_profit_position(total_pnl: Decimal, total_margin: Decimal, ratio: Decimal) -> bool {
    total_margin > Decimal::ZERO && (total_pnl / total_margin) * Decimal::ONE_HUNDRED >= ratio
}

/// `ratio <= 0` disables stop-loss entirely.
pub fn stop_loss(total_pnl: Decimal, total_margin: Decimal, ratio: Decimal) -> bool {
    if ratio <= Decimal::ZERO || total_margin.is_zero() {
        return false;
    }
    let loss_ratio = (total_pnl / total_margin).abs() * Decimal::ONE_HUNDRED;
    total_pnl < Decimal::ZERO && loss_ratio >= ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pct_change_zero_start_is_zero() {
        assert_eq!(pct_change(dec!(100), dec!(0)), dec!(0));
    }

    #[test]
    fn first_entry_shorts_the_leader() {
        let p1 = dec!(102);
        let m1s = dec!(100);
        let p2 = dec!(100);
        let m2s = dec!(100);
        let d1 = pct_change(p1, m1s);
        let d2 = pct_change(p2, m2s);
        assert_eq!(d1, dec!(2));
        assert_eq!(d2, dec!(0));
        let s = spread(p1, m1s, p2, m2s);
        assert_eq!(s, dec!(2));
        assert_eq!(direction(d1, d2), (Side::Sell, Side::Buy));
    }

    #[test]
    fn scale_in_gated_below_threshold() {
        let s = spread(dec!(102.5), dec!(100), dec!(100), dec!(100));
        assert_eq!(s, dec!(2.5));
        assert!((dec!(2.5) - dec!(2)).abs() < dec!(1));
    }

    #[test]
    fn scale_in_triggered_above_threshold() {
        let s = spread(dec!(103.5), dec!(100), dec!(100), dec!(100));
        assert_eq!(s, dec!(3.5));
        assert!((s - dec!(2)).abs() >= dec!(1));
    }

    #[test]
    fn regression_take_profit_fires_on_reversion() {
        assert!(take_profit_regression(dec!(1.0), dec!(2.0), dec!(1.0)));
    }

    #[test]
    fn stop_loss_disabled_at_zero_ratio() {
        assert!(!stop_loss(dec!(-1_000_000), dec!(100), dec!(0)));
    }

    #[test]
    fn spread_antisymmetric_under_market_swap() {
        let a = dec!(102);
        let b = dec!(100);
        let c = dec!(98);
        let d = dec!(100);
        assert_eq!(spread(a, b, c, d), -spread(c, d, a, b));
    }

    #[test]
    fn take_profit_position_requires_positive_margin() {
        assert!(!take_profit_position(dec!(10), dec!(0), dec!(1)));
    }
}
