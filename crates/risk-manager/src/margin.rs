//! Margin and exposure arithmetic, done in decimal.

use analysis_core::{AccountState, TradeParams};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Cash that must be posted to open `params`. None for a non-positive leverage.
pub fn required_margin(params: &TradeParams) -> Option<Decimal> {
    let leverage = to_decimal(params.leverage);
    if leverage <= Decimal::ZERO {
        return None;
    }
    Some((to_decimal(params.notional) / leverage).round_dp(2))
}

pub fn available_margin(account: &AccountState) -> Decimal {
    to_decimal(account.available_cash).round_dp(2)
}

/// Notional as a percentage of account equity
pub fn position_pct(params: &TradeParams, account: &AccountState) -> Decimal {
    let equity = to_decimal(account.balance);
    if equity <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    to_decimal(params.notional) / equity * Decimal::from(100)
}

/// Loss at the stop for this trade
pub fn trade_risk(params: &TradeParams) -> Decimal {
    (to_decimal(params.entry_price) - to_decimal(params.stop_loss)).abs()
        * to_decimal(params.quantity)
}

/// Existing open risk plus this trade's, as a percentage of equity
pub fn portfolio_risk_pct(params: &TradeParams, account: &AccountState) -> Decimal {
    let equity = to_decimal(account.balance);
    if equity <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (to_decimal(account.open_risk()) + trade_risk(params)) / equity * Decimal::from(100)
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{OpenPosition, PositionSide};
    use rust_decimal_macros::dec;

    fn params(notional: f64, leverage: f64) -> TradeParams {
        TradeParams {
            entry_price: 100.0,
            stop_loss: 98.0,
            take_profit: 106.0,
            quantity: notional / 100.0,
            notional,
            leverage,
            atr: 1.2,
        }
    }

    #[test]
    fn test_required_margin() {
        assert_eq!(required_margin(&params(12_000.0, 1.0)), Some(dec!(12000)));
        assert_eq!(required_margin(&params(12_000.0, 4.0)), Some(dec!(3000)));
        assert_eq!(required_margin(&params(12_000.0, 0.0)), None);
    }

    #[test]
    fn test_position_and_portfolio_pct() {
        let mut account = AccountState::with_cash(50_000.0);
        let p = params(10_000.0, 1.0);
        assert_eq!(position_pct(&p, &account), dec!(20));
        // 2 * 100 shares
        assert_eq!(trade_risk(&p), dec!(200));
        assert_eq!(portfolio_risk_pct(&p, &account), dec!(0.4));

        account.positions.push(OpenPosition {
            symbol: "MSFT".into(),
            side: PositionSide::Long,
            quantity: 10.0,
            entry_price: 400.0,
            stop_loss: None,
        });
        // 4000 unstopped + 200
        assert_eq!(portfolio_risk_pct(&p, &account), dec!(8.4));
    }

    #[test]
    fn test_empty_account_has_no_percentages() {
        let account = AccountState::default();
        assert_eq!(position_pct(&params(1_000.0, 1.0), &account), Decimal::ZERO);
        assert_eq!(to_f64(available_margin(&account)), 0.0);
    }
}
