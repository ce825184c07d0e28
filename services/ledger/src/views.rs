//! Read models returned by the trading surface

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::holding::Holding;
use types::ids::{StockId, UserId};
use types::numeric::round_price;
use types::stock::Stock;

/// One holding valued at the current price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingView {
    pub stock_id: StockId,
    pub name: String,
    pub quantity: u64,
    pub unlocked_quantity: u64,
    pub next_unlock_tick: Option<u64>,
    pub avg_cost: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
    /// Percent, 2 dp; zero when the cost basis is zero
    pub pnl_pct: Decimal,
    pub listed: bool,
}

impl HoldingView {
    pub fn new(holding: &Holding, stock: &Stock, tick: u64) -> Self {
        let market_value = stock.current_price * Decimal::from(holding.quantity);
        let cost_basis = round_price(holding.cost_basis());
        let unrealized_pnl = market_value - cost_basis;
        Self {
            stock_id: holding.stock_id.clone(),
            name: stock.name.clone(),
            quantity: holding.quantity,
            unlocked_quantity: holding.unlocked_at(tick),
            next_unlock_tick: holding.next_unlock_tick(tick),
            avg_cost: holding.avg_cost,
            current_price: stock.current_price,
            market_value,
            cost_basis,
            unrealized_pnl,
            pnl_pct: percent(unrealized_pnl, cost_basis),
            listed: stock.listed,
        }
    }
}

/// One user's position in a stock, as seen from the stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareholderView {
    pub user_id: UserId,
    #[serde(flatten)]
    pub position: HoldingView,
    /// Percent of all held shares of the stock, 2 dp
    pub share_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioView {
    pub user_id: UserId,
    pub tick: u64,
    pub cash_balance: Decimal,
    pub holdings: Vec<HoldingView>,
    pub market_value: Decimal,
    pub total_assets: Decimal,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub stock_id: StockId,
    pub name: String,
    pub sector: String,
    pub price: Decimal,
    /// Close of the bar before the latest one
    pub prev_close: Decimal,
    pub change: Decimal,
    pub change_pct: Decimal,
    /// Open / high / low / volume over the quote window
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: u64,
    pub sma: Option<Decimal>,
    pub listed: bool,
    pub last_tick: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub user_id: UserId,
    pub cash_balance: Decimal,
    pub market_value: Decimal,
    pub total_assets: Decimal,
}

/// `part / whole` in percent at 2 dp.
pub fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    round_price(part / whole * Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holding_view_pnl() {
        let stock = Stock::new(StockId::new("ZY"), "Zhiyun", Decimal::from(60), Decimal::new(2, 2), "tech", 0).unwrap();
        let mut holding = Holding::new(UserId::new("alice"), StockId::new("ZY"));
        holding.add_lot(10, Decimal::from(50), 0, 20);

        let view = HoldingView::new(&holding, &stock, 5);
        assert_eq!(view.market_value, Decimal::from(600));
        assert_eq!(view.unrealized_pnl, Decimal::from(100));
        assert_eq!(view.pnl_pct, Decimal::from(20));
        assert_eq!(view.unlocked_quantity, 0);
        assert_eq!(view.next_unlock_tick, Some(20));
    }

    #[test]
    fn test_percent_of_zero() {
        assert_eq!(percent(Decimal::ONE, Decimal::ZERO), Decimal::ZERO);
    }
}
