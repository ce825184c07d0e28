//! Default listings seeded into an empty market

use rust_decimal::Decimal;
use types::errors::ValidationError;
use types::ids::StockId;
use types::stock::Stock;

/// (ticker, name, price, base volatility in thousandths, sector)
const DEFAULT_LISTINGS: &[(&str, &str, i64, i64, &str)] = &[
    ("ZY", "智云科技", 57, 22, "科技"),
    ("HL", "华联医药", 49, 25, "医药"),
    ("DF", "东方能源", 44, 14, "新能源"),
    ("JM", "金马物流", 54, 20, "运输"),
    ("RL", "荣立地产", 45, 30, "房地产"),
    ("TX", "天讯软件", 26, 45, "软件"),
];

/// The six stocks a fresh market opens with.
pub fn default_listings(created_at: i64) -> Result<Vec<Stock>, ValidationError> {
    DEFAULT_LISTINGS
        .iter()
        .map(|&(ticker, name, price, vol, sector)| {
            Stock::new(
                StockId::new(ticker),
                name,
                Decimal::from(price),
                Decimal::new(vol, 3),
                sector,
                created_at,
            )
        })
        .collect()
}
