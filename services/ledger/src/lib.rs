//! Trading Ledger Service
//!
//! Lets users buy and sell against the simulated market with fees,
//! size-dependent slippage and T+N holding locks, and serves the read
//! side (holdings, shareholders, quotes, K-lines, rankings, history).
//! Trades are only accepted inside the configured trading session.
//!
//! The ledger never moves prices. It only writes users, holdings and
//! transactions, always through one atomic `commit_trade`.

pub mod config;
pub mod ledger;
pub mod pricing;
pub mod views;

pub use config::LedgerConfig;
pub use ledger::{LiquidationResult, TradingLedger};
pub use pricing::TradeQuote;
pub use views::{HoldingView, PortfolioView, Quote, RankingEntry, ShareholderView};
