//! Trading ledger
//!
//! Buys and sells clear instantly against the latest persisted price.
//! A trade holds its user lock and then its stock lock for the whole
//! read-validate-commit sequence, so it never trades against a price a
//! concurrent tick is rewriting and never loses an update to cash or
//! shares. Every check runs before anything is written; the write itself
//! is one `commit_trade`.
//!
//! Validation order:
//! 1. quantity > 0
//! 2. market is open
//! 3. stock exists and is listed
//! 4. user is registered
//! 5. sell: enough shares held, then enough of them unlocked
//! 6. buy: cash covers `notional + fee`

use crate::config::LedgerConfig;
use crate::pricing::{max_affordable, quote_buy, quote_sell, TradeQuote};
use crate::views::{HoldingView, PortfolioView, Quote, RankingEntry, ShareholderView, percent};
use persistence::{MarketLocks, Repository, TradeCommit};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::account::User;
use types::errors::{MarketError, ValidationError};
use types::holding::Holding;
use types::ids::{StockId, UserId};
use types::kline::{aggregate, sma, KlineBar};
use types::stock::Stock;
use types::time::now_nanos;
use types::trade::{Side, Transaction};

/// Per-stock outcome of a portfolio liquidation.
pub type LiquidationResult = Vec<(StockId, Result<Transaction, MarketError>)>;

pub struct TradingLedger {
    repo: Arc<dyn Repository>,
    locks: Arc<MarketLocks>,
    config: LedgerConfig,
}

impl TradingLedger {
    pub fn new(repo: Arc<dyn Repository>, locks: Arc<MarketLocks>, config: LedgerConfig) -> Self {
        Self { repo, locks, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ── Accounts ────────────────────────────────────────────────────

    /// Open an account with the configured starting cash.
    pub async fn register_user(&self, user_id: &UserId) -> Result<User, MarketError> {
        let _guard = self.locks.lock_user(user_id).await?;
        let user = User::new(user_id.clone(), self.config.initial_cash, now_nanos());
        let inserted = self
            .locks
            .storage("insert_user", self.repo.insert_user(user.clone()))
            .await?;
        if !inserted {
            return Err(ValidationError::DuplicateUser {
                user_id: user_id.to_string(),
            }
            .into());
        }
        info!(user_id = %user_id, cash = %user.cash_balance, "user registered");
        Ok(user)
    }

    // ── Trades ──────────────────────────────────────────────────────

    pub async fn buy(
        &self,
        user_id: &UserId,
        stock_id: &StockId,
        quantity: u64,
    ) -> Result<Transaction, MarketError> {
        check_quantity(quantity)?;
        self.check_open()?;
        let _guard = self.locks.lock_trade(user_id, stock_id).await?;

        let stock = self.load_listed_stock(stock_id).await?;
        let user = self.load_user(user_id).await?;
        let quote = quote_buy(&self.config, stock.current_price, quantity)?;
        self.execute_buy(user, &stock, quote).await
    }

    /// Buy as many shares as the user's cash allows.
    pub async fn buy_all_in(&self, user_id: &UserId, stock_id: &StockId) -> Result<Transaction, MarketError> {
        self.check_open()?;
        let _guard = self.locks.lock_trade(user_id, stock_id).await?;

        let stock = self.load_listed_stock(stock_id).await?;
        let user = self.load_user(user_id).await?;
        let quantity = max_affordable(&self.config, stock.current_price, user.cash_balance);
        if quantity == 0 {
            let one = quote_buy(&self.config, stock.current_price, 1)?;
            return Err(insufficient_funds(one.cash_amount, user.cash_balance));
        }
        let quote = quote_buy(&self.config, stock.current_price, quantity)?;
        self.execute_buy(user, &stock, quote).await
    }

    pub async fn sell(
        &self,
        user_id: &UserId,
        stock_id: &StockId,
        quantity: u64,
    ) -> Result<Transaction, MarketError> {
        check_quantity(quantity)?;
        self.check_open()?;
        let _guard = self.locks.lock_trade(user_id, stock_id).await?;

        let stock = self.load_listed_stock(stock_id).await?;
        let user = self.load_user(user_id).await?;
        let tick = self.current_tick().await?;
        let holding = self.load_holding(user_id, stock_id).await?;
        holding.check_sellable(quantity, tick)?;
        self.execute_sell(user, holding, &stock, quantity, tick).await
    }

    /// Sell every unlocked share of one stock.
    pub async fn sell_all(&self, user_id: &UserId, stock_id: &StockId) -> Result<Transaction, MarketError> {
        self.check_open()?;
        let _guard = self.locks.lock_trade(user_id, stock_id).await?;

        let stock = self.load_listed_stock(stock_id).await?;
        let user = self.load_user(user_id).await?;
        let tick = self.current_tick().await?;
        let holding = self.load_holding(user_id, stock_id).await?;
        let quantity = holding.unlocked_at(tick);
        if quantity == 0 {
            // Reports InsufficientShares for an empty holding, LockedShares otherwise.
            holding.check_sellable(holding.quantity.max(1), tick)?;
        }
        self.execute_sell(user, holding, &stock, quantity, tick).await
    }

    /// Sell every unlocked share of every listed holding. One stock
    /// failing does not stop the rest.
    pub async fn liquidate_portfolio(&self, user_id: &UserId) -> Result<LiquidationResult, MarketError> {
        self.check_open()?;
        self.load_user(user_id).await?;
        let holdings = self
            .locks
            .storage("list_holdings", self.repo.list_holdings(user_id))
            .await?;

        let mut results = Vec::with_capacity(holdings.len());
        for holding in holdings {
            let outcome = self.sell_all(user_id, &holding.stock_id).await;
            if let Err(e) = &outcome {
                debug!(user_id = %user_id, stock_id = %holding.stock_id, error = %e, "liquidation skipped stock");
            }
            results.push((holding.stock_id, outcome));
        }
        Ok(results)
    }

    async fn execute_buy(&self, mut user: User, stock: &Stock, quote: TradeQuote) -> Result<Transaction, MarketError> {
        if !user.can_afford(quote.cash_amount) {
            return Err(insufficient_funds(quote.cash_amount, user.cash_balance));
        }

        let tick = self.current_tick().await?;
        let mut holding = self.load_holding(&user.id, &stock.id).await?;
        holding.add_lot(
            quote.quantity,
            quote.effective_price,
            tick,
            self.config.lock_duration_ticks,
        );

        let now = now_nanos();
        user.debit(quote.cash_amount, now);
        let tx = transaction(&user.id, &stock.id, &quote, tick, now);
        self.commit(user, holding, tx).await
    }

    async fn execute_sell(
        &self,
        mut user: User,
        mut holding: Holding,
        stock: &Stock,
        quantity: u64,
        tick: u64,
    ) -> Result<Transaction, MarketError> {
        let quote = quote_sell(&self.config, stock.current_price, quantity)?;
        holding.reduce(quantity, tick)?;

        let now = now_nanos();
        user.credit(quote.cash_amount, now);
        let tx = transaction(&user.id, &stock.id, &quote, tick, now);
        self.commit(user, holding, tx).await
    }

    async fn commit(&self, user: User, holding: Holding, tx: Transaction) -> Result<Transaction, MarketError> {
        let commit = TradeCommit {
            user,
            holding,
            transaction: tx.clone(),
        };
        if let Err(e) = self.locks.storage("commit_trade", self.repo.commit_trade(commit)).await {
            warn!(user_id = %tx.user_id, stock_id = %tx.stock_id, side = %tx.side, error = %e, "trade commit failed");
            return Err(e);
        }
        info!(
            user_id = %tx.user_id,
            stock_id = %tx.stock_id,
            side = %tx.side,
            quantity = tx.quantity,
            price = %tx.price,
            fee = %tx.fee,
            cash = %tx.cash_amount,
            tick = tx.tick,
            "trade executed"
        );
        Ok(tx)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Cash plus every holding valued at the current price.
    pub async fn get_holdings(&self, user_id: &UserId) -> Result<PortfolioView, MarketError> {
        let user = self.load_user(user_id).await?;
        let tick = self.current_tick().await?;
        let holdings = self
            .locks
            .storage("list_holdings", self.repo.list_holdings(user_id))
            .await?;

        let mut views = Vec::with_capacity(holdings.len());
        for holding in &holdings {
            let Some(stock) = self
                .locks
                .storage("get_stock", self.repo.get_stock(&holding.stock_id))
                .await?
            else {
                continue;
            };
            views.push(HoldingView::new(holding, &stock, tick));
        }

        let market_value: Decimal = views.iter().map(|v| v.market_value).sum();
        let unrealized_pnl: Decimal = views.iter().map(|v| v.unrealized_pnl).sum();
        Ok(PortfolioView {
            user_id: user.id,
            tick,
            cash_balance: user.cash_balance,
            holdings: views,
            market_value,
            total_assets: user.cash_balance + market_value,
            unrealized_pnl,
        })
    }

    /// Everyone holding `stock_id`, largest position first.
    pub async fn list_shareholders(&self, stock_id: &StockId) -> Result<Vec<ShareholderView>, MarketError> {
        let stock = self.load_stock(stock_id).await?;
        let tick = self.current_tick().await?;
        let holders = self
            .locks
            .storage("list_holders", self.repo.list_holders(stock_id))
            .await?;

        let total: u64 = holders.iter().map(|h| h.quantity).sum();
        let mut views: Vec<ShareholderView> = holders
            .iter()
            .filter(|h| h.quantity > 0)
            .map(|h| ShareholderView {
                user_id: h.user_id.clone(),
                position: HoldingView::new(h, &stock, tick),
                share_pct: percent(Decimal::from(h.quantity), Decimal::from(total)),
            })
            .collect();
        views.sort_by(|a, b| {
            b.position
                .quantity
                .cmp(&a.position.quantity)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(views)
    }

    pub async fn get_quote(&self, stock_id: &StockId) -> Result<Quote, MarketError> {
        let stock = self.load_stock(stock_id).await?;
        let bars = self
            .locks
            .storage(
                "get_kline_history",
                self.repo.get_kline_history(stock_id, self.config.quote_window_ticks.max(1)),
            )
            .await?;

        let price = stock.current_price;
        let prev_close = match bars.len() {
            0 => price,
            1 => bars[0].open,
            n => bars[n - 2].close,
        };
        let change = price - prev_close;
        let open = bars.first().map(|b| b.open).unwrap_or(price);
        let high = bars.iter().map(|b| b.high).fold(price, Decimal::max);
        let low = bars.iter().map(|b| b.low).fold(price, Decimal::min);

        Ok(Quote {
            stock_id: stock.id,
            name: stock.name,
            sector: stock.sector,
            price,
            prev_close,
            change,
            change_pct: percent(change, prev_close),
            open,
            high,
            low,
            volume: bars.iter().map(|b| b.volume).sum(),
            sma: sma(&bars, self.config.sma_period),
            listed: stock.listed,
            last_tick: stock.last_tick,
        })
    }

    /// Quotes for every listed stock, ordered by id.
    pub async fn list_quotes(&self) -> Result<Vec<Quote>, MarketError> {
        let stocks = self.locks.storage("list_stocks", self.repo.list_stocks()).await?;
        let mut quotes = Vec::with_capacity(stocks.len());
        for stock in stocks.iter().filter(|s| s.listed) {
            quotes.push(self.get_quote(&stock.id).await?);
        }
        quotes.sort_by(|a, b| a.stock_id.cmp(&b.stock_id));
        Ok(quotes)
    }

    /// The last `limit` bars of `period` ticks each, oldest first.
    pub async fn get_kline(
        &self,
        stock_id: &StockId,
        period: u64,
        limit: Option<usize>,
    ) -> Result<Vec<KlineBar>, MarketError> {
        if period == 0 {
            return Err(ValidationError::InvalidPeriod("period must be positive".into()).into());
        }
        self.load_stock(stock_id).await?;

        let limit = limit
            .unwrap_or(self.config.default_kline_limit)
            .clamp(1, self.config.max_kline_limit.max(1));
        let period_len = usize::try_from(period).unwrap_or(usize::MAX);
        let window = period_len.saturating_mul(limit + 1);
        let bars = self
            .locks
            .storage("get_kline_history", self.repo.get_kline_history(stock_id, window))
            .await?;

        let mut candles = aggregate(&bars, period);
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.split_off(skip))
    }

    pub async fn total_assets(&self, user_id: &UserId) -> Result<Decimal, MarketError> {
        Ok(self.get_holdings(user_id).await?.total_assets)
    }

    /// Users ordered by total assets, richest first.
    pub async fn asset_ranking(&self, limit: Option<usize>) -> Result<Vec<RankingEntry>, MarketError> {
        let limit = limit.unwrap_or(self.config.ranking_limit);
        let users = self.locks.storage("list_users", self.repo.list_users()).await?;
        let prices: std::collections::HashMap<StockId, Decimal> = self
            .locks
            .storage("list_stocks", self.repo.list_stocks())
            .await?
            .into_iter()
            .map(|s| (s.id, s.current_price))
            .collect();

        let mut entries = Vec::with_capacity(users.len());
        for user in users {
            let holdings = self
                .locks
                .storage("list_holdings", self.repo.list_holdings(&user.id))
                .await?;
            let market_value: Decimal = holdings
                .iter()
                .filter_map(|h| prices.get(&h.stock_id).map(|p| *p * Decimal::from(h.quantity)))
                .sum();
            entries.push(RankingEntry {
                rank: 0,
                total_assets: user.cash_balance + market_value,
                cash_balance: user.cash_balance,
                market_value,
                user_id: user.id,
            });
        }

        entries.sort_by(|a, b| {
            b.total_assets
                .cmp(&a.total_assets)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries.truncate(limit);
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        Ok(entries)
    }

    /// A user's transactions, most recent first.
    pub async fn transaction_history(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, MarketError> {
        self.load_user(user_id).await?;
        let limit = limit.unwrap_or(self.config.history_limit);
        self.locks
            .storage("list_transactions", self.repo.list_transactions(user_id, limit))
            .await
    }

    // ── Loading ─────────────────────────────────────────────────────

    fn check_open(&self) -> Result<(), MarketError> {
        let session = &self.config.session;
        if session.is_open_now() {
            return Ok(());
        }
        Err(MarketError::MarketClosed {
            open: session.open.to_string(),
            close: session.close.to_string(),
        })
    }

    async fn load_stock(&self, id: &StockId) -> Result<Stock, MarketError> {
        self.locks
            .storage("get_stock", self.repo.get_stock(id))
            .await?
            .ok_or_else(|| {
                ValidationError::UnknownStock {
                    stock_id: id.to_string(),
                }
                .into()
            })
    }

    async fn load_listed_stock(&self, id: &StockId) -> Result<Stock, MarketError> {
        let stock = self.load_stock(id).await?;
        if !stock.listed {
            return Err(ValidationError::StockDelisted {
                stock_id: id.to_string(),
            }
            .into());
        }
        Ok(stock)
    }

    async fn load_user(&self, id: &UserId) -> Result<User, MarketError> {
        self.locks
            .storage("get_user", self.repo.get_user(id))
            .await?
            .ok_or_else(|| {
                ValidationError::UnknownUser {
                    user_id: id.to_string(),
                }
                .into()
            })
    }

    async fn load_holding(&self, user_id: &UserId, stock_id: &StockId) -> Result<Holding, MarketError> {
        let holding = self
            .locks
            .storage("get_holding", self.repo.get_holding(user_id, stock_id))
            .await?;
        Ok(holding.unwrap_or_else(|| Holding::new(user_id.clone(), stock_id.clone())))
    }

    /// Index of the last completed tick; trades happen "during" it.
    async fn current_tick(&self) -> Result<u64, MarketError> {
        let cycle = self
            .locks
            .storage("get_market_cycle", self.repo.get_market_cycle())
            .await?;
        Ok(cycle.map(|c| c.tick_index).unwrap_or(0))
    }
}

fn check_quantity(quantity: u64) -> Result<(), MarketError> {
    if quantity == 0 {
        return Err(ValidationError::InvalidQuantity("quantity must be positive".into()).into());
    }
    Ok(())
}

fn insufficient_funds(required: Decimal, available: Decimal) -> MarketError {
    MarketError::InsufficientFunds {
        required: required.to_string(),
        available: available.to_string(),
    }
}

fn transaction(user_id: &UserId, stock_id: &StockId, quote: &TradeQuote, tick: u64, timestamp: i64) -> Transaction {
    Transaction::new(
        user_id.clone(),
        stock_id.clone(),
        quote.side,
        quote.quantity,
        quote.mid_price,
        quote.effective_price,
        quote.slippage,
        quote.fee,
        quote.cash_amount,
        tick,
        timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::MemoryRepository;
    use types::cycle::MarketCycleState;
    use types::session::TradingSession;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    async fn setup() -> (Arc<MemoryRepository>, TradingLedger) {
        let repo = Arc::new(MemoryRepository::new());
        let stock = Stock::new(StockId::new("ZY"), "Zhiyun", d("57.00"), d("0.022"), "tech", 0).unwrap();
        repo.insert_stock(stock).await.unwrap();
        let ledger = TradingLedger::new(repo.clone(), Arc::new(MarketLocks::default()), LedgerConfig::default());
        ledger.register_user(&UserId::new("alice")).await.unwrap();
        (repo, ledger)
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let (_repo, ledger) = setup().await;
        let err = ledger.register_user(&UserId::new("alice")).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_validation_order() {
        let (repo, ledger) = setup().await;
        let alice = UserId::new("alice");

        // Quantity is checked before the stock.
        let err = ledger.buy(&alice, &StockId::new("NOPE"), 0).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // Stock before user.
        let err = ledger.buy(&UserId::new("ghost"), &StockId::new("NOPE"), 1).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STOCK");
        let err = ledger.buy(&UserId::new("ghost"), &StockId::new("ZY"), 1).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_USER");

        // Delisted stocks do not trade.
        let mut zy = repo.get_stock(&StockId::new("ZY")).await.unwrap().unwrap();
        zy.listed = false;
        repo.put_stock(zy).await.unwrap();
        let err = ledger.sell(&alice, &StockId::new("ZY"), 1).await.unwrap_err();
        assert_eq!(err.code(), "STOCK_DELISTED");
    }

    #[tokio::test]
    async fn test_oversized_order_is_rejected() {
        let (repo, ledger) = setup().await;
        let mut zy = repo.get_stock(&StockId::new("ZY")).await.unwrap().unwrap();
        zy.current_price = d("1000000000.00");
        repo.put_stock(zy).await.unwrap();

        let err = ledger.buy(&UserId::new("alice"), &StockId::new("ZY"), u64::MAX).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        let err = ledger.sell(&UserId::new("alice"), &StockId::new("ZY"), u64::MAX).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_SHARES");
    }

    #[tokio::test]
    async fn test_sell_without_shares() {
        let (_repo, ledger) = setup().await;
        let err = ledger.sell(&UserId::new("alice"), &StockId::new("ZY"), 5).await.unwrap_err();
        assert_eq!(err, MarketError::InsufficientShares { requested: 5, held: 0 });
    }

    #[tokio::test]
    async fn test_buy_all_in_spends_within_cash() {
        let (repo, ledger) = setup().await;
        let alice = UserId::new("alice");
        let tx = ledger.buy_all_in(&alice, &StockId::new("ZY")).await.unwrap();
        assert!(tx.quantity > 0);

        let user = repo.get_user(&alice).await.unwrap().unwrap();
        assert!(user.cash_balance >= Decimal::ZERO);
        assert_eq!(user.cash_balance, d("10000.00") - tx.cash_amount);

        let err = ledger.buy_all_in(&alice, &StockId::new("ZY")).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    }

    #[tokio::test]
    async fn test_sell_all_respects_locks() {
        let (repo, ledger) = setup().await;
        let alice = UserId::new("alice");
        let zy = StockId::new("ZY");
        ledger.buy(&alice, &zy, 10).await.unwrap();

        let err = ledger.sell_all(&alice, &zy).await.unwrap_err();
        assert!(matches!(err, MarketError::LockedShares { unlocked: 0, next_unlock_tick: Some(12), .. }));

        repo.put_market_cycle(MarketCycleState {
            tick_index: 12,
            ..Default::default()
        })
        .await
        .unwrap();
        let tx = ledger.sell_all(&alice, &zy).await.unwrap();
        assert_eq!(tx.quantity, 10);
        assert!(repo.get_holding(&alice, &zy).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quote_without_bars() {
        let (_repo, ledger) = setup().await;
        let quote = ledger.get_quote(&StockId::new("ZY")).await.unwrap();
        assert_eq!(quote.price, d("57.00"));
        assert_eq!(quote.change, Decimal::ZERO);
        assert_eq!(quote.sma, None);
    }

    #[tokio::test]
    async fn test_list_quotes_skips_delisted() {
        let (repo, ledger) = setup().await;
        let hl = Stock::new(StockId::new("HL"), "Hualian", d("49.00"), d("0.025"), "pharma", 0).unwrap();
        let mut rl = Stock::new(StockId::new("RL"), "Rongli", d("45.00"), d("0.030"), "property", 0).unwrap();
        rl.listed = false;
        repo.insert_stock(hl).await.unwrap();
        repo.insert_stock(rl).await.unwrap();

        let ids: Vec<String> = ledger
            .list_quotes()
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.stock_id.to_string())
            .collect();
        assert_eq!(ids, vec!["HL", "ZY"]);
    }

    #[tokio::test]
    async fn test_kline_rejects_zero_period() {
        let (_repo, ledger) = setup().await;
        let err = ledger.get_kline(&StockId::new("ZY"), 0, None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_shareholders_largest_first_with_pnl() {
        let (repo, ledger) = setup().await;
        let zy = StockId::new("ZY");
        let bob = UserId::new("bob");
        ledger.register_user(&bob).await.unwrap();
        ledger.buy(&UserId::new("alice"), &zy, 10).await.unwrap();
        ledger.buy(&bob, &zy, 30).await.unwrap();

        let mut stock = repo.get_stock(&zy).await.unwrap().unwrap();
        stock.current_price = d("60.00");
        repo.put_stock(stock).await.unwrap();

        let holders = ledger.list_shareholders(&zy).await.unwrap();
        assert_eq!(holders.len(), 2);
        assert_eq!(holders[0].user_id, bob);
        assert_eq!(holders[0].position.quantity, 30);
        assert_eq!(holders[0].share_pct, d("75.00"));
        assert_eq!(holders[1].share_pct, d("25.00"));
        assert_eq!(holders[1].position.market_value, d("600.00"));
        assert_eq!(
            holders[1].position.unrealized_pnl,
            holders[1].position.market_value - holders[1].position.cost_basis
        );
        assert!(holders[1].position.unrealized_pnl > Decimal::ZERO);

        let err = ledger.list_shareholders(&StockId::new("NOPE")).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STOCK");
    }

    #[tokio::test]
    async fn test_trades_refused_outside_session() {
        let repo = Arc::new(MemoryRepository::new());
        let stock = Stock::new(StockId::new("ZY"), "Zhiyun", d("57.00"), d("0.022"), "tech", 0).unwrap();
        repo.insert_stock(stock).await.unwrap();

        // A window that opens an hour from now.
        let now = chrono::Utc::now().time();
        let config = LedgerConfig {
            session: TradingSession {
                enabled: true,
                open: now + chrono::Duration::hours(1),
                close: now + chrono::Duration::hours(2),
                utc_offset_minutes: 0,
            },
            ..Default::default()
        };
        let ledger = TradingLedger::new(repo.clone(), Arc::new(MarketLocks::default()), config);
        let alice = UserId::new("alice");
        ledger.register_user(&alice).await.unwrap();

        let err = ledger.buy(&alice, &StockId::new("ZY"), 1).await.unwrap_err();
        assert_eq!(err.code(), "MARKET_CLOSED");
        let err = ledger.sell_all(&alice, &StockId::new("ZY")).await.unwrap_err();
        assert_eq!(err.code(), "MARKET_CLOSED");
        // Quantity is still checked first.
        let err = ledger.buy(&alice, &StockId::new("ZY"), 0).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        // Reads stay available.
        assert!(ledger.get_quote(&StockId::new("ZY")).await.is_ok());
        assert!(repo.get_user(&alice).await.unwrap().unwrap().cash_balance == d("10000.00"));
    }
}
