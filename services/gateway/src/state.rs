use crate::config::AppConfig;
use crate::rate_limit::RateLimiter;
use ledger::TradingLedger;
use persistence::{MarketLocks, Repository};
use simulation::{MarketAdmin, SimulationClock};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub locks: Arc<MarketLocks>,
    pub clock: Arc<SimulationClock>,
    pub ledger: Arc<TradingLedger>,
    pub admin: Arc<MarketAdmin>,
    pub rate_limiter: Arc<RateLimiter>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// Wire every component onto one repository and one lock table.
    ///
    /// The top-level session applies to both clock and ledger, and a
    /// catch-up never writes more bars than the repository retains.
    pub fn new(repo: Arc<dyn Repository>, config: &AppConfig) -> Self {
        let locks = Arc::new(MarketLocks::new(config.locks.clone()));

        let mut simulation = config.simulation.clone();
        simulation.session = config.session.clone();
        let retention = u64::try_from(config.repository.kline_retention).unwrap_or(u64::MAX);
        simulation.clock.max_backfill_ticks = simulation.clock.max_backfill_ticks.min(retention.max(1));
        let clock = Arc::new(SimulationClock::new(repo.clone(), locks.clone(), simulation));

        let mut ledger = config.ledger.clone();
        ledger.session = config.session.clone();
        let ledger = Arc::new(TradingLedger::new(repo.clone(), locks.clone(), ledger));
        let admin = Arc::new(MarketAdmin::new(repo.clone(), locks.clone(), clock.clone()));

        Self {
            repo,
            locks,
            clock,
            ledger,
            admin,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            admin_token: config.admin_token.as_deref().map(Arc::from),
        }
    }
}
