//! Market Simulation Engine
//!
//! Generates the synthetic price series of the virtual market. Every tick
//! the clock advances the market cycle, rolls for events, and moves each
//! listed stock one step through the price model, committing the new
//! price and K-line bar through the repository.
//!
//! All randomness flows from one seedable `ChaCha8Rng`, so a fixed seed
//! replays a run exactly.
//!
//! # Modules
//! - `price_model`: Regime drift, noise, event bias, momentum waves,
//!   fundamental-value reversion, per-tick cap and rolling price bands
//! - `event_generator`: Stochastic sector and stock events
//! - `market_cycle`: Macro / volatility regime state machine
//! - `clock`: Tick driver, catch-up and failure isolation
//! - `admin`: Operator controls (force regime, listings, events)
//! - `listings`: Default stocks for an empty market
//! - `config`: Simulation tunables

pub mod admin;
pub mod clock;
pub mod config;
pub mod event_generator;
pub mod listings;
pub mod market_cycle;
pub mod price_model;

pub use admin::{MarketAdmin, NewStock};
pub use clock::{SimulationClock, TickReport};
pub use config::{ClockConfig, SimulationConfig};
pub use event_generator::{EventGenerator, EventGeneratorConfig};
pub use market_cycle::{MarketCycle, MarketCycleConfig};
pub use price_model::{MarketConditions, PriceBand, PriceModel, PriceModelConfig};

/// Crate version constant
pub const VERSION: &str = "1.0.0";
