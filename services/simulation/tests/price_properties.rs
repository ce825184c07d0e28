//! Price model properties
//!
//! - Prices stay strictly positive and inside the per-tick cap for any
//!   stock, regime and event load.
//! - A price inside its window band stays inside it.
//! - A price far from its fundamental value is pulled back toward it.
//! - Under a fixed seed, regime drift alone makes a bear / high-volatility
//!   market trend lower than a bull / low-volatility one.

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use simulation::price_model::{relative_move, MarketConditions, PriceBand, PriceModel, PriceModelConfig};
use types::cycle::{MacroRegime, VolatilityRegime};
use types::event::{EventKind, EventScope, MarketEvent};
use types::ids::StockId;
use types::stock::Stock;

fn stock(price: Decimal, vol: Decimal) -> Stock {
    Stock::new(StockId::new("ZY"), "Zhiyun", price, vol, "tech", 0).unwrap()
}

fn regime() -> impl Strategy<Value = MacroRegime> {
    prop_oneof![
        Just(MacroRegime::Bull),
        Just(MacroRegime::Bear),
        Just(MacroRegime::Sideways)
    ]
}

fn volatility() -> impl Strategy<Value = VolatilityRegime> {
    prop_oneof![Just(VolatilityRegime::High), Just(VolatilityRegime::Low)]
}

proptest! {
    #[test]
    fn price_stays_positive_and_capped(
        cents in 1i64..1_000_000,
        vol_milli in 0i64..999,
        macro_regime in regime(),
        volatility_regime in volatility(),
        magnitudes in prop::collection::vec(-0.5f64..0.5, 0..4),
        seed in any::<u64>(),
        steps in 1usize..40,
    ) {
        let model = PriceModel::default();
        let cap = model.config().max_move_pct;
        let events: Vec<MarketEvent> = magnitudes
            .into_iter()
            .map(|m| MarketEvent::new(EventScope::Sector("tech".into()), EventKind::Manual, m, 50, 0))
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut s = stock(Decimal::new(cents, 2), Decimal::new(vol_milli, 3));

        for tick in 0..steps as u64 {
            let conditions = MarketConditions { macro_regime, volatility_regime, events: &events, tick };
            let step = model.next_step(&s, &conditions, &PriceBand::default(), &mut rng);

            prop_assert!(step.close > Decimal::ZERO);
            prop_assert!(step.low > Decimal::ZERO);
            prop_assert!(step.low <= step.open.min(step.close));
            prop_assert!(step.high >= step.open.max(step.close));
            prop_assert!(relative_move(s.current_price, step.close) <= cap);
            prop_assert!(step.close.scale() <= 2);
            prop_assert!(step.fundamental_value > Decimal::ZERO);

            step.apply_to(&mut s);
        }
    }

    #[test]
    fn price_inside_window_band_stays_inside(
        seed in any::<u64>(),
        magnitudes in prop::collection::vec(-0.2f64..0.2, 0..3),
        steps in 1usize..80,
    ) {
        let model = PriceModel::new(PriceModelConfig {
            window_limit_ticks: 4,
            window_limit_pct: Decimal::new(5, 2),
            ..Default::default()
        });
        let events: Vec<MarketEvent> = magnitudes
            .into_iter()
            .map(|m| MarketEvent::new(EventScope::Stock(StockId::new("ZY")), EventKind::Manual, m, 100, 0))
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut s = stock(Decimal::from(100), Decimal::new(8, 2));
        let mut closes = vec![s.current_price];

        for tick in 0..steps as u64 {
            let band = model.band_from_closes(&closes);
            let conditions = MarketConditions {
                macro_regime: MacroRegime::Sideways,
                volatility_regime: VolatilityRegime::High,
                events: &events,
                tick,
            };
            let step = model.next_step(&s, &conditions, &band, &mut rng);

            let reference = band.window_ref.unwrap_or(s.current_price);
            let lower = reference * Decimal::new(95, 2);
            let upper = reference * Decimal::new(105, 2);
            if s.current_price >= lower && s.current_price <= upper {
                prop_assert!(step.close >= lower && step.close <= upper,
                    "close {} outside [{}, {}]", step.close, lower, upper);
            }

            step.apply_to(&mut s);
            closes.push(step.close);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn price_reverts_toward_fundamental_value(seed in any::<u64>(), overvalued in any::<bool>()) {
        let model = PriceModel::default();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut s = stock(Decimal::from(100), Decimal::new(1, 2));
        s.current_price = if overvalued { Decimal::from(300) } else { Decimal::from(20) };

        for tick in 0..1500u64 {
            let conditions = MarketConditions {
                macro_regime: MacroRegime::Sideways,
                volatility_regime: VolatilityRegime::Low,
                events: &[],
                tick,
            };
            let step = model.next_step(&s, &conditions, &PriceBand::default(), &mut rng);
            step.apply_to(&mut s);
        }

        let ratio = s.current_price / s.fundamental_value;
        if overvalued {
            prop_assert!(ratio < Decimal::new(19, 1), "still at {ratio}× fundamental value");
        } else {
            prop_assert!(ratio > Decimal::new(55, 2), "still at {ratio}× fundamental value");
        }
    }
}

fn run(macro_regime: MacroRegime, volatility_regime: VolatilityRegime, steps: usize) -> (f64, Decimal) {
    let model = PriceModel::new(PriceModelConfig {
        fundamental_reversion: 0.0,
        wave_start_probability: 0.0,
        ..Default::default()
    });
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut s = stock(Decimal::from(100), Decimal::new(2, 2));
    let mut total = 0.0;
    for tick in 0..steps as u64 {
        let conditions = MarketConditions {
            macro_regime,
            volatility_regime,
            events: &[],
            tick,
        };
        let step = model.next_step(&s, &conditions, &PriceBand::default(), &mut rng);
        total += step.raw_return;
        step.apply_to(&mut s);
    }
    (total / steps as f64, s.current_price)
}

#[test]
fn bear_high_vol_trends_below_bull_low_vol() {
    let (bull_mean, bull_final) = run(MacroRegime::Bull, VolatilityRegime::Low, 5000);
    let (bear_mean, bear_final) = run(MacroRegime::Bear, VolatilityRegime::High, 5000);

    assert!(bull_mean > 0.0, "bull mean return {bull_mean}");
    assert!(bear_mean < bull_mean, "bear {bear_mean} vs bull {bull_mean}");
    assert!(bear_final < bull_final, "bear {bear_final} vs bull {bull_final}");
}

#[test]
fn same_seed_same_path() {
    assert_eq!(
        run(MacroRegime::Sideways, VolatilityRegime::High, 300),
        run(MacroRegime::Sideways, VolatilityRegime::High, 300)
    );
}
