//! 모의 브로커를 통한 포지션 생명주기 통합 테스트.
//!
//! 전략 루프를 흉내 내는 `BacktestStrategy`가 브로커 스냅샷을 라우터로 포지션에 전달합니다.

use chrono::Utc;
use position_core::{Bar, Bars, BrokerConfig, Order, OrderAction, OrderType, Price, Symbol};
use position_execution::{
    Broker, BrokerError, LongPosition, OrderRouter, PaperBroker, Position, PositionError,
    PositionId, PositionStrategy, PositionVariant, ShortPosition,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

struct BacktestStrategy {
    broker: PaperBroker,
    router: OrderRouter,
    prices: HashMap<Symbol, Price>,
}

impl BacktestStrategy {
    fn new(config: BrokerConfig) -> Self {
        Self {
            broker: PaperBroker::new(config),
            router: OrderRouter::new(),
            prices: HashMap::new(),
        }
    }

    /// 쌓인 주문 스냅샷을 소유 포지션으로 전달하고 종료된 주문을 정리한다.
    fn dispatch<V: PositionVariant>(&mut self, position: &mut Position<V>) {
        for update in self.broker.drain_updates() {
            if self.router.route(&update) == Some(position.id()) {
                position.on_order_updated(&update).unwrap();
            }
        }
        self.broker.prune_finished_orders();
    }

    fn on_bars<V: PositionVariant>(&mut self, position: &mut Position<V>, bars: &Bars) {
        for symbol in bars.symbols() {
            if let Some(bar) = bars.get_bar(symbol) {
                self.prices.insert(symbol.clone(), bar.close);
            }
        }
        self.broker.process_bars(bars).unwrap();
        self.dispatch(position);
    }
}

impl PositionStrategy for BacktestStrategy {
    fn broker(&mut self) -> &mut dyn Broker {
        &mut self.broker
    }

    fn last_price(&self, symbol: &Symbol) -> Option<Price> {
        self.prices.get(symbol).copied()
    }

    fn register_position_order(&mut self, position_id: PositionId, order: &Order) {
        self.router.register(position_id, order);
    }
}

fn symbol() -> Symbol {
    Symbol::stock("AAPL", "USD")
}

fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
    Bar::new(symbol(), Utc::now(), open, high, low, close, dec!(1000))
}

fn flat(price: Decimal) -> Bars {
    Bars::new([bar(price, price, price, price)])
}

fn strategy() -> BacktestStrategy {
    BacktestStrategy::new(BrokerConfig::default())
}

#[test]
fn test_long_round_trip_returns_ten_percent() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    strategy.dispatch(&mut position);
    assert!(position.is_open());

    strategy.on_bars(&mut position, &flat(dec!(100)));
    assert!(position.entry_filled());
    assert_eq!(position.shares(), dec!(10));
    assert_eq!(
        position.get_unrealized_net_profit(&strategy, None).unwrap(),
        dec!(0)
    );

    position.exit(&mut strategy, Some(dec!(110)), None, None).unwrap();
    strategy.dispatch(&mut position);
    strategy.on_bars(&mut position, &Bars::new([bar(dec!(105), dec!(112), dec!(104), dec!(111))]));

    assert!(position.exit_filled());
    assert!(!position.is_open());
    assert_eq!(position.shares(), dec!(0));
    assert_eq!(position.get_return(false).unwrap(), dec!(0.1));
    assert_eq!(position.get_net_profit(false).unwrap(), dec!(100));
    assert!(strategy.router.is_empty());
}

#[test]
fn test_short_round_trip_returns_ten_percent() {
    let mut strategy = strategy();
    let mut position =
        ShortPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    assert_eq!(position.entry_order().action(), OrderAction::SellShort);
    strategy.on_bars(&mut position, &flat(dec!(100)));
    assert_eq!(position.shares(), dec!(-10));
    assert!(position.is_short());

    position.exit(&mut strategy, None, None, None).unwrap();
    let exit = position.exit_order().unwrap();
    assert_eq!(exit.action(), OrderAction::BuyToCover);
    assert_eq!(exit.quantity(), dec!(10));

    strategy.on_bars(&mut position, &flat(dec!(90)));

    assert_eq!(position.shares(), dec!(0));
    assert_eq!(position.get_return(false).unwrap(), dec!(0.1));
    assert_eq!(position.get_net_profit(false).unwrap(), dec!(100));
}

#[test]
fn test_flat_round_trip_is_zero() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(7), false).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(100)));
    position.exit(&mut strategy, None, None, None).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(100)));

    assert_eq!(position.get_return(false).unwrap(), dec!(0));
    assert_eq!(position.get_net_profit(false).unwrap(), dec!(0));
}

#[test]
fn test_commissions_reduce_profit() {
    let mut strategy = BacktestStrategy::new(BrokerConfig {
        commission_rate: dec!(0.001),
        slippage_rate: Decimal::ZERO,
    });
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(100)));
    position.exit(&mut strategy, None, None, None).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(110)));

    // 수수료: 1.0 + 1.1
    assert_eq!(position.get_net_profit(true).unwrap(), dec!(97.9));
    assert_eq!(position.get_return(true).unwrap(), dec!(0.0979));
    assert_eq!(position.get_net_profit(false).unwrap(), dec!(100));
}

#[test]
fn test_exit_while_entry_pending_cancels_entry() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), Some(dec!(90)), None, dec!(10), false).unwrap();
    assert_eq!(position.entry_order().order_type(), OrderType::Limit);
    strategy.on_bars(&mut position, &flat(dec!(95)));
    assert!(position.entry_active());

    position.exit(&mut strategy, None, None, None).unwrap();
    strategy.dispatch(&mut position);

    assert!(position.entry_order().is_canceled());
    assert!(position.exit_order().is_none());
    assert_eq!(position.shares(), dec!(0));
    assert!(!position.is_open());
    assert!(position.active_orders().is_empty());
}

#[test]
fn test_partial_entry_fill_is_exited_after_cancel() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), Some(dec!(90)), None, dec!(10), false).unwrap();
    strategy
        .broker
        .fill(position.entry_order().id(), dec!(4), dec!(90))
        .unwrap();
    strategy.dispatch(&mut position);
    assert_eq!(position.shares(), dec!(4));

    // 진입 주문이 활성인 동안의 exit()은 진입 취소만 요청한다
    position.exit(&mut strategy, None, None, None).unwrap();
    assert!(position.exit_order().is_none());
    strategy.dispatch(&mut position);
    assert!(position.entry_order().is_canceled());
    assert_eq!(position.shares(), dec!(4));

    position.exit(&mut strategy, None, None, None).unwrap();
    assert_eq!(position.exit_order().unwrap().quantity(), dec!(4));
    strategy.on_bars(&mut position, &flat(dec!(95)));

    assert!(position.exit_filled());
    assert_eq!(position.shares(), dec!(0));
    assert_eq!(position.fills().len(), 2);
}

#[test]
fn test_exit_before_fill_is_delivered_waits_for_update() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    strategy.broker.process_bars(&flat(dec!(100))).unwrap();

    // 브로커는 진입을 체결했지만 포지션은 아직 접수 상태만 알고 있다
    assert!(position.entry_active());
    position.exit(&mut strategy, None, None, None).unwrap();
    assert!(position.exit_order().is_none());

    strategy.dispatch(&mut position);
    assert!(position.entry_filled());
    position.exit(&mut strategy, None, None, None).unwrap();
    assert_eq!(position.exit_order().unwrap().quantity(), dec!(10));

    strategy.on_bars(&mut position, &flat(dec!(105)));
    assert_eq!(position.get_net_profit(false).unwrap(), dec!(50));
    assert!(strategy.broker.active_orders().is_empty());
    assert!(strategy
        .broker
        .get_order(position.entry_order().id())
        .is_none());
}

#[test]
fn test_second_exit_fails_until_first_is_resolved() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(100)));

    position.exit(&mut strategy, Some(dec!(150)), None, None).unwrap();
    let err = position.exit(&mut strategy, None, None, None).unwrap_err();
    assert!(matches!(err, PositionError::ExitOrderActive));

    position.cancel_exit(&mut strategy).unwrap();
    strategy.dispatch(&mut position);
    assert!(!position.exit_active());

    position.exit(&mut strategy, None, None, None).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(101)));
    assert_eq!(position.get_net_profit(false).unwrap(), dec!(10));
}

#[test]
fn test_session_close_auto_exit() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    position.set_exit_on_session_close(true);
    strategy.on_bars(&mut position, &flat(dec!(100)));

    let last = Bars::new([bar(dec!(104), dec!(105), dec!(103), dec!(104)).with_bars_till_session_close(1)]);
    strategy.on_bars(&mut position, &last);
    let order = position
        .check_exit_on_session_close(&mut strategy, &last)
        .unwrap()
        .unwrap();
    assert!(order.is_on_close());
    assert!(order.good_till_canceled());
    assert_eq!(strategy.router.orders_for_position(position.id()), vec![order.id()]);
    strategy.dispatch(&mut position);

    // 세션 종료 시에도 GTC 청산 주문은 유지된다
    assert_eq!(strategy.broker.on_session_close().unwrap(), 0);

    let close = Bars::new([bar(dec!(104), dec!(106), dec!(103), dec!(105)).with_bars_till_session_close(0)]);
    strategy.on_bars(&mut position, &close);

    assert!(position.exit_filled());
    assert_eq!(position.get_net_profit(false).unwrap(), dec!(50));
}

#[test]
fn test_session_close_cancels_day_exit_order() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(100)));

    position.exit(&mut strategy, Some(dec!(150)), None, None).unwrap();
    assert!(!position.exit_order().unwrap().good_till_canceled());
    assert_eq!(strategy.broker.on_session_close().unwrap(), 1);
    strategy.dispatch(&mut position);

    assert!(position.exit_order().unwrap().is_canceled());
    assert!(position.is_open());
    assert_eq!(position.shares(), dec!(10));
    position.exit(&mut strategy, None, None, Some(true)).unwrap();
    assert!(position.exit_order().unwrap().good_till_canceled());
}

#[test]
fn test_rejected_entry_leaves_no_registration() {
    let mut strategy = strategy();
    let err = LongPosition::new(&mut strategy, symbol(), None, None, dec!(0), false).unwrap_err();

    assert!(matches!(err, PositionError::Broker(BrokerError::OrderRejected(_))));
    assert!(strategy.router.is_empty());
    assert!(strategy.broker.active_orders().is_empty());
}

#[test]
fn test_pnl_requires_proper_lifecycle_stage() {
    let mut strategy = strategy();
    let mut position =
        LongPosition::new(&mut strategy, symbol(), None, None, dec!(10), false).unwrap();
    assert!(matches!(position.get_return(true), Err(PositionError::NotOpened)));
    assert!(matches!(
        position.get_unrealized_return(&strategy, Some(dec!(100))),
        Err(PositionError::NotOpened)
    ));

    strategy.on_bars(&mut position, &flat(dec!(100)));
    assert!(matches!(position.get_net_profit(true), Err(PositionError::NotClosed)));
    assert_eq!(
        position.get_unrealized_return(&strategy, Some(dec!(120))).unwrap(),
        dec!(0.2)
    );

    position.exit(&mut strategy, None, None, None).unwrap();
    strategy.on_bars(&mut position, &flat(dec!(120)));
    let first = position.get_return(true).unwrap();
    position.exit(&mut strategy, None, None, None).unwrap();
    assert_eq!(position.get_return(true).unwrap(), first);
    assert!(matches!(
        position.get_unrealized_net_profit(&strategy, None),
        Err(PositionError::AlreadyClosed)
    ));
}

#[test]
fn test_snapshot_reports_lifecycle() {
    let mut strategy = strategy();
    let mut position =
        ShortPosition::new(&mut strategy, symbol(), None, Some(dec!(99)), dec!(3), true).unwrap();
    strategy.on_bars(&mut position, &Bars::new([bar(dec!(100), dec!(101), dec!(98), dec!(99))]));

    let snapshot = position.snapshot();
    assert_eq!(snapshot.shares, dec!(-3));
    assert!(snapshot.is_open);
    assert_eq!(snapshot.fill_count, 1);

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"direction\":\"short\""));
}
