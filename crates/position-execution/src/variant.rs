//! 포지션 방향(롱/숏)별 동작.
//!
//! 방향에 따라 달라지는 것은 세 가지입니다:
//! - 진입/청산 주문의 행위 (롱: Buy/Sell, 숏: SellShort/BuyToCover)
//! - 청산 수량의 부호
//! - 손익 계산기에 체결을 매수/매도 중 어느 쪽으로 기록할지

use position_core::{Order, OrderAction, OrderExecutionInfo, Price, Quantity, Symbol, TraderResult};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::broker::{Broker, OrderKind};
use crate::position_tracker::{PositionTracker, PositionTrackerError};

/// 포지션 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// 방향별 주문 생성과 손익 부호 규칙.
pub trait PositionVariant: fmt::Debug + Clone + Copy + Default + Send + Sync + 'static {
    const DIRECTION: Direction;
    const ENTRY_ACTION: OrderAction;
    const EXIT_ACTION: OrderAction;

    fn is_long() -> bool {
        Self::DIRECTION == Direction::Long
    }

    /// 부호 있는 보유 수량에서 청산 주문 수량을 계산합니다.
    fn exit_quantity(shares: Quantity) -> Quantity;

    /// 진입 주문을 생성합니다.
    fn build_entry_order(
        broker: &dyn Broker,
        symbol: &Symbol,
        limit_price: Option<Price>,
        stop_price: Option<Price>,
        quantity: Quantity,
    ) -> Order {
        OrderKind::from_prices(limit_price, stop_price).create_order(
            broker,
            Self::ENTRY_ACTION,
            symbol,
            quantity,
        )
    }

    /// 현재 보유 수량 전체에 대한 청산 주문을 생성합니다.
    fn build_exit_order(
        broker: &dyn Broker,
        symbol: &Symbol,
        limit_price: Option<Price>,
        stop_price: Option<Price>,
        shares: Quantity,
    ) -> Order {
        OrderKind::from_prices(limit_price, stop_price).create_order(
            broker,
            Self::EXIT_ACTION,
            symbol,
            Self::exit_quantity(shares),
        )
    }

    /// 세션 종가에 체결되는 GTC 시장가 청산 주문을 생성합니다.
    fn build_exit_on_session_close_order(
        broker: &dyn Broker,
        symbol: &Symbol,
        shares: Quantity,
    ) -> TraderResult<Order> {
        let mut order =
            broker.create_market_order(Self::EXIT_ACTION, symbol, Self::exit_quantity(shares), true);
        order.set_good_till_canceled(true)?;
        Ok(order)
    }

    fn record_entry_fill(
        tracker: &mut PositionTracker,
        fill: &OrderExecutionInfo,
    ) -> Result<(), PositionTrackerError>;

    fn record_exit_fill(
        tracker: &mut PositionTracker,
        fill: &OrderExecutionInfo,
    ) -> Result<(), PositionTrackerError>;
}

/// 롱 포지션: 매수로 진입하고 매도로 청산합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Long;

impl PositionVariant for Long {
    const DIRECTION: Direction = Direction::Long;
    const ENTRY_ACTION: OrderAction = OrderAction::Buy;
    const EXIT_ACTION: OrderAction = OrderAction::Sell;

    fn exit_quantity(shares: Quantity) -> Quantity {
        shares
    }

    fn record_entry_fill(
        tracker: &mut PositionTracker,
        fill: &OrderExecutionInfo,
    ) -> Result<(), PositionTrackerError> {
        tracker.buy(fill.quantity, fill.price, fill.commission)
    }

    fn record_exit_fill(
        tracker: &mut PositionTracker,
        fill: &OrderExecutionInfo,
    ) -> Result<(), PositionTrackerError> {
        tracker.sell(fill.quantity, fill.price, fill.commission)
    }
}

/// 숏 포지션: 공매도로 진입하고 환매수로 청산합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Short;

impl PositionVariant for Short {
    const DIRECTION: Direction = Direction::Short;
    const ENTRY_ACTION: OrderAction = OrderAction::SellShort;
    const EXIT_ACTION: OrderAction = OrderAction::BuyToCover;

    // 숏 보유 수량은 음수다
    fn exit_quantity(shares: Quantity) -> Quantity {
        -shares
    }

    fn record_entry_fill(
        tracker: &mut PositionTracker,
        fill: &OrderExecutionInfo,
    ) -> Result<(), PositionTrackerError> {
        tracker.sell(fill.quantity, fill.price, fill.commission)
    }

    fn record_exit_fill(
        tracker: &mut PositionTracker,
        fill: &OrderExecutionInfo,
    ) -> Result<(), PositionTrackerError> {
        tracker.buy(fill.quantity, fill.price, fill.commission)
    }
}
