//! 브로커와 전략 인터페이스.
//!
//! 포지션은 주문 상태를 직접 바꾸지 않습니다. 주문 생성과 제출/취소는
//! [`Broker`]에 요청하고, 브로커가 전이시킨 주문 스냅샷을 전략을 통해
//! [`Position::on_order_updated`](crate::Position::on_order_updated)로 전달받습니다.

use position_core::{Order, OrderAction, OrderId, OrderType, Price, Quantity, Symbol, TraderError};
use thiserror::Error;

use crate::position::PositionId;

/// 브로커 에러.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// 주문 거부됨
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// 주문을 찾을 수 없음
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// 이미 최종 상태인 주문
    #[error("Order is not active: {0}")]
    OrderNotActive(OrderId),

    /// 주문 상태 전이 에러
    #[error("Order error: {0}")]
    Order(#[from] TraderError),
}

/// 브로커 작업을 위한 Result 타입.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// 주문 생성, 제출, 취소를 담당하는 브로커.
///
/// 팩토리 메서드는 `Initial` 상태의 주문을 반환합니다. 기본 구현은
/// 새 식별자를 가진 주문을 만들며, 브로커가 식별자 체계를 따로 가진다면 재정의합니다.
pub trait Broker {
    /// 시장가 주문을 생성합니다.
    fn create_market_order(
        &self,
        action: OrderAction,
        symbol: &Symbol,
        quantity: Quantity,
        on_close: bool,
    ) -> Order {
        Order::market(action, symbol.clone(), quantity, on_close)
    }

    /// 지정가 주문을 생성합니다.
    fn create_limit_order(
        &self,
        action: OrderAction,
        symbol: &Symbol,
        limit_price: Price,
        quantity: Quantity,
    ) -> Order {
        Order::limit(action, symbol.clone(), limit_price, quantity)
    }

    /// 스톱 주문을 생성합니다.
    fn create_stop_order(
        &self,
        action: OrderAction,
        symbol: &Symbol,
        stop_price: Price,
        quantity: Quantity,
    ) -> Order {
        Order::stop(action, symbol.clone(), stop_price, quantity)
    }

    /// 스톱 지정가 주문을 생성합니다.
    fn create_stop_limit_order(
        &self,
        action: OrderAction,
        symbol: &Symbol,
        stop_price: Price,
        limit_price: Price,
        quantity: Quantity,
    ) -> Order {
        Order::stop_limit(action, symbol.clone(), stop_price, limit_price, quantity)
    }

    /// 주문을 제출합니다. 성공하면 호출자의 주문은 `Submitted` 상태가 됩니다.
    fn place_order(&mut self, order: &mut Order) -> BrokerResult<()>;

    /// 활성 주문의 취소를 요청합니다.
    fn cancel_order(&mut self, order: &Order) -> BrokerResult<()>;
}

/// 포지션이 필요로 하는 전략 측 서비스.
pub trait PositionStrategy {
    /// 주문을 처리할 브로커.
    fn broker(&mut self) -> &mut dyn Broker;

    /// 종목의 마지막 가격. 없으면 `None`.
    fn last_price(&self, symbol: &Symbol) -> Option<Price>;

    /// 주문 갱신을 해당 포지션으로 전달하도록 등록합니다.
    fn register_position_order(&mut self, position_id: PositionId, order: &Order);
}

/// 지정가/스톱 가격 조합으로 결정되는 주문 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit(Price),
    Stop(Price),
    StopLimit { stop: Price, limit: Price },
}

impl OrderKind {
    /// (지정가, 스톱) 유무로 주문 종류를 선택합니다.
    pub fn from_prices(limit_price: Option<Price>, stop_price: Option<Price>) -> Self {
        match (limit_price, stop_price) {
            (None, None) => OrderKind::Market,
            (Some(limit), None) => OrderKind::Limit(limit),
            (None, Some(stop)) => OrderKind::Stop(stop),
            (Some(limit), Some(stop)) => OrderKind::StopLimit { stop, limit },
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Market => OrderType::Market,
            OrderKind::Limit(_) => OrderType::Limit,
            OrderKind::Stop(_) => OrderType::Stop,
            OrderKind::StopLimit { .. } => OrderType::StopLimit,
        }
    }

    /// 브로커 팩토리로 주문을 생성합니다.
    pub fn create_order(
        self,
        broker: &dyn Broker,
        action: OrderAction,
        symbol: &Symbol,
        quantity: Quantity,
    ) -> Order {
        match self {
            OrderKind::Market => broker.create_market_order(action, symbol, quantity, false),
            OrderKind::Limit(limit) => broker.create_limit_order(action, symbol, limit, quantity),
            OrderKind::Stop(stop) => broker.create_stop_order(action, symbol, stop, quantity),
            OrderKind::StopLimit { stop, limit } => {
                broker.create_stop_limit_order(action, symbol, stop, limit, quantity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FactoryOnly;

    impl Broker for FactoryOnly {
        fn place_order(&mut self, _order: &mut Order) -> BrokerResult<()> {
            Err(BrokerError::OrderRejected("not supported".into()))
        }

        fn cancel_order(&mut self, order: &Order) -> BrokerResult<()> {
            Err(BrokerError::OrderNotFound(order.id()))
        }
    }

    #[test]
    fn test_order_kind_selection() {
        assert_eq!(OrderKind::from_prices(None, None), OrderKind::Market);
        assert_eq!(OrderKind::from_prices(Some(dec!(10)), None), OrderKind::Limit(dec!(10)));
        assert_eq!(OrderKind::from_prices(None, Some(dec!(9))), OrderKind::Stop(dec!(9)));
        assert_eq!(
            OrderKind::from_prices(Some(dec!(10)), Some(dec!(9))),
            OrderKind::StopLimit {
                stop: dec!(9),
                limit: dec!(10)
            }
        );
    }

    #[test]
    fn test_create_order_uses_factories() {
        let symbol = Symbol::stock("AAPL", "USD");
        let broker = FactoryOnly;

        let order = OrderKind::from_prices(Some(dec!(101)), Some(dec!(100))).create_order(
            &broker,
            OrderAction::Buy,
            &symbol,
            dec!(5),
        );
        assert_eq!(order.order_type(), OrderType::StopLimit);
        assert_eq!(order.limit_price(), Some(dec!(101)));
        assert_eq!(order.stop_price(), Some(dec!(100)));
        assert_eq!(order.quantity(), dec!(5));
        assert!(order.is_initial());

        let market = OrderKind::Market.create_order(&broker, OrderAction::Sell, &symbol, dec!(1));
        assert_eq!(market.order_type(), OrderKind::Market.order_type());
        assert!(!market.is_on_close());
    }
}
