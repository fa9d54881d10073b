//! 주문 타입과 주문 상태 머신.
//!
//! 이 모듈은 포지션이 사용하는 주문 관련 타입을 정의합니다:
//! - `OrderAction` - 주문 행위 (매수/환매수/매도/공매도)
//! - `OrderType` - 주문 유형 (시장가, 지정가, 스톱, 스톱 지정가)
//! - `OrderState` - 주문 상태와 허용된 전이
//! - `OrderExecutionInfo` - 체결 정보
//! - `Order` - 주문 엔티티
//!
//! 상태 전이는 브로커만 수행합니다. 포지션은 주문을 읽고 명령(제출/취소)만 내립니다.

use crate::error::{TraderError, TraderResult};
use crate::types::{Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 주문 식별자.
pub type OrderId = Uuid;

/// 주문 방향 (매수 계열 또는 매도 계열).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 주문 행위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    /// 매수 (롱 진입)
    Buy,
    /// 환매수 (숏 청산)
    BuyToCover,
    /// 매도 (롱 청산)
    Sell,
    /// 공매도 (숏 진입)
    SellShort,
}

impl OrderAction {
    /// 행위가 속한 방향을 반환합니다.
    pub fn side(&self) -> Side {
        match self {
            OrderAction::Buy | OrderAction::BuyToCover => Side::Buy,
            OrderAction::Sell | OrderAction::SellShort => Side::Sell,
        }
    }

    /// 매수 계열 행위인지 확인합니다.
    pub fn is_buy(&self) -> bool {
        self.side() == Side::Buy
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::Buy => write!(f, "BUY"),
            OrderAction::BuyToCover => write!(f, "BUY_TO_COVER"),
            OrderAction::Sell => write!(f, "SELL"),
            OrderAction::SellShort => write!(f, "SELL_SHORT"),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// 시장가 주문
    Market,
    /// 지정가 주문
    Limit,
    /// 스톱 주문 - 스톱 가격 도달 시 시장가로 전환
    Stop,
    /// 스톱 지정가 주문 - 스톱 가격 도달 시 지정가로 전환
    StopLimit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// 생성됨 (아직 제출되지 않음)
    Initial,
    /// 브로커에 제출됨
    Submitted,
    /// 브로커가 접수함
    Accepted,
    /// 부분 체결됨
    PartiallyFilled,
    /// 전량 체결됨
    Filled,
    /// 취소됨
    Canceled,
}

impl OrderState {
    /// 최종 상태인지 확인합니다.
    pub fn is_final(&self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Canceled)
    }

    /// 활성 상태인지 확인합니다. `Initial`도 활성으로 간주합니다.
    pub fn is_active(&self) -> bool {
        !self.is_final()
    }

    /// `next` 상태로의 전이가 허용되는지 확인합니다.
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (Initial, Submitted)
                | (Initial, Canceled)
                | (Submitted, Accepted)
                | (Submitted, Canceled)
                | (Accepted, PartiallyFilled)
                | (Accepted, Filled)
                | (Accepted, Canceled)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Canceled)
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderState::Initial => write!(f, "INITIAL"),
            OrderState::Submitted => write!(f, "SUBMITTED"),
            OrderState::Accepted => write!(f, "ACCEPTED"),
            OrderState::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderState::Filled => write!(f, "FILLED"),
            OrderState::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// 한 번의 체결 정보.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExecutionInfo {
    /// 체결 수량
    pub quantity: Quantity,
    /// 체결 가격
    pub price: Price,
    /// 수수료
    pub commission: Decimal,
    /// 체결 시각
    pub timestamp: DateTime<Utc>,
}

impl OrderExecutionInfo {
    /// 새 체결 정보를 생성합니다.
    pub fn new(quantity: Quantity, price: Price, commission: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            quantity,
            price,
            commission,
            timestamp,
        }
    }
}

/// 주문 엔티티.
///
/// 상태 필드는 비공개이며 [`Order::submit`], [`Order::accept`], [`Order::add_fill`],
/// [`Order::cancel`]을 통해서만 바뀝니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    symbol: Symbol,
    action: OrderAction,
    order_type: OrderType,
    quantity: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_price: Option<Price>,
    state: OrderState,
    good_till_canceled: bool,
    /// 세션 종료 시 청산용 시장가 주문 여부
    on_close: bool,
    /// 스톱 지정가 주문의 스톱 가격 도달 여부
    stop_hit: bool,
    filled_quantity: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    avg_fill_price: Option<Price>,
    commissions: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_info: Option<OrderExecutionInfo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    fn new(
        action: OrderAction,
        order_type: OrderType,
        symbol: Symbol,
        quantity: Quantity,
        limit_price: Option<Price>,
        stop_price: Option<Price>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            symbol,
            action,
            order_type,
            quantity,
            limit_price,
            stop_price,
            state: OrderState::Initial,
            good_till_canceled: false,
            on_close: false,
            stop_hit: false,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            commissions: Decimal::ZERO,
            execution_info: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 시장가 주문을 생성합니다. `on_close`가 참이면 세션 종가에 체결됩니다.
    pub fn market(action: OrderAction, symbol: Symbol, quantity: Quantity, on_close: bool) -> Self {
        let mut order = Self::new(action, OrderType::Market, symbol, quantity, None, None);
        order.on_close = on_close;
        order
    }

    /// 지정가 주문을 생성합니다.
    pub fn limit(action: OrderAction, symbol: Symbol, limit_price: Price, quantity: Quantity) -> Self {
        Self::new(action, OrderType::Limit, symbol, quantity, Some(limit_price), None)
    }

    /// 스톱 주문을 생성합니다.
    pub fn stop(action: OrderAction, symbol: Symbol, stop_price: Price, quantity: Quantity) -> Self {
        Self::new(action, OrderType::Stop, symbol, quantity, None, Some(stop_price))
    }

    /// 스톱 지정가 주문을 생성합니다.
    pub fn stop_limit(
        action: OrderAction,
        symbol: Symbol,
        stop_price: Price,
        limit_price: Price,
        quantity: Quantity,
    ) -> Self {
        Self::new(
            action,
            OrderType::StopLimit,
            symbol,
            quantity,
            Some(limit_price),
            Some(stop_price),
        )
    }

    // ==================== 조회 ====================

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn action(&self) -> OrderAction {
        self.action
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// 주문 수량.
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn limit_price(&self) -> Option<Price> {
        self.limit_price
    }

    pub fn stop_price(&self) -> Option<Price> {
        self.stop_price
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn good_till_canceled(&self) -> bool {
        self.good_till_canceled
    }

    /// 세션 종료 청산용 주문인지 확인합니다.
    pub fn is_on_close(&self) -> bool {
        self.on_close
    }

    pub fn stop_hit(&self) -> bool {
        self.stop_hit
    }

    /// 누적 체결 수량.
    pub fn filled_quantity(&self) -> Quantity {
        self.filled_quantity
    }

    /// 남은 체결 수량.
    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity - self.filled_quantity
    }

    /// 평균 체결 가격.
    pub fn avg_fill_price(&self) -> Option<Price> {
        self.avg_fill_price
    }

    /// 누적 수수료.
    pub fn commissions(&self) -> Decimal {
        self.commissions
    }

    /// 가장 최근 체결 정보.
    pub fn execution_info(&self) -> Option<&OrderExecutionInfo> {
        self.execution_info.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_initial(&self) -> bool {
        self.state == OrderState::Initial
    }

    pub fn is_submitted(&self) -> bool {
        self.state == OrderState::Submitted
    }

    pub fn is_accepted(&self) -> bool {
        self.state == OrderState::Accepted
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_partially_filled(&self) -> bool {
        self.state == OrderState::PartiallyFilled
    }

    pub fn is_filled(&self) -> bool {
        self.state == OrderState::Filled
    }

    pub fn is_canceled(&self) -> bool {
        self.state == OrderState::Canceled
    }

    /// 매수 계열 주문인지 확인합니다.
    pub fn is_buy(&self) -> bool {
        self.action.is_buy()
    }

    // ==================== 변경 ====================

    /// GTC 여부를 설정합니다. 제출 전에만 바꿀 수 있습니다.
    pub fn set_good_till_canceled(&mut self, good_till_canceled: bool) -> TraderResult<()> {
        if !self.is_initial() {
            return Err(TraderError::InvalidInput(format!(
                "order {} has already been submitted",
                self.id
            )));
        }
        self.good_till_canceled = good_till_canceled;
        Ok(())
    }

    /// 스톱 지정가 주문의 스톱 도달 여부를 기록합니다.
    pub fn set_stop_hit(&mut self, stop_hit: bool) {
        self.stop_hit = stop_hit;
    }

    fn switch_state(&mut self, next: OrderState) -> TraderResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(TraderError::InvalidTransition {
                order_id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Initial -> Submitted.
    pub fn submit(&mut self) -> TraderResult<()> {
        self.switch_state(OrderState::Submitted)
    }

    /// Submitted -> Accepted.
    pub fn accept(&mut self) -> TraderResult<()> {
        self.switch_state(OrderState::Accepted)
    }

    /// 활성 주문을 취소합니다.
    pub fn cancel(&mut self) -> TraderResult<()> {
        self.switch_state(OrderState::Canceled)
    }

    /// 체결을 반영합니다.
    ///
    /// 남은 수량이 0이 되면 `Filled`, 아니면 `PartiallyFilled`로 전이합니다.
    pub fn add_fill(&mut self, info: OrderExecutionInfo) -> TraderResult<()> {
        if info.quantity <= Decimal::ZERO {
            return Err(TraderError::InvalidInput(format!(
                "fill quantity must be positive: {}",
                info.quantity
            )));
        }
        if info.quantity > self.remaining_quantity() {
            return Err(TraderError::InvalidInput(format!(
                "fill quantity {} exceeds remaining {} on order {}",
                info.quantity,
                self.remaining_quantity(),
                self.id
            )));
        }

        let new_filled = self.filled_quantity + info.quantity;
        let next = if new_filled == self.quantity {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        self.switch_state(next)?;

        self.avg_fill_price = Some(match self.avg_fill_price {
            Some(avg) => (avg * self.filled_quantity + info.price * info.quantity) / new_filled,
            None => info.price,
        });
        self.filled_quantity = new_filled;
        self.commissions += info.commission;
        self.updated_at = info.timestamp;
        self.execution_info = Some(info);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn accepted(mut order: Order) -> Order {
        order.submit().unwrap();
        order.accept().unwrap();
        order
    }

    fn fill(quantity: Decimal, price: Decimal, commission: Decimal) -> OrderExecutionInfo {
        OrderExecutionInfo::new(quantity, price, commission, Utc::now())
    }

    #[test]
    fn test_order_constructors() {
        let symbol = Symbol::stock("AAPL", "USD");

        let market = Order::market(OrderAction::Buy, symbol.clone(), dec!(10), false);
        assert_eq!(market.order_type(), OrderType::Market);
        assert!(market.is_initial());
        assert!(market.is_active());
        assert!(!market.is_on_close());

        let stop_limit = Order::stop_limit(OrderAction::SellShort, symbol, dec!(95), dec!(94), dec!(5));
        assert_eq!(stop_limit.order_type(), OrderType::StopLimit);
        assert_eq!(stop_limit.stop_price(), Some(dec!(95)));
        assert_eq!(stop_limit.limit_price(), Some(dec!(94)));
        assert!(!stop_limit.is_buy());
    }

    #[test]
    fn test_action_families() {
        assert!(OrderAction::Buy.is_buy());
        assert!(OrderAction::BuyToCover.is_buy());
        assert!(!OrderAction::Sell.is_buy());
        assert_eq!(OrderAction::SellShort.side(), Side::Sell);
    }

    #[test]
    fn test_gtc_only_before_submit() {
        let mut order = Order::market(OrderAction::Buy, Symbol::stock("AAPL", "USD"), dec!(1), false);
        order.set_good_till_canceled(true).unwrap();
        assert!(order.good_till_canceled());

        order.submit().unwrap();
        assert!(order.set_good_till_canceled(false).is_err());
        assert!(order.good_till_canceled());
    }

    #[test]
    fn test_partial_then_full_fill() {
        let symbol = Symbol::stock("AAPL", "USD");
        let mut order = accepted(Order::limit(OrderAction::Buy, symbol, dec!(100), dec!(10)));

        order.add_fill(fill(dec!(4), dec!(100), dec!(1))).unwrap();
        assert!(order.is_partially_filled());
        assert_eq!(order.remaining_quantity(), dec!(6));

        order.add_fill(fill(dec!(6), dec!(95), dec!(2))).unwrap();
        assert!(order.is_filled());
        assert!(!order.is_active());
        // (4*100 + 6*95) / 10 = 97
        assert_eq!(order.avg_fill_price(), Some(dec!(97)));
        assert_eq!(order.commissions(), dec!(3));
        assert_eq!(order.execution_info().unwrap().quantity, dec!(6));
    }

    #[test]
    fn test_overfill_rejected() {
        let symbol = Symbol::stock("AAPL", "USD");
        let mut order = accepted(Order::market(OrderAction::Sell, symbol, dec!(5), false));

        assert!(order.add_fill(fill(dec!(6), dec!(100), dec!(0))).is_err());
        assert!(order.add_fill(fill(dec!(0), dec!(100), dec!(0))).is_err());
        assert!(order.is_accepted());
    }

    #[test]
    fn test_invalid_transitions() {
        let symbol = Symbol::stock("AAPL", "USD");

        let mut initial = Order::market(OrderAction::Buy, symbol.clone(), dec!(1), false);
        assert!(initial.accept().is_err());
        assert!(initial
            .add_fill(fill(dec!(1), dec!(100), dec!(0)))
            .is_err());

        let mut filled = accepted(Order::market(OrderAction::Buy, symbol, dec!(1), false));
        filled.add_fill(fill(dec!(1), dec!(100), dec!(0))).unwrap();
        let err = filled.cancel().unwrap_err();
        assert!(matches!(
            err,
            TraderError::InvalidTransition {
                from: OrderState::Filled,
                to: OrderState::Canceled,
                ..
            }
        ));
    }

    #[test]
    fn test_cancel_partially_filled() {
        let symbol = Symbol::stock("AAPL", "USD");
        let mut order = accepted(Order::market(OrderAction::Buy, symbol, dec!(10), false));
        order.add_fill(fill(dec!(3), dec!(100), dec!(0))).unwrap();

        order.cancel().unwrap();
        assert!(order.is_canceled());
        assert_eq!(order.filled_quantity(), dec!(3));
    }

    #[test]
    fn test_state_table() {
        assert!(OrderState::Initial.is_active());
        assert!(OrderState::PartiallyFilled.is_active());
        assert!(OrderState::Filled.is_final());
        assert!(OrderState::Canceled.is_final());
        assert!(!OrderState::Canceled.can_transition_to(OrderState::Submitted));
        assert!(OrderState::PartiallyFilled.can_transition_to(OrderState::PartiallyFilled));
    }
}
