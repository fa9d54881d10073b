//! 방향성 포지션 상태 머신.
//!
//! 포지션 하나는 진입 주문 하나와 (최대 하나의 활성) 청산 주문으로 열리고 닫힙니다.
//!
//! ```text
//! EntryActive ──(진입 체결)──> Open ──(exit)──> ExitActive ──(청산 체결)──> Closed
//!      │                         ^                  │
//!      └──(진입 취소)──> Closed  └──(청산 취소)─────┘
//! ```
//!
//! 보유 수량은 [`Position::on_order_updated`]에서만 바뀝니다. 브로커가 전달하는 주문
//! 스냅샷의 누적 체결 수량을 직전 사본과 비교해 증가분만 반영하므로, 같은 스냅샷이
//! 두 번 전달되어도 수량이 중복 집계되지 않습니다.

use chrono::{DateTime, Utc};
use position_core::{
    Bars, DecimalExt, Order, OrderExecutionInfo, OrderId, OrderState, Price, Quantity, Symbol,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerError, PositionStrategy};
use crate::error::{PositionError, PositionResult};
use crate::position_tracker::PositionTracker;
use crate::variant::{Direction, Long, PositionVariant, Short};

/// 포지션 식별자.
pub type PositionId = Uuid;

/// 롱 포지션.
pub type LongPosition = Position<Long>;

/// 숏 포지션.
pub type ShortPosition = Position<Short>;

/// 포지션 안에서 주문이 맡은 역할.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderRole {
    Entry,
    Exit,
}

/// 포지션이 관측한 체결 한 건.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionFill {
    pub role: OrderRole,
    pub order_id: OrderId,
    pub info: OrderExecutionInfo,
}

/// 포지션의 직렬화 가능한 읽기 전용 뷰.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub id: PositionId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub shares: Quantity,
    pub is_open: bool,
    pub entry_order_id: OrderId,
    pub entry_state: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_state: Option<OrderState>,
    pub fill_count: usize,
    pub exit_on_session_close: bool,
    pub timestamp: DateTime<Utc>,
}

/// 방향성 포지션.
///
/// 전략에 대한 참조를 보관하지 않습니다. 브로커나 가격 정보가 필요한 작업은
/// 전략을 인자로 받습니다.
#[derive(Debug, Clone)]
pub struct Position<V: PositionVariant> {
    id: PositionId,
    symbol: Symbol,
    entry_order: Order,
    exit_order: Option<Order>,
    active_orders: HashMap<OrderId, OrderRole>,
    shares: Quantity,
    fills: Vec<PositionFill>,
    exit_on_session_close: bool,
    _variant: PhantomData<V>,
}

impl<V: PositionVariant> Position<V> {
    /// 진입 주문을 생성하고 제출해 새 포지션을 엽니다.
    ///
    /// 지정가/스톱 가격 조합에 따라 시장가, 지정가, 스톱, 스톱 지정가 주문이 선택됩니다.
    pub fn new<S>(
        strategy: &mut S,
        symbol: Symbol,
        limit_price: Option<Price>,
        stop_price: Option<Price>,
        quantity: Quantity,
        good_till_canceled: bool,
    ) -> PositionResult<Self>
    where
        S: PositionStrategy + ?Sized,
    {
        let entry_order =
            V::build_entry_order(strategy.broker(), &symbol, limit_price, stop_price, quantity);
        Self::with_entry_order(strategy, entry_order, good_till_canceled)
    }

    /// 미리 만든 진입 주문으로 포지션을 엽니다.
    ///
    /// 진입 주문은 `Initial` 상태여야 합니다. 제출에 실패하면 전략에 아무것도
    /// 등록되지 않고 에러가 반환됩니다.
    pub fn with_entry_order<S>(
        strategy: &mut S,
        mut entry_order: Order,
        good_till_canceled: bool,
    ) -> PositionResult<Self>
    where
        S: PositionStrategy + ?Sized,
    {
        if !entry_order.is_initial() {
            return Err(PositionError::InvariantViolation(format!(
                "entry order {} must be in initial state, found {}",
                entry_order.id(),
                entry_order.state()
            )));
        }

        let id = Uuid::new_v4();
        let symbol = entry_order.symbol().clone();
        let _span = position_core::position_span!("open_position", id, symbol, entry_order.id())
            .entered();

        entry_order.set_good_till_canceled(good_till_canceled)?;
        strategy.broker().place_order(&mut entry_order)?;
        strategy.register_position_order(id, &entry_order);

        let mut active_orders = HashMap::new();
        active_orders.insert(entry_order.id(), OrderRole::Entry);

        info!(
            direction = %V::DIRECTION,
            action = %entry_order.action(),
            order_type = %entry_order.order_type(),
            quantity = %entry_order.quantity(),
            good_till_canceled,
            "진입 주문 제출됨"
        );

        Ok(Self {
            id,
            symbol,
            entry_order,
            exit_order: None,
            active_orders,
            shares: Decimal::ZERO,
            fills: Vec::new(),
            exit_on_session_close: false,
            _variant: PhantomData,
        })
    }

    // ==================== 조회 ====================

    pub fn id(&self) -> PositionId {
        self.id
    }

    /// 거래 종목.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// 진입 주문 수량.
    pub fn quantity(&self) -> Quantity {
        self.entry_order.quantity()
    }

    /// 부호 있는 보유 수량 (롱은 양수, 숏은 음수).
    pub fn shares(&self) -> Quantity {
        self.shares
    }

    pub fn entry_order(&self) -> &Order {
        &self.entry_order
    }

    pub fn exit_order(&self) -> Option<&Order> {
        self.exit_order.as_ref()
    }

    /// 아직 최종 상태에 도달하지 않은 주문 ID와 역할.
    pub fn active_orders(&self) -> &HashMap<OrderId, OrderRole> {
        &self.active_orders
    }

    pub fn entry_active(&self) -> bool {
        self.entry_order.is_active()
    }

    pub fn entry_filled(&self) -> bool {
        self.entry_order.is_filled()
    }

    pub fn exit_active(&self) -> bool {
        self.exit_order.as_ref().is_some_and(Order::is_active)
    }

    pub fn exit_filled(&self) -> bool {
        self.exit_order.as_ref().is_some_and(Order::is_filled)
    }

    /// 진입 주문의 GTC 여부.
    pub fn good_till_canceled(&self) -> bool {
        self.entry_order.good_till_canceled()
    }

    pub fn exit_on_session_close(&self) -> bool {
        self.exit_on_session_close
    }

    /// 세션 종료 직전 바에서 자동 청산할지 설정합니다.
    pub fn set_exit_on_session_close(&mut self, exit_on_session_close: bool) {
        self.exit_on_session_close = exit_on_session_close;
    }

    pub fn is_long(&self) -> bool {
        V::is_long()
    }

    pub fn is_short(&self) -> bool {
        !V::is_long()
    }

    /// 진입/청산 주문에서 관측된 체결 이력.
    pub fn fills(&self) -> &[PositionFill] {
        &self.fills
    }

    /// 포지션이 열려 있는지 확인합니다.
    ///
    /// 진입 주문이 활성이거나, 진입이 체결되었고 청산 주문이 없거나 아직 체결되지
    /// 않았으면 열려 있습니다.
    pub fn is_open(&self) -> bool {
        if self.entry_active() {
            return true;
        }
        self.entry_filled() && !self.exit_filled()
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            id: self.id,
            symbol: self.symbol.clone(),
            direction: V::DIRECTION,
            shares: self.shares,
            is_open: self.is_open(),
            entry_order_id: self.entry_order.id(),
            entry_state: self.entry_order.state(),
            exit_order_id: self.exit_order.as_ref().map(Order::id),
            exit_state: self.exit_order.as_ref().map(Order::state),
            fill_count: self.fills.len(),
            exit_on_session_close: self.exit_on_session_close,
            timestamp: Utc::now(),
        }
    }

    // ==================== 주문 명령 ====================

    /// 진입 주문이 활성이면 취소를 요청합니다.
    ///
    /// 포지션은 마지막으로 전달받은 주문 스냅샷으로 판단합니다. 브로커에서 이미 체결되거나
    /// 취소된 주문이라면 브로커가 [`BrokerError::OrderNotActive`]를 돌려주며, 이 경우
    /// 아무것도 하지 않고 `Ok(())`를 반환합니다. 대기 중인 업데이트를
    /// [`Position::on_order_updated`]로 전달한 뒤 다시 호출하세요.
    pub fn cancel_entry<S>(&mut self, strategy: &mut S) -> PositionResult<()>
    where
        S: PositionStrategy + ?Sized,
    {
        if !self.entry_active() {
            debug!(position_id = %self.id, "진입 주문이 활성 상태가 아님, 취소 생략");
            return Ok(());
        }

        if !Self::request_cancel(strategy, &self.entry_order, self.id)? {
            return Ok(());
        }
        info!(
            position_id = %self.id,
            symbol = %self.symbol,
            order_id = %self.entry_order.id(),
            "진입 주문 취소 요청"
        );
        Ok(())
    }

    /// 청산 주문이 활성이면 취소를 요청합니다.
    ///
    /// 브로커에서 이미 종료된 주문은 [`Position::cancel_entry`]와 같이 `Ok(())`로 처리합니다.
    pub fn cancel_exit<S>(&mut self, strategy: &mut S) -> PositionResult<()>
    where
        S: PositionStrategy + ?Sized,
    {
        let Some(exit_order) = self.exit_order.as_ref().filter(|o| o.is_active()) else {
            debug!(position_id = %self.id, "활성 청산 주문 없음, 취소 생략");
            return Ok(());
        };

        if !Self::request_cancel(strategy, exit_order, self.id)? {
            return Ok(());
        }
        info!(
            position_id = %self.id,
            symbol = %self.symbol,
            order_id = %exit_order.id(),
            "청산 주문 취소 요청"
        );
        Ok(())
    }

    /// 포지션을 청산합니다.
    ///
    /// - 진입 주문이 아직 활성이면 진입 주문을 취소하고 끝냅니다. 브로커가 이미 종료한
    ///   진입 주문이면 취소 없이 끝나므로, 업데이트를 먼저 전달한 뒤 호출해야 합니다.
    /// - 이미 청산이 체결되었거나 보유 수량이 없으면 아무것도 하지 않습니다.
    /// - 활성 청산 주문이 있으면 [`PositionError::ExitOrderActive`]를 반환합니다.
    ///
    /// 그 외에는 보유 수량 전체에 대한 청산 주문을 제출합니다. `good_till_canceled`가
    /// `None`이면 진입 주문의 GTC 설정을 따릅니다.
    pub fn exit<S>(
        &mut self,
        strategy: &mut S,
        limit_price: Option<Price>,
        stop_price: Option<Price>,
        good_till_canceled: Option<bool>,
    ) -> PositionResult<()>
    where
        S: PositionStrategy + ?Sized,
    {
        let _span = position_core::position_span!("exit_position", self.id, self.symbol).entered();

        if self.entry_active() {
            if !self.shares.is_zero() {
                // 부분 체결분은 취소 확인 후 다시 exit()으로 청산한다
                warn!(
                    shares = %self.shares,
                    "진입 주문이 부분 체결된 상태에서 취소 요청"
                );
            }
            return self.cancel_entry(strategy);
        }

        if self.exit_filled() {
            debug!("이미 청산된 포지션");
            return Ok(());
        }

        if self.exit_active() {
            return Err(PositionError::ExitOrderActive);
        }

        if self.shares.is_zero() {
            debug!("보유 수량 없음, 청산 생략");
            return Ok(());
        }

        let mut order = V::build_exit_order(
            strategy.broker(),
            &self.symbol,
            limit_price,
            stop_price,
            self.shares,
        );
        order.set_good_till_canceled(
            good_till_canceled.unwrap_or_else(|| self.entry_order.good_till_canceled()),
        )?;
        self.place_exit_order(strategy, order)?;
        Ok(())
    }

    /// 세션 종료 직전 바에서 자동 청산을 처리합니다.
    ///
    /// 자동 청산이 설정되어 있고 청산 주문이 없을 때, 종목의 현재 바가 세션 종료까지
    /// 바 하나를 남겨 두었다면 진입 체결 여부에 따라 세션 종가 청산 주문을 제출하거나
    /// 진입 주문을 취소합니다. 새 청산 주문을 제출한 경우 그 주문을 반환합니다.
    pub fn check_exit_on_session_close<S>(
        &mut self,
        strategy: &mut S,
        bars: &Bars,
    ) -> PositionResult<Option<Order>>
    where
        S: PositionStrategy + ?Sized,
    {
        if !self.exit_on_session_close || self.exit_order.is_some() {
            return Ok(None);
        }

        let penultimate = bars
            .get_bar(&self.symbol)
            .is_some_and(|bar| bar.is_penultimate_of_session());
        if !penultimate {
            return Ok(None);
        }

        if !self.entry_filled() {
            self.cancel_entry(strategy)?;
            return Ok(None);
        }

        let order =
            V::build_exit_on_session_close_order(strategy.broker(), &self.symbol, self.shares)?;
        let order = self.place_exit_order(strategy, order)?;
        info!(
            position_id = %self.id,
            order_id = %order.id(),
            "세션 종료 청산 주문 제출됨"
        );
        Ok(Some(order))
    }

    /// 취소를 요청합니다. 브로커에서 이미 종료된 주문이면 `false`를 반환합니다.
    fn request_cancel<S>(
        strategy: &mut S,
        order: &Order,
        position_id: PositionId,
    ) -> PositionResult<bool>
    where
        S: PositionStrategy + ?Sized,
    {
        match strategy.broker().cancel_order(order) {
            Ok(()) => Ok(true),
            Err(BrokerError::OrderNotActive(order_id)) => {
                debug!(
                    position_id = %position_id,
                    order_id = %order_id,
                    "브로커에서 이미 종료된 주문, 업데이트 대기"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn place_exit_order<S>(&mut self, strategy: &mut S, mut order: Order) -> PositionResult<Order>
    where
        S: PositionStrategy + ?Sized,
    {
        if self.exit_active() {
            return Err(PositionError::InvariantViolation(
                "previous exit order is still active".to_string(),
            ));
        }

        strategy.broker().place_order(&mut order)?;
        if order.is_initial() {
            return Err(PositionError::InvariantViolation(format!(
                "exit order {} was not submitted",
                order.id()
            )));
        }

        strategy.register_position_order(self.id, &order);
        self.active_orders.insert(order.id(), OrderRole::Exit);
        self.exit_order = Some(order.clone());

        info!(
            position_id = %self.id,
            symbol = %self.symbol,
            order_id = %order.id(),
            action = %order.action(),
            order_type = %order.order_type(),
            quantity = %order.quantity(),
            "청산 주문 제출됨"
        );
        Ok(order)
    }

    // ==================== 주문 갱신 ====================

    /// 브로커가 전이시킨 주문 스냅샷을 반영합니다.
    ///
    /// 누적 체결 수량이 늘었다면 그 증가분만큼 보유 수량을 조정하고 체결 이력에 추가합니다.
    /// 최종 상태가 된 주문은 활성 주문 목록에서 제거됩니다.
    pub fn on_order_updated(&mut self, order: &Order) -> PositionResult<()> {
        let role = self
            .role_of(order.id())
            .ok_or(PositionError::UnknownOrder(order.id()))?;
        let previous = match role {
            OrderRole::Entry => &self.entry_order,
            OrderRole::Exit => self
                .exit_order
                .as_ref()
                .ok_or(PositionError::UnknownOrder(order.id()))?,
        };

        let fill = Self::new_fill(previous, order)?;
        if let Some(info) = fill {
            if order.is_buy() {
                self.shares += info.quantity;
            } else {
                self.shares -= info.quantity;
            }
            debug!(
                position_id = %self.id,
                order_id = %order.id(),
                role = ?role,
                quantity = %info.quantity,
                price = %info.price,
                shares = %self.shares,
                "체결 반영"
            );
            self.fills.push(PositionFill {
                role,
                order_id: order.id(),
                info,
            });
        }

        match role {
            OrderRole::Entry => self.entry_order = order.clone(),
            OrderRole::Exit => self.exit_order = Some(order.clone()),
        }

        if !order.is_active() && self.active_orders.remove(&order.id()).is_some() {
            debug!(
                position_id = %self.id,
                order_id = %order.id(),
                state = %order.state(),
                "주문 종료"
            );
        }

        if role == OrderRole::Exit && order.is_filled() {
            if let Ok(realized) = self.get_return(true) {
                info!(
                    position_id = %self.id,
                    symbol = %self.symbol,
                    realized_return = %realized.to_percentage_string(),
                    "포지션 청산 완료"
                );
            }
        }

        Ok(())
    }

    fn role_of(&self, order_id: OrderId) -> Option<OrderRole> {
        if self.entry_order.id() == order_id {
            return Some(OrderRole::Entry);
        }
        match &self.exit_order {
            Some(exit) if exit.id() == order_id => Some(OrderRole::Exit),
            _ => None,
        }
    }

    /// 직전 사본 이후 새로 체결된 부분을 계산합니다.
    fn new_fill(previous: &Order, current: &Order) -> PositionResult<Option<OrderExecutionInfo>> {
        let quantity = current.filled_quantity() - previous.filled_quantity();
        if quantity < Decimal::ZERO {
            return Err(PositionError::InvariantViolation(format!(
                "filled quantity of order {} went backwards",
                current.id()
            )));
        }
        if quantity.is_zero() {
            return Ok(None);
        }

        // 체결 한 건이면 체결 정보를 그대로 쓴다
        if let Some(info) = current.execution_info().filter(|i| i.quantity == quantity) {
            return Ok(Some(info.clone()));
        }

        let notional = |order: &Order| {
            order.avg_fill_price().unwrap_or(Decimal::ZERO) * order.filled_quantity()
        };
        let price = (notional(current) - notional(previous)) / quantity;
        let commission = current.commissions() - previous.commissions();
        let timestamp = current
            .execution_info()
            .map(|i| i.timestamp)
            .unwrap_or_else(|| current.updated_at());
        Ok(Some(OrderExecutionInfo::new(quantity, price, commission, timestamp)))
    }

    // ==================== 손익 ====================

    /// 체결 이력으로 손익 계산기를 만듭니다.
    fn tracker(&self) -> PositionResult<PositionTracker> {
        let mut tracker = PositionTracker::new();
        for fill in &self.fills {
            match fill.role {
                OrderRole::Entry => V::record_entry_fill(&mut tracker, &fill.info)?,
                OrderRole::Exit => V::record_exit_fill(&mut tracker, &fill.info)?,
            }
        }
        Ok(tracker)
    }

    fn closing_price(&self) -> PositionResult<Price> {
        if !self.entry_filled() {
            return Err(PositionError::NotOpened);
        }
        self.exit_order
            .as_ref()
            .filter(|o| o.is_filled())
            .and_then(Order::avg_fill_price)
            .ok_or(PositionError::NotClosed)
    }

    fn mark_price<S>(&self, strategy: &S, price: Option<Price>) -> PositionResult<Price>
    where
        S: PositionStrategy + ?Sized,
    {
        if !self.entry_filled() {
            return Err(PositionError::NotOpened);
        }
        if self.exit_filled() {
            return Err(PositionError::AlreadyClosed);
        }
        price
            .or_else(|| strategy.last_price(&self.symbol))
            .ok_or_else(|| PositionError::PriceUnavailable(self.symbol.clone()))
    }

    /// 청산된 포지션의 실현 수익률.
    pub fn get_return(&self, include_commissions: bool) -> PositionResult<Decimal> {
        let price = self.closing_price()?;
        Ok(self.tracker()?.get_return(price, include_commissions))
    }

    /// 청산된 포지션의 실현 순손익.
    pub fn get_net_profit(&self, include_commissions: bool) -> PositionResult<Decimal> {
        let price = self.closing_price()?;
        Ok(self.tracker()?.get_net_profit(price, include_commissions))
    }

    /// 열린 포지션의 미실현 수익률 (수수료 제외).
    ///
    /// `price`가 없으면 전략의 마지막 가격을 사용합니다.
    pub fn get_unrealized_return<S>(&self, strategy: &S, price: Option<Price>) -> PositionResult<Decimal>
    where
        S: PositionStrategy + ?Sized,
    {
        let price = self.mark_price(strategy, price)?;
        Ok(self.tracker()?.get_return(price, false))
    }

    /// 열린 포지션의 미실현 순손익 (수수료 제외).
    pub fn get_unrealized_net_profit<S>(
        &self,
        strategy: &S,
        price: Option<Price>,
    ) -> PositionResult<Decimal>
    where
        S: PositionStrategy + ?Sized,
    {
        let price = self.mark_price(strategy, price)?;
        Ok(self.tracker()?.get_net_profit(price, false))
    }
}
