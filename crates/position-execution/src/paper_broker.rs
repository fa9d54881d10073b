//! 메모리 내 모의 브로커.
//!
//! 백테스트와 테스트용 [`Broker`] 구현입니다. 주문 상태는 브로커가 소유하며,
//! 상태가 바뀔 때마다 주문 스냅샷을 큐에 쌓습니다. 전략은 [`PaperBroker::drain_updates`]로
//! 스냅샷을 꺼내 소유 포지션에 전달합니다.
//!
//! 체결되거나 취소된 주문도 조회와 취소 응답을 위해 남겨 둡니다. 긴 백테스트에서는
//! 스냅샷을 전달한 뒤 [`PaperBroker::prune_finished_orders`]로 정리합니다.
//!
//! 바 기반 체결 규칙:
//! - 시장가: 시가 체결 (세션 종가 주문은 종가), 불리한 방향으로 슬리피지 적용
//! - 지정가: 매수는 저가 ≤ 지정가, 매도는 고가 ≥ 지정가일 때 지정가 체결
//! - 스톱: 매수는 고가 ≥ 스톱, 매도는 저가 ≤ 스톱일 때 스톱 가격에 슬리피지 적용
//! - 스톱 지정가: 스톱 도달 후 지정가 주문처럼 동작

use chrono::{DateTime, Utc};
use position_core::{
    AppConfig, Bar, Bars, BrokerConfig, Order, OrderExecutionInfo, OrderId, OrderType, Price,
    Quantity,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

use crate::broker::{Broker, BrokerError, BrokerResult};

/// 모의 브로커.
#[derive(Debug, Default)]
pub struct PaperBroker {
    config: BrokerConfig,
    orders: HashMap<OrderId, Order>,
    updates: VecDeque<Order>,
}

impl PaperBroker {
    /// 새 모의 브로커를 생성합니다.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            orders: HashMap::new(),
            updates: VecDeque::new(),
        }
    }

    /// 애플리케이션 설정의 브로커 섹션으로 생성합니다.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(config.broker.clone())
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn get_order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// 최종 상태가 아닌 주문 (생성 순).
    pub fn active_orders(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.orders.values().filter(|o| o.is_active()).collect();
        orders.sort_by_key(|o| (o.created_at(), o.id()));
        orders
    }

    /// 쌓인 주문 스냅샷을 전이 순서대로 꺼냅니다.
    pub fn drain_updates(&mut self) -> Vec<Order> {
        self.updates.drain(..).collect()
    }

    /// 최종 상태 주문을 정리합니다. 정리한 주문 수를 반환합니다.
    ///
    /// 아직 꺼내지 않은 스냅샷이 있는 주문은 남깁니다. 정리된 주문을 취소하면
    /// [`BrokerError::OrderNotFound`]가 반환됩니다.
    pub fn prune_finished_orders(&mut self) -> usize {
        let pending: HashSet<OrderId> = self.updates.iter().map(Order::id).collect();
        let before = self.orders.len();
        self.orders
            .retain(|order_id, order| order.is_active() || pending.contains(order_id));

        let pruned = before - self.orders.len();
        if pruned > 0 {
            debug!(count = pruned, remaining = self.orders.len(), "종료된 주문 정리");
        }
        pruned
    }

    /// 수동으로 체결을 반영합니다.
    pub fn fill(&mut self, order_id: OrderId, quantity: Quantity, price: Price) -> BrokerResult<()> {
        self.apply_fill(order_id, quantity, price, Utc::now())
    }

    /// 바 스냅샷으로 접수된 주문을 매칭합니다. 체결된 주문 수를 반환합니다.
    pub fn process_bars(&mut self, bars: &Bars) -> BrokerResult<usize> {
        let mut candidates: Vec<(DateTime<Utc>, OrderId)> = self
            .orders
            .values()
            .filter(|o| o.is_accepted() || o.is_partially_filled())
            .map(|o| (o.created_at(), o.id()))
            .collect();
        candidates.sort();

        let mut filled = 0;
        for (_, order_id) in candidates {
            let Some(order) = self.orders.get_mut(&order_id) else {
                continue;
            };
            let Some(bar) = bars.get_bar(order.symbol()) else {
                continue;
            };
            let Some(price) = Self::match_price(order, bar, self.config.slippage_rate) else {
                continue;
            };

            let quantity = order.remaining_quantity();
            self.apply_fill(order_id, quantity, price, bar.datetime)?;
            filled += 1;
        }

        Ok(filled)
    }

    /// 세션 종료: GTC가 아닌 활성 주문을 모두 취소합니다. 취소된 주문 수를 반환합니다.
    pub fn on_session_close(&mut self) -> BrokerResult<usize> {
        let expiring: Vec<OrderId> = self
            .active_orders()
            .into_iter()
            .filter(|o| !o.good_till_canceled())
            .map(|o| o.id())
            .collect();

        for order_id in &expiring {
            if let Some(order) = self.orders.get_mut(order_id) {
                order.cancel()?;
                self.updates.push_back(order.clone());
            }
        }

        if !expiring.is_empty() {
            info!(count = expiring.len(), "세션 종료, 당일 주문 취소");
        }
        Ok(expiring.len())
    }

    fn apply_fill(
        &mut self,
        order_id: OrderId,
        quantity: Quantity,
        price: Price,
        timestamp: DateTime<Utc>,
    ) -> BrokerResult<()> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(BrokerError::OrderNotFound(order_id))?;
        if !order.is_active() {
            return Err(BrokerError::OrderNotActive(order_id));
        }

        let commission = quantity * price * self.config.commission_rate;
        order.add_fill(OrderExecutionInfo::new(quantity, price, commission, timestamp))?;
        debug!(
            order_id = %order_id,
            quantity = %quantity,
            price = %price,
            commission = %commission,
            state = %order.state(),
            "모의 체결"
        );
        self.updates.push_back(order.clone());
        Ok(())
    }

    /// 바에서 주문이 체결될 가격. 체결되지 않으면 `None`.
    fn match_price(order: &mut Order, bar: &Bar, slippage_rate: Decimal) -> Option<Price> {
        let is_buy = order.is_buy();
        let slipped = |price: Price| {
            let slippage = price * slippage_rate;
            if is_buy {
                price + slippage
            } else {
                price - slippage
            }
        };
        let limit_fill = |limit: Price| {
            let reached = if is_buy { bar.low <= limit } else { bar.high >= limit };
            reached.then_some(limit)
        };
        let stop_triggered = |stop: Price| if is_buy { bar.high >= stop } else { bar.low <= stop };

        match order.order_type() {
            OrderType::Market => {
                let base = if order.is_on_close() { bar.close } else { bar.open };
                Some(slipped(base))
            }
            OrderType::Limit => limit_fill(order.limit_price()?),
            OrderType::Stop => {
                let stop = order.stop_price()?;
                stop_triggered(stop).then(|| slipped(stop))
            }
            OrderType::StopLimit => {
                if !order.stop_hit() {
                    if !stop_triggered(order.stop_price()?) {
                        return None;
                    }
                    order.set_stop_hit(true);
                }
                limit_fill(order.limit_price()?)
            }
        }
    }
}

impl Broker for PaperBroker {
    fn place_order(&mut self, order: &mut Order) -> BrokerResult<()> {
        if order.quantity() <= Decimal::ZERO {
            return Err(BrokerError::OrderRejected(format!(
                "quantity must be positive: {}",
                order.quantity()
            )));
        }

        let missing_price = match order.order_type() {
            OrderType::Market => false,
            OrderType::Limit => order.limit_price().is_none(),
            OrderType::Stop => order.stop_price().is_none(),
            OrderType::StopLimit => order.limit_price().is_none() || order.stop_price().is_none(),
        };
        if missing_price {
            return Err(BrokerError::OrderRejected(format!(
                "{} order {} is missing its price",
                order.order_type(),
                order.id()
            )));
        }

        if self.orders.contains_key(&order.id()) {
            return Err(BrokerError::OrderRejected(format!(
                "order {} already placed",
                order.id()
            )));
        }

        order.submit()?;
        let mut accepted = order.clone();
        accepted.accept()?;

        debug!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            action = %order.action(),
            order_type = %order.order_type(),
            quantity = %order.quantity(),
            "모의 주문 접수"
        );

        self.updates.push_back(accepted.clone());
        self.orders.insert(accepted.id(), accepted);
        Ok(())
    }

    fn cancel_order(&mut self, order: &Order) -> BrokerResult<()> {
        let stored = self
            .orders
            .get_mut(&order.id())
            .ok_or(BrokerError::OrderNotFound(order.id()))?;
        if !stored.is_active() {
            return Err(BrokerError::OrderNotActive(order.id()));
        }

        stored.cancel()?;
        debug!(order_id = %order.id(), "모의 주문 취소");
        self.updates.push_back(stored.clone());
        Ok(())
    }
}
