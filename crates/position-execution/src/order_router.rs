//! 주문 → 포지션 라우팅.
//!
//! 전략은 포지션이 제출한 주문을 등록해 두고, 브로커가 전달한 주문 스냅샷의
//! 소유 포지션을 찾는 데 사용합니다.

use position_core::{Order, OrderId};
use std::collections::HashMap;
use tracing::debug;

use crate::position::PositionId;

/// 주문 ID별 소유 포지션 장부.
#[derive(Debug, Clone, Default)]
pub struct OrderRouter {
    /// 주문 ID -> 포지션 ID
    owners: HashMap<OrderId, PositionId>,
    /// 포지션 ID -> 등록된 주문 ID (등록 순)
    orders_by_position: HashMap<PositionId, Vec<OrderId>>,
}

impl OrderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주문을 포지션에 등록한다. 같은 주문을 다시 등록하면 소유자를 갱신한다.
    pub fn register(&mut self, position_id: PositionId, order: &Order) {
        let order_id = order.id();
        if let Some(previous) = self.owners.insert(order_id, position_id) {
            if previous != position_id {
                self.forget_from_position(previous, order_id);
            } else {
                return;
            }
        }

        self.orders_by_position
            .entry(position_id)
            .or_default()
            .push(order_id);

        debug!(position_id = %position_id, order_id = %order_id, "주문 라우팅 등록");
    }

    /// 주문 스냅샷의 소유 포지션을 찾는다.
    ///
    /// 최종 상태의 주문은 더 이상 갱신되지 않으므로 라우팅 후 장부에서 제거한다.
    pub fn route(&mut self, order: &Order) -> Option<PositionId> {
        let order_id = order.id();
        let position_id = self.owners.get(&order_id).copied()?;

        if !order.is_active() {
            self.owners.remove(&order_id);
            self.forget_from_position(position_id, order_id);
        }

        Some(position_id)
    }

    /// 포지션에 등록된 (아직 최종 상태가 아닌) 주문 ID.
    pub fn orders_for_position(&self, position_id: PositionId) -> Vec<OrderId> {
        self.orders_by_position
            .get(&position_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 등록된 주문 수.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    fn forget_from_position(&mut self, position_id: PositionId, order_id: OrderId) {
        if let Some(ids) = self.orders_by_position.get_mut(&position_id) {
            ids.retain(|id| *id != order_id);
            if ids.is_empty() {
                self.orders_by_position.remove(&position_id);
            }
        }
    }
}
