//! 수익률/손익 계산기.
//!
//! 매수/매도 체결(수량, 가격, 수수료)을 누적하고 주어진 가격 기준으로
//! 수익률과 순손익을 계산한다. 가중 평균 원가 방식이므로 같은 방향의 체결이라면
//! 체결 순서와 무관하게 같은 결과를 낸다.
//!
//! - 순손익 = 현금 흐름 + 보유 수량 × 가격 - (수수료)
//! - 수익률 = 순손익 / 원가 기준 (원가 기준이 0이면 0)

use position_core::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 계산기 에러 타입.
#[derive(Debug, Error)]
pub enum PositionTrackerError {
    #[error("Invalid trade quantity: {0} (must be positive)")]
    InvalidQuantity(Decimal),
}

/// 포지션 하나의 체결 이력을 누적하는 계산기.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTracker {
    /// 부호 있는 보유 수량 (양수 = 롱, 음수 = 숏)
    shares: Quantity,
    /// 누적 현금 흐름 (매수는 음수, 매도는 양수)
    cash: Decimal,
    /// 누적 수수료
    commissions: Decimal,
    /// 노출을 늘린 체결의 누적 금액
    cost_basis: Decimal,
    /// 롱이면 주당 평균 매수가, 숏이면 주당 평균 매도가
    cost_per_share: Price,
}

impl PositionTracker {
    /// 빈 계산기를 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shares(&self) -> Quantity {
        self.shares
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn commissions(&self) -> Decimal {
        self.commissions
    }

    pub fn cost_basis(&self) -> Decimal {
        self.cost_basis
    }

    pub fn cost_per_share(&self) -> Price {
        self.cost_per_share
    }

    /// 매수 체결을 기록한다.
    pub fn buy(
        &mut self,
        quantity: Quantity,
        price: Price,
        commission: Decimal,
    ) -> Result<(), PositionTrackerError> {
        Self::validate(quantity)?;
        self.apply_trade(quantity, price, commission);
        Ok(())
    }

    /// 매도 체결을 기록한다.
    pub fn sell(
        &mut self,
        quantity: Quantity,
        price: Price,
        commission: Decimal,
    ) -> Result<(), PositionTrackerError> {
        Self::validate(quantity)?;
        self.apply_trade(-quantity, price, commission);
        Ok(())
    }

    /// 남은 수량을 `price`로 평가한 순손익.
    pub fn get_net_profit(&self, price: Price, include_commissions: bool) -> Decimal {
        let mut ret = self.cash + self.shares * price;
        if include_commissions {
            ret -= self.commissions;
        }
        ret
    }

    /// 원가 기준 대비 수익률.
    pub fn get_return(&self, price: Price, include_commissions: bool) -> Decimal {
        if self.cost_basis.is_zero() {
            return Decimal::ZERO;
        }
        self.get_net_profit(price, include_commissions) / self.cost_basis
    }

    fn validate(quantity: Quantity) -> Result<(), PositionTrackerError> {
        if quantity <= Decimal::ZERO {
            return Err(PositionTrackerError::InvalidQuantity(quantity));
        }
        Ok(())
    }

    /// `signed_quantity`는 매수면 양수, 매도면 음수.
    fn apply_trade(&mut self, signed_quantity: Quantity, price: Price, commission: Decimal) {
        let prev = self.shares;
        let next = prev + signed_quantity;
        let extends = prev.is_zero() || prev.is_sign_positive() == signed_quantity.is_sign_positive();
        let flips = !extends && !next.is_zero() && next.is_sign_positive() != prev.is_sign_positive();

        if extends {
            self.cost_basis += signed_quantity.abs() * price;
            self.cost_per_share = (prev.abs() * self.cost_per_share + signed_quantity.abs() * price)
                / next.abs();
        } else if flips {
            // 0을 넘어선 부분만 새 노출이다
            self.cost_basis += next.abs() * price;
            self.cost_per_share = price;
        } else if next.is_zero() {
            self.cost_per_share = Decimal::ZERO;
        }

        self.cash -= signed_quantity * price;
        self.shares = next;
        self.commissions += commission;
    }
}
