//! 포지션 에러 타입.

use position_core::{OrderId, Symbol, TraderError};
use thiserror::Error;

use crate::broker::BrokerError;
use crate::position_tracker::PositionTrackerError;

/// 포지션 작업 에러.
#[derive(Debug, Error)]
pub enum PositionError {
    /// 호출 측 버그로 인한 불변식 위반
    #[error("Position invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Exit order is still active; cancel it first")]
    ExitOrderActive,

    #[error("Position not opened yet")]
    NotOpened,

    #[error("Position not closed yet")]
    NotClosed,

    #[error("Position already closed")]
    AlreadyClosed,

    #[error("Order not tracked by this position: {0}")]
    UnknownOrder(OrderId),

    #[error("No price available for {0}")]
    PriceUnavailable(Symbol),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Order error: {0}")]
    Order(#[from] TraderError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] PositionTrackerError),
}

/// 포지션 작업을 위한 Result 타입.
pub type PositionResult<T> = Result<T, PositionError>;

impl PositionError {
    /// 프로그래밍 에러(불변식 위반)인지 확인합니다.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, PositionError::InvariantViolation(_))
    }

    /// 호출 순서가 잘못되어 발생한, 복구 가능한 에러인지 확인합니다.
    pub fn is_sequencing_error(&self) -> bool {
        matches!(
            self,
            PositionError::ExitOrderActive
                | PositionError::NotOpened
                | PositionError::NotClosed
                | PositionError::AlreadyClosed
        )
    }
}
