//! 포지션 엔진의 핵심 에러 타입.
//!
//! 주문 상태 전이, 입력 검증, 설정 로딩에서 발생하는 에러를 정의합니다.

use crate::domain::{OrderId, OrderState};
use thiserror::Error;

/// 핵심 도메인 에러.
#[derive(Debug, Error)]
pub enum TraderError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 허용되지 않은 주문 상태 전이
    #[error("잘못된 주문 상태 전이 ({order_id}): {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderState,
        to: OrderState,
    },

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 핵심 도메인 작업을 위한 Result 타입.
pub type TraderResult<T> = Result<T, TraderError>;

impl TraderError {
    /// 호출 측 버그(잘못된 상태 전이 등)로 인한 에러인지 확인합니다.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, TraderError::InvalidTransition { .. })
    }
}

impl From<config::ConfigError> for TraderError {
    fn from(err: config::ConfigError) -> Self {
        TraderError::Config(err.to_string())
    }
}
