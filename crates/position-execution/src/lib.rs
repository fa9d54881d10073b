//! # Position Execution
//!
//! 방향성 포지션의 생명주기를 관리합니다.
//!
//! 제공 기능:
//! - 롱/숏 포지션 상태 머신 (진입, 청산, 취소, 세션 종료 청산)
//! - 비동기 체결 통지에 따른 보유 수량 갱신
//! - 실현/미실현 수익률 및 순손익 계산
//! - 브로커/전략 인터페이스와 모의 브로커, 주문 라우터

pub mod broker;
pub mod error;
pub mod order_router;
pub mod paper_broker;
pub mod position;
pub mod position_tracker;
pub mod variant;

pub use broker::{Broker, BrokerError, BrokerResult, OrderKind, PositionStrategy};
pub use error::{PositionError, PositionResult};
pub use order_router::OrderRouter;
pub use paper_broker::PaperBroker;
pub use position::{
    LongPosition, OrderRole, Position, PositionFill, PositionId, PositionSnapshot, ShortPosition,
};
pub use position_tracker::{PositionTracker, PositionTrackerError};
pub use variant::{Direction, Long, PositionVariant, Short};
