//! # Position Core
//!
//! 방향성 포지션 추적에 필요한 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 포지션 엔진 전반에서 사용되는 기본 타입을 제공합니다:
//! - 주문 엔티티와 주문 상태 머신
//! - 바(bar) 및 바 스냅샷
//! - 심볼 및 Decimal 기반 가격/수량 타입
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
