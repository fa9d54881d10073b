//! 포지션 엔진의 도메인 모델.

mod market_data;
mod order;

pub use market_data::*;
pub use order::*;
