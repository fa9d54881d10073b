//! 정밀한 금융 계산을 위한 Decimal 타입.

use rust_decimal::Decimal;

/// 가격 타입.
pub type Price = Decimal;

/// 수량 타입. 포지션 보유 수량처럼 부호가 있는 값에도 사용됩니다.
pub type Quantity = Decimal;

/// Decimal 확장 트레이트.
pub trait DecimalExt {
    /// 비율을 퍼센트 문자열로 변환합니다 (예: 0.0525 -> "5.25%").
    fn to_percentage_string(&self) -> String;
}

impl DecimalExt for Decimal {
    fn to_percentage_string(&self) -> String {
        let pct = *self * Decimal::ONE_HUNDRED;
        format!("{:.2}%", pct)
    }
}
