//! 종목(instrument) 식별 타입.
//!
//! - `MarketType` - 시장 유형
//! - `Symbol` - 포지션과 주문이 참조하는 거래 종목

use serde::{Deserialize, Serialize};
use std::fmt;

/// 시장 유형 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    /// 주식
    Stock,
    /// 암호화폐 현물
    Crypto,
    /// 선물/파생상품
    Futures,
    /// 외환
    Forex,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Stock => write!(f, "stock"),
            MarketType::Crypto => write!(f, "crypto"),
            MarketType::Futures => write!(f, "futures"),
            MarketType::Forex => write!(f, "forex"),
        }
    }
}

/// 거래 종목.
///
/// 기준 자산, 호가 자산, 시장 유형으로 구성됩니다.
/// 예: 주식의 AAPL/USD, 암호화폐의 BTC/USDT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// 기준 자산 (예: AAPL, BTC)
    pub base: String,
    /// 호가 자산 (예: USD, USDT)
    pub quote: String,
    /// 시장 유형
    pub market_type: MarketType,
}

impl Symbol {
    /// 새 심볼을 생성합니다. 자산 이름은 대문자로 정규화됩니다.
    pub fn new(base: impl Into<String>, quote: impl Into<String>, market_type: MarketType) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
            market_type,
        }
    }

    /// 주식 심볼을 생성합니다.
    pub fn stock(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self::new(base, quote, MarketType::Stock)
    }

    /// 암호화폐 심볼을 생성합니다.
    pub fn crypto(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self::new(base, quote, MarketType::Crypto)
    }

    /// "BASE/QUOTE" 형식 문자열에서 심볼을 파싱합니다.
    pub fn from_string(s: &str, market_type: MarketType) -> Option<Self> {
        match s.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Some(Self::new(base, quote, market_type))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
