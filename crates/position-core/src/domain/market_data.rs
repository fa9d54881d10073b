//! 시장 데이터 타입.
//!
//! - `Bar` - 한 종목의 OHLCV 바
//! - `Bars` - 같은 시각의 종목별 바 스냅샷

use crate::types::{Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OHLCV 바.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// 거래 종목
    pub symbol: Symbol,
    /// 바 시각
    pub datetime: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    pub volume: Quantity,
    /// 세션 종료까지 남은 바 개수 (알 수 없으면 None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bars_till_session_close: Option<u32>,
}

impl Bar {
    /// 새 바를 생성합니다.
    pub fn new(
        symbol: Symbol,
        datetime: DateTime<Utc>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            symbol,
            datetime,
            open,
            high,
            low,
            close,
            volume,
            bars_till_session_close: None,
        }
    }

    /// 세션 종료까지 남은 바 개수를 설정합니다.
    pub fn with_bars_till_session_close(mut self, bars: u32) -> Self {
        self.bars_till_session_close = Some(bars);
        self
    }

    pub fn bars_till_session_close(&self) -> Option<u32> {
        self.bars_till_session_close
    }

    /// 세션의 마지막 직전 바인지 확인합니다.
    pub fn is_penultimate_of_session(&self) -> bool {
        self.bars_till_session_close == Some(1)
    }
}

/// 한 시각의 종목별 바 스냅샷.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bars {
    bars: HashMap<Symbol, Bar>,
}

impl Bars {
    /// 바 목록으로 스냅샷을 생성합니다. 같은 종목이 여러 번 나오면 마지막 바가 남습니다.
    pub fn new(bars: impl IntoIterator<Item = Bar>) -> Self {
        Self {
            bars: bars.into_iter().map(|bar| (bar.symbol.clone(), bar)).collect(),
        }
    }

    /// 종목의 바를 반환합니다.
    pub fn get_bar(&self, symbol: &Symbol) -> Option<&Bar> {
        self.bars.get(symbol)
    }

    /// 스냅샷에 포함된 종목들.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.bars.keys()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
