//! 通用工具函数

use crate::models::RecordId;
use chrono::{Local, NaiveDate, Utc};

/// 本地时钟的当前日期
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// ISO 日历日期 `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// 解析 ISO 日历日期
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// 本地记录标识符生成器
///
/// 以毫秒时间戳为基础，同一毫秒内连续生成时顺延，保证严格递增。
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有标识符之后继续生成
    pub fn observe(&mut self, id: &RecordId) {
        if let Ok(value) = id.as_str().parse::<i64>() {
            self.last = self.last.max(value);
        }
    }

    /// 下一个标识符，已用尽 `i64` 范围时返回 `None`
    pub fn next_id(&mut self) -> Option<RecordId> {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last.checked_add(1)?);
        Some(RecordId::from(self.last))
    }
}
