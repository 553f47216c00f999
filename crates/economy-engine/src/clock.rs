//! 时钟与本地日历
//!
//! "今天""昨天"按配置的 UTC 偏移计算本地自然日，而不是按 24 小时滑动窗口。
//! 服务层通过 `Clock` 取当前时间，测试注入 `ManualClock` 控制跨天场景。

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use parking_lot::Mutex;

/// 时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 可手动拨动的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// 本地日历
#[derive(Debug, Clone, Copy)]
pub struct LocalCalendar {
    offset: FixedOffset,
}

impl Default for LocalCalendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl LocalCalendar {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// 以分钟为单位的 UTC 偏移构造，超出 ±24h 时退回 UTC
    pub fn from_offset_minutes(minutes: i32) -> Self {
        FixedOffset::east_opt(minutes.saturating_mul(60))
            .map(|offset| Self { offset })
            .unwrap_or_else(Self::utc)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 给定时刻所在的本地日期
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// 本地日期零点对应的 UTC 时刻
    pub fn start_of_day_utc(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(chrono::NaiveTime::MIN);
        (local_midnight - Duration::seconds(i64::from(self.offset.local_minus_utc())))
            .and_utc()
    }
}
