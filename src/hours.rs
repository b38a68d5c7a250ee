//! Market-hours predicates.
//!
//! Windows are defined in KST: the domestic session is a plain intraday
//! window, the overseas (US regular session seen from Seoul) window spans
//! midnight. The predicates are pure over `(Weekday, NaiveTime)` so they
//! are testable without touching the clock.

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Weekday};
use chrono_tz::Asia::Seoul;

use crate::types::Segment;

/// Domestic session, KST.
const KR_OPEN: (u32, u32) = (9, 0);
const KR_CLOSE: (u32, u32) = (15, 20);

/// US regular session as seen from Seoul (DST ignored, as the source
/// window was defined).
const OS_OPEN: (u32, u32) = (23, 30);
const OS_CLOSE: (u32, u32) = (6, 0);

fn hm(pair: (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(pair.0, pair.1, 0).expect("static time is valid")
}

/// Whether `segment`'s market is open at the given weekday and KST
/// time-of-day.
pub fn is_open_at(segment: Segment, weekday: Weekday, time: NaiveTime) -> bool {
    match segment {
        Segment::Domestic => {
            weekday_is_trading_day(weekday) && time >= hm(KR_OPEN) && time <= hm(KR_CLOSE)
        }
        Segment::Overseas => {
            // The window spans midnight: the evening half belongs to a
            // weekday session, the morning half is the carry-over of the
            // previous day's session (so Saturday morning still counts,
            // being Friday's close).
            if time >= hm(OS_OPEN) {
                weekday_is_trading_day(weekday)
            } else if time <= hm(OS_CLOSE) {
                weekday_is_trading_day(weekday) || weekday == Weekday::Sat
            } else {
                false
            }
        }
    }
}

/// KST "now".
pub fn now_kst() -> DateTime<chrono_tz::Tz> {
    chrono::Utc::now().with_timezone(&Seoul)
}

/// Whether `segment`'s market is open right now (KST clock).
pub fn is_open_now(segment: Segment) -> bool {
    let now = now_kst();
    is_open_at(segment, now.weekday(), now.time())
}

/// Formatted KST timestamp for log lines ("HH:MM:SS").
pub fn kst_clock() -> String {
    let now = now_kst();
    format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second())
}

fn weekday_is_trading_day(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}
