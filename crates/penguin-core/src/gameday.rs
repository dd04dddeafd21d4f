//! Per-server business calendar.
//!
//! A game day starts at 04:00 local time. Trend buckets and "today" style
//! statistics align to this boundary rather than to UTC midnight.

use chrono::{DateTime, Utc};

use crate::model::Server;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR_MS: i64 = 60 * 60 * 1000;
const RESET_HOUR: i64 = 4;

/// Floor `t` to the most recent 04:00 in `server`'s local time.
pub fn game_day_start(server: Server, t: DateTime<Utc>) -> DateTime<Utc> {
  let offset_ms = server.utc_offset_hours() * HOUR_MS;
  let shifted = t.timestamp_millis() + offset_ms - RESET_HOUR * HOUR_MS;
  let start = shifted - shifted.rem_euclid(DAY_MS) - offset_ms + RESET_HOUR * HOUR_MS;
  DateTime::from_timestamp_millis(start).unwrap_or(t)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
  }

  #[test]
  fn cn_day_starts_at_2000_utc() {
    // 2023-01-02 03:00 +08:00 is before the reset: previous day.
    assert_eq!(
      game_day_start(Server::Cn, utc(2023, 1, 1, 19, 0)),
      utc(2022, 12, 31, 20, 0)
    );
    // 2023-01-02 05:00 +08:00 is after the reset.
    assert_eq!(
      game_day_start(Server::Cn, utc(2023, 1, 1, 21, 0)),
      utc(2023, 1, 1, 20, 0)
    );
  }

  #[test]
  fn us_day_starts_at_1100_utc() {
    assert_eq!(
      game_day_start(Server::Us, utc(2023, 6, 1, 10, 59)),
      utc(2023, 5, 31, 11, 0)
    );
    assert_eq!(
      game_day_start(Server::Us, utc(2023, 6, 1, 11, 0)),
      utc(2023, 6, 1, 11, 0)
    );
  }

  #[test]
  fn jp_and_kr_share_a_boundary() {
    let t = utc(2023, 3, 3, 12, 34);
    assert_eq!(game_day_start(Server::Jp, t), game_day_start(Server::Kr, t));
    assert_eq!(game_day_start(Server::Jp, t), utc(2023, 3, 2, 19, 0));
  }
}
