//! Generation and validation of client-visible identifiers.
//!
//! - Task ids (a.k.a. report hashes): `[0-9a-z]{20}-[0-9a-zA-Z]{16}`. The
//!   first segment is the creation time in base 36 (zero-padded to 12) plus 8
//!   random base-36 characters; the second is 16 random alphanumerics.
//! - Penguin ids: zero-padded 9-digit decimal strings.

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TIME_WIDTH: usize = 12;
const PREFIX_WIDTH: usize = 20;
const SUFFIX_WIDTH: usize = 16;

/// Render `n` in lowercase base 36.
pub fn base36(mut n: u64) -> String {
  if n == 0 {
    return "0".to_owned();
  }
  let mut digits = Vec::new();
  while n > 0 {
    digits.push(BASE36[(n % 36) as usize]);
    n /= 36;
  }
  digits.reverse();
  String::from_utf8(digits).unwrap_or_default()
}

/// Generate a task id stamped with `now`.
pub fn generate_task_id<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> String {
  let micros = u64::try_from(now.timestamp_micros()).unwrap_or_default();
  let mut prefix = format!("{:0>width$}", base36(micros), width = TIME_WIDTH);
  prefix.truncate(TIME_WIDTH);
  while prefix.len() < PREFIX_WIDTH {
    prefix.push(BASE36[rng.gen_range(0..36)] as char);
  }
  let suffix: String = (0..SUFFIX_WIDTH)
    .map(|_| char::from(rng.sample(Alphanumeric)))
    .collect();
  format!("{prefix}-{suffix}")
}

pub fn is_valid_task_id(s: &str) -> bool {
  let Some((prefix, suffix)) = s.split_once('-') else {
    return false;
  };
  prefix.len() == PREFIX_WIDTH
    && prefix
      .bytes()
      .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
    && suffix.len() == SUFFIX_WIDTH
    && suffix.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Generate a random zero-padded 9-digit penguin id.
pub fn generate_penguin_id<R: Rng>(rng: &mut R) -> String {
  format!("{:09}", rng.gen_range(0..1_000_000_000u32))
}

pub fn is_valid_penguin_id(s: &str) -> bool {
  s.len() == 9 && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn base36_renders_known_values() {
    assert_eq!(base36(0), "0");
    assert_eq!(base36(35), "z");
    assert_eq!(base36(36), "10");
    assert_eq!(base36(1_295), "zz");
  }

  #[test]
  fn task_ids_match_the_client_contract() {
    let mut rng = rand::thread_rng();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    for _ in 0..100 {
      let id = generate_task_id(now, &mut rng);
      assert!(is_valid_task_id(&id), "bad task id {id}");
    }
  }

  #[test]
  fn task_ids_sort_by_creation_time() {
    let mut rng = rand::thread_rng();
    let a = generate_task_id(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(), &mut rng);
    let b = generate_task_id(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(), &mut rng);
    assert!(a[..12] < b[..12]);
  }

  #[test]
  fn malformed_task_ids_are_rejected() {
    assert!(!is_valid_task_id("abc"));
    assert!(!is_valid_task_id("ABCDEFGHIJKLMNOPQRST-0123456789abcdef"));
    assert!(!is_valid_task_id("0123456789abcdefghij-0123456789abcde"));
  }

  #[test]
  fn penguin_ids_are_nine_digits() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
      assert!(is_valid_penguin_id(&generate_penguin_id(&mut rng)));
    }
    assert!(!is_valid_penguin_id("12345678"));
    assert!(!is_valid_penguin_id("12345678a"));
  }
}
