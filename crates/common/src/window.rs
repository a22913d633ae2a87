//! Lookback-window resolution for summarize requests

/// Default lookback when no token is given, in minutes.
pub const DEFAULT_WINDOW_MINUTES: i64 = 180;

/// Resolve a user-supplied window token into minutes of lookback.
///
/// Accepted forms: `<int>h` (hours), `<int>m` (minutes), and `all`, which
/// means the full retention horizon: nothing older is retained, so a larger
/// window could never return more. An absent or malformed token falls back to
/// the 180-minute default; this never fails. The result is clamped to
/// `1..=horizon_minutes`.
pub fn resolve(token: Option<&str>, horizon_minutes: i64) -> i64 {
    let horizon = horizon_minutes.max(1);
    let requested = match token {
        None => DEFAULT_WINDOW_MINUTES,
        Some(raw) => {
            let token = raw.trim().to_ascii_lowercase();
            if token == "all" {
                horizon
            } else if let Some(hours) = token.strip_suffix('h') {
                hours
                    .parse::<i64>()
                    .map(|h| h.saturating_mul(60))
                    .unwrap_or(DEFAULT_WINDOW_MINUTES)
            } else if let Some(minutes) = token.strip_suffix('m') {
                minutes.parse::<i64>().unwrap_or(DEFAULT_WINDOW_MINUTES)
            } else {
                DEFAULT_WINDOW_MINUTES
            }
        }
    };
    requested.clamp(1, horizon)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HORIZON: i64 = 180;

    #[test]
    fn hour_and_minute_tokens_resolve_exactly() {
        assert_eq!(resolve(Some("1h"), HORIZON), 60);
        assert_eq!(resolve(Some("2h"), HORIZON), 120);
        assert_eq!(resolve(Some("3h"), HORIZON), 180);
        assert_eq!(resolve(Some("30m"), HORIZON), 30);
        assert_eq!(resolve(Some("179m"), HORIZON), 179);
        assert_eq!(resolve(Some("1m"), HORIZON), 1);
    }

    #[test]
    fn results_are_clamped_to_the_horizon() {
        assert_eq!(resolve(Some("6h"), HORIZON), 180);
        assert_eq!(resolve(Some("999999m"), HORIZON), 180);
        assert_eq!(resolve(Some("0m"), HORIZON), 1);
        assert_eq!(resolve(Some("-5m"), HORIZON), 1);
    }

    #[test]
    fn absent_token_defaults_to_three_hours() {
        assert_eq!(resolve(None, HORIZON), 180);
    }

    #[test]
    fn all_means_the_full_horizon() {
        assert_eq!(resolve(Some("all"), HORIZON), 180);
        assert_eq!(resolve(Some("ALL"), 120), 120);
    }

    #[test]
    fn malformed_tokens_fall_back_to_the_default() {
        for token in ["abc", "", "5x", "h", "m", "12", "h2", "2.5h", "  "] {
            assert_eq!(resolve(Some(token), HORIZON), 180, "token {:?}", token);
        }
    }

    #[test]
    fn default_is_clamped_when_the_horizon_is_shorter() {
        assert_eq!(resolve(None, 60), 60);
        assert_eq!(resolve(Some("abc"), 60), 60);
        assert_eq!(resolve(Some("45m"), 60), 45);
    }
}
