use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn create_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// Milliseconds elapsed since an earlier `create_timestamp()` value.
/// Clamps to zero if the clock moved backwards.
pub fn millis_since(earlier: u64) -> u64 {
    create_timestamp().saturating_sub(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_since() {
        let now = create_timestamp();
        assert_eq!(millis_since(now + 10_000), 0);
        assert!(millis_since(now) < 1_000);
    }
}
