/// 时间工具
///
/// - 墙钟时间戳：用于报告中的发送时间
/// - 单调时钟差值：用于延迟与窗口节拍计算（不受系统时间调整影响）

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Length of one rate window
pub const WINDOW: Duration = Duration::from_millis(1000);

/// 当前墙钟时间（Unix毫秒）
#[inline]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Duration in fractional milliseconds
#[inline]
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// 窗口剩余时间；已超时返回 None（不补发）
#[inline]
pub fn remaining_in_window(window_start: Instant) -> Option<Duration> {
    WINDOW.checked_sub(window_start.elapsed()).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_unix_millis_increases() {
        let t1 = unix_millis();
        thread::sleep(Duration::from_millis(2));
        let t2 = unix_millis();
        assert!(t2 > t1, "Wall clock should move forward");
    }

    #[test]
    fn test_as_millis_f64() {
        assert_eq!(as_millis_f64(Duration::from_micros(1500)), 1.5);
        assert_eq!(as_millis_f64(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_remaining_in_window() {
        let start = Instant::now();
        let remaining = remaining_in_window(start).unwrap();
        assert!(remaining <= WINDOW);

        let old = Instant::now() - Duration::from_millis(1500);
        assert!(remaining_in_window(old).is_none());
    }
}
