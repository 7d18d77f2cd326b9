/*!
 * Utility functions and helpers for PacFlow.
 */
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Create a task that runs in the background and logs any errors
///
/// # Arguments
///
/// * `name` - A name for the task (for logging)
/// * `fut` - The future to run
pub fn spawn_and_log<F, T, E>(name: &str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let task_name = name.to_string();
    tokio::spawn(async move {
        match fut.await {
            Ok(_) => {
                debug!("Task '{}' completed successfully", task_name);
            }
            Err(e) => {
                warn!("Task '{}' failed: {}", task_name, e);
            }
        }
    })
}

/// Convert a Duration to milliseconds, saturating at `u64::MAX`
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Convert fractional seconds to a Duration
///
/// Negative, zero and non-finite inputs yield `None`.
pub fn secs_f64_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_millis() {
        assert_eq!(duration_to_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_secs_f64_to_duration() {
        assert_eq!(secs_f64_to_duration(0.5), Some(Duration::from_millis(500)));
        assert_eq!(secs_f64_to_duration(0.0), None);
        assert_eq!(secs_f64_to_duration(-1.0), None);
        assert_eq!(secs_f64_to_duration(f64::NAN), None);
    }

    #[test_log::test(tokio::test)]
    async fn test_spawn_and_log() {
        let handle = spawn_and_log("ok", async { Ok::<_, String>(1) });
        tokio_test::assert_ok!(handle.await);
        let handle = spawn_and_log("fail", async { Err::<(), _>("boom".to_string()) });
        tokio_test::assert_ok!(handle.await);
    }
}
