use std::time::Duration;

use checker_core::config::parse_duration;
use checker_core::{CheckerError, CheckerResult};
use checker_domain::Checker;

pub const STRATEGY_KEY: &str = "strategy";
pub const INTERVAL_KEY: &str = "interval";

/// 拨测的执行策略，由拨测自身的 `strategy` 配置决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Periodic { interval: Duration },
}

impl Strategy {
    /// 解析拨测的执行策略
    ///
    /// 未声明 `strategy` 时为周期执行；`interval` 未设置时使用 `default_interval`，
    /// 零或无法解析的间隔只影响该拨测。
    pub fn from_checker(checker: &Checker, default_interval: Duration) -> CheckerResult<Self> {
        let strategy = checker
            .config_value(STRATEGY_KEY)
            .map(str::to_ascii_lowercase);

        match strategy.as_deref() {
            None | Some("periodic") => {
                let interval = match checker.config_value(INTERVAL_KEY) {
                    Some(value) => parse_duration(value).map_err(|e| {
                        CheckerError::invalid_checker(checker.id, format!("interval: {e}"))
                    })?,
                    None => default_interval,
                };
                if interval.is_zero() {
                    return Err(CheckerError::invalid_checker(
                        checker.id,
                        "interval must be positive",
                    ));
                }
                Ok(Strategy::Periodic { interval })
            }
            Some(other) => Err(CheckerError::UnsupportedStrategy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(30);

    #[test]
    fn test_default_is_periodic_with_default_interval() {
        let checker = Checker::new(1, "a", "http");
        assert_eq!(
            Strategy::from_checker(&checker, DEFAULT).unwrap(),
            Strategy::Periodic { interval: DEFAULT }
        );
    }

    #[test]
    fn test_explicit_interval() {
        let checker = Checker::new(1, "a", "http")
            .with_config("strategy", "Periodic")
            .with_config("interval", "1m30s");
        assert_eq!(
            Strategy::from_checker(&checker, DEFAULT).unwrap(),
            Strategy::Periodic {
                interval: Duration::from_secs(90)
            }
        );
    }

    #[test]
    fn test_invalid_intervals_are_checker_errors() {
        for value in ["0s", "soon", "-5s"] {
            let checker = Checker::new(9, "a", "http").with_config("interval", value);
            let err = Strategy::from_checker(&checker, DEFAULT).unwrap_err();
            assert!(
                matches!(err, CheckerError::InvalidChecker { id: 9, .. }),
                "{value}: {err}"
            );
        }
    }

    #[test]
    fn test_cron_is_unsupported() {
        let checker = Checker::new(1, "a", "http").with_config("strategy", "cron");
        let err = Strategy::from_checker(&checker, DEFAULT).unwrap_err();
        assert!(matches!(err, CheckerError::UnsupportedStrategy(ref s) if s == "cron"));
        assert!(err.is_checker_scoped());
    }
}
