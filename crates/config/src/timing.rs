#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timing {
    /// How often the configuration cache is synchronized with its source.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub sync_interval: Duration,

    /// Network timeout used for interface retry suppression.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub timeout: Duration,

    /// How long an interface may keep failing before it is unavailable.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub unreachable_period: Duration,

    /// Retry delay while an interface is unreachable.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub unreachable_delay: Duration,

    /// Retry delay once an interface is unavailable.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub unavailable_delay: Duration,

    /// How often passive proxies are sent configuration.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub proxy_config_frequency: Duration,

    /// How often passive proxies are polled for data.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub proxy_data_frequency: Duration,

    /// How often passive proxies are polled for tasks.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub proxy_tasks_frequency: Duration,

    /// Minimum age of the aggregate statistics before they are recomputed.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub status_interval: Duration,

    /// Re-evaluation period of time-based trigger functions.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub timer_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(3),
            unreachable_period: Duration::from_secs(45),
            unreachable_delay: Duration::from_secs(15),
            unavailable_delay: Duration::from_secs(60),
            proxy_config_frequency: Duration::from_secs(10),
            proxy_data_frequency: Duration::from_secs(1),
            proxy_tasks_frequency: Duration::from_secs(1),
            status_interval: Duration::from_secs(60),
            timer_interval: Duration::from_secs(30),
        }
    }
}

impl Timing {
    /// Replace zero durations that would turn scheduling into a busy loop.
    pub fn clamp(self) -> Self {
        let at_least = |d: Duration, min: u64| d.max(Duration::from_secs(min));
        Self {
            sync_interval: at_least(self.sync_interval, 1),
            timeout: at_least(self.timeout, 1),
            unreachable_period: at_least(self.unreachable_period, 1),
            unreachable_delay: at_least(self.unreachable_delay, 1),
            unavailable_delay: at_least(self.unavailable_delay, 1),
            proxy_config_frequency: at_least(self.proxy_config_frequency, 1),
            proxy_data_frequency: at_least(self.proxy_data_frequency, 1),
            proxy_tasks_frequency: at_least(self.proxy_tasks_frequency, 1),
            status_interval: self.status_interval,
            timer_interval: at_least(self.timer_interval, 1),
        }
    }
}
