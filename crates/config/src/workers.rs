#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Upper bound for any single worker count.
pub const MAX_WORKERS: u16 = 1000;

/// Number of configured workers per worker class.
///
/// A class with zero workers never receives checks; the cache falls back
/// to the normal pollers or marks the check unsupported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Workers {
    pub pollers: u16,
    pub unreachable_pollers: u16,
    pub ipmi_pollers: u16,
    pub pingers: u16,
    pub java_pollers: u16,
    pub history_pollers: u16,
    pub odbc_pollers: u16,
    pub http_agent_pollers: u16,
    pub agent_pollers: u16,
    pub snmp_pollers: u16,
    pub internal_pollers: u16,
    pub browser_pollers: u16,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            pollers: 5,
            unreachable_pollers: 1,
            ipmi_pollers: 0,
            pingers: 1,
            java_pollers: 0,
            history_pollers: 5,
            odbc_pollers: 1,
            http_agent_pollers: 1,
            agent_pollers: 1,
            snmp_pollers: 1,
            internal_pollers: 1,
            browser_pollers: 1,
        }
    }
}

impl Workers {
    pub fn clamp(self) -> Self {
        let c = |n: u16| n.min(MAX_WORKERS);
        Self {
            pollers: c(self.pollers),
            unreachable_pollers: c(self.unreachable_pollers),
            ipmi_pollers: c(self.ipmi_pollers),
            pingers: c(self.pingers),
            java_pollers: c(self.java_pollers),
            history_pollers: c(self.history_pollers),
            odbc_pollers: c(self.odbc_pollers),
            http_agent_pollers: c(self.http_agent_pollers),
            agent_pollers: c(self.agent_pollers),
            snmp_pollers: c(self.snmp_pollers),
            internal_pollers: c(self.internal_pollers),
            browser_pollers: c(self.browser_pollers),
        }
    }

    /// Workers with nothing to poll.
    pub fn none() -> Self {
        Self {
            pollers: 0,
            unreachable_pollers: 0,
            ipmi_pollers: 0,
            pingers: 0,
            java_pollers: 0,
            history_pollers: 0,
            odbc_pollers: 0,
            http_agent_pollers: 0,
            agent_pollers: 0,
            snmp_pollers: 0,
            internal_pollers: 0,
            browser_pollers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn clamp_limits_counts(a in any::<u16>(), b in any::<u16>(), c in any::<u16>()) {
            let workers = Workers { pollers: a, pingers: b, snmp_pollers: c, ..Workers::default() }.clamp();
            prop_assert!(workers.pollers <= MAX_WORKERS);
            prop_assert!(workers.pingers <= MAX_WORKERS);
            prop_assert!(workers.snmp_pollers <= MAX_WORKERS);
        }
    }
}
