#![forbid(unsafe_code)]

//! Availability state machine of interfaces.
//!
//! The first network error starts an error streak and suppresses retries for
//! the unreachable delay. Errors continuing past the unreachable period mark
//! the interface unavailable and suppress retries for the unavailable delay.
//! Any successful contact resets the streak.

use super::seconds;
use crate::Error;
use crate::data::ConfigData;
use crate::domain::Availability;
use crate::notify::Notification;
use tracing::{debug, warn};

/// Availability of an interface after a change, as sent to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityDiff {
    pub interfaceid: u64,
    pub hostid: u64,
    pub available: Availability,
    pub error: String,
    pub errors_from: i64,
    pub disable_until: i64,
}

/// Result of contacting an interface, reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceOutcome {
    Reached,
    Failed { error: String },
}

fn publish(data: &mut ConfigData, interfaceid: u64) -> Option<AvailabilityDiff> {
    let interface = data.interfaces.get(interfaceid)?;
    let availability = &interface.availability;
    let diff = AvailabilityDiff {
        interfaceid,
        hostid: interface.hostid,
        available: availability.available,
        error: availability.error.to_string(),
        errors_from: availability.errors_from,
        disable_until: availability.disable_until,
    };
    data.notifications
        .push(Notification::Availability(diff.clone()));
    Some(diff)
}

/// Reset the error streak of an interface that answered.
pub(crate) fn activate_interface(
    data: &mut ConfigData,
    interfaceid: u64,
) -> Result<Option<AvailabilityDiff>, Error> {
    let Some(interface) = data.interfaces.get_mut(interfaceid) else {
        return Ok(None);
    };
    let address = interface.address().to_owned();
    let availability = &mut interface.availability;
    let unchanged = availability.available == Availability::Available
        && availability.errors_from == 0
        && availability.disable_until == 0
        && availability.error.is_empty();
    if unchanged {
        return Ok(None);
    }
    if availability.available == Availability::Unavailable {
        warn!(interfaceid, address, "interface is available again");
    }
    availability.available = Availability::Available;
    availability.errors_from = 0;
    availability.disable_until = 0;
    data.strpool.replace_opt(true, &mut availability.error, "")?;
    Ok(publish(data, interfaceid))
}

/// Record a network error on an interface.
pub(crate) fn deactivate_interface(
    data: &mut ConfigData,
    interfaceid: u64,
    now: i64,
    error: &str,
) -> Result<Option<AvailabilityDiff>, Error> {
    let timing = &data.options.timing;
    let unreachable_period = seconds(timing.unreachable_period);
    let unreachable_delay = seconds(timing.unreachable_delay);
    let unavailable_delay = seconds(timing.unavailable_delay);

    let Some(interface) = data.interfaces.get_mut(interfaceid) else {
        return Ok(None);
    };
    let address = interface.address().to_owned();
    let availability = &mut interface.availability;
    if availability.disable_until > now {
        // another check on the interface already reported this streak
        return Ok(None);
    }

    if availability.errors_from == 0 {
        availability.errors_from = now;
        availability.disable_until = now.saturating_add(unreachable_delay);
        debug!(interfaceid, address, error, "interface became unreachable");
    } else if now - availability.errors_from <= unreachable_period {
        availability.disable_until = now.saturating_add(unreachable_delay);
    } else {
        if availability.available != Availability::Unavailable {
            warn!(interfaceid, address, error, "interface became unavailable");
        }
        availability.available = Availability::Unavailable;
        availability.disable_until = now.saturating_add(unavailable_delay);
    }
    data.strpool.replace_opt(true, &mut availability.error, error)?;
    Ok(publish(data, interfaceid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CacheOptions;
    use crate::domain::Interface;
    use std::time::Duration;

    fn data() -> ConfigData {
        let options = CacheOptions {
            timing: config::Timing {
                unreachable_period: Duration::from_secs(45),
                unreachable_delay: Duration::from_secs(15),
                unavailable_delay: Duration::from_secs(60),
                ..config::Timing::default()
            },
            ..CacheOptions::default()
        };
        let mut data = ConfigData::new(&config::Cache::default(), options);
        let (interface, _) = data
            .interfaces
            .insert_with(1, || Interface::new(1))
            .unwrap();
        interface.hostid = 10;
        data
    }

    #[test]
    fn error_streak_ends_unavailable() {
        let mut data = data();

        let diff = deactivate_interface(&mut data, 1, 1000, "timeout").unwrap().unwrap();
        assert_eq!(diff.errors_from, 1000);
        assert_eq!(diff.disable_until, 1015);
        assert_eq!(diff.available, Availability::Unknown);

        // suppressed until disable_until
        assert!(deactivate_interface(&mut data, 1, 1010, "timeout").unwrap().is_none());

        let diff = deactivate_interface(&mut data, 1, 1030, "timeout").unwrap().unwrap();
        assert_eq!(diff.disable_until, 1045);
        assert_eq!(diff.available, Availability::Unknown);

        let diff = deactivate_interface(&mut data, 1, 1050, "timeout").unwrap().unwrap();
        assert_eq!(diff.available, Availability::Unavailable);
        assert_eq!(diff.disable_until, 1110);
        assert_eq!(diff.error, "timeout");
    }

    #[test]
    fn contact_resets_the_streak() {
        let mut data = data();
        deactivate_interface(&mut data, 1, 1000, "refused").unwrap();

        let diff = activate_interface(&mut data, 1).unwrap().unwrap();
        assert_eq!(diff.available, Availability::Available);
        assert_eq!(diff.errors_from, 0);
        assert_eq!(diff.disable_until, 0);
        assert!(diff.error.is_empty());

        assert!(activate_interface(&mut data, 1).unwrap().is_none());
        assert_eq!(data.take_notifications().len(), 2);
    }
}
