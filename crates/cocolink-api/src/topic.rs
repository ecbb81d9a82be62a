// ── Topic namespace ──
//
// Every envelope travels on a profile-scoped channel. Requests go to
// `…/cmd`, replies arrive on `…/rsp`, unsolicited events on `…/evt`.

use std::fmt;

/// Prefix used by the controller for channels that are not profile-scoped.
pub const PUBLIC: &str = "public";

/// Logical channel an inbound topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SystemEvent,
    SystemResponse,
    ServicesResponse,
    DevicesEvent,
    DevicesResponse,
    DevicesError,
    NotificationEvent,
    NotificationResponse,
    /// Anything the controller sends that we do not act on.
    Other,
}

impl Topic {
    /// Classify an inbound topic relative to the session profile.
    pub fn classify(profile: &str, topic: &str) -> Self {
        let Some((prefix, rest)) = topic.split_once('/') else {
            return Self::Other;
        };
        let public = prefix == PUBLIC;
        if !public && prefix != profile {
            return Self::Other;
        }

        match rest {
            "system/evt" => Self::SystemEvent,
            "system/rsp" => Self::SystemResponse,
            "control/devices.error" => Self::DevicesError,
            "authentication/rsp" if !public => Self::ServicesResponse,
            "control/devices/evt" if !public => Self::DevicesEvent,
            "control/devices/rsp" if !public => Self::DevicesResponse,
            "notification/evt" if !public => Self::NotificationEvent,
            "notification/rsp" if !public => Self::NotificationResponse,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SystemEvent => "system-event",
            Self::SystemResponse => "system-response",
            Self::ServicesResponse => "services-response",
            Self::DevicesEvent => "devices-event",
            Self::DevicesResponse => "devices-response",
            Self::DevicesError => "devices-error",
            Self::NotificationEvent => "notification-event",
            Self::NotificationResponse => "notification-response",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ── Outbound topics ──────────────────────────────────────────────────

/// Wildcard subscription covering every channel of a profile.
pub fn wildcard(profile: &str) -> String {
    format!("{profile}/#")
}

pub fn system_cmd(profile: &str) -> String {
    format!("{profile}/system/cmd")
}

pub fn authentication_cmd(profile: &str) -> String {
    format!("{profile}/authentication/cmd")
}

pub fn devices_cmd(profile: &str) -> String {
    format!("{profile}/control/devices/cmd")
}

pub fn notification_cmd(profile: &str) -> String {
    format!("{profile}/notification/cmd")
}
