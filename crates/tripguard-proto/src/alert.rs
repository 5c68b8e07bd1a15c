use serde::{Deserialize, Serialize};

use crate::deviation::PathDeviation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ActionKind {
    Dismiss,
    Call(String),
    OpenUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
    pub label: String,
    pub kind: ActionKind,
}

impl AlertAction {
    pub fn dismiss(label: &str) -> Self {
        Self { label: label.to_string(), kind: ActionKind::Dismiss }
    }
}

/// Payload handed to the user-alerting capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub actions: Vec<AlertAction>,
    pub cancelable: bool,
    /// Trusted contacts this alert is forwarded to (empty for local warnings).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
}

impl Alert {
    pub fn simple(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            actions: vec![AlertAction::dismiss("OK")],
            cancelable: false,
            recipients: Vec::new(),
        }
    }

    pub fn deviation(d: &PathDeviation) -> Self {
        Self {
            title: "Warning!".to_string(),
            message: format!("You are {}m off the recommended path. {}.", d.rounded_m(), d.reason),
            actions: vec![AlertAction::dismiss("OK")],
            cancelable: true,
            recipients: Vec::new(),
        }
    }

    pub fn sos(lat: f64, lon: f64, emergency_number: &str, recipients: Vec<String>) -> Self {
        let message = format!(
            "Your current coordinates:\n\nLatitude: {:.5}\nLongitude: {:.5}\n\nSending alert to your trusted contacts...",
            lat, lon
        );
        Self {
            title: "SOS Activated".to_string(),
            message,
            actions: vec![
                AlertAction {
                    label: format!("Call {}", emergency_number),
                    kind: ActionKind::Call(emergency_number.to_string()),
                },
                AlertAction {
                    label: "View Location".to_string(),
                    kind: ActionKind::OpenUrl(maps_url(lat, lon)),
                },
                AlertAction::dismiss("Cancel"),
            ],
            cancelable: true,
            recipients,
        }
    }
}

pub fn maps_url(lat: f64, lon: f64) -> String {
    format!("https://www.google.com/maps?q={},{}", lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deviation::DangerLevel;

    #[test]
    fn deviation_message_rounds_distance() {
        let d = PathDeviation {
            distance_m: 149.7,
            danger_level: DangerLevel::High,
            reason: "Significantly off the recommended route".into(),
        };
        let a = Alert::deviation(&d);
        assert_eq!(a.title, "Warning!");
        assert_eq!(
            a.message,
            "You are 150m off the recommended path. Significantly off the recommended route."
        );
        assert!(a.cancelable);
        assert_eq!(a.actions, vec![AlertAction::dismiss("OK")]);
    }

    #[test]
    fn sos_carries_coordinates_and_actions() {
        let a = Alert::sos(47.3769, 8.541694, "112", vec!["Ana".into()]);
        assert!(a.message.contains("Latitude: 47.37690"));
        assert!(a.message.contains("Longitude: 8.54169"));
        assert_eq!(a.actions[0].kind, ActionKind::Call("112".into()));
        assert_eq!(
            a.actions[1].kind,
            ActionKind::OpenUrl("https://www.google.com/maps?q=47.3769,8.541694".into())
        );
        assert_eq!(a.recipients, vec!["Ana".to_string()]);
    }

    #[test]
    fn local_alert_omits_recipients_on_the_wire() {
        let json = serde_json::to_string(&Alert::simple("Error", "boom")).unwrap();
        assert!(!json.contains("recipients"));
    }
}
