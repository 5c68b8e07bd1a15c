use serde::Deserialize;
use tracing::{info, warn};
use tripguard_proto::Alert;

use crate::alert::Alerter;
use crate::geo::Coordinate;
use crate::monitor::MonitorError;
use crate::provider::{LocationProvider, Permission};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrustedContact {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SosConfig {
    #[serde(default = "default_emergency_number")]
    pub emergency_number: String,
    #[serde(default)]
    pub contacts: Vec<TrustedContact>,
}

fn default_emergency_number() -> String {
    "911".to_string()
}

impl Default for SosConfig {
    fn default() -> Self {
        Self { emergency_number: default_emergency_number(), contacts: Vec::new() }
    }
}

/// Reports the current position to the trusted contacts.
pub async fn raise_sos<P, A>(provider: &mut P, alerter: &mut A, cfg: &SosConfig) -> Result<Coordinate, MonitorError>
where
    P: LocationProvider,
    A: Alerter,
{
    match provider.request_permission().await {
        Ok(Permission::Granted) => {}
        Ok(Permission::Denied) => {
            warn!("sos: location permission denied");
            alerter.notify(&Alert::simple("Permission denied", "Please enable location permissions to send SOS."));
            return Err(MonitorError::PermissionDenied);
        }
        Err(e) => {
            warn!("sos: {}", e);
            alerter.notify(&Alert::simple("Error", "Unable to retrieve location."));
            return Err(e.into());
        }
    }

    let fix = match provider.current_position().await {
        Ok(fix) => fix,
        Err(e) => {
            warn!("sos: {}", e);
            alerter.notify(&Alert::simple("Error", "Unable to retrieve location."));
            return Err(e.into());
        }
    };

    let recipients: Vec<String> = cfg.contacts.iter().map(|c| c.name.clone()).collect();
    info!(
        "sos: raised at ({:.5}, {:.5}), notifying {} contact(s)",
        fix.coord.lat(),
        fix.coord.lon(),
        recipients.len()
    );
    alerter.notify(&Alert::sos(fix.coord.lat(), fix.coord.lon(), &cfg.emergency_number, recipients));
    Ok(fix.coord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::RecordingAlerter;
    use crate::provider::LocationSample;
    use crate::replay::ReplayProvider;
    use std::time::Duration;
    use time::OffsetDateTime;
    use tripguard_proto::alert::ActionKind;

    fn provider() -> ReplayProvider {
        let c = Coordinate::new(-33.868_82, 151.209_29).unwrap();
        ReplayProvider::new(vec![LocationSample::new(c, None, OffsetDateTime::UNIX_EPOCH)], Duration::ZERO)
    }

    #[tokio::test]
    async fn sos_notifies_contacts_with_position() {
        let cfg = SosConfig {
            emergency_number: "000".into(),
            contacts: vec![TrustedContact { name: "Mia".into(), phone: "+61 400 000 000".into() }],
        };
        let mut alerter = RecordingAlerter::default();
        let at = raise_sos(&mut provider(), &mut alerter, &cfg).await.unwrap();
        assert_eq!(at.lat(), -33.868_82);

        let a = &alerter.alerts[0];
        assert_eq!(a.title, "SOS Activated");
        assert!(a.message.contains("Latitude: -33.86882"));
        assert!(a.message.contains("Longitude: 151.20929"));
        assert_eq!(a.recipients, vec!["Mia".to_string()]);
        assert_eq!(a.actions[0].kind, ActionKind::Call("000".into()));
    }

    #[tokio::test]
    async fn sos_without_permission_alerts_and_fails() {
        let mut p = provider().with_permission(Permission::Denied);
        let mut alerter = RecordingAlerter::default();
        let err = raise_sos(&mut p, &mut alerter, &SosConfig::default()).await.unwrap_err();
        assert!(matches!(err, MonitorError::PermissionDenied));
        assert_eq!(alerter.alerts[0].title, "Permission denied");
    }

    #[tokio::test]
    async fn sos_without_fix_alerts_and_fails() {
        let mut p = ReplayProvider::new(Vec::new(), Duration::ZERO);
        let mut alerter = RecordingAlerter::default();
        assert!(raise_sos(&mut p, &mut alerter, &SosConfig::default()).await.is_err());
        assert_eq!(alerter.alerts[0].message, "Unable to retrieve location.");
    }
}
