use tripguard_proto::Alert;

/// User-alerting capability.
pub trait Alerter {
    fn notify(&mut self, alert: &Alert);
}

impl<A: Alerter + ?Sized> Alerter for &mut A {
    fn notify(&mut self, alert: &Alert) {
        (**self).notify(alert)
    }
}

impl<A: Alerter + ?Sized> Alerter for Box<A> {
    fn notify(&mut self, alert: &Alert) {
        (**self).notify(alert)
    }
}

/// Keeps every alert; handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingAlerter {
    pub alerts: Vec<Alert>,
}

impl Alerter for RecordingAlerter {
    fn notify(&mut self, alert: &Alert) {
        self.alerts.push(alert.clone());
    }
}
