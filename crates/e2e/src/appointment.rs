//! Appointment booking through the application's REST API
//!
//! Some admission cases need an existing appointment. When the bound row
//! asks for one, the scenario books it up front and publishes the returned
//! identifiers into the data bag for later steps.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::fixture::BoundRow;

/// Fixture flag that requests an appointment (spelling as in the datasets)
pub const APPOINTMENT_FLAG: &str = "isAppoitnment";

/// Payload sent to the appointment API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    pub patient_name: String,
    pub id_type: String,
    pub id_number: String,
    pub discipline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor: Option<String>,
}

impl AppointmentRequest {
    /// Build the request from an admission fixture row
    pub fn from_row(row: &BoundRow) -> E2eResult<Self> {
        Ok(Self {
            patient_name: row.text("patientName")?,
            id_type: row.text("idType")?,
            id_number: row.text("idNumber")?,
            discipline: row.text("discipline")?,
            doctor: row.optional_text("doctor"),
        })
    }
}

/// Identifiers returned by the appointment API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub ic_no: String,
    pub appointment_id: String,
    #[serde(default)]
    pub mrn: Option<String>,
    #[serde(default)]
    pub visit_id: Option<String>,
}

impl Appointment {
    /// Data bag entries published for later steps
    pub fn bag_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            ("icNo", self.ic_no.clone()),
            ("appointmentId", self.appointment_id.clone()),
        ];
        if let Some(mrn) = &self.mrn {
            entries.push(("mrn", mrn.clone()));
        }
        if let Some(visit) = &self.visit_id {
            entries.push(("visitId", visit.clone()));
        }
        entries
    }
}

#[async_trait]
pub trait AppointmentBooker: Send + Sync {
    async fn book(&self, request: &AppointmentRequest) -> E2eResult<Appointment>;
}

/// Books appointments over HTTP
pub struct HttpAppointmentBooker {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
}

impl HttpAppointmentBooker {
    pub fn new(api_base_url: &str, username: &str, password: &str) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/appointments", api_base_url.trim_end_matches('/')),
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[async_trait]
impl AppointmentBooker for HttpAppointmentBooker {
    async fn book(&self, request: &AppointmentRequest) -> E2eResult<Appointment> {
        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(E2eError::Appointment(format!("{} returned {}: {}", self.endpoint, status, body)));
        }

        let appointment: Appointment = resp.json().await?;
        info!(
            "Booked appointment {} for {}",
            appointment.appointment_id, request.patient_name
        );
        Ok(appointment)
    }
}

/// Returns a fixed appointment; used for dry runs
#[derive(Debug, Clone)]
pub struct StaticBooker {
    appointment: Appointment,
}

impl StaticBooker {
    pub fn new(appointment: Appointment) -> Self {
        Self { appointment }
    }
}

impl Default for StaticBooker {
    fn default() -> Self {
        Self::new(Appointment {
            ic_no: "DRYRUN-IC-0001".into(),
            appointment_id: "DRYRUN-APT-0001".into(),
            mrn: None,
            visit_id: None,
        })
    }
}

#[async_trait]
impl AppointmentBooker for StaticBooker {
    async fn book(&self, _request: &AppointmentRequest) -> E2eResult<Appointment> {
        Ok(self.appointment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureRow;
    use serde_json::json;

    fn row(value: serde_json::Value) -> BoundRow {
        BoundRow {
            dataset: "dt_requestForAdmission".into(),
            index: 0,
            row: FixtureRow(value.as_object().unwrap().clone()),
        }
    }

    #[test]
    fn test_request_from_row() {
        let row = row(json!({
            "patientName": "Siti Aminah",
            "idType": "NRIC",
            "idNumber": "900101-14-5566",
            "discipline": "General Medicine"
        }));
        let request = AppointmentRequest::from_row(&row).unwrap();
        assert_eq!(request.id_number, "900101-14-5566");
        assert!(request.doctor.is_none());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["patientName"], "Siti Aminah");
        assert!(json.get("doctor").is_none());
    }

    #[test]
    fn test_request_requires_fields() {
        let row = row(json!({ "patientName": "X" }));
        assert!(matches!(
            AppointmentRequest::from_row(&row),
            Err(E2eError::MissingField { .. })
        ));
    }

    #[test]
    fn test_bag_entries() {
        let appointment: Appointment =
            serde_json::from_str(r#"{"icNo":"IC1","appointmentId":"A1","visitId":"V9"}"#).unwrap();
        let keys: Vec<_> = appointment.bag_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["icNo", "appointmentId", "visitId"]);
    }
}
