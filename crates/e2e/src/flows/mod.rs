//! Business flows of the HMS web app and the scenarios that chain them

pub mod admission;
pub mod login;
pub mod registration;

use async_trait::async_trait;
use tracing::info;

use crate::appointment::APPOINTMENT_FLAG;
use crate::error::E2eResult;
use crate::scenario::{Scenario, ScenarioRegistry};
use crate::session::Session;

pub const REGISTRATION_SPEC: &str = "registration.spec";
pub const ADMISSION_SPEC: &str = "admission.spec";

pub struct RegisterNewPatient;

#[async_trait]
impl Scenario for RegisterNewPatient {
    async fn run(&self, session: &mut Session) -> E2eResult<()> {
        session.run_flow(&login::welcome()).await?;
        let flow = registration::new_patient(session.table(registration::TABLE)?);
        session.run_flow(&flow).await?;
        session.run_flow(&login::logout()).await
    }
}

pub struct RegisterExistingPatient;

#[async_trait]
impl Scenario for RegisterExistingPatient {
    async fn run(&self, session: &mut Session) -> E2eResult<()> {
        session.run_flow(&login::welcome()).await?;
        session.run_flow(&registration::existing_patient()).await
    }
}

/// Books the appointment first when the admission row asks for one
async fn request_admission(session: &mut Session) -> E2eResult<()> {
    if session.table(admission::TABLE)?.flag_or(APPOINTMENT_FLAG, false) {
        session.book_appointment(admission::TABLE).await?;
    } else {
        info!("[{}] no appointment requested, skipping booking", session.name());
    }
    session.run_flow(&admission::request_for_admission()).await
}

pub struct CreateRequestForAdmission;

#[async_trait]
impl Scenario for CreateRequestForAdmission {
    async fn run(&self, session: &mut Session) -> E2eResult<()> {
        session.run_flow(&login::welcome()).await?;
        request_admission(session).await
    }
}

pub struct AllocateBed;

#[async_trait]
impl Scenario for AllocateBed {
    async fn run(&self, session: &mut Session) -> E2eResult<()> {
        session.run_flow(&login::welcome()).await?;
        request_admission(session).await?;
        session.run_flow(&admission::allocate_bed()).await
    }
}

pub struct CancelAdmission;

#[async_trait]
impl Scenario for CancelAdmission {
    async fn run(&self, session: &mut Session) -> E2eResult<()> {
        session.run_flow(&login::welcome()).await?;
        request_admission(session).await?;
        session.run_flow(&admission::cancel_admission()).await
    }
}

pub struct DischargePatient;

#[async_trait]
impl Scenario for DischargePatient {
    async fn run(&self, session: &mut Session) -> E2eResult<()> {
        session.run_flow(&login::welcome()).await?;
        request_admission(session).await?;
        session.run_flow(&admission::allocate_bed()).await?;
        session.run_flow(&admission::discharge()).await
    }
}

/// Every scenario shipped with the suite
pub fn builtin_scenarios() -> ScenarioRegistry {
    ScenarioRegistry::new()
        .with(REGISTRATION_SPEC, "Register New Patient", RegisterNewPatient)
        .with(REGISTRATION_SPEC, "Register Existing Patient", RegisterExistingPatient)
        .with(ADMISSION_SPEC, "Create Request For Admission", CreateRequestForAdmission)
        .with(ADMISSION_SPEC, "Allocate Bed", AllocateBed)
        .with(ADMISSION_SPEC, "Cancel Admission", CancelAdmission)
        .with(ADMISSION_SPEC, "Discharge Patient", DischargePatient)
}
