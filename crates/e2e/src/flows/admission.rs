//! Request for admission, bed allocation, cancellation and discharge

use crate::flow::{Flow, Target, ValueSource};

/// Fixture table used by the admission scenarios
pub const TABLE: &str = "dt_requestForAdmission";

fn field(name: &str) -> ValueSource {
    ValueSource::row(TABLE, name)
}

fn open_patient() -> Flow {
    Flow::new("open-patient")
        .fill("Search patient by ID", "Admission.searchPatient", field("idNumber"))
        .enter("Run search")
        .click(
            "Open patient",
            Target::param("Admission.patientResult", "idNumber", field("idNumber")),
        )
}

pub fn request_for_admission() -> Flow {
    Flow::new("request-for-admission")
        .click("Open admission module", "Menu.admission")
        .click("Create new request", "Admission.newRequest")
        .extend(open_patient())
        .fill("Link booked appointment", "Admission.appointmentRef", ValueSource::bag("appointmentId"))
        .fill("Enter IC number from appointment", "Admission.icNo", ValueSource::bag("icNo"))
        .select("Choose discipline", "Admission.discipline", field("discipline"))
        .click("Open ward dropdown", "Admission.wardDropdown")
        .fill("Filter wards", "Admission.wardSearch", field("ward"))
        .arrow_down("Highlight first ward")
        .enter("Pick ward")
        .fill("Enter admission reason", "Admission.reason", field("admissionReason"))
        .click("Submit request", "Admission.submit")
        .assert_text("Request is pending", "Admission.status", ValueSource::literal("Requested"))
        .capture("Read request number", "Admission.requestNo", "admissionRequestNo")
        .write_back(
            "Record request number in fixture",
            TABLE,
            "admissionRequestNo",
            ValueSource::bag("admissionRequestNo"),
        )
        .reload("Reload admission fixture", TABLE)
        .screenshot("request-for-admission")
}

pub fn allocate_bed() -> Flow {
    Flow::new("allocate-bed")
        .click("Open bed management", "Menu.bedManagement")
        .fill("Search request", "Bed.requestSearch", field("admissionRequestNo"))
        .enter("Run search")
        .click(
            "Open request",
            Target::param("Bed.requestRow", "requestNo", field("admissionRequestNo")),
        )
        .click("Choose bed", Target::param("Bed.bedTile", "bedNo", field("bedNo")))
        .click("Allocate bed", "Bed.allocate")
        .optional("Deposit payment", "Bed.paymentFrame", |f| {
            f.click_in_frame("Confirm deposit", "Bed.paymentFrame", "Payment.confirm")
        })
        .pause("Let the bed board refresh", 500)
        .assert_text("Bed is allocated", "Bed.status", ValueSource::literal("Allocated"))
        .screenshot("bed-allocated")
}

pub fn cancel_admission() -> Flow {
    Flow::new("cancel-admission")
        .click("Open admission module", "Menu.admission")
        .fill("Search request", "Admission.requestSearch", field("admissionRequestNo"))
        .enter("Run search")
        .click(
            "Open request",
            Target::param("Admission.requestRow", "requestNo", field("admissionRequestNo")),
        )
        .assert_visible("Cancel is offered", "Admission.cancel", true)
        .click("Cancel request", "Admission.cancel")
        .fill("Enter cancellation reason", "Admission.cancelReason", field("cancelReason"))
        .click("Confirm cancellation", "Admission.cancelConfirm")
        .assert_text("Request is cancelled", "Admission.status", ValueSource::literal("Cancelled"))
        .screenshot("admission-cancelled")
}

pub fn discharge() -> Flow {
    Flow::new("discharge")
        .click("Open discharge module", "Menu.discharge")
        .fill("Search inpatient", "Discharge.search", field("idNumber"))
        .enter("Run search")
        .click(
            "Open inpatient",
            Target::param("Discharge.patientRow", "idNumber", field("idNumber")),
        )
        .select("Choose discharge type", "Discharge.type", field("dischargeType"))
        .click("Discharge patient", "Discharge.submit")
        .assert_visible("Confirmation is shown", "Discharge.confirm", true)
        .click("Confirm discharge", "Discharge.confirm")
        .assert_text("Patient is discharged", "Discharge.status", ValueSource::literal("Discharged"))
        .screenshot("patient-discharged")
}
