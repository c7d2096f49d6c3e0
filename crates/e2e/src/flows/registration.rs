//! Patient registration: new, existing and twin patients

use crate::fixture::BoundRow;
use crate::flow::{Flow, Target, ValueSource};

/// Fixture table used by the registration scenarios
pub const TABLE: &str = "dt_patientRegistration";

const TWIN_FLAG: &str = "isTwin";
const NEWBORN_FLAG: &str = "isNewborn";

fn field(name: &str) -> ValueSource {
    ValueSource::row(TABLE, name)
}

/// Twin births are registered back to back in one pass
pub fn is_twin_registration(row: &BoundRow) -> bool {
    row.flag_or(TWIN_FLAG, false) && row.flag_or(NEWBORN_FLAG, false)
}

fn demographics() -> Flow {
    Flow::new("demographics")
        .select("Choose ID type", "Registration.idType", field("idType"))
        .fill("Enter ID number", "Registration.idNumber", field("idNumber"))
        .fill("Enter patient name", "Registration.patientName", field("patientName"))
        .select("Choose gender", "Registration.gender", field("gender"))
        .fill("Enter date of birth", "Registration.dateOfBirth", field("dateOfBirth"))
}

fn contact() -> Flow {
    Flow::new("contact")
        .click("Open country dropdown", "Registration.countryDropdown")
        .fill("Search country", "Registration.countrySearch", field("country"))
        .click(
            "Pick country",
            Target::param("Registration.countryOption", "country", field("country")),
        )
        .fill("Enter address", "Registration.address", field("address"))
        .fill("Enter phone number", "Registration.phone", field("phone"))
}

fn guardian() -> Flow {
    Flow::new("guardian").optional("Guardian details", "Guardian.section", |f| {
        f.fill("Enter guardian name", "Guardian.name", field("guardianName"))
            .select("Choose relationship", "Guardian.relationship", field("guardianRelationship"))
            .fill("Enter guardian phone", "Guardian.phone", field("guardianPhone"))
    })
}

fn medico_legal() -> Flow {
    Flow::new("medico-legal").optional("Medico-legal case", "Mlc.section", |f| {
        f.click("Mark as MLC", "Mlc.toggle")
            .fill("Enter police report number", "Mlc.policeReport", field("policeReportNo"))
    })
}

fn twin_details() -> Flow {
    Flow::new("twin").optional("Twin details", "Twin.section", |f| {
        f.click("Mark as twin", "Twin.toggle")
            .fill("Enter mother's MRN", "Twin.motherMrn", field("motherMrn"))
    })
}

fn submit() -> Flow {
    Flow::new("submit")
        .click("Save registration", "Registration.save")
        .wait("Success dialog is shown", "Registration.successDialog")
        .capture("Read generated MRN", "Registration.mrnLabel", "mrn")
        .click("Close success dialog", "Registration.successOk")
}

fn registration_body() -> Flow {
    Flow::new("body")
        .click("Start new registration", "Registration.newPatient")
        .extend(demographics())
        .extend(contact())
        .extend(guardian())
        .extend(medico_legal())
        .extend(twin_details())
        .extend(submit())
}

/// Register a new patient (twice, for twin births) and record the MRN
pub fn new_patient(row: &BoundRow) -> Flow {
    let mut flow = Flow::new("register-new-patient").click("Open registration", "Menu.registration");

    flow = if is_twin_registration(row) {
        let reset = Flow::new("reset").click("Clear the form", "Registration.clearForm");
        flow.repeat("Register both twins", 2, reset, registration_body())
    } else {
        flow.extend(registration_body())
    };

    flow.write_back("Record MRN in fixture", TABLE, "mrn", ValueSource::bag("mrn"))
        .reload("Reload registration fixture", TABLE)
        .screenshot("registration-complete")
}

/// Look up a previously registered patient by ID and check the record
pub fn existing_patient() -> Flow {
    Flow::new("register-existing-patient")
        .click("Open registration", "Menu.registration")
        .fill("Search by ID number", "Registration.searchIdNumber", field("idNumber"))
        .enter("Run search")
        .click(
            "Open search result",
            Target::param("Registration.searchResult", "mrn", field("mrn")),
        )
        .assert_text("Patient name matches", "Registration.patientNameLabel", field("patientName"))
        .assert_visible("Visit button is offered", "Registration.newVisit", true)
        .click("Start a new visit", "Registration.newVisit")
        .wait("Visit created", "Registration.visitCreated")
        .screenshot("existing-patient-visit")
}
