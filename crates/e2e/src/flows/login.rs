//! Login and welcome confirmation

use crate::flow::{Flow, ValueSource};
use crate::retry::{Exhaustion, RetryPolicy};

/// The welcome notice after login is flaky: re-click it up to twice more
/// and carry on even if it never settles.
pub const WELCOME_CONFIRMATION: RetryPolicy = RetryPolicy {
    attempts: 3,
    on_exhaustion: Exhaustion::Suppress,
};

pub fn welcome() -> Flow {
    Flow::new("welcome")
        .navigate("Open login page", "/")
        .wait("Login form is shown", "Login.username")
        .fill("Enter username", "Login.username", ValueSource::Username)
        .fill("Enter password", "Login.password", ValueSource::Password)
        .click("Submit credentials", "Login.submit")
        .retry("Confirm welcome page", WELCOME_CONFIRMATION, |f| {
            f.click("Proceed past welcome notice", "Welcome.proceed")
                .wait("Dashboard is shown", "Home.dashboard")
        })
}

pub fn logout() -> Flow {
    Flow::new("logout")
        .click("Open user menu", "Home.userMenu")
        .click("Sign out", "Home.logout")
        .wait("Back on login page", "Login.username")
}
