//! First-run setup: check an email/password pair against the cloud before
//! saving it as the credential record.

use core::fmt;
use log::{error, info};

use crate::client::CloudClient;
use crate::config::{CredentialStore, Credentials};
use crate::error::{CloudError, ErrorKind};

/// Raw form input; either field may be missing or blank.
#[derive(Debug, Clone, Default)]
pub struct SetupForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub enum SetupError {
    MissingField(&'static str),
    InvalidCredentials(CloudError),
    CannotConnect(CloudError),
    Unknown(String),
}

impl SetupError {
    /// Key a setup form shows next to the failed submission.
    pub fn form_key(&self) -> &'static str {
        match self {
            SetupError::MissingField(_) => "missing_field",
            SetupError::InvalidCredentials(_) => "invalid_credentials",
            SetupError::CannotConnect(_) => "cannot_connect",
            SetupError::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::MissingField(name) => write!(f, "{} is required", name),
            SetupError::InvalidCredentials(e) => write!(f, "invalid credentials: {}", e),
            SetupError::CannotConnect(e) => write!(f, "cannot connect: {}", e),
            SetupError::Unknown(e) => write!(f, "unexpected error: {}", e),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<CloudError> for SetupError {
    fn from(value: CloudError) -> Self {
        match value.kind() {
            ErrorKind::InvalidCredentials => SetupError::InvalidCredentials(value),
            // An expired token cannot come out of a login; treat it like any connectivity failure.
            ErrorKind::CannotConnect | ErrorKind::ExpiredToken => SetupError::CannotConnect(value),
        }
    }
}

fn required(value: Option<&String>, name: &'static str) -> Result<String, SetupError> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(SetupError::MissingField(name))
}

/// Validate the form with one login. On success the returned credentials carry
/// the fresh token. `make_client` builds the session for the given email/password.
pub fn validate(
    form: &SetupForm,
    make_client: impl FnOnce(&str, &str) -> CloudClient,
) -> Result<Credentials, SetupError> {
    let email = required(form.email.as_ref(), "email")?;
    // Passwords are sent as typed, surrounding whitespace included.
    let password = form
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or(SetupError::MissingField("password"))?;

    let client = make_client(&email, &password);
    client.login()?;
    Ok(Credentials::new(email, password).with_token(client.token()))
}

/// Validate and persist. Also used to reconfigure: an existing record is replaced.
pub fn run(
    form: &SetupForm,
    store: &CredentialStore,
    make_client: impl FnOnce(&str, &str) -> CloudClient,
) -> Result<Credentials, SetupError> {
    let credentials = validate(form, make_client)?;
    if let Err(e) = store.save(&credentials) {
        error!("Saving credentials failed: {}", e);
        return Err(SetupError::Unknown(e));
    }
    info!(
        "Credentials for {} saved to {}",
        credentials.email,
        store.path().display()
    );
    Ok(credentials)
}
