//! Sign-in and sign-up form controllers.
//!
//! Two-state machines: while `Editing` the fields are mutable and `submit`
//! validates; a successful submit hands the payload to the external
//! authentication collaborator and moves the form to `Submitting`. The form
//! does not track pending, success or failure; that belongs to the caller.

use shared::protocol::{SignInCredentials, SignUpRequest};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormPhase {
    #[default]
    Editing,
    Submitting,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error("email address is not valid")]
    InvalidEmail,
    #[error("form is already submitting")]
    AlreadySubmitting,
}

fn require<'a>(name: &'static str, value: &'a str) -> Result<&'a str, FormError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FormError::MissingField(name));
    }
    Ok(trimmed)
}

// Shape check only; the server owns real address validation.
fn require_email(value: &str) -> Result<&str, FormError> {
    let value = require("email", value)?;
    let well_formed = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(FormError::InvalidEmail);
    }
    Ok(value)
}

#[derive(Debug, Default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
    phase: FormPhase,
}

impl SignInForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_email(&mut self, value: impl Into<String>) {
        self.email = value.into();
    }

    pub fn set_password(&mut self, value: impl Into<String>) {
        self.password = value.into();
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn validate(&self) -> Result<SignInCredentials, FormError> {
        let email = require_email(&self.email)?.to_string();
        let password = require("password", &self.password)?.to_string();
        Ok(SignInCredentials { email, password })
    }

    /// Validates and returns the payload for the authentication collaborator.
    /// An invalid form issues nothing and stays in `Editing`.
    pub fn submit(&mut self) -> Result<SignInCredentials, FormError> {
        if self.phase == FormPhase::Submitting {
            return Err(FormError::AlreadySubmitting);
        }
        let credentials = self.validate()?;
        self.phase = FormPhase::Submitting;
        Ok(credentials)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
pub struct SignUpForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    phase: FormPhase,
}

impl SignUpForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_first_name(&mut self, value: impl Into<String>) {
        self.first_name = value.into();
    }

    pub fn set_last_name(&mut self, value: impl Into<String>) {
        self.last_name = value.into();
    }

    pub fn set_username(&mut self, value: impl Into<String>) {
        self.username = value.into();
    }

    pub fn set_email(&mut self, value: impl Into<String>) {
        self.email = value.into();
    }

    pub fn set_password(&mut self, value: impl Into<String>) {
        self.password = value.into();
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn validate(&self) -> Result<SignUpRequest, FormError> {
        let first_name = require("first_name", &self.first_name)?.to_string();
        let last_name = require("last_name", &self.last_name)?.to_string();
        let username = require("username", &self.username)?.to_string();
        let email = require_email(&self.email)?.to_string();
        let password = require("password", &self.password)?.to_string();
        Ok(SignUpRequest {
            first_name,
            last_name,
            username,
            email,
            password,
        })
    }

    /// Same contract as [`SignInForm::submit`], over the five required
    /// sign-up fields.
    pub fn submit(&mut self) -> Result<SignUpRequest, FormError> {
        if self.phase == FormPhase::Submitting {
            return Err(FormError::AlreadySubmitting);
        }
        let request = self.validate()?;
        self.phase = FormPhase::Submitting;
        Ok(request)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
