use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthAction {
    PasswordSignIn,
    RedirectSignIn,
    SignOut,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PasswordSignIn => "password_sign_in",
            Self::RedirectSignIn => "redirect_sign_in",
            Self::SignOut => "sign_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ModuleLoadError {
    #[error("failed to fetch compute module: {0}")]
    Fetch(String),
    #[error("failed to instantiate compute module: {0}")]
    Instantiate(String),
    #[error("compute module initialization was aborted: {0}")]
    Aborted(String),
}

/// A sign-in, redirect or sign-out request rejected by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AuthActionError {
    pub action: AuthAction,
    pub message: String,
}

impl AuthActionError {
    pub fn new(action: AuthAction, message: impl Into<String>) -> Self {
        Self {
            action,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RedirectResolutionError {
    pub message: String,
}

impl RedirectResolutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The latest error the session reconciler holds as state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum SessionError {
    #[error(transparent)]
    Action(#[from] AuthActionError),
    #[error(transparent)]
    Redirect(#[from] RedirectResolutionError),
}

impl SessionError {
    pub fn message(&self) -> &str {
        match self {
            Self::Action(err) => &err.message,
            Self::Redirect(err) => &err.message,
        }
    }
}
