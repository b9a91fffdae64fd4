use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::RedirectResolutionError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(UserId);

/// Who the identity service says is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            email,
        }
    }
}

/// Current login state as seen by the client.
///
/// `Unknown` means no authoritative statement has arrived yet. It must not be
/// rendered as `Anonymous`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "identity", rename_all = "snake_case")]
pub enum Session {
    #[default]
    Unknown,
    Anonymous,
    Authenticated(Identity),
}

impl Session {
    pub fn from_auth_change(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => Self::Authenticated(identity),
            None => Self::Anonymous,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Unknown | Self::Anonymous => None,
        }
    }

    pub fn is_determined(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RedirectOutcome {
    #[default]
    Pending,
    Succeeded(Identity),
    Failed(RedirectResolutionError),
    None,
}

impl RedirectOutcome {
    pub fn from_resolution(result: Result<Option<Identity>, RedirectResolutionError>) -> Self {
        match result {
            Ok(Some(identity)) => Self::Succeeded(identity),
            Ok(None) => Self::None,
            Err(err) => Self::Failed(err),
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }
}

/// Email and password for a single sign-in attempt. The password is wiped on drop.
#[derive(Clone)]
pub struct PendingCredential {
    email: String,
    password: String,
}

impl PendingCredential {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for PendingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCredential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Drop for PendingCredential {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}
