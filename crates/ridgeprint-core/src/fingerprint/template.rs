use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AppError;

use super::descriptors::LocalDescriptor;
use super::minutiae::MinutiaPoint;
use super::store::TemplateStore;

/// Persisted biometric template. Only `username`, `phone` and `updated_at`
/// change after enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintTemplate {
    pub user_id: String,
    pub username: String,
    pub phone: String,
    pub descriptors: Vec<LocalDescriptor>,
    pub minutiae: Vec<MinutiaPoint>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl FingerprintTemplate {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        phone: impl Into<String>,
        descriptors: Vec<LocalDescriptor>,
        minutiae: Vec<MinutiaPoint>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            phone: phone.into(),
            descriptors,
            minutiae,
            created_at: timestamp(),
            updated_at: None,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            phone: self.phone.clone(),
        }
    }
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub phone: String,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no local descriptors were extracted for user '{user_id}'")]
    EmptyDescriptors { user_id: String },

    #[error("user id '{user_id}' is already registered")]
    Duplicate { user_id: String },

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Assembles a template after checking that descriptors were found and that
/// the user id is still free. An empty minutiae set is accepted.
pub fn build_template<S: TemplateStore + ?Sized>(
    user_id: &str,
    username: &str,
    phone: &str,
    descriptors: Vec<LocalDescriptor>,
    minutiae: Vec<MinutiaPoint>,
    store: &S,
) -> Result<FingerprintTemplate, TemplateError> {
    if descriptors.is_empty() {
        return Err(TemplateError::EmptyDescriptors {
            user_id: user_id.to_string(),
        });
    }
    if store.lookup(user_id)?.is_some() {
        return Err(TemplateError::Duplicate {
            user_id: user_id.to_string(),
        });
    }
    Ok(FingerprintTemplate::new(
        user_id,
        username,
        phone,
        descriptors,
        minutiae,
    ))
}
