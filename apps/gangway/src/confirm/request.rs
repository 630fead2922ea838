use crate::confirm::ConfirmError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Application,
    Asset,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Application => "application",
            TargetKind::Asset => "asset",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The system account used to authenticate to the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemUser {
    pub id: String,
    pub username: String,
}

impl SystemUser {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Who is connecting, as whom, and to what. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationRequest {
    user_id: String,
    system_user: SystemUser,
    target_kind: TargetKind,
    target_id: String,
}

impl ConfirmationRequest {
    pub fn builder() -> ConfirmationRequestBuilder {
        ConfirmationRequestBuilder::default()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn system_user(&self) -> &SystemUser {
        &self.system_user
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn synopsis(&self) -> String {
        format!(
            "user: {}, system_user: {} ({}), {}: {}",
            self.user_id,
            self.system_user.username,
            self.system_user.id,
            self.target_kind,
            self.target_id
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfirmationRequestBuilder {
    user_id: Option<String>,
    system_user: Option<SystemUser>,
    target_kind: Option<TargetKind>,
    target_id: Option<String>,
}

impl ConfirmationRequestBuilder {
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn system_user(mut self, system_user: SystemUser) -> Self {
        self.system_user = Some(system_user);
        self
    }

    pub fn target_kind(mut self, kind: TargetKind) -> Self {
        self.target_kind = Some(kind);
        self
    }

    pub fn target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Fails when a required field is missing or blank. The target kind
    /// defaults to [`TargetKind::Asset`].
    pub fn build(self) -> Result<ConfirmationRequest, ConfirmError> {
        let user_id = required(self.user_id, "user id")?;
        let system_user = self
            .system_user
            .ok_or_else(|| ConfirmError::InvalidRequest("missing system user".into()))?;
        if system_user.id.trim().is_empty() {
            return Err(ConfirmError::InvalidRequest(
                "system user id cannot be empty".into(),
            ));
        }
        let target_id = required(self.target_id, "target id")?;
        Ok(ConfirmationRequest {
            user_id,
            system_user,
            target_kind: self.target_kind.unwrap_or(TargetKind::Asset),
            target_id,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ConfirmError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(ConfirmError::InvalidRequest(format!(
            "{field} cannot be empty"
        ))),
        None => Err(ConfirmError::InvalidRequest(format!("missing {field}"))),
    }
}
