use serde::{Deserialize, Serialize};

use crate::schema::FieldAccess;

/// Operator role as resolved by the login collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Supervisor,
    Seguimientos,
    Captura,
    Codificar,
    Viewer,
}

impl Role {
    /// Case-insensitive; anything unrecognized is a read-mostly viewer.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "supervisor" => Self::Supervisor,
            "seguimientos" => Self::Seguimientos,
            "captura" => Self::Captura,
            "codificar" => Self::Codificar,
            _ => Self::Viewer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Seguimientos => "seguimientos",
            Self::Captura => "captura",
            Self::Codificar => "codificar",
            Self::Viewer => "viewer",
        }
    }

    pub fn may_edit(&self, access: FieldAccess) -> bool {
        match access {
            FieldAccess::Unrestricted => true,
            FieldAccess::RoleGated => matches!(self, Self::Supervisor | Self::Seguimientos),
            FieldAccess::CaptureGated => matches!(self, Self::Supervisor),
        }
    }
}
