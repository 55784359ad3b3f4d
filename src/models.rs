use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an account authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Credentials,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Credentials => "credentials",
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credentials" => Ok(Provider::Credentials),
            "google" => Ok(Provider::Google),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub provider: Provider,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_string()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.to_string(),
            email: self.email.clone(),
            name: self.full_name(),
        }
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for User {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let created_at_str: String = row.try_get("created_at")?;
        let provider_str: String = row.try_get("provider")?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "created_at".to_string(),
                source: Box::new(e),
            })?
            .with_timezone(&Utc);

        let provider = provider_str
            .parse::<Provider>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "provider".to_string(),
                source: e.into(),
            })?;

        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            firstname: row.try_get("firstname")?,
            lastname: row.try_get("lastname")?,
            password_hash: row.try_get("password")?,
            provider,
            created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub password_hash: String,
    pub provider: Provider,
}

/// The minimal identity produced by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Profile asserted by an external identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl OAuthProfile {
    /// Splits the display name into first word and remainder.
    pub fn name_parts(name: &str) -> (String, String) {
        let mut parts = name.trim().splitn(2, char::is_whitespace);
        let firstname = parts.next().unwrap_or_default().to_string();
        let lastname = parts.next().unwrap_or_default().trim().to_string();
        (firstname, lastname)
    }
}

/// Client-supplied partial session used by the update trigger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub name: Option<String>,
}

/// What the session read accessor exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Option<String>,
    pub email: String,
    pub name: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
