// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User profile model: the backend payload, its normalized form, and the
//! request bodies for registration and profile edits.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed-in user as the rest of the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: String,
    pub name: String,
    pub gender: Gender,
    pub birth_date: Option<String>,
    /// Centimetres.
    pub height: Option<f64>,
    /// Kilograms.
    pub weight: Option<f64>,
    pub activity_level: Option<String>,
}

/// `GET /users/me` and `PUT /users/me/profile` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendUser {
    #[serde(deserialize_with = "string_or_number::deserialize")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub profile: Option<BackendProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub activity_level_id: Option<i64>,
    #[serde(default)]
    pub activity_level_code: Option<String>,
}

impl From<BackendUser> for User {
    fn from(raw: BackendUser) -> Self {
        let profile = raw.profile.unwrap_or_default();
        Self {
            id: raw.id,
            email: raw.email,
            created_at: raw.created_at,
            name: profile.name.unwrap_or_default(),
            gender: profile.gender.unwrap_or_default(),
            birth_date: profile.birth_date,
            height: profile.height_cm,
            weight: profile.weight_kg,
            activity_level: profile.activity_level_code,
        }
    }
}

/// `POST /auth/register` body.
#[derive(Clone, Serialize)]
pub struct RegistrationData {
    pub email: String,
    pub password: String,
    pub name: String,
    pub gender: Gender,
    /// `YYYY-MM-DD`.
    pub birth_date: String,
}

impl fmt::Debug for RegistrationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationData")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("gender", &self.gender)
            .field("birth_date", &self.birth_date)
            .finish()
    }
}

/// `PUT /users/me/profile` body.
///
/// Each field is tri-state: `None` leaves it out of the request,
/// `Some(None)` sends an explicit `null`, `Some(Some(v))` sends the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_level_code: Option<Option<String>>,
}

impl ProfileUpdate {
    pub fn height(mut self, cm: Option<f64>) -> Self {
        self.height_cm = Some(cm);
        self
    }

    pub fn weight(mut self, kg: Option<f64>) -> Self {
        self.weight_kg = Some(kg);
        self
    }

    pub fn activity_level(mut self, code: Option<String>) -> Self {
        self.activity_level_code = Some(code);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.height_cm.is_none() && self.weight_kg.is_none() && self.activity_level_code.is_none()
    }
}

/// Accept an identifier sent either as a JSON string or a JSON integer.
mod string_or_number {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::Deserializer;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer id")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
                Ok(value.to_owned())
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
                Ok(value)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
                Ok(value.to_string())
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
                Ok(value.to_string())
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
