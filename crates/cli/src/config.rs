// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use caltrack_client::profile::{Gender, ProfileUpdate, RegistrationData};
use caltrack_client::ClientConfig;
use clap::{Parser, Subcommand};

/// Command-line client for the caltrack API.
#[derive(Debug, Parser)]
#[command(name = "caltrack", version, about)]
pub struct Config {
    #[command(flatten)]
    pub client: ClientConfig,

    /// Directory holding the stored credentials.
    #[arg(long, env = "CALTRACK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "CALTRACK_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CALTRACK_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and store the credential pair.
    Login {
        #[arg(long, env = "CALTRACK_EMAIL")]
        email: String,
        #[arg(long, env = "CALTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account, then sign in with it.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CALTRACK_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = Gender::Male)]
        gender: Gender,
        /// Birth date as YYYY-MM-DD.
        #[arg(long)]
        birth_date: String,
    },
    /// Sign out and remove the stored credentials.
    Logout,
    /// Print the signed-in user.
    Whoami,
    /// Edit the signed-in user's profile.
    Profile {
        /// Height in centimetres.
        #[arg(long, conflicts_with = "clear_height")]
        height: Option<f64>,
        #[arg(long)]
        clear_height: bool,
        /// Weight in kilograms.
        #[arg(long, conflicts_with = "clear_weight")]
        weight: Option<f64>,
        #[arg(long)]
        clear_weight: bool,
        /// Activity level code (e.g. sedentary, light, moderate, active).
        #[arg(long, conflicts_with = "clear_activity_level")]
        activity_level: Option<String>,
        #[arg(long)]
        clear_activity_level: bool,
    },
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.client.validate()?;

        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {} (expected json or text)", self.log_format);
        }

        match &self.command {
            Command::Login { email, .. } | Command::Register { email, .. }
                if email.trim().is_empty() =>
            {
                anyhow::bail!("--email must not be empty");
            }
            Command::Register { birth_date, .. } if !is_iso_date(birth_date) => {
                anyhow::bail!("invalid --birth-date: {birth_date} (expected YYYY-MM-DD)");
            }
            Command::Profile { .. } if !self.profile_update().is_some_and(|u| !u.is_empty()) => {
                anyhow::bail!("profile: nothing to update");
            }
            _ => {}
        }
        Ok(())
    }

    /// Directory for `credentials.json`: `--state-dir`, else the default
    /// state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(caltrack_client::credential::state_dir)
    }

    /// Registration body for the `register` command.
    pub fn registration(&self) -> Option<RegistrationData> {
        match &self.command {
            Command::Register { email, password, name, gender, birth_date } => {
                Some(RegistrationData {
                    email: email.trim().to_owned(),
                    password: password.clone(),
                    name: name.clone(),
                    gender: *gender,
                    birth_date: birth_date.clone(),
                })
            }
            _ => None,
        }
    }

    /// Profile edit for the `profile` command. `--clear-*` flags send an
    /// explicit null; unset fields are left out.
    pub fn profile_update(&self) -> Option<ProfileUpdate> {
        let Command::Profile {
            height,
            clear_height,
            weight,
            clear_weight,
            activity_level,
            clear_activity_level,
        } = &self.command
        else {
            return None;
        };

        let mut update = ProfileUpdate::default();
        if height.is_some() || *clear_height {
            update = update.height(*height);
        }
        if weight.is_some() || *clear_weight {
            update = update.weight(*weight);
        }
        if activity_level.is_some() || *clear_activity_level {
            update = update.activity_level(activity_level.clone());
        }
        Some(update)
    }
}

fn is_iso_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    matches!(parts.as_slice(), [y, m, d]
        if y.len() == 4 && m.len() == 2 && d.len() == 2
            && [y, m, d].iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
