use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};

/// Process configuration, read from the environment exactly once at
/// startup. Constructed in `main` and injected into handlers, never
/// reached for globally.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub token_secret: String,
    pub bind_addr: SocketAddr,
    pub uploads_dir: PathBuf,
    pub mail: Option<MailConfig>,
    pub seed_admin: Option<SeedAdmin>,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    pub admissions_inbox: String,
}

/// Out-of-band admin provisioning data. Applied at startup when all
/// three variables are set; there is no HTTP path that creates admins.
#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        // A missing TOKEN_SECRET must abort startup: falling back to a
        // compiled-in default would let anyone forge admin credentials.
        let database_url = required("DATABASE_URL")?;
        let token_secret = required("TOKEN_SECRET")?;

        let bind_addr = match optional("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("BIND_ADDR `{}` is not a socket address", raw))?,
            None => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        let uploads_dir = optional("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("uploads"));

        let mail = match (optional("MAIL_FROM"), optional("MAIL_ADMISSIONS_INBOX")) {
            (Some(from), Some(admissions_inbox)) => Some(MailConfig {
                from,
                admissions_inbox,
            }),
            (None, None) => None,
            _ => bail!("MAIL_FROM and MAIL_ADMISSIONS_INBOX must be set together"),
        };

        let seed_admin = match (
            optional("SEED_ADMIN_USERNAME"),
            optional("SEED_ADMIN_EMAIL"),
            optional("SEED_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(SeedAdmin {
                username,
                email: email.to_lowercase(),
                password,
            }),
            (None, None, None) => None,
            _ => bail!("SEED_ADMIN_USERNAME, SEED_ADMIN_EMAIL and SEED_ADMIN_PASSWORD must be set together"),
        };

        Ok(Config {
            database_url,
            token_secret,
            bind_addr,
            uploads_dir,
            mail,
            seed_admin,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    match optional(name) {
        Some(value) => Ok(value),
        None => bail!("required environment variable {} is not set", name),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
