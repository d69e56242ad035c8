use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth;
use crate::config::SeedAdmin;
use crate::models::ADMIN_ROLES;

/// First student id ever assigned. Subsequent ids come from the
/// `student_id_seq` sequence, so concurrent submissions can never
/// compute the same "next" value.
pub const FIRST_STUDENT_ID: i64 = 1_000_001;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS admins (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'admin',
        active BOOLEAN NOT NULL DEFAULT TRUE,
        last_login TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS contact_messages (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        subject TEXT NOT NULL,
        message TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'new',
        admin_notes TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS student_applications (
        id UUID PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        date_of_birth TEXT NOT NULL,
        gender TEXT NOT NULL,
        address JSONB NOT NULL,
        degree JSONB NOT NULL,
        year_of_graduation TEXT NOT NULL,
        parent JSONB NOT NULL,
        documents JSONB NOT NULL,
        student_id BIGINT NOT NULL UNIQUE DEFAULT nextval('student_id_seq'),
        status TEXT NOT NULL DEFAULT 'pending',
        admin_notes TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
];

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await
        .context("could not connect to the database")
}

pub async fn init_schema(pool: &PgPool) -> anyhow::Result<()> {
    // The applications table defaults its student_id from this
    // sequence, so it has to exist first.
    let sequence = format!(
        "CREATE SEQUENCE IF NOT EXISTS student_id_seq START WITH {}",
        FIRST_STUDENT_ID
    );
    sqlx::query(&sequence)
        .execute(pool)
        .await
        .context("schema initialization failed")?;
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("schema initialization failed")?;
    }
    Ok(())
}

/// Upserts the seed admin from the environment. This is the only way
/// an admin account comes into existence.
pub async fn provision_admin(pool: &PgPool, seed: &SeedAdmin) -> anyhow::Result<()> {
    if seed.username.len() < 3 || seed.username.len() > 30 {
        anyhow::bail!("seed admin username must be 3-30 characters");
    }
    let role = ADMIN_ROLES[1]; // super-admin
    let hash = auth::hash_password(&seed.password)?;
    let res = sqlx::query(
        "INSERT INTO admins (id, username, email, password_hash, role, active, created_at)
         VALUES ($1, $2, $3, $4, $5, TRUE, $6)
         ON CONFLICT (username) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(&seed.username)
    .bind(seed.email.to_lowercase())
    .bind(&hash)
    .bind(role)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if res.rows_affected() > 0 {
        log::info!("provisioned admin account `{}`", seed.username);
    } else {
        log::debug!("admin account `{}` already exists", seed.username);
    }
    Ok(())
}

/// Query-string parameters shared by the admin list endpoints.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

impl ListQuery {
    pub fn page_params(&self) -> PageParams {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        PageParams {
            page,
            limit,
            offset: (page - 1) * limit,
        }
    }

    /// `None` when no status filter applies (absent or "all").
    pub fn status_filter(&self) -> Option<String> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "all")
            .map(str::to_string)
    }

    /// `ILIKE` pattern for the substring search, when one was given.
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s))
    }
}

pub fn page_count(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// One page of an admin list, with the counts the panel paginates by.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOf<T> {
    pub records: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_count: i64,
}

impl<T> PageOf<T> {
    pub fn assemble(records: Vec<T>, total: i64, params: PageParams) -> PageOf<T> {
        PageOf {
            records,
            total,
            page: params.page,
            page_count: page_count(total, params.limit),
        }
    }
}
