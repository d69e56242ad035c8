use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{ListQuery, PageOf};
use crate::err::{breaks, creates, json_body, proceeds, Error, Payload};
use crate::models::{ContactMessage, ContactStatus};
use crate::validate::required;

#[derive(Debug, Default, Deserialize)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug)]
struct NewContact {
    name: String,
    email: String,
    phone: String,
    subject: String,
    message: String,
}

/// Checks fields in their documented order; the first blank one names
/// the response.
fn validate_form(form: &ContactForm) -> Result<NewContact, Error> {
    Ok(NewContact {
        name: required("name", form.name.as_deref())?,
        email: required("email", form.email.as_deref())?,
        phone: required("phone", form.phone.as_deref())?,
        subject: required("subject", form.subject.as_deref())?,
        message: required("message", form.message.as_deref())?,
    })
}

/// Public contact-form submission. Visitors can only create; every
/// record starts out as `new`.
pub async fn submit(
    Extension(pg): Extension<PgPool>,
    body: Result<Json<ContactForm>, JsonRejection>,
) -> Payload<ContactMessage> {
    let form = json_body(body)?;
    let NewContact {
        name,
        email,
        phone,
        subject,
        message,
    } = validate_form(&form)?;

    let now = Utc::now();
    let record = sqlx::query_as::<_, ContactMessage>(
        "INSERT INTO contact_messages (id, name, email, phone, subject, message, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(&email)
    .bind(&phone)
    .bind(&subject)
    .bind(&message)
    .bind(ContactStatus::New.as_str())
    .bind(now)
    .fetch_one(&pg)
    .await?;

    creates(record)
}

pub async fn list(
    Query(query): Query<ListQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<PageOf<ContactMessage>> {
    let params = query.page_params();
    let status = query.status_filter();
    let pattern = query.search_pattern();

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM contact_messages
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL OR name ILIKE $2 OR email ILIKE $2
                OR subject ILIKE $2 OR message ILIKE $2)",
    )
    .bind(&status)
    .bind(&pattern)
    .fetch_one(&pg)
    .await?;

    let records = sqlx::query_as::<_, ContactMessage>(
        "SELECT * FROM contact_messages
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL OR name ILIKE $2 OR email ILIKE $2
                OR subject ILIKE $2 OR message ILIKE $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(&status)
    .bind(&pattern)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(&pg)
    .await?;

    proceeds(PageOf::assemble(records, total, params))
}

pub async fn get_one(
    Path(id): Path<String>,
    Extension(pg): Extension<PgPool>,
) -> Payload<ContactMessage> {
    let id = parse_id(&id)?;
    let record =
        sqlx::query_as::<_, ContactMessage>("SELECT * FROM contact_messages WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&pg)
            .await?;
    match record {
        Some(record) => proceeds(record),
        None => breaks(Error::not_found("No such contact message")),
    }
}

/// Allow-listed mutation: only status and admin notes can change,
/// whatever else the body carries.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPatch {
    pub status: Option<String>,
    pub admin_notes: Option<String>,
}

pub async fn update(
    Path(id): Path<String>,
    Extension(pg): Extension<PgPool>,
    body: Result<Json<ContactPatch>, JsonRejection>,
) -> Payload<ContactMessage> {
    let id = parse_id(&id)?;
    let patch = json_body(body)?;
    if let Some(status) = patch.status.as_deref() {
        if ContactStatus::parse(status).is_none() {
            return breaks(Error::validation(format!(
                "`status` must be one of new, read, replied, closed (got `{}`)",
                status
            )));
        }
    }

    let record = sqlx::query_as::<_, ContactMessage>(
        "UPDATE contact_messages
         SET status = COALESCE($2, status),
             admin_notes = COALESCE($3, admin_notes),
             updated_at = $4
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&patch.status)
    .bind(&patch.admin_notes)
    .bind(Utc::now())
    .fetch_optional(&pg)
    .await?;

    match record {
        Some(record) => proceeds(record),
        None => breaks(Error::not_found("No such contact message")),
    }
}

/// Unresolvable ids (including unparseable ones) read as 404, not 400:
/// the caller asked about a record that does not exist.
pub fn parse_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::not_found("No such record"))
}
