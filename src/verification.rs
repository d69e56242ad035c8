use axum::extract::rejection::JsonRejection;
use axum::extract::Query;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::err::{breaks, json_body, proceeds, Error, Payload};
use crate::models::StudentApplication;

/// Public credential-verification lookup. Every criterion is optional,
/// but at least one must be non-empty.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationQuery {
    pub student_id: Option<String>,
    pub email: Option<String>,
    pub last_name: Option<String>,
}

/// Trimmed, `ILIKE`-ready criteria, or a validation error when the
/// whole query is empty.
pub fn criteria(
    query: &VerificationQuery,
) -> Result<(Option<String>, Option<String>, Option<String>), Error> {
    let pattern = |raw: &Option<String>| {
        raw.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s))
    };
    let student_id = pattern(&query.student_id);
    let email = pattern(&query.email);
    let last_name = pattern(&query.last_name);
    if student_id.is_none() && email.is_none() && last_name.is_none() {
        return Err(Error::validation(
            "At least one of `studentId`, `email`, `lastName` is required",
        ));
    }
    Ok((student_id, email, last_name))
}

/// The deliberately reduced public view: no contact data, no document
/// references.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub student_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub program: String,
    pub status: String,
    pub year_of_graduation: String,
}

impl VerificationRecord {
    fn project(application: &StudentApplication) -> VerificationRecord {
        VerificationRecord {
            student_id: application.student_id,
            first_name: application.first_name.clone(),
            last_name: application.last_name.clone(),
            program: application.degree.program().to_string(),
            status: application.status.clone(),
            year_of_graduation: application.year_of_graduation.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub records: Vec<VerificationRecord>,
}

const MAX_MATCHES: i64 = 10;

async fn lookup_inner(pg: &PgPool, query: VerificationQuery) -> Payload<VerificationResponse> {
    let (student_id, email, last_name) = criteria(&query)?;
    let matches = sqlx::query_as::<_, StudentApplication>(
        "SELECT * FROM student_applications
         WHERE ($1::text IS NULL OR student_id::text ILIKE $1)
           AND ($2::text IS NULL OR email ILIKE $2)
           AND ($3::text IS NULL OR last_name ILIKE $3)
         ORDER BY created_at DESC
         LIMIT $4",
    )
    .bind(&student_id)
    .bind(&email)
    .bind(&last_name)
    .bind(MAX_MATCHES)
    .fetch_all(pg)
    .await?;

    if matches.is_empty() {
        return breaks(Error::not_found("No matching applications"));
    }
    proceeds(VerificationResponse {
        records: matches.iter().map(VerificationRecord::project).collect(),
    })
}

pub async fn lookup(
    Extension(pg): Extension<PgPool>,
    body: Result<Json<VerificationQuery>, JsonRejection>,
) -> Payload<VerificationResponse> {
    let query = json_body(body)?;
    lookup_inner(&pg, query).await
}

pub async fn lookup_query(
    Query(query): Query<VerificationQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<VerificationResponse> {
    lookup_inner(&pg, query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_is_a_client_error() {
        let err = criteria(&VerificationQuery::default()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = criteria(&VerificationQuery {
            student_id: Some("  ".into()),
            email: Some(String::new()),
            last_name: None,
        })
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn single_criterion_suffices() {
        let (student_id, email, last_name) = criteria(&VerificationQuery {
            student_id: None,
            email: None,
            last_name: Some(" Smith ".into()),
        })
        .unwrap();
        assert_eq!(student_id, None);
        assert_eq!(email, None);
        assert_eq!(last_name, Some("%Smith%".into()));
    }

    #[test]
    fn projection_drops_private_fields() {
        let json = serde_json::to_value(VerificationRecord {
            student_id: 1_000_001,
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            program: "History".into(),
            status: "approved".into(),
            year_of_graduation: "2026".into(),
        })
        .unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("program"));
        assert!(!object.contains_key("email"));
        assert!(!object.contains_key("phone"));
        assert!(!object.contains_key("documents"));
    }
}
