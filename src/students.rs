use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use sqlx::types::Json as Jsonb;
use sqlx::PgPool;
use uuid::Uuid;

use crate::contacts::parse_id;
use crate::db::{ListQuery, PageOf};
use crate::err::{breaks, creates, json_body, proceeds, Error, Note, Payload};
use crate::mail::Mailer;
use crate::models::{
    Address, ApplicationStatus, DegreeEntry, DegreeSelection, Documents, MultipleDegree,
    ParentContact, SingleDegree, StudentApplication,
};
use crate::uploads::UploadStore;
use crate::validate::required;

/// Raw application input, before ordered validation. Both entry points
/// produce one of these: the public multipart form field-by-field, the
/// admin JSON call via serde. Unknown fields are simply dropped.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationDraft {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub year_of_graduation: Option<String>,
    pub address: Option<AddressDraft>,
    pub parent: Option<ParentDraft>,
    pub degree_package_type: Option<String>,
    pub single_degree: Option<SingleDegreeDraft>,
    pub multiple_degree: Option<MultipleDegreeDraft>,
    pub student_id: Option<i64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressDraft {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParentDraft {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SingleDegreeDraft {
    pub degree_type: Option<String>,
    pub major: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultipleDegreeDraft {
    pub combination_package: Option<String>,
    pub degrees: Option<Vec<DegreeEntryDraft>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DegreeEntryDraft {
    pub degree_type: Option<String>,
    pub major: Option<String>,
}

impl ApplicationDraft {
    /// Routes one flat multipart text field into the draft. The form
    /// posts nested blocks as flat names (`street`, `parentName`) and
    /// the bundle's degree list as a JSON-encoded `degrees` field.
    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "firstName" => self.first_name = Some(value),
            "lastName" => self.last_name = Some(value),
            "email" => self.email = Some(value),
            "phone" => self.phone = Some(value),
            "dateOfBirth" => self.date_of_birth = Some(value),
            "gender" => self.gender = Some(value),
            "yearOfGraduation" => self.year_of_graduation = Some(value),
            "street" => self.address_mut().street = Some(value),
            "city" => self.address_mut().city = Some(value),
            "state" => self.address_mut().state = Some(value),
            "zip" => self.address_mut().zip = Some(value),
            "country" => self.address_mut().country = Some(value),
            "parentName" => self.parent_mut().name = Some(value),
            "parentRelationship" => self.parent_mut().relationship = Some(value),
            "parentPhone" => self.parent_mut().phone = Some(value),
            "parentEmail" => self.parent_mut().email = Some(value),
            "degreePackageType" => self.degree_package_type = Some(value),
            "degreeType" => self.single_mut().degree_type = Some(value),
            "major" => self.single_mut().major = Some(value),
            "combinationPackage" => self.multiple_mut().combination_package = Some(value),
            "degrees" => match serde_json::from_str(&value) {
                Ok(entries) => self.multiple_mut().degrees = Some(entries),
                Err(err) => log::warn!("unparseable `degrees` field: {}", err),
            },
            other => log::debug!("ignoring unexpected form field `{}`", other),
        }
    }

    fn address_mut(&mut self) -> &mut AddressDraft {
        self.address.get_or_insert_with(AddressDraft::default)
    }

    fn parent_mut(&mut self) -> &mut ParentDraft {
        self.parent.get_or_insert_with(ParentDraft::default)
    }

    fn single_mut(&mut self) -> &mut SingleDegreeDraft {
        self.single_degree.get_or_insert_with(SingleDegreeDraft::default)
    }

    fn multiple_mut(&mut self) -> &mut MultipleDegreeDraft {
        self.multiple_degree
            .get_or_insert_with(MultipleDegreeDraft::default)
    }
}

/// A fully validated application, ready to persist.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: String,
    pub gender: String,
    pub year_of_graduation: String,
    pub address: Address,
    pub parent: ParentContact,
    pub degree: DegreeSelection,
    pub student_id: Option<i64>,
}

/// Ordered validation: top-level fields, then address, then parent,
/// then the degree-package-conditional block. The first violation
/// short-circuits; there is no accumulated summary.
pub fn validate_draft(draft: &ApplicationDraft) -> Result<NewApplication, Error> {
    let first_name = required("firstName", draft.first_name.as_deref())?;
    let last_name = required("lastName", draft.last_name.as_deref())?;
    let email = required("email", draft.email.as_deref())?;
    let phone = required("phone", draft.phone.as_deref())?;
    let date_of_birth = required("dateOfBirth", draft.date_of_birth.as_deref())?;
    let gender = required("gender", draft.gender.as_deref())?;
    let year_of_graduation = required("yearOfGraduation", draft.year_of_graduation.as_deref())?;

    let a = draft.address.clone().unwrap_or_default();
    let address = Address {
        street: required("address.street", a.street.as_deref())?,
        city: required("address.city", a.city.as_deref())?,
        state: required("address.state", a.state.as_deref())?,
        zip: required("address.zip", a.zip.as_deref())?,
        country: required("address.country", a.country.as_deref())?,
    };

    let p = draft.parent.clone().unwrap_or_default();
    let parent = ParentContact {
        name: required("parent.name", p.name.as_deref())?,
        relationship: required("parent.relationship", p.relationship.as_deref())?,
        phone: required("parent.phone", p.phone.as_deref())?,
        email: required("parent.email", p.email.as_deref())?,
    };

    let package_type = required("degreePackageType", draft.degree_package_type.as_deref())?;
    let degree = match package_type.as_str() {
        "single" => {
            let d = draft.single_degree.clone().unwrap_or_default();
            DegreeSelection::Single {
                single_degree: SingleDegree {
                    degree_type: required("singleDegree.degreeType", d.degree_type.as_deref())?,
                    major: required("singleDegree.major", d.major.as_deref())?,
                },
            }
        }
        "multiple" => {
            let d = draft.multiple_degree.clone().unwrap_or_default();
            let combination_package = required(
                "multipleDegree.combinationPackage",
                d.combination_package.as_deref(),
            )?;
            let entries = d.degrees.unwrap_or_default();
            if entries.is_empty() {
                return Err(Error::validation(
                    "`multipleDegree.degrees` must contain at least one degree",
                ));
            }
            let degrees = entries
                .iter()
                .map(|entry| {
                    Ok(DegreeEntry {
                        degree_type: required(
                            "multipleDegree.degrees.degreeType",
                            entry.degree_type.as_deref(),
                        )?,
                        major: required("multipleDegree.degrees.major", entry.major.as_deref())?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            DegreeSelection::Multiple {
                multiple_degree: MultipleDegree {
                    combination_package,
                    degrees,
                },
            }
        }
        other => {
            return Err(Error::validation(format!(
                "`degreePackageType` must be `single` or `multiple` (got `{}`)",
                other
            )))
        }
    };

    Ok(NewApplication {
        first_name,
        last_name,
        email,
        phone,
        date_of_birth,
        gender,
        year_of_graduation,
        address,
        parent,
        degree,
        student_id: draft.student_id,
    })
}

/// Public multipart intake: all application fields plus optional
/// passport / drivingLicense / workExperience attachments.
pub async fn submit_application(
    Extension(pg): Extension<PgPool>,
    Extension(store): Extension<UploadStore>,
    Extension(mailer): Extension<Arc<Mailer>>,
    mut multipart: Multipart,
) -> Payload<StudentApplication> {
    let mut draft = ApplicationDraft::default();
    let mut files: Vec<(String, String, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let data = field.bytes().await?;
                if !data.is_empty() {
                    files.push((name, filename, data));
                }
            }
            None => {
                let text = field.text().await?;
                draft.set_field(&name, text);
            }
        }
    }

    let new = validate_draft(&draft)?;
    let documents = store_documents(&store, &files).await;
    let record = insert_application(&pg, new, documents).await?;
    mailer.notify_application_received(&record);
    creates(record)
}

/// Admin-side creation: same validation, JSON body, no files. Lives
/// behind the auth gate with the rest of the admin surface.
pub async fn create(
    Extension(pg): Extension<PgPool>,
    body: Result<Json<ApplicationDraft>, JsonRejection>,
) -> Payload<StudentApplication> {
    let draft = json_body(body)?;
    let new = validate_draft(&draft)?;
    let record = insert_application(&pg, new, Documents::default()).await?;
    creates(record)
}

/// One upload failure skips that document and keeps the submission
/// alive; the record is saved with whatever references succeeded.
async fn store_documents(store: &UploadStore, files: &[(String, String, Bytes)]) -> Documents {
    let mut documents = Documents::default();
    let mut work_index = 0usize;
    for (field, filename, data) in files {
        let stored = match field.as_str() {
            "passport" => store
                .save("passport", filename, data)
                .await
                .map(|path| documents.passport = Some(path)),
            "drivingLicense" => store
                .save("drivingLicense", filename, data)
                .await
                .map(|path| documents.driving_license = Some(path)),
            "workExperience" => {
                let result = store
                    .save_indexed("workExperience", work_index, filename, data)
                    .await
                    .map(|path| documents.work_experience.push(path));
                work_index += 1;
                result
            }
            other => {
                log::debug!("ignoring unexpected upload field `{}`", other);
                Ok(())
            }
        };
        if let Err(err) = stored {
            log::error!("failed to store `{}` upload: {:#}", field, err);
        }
    }
    documents
}

const SEQUENCE_BUMP: &str = "SELECT setval('student_id_seq',
                   GREATEST(last_value, $1),
                   is_called OR $1 >= last_value)
     FROM student_id_seq";

async fn insert_application(
    pg: &PgPool,
    new: NewApplication,
    documents: Documents,
) -> Result<StudentApplication, Error> {
    // An explicit id (admin path) must leave the sequence at or past
    // it, or a later nextval could collide with the inserted row. An
    // id below the sequence must not flip an untouched sequence to
    // "called", which would skip its first value.
    if let Some(explicit) = new.student_id {
        sqlx::query(SEQUENCE_BUMP).bind(explicit).execute(pg).await?;
    }

    sqlx::query_as::<_, StudentApplication>(
        "INSERT INTO student_applications
            (id, first_name, last_name, email, phone, date_of_birth, gender,
             address, degree, year_of_graduation, parent, documents,
             student_id, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                 COALESCE($13, nextval('student_id_seq')), $14, $15, $15)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.email)
    .bind(&new.phone)
    .bind(&new.date_of_birth)
    .bind(&new.gender)
    .bind(Jsonb(new.address.clone()))
    .bind(Jsonb(new.degree.clone()))
    .bind(&new.year_of_graduation)
    .bind(Jsonb(new.parent.clone()))
    .bind(Jsonb(documents))
    .bind(new.student_id)
    .bind(ApplicationStatus::Pending.as_str())
    .bind(Utc::now())
    .fetch_one(pg)
    .await
    .map_err(|err| match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            Error::validation("`studentId` already exists")
        }
        _ => Error::from(err),
    })
}

/// Shared filter for both list queries. The program lives inside the
/// degree JSONB, so the search extracts the major / combination-package
/// values; key names and the package tag are never matched.
const LIST_FILTER: &str = "WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2
                OR email ILIKE $2
                OR degree #>> '{singleDegree,major}' ILIKE $2
                OR degree #>> '{multipleDegree,combinationPackage}' ILIKE $2
                OR EXISTS (
                    SELECT 1
                    FROM jsonb_array_elements(degree #> '{multipleDegree,degrees}') AS entry
                    WHERE entry ->> 'major' ILIKE $2))";

pub async fn list(
    Query(query): Query<ListQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<PageOf<StudentApplication>> {
    let params = query.page_params();
    let status = query.status_filter();
    let pattern = query.search_pattern();

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM student_applications {}",
        LIST_FILTER
    ))
    .bind(&status)
    .bind(&pattern)
    .fetch_one(&pg)
    .await?;

    let records = sqlx::query_as::<_, StudentApplication>(&format!(
        "SELECT * FROM student_applications {}
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
        LIST_FILTER
    ))
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
) -> Payload<StudentApplication> {
    let id = parse_id(&id)?;
    let record = sqlx::query_as::<_, StudentApplication>(
        "SELECT * FROM student_applications WHERE id = $1 LIMIT 1",
    )
    .bind(id)
    .fetch_optional(&pg)
    .await?;
    match record {
        Some(record) => proceeds(record),
        None => breaks(Error::not_found("No such application")),
    }
}

/// Allow-listed mutation: status, admin notes and graduation year.
/// `studentId`, `documents` and everything else in the body is
/// ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPatch {
    pub status: Option<String>,
    pub admin_notes: Option<String>,
    pub year_of_graduation: Option<String>,
}

pub async fn update(
    Path(id): Path<String>,
    Extension(pg): Extension<PgPool>,
    body: Result<Json<ApplicationPatch>, JsonRejection>,
) -> Payload<StudentApplication> {
    let id = parse_id(&id)?;
    let patch = json_body(body)?;
    if let Some(status) = patch.status.as_deref() {
        if ApplicationStatus::parse(status).is_none() {
            return breaks(Error::validation(format!(
                "`status` must be one of pending, approved, rejected, in-review, \
                 certification-provided (got `{}`)",
                status
            )));
        }
    }

    let record = sqlx::query_as::<_, StudentApplication>(
        "UPDATE student_applications
         SET status = COALESCE($2, status),
             admin_notes = COALESCE($3, admin_notes),
             year_of_graduation = COALESCE($4, year_of_graduation),
             updated_at = $5
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&patch.status)
    .bind(&patch.admin_notes)
    .bind(&patch.year_of_graduation)
    .bind(Utc::now())
    .fetch_optional(&pg)
    .await?;

    match record {
        Some(record) => proceeds(record),
        None => breaks(Error::not_found("No such application")),
    }
}

pub async fn remove(Path(id): Path<String>, Extension(pg): Extension<PgPool>) -> Payload<Note> {
    let id = parse_id(&id)?;
    let result = sqlx::query("DELETE FROM student_applications WHERE id = $1")
        .bind(id)
        .execute(&pg)
        .await?;
    if result.rows_affected() < 1 {
        return breaks(Error::not_found("No such application"));
    }
    proceeds(Note::says("Application deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single_draft() -> ApplicationDraft {
        let mut draft = ApplicationDraft {
            first_name: Some("Jane".into()),
            last_name: Some("Smith".into()),
            email: Some("jane@example.com".into()),
            phone: Some("+1 555 0100".into()),
            date_of_birth: Some("2001-04-12".into()),
            gender: Some("female".into()),
            year_of_graduation: Some("2026".into()),
            degree_package_type: Some("single".into()),
            ..Default::default()
        };
        draft.address = Some(AddressDraft {
            street: Some("1 Main St".into()),
            city: Some("Springfield".into()),
            state: Some("IL".into()),
            zip: Some("62701".into()),
            country: Some("USA".into()),
        });
        draft.parent = Some(ParentDraft {
            name: Some("John Smith".into()),
            relationship: Some("father".into()),
            phone: Some("+1 555 0101".into()),
            email: Some("john@example.com".into()),
        });
        draft.single_degree = Some(SingleDegreeDraft {
            degree_type: Some("bachelor".into()),
            major: Some("History".into()),
        });
        draft
    }

    fn violation_field(draft: &ApplicationDraft) -> String {
        match validate_draft(draft) {
            Err(Error::Validation { message }) => message,
            Err(other) => panic!("expected a validation error, got {:?}", other),
            Ok(_) => panic!("expected a validation error, draft passed"),
        }
    }

    #[test]
    fn valid_single_draft_passes() {
        let new = validate_draft(&single_draft()).unwrap();
        assert_eq!(new.first_name, "Jane");
        assert_eq!(new.degree.program(), "History");
        assert!(new.student_id.is_none());
    }

    #[test]
    fn top_level_fields_checked_before_address() {
        let mut draft = single_draft();
        draft.first_name = None;
        draft.address = None;
        assert!(violation_field(&draft).contains("firstName"));
    }

    #[test]
    fn address_checked_before_parent() {
        let mut draft = single_draft();
        draft.address.as_mut().unwrap().zip = Some("  ".into());
        draft.parent = None;
        assert!(violation_field(&draft).contains("address.zip"));
    }

    #[test]
    fn parent_checked_before_degree() {
        let mut draft = single_draft();
        draft.parent.as_mut().unwrap().relationship = None;
        draft.single_degree = None;
        assert!(violation_field(&draft).contains("parent.relationship"));
    }

    #[test]
    fn single_package_requires_degree_and_major() {
        let mut draft = single_draft();
        draft.single_degree.as_mut().unwrap().major = None;
        assert!(violation_field(&draft).contains("singleDegree.major"));

        draft.single_degree = None;
        assert!(violation_field(&draft).contains("singleDegree.degreeType"));
    }

    #[test]
    fn multiple_package_requires_entries() {
        let mut draft = single_draft();
        draft.degree_package_type = Some("multiple".into());
        assert!(violation_field(&draft).contains("multipleDegree.combinationPackage"));

        draft.multiple_degree = Some(MultipleDegreeDraft {
            combination_package: Some("bachelor-master".into()),
            degrees: Some(vec![]),
        });
        assert!(violation_field(&draft).contains("multipleDegree.degrees"));

        draft.multiple_degree.as_mut().unwrap().degrees = Some(vec![DegreeEntryDraft {
            degree_type: Some("bachelor".into()),
            major: Some("Physics".into()),
        }]);
        let new = validate_draft(&draft).unwrap();
        assert_eq!(new.degree.program(), "bachelor-master");
    }

    #[test]
    fn unknown_package_type_is_rejected() {
        let mut draft = single_draft();
        draft.degree_package_type = Some("both".into());
        assert!(violation_field(&draft).contains("degreePackageType"));
    }

    #[test]
    fn multipart_fields_route_into_the_draft() {
        let mut draft = ApplicationDraft::default();
        draft.set_field("firstName", "Jane".into());
        draft.set_field("street", "1 Main St".into());
        draft.set_field("parentEmail", "john@example.com".into());
        draft.set_field("degreePackageType", "multiple".into());
        draft.set_field("combinationPackage", "bachelor-master".into());
        draft.set_field(
            "degrees",
            r#"[{"degreeType": "bachelor", "major": "Physics"}]"#.into(),
        );
        draft.set_field("somethingElse", "ignored".into());

        assert_eq!(draft.first_name.as_deref(), Some("Jane"));
        assert_eq!(
            draft.address.as_ref().unwrap().street.as_deref(),
            Some("1 Main St")
        );
        assert_eq!(
            draft.parent.as_ref().unwrap().email.as_deref(),
            Some("john@example.com")
        );
        let multiple = draft.multiple_degree.as_ref().unwrap();
        assert_eq!(
            multiple.degrees.as_ref().unwrap()[0].major.as_deref(),
            Some("Physics")
        );
    }

    #[test]
    fn search_extracts_program_text_not_raw_json() {
        // Substring-matching the serialized JSONB would make terms
        // like `degree` or `single` hit key names and the package tag
        // on every row.
        assert!(!LIST_FILTER.contains("degree::text"));
        assert!(LIST_FILTER.contains("#>> '{singleDegree,major}'"));
        assert!(LIST_FILTER.contains("#>> '{multipleDegree,combinationPackage}'"));
        assert!(LIST_FILTER.contains("entry ->> 'major'"));
    }

    #[test]
    fn explicit_id_bump_never_consumes_the_seed() {
        // Two-argument setval marks the sequence as called, so a bump
        // by an id below the seed would skip the seed value entirely.
        assert!(SEQUENCE_BUMP.contains("GREATEST(last_value, $1)"));
        assert!(SEQUENCE_BUMP.contains("is_called OR $1 >= last_value"));
    }

    #[test]
    fn json_draft_deserializes_nested_blocks() {
        let draft: ApplicationDraft = serde_json::from_value(json!({
            "firstName": "Jane",
            "lastName": "Smith",
            "address": {"street": "1 Main St", "city": "Springfield"},
            "parent": {"name": "John Smith"},
            "degreePackageType": "single",
            "singleDegree": {"degreeType": "bachelor", "major": "History"},
            "studentId": 1000005,
            "documents": {"passport": "should-be-ignored.pdf"}
        }))
        .unwrap();
        assert_eq!(draft.student_id, Some(1_000_005));
        assert_eq!(
            draft.single_degree.as_ref().unwrap().major.as_deref(),
            Some("History")
        );
        // `documents` is not part of the draft, so the client cannot
        // inject document references.
    }
}
