use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// A person permitted to manage applications and messages. Created by
/// the out-of-band provisioning step, never over HTTP. Rows come in
/// through `FromRow` only; nothing deserializes an admin from a body.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminAccount {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminAccount {
    pub fn public_profile(&self) -> AdminProfile {
        AdminProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            last_login: self.last_login,
        }
    }
}

/// The hash-free view of an admin returned by login and `/admin/me`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub last_login: Option<DateTime<Utc>>,
}

pub const ADMIN_ROLES: [&str; 2] = ["admin", "super-admin"];

/// An inbound inquiry from a site visitor. Visitors only create;
/// status transitions are admin-driven.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    New,
    Read,
    Replied,
    Closed,
}

impl ContactStatus {
    pub fn parse(raw: &str) -> Option<ContactStatus> {
        match raw {
            "new" => Some(ContactStatus::New),
            "read" => Some(ContactStatus::Read),
            "replied" => Some(ContactStatus::Replied),
            "closed" => Some(ContactStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Read => "read",
            ContactStatus::Replied => "replied",
            ContactStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    InReview,
    CertificationProvided,
}

impl ApplicationStatus {
    pub fn parse(raw: &str) -> Option<ApplicationStatus> {
        match raw {
            "pending" => Some(ApplicationStatus::Pending),
            "approved" => Some(ApplicationStatus::Approved),
            "rejected" => Some(ApplicationStatus::Rejected),
            "in-review" => Some(ApplicationStatus::InReview),
            "certification-provided" => Some(ApplicationStatus::CertificationProvided),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::InReview => "in-review",
            ApplicationStatus::CertificationProvided => "certification-provided",
        }
    }
}

/// A degree-program application.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentApplication {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: String,
    pub gender: String,
    pub address: Json<Address>,
    #[serde(flatten)]
    pub degree: Json<DegreeSelection>,
    pub year_of_graduation: String,
    pub parent: Json<ParentContact>,
    pub documents: Json<Documents>,
    pub student_id: i64,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The degree(s) an applicant is applying for. The discriminant is the
/// serde tag, so a record can never carry both shapes at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "degreePackageType")]
pub enum DegreeSelection {
    #[serde(rename = "single")]
    Single {
        #[serde(rename = "singleDegree")]
        single_degree: SingleDegree,
    },
    #[serde(rename = "multiple")]
    Multiple {
        #[serde(rename = "multipleDegree")]
        multiple_degree: MultipleDegree,
    },
}

impl DegreeSelection {
    /// The program line shown in public views: the major for a single
    /// degree, the combination package name for a bundle.
    pub fn program(&self) -> &str {
        match self {
            DegreeSelection::Single { single_degree } => &single_degree.major,
            DegreeSelection::Multiple { multiple_degree } => &multiple_degree.combination_package,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleDegree {
    pub degree_type: String,
    pub major: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipleDegree {
    pub combination_package: String,
    pub degrees: Vec<DegreeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeEntry {
    pub degree_type: String,
    pub major: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentContact {
    pub name: String,
    pub relationship: String,
    pub phone: String,
    pub email: String,
}

/// Relative upload paths attached to an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Documents {
    pub passport: Option<String>,
    pub driving_license: Option<String>,
    #[serde(default)]
    pub work_experience: Vec<String>,
}
