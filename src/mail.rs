use crate::config::MailConfig;
use crate::models::StudentApplication;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery seam. The server only builds messages; transporting them
/// is an external collaborator's job, so a failed or absent transport
/// never fails a submission.
pub trait MailTransport: Send + Sync {
    fn deliver(&self, message: &EmailMessage);
}

/// Default transport: records the outbound message in the server log.
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn deliver(&self, message: &EmailMessage) {
        log::info!(
            "outbound mail to <{}>: {} ({} bytes)",
            message.to,
            message.subject,
            message.body.len()
        );
    }
}

pub struct Mailer {
    config: Option<MailConfig>,
    transport: Box<dyn MailTransport>,
}

impl Mailer {
    pub fn new(config: Option<MailConfig>) -> Mailer {
        if config.is_none() {
            log::warn!("mail is not configured, application notifications are disabled");
        }
        Mailer {
            config,
            transport: Box::new(LogTransport),
        }
    }

    #[cfg(test)]
    pub fn with_transport(config: Option<MailConfig>, transport: Box<dyn MailTransport>) -> Mailer {
        Mailer { config, transport }
    }

    /// Notifies both the admissions inbox and the applicant. No-op
    /// when mail is unconfigured.
    pub fn notify_application_received(&self, application: &StudentApplication) {
        let config = match &self.config {
            Some(config) => config,
            None => return,
        };
        for message in build_notifications(config, application) {
            self.transport.deliver(&message);
        }
    }
}

fn build_notifications(
    config: &MailConfig,
    application: &StudentApplication,
) -> Vec<EmailMessage> {
    let applicant = format!("{} {}", application.first_name, application.last_name);
    vec![
        EmailMessage {
            from: config.from.clone(),
            to: config.admissions_inbox.clone(),
            subject: format!("New application #{} from {}", application.student_id, applicant),
            body: format!(
                "{} applied for {} (status: {}).",
                applicant,
                application.degree.program(),
                application.status
            ),
        },
        EmailMessage {
            from: config.from.clone(),
            to: application.email.clone(),
            subject: "We received your application".to_string(),
            body: format!(
                "Dear {}, your application was received. Your student id is {}.",
                applicant, application.student_id
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Address, DegreeSelection, Documents, ParentContact, SingleDegree,
    };
    use chrono::Utc;
    use sqlx::types::Json;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[derive(Clone, Default)]
    struct RecordingTransport(Arc<Mutex<Vec<EmailMessage>>>);

    impl MailTransport for RecordingTransport {
        fn deliver(&self, message: &EmailMessage) {
            self.0.lock().unwrap().push(message.clone());
        }
    }

    fn sample_application() -> StudentApplication {
        StudentApplication {
            id: Uuid::new_v4(),
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            email: "jane@example.com".into(),
            phone: "+1 555 0100".into(),
            date_of_birth: "2001-04-12".into(),
            gender: "female".into(),
            address: Json(Address {
                street: "1 Main St".into(),
                city: "Springfield".into(),
                state: "IL".into(),
                zip: "62701".into(),
                country: "USA".into(),
            }),
            degree: Json(DegreeSelection::Single {
                single_degree: SingleDegree {
                    degree_type: "bachelor".into(),
                    major: "History".into(),
                },
            }),
            year_of_graduation: "2026".into(),
            parent: Json(ParentContact {
                name: "John Smith".into(),
                relationship: "father".into(),
                phone: "+1 555 0101".into(),
                email: "john@example.com".into(),
            }),
            documents: Json(Documents::default()),
            student_id: 1_000_001,
            status: "pending".into(),
            admin_notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn notifies_institution_and_applicant() {
        let recorder = RecordingTransport::default();
        let mailer = Mailer::with_transport(
            Some(MailConfig {
                from: "no-reply@example.edu".into(),
                admissions_inbox: "admissions@example.edu".into(),
            }),
            Box::new(recorder.clone()),
        );
        mailer.notify_application_received(&sample_application());

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "admissions@example.edu");
        assert!(sent[0].subject.contains("1000001"));
        assert_eq!(sent[1].to, "jane@example.com");
        assert!(sent[1].body.contains("1000001"));
    }

    #[test]
    fn unconfigured_mailer_is_silent() {
        let mailer = Mailer::new(None);
        mailer.notify_application_received(&sample_application());
    }
}
