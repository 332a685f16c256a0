//! Doctors, as stored in the `doctors` collection

use serde::{Deserialize, Serialize};

use crate::config::DOCTORS;
use crate::record::{Document, RecordId};

/// A doctor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    /// `None` until the doctor has been saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,

    name: String,
    #[serde(default)]
    specialty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,

    /// Login credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,

    /// Set by the data manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    /// Set by the data manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl Doctor {
    /// A doctor that has not been saved yet
    pub fn new(name: String, specialty: String) -> Self {
        Self {
            id: None,
            name,
            specialty,
            email: None,
            phone: None,
            username: None,
            password: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_contact(mut self, email: Option<String>, phone: Option<String>) -> Self {
        self.email = email;
        self.phone = phone;
        self
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub fn name(&self) -> &str                  { &self.name }
    pub fn specialty(&self) -> &str             { &self.specialty }
    pub fn email(&self) -> Option<&str>         { self.email.as_deref() }
    pub fn phone(&self) -> Option<&str>         { self.phone.as_deref() }
    pub fn username(&self) -> Option<&str>      { self.username.as_deref() }
    pub fn created_at(&self) -> Option<&str>    { self.created_at.as_deref() }
    pub fn updated_at(&self) -> Option<&str>    { self.updated_at.as_deref() }

    /// Whether these credentials are the ones of this doctor
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.username.as_deref() == Some(username) && self.password.as_deref() == Some(password)
    }

    pub fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn set_specialty(&mut self, specialty: String) {
        self.specialty = specialty;
    }
}

impl Document for Doctor {
    const COLLECTION: &'static str = DOCTORS;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::record::Record;

    #[test]
    fn doctor_from_record() {
        let record = Record::from_value(json!({
            "id": 42,
            "name": "Gregory House",
            "specialty": "Diagnostics",
            "email": "house@example.org",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-02T00:00:00.000Z",
        })).unwrap();

        let doctor = Doctor::from_record(&record).unwrap();
        assert_eq!(doctor.id().unwrap().as_str(), "42");
        assert_eq!(doctor.name(), "Gregory House");
        assert_eq!(doctor.email(), Some("house@example.org"));
        assert_eq!(doctor.phone(), None);
        assert_eq!(doctor.updated_at(), Some("2024-01-02T00:00:00.000Z"));
    }

    #[test]
    fn fields_never_carry_the_id() {
        let mut doctor = Doctor::new("Ana".to_string(), "Cardiology".to_string())
            .with_credentials("ana".to_string(), "secret".to_string());
        doctor.set_id(RecordId::parse("abc").unwrap());

        let fields = doctor.to_fields().unwrap();
        assert!(fields.get("id").is_none());
        assert_eq!(fields.get("specialty"), Some(&json!("Cardiology")));
        assert!(fields.get("email").is_none());
        assert!(doctor.check_credentials("ana", "secret"));
        assert!(doctor.check_credentials("ana", "wrong") == false);
    }
}
