use serde::{Deserialize, Serialize};

use crate::domain::{ContactFields, PublicKey, ServiceId, TemplateId};

/// Template parameters handed to the mail-dispatch service. The key names
/// are bound to the service-side template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub from_name: String,
    pub from_email: String,
    pub message: String,
    pub to_name: String,
}

impl ContactPayload {
    pub fn from_fields(fields: &ContactFields, to_name: &str) -> Self {
        Self {
            from_name: fields.name.clone(),
            from_email: fields.email.clone(),
            message: fields.message.clone(),
            to_name: to_name.to_string(),
        }
    }
}

/// Body of the dispatch service's send endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSendRequest {
    pub service_id: ServiceId,
    pub template_id: TemplateId,
    pub user_id: PublicKey,
    pub template_params: ContactPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_template_key_names() {
        let fields = ContactFields {
            name: "Jane".into(),
            email: "jane@example.com".into(),
            message: "hello".into(),
        };
        let value =
            serde_json::to_value(ContactPayload::from_fields(&fields, "Mihir")).expect("json");

        assert_eq!(value["from_name"], "Jane");
        assert_eq!(value["from_email"], "jane@example.com");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["to_name"], "Mihir");
    }

    #[test]
    fn send_request_flattens_newtypes() {
        let request = EmailSendRequest {
            service_id: ServiceId("service_x".into()),
            template_id: TemplateId("template_y".into()),
            user_id: PublicKey("pk".into()),
            template_params: ContactPayload::from_fields(&ContactFields::default(), "Mihir"),
        };
        let value = serde_json::to_value(&request).expect("json");

        assert_eq!(value["service_id"], "service_x");
        assert_eq!(value["template_id"], "template_y");
        assert_eq!(value["user_id"], "pk");
        assert_eq!(value["template_params"]["to_name"], "Mihir");
    }
}
