use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

pub const APPOINTMENT_REQUIRED_FIELDS: [&str; 6] = ["name", "email", "phone", "date", "time", "type"];
pub const CONTACT_REQUIRED_FIELDS: [&str; 3] = ["name", "email", "message"];

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date: String,
    pub time: String,
    pub kind: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date: String,
    pub time: String,
    pub kind: Option<String>,
    pub message: Option<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub kind: Option<String>,
    pub message: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub id: String,
    pub full_name: String,
    pub contact_number: String,
    pub address: String,
    pub product_name: String,
    pub client_id: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub whatsapp_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRepair {
    pub full_name: String,
    pub contact_number: String,
    pub address: String,
    pub product_name: String,
    pub client_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairUpdate {
    pub status: Option<String>,
    pub whatsapp_sent: Option<bool>,
}

impl NewAppointment {
    /// Err carries the first missing required field name.
    pub fn from_body(body: &Map<String, Value>) -> Result<Self, String> {
        for field in APPOINTMENT_REQUIRED_FIELDS {
            if text_field(body, &[field]).is_none() {
                return Err(field.to_string());
            }
        }
        let required = |key: &str| text_field(body, &[key]).unwrap_or_default();
        Ok(Self {
            name: required("name"),
            email: required("email"),
            phone: required("phone"),
            date: required("date"),
            time: required("time"),
            kind: text_field(body, &["type"]),
            message: Some(text_field(body, &["message"]).unwrap_or_default()),
        })
    }
}

impl AppointmentUpdate {
    pub fn from_body(body: &Map<String, Value>) -> Self {
        Self {
            name: text_field(body, &["name"]),
            email: text_field(body, &["email"]),
            phone: text_field(body, &["phone"]),
            date: text_field(body, &["date"]),
            time: text_field(body, &["time"]),
            kind: text_field(body, &["type"]),
            message: text_field(body, &["message"]),
            status: text_field(body, &["status"]),
        }
    }
}

impl NewContact {
    pub fn from_body(body: &Map<String, Value>) -> Result<Self, String> {
        for field in CONTACT_REQUIRED_FIELDS {
            if text_field(body, &[field]).is_none() {
                return Err(field.to_string());
            }
        }
        Ok(Self {
            name: text_field(body, &["name"]).unwrap_or_default(),
            email: text_field(body, &["email"]).unwrap_or_default(),
            message: text_field(body, &["message"]).unwrap_or_default(),
        })
    }
}

impl NewRepair {
    /// Accepts camelCase or snake_case keys. Err is the user-facing message.
    pub fn from_body(body: &Map<String, Value>) -> Result<Self, String> {
        let full_name = text_field(body, &["fullName", "full_name"])
            .ok_or_else(|| "Full name is required".to_string())?;
        let contact_number = text_field(body, &["contactNumber", "contact_number"])
            .ok_or_else(|| "Contact number is required".to_string())?;
        let address =
            text_field(body, &["address"]).ok_or_else(|| "Address is required".to_string())?;
        let product_name = text_field(body, &["productName", "product_name"])
            .ok_or_else(|| "Product name is required".to_string())?;
        Ok(Self {
            full_name,
            contact_number,
            address,
            product_name,
            client_id: text_field(body, &["clientId", "client_id"]),
            message: Some(text_field(body, &["message"]).unwrap_or_default()),
        })
    }
}

impl RepairUpdate {
    pub fn from_body(body: &Map<String, Value>) -> Self {
        Self {
            status: text_field(body, &["status"]),
            whatsapp_sent: body
                .get("whatsapp_sent")
                .or_else(|| body.get("whatsappSent"))
                .and_then(Value::as_bool),
        }
    }
}

impl Appointment {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "phone": self.phone,
            "date": self.date,
            "time": self.time,
            "type": self.kind,
            "message": self.message,
            "status": self.status,
            "created_at": iso(&self.created_at),
            "updated_at": self.updated_at.as_ref().map(iso),
        })
    }
}

impl Contact {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "message": self.message,
            "status": self.status,
            "created_at": iso(&self.created_at),
            "updated_at": self.updated_at.as_ref().map(iso),
        })
    }
}

impl Repair {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "full_name": self.full_name,
            "contact_number": self.contact_number,
            "address": self.address,
            "product_name": self.product_name,
            "client_id": self.client_id,
            "message": self.message,
            "status": self.status,
            "whatsapp_sent": self.whatsapp_sent,
            "created_at": iso(&self.created_at),
            "updated_at": self.updated_at.as_ref().map(iso),
        })
    }
}

/// First non-empty string under any of `keys`.
fn text_field(body: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .filter_map(Value::as_str)
        .find(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn iso(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}
