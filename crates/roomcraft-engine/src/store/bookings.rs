use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use roomcraft_contracts::bookings::{
    Appointment, AppointmentUpdate, Contact, NewAppointment, NewContact, NewRepair, Repair,
    RepairUpdate,
};

use super::{new_id, now_utc, parse_timestamp, timestamp_text, SqliteStore, StoreError};

const APPOINTMENT_COLUMNS: &str =
    "id,name,email,phone,date,time,type,message,status,created_at,updated_at";
const CONTACT_COLUMNS: &str = "id,name,email,message,status,created_at,updated_at";
const REPAIR_COLUMNS: &str = "id,full_name,contact_number,address,product_name,client_id,message,status,whatsapp_sent,created_at,updated_at";

impl SqliteStore {
    pub fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, StoreError> {
        let appointment = Appointment {
            id: new_id(),
            name: new.name.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            date: new.date.clone(),
            time: new.time.clone(),
            kind: new.kind.clone(),
            message: new.message.clone(),
            status: "pending".to_string(),
            created_at: now_utc(),
            updated_at: None,
        };
        self.write(|tx| {
            tx.execute(
                r#"
                INSERT INTO appointments(id,name,email,phone,date,time,type,message,status,created_at)
                VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                "#,
                params![
                    appointment.id,
                    appointment.name,
                    appointment.email,
                    appointment.phone,
                    appointment.date,
                    appointment.time,
                    appointment.kind,
                    appointment.message,
                    appointment.status,
                    timestamp_text(&appointment.created_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(appointment)
    }

    /// Newest first.
    pub fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        self.read(|conn| {
            select_many(
                conn,
                &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY created_at DESC"),
                appointment_row,
            )
        })
    }

    pub fn get_appointment(&self, id: &str) -> Result<Appointment, StoreError> {
        self.read(|conn| load_appointment(conn, id))
    }

    pub fn update_appointment(
        &self,
        id: &str,
        update: &AppointmentUpdate,
    ) -> Result<Appointment, StoreError> {
        self.write(|tx| {
            let mut current = load_appointment(tx, id)?;
            let apply = |slot: &mut String, value: &Option<String>| {
                if let Some(value) = value {
                    *slot = value.clone();
                }
            };
            apply(&mut current.name, &update.name);
            apply(&mut current.email, &update.email);
            apply(&mut current.phone, &update.phone);
            apply(&mut current.date, &update.date);
            apply(&mut current.time, &update.time);
            apply(&mut current.status, &update.status);
            if update.kind.is_some() {
                current.kind = update.kind.clone();
            }
            if update.message.is_some() {
                current.message = update.message.clone();
            }
            let now = now_utc();
            current.updated_at = Some(now);
            tx.execute(
                r#"
                UPDATE appointments
                SET name=?2,email=?3,phone=?4,date=?5,time=?6,type=?7,message=?8,status=?9,updated_at=?10
                WHERE id=?1
                "#,
                params![
                    current.id,
                    current.name,
                    current.email,
                    current.phone,
                    current.date,
                    current.time,
                    current.kind,
                    current.message,
                    current.status,
                    timestamp_text(&now),
                ],
            )?;
            Ok(current)
        })
    }

    pub fn delete_appointment(&self, id: &str) -> Result<(), StoreError> {
        self.delete_row("appointments", id)
    }

    pub fn create_contact(&self, new: &NewContact) -> Result<Contact, StoreError> {
        let contact = Contact {
            id: new_id(),
            name: new.name.clone(),
            email: new.email.clone(),
            message: new.message.clone(),
            status: "unread".to_string(),
            created_at: now_utc(),
            updated_at: None,
        };
        self.write(|tx| {
            tx.execute(
                "INSERT INTO contacts(id,name,email,message,status,created_at) VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    contact.id,
                    contact.name,
                    contact.email,
                    contact.message,
                    contact.status,
                    timestamp_text(&contact.created_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(contact)
    }

    pub fn list_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        self.read(|conn| {
            select_many(
                conn,
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY created_at DESC"),
                contact_row,
            )
        })
    }

    pub fn get_contact(&self, id: &str) -> Result<Contact, StoreError> {
        self.read(|conn| load_contact(conn, id))
    }

    /// Contacts only ever change status.
    pub fn update_contact_status(
        &self,
        id: &str,
        status: Option<&str>,
    ) -> Result<Contact, StoreError> {
        self.write(|tx| {
            let mut current = load_contact(tx, id)?;
            if let Some(status) = status {
                current.status = status.to_string();
            }
            let now = now_utc();
            current.updated_at = Some(now);
            tx.execute(
                "UPDATE contacts SET status=?2,updated_at=?3 WHERE id=?1",
                params![current.id, current.status, timestamp_text(&now)],
            )?;
            Ok(current)
        })
    }

    pub fn delete_contact(&self, id: &str) -> Result<(), StoreError> {
        self.delete_row("contacts", id)
    }

    pub fn create_repair(&self, new: &NewRepair) -> Result<Repair, StoreError> {
        let repair = Repair {
            id: new_id(),
            full_name: new.full_name.clone(),
            contact_number: new.contact_number.clone(),
            address: new.address.clone(),
            product_name: new.product_name.clone(),
            client_id: new.client_id.clone(),
            message: new.message.clone(),
            status: "pending".to_string(),
            whatsapp_sent: false,
            created_at: now_utc(),
            updated_at: None,
        };
        self.write(|tx| {
            tx.execute(
                r#"
                INSERT INTO repairs(id,full_name,contact_number,address,product_name,client_id,message,status,whatsapp_sent,created_at)
                VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                "#,
                params![
                    repair.id,
                    repair.full_name,
                    repair.contact_number,
                    repair.address,
                    repair.product_name,
                    repair.client_id,
                    repair.message,
                    repair.status,
                    repair.whatsapp_sent,
                    timestamp_text(&repair.created_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(repair)
    }

    pub fn list_repairs(&self) -> Result<Vec<Repair>, StoreError> {
        self.read(|conn| {
            select_many(
                conn,
                &format!("SELECT {REPAIR_COLUMNS} FROM repairs ORDER BY created_at DESC"),
                repair_row,
            )
        })
    }

    pub fn get_repair(&self, id: &str) -> Result<Repair, StoreError> {
        self.read(|conn| load_repair(conn, id))
    }

    pub fn update_repair(&self, id: &str, update: &RepairUpdate) -> Result<Repair, StoreError> {
        self.write(|tx| {
            let mut current = load_repair(tx, id)?;
            if let Some(status) = &update.status {
                current.status = status.clone();
            }
            if let Some(sent) = update.whatsapp_sent {
                current.whatsapp_sent = sent;
            }
            let now = now_utc();
            current.updated_at = Some(now);
            tx.execute(
                "UPDATE repairs SET status=?2,whatsapp_sent=?3,updated_at=?4 WHERE id=?1",
                params![
                    current.id,
                    current.status,
                    current.whatsapp_sent,
                    timestamp_text(&now)
                ],
            )?;
            Ok(current)
        })
    }

    pub fn delete_repair(&self, id: &str) -> Result<(), StoreError> {
        self.delete_row("repairs", id)
    }

    fn delete_row(&self, table: &'static str, id: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            let removed = tx.execute(&format!("DELETE FROM {table} WHERE id=?1"), params![id])?;
            if removed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }
}

type RowMapper<T> = fn(&Row<'_>) -> rusqlite::Result<T>;

fn select_many<T>(conn: &Connection, sql: &str, map: RowMapper<T>) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn select_one<T>(
    conn: &Connection,
    sql: &str,
    id: &str,
    map: RowMapper<T>,
) -> Result<T, StoreError> {
    conn.query_row(sql, params![id], map)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn load_appointment(conn: &Connection, id: &str) -> Result<Appointment, StoreError> {
    select_one(
        conn,
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id=?1"),
        id,
        appointment_row,
    )
}

fn load_contact(conn: &Connection, id: &str) -> Result<Contact, StoreError> {
    select_one(
        conn,
        &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id=?1"),
        id,
        contact_row,
    )
}

fn load_repair(conn: &Connection, id: &str) -> Result<Repair, StoreError> {
    select_one(
        conn,
        &format!("SELECT {REPAIR_COLUMNS} FROM repairs WHERE id=?1"),
        id,
        repair_row,
    )
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
    })
}

fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn appointment_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        date: row.get(4)?,
        time: row.get(5)?,
        kind: row.get(6)?,
        message: row.get(7)?,
        status: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
        updated_at: optional_timestamp_column(row, 10)?,
    })
}

fn contact_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        message: row.get(3)?,
        status: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: optional_timestamp_column(row, 6)?,
    })
}

fn repair_row(row: &Row<'_>) -> rusqlite::Result<Repair> {
    Ok(Repair {
        id: row.get(0)?,
        full_name: row.get(1)?,
        contact_number: row.get(2)?,
        address: row.get(3)?,
        product_name: row.get(4)?,
        client_id: row.get(5)?,
        message: row.get(6)?,
        status: row.get(7)?,
        whatsapp_sent: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
        updated_at: optional_timestamp_column(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn open_store(dir: &tempfile::TempDir) -> Result<SqliteStore, StoreError> {
        SqliteStore::open(dir.path().join("interior_design.db"))
    }

    #[test]
    fn appointment_lifecycle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = open_store(&temp)?;
        let new = NewAppointment::from_body(&body(json!({
            "name": "Ada", "email": "ada@example.test", "phone": "555",
            "date": "2025-03-01", "time": "10:00", "type": "consultation"
        })))
        .map_err(anyhow::Error::msg)?;

        let created = store.create_appointment(&new)?;
        assert_eq!(created.status, "pending");
        assert_eq!(created.message.as_deref(), Some(""));

        let updated = store.update_appointment(
            &created.id,
            &AppointmentUpdate::from_body(&body(json!({"status": "confirmed", "time": "11:30"}))),
        )?;
        assert_eq!(updated.status, "confirmed");
        assert_eq!(updated.time, "11:30");
        assert_eq!(updated.name, "Ada");
        assert!(updated.updated_at.is_some());
        assert_eq!(store.get_appointment(&created.id)?, updated);

        store.delete_appointment(&created.id)?;
        assert!(matches!(
            store.get_appointment(&created.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_appointment(&created.id),
            Err(StoreError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn lists_are_newest_first() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = open_store(&temp)?;
        for name in ["first", "second"] {
            store.create_contact(&NewContact {
                name: name.to_string(),
                email: "x@example.test".to_string(),
                message: "hello".to_string(),
            })?;
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let names: Vec<String> = store
            .list_contacts()?
            .into_iter()
            .map(|contact| contact.name)
            .collect();
        assert_eq!(names, vec!["second", "first"]);
        Ok(())
    }

    #[test]
    fn contact_update_touches_status_only() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = open_store(&temp)?;
        let created = store.create_contact(&NewContact {
            name: "Grace".to_string(),
            email: "grace@example.test".to_string(),
            message: "Quote please".to_string(),
        })?;
        assert_eq!(created.status, "unread");

        let updated = store.update_contact_status(&created.id, Some("read"))?;
        assert_eq!(updated.status, "read");
        assert_eq!(updated.message, "Quote please");
        Ok(())
    }

    #[test]
    fn repair_flags_update() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = open_store(&temp)?;
        let new = NewRepair::from_body(&body(json!({
            "fullName": "Linus", "contactNumber": "555", "address": "1 Main St",
            "productName": "Sofa", "clientId": "c-9"
        })))
        .map_err(anyhow::Error::msg)?;
        let created = store.create_repair(&new)?;
        assert!(!created.whatsapp_sent);
        assert_eq!(created.client_id.as_deref(), Some("c-9"));

        let updated = store.update_repair(
            &created.id,
            &RepairUpdate {
                status: Some("in_progress".to_string()),
                whatsapp_sent: Some(true),
            },
        )?;
        assert!(updated.whatsapp_sent);
        assert_eq!(store.list_repairs()?, vec![updated]);
        Ok(())
    }

    #[test]
    fn updating_unknown_rows_is_not_found() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = open_store(&temp)?;
        assert!(matches!(
            store.update_contact_status("nope", Some("read")),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.update_repair("nope", &RepairUpdate::default()),
            Err(StoreError::NotFound(_))
        ));
        Ok(())
    }
}
