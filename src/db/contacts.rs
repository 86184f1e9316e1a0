use chrono::Utc;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

use super::error::is_unique_violation;
use super::{parse_timestamp, tags, Database, EmptyTagsPolicy, StoreError};
use crate::models::{Contact, ContactInput};

/// Page size used when the caller asks for a non-positive limit.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Outcome of the find-or-create step inside an upsert.
enum Matched {
    Created(i64),
    Existing(i64),
}

impl Database {
    // ==================== CONTACT UPSERT ====================

    /// Create the contact for `input.email`, or refresh the existing one, and
    /// link every submitted tag to it. All of it commits together or not at
    /// all. Returns the contact id.
    ///
    /// An update with no tags follows `StoreOptions::empty_tags`. A new
    /// contact may always start with zero tags.
    pub fn upsert_contact(&self, input: &ContactInput) -> Result<i64, StoreError> {
        if input.email.is_empty() {
            return Err(StoreError::EmailRequired);
        }

        let attempts = self.options.conflict_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.upsert_once(input) {
                Err(e) if e.is_retryable() => {
                    // A lock wait that ran into the deadline is a timeout
                    self.check_deadline()?;
                    if attempt >= attempts {
                        return Err(e);
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn upsert_once(&self, input: &ContactInput) -> Result<i64, StoreError> {
        self.check_deadline()?;
        self.bound_lock_wait()?;

        // IMMEDIATE takes the write lock up front so two upserts for the same
        // email cannot both read "absent" and race to insert.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();
        let tag_texts = input.distinct_tags();

        let contact_id = match find_or_create_contact(&tx, input, &now)? {
            Matched::Created(id) => id,
            Matched::Existing(id) => {
                if tag_texts.is_empty() && self.options.empty_tags == EmptyTagsPolicy::Reject {
                    return Err(StoreError::TagsRequired);
                }
                update_contact_fields(&tx, id, input, &now)?;
                id
            }
        };

        tags::reconcile(&tx, contact_id, &tag_texts, &now)?;

        self.check_deadline()?;
        tx.commit()?;
        Ok(contact_id)
    }

    // ==================== CONTACT READ ====================

    /// Contact with its tags, or `None` for ids that were never issued
    /// (including zero and negative ids).
    pub fn get_contact_by_id(&self, id: i64) -> Result<Option<Contact>, StoreError> {
        if id <= 0 {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare("SELECT * FROM contacts WHERE id = ?")?;
        let result = stmt.query_row([id], Self::row_to_contact);

        let mut contact = match result {
            Ok(contact) => contact,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        contact.tags = self.get_tags_for_contact(id)?;
        Ok(Some(contact))
    }

    pub fn get_contact_by_email(&self, email: &str) -> Result<Option<Contact>, StoreError> {
        let id = match find_contact_id(&self.conn, email)? {
            Some(id) => id,
            None => return Ok(None),
        };
        self.get_contact_by_id(id)
    }

    /// A page of contacts in creation order, without tags. Non-positive
    /// `limit` falls back to 50 and negative `offset` to 0.
    pub fn list_contacts(&self, limit: i64, offset: i64) -> Result<Vec<Contact>, StoreError> {
        let (limit, offset) = clamp_page(limit, offset);
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM contacts ORDER BY id ASC LIMIT ? OFFSET ?")?;

        let contacts = stmt
            .query_map([limit, offset], Self::row_to_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(contacts)
    }

    /// Same page as `list_contacts`, with tags loaded in one extra query.
    pub fn list_contacts_with_tags(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, StoreError> {
        let mut contacts = self.list_contacts(limit, offset)?;
        let ids: Vec<i64> = contacts.iter().map(|c| c.id).collect();
        let mut tags = self.get_tags_for_contacts(&ids)?;

        for contact in &mut contacts {
            contact.tags = tags.remove(&contact.id).unwrap_or_default();
        }

        Ok(contacts)
    }

    pub fn count_contacts(&self) -> Result<u32, StoreError> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
        Ok(count)
    }

    // ==================== ROW MAPPERS ====================

    fn row_to_contact(row: &Row) -> rusqlite::Result<Contact> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(Contact {
            id: row.get("id")?,
            first_name: row.get("fname")?,
            last_name: row.get("lname")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            tags: Vec::new(),
        })
    }
}

/// Apply the lenient paging defaults used by the list operations.
pub fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 { DEFAULT_PAGE_LIMIT } else { limit };
    (limit, offset.max(0))
}

fn find_contact_id(conn: &Connection, email: &str) -> rusqlite::Result<Option<i64>> {
    let result = conn.query_row("SELECT id FROM contacts WHERE email = ?", [email], |row| {
        row.get(0)
    });

    match result {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// A unique-email collision on insert means a concurrent writer got there
/// first; treat it as a match on the row it created.
fn find_or_create_contact(
    conn: &Connection,
    input: &ContactInput,
    now: &str,
) -> rusqlite::Result<Matched> {
    if let Some(id) = find_contact_id(conn, &input.email)? {
        return Ok(Matched::Existing(id));
    }

    match conn.execute(
        r#"INSERT INTO contacts (fname, lname, email, phone, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
        params![
            input.first_name,
            input.last_name,
            input.email,
            input.phone,
            now,
            now,
        ],
    ) {
        Ok(_) => Ok(Matched::Created(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => find_contact_id(conn, &input.email)?
            .map(Matched::Existing)
            .ok_or(e),
        Err(e) => Err(e),
    }
}

/// Email is the match key and never changes; `created_at` is left as is.
fn update_contact_fields(
    conn: &Connection,
    id: i64,
    input: &ContactInput,
    now: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE contacts SET fname = ?, lname = ?, phone = ?, updated_at = ? WHERE id = ?",
        params![input.first_name, input.last_name, input.phone, now, id],
    )?;
    Ok(())
}
