use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashMap;

use super::error::is_unique_violation;
use super::{parse_timestamp, Database, StoreError};
use crate::models::{ContactTag, Tag};

// ==================== RECONCILE ====================

/// Link `contact_id` to every text in `texts`, creating missing tags on the
/// way. Existing associations are left alone and nothing is ever removed.
/// Runs on the caller's transaction; returns the number of new links.
pub(super) fn reconcile(
    conn: &Connection,
    contact_id: i64,
    texts: &[&str],
    now: &str,
) -> rusqlite::Result<usize> {
    let mut linked = 0;
    for text in texts {
        let tag_id = find_or_create_tag(conn, text, now)?;
        linked += conn.execute(
            "INSERT OR IGNORE INTO contact_tag (contact_id, tag_id, created_at) VALUES (?, ?, ?)",
            params![contact_id, tag_id, now],
        )?;
    }
    Ok(linked)
}

fn find_tag_id(conn: &Connection, text: &str) -> rusqlite::Result<Option<i64>> {
    let result = conn.query_row("SELECT id FROM tags WHERE text = ?", [text], |row| {
        row.get(0)
    });

    match result {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Another writer may create the same text between our lookup and insert;
/// the unique index rejects the second row and we pick up the winner's id.
fn find_or_create_tag(conn: &Connection, text: &str, now: &str) -> rusqlite::Result<i64> {
    if let Some(id) = find_tag_id(conn, text)? {
        return Ok(id);
    }

    match conn.execute(
        "INSERT INTO tags (text, created_at, updated_at) VALUES (?, ?, ?)",
        params![text, now, now],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => find_tag_id(conn, text)?.ok_or(e),
        Err(e) => Err(e),
    }
}

impl Database {
    // ==================== TAG READ ====================

    /// Tags linked to a contact, in the order they were linked.
    pub fn get_tags_for_contact(&self, contact_id: i64) -> Result<Vec<Tag>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"SELECT t.id, t.text, t.created_at, t.updated_at
               FROM tags t
               JOIN contact_tag ct ON ct.tag_id = t.id
               WHERE ct.contact_id = ?
               ORDER BY ct.id"#,
        )?;

        let tags = stmt
            .query_map([contact_id], Self::row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tags)
    }

    /// Tags for several contacts in a single query, keyed by contact id.
    /// Contacts without tags are absent from the map.
    pub fn get_tags_for_contacts(
        &self,
        contact_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Tag>>, StoreError> {
        if contact_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // Build IN clause with placeholders
        let placeholders: Vec<&str> = contact_ids.iter().map(|_| "?").collect();
        let sql = format!(
            r#"SELECT ct.contact_id, t.id, t.text, t.created_at, t.updated_at
               FROM contact_tag ct
               JOIN tags t ON t.id = ct.tag_id
               WHERE ct.contact_id IN ({})
               ORDER BY ct.id"#,
            placeholders.join(", ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(contact_ids.iter()), |row| {
                let contact_id: i64 = row.get(0)?;
                let created_at: String = row.get(3)?;
                let updated_at: String = row.get(4)?;
                let tag = Tag {
                    id: row.get(1)?,
                    text: row.get(2)?,
                    created_at: parse_timestamp(&created_at)?,
                    updated_at: parse_timestamp(&updated_at)?,
                };
                Ok((contact_id, tag))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
        for (contact_id, tag) in rows {
            map.entry(contact_id).or_default().push(tag);
        }

        Ok(map)
    }

    #[cfg(test)]
    pub(crate) fn find_tag_by_text(&self, text: &str) -> Result<Option<Tag>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, created_at, updated_at FROM tags WHERE text = ?")?;

        let result = stmt.query_row([text], Self::row_to_tag);

        match result {
            Ok(tag) => Ok(Some(tag)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Raw association rows for a contact, oldest link first.
    pub fn get_contact_tags(&self, contact_id: i64) -> Result<Vec<ContactTag>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contact_id, tag_id, created_at FROM contact_tag WHERE contact_id = ? ORDER BY id",
        )?;

        let links = stmt
            .query_map([contact_id], |row| {
                let created_at: String = row.get(3)?;
                Ok(ContactTag {
                    id: row.get(0)?,
                    contact_id: row.get(1)?,
                    tag_id: row.get(2)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(links)
    }

    pub fn count_tags(&self) -> Result<u32, StoreError> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_contact_tags(&self) -> Result<u32, StoreError> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contact_tag", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
        let created_at: String = row.get(2)?;
        let updated_at: String = row.get(3)?;

        Ok(Tag {
            id: row.get(0)?,
            text: row.get(1)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn insert_contact(db: &Database, email: &str) -> i64 {
        let now = Utc::now().to_rfc3339();
        db.conn
            .execute(
                "INSERT INTO contacts (fname, lname, email, created_at, updated_at) VALUES ('A', 'B', ?, ?, ?)",
                params![email, now, now],
            )
            .unwrap();
        db.conn.last_insert_rowid()
    }

    #[test]
    fn test_reconcile_creates_tags_and_links() {
        let db = Database::open_memory().unwrap();
        let id = insert_contact(&db, "a@example.com");
        let now = Utc::now().to_rfc3339();

        let linked = reconcile(&db.conn, id, &["x", "y"], &now).unwrap();
        assert_eq!(linked, 2);
        assert_eq!(db.count_tags().unwrap(), 2);

        let texts: Vec<String> = db
            .get_tags_for_contact(id)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["x", "y"]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let db = Database::open_memory().unwrap();
        let id = insert_contact(&db, "a@example.com");
        let now = Utc::now().to_rfc3339();

        reconcile(&db.conn, id, &["x"], &now).unwrap();
        let linked = reconcile(&db.conn, id, &["x"], &now).unwrap();

        assert_eq!(linked, 0);
        assert_eq!(db.count_tags().unwrap(), 1);
        assert_eq!(db.get_contact_tags(id).unwrap().len(), 1);
    }

    #[test]
    fn test_tags_are_shared_between_contacts() {
        let db = Database::open_memory().unwrap();
        let a = insert_contact(&db, "a@example.com");
        let b = insert_contact(&db, "b@example.com");
        let now = Utc::now().to_rfc3339();

        reconcile(&db.conn, a, &["shared", "only-a"], &now).unwrap();
        reconcile(&db.conn, b, &["shared"], &now).unwrap();

        assert_eq!(db.count_tags().unwrap(), 2);
        assert_eq!(db.count_contact_tags().unwrap(), 3);

        let shared = db.find_tag_by_text("shared").unwrap().unwrap();
        let a_links = db.get_contact_tags(a).unwrap();
        let b_links = db.get_contact_tags(b).unwrap();
        assert_eq!(a_links[0].tag_id, shared.id);
        assert_eq!(b_links[0].tag_id, shared.id);
    }

    #[test]
    fn test_tag_text_is_case_sensitive() {
        let db = Database::open_memory().unwrap();
        let id = insert_contact(&db, "a@example.com");
        let now = Utc::now().to_rfc3339();

        reconcile(&db.conn, id, &["Golang", "golang"], &now).unwrap();
        assert_eq!(db.count_tags().unwrap(), 2);
        assert!(db.find_tag_by_text("GOLANG").unwrap().is_none());
    }

    #[test]
    fn test_reconcile_unknown_contact_fails() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now().to_rfc3339();

        let err = reconcile(&db.conn, 42, &["x"], &now).unwrap_err();
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn test_get_tags_for_contacts_batches() {
        let db = Database::open_memory().unwrap();
        let a = insert_contact(&db, "a@example.com");
        let b = insert_contact(&db, "b@example.com");
        let c = insert_contact(&db, "c@example.com");
        let now = Utc::now().to_rfc3339();

        reconcile(&db.conn, a, &["1", "2"], &now).unwrap();
        reconcile(&db.conn, b, &["2"], &now).unwrap();

        let map = db.get_tags_for_contacts(&[a, b, c]).unwrap();
        assert_eq!(map[&a].len(), 2);
        assert_eq!(map[&b][0].text, "2");
        assert!(!map.contains_key(&c));

        assert!(db.get_tags_for_contacts(&[]).unwrap().is_empty());
    }
}
