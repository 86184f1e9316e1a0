pub const SCHEMA_VERSION: i32 = 1;

/// Created before anything else so the current version can always be read.
pub const VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);
"#;

/// Step `i` takes the schema from version `i` to `i + 1`.
pub const MIGRATIONS: &[&str] = &[SCHEMA_V1];

/// V1: contacts keyed by email, a shared tag vocabulary keyed by text, and the
/// association table between them. Uniqueness lives in the schema so that
/// concurrent writers cannot slip past an application-level check.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fname TEXT NOT NULL,
    lname TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contact_tag (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contact_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE,
    UNIQUE(contact_id, tag_id)
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_contact_tag_contact ON contact_tag(contact_id);
CREATE INDEX IF NOT EXISTS idx_contact_tag_tag ON contact_tag(tag_id);
"#;
