use anyhow::{anyhow, Result};

use super::AddArgs;
use crate::db::Database;
use crate::validate::{ContactCreateRequest, TagPayload};

/// Execute the add command. Validates like the HTTP API, then upserts.
pub fn run_add(db: &Database, args: AddArgs) -> Result<i64> {
    let mut req = ContactCreateRequest {
        first_name: args.first,
        last_name: args.last,
        email: args.email,
        phone: args.phone,
        tags: args.tags.into_iter().map(|text| TagPayload { text }).collect(),
    };

    let errors = req.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        return Err(anyhow!("Invalid contact: {}", details.join("; ")));
    }

    let id = db.upsert_contact(&req.into_input())?;
    println!("Saved contact {}", id);
    Ok(id)
}
