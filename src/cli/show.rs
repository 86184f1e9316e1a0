use anyhow::{anyhow, Result};

use super::display::print_contact;
use crate::db::Database;

/// Execute the show command
pub fn run_show(db: &Database, id: i64) -> Result<()> {
    match db.get_contact_by_id(id)? {
        Some(contact) => {
            let links = db.get_contact_tags(contact.id)?;
            print_contact(&contact, &links);
            Ok(())
        }
        None => Err(anyhow!("No contact with id {}", id)),
    }
}
