use anyhow::Result;

use super::display::format_list_row;
use super::ListArgs;
use crate::db::Database;

/// Execute the list command. Returns how many contacts were printed.
pub fn run_list(db: &Database, args: &ListArgs) -> Result<usize> {
    let contacts = if args.tags {
        db.list_contacts_with_tags(args.limit, args.offset)?
    } else {
        db.list_contacts(args.limit, args.offset)?
    };

    if contacts.is_empty() {
        println!("No contacts.");
        return Ok(0);
    }

    for contact in &contacts {
        println!("{}", format_list_row(contact));
    }

    let total = db.count_contacts()?;
    let (_, offset) = crate::db::clamp_page(args.limit, args.offset);
    println!(
        "\nShowing {}-{} of {}",
        offset + 1,
        offset + contacts.len() as i64,
        total
    );

    Ok(contacts.len())
}
