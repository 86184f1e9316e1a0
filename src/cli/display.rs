use crate::models::{Contact, ContactTag};

/// Print a contact with clean formatting (only non-empty fields).
/// `links` adds the date each tag was attached.
pub fn print_contact(contact: &Contact, links: &[ContactTag]) {
    println!("{}\n", contact.full_name());
    for line in contact_lines(contact) {
        println!("  {}", line);
    }
    for line in tag_lines(contact, links) {
        println!("    {}", line);
    }
}

/// One-line summary used by list output
pub fn format_list_row(contact: &Contact) -> String {
    let mut row = format!("{:>6}  {:<30}  {}", contact.id, contact.full_name(), contact.email);
    if !contact.tags.is_empty() {
        row.push_str(&format!("  [{}]", contact.tag_texts().join(", ")));
    }
    row
}

fn contact_lines(contact: &Contact) -> Vec<String> {
    let mut lines = vec![format!("id: {}", contact.id), contact.email.clone()];

    if let Some(ref phone) = contact.phone {
        lines.push(phone.clone());
    }

    lines.push(format!(
        "updated {}",
        contact.updated_at.format("%Y-%m-%d %H:%M UTC")
    ));

    if !contact.tags.is_empty() {
        lines.push("tags:".to_string());
    }
    lines
}

fn tag_lines(contact: &Contact, links: &[ContactTag]) -> Vec<String> {
    contact
        .tags
        .iter()
        .map(|tag| match links.iter().find(|l| l.tag_id == tag.id) {
            Some(link) => format!("{} (since {})", tag.text, link.created_at.format("%Y-%m-%d")),
            None => tag.text.clone(),
        })
        .collect()
}
