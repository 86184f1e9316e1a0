mod contact;
mod tag;

pub use contact::{Contact, ContactInput};
pub use tag::{ContactTag, Tag};
