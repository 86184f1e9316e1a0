use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod add;
pub mod display;
pub mod list;
pub mod serve;
pub mod show;

pub use add::run_add;
pub use display::print_contact;
pub use list::run_list;
pub use serve::run_serve;
pub use show::run_show;

#[derive(Parser)]
#[command(name = "camp")]
#[command(about = "Contact list with email-keyed upserts and tags")]
#[command(version)]
pub struct Cli {
    /// Database file (overrides CAMP_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Create a contact, or add tags to the one with the same email
    Add(AddArgs),
    /// Show a contact and its tags
    Show(ShowArgs),
    /// List contacts in creation order
    List(ListArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides HTTP_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(short, long)]
    pub first: String,
    #[arg(short, long)]
    pub last: String,
    #[arg(short, long)]
    pub email: String,
    #[arg(short, long)]
    pub phone: Option<String>,
    /// Tag to attach; repeat for several
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: i64,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(short, long, default_value = "50")]
    pub limit: i64,
    #[arg(short, long, default_value = "0")]
    pub offset: i64,
    /// Include each contact's tags
    #[arg(short, long)]
    pub tags: bool,
}
