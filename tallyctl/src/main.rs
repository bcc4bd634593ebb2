use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod pages;
mod publisher;
mod store;

use pages::SettingsState;
use store::Store;

#[derive(Parser)]
#[command(name = "tallyctl")]
#[command(about = "Edit and sync tally project settings", long_about = None)]
struct Cli {
    /// Path to the settings store (defaults to the user data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the settings document and the current editor page
    Show,
    /// Open an existing project for editing
    Edit { id: u32 },
    /// Start adding a new project
    Add,
    /// Set the staged project's name
    SetName { name: String },
    /// Set the staged project's colour
    SetColour { colour: String },
    /// Set the staged repeat length (0 disables sub-counting)
    SetRepeatLength { length: u32 },
    /// Set the staged repeat goal; omit the value to clear it
    SetRepeatGoal { goal: Option<u32> },
    /// Commit the staged project and return to the main page
    Save,
    /// Discard the staged state and return to the main page
    Cancel,
    /// Ask to delete the project currently being edited
    Delete,
    /// Ask to reset the counters of the project currently being edited
    Reset,
    /// Confirm the pending delete or reset
    Confirm,
    /// Configure the on-device clock
    Time {
        #[arg(long)]
        show_time: Option<bool>,
        #[arg(long)]
        show_seconds: Option<bool>,
        #[arg(long = "use-24h")]
        use_24h: Option<bool>,
    },
    /// Switch the device between dark and light mode
    DarkMode { on: bool },
    /// Push the full settings snapshot now (administrative resync)
    Sync,
    /// Run the companion publisher, answering device resync requests
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store_path = match cli.store {
        Some(path) => path,
        None => Store::default_path()?,
    };

    match cli.command {
        Commands::Serve => return publisher::serve(&store_path).await,
        Commands::Sync => {
            let mut store = Store::open(&store_path)?;
            publisher::sync_all(&mut store).await?;
            println!("OK");
            return Ok(());
        }
        Commands::Show => {
            show(&Store::open(&store_path)?)?;
            return Ok(());
        }
        _ => {}
    }

    // Everything else is a page-machine event: load the document,
    // apply the transition, persist, then relay the changed keys.
    let mut store = Store::open(&store_path)?;
    let mut doc = store.load_doc()?;
    let mut operation = None;

    match cli.command {
        Commands::Edit { id } => doc.begin_edit(id)?,
        Commands::Add => doc.begin_add()?,
        Commands::SetName { name } => doc.set_name(&name)?,
        Commands::SetColour { colour } => doc.set_colour(&colour)?,
        Commands::SetRepeatLength { length } => doc.set_repeat_length(length)?,
        Commands::SetRepeatGoal { goal } => doc.set_repeat_goal(goal)?,
        Commands::Save => doc.save()?,
        Commands::Cancel => doc.cancel()?,
        Commands::Delete => doc.request_delete()?,
        Commands::Reset => doc.request_reset()?,
        Commands::Confirm => operation = doc.confirm()?,
        Commands::Time {
            show_time,
            show_seconds,
            use_24h,
        } => {
            if let Some(v) = show_time {
                doc.time_format.show_time = v;
            }
            if let Some(v) = show_seconds {
                doc.time_format.show_seconds = v;
            }
            if let Some(v) = use_24h {
                doc.time_format.is_24hour_time = v;
            }
        }
        Commands::DarkMode { on } => doc.is_dark_mode = on,
        Commands::Show | Commands::Sync | Commands::Serve => unreachable!(),
    }

    let changed = store.put_doc(&doc)?;
    store.save()?;
    publisher::push_changes(&mut store, changed).await?;
    if let Some(op) = operation {
        // Best-effort now, not guaranteed eventually: the operation is
        // already gone from the document whatever happens here.
        publisher::push_operation(op).await;
    }

    println!("OK");
    Ok(())
}

fn show(store: &Store) -> Result<()> {
    let doc = store.load_doc()?;
    println!("Projects (next id {}):", doc.next_id);
    for (id, project) in &doc.projects {
        let goal = project
            .repeat_goal
            .map_or("-".to_string(), |g| g.to_string());
        println!(
            "  [{}] {} (repeat {}, goal {}, {})",
            id, project.name, project.repeat_length, goal, project.colour
        );
    }
    let page = match &doc.state {
        SettingsState::Main => "Main".to_string(),
        SettingsState::Add { staged } => format!("Add '{}' (id {})", staged.name, staged.id),
        SettingsState::Edit { staged } => format!("Edit '{}' (id {})", staged.name, staged.id),
        SettingsState::Delete { proj_id } => format!("Delete project {proj_id} (confirm?)"),
        SettingsState::Reset { proj_id } => format!("Reset project {proj_id} (confirm?)"),
    };
    println!("Page: {}", page);
    println!(
        "Clock: show={} seconds={} 24h={}",
        doc.time_format.show_time, doc.time_format.show_seconds, doc.time_format.is_24hour_time
    );
    println!("Dark mode: {}", doc.is_dark_mode);
    if store.needs_sync() {
        println!("Pending sync: yes");
    }
    Ok(())
}
