use anyhow::Result;
use clap::Parser;
use shared_types::MeetingCandidate;
use std::path::PathBuf;

use meeting_poller::calendar_client::CalendarClient;
use meeting_poller::config::Config;
use meeting_poller::event_builder::EventBuilder;
use meeting_poller::ports::CalendarPort;

#[derive(Parser)]
#[command(name = "add-event")]
#[command(about = "Add a calendar event from the command line")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "meeting-poller.toml")]
    config: PathBuf,

    /// Event title/summary
    #[arg(short, long)]
    summary: String,

    /// Event description
    #[arg(short, long)]
    description: Option<String>,

    /// Start time, e.g. "2026-05-14T10:00:00+02:00" or "2026-05-14 10:00"
    #[arg(long)]
    start: String,

    /// End time; defaults to one hour after start
    #[arg(long)]
    end: Option<String>,

    /// Location
    #[arg(short, long)]
    location: Option<String>,

    /// Calendar to insert into (defaults to calendar.calendar_id)
    #[arg(long)]
    calendar_id: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install crypto provider"))?;
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let builder = EventBuilder::new(config.timezone()?, config.plausible_year_floor);

    let candidate = MeetingCandidate {
        has_meeting: true,
        title: cli.summary,
        start: cli.start,
        end: cli.end,
        location: cli.location,
        description: cli.description,
    };
    let event = builder.build(&candidate)?;

    println!("Adding event: {}", event.summary);
    println!("  Start: {}", event.start);
    println!("  End:   {}", event.end);
    println!("  Zone:  {}", event.time_zone());

    let client = CalendarClient::new(&config.calendar).await?;
    let calendar_id = cli
        .calendar_id
        .unwrap_or_else(|| config.calendar.calendar_id.clone());
    let handle = client.insert_event(&calendar_id, &event).await?;

    match handle.html_link {
        Some(link) => println!("Event added: {}", link),
        None => println!("Event added!"),
    }

    Ok(())
}
