use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tower::ServiceExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use matchday::{
    adapters::{cache::moka::MokaCache, database::postgrest::PostgrestDatabase},
    commands::{
        delete_event::DeleteEventRequest,
        get_event::GetEventRequest,
        join_event::JoinEventRequest,
        list_events::{ListEventsRequest, ListSavedEventsRequest},
        list_members::ListMembersRequest,
        membership_status::MembershipStatusRequest,
        profile::GetProfileRequest,
        withdraw::WithdrawRequest,
        DomainLogic,
    },
    config::Config,
    domain::{EventDetails, EventKind, EventSummary, Session},
};

type Domain = DomainLogic<PostgrestDatabase, MokaCache>;

/// Browse, join and leave football matches and tournaments
#[derive(Parser, Debug)]
#[command(name = "matchday", version)]
struct Cli {
    /// Id of the signed-in user
    #[arg(long, env = "MATCHDAY_USER_ID", global = true)]
    user: Option<Uuid>,

    /// Log filter, e.g. `info` or `matchday=debug`
    #[arg(long, env = "RUST_LOG", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List events with their number of members
    List {
        kind: Kind,
        /// Only show events in a city matching this text
        #[arg(long)]
        city: Option<String>,
    },
    /// List the events you created or joined
    Saved { kind: Kind },
    /// Show the details of an event
    Show { kind: Kind, id: Uuid },
    /// List the members of an event
    Members { kind: Kind, id: Uuid },
    /// Tell whether you are a member of an event
    Status { kind: Kind, id: Uuid },
    /// Join an event
    Join { kind: Kind, id: Uuid },
    /// Withdraw from an event
    Withdraw { kind: Kind, id: Uuid },
    /// Delete an event you created
    Delete { kind: Kind, id: Uuid },
    /// Show a profile, your own by default
    Profile { id: Option<Uuid> },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Match,
    Tournament,
}

impl From<Kind> for EventKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Match => EventKind::Match,
            Kind::Tournament => EventKind::Tournament,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine, the variables can come from the environment
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let domain = DomainLogic::new(
        Arc::new(PostgrestDatabase::new(&config.backend)),
        Arc::new(MokaCache::from_config(&config.cache)),
    );
    let session = cli.user.map(Session::authenticated).unwrap_or_default();

    run(domain, session, cli.command).await
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(domain: Domain, session: Session, command: Command) -> Result<()> {
    match command {
        Command::List { kind, city } => {
            let events = domain
                .oneshot(ListEventsRequest {
                    kind: kind.into(),
                    city,
                })
                .await?;
            print_events(&events);
        }
        Command::Saved { kind } => {
            let events = domain
                .oneshot(ListSavedEventsRequest {
                    session,
                    kind: kind.into(),
                })
                .await?;
            print_events(&events);
        }
        Command::Show { kind, id } => {
            let view = domain
                .oneshot(GetEventRequest {
                    kind: kind.into(),
                    event_id: id,
                })
                .await?;
            let event = &view.event;
            println!("{} ({})", event.name, event.kind());
            println!("  where:    {}, {}", event.address, event.city);
            println!("  capacity: {}", event.capacity);
            if let EventDetails::Tournament {
                tournament_type,
                start_date,
                end_date,
                players_per_team,
            } = &event.details
            {
                println!("  type:     {tournament_type}, {players_per_team} per team");
                println!("  dates:    {start_date} to {end_date}");
            }
            let creator = view
                .creator
                .as_ref()
                .and_then(|creator| creator.full_name.as_deref())
                .unwrap_or("Unknown");
            println!("  by:       {creator}");
            println!("  info:     {}", event.info);
        }
        Command::Members { kind, id } => {
            let list = domain
                .oneshot(ListMembersRequest {
                    kind: kind.into(),
                    event_id: id,
                })
                .await?;
            println!("{} joined", list.joined_count());
            for member in &list.members {
                let rating = member
                    .rating
                    .map(|rating| rating.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {}  {:<24} {:>4}",
                    member.id,
                    member.full_name.as_deref().unwrap_or("Unknown"),
                    rating
                );
            }
        }
        Command::Status { kind, id } => {
            let user_id = session.user_id()?;
            let joined = domain
                .oneshot(MembershipStatusRequest {
                    kind: kind.into(),
                    event_id: id,
                    user_id,
                })
                .await?;
            println!("{}", if joined { "joined" } else { "not joined" });
        }
        Command::Join { kind, id } => {
            let res = domain
                .oneshot(JoinEventRequest {
                    session,
                    kind: kind.into(),
                    event_id: id,
                })
                .await?;
            println!("Joined ({}/{})", res.joined_count, res.capacity);
        }
        Command::Withdraw { kind, id } => {
            domain
                .oneshot(WithdrawRequest {
                    session,
                    kind: kind.into(),
                    event_id: id,
                })
                .await?;
            println!("Withdrawn");
        }
        Command::Delete { kind, id } => {
            domain
                .oneshot(DeleteEventRequest {
                    session,
                    kind: kind.into(),
                    event_id: id,
                })
                .await?;
            println!("Deleted");
        }
        Command::Profile { id } => {
            let profile_id = match id {
                Some(id) => id,
                None => session.user_id()?,
            };
            let profile = domain.oneshot(GetProfileRequest { profile_id }).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}

fn print_events(events: &[EventSummary]) {
    if events.is_empty() {
        println!("No events");
        return;
    }
    for event in events {
        let dates = match (event.start_date, event.end_date) {
            (Some(start), Some(end)) => format!("  {start} to {end}"),
            _ => String::new(),
        };
        println!(
            "{}  {:<28} {:<16} {:>3}/{:<3}{}{}",
            event.id,
            event.name,
            event.city,
            event.joined_count,
            event.capacity,
            if event.is_full() { " full" } else { "" },
            dates
        );
    }
}
