use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bedpulse::config::Settings;
use bedpulse::engine::NewRoom;
use bedpulse::import::ImportTable;
use bedpulse::model::{BedLabels, RoomStatus, RoomType};
use bedpulse::property::PropertyManager;
use bedpulse::tax::TaxRequest;

#[derive(Parser)]
#[command(name = "bedpulse")]
#[command(about = "Bed allocation, tourist tax and booking import for hostels.")]
struct CommandLine {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a `{header, rows}` JSON table into a property
    Import {
        property: String,
        #[arg(long, value_enum, default_value_t = Entity::Bookings)]
        entity: Entity,
        /// Read the table from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print a property's stays, rooms or guests as an import-compatible JSON table
    Export {
        property: String,
        #[arg(long, value_enum, default_value_t = Entity::Bookings)]
        entity: Entity,
    },
    /// Per-room occupancy for the night starting on a date (YYYY-MM-DD)
    Occupancy { property: String, date: NaiveDate },
    /// Take a room in or out of service
    RoomStatus {
        property: String,
        room: String,
        #[arg(value_enum)]
        status: Status,
    },
    /// Compute tourist tax for a JSON request read from stdin
    Tax,
    /// List municipalities with a known tax rate
    Municipalities,
    /// List the rooms of a property
    Rooms { property: String },
    /// Add a room to a property
    AddRoom {
        property: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        beds: u32,
        /// Price per bed per night in minor units
        #[arg(long)]
        price: i64,
        #[arg(long, value_enum, default_value_t = Kind::Dormitory)]
        kind: Kind,
        /// Comma-separated bed labels; numbered 1..=beds when omitted
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Entity {
    Bookings,
    Rooms,
    Guests,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Status {
    Available,
    Maintenance,
    Closed,
}

impl From<Status> for RoomStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Available => RoomStatus::Available,
            Status::Maintenance => RoomStatus::Maintenance,
            Status::Closed => RoomStatus::Closed,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Kind {
    Dormitory,
    Private,
    Suite,
}

impl From<Kind> for RoomType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Dormitory => RoomType::Dormitory,
            Kind::Private => RoomType::Private,
            Kind::Suite => RoomType::Suite,
        }
    }
}

fn read_input(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = CommandLine::parse();
    let settings = Settings::from_env();
    bedpulse::observability::init(settings.metrics_port)?;
    let config = settings.engine_config()?;

    std::fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("creating {}", settings.data_dir.display()))?;
    let properties = PropertyManager::new(
        settings.data_dir.clone(),
        config.clone(),
        settings.compact_threshold,
    );
    info!(data_dir = %settings.data_dir.display(), "bedpulse started");

    match cli.command {
        Commands::Import {
            property,
            entity,
            file,
        } => {
            let table: ImportTable = serde_json::from_str(&read_input(file.as_ref())?)
                .context("import input must be a {header, rows} JSON table")?;
            let engine = properties.get_or_create(&property)?;
            let report = match entity {
                Entity::Bookings => engine.reconcile_import(&table).await?,
                Entity::Rooms => engine.reconcile_room_import(&table).await?,
                Entity::Guests => engine.reconcile_guest_import(&table).await?,
            };
            print_json(&report)?;
        }
        Commands::Export { property, entity } => {
            let engine = properties.get_or_create(&property)?;
            match entity {
                Entity::Bookings => print_json(&engine.export_stays())?,
                Entity::Rooms => print_json(&engine.export_rooms())?,
                Entity::Guests => print_json(&engine.export_guests())?,
            }
        }
        Commands::Occupancy { property, date } => {
            let engine = properties.get_or_create(&property)?;
            print_json(&engine.occupancy_on(date).await?)?;
        }
        Commands::RoomStatus {
            property,
            room,
            status,
        } => {
            let engine = properties.get_or_create(&property)?;
            let found = engine
                .find_room_by_name(&room)
                .with_context(|| format!("no room named '{room}'"))?;
            let updated = engine.set_room_status(found.id, status.into()).await?;
            println!("{}	{}", updated.name, updated.status);
        }
        Commands::Tax => {
            let request: TaxRequest =
                serde_json::from_str(&read_input(None)?).context("invalid tax request")?;
            print_json(&config.tax.calculate(&request)?)?;
        }
        Commands::Municipalities => {
            print_json(&config.tax.municipalities())?;
        }
        Commands::Rooms { property } => {
            let engine = properties.get_or_create(&property)?;
            for room in engine.list_rooms() {
                println!(
                    "{}\t{}\t{} beds\t{} per night\t{}",
                    room.name,
                    room.room_type.as_str(),
                    room.capacity_beds,
                    room.price_per_night,
                    room.status
                );
            }
        }
        Commands::AddRoom {
            property,
            name,
            beds,
            price,
            kind,
            labels,
        } => {
            let engine = properties.get_or_create(&property)?;
            let room = engine
                .create_room(NewRoom {
                    name,
                    room_type: kind.into(),
                    capacity_beds: beds,
                    price_per_night: price,
                    max_occupancy: None,
                    bed_labels: if labels.is_empty() {
                        BedLabels::Numbered
                    } else {
                        BedLabels::Custom(labels)
                    },
                    status: RoomStatus::Available,
                })
                .await?;
            println!("{}", room.id);
        }
    }

    Ok(())
}
