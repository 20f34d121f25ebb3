mod config;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use almanac_collections::types::*;
use almanac_collections::{
    CalendarBackend, NotificationSupport, SchedulingSupport, SyncSupport,
};
use almanac_ical::filter::{CompFilter, CompFilterMatch, CompFilterRules, Component, Filter, TimeRange};
use almanac_ical::parser::date_time;
use almanac_store::ReferenceStore;

use config::*;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(short, long, env = "ALMANAC_CONFIG", default_value = "almanac.toml")]
    /// Path to the almanac configuration file
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[clap(subcommand)]
    /// Manage the calendars of a principal
    Calendar(CalendarCommand),

    #[clap(subcommand)]
    /// Manage the objects of a calendar
    Object(ObjectCommand),

    /// Search a calendar, or find an object by UID
    Query {
        #[clap(short, long)]
        principal: String,
        /// Look the UID up in every calendar the principal owns
        #[clap(long, conflicts_with_all = &["calendar", "start", "end"])]
        uid: Option<String>,
        #[clap(short, long, required_unless_present = "uid")]
        calendar: Option<String>,
        #[clap(long, default_value = "VEVENT")]
        component: String,
        /// Start of the time range, iCalendar DATE or DATE-TIME
        #[clap(long)]
        start: Option<String>,
        #[clap(long)]
        end: Option<String>,
    },

    /// Print the changes of a calendar since a sync token
    Changes {
        #[clap(flatten)]
        target: Target,
        #[clap(short, long)]
        token: Option<String>,
        #[clap(short, long)]
        limit: Option<usize>,
    },

    #[clap(subcommand)]
    Inbox(InboxCommand),

    #[clap(subcommand)]
    Notifications(NotificationsCommand),
}

#[derive(clap::Args, Debug)]
struct Target {
    #[clap(short, long)]
    principal: String,
    #[clap(short, long)]
    calendar: String,
}

#[derive(Subcommand, Debug)]
enum CalendarCommand {
    List {
        #[clap(short, long)]
        principal: String,
    },
    Create {
        #[clap(flatten)]
        target: Target,
        #[clap(short, long)]
        name: Option<String>,
        /// Comma separated component names, VEVENT,VTODO when omitted
        #[clap(long)]
        components: Option<String>,
    },
    Delete {
        #[clap(flatten)]
        target: Target,
    },
}

#[derive(Subcommand, Debug)]
enum ObjectCommand {
    List {
        #[clap(flatten)]
        target: Target,
    },
    Get {
        #[clap(flatten)]
        target: Target,
        #[clap(short, long)]
        uri: String,
    },
    /// Create or replace an object from an .ics file
    Put {
        #[clap(flatten)]
        target: Target,
        #[clap(short, long)]
        uri: String,
        #[clap(short, long)]
        file: PathBuf,
    },
    Delete {
        #[clap(flatten)]
        target: Target,
        #[clap(short, long)]
        uri: String,
    },
}

#[derive(Subcommand, Debug)]
enum InboxCommand {
    List {
        #[clap(short, long)]
        principal: String,
    },
}

#[derive(Subcommand, Debug)]
enum NotificationsCommand {
    List {
        #[clap(short, long)]
        principal: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var(
            "RUST_LOG",
            "almanac=info,almanac_store=info,almanac_collections=info",
        )
    }

    // Abort on panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = read_config(args.config_file.clone())
        .with_context(|| format!("'{:?}' must be an almanac configuration file", args.config_file))?;
    let store = ReferenceStore::load(config.store.clone(), &config.snapshot_path).await?;

    tracing::debug!(command=?args.command, snapshot=%config.snapshot_path.display(), "running command");
    let dirty = run(&store, args.command).await?;
    if dirty {
        store.save(&config.snapshot_path).await?;
    }
    Ok(())
}

/// Runs a command, returns whether the store changed
async fn run(store: &ReferenceStore, command: Command) -> Result<bool> {
    match command {
        Command::Calendar(CalendarCommand::List { principal }) => {
            for cal in store.get_calendars_for_user(&principal).await? {
                let access = cal.share.as_ref().map(|s| s.access);
                println!(
                    "{}\t{}\t{}\t{:?}\t{}",
                    cal.uri,
                    cal.properties.display_name.as_deref().unwrap_or("-"),
                    cal.sync_token.as_ref().map_or("-", |t| t.as_str()),
                    access.unwrap_or(ShareAccess::NotShared),
                    cal.id,
                );
            }
            Ok(false)
        }
        Command::Calendar(CalendarCommand::Create {
            target,
            name,
            components,
        }) => {
            let properties = CalendarProperties {
                display_name: name,
                supported_components: components
                    .map(|list| {
                        list.split(',')
                            .map(|c| Component::new(c.trim().to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
                ..CalendarProperties::default()
            };
            let id = store
                .create_calendar(&target.principal, &target.calendar, properties)
                .await?;
            println!("{}", id);
            Ok(true)
        }
        Command::Calendar(CalendarCommand::Delete { target }) => {
            let id = resolve(store, &target).await?;
            store.delete_calendar(&id).await?;
            Ok(true)
        }
        Command::Object(ObjectCommand::List { target }) => {
            let id = resolve(store, &target).await?;
            for obj in store.get_calendar_objects(&id).await? {
                println!(
                    "{}\t{}\t{:?}\t{}\t{}",
                    obj.uri,
                    obj.component.map_or("-".to_string(), |c| c.to_string()),
                    obj.classification.unwrap_or_default(),
                    obj.size,
                    obj.etag.map_or("-".to_string(), |e| e.quoted()),
                );
            }
            Ok(false)
        }
        Command::Object(ObjectCommand::Get { target, uri }) => {
            let id = resolve(store, &target).await?;
            let obj = match store.get_calendar_object(&id, &uri).await? {
                Some(obj) => obj,
                None => bail!("no object {} in {}", uri, target.calendar),
            };
            let data = obj.calendar_data.unwrap_or_default();
            print!("{}", String::from_utf8_lossy(&data));
            Ok(false)
        }
        Command::Object(ObjectCommand::Put { target, uri, file }) => {
            let id = resolve(store, &target).await?;
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("unable to read {}", file.display()))?;
            let etag = match store.get_calendar_object(&id, &uri).await? {
                Some(_) => store.update_calendar_object(&id, &uri, data).await?,
                None => store.create_calendar_object(&id, &uri, data).await?,
            };
            if let Some(etag) = etag {
                println!("{}", etag.quoted());
            }
            Ok(true)
        }
        Command::Object(ObjectCommand::Delete { target, uri }) => {
            let id = resolve(store, &target).await?;
            store.delete_calendar_object(&id, &uri).await?;
            Ok(true)
        }
        Command::Query {
            principal,
            uid: Some(uid),
            ..
        } => {
            match store.get_calendar_object_by_uid(&principal, &uid).await? {
                Some(path) => println!("{}", path),
                None => bail!("no object with UID {} for {}", uid, principal),
            }
            Ok(false)
        }
        Command::Query {
            principal,
            calendar,
            component,
            start,
            end,
            ..
        } => {
            let calendar = calendar.context("a calendar is required without --uid")?;
            let id = resolve(
                store,
                &Target {
                    principal,
                    calendar,
                },
            )
            .await?;

            let start = start.map(|s| parse_date(&s)).transpose()?;
            let end = end.map(|s| parse_date(&s)).transpose()?;
            let filter = Filter::inner(CompFilter {
                name: Component::new(component),
                additional_rules: TimeRange::new(start, end).map(|range| {
                    CompFilterRules::Matches(CompFilterMatch {
                        time_range: Some(range),
                        prop_filter: vec![],
                        comp_filter: vec![],
                    })
                }),
            });

            for uri in store.calendar_query(&id, &filter).await? {
                println!("{}", uri);
            }
            Ok(false)
        }
        Command::Changes {
            target,
            token,
            limit,
        } => {
            let id = resolve(store, &target).await?;
            let token = token.map(SyncToken::from);
            let changes = store
                .get_changes_for_calendar(&id, token.as_ref(), SyncLevel::One, limit)
                .await?;
            let changes = match changes {
                Some(changes) => changes,
                None => bail!("sync token is unknown or expired, sync again without a token"),
            };
            for uri in &changes.added {
                println!("added\t{}", uri);
            }
            for uri in &changes.modified {
                println!("modified\t{}", uri);
            }
            for uri in &changes.deleted {
                println!("deleted\t{}", uri);
            }
            println!("token\t{}", changes.sync_token);
            if changes.truncated {
                println!("truncated");
            }
            Ok(false)
        }
        Command::Inbox(InboxCommand::List { principal }) => {
            for obj in store.get_scheduling_objects(&principal).await? {
                println!("{}\t{}", obj.uri, obj.size);
            }
            Ok(false)
        }
        Command::Notifications(NotificationsCommand::List { principal }) => {
            for notif in store.get_notifications_for_principal(&principal).await? {
                println!("{}\t{}\t{:?}", notif.id, notif.created, notif.kind);
            }
            Ok(false)
        }
    }
}

/// Calendar id from the principal and calendar uri
async fn resolve(store: &ReferenceStore, target: &Target) -> Result<CalendarId> {
    match store
        .get_calendar_by_uri(&target.principal, &target.calendar)
        .await?
    {
        Some(cal) => Ok(cal.id),
        None => bail!(
            "calendar {} does not exist for {}",
            target.calendar,
            target.principal
        ),
    }
}

fn parse_date(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    date_time(value).with_context(|| format!("'{}' is not an iCalendar date", value))
}
