//! A command-line front-end to the doctors and shifts
//!
//! Set `SHIFTBOOK_REMOTE_URL` (and `SHIFTBOOK_TOKEN`) to use a remote store, and `RUST_LOG` to display more info.

use serde_json::Value;

use shiftbook::cache::Cache;
use shiftbook::config::Settings;
use shiftbook::remote::HttpRemote;
use shiftbook::{Backend, DataManager, Doctor, Document, Notification, Record, Shift, ShiftType};

const USAGE: &str = "\
Usage: shiftbook <command> [arguments]

Commands:
  list <collection>
  get <collection> <id>
  add-doctor <name> <specialty>
  add-shift <doctorId> <date> <type> <start> <end>
  delete <collection> <id>
  watch <collection>";


#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        },
    };
    let remote = match HttpRemote::from_settings(&settings) {
        Ok(remote) => remote,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        },
    };

    let cache = Cache::open_or_new(&settings.cache_folder);
    let manager = DataManager::with_optional_remote(remote, cache, settings.readiness);
    match manager.start().await {
        Backend::Remote => log::info!("Using the remote store at {:?}", settings.remote_url.as_ref().map(|u| u.as_str())),
        Backend::Local => log::info!("Using the local cache in {:?}", settings.cache_folder),
    }

    let code = run(&manager, &args).await;
    manager.unsubscribe_all();
    std::process::exit(code);
}

async fn run(manager: &DataManager<HttpRemote>, args: &[String]) -> i32 {
    let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    match args.as_slice() {
        ["list", collection] => {
            for record in manager.get_all(collection).await {
                print_record(&record);
            }
            0
        },

        ["get", collection, id] => match manager.get_by_id(collection, id).await {
            Ok(Some(record)) => {
                print_record(&record);
                0
            },
            Ok(None) => {
                eprintln!("No such record");
                1
            },
            Err(err) => {
                eprintln!("{}", err);
                1
            },
        },

        ["add-doctor", name, specialty] => {
            let doctor = Doctor::new(name.to_string(), specialty.to_string());
            report_saved(manager.save_document(&doctor).await)
        },

        ["add-shift", doctor_id, date, shift_type, start, end] => {
            let shift_type: ShiftType = match shift_type.parse() {
                Ok(t) => t,
                Err(err) => {
                    eprintln!("{}", err);
                    return 2;
                },
            };
            let shift = Shift::new(doctor_id.to_string(), date.to_string(), shift_type, start.to_string(), end.to_string());

            let existing: Vec<Shift> = manager.get_all_documents().await;
            if let Some(conflict) = shiftbook::find_overlapping_shift(&shift, &existing) {
                eprintln!("This shift overlaps shift {} ({} {}-{})",
                    conflict.id().map(|id| id.as_str()).unwrap_or("?"),
                    conflict.date(), conflict.start_time(), conflict.end_time());
                return 1;
            }
            report_saved(manager.save_document(&shift).await)
        },

        ["delete", collection, id] => {
            if manager.delete(collection, id).await {
                println!("Deleted");
                0
            } else {
                eprintln!("Nothing was deleted");
                1
            }
        },

        ["watch", collection] => watch(manager, collection).await,

        _ => {
            eprintln!("{}", USAGE);
            2
        },
    }
}

async fn watch(manager: &DataManager<HttpRemote>, collection: &str) -> i32 {
    let mut notifications = manager.notifications();
    let subscription = manager.subscribe(collection, |batch| {
        for change in batch {
            println!("{:?}\t{}", change.kind, change.id);
        }
    }).await;
    if subscription.is_active() == false {
        eprintln!("Live updates are only available from the remote store");
        return 1;
    }

    println!("Watching {} (Ctrl-C to stop)", collection);
    loop {
        match notifications.recv().await {
            Ok(Notification::CollectionChanged { .. }) => {},
            Ok(notification) => println!("# {}", notification),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => log::warn!("Missed {} notifications", n),
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    subscription.unsubscribe();
    0
}

fn report_saved(result: Result<shiftbook::RecordId, shiftbook::StoreError>) -> i32 {
    match result {
        Ok(id) => {
            println!("{}", id);
            0
        },
        Err(err) => {
            eprintln!("Unable to save: {}", err);
            1
        },
    }
}

fn print_record(record: &Record) {
    let summary: Vec<String> = record.fields().iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect();
    println!("{}\t{}", record.id(), summary.join("  "));
}
