//! The one-time migration of records created offline into the remote store

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::KNOWN_COLLECTIONS;
use crate::manager::notification::{notify, Notification};
use crate::manager::DataManager;
use crate::record::now_timestamp;
use crate::traits::RemoteStore;

/// What a migration sweep did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Records that have been written to the remote store
    pub migrated: usize,
    /// Records that the remote store already had
    pub skipped: usize,
    /// Records that could not be checked or written (they stay in the local cache)
    pub failed: usize,
}

impl Display for MigrationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{} migrated, {} skipped, {} failed", self.migrated, self.skipped, self.failed)
    }
}

impl MigrationReport {
    /// The content of the migration sentinel
    fn to_sentinel(&self) -> Value {
        serde_json::json!({
            "completedAt": now_timestamp(),
            "migrated": self.migrated,
            "skipped": self.skipped,
            "failed": self.failed,
        })
    }
}


impl<R: RemoteStore> DataManager<R> {
    /// Copy every record of the local cache that the remote store does not have yet.
    ///
    /// This runs at most once per device: a sentinel entry is written to the local cache afterwards, even if some
    /// records failed. Records are created remotely under their cache identifier, and never overwrite a remote document.
    ///
    /// Returns `None` when nothing ran (the remote store is not the source of truth, or the sweep already ran).
    /// [`DataManager::start`] calls this, there is usually no need to call it again.
    pub async fn migrate_local_records(&self) -> Option<MigrationReport> {
        let remote = self.active_remote()?;
        if self.local.lock().unwrap().migration_done() {
            log::debug!("Local records have already been migrated on this device");
            return None;
        }

        log::info!("Migrating local records to the remote store");
        let mut report = MigrationReport::default();

        for collection in KNOWN_COLLECTIONS {
            let cached = self.local.lock().unwrap().records(collection);
            let records = match cached {
                Ok(records) => records,
                Err(err) => {
                    log::warn!("Unable to read the cached {} for migration: {}", collection, err);
                    continue;
                },
            };

            for record in records {
                let (id, fields) = record.into_parts();

                match remote.get(collection, &id).await {
                    Ok(Some(_)) => {
                        log::trace!("{} {} is already remote", collection, id);
                        report.skipped += 1;
                        continue;
                    },
                    Ok(None) => {},
                    Err(err) => {
                        log::warn!("Unable to check whether {} {} is remote: {}", collection, id, err);
                        if err.is_permission() {
                            self.raise_permission_error(collection);
                        }
                        report.failed += 1;
                        continue;
                    },
                }

                match remote.create_if_absent(collection, &id, fields).await {
                    Ok(true) => {
                        log::debug!("Migrated {} {}", collection, id);
                        report.migrated += 1;
                    },
                    Ok(false) => {
                        log::debug!("{} {} has been migrated concurrently", collection, id);
                        report.skipped += 1;
                    },
                    Err(err) => {
                        log::warn!("Unable to migrate {} {}: {}", collection, id, err);
                        if err.is_permission() {
                            self.raise_permission_error(collection);
                        }
                        report.failed += 1;
                    },
                }
            }
        }

        let marked = self.local.lock().unwrap().mark_migration_done(&report.to_sentinel());
        if let Err(err) = marked {
            log::error!("Unable to record that the migration ran: {}", err);
        }

        log::info!("Migration finished: {}", report);
        notify(&self.notifications, Notification::MigrationFinished(report));
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_carries_the_counts() {
        let report = MigrationReport { migrated: 3, skipped: 1, failed: 0 };
        let sentinel = report.to_sentinel();
        assert_eq!(sentinel["migrated"], 3);
        assert_eq!(sentinel["skipped"], 1);
        assert_eq!(sentinel["failed"], 0);
        assert!(sentinel["completedAt"].is_string());
        assert_eq!(report.to_string(), "3 migrated, 1 skipped, 0 failed");
    }
}
