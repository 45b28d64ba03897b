//! Durable leases.
//!
//! A lease is a row `{key, owner, expires_at}`. An owner acquires a key when no
//! row exists, when the existing row has expired, or when it already owns it.
//! Expired leases are taken over rather than deleted, so a crashed holder only
//! blocks the key until its lease runs out, unless the recovery sweep clears
//! it first with `release_stale`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};

use clipshare_models::SweepCount;

use crate::{Database, StoreResult};

/// A lease row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// Try to acquire `key` for `owner` for `ttl`.
pub fn try_acquire(db: &Database, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool> {
    try_acquire_at(db, key, owner, ttl, Utc::now())
}

/// `try_acquire` with an explicit clock.
pub fn try_acquire_at(
    db: &Database,
    key: &str,
    owner: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    let now_ms = now.timestamp_millis();
    let expires_ms = (now + ttl).timestamp_millis();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO leases (key, owner, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET owner = excluded.owner, expires_at_ms = excluded.expires_at_ms
             WHERE leases.expires_at_ms <= ?4 OR leases.owner = excluded.owner",
            params![key, owner, expires_ms, now_ms],
        )?;
        Ok(changed > 0)
    })
}

/// Extend a lease still held by `owner`.
pub fn renew(db: &Database, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool> {
    let expires_ms = (Utc::now() + ttl).timestamp_millis();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE leases SET expires_at_ms = ?3 WHERE key = ?1 AND owner = ?2",
            params![key, owner, expires_ms],
        )?;
        Ok(changed > 0)
    })
}

/// Release a lease. A non-owner release is a no-op and returns `false`.
pub fn release(db: &Database, key: &str, owner: &str) -> StoreResult<bool> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM leases WHERE key = ?1 AND owner = ?2",
            params![key, owner],
        )?;
        Ok(changed > 0)
    })
}

/// Delete every lease under `prefix` not held by `live_owner`, expired or not.
/// Used once at startup, when no other holder can still be running.
pub fn release_stale(db: &Database, prefix: &str, live_owner: &str) -> StoreResult<SweepCount> {
    db.with_tx(|tx| {
        let found: usize = tx.query_row(
            "SELECT COUNT(*) FROM leases WHERE substr(key, 1, length(?1)) = ?1 AND owner != ?2",
            params![prefix, live_owner],
            |r| r.get(0),
        )?;
        let updated = tx.execute(
            "DELETE FROM leases WHERE substr(key, 1, length(?1)) = ?1 AND owner != ?2",
            params![prefix, live_owner],
        )?;
        Ok(SweepCount { found, updated })
    })
}

pub fn find(db: &Database, key: &str) -> StoreResult<Option<Lease>> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT key, owner, expires_at_ms FROM leases WHERE key = ?1",
                params![key],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(key, owner, expires_ms)| {
            Utc.timestamp_millis_opt(expires_ms)
                .single()
                .map(|expires_at| Lease {
                    key,
                    owner,
                    expires_at,
                })
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "shot_cut:ws-1";

    #[test]
    fn test_second_owner_blocked_until_expiry() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let ttl = Duration::seconds(60);

        assert!(try_acquire_at(&db, KEY, "a", ttl, now).unwrap());
        assert!(!try_acquire_at(&db, KEY, "b", ttl, now + Duration::seconds(30)).unwrap());
        assert_eq!(find(&db, KEY).unwrap().unwrap().owner, "a");

        assert!(try_acquire_at(&db, KEY, "b", ttl, now + Duration::seconds(61)).unwrap());
        assert_eq!(find(&db, KEY).unwrap().unwrap().owner, "b");
    }

    #[test]
    fn test_owner_can_reacquire() {
        let db = Database::open_in_memory().unwrap();
        let ttl = Duration::seconds(60);
        assert!(try_acquire(&db, KEY, "a", ttl).unwrap());
        assert!(try_acquire(&db, KEY, "a", ttl).unwrap());
        assert!(renew(&db, KEY, "a", ttl).unwrap());
        assert!(!renew(&db, KEY, "b", ttl).unwrap());
    }

    #[test]
    fn test_release_by_non_owner_is_noop() {
        let db = Database::open_in_memory().unwrap();
        try_acquire(&db, KEY, "a", Duration::seconds(60)).unwrap();

        assert!(!release(&db, KEY, "b").unwrap());
        assert!(find(&db, KEY).unwrap().is_some());

        assert!(release(&db, KEY, "a").unwrap());
        assert!(find(&db, KEY).unwrap().is_none());
        assert!(try_acquire(&db, KEY, "b", Duration::seconds(60)).unwrap());
    }

    #[test]
    fn test_release_stale_spares_live_owner_and_other_prefixes() {
        let db = Database::open_in_memory().unwrap();
        let ttl = Duration::seconds(60);
        try_acquire(&db, KEY, "dead", ttl).unwrap();
        try_acquire(&db, "shot_cut:ws-2", "live", ttl).unwrap();
        try_acquire(&db, "export:ws-1", "dead", ttl).unwrap();

        let swept = release_stale(&db, "shot_cut:", "live").unwrap();
        assert_eq!(swept, SweepCount { found: 1, updated: 1 });
        assert!(find(&db, KEY).unwrap().is_none());
        assert!(find(&db, "shot_cut:ws-2").unwrap().is_some());
        assert!(find(&db, "export:ws-1").unwrap().is_some());

        assert_eq!(release_stale(&db, "shot_cut:", "live").unwrap().updated, 0);
    }
}
