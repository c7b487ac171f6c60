//! Key-value backends for the suppression record.
//!
//! Every entry carries its own expiry so the backend drops stale values even if
//! the caller never checks timestamps itself. `CookieKv` hands that job to the
//! browser via `Max-Age`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

pub trait KvStore: Send + Sync {
    /// Value for `key`, or `None` if absent or expired at `now`.
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String>;
    /// Replace whatever is stored under `key`.
    fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (String, DateTime<Utc>)>> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut g = self.lock();
        let expired = now >= g.get(key)?.1;
        if expired {
            g.remove(key);
            return None;
        }
        g.get(key).map(|(value, _)| value.clone())
    }

    fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.lock()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: String,
    expires_at: DateTime<Utc>,
}

/// One JSON file per key under `dir`. Each write goes through its own temp file
/// in the same directory and is renamed over the target, so concurrent `set`
/// calls never share a scratch path and readers see a whole envelope.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating store dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let path = self.path_for(key);
        let raw = fs::read_to_string(&path).ok()?;
        let env: Envelope = match serde_json::from_str(&raw) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(target: "popup::store", error = %e, path = %path.display(), "unreadable store entry");
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if now >= env.expires_at {
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(env.value)
    }

    fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let path = self.path_for(key);
        let env = Envelope {
            value: value.to_string(),
            expires_at,
        };
        let json = serde_json::to_string(&env).context("serializing store entry")?;
        write_atomic(&self.dir, &path, json.as_bytes())
            .with_context(|| format!("writing store entry {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}

/// One visitor's cookies for the length of a single request.
///
/// Reads come from the request's `Cookie` header; writes and removals queue
/// `Set-Cookie` changes that the handler returns with `take_jar`. Values are
/// percent-encoded on the wire by the jar.
#[derive(Debug)]
pub struct CookieKv {
    jar: Mutex<CookieJar>,
    now: DateTime<Utc>,
}

impl CookieKv {
    /// `now` anchors `Max-Age` for entries set through this jar.
    pub fn new(jar: CookieJar, now: DateTime<Utc>) -> Self {
        Self {
            jar: Mutex::new(jar),
            now,
        }
    }

    /// Jar with every change made so far, for the response.
    pub fn take_jar(&self) -> CookieJar {
        std::mem::replace(&mut *self.lock(), CookieJar::new())
    }

    fn lock(&self) -> MutexGuard<'_, CookieJar> {
        match self.jar.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn update(&self, f: impl FnOnce(CookieJar) -> CookieJar) {
        let mut g = self.lock();
        let jar = std::mem::replace(&mut *g, CookieJar::new());
        *g = f(jar);
    }
}

impl KvStore for CookieKv {
    // The browser stops sending the cookie once Max-Age runs out.
    fn get(&self, key: &str, _now: DateTime<Utc>) -> Option<String> {
        self.lock().get(key).map(|c| c.value().to_string())
    }

    fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let max_age = (expires_at - self.now).num_seconds().max(0);
        let cookie = Cookie::build((key.to_string(), value.to_string()))
            .path("/")
            .max_age(time::Duration::seconds(max_age))
            .same_site(SameSite::Lax)
            .http_only(true);
        self.update(|jar| jar.add(cookie));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let cookie = Cookie::build((key.to_string(), String::new())).path("/");
        self.update(|jar| jar.remove(cookie));
        Ok(())
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn memory_entry_expires() {
        let kv = MemoryKv::new();
        kv.set("k", "v", t0() + Duration::seconds(10)).unwrap();
        assert_eq!(kv.get("k", t0()).as_deref(), Some("v"));
        assert_eq!(kv.get("k", t0() + Duration::seconds(10)), None);
        // expired entry was evicted
        assert_eq!(kv.get("k", t0()), None);
    }

    #[test]
    fn memory_set_replaces() {
        let kv = MemoryKv::new();
        let exp = t0() + Duration::hours(1);
        kv.set("k", "a", exp).unwrap();
        kv.set("k", "b", exp).unwrap();
        assert_eq!(kv.get("k", t0()).as_deref(), Some("b"));
        kv.remove("k").unwrap();
        assert_eq!(kv.get("k", t0()), None);
    }

    #[test]
    fn file_roundtrip_and_expiry() {
        let tmp = tempfile::tempdir().unwrap();
        let kv = FileKv::new(tmp.path().join("store")).unwrap();
        kv.set("popup_seen", "{\"x\":1}", t0() + Duration::minutes(5))
            .unwrap();
        assert_eq!(kv.get("popup_seen", t0()).as_deref(), Some("{\"x\":1}"));
        assert_eq!(kv.get("popup_seen", t0() + Duration::minutes(6)), None);
        assert!(!kv.dir().join("popup_seen.json").exists());
    }

    #[test]
    fn file_corrupt_envelope_reads_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let kv = FileKv::new(tmp.path()).unwrap();
        fs::write(tmp.path().join("popup_seen.json"), "not json").unwrap();
        assert_eq!(kv.get("popup_seen", t0()), None);
    }

    #[test]
    fn file_concurrent_sets_all_land() {
        let tmp = tempfile::tempdir().unwrap();
        let kv = Arc::new(FileKv::new(tmp.path()).unwrap());
        let exp = t0() + Duration::hours(1);

        let workers: Vec<_> = (0..8)
            .map(|w| {
                let kv = Arc::clone(&kv);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        kv.set("popup_seen", &format!("w{w}-{i}"), exp)
                            .expect("concurrent set");
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().expect("worker panicked");
        }

        let last = kv.get("popup_seen", t0()).expect("final value readable");
        assert!(last.starts_with('w') && last.ends_with("-199"), "got {last}");
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "stray temp files: {leftovers:?}");
    }

    #[test]
    fn cookie_reads_request_and_queues_changes() {
        let jar = CookieJar::new().add(Cookie::new("popup_seen", "old"));
        let kv = CookieKv::new(jar, t0());
        assert_eq!(kv.get("popup_seen", t0()).as_deref(), Some("old"));

        kv.set("popup_seen", "{\"id\":\"1\"}", t0() + Duration::hours(8))
            .unwrap();
        assert_eq!(kv.get("popup_seen", t0()).as_deref(), Some("{\"id\":\"1\"}"));

        let jar = kv.take_jar();
        let c = jar.get("popup_seen").expect("cookie queued");
        assert_eq!(c.path(), Some("/"));
        assert_eq!(c.max_age(), Some(time::Duration::hours(8)));
    }

    #[test]
    fn cookie_remove_drops_value() {
        let jar = CookieJar::new().add(Cookie::new("popup_seen", "v"));
        let kv = CookieKv::new(jar, t0());
        kv.remove("popup_seen").unwrap();
        assert_eq!(kv.get("popup_seen", t0()), None);
    }

    #[test]
    fn file_remove_missing_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let kv = FileKv::new(tmp.path()).unwrap();
        assert!(kv.remove("nothing").is_ok());
    }
}
