//! Purpose: Thread-bound processing contexts and their lazily created catalog database.
//! Exports: `Context`, `ContextConfig`, `ContextPool`, `PooledContext`, `SEARCH_PATHS_ENV`.
//! Role: Owns the native context and the shared database through handle fields.
//! Invariants: A context is used by one thread at a time (`Send`, not `Sync`).
//! Invariants: `destroy` releases factories, then the database, then the native context,
//! and zeroes both handle fields; calling it again does nothing.
//! Invariants: Once created, the database handle stays the same until destroy or re-share.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsString;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::block::{self, RawHandle};
use super::error::{Error, ErrorKind, Result};
use super::handle::HandleCell;
use super::translate::translate;
use crate::native::{AuthorityFactory, Database, NativeContext};

/// Environment variable holding the default catalog search paths.
pub const SEARCH_PATHS_ENV: &str = "PROJBRIDGE_SEARCH_PATHS";

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings a context is created with.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContextConfig {
    search_paths: Vec<PathBuf>,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search paths from `PROJBRIDGE_SEARCH_PATHS`, empty when unset.
    pub fn from_env() -> Self {
        Self::from_path_list(std::env::var_os(SEARCH_PATHS_ENV))
    }

    fn from_path_list(value: Option<OsString>) -> Self {
        let search_paths = value
            .map(|value| {
                std::env::split_paths(&value)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self { search_paths }
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

/// Processing context bound to one thread at a time.
#[derive(Debug)]
pub struct Context {
    ptr: HandleCell,
    database: HandleCell,
    factories: RefCell<HashMap<String, Arc<AuthorityFactory>>>,
    config: ContextConfig,
}

impl Context {
    pub fn create(config: ContextConfig) -> Result<Self> {
        let native = Arc::new(NativeContext::new(config.search_paths.clone()));
        let handle = block::wrap(&native);
        if handle == 0 {
            return Err(Error::new(ErrorKind::Internal).with_message("cannot allocate a native context"));
        }
        let ptr = HandleCell::empty();
        ptr.install(handle)?;
        debug!(context = native.id(), search_paths = config.search_paths.len(), "created context");
        Ok(Self {
            ptr,
            database: HandleCell::empty(),
            factories: RefCell::new(HashMap::new()),
            config,
        })
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn is_destroyed(&self) -> bool {
        self.ptr.is_empty()
    }

    /// Native context behind this handle.
    pub fn native(&self) -> Result<Arc<NativeContext>> {
        let handle = self
            .ptr
            .live()
            .map_err(|err| err.with_message("context has been destroyed"))?;
        Ok(unsafe { block::unwrap::<NativeContext>(handle) })
    }

    /// Catalog database of this context, opened on first use.
    pub fn database(&self) -> Result<Arc<Database>> {
        let native = self.native()?;
        let handle = self.database.raw();
        if handle != 0 {
            return Ok(unsafe { block::unwrap::<Database>(handle) });
        }
        let database = Arc::new(Database::open(&native));
        let handle = block::wrap(&database);
        if handle == 0 {
            return Err(Error::new(ErrorKind::Internal).with_message("cannot allocate a database handle"));
        }
        if let Err(err) = self.database.install(handle) {
            unsafe { block::release::<Database>(handle) };
            return Err(err);
        }
        debug!(context = native.id(), database = database.id(), "opened context database");
        Ok(database)
    }

    /// Handle of the database block, creating the database when needed.
    pub fn database_handle(&self) -> Result<RawHandle> {
        self.database()?;
        self.database.live()
    }

    /// Makes this context use `sibling`'s database instead of its own.
    pub fn share_database_from(&self, sibling: &Context) -> Result<()> {
        let native = self.native()?;
        let shared = sibling.database()?;
        let handle = block::wrap(&shared);
        if handle == 0 {
            return Err(Error::new(ErrorKind::Internal).with_message("cannot allocate a database handle"));
        }
        self.factories.borrow_mut().clear();
        let previous = self.database.take();
        unsafe { block::release::<Database>(previous) };
        if let Err(err) = self.database.install(handle) {
            unsafe { block::release::<Database>(handle) };
            return Err(err);
        }
        debug!(
            context = native.id(),
            database = shared.id(),
            uses = Arc::strong_count(&shared),
            "sharing sibling database"
        );
        Ok(())
    }

    /// Authority factory for `authority`, cached per context.
    pub fn factory(&self, authority: &str) -> Result<Arc<AuthorityFactory>> {
        let key = authority.to_ascii_uppercase();
        if let Some(factory) = self.factories.borrow().get(&key) {
            return Ok(Arc::clone(factory));
        }
        let database = self.database()?;
        let factory = AuthorityFactory::new(Arc::clone(&database), authority)
            .map_err(|err| translate(err, ErrorKind::Internal))?;
        debug!(
            authority = %key,
            database = database.id(),
            uses = Arc::strong_count(&database),
            "created authority factory"
        );
        let factory = Arc::new(factory);
        self.factories.borrow_mut().insert(key, Arc::clone(&factory));
        Ok(factory)
    }

    /// Releases everything the context owns. Safe to call more than once.
    pub fn destroy(&self) {
        self.factories.borrow_mut().clear();
        let database = self.database.take();
        unsafe { block::release::<Database>(database) };
        let native = self.ptr.take();
        if native != 0 {
            debug!(database_released = database != 0, "destroyed context");
        }
        unsafe { block::release::<NativeContext>(native) };
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct Idle {
    context: Context,
    since: Instant,
}

/// Recycles contexts between short-lived callers.
#[derive(Debug)]
pub struct ContextPool {
    config: ContextConfig,
    idle_timeout: Duration,
    idle: Mutex<Vec<Idle>>,
}

impl std::fmt::Debug for Idle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Idle").field("since", &self.since).finish()
    }
}

impl ContextPool {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Idle>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of contexts waiting in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    /// Most recently returned live context, or a new one.
    pub fn acquire(&self) -> Result<PooledContext<'_>> {
        let (reused, expired) = {
            let mut idle = self.idle();
            let expired = self.split_expired(&mut idle);
            (idle.pop().map(|entry| entry.context), expired)
        };
        drop(expired);
        let context = match reused {
            Some(context) => context,
            None => Context::create(self.config.clone())?,
        };
        Ok(PooledContext {
            pool: self,
            context: ManuallyDrop::new(context),
        })
    }

    fn split_expired(&self, idle: &mut Vec<Idle>) -> Vec<Idle> {
        let now = Instant::now();
        let (expired, live): (Vec<Idle>, Vec<Idle>) = idle
            .drain(..)
            .partition(|entry| now.duration_since(entry.since) > self.idle_timeout);
        *idle = live;
        expired
    }

    fn give_back(&self, context: Context) {
        if context.is_destroyed() {
            return;
        }
        let expired = {
            let mut idle = self.idle();
            let expired = self.split_expired(&mut idle);
            idle.push(Idle {
                context,
                since: Instant::now(),
            });
            expired
        };
        if !expired.is_empty() {
            debug!(count = expired.len(), "destroying idle contexts");
        }
        drop(expired);
    }

    /// Destroys every idle context.
    pub fn destroy_all(&self) {
        let drained: Vec<Idle> = self.idle().drain(..).collect();
        debug!(count = drained.len(), "destroying pooled contexts");
        drop(drained);
    }
}

impl Drop for ContextPool {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

/// Context borrowed from a pool; returned when dropped.
#[derive(Debug)]
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    context: ManuallyDrop<Context>,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        let context = unsafe { ManuallyDrop::take(&mut self.context) };
        self.pool.give_back(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Capability;

    fn assert_send<T: Send>() {}

    #[test]
    fn database_is_created_once_and_cached() {
        assert_send::<Context>();
        let context = Context::create(ContextConfig::new()).expect("context");
        let first = context.database_handle().expect("handle");
        let second = context.database_handle().expect("handle");
        assert_eq!(first, second);
        let a = context.database().expect("database");
        let b = context.database().expect("database");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn sibling_sharing_points_both_contexts_at_one_database() {
        let owner = Context::create(ContextConfig::new()).expect("context");
        let borrower = Context::create(ContextConfig::new()).expect("context");
        let own = borrower.database().expect("database");
        borrower.share_database_from(&owner).expect("share");
        let shared = owner.database().expect("database");
        assert!(Arc::ptr_eq(&borrower.database().expect("database"), &shared));
        assert!(!Arc::ptr_eq(&own, &shared));
        assert_eq!(Arc::strong_count(&own), 1);

        owner.destroy();
        assert!(borrower.factory("EPSG").is_ok());
        let before = Arc::strong_count(&shared);
        borrower.destroy();
        assert_eq!(Arc::strong_count(&shared), before - 2);
    }

    #[test]
    fn destroy_is_idempotent_and_later_use_fails() {
        let context = Context::create(ContextConfig::new()).expect("context");
        let native = context.native().expect("native");
        context.factory("epsg").expect("factory");
        context.destroy();
        context.destroy();
        assert!(context.is_destroyed());
        assert_eq!(Arc::strong_count(&native), 1);
        assert_eq!(context.database().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(context.factory("EPSG").unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn factories_are_cached_per_authority() {
        let context = Context::create(ContextConfig::new()).expect("context");
        let a = context.factory("EPSG").expect("factory");
        let b = context.factory("epsg").expect("factory");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.create("7030", Capability::Ellipsoid).is_ok());
        let err = context.factory("NOPE").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFoundInCatalog);
    }

    #[test]
    fn search_paths_come_from_the_platform_list() {
        let joined = std::env::join_paths(["/opt/catalog", "/srv/more"]).expect("join");
        let config = ContextConfig::from_path_list(Some(joined));
        assert_eq!(
            config.search_paths(),
            &[PathBuf::from("/opt/catalog"), PathBuf::from("/srv/more")]
        );
        assert!(ContextConfig::from_path_list(None).search_paths().is_empty());
        let built = ContextConfig::new()
            .with_search_path("/a")
            .with_search_paths(["/b", "/c"]);
        assert_eq!(built.search_paths().len(), 3);
    }

    #[test]
    fn pool_reuses_returned_contexts_until_they_expire() {
        let pool = ContextPool::new(ContextConfig::new());
        assert_eq!(pool.idle_timeout(), Duration::from_secs(60));
        let handle = {
            let context = pool.acquire().expect("acquire");
            context.database_handle().expect("handle")
        };
        assert_eq!(pool.idle_count(), 1);
        {
            let context = pool.acquire().expect("acquire");
            assert_eq!(context.database_handle().expect("handle"), handle);
            assert_eq!(pool.idle_count(), 0);
        }
        pool.destroy_all();
        assert_eq!(pool.idle_count(), 0);

        let expiring = ContextPool::new(ContextConfig::new()).with_idle_timeout(Duration::ZERO);
        drop(expiring.acquire().expect("acquire"));
        std::thread::sleep(Duration::from_millis(5));
        drop(expiring.acquire().expect("acquire"));
        assert_eq!(expiring.idle_count(), 1);
    }
}
