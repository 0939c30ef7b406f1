// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::trace;

use crate::conn::{Conn, Opts};
use crate::error::DriverError::{InvalidPoolConstraints, PoolCleared, Timeout};
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;

#[derive(Debug)]
struct InnerPool {
    opts: Opts,
    idle: VecDeque<Conn>,
    min: usize,
    max: usize,
    // Sessions alive, idle and checked out alike.
    count: usize,
    clearing: bool,
}

enum Plan {
    Reuse(Conn),
    Create,
}

/// A session pool bounded by `pool_min`/`pool_max` from [`Opts`].
///
/// Cloning a [`Pool`] is cheap, clones share the same sessions. Acquiring a
/// connection blocks whenever `pool_max` sessions are already checked out.
/// Network traffic happens with the pool unlocked, so a slow handshake never
/// stalls other acquirers.
#[derive(Clone)]
pub struct Pool(Arc<(Mutex<InnerPool>, Condvar)>);

impl Pool {
    /// Creates a pool with the constraints carried by `opts`. No session is
    /// opened until the first acquisition.
    pub fn new<T: Into<Opts>>(opts: T) -> MyResult<Pool> {
        let opts = opts.into();
        let min = opts.get_pool_min();
        let max = opts.get_pool_max();
        Pool::new_manual(min, max, opts)
    }

    /// Creates a pool with explicit constraints.
    pub fn new_manual<T: Into<Opts>>(min: usize, max: usize, opts: T) -> MyResult<Pool> {
        if min > max || max == 0 {
            return Err(DriverError(InvalidPoolConstraints));
        }
        let inner = InnerPool {
            opts: opts.into(),
            idle: VecDeque::with_capacity(max),
            min,
            max,
            count: 0,
            clearing: false,
        };
        Ok(Pool(Arc::new((Mutex::new(inner), Condvar::new()))))
    }

    /// Blocks until a session is available.
    pub fn get_conn(&self) -> MyResult<PooledConn> {
        self._get_conn(None)
    }

    /// Like [`Pool::get_conn`], but gives up after `timeout`.
    pub fn try_get_conn(&self, timeout: Duration) -> MyResult<PooledConn> {
        self._get_conn(Some(timeout))
    }

    fn _get_conn(&self, timeout: Option<Duration>) -> MyResult<PooledConn> {
        let start = Instant::now();
        let (ref mutex, ref condvar) = *self.0;
        let (plan, opts) = {
            let mut pool = mutex.lock()?;
            loop {
                if pool.clearing {
                    return Err(DriverError(PoolCleared));
                }
                if let Some(conn) = pool.idle.pop_front() {
                    break (Plan::Reuse(conn), pool.opts.clone());
                }
                if pool.count < pool.max {
                    // Reserve the slot before the handshake happens.
                    pool.count += 1;
                    break (Plan::Create, pool.opts.clone());
                }
                match timeout {
                    Some(timeout) => {
                        let elapsed = start.elapsed();
                        if elapsed >= timeout {
                            return Err(DriverError(Timeout));
                        }
                        let (guard, wait_result) =
                            condvar.wait_timeout(pool, timeout - elapsed)?;
                        pool = guard;
                        if wait_result.timed_out()
                            && pool.idle.is_empty()
                            && pool.count >= pool.max
                        {
                            return Err(DriverError(Timeout));
                        }
                    }
                    None => {
                        pool = condvar.wait(pool)?;
                    }
                }
            }
        };

        // The lock is released here, everything below may touch the network.
        let conn = match plan {
            Plan::Reuse(mut conn) => {
                let expired = match opts.get_conn_ttl() {
                    Some(ttl) => conn.expired(ttl),
                    None => false,
                };
                if !expired && conn.ping() {
                    trace!("reusing an idle pooled session");
                    conn
                } else {
                    trace!("replacing a stale pooled session");
                    drop(conn);
                    match Conn::new(opts) {
                        Ok(conn) => conn,
                        Err(e) => return Err(self.give_up_slot(e)?),
                    }
                }
            }
            Plan::Create => {
                trace!("opening a new pooled session");
                match Conn::new(opts) {
                    Ok(conn) => conn,
                    Err(e) => return Err(self.give_up_slot(e)?),
                }
            }
        };
        Ok(PooledConn {
            pool: self.clone(),
            conn: Some(conn),
        })
    }

    fn give_up_slot(&self, e: crate::error::Error) -> MyResult<crate::error::Error> {
        let (ref mutex, ref condvar) = *self.0;
        let mut pool = mutex.lock()?;
        pool.count -= 1;
        condvar.notify_one();
        Ok(e)
    }

    /// Closes every idle session and fails the waiters with
    /// [`PoolCleared`](crate::error::DriverError::PoolCleared). Checked out
    /// sessions are closed as they come back.
    pub fn clear(&self) -> MyResult<()> {
        let (ref mutex, ref condvar) = *self.0;
        let drained: Vec<Conn> = {
            let mut pool = mutex.lock()?;
            pool.clearing = true;
            let drained: Vec<Conn> = pool.idle.drain(..).collect();
            pool.count -= drained.len();
            condvar.notify_all();
            drained
        };
        // COM_QUIT goodbyes run unlocked.
        drop(drained);
        let mut pool = mutex.lock()?;
        pool.clearing = false;
        condvar.notify_all();
        Ok(())
    }

    fn return_conn(&self, conn: Conn) {
        let (ref mutex, ref condvar) = *self.0;
        let discarded = match mutex.lock() {
            Ok(mut pool) => {
                let discarded = if pool.clearing || pool.count > pool.min {
                    pool.count -= 1;
                    Some(conn)
                } else {
                    pool.idle.push_back(conn);
                    None
                };
                condvar.notify_one();
                discarded
            }
            Err(_) => Some(conn),
        };
        drop(discarded);
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 .0.lock() {
            Ok(pool) => write!(
                f,
                "Pool {{ min: {}, max: {}, count: {} }}",
                pool.min, pool.max, pool.count
            ),
            Err(_) => write!(f, "Pool {{ poisoned }}"),
        }
    }
}

/// A connection checked out of a [`Pool`]. Dereferences to [`Conn`] and
/// returns the session to its pool on drop.
#[derive(Debug)]
pub struct PooledConn {
    pool: Pool,
    conn: Option<Conn>,
}

impl PooledConn {
    pub fn as_ref(&self) -> &Conn {
        match self.conn {
            Some(ref conn) => conn,
            None => unreachable!("PooledConn is empty only during drop"),
        }
    }

    pub fn as_mut(&mut self) -> &mut Conn {
        match self.conn {
            Some(ref mut conn) => conn,
            None => unreachable!("PooledConn is empty only during drop"),
        }
    }

    /// Detaches the session from its pool for the rest of its life.
    pub fn unwrap(mut self) -> Conn {
        match self.conn.take() {
            Some(conn) => conn,
            None => unreachable!("PooledConn is empty only during drop"),
        }
    }
}

impl Deref for PooledConn {
    type Target = Conn;

    fn deref(&self) -> &Conn {
        self.as_ref()
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Conn {
        self.as_mut()
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            trace!("returning a session to its pool");
            self.pool.return_conn(conn);
        }
    }
}

/// Keeps one [`Pool`] per distinct connection configuration. Two [`Opts`]
/// values share a pool only when every setting matches, see
/// [`Opts::pool_key`].
#[derive(Debug, Default)]
pub struct PoolManager {
    pools: Mutex<HashMap<String, Pool>>,
}

impl PoolManager {
    pub fn new() -> PoolManager {
        PoolManager {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// The pool serving `opts`, created on first use.
    pub fn get_pool<T: Into<Opts>>(&self, opts: T) -> MyResult<Pool> {
        let opts = opts.into();
        let key = opts.pool_key();
        let mut pools = self.pools.lock()?;
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }
        let pool = Pool::new(opts)?;
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Acquires a session from the pool serving `opts`.
    pub fn get_conn<T: Into<Opts>>(&self, opts: T) -> MyResult<PooledConn> {
        self.get_pool(opts)?.get_conn()
    }

    /// Drops the pool serving `opts`, clearing its idle sessions. Teardown
    /// runs with the manager unlocked.
    pub fn clear<T: Into<Opts>>(&self, opts: T) -> MyResult<()> {
        let key = opts.into().pool_key();
        let detached = {
            let mut pools = self.pools.lock()?;
            pools.remove(&key)
        };
        match detached {
            Some(pool) => pool.clear(),
            None => Ok(()),
        }
    }

    /// Drops every pool.
    pub fn clear_all(&self) -> MyResult<()> {
        let detached: Vec<Pool> = {
            let mut pools = self.pools.lock()?;
            pools.drain().map(|(_, pool)| pool).collect()
        };
        for pool in detached {
            pool.clear()?;
        }
        Ok(())
    }

    /// Number of live pools, mostly useful in tests.
    pub fn pool_count(&self) -> usize {
        match self.pools.lock() {
            Ok(pools) => pools.len(),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{Pool, PoolManager};
    use crate::conn::{Opts, OptsBuilder};
    use crate::error::DriverError::{InvalidPoolConstraints, Timeout};
    use crate::error::Error::DriverError;

    fn opts(user: &str) -> Opts {
        let mut builder = OptsBuilder::new();
        builder.user(Some(user)).pool_constraints(0, 2);
        builder.into()
    }

    #[test]
    fn should_reject_inverted_constraints() {
        match Pool::new_manual(5, 2, opts("root")) {
            Err(DriverError(InvalidPoolConstraints)) => (),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn should_reject_zero_capacity() {
        match Pool::new_manual(0, 0, opts("root")) {
            Err(DriverError(InvalidPoolConstraints)) => (),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn clearing_an_empty_pool_is_a_noop() {
        let pool = Pool::new(opts("root")).unwrap();
        pool.clear().unwrap();
        pool.clear().unwrap();
    }

    #[test]
    fn manager_keeps_one_pool_per_configuration() {
        let manager = PoolManager::new();
        let a = manager.get_pool(opts("alice")).unwrap();
        let a_again = manager.get_pool(opts("alice")).unwrap();
        let _b = manager.get_pool(opts("bob")).unwrap();
        assert!(std::sync::Arc::ptr_eq(&a.0, &a_again.0));
        assert_eq!(manager.pool_count(), 2);
    }

    #[test]
    fn manager_detaches_pools_on_clear() {
        let manager = PoolManager::new();
        manager.get_pool(opts("alice")).unwrap();
        manager.get_pool(opts("bob")).unwrap();
        manager.clear(opts("alice")).unwrap();
        assert_eq!(manager.pool_count(), 1);
        manager.clear_all().unwrap();
        assert_eq!(manager.pool_count(), 0);
    }

    #[test]
    fn try_get_conn_times_out_instead_of_connecting_forever() {
        // 127.0.0.1:1 refuses immediately, so the pool burns the slot and
        // surfaces the connect error rather than the timeout.
        let mut builder = OptsBuilder::new();
        builder
            .ip_or_hostname(Some("127.0.0.1"))
            .tcp_port(1)
            .prefer_socket(false)
            .tcp_connect_timeout(Some(Duration::from_millis(100)))
            .pool_constraints(0, 1);
        let pool = Pool::new(Opts::from(builder)).unwrap();
        assert!(pool.try_get_conn(Duration::from_millis(200)).is_err());
        // The reserved slot was given back on failure.
        assert!(pool.try_get_conn(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn try_get_conn_times_out_while_the_pool_is_full() {
        let pool = Pool::new_manual(0, 1, opts("root")).unwrap();
        // Pretend a session is checked out.
        pool.0 .0.lock().unwrap().count = 1;
        match pool.try_get_conn(Duration::from_millis(100)) {
            Err(DriverError(Timeout)) => (),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        // Timing out must not leak or free the slot.
        assert_eq!(pool.0 .0.lock().unwrap().count, 1);
    }

    #[test]
    fn waiters_wake_when_capacity_is_released() {
        let mut builder = OptsBuilder::new();
        builder
            .ip_or_hostname(Some("127.0.0.1"))
            .tcp_port(1)
            .prefer_socket(false)
            .tcp_connect_timeout(Some(Duration::from_millis(50)))
            .pool_constraints(0, 1);
        let pool = Pool::new(Opts::from(builder)).unwrap();
        pool.0 .0.lock().unwrap().count = 1;
        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.try_get_conn(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(100));
        {
            let mut inner = pool.0 .0.lock().unwrap();
            inner.count = 0;
            pool.0 .1.notify_one();
        }
        // The woken waiter takes the freed slot and dials the refusing port,
        // so it reports the connect failure rather than its long timeout.
        match waiter.join().unwrap() {
            Err(DriverError(Timeout)) => panic!("waiter never woke up"),
            Err(_) => (),
            Ok(_) => panic!("connected to a refused port"),
        }
    }
}
