//! RedisTaskQueue - Redis list as the task queue (`RPUSH` / `BLPOP`).
//!
//! `BLPOP` parks the whole connection it runs on, so commands never share a
//! connection: each one checks out a connection from a small idle pool and
//! returns it afterwards. A connection that errors or stops answering is
//! dropped, never returned, so the next command opens a fresh one.
//!
//! Every command has a client-side deadline. A server that accepts the
//! connection and then goes silent surfaces as `QueueError::Connection`
//! instead of a pop that never returns.

use std::time::Duration;

use async_trait::async_trait;
use redis::FromRedisValue;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::app::RetryPolicy;
use crate::domain::QueueError;
use crate::ports::{RawPayload, TaskQueue};

/// Default time a command may wait for its reply. `BLPOP` gets this on top
/// of its own server-side timeout.
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on opening a connection (TCP connect plus handshake).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisTaskQueue {
    client: redis::Client,
    idle: Mutex<Vec<MultiplexedConnection>>,
    reply_timeout: Duration,
}

impl RedisTaskQueue {
    /// Connect to `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = open_connection(&client).await?;
        debug!(url, "connected to redis");
        Ok(Self {
            client,
            idle: Mutex::new(vec![conn]),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// `connect`, retried with backoff under `policy` while the server is
    /// unreachable. Configuration errors (a bad URL) are not retried.
    pub async fn connect_with_retry(url: &str, policy: &RetryPolicy) -> Result<Self, QueueError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match Self::connect(url).await {
                Ok(queue) => return Ok(queue),
                Err(err @ QueueError::Connection(_)) if !policy.is_exhausted(attempt) => {
                    let delay = policy.jittered_delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "redis unreachable, retrying connect"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Returns the connection and whether it came from the idle pool.
    async fn checkout(&self) -> Result<(MultiplexedConnection, bool), QueueError> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok((conn, true));
        }
        Ok((open_connection(&self.client).await?, false))
    }

    async fn checkin(&self, conn: MultiplexedConnection) {
        self.idle.lock().await.push(conn);
    }
}

async fn open_connection(client: &redis::Client) -> Result<MultiplexedConnection, QueueError> {
    match tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection()).await {
        Ok(conn) => Ok(conn?),
        Err(_) => Err(QueueError::Connection(format!(
            "no handshake reply from redis within {CONNECT_TIMEOUT:?}"
        ))),
    }
}

enum QueryError {
    Redis(redis::RedisError),
    NoReply(Duration),
}

impl QueryError {
    /// The connection is unusable and must not go back to the pool.
    fn connection_broken(&self) -> bool {
        match self {
            QueryError::Redis(err) => {
                err.is_io_error() || err.is_connection_dropped() || err.is_unrecoverable_error()
            }
            QueryError::NoReply(_) => true,
        }
    }
}

impl From<QueryError> for QueueError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Redis(err) => err.into(),
            QueryError::NoReply(limit) => {
                QueueError::Connection(format!("no reply from redis within {limit:?}"))
            }
        }
    }
}

async fn query_within<T: FromRedisValue>(
    cmd: &redis::Cmd,
    conn: &mut MultiplexedConnection,
    limit: Duration,
) -> Result<T, QueryError> {
    match tokio::time::timeout(limit, cmd.query_async(conn)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(QueryError::Redis(err)),
        Err(_) => Err(QueryError::NoReply(limit)),
    }
}

fn rpush(queue: &str, payload: &[u8]) -> redis::Cmd {
    let mut cmd = redis::cmd("RPUSH");
    cmd.arg(queue).arg(payload);
    cmd
}

/// `BLPOP key timeout`. Whole seconds are sent as an integer so servers older
/// than 6.0 accept them.
fn blpop(queue: &str, timeout: Duration) -> redis::Cmd {
    // Zero would block forever.
    let timeout = timeout.max(Duration::from_millis(1));
    let mut cmd = redis::cmd("BLPOP");
    cmd.arg(queue);
    if timeout.subsec_nanos() == 0 {
        cmd.arg(timeout.as_secs());
    } else {
        cmd.arg(timeout.as_secs_f64());
    }
    cmd
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn push(&self, queue: &str, payload: RawPayload) -> Result<(), QueueError> {
        let cmd = rpush(queue, &payload);
        let (mut conn, pooled) = self.checkout().await?;

        match query_within::<i64>(&cmd, &mut conn, self.reply_timeout).await {
            Ok(_len) => {
                self.checkin(conn).await;
                Ok(())
            }
            // idle 中にサーバ側で切られた接続: 新しい接続で一度だけやり直す
            Err(err @ QueryError::Redis(_)) if pooled && err.connection_broken() => {
                debug!(
                    error = %QueueError::from(err),
                    "pooled redis connection broken, reconnecting"
                );
                let mut conn = open_connection(&self.client).await?;
                let _len: i64 = query_within(&cmd, &mut conn, self.reply_timeout).await?;
                self.checkin(conn).await;
                Ok(())
            }
            Err(err) => {
                if !err.connection_broken() {
                    self.checkin(conn).await;
                }
                Err(err.into())
            }
        }
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<RawPayload>, QueueError> {
        let (mut conn, _) = self.checkout().await?;
        let limit = timeout + self.reply_timeout;

        let popped: Option<(String, Vec<u8>)> =
            match query_within(&blpop(queue, timeout), &mut conn, limit).await {
                Ok(popped) => popped,
                Err(err) => {
                    // A timed-out connection may still be parked on BLPOP.
                    if !err.connection_broken() {
                        self.checkin(conn).await;
                    }
                    return Err(err.into());
                }
            };
        self.checkin(conn).await;

        Ok(popped.map(|(_key, payload)| payload))
    }
}
