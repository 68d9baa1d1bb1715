use crate::datastore::{DataStore, DataStoreError, ReplicaTarget, StatusSection};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use redis_protocol::codec::Resp2;
use redis_protocol::resp2::types::BytesFrame;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_util::codec::Framed;

type Connection = Framed<TcpStream, Resp2>;

/// RedisDataStore speaks RESP2 to a Redis-compatible server over a single shared connection. The
/// connection is opened lazily and thrown away after any transport failure or timeout, so the next
/// command reconnects.
pub struct RedisDataStore {
    logger: slog::Logger,
    address: String,
    command_timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl RedisDataStore {
    pub fn new(logger: slog::Logger, address: impl Into<String>, command_timeout: Duration) -> Self {
        let address = address.into();
        RedisDataStore {
            logger: logger.new(slog::o!("DataStore" => address.clone())),
            address,
            command_timeout,
            connection: Mutex::new(None),
        }
    }

    async fn command(&self, args: &[&str]) -> Result<BytesFrame, DataStoreError> {
        let mut connection = self.connection.lock().await;

        let result = tokio::time::timeout(
            self.command_timeout,
            Self::round_trip(&mut connection, &self.address, args),
        )
        .await;

        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                slog::debug!(self.logger, "Dropping connection after {:?} failed: {}", args, e);
                connection.take();
                Err(e)
            }
            Err(_) => {
                slog::debug!(self.logger, "Dropping connection after {:?} timed out", args);
                connection.take();
                Err(DataStoreError::Timeout(self.command_timeout))
            }
        }
    }

    async fn round_trip(
        slot: &mut Option<Connection>,
        address: &str,
        args: &[&str],
    ) -> Result<BytesFrame, DataStoreError> {
        if slot.is_none() {
            let socket = TcpStream::connect(address).await?;
            socket.set_nodelay(true)?;
            *slot = Some(Framed::new(socket, Resp2::default()));
        }
        let framed = slot.as_mut().ok_or(DataStoreError::Disconnected)?;

        framed
            .send(request_frame(args))
            .await
            .map_err(|e| DataStoreError::Protocol(e.to_string()))?;

        match framed.next().await {
            Some(reply) => reply.map_err(|e| DataStoreError::Protocol(e.to_string())),
            None => Err(DataStoreError::Disconnected),
        }
    }
}

#[async_trait::async_trait]
impl DataStore for RedisDataStore {
    fn address(&self) -> &str {
        &self.address
    }

    async fn status(&self, section: StatusSection) -> Result<String, DataStoreError> {
        let reply = self.command(&["INFO", section.as_str()]).await?;
        text_reply(reply)
    }

    async fn replicate_from(&self, target: &ReplicaTarget) -> Result<(), DataStoreError> {
        let reply = match target {
            ReplicaTarget::NoOne => self.command(&["SLAVEOF", "NO", "ONE"]).await?,
            ReplicaTarget::Primary(leader) => {
                let port = leader.port.to_string();
                self.command(&["SLAVEOF", leader.address.as_str(), port.as_str()])
                    .await?
            }
        };
        ok_reply(reply)
    }
}

fn request_frame(args: &[&str]) -> BytesFrame {
    BytesFrame::Array(
        args.iter()
            .map(|arg| BytesFrame::BulkString(Bytes::copy_from_slice(arg.as_bytes())))
            .collect(),
    )
}

fn text_reply(reply: BytesFrame) -> Result<String, DataStoreError> {
    match reply {
        BytesFrame::BulkString(bytes) | BytesFrame::SimpleString(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|_| DataStoreError::Protocol("status report is not UTF-8".to_string())),
        BytesFrame::Error(err) => Err(DataStoreError::Server(err.to_string())),
        other => Err(DataStoreError::Protocol(format!("unexpected reply: {:?}", other))),
    }
}

fn ok_reply(reply: BytesFrame) -> Result<(), DataStoreError> {
    match reply {
        BytesFrame::SimpleString(s) if s.as_ref() == b"OK" => Ok(()),
        BytesFrame::Error(err) => Err(DataStoreError::Server(err.to_string())),
        other => Err(DataStoreError::Protocol(format!("unexpected reply: {:?}", other))),
    }
}
