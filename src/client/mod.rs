//! MQTT v5.0 client publish path
//!
//! [`ClientService`] is shared through an `Arc` by every operation it runs. The caller
//! supplies the connection as a [`Stream`] for writes and, optionally, a
//! [`PacketSource`] read by [`spawn_packet_reader`](crate::tasks::spawn_packet_reader).
//!
//! # Examples
//!
//! ```rust,no_run
//! use mqtt5_publish::client::{AtLeastOnce, ClientService, IoStream, PacketReader};
//! use mqtt5_publish::tasks::spawn_packet_reader;
//! use mqtt5_publish::PublishOptions;
//!
//! # async fn run() -> mqtt5_publish::Result<()> {
//! let socket = tokio::net::TcpStream::connect("localhost:1883").await?;
//! // CONNECT/CONNACK happen before the socket is handed over
//! let (read, write) = socket.into_split();
//!
//! let svc = ClientService::new(IoStream::new(write));
//! spawn_packet_reader(svc.clone(), PacketReader::new(read));
//!
//! let ack = svc
//!     .publish::<AtLeastOnce>("sensors/temp", "21.5", PublishOptions::default())
//!     .await?;
//! assert!(ack.is_success());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod disconnect;
pub mod publish;
pub mod replies;
pub mod sender;
pub mod service;
pub mod stream;

pub use self::cancel::CancellationToken;
pub use self::disconnect::{async_disconnect, DisconnectContext};
pub use self::publish::{validate_publish, AtLeastOnce, AtMostOnce, ExactlyOnce, QosPolicy};
pub use self::sender::SendFlags;
pub use self::service::ClientService;
pub use self::stream::{IoStream, PacketReader, PacketSource, Stream};
