//! Two-party communication layer.
//!
//! Connections are set up asynchronously with tokio (party 0 listens on its
//! endpoint, party 1 connects with retries) and then handed over as blocking
//! std streams to a `scuttlebutt` channel for the MPC phases, which run on a
//! blocking thread.

use std::{
    io::{BufReader, BufWriter, Read, Write},
    net::TcpStream as StdTcpStream,
    time::Duration,
};

use scuttlebutt::{AbstractChannel, TrackChannel};
use serde::{Serialize, de::DeserializeOwned};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::{
    config::{Endpoints, PartyId},
    error::BackendError,
    stats::CommunicationStats,
};

const CONNECT_ATTEMPTS: usize = 50;
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);
const MAX_FRAME_LEN: u64 = 1 << 30;
/// Frames are read in pieces of this size, so memory follows the bytes the
/// peer actually sends rather than the length it announces.
const READ_CHUNK: usize = 64 * 1024;
const SYNC_TOKEN: u8 = 0x5a;

/// Communication layer over a TCP connection.
pub type TcpCommunicationLayer =
    CommunicationLayer<BufReader<StdTcpStream>, BufWriter<StdTcpStream>>;

/// Establishes the TCP connection between the two parties.
#[derive(Debug, Clone)]
pub struct TcpSetupHelper {
    my_id: PartyId,
    endpoints: Endpoints,
}

impl TcpSetupHelper {
    pub fn new(my_id: PartyId, endpoints: Endpoints) -> Self {
        TcpSetupHelper { my_id, endpoints }
    }

    /// Connects to the peer and returns a blocking std stream.
    pub async fn connect(&self) -> Result<StdTcpStream, BackendError> {
        let socket = match self.my_id {
            PartyId::Zero => {
                let address = self.endpoints.get(PartyId::Zero).address();
                let listener = TcpListener::bind(&address).await?;
                info!("party 0: listening on {}", address);
                let (socket, peer_addr) = listener.accept().await?;
                info!("party 0: accepted connection from {}", peer_addr);
                socket
            }
            PartyId::One => {
                let address = self.endpoints.get(PartyId::Zero).address();
                let mut attempts = 0;
                loop {
                    match TcpStream::connect(&address).await {
                        Ok(socket) => {
                            info!("party 1: connected to {}", address);
                            break socket;
                        }
                        Err(e) => {
                            attempts += 1;
                            if attempts >= CONNECT_ATTEMPTS {
                                return Err(e.into());
                            }
                            debug!(
                                "party 1: connection attempt {} to {} failed: {}",
                                attempts, address, e
                            );
                            tokio::time::sleep(CONNECT_BACKOFF).await;
                        }
                    }
                }
            }
        };
        socket.set_nodelay(true)?;

        // The MPC phases use blocking I/O on a dedicated thread.
        let std_socket = socket.into_std()?;
        std_socket.set_nonblocking(false)?;
        Ok(std_socket)
    }
}

/// Length-prefixed, bincode-encoded frames over a byte-counting channel.
///
/// Party 0 always writes before it reads and party 1 reads before it
/// writes, so two large frames never sit in both send buffers at once.
pub struct CommunicationLayer<R: Read, W: Write> {
    my_id: PartyId,
    channel: TrackChannel<R, W>,
    frames_sent: u64,
    frames_received: u64,
}

impl TcpCommunicationLayer {
    /// Wraps a connected TCP stream and performs the id handshake.
    pub fn from_tcp(my_id: PartyId, stream: StdTcpStream) -> Result<Self, BackendError> {
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Self::establish(my_id, reader, writer)
    }
}

impl<R: Read, W: Write> CommunicationLayer<R, W> {
    /// Creates the layer and checks that the peer claims the other party id.
    pub fn establish(my_id: PartyId, reader: R, writer: W) -> Result<Self, BackendError> {
        let mut layer = CommunicationLayer {
            my_id,
            channel: TrackChannel::new(reader, writer),
            frames_sent: 0,
            frames_received: 0,
        };
        let peer: PartyId = layer.exchange(&my_id)?;
        if peer != my_id.peer() {
            return Err(BackendError::handshake(format!(
                "party {} connected to party {}",
                my_id, peer
            )));
        }
        layer.reset_transport_statistics();
        Ok(layer)
    }

    pub fn my_id(&self) -> PartyId {
        self.my_id
    }

    /// Sends `msg` and receives the peer's message of the same type.
    pub fn exchange<T>(&mut self, msg: &T) -> Result<T, BackendError>
    where
        T: Serialize + DeserializeOwned,
    {
        match self.my_id {
            PartyId::Zero => {
                self.send(msg)?;
                self.receive()
            }
            PartyId::One => {
                let received = self.receive()?;
                self.send(msg)?;
                Ok(received)
            }
        }
    }

    pub fn send<T: Serialize>(&mut self, msg: &T) -> Result<(), BackendError> {
        let bytes = bincode::serialize(msg)?;
        self.channel
            .write_bytes(&(bytes.len() as u64).to_le_bytes())?;
        self.channel.write_bytes(&bytes)?;
        self.channel.flush()?;
        self.frames_sent += 1;
        Ok(())
    }

    pub fn receive<T: DeserializeOwned>(&mut self) -> Result<T, BackendError> {
        let mut len = [0u8; 8];
        self.channel.read_bytes(&mut len)?;
        let len = u64::from_le_bytes(len);
        if len > MAX_FRAME_LEN {
            return Err(BackendError::frame(format!(
                "peer announced a frame of {} bytes",
                len
            )));
        }
        let mut remaining = len as usize;
        let mut chunk = vec![0u8; remaining.min(READ_CHUNK)];
        let mut bytes = Vec::with_capacity(chunk.len());
        while remaining > 0 {
            let n = remaining.min(READ_CHUNK);
            self.channel.read_bytes(&mut chunk[..n])?;
            bytes.extend_from_slice(&chunk[..n]);
            remaining -= n;
        }
        self.frames_received += 1;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Blocks until the peer reaches the same point.
    pub fn sync(&mut self) -> Result<(), BackendError> {
        let token: u8 = self.exchange(&SYNC_TOKEN)?;
        if token != SYNC_TOKEN {
            return Err(BackendError::frame(format!(
                "expected sync token, got {:#04x}",
                token
            )));
        }
        Ok(())
    }

    pub fn transport_statistics(&self) -> CommunicationStats {
        CommunicationStats {
            kilobytes_sent: self.channel.kilobytes_written(),
            kilobytes_received: self.channel.kilobytes_read(),
            frames_sent: self.frames_sent,
            frames_received: self.frames_received,
        }
    }

    pub fn reset_transport_statistics(&mut self) {
        self.channel.clear();
        self.frames_sent = 0;
        self.frames_received = 0;
    }

    /// Final barrier before the connection is dropped.
    pub fn shutdown(mut self) -> Result<(), BackendError> {
        self.sync()?;
        if let Err(e) = self.channel.flush() {
            warn!("party {}: flush on shutdown failed: {}", self.my_id, e);
        }
        debug!("party {}: communication layer shut down", self.my_id);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        io::{BufReader, BufWriter},
        os::unix::net::UnixStream,
        thread,
    };

    use super::CommunicationLayer;
    use crate::config::PartyId;

    pub(crate) type LocalLayer = CommunicationLayer<BufReader<UnixStream>, BufWriter<UnixStream>>;

    pub(crate) fn layer(my_id: PartyId, stream: UnixStream) -> LocalLayer {
        let reader = BufReader::new(stream.try_clone().unwrap());
        let writer = BufWriter::new(stream);
        CommunicationLayer::establish(my_id, reader, writer).unwrap()
    }

    /// Runs `party0` on a spawned thread and `party1` on the current one,
    /// connected by a unix socket pair.
    pub(crate) fn run_two_party<F0, F1, T0, T1>(party0: F0, party1: F1) -> (T0, T1)
    where
        F0: FnOnce(LocalLayer) -> T0 + Send + 'static,
        F1: FnOnce(LocalLayer) -> T1,
        T0: Send + 'static,
    {
        let (sender, receiver) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || party0(layer(PartyId::Zero, sender)));
        let second = party1(layer(PartyId::One, receiver));
        let first = handle.join().unwrap();
        (first, second)
    }
}
