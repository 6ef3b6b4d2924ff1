//! transport: blocking TCP endpoint with exact-length message exchange.
//!
//! Every message on the wire is `<i32 total><content>`, where `total`
//! counts the four prefix bytes as well. The command frames inside the
//! content carry their own size prefixes (see the protocol crate); this
//! layer only delimits whole messages.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};

use protocol::Storage;

/// A blocking TCP endpoint, either listening for a single peer or
/// connecting out to one. At most one peer connection exists at a time
/// and there is no reconnect: once closed, the endpoint stays closed.
#[derive(Debug)]
pub struct TcpEndpoint {
    host: Option<String>,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpEndpoint {
    /// An endpoint that will [`accept`](TcpEndpoint::accept) one peer on
    /// the given port.
    pub fn server(port: u16) -> Self {
        Self {
            host: None,
            port,
            stream: None,
        }
    }

    /// An endpoint that will [`connect`](TcpEndpoint::connect) to
    /// `host:port`.
    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port,
            stream: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True while a peer connection is open.
    pub fn has_peer(&self) -> bool {
        self.stream.is_some()
    }

    /// Connects to the configured remote host.
    pub fn connect(&mut self) -> io::Result<()> {
        let host = self.host.as_deref().unwrap_or("localhost");
        let stream = TcpStream::connect((host, self.port))?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Blocks until one peer connects to the configured port. The listener
    /// is dropped once the peer is in; there is exactly one accept over
    /// the endpoint's lifetime.
    pub fn accept(&mut self) -> io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))?;
        let (stream, _peer) = listener.accept()?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no peer connection"))
    }

    /// Sends the storage contents as one framed message.
    pub fn send_exact(&mut self, message: &Storage) -> io::Result<()> {
        let total = (message.len() + 4) as i32;
        let stream = self.stream()?;
        stream.write_all(&total.to_be_bytes())?;
        stream.write_all(message.as_slice())?;
        stream.flush()
    }

    /// Receives exactly one framed message, appending its content to
    /// `into`.
    pub fn receive_exact(&mut self, into: &mut Storage) -> io::Result<()> {
        let stream = self.stream()?;

        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix)?;
        let total = i32::from_be_bytes(prefix);
        if total < 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid message length {total}"),
            ));
        }

        let mut content = vec![0u8; total as usize - 4];
        stream.read_exact(&mut content)?;
        into.write_raw(&content);
        Ok(())
    }

    /// Shuts the connection down and forgets the peer.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
