use std::io;

use protocol::{framing, ProtocolError, Storage, CMD_CLOSE, CMD_SIMSTEP2, RTYPE_OK};
use tracing::{info, warn};
use transport::TcpEndpoint;

/// Per-client connection state and message exchange.
///
/// A session moves through four states: disconnected, ready, waiting (a
/// step was requested and the target time not yet reached) and
/// disconnecting (a close was received but the goodbye not yet flushed).
/// [`is_connected`](ClientSession::is_connected) is false only when
/// disconnected; [`can_act`](ClientSession::can_act) is true only when
/// ready.
///
/// Step and close commands are filtered out of the client's traffic and
/// absorbed into the session state; everything else is handed back for
/// forwarding. Since a message may continue past a step request, the
/// session keeps both the partially drained inbound message and the
/// answers accumulated for it, and flushes the answers once the client is
/// neither frozen nor mid-message.
#[derive(Debug)]
pub struct ClientSession {
    endpoint: TcpEndpoint,
    /// The currently drained inbound message.
    pending_in: Storage,
    /// Answers accumulated until the next flush point.
    pending_out: Storage,
    connected: bool,
    waiting: bool,
    /// True from the close command until the goodbye is flushed.
    disconnecting: bool,
    /// Simulated time (ms) releasing `waiting`; -1 means the next step.
    target_time: i32,
}

impl ClientSession {
    /// Prepares to listen for one client on the given port.
    pub fn new(port: u16) -> Self {
        Self {
            endpoint: TcpEndpoint::server(port),
            pending_in: Storage::new(),
            pending_out: Storage::new(),
            connected: false,
            waiting: false,
            disconnecting: false,
            target_time: -1,
        }
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// Blocks until the client connects. Returns false when a connection
    /// already exists; there is no reconnect.
    pub fn accept_connection(&mut self) -> io::Result<bool> {
        if self.connected {
            return Ok(false);
        }
        self.endpoint.accept()?;
        self.connected = true;
        Ok(true)
    }

    /// True when the session may take its turn: connected, not frozen on a
    /// step and not scheduled for disconnection. The current time is
    /// unused today; release stays gated on step results.
    pub fn can_act(&self, _now: i32) -> bool {
        self.connected && !self.waiting && !self.disconnecting
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.has_peer()
    }

    /// Drains the client's current turn into `out`.
    ///
    /// Receives a new message when the previous one is exhausted, then
    /// hands commands through up to and including the first step or close
    /// request. Returns false when the session had nothing to do or lost
    /// its peer; a malformed command is a client-attributed protocol
    /// fault.
    pub fn get_commands(&mut self, out: &mut Storage, now: i32) -> Result<bool, ProtocolError> {
        if !self.can_act(now) && !self.disconnecting && !self.has_pending_answers() {
            return Ok(false);
        }

        if !self.has_pending_commands() {
            self.pending_in.reset();
            if let Err(err) = self.endpoint.receive_exact(&mut self.pending_in) {
                warn!("[session] lost client on port {}: {err}", self.port());
                self.close_connection();
                return Ok(false);
            }
        }

        let mut last_cmd = None;
        let mut processed = 0;
        while self.pending_in.valid_pos() {
            let cmd = self.handle_command(out)?;
            processed += 1;
            last_cmd = Some(cmd);

            if cmd == CMD_SIMSTEP2 || cmd == CMD_CLOSE {
                break;
            }
        }

        // A lone close request gets its goodbye right away.
        if last_cmd == Some(CMD_CLOSE) && processed == 1 {
            return Ok(self.send_answers());
        }

        Ok(true)
    }

    /// Records answers for the client and flushes them when the session is
    /// not frozen and either its message is fully handled or the client
    /// asked to disconnect. Returns false once the client is gone.
    pub fn put_answers(&mut self, answers: &Storage) -> bool {
        if !self.connected {
            return false;
        }

        self.pending_out.write_raw(answers.as_slice());

        if !self.waiting && (!self.has_pending_commands() || self.disconnecting) {
            return self.send_answers();
        }
        true
    }

    /// Feeds the engine's step result into the session.
    ///
    /// A successful step short of the target time keeps the client frozen.
    /// Anything else releases it and delivers the engine's answer as is,
    /// so a failed step reaches the client no matter the target time.
    pub fn handle_step_result(&mut self, now: i32, success: bool, result: &Storage) {
        if success && now < self.target_time {
            return;
        }

        self.waiting = false;
        self.put_answers(result);
    }

    /// Closes the connection if one is open.
    pub fn close_connection(&mut self) {
        if self.connected {
            self.endpoint.close();
            self.connected = false;
        }
    }

    fn has_pending_commands(&self) -> bool {
        self.pending_in.valid_pos()
    }

    fn has_pending_answers(&self) -> bool {
        !self.pending_out.is_empty()
    }

    /// Handles the next command of the inbound message: absorbs step and
    /// close requests into the session state, copies anything else to
    /// `out`. Returns the command's opcode.
    fn handle_command(&mut self, out: &mut Storage) -> Result<u8, ProtocolError> {
        let port = self.port();

        let size = framing::read_command_size(&mut self.pending_in).map_err(|_| {
            ProtocolError::client("message too short: cannot read the size of a command", port)
        })?;

        let opcode = self.pending_in.read_u8().map_err(|_| {
            ProtocolError::client("message too short: cannot read the code of a command", port)
        })?;

        match opcode {
            CMD_SIMSTEP2 => {
                let next_t = self.pending_in.read_i32().map_err(|_| {
                    ProtocolError::client(
                        "message too short: cannot read the target time of a step command",
                        port,
                    )
                })?;

                self.target_time = if next_t == 0 { -1 } else { next_t };
                self.waiting = true;
            }
            CMD_CLOSE => {
                self.disconnecting = true;
            }
            _ => {
                framing::write_command_size(out, size);
                out.write_u8(opcode);

                let payload = self
                    .pending_in
                    .read_raw(size.saturating_sub(1))
                    .map_err(|_| {
                        ProtocolError::client(
                            "message too short: could not read all bytes of a command",
                            port,
                        )
                    })?;
                out.write_raw(payload);
            }
        }

        Ok(opcode)
    }

    /// Flushes the accumulated answers, appending the goodbye first when
    /// the client asked to disconnect.
    fn send_answers(&mut self) -> bool {
        if !self.connected {
            return false;
        }

        if self.disconnecting {
            framing::write_status(&mut self.pending_out, CMD_CLOSE, RTYPE_OK, "Goodbye");
        }

        if let Err(err) = self.endpoint.send_exact(&self.pending_out) {
            warn!("[session] lost client on port {}: {err}", self.port());
            self.close_connection();
            return false;
        }

        if self.disconnecting {
            info!("[session] client on port {} disconnected", self.port());
            self.close_connection();
        }

        self.pending_out.reset();
        true
    }
}
