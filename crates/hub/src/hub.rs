use crate::error::HubError;
use crate::session::ClientSession;

use protocol::{framing, ProtocolError, Storage, CMD_CLOSE, CMD_SIMSTEP2, RTYPE_OK};
use tracing::{error, info, warn};
use transport::TcpEndpoint;

/// The multiplexer: one engine connection and one session per client port.
///
/// Each round services every connected session in configured-port order,
/// forwarding its commands to the engine and its answers back, and then
/// advances the engine by exactly one step, fanning the step result out to
/// all sessions. Rounds repeat until no client remains connected.
#[derive(Debug)]
pub struct Hub {
    engine: TcpEndpoint,
    sessions: Vec<ClientSession>,
    step_length_ms: i32,
    current_time_ms: i32,
}

impl Hub {
    /// A hub connecting out to `engine_host:engine_port` and listening for
    /// one client on each of `client_ports`.
    pub fn new(
        engine_host: impl Into<String>,
        engine_port: u16,
        client_ports: &[u16],
        step_length_ms: i32,
    ) -> Self {
        Self {
            engine: TcpEndpoint::client(engine_host, engine_port),
            sessions: client_ports.iter().map(|&p| ClientSession::new(p)).collect(),
            step_length_ms,
            current_time_ms: 0,
        }
    }

    /// Runs the whole lifecycle and returns the process exit status:
    /// 0 on a clean run, 1 on an engine-side fault, 2 on a client-side
    /// fault.
    pub fn execute(&mut self) -> i32 {
        if !self.connect_engine() {
            return 1;
        }
        if !self.accept_clients() {
            self.disconnect_engine();
            return 2;
        }

        let status = match self.run() {
            Ok(()) => 0,
            Err(err) => {
                error!("[hub] {err}");
                err.exit_status()
            }
        };

        self.disconnect_engine();
        if status == 0 {
            info!("[hub] finished simulation and disconnected from SUMO");
        } else {
            self.close_clients();
        }
        status
    }

    fn run(&mut self) -> Result<(), HubError> {
        let mut active = true;
        while active {
            active = self.handle_step()?;
        }
        Ok(())
    }

    fn connect_engine(&mut self) -> bool {
        match self.engine.connect() {
            Ok(()) => {
                info!("[hub] connected to SUMO on port {}", self.engine.port());
                true
            }
            Err(err) => {
                error!("[hub] could not connect to SUMO: {err}");
                false
            }
        }
    }

    /// Tells the engine we are done and drops the connection. Best effort;
    /// on the abort paths the engine may already be gone.
    fn disconnect_engine(&mut self) {
        if !self.engine.has_peer() {
            return;
        }

        let mut close_cmd = Storage::new();
        framing::write_command_size(&mut close_cmd, 1);
        close_cmd.write_u8(CMD_CLOSE);

        let _ = self.engine.send_exact(&close_cmd);
        self.engine.close();
    }

    fn accept_clients(&mut self) -> bool {
        for session in &mut self.sessions {
            info!("[hub] waiting for connection on port {}", session.port());
            if let Err(err) = session.accept_connection() {
                error!(
                    "[hub] client connection failed on port {}: {err}",
                    session.port()
                );
                return false;
            }
        }

        info!("[hub] all clients finished connecting");
        true
    }

    fn close_clients(&mut self) {
        for session in &mut self.sessions {
            session.close_connection();
        }
    }

    /// One round: every connected session takes its turn, then the engine
    /// advances one step. Returns true while some client remains.
    fn handle_step(&mut self) -> Result<bool, HubError> {
        let mut some_connected = false;

        for index in 0..self.sessions.len() {
            if self.sessions[index].is_connected() {
                self.handle_client(index)?;
                some_connected = some_connected || self.sessions[index].is_connected();
            }
        }

        self.run_step()?;
        Ok(some_connected)
    }

    /// Exchanges messages with one session until it freezes on a step or
    /// leaves: each batch of commands goes to the engine, the engine's
    /// answer comes straight back.
    fn handle_client(&mut self, index: usize) -> Result<(), HubError> {
        let mut message = Storage::new();
        let mut answer = Storage::new();

        while self.sessions[index].can_act(self.current_time_ms) {
            message.reset();
            self.sessions[index].get_commands(&mut message, self.current_time_ms)?;

            if !message.is_empty() {
                self.engine.send_exact(&message)?;

                answer.reset();
                self.engine.receive_exact(&mut answer)?;
                self.sessions[index].put_answers(&answer);
            }
        }

        Ok(())
    }

    /// Asks the engine for one simulation step and fans the result out to
    /// every session.
    fn run_step(&mut self) -> Result<(), HubError> {
        let mut message = Storage::new();
        framing::write_command_size(&mut message, 1 + 4);
        message.write_u8(CMD_SIMSTEP2);
        message.write_i32(0);

        self.engine.send_exact(&message)?;

        let mut answer = Storage::new();
        self.engine.receive_exact(&mut answer)?;
        self.current_time_ms += self.step_length_ms;

        // Verify on a copy so every session sees the untouched wire bytes.
        let mut status = Storage::new();
        status.write_raw(answer.as_slice());
        let (success, description) = self.verify_status_response(&mut status, CMD_SIMSTEP2)?;
        if !success {
            warn!("[hub] error on simulation step: {description}");
        }

        for session in &mut self.sessions {
            session.handle_step_result(self.current_time_ms, success, &answer);
        }

        Ok(())
    }

    /// Checks a status response from the engine: a readable size prefix,
    /// the expected opcode, a result code and a description string. Any
    /// structural failure is an engine-attributed protocol fault.
    fn verify_status_response(
        &self,
        answer: &mut Storage,
        expected: u8,
    ) -> Result<(bool, String), ProtocolError> {
        let port = self.engine.port();

        let size = framing::read_command_size(answer).map_err(|_| {
            ProtocolError::engine(
                format!("invalid status response for command 0x{expected:02x}: cannot read the size"),
                port,
            )
        })?;
        if size < 6 {
            return Err(ProtocolError::engine(
                format!(
                    "invalid status response for command 0x{expected:02x}: {size} bytes is too short"
                ),
                port,
            ));
        }

        let opcode = answer.read_u8().map_err(|_| {
            ProtocolError::engine("message too short: cannot read the command code", port)
        })?;
        if opcode != expected {
            return Err(ProtocolError::engine(
                format!(
                    "received status response for command 0x{opcode:02x} when expecting 0x{expected:02x}"
                ),
                port,
            ));
        }

        let result = answer.read_u8().map_err(|_| {
            ProtocolError::engine("message too short: cannot read the result code", port)
        })?;

        let description = answer.read_string().map_err(|_| {
            ProtocolError::engine("message too short: cannot read the result description", port)
        })?;

        Ok((result == RTYPE_OK, description))
    }
}
