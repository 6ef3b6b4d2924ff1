//! Shared harness: a scripted mock SUMO engine and a byte-level test
//! client speaking real frames through the transport crate.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use hub::hub::Hub;
use protocol::{framing, Storage, CMD_CLOSE, CMD_SIMSTEP2, RTYPE_ERR, RTYPE_OK};
use transport::TcpEndpoint;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Picks a currently free port by binding an ephemeral listener.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

/// Runs a hub on a background thread, returning its exit status on join.
pub fn spawn_hub(engine_port: u16, client_ports: Vec<u16>, step_length: i32) -> JoinHandle<i32> {
    thread::spawn(move || {
        let mut hub = Hub::new("127.0.0.1", engine_port, &client_ports, step_length);
        hub.execute()
    })
}

/// The scripted reply the mock engine gives to one step request.
#[derive(Clone, Copy)]
pub struct StepReply {
    pub opcode: u8,
    pub result: u8,
    pub description: &'static str,
}

impl StepReply {
    pub fn ok() -> Self {
        Self {
            opcode: CMD_SIMSTEP2,
            result: RTYPE_OK,
            description: "",
        }
    }

    pub fn failure(description: &'static str) -> Self {
        Self {
            opcode: CMD_SIMSTEP2,
            result: RTYPE_ERR,
            description,
        }
    }

    pub fn wrong_opcode(opcode: u8) -> Self {
        Self {
            opcode,
            result: RTYPE_OK,
            description: "",
        }
    }
}

/// One command frame as it appeared on the wire.
pub struct Frame {
    pub opcode: u8,
    pub bytes: Vec<u8>,
}

/// Splits a message into its command frames, keeping the on-wire bytes of
/// each. Panics on malformed input; the engine only ever parses hub
/// output.
pub fn parse_frames(content: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut at = 0;

    while at < content.len() {
        let (total, opcode_at) = if content[at] != 0 {
            (content[at] as usize, at + 1)
        } else {
            let wide = i32::from_be_bytes([
                content[at + 1],
                content[at + 2],
                content[at + 3],
                content[at + 4],
            ]);
            (wide as usize, at + 5)
        };

        frames.push(Frame {
            opcode: content[opcode_at],
            bytes: content[at..at + total].to_vec(),
        });
        at += total;
    }

    frames
}

/// A mock SUMO engine serving exactly one hub connection.
///
/// Every message the hub sends is recorded on `received` before it is
/// answered. Step requests are answered from the script, first to last,
/// then with plain successes; any other message is answered with one OK
/// status per contained command. A close request ends the engine.
pub struct MockEngine {
    port: u16,
    pub received: Receiver<Vec<u8>>,
    handle: JoinHandle<()>,
}

impl MockEngine {
    pub fn start(script: Vec<StepReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind engine port");
        let port = listener.local_addr().expect("local addr").port();
        let (tx, rx) = unbounded();

        let handle = thread::spawn(move || serve(listener, script, tx));
        Self {
            port,
            received: rx,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the engine thread; call only after the hub has sent its
    /// close (or dropped the connection).
    pub fn join(self) {
        let _ = self.handle.join();
    }

    /// The next recorded message, parsed into frames.
    pub fn next_message(&self) -> Vec<Frame> {
        let content = self
            .received
            .recv_timeout(RECV_TIMEOUT)
            .expect("engine received no message");
        parse_frames(&content)
    }
}

fn serve(listener: TcpListener, script: Vec<StepReply>, tx: Sender<Vec<u8>>) {
    let (mut stream, _) = match listener.accept() {
        Ok(conn) => conn,
        Err(_) => return,
    };

    let mut steps = 0usize;
    loop {
        let content = match read_message(&mut stream) {
            Ok(content) => content,
            Err(_) => break,
        };
        let frames = parse_frames(&content);
        let first_opcode = frames.first().map(|frame| frame.opcode);
        let _ = tx.send(content);

        let mut reply = Storage::new();
        match first_opcode {
            None | Some(CMD_CLOSE) => break,
            Some(CMD_SIMSTEP2) => {
                let scripted = script.get(steps).copied().unwrap_or_else(StepReply::ok);
                steps += 1;
                framing::write_status(&mut reply, scripted.opcode, scripted.result, scripted.description);
            }
            Some(_) => {
                for frame in &frames {
                    framing::write_status(&mut reply, frame.opcode, RTYPE_OK, "");
                }
            }
        }

        if write_message(&mut stream, reply.as_slice()).is_err() {
            break;
        }
    }
}

fn read_message(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix)?;
    let total = i32::from_be_bytes(prefix) as usize;

    let mut content = vec![0u8; total - 4];
    stream.read_exact(&mut content)?;
    Ok(content)
}

fn write_message(stream: &mut TcpStream, content: &[u8]) -> std::io::Result<()> {
    stream.write_all(&((content.len() + 4) as i32).to_be_bytes())?;
    stream.write_all(content)?;
    stream.flush()
}

/// A byte-level TraCI client driving one hub port.
pub struct TestClient {
    endpoint: TcpEndpoint,
}

impl TestClient {
    /// Connects, retrying until the hub starts listening on the port.
    pub fn connect(port: u16) -> Result<Self> {
        let mut endpoint = TcpEndpoint::client("127.0.0.1", port);
        for _ in 0..250 {
            if endpoint.connect().is_ok() {
                return Ok(Self { endpoint });
            }
            thread::sleep(Duration::from_millis(20));
        }
        anyhow::bail!("hub never listened on port {port}")
    }

    /// Sends one message whose content is the given command frames,
    /// back to back.
    pub fn send_frames(&mut self, frames: &[&[u8]]) -> Result<()> {
        let mut message = Storage::new();
        for frame in frames {
            message.write_raw(frame);
        }
        self.endpoint.send_exact(&message)?;
        Ok(())
    }

    pub fn send_step(&mut self, target_time: i32) -> Result<()> {
        self.send_frames(&[&step_frame(target_time)])
    }

    pub fn send_close(&mut self) -> Result<()> {
        self.send_frames(&[&close_frame()])
    }

    /// Receives one message, returning its content bytes.
    pub fn receive(&mut self) -> Result<Vec<u8>> {
        let mut answer = Storage::new();
        self.endpoint.receive_exact(&mut answer)?;
        Ok(answer.as_slice().to_vec())
    }

    /// True once the hub has closed this connection.
    pub fn receive_fails(&mut self) -> bool {
        let mut answer = Storage::new();
        self.endpoint.receive_exact(&mut answer).is_err()
    }
}

pub fn step_frame(target_time: i32) -> Vec<u8> {
    let mut frame = Storage::new();
    framing::write_command_size(&mut frame, 1 + 4);
    frame.write_u8(CMD_SIMSTEP2);
    frame.write_i32(target_time);
    frame.as_slice().to_vec()
}

pub fn close_frame() -> Vec<u8> {
    let mut frame = Storage::new();
    framing::write_command_size(&mut frame, 1);
    frame.write_u8(CMD_CLOSE);
    frame.as_slice().to_vec()
}

pub fn status_frame(opcode: u8, result: u8, description: &str) -> Vec<u8> {
    let mut frame = Storage::new();
    framing::write_status(&mut frame, opcode, result, description);
    frame.as_slice().to_vec()
}

/// An opaque application command with the given opcode and payload.
pub fn opaque_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Storage::new();
    framing::write_command_size(&mut frame, 1 + payload.len());
    frame.write_u8(opcode);
    frame.write_raw(payload);
    frame.as_slice().to_vec()
}
