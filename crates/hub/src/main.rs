use clap::Parser;
use hub::hub::Hub;

/// TraCI multiplexing hub between a SUMO server and several clients.
///
/// Connects to SUMO, accepts one control client per listed port, and keeps
/// all clients synchronized to the simulation steps.
#[derive(Parser, Debug)]
#[command(name = "tracihub", version, about, long_about = None)]
struct Args {
    /// The host where the SUMO server is located.
    #[arg(long, default_value = "localhost")]
    sumo_host: String,

    /// The time (in ms) a timestep is supposed to represent.
    #[arg(long, default_value_t = 1000)]
    step_length: i32,

    /// The port to which the SUMO server is listening.
    sumo_port: u16,

    /// One listening port per expected client.
    #[arg(required = true)]
    client_ports: Vec<u16>,
}

fn main() {
    let args = Args::parse();
    hub::init_tracing();

    let mut hub = Hub::new(
        args.sumo_host,
        args.sumo_port,
        &args.client_ports,
        args.step_length,
    );
    std::process::exit(hub.execute());
}
