//! Simple network publisher test
//!
//! Sends the same chassis command to the broker once a second.

use std::time::Duration;

use comms_if::{
    inbound::InboundQueue,
    net::{BrokerClient, CommandSink, NetParams},
    tc::ChassisCommand,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "test_net_pub",
    about = "Publish a chassis command once a second",
    setting = structopt::clap::AppSettings::AllowNegativeNumbers
)]
struct Opts {
    /// Broker host
    #[structopt(long, default_value = "localhost")]
    host: String,

    /// Broker port
    #[structopt(long, default_value = "1883")]
    port: u16,

    #[structopt(long, default_value = "")]
    username: String,

    #[structopt(long, default_value = "")]
    password: String,

    /// Topic to publish on
    #[structopt(long, default_value = "orion/topic/chassis/controller/inbound")]
    topic: String,

    /// Wheel demands, in fl fr rl rr order
    #[structopt(default_value = "0")]
    wheels: Vec<i32>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::from_args();

    let params = NetParams {
        host: opts.host,
        port: opts.port,
        username: opts.username,
        password: opts.password,
        ..Default::default()
    };

    let mut speeds = [0i32; 4];
    for (i, s) in opts.wheels.iter().take(4).enumerate() {
        speeds[i] = *s;
    }
    let cmd = ChassisCommand::from_wheels(speeds);

    // Create the client
    let mut client = BrokerClient::new(InboundQueue::default());
    let changes = client.state_changes();
    client.connect(&params)?;

    println!("Connecting to {}:{}", params.host, params.port);

    loop {
        // Print any state changes
        while let Ok(s) = changes.try_recv() {
            println!("Connection state: {}", s);
        }

        match client.publish(&opts.topic, &cmd.to_envelope()) {
            Ok(_) => println!("Sent {:?}", cmd),
            Err(e) => println!("Failed to send command: {}", e),
        }

        std::thread::sleep(Duration::from_millis(1000));
    }
}
