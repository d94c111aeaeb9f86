//! Simple subscriber network test
//!
//! Prints a summary of every message received on a topic.

use std::time::Duration;

use comms_if::{
    inbound::InboundQueue,
    net::{BrokerClient, NetParams},
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "test_net_sub", about = "Print every message received on a topic")]
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

    /// Topic to subscribe to
    #[structopt(long, default_value = "orion/topic/science/outbound")]
    topic: String,
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

    let queue = InboundQueue::default();
    let mut client = BrokerClient::new(queue.clone());

    // Listen before connecting so the first transitions aren't missed
    let changes = client.state_changes();

    // Subscribing before connecting is fine, it'll be sent once the broker accepts us
    client.subscribe(&opts.topic)?;
    client.connect(&params)?;

    // Recieve messages from the broker
    loop {
        while let Ok(s) = changes.try_recv() {
            println!("Connection state: {}", s);
        }

        for entry in queue.drain_and_snapshot().entries {
            println!(
                "[{}] {} ({}): {}",
                entry.received_at.format("%H:%M:%S%.3f"),
                entry.topic,
                entry.classification(),
                entry.summary()
            );
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}
