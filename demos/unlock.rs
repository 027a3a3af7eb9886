//! Hand the front panel back to the user after a program left the supply in remote mode.
//!
//! Usage: `cargo run --example unlock -- [PORT] [BAUD]`

use std::env;

use bk1788b_psu::{config::Config, psu::Bk1788b, types::BaudRate};
use inquire::Select;

fn main() {
    env_logger::init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    let baud_rate = match env::args().nth(2) {
        Some(arg) => {
            let raw: u32 = arg.parse().expect("Baud rate must be a number");
            BaudRate::try_from(raw).unwrap_or_else(|rate| {
                eprintln!("Unsupported baud rate {rate}, use 4800, 9600, 19200 or 38400");
                std::process::exit(1);
            })
        }
        None => BaudRate::default(),
    };

    println!(
        "Connecting to {} @ {} baud...",
        port_name,
        u32::from(baud_rate)
    );
    let psu = match Bk1788b::open(Config::new(&port_name).with_baud_rate(baud_rate)) {
        Ok(psu) => psu,
        Err(err) => {
            eprintln!("Could not open {port_name}: {err}");
            eprintln!("Check the port name and the baud rate set on the supply");
            std::process::exit(1);
        }
    };

    match psu.read_status().expect("Serial link failed") {
        Some(status) if status.remote_mode => {
            println!("Remote mode is on, switching it off...");
            if psu.set_remote_mode(false).expect("Serial link failed") {
                println!("Remote mode off, the front panel can be used again.");
            } else {
                eprintln!("The supply did not confirm leaving remote mode.");
            }
        }
        Some(_) => println!("Remote mode is already off."),
        None => eprintln!("No valid status reply from the supply."),
    }

    psu.close();
    println!("Disconnected");
}
