//! Set an output, then print live readings for a few seconds.
//!
//! Usage: `cargo run --example monitor -- PORT`

use std::{env, sync::Arc, time::Duration};

use bk1788b_psu::{config::Config, monitor::Monitor, psu::Bk1788b};

// Configuration constants - adjust these for your setup
const OUTPUT_VOLTAGE_V: f64 = 5.5;
const CURRENT_LIMIT_A: f64 = 0.1;
const RUN_TIME: Duration = Duration::from_secs(5);
const DISPLAY_PERIOD: Duration = Duration::from_millis(500);

fn main() {
    env_logger::init();

    let port_name = env::args().nth(1).expect("Usage: monitor PORT");
    let psu = Arc::new(Bk1788b::open(Config::new(port_name)).expect("Failed to open serial port"));

    // Apply both setpoints without the poller getting in between.
    let applied = psu
        .session()
        .and_then(|mut session| {
            session.with_remote_mode(|session| {
                Ok(session.set_voltage(OUTPUT_VOLTAGE_V)?
                    && session.set_current(CURRENT_LIMIT_A)?
                    && session.set_output(true)?)
            })
        })
        .expect("Serial link failed");
    println!("Setpoints applied: {applied:?}");

    let monitor = Monitor::spawn(Arc::clone(&psu), Monitor::DEFAULT_INTERVAL);

    // Only looks at cached readings, like a display refresh timer would.
    let start = std::time::Instant::now();
    while start.elapsed() < RUN_TIME {
        std::thread::sleep(DISPLAY_PERIOD);
        match monitor.latest() {
            Some(status) => println!(
                "{:>6.3} V  {:>6.3} A  {:>7.3} W  {:?}{}",
                status.actual_voltage,
                status.actual_current,
                status.power_w(),
                status.mode,
                if status.over_temperature { "  OVER TEMPERATURE" } else { "" }
            ),
            None => println!("waiting for first reading..."),
        }
    }

    monitor.stop();
    let switched_off = psu
        .session()
        .and_then(|mut session| session.with_remote_mode(|session| session.set_output(false)));
    println!("Output off: {:?}", switched_off.ok().flatten());
    psu.close();
}
