//! Demonstrates basic motion commands against a controller.

use std::time::Duration;

use kzproto::{
    config::DeviceConfig,
    motion::{Acceleration, Controller, MotionOptions},
    protocol::Variant,
    session::Session,
};
use simple_logger::SimpleLogger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new().init().unwrap();

    // Find the configured controller on any serial port.
    let config = DeviceConfig::load("aries.json")?;
    let session = Session::connect_options()
        .variant(Variant::Aries)
        .connect(&config)?;

    let mut options = MotionOptions::new(Duration::from_secs(30));
    options.target_vel_no(2);
    let mut controller = Controller::new(session, &config, &options);
    let identity = controller.device_info()?;
    println!("connected to {} {}", identity.name, identity.version);

    // Home axis 1, then move it 2.5 units at 1.5 units/s. Velocity table
    // slot 2 is overwritten for the move and restored afterwards.
    controller.home(1, 1.0, None)?;
    controller.move_relative(1, 2.5, 1.5, None)?;
    let position = controller.read_position(1)?;
    println!("axis 1 at {} ({} pulses)", position.position, position.position_pulse);

    // Store a slower profile permanently in slot 3.
    let table = controller.write_vel_tbl(
        1,
        3,
        0.5,
        Acceleration {
            acc_time: Some(200),
            ..Acceleration::default()
        },
    )?;
    println!(
        "slot 3: {} to {} units/s",
        table.start_velocity, table.max_velocity
    );
    Ok(())
}
