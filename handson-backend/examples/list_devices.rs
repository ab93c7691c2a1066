//! Prints every adapter wgpu can see, with the limits the exercises use.
//!
//! Run with: cargo run -p handson-backend --example list_devices

use handson_backend::{device_list, enumerate_devices};

fn main() {
    env_logger::init();

    let devices = enumerate_devices();
    println!("{}", device_list(&devices));
    for (i, device) in devices.iter().enumerate() {
        println!("\nDevice {}:", i);
        println!("{}", device);
    }
}
