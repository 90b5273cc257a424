//! Example: One-shot access and polling tasks against the simulated PLC
//!
//! Run with: cargo run --example poll_simulated
//!
//! This example demonstrates:
//! - Typed reads and writes from operator address text
//! - Starting polling tasks and watching their ticks
//! - Duplicate and capacity rejections
//! - Tearing everything down on disconnect

use s7_poll::utils::format_hex;
use s7_poll::{Client, ClientConfig, MemoryArea, SimulatedPlc, Value, ValueType};
use std::time::{Duration, Instant};

fn main() -> s7_poll::Result<()> {
    // =========================================================================
    // Connect
    // =========================================================================

    let plc = SimulatedPlc::new();
    let config = ClientConfig::new("192.168.0.16");
    let (client, mut events) = Client::with_aggregator(plc.clone(), config)?;
    client.connect()?;
    println!("Connected: {client:?}");

    // =========================================================================
    // One-shot writes and reads
    // =========================================================================

    println!("\n=== One-shot ===\n");

    client.write_value(MemoryArea::DataBlock, 1, "18", ValueType::Int16, &Value::Int16(42))?;
    client.write_value(MemoryArea::DataBlock, 1, "20", ValueType::Float32, &Value::Float32(21.5))?;
    client.write_value(MemoryArea::Merker, 0, "1.7", ValueType::Bool, &Value::Bool(true))?;

    let label = client.string_type();
    let name = Value::FixedString("pump station".into());
    client.write_value(MemoryArea::DataBlock, 1, "30", label, &name)?;

    for (address, ty) in [("18", ValueType::Int16), ("20", ValueType::Float32), ("30", label)] {
        let value = client.read_value(MemoryArea::DataBlock, 1, address, ty)?;
        println!("DB1 {address} ({ty}) = {value}");
    }
    println!("M1   raw = {}", format_hex(&plc.peek(MemoryArea::Merker, 0, 1, 1)));

    // =========================================================================
    // Polling
    // =========================================================================

    println!("\n=== Polling ===\n");

    client.add_task(MemoryArea::DataBlock, 1, "18", ValueType::Int16, 50)?;
    client.add_task(MemoryArea::Merker, 0, "1.7", ValueType::Bool, 80)?;
    client.add_task(MemoryArea::DataBlock, 1, "30", label, 120)?;

    if let Err(e) = client.add_task(MemoryArea::DataBlock, 1, "18", ValueType::Int16, 500) {
        println!("Second DB1 18 task: {e}");
    }

    let deadline = Instant::now() + Duration::from_millis(400);
    while Instant::now() < deadline {
        if let Some(event) = events.next_event(Duration::from_millis(50)) {
            println!("{event}");
        }
    }

    println!("\nActive tasks:");
    for task in client.tasks() {
        println!("  {task}");
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    client.disconnect();
    events.drain();
    if let Some(line) = events.log_lines().back() {
        println!("\n{line}");
    }

    Ok(())
}
