//! Performance benchmarks for hot server paths

use server::catalog::ItemCatalog;
use server::config::StatsConfig;
use server::inventory::Inventory;
use server::stats::step_vitals;
use shared::{FrameBuffer, Message, SlotEntry, Vec2, Vec3, Vitals, INVENTORY_SIZE};
use std::time::Instant;

/// Benchmarks encoding of the most frequent message
#[test]
fn benchmark_movement_encoding() {
    let message = Message::PlayerMovement {
        player_id: 17,
        position: Vec3::new(120.5, 3.0, -48.25),
        rotation: Vec2::new(271.0, -12.5),
    };

    let iterations = 100_000;
    let start = Instant::now();

    let mut total_bytes = 0;
    for _ in 0..iterations {
        total_bytes += message.encode().len();
    }

    let duration = start.elapsed();
    println!(
        "Movement encoding: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(total_bytes, iterations * 29);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks stream decoding of many small frames arriving in chunks
#[test]
fn benchmark_stream_decoding() {
    let mut wire = Vec::new();
    let frame_count = 50_000;
    for i in 0..frame_count {
        let message = Message::PlayerMovement {
            player_id: i,
            position: Vec3::new(i as f32, 1.0, 0.0),
            rotation: Vec2::default(),
        };
        wire.extend_from_slice(&message.encode());
    }

    let start = Instant::now();
    let mut frames = FrameBuffer::new();
    let mut decoded = 0;

    // uneven chunk size so frames straddle reads
    for chunk in wire.chunks(1000) {
        frames.extend(chunk);
        while let Some(frame) = frames.next_frame().unwrap() {
            let message = Message::from_frame(&frame).unwrap();
            assert!(matches!(message, Message::PlayerMovement { .. }));
            decoded += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Stream decoding: {} frames in {:?} ({:.2} ns/frame)",
        decoded,
        duration,
        duration.as_nanos() as f64 / decoded as f64
    );

    assert_eq!(decoded, frame_count);
    assert!(frames.is_empty());
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding a full inventory snapshot
#[test]
fn benchmark_inventory_snapshot() {
    let catalog = ItemCatalog::default();
    let mut inventory = Inventory::new();
    for item in 1..=10 {
        inventory.add_item(item, 7, &catalog);
    }

    let iterations = 20_000;
    let start = Instant::now();

    let mut last: Vec<SlotEntry> = Vec::new();
    for _ in 0..iterations {
        let message = Message::InventoryUpdate {
            slots: inventory.snapshot(),
        };
        let bytes = message.encode();
        if let Message::InventoryUpdate { slots } = Message::decode(&bytes).unwrap() {
            last = slots;
        }
    }

    let duration = start.elapsed();
    println!(
        "Inventory snapshot: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(last, inventory.snapshot());
    assert!(duration.as_millis() < 2000);
}

/// Stress test shuffling items around the inventory
#[test]
fn stress_test_inventory_moves() {
    let catalog = ItemCatalog::default();
    let mut inventory = Inventory::new();
    for item in 1..=10 {
        inventory.add_item(item, 4, &catalog);
    }
    let totals: Vec<u32> = (1..=10).map(|item| inventory.count(item)).collect();

    let iterations = 200_000;
    let start = Instant::now();

    for i in 0..iterations {
        let from = (i * 7 % INVENTORY_SIZE) as i32;
        let to = (i * 13 % INVENTORY_SIZE) as i32;
        inventory.move_item(from, to, &catalog);
    }

    let duration = start.elapsed();
    println!(
        "Inventory moves: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // moving never creates or destroys items
    let after: Vec<u32> = (1..=10).map(|item| inventory.count(item)).collect();
    assert_eq!(after, totals);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the stats update of a large population
#[test]
fn benchmark_stats_update() {
    let config = StatsConfig::default();
    let mut population = vec![Vitals::default(); 1000];

    let passes = 1000;
    let start = Instant::now();

    for _ in 0..passes {
        for vitals in population.iter_mut() {
            step_vitals(vitals, &config, 1.0);
        }
    }

    let duration = start.elapsed();
    println!(
        "Stats update: {} player-steps in {:?}",
        passes * population.len(),
        duration
    );

    // after 1000 simulated seconds without food everyone has starved
    assert!(population.iter().all(|vitals| vitals.is_depleted()));
    assert!(duration.as_millis() < 1000);
}
