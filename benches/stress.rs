use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ulid::Ulid;

use bedpulse::engine::{Engine, EngineConfig, EngineError, NewGuest, NewRoom};
use bedpulse::import::ImportTable;
use bedpulse::model::{DateRange, StayDraft};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(offset)
}

fn nights(from: i64, count: i64) -> DateRange {
    DateRange::new(day(from), day(from + count)).unwrap()
}

async fn fresh_engine(label: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("bedpulse_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Engine::new(dir.join(format!("{label}.journal")), EngineConfig::default()).unwrap();
    Arc::new(engine)
}

async fn bench_guest(engine: &Engine) -> Ulid {
    engine
        .create_guest(NewGuest {
            first_name: "Bench".into(),
            last_name: "Guest".into(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
}

async fn phase1_sequential() {
    let engine = fresh_engine("sequential").await;
    let room = engine
        .create_room(NewRoom::dormitory("Dorm", 10, 1800))
        .await
        .unwrap();
    let guest = bench_guest(&engine).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n as i64 {
        let t = Instant::now();
        engine
            .allocate_bed(room.id, nights(i / 10, 1), StayDraft::new(guest))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} stays in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("allocate latency", &mut latencies);
}

async fn phase2_contention() {
    let engine = fresh_engine("contention").await;
    let capacities = [1u32, 1, 4, 4, 12];
    let mut rooms = Vec::new();
    for (i, cap) in capacities.iter().enumerate() {
        let room = engine
            .create_room(NewRoom::dormitory(format!("Room {i}"), *cap, 2000))
            .await
            .unwrap();
        rooms.push(room);
    }
    let guest = bench_guest(&engine).await;

    let n_tasks = 16;
    let n_per_task = 100;
    let committed = Arc::new(AtomicUsize::new(0));
    let full = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        let rooms = rooms.clone();
        let committed = committed.clone();
        let full = full.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(n_per_task);
            for j in 0..n_per_task {
                // Every task races for the same nights
                let room = &rooms[(t + j) % rooms.len()];
                let t0 = Instant::now();
                match engine
                    .allocate_bed(room.id, nights((j % 50) as i64, 2), StayDraft::new(guest))
                    .await
                {
                    Ok(_) => {
                        committed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::Capacity { .. } | EngineError::ConcurrencyConflict(_)) => {
                        full.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
                latencies.push(t0.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in handles {
        latencies.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    println!(
        "  {n_tasks} tasks x {n_per_task} attempts = {total} in {:.2}s: {} committed, {} refused",
        elapsed.as_secs_f64(),
        committed.load(Ordering::Relaxed),
        full.load(Ordering::Relaxed),
    );
    print_latency("contended allocate latency", &mut latencies);

    // No night may hold more stays than the room has beds
    for room in &rooms {
        let calendar = engine
            .fully_booked_ranges(room.id, nights(0, 60))
            .await
            .unwrap();
        for offset in 0..60 {
            let availability = engine
                .check_availability(room.id, nights(offset, 1))
                .await
                .unwrap();
            assert!(availability.occupied_count <= room.capacity_beds);
        }
        println!("  {}: {} fully booked ranges", room.name, calendar.len());
    }
}

async fn phase3_read_under_load() {
    let engine = fresh_engine("read_load").await;
    let room_id = engine
        .create_room(NewRoom::dormitory("Big Dorm", 24, 1500))
        .await
        .unwrap()
        .id;
    let guest = bench_guest(&engine).await;

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..3000i64 {
                let _ = engine
                    .allocate_bed(room_id, nights(i % 300, 3), StayDraft::new(guest))
                    .await;
            }
        })
    };

    let mut readers = Vec::new();
    for r in 0..4i64 {
        let engine = engine.clone();
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(1000);
            for i in 0..1000i64 {
                let t = Instant::now();
                engine
                    .check_availability(room_id, nights((i + r * 7) % 300, 2))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in readers {
        latencies.extend(h.await.unwrap());
    }
    writer.await.unwrap();
    print_latency("availability read latency", &mut latencies);
}

async fn phase4_import() {
    let engine = fresh_engine("import").await;
    for i in 0..20 {
        engine
            .create_room(NewRoom::dormitory(format!("Dorm {i}"), 8, 1800))
            .await
            .unwrap();
    }

    let header = ["guestFirstName", "guestLastName", "email", "roomName", "checkIn", "checkOut", "status"];
    let rows: Vec<Vec<String>> = (0..5000i64)
        .map(|i| {
            let range = nights(i % 200, 1 + i % 5);
            vec![
                format!("Guest{}", i % 700),
                "Bench".into(),
                format!("guest{}@example.com", i % 700),
                format!("Dorm {}", i % 20),
                range.check_in.to_string(),
                range.check_out.to_string(),
                if i % 9 == 0 { "cancelled".into() } else { "confirmed".into() },
            ]
        })
        .collect();
    let table = ImportTable {
        header: header.iter().map(|h| h.to_string()).collect(),
        rows,
    };

    let start = Instant::now();
    let report = engine.reconcile_import(&table).await.unwrap();
    let elapsed = start.elapsed();
    println!(
        "  {} rows in {:.2}s: {} committed, {} failed, {} guests",
        table.rows.len(),
        elapsed.as_secs_f64(),
        report.success_count,
        report.fail_count,
        engine.list_guests().len(),
    );

    let start = Instant::now();
    engine.compact_journal().await.unwrap();
    println!("  compaction after import: {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
}

#[tokio::main]
async fn main() {
    println!("=== bedpulse stress benchmark ===\n");

    println!("[phase 1] sequential allocation throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent allocation for the same beds");
    phase2_contention().await;

    println!("\n[phase 3] availability reads under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] bulk import");
    phase4_import().await;

    println!("\n=== benchmark complete ===");
}
