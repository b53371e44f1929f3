use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Duration as Days, NaiveDate, NaiveTime};
use ulid::Ulid;

use barber_scheduler::calendar::{FixedClock, LocalCalendar};
use barber_scheduler::catalog::InMemoryCatalog;
use barber_scheduler::model::*;
use barber_scheduler::notify::CalendarFeed;
use barber_scheduler::store::JournaledStore;
use barber_scheduler::{EngineError, Scheduler};

/// 2030-01-07T00:00:00Z
const EPOCH_MONDAY: Ms = 1_893_974_400_000;
const DAY: Ms = 24 * 60 * MINUTE_MS;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

struct Bench {
    scheduler: Arc<Scheduler>,
    providers: Vec<Ulid>,
    service: Ulid,
    _dir: tempfile::TempDir,
}

/// `n_providers` barbers working 08:00–20:00 every day, one 30-minute service.
fn setup(n_providers: usize) -> Bench {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = Arc::new(InMemoryCatalog::new());
    let service = Ulid::new();
    catalog
        .add_service(Service {
            id: service,
            name: "Corte".into(),
            duration_minutes: 30,
        })
        .expect("service");

    let open = NaiveTime::from_hms_opt(8, 0, 0).expect("time");
    let close = NaiveTime::from_hms_opt(20, 0, 0).expect("time");
    let mut providers = Vec::with_capacity(n_providers);
    for i in 0..n_providers {
        let id = Ulid::new();
        catalog
            .upsert_provider(Provider {
                id,
                name: format!("Barbero {i}"),
                active: true,
            })
            .expect("provider");
        for weekday in 0..7 {
            catalog
                .set_work_block(WorkBlock {
                    provider_id: id,
                    weekday,
                    start: open,
                    end: close,
                    active: true,
                })
                .expect("block");
        }
        providers.push(id);
    }

    let store = Arc::new(
        JournaledStore::open(&dir.path().join("bench.wal"), Arc::new(CalendarFeed::new())).expect("open store"),
    );
    let scheduler = Scheduler::new(
        store,
        catalog.clone(),
        catalog.clone(),
        catalog,
        LocalCalendar::utc(15).expect("calendar"),
    )
    .with_clock(Arc::new(FixedClock::new(EPOCH_MONDAY - DAY)));

    Bench {
        scheduler: Arc::new(scheduler),
        providers,
        service,
        _dir: dir,
    }
}

fn request(provider_id: Ulid, service_id: Ulid, start: Ms) -> BookingRequest {
    BookingRequest {
        provider_id,
        service_id,
        start,
        customer: Customer {
            name: "Bench".into(),
            email: "bench@example.com".into(),
            phone: "600000000".into(),
        },
    }
}

/// Start of the `n`th half-hour slot across consecutive working days.
fn nth_slot(n: i64) -> Ms {
    let per_day = 24; // 08:00–20:00
    EPOCH_MONDAY + (n / per_day) * DAY + 8 * 60 * MINUTE_MS + (n % per_day) * 30 * MINUTE_MS
}

fn phase1_sequential() {
    let bench = setup(1);
    let provider = bench.providers[0];
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n as i64 {
        let t = Instant::now();
        bench
            .scheduler
            .create_appointment(request(provider, bench.service, nth_slot(i)))
            .expect("sequential booking");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency (fsync per commit)", &mut latencies);
}

fn phase2_contention() {
    let bench = setup(1);
    let provider = bench.providers[0];
    let n_threads = 16;
    let slots = 200;
    let barrier = Arc::new(Barrier::new(n_threads));
    let wins = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..n_threads)
        .map(|_| {
            let scheduler = bench.scheduler.clone();
            let barrier = barrier.clone();
            let wins = wins.clone();
            let conflicts = conflicts.clone();
            let service = bench.service;
            thread::spawn(move || {
                barrier.wait();
                // everyone races for the same slots in the same order
                for i in 0..slots {
                    match scheduler.create_appointment(request(provider, service, nth_slot(i))) {
                        Ok(_) => wins.fetch_add(1, Ordering::Relaxed),
                        Err(EngineError::Conflict { .. }) => conflicts.fetch_add(1, Ordering::Relaxed),
                        Err(e) => panic!("unexpected error: {e}"),
                    };
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("contender panicked");
    }

    let elapsed = start.elapsed();
    let wins = wins.load(Ordering::Relaxed);
    println!(
        "  {n_threads} threads x {slots} slots in {:.2}s: {wins} booked, {} conflicts",
        elapsed.as_secs_f64(),
        conflicts.load(Ordering::Relaxed)
    );
    assert_eq!(wins, slots as usize, "every slot must be booked exactly once");
}

fn phase3_read_under_load() {
    let bench = setup(9);
    let reader_provider = bench.providers[0];
    for i in 0..200 {
        if i % 3 == 0 {
            bench
                .scheduler
                .create_appointment(request(reader_provider, bench.service, nth_slot(i)))
                .expect("prefill");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = bench.providers[1..]
        .iter()
        .map(|&provider| {
            let scheduler = bench.scheduler.clone();
            let stop = stop.clone();
            let service = bench.service;
            thread::spawn(move || {
                let mut i = 0;
                while !stop.load(Ordering::Relaxed) {
                    let _ = scheduler.create_appointment(request(provider, service, nth_slot(i)));
                    i += 1;
                }
            })
        })
        .collect();

    let first_day = NaiveDate::from_ymd_opt(2030, 1, 7).expect("date");
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = bench.scheduler.clone();
            thread::spawn(move || {
                let mut latencies = Vec::with_capacity(500);
                for i in 0..500 {
                    let date = first_day + Days::days(i % 9);
                    let t = Instant::now();
                    scheduler
                        .get_availability(reader_provider, date, 30)
                        .expect("availability");
                    latencies.push(t.elapsed());
                }
                latencies
            })
        })
        .collect();

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.join().expect("reader panicked"));
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        h.join().expect("writer panicked");
    }
    print_latency("availability query", &mut all);
}

fn main() {
    println!("=== barber-scheduler stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential();

    println!("\n[phase 2] contention on one provider");
    phase2_contention();

    println!("\n[phase 3] availability latency under write load");
    phase3_read_under_load();

    println!("\n=== done ===");
}
