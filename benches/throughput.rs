use std::sync::Arc;
use std::time::Instant;
use stockd::config::Config;
use stockd::ledger::Ledger;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

fn start_server(port: u16, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    let config = Config {
        port,
        ..Default::default()
    };
    let ledger = Arc::new(Ledger::with_shards(config.shards));
    let config = Arc::new(RwLock::new(config));

    tokio::spawn(async move {
        let _ = stockd::server::run_server(ledger, config, None, shutdown).await;
    })
}

fn get_client(port: u16) -> redis::Connection {
    let client = redis::Client::open(format!("redis://127.0.0.1:{port}/")).unwrap();
    for i in 0..50 {
        match client.get_connection() {
            Ok(conn) => return conn,
            Err(_) if i < 49 => {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            Err(e) => panic!("Failed to connect: {e}"),
        }
    }
    unreachable!()
}

fn init(conn: &mut redis::Connection, key: &str, quantity: u64) {
    let _: () = redis::cmd("STOCK.INIT")
        .arg(key)
        .arg(quantity)
        .query(conn)
        .unwrap();
}

fn reserve(conn: &mut redis::Connection, key: &str) -> (i64, i64) {
    redis::cmd("STOCK.RESERVE")
        .arg(key)
        .arg(1)
        .query(conn)
        .unwrap()
}

fn bench_hot_key(conn: &mut redis::Connection, iterations: usize) -> f64 {
    init(conn, "bench_hot", iterations as u64);
    let start = Instant::now();
    for _ in 0..iterations {
        reserve(conn, "bench_hot");
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_spread(conn: &mut redis::Connection, iterations: usize) -> f64 {
    let keys: Vec<String> = (0..1000).map(|i| format!("bench_sku_{i}")).collect();
    for key in &keys {
        init(conn, key, iterations as u64);
    }
    let start = Instant::now();
    for i in 0..iterations {
        reserve(conn, &keys[i % keys.len()]);
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_sold_out(conn: &mut redis::Connection, iterations: usize) -> f64 {
    init(conn, "bench_empty", 0);
    let start = Instant::now();
    for _ in 0..iterations {
        let (granted, _) = reserve(conn, "bench_empty");
        assert_eq!(granted, 0);
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_contended(port: u16, threads: usize, iterations: usize) -> (f64, i64) {
    let mut conn = get_client(port);
    // half as much stock as attempts
    init(&mut conn, "bench_flash", (threads * iterations / 2) as u64);

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            std::thread::spawn(move || {
                let mut conn = get_client(port);
                (0..iterations)
                    .map(|_| reserve(&mut conn, "bench_flash").0)
                    .sum::<i64>()
            })
        })
        .collect();
    let granted: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let ops = (threads * iterations) as f64 / start.elapsed().as_secs_f64();
    (ops, granted)
}

fn bench_pipeline(conn: &mut redis::Connection, iterations: usize) -> f64 {
    init(conn, "bench_pipe", iterations as u64);
    let start = Instant::now();
    let batch_size = 100;
    for _ in 0..(iterations / batch_size) {
        let mut pipe = redis::pipe();
        for _ in 0..batch_size {
            pipe.cmd("STOCK.RESERVE").arg("bench_pipe").arg(1).ignore();
        }
        let _: () = pipe.query(conn).unwrap();
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

#[tokio::main]
async fn main() {
    let port = 17000;
    let shutdown = CancellationToken::new();
    let server = start_server(port, shutdown.clone());
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    tokio::task::spawn_blocking(move || {
        let mut conn = get_client(port);
        let iterations = 10_000;

        println!("=== stockd Benchmark ({iterations} operations) ===\n");

        let hot_ops = bench_hot_key(&mut conn, iterations);
        println!("RESERVE hot key:   {hot_ops:>10.0} ops/sec");

        let spread_ops = bench_spread(&mut conn, iterations);
        println!("RESERVE 1000 keys: {spread_ops:>10.0} ops/sec");

        let empty_ops = bench_sold_out(&mut conn, iterations);
        println!("RESERVE sold out:  {empty_ops:>10.0} ops/sec");

        let threads = 8;
        let (flash_ops, granted) = bench_contended(port, threads, iterations / threads);
        println!("RESERVE contended: {flash_ops:>10.0} ops/sec ({threads} clients, {granted} granted)");

        let pipe_ops = bench_pipeline(&mut conn, iterations);
        println!("PIPE:              {pipe_ops:>10.0} ops/sec (100-cmd pipeline batches)");

        println!("\n=== Done ===");
    })
    .await
    .unwrap();

    shutdown.cancel();
    let _ = server.await;
}
