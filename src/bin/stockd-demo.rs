//! Inventory walkthrough against a running stockd server: bulk-load products,
//! let concurrent shoppers race for stock, restock, then list low-stock alerts.

use rand::Rng;
use std::collections::HashMap;
use std::time::Instant;
use stockd::client::RemoteLedger;
use stockd::LedgerResult;

struct Options {
    addr: String,
    products: usize,
    shoppers: usize,
    purchases: usize,
    threshold: u64,
}

fn parse_options() -> Options {
    let mut opts = Options {
        addr: "127.0.0.1:7379".to_string(),
        products: 5,
        shoppers: 8,
        purchases: 25,
        threshold: 20,
    };
    let args: Vec<String> = std::env::args().skip(1).collect();
    for pair in args.chunks(2) {
        let [flag, value] = pair else { break };
        match flag.as_str() {
            "--addr" => opts.addr = value.clone(),
            "--products" => opts.products = value.parse().unwrap_or(opts.products),
            "--shoppers" => opts.shoppers = value.parse().unwrap_or(opts.shoppers),
            "--purchases" => opts.purchases = value.parse().unwrap_or(opts.purchases),
            "--threshold" => opts.threshold = value.parse().unwrap_or(opts.threshold),
            other => eprintln!("ignoring unknown option {other}"),
        }
    }
    opts.products = opts.products.max(1);
    opts
}

#[tokio::main]
async fn main() -> LedgerResult<()> {
    tracing_subscriber::fmt().init();
    let opts = parse_options();
    let mut ledger = RemoteLedger::connect(&opts.addr).await?;
    ledger.ping().await?;

    let run = rand::thread_rng().gen_range(1000..10_000);
    let products: Vec<String> = (0..opts.products)
        .map(|i| format!("PROD_{run}_{i}"))
        .collect();

    println!("== Bulk load");
    let stock: Vec<(&str, u64)> = {
        let mut rng = rand::thread_rng();
        products
            .iter()
            .map(|p| (p.as_str(), rng.gen_range(10..=100)))
            .collect()
    };
    let start = Instant::now();
    let created = ledger.initialize_many(&stock).await?;
    println!("Loaded {created} products in {:?}", start.elapsed());
    for (product, quantity) in stock.iter().take(3) {
        println!("  {product}: {quantity} units");
    }

    println!("\n== {} shoppers x {} purchases", opts.shoppers, opts.purchases);
    let start = Instant::now();
    let mut handles = Vec::with_capacity(opts.shoppers);
    for _ in 0..opts.shoppers {
        let addr = opts.addr.clone();
        let products = products.clone();
        let purchases = opts.purchases;
        handles.push(tokio::spawn(async move {
            shop(&addr, &products, purchases).await
        }));
    }

    let mut sold: HashMap<String, u64> = HashMap::new();
    let mut rejected = 0usize;
    for handle in handles {
        let (taken, declined) = handle
            .await
            .map_err(|e| stockd::LedgerError::Server(format!("shopper task failed: {e}")))??;
        for (product, units) in taken {
            *sold.entry(product).or_default() += units;
        }
        rejected += declined;
    }
    println!(
        "Sold {} units, {rejected} purchases declined for insufficient stock ({:?})",
        sold.values().sum::<u64>(),
        start.elapsed()
    );

    println!("\n== Consistency check");
    for (product, initial) in &stock {
        let snap = ledger.peek(product).await?;
        let units = sold.get(*product).copied().unwrap_or(0);
        let ok = initial - units == snap.available;
        println!(
            "  {product}: {initial} - {units} sold = {} (version {}) {}",
            snap.available,
            snap.version,
            if ok { "ok" } else { "MISMATCH" }
        );
    }

    println!("\n== Restock");
    if let Some(product) = products.first() {
        let available = ledger.restock(product, 15).await?;
        println!("  {product}: +15 -> {available} units");
    }

    println!("\n== Low stock alerts (< {})", opts.threshold);
    let alerts: Vec<_> = ledger
        .low_stock(opts.threshold)
        .await?
        .into_iter()
        .filter(|level| products.contains(&level.key))
        .collect();
    if alerts.is_empty() {
        println!("  none");
    }
    for level in alerts {
        println!("  {}: {} units left", level.key, level.available);
    }

    for product in &products {
        ledger.remove(product).await?;
    }
    Ok(())
}

/// One shopper with its own connection. Returns units bought per product
/// and the number of declined purchases.
async fn shop(
    addr: &str,
    products: &[String],
    purchases: usize,
) -> LedgerResult<(HashMap<String, u64>, usize)> {
    let mut ledger = RemoteLedger::connect(addr).await?;
    let mut taken = HashMap::new();
    let mut declined = 0;

    for _ in 0..purchases {
        let (product, quantity) = {
            let mut rng = rand::thread_rng();
            (&products[rng.gen_range(0..products.len())], rng.gen_range(1..=5))
        };
        let r = ledger.reserve(product, quantity).await?;
        if r.granted {
            *taken.entry(product.clone()).or_default() += quantity;
        } else {
            declined += 1;
        }
    }
    Ok((taken, declined))
}
