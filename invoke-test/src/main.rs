use anyhow::{ensure, Context};
use aws_config::BehaviorVersion;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::Client;
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;

const TITLES: &[&str] = &[
    "The Amazing Spider-Man 2",
    "Pulp Fiction",
    "Spirited Away",
    "The Matrix",
    "Heat",
];

#[derive(Default)]
struct Stats {
    success_count: usize,
    error_count: usize,
    default_count: usize,
    total_latency_ms: f64,
}

/// The fields of an API Gateway proxy response we care about.
#[derive(Deserialize)]
struct ProxyResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    body: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Outcome {
    Inserted,
    Failed(String),
}

#[derive(Parser, Debug)]
#[command(name = "invoke-test")]
#[command(about = "Invoke the ingestion function with API Gateway proxy events")]
struct Args {
    /// Lambda function name
    function: String,

    /// Number of iterations to run
    #[arg(long, default_value = "100")]
    iters: usize,

    /// Number of parallel threads
    #[arg(long, default_value = "1")]
    threads: usize,

    /// Share of requests sent without a body (0.0 to 1.0)
    #[arg(long, default_value = "0.1")]
    empty_ratio: f64,

    /// Item ids are drawn from 1..=N, so repeated ids overwrite each other
    #[arg(long, default_value = "100")]
    id_pool: u32,
}

/// Builds a REST API proxy event. Returns the event and the body it carries.
fn build_event(rng: &mut impl Rng, empty_ratio: f64, id_pool: u32) -> (Value, Option<String>) {
    let body = if rng.gen_bool(empty_ratio) {
        None
    } else {
        let item = json!({
            "id": format!("movie-{}", rng.gen_range(1..=id_pool)),
            "year": rng.gen_range(1950..=2025),
            "title": TITLES[rng.gen_range(0..TITLES.len())],
        });
        Some(item.to_string())
    };

    let event = json!({
        "resource": "/",
        "path": "/",
        "httpMethod": "POST",
        "headers": { "Content-Type": "application/json" },
        "requestContext": {
            "resourcePath": "/",
            "httpMethod": "POST",
            "stage": "prod",
            "identity": {
                "sourceIp": "127.0.0.1",
                "userAgent": "invoke-test",
            },
        },
        "body": body,
        "isBase64Encoded": false,
    });

    (event, body)
}

fn classify(function_error: Option<&str>, payload: &str) -> Outcome {
    if let Some(function_error) = function_error {
        return Outcome::Failed(format!("function error {function_error}: {payload}"));
    }

    match serde_json::from_str::<ProxyResponse>(payload) {
        Ok(response) if response.status_code == 200 => Outcome::Inserted,
        Ok(response) => Outcome::Failed(format!(
            "status {}: {}",
            response.status_code,
            response.body.unwrap_or_default()
        )),
        Err(_) => Outcome::Failed(format!("unexpected response: {payload}")),
    }
}

struct Settings {
    function_name: String,
    total: usize,
    empty_ratio: f64,
    id_pool: u32,
}

async fn run_invocations(
    client: Arc<Client>,
    settings: Arc<Settings>,
    thread_id: usize,
    start: usize,
    end: usize,
    stats: Arc<Mutex<Stats>>,
) {
    let mut rng = StdRng::from_entropy();

    for i in start..=end {
        let (event, body) = build_event(&mut rng, settings.empty_ratio, settings.id_pool);
        let description = body.as_deref().unwrap_or("<no body>").to_string();

        let started = Instant::now();
        let result = client
            .invoke()
            .function_name(&settings.function_name)
            .payload(Blob::new(event.to_string()))
            .send()
            .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(response) => {
                let response_payload = response
                    .payload()
                    .map(|b| String::from_utf8_lossy(b.as_ref()).to_string())
                    .unwrap_or_else(|| "No response".to_string());

                let outcome = classify(response.function_error(), &response_payload);

                {
                    let mut stats = stats.lock().await;
                    match &outcome {
                        Outcome::Inserted => {
                            stats.success_count += 1;
                            stats.total_latency_ms += latency_ms;
                            if body.is_none() {
                                stats.default_count += 1;
                            }
                        }
                        Outcome::Failed(_) => stats.error_count += 1,
                    }
                }

                match outcome {
                    Outcome::Inserted => println!(
                        "[Thread {}: {}/{}] Inserted {} in {:.3}ms",
                        thread_id, i, settings.total, description, latency_ms
                    ),
                    Outcome::Failed(reason) => eprintln!(
                        "[Thread {}: {}/{}] Failed to insert {}: {}",
                        thread_id, i, settings.total, description, reason
                    ),
                }
            }
            Err(e) => {
                {
                    let mut stats = stats.lock().await;
                    stats.error_count += 1;
                }

                eprintln!(
                    "[Thread {}: {}/{}] Error invoking with {}: {}",
                    thread_id, i, settings.total, description, e
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    ensure!(args.threads > 0, "--threads must be at least 1");
    ensure!(args.id_pool > 0, "--id-pool must be at least 1");
    ensure!(
        (0.0..=1.0).contains(&args.empty_ratio),
        "--empty-ratio must be between 0.0 and 1.0"
    );

    println!(
        "Running {} invocations across {} thread(s)",
        args.iters, args.threads
    );

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let client = Arc::new(Client::new(&config));
    let stats = Arc::new(Mutex::new(Stats::default()));
    let settings = Arc::new(Settings {
        function_name: args.function.clone(),
        total: args.iters,
        empty_ratio: args.empty_ratio,
        id_pool: args.id_pool,
    });

    let iters_per_thread = args.iters / args.threads;
    let remainder = args.iters % args.threads;

    let mut tasks = JoinSet::new();

    let mut start = 1;
    for t in 1..=args.threads {
        let end = if t == args.threads {
            start + iters_per_thread - 1 + remainder
        } else {
            start + iters_per_thread - 1
        };

        let client = Arc::clone(&client);
        let settings = Arc::clone(&settings);
        let stats = Arc::clone(&stats);

        tasks.spawn(async move {
            run_invocations(client, settings, t, start, end, stats).await;
        });

        start = end + 1;
    }

    while let Some(result) = tasks.join_next().await {
        result.context("invocation task failed")?;
    }

    let stats = stats.lock().await;
    println!("Completed {} invocations", args.iters);
    println!();
    println!("Results:");
    println!("  Success: {} ({} default items)", stats.success_count, stats.default_count);
    println!("  Errors:  {}", stats.error_count);
    if stats.success_count > 0 {
        let avg_latency = stats.total_latency_ms / stats.success_count as f64;
        println!("  Avg latency: {:.3}ms", avg_latency);
    }

    Ok(())
}
