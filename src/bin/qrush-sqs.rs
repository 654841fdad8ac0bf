// src/bin/qrush-sqs.rs
use clap::{value_parser, Arg, ArgAction, Command};
use anyhow::Result;

mod commands;
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qrush_sqs=info,warn")),
        )
        .init();

    let app = Command::new("qrush-sqs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("QRush SQS - hosted message-queue worker")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("process")
                .about("Pull jobs from a queue and run them")
                .arg(Arg::new("queue")
                    .short('q')
                    .long("queue")
                    .value_name("QUEUE")
                    .help("Queue to process")
                    .required(true))
                .arg(Arg::new("visibility_timeout")
                    .long("visibility-timeout")
                    .value_name("SECONDS")
                    .help("Seconds a received job stays hidden from other workers")
                    .value_parser(value_parser!(u32)))
                .arg(Arg::new("wait_time")
                    .short('w')
                    .long("wait-time")
                    .value_name("SECONDS")
                    .help("Long-poll wait (1-20 seconds); short polling when omitted")
                    .value_parser(value_parser!(u32)))
                .arg(Arg::new("batch_size")
                    .short('b')
                    .long("batch-size")
                    .value_name("NUMBER")
                    .help("Jobs fetched per polling cycle (1-10)")
                    .value_parser(value_parser!(u32).range(1..=10))
                    .default_value("1"))
                .arg(Arg::new("runs")
                    .short('r')
                    .long("runs")
                    .value_name("NUMBER")
                    .help("Polling cycles to run; 0 keeps polling until Ctrl+C")
                    .value_parser(value_parser!(u64))
                    .default_value("1"))
        )
        .subcommand(
            Command::new("push")
                .about("Push a job onto a queue")
                .arg(Arg::new("queue")
                    .short('q')
                    .long("queue")
                    .value_name("QUEUE")
                    .help("Queue name")
                    .required(true))
                .arg(Arg::new("job_type")
                    .short('t')
                    .long("type")
                    .value_name("TYPE")
                    .help("Registered job type")
                    .required(true))
                .arg(Arg::new("payload")
                    .short('p')
                    .long("payload")
                    .value_name("JSON")
                    .help("Job content as JSON")
                    .default_value("{}"))
                .arg(Arg::new("delay")
                    .short('d')
                    .long("delay")
                    .value_name("SECONDS")
                    .help("Delay delivery by N seconds")
                    .value_parser(value_parser!(u32)))
                .arg(Arg::new("group_id")
                    .short('g')
                    .long("group-id")
                    .value_name("GROUP")
                    .help("Message group (required for FIFO queues)"))
                .arg(Arg::new("dedup_id")
                    .long("dedup-id")
                    .value_name("ID")
                    .help("Deduplication id (FIFO queues)"))
                .arg(Arg::new("auto_dedup")
                    .long("auto-dedup")
                    .help("Derive the deduplication id from the body (FIFO queues)")
                    .action(ArgAction::SetTrue))
        )
        .subcommand(
            Command::new("web")
                .about("Serve the worker over HTTP")
                .arg(Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Port to bind")
                    .value_parser(value_parser!(u16))
                    .default_value("4567"))
                .arg(Arg::new("host")
                    .short('H')
                    .long("host")
                    .value_name("HOST")
                    .help("Host to bind")
                    .default_value("127.0.0.1"))
        );

    let matches = app.get_matches();

    match matches.subcommand() {
        Some(("process", sub_matches)) => process_command(sub_matches).await,
        Some(("push", sub_matches)) => push_command(sub_matches).await,
        Some(("web", sub_matches)) => web_command(sub_matches).await,
        _ => unreachable!("clap enforces a subcommand"),
    }
}
