// src/bin/commands/mod.rs
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::ArgMatches;
use tokio::signal;

use qrush_sqs::builtin::register_builtin_jobs;
use qrush_sqs::routes::worker_route::worker_routes;
use qrush_sqs::{
    JobRegistry, ProcessParams, PushOptions, Queue, QueueManager, QueuedJob, Settings,
    SqsWorker, WorkerController,
};

async fn queue_manager() -> Result<Arc<QueueManager>> {
    let settings = Settings::from_env()?;
    let transport = settings.transport().await?;
    let registry = JobRegistry::global().clone();
    register_builtin_jobs(&registry);
    Ok(Arc::new(QueueManager::new(transport, registry)))
}

// Run polling cycles against one queue
pub async fn process_command(matches: &ArgMatches) -> Result<()> {
    let params = ProcessParams {
        queue: matches.get_one::<String>("queue").cloned().unwrap_or_default(),
        visibility_timeout: matches.get_one::<u32>("visibility_timeout").copied(),
        wait_time: matches.get_one::<u32>("wait_time").copied(),
    };
    let batch_size = matches.get_one::<u32>("batch_size").copied().unwrap_or(1);
    let runs = matches.get_one::<u64>("runs").copied().unwrap_or(1);

    let controller = WorkerController::new(
        SqsWorker::new().with_batch_size(batch_size),
        queue_manager().await?,
    );

    let polling = async {
        let mut run = 0u64;
        while runs == 0 || run < runs {
            let report = controller.process(&params).await?;
            print!("{report}");
            run += 1;
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        result = polling => result,
        _ = signal::ctrl_c() => {
            tracing::info!(queue = %params.queue, "interrupted, stopping worker");
            Ok(())
        }
    }
}

// Push one job
pub async fn push_command(matches: &ArgMatches) -> Result<()> {
    let queue_name = matches.get_one::<String>("queue").cloned().unwrap_or_default();
    let job_type = matches.get_one::<String>("job_type").cloned().unwrap_or_default();
    let payload = matches
        .get_one::<String>("payload")
        .map(String::as_str)
        .unwrap_or("{}");
    let content: serde_json::Value =
        serde_json::from_str(payload).context("payload is not valid JSON")?;

    let options = PushOptions {
        delay_seconds: matches.get_one::<u32>("delay").copied(),
        message_group_id: matches.get_one::<String>("group_id").cloned(),
        message_deduplication_id: matches.get_one::<String>("dedup_id").cloned(),
        enable_auto_deduplication: matches.get_flag("auto_dedup"),
    };

    let manager = queue_manager().await?;
    let queue = manager.get(&queue_name).await?;
    let mut job = QueuedJob::from_boxed(manager.registry().build(&job_type, content)?);
    queue.push(&mut job, &options).await?;

    println!(
        "Enqueued job {} ({job_type}) on '{queue_name}'",
        job.metadata().id().unwrap_or("-")
    );
    Ok(())
}

// Serve the worker route
pub async fn web_command(matches: &ArgMatches) -> Result<()> {
    let host = matches
        .get_one::<String>("host")
        .cloned()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = matches.get_one::<u16>("port").copied().unwrap_or(4567);

    let controller = web::Data::new(WorkerController::new(SqsWorker::new(), queue_manager().await?));

    tracing::info!(%host, port, "starting worker HTTP server");
    HttpServer::new(move || {
        App::new()
            .app_data(controller.clone())
            .configure(worker_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}
