use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::controller::{ProcessParams, WorkerController};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessQuery {
    pub visibility_timeout: Option<u32>,
    pub wait_time: Option<u32>,
}

/// `GET /queues/{queue}/process`: run one polling cycle, answer with the text report.
pub async fn process_queue(
    path: web::Path<String>,
    query: web::Query<ProcessQuery>,
    controller: web::Data<WorkerController>,
) -> impl Responder {
    let query = query.into_inner();
    let params = ProcessParams {
        queue: path.into_inner(),
        visibility_timeout: query.visibility_timeout,
        wait_time: query.wait_time,
    };

    match controller.process(&params).await {
        Ok(report) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(report),
        Err(err) => {
            let err = anyhow::Error::from(err);
            tracing::error!(queue = %params.queue, error = %format!("{err:#}"), "worker pass failed");
            HttpResponse::InternalServerError()
                .content_type("text/plain; charset=utf-8")
                .body(format!("{err:#}\n"))
        }
    }
}
