use actix_web::web;
use crate::services::worker_service::process_queue;

pub fn worker_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .route("/queues/{queue}/process", web::get().to(process_queue))
    );
}
