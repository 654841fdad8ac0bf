pub mod worker_route;
