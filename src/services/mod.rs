pub mod worker_service;
