mod service;

pub use service::SchedulerService;
