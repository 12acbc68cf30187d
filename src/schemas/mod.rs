pub mod completion_request;
pub mod completion_response;
pub mod task_status;
