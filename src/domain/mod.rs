pub mod admin;
pub mod attribution_tag;
pub mod audit;
pub mod consent;
pub mod data_request;
pub mod new_subscriber;
pub mod request_status;
pub mod subscriber;
pub mod subscriber_email;
pub mod token;
