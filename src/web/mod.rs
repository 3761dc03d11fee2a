// Web server modules for the training control panel

pub mod logger;
pub mod request_parsing;
pub mod response_helpers;
pub mod routes;
pub mod worker;
