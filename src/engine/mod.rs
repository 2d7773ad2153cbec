pub mod acceptance;
pub mod expiry;
pub mod request_flow;
pub mod trip_flow;
