pub mod offer;
pub mod request;
pub mod trip;
