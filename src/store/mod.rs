pub mod offers;
pub mod requests;
pub mod trips;
