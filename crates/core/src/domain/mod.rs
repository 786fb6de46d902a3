pub mod customer;
pub mod product;
pub mod reply;
pub mod reservation;
