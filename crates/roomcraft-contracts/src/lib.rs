pub mod analysis;
pub mod bookings;
pub mod events;
pub mod providers;
