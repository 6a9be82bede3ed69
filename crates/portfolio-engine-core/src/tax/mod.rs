pub mod contribution;
pub mod income_tax;
pub mod schedule;
