//! Record persistence.

mod postgres;

pub use postgres::PgRecordStore;
