pub mod v5;
